//! Completion notices through ntfy.sh.

use std::time::Duration;

const NTFY_BASE_URL: &str = "https://ntfy.sh";
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Title and body of a completion notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// `Title` header.
    pub title: String,
    /// Message body.
    pub body: String,
}

impl Notice {
    /// Notice for an operation run against a release.
    #[must_use]
    pub fn for_run(operation: &str, release: &str, success: bool) -> Self {
        let (status, mark) = if success {
            ("Complete", "\u{2705}")
        } else {
            ("Failed", "\u{274c}")
        };
        Self {
            title: format!("EBD Aggregator: {status}"),
            body: format!("{operation} - {release} {mark}"),
        }
    }
}

/// Posts `notice` to `topic`. Failures are logged and otherwise ignored.
pub async fn send(topic: &str, notice: &Notice) {
    let client = match reqwest::Client::builder().timeout(NOTIFY_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            log::debug!("Notification client unavailable: {e}");
            return;
        }
    };

    let result = client
        .post(format!("{NTFY_BASE_URL}/{topic}"))
        .header("Title", &notice.title)
        .body(notice.body.clone())
        .send()
        .await;

    match result {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => log::debug!("Notification rejected: HTTP {}", response.status()),
        Err(e) => log::debug!("Notification failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notice_text() {
        let ok = Notice::for_run("Generate Packs", "Dec 2025", true);
        assert_eq!(ok.title, "EBD Aggregator: Complete");
        assert_eq!(ok.body, "Generate Packs - Dec 2025 \u{2705}");

        let failed = Notice::for_run("Build Database", "Nov 2025", false);
        assert_eq!(failed.title, "EBD Aggregator: Failed");
        assert!(failed.body.starts_with("Build Database - Nov 2025"));
    }
}
