//! Background hotspot download.
//!
//! The download walks every country with a fixed pause between requests,
//! so it runs for a long time alongside the main build. It writes only
//! the `hotspots` table, through its own connection.
//!
//! Its progress lines go through a [`DeferredLog`] rather than straight
//! to the logger, so they do not interleave with the main pipeline's
//! step output. Lines are held until the pipeline calls
//! [`DeferredLog::go_live`], then flushed in order and streamed after.
//! HTTP retry notices from the task's requests take the same path.

use std::time::Duration;

use bird_targets_database::store;
use duckdb::Connection;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::{EbirdClient, EbirdError};

/// Pause between per-country hotspot requests.
pub const DEFAULT_REQUEST_DELAY: Duration = Duration::from_secs(2);

/// Sending half of a [`DeferredLog`].
#[derive(Debug, Clone)]
pub struct DeferredLogSender {
    tx: mpsc::UnboundedSender<String>,
}

impl DeferredLogSender {
    /// Queues a line. Lines sent after the receiver is dropped are lost.
    pub fn send(&self, line: impl Into<String>) {
        let _ = self.tx.send(line.into());
    }
}

/// Receiving half: buffers lines until [`go_live`](Self::go_live).
#[derive(Debug)]
pub struct DeferredLog {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Creates a connected sender and buffer.
#[must_use]
pub fn deferred_log() -> (DeferredLogSender, DeferredLog) {
    let (tx, rx) = mpsc::unbounded_channel();
    (DeferredLogSender { tx }, DeferredLog { rx })
}

impl DeferredLog {
    /// Flushes buffered lines to the logger and forwards later ones as
    /// they arrive.
    ///
    /// Must be called inside a Tokio runtime. The returned handle finishes
    /// once every sender is dropped.
    pub fn go_live(self) -> JoinHandle<()> {
        self.go_live_with(|line| log::info!("{line}"))
    }

    /// Like [`go_live`](Self::go_live), writing lines to `sink`.
    pub fn go_live_with(
        mut self,
        sink: impl Fn(&str) + Send + 'static,
    ) -> JoinHandle<()> {
        while let Ok(line) = self.rx.try_recv() {
            sink(&line);
        }
        tokio::spawn(async move {
            while let Some(line) = self.rx.recv().await {
                sink(&line);
            }
        })
    }
}

/// How the background hotspot download ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HotspotOutcome {
    /// Hotspots were written.
    Loaded(u64),
    /// No download was attempted.
    Skipped(String),
    /// The task returned an error or panicked.
    Failed(String),
}

impl std::fmt::Display for HotspotOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loaded(count) => write!(f, "{count} hotspots"),
            Self::Skipped(reason) => write!(f, "skipped ({reason})"),
            Self::Failed(reason) => write!(f, "failed ({reason})"),
        }
    }
}

/// Starts the hotspot download on `conn`.
///
/// `conn` must be a connection to the output database separate from the
/// main pipeline's (use `Connection::try_clone`).
#[must_use]
pub fn spawn_hotspot_download(
    client: EbirdClient,
    conn: Connection,
    log: DeferredLogSender,
    delay: Duration,
) -> JoinHandle<Result<u64, EbirdError>> {
    let client = client.with_deferred_log(log.clone());
    tokio::spawn(async move { download_hotspots(&client, conn, &log, delay).await })
}

/// Waits for the download task and folds panics into the outcome.
pub async fn join_hotspot_download(
    handle: JoinHandle<Result<u64, EbirdError>>,
) -> HotspotOutcome {
    match handle.await {
        Ok(Ok(count)) => HotspotOutcome::Loaded(count),
        Ok(Err(e)) => HotspotOutcome::Failed(e.to_string()),
        Err(e) => HotspotOutcome::Failed(
            EbirdError::Task {
                message: e.to_string(),
            }
            .to_string(),
        ),
    }
}

async fn download_hotspots(
    client: &EbirdClient,
    conn: Connection,
    log: &DeferredLogSender,
    delay: Duration,
) -> Result<u64, EbirdError> {
    let countries = client.fetch_countries().await?;
    store::create_hotspots_table(&conn)?;
    log.send(format!("Downloading hotspots for {} countries", countries.len()));

    let total_countries = countries.len();
    let mut total = 0_u64;

    for (i, country) in countries.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(delay).await;
        }

        let position = format!("[{}/{total_countries}] {}", i + 1, country.name);
        match client.fetch_hotspots(&country.code).await {
            Ok(hotspots) => {
                let inserted = store::insert_hotspots(&conn, &hotspots)?;
                total += inserted;
                log.send(format!("{position}: {inserted} hotspots"));
            }
            Err(e) => log.send(format!("{position}: Error - {e}")),
        }
    }

    log.send(format!("Hotspot download complete: {total} hotspots"));
    Ok(total)
}
