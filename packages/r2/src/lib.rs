#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Upload of generated packs to S3-compatible storage (Cloudflare R2).
//!
//! Layout in the bucket:
//!
//! | Key | Cache-Control |
//! |---|---|
//! | `packs.json.gz` | `public, max-age=7200` |
//! | `{version}/{region}.json.gz` | `public, max-age=31536000` |
//!
//! Every object is stored with `Content-Type: application/json` and
//! `Content-Encoding: gzip` so browsers decompress it transparently.
//! Objects whose remote `ETag` already equals the local MD5 are skipped.

use std::path::{Path, PathBuf};

use aws_config::Region;
use aws_sdk_s3::config::{Credentials, StalledStreamProtectionConfig};
use bird_targets_cli_utils::format_size;
use bird_targets_config::S3Settings;

/// Index object key.
pub const INDEX_KEY: &str = "packs.json.gz";

/// Cache policy for the index, which changes every release.
pub const CACHE_INDEX: &str = "public, max-age=7200";

/// Cache policy for versioned packs, which never change.
pub const CACHE_PACKS: &str = "public, max-age=31536000";

const CONTENT_TYPE: &str = "application/json";
const CONTENT_ENCODING: &str = "gzip";

/// Errors from uploads.
#[derive(Debug, thiserror::Error)]
pub enum R2Error {
    /// Required S3 settings are absent.
    #[error("Missing S3 settings: {}", .0.join(", "))]
    MissingSettings(Vec<&'static str>),

    /// Something to upload does not exist locally.
    #[error("{what} not found: {}", .path.display())]
    MissingInput {
        /// Description of the file or directory.
        what: &'static str,
        /// Expected path.
        path: PathBuf,
    },

    /// S3 `PutObject` failed.
    #[error("Failed to upload s3://{bucket}/{key}: {source}")]
    Upload {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// S3 `HeadObject` failed.
    #[error("Failed to head s3://{bucket}/{key}: {source}")]
    Head {
        /// Bucket name.
        bucket: String,
        /// Object key.
        key: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Local filesystem error.
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Some uploads failed; the rest were attempted.
    #[error("{failed} of {total} uploads failed")]
    Incomplete {
        /// Failed uploads.
        failed: u64,
        /// Files attempted.
        total: u64,
    },
}

impl R2Error {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// One file to upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadItem {
    /// Local file.
    pub local: PathBuf,
    /// Object key.
    pub key: String,
    /// `Cache-Control` header value.
    pub cache_control: &'static str,
    /// Local size in bytes.
    pub size: u64,
}

/// Outcome counts of an upload run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadStats {
    /// Files uploaded.
    pub uploaded: u64,
    /// Files skipped because the remote copy is identical.
    pub skipped: u64,
    /// Files that failed to upload.
    pub failed: u64,
}

impl UploadStats {
    /// Files considered.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.uploaded + self.skipped + self.failed
    }
}

impl std::fmt::Display for UploadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} uploaded, {} skipped (unchanged), {} failed",
            self.uploaded, self.skipped, self.failed
        )
    }
}

/// Lists the index plus every `{version}/*.json.gz` pack, index first and
/// packs in file-name order.
///
/// # Errors
///
/// Returns [`R2Error::MissingInput`] if the index or the version
/// directory is absent, or [`R2Error::Io`] if the directory cannot be
/// read.
pub fn plan_uploads(packs_dir: &Path, version: &str) -> Result<Vec<UploadItem>, R2Error> {
    let index = packs_dir.join(INDEX_KEY);
    let version_dir = packs_dir.join(version);

    if !index.is_file() {
        return Err(R2Error::MissingInput {
            what: "Index file",
            path: index,
        });
    }
    if !version_dir.is_dir() {
        return Err(R2Error::MissingInput {
            what: "Version directory",
            path: version_dir,
        });
    }

    let mut items = vec![UploadItem {
        size: file_size(&index)?,
        local: index,
        key: INDEX_KEY.to_string(),
        cache_control: CACHE_INDEX,
    }];

    let mut packs = Vec::new();
    let entries = std::fs::read_dir(&version_dir).map_err(|e| R2Error::io(&version_dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| R2Error::io(&version_dir, e))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if path.is_file() && name.ends_with(".json.gz") {
            packs.push(UploadItem {
                key: format!("{version}/{name}"),
                size: file_size(&path)?,
                local: path,
                cache_control: CACHE_PACKS,
            });
        }
    }
    packs.sort_by(|a, b| a.key.cmp(&b.key));
    items.extend(packs);

    Ok(items)
}

fn file_size(path: &Path) -> Result<u64, R2Error> {
    std::fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| R2Error::io(path, e))
}

/// Remote object metadata from `HeadObject`.
struct RemoteMeta {
    size: u64,
    etag: Option<String>,
}

/// Client for the pack bucket.
pub struct R2Client {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl R2Client {
    /// Creates a client from configured S3 settings.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::MissingSettings`] naming every missing value.
    pub fn from_settings(settings: &S3Settings) -> Result<Self, R2Error> {
        let missing = settings.missing();
        let (Some(key_id), Some(secret), Some(bucket), Some(endpoint), true) = (
            settings.key_id.as_deref(),
            settings.secret.as_deref(),
            settings.bucket.as_deref(),
            settings.endpoint.as_deref(),
            missing.is_empty(),
        ) else {
            return Err(R2Error::MissingSettings(missing));
        };

        let creds = Credentials::new(key_id, secret, None, None, "bird-targets-settings");
        let config = aws_sdk_s3::Config::builder()
            .endpoint_url(endpoint)
            .region(Region::new("auto"))
            .credentials_provider(creds)
            .force_path_style(true)
            .stalled_stream_protection(StalledStreamProtectionConfig::disabled())
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: bucket.to_string(),
        })
    }

    /// Bucket the client writes to.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Uploads the index and every pack of `version`.
    ///
    /// A failed file is logged and counted; the remaining files are still
    /// attempted.
    ///
    /// # Errors
    ///
    /// Returns [`R2Error::MissingInput`] if there is nothing to upload, or
    /// [`R2Error::Incomplete`] if any file failed.
    pub async fn upload_packs(&self, packs_dir: &Path, version: &str) -> Result<UploadStats, R2Error> {
        let items = plan_uploads(packs_dir, version)?;
        let total_size: u64 = items.iter().map(|i| i.size).sum();
        log::info!(
            "Uploading {} files ({}) to {}",
            items.len(),
            format_size(total_size),
            self.bucket
        );

        let mut stats = UploadStats::default();
        for item in &items {
            match self.upload(item).await {
                Ok(true) => stats.uploaded += 1,
                Ok(false) => stats.skipped += 1,
                Err(e) => {
                    log::error!("  {e}");
                    stats.failed += 1;
                }
            }
        }

        log::info!("Upload finished: {stats}");
        if stats.failed > 0 {
            return Err(R2Error::Incomplete {
                failed: stats.failed,
                total: stats.total(),
            });
        }
        Ok(stats)
    }

    /// Uploads one file. Returns `false` when the remote copy matched.
    async fn upload(&self, item: &UploadItem) -> Result<bool, R2Error> {
        if let Some(remote) = self.head(&item.key).await?
            && is_local_match(&item.local, item.size, &remote).await
        {
            log::info!("  {}: skipped (unchanged)", item.key);
            return Ok(false);
        }

        log::info!("  Uploading {} ({})...", item.key, format_size(item.size));
        let data = tokio::fs::read(&item.local)
            .await
            .map_err(|e| R2Error::io(&item.local, e))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&item.key)
            .body(aws_sdk_s3::primitives::ByteStream::from(data))
            .content_type(CONTENT_TYPE)
            .content_encoding(CONTENT_ENCODING)
            .cache_control(item.cache_control)
            .send()
            .await
            .map_err(|e| R2Error::Upload {
                bucket: self.bucket.clone(),
                key: item.key.clone(),
                source: Box::new(e),
            })?;

        Ok(true)
    }

    /// `None` when the object does not exist.
    async fn head(&self, key: &str) -> Result<Option<RemoteMeta>, R2Error> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(RemoteMeta {
                size: output
                    .content_length()
                    .and_then(|len| u64::try_from(len).ok())
                    .unwrap_or(0),
                etag: output.e_tag().map(str::to_string),
            })),
            Err(err) => {
                if err
                    .as_service_error()
                    .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found)
                {
                    return Ok(None);
                }
                Err(R2Error::Head {
                    bucket: self.bucket.clone(),
                    key: key.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }
}

/// Whether the remote object has the same size and MD5 as the local file.
///
/// Multipart `ETag`s (containing `-`) are not MD5 digests, so such
/// objects are always re-uploaded.
async fn is_local_match(local: &Path, local_size: u64, remote: &RemoteMeta) -> bool {
    if local_size != remote.size {
        return false;
    }
    let Some(etag) = remote.etag.as_deref().map(|e| e.trim_matches('"')) else {
        return false;
    };
    if etag.contains('-') || etag.len() != 32 {
        return false;
    }
    compute_md5(local).await.is_ok_and(|digest| digest == etag)
}

async fn compute_md5(path: &Path) -> Result<String, std::io::Error> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || md5_hex(&path))
        .await
        .map_err(std::io::Error::other)?
}

fn md5_hex(path: &Path) -> Result<String, std::io::Error> {
    use std::io::Read as _;

    let mut file = std::fs::File::open(path)?;
    let mut context = md5::Context::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        context.consume(&buffer[..n]);
    }
    Ok(format!("{:x}", context.finalize()))
}
