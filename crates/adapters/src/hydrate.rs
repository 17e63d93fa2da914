// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace Hydrator. One public operation, `populate`, with three fallback
//! tiers: snapshot archive, object-store prefix listing, minimal default
//! workspace. All failures here are non-fatal — they degrade to the next
//! tier rather than aborting boot.

use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use previewd_core::normalize_relative;
use thiserror::Error;
use tokio::io::AsyncWriteExt;

const MAX_ARCHIVE_BODY_BYTES: u64 = 100 * 1024 * 1024;
const ARCHIVE_FETCH_ATTEMPTS: u32 = 5;
const ARCHIVE_FETCH_BASE_DELAY: Duration = Duration::from_secs(2);
const ARCHIVE_FETCH_MAX_DELAY: Duration = Duration::from_secs(30);
const ARCHIVE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_PREFIX_LIMIT: usize = 1000;

#[derive(Debug, Error)]
pub enum HydrateError {
    #[error("archive fetch failed after {attempts} attempts: {source}")]
    ArchiveFetch {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },
    #[error("archive fetch timed out on every one of {attempts} attempts")]
    ArchiveFetchTimedOut { attempts: u32 },
    #[error("archive body exceeds {limit} bytes")]
    ArchiveTooLarge { limit: u64 },
    #[error("archive entry escapes workspace root: {0}")]
    ArchiveTraversal(String),
    #[error("archive extraction failed: {0}")]
    ArchiveExtract(#[source] std::io::Error),
    #[error("object store error: {0}")]
    ObjectStore(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize default workspace manifest: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Backoff schedule for archive fetch attempts: `base * 2^attempt`, capped.
fn fetch_backoff(attempt: u32) -> Duration {
    let scaled = ARCHIVE_FETCH_BASE_DELAY.saturating_mul(1u32 << attempt.min(8));
    scaled.min(ARCHIVE_FETCH_MAX_DELAY)
}

/// Abstraction over the project object store: fetch single objects and list
/// a prefix. `S3ObjectStore` is the only implementation; the trait exists so
/// the hydrator can be exercised against a fake in tests.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, HydrateError>;
    async fn list_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>, HydrateError>;
}

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Builds the client from the machine's resolved credential rather than
    /// ambient environment discovery: an access-key pair is used as-is; a
    /// bearer token (the scoped-credential path) is carried as the secret
    /// half of a static credential pair under a fixed access-key id, which
    /// is how the object-store-compatible endpoints this targets accept a
    /// single opaque token over SigV4 auth.
    pub async fn from_base_url(
        base_url: &str,
        bucket: String,
        credential: &previewd_core::Credential,
    ) -> Self {
        let aws_creds = match credential {
            previewd_core::Credential::AccessKey { access_key_id, secret_access_key } => {
                aws_credential_types::Credentials::new(
                    access_key_id,
                    secret_access_key,
                    None,
                    None,
                    "previewd-machine-config",
                )
            }
            previewd_core::Credential::BearerToken(token) => aws_credential_types::Credentials::new(
                "previewd-bearer",
                token,
                None,
                None,
                "previewd-machine-config",
            ),
        };
        let config = aws_config::from_env()
            .endpoint_url(base_url)
            .credentials_provider(aws_creds)
            .load()
            .await;
        let client = aws_sdk_s3::Client::new(&config);
        S3ObjectStore { client, bucket }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, HydrateError> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| HydrateError::ObjectStore(e.to_string()))?;
        let bytes = output
            .body
            .collect()
            .await
            .map_err(|e| HydrateError::ObjectStore(e.to_string()))?
            .into_bytes();
        Ok(bytes.to_vec())
    }

    async fn list_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>, HydrateError> {
        let output = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .max_keys(limit as i32)
            .send()
            .await
            .map_err(|e| HydrateError::ObjectStore(e.to_string()))?;
        Ok(output
            .contents()
            .iter()
            .filter_map(|obj| obj.key().map(str::to_string))
            .collect())
    }
}

pub struct ArchiveHydrator<S> {
    store: S,
    http: reqwest::Client,
}

impl<S: ObjectStore> ArchiveHydrator<S> {
    pub fn new(store: S) -> Self {
        ArchiveHydrator {
            store,
            http: reqwest::Client::new(),
        }
    }

    /// Populates `workspace_root` from the configured sources. On return the
    /// root exists and contains at least a project manifest, regardless of
    /// which tier succeeded.
    pub async fn populate(
        &self,
        workspace_root: &Path,
        snapshot_archive_url: Option<&str>,
        project_id: &str,
    ) -> Result<(), HydrateError> {
        tokio::fs::create_dir_all(workspace_root).await?;

        if let Some(url) = snapshot_archive_url {
            match self.fetch_and_extract_archive(workspace_root, url).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(error = %err, "archive hydration failed, falling back to object listing");
                }
            }
        }

        match self.hydrate_from_prefix(workspace_root, project_id).await {
            Ok(count) if count > 0 => return Ok(()),
            Ok(_) => tracing::warn!("object-store prefix listing yielded no usable files"),
            Err(err) => tracing::warn!(error = %err, "object-store prefix listing failed"),
        }

        emit_default_workspace(workspace_root).await
    }

    async fn fetch_and_extract_archive(
        &self,
        workspace_root: &Path,
        url: &str,
    ) -> Result<(), HydrateError> {
        let body = self.fetch_archive_with_retry(url).await?;
        extract_tar_gz(workspace_root, &body)
    }

    async fn fetch_archive_with_retry(&self, url: &str) -> Result<Vec<u8>, HydrateError> {
        let mut last_err = None;
        for attempt in 0..ARCHIVE_FETCH_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(fetch_backoff(attempt - 1)).await;
            }
            match tokio::time::timeout(ARCHIVE_FETCH_TIMEOUT, self.http.get(url).send()).await {
                Ok(Ok(response)) => match response.bytes().await {
                    Ok(bytes) => {
                        if bytes.len() as u64 > MAX_ARCHIVE_BODY_BYTES {
                            return Err(HydrateError::ArchiveTooLarge {
                                limit: MAX_ARCHIVE_BODY_BYTES,
                            });
                        }
                        return Ok(bytes.to_vec());
                    }
                    Err(err) => last_err = Some(err),
                },
                Ok(Err(err)) => last_err = Some(err),
                Err(_elapsed) => {
                    tracing::warn!(attempt, "archive fetch timed out");
                    last_err = None;
                    continue;
                }
            }
        }
        Err(match last_err {
            Some(source) => HydrateError::ArchiveFetch {
                attempts: ARCHIVE_FETCH_ATTEMPTS,
                source,
            },
            None => HydrateError::ArchiveFetchTimedOut {
                attempts: ARCHIVE_FETCH_ATTEMPTS,
            },
        })
    }

    async fn hydrate_from_prefix(
        &self,
        workspace_root: &Path,
        project_id: &str,
    ) -> Result<usize, HydrateError> {
        let prefix = format!("project-files/{project_id}/");
        let keys = self.store.list_prefix(&prefix, LIST_PREFIX_LIMIT).await?;
        let mut written = 0;
        for key in keys {
            if key.ends_with('/') {
                continue; // placeholder marker, not a file
            }
            let relative = key.strip_prefix(&prefix).unwrap_or(&key);
            if relative.is_empty() {
                continue;
            }
            match self.store.get_object(&key).await {
                Ok(bytes) => match normalize_relative(workspace_root, relative) {
                    Ok(dest) => {
                        if write_file(&dest, &bytes).await.is_ok() {
                            written += 1;
                        }
                    }
                    Err(err) => tracing::warn!(key, error = %err, "skipping unsafe object key"),
                },
                Err(err) => tracing::warn!(key, error = %err, "skipping unreadable object"),
            }
        }
        Ok(written)
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), HydrateError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(bytes).await?;
    Ok(())
}

fn extract_tar_gz(workspace_root: &Path, body: &[u8]) -> Result<(), HydrateError> {
    let decoder = flate2::read::GzDecoder::new(body);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries().map_err(HydrateError::ArchiveExtract)? {
        let mut entry = entry.map_err(HydrateError::ArchiveExtract)?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let entry_path = entry.path().map_err(HydrateError::ArchiveExtract)?;
        let entry_path = entry_path.to_string_lossy().to_string();
        let dest = normalize_relative(workspace_root, &entry_path)
            .map_err(|_| HydrateError::ArchiveTraversal(entry_path.clone()))?;
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).map_err(HydrateError::ArchiveExtract)?;
        std::fs::write(&dest, buf)?;
    }
    Ok(())
}

async fn emit_default_workspace(workspace_root: &Path) -> Result<(), HydrateError> {
    let manifest = serde_json::json!({
        "name": "preview-workspace",
        "private": true,
        "scripts": { "dev": "vite" },
        "dependencies": { "vite": "^5.0.0" }
    });
    write_file(
        &manifest_path(workspace_root),
        serde_json::to_string_pretty(&manifest)?.as_bytes(),
    )
    .await?;
    write_file(
        &workspace_root.join("index.html"),
        b"<!doctype html><html><body><div id=\"root\"></div><script type=\"module\" src=\"/src/main.js\"></script></body></html>",
    )
    .await?;
    write_file(
        &workspace_root.join("src/main.js"),
        b"document.getElementById('root').textContent = 'preview workspace';",
    )
    .await
}

fn manifest_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join("package.json")
}
