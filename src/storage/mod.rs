use std::env;

use anyhow::{Context, Result, bail};
use reqwest::{Client, StatusCode};

const DEFAULT_BUCKET: &str = "FilesUOJ";

/// HTTP client for the hosted object store that keeps the uploaded blobs.
/// Uploads happen straight from the browser; the backend only ever deletes.
#[derive(Clone)]
pub struct StorageClient {
    http: Client,
    config: StorageConfig,
}

#[derive(Clone)]
struct StorageConfig {
    api_url: Option<String>,
    service_key: Option<String>,
    bucket: String,
}

impl StorageClient {
    /// Build a client using environment variables. Missing credentials are
    /// tolerated here and only rejected when a deletion is attempted.
    pub fn from_env() -> Result<Self> {
        let api_url = env::var("STORAGE_API_URL").ok();
        let service_key = env::var("STORAGE_SERVICE_KEY").ok();
        let bucket = env::var("STORAGE_BUCKET").unwrap_or_else(|_| DEFAULT_BUCKET.to_string());

        Ok(Self {
            http: Client::new(),
            config: StorageConfig {
                api_url,
                service_key,
                bucket,
            },
        })
    }

    pub fn bucket(&self) -> &str {
        &self.config.bucket
    }

    /// Remove a blob from the configured bucket.
    pub async fn delete_object(&self, object_path: &str) -> Result<()> {
        self.delete_object_in(&self.config.bucket, object_path).await
    }

    /// Remove a blob from an explicit bucket. The reconciliation sweep uses
    /// this so retries target the bucket recorded at failure time.
    pub async fn delete_object_in(&self, bucket: &str, object_path: &str) -> Result<()> {
        let Some(api_url) = self.config.api_url.as_ref() else {
            bail!("STORAGE_API_URL is not configured but required for object deletion");
        };
        let Some(service_key) = self.config.service_key.as_ref() else {
            bail!("STORAGE_SERVICE_KEY is not configured but required for object deletion");
        };

        let endpoint = object_endpoint(api_url, bucket, object_path);

        let response = self
            .http
            .delete(&endpoint)
            .bearer_auth(service_key)
            .send()
            .await
            .context("object storage request failed")?;

        let status = response.status();
        if !deletion_complete(status) {
            let body = response.text().await.unwrap_or_default();
            bail!(
                "object storage call failed with status {status}: {}",
                body_preview(&body)
            );
        }

        Ok(())
    }
}

/// Whether the store's answer means the blob is gone. A 404 counts: the
/// object was already removed, so there is nothing left to retry.
fn deletion_complete(status: StatusCode) -> bool {
    status.is_success() || status == StatusCode::NOT_FOUND
}

/// First 500 bytes of an oversized error body, cut on a char boundary.
fn body_preview(body: &str) -> &str {
    if body.len() <= 500 {
        return body;
    }
    let mut end = 500;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

fn object_endpoint(base: &str, bucket: &str, object_path: &str) -> String {
    format!(
        "{}/object/{}/{}",
        base.trim_end_matches('/'),
        bucket,
        object_path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_object_endpoint_from_parts() {
        assert_eq!(
            object_endpoint("https://store.example.com/storage/v1", "FilesUOJ", "notes/cs101.pdf"),
            "https://store.example.com/storage/v1/object/FilesUOJ/notes/cs101.pdf"
        );
    }

    #[test]
    fn normalizes_redundant_slashes() {
        assert_eq!(
            object_endpoint("https://store.example.com/storage/v1/", "FilesUOJ", "/notes/cs101.pdf"),
            "https://store.example.com/storage/v1/object/FilesUOJ/notes/cs101.pdf"
        );
    }

    #[test]
    fn already_deleted_blobs_count_as_deleted() {
        assert!(deletion_complete(StatusCode::OK));
        assert!(deletion_complete(StatusCode::NOT_FOUND));
        assert!(!deletion_complete(StatusCode::UNAUTHORIZED));
        assert!(!deletion_complete(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn error_body_preview_stops_at_char_boundaries() {
        assert_eq!(body_preview("short"), "short");

        // 200 three-byte chars: byte 500 falls inside one, so the cut backs
        // up to 498 instead of panicking.
        let body = "あ".repeat(200);
        let preview = body_preview(&body);
        assert_eq!(preview.len(), 498);
        assert!(body.starts_with(preview));
    }
}
