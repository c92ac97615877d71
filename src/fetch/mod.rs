//! Loading raw table bytes from a local path or over HTTP.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use tracing::debug;

/// Fetches the body at `url`, failing on a non-success status.
pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?.error_for_status()?;
    Ok(resp.bytes().await?.to_vec())
}

pub fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads `source` from disk, or downloads it with `client` when it is an
/// `http(s)` URL.
#[tracing::instrument(skip(client))]
pub async fn read_source<C: HttpClient>(client: &C, source: &str) -> Result<Vec<u8>> {
    let bytes = if is_remote(source) {
        fetch_bytes(client, source)
            .await
            .with_context(|| format!("failed to download '{source}'"))?
    } else {
        std::fs::read(source).with_context(|| format!("failed to read '{source}'"))?
    };
    debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct OfflineClient;

    #[async_trait]
    impl HttpClient for OfflineClient {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            unreachable!("local sources must not hit the network")
        }
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://example.org/detector.csv"));
        assert!(is_remote("http://localhost:8000/a.csv"));
        assert!(!is_remote("data/detector.csv"));
        assert!(!is_remote("httpdata.csv"));
    }

    #[tokio::test]
    async fn test_read_local_source() {
        let path = std::env::temp_dir().join("vsl_diagram_test_source.csv");
        std::fs::write(&path, "time,speed,occupancy\n").unwrap();

        let bytes = read_source(&OfflineClient, path.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"time,speed,occupancy\n");

        std::fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_read_missing_source() {
        let result = read_source(&OfflineClient, "/nonexistent/vsl_diagram.csv").await;
        assert!(result.is_err());
    }
}
