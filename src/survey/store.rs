//! Persistence for survey responses.
//!
//! [`ResponseStore`] is the only seam between survey assembly and storage.
//! [`LocalCsvStore`] appends to a CSV file on disk and doubles as the
//! fallback when the remote store is unavailable; see [`submit`].

use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{debug, error, info};

use super::Response;
use crate::error::StoreError;

/// Appends one response row per call.
#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn append(&self, response: &Response) -> Result<(), StoreError>;

    /// Short human-readable location, used in logs.
    fn location(&self) -> String;
}

/// Appends responses to a local CSV file, writing the header once.
pub struct LocalCsvStore {
    path: PathBuf,
}

impl LocalCsvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ResponseStore for LocalCsvStore {
    async fn append(&self, response: &Response) -> Result<(), StoreError> {
        let file_exists = self.path.exists();
        debug!(path = %self.path.display(), file_exists, "Appending survey response");

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let row = response.to_csv_row(!file_exists)?;
        let mut file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.write_all(row.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// Where a submitted response ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Stored { location: String },
    FellBack { location: String, reason: String },
}

/// Appends `response` to `primary`, writing it to `fallback` instead if the
/// primary store fails. There is no retry of the primary.
///
/// # Errors
///
/// Returns the fallback's error when both stores fail.
pub async fn submit(
    primary: &dyn ResponseStore,
    fallback: &dyn ResponseStore,
    response: &Response,
) -> Result<SubmitOutcome, StoreError> {
    match primary.append(response).await {
        Ok(()) => {
            info!(location = %primary.location(), "Survey response stored");
            Ok(SubmitOutcome::Stored {
                location: primary.location(),
            })
        }
        Err(e) => {
            error!(
                error = %e,
                primary = %primary.location(),
                fallback = %fallback.location(),
                "Remote store failed, writing response to fallback"
            );
            fallback.append(response).await?;
            Ok(SubmitOutcome::FellBack {
                location: fallback.location(),
                reason: e.to_string(),
            })
        }
    }
}
