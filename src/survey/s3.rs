use async_trait::async_trait;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use super::Response;
use super::store::ResponseStore;
use crate::error::StoreError;

/// Keeps all responses in one CSV object, e.g. on a versioned bucket.
///
/// Each append downloads the object, adds one row and uploads the whole
/// file again. A missing object is created with a header line.
pub struct S3ResponseStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    key: String,
}

impl S3ResponseStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, key: &str) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    /// Builds a client from the ambient AWS configuration (env vars,
    /// profile, instance role).
    pub async fn from_env(bucket: &str, key: &str) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, key)
    }

    async fn existing(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let result = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await;

        match result {
            Ok(output) => {
                let bytes = output
                    .body
                    .collect()
                    .await
                    .map_err(|e| remote_error(&e))?
                    .into_bytes();
                Ok(Some(bytes.to_vec()))
            }
            Err(err) if err.as_service_error().is_some_and(|e| e.is_no_such_key()) => Ok(None),
            Err(err) => Err(remote_error(&err)),
        }
    }
}

/// Formats `err` with its whole source chain.
fn remote_error<E: std::error::Error>(err: &E) -> StoreError {
    StoreError::Remote(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl ResponseStore for S3ResponseStore {
    #[tracing::instrument(skip(self, response), fields(bucket = %self.bucket, key = %self.key))]
    async fn append(&self, response: &Response) -> Result<(), StoreError> {
        let mut body = match self.existing().await? {
            Some(bytes) => bytes,
            None => {
                debug!("Response object does not exist yet, creating it");
                Vec::new()
            }
        };
        if !body.is_empty() && !body.ends_with(b"\n") {
            body.push(b'\n');
        }
        body.extend_from_slice(response.to_csv_row(body.is_empty())?.as_bytes());

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .body(ByteStream::from(body))
            .content_type("text/csv")
            .send()
            .await
            .map_err(|e| remote_error(&e))?;

        Ok(())
    }

    fn location(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key)
    }
}
