use crate::types::BlobRef;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use thiserror::Error;

/// Failure of a single blob-store operation. Callers branch on `NotFound` to
/// tell an absent object apart from a failed transfer.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("object '{0}' does not exist")]
    NotFound(String),
    #[error("{operation} of '{key}' failed: {message}")]
    Transfer {
        operation: &'static str,
        key: String,
        message: String,
    },
}

// ============================================================================
// BlobStore trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait BlobStore: Send + Sync {
    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError>;
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
    async fn exists(&self, key: &str) -> Result<bool, BlobError>;
    /// Builds the reference stored on records for the object under `key`.
    /// Does not touch the store.
    fn reference_for(&self, key: &str) -> BlobRef;
}

// ============================================================================
// S3BlobStore: S3-backed implementation
// ============================================================================

pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

impl BlobStore for S3BlobStore {
    async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
        let source = format!("{}/{}", self.bucket, urlencoding::encode(from));
        match self
            .client
            .copy_object()
            .bucket(&self.bucket)
            .copy_source(source)
            .key(to)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let code = err.as_service_error().and_then(|e| e.code());
                if matches!(code, Some("NoSuchKey") | Some("NotFound")) {
                    Err(BlobError::NotFound(from.to_string()))
                } else {
                    Err(BlobError::Transfer {
                        operation: "copy",
                        key: from.to_string(),
                        message: DisplayErrorContext(&err).to_string(),
                    })
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| BlobError::Transfer {
                operation: "delete",
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            })?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BlobError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(BlobError::Transfer {
                operation: "lookup",
                key: key.to_string(),
                message: DisplayErrorContext(&err).to_string(),
            }),
        }
    }

    fn reference_for(&self, key: &str) -> BlobRef {
        BlobRef::new(format!("s3://{}/{}", self.bucket, key))
    }
}

// ============================================================================
// Test utilities
// ============================================================================

#[cfg(test)]
pub(crate) mod test_utils {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub(crate) struct FakeBlobStore {
        pub objects: Mutex<HashMap<String, Vec<u8>>>,
        pub fail_copy: Mutex<bool>,
        pub fail_delete: Mutex<bool>,
    }

    impl FakeBlobStore {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_object(self, key: &str, bytes: &[u8]) -> Self {
            self.objects
                .lock()
                .unwrap()
                .insert(key.to_string(), bytes.to_vec());
            self
        }

        pub(crate) fn failing_copy(self) -> Self {
            *self.fail_copy.lock().unwrap() = true;
            self
        }

        pub(crate) fn failing_delete(self) -> Self {
            *self.fail_delete.lock().unwrap() = true;
            self
        }

        pub(crate) fn has_object(&self, key: &str) -> bool {
            self.objects.lock().unwrap().contains_key(key)
        }
    }

    impl BlobStore for FakeBlobStore {
        async fn copy(&self, from: &str, to: &str) -> Result<(), BlobError> {
            if *self.fail_copy.lock().unwrap() {
                return Err(BlobError::Transfer {
                    operation: "copy",
                    key: from.to_string(),
                    message: "simulated outage".to_string(),
                });
            }
            let mut objects = self.objects.lock().unwrap();
            let bytes = objects
                .get(from)
                .cloned()
                .ok_or_else(|| BlobError::NotFound(from.to_string()))?;
            objects.insert(to.to_string(), bytes);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), BlobError> {
            if *self.fail_delete.lock().unwrap() {
                return Err(BlobError::Transfer {
                    operation: "delete",
                    key: key.to_string(),
                    message: "simulated outage".to_string(),
                });
            }
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }

        async fn exists(&self, key: &str) -> Result<bool, BlobError> {
            Ok(self.has_object(key))
        }

        fn reference_for(&self, key: &str) -> BlobRef {
            BlobRef::new(format!("s3://pictures/{}", key))
        }
    }
}
