//! Output policies for a rendered document.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use thiserror::Error;

use crate::domain::pdf::{DeliveryMode, PDF_CONTENT_TYPE, PdfLocation};

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("upload failed (status {status}): {message}")]
    Upload { status: u16, message: String },
    #[error("upload failed: {0}")]
    Transport(String),
    #[error("failed to resolve public URL for `{path}`: {reason}")]
    PublicUrl { path: String, reason: String },
}

/// Remote object storage with overwrite-on-write semantics.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create or replace the object at `path`.
    async fn put_object(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), DeliveryError>;

    fn public_url(&self, path: &str) -> Result<String, DeliveryError>;
}

#[derive(Clone)]
pub enum DeliveryPolicy {
    Inline,
    Uploaded {
        store: Arc<dyn ObjectStore>,
        prefix: String,
    },
}

impl fmt::Debug for DeliveryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryPolicy::Inline => f.write_str("Inline"),
            DeliveryPolicy::Uploaded { prefix, .. } => f
                .debug_struct("Uploaded")
                .field("prefix", prefix)
                .finish_non_exhaustive(),
        }
    }
}

impl DeliveryPolicy {
    pub fn uploaded(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self::Uploaded {
            store,
            prefix: prefix.into(),
        }
    }

    pub fn mode(&self) -> DeliveryMode {
        match self {
            DeliveryPolicy::Inline => DeliveryMode::Inline,
            DeliveryPolicy::Uploaded { .. } => DeliveryMode::Uploaded,
        }
    }

    pub async fn deliver(
        &self,
        filename: &str,
        bytes: Bytes,
    ) -> Result<PdfLocation, DeliveryError> {
        match self {
            DeliveryPolicy::Inline => Ok(PdfLocation::Inline(
                general_purpose::STANDARD.encode(&bytes),
            )),
            DeliveryPolicy::Uploaded { store, prefix } => {
                let path = object_path(prefix, filename);
                store.put_object(&path, bytes, PDF_CONTENT_TYPE).await?;
                store.public_url(&path).map(PdfLocation::Url)
            }
        }
    }
}

/// Join the configured prefix and a filename into a bucket-relative path.
pub fn object_path(prefix: &str, filename: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        filename.to_string()
    } else {
        format!("{prefix}/{filename}")
    }
}
