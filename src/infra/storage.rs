//! Supabase Storage client.
//!
//! Objects are written with `x-upsert: true`, so repeated writes to the same
//! path overwrite. Public URLs are derived locally from the bucket layout and
//! never require a round-trip.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode, Url, header};
use serde::Deserialize;
use tracing::{info, warn};

use crate::{
    application::delivery::{DeliveryError, ObjectStore},
    config::StorageSettings,
    infra::error::InfraError,
};

const UPSERT_HEADER: &str = "x-upsert";
const API_KEY_HEADER: &str = "apikey";

#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: Client,
    base: Url,
    bucket: String,
    service_key: String,
}

impl SupabaseStorage {
    pub fn new(
        base_url: &str,
        bucket: impl Into<String>,
        service_key: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, InfraError> {
        let base = Url::parse(base_url)
            .map_err(|err| InfraError::configuration(format!("invalid storage url: {err}")))?;
        if base.cannot_be_a_base() {
            return Err(InfraError::configuration(format!(
                "storage url `{base_url}` cannot be used as a base URL"
            )));
        }
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(request_timeout)
            .build()
            .map_err(|err| InfraError::configuration(format!("http client: {err}")))?;

        Ok(Self {
            client,
            base,
            bucket: bucket.into(),
            service_key: service_key.into(),
        })
    }

    pub fn from_settings(settings: &StorageSettings) -> Result<Self, InfraError> {
        let base_url = settings
            .url
            .as_deref()
            .ok_or_else(|| InfraError::configuration("storage url is not configured"))?;
        let service_key = settings
            .service_key
            .as_deref()
            .ok_or_else(|| InfraError::configuration("storage service key is not configured"))?;

        Self::new(
            base_url,
            settings.bucket.clone(),
            service_key,
            settings.request_timeout,
        )
    }

    pub fn user_agent() -> &'static str {
        concat!("mundus-pdf-service/", env!("CARGO_PKG_VERSION"))
    }

    /// `{base}/storage/v1/object[/public]/{bucket}/{path…}` with each segment escaped.
    fn object_url(&self, public: bool, path: &str) -> Result<Url, DeliveryError> {
        let mut url = self.base.clone();
        {
            let Ok(mut segments) = url.path_segments_mut() else {
                return Err(DeliveryError::PublicUrl {
                    path: path.to_string(),
                    reason: "storage url cannot be a base".to_string(),
                });
            };
            segments.pop_if_empty().extend(["storage", "v1", "object"]);
            if public {
                segments.push("public");
            }
            segments.push(&self.bucket);
            segments.extend(path.split('/').filter(|segment| !segment.is_empty()));
        }
        Ok(url)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StorageErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let parsed: StorageErrorBody = serde_json::from_str(body).unwrap_or_default();
    parsed
        .message
        .or(parsed.error)
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                trimmed.to_string()
            }
        })
}

#[async_trait]
impl ObjectStore for SupabaseStorage {
    async fn put_object(
        &self,
        path: &str,
        body: Bytes,
        content_type: &str,
    ) -> Result<(), DeliveryError> {
        let url = self.object_url(false, path)?;
        let size = body.len();

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.service_key)
            .header(API_KEY_HEADER, &self.service_key)
            .header(UPSERT_HEADER, "true")
            .header(header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|err| DeliveryError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = describe_failure(status, &text);
            warn!(
                target = "mundus_pdf::storage",
                op = "storage::put_object",
                bucket = %self.bucket,
                path,
                status = status.as_u16(),
                error = %message,
                "Storage rejected upload"
            );
            return Err(DeliveryError::Upload {
                status: status.as_u16(),
                message,
            });
        }

        info!(
            target = "mundus_pdf::storage",
            op = "storage::put_object",
            bucket = %self.bucket,
            path,
            bytes = size,
            "Uploaded object"
        );
        Ok(())
    }

    fn public_url(&self, path: &str) -> Result<String, DeliveryError> {
        self.object_url(true, path).map(String::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(base: &str) -> SupabaseStorage {
        SupabaseStorage::new(base, "pdfs", "service-key", Duration::from_secs(5))
            .expect("valid storage")
    }

    #[test]
    fn public_url_follows_bucket_layout() {
        let url = storage("https://abc.supabase.co")
            .public_url("digests/report.pdf")
            .expect("url");
        assert_eq!(
            url,
            "https://abc.supabase.co/storage/v1/object/public/pdfs/digests/report.pdf"
        );
    }

    #[test]
    fn public_url_keeps_base_path_and_escapes_segments() {
        let url = storage("https://proxy.example/supabase/")
            .public_url("digests/weekly report.pdf")
            .expect("url");
        assert_eq!(
            url,
            "https://proxy.example/supabase/storage/v1/object/public/pdfs/digests/weekly%20report.pdf"
        );
    }

    #[test]
    fn invalid_base_url_is_a_configuration_error() {
        let err = SupabaseStorage::new("not a url", "pdfs", "k", Duration::from_secs(1))
            .expect_err("invalid url");
        assert!(matches!(err, InfraError::Configuration { .. }));
    }

    #[test]
    fn failure_message_prefers_json_message() {
        assert_eq!(
            describe_failure(
                StatusCode::BAD_REQUEST,
                r#"{"statusCode":"403","error":"Unauthorized","message":"invalid signature"}"#
            ),
            "invalid signature"
        );
        assert_eq!(
            describe_failure(StatusCode::UNAUTHORIZED, r#"{"error":"Unauthorized"}"#),
            "Unauthorized"
        );
        assert_eq!(
            describe_failure(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down"
        );
        assert_eq!(
            describe_failure(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }
}
