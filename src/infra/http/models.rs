use serde::{Deserialize, Serialize};

use crate::domain::pdf::{PdfLocation, PdfResult};

/// Body of `POST /generate-pdf`. Absent and `null` fields are treated alike.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct GeneratePdfRequest {
    pub html: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GeneratePdfResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
    pub filename: String,
    pub size: usize,
}

impl GeneratePdfResponse {
    pub fn new(filename: &str, result: PdfResult) -> Self {
        let (pdf_base64, pdf_url) = match result.location {
            PdfLocation::Inline(encoded) => (Some(encoded), None),
            PdfLocation::Url(url) => (None, Some(url)),
        };
        Self {
            success: true,
            pdf_base64,
            pdf_url,
            filename: filename.to_string(),
            size: result.size,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
}
