//! Request and result types for a single HTML → PDF conversion.
//!
//! A `PdfRequest` only exists once its HTML is known to be non-empty. Its
//! filename is echoed as sent; [`PdfRequest::object_name`] checks it before it
//! becomes the last segment of an object path. A `PdfResult` always reports
//! `size == bytes.len()`.

use std::{fmt, str::FromStr};

use bytes::Bytes;

use super::error::DomainError;

pub const DEFAULT_FILENAME: &str = "digest.pdf";
pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const PDF_SIGNATURE: &[u8] = b"%PDF-";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfRequest {
    html: String,
    filename: String,
}

impl PdfRequest {
    /// Validate raw request fields.
    ///
    /// `html` must be present and non-empty. A missing or blank `filename`
    /// falls back to [`DEFAULT_FILENAME`]; any other value is kept verbatim.
    pub fn new(html: Option<String>, filename: Option<String>) -> Result<Self, DomainError> {
        let html = match html {
            Some(html) if !html.is_empty() => html,
            _ => return Err(DomainError::MissingHtml),
        };

        let filename = match filename {
            Some(name) if !name.trim().is_empty() => name,
            _ => DEFAULT_FILENAME.to_string(),
        };

        Ok(Self { html, filename })
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The filename as the last segment of an object path.
    pub fn object_name(&self) -> Result<&str, DomainError> {
        validate_object_name(&self.filename)
    }
}

fn validate_object_name(name: &str) -> Result<&str, DomainError> {
    if name == "." || name == ".." {
        return Err(DomainError::invalid_filename(
            name,
            "must not be a relative path component",
        ));
    }
    if name.contains(['/', '\\']) {
        return Err(DomainError::invalid_filename(
            name,
            "must not contain path separators",
        ));
    }
    if name.chars().any(char::is_control) {
        return Err(DomainError::invalid_filename(
            name,
            "must not contain control characters",
        ));
    }
    Ok(name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Inline,
    Uploaded,
}

impl DeliveryMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryMode::Inline => "inline",
            DeliveryMode::Uploaded => "upload",
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inline" => Ok(DeliveryMode::Inline),
            "upload" | "uploaded" => Ok(DeliveryMode::Uploaded),
            other => Err(format!("unknown delivery mode `{other}` (expected inline|upload)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PdfLocation {
    /// Standard base64 encoding of the document bytes.
    Inline(String),
    /// Publicly reachable URL of the uploaded object.
    Url(String),
}

#[derive(Debug, Clone)]
pub struct PdfResult {
    pub bytes: Bytes,
    pub size: usize,
    pub delivery: DeliveryMode,
    pub location: PdfLocation,
}

impl PdfResult {
    pub fn new(bytes: impl Into<Bytes>, location: PdfLocation) -> Self {
        let bytes = bytes.into();
        let delivery = match location {
            PdfLocation::Inline(_) => DeliveryMode::Inline,
            PdfLocation::Url(_) => DeliveryMode::Uploaded,
        };
        Self {
            size: bytes.len(),
            bytes,
            delivery,
            location,
        }
    }
}

/// Lifecycle of one conversion. Any failure short-circuits to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Received,
    Validated,
    Rendering,
    Rendered,
    Delivering,
    Delivered,
    Failed,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Received => "received",
            PipelineStage::Validated => "validated",
            PipelineStage::Rendering => "rendering",
            PipelineStage::Rendered => "rendered",
            PipelineStage::Delivering => "delivering",
            PipelineStage::Delivered => "delivered",
            PipelineStage::Failed => "failed",
        }
    }

    /// Next stage on the success path; terminal stages map to themselves.
    pub fn advance(self) -> Self {
        match self {
            PipelineStage::Received => PipelineStage::Validated,
            PipelineStage::Validated => PipelineStage::Rendering,
            PipelineStage::Rendering => PipelineStage::Rendered,
            PipelineStage::Rendered => PipelineStage::Delivering,
            PipelineStage::Delivering => PipelineStage::Delivered,
            PipelineStage::Delivered => PipelineStage::Delivered,
            PipelineStage::Failed => PipelineStage::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineStage::Delivered | PipelineStage::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_empty_html_is_rejected() {
        assert_eq!(
            PdfRequest::new(None, None).unwrap_err(),
            DomainError::MissingHtml
        );
        assert_eq!(
            PdfRequest::new(Some(String::new()), Some("a.pdf".into())).unwrap_err(),
            DomainError::MissingHtml
        );
    }

    #[test]
    fn filename_defaults_to_digest() {
        let request = PdfRequest::new(Some("<p>x</p>".into()), None).expect("valid");
        assert_eq!(request.filename(), DEFAULT_FILENAME);

        let request = PdfRequest::new(Some("<p>x</p>".into()), Some("   ".into())).expect("valid");
        assert_eq!(request.filename(), DEFAULT_FILENAME);
    }

    #[test]
    fn filename_is_echoed_verbatim() {
        for name in [" report.pdf ", "reports/weekly.pdf", "..", "a\\b.pdf"] {
            let request =
                PdfRequest::new(Some("<p>x</p>".into()), Some(name.into())).expect("valid");
            assert_eq!(request.filename(), name);
        }
    }

    #[test]
    fn object_name_rejects_path_components() {
        for name in ["../secret.pdf", "a/b.pdf", "a\\b.pdf", "..", ".", "bad\n.pdf"] {
            let request =
                PdfRequest::new(Some("<p>x</p>".into()), Some(name.into())).expect("valid");
            let err = request
                .object_name()
                .expect_err("filename should be rejected");
            assert!(
                matches!(err, DomainError::InvalidFilename { .. }),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn object_name_accepts_plain_names() {
        let request = PdfRequest::new(Some("<p>x</p>".into()), Some("weekly report.pdf".into()))
            .expect("valid");
        assert_eq!(request.object_name(), Ok("weekly report.pdf"));
    }

    #[test]
    fn result_size_tracks_buffer_length() {
        let result = PdfResult::new(b"%PDF-1.4 body".to_vec(), PdfLocation::Inline("x".into()));
        assert_eq!(result.size, 13);
        assert_eq!(result.delivery, DeliveryMode::Inline);

        let result = PdfResult::new(Bytes::new(), PdfLocation::Url("https://x/y.pdf".into()));
        assert_eq!(result.size, 0);
        assert_eq!(result.delivery, DeliveryMode::Uploaded);
    }

    #[test]
    fn delivery_mode_parses_both_spellings() {
        assert_eq!("inline".parse::<DeliveryMode>(), Ok(DeliveryMode::Inline));
        assert_eq!("Upload".parse::<DeliveryMode>(), Ok(DeliveryMode::Uploaded));
        assert_eq!("uploaded".parse::<DeliveryMode>(), Ok(DeliveryMode::Uploaded));
        assert!("s3".parse::<DeliveryMode>().is_err());
    }

    #[test]
    fn stages_advance_along_success_path() {
        let mut stage = PipelineStage::Received;
        let mut seen = vec![stage.as_str()];
        while !stage.is_terminal() {
            stage = stage.advance();
            seen.push(stage.as_str());
        }
        assert_eq!(
            seen,
            [
                "received",
                "validated",
                "rendering",
                "rendered",
                "delivering",
                "delivered"
            ]
        );
        assert_eq!(PipelineStage::Failed.advance(), PipelineStage::Failed);
    }
}
