//! Conversion pipeline: validate, render, deliver.

use std::{sync::Arc, time::Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use tracing::{debug, info};

use crate::{
    application::{delivery::DeliveryPolicy, error::PipelineError, render::PdfRenderer},
    domain::pdf::{DeliveryMode, PdfRequest, PdfResult, PipelineStage},
};

pub const METRIC_REQUESTS_TOTAL: &str = "pdf_requests_total";
pub const METRIC_RENDER_MS: &str = "pdf_render_ms";
pub const METRIC_BYTES: &str = "pdf_bytes";
pub const METRIC_DELIVERIES_TOTAL: &str = "pdf_deliveries_total";

pub struct PdfService {
    renderer: Arc<dyn PdfRenderer>,
    delivery: DeliveryPolicy,
}

impl PdfService {
    pub fn new(renderer: Arc<dyn PdfRenderer>, delivery: DeliveryPolicy) -> Self {
        Self { renderer, delivery }
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery.mode()
    }

    /// Run one conversion from raw request fields to a delivered document.
    ///
    /// Stages run strictly in order and the first failure ends the request;
    /// nothing is retried.
    pub async fn generate(
        &self,
        html: Option<String>,
        filename: Option<String>,
    ) -> Result<(PdfRequest, PdfResult), PipelineError> {
        let started_at = Instant::now();
        let mut stage = PipelineStage::Received;

        let result = self.run(&mut stage, html, filename).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;

        match &result {
            Ok((request, pdf)) => {
                counter!(METRIC_REQUESTS_TOTAL, "outcome" => "success").increment(1);
                info!(
                    target = "mundus_pdf::pipeline",
                    op = "pdf::generate",
                    result = "ok",
                    filename = request.filename(),
                    mode = %pdf.delivery,
                    bytes = pdf.size,
                    elapsed_ms,
                    "PDF delivered"
                );
            }
            Err(err) => {
                let failed_at = stage;
                stage = PipelineStage::Failed;
                debug!(
                    target = "mundus_pdf::pipeline",
                    from = failed_at.as_str(),
                    to = stage.as_str(),
                    "stage transition"
                );
                counter!(METRIC_REQUESTS_TOTAL, "outcome" => err.outcome()).increment(1);
                // Error-level reporting belongs to the HTTP response logger.
                debug!(
                    target = "mundus_pdf::pipeline",
                    op = "pdf::generate",
                    result = err.outcome(),
                    stage = failed_at.as_str(),
                    elapsed_ms,
                    error = %err,
                    "PDF generation failed"
                );
            }
        }

        result
    }

    async fn run(
        &self,
        stage: &mut PipelineStage,
        html: Option<String>,
        filename: Option<String>,
    ) -> Result<(PdfRequest, PdfResult), PipelineError> {
        let request = PdfRequest::new(html, filename)?;
        if self.delivery.mode() == DeliveryMode::Uploaded {
            request.object_name()?;
        }
        transition(stage);

        info!(
            target = "mundus_pdf::pipeline",
            filename = request.filename(),
            html_bytes = request.html().len(),
            "Generating PDF"
        );

        transition(stage);
        let render_started = Instant::now();
        let rendered = self.renderer.render(request.html()).await?;
        histogram!(METRIC_RENDER_MS).record(render_started.elapsed().as_secs_f64() * 1000.0);
        histogram!(METRIC_BYTES).record(rendered.len() as f64);
        transition(stage);

        info!(
            target = "mundus_pdf::pipeline",
            filename = request.filename(),
            bytes = rendered.len(),
            "PDF rendered"
        );

        transition(stage);
        let bytes = Bytes::from(rendered);
        let location = self
            .delivery
            .deliver(request.filename(), bytes.clone())
            .await?;
        counter!(METRIC_DELIVERIES_TOTAL, "mode" => self.delivery.mode().as_str()).increment(1);
        transition(stage);

        Ok((request, PdfResult::new(bytes, location)))
    }
}

fn transition(stage: &mut PipelineStage) {
    let next = stage.advance();
    debug!(
        target = "mundus_pdf::pipeline",
        from = stage.as_str(),
        to = next.as_str(),
        "stage transition"
    );
    *stage = next;
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use tracing::Level;
    use tracing_subscriber::fmt::MakeWriter;

    use super::*;
    use crate::{
        application::{
            delivery::{DeliveryError, ObjectStore},
            render::RenderError,
        },
        domain::{error::DomainError, pdf::PdfLocation},
    };

    struct FixedRenderer {
        calls: AtomicUsize,
        output: Result<Vec<u8>, &'static str>,
    }

    impl FixedRenderer {
        fn ok(bytes: &[u8]) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                output: Ok(bytes.to_vec()),
            }
        }

        fn failing(message: &'static str) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                output: Err(message),
            }
        }
    }

    #[async_trait]
    impl PdfRenderer for FixedRenderer {
        async fn render(&self, _html: &str) -> Result<Vec<u8>, RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.output
                .clone()
                .map_err(|message| RenderError::Page(message.to_string()))
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        paths: Mutex<Vec<String>>,
        reject: bool,
    }

    #[async_trait]
    impl ObjectStore for RecordingStore {
        async fn put_object(
            &self,
            path: &str,
            _body: Bytes,
            content_type: &str,
        ) -> Result<(), DeliveryError> {
            assert_eq!(content_type, "application/pdf");
            if self.reject {
                return Err(DeliveryError::Upload {
                    status: 401,
                    message: "invalid JWT".into(),
                });
            }
            self.paths.lock().expect("lock").push(path.to_string());
            Ok(())
        }

        fn public_url(&self, path: &str) -> Result<String, DeliveryError> {
            Ok(format!("https://storage.test/public/pdfs/{path}"))
        }
    }

    #[tokio::test]
    async fn inline_generation_reports_exact_size() {
        let renderer = Arc::new(FixedRenderer::ok(b"%PDF-1.7 tiny"));
        let service = PdfService::new(renderer.clone(), DeliveryPolicy::Inline);

        let (request, result) = service
            .generate(Some("<h1>Hi</h1>".into()), None)
            .await
            .expect("generation succeeds");

        assert_eq!(request.filename(), "digest.pdf");
        assert_eq!(result.size, 13);
        assert_eq!(result.bytes.as_ref(), b"%PDF-1.7 tiny");
        assert!(matches!(result.location, PdfLocation::Inline(_)));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn validation_failure_skips_rendering() {
        let renderer = Arc::new(FixedRenderer::ok(b"%PDF-"));
        let service = PdfService::new(renderer.clone(), DeliveryPolicy::Inline);

        let err = service
            .generate(Some(String::new()), None)
            .await
            .expect_err("empty html is invalid");

        assert!(matches!(err, PipelineError::Validation(DomainError::MissingHtml)));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn render_failure_never_reaches_store() {
        let store = Arc::new(RecordingStore::default());
        let service = PdfService::new(
            Arc::new(FixedRenderer::failing("boom")),
            DeliveryPolicy::uploaded(store.clone(), "digests"),
        );

        let err = service
            .generate(Some("<p>x</p>".into()), None)
            .await
            .expect_err("render fails");

        assert!(matches!(err, PipelineError::Render(_)));
        assert!(store.paths.lock().expect("lock").is_empty());
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().expect("lock")).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().expect("lock").extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = CapturedLogs;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn failures_stay_below_warn_level() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_max_level(Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let service = PdfService::new(
            Arc::new(FixedRenderer::failing("boom")),
            DeliveryPolicy::Inline,
        );
        service
            .generate(Some("<p>x</p>".into()), None)
            .await
            .expect_err("render fails");

        let captured = logs.contents();
        assert!(captured.is_empty(), "unexpected warn/error output: {captured}");
    }

    #[tokio::test]
    async fn upload_rejects_path_like_filename_before_rendering() {
        let renderer = Arc::new(FixedRenderer::ok(b"%PDF-1.7"));
        let store = Arc::new(RecordingStore::default());
        let service = PdfService::new(
            renderer.clone(),
            DeliveryPolicy::uploaded(store.clone(), "digests"),
        );

        for filename in ["../secrets.pdf", "nested/report.pdf", ".."] {
            let err = service
                .generate(Some("<p>x</p>".into()), Some(filename.into()))
                .await
                .expect_err("unsafe object name");
            assert!(matches!(
                err,
                PipelineError::Validation(DomainError::InvalidFilename { .. })
            ));
        }

        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
        assert!(store.paths.lock().expect("lock").is_empty());
    }

    #[tokio::test]
    async fn inline_keeps_filename_verbatim() {
        let service = PdfService::new(
            Arc::new(FixedRenderer::ok(b"%PDF-1.7")),
            DeliveryPolicy::Inline,
        );

        let (request, _) = service
            .generate(Some("<p>x</p>".into()), Some(" reports/weekly.pdf ".into()))
            .await
            .expect("inline accepts any filename");

        assert_eq!(request.filename(), " reports/weekly.pdf ");
    }

    #[tokio::test]
    async fn upload_uses_prefixed_path_and_public_url() {
        let store = Arc::new(RecordingStore::default());
        let service = PdfService::new(
            Arc::new(FixedRenderer::ok(b"%PDF-1.7")),
            DeliveryPolicy::uploaded(store.clone(), "digests"),
        );

        for _ in 0..2 {
            let (_, result) = service
                .generate(Some("<p>x</p>".into()), Some("report.pdf".into()))
                .await
                .expect("upload succeeds");
            assert_eq!(
                result.location,
                PdfLocation::Url("https://storage.test/public/pdfs/digests/report.pdf".into())
            );
        }

        assert_eq!(
            *store.paths.lock().expect("lock"),
            ["digests/report.pdf", "digests/report.pdf"]
        );
    }

    #[tokio::test]
    async fn rejected_upload_surfaces_delivery_error() {
        let store = Arc::new(RecordingStore {
            reject: true,
            ..Default::default()
        });
        let service = PdfService::new(
            Arc::new(FixedRenderer::ok(b"%PDF-1.7")),
            DeliveryPolicy::uploaded(store, "digests"),
        );

        let err = service
            .generate(Some("<p>x</p>".into()), None)
            .await
            .expect_err("upload rejected");

        assert!(matches!(err, PipelineError::Delivery(_)));
        assert_eq!(err.to_string(), "upload failed (status 401): invalid JWT");
    }
}
