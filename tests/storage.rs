use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use bytes::Bytes;
use http_body_util::BodyExt;
use httpmock::MockServer;
use mundus_pdf::{
    application::{
        delivery::{DeliveryError, DeliveryPolicy, ObjectStore},
        pdf::PdfService,
        render::{PdfRenderer, RenderError},
    },
    infra::{
        http::{HttpState, build_router},
        storage::SupabaseStorage,
    },
};
use serde_json::Value;
use tower::ServiceExt;

const SERVICE_KEY: &str = "service-role-key";

fn storage(server: &MockServer) -> SupabaseStorage {
    SupabaseStorage::new(
        &server.base_url(),
        "pdfs",
        SERVICE_KEY,
        Duration::from_secs(5),
    )
    .expect("storage client")
}

struct TinyPdf;

#[async_trait]
impl PdfRenderer for TinyPdf {
    async fn render(&self, _html: &str) -> Result<Vec<u8>, RenderError> {
        Ok(b"%PDF-1.4\n%%EOF\n".to_vec())
    }
}

#[tokio::test]
async fn put_object_sends_upsert_with_service_credentials() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/storage/v1/object/pdfs/digests/report.pdf")
            .header("authorization", format!("Bearer {SERVICE_KEY}"))
            .header("apikey", SERVICE_KEY)
            .header("x-upsert", "true")
            .header("content-type", "application/pdf")
            .body("%PDF-1.4");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"Key":"pdfs/digests/report.pdf"}"#);
    });

    let storage = storage(&server);
    for _ in 0..2 {
        storage
            .put_object(
                "digests/report.pdf",
                Bytes::from_static(b"%PDF-1.4"),
                "application/pdf",
            )
            .await
            .expect("upsert succeeds");
    }

    mock.assert_calls(2);
}

#[tokio::test]
async fn rejected_upload_carries_store_message() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST").path("/storage/v1/object/pdfs/a.pdf");
        then.status(400)
            .header("content-type", "application/json")
            .body(r#"{"statusCode":"403","error":"Unauthorized","message":"invalid signature"}"#);
    });

    let err = storage(&server)
        .put_object("a.pdf", Bytes::from_static(b"%PDF-"), "application/pdf")
        .await
        .expect_err("upload rejected");

    mock.assert();
    match err {
        DeliveryError::Upload { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid signature");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_store_is_a_transport_error() {
    let storage = SupabaseStorage::new(
        "http://127.0.0.1:9",
        "pdfs",
        SERVICE_KEY,
        Duration::from_secs(2),
    )
    .expect("storage client");

    let err = storage
        .put_object("a.pdf", Bytes::from_static(b"%PDF-"), "application/pdf")
        .await
        .expect_err("nothing listens on the discard port");
    assert!(matches!(err, DeliveryError::Transport(_)));
}

#[test]
fn public_url_needs_no_round_trip() {
    let server = MockServer::start();
    let url = storage(&server)
        .public_url("digests/report.pdf")
        .expect("public url");
    assert_eq!(
        url,
        format!(
            "{}/storage/v1/object/public/pdfs/digests/report.pdf",
            server.base_url()
        )
    );
}

async fn post_generate(server: &MockServer, body: &'static str) -> (StatusCode, Value) {
    let delivery = DeliveryPolicy::uploaded(Arc::new(storage(server)), "digests");
    let service = PdfService::new(Arc::new(TinyPdf), delivery);
    let router = build_router(
        HttpState::new(Arc::new(service), "mundus-pdf-service"),
        1024 * 1024,
    );

    let response = router
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/generate-pdf")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body))
                .expect("request"),
        )
        .await
        .expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn upload_mode_end_to_end_returns_public_url() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST")
            .path("/storage/v1/object/pdfs/digests/report.pdf");
        then.status(200).body("{}");
    });

    let (status, body) = post_generate(
        &server,
        r#"{"html":"<p>x</p>","filename":"report.pdf"}"#,
    )
    .await;

    mock.assert();
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["pdf_url"],
        format!(
            "{}/storage/v1/object/public/pdfs/digests/report.pdf",
            server.base_url()
        )
    );
    assert_eq!(body["size"], 15);
}

#[tokio::test]
async fn invalid_credentials_surface_as_upload_failure() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("POST");
        then.status(401)
            .header("content-type", "application/json")
            .body(r#"{"error":"Invalid JWT"}"#);
    });

    let (status, body) = post_generate(&server, r#"{"html":"<p>x</p>"}"#).await;

    mock.assert();
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);
    assert!(body.get("pdf_url").is_none());
    let message = body["error"].as_str().expect("error message");
    assert!(message.contains("upload failed"), "message {message}");
    assert!(message.contains("Invalid JWT"), "message {message}");
}
