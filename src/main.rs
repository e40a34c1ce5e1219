use std::{
    future::IntoFuture,
    path::{Path, PathBuf},
    pin::pin,
    process,
    sync::Arc,
    time::Instant,
};

use mundus_pdf::{
    application::{
        delivery::DeliveryPolicy,
        error::{AppError, PipelineError},
        pdf::PdfService,
        render::PdfRenderer,
    },
    config::{self, RenderArgs, Settings},
    domain::pdf::{DeliveryMode, PdfRequest},
    infra::{
        browser::{ChromiumOptions, ChromiumRenderer},
        error::InfraError,
        http::{self, HttpState},
        storage::SupabaseStorage,
        telemetry,
    },
};
use tokio::{signal, sync::oneshot, time::timeout};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    // A missing `.env` is the normal case outside local development.
    let _ = dotenvy::dotenv();

    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Render(args) => run_render(settings, args).await,
    }
}

fn build_pdf_service(settings: &Settings) -> Result<PdfService, AppError> {
    let options = ChromiumOptions::from(&settings.render);
    let renderer = Arc::new(ChromiumRenderer::new(options));

    let delivery = match settings.delivery.mode {
        DeliveryMode::Inline => DeliveryPolicy::Inline,
        DeliveryMode::Uploaded => {
            let storage = SupabaseStorage::from_settings(&settings.storage)?;
            DeliveryPolicy::uploaded(Arc::new(storage), settings.storage.prefix.clone())
        }
    };

    Ok(PdfService::new(renderer, delivery))
}

async fn run_serve(settings: Settings) -> Result<(), AppError> {
    let service = Arc::new(build_pdf_service(&settings)?);
    let mode = service.delivery_mode();
    let state = HttpState::new(service, settings.service.name.as_str());
    let router = http::build_router(state, settings.server.max_body_bytes.get() as usize);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "mundus_pdf::server",
        addr = %settings.server.addr,
        mode = %mode,
        service = %settings.service.name,
        "PDF service listening"
    );

    let (signalled_tx, signalled_rx) = oneshot::channel();
    let mut server = pin!(
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signalled_tx.send(());
            })
            .into_future()
    );

    tokio::select! {
        result = &mut server => {
            return result.map_err(|err| AppError::unexpected(format!("server error: {err}")));
        }
        _ = signalled_rx => {}
    }

    let grace = settings.server.graceful_shutdown;
    match timeout(grace, server).await {
        Ok(result) => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
            info!(target = "mundus_pdf::server", "Server shutdown complete");
        }
        Err(_) => {
            warn!(
                target = "mundus_pdf::server",
                timeout_secs = grace.as_secs(),
                "Graceful shutdown timed out; abandoning in-flight requests"
            );
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!(target = "mundus_pdf::server", "Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!(target = "mundus_pdf::server", "Received SIGTERM, starting graceful shutdown");
        },
    }
}

async fn run_render(settings: Settings, args: RenderArgs) -> Result<(), AppError> {
    let output = output_path(&args.input, args.output.as_deref())?;
    let html = tokio::fs::read_to_string(&args.input)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let request = PdfRequest::new(Some(html), None)
        .map_err(|err| AppError::from(PipelineError::from(err)))?;

    let started_at = Instant::now();
    let renderer = ChromiumRenderer::new(ChromiumOptions::from(&settings.render));
    let bytes = renderer
        .render(request.html())
        .await
        .map_err(|err| AppError::from(PipelineError::from(err)))?;

    tokio::fs::write(&output, &bytes)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "mundus_pdf::render",
        op = "cli::render",
        input = %args.input.display(),
        output = %output.display(),
        bytes = bytes.len(),
        elapsed_ms = started_at.elapsed().as_millis() as u64,
        "Wrote PDF"
    );
    Ok(())
}

fn output_path(input: &Path, output: Option<&Path>) -> Result<PathBuf, AppError> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("pdf"));
    if output == input {
        return Err(AppError::unexpected(format!(
            "refusing to overwrite input `{}`; pass --output",
            input.display()
        )));
    }
    Ok(output)
}
