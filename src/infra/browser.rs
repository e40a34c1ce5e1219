//! Headless Chromium renderer.
//!
//! Every call launches its own browser with a throwaway profile directory and
//! tears it down before returning, on success and failure alike. Dropping the
//! session (for example when the request future is cancelled) kills the child
//! process.

use std::{collections::HashSet, hash::Hash, path::PathBuf, time::Duration, time::Instant};

use async_trait::async_trait;
use chromiumoxide::{
    Browser, BrowserConfig, Page,
    cdp::browser_protocol::{
        network::{EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent, RequestId},
        page::PrintToPdfParams,
    },
};
use futures::{Stream, StreamExt, stream};
use tempfile::TempDir;
use tokio::{task::JoinHandle, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    application::render::{IdleTimeoutPolicy, PageGeometry, PdfRenderer, RenderError},
    config::RenderSettings,
};

/// Quiet period with no in-flight requests that counts as network idle.
const NETWORK_QUIET_PERIOD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct ChromiumOptions {
    pub executable: Option<PathBuf>,
    pub launch_timeout: Duration,
    pub network_idle_timeout: Duration,
    pub on_idle_timeout: IdleTimeoutPolicy,
    pub geometry: PageGeometry,
}

impl From<&RenderSettings> for ChromiumOptions {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            executable: settings.chrome_executable.clone(),
            launch_timeout: settings.launch_timeout,
            network_idle_timeout: settings.network_idle_timeout,
            on_idle_timeout: settings.on_idle_timeout,
            geometry: PageGeometry::LETTER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChromiumRenderer {
    options: ChromiumOptions,
}

impl ChromiumRenderer {
    pub fn new(options: ChromiumOptions) -> Self {
        Self { options }
    }

    async fn print(&self, page: &Page, html: &str) -> Result<Vec<u8>, RenderError> {
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?
            .map(|event| NetworkActivity::Started(event.request_id.clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?
            .map(|event| NetworkActivity::Finished(event.request_id.clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|err| RenderError::Page(err.to_string()))?
            .map(|event| NetworkActivity::Finished(event.request_id.clone()));
        let mut activity = Box::pin(stream::select(started, stream::select(finished, failed)));

        let load = async {
            page.set_content(html)
                .await
                .map_err(|err| RenderError::Page(err.to_string()))?;
            wait_for_network_idle::<RequestId, _>(&mut activity, NETWORK_QUIET_PERIOD).await
        };

        settle(
            load,
            self.options.network_idle_timeout,
            self.options.on_idle_timeout,
        )
        .await?;

        page.pdf(print_params(&self.options.geometry))
            .await
            .map_err(|err| RenderError::Print(err.to_string()))
    }
}

#[async_trait]
impl PdfRenderer for ChromiumRenderer {
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError> {
        let started_at = Instant::now();
        let mut session = BrowserSession::launch(&self.options).await?;

        let outcome = match session.browser.new_page("about:blank").await {
            Ok(page) => self.print(&page, html).await,
            Err(err) => Err(RenderError::Page(err.to_string())),
        };

        session.close().await;

        if let Ok(bytes) = &outcome {
            info!(
                target = "mundus_pdf::browser",
                op = "browser::render",
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                bytes = bytes.len(),
                "Rendered HTML with headless Chromium"
            );
        }
        outcome
    }
}

struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
    _profile: TempDir,
}

impl BrowserSession {
    async fn launch(options: &ChromiumOptions) -> Result<Self, RenderError> {
        let profile = tempfile::Builder::new()
            .prefix("mundus-pdf-chrome-")
            .tempdir()
            .map_err(|err| RenderError::Launch(format!("failed to create profile dir: {err}")))?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .user_data_dir(profile.path());
        if let Some(executable) = options.executable.as_ref() {
            builder = builder.chrome_executable(executable);
        }
        let config = builder.build().map_err(RenderError::Config)?;

        let (browser, mut handler) = timeout(options.launch_timeout, Browser::launch(config))
            .await
            .map_err(|_| RenderError::LaunchTimeout(options.launch_timeout))?
            .map_err(|err| RenderError::Launch(err.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(err) = event {
                    debug!(
                        target = "mundus_pdf::browser",
                        error = %err,
                        "CDP handler error"
                    );
                }
            }
        });

        Ok(Self {
            browser,
            handler,
            _profile: profile,
        })
    }

    async fn close(&mut self) {
        if let Err(err) = self.browser.close().await {
            warn!(
                target = "mundus_pdf::browser",
                op = "browser::close",
                error = %err,
                "Failed to close browser cleanly"
            );
        }
        if let Err(err) = self.browser.wait().await {
            warn!(
                target = "mundus_pdf::browser",
                op = "browser::close",
                error = %err,
                "Failed to reap browser process"
            );
        }
        self.handler.abort();
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // Browser's own Drop kills a still-running child process.
        self.handler.abort();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NetworkActivity<K> {
    Started(K),
    Finished(K),
}

/// Resolve once no request has been in flight for `quiet`.
async fn wait_for_network_idle<K, S>(
    activity: &mut S,
    quiet: Duration,
) -> Result<(), RenderError>
where
    K: Eq + Hash,
    S: Stream<Item = NetworkActivity<K>> + Unpin,
{
    let mut inflight = HashSet::new();
    loop {
        let next = if inflight.is_empty() {
            match timeout(quiet, activity.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(()),
            }
        } else {
            activity.next().await
        };

        match next {
            Some(NetworkActivity::Started(id)) => {
                inflight.insert(id);
            }
            Some(NetworkActivity::Finished(id)) => {
                inflight.remove(&id);
            }
            None => {
                return Err(RenderError::Page(
                    "browser closed the page event stream".to_string(),
                ));
            }
        }
    }
}

/// Bound page loading by `limit`, applying `policy` when the network never settles.
async fn settle<F>(load: F, limit: Duration, policy: IdleTimeoutPolicy) -> Result<(), RenderError>
where
    F: Future<Output = Result<(), RenderError>>,
{
    match timeout(limit, load).await {
        Ok(result) => result,
        Err(_) => match policy {
            IdleTimeoutPolicy::Fail => Err(RenderError::NetworkIdleTimeout(limit)),
            IdleTimeoutPolicy::Render => {
                warn!(
                    target = "mundus_pdf::browser",
                    op = "browser::wait_network_idle",
                    timeout_secs = limit.as_secs(),
                    "Network never went idle; printing current page state"
                );
                Ok(())
            }
        },
    }
}

fn print_params(geometry: &PageGeometry) -> PrintToPdfParams {
    PrintToPdfParams {
        paper_width: Some(geometry.paper_width),
        paper_height: Some(geometry.paper_height),
        margin_top: Some(geometry.margin),
        margin_bottom: Some(geometry.margin),
        margin_left: Some(geometry.margin),
        margin_right: Some(geometry.margin),
        print_background: Some(geometry.print_background),
        ..Default::default()
    }
}
