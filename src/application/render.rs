//! Rendering seam: HTML in, PDF bytes out.

use std::{str::FromStr, time::Duration};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to configure browser: {0}")]
    Config(String),
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("browser did not start within {}s", .0.as_secs())]
    LaunchTimeout(Duration),
    #[error("failed to load page content: {0}")]
    Page(String),
    #[error("page did not reach network idle within {}s", .0.as_secs())]
    NetworkIdleTimeout(Duration),
    #[error("failed to print PDF: {0}")]
    Print(String),
}

/// Paper size and margins, in inches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub paper_width: f64,
    pub paper_height: f64,
    pub margin: f64,
    pub print_background: bool,
}

impl PageGeometry {
    /// US Letter with half-inch margins and backgrounds printed.
    pub const LETTER: Self = Self {
        paper_width: 8.5,
        paper_height: 11.0,
        margin: 0.5,
        print_background: true,
    };
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::LETTER
    }
}

/// What to do when a page keeps the network busy past the idle bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdleTimeoutPolicy {
    #[default]
    Fail,
    Render,
}

impl FromStr for IdleTimeoutPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(IdleTimeoutPolicy::Fail),
            "render" => Ok(IdleTimeoutPolicy::Render),
            other => Err(format!("unknown policy `{other}` (expected fail|render)")),
        }
    }
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render `html` into a paginated PDF document.
    async fn render(&self, html: &str) -> Result<Vec<u8>, RenderError>;
}
