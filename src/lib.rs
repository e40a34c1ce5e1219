//! HTML to PDF rendering service.
//!
//! `domain` holds request validation and result types, `application` runs the
//! render-then-deliver pipeline behind the [`application::render::PdfRenderer`]
//! and [`application::delivery::ObjectStore`] seams, and `infra` provides the
//! Chromium, Supabase Storage, HTTP and telemetry adapters.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
