//! Adapters to the outside world: browser, storage, HTTP, telemetry.

pub mod browser;
pub mod error;
pub mod http;
pub mod storage;
pub mod telemetry;
