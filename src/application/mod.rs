//! Application services: the conversion pipeline and the seams it drives.

pub mod delivery;
pub mod error;
pub mod pdf;
pub mod render;
