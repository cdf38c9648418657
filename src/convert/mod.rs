//! Multi-format conversion of uploaded images
//!
//! - [`FormatEncoder`] is the swappable "encode this image as format F" capability
//! - [`Converter`] fans one upload out over every [`FormatTag`] concurrently and
//!   joins the results into a [`ConversionResult`]
//!
//! Per-format failures stay inside the result; only conditions that make any
//! output impossible surface as [`ConversionError`].

mod encoder;
mod format;
mod orchestrator;

pub use encoder::{EncodeError, FormatEncoder, ImageEncoder};
pub use format::{FormatTag, UnknownFormat};
pub use orchestrator::{ConversionError, ConversionResult, ConvertedArtifact, Converter};
