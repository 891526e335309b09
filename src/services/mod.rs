//! Service layer for separating I/O and encoding concerns from pipeline logic

pub mod format;
pub mod io;

pub use format::TransportEncoder;
pub use io::{ArtifactWriter, ImageIOService};
