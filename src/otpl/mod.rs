//! The one-token-per-line (OTPL) format.
//!
//! Sentences are separated by blank lines, each token is a line of cells,
//! and the meaning of each cell is given by a
//! [`ColumnSpecification`](crate::colspec::ColumnSpecification).

pub mod association;
pub mod reader;
pub mod writer;

pub use reader::{read, read_auto, segment, Reading, Segmented};
pub use writer::write;
