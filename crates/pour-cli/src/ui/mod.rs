//! Terminal output.
//!
//! Commands and the engine talk to an [`Output`] handle, which forwards
//! events to a single printing thread so lines from concurrent installs
//! never interleave mid-line.
//!
//! - [`theme`] - Icons, column widths and size formatting
//! - [`actor`] - The printing thread
//! - [`output`] - The handle commands use; implements `Reporter`

pub mod actor;
pub mod output;
pub mod theme;

pub use output::Output;
pub use theme::Theme;
