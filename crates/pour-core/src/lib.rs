pub mod cache;
pub mod caveats;
pub mod checks;
pub mod install;
pub mod io;
pub mod livecheck;
pub mod paths;
pub mod pipeline;
pub mod receipt;
pub mod reporter;
pub mod verify;

pub use paths::Layout;
pub use pipeline::{Pipeline, PipelineError, PipelineFailure, RetryPolicy};
pub use receipt::{ResolvedInstallation, Stage, Status};
pub use reporter::{NullReporter, Reporter};

/// User Agent string for core operations
pub const USER_AGENT: &str = concat!("pour/", env!("CARGO_PKG_VERSION"));
