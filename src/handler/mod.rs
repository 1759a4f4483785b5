//! Request handler module
//!
//! Per-request processing: context, path resolution, directory listings and
//! the pipeline that ties the stages together.

pub mod context;
pub mod listing;
pub mod pipeline;
pub mod resolver;

// Re-export main entry point
pub use context::{RequestContext, StageOutcome};
pub use pipeline::{RequestPipeline, Terminal};
