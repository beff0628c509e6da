//! Pipeline graph resolution and run execution.

pub mod dag;
pub mod executor;

pub use dag::PipelineDag;
pub use executor::PipelineExecutor;
