pub mod pipeline;

#[cfg(test)]
pub(crate) mod fakes;

pub use pipeline::{Collaborators, PipelineOrchestrator};
