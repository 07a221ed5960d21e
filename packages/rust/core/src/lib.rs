//! Domain logic for heirdesk.
//!
//! This crate ties the boundaries (search, fetch, completion, record store)
//! together: resolve a query to a registered entity, acquire its facts through
//! the fetch-then-fallback state machine, and persist them through the
//! single-writer [`registry::Registry`].

pub mod batch;
pub mod extractor;
pub mod orchestrator;
pub mod registry;
pub mod resolver;

#[cfg(test)]
mod testing;

pub use batch::{RefreshProgress, RefreshReport, SilentRefreshProgress, refresh_all};
pub use extractor::{ExtractError, Extractor, Mode, Record};
pub use orchestrator::{AcquisitionOutcome, Answer, ErrorKind, Pipeline, PipelineConfig, SoftFailure};
pub use registry::Registry;
pub use resolver::{Resolution, ResolutionResult, Resolver};
