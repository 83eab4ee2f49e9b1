//! # pipeline-core - Shared Runtime Concerns for the Video Pipeline
//!
//! Cross-cutting pieces every stage and collaborator in the `pipeline` crate
//! depends on, factored out so they can be unit tested in isolation:
//!
//! - [`error`] - the [`error::ErrorKind`]/[`error::PipelineError`] taxonomy
//! - [`retry`] - exponential backoff shared by stage retries and LLM calls
//! - [`cancel`] - the single cooperative [`cancel::CancellationToken`]
//! - [`progress`] - the throttled progress callback contract
//! - [`resource_monitor`] - background CPU/memory/disk sampling
//! - [`resource_gate`] - admission control for subprocess launches

pub mod cancel;
pub mod error;
pub mod progress;
pub mod resource_gate;
pub mod resource_monitor;
pub mod retry;

pub use cancel::{CancellationSource, CancellationToken};
pub use error::{ErrorKind, PipelineError, Result};
pub use progress::{ProgressSink, ProgressUpdate, ThrottledProgressSink};
pub use resource_gate::{GateTimeoutError, JobKind, ResourceGate, ResourceGateConfig, Ticket};
pub use resource_monitor::{ResourceMonitor, ResourceSnapshot};
pub use retry::{retry_with_backoff, RetryPolicy, RetryState};
