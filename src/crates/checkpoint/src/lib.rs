//! # pipeline-checkpoint - Durable Run State for the Video Pipeline
//!
//! Checkpoint storage lets the pipeline coordinator resume a run after a
//! crash, a killed process, or an operator-requested pause without redoing
//! work that already committed.
//!
//! ## Core Concepts
//!
//! A [`Checkpoint`] is a snapshot of one run: which [`Stage`] it's in, how
//! far that stage has progressed, which item ids already committed, and a
//! frozen copy of the config the run started with. [`CheckpointStore`] is
//! the storage-backend trait the coordinator depends on:
//!
//! - [`memory::InMemoryCheckpointStore`] - reference implementation, used in tests
//! - [`file_store::FileCheckpointStore`] - durable, atomic-write-then-rename implementation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pipeline_checkpoint::{CheckpointStore, FileCheckpointStore, RunId, Stage};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = FileCheckpointStore::new("/var/lib/pipeline/runs");
//!     let run_id = RunId::new();
//!
//!     let mut checkpoint = store.open(&run_id).await?;
//!     checkpoint.advance_to(Stage::Fetch);
//!     store.save(&checkpoint).await?;
//!
//!     store.release(&run_id).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Resume Semantics
//!
//! [`CheckpointStore::open`] enforces single-owner access: a second process
//! attempting to open an already-open run gets `CheckpointError::AlreadyLocked`
//! rather than silently racing the first. [`CheckpointStore::list_incomplete`]
//! lets an operator tool enumerate runs left in a non-terminal stage after an
//! unclean shutdown, for bulk resume or cleanup.

pub mod error;
pub mod file_store;
pub mod memory;
pub mod model;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use file_store::FileCheckpointStore;
pub use memory::InMemoryCheckpointStore;
pub use model::{Checkpoint, RunId, Stage};
pub use traits::CheckpointStore;
