//! Tailor: the draft/persistence core behind a resume builder.
//!
//! - `reconciler` - the draft state machine
//! - `resumes`, `settings`, `ai` - clients for the backend endpoints
//! - `transcript`, `storage` - on-device persistence
//! - `shell` - a line-oriented driver used by the `tailor` binary

pub mod ai;
pub mod api;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod resumes;
pub mod settings;
pub mod shell;
pub mod storage;
pub mod transcript;
pub mod types;

pub use error::{Result, TailorError};
pub use reconciler::{Collaborators, Reconciler};
