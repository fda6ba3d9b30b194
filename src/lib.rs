pub mod core;
pub mod error;
pub mod extract;
pub mod irs;
pub mod pipeline;
pub mod table;
pub mod utils;

// Re-exports
pub use crate::core::config::{Config, FieldSchema};
pub use crate::core::types::{DocumentSource, IndexRecord, Manifest, ManifestSource, Period};
pub use error::SourceError;
pub use irs::{IrsSource, ReturnType};
pub use pipeline::{Mode, Request, RunSummary};
pub use utils::progress::ProgressTracker;
