//! Core domain types and abstractions

pub mod asset;
pub mod config;
pub mod error;
pub mod flow;
pub mod log;
pub mod render;
pub mod sync;

// Re-export main types for cleaner imports
pub use asset::AssetClass;
pub use error::{AcquireError, ParseFailure, RenderFailure, StoreFailure};
pub use flow::{DailyFlowRecord, FlowSummary, TickerFlowPoint};
pub use render::{PageRenderer, RenderOptions, RenderedDocument};
pub use sync::{MergeCounts, SyncOutcome, SyncRun};
