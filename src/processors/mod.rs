//! Classification stages of a filter pass.

pub mod corroboration;
pub mod grid;
pub mod isolation;
pub mod return_filter;
pub mod wave_filter;

// Re-export key types for convenience
pub use grid::{GridError, SearchGrid};
pub use isolation::{Isolation, IsolationReport};
pub use return_filter::{RejectReason, ReturnDecision, SlopeParams};
pub use wave_filter::{ExclusionSet, FilterOutcome, PassError, PassStats, PointState, WaveFilter};
