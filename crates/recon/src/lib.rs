//! `invdrift-recon` — Multi-source asset inventory reconciliation engine.
//!
//! Pure engine crate: receives pre-loaded tables, returns presence, conflicts,
//! column mappings and deltas. No CLI or file IO.

pub mod cancel;
pub mod config;
pub mod conflict;
pub mod delta;
pub mod engine;
pub mod error;
pub mod index;
pub mod mapping;
pub mod model;
pub mod normalize;
pub mod presence;
pub mod suggest;

pub use cancel::CancelToken;
pub use config::{Catalog, RunProfile, SourceProfile};
pub use engine::{run, EngineOptions};
pub use error::ReconError;
pub use model::{ReconInput, ReconResult, SourceTable};
pub use normalize::ComparisonMode;
