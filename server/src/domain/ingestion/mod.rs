//! Ingestion pipeline: validation fan-out, per-entity serialization,
//! processors and the multi-status outcome

pub mod error;
pub mod keyed;
pub mod orchestrator;
pub mod processors;
pub mod tokens;

pub use error::IngestionError;
pub use keyed::{EntityKey, KeyedLocks};
pub use orchestrator::{EventFailure, EventSuccess, IngestionOrchestrator, IngestionOutcome};
