//! Batch event schema and per-event validation

pub mod patch;
pub mod types;
pub mod validate;

pub use patch::Patch;
pub use types::{
    EventPayload, IngestionBatch, IngestionEvent, ObservationBody, ObservationLevel,
    ObservationType, ScoreBody, ScoreDataType, ScoreSource, SdkLogBody, TraceBody, UsageBody,
};
pub use validate::{
    Command, EntityKind, ObservationCommand, ParsedEvent, ScoreCommand, SdkLogCommand,
    TraceCommand, ValidationError, parse_event,
};
