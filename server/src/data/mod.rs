//! Data layer: transactional store, analytical store, blob store and the
//! declarative query engine

pub mod analytics;
pub mod blob;
pub mod error;
pub mod query;
pub mod transactional;
pub mod types;

pub use analytics::{AnalyticsConfig, AnalyticsService};
pub use error::DataError;
pub use transactional::TransactionalService;
