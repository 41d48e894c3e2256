//! Time-boxed debug logging for individual vehicles.
//!
//! [`FilterRegistry`] tracks which car ids currently have debug logs let
//! through the log pipeline. Each entry is gated on an open incident and
//! reverts on its own after [`DEFAULT_EXPIRY_WINDOW`]. Every membership change
//! rewrites the pipeline's filter query from the captured base query plus one
//! suppression clause per active id.
mod compose;
pub mod config;
mod error;
mod gate;
mod registry;
mod store;

pub use compose::compose_query;
pub use compose::strip_suppression_clauses;
pub use compose::suppression_clause;
pub use config::DebugLogConfig;
pub use config::PipelineSettings;
pub use config::TicketingSettings;
pub use debuglog_api::PipelineDocument;
pub use error::DebugLogError;
pub use error::Result;
pub use gate::IncidentGate;
pub use gate::TicketGate;
pub use gate::is_open_state;
pub use registry::ActiveFilter;
pub use registry::DEFAULT_EXPIRY_WINDOW;
pub use registry::FilterEvent;
pub use registry::FilterRegistry;
pub use store::PipelineStore;
