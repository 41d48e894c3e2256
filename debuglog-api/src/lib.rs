//! Typed clients for the two remote systems the debug-log enabler talks to:
//! the log-pipeline configuration store and the incident ticketing table.
pub mod auth;
pub mod error;
pub mod incident;
pub mod pipeline;

pub use crate::auth::BasicAuth;
pub use crate::auth::PipelineAuth;
pub use crate::error::ApiError;
pub use crate::incident::IncidentClient;
pub use crate::incident::IncidentRecord;
pub use crate::pipeline::PipelineClient;
pub use crate::pipeline::PipelineDocument;
pub use debuglog_client::HttpTransport;
pub use debuglog_client::ReqwestTransport;
pub use debuglog_client::TransportError;
