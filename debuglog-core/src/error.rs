use debuglog_api::ApiError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DebugLogError>;

#[derive(Debug, Error)]
pub enum DebugLogError {
    /// A required credential or setting is absent from the environment.
    #[error("{0}")]
    Configuration(String),

    /// The incident referenced by an enable request is not open.
    #[error("incident {ticket} is not open")]
    GateClosed { ticket: String },

    /// Either remote system answered with a non-success status, could not be
    /// reached, or returned a body we could not read.
    #[error("remote service error: {0}")]
    RemoteService(#[from] ApiError),
}
