use crate::error::Result;
use async_trait::async_trait;
use debuglog_api::HttpTransport;
use debuglog_api::IncidentClient;

/// Incident states that no longer authorise debug logging, compared
/// case-insensitively. The numeric codes are the table's coded forms of
/// resolved and closed.
const CLOSED_STATES: [&str; 4] = ["closed", "resolved", "7", "8"];

/// Answers whether a ticket currently represents an open issue.
///
/// Never cached: every enable asks again.
#[async_trait]
pub trait TicketGate: Send + Sync {
    async fn is_open(&self, ticket: &str) -> Result<bool>;
}

pub fn is_open_state(state: &str) -> bool {
    let state = state.trim().to_lowercase();
    !CLOSED_STATES.contains(&state.as_str())
}

pub struct IncidentGate<T: HttpTransport> {
    client: IncidentClient<T>,
}

impl<T: HttpTransport> IncidentGate<T> {
    pub fn new(client: IncidentClient<T>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<T: HttpTransport> TicketGate for IncidentGate<T> {
    async fn is_open(&self, ticket: &str) -> Result<bool> {
        // An unknown ticket is treated like a closed one.
        let open = match self.client.find_incident(ticket).await? {
            Some(record) => is_open_state(&record.state),
            None => false,
        };
        tracing::debug!(ticket, open, "incident gate checked");
        Ok(open)
    }
}
