use hd_core::store::StoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(StoreError),

    /// A feedback or mark call named a ticket that does not exist.
    #[error("ticket not found: {0}")]
    TicketNotFound(Uuid),
}

impl From<StoreError> for AgentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TicketNotFound(id) => AgentError::TicketNotFound(id),
            other => AgentError::Store(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
