use super::domain::AlertPayload;

/// Receipt states reported by the push provider for a sent ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiptStatus {
    Ok,
    Error { reason: String },
    /// The provider has not produced a receipt yet.
    NotReady,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("transport unavailable: {0}")]
    Unavailable(String),
    #[error("transport rejected message: {reason}")]
    Rejected { reason: String },
}

const DEAD_TOKEN_SIGNATURES: [&str; 3] = ["DeviceNotRegistered", "InvalidToken", "Unregistered"];

/// Whether a provider error means the device token will never work again.
pub fn is_dead_token_reason(reason: &str) -> bool {
    DEAD_TOKEN_SIGNATURES
        .iter()
        .any(|signature| reason.contains(signature))
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        matches!(self, TransportError::Unavailable(_))
    }

    pub fn deactivates_token(&self) -> bool {
        match self {
            TransportError::Rejected { reason } => is_dead_token_reason(reason),
            TransportError::Unavailable(_) => false,
        }
    }
}

/// Push provider seam. Implementations perform blocking I/O.
pub trait NotificationTransport: Send + Sync {
    /// Sends one message to one device token and returns the provider's ticket id.
    fn dispatch(&self, token: &str, payload: &AlertPayload) -> Result<String, TransportError>;

    fn receipt(&self, delivery_id: &str) -> Result<ReceiptStatus, TransportError>;
}
