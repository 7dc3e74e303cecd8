use thiserror::Error;

/// Main error type for the broker gateway
#[derive(Error, Debug)]
pub enum BrokerError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Event bus errors
    #[error("Bus transport error: {0}")]
    Transport(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // Venue errors
    #[error("Venue connection error: {0}")]
    VenueConnection(String),

    #[error("Venue call timed out after {elapsed_ms}ms: {operation}")]
    VenueTimeout { operation: String, elapsed_ms: u64 },

    #[error("Venue rejected order: {0}")]
    VenueRejected(String),

    #[error("Order not found on venue: {0}")]
    OrderNotFound(String),

    // Order validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Lifecycle errors
    #[error("Duplicate sender reference: {0}")]
    DuplicateOrder(String),

    #[error("Unknown order reference: {0}")]
    UnknownOrder(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Whether the failure is connection-class and eligible for the
    /// single immediate retry. Everything else is permanent.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::VenueConnection(_) | BrokerError::VenueTimeout { .. }
        )
    }
}

/// Result type alias for BrokerError
pub type Result<T> = std::result::Result<T, BrokerError>;
