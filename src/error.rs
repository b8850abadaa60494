//! Error types for Wishbone
//!
//! The taxonomy distinguishes per-event errors (the event is diverted, the
//! pipeline keeps running) from configuration and wiring errors (fatal before
//! any module starts). Transient queue overflow is not represented here; it
//! travels as [`crate::queue::TrySendError`] so the rejected envelope returns
//! to the producer.

use thiserror::Error;

/// Main error type for Wishbone operations
#[derive(Debug, Error)]
pub enum WishboneError {
    /// The event's hop counter reached zero in transit.
    #[error("event TTL expired in transit")]
    TtlExpired,

    /// Payload data did not have the expected shape.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A mapping could not be slurped into a full event.
    #[error("the incoming data could not be used to construct an event: {0}")]
    InvalidEventFormat(String),

    /// A protocol decoder or encoder rejected its input.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// Dotted-path lookup missed.
    #[error("no such key: {0}")]
    KeyMissing(String),

    /// Attempt to delete the root of a reserved event key.
    #[error("cannot delete root of reserved keyword '{0}'")]
    ReservedKey(String),

    /// The bulk has reached its maximum number of events.
    #[error("max number of events ({0}) is reached")]
    BulkFull(usize),

    /// A queue endpoint was bound a second time.
    #[error("queue {endpoint} is already connected to {peer}")]
    QueueConnected { endpoint: String, peer: String },

    /// A connect referenced a queue the module never declared.
    #[error("module instance '{module}' has no queue '{queue}'")]
    QueueMissing { module: String, queue: String },

    /// A qualified component name resolved to nothing.
    #[error("component {0} cannot be found")]
    NoSuchComponent(String),

    /// A component was found but does not conform to a supported shape.
    #[error("'{0}' is not a valid wishbone component")]
    InvalidComponent(String),

    /// The router was asked for a module instance it does not hold.
    #[error("could not find module {0}")]
    NoSuchModule(String),

    /// A module could not be brought into a runnable state.
    #[error("failed to initialize module '{module}': {reason}")]
    ModuleInitFailure { module: String, reason: String },

    /// A protocol component could not be instantiated.
    #[error("could not initialize protocol '{name}': {reason}")]
    ProtocolInitFailure { name: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WishboneError {
    /// Short machine-readable tag recorded under `errors.<module>` when a
    /// consumer fails an event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::TtlExpired => "ttl_expired",
            Self::InvalidData(_) => "invalid_data",
            Self::InvalidEventFormat(_) => "invalid_event_format",
            Self::ProtocolError(_) => "protocol_error",
            Self::KeyMissing(_) => "key_missing",
            Self::ReservedKey(_) => "reserved_key",
            Self::BulkFull(_) => "bulk_full",
            Self::QueueConnected { .. } => "queue_connected",
            Self::QueueMissing { .. } => "queue_missing",
            Self::NoSuchComponent(_) => "no_such_component",
            Self::InvalidComponent(_) => "invalid_component",
            Self::NoSuchModule(_) => "no_such_module",
            Self::ModuleInitFailure { .. } => "module_init_failure",
            Self::ProtocolInitFailure { .. } => "protocol_init_failure",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, WishboneError>;
