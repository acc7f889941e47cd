//! Error types for the display engine and its collaborators.

use display_shared::{ClientId, Field, GroupScope};
use std::time::Duration;
use thiserror::Error;

/// Failures raised while synchronizing a client's display.
///
/// None of these ever reach a user. They are logged at the per-client
/// boundary and the client's display falls back to placeholder content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisplayError {
    #[error("client {0} is already connected")]
    AlreadyConnected(ClientId),

    #[error("attribute provider has no value for {field} of client {client}")]
    ProviderUnavailable { client: ClientId, field: Field },

    #[error("attribute provider timed out after {timeout:?} looking up {field} of client {client}")]
    ProviderTimeout {
        client: ClientId,
        field: Field,
        timeout: Duration,
    },

    #[error("attribute provider failed for client {client}: {reason}")]
    Provider { client: ClientId, reason: String },

    #[error("client {0} disconnected before its display could be applied")]
    StaleClient(ClientId),

    #[error("grouping name {name:?} in {scope:?} is already claimed by another key")]
    NameCollision { scope: GroupScope, name: String },

    #[error("invalid board layout: {0}")]
    InvalidLayout(String),

    #[error("render task for client {client} failed: {reason}")]
    RenderTask { client: ClientId, reason: String },
}

impl DisplayError {
    /// Stale clients are an expected race, not a failure worth a warning.
    pub fn is_stale(&self) -> bool {
        matches!(self, DisplayError::StaleClient(_))
    }
}

/// Failures reported by an attribute provider or rank source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Value not cached yet, or the backing plugin is missing.
    #[error("value unavailable")]
    Unavailable,

    /// The provider no longer knows this client.
    #[error("unknown client")]
    UnknownClient,

    #[error("{0}")]
    Failed(String),
}
