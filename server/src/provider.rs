//! Attribute provider and rank source seams
//!
//! Both collaborators are external and may be slow. Every call goes through
//! [`Attributes`], which bounds it with a timeout and turns "no value yet"
//! into an empty string so that a single missing field never holds up a
//! rebuild.

use crate::error::{DisplayError, ProviderError};
use display_shared::{ClientId, Field, FieldValues};
use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Boxed future returned by provider lookups.
pub type LookupFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Supplies formatted per-client values such as rank prefix, ping or uptime.
///
/// Called once per field per rebuild per client; callers never batch.
pub trait AttributeProvider: Send + Sync {
    fn lookup<'a>(&'a self, client: &'a ClientId, field: Field) -> LookupFuture<'a, String>;
}

/// Supplies a client's primary permission group.
pub trait RankSource: Send + Sync {
    fn primary_group<'a>(&'a self, client: &'a ClientId) -> LookupFuture<'a, String>;
}

/// Timeout-bounded access to the attribute provider and optional rank source
#[derive(Clone)]
pub struct Attributes {
    provider: Arc<dyn AttributeProvider>,
    ranks: Option<Arc<dyn RankSource>>,
    timeout: Duration,
}

impl Attributes {
    pub fn new(provider: Arc<dyn AttributeProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            ranks: None,
            timeout,
        }
    }

    pub fn with_ranks(mut self, ranks: Arc<dyn RankSource>) -> Self {
        self.ranks = Some(ranks);
        self
    }

    /// Looks up one field, degrading missing or slow values to ""
    ///
    /// Only a client the provider no longer knows (`StaleClient`) or a hard
    /// provider failure is returned as an error.
    pub async fn field(&self, client: &ClientId, field: Field) -> Result<String, DisplayError> {
        match self.try_field(client, field).await {
            Ok(value) => Ok(value),
            Err(
                e @ (DisplayError::ProviderUnavailable { .. } | DisplayError::ProviderTimeout { .. }),
            ) => {
                debug!("{}, using placeholder", e);
                Ok(String::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn try_field(&self, client: &ClientId, field: Field) -> Result<String, DisplayError> {
        match timeout(self.timeout, self.provider.lookup(client, field)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(ProviderError::Unavailable)) => Err(DisplayError::ProviderUnavailable {
                client: client.clone(),
                field,
            }),
            Ok(Err(ProviderError::UnknownClient)) => Err(DisplayError::StaleClient(client.clone())),
            Ok(Err(ProviderError::Failed(reason))) => Err(DisplayError::Provider {
                client: client.clone(),
                reason,
            }),
            Err(_) => Err(DisplayError::ProviderTimeout {
                client: client.clone(),
                field,
                timeout: self.timeout,
            }),
        }
    }

    /// Resolves every field in `fields` concurrently
    ///
    /// Each field gets its own lookup timeout. The lookups run side by side,
    /// so the call takes at most about one timeout overall.
    pub async fn resolve(&self, client: &ClientId, fields: &[Field]) -> Result<FieldValues, DisplayError> {
        let lookups: Vec<_> = fields
            .iter()
            .map(|&field| {
                let attributes = self.clone();
                let client = client.clone();
                (
                    field,
                    tokio::spawn(async move { attributes.field(&client, field).await }),
                )
            })
            .collect();

        let mut values = FieldValues::new();
        for (field, lookup) in lookups {
            let value = lookup.await.map_err(|e| DisplayError::RenderTask {
                client: client.clone(),
                reason: format!("lookup of {} failed: {}", field, e),
            })??;
            values.insert(field, value);
        }
        Ok(values)
    }

    /// Primary group of `client`, or None when there is no rank source or it
    /// has no answer in time
    pub async fn primary_group(&self, client: &ClientId) -> Option<String> {
        let ranks = self.ranks.as_ref()?;
        match timeout(self.timeout, ranks.primary_group(client)).await {
            Ok(Ok(group)) => Some(group),
            Ok(Err(e)) => {
                debug!("No primary group for {}: {}", client, e);
                None
            }
            Err(_) => {
                warn!("Rank source timed out for {}", client);
                None
            }
        }
    }
}
