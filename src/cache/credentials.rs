//! Credential lookup with a read-through cache

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::cache::Cache;
use super::keys;
use crate::error::PaymentResult;
use crate::payments::traits::CredentialsSource;
use crate::payments::types::{GatewayCredentials, ItemRef};

/// Wraps a credentials source and caches its answers per item
///
/// Cache failures fall through to the wrapped source.
pub struct CachedCredentialsSource {
    inner: Arc<dyn CredentialsSource>,
    cache: Arc<dyn Cache<GatewayCredentials>>,
    ttl: Duration,
}

impl CachedCredentialsSource {
    pub fn new(
        inner: Arc<dyn CredentialsSource>,
        cache: Arc<dyn Cache<GatewayCredentials>>,
        ttl: Duration,
    ) -> Self {
        Self { inner, cache, ttl }
    }

    /// Drop the cached credentials for an item
    pub async fn invalidate(&self, item: &ItemRef) {
        if let Err(e) = self.cache.delete(&keys::credentials(item)).await {
            warn!(error = %e, "Failed to invalidate cached credentials");
        }
    }
}

#[async_trait]
impl CredentialsSource for CachedCredentialsSource {
    async fn credentials_for(&self, item: &ItemRef) -> PaymentResult<GatewayCredentials> {
        let key = keys::credentials(item);

        match self.cache.get(&key).await {
            Ok(Some(credentials)) => return Ok(credentials),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Credentials cache lookup failed"),
        }

        let credentials = self.inner.credentials_for(item).await?;
        if let Err(e) = self.cache.set(&key, &credentials, Some(self.ttl)).await {
            warn!(error = %e, "Failed to cache credentials");
        } else {
            debug!(key = %key, "Cached gateway credentials");
        }

        Ok(credentials)
    }
}
