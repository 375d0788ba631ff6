//! Client factories.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::client::Client;
use super::grpc_client::GrpcClient;
use super::null::NullFactory;
use crate::config::{ClientConfig, RateLimitServiceConfig};
use crate::error::Result;
use crate::grpc::{ChannelFactory, GrpcChannelFactory};

/// Produces decision clients, one per logical caller.
pub trait ClientFactory: Send + Sync {
    /// Create a new client. `timeout` overrides the service's default
    /// per-call timeout.
    fn create(&self, timeout: Option<Duration>) -> Box<dyn Client>;

    /// The remote service configuration, or `None` when rate limiting is
    /// not configured.
    fn rate_limit_config(&self) -> Option<&RateLimitServiceConfig>;
}

/// A [`ClientFactory`] producing [`GrpcClient`]s, each on its own channel.
pub struct GrpcFactory {
    channel_factory: Arc<dyn ChannelFactory>,
    config: RateLimitServiceConfig,
}

impl GrpcFactory {
    /// Create a factory for the service described by `config`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: RateLimitServiceConfig) -> Result<Self> {
        let channel_factory = GrpcChannelFactory::new(&config)?;
        info!(target_uri = %config.target, "Rate limit service configured");
        Ok(Self::with_channel_factory(config, Arc::new(channel_factory)))
    }

    /// Create a factory using a custom channel factory.
    pub fn with_channel_factory(
        config: RateLimitServiceConfig,
        channel_factory: Arc<dyn ChannelFactory>,
    ) -> Self {
        Self {
            channel_factory,
            config,
        }
    }
}

impl ClientFactory for GrpcFactory {
    fn create(&self, timeout: Option<Duration>) -> Box<dyn Client> {
        debug!(
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Creating rate limit client"
        );
        Box::new(GrpcClient::new(self.channel_factory.create_channel(), timeout))
    }

    fn rate_limit_config(&self) -> Option<&RateLimitServiceConfig> {
        Some(&self.config)
    }
}

/// Build the factory matching `config`: remote when a service is configured,
/// always-allow otherwise.
pub fn factory_from_config(config: &ClientConfig) -> Result<Box<dyn ClientFactory>> {
    match &config.rate_limit_service {
        Some(service) => Ok(Box::new(GrpcFactory::new(service.clone())?)),
        None => {
            info!("No rate limit service configured, rate limiting disabled");
            Ok(Box::new(NullFactory))
        }
    }
}
