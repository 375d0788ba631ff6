//! Async RPC channel abstraction and its tonic-backed implementation.
//!
//! A [`RateLimitChannel`] accepts a request together with a completion
//! callback and returns a [`CallHandle`] that can abort the call. The
//! decision clients only ever talk to this trait, so the transport can be
//! swapped for a scripted fake in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};
use tracing::{debug, trace};

use super::proto::envoy::service::ratelimit::v3::rate_limit_service_client::RateLimitServiceClient;
use super::proto::envoy::service::ratelimit::v3::{RateLimitRequest, RateLimitResponse};
use crate::config::RateLimitServiceConfig;
use crate::error::{ClientError, Result};

/// Outcome of a single rate limit RPC as delivered by a channel.
pub type RpcResult = std::result::Result<RateLimitResponse, Status>;

/// Callback invoked by a channel when a call finishes, successfully or not.
///
/// Channels must invoke it exactly once, except that it is dropped without
/// being invoked when the call is cancelled through its [`CallHandle`].
pub type RpcCompletion = Box<dyn FnOnce(RpcResult) + Send + 'static>;

/// Handle to an outstanding call issued on a [`RateLimitChannel`].
pub trait CallHandle: Send {
    /// Abort the call. Best-effort: a completion racing with the abort may
    /// still be delivered, so callers must be prepared to discard it.
    fn cancel(self: Box<Self>);
}

/// An asynchronous RPC channel to a rate limit service.
pub trait RateLimitChannel: Send + Sync {
    /// Issue a `ShouldRateLimit` call.
    ///
    /// `timeout` of `None` means the channel's own default applies. The
    /// completion may be invoked on any thread, and may even be invoked
    /// before this method returns.
    fn call(
        &self,
        request: RateLimitRequest,
        timeout: Option<Duration>,
        on_complete: RpcCompletion,
    ) -> Box<dyn CallHandle>;
}

/// Builds fresh channels for newly created decision clients.
pub trait ChannelFactory: Send + Sync {
    /// Create a channel for exclusive use by one client.
    fn create_channel(&self) -> Arc<dyn RateLimitChannel>;
}

/// A [`RateLimitChannel`] backed by a tonic gRPC client.
///
/// Each call runs as its own task on the configured runtime. Timeouts are
/// enforced locally and surface as `DEADLINE_EXCEEDED`. A call whose task is
/// dropped before finishing, for example because the runtime shut down,
/// completes with `CANCELLED`.
#[derive(Clone)]
pub struct GrpcChannel {
    client: RateLimitServiceClient<Channel>,
    runtime: Handle,
    default_timeout: Option<Duration>,
}

impl GrpcChannel {
    /// Wrap an existing tonic channel.
    pub fn new(channel: Channel, runtime: Handle, default_timeout: Option<Duration>) -> Self {
        Self {
            client: RateLimitServiceClient::new(channel),
            runtime,
            default_timeout,
        }
    }
}

impl RateLimitChannel for GrpcChannel {
    fn call(
        &self,
        request: RateLimitRequest,
        timeout: Option<Duration>,
        on_complete: RpcCompletion,
    ) -> Box<dyn CallHandle> {
        let mut client = self.client.clone();
        let timeout = timeout.or(self.default_timeout);
        let cancelled = Arc::new(AtomicBool::new(false));
        let completion = PendingCompletion {
            completion: Some(on_complete),
            cancelled: cancelled.clone(),
        };

        let task = self.runtime.spawn(async move {
            let started = Instant::now();
            let domain = request.domain.clone();

            let mut request = Request::new(request);
            let result = match timeout {
                Some(limit) => {
                    request.set_timeout(limit);
                    match tokio::time::timeout(limit, client.should_rate_limit(request)).await {
                        Ok(result) => result,
                        Err(_) => Err(Status::deadline_exceeded(format!(
                            "rate limit call exceeded {}ms",
                            limit.as_millis()
                        ))),
                    }
                }
                None => client.should_rate_limit(request).await,
            };

            trace!(
                domain = %domain,
                elapsed_ms = started.elapsed().as_millis() as u64,
                success = result.is_ok(),
                "Rate limit call finished"
            );

            completion.complete(result.map(|response| response.into_inner()));
        });

        Box::new(GrpcCallHandle { task, cancelled })
    }
}

/// Completion owned by a call's task.
///
/// Dropped unfinished, it reports `CANCELLED` unless the call was cancelled
/// through its handle.
struct PendingCompletion {
    completion: Option<RpcCompletion>,
    cancelled: Arc<AtomicBool>,
}

impl PendingCompletion {
    fn complete(mut self, result: RpcResult) {
        if let Some(completion) = self.completion.take() {
            completion(result);
        }
    }
}

impl Drop for PendingCompletion {
    fn drop(&mut self) {
        let Some(completion) = self.completion.take() else {
            return;
        };
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }

        debug!("Rate limit call dropped before completing");
        completion(Err(Status::cancelled(
            "rate limit call dropped before completing",
        )));
    }
}

struct GrpcCallHandle {
    task: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl CallHandle for GrpcCallHandle {
    fn cancel(self: Box<Self>) {
        // Disarm first so the aborted task drops its completion silently.
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

/// Creates lazily connected [`GrpcChannel`]s for one rate limit service.
pub struct GrpcChannelFactory {
    endpoint: Endpoint,
    runtime: Handle,
    default_timeout: Option<Duration>,
}

impl GrpcChannelFactory {
    /// Validate the service configuration and capture the current tokio runtime.
    ///
    /// Must be called from within a tokio runtime; channels created later
    /// run their calls on that runtime.
    pub fn new(config: &RateLimitServiceConfig) -> Result<Self> {
        let endpoint = Endpoint::from_shared(config.target.clone())
            .map_err(ClientError::InvalidEndpoint)?
            .connect_timeout(config.connect_timeout());
        let runtime = Handle::try_current().map_err(|e| ClientError::Runtime(e.to_string()))?;

        Ok(Self {
            endpoint,
            runtime,
            default_timeout: config.timeout(),
        })
    }
}

impl ChannelFactory for GrpcChannelFactory {
    fn create_channel(&self) -> Arc<dyn RateLimitChannel> {
        // connect_lazy spawns the connection driver, which needs a runtime context.
        let _guard = self.runtime.enter();
        let channel = self.endpoint.connect_lazy();

        debug!(target_uri = %self.endpoint.uri(), "Created rate limit channel");

        Arc::new(GrpcChannel::new(
            channel,
            self.runtime.clone(),
            self.default_timeout,
        ))
    }
}
