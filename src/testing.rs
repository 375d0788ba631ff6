//! Test doubles shared by the unit tests.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic::{Request, Response, Status};

use crate::grpc::proto::envoy::config::core::v3::HeaderValue;
use crate::grpc::proto::envoy::service::ratelimit::v3::{
    rate_limit_response::Code,
    rate_limit_service_server::{RateLimitService, RateLimitServiceServer},
};
use crate::grpc::{
    CallHandle, RateLimitChannel, RateLimitRequest, RateLimitResponse, RpcCompletion, RpcResult,
};
use crate::ratelimit::{LimitMetadata, LimitStatus, RequestCallbacks};
use crate::span::Span;

/// A response carrying only an overall code.
pub fn response(code: Code) -> RateLimitResponse {
    RateLimitResponse {
        overall_code: code.into(),
        ..Default::default()
    }
}

/// A response carrying an overall code and one response header.
pub fn response_with_header(code: Code, key: &str, value: &str) -> RateLimitResponse {
    RateLimitResponse {
        overall_code: code.into(),
        response_headers_to_add: vec![HeaderValue {
            key: key.to_string(),
            value: value.to_string(),
        }],
        ..Default::default()
    }
}

struct PendingCall {
    request: RateLimitRequest,
    timeout: Option<Duration>,
    completion: Option<RpcCompletion>,
    cancelled: Arc<AtomicBool>,
}

/// A scripted channel. Calls stay pending until the test delivers a result.
///
/// Cancellation is recorded but, like a best-effort transport, does not stop
/// the test from delivering a late result afterwards.
#[derive(Default)]
pub struct FakeChannel {
    calls: Mutex<Vec<PendingCall>>,
    immediate: Mutex<Option<RateLimitResponse>>,
}

impl FakeChannel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A channel that completes every call with `response` before `call` returns.
    pub fn immediate(response: RateLimitResponse) -> Arc<Self> {
        let channel = Self::default();
        *channel.immediate.lock() = Some(response);
        Arc::new(channel)
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn request(&self, index: usize) -> RateLimitRequest {
        self.calls.lock()[index].request.clone()
    }

    pub fn timeout(&self, index: usize) -> Option<Duration> {
        self.calls.lock()[index].timeout
    }

    pub fn was_cancelled(&self, index: usize) -> bool {
        self.calls.lock()[index].cancelled.load(Ordering::SeqCst)
    }

    /// Deliver a result for call `index`, even if it was cancelled.
    pub fn deliver(&self, index: usize, result: RpcResult) {
        let completion = self.calls.lock()[index]
            .completion
            .take()
            .expect("result already delivered");
        completion(result);
    }
}

impl RateLimitChannel for FakeChannel {
    fn call(
        &self,
        request: RateLimitRequest,
        timeout: Option<Duration>,
        on_complete: RpcCompletion,
    ) -> Box<dyn CallHandle> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let immediate = self.immediate.lock().clone();

        let completion = match immediate {
            Some(response) => {
                on_complete(Ok(response));
                None
            }
            None => Some(on_complete),
        };

        self.calls.lock().push(PendingCall {
            request,
            timeout,
            completion,
            cancelled: cancelled.clone(),
        });

        Box::new(FakeCallHandle { cancelled })
    }
}

struct FakeCallHandle {
    cancelled: Arc<AtomicBool>,
}

impl CallHandle for FakeCallHandle {
    fn cancel(self: Box<Self>) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

/// A span that remembers every tag set on it.
#[derive(Default)]
pub struct RecordingSpan {
    tags: Mutex<Vec<(String, String)>>,
}

impl RecordingSpan {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        self.tags.lock().clone()
    }
}

impl Span for RecordingSpan {
    fn set_tag(&self, key: &str, value: &str) {
        self.tags.lock().push((key.to_string(), value.to_string()));
    }
}

/// Collects every completion delivered to callbacks it hands out.
#[derive(Clone, Default)]
pub struct CompletionLog {
    completions: Arc<Mutex<Vec<(LimitStatus, Option<LimitMetadata>)>>>,
}

impl CompletionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn callbacks(&self) -> Box<dyn RequestCallbacks> {
        let completions = self.completions.clone();
        Box::new(move |status: LimitStatus, metadata: Option<LimitMetadata>| {
            completions.lock().push((status, metadata));
        })
    }

    pub fn completions(&self) -> Vec<(LimitStatus, Option<LimitMetadata>)> {
        self.completions.lock().clone()
    }

    pub fn statuses(&self) -> Vec<LimitStatus> {
        self.completions.lock().iter().map(|(s, _)| *s).collect()
    }
}

struct FakeRateLimitService {
    code: Code,
    delay: Duration,
}

#[tonic::async_trait]
impl RateLimitService for FakeRateLimitService {
    async fn should_rate_limit(
        &self,
        request: Request<RateLimitRequest>,
    ) -> Result<Response<RateLimitResponse>, Status> {
        tokio::time::sleep(self.delay).await;

        let req = request.into_inner();
        if req.domain.is_empty() {
            return Err(Status::invalid_argument("domain is required"));
        }

        Ok(Response::new(response_with_header(
            self.code,
            "x-ratelimit-limit",
            "10",
        )))
    }
}

/// Serve a fake rate limit service on an ephemeral local port.
///
/// Every request with a non-empty domain is answered with `code` and an
/// `x-ratelimit-limit: 10` response header after `delay`.
pub async fn spawn_service(code: Code, delay: Duration) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        Server::builder()
            .add_service(RateLimitServiceServer::new(FakeRateLimitService { code, delay }))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .unwrap();
    });

    addr
}
