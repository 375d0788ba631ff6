//! Decision client backed by a remote rate limit service.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use super::client::{Client, RequestCallbacks};
use super::descriptor::{build_request, Descriptor};
use super::status::{decision_from_response, LimitStatus};
use crate::grpc::{CallHandle, RateLimitChannel, RpcResult};
use crate::span::{Span, TRACE_OK, TRACE_OVER_LIMIT, TRACE_STATUS};

/// The per-client call slot.
enum State {
    Idle,
    InFlight(InFlight),
}

struct InFlight {
    call_id: u64,
    callbacks: Box<dyn RequestCallbacks>,
    span: Arc<dyn Span>,
    // Only `None` between issuing the call and the channel returning its handle.
    handle: Option<Box<dyn CallHandle>>,
}

/// A [`Client`] that issues one `ShouldRateLimit` call per check.
///
/// Only one check may be outstanding at a time. Calling `limit` while a check
/// is in flight completes the new callbacks immediately with
/// [`LimitStatus::Error`] and leaves the outstanding check untouched.
///
/// Completions arrive on whatever context the channel delivers them. A
/// completion for a check that was cancelled, superseded, or whose client was
/// dropped is discarded. Dropping the client cancels any outstanding check.
pub struct GrpcClient {
    channel: Arc<dyn RateLimitChannel>,
    timeout: Option<Duration>,
    state: Arc<Mutex<State>>,
    next_call_id: u64,
}

impl GrpcClient {
    /// Create a client on `channel`. A `timeout` of `None` uses the channel's default.
    pub fn new(channel: Arc<dyn RateLimitChannel>, timeout: Option<Duration>) -> Self {
        Self {
            channel,
            timeout,
            state: Arc::new(Mutex::new(State::Idle)),
            next_call_id: 0,
        }
    }

    /// Whether no check is outstanding.
    pub fn is_idle(&self) -> bool {
        matches!(*self.state.lock(), State::Idle)
    }
}

impl Client for GrpcClient {
    fn limit(
        &mut self,
        callbacks: Box<dyn RequestCallbacks>,
        domain: &str,
        descriptors: &[Descriptor],
        span: Arc<dyn Span>,
    ) {
        if !self.is_idle() {
            error!(
                domain = %domain,
                "Rate limit check requested while another is outstanding, rejecting"
            );
            callbacks.complete(LimitStatus::Error, None);
            return;
        }

        let request = build_request(domain, descriptors);

        self.next_call_id += 1;
        let call_id = self.next_call_id;

        debug!(
            call_id,
            domain = %domain,
            descriptor_count = descriptors.len(),
            timeout_ms = self.timeout.map(|t| t.as_millis() as u64),
            "Issuing rate limit check"
        );

        // The slot is filled before the call so a channel that completes
        // synchronously finds the callbacks.
        *self.state.lock() = State::InFlight(InFlight {
            call_id,
            callbacks,
            span,
            handle: None,
        });

        let slot = Arc::downgrade(&self.state);
        let handle = self.channel.call(
            request,
            self.timeout,
            Box::new(move |result| on_complete(&slot, call_id, result)),
        );

        let mut state = self.state.lock();
        match &mut *state {
            State::InFlight(in_flight) if in_flight.call_id == call_id => {
                in_flight.handle = Some(handle);
            }
            // Already completed; the handle refers to a finished call.
            _ => trace!(call_id, "Rate limit check completed synchronously"),
        }
    }

    fn cancel(&mut self) {
        let previous = std::mem::replace(&mut *self.state.lock(), State::Idle);

        if let State::InFlight(in_flight) = previous {
            debug!(call_id = in_flight.call_id, "Cancelling rate limit check");
            if let Some(handle) = in_flight.handle {
                handle.cancel();
            }
        }
    }
}

impl Drop for GrpcClient {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn on_complete(slot: &Weak<Mutex<State>>, call_id: u64, result: RpcResult) {
    let Some(state) = slot.upgrade() else {
        trace!(call_id, "Discarding rate limit result for dropped client");
        return;
    };

    let in_flight = {
        let mut guard = state.lock();
        match std::mem::replace(&mut *guard, State::Idle) {
            State::InFlight(in_flight) if in_flight.call_id == call_id => in_flight,
            other => {
                *guard = other;
                trace!(call_id, "Discarding rate limit result for cancelled check");
                return;
            }
        }
    };

    let (status, metadata) = match result {
        Ok(response) => decision_from_response(response),
        Err(status) => {
            warn!(
                call_id,
                grpc_code = ?status.code(),
                message = %status.message(),
                "Rate limit check failed"
            );
            (LimitStatus::Error, None)
        }
    };

    match status {
        LimitStatus::Ok => in_flight.span.set_tag(TRACE_STATUS, TRACE_OK),
        LimitStatus::OverLimit => in_flight.span.set_tag(TRACE_STATUS, TRACE_OVER_LIMIT),
        LimitStatus::Error => {}
    }

    debug!(call_id, status = %status, "Rate limit check completed");
    in_flight.callbacks.complete(status, metadata);
}
