//! The decision client contract.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::oneshot;

use super::descriptor::Descriptor;
use super::status::{LimitMetadata, LimitStatus};
use crate::span::Span;

/// Receives the result of a rate limit check.
///
/// `complete` consumes the callbacks, so a client can deliver at most one
/// result per check. Any `FnOnce(LimitStatus, Option<LimitMetadata>)` closure
/// can be used directly.
pub trait RequestCallbacks: Send {
    /// Called once with the decision, unless the check was cancelled.
    fn complete(self: Box<Self>, status: LimitStatus, metadata: Option<LimitMetadata>);
}

impl<F> RequestCallbacks for F
where
    F: FnOnce(LimitStatus, Option<LimitMetadata>) + Send,
{
    fn complete(self: Box<Self>, status: LimitStatus, metadata: Option<LimitMetadata>) {
        (*self)(status, metadata)
    }
}

/// A client that asks a rate limit service whether a request may proceed.
///
/// A client runs at most one check at a time. Calling [`Client::limit`] while
/// a check is outstanding is a caller error; see the implementation for how
/// it is handled. Checks are never queued.
pub trait Client: Send {
    /// Start a check for `descriptors` within `domain`.
    ///
    /// `callbacks` are completed exactly once, synchronously or later from
    /// whatever context the transport delivers on, unless [`Client::cancel`]
    /// is called first. On a successful decision `span` is tagged with
    /// [`TRACE_STATUS`](crate::span::TRACE_STATUS).
    fn limit(
        &mut self,
        callbacks: Box<dyn RequestCallbacks>,
        domain: &str,
        descriptors: &[Descriptor],
        span: Arc<dyn Span>,
    );

    /// Abort the outstanding check, if any. Its callbacks are dropped without
    /// being completed. A no-op when nothing is outstanding.
    fn cancel(&mut self);
}

/// A completed decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub status: LimitStatus,
    pub metadata: Option<LimitMetadata>,
}

/// Run a check and wait for its decision.
///
/// Returns `None` if the client drops the callbacks without completing them.
/// Dropping the returned future before it
/// resolves cancels the outstanding check, leaving the client idle.
pub async fn check(
    client: &mut dyn Client,
    domain: &str,
    descriptors: &[Descriptor],
    span: Arc<dyn Span>,
) -> Option<Decision> {
    let (tx, rx) = oneshot::channel();
    let mut guard = CancelOnDrop {
        client,
        armed: true,
    };

    guard.client.limit(
        Box::new(move |status: LimitStatus, metadata: Option<LimitMetadata>| {
            let _ = tx.send(Decision { status, metadata });
        }),
        domain,
        descriptors,
        span,
    );

    let decision = rx.await.ok();
    guard.armed = false;
    decision
}

/// Cancels the client's outstanding check unless disarmed.
struct CancelOnDrop<'a> {
    client: &'a mut dyn Client,
    armed: bool,
}

impl Drop for CancelOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.client.cancel();
        }
    }
}
