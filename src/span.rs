//! Tracing span integration.
//!
//! Decision clients annotate the caller's span with the outcome of a
//! successful check. The span is an abstract capability so any tracing
//! backend can be plugged in; [`tracing::Span`] is supported out of the box.

use tracing::debug;

/// Tag key recording the rate limit decision.
pub const TRACE_STATUS: &str = "ratelimit_status";
/// Tag value for a request that exceeded its limit.
pub const TRACE_OVER_LIMIT: &str = "over_limit";
/// Tag value for a request within its limit.
pub const TRACE_OK: &str = "ok";

/// A tracing span that accepts string tags.
pub trait Span: Send + Sync {
    /// Attach a tag to the span.
    fn set_tag(&self, key: &str, value: &str);
}

impl Span for tracing::Span {
    /// Records the tag as a span field when the span declared it (for example
    /// `ratelimit_status = tracing::field::Empty`), and always emits a debug
    /// event inside the span so the tag is visible either way.
    fn set_tag(&self, key: &str, value: &str) {
        if self.has_field(key) {
            self.record(key, value);
        }
        self.in_scope(|| debug!(tag.key = key, tag.value = value, "Span tag set"));
    }
}

/// A span that discards all tags.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSpan;

impl Span for NoopSpan {
    fn set_tag(&self, _key: &str, _value: &str) {}
}
