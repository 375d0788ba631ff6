//! Always-allow client and factory for when rate limiting is disabled.

use std::sync::Arc;
use std::time::Duration;

use super::client::{Client, RequestCallbacks};
use super::descriptor::Descriptor;
use super::factory::ClientFactory;
use super::status::LimitStatus;
use crate::config::RateLimitServiceConfig;
use crate::span::Span;

/// A [`Client`] that allows every request.
///
/// `limit` completes with [`LimitStatus::Ok`] before it returns and never
/// touches the span.
#[derive(Debug, Default)]
pub struct NullClient;

impl Client for NullClient {
    fn limit(
        &mut self,
        callbacks: Box<dyn RequestCallbacks>,
        _domain: &str,
        _descriptors: &[Descriptor],
        _span: Arc<dyn Span>,
    ) {
        callbacks.complete(LimitStatus::Ok, None);
    }

    fn cancel(&mut self) {}
}

/// A [`ClientFactory`] producing [`NullClient`]s.
#[derive(Debug, Default)]
pub struct NullFactory;

impl ClientFactory for NullFactory {
    fn create(&self, _timeout: Option<Duration>) -> Box<dyn Client> {
        Box::new(NullClient)
    }

    fn rate_limit_config(&self) -> Option<&RateLimitServiceConfig> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::check;
    use crate::testing::{CompletionLog, RecordingSpan};

    #[test]
    fn test_completes_synchronously_with_ok() {
        let mut client = NullClient;
        let log = CompletionLog::new();
        let span = RecordingSpan::new();

        client.limit(
            log.callbacks(),
            "edge",
            &[Descriptor::new([("generic_key", "login")])],
            span.clone(),
        );

        assert_eq!(log.completions(), vec![(LimitStatus::Ok, None)]);
        assert!(span.tags().is_empty());
    }

    #[test]
    fn test_empty_input_is_allowed() {
        let mut client = NullClient;
        let log = CompletionLog::new();

        client.limit(log.callbacks(), "", &[], RecordingSpan::new());

        assert_eq!(log.completions(), vec![(LimitStatus::Ok, None)]);
    }

    #[test]
    fn test_cancel_is_noop() {
        let mut client = NullClient;
        let log = CompletionLog::new();

        client.cancel();
        client.limit(log.callbacks(), "edge", &[], RecordingSpan::new());
        client.cancel();

        assert_eq!(log.statuses(), vec![LimitStatus::Ok]);
    }

    #[test]
    fn test_factory_has_no_config() {
        let factory = NullFactory;
        assert!(factory.rate_limit_config().is_none());

        let mut client = factory.create(Some(Duration::from_millis(5)));
        let log = CompletionLog::new();
        client.limit(log.callbacks(), "edge", &[], RecordingSpan::new());

        assert_eq!(log.statuses(), vec![LimitStatus::Ok]);
    }

    #[tokio::test]
    async fn test_check_resolves_immediately() {
        let mut client = NullClient;

        let decision = check(&mut client, "edge", &[], RecordingSpan::new())
            .await
            .unwrap();

        assert_eq!(decision.status, LimitStatus::Ok);
        assert_eq!(decision.metadata, None);
    }
}
