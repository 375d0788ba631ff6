//! Client for Envoy-compatible global rate limit services.
//!
//! A [`ClientFactory`](ratelimit::ClientFactory) hands out decision
//! [`Client`](ratelimit::Client)s. Each client asks the remote service whether
//! a request described by a domain and a list of descriptors should be
//! allowed, and reports the decision through a one-shot callback. When no
//! service is configured the null factory allows everything.

pub mod config;
pub mod error;
pub mod grpc;
pub mod ratelimit;
pub mod span;

#[cfg(test)]
mod testing;

pub use ratelimit::{
    check, factory_from_config, Client, ClientFactory, Decision, Descriptor, LimitMetadata,
    LimitStatus, RequestCallbacks,
};
pub use span::Span;
