//! Rate limit decision clients.

mod client;
mod descriptor;
mod factory;
mod grpc_client;
mod null;
mod status;

pub use client::{check, Client, Decision, RequestCallbacks};
pub use descriptor::{
    build_request, build_request_with_hits, Descriptor, DescriptorEntry, LimitOverride,
    RateLimitUnit,
};
pub use factory::{factory_from_config, ClientFactory, GrpcFactory};
pub use grpc_client::GrpcClient;
pub use null::{NullClient, NullFactory};
pub use status::{CurrentLimit, DescriptorOutcome, Header, LimitMetadata, LimitStatus};
