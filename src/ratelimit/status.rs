//! Rate limit decisions and their translation from service responses.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use super::descriptor::RateLimitUnit;
use crate::grpc::proto::envoy::config::core::v3::HeaderValue;
use crate::grpc::proto::envoy::service::ratelimit::v3::rate_limit_response::{
    Code, DescriptorStatus,
};
use crate::grpc::RateLimitResponse;

/// Outcome of a rate limit check.
///
/// `Error` covers every local or transport failure (timeouts, unreachable
/// service, malformed responses). It is never conflated with `OverLimit`, so
/// callers decide for themselves whether to fail open or closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStatus {
    Ok,
    OverLimit,
    Error,
}

impl LimitStatus {
    /// Stable snake_case name, as used in span tags and JSON output.
    pub const fn as_str(self) -> &'static str {
        match self {
            LimitStatus::Ok => "ok",
            LimitStatus::OverLimit => "over_limit",
            LimitStatus::Error => "error",
        }
    }

    fn from_code(code: i32) -> Self {
        match Code::try_from(code) {
            Ok(Code::Ok) => LimitStatus::Ok,
            Ok(Code::OverLimit) => LimitStatus::OverLimit,
            Ok(Code::Unknown) | Err(_) => LimitStatus::Error,
        }
    }
}

impl fmt::Display for LimitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A header the service asked to have propagated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

impl From<HeaderValue> for Header {
    fn from(header: HeaderValue) -> Self {
        Self {
            key: header.key,
            value: header.value,
        }
    }
}

/// The limit that applied to a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentLimit {
    pub name: String,
    pub requests_per_unit: u32,
    pub unit: Option<RateLimitUnit>,
}

/// Per-descriptor result reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DescriptorOutcome {
    pub status: LimitStatus,
    pub current_limit: Option<CurrentLimit>,
    pub limit_remaining: u32,
    pub duration_until_reset: Option<Duration>,
}

impl From<DescriptorStatus> for DescriptorOutcome {
    fn from(status: DescriptorStatus) -> Self {
        Self {
            status: LimitStatus::from_code(status.code),
            current_limit: status.current_limit.map(|limit| CurrentLimit {
                name: limit.name,
                requests_per_unit: limit.requests_per_unit,
                unit: RateLimitUnit::from_proto(limit.unit),
            }),
            limit_remaining: status.limit_remaining,
            duration_until_reset: status
                .duration_until_reset
                .and_then(|d| Duration::try_from(d).ok()),
        }
    }
}

/// Extra information returned alongside a successful decision.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LimitMetadata {
    /// Headers to add to the downstream response (e.g. quota headers)
    pub response_headers: Vec<Header>,
    /// Headers to add to the request forwarded upstream
    pub request_headers: Vec<Header>,
    /// One entry per descriptor, in request order
    pub statuses: Vec<DescriptorOutcome>,
}

impl LimitMetadata {
    /// Look up a response header by name, ignoring ASCII case.
    pub fn response_header(&self, key: &str) -> Option<&str> {
        self.response_headers
            .iter()
            .find(|h| h.key.eq_ignore_ascii_case(key))
            .map(|h| h.value.as_str())
    }

    fn is_empty(&self) -> bool {
        self.response_headers.is_empty()
            && self.request_headers.is_empty()
            && self.statuses.is_empty()
    }
}

/// Translate a service response into a decision.
///
/// The overall decision comes from `overall_code` alone; per-descriptor
/// statuses are reported as metadata but never aggregated. A response whose
/// overall code is missing or unrecognised is treated as malformed.
pub(crate) fn decision_from_response(
    response: RateLimitResponse,
) -> (LimitStatus, Option<LimitMetadata>) {
    let status = LimitStatus::from_code(response.overall_code);
    if status == LimitStatus::Error {
        warn!(
            overall_code = response.overall_code,
            "Rate limit service returned no usable overall code"
        );
        return (LimitStatus::Error, None);
    }

    let metadata = LimitMetadata {
        response_headers: response
            .response_headers_to_add
            .into_iter()
            .map(Header::from)
            .collect(),
        request_headers: response
            .request_headers_to_add
            .into_iter()
            .map(Header::from)
            .collect(),
        statuses: response
            .statuses
            .into_iter()
            .map(DescriptorOutcome::from)
            .collect(),
    };

    (status, (!metadata.is_empty()).then_some(metadata))
}
