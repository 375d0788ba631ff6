//! Descriptors and request construction.

use std::fmt;
use std::str::FromStr;

use crate::error::ClientError;
use crate::grpc::proto::envoy::extensions::common::ratelimit::v3::{
    rate_limit_descriptor::{Entry, RateLimitOverride},
    RateLimitDescriptor, RateLimitUnit as ProtoUnit,
};
use crate::grpc::RateLimitRequest;

/// A single key/value pair inside a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorEntry {
    pub key: String,
    pub value: String,
}

impl DescriptorEntry {
    /// Create an entry from a key and value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Time unit for a descriptor limit override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitUnit {
    Second,
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl RateLimitUnit {
    /// Lowercase name of the unit, e.g. `minute`.
    pub const fn as_str(self) -> &'static str {
        match self {
            RateLimitUnit::Second => "second",
            RateLimitUnit::Minute => "minute",
            RateLimitUnit::Hour => "hour",
            RateLimitUnit::Day => "day",
            RateLimitUnit::Month => "month",
            RateLimitUnit::Year => "year",
        }
    }

    /// Convert from the proto enum value.
    pub fn from_proto(unit: i32) -> Option<Self> {
        match ProtoUnit::try_from(unit).ok()? {
            ProtoUnit::Second => Some(RateLimitUnit::Second),
            ProtoUnit::Minute => Some(RateLimitUnit::Minute),
            ProtoUnit::Hour => Some(RateLimitUnit::Hour),
            ProtoUnit::Day => Some(RateLimitUnit::Day),
            ProtoUnit::Month => Some(RateLimitUnit::Month),
            ProtoUnit::Year => Some(RateLimitUnit::Year),
            ProtoUnit::Unknown => None,
        }
    }

    /// Convert to the proto enum value.
    pub fn to_proto(self) -> i32 {
        let unit = match self {
            RateLimitUnit::Second => ProtoUnit::Second,
            RateLimitUnit::Minute => ProtoUnit::Minute,
            RateLimitUnit::Hour => ProtoUnit::Hour,
            RateLimitUnit::Day => ProtoUnit::Day,
            RateLimitUnit::Month => ProtoUnit::Month,
            RateLimitUnit::Year => ProtoUnit::Year,
        };
        unit.into()
    }
}

/// A limit the service should apply to a descriptor instead of its own
/// configured limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LimitOverride {
    pub requests_per_unit: u32,
    pub unit: RateLimitUnit,
}

/// An ordered list of key/value entries classifying a request.
///
/// Entry order is significant and duplicate keys are allowed; both are
/// forwarded to the service untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Descriptor {
    pub entries: Vec<DescriptorEntry>,
    pub limit: Option<LimitOverride>,
}

impl Descriptor {
    /// Create a descriptor from key/value pairs, preserving their order.
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| DescriptorEntry::new(k, v))
                .collect(),
            limit: None,
        }
    }

    /// Append an entry.
    pub fn entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push(DescriptorEntry::new(key, value));
        self
    }

    /// Attach a limit override.
    pub fn with_limit(mut self, requests_per_unit: u32, unit: RateLimitUnit) -> Self {
        self.limit = Some(LimitOverride {
            requests_per_unit,
            unit,
        });
        self
    }

    fn to_proto(&self) -> RateLimitDescriptor {
        RateLimitDescriptor {
            entries: self
                .entries
                .iter()
                .map(|e| Entry {
                    key: e.key.clone(),
                    value: e.value.clone(),
                })
                .collect(),
            limit: self.limit.map(|limit| RateLimitOverride {
                requests_per_unit: limit.requests_per_unit,
                unit: limit.unit.to_proto(),
            }),
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entries: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}={}", e.key, e.value))
            .collect();

        write!(f, "{}", entries.join(","))
    }
}

/// Parses `key=value[,key=value...]`.
impl FromStr for Descriptor {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut descriptor = Descriptor::default();

        for pair in s.split(',') {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                ClientError::Config(format!("descriptor entry `{}` is not key=value", pair))
            })?;
            if key.is_empty() {
                return Err(ClientError::Config(format!(
                    "descriptor entry `{}` has an empty key",
                    pair
                )));
            }
            descriptor = descriptor.entry(key, value);
        }

        Ok(descriptor)
    }
}

/// Assemble the wire request for a check.
///
/// Pure and deterministic: descriptor and entry order are preserved, and the
/// domain is passed through unvalidated.
pub fn build_request(domain: &str, descriptors: &[Descriptor]) -> RateLimitRequest {
    build_request_with_hits(domain, descriptors, 0)
}

/// Like [`build_request`], with an explicit hit count. Zero lets the service
/// apply its default of one hit.
pub fn build_request_with_hits(
    domain: &str,
    descriptors: &[Descriptor],
    hits_addend: u32,
) -> RateLimitRequest {
    RateLimitRequest {
        domain: domain.to_string(),
        descriptors: descriptors.iter().map(Descriptor::to_proto).collect(),
        hits_addend,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    fn sample_descriptors() -> Vec<Descriptor> {
        vec![
            Descriptor::new([("source", "client_a"), ("destination", "service_b")]),
            Descriptor::default()
                .entry("path", "/login")
                .entry("path", "/login/mfa")
                .with_limit(5, RateLimitUnit::Minute),
        ]
    }

    #[test]
    fn test_build_request_preserves_order() {
        let request = build_request("edge", &sample_descriptors());

        assert_eq!(request.domain, "edge");
        assert_eq!(request.hits_addend, 0);
        assert_eq!(request.descriptors.len(), 2);

        let first = &request.descriptors[0];
        assert_eq!(first.entries[0].key, "source");
        assert_eq!(first.entries[0].value, "client_a");
        assert_eq!(first.entries[1].key, "destination");
        assert!(first.limit.is_none());

        let second = &request.descriptors[1];
        assert_eq!(second.entries.len(), 2);
        assert_eq!(second.entries[0].value, "/login");
        assert_eq!(second.entries[1].value, "/login/mfa");

        let limit = second.limit.as_ref().unwrap();
        assert_eq!(limit.requests_per_unit, 5);
        assert_eq!(limit.unit, i32::from(ProtoUnit::Minute));
    }

    #[test]
    fn test_build_request_is_deterministic() {
        let descriptors = sample_descriptors();

        let a = build_request("edge", &descriptors).encode_to_vec();
        let b = build_request("edge", &descriptors).encode_to_vec();
        assert_eq!(a, b);

        let reversed: Vec<Descriptor> = descriptors.iter().rev().cloned().collect();
        assert_ne!(a, build_request("edge", &reversed).encode_to_vec());
    }

    #[test]
    fn test_build_request_passes_empty_domain_through() {
        let request = build_request("", &[]);
        assert_eq!(request.domain, "");
        assert!(request.descriptors.is_empty());
    }

    #[test]
    fn test_build_request_with_hits() {
        let request = build_request_with_hits("edge", &sample_descriptors(), 3);
        assert_eq!(request.hits_addend, 3);
    }

    #[test]
    fn test_descriptor_display() {
        let descriptor = Descriptor::new([("key1", "value1"), ("key2", "value2")]);
        assert_eq!(descriptor.to_string(), "key1=value1,key2=value2");
    }

    #[test]
    fn test_descriptor_from_str() {
        let descriptor: Descriptor = "generic_key=login,remote_address=10.0.0.1".parse().unwrap();
        assert_eq!(
            descriptor,
            Descriptor::new([("generic_key", "login"), ("remote_address", "10.0.0.1")])
        );

        // Values may themselves contain '='.
        let descriptor: Descriptor = "header_match=a=b".parse().unwrap();
        assert_eq!(descriptor.entries[0].value, "a=b");
    }

    #[test]
    fn test_descriptor_from_str_rejects_malformed() {
        assert!("no_separator".parse::<Descriptor>().is_err());
        assert!("=value".parse::<Descriptor>().is_err());
    }

    #[test]
    fn test_unit_proto_conversion() {
        for unit in [
            RateLimitUnit::Second,
            RateLimitUnit::Minute,
            RateLimitUnit::Hour,
            RateLimitUnit::Day,
            RateLimitUnit::Month,
            RateLimitUnit::Year,
        ] {
            assert_eq!(RateLimitUnit::from_proto(unit.to_proto()), Some(unit));
        }
        assert_eq!(RateLimitUnit::from_proto(0), None);
        assert_eq!(RateLimitUnit::from_proto(42), None);
    }
}
