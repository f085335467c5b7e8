//! Data model shared by every stage of a refresh cycle.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// `"ip_or_host:port"`, as configured or produced by the address updater.
pub type HostAddress = String;

/// One parsed exposition line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub index: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(index: impl Into<String>, value: f64) -> Self {
        Self {
            index: index.into(),
            labels: BTreeMap::new(),
            value,
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Samples returned by one host during one cycle, in line order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleBatch {
    pub host: HostAddress,
    pub samples: Vec<Sample>,
}

impl SampleBatch {
    pub fn new(host: impl Into<HostAddress>, samples: Vec<Sample>) -> Self {
        Self {
            host: host.into(),
            samples,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Lignes brutes d'un hôte, avant parsing (filtrées mais pas encore décodées)
#[derive(Debug, Clone)]
pub struct RawBatch {
    pub host: HostAddress,
    pub lines: Vec<String>,
}

/// Strip the port from a host address.
///
/// `"192.168.10.213:10000"` gives `"192.168.10.213"`, `"[::1]:9100"` gives
/// `"::1"`. An address without a port (including a bare IPv6 literal) comes
/// back unchanged.
pub fn convert_to_ip(addr: &str) -> String {
    let addr = addr.trim();
    if let Some(rest) = addr.strip_prefix('[') {
        if let Some((ip, _)) = rest.split_once(']') {
            return ip.to_string();
        }
        return addr.to_string();
    }

    match addr.split_once(':') {
        // plus d'un ':' => IPv6 nue, pas de port à retirer
        Some((host, port)) if !port.contains(':') => host.to_string(),
        _ => addr.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_to_ip() {
        assert_eq!(convert_to_ip("192.168.10.213:10000"), "192.168.10.213");
        assert_eq!(convert_to_ip(""), "");
        assert_eq!(convert_to_ip("some.host"), "some.host");
        assert_eq!(convert_to_ip("some.host:9100"), "some.host");
    }

    #[test]
    fn test_convert_to_ip_ipv6() {
        assert_eq!(convert_to_ip("[::1]:9100"), "::1");
        assert_eq!(convert_to_ip("fe80::1"), "fe80::1");
    }

    #[test]
    fn test_sample_builder() {
        let s = Sample::new("some_index", 1.5).with_label("app_id", "a1");
        assert_eq!(s.label("app_id"), Some("a1"));
        assert_eq!(s.label("missing"), None);
    }
}
