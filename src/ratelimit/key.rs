//! Rate limit key extraction policies.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::pipeline::Request;

const FORWARDED_FOR: &str = "X-Forwarded-For";
const REAL_IP: &str = "X-Real-IP";

/// Maps a request to the key its bucket is stored under.
///
/// `None` (or an empty string) means the request is not limited.
/// Implementations must be pure and must not block.
#[derive(Clone)]
pub struct KeyExtractor(Arc<dyn Fn(&Request) -> Option<String> + Send + Sync>);

impl KeyExtractor {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Request) -> Option<String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Extract the key, treating an empty key as a bypass.
    pub fn extract(&self, req: &Request) -> Option<String> {
        (self.0)(req).filter(|key| !key.is_empty())
    }
}

impl Default for KeyExtractor {
    fn default() -> Self {
        KeyPolicy::Ip.into()
    }
}

impl fmt::Debug for KeyExtractor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyExtractor")
    }
}

/// Built-in key policies, selectable from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyPolicy {
    /// Client IP; see [`by_ip`]
    #[default]
    Ip,
    /// Logical service name
    Service,
    /// Service and method pair
    Method,
}

impl From<KeyPolicy> for KeyExtractor {
    fn from(policy: KeyPolicy) -> Self {
        match policy {
            KeyPolicy::Ip => KeyExtractor::new(by_ip),
            KeyPolicy::Service => KeyExtractor::new(by_service),
            KeyPolicy::Method => KeyExtractor::new(by_method),
        }
    }
}

/// Key by service name.
pub fn by_service(req: &Request) -> Option<String> {
    Some(req.service.clone())
}

/// Key by `service/method`.
pub fn by_method(req: &Request) -> Option<String> {
    Some(format!("{}/{}", req.service, req.method))
}

/// Key by client IP address.
///
/// Checks the first entry of `X-Forwarded-For`, then `X-Real-IP`, then the
/// connection address with any port stripped. The first non-empty value
/// wins. Only trust the headers when a reverse proxy in front sets them.
pub fn by_ip(req: &Request) -> Option<String> {
    if let Some(xff) = req.metadata.get(FORWARDED_FOR) {
        let ip = xff.split(',').next().unwrap_or_default().trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    if let Some(real_ip) = req.metadata.get(REAL_IP) {
        let ip = real_ip.trim();
        if !ip.is_empty() {
            return Some(ip.to_string());
        }
    }

    if req.remote_addr.is_empty() {
        return None;
    }
    Some(strip_port(&req.remote_addr))
}

fn strip_port(addr: &str) -> String {
    split_host(addr).unwrap_or(addr).to_string()
}

/// Host part of `host:port` or `[host]:port`. The port is not validated;
/// anything else (no port, unbracketed IPv6) yields `None`.
fn split_host(addr: &str) -> Option<&str> {
    let (host, _port) = addr.rsplit_once(':')?;
    if let Some(bracketed) = host.strip_prefix('[') {
        return bracketed.strip_suffix(']');
    }
    if host.contains([':', '[', ']']) {
        return None;
    }
    Some(host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forwarded_for_takes_first_entry() {
        let req = Request::new("svc", "Get")
            .with_header("X-Forwarded-For", "1.2.3.4, 5.6.7.8")
            .with_header("X-Real-IP", "9.9.9.9")
            .with_remote_addr("10.0.0.1:4000");

        assert_eq!(by_ip(&req), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn test_real_ip_when_forwarded_for_is_blank() {
        let req = Request::new("svc", "Get")
            .with_header("X-Forwarded-For", " , 5.6.7.8")
            .with_header("x-real-ip", " 9.9.9.9 ")
            .with_remote_addr("10.0.0.1:4000");

        assert_eq!(by_ip(&req), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn test_remote_addr_fallback() {
        let req = Request::new("svc", "Get").with_remote_addr("10.0.0.1:4000");
        assert_eq!(by_ip(&req), Some("10.0.0.1".to_string()));

        let req = Request::new("svc", "Get").with_remote_addr("[::1]:4000");
        assert_eq!(by_ip(&req), Some("::1".to_string()));

        let req = Request::new("svc", "Get").with_remote_addr("10.0.0.1");
        assert_eq!(by_ip(&req), Some("10.0.0.1".to_string()));

        let req = Request::new("svc", "Get").with_remote_addr("fe80::1");
        assert_eq!(by_ip(&req), Some("fe80::1".to_string()));

        let req = Request::new("svc", "Get").with_remote_addr("localhost:8080");
        assert_eq!(by_ip(&req), Some("localhost".to_string()));
    }

    #[test]
    fn test_remote_addr_port_is_not_validated() {
        let req = Request::new("svc", "Get").with_remote_addr("host:abc");
        assert_eq!(by_ip(&req), Some("host".to_string()));

        let req = Request::new("svc", "Get").with_remote_addr("[fe80::1%eth0]:80");
        assert_eq!(by_ip(&req), Some("fe80::1%eth0".to_string()));

        let req = Request::new("svc", "Get").with_remote_addr("[::1]");
        assert_eq!(by_ip(&req), Some("[::1]".to_string()));
    }

    #[test]
    fn test_no_ip_bypasses() {
        let req = Request::new("svc", "Get");
        assert_eq!(by_ip(&req), None);
        assert_eq!(KeyExtractor::default().extract(&req), None);
    }

    #[test]
    fn test_service_and_method_keys() {
        let req = Request::new("UserService", "GetUser");
        assert_eq!(by_service(&req), Some("UserService".to_string()));
        assert_eq!(by_method(&req), Some("UserService/GetUser".to_string()));
    }

    #[test]
    fn test_empty_key_is_bypass() {
        let extractor = KeyExtractor::new(|_| Some(String::new()));
        assert_eq!(extractor.extract(&Request::new("svc", "Get")), None);

        let extractor: KeyExtractor = KeyPolicy::Service.into();
        assert_eq!(extractor.extract(&Request::new("", "Get")), None);
    }

    #[test]
    fn test_policy_deserializes_lowercase() {
        let policy: KeyPolicy = serde_yaml::from_str("method").unwrap();
        assert_eq!(policy, KeyPolicy::Method);
    }
}
