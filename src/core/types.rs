/*!
 * Core Types
 * Shared identifiers and size aliases used across the factory
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte count
pub type Size = usize;

/// Identifier for one virtual host, conventionally "hostname:port".
///
/// Shared-memory segment names are derived from this so that each vhost
/// gets its own segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostId(String);

impl HostId {
    pub fn new(hostname: impl Into<String>, port: u16) -> Self {
        Self(format!("{}:{}", hostname.into(), port))
    }

    /// Build from an already-joined "hostname:port" identifier
    pub fn from_identifier(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Segment name for this host with the given purpose suffix
    pub fn segment_name(&self, purpose: &str) -> String {
        format!("{}/{}", self.0, purpose)
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_id_formats_hostname_and_port() {
        let id = HostId::new("www.example.com", 8080);
        assert_eq!(id.as_str(), "www.example.com:8080");
        assert_eq!(id.segment_name("messages"), "www.example.com:8080/messages");
    }
}
