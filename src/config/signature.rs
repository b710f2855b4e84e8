/*!
 * Configuration Signatures
 * Immutable value identity derived from resource-relevant configuration
 */

use super::options::VhostOptions;
use serde::Serialize;
use std::fmt;

/// Deterministic identity for a resource-relevant slice of configuration.
///
/// Two configurations with equal signatures are resource-interchangeable:
/// the registry never creates a second instance for a signature while the
/// first is live. Structural equality over normalized fields, not string
/// formatting, so the invariant is independently checkable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ConfigurationSignature {
    kind: &'static str,
    fields: Vec<(&'static str, String)>,
}

impl ConfigurationSignature {
    pub fn builder(kind: &'static str) -> SignatureBuilder {
        SignatureBuilder {
            kind,
            fields: Vec::new(),
        }
    }

    #[inline]
    pub fn kind(&self) -> &str {
        self.kind
    }
}

impl fmt::Display for ConfigurationSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        for (name, value) in &self.fields {
            write!(f, ";{}={}", name, value)?;
        }
        Ok(())
    }
}

pub struct SignatureBuilder {
    kind: &'static str,
    fields: Vec<(&'static str, String)>,
}

impl SignatureBuilder {
    #[must_use]
    pub fn field(mut self, name: &'static str, value: impl ToString) -> Self {
        self.fields.push((name, value.to_string()));
        self
    }

    /// Append a list field; element order is preserved since endpoint
    /// order is meaningful to the remote cache client.
    #[must_use]
    pub fn list_field(mut self, name: &'static str, values: &[String]) -> Self {
        self.fields.push((name, values.join(",")));
        self
    }

    pub fn finish(self) -> ConfigurationSignature {
        ConfigurationSignature {
            kind: self.kind,
            fields: self.fields,
        }
    }
}

/// Signature of the cache stack a vhost requires.
///
/// Everything that determines cache identity participates: path, byte
/// budget, large-value threshold and the remote server list. Hostname
/// deliberately does not, so two vhosts with identical cache settings
/// share one cache.
pub fn cache_signature(options: &VhostOptions) -> ConfigurationSignature {
    ConfigurationSignature::builder("cache")
        .field("path", &options.cache_path)
        .field("budget", options.cache_byte_budget)
        .field("large_threshold", options.large_value_threshold)
        .list_field("remote", &options.remote_servers)
        .finish()
}

/// Signature of the fetcher a vhost requires.
///
/// All fetch-relevant fields are folded in, including the timeout: two
/// configurations differing only in timeout get distinct fetchers rather
/// than silently sharing one with whichever timeout came first.
pub fn fetcher_signature(options: &VhostOptions) -> ConfigurationSignature {
    ConfigurationSignature::builder("fetcher")
        .field("timeout_ms", options.fetch.timeout_ms)
        .field(
            "proxy",
            options.fetch.proxy.as_deref().unwrap_or("direct"),
        )
        .field("tls", format!("{:?}", options.fetch.tls_policy))
        .field("max_inflight", options.fetch.max_inflight)
        .finish()
}

/// Signature of the shared message buffer for a host.
pub fn message_buffer_signature(host_identifier: &str) -> ConfigurationSignature {
    ConfigurationSignature::builder("messages")
        .field("host", host_identifier)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::HostId;

    fn options(host: &str, path: &str) -> VhostOptions {
        VhostOptions::new(HostId::from_identifier(host), path)
    }

    #[test]
    fn equal_configs_equal_signatures() {
        let a = options("a.example:80", "/var/cache/ps");
        let b = options("b.example:80", "/var/cache/ps");
        // hostname is not cache-relevant
        assert_eq!(cache_signature(&a), cache_signature(&b));
    }

    #[test]
    fn budget_difference_changes_signature() {
        let a = options("a.example:80", "/var/cache/ps");
        let b = options("a.example:80", "/var/cache/ps").with_byte_budget(1024);
        assert_ne!(cache_signature(&a), cache_signature(&b));
    }

    #[test]
    fn remote_servers_change_signature() {
        let a = options("a.example:80", "/var/cache/ps");
        let b = options("a.example:80", "/var/cache/ps")
            .with_remote_servers(vec!["memcache1:11211".into()]);
        assert_ne!(cache_signature(&a), cache_signature(&b));
    }

    #[test]
    fn timeout_changes_fetcher_signature() {
        let a = options("a.example:80", "/var/cache/ps");
        let b = options("a.example:80", "/var/cache/ps").with_fetch_timeout_ms(30_000);
        assert_ne!(fetcher_signature(&a), fetcher_signature(&b));
    }

    #[test]
    fn display_is_deterministic() {
        let a = options("a.example:80", "/var/cache/ps");
        assert_eq!(
            cache_signature(&a).to_string(),
            cache_signature(&a).to_string()
        );
    }
}
