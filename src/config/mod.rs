/*!
 * Configuration Module
 * Option structs and signature derivation
 */

pub mod options;
pub mod signature;

pub use options::{FactoryOptions, FetchOptions, TlsPolicy, VhostOptions};
pub use signature::{
    cache_signature, fetcher_signature, message_buffer_signature, ConfigurationSignature,
};
