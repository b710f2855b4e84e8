/*!
 * Registry Module
 * Signature-keyed sharing of caches, fetchers and message buffers
 */

pub mod registry;

pub use registry::ResourceRegistry;
