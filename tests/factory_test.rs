/*!
 * Factory Tests
 * End-to-end lifecycle, sharing and teardown scenarios
 */

use pretty_assertions::{assert_eq, assert_ne};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use vhost_factory::cache::CacheBackend;
use vhost_factory::fetch::{FetchError, FetchRequest, FetchResponse, FetchTransport};
use vhost_factory::{
    FactoryOptions, HostId, ProcessState, ResourceFactory, SharedSegmentRuntime, VhostOptions,
};

struct StaticTransport;

impl FetchTransport for StaticTransport {
    fn fetch(
        &self,
        request: &FetchRequest,
        _timeout_ms: u64,
    ) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse {
            status: 200,
            body: request.url.as_bytes().to_vec(),
        })
    }
}

fn factory(runtime: &Arc<SharedSegmentRuntime>) -> ResourceFactory {
    let _ = env_logger::builder().is_test(true).try_init();
    ResourceFactory::new(
        FactoryOptions::new(HostId::from_identifier("server.example:80")),
        Arc::clone(runtime),
        Arc::new(StaticTransport),
    )
}

fn vhost(host: &str, path: &str) -> VhostOptions {
    VhostOptions::new(HostId::from_identifier(host), path).with_byte_budget(4096)
}

#[test]
#[serial]
fn root_then_child_in_one_process() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);

    factory.root_init().unwrap();
    assert!(factory.is_root_process());
    assert_eq!(factory.state(), ProcessState::RootInitialized);

    // fork may make one process see both calls; child status wins
    factory.child_init().unwrap();
    assert_eq!(factory.state(), ProcessState::ChildInitialized);
    assert!(!factory.is_root_process());

    factory.shutdown().unwrap();
    assert_eq!(factory.state(), ProcessState::ShutDown);
}

#[test]
#[serial]
fn identical_configs_share_cache_identity() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();
    factory.child_init().unwrap();

    // Same cache-relevant settings, different hostnames
    let ctx_a = factory
        .make_server_context(vhost("a.example:80", "/var/cache/ps"))
        .unwrap();
    let ctx_b = factory
        .make_server_context(vhost("b.example:80", "/var/cache/ps"))
        .unwrap();

    let cache_a = factory.get_or_create_cache(&ctx_a).unwrap();
    let cache_b = factory.get_or_create_cache(&ctx_b).unwrap();
    assert!(Arc::ptr_eq(&cache_a, &cache_b));
    assert_eq!(factory.cache_count(), 1);

    factory.shutdown().unwrap();
}

#[test]
#[serial]
fn different_budgets_get_independent_segments() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();
    factory.child_init().unwrap();

    let ctx_a = factory
        .make_server_context(vhost("a.example:80", "/var/cache/ps"))
        .unwrap();
    let ctx_b = factory
        .make_server_context(
            vhost("b.example:80", "/var/cache/ps").with_byte_budget(8192),
        )
        .unwrap();

    let cache_a = factory.get_or_create_cache(&ctx_a).unwrap();
    let cache_b = factory.get_or_create_cache(&ctx_b).unwrap();
    assert!(!Arc::ptr_eq(&cache_a, &cache_b));
    assert_eq!(factory.cache_count(), 2);

    cache_a.put("k", b"only in a".to_vec());
    assert_eq!(cache_b.get("k"), None);

    factory.shutdown().unwrap();
}

#[test]
#[serial]
fn different_remote_endpoints_get_independent_caches() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();
    factory.child_init().unwrap();

    let ctx_a = factory
        .make_server_context(vhost("a.example:80", "/var/cache/ps"))
        .unwrap();
    let ctx_b = factory
        .make_server_context(
            vhost("b.example:80", "/var/cache/ps")
                .with_remote_servers(vec!["memcache1:11211".into()]),
        )
        .unwrap();

    let cache_a = factory.get_or_create_cache(&ctx_a).unwrap();
    let cache_b = factory.get_or_create_cache(&ctx_b).unwrap();
    assert!(!Arc::ptr_eq(&cache_a, &cache_b));
    assert_ne!(cache_a.signature(), cache_b.signature());
    assert_eq!(factory.cache_count(), 2);

    factory.shutdown().unwrap();
}

#[test]
#[serial]
fn last_context_release_frees_shared_cache() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();
    factory.child_init().unwrap();

    let ctx_a = factory
        .make_server_context(vhost("a.example:80", "/var/cache/ps"))
        .unwrap();
    let ctx_b = factory
        .make_server_context(vhost("b.example:80", "/var/cache/ps"))
        .unwrap();
    factory.get_or_create_cache(&ctx_a).unwrap();
    factory.get_or_create_cache(&ctx_b).unwrap();

    let cache_segment =
        vhost_factory::config::cache_signature(&vhost("a.example:80", "/var/cache/ps"))
            .to_string();
    assert!(runtime.exists(&cache_segment));

    // Non-last release keeps the shared cache alive
    assert!(!factory.context_destroyed(&ctx_a));
    assert_eq!(factory.cache_count(), 1);
    assert!(runtime.exists(&cache_segment));

    // Last release frees the segment exactly once
    assert!(factory.context_destroyed(&ctx_b));
    assert_eq!(factory.cache_count(), 0);
    assert!(!runtime.exists(&cache_segment));

    factory.shutdown().unwrap();
}

#[test]
#[serial]
fn root_only_context_destroyed_at_shutdown() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();

    // Context created in the root; no fork ever happens, so no
    // child_init will claim it
    let ctx = factory
        .make_server_context(vhost("a.example:80", "/var/cache/ps"))
        .unwrap();
    assert!(!ctx.is_child_initialized());

    factory.shutdown().unwrap();
    assert!(!ctx.is_live());
    // Only factory-owned segments existed; all are gone
    assert_eq!(runtime.segment_count(), 0);
}

#[test]
#[serial]
fn async_lookup_after_teardown_is_noop() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();
    factory.child_init().unwrap();

    let ctx = factory
        .make_server_context(
            vhost("a.example:80", "/var/cache/ps")
                .with_remote_servers(vec!["memcache1:11211".into()]),
        )
        .unwrap();
    let cache = factory.get_or_create_cache(&ctx).unwrap();
    cache.put("big", vec![0u8; 2 * 1024 * 1024]); // remote tier only

    let live = ctx.liveness();
    let invoked = Arc::new(AtomicBool::new(false));
    let invoked_clone = Arc::clone(&invoked);

    // Tear the owning configuration down before the lookup is serviced
    factory.context_destroyed(&ctx);
    cache.initiate_lookup(
        "big",
        live,
        Box::new(move |_| {
            invoked_clone.store(true, Ordering::SeqCst);
        }),
    );

    factory.shutdown().unwrap();
    assert!(!invoked.load(Ordering::SeqCst));
}

#[test]
#[serial]
fn shutdown_is_idempotent_and_safe_when_uninitialized() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);

    // Never initialized at all
    factory.shutdown().unwrap();
    factory.shutdown().unwrap();
    assert_eq!(factory.state(), ProcessState::ShutDown);
}

#[test]
#[serial]
fn messages_flow_through_shared_buffer() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();

    factory.write_message("rewrite enabled");
    let buffer = factory.message_buffer().unwrap();
    assert!(buffer.snapshot().unwrap().contains("rewrite enabled"));

    factory.shutdown().unwrap();
}

#[test]
#[serial]
fn global_statistics_aggregate_cache_traffic() {
    let runtime = Arc::new(SharedSegmentRuntime::new());
    let factory = factory(&runtime);
    factory.root_init().unwrap();
    factory.child_init().unwrap();

    let ctx = factory
        .make_server_context(vhost("a.example:80", "/var/cache/ps"))
        .unwrap();
    let cache = factory.get_or_create_cache(&ctx).unwrap();
    cache.put("k", b"v".to_vec());
    cache.get("k");
    cache.get("absent");

    let stats = factory.global_statistics().unwrap();
    assert_eq!(stats.get("cache_hits"), 1);
    assert_eq!(stats.get("cache_misses"), 1);
    assert_eq!(stats.get("cache_inserted_bytes"), 1);

    factory.shutdown().unwrap();
}
