//! Steady-state overhead of each component on its happy path: no
//! contention, no queueing, no cooldown — just the cost of the admission
//! machinery itself relative to a bare `KvStore` round trip.

use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use mediation_cache::ResponseCache;
use mediation_config::MediationConfig;
use mediation_core::{Fingerprint, InMemoryStore, KvStore, Operation, Provider, Tier, UserId};
use mediation_coordinator::{AdmitRequest, RateLimitCoordinator};
use mediation_quota::QuotaLedger;
use mediation_ratelimit::{RateLimiterConfig, SlidingWindowLimiter, WindowType};

const CONFIG_TOML: &str = r#"
    [tiers.free]
    video = 1000000
    music = 1000000
    chat = 1000000
    gaming = 1000000

    [operation_costs.video]
    search = 1

    [operation_costs.music]
    recommendations = 1

    [operation_costs.chat]
    completion = 1

    [operation_costs.gaming]
    leaderboard = 1

    [cache_ttl.video.search]
    positive_seconds = 300
    negative_seconds = 10

    [rate_limits.video]
    requests_per_window = 1000000
    window_seconds = 60

    [rate_limits.music]
    requests_per_window = 1000000
    window_seconds = 60

    [rate_limits.chat]
    requests_per_window = 1000000
    window_seconds = 60

    [rate_limits.gaming]
    requests_per_window = 1000000
    window_seconds = 60

    [queue]
    max_depth_per_user = 1000
    default_deadline_seconds = 30

    [singleflight]
    lease_ttl_seconds = 10
    poll_slack_seconds = 0

    [prefetch]
    enabled = false
    interval_seconds = 60
    lease_ttl_seconds = 120

    [alerts]
    queue_depth_high = 1000
    cache_hit_rate_low = 0.3
    api_error_rate_high = 0.1

    [store]
    connection = "memory://local"
    health_check_interval_seconds = 30
"#;

fn bench_kv_baseline(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();

    c.bench_function("kv_get_roundtrip", |b| {
        b.to_async(&runtime).iter(|| async {
            let result = store.get(black_box("bench:key")).await;
            black_box(result)
        });
    });
}

fn bench_rate_limiter_admit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let config = Arc::new(
        RateLimiterConfig::builder()
            .name("bench")
            .window_type(WindowType::SlidingLog)
            .limit_for_period(1_000_000)
            .window(Duration::from_secs(60))
            .build(),
    );
    let limiter = SlidingWindowLimiter::new(store, config);

    c.bench_function("ratelimit_admit_headroom_available", |b| {
        b.to_async(&runtime).iter(|| async {
            let outcome = limiter.admit(black_box(Provider::Video), black_box(&UserId::from("bench-user"))).await;
            black_box(outcome)
        });
    });
}

fn bench_quota_charge(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let ledger = QuotaLedger::new(store);
    let operation = Operation::from("search");

    c.bench_function("quota_charge_headroom_available", |b| {
        b.to_async(&runtime).iter(|| async {
            let outcome = ledger
                .charge(black_box(Provider::Video), black_box(&UserId::from("bench-user")), &operation, 1, Some(1_000_000))
                .await;
            black_box(outcome)
        });
    });
}

fn bench_cache_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let cache = ResponseCache::new(store);
    let fingerprint = Fingerprint::new(Provider::Video, &Operation::from("search"), "q=bench", None, 1);

    runtime.block_on(async {
        cache.store("video:bench-user", &fingerprint, b"cached-payload", Duration::from_secs(300), false).await.unwrap();
    });

    c.bench_function("cache_lookup_hit", |b| {
        b.to_async(&runtime).iter(|| async {
            let lookup = cache.lookup(black_box("video:bench-user"), black_box(&fingerprint)).await;
            black_box(lookup)
        });
    });
}

fn bench_fingerprint_construction(c: &mut Criterion) {
    let operation = Operation::from("search");
    c.bench_function("fingerprint_blake3_hash", |b| {
        b.iter(|| {
            let fp = Fingerprint::new(black_box(Provider::Video), &operation, black_box("q=lofi&page=3"), None, 1);
            black_box(fp)
        });
    });
}

fn bench_coordinator_admit_cache_hit(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let config = Arc::new(MediationConfig::from_toml_str(CONFIG_TOML, None).unwrap());
    let coordinator = RateLimitCoordinator::new(Arc::clone(&store), Arc::clone(&config));

    let admit_request = || AdmitRequest {
        provider: Provider::Video,
        operation: "search".to_string(),
        user: UserId::from("bench-user"),
        tier: Tier::Free,
        normalized_params: "q=bench".to_string(),
        priority: 0,
        allow_queue: false,
        deadline: Duration::from_secs(30),
    };

    // Prime the cache once so every measured iteration is a hit.
    runtime.block_on(async {
        let decision = coordinator.admit(admit_request()).await.unwrap();
        if let mediation_coordinator::Decision::CallUpstream(lease) = decision {
            coordinator.complete(lease, mediation_coordinator::CompletionOutcome::Success(b"ok".to_vec())).await.unwrap();
        }
    });

    c.bench_function("coordinator_admit_cache_hit", |b| {
        b.to_async(&runtime).iter(|| async { black_box(coordinator.admit(black_box(admit_request())).await) });
    });
}

fn bench_coordinator_admit_cache_miss(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();
    let config = Arc::new(MediationConfig::from_toml_str(CONFIG_TOML, None).unwrap());
    let coordinator = RateLimitCoordinator::new(store, config);
    let mut counter: u64 = 0;

    c.bench_function("coordinator_admit_cache_miss_dispatches", |b| {
        b.to_async(&runtime).iter(|| {
            counter += 1;
            let params = format!("q={counter}");
            async {
                let decision = coordinator
                    .admit(AdmitRequest {
                        provider: Provider::Video,
                        operation: "search".to_string(),
                        user: UserId::from("bench-miss-user"),
                        tier: Tier::Free,
                        normalized_params: params,
                        priority: 0,
                        allow_queue: false,
                        deadline: Duration::from_secs(30),
                    })
                    .await;
                black_box(decision)
            }
        });
    });
}

criterion_group!(
    benches,
    bench_kv_baseline,
    bench_rate_limiter_admit,
    bench_quota_charge,
    bench_cache_hit,
    bench_fingerprint_construction,
    bench_coordinator_admit_cache_hit,
    bench_coordinator_admit_cache_miss
);
criterion_main!(benches);
