//! Performance benchmarks for the refresh hot paths

use assert_approx_eq::assert_approx_eq;
use display_server::config::EngineConfig;
use display_server::engine::DisplayEngine;
use display_server::error::ProviderError;
use display_server::provider::{AttributeProvider, LookupFuture};
use display_server::registry::{GroupRegistry, GroupSpec};
use display_server::sink::RecordingSink;
use display_shared::color::{format_tick_rate, round_tick_rate};
use display_shared::{
    code_units, translate_color_codes, ClientId, Field, FieldValues, GroupScope, MAX_GROUP_NAME_LEN,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Answers every lookup immediately
struct InstantProvider;

impl AttributeProvider for InstantProvider {
    fn lookup<'a>(&'a self, client: &'a ClientId, field: Field) -> LookupFuture<'a, String> {
        let value = match field {
            Field::PlayerName => Ok(client.as_str().to_string()),
            Field::RankPrefix => Ok("&a[Member]".to_string()),
            Field::Ping => Ok("42".to_string()),
            Field::TickRate => Ok(format_tick_rate(19.87)),
            Field::LocalDate => Err(ProviderError::Unavailable),
            _ => Ok("1".to_string()),
        };
        Box::pin(async move { value })
    }
}

/// Benchmarks grouping name derivation with many colliding prefixes
#[test]
fn benchmark_name_derivation() {
    let mut registry = GroupRegistry::new(GroupScope::Shared);
    let mut sink = RecordingSink::new();

    let iterations = 5_000;
    let start = Instant::now();

    for i in 0..iterations {
        // Every id shares the same first 16 units
        let client = ClientId::new(format!("069a79f4-44e9-4726-{:012}", i));
        let spec = GroupSpec::single(client.clone(), 0, "", "");
        registry.upsert(client, spec, &mut sink).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Name derivation: {} upserts in {:?} ({:.2} μs/upsert)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(registry.len(), iterations);
    assert!(registry
        .groupings()
        .all(|group| code_units(&group.name) <= MAX_GROUP_NAME_LEN));

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks a full refresh of a busy server
#[test]
fn benchmark_full_refresh() {
    let clients = 200;
    let config = EngineConfig::default().lookup_timeout(Duration::from_millis(500));
    let mut engine = DisplayEngine::new(config, Arc::new(InstantProvider), None, RecordingSink::new());

    tokio_test::block_on(async {
        for i in 0..clients {
            engine.on_connect(ClientId::new(format!("player-{}", i))).await.unwrap();
        }
        for _ in 0..clients {
            engine.step().await;
        }

        let start = Instant::now();
        let report = engine.refresh_now().await;
        let duration = start.elapsed();

        println!(
            "Full refresh: {} clients in {:?} ({:.2} μs/client)",
            clients,
            duration,
            duration.as_micros() as f64 / clients as f64
        );

        assert_eq!(report.applied, clients);
        assert_eq!(engine.sink().group_count(), clients * 11);

        // Should fit comfortably inside the default 1s refresh interval
        assert!(duration.as_millis() < 1000);
    });
}

/// Benchmarks color translation of the tab footer
#[test]
fn benchmark_color_translation() {
    let footer = "\n &f &#ffecb8Players: &f37&8/&f100 &8&l/ &f &#ffecb8Ping: &f42ms &8&l/ \
                  &f &#ffecb8TPS: §a19.87 \n";

    let iterations = 20_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = translate_color_codes(footer);
    }

    let duration = start.elapsed();
    println!(
        "Color translation: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(!translate_color_codes(footer).contains('&'));

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks placeholder expansion of a board line
#[test]
fn benchmark_placeholder_expansion() {
    let mut values = FieldValues::new();
    values.insert(Field::PlaytimeDays, "3");
    values.insert(Field::PlaytimeHours, "14");
    values.insert(Field::PlaytimeMinutes, "27");
    let template = "%playtime_days%d, %playtime_hours%h, %playtime_minutes%m";

    let iterations = 20_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let _ = values.expand(template);
    }

    let duration = start.elapsed();
    println!(
        "Placeholder expansion: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert_eq!(values.expand(template), "3d, 14h, 27m");

    // Should complete in under 1 second
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks tick rate rounding used by the TPS field
#[test]
fn benchmark_tick_rate_formatting() {
    let iterations = 100_000;
    let start = Instant::now();

    let mut total = 0.0;
    for i in 0..iterations {
        total += round_tick_rate(15.0 + (i % 600) as f64 / 100.0);
    }

    let duration = start.elapsed();
    println!(
        "Tick rate rounding: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(total > 0.0);
    assert_approx_eq!(round_tick_rate(19.876), 19.88, 1e-9);
    assert_approx_eq!(round_tick_rate(25.0), 20.0, 1e-9);

    // Should complete in under 100ms
    assert!(duration.as_millis() < 100);
}
