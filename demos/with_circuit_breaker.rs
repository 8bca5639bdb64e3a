//! Circuit breaker example demonstrating resilience patterns.
//!
//! This example shows how to:
//! - Guard an unreliable dependency with a circuit breaker
//! - Configure rate thresholds and the open duration
//! - Handle open circuit states and fallbacks
//! - Watch state transitions through an event channel
//! - Report breaker health from a registry
//!
//! Run with: cargo run --example with_circuit_breaker

use breakwater::events::{ChannelSink, EventKind};
use breakwater::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// A dependency that fails its first `failures` calls and then recovers.
struct FlakyService {
    calls: AtomicU32,
    failures: u32,
}

impl FlakyService {
    fn new(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
        }
    }

    async fn fetch(&self) -> Result<String, std::io::Error> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        if n < self.failures {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "upstream unavailable",
            ))
        } else {
            Ok(format!("response #{n}"))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Circuit Breaker Example ===\n");

    let policy = BreakerPolicy::default()
        .with_window_size(10)
        .with_min_samples(5)
        .with_half_open_min_samples(2)
        .with_failure_rate_threshold(0.5)
        .with_slow_call_duration(Duration::from_millis(200))
        .with_open_duration(Duration::from_secs(1))
        .with_half_open_max_probes(2);

    println!("Circuit Breaker Configuration:");
    println!("  Window size: {}", policy.window_size);
    println!("  Minimum samples: {}", policy.min_samples);
    println!("  Failure rate threshold: {}", policy.failure_rate_threshold);
    println!("  Open duration: {:?}", policy.open_duration);
    println!();

    let (sink, mut events) = ChannelSink::new(64);
    let registry = BreakerRegistry::builder()
        .default_policy(policy)
        .event_sink(sink)
        .build()?;

    let watcher = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let EventKind::StateTransition { from, to, reason, .. } = event.kind {
                println!("  >> [{}] {from} -> {to} ({reason})", event.breaker);
            }
        }
    });

    let service = Arc::new(FlakyService::new(5));
    let breaker = registry.get_or_create("upstream");

    println!("Sending requests to trigger circuit breaker...\n");

    for i in 1..=8 {
        println!("Request #{}: Circuit state = {}", i, breaker.state());

        let service = Arc::clone(&service);
        match breaker.call_async(move || async move { service.fetch().await }).await {
            Ok(body) => println!("  Success: {body}"),
            Err(CallError::CircuitOpen { breaker, retry_after }) => {
                println!("  Circuit OPEN for '{breaker}', retry in {retry_after:?}")
            }
            Err(e) => println!("  Failed: {e}"),
        }

        let metrics = breaker.metrics();
        println!(
            "  Metrics: {} total, {} success, {} failed, {} rejected",
            metrics.total_requests,
            metrics.successful_requests,
            metrics.failed_requests,
            metrics.rejected_requests
        );
    }

    println!("\n=== Demonstrating Fallback ===\n");

    let service_for_call = Arc::clone(&service);
    let body = breaker
        .call_async_with_fallback(
            move || async move { service_for_call.fetch().await },
            || async { Ok::<String, std::io::Error>("cached response".to_string()) },
        )
        .await?;
    println!("Got: {body}");

    println!("\nWaiting for the open period to elapse...");
    tokio::time::sleep(Duration::from_millis(1100)).await;

    println!("\n=== Demonstrating Recovery ===\n");

    for i in 1..=3 {
        println!("Probe #{}: State = {}", i, breaker.state());
        let service = Arc::clone(&service);
        match breaker.call_async(move || async move { service.fetch().await }).await {
            Ok(body) => println!("  Success: {body}"),
            Err(e) => println!("  Failed: {e}"),
        }
    }

    println!("\nFinal state: {}", breaker.state());

    let report = registry.health_report();
    println!("\nHealth report:\n{}", report.to_json_pretty()?);

    drop(registry);
    drop(breaker);
    watcher.await?;

    Ok(())
}
