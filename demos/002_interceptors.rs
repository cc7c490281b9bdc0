//! Interceptor chains configured by name.
//!
//! Demonstrates:
//! - Resolving built-in interceptors from a list of names
//! - Compressed payloads over an in-memory pipe
//! - Watching unsolicited packets through session events
//!
//! Usage:
//!   cargo run --example 002_interceptors
//!   cargo run --example 002_interceptors -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use duplex_transport::{Packet, Result, SessionEvent, SessionOptions, TransportSessionFactory};
use serde_json::json;

// ============================================================================
// Constants
// ============================================================================

const INTERCEPTORS: &[&str] = &["compression", "trace"];

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run().await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    println!("=== 002: Interceptors ===\n");

    let factory = TransportSessionFactory::builder()
        .with_names(INTERCEPTORS)?
        .build();
    println!("[Setup] Encode chain: {:?}", factory.encode_interceptors());
    println!("[Setup] Decode chain: {:?}", factory.decode_interceptors());

    let (a, b) = tokio::io::duplex(64 * 1024);
    let publisher = factory.create(a, "mqtt", SessionOptions::server())?;
    let subscriber = factory.create(b, "mqtt", SessionOptions::new())?;
    let mut events = subscriber.subscribe();

    let readings: Vec<f64> = (0..1000).map(|i| f64::from(i) * 0.5).collect();
    publisher
        .send(Packet::publish("sensors/temperature").with_body(json!({"readings": readings})))
        .await?;

    if let Ok(SessionEvent::Unsolicited(packet)) = events.recv().await {
        let count = packet
            .body
            .as_json()
            .and_then(|v| v["readings"].as_array())
            .map_or(0, Vec::len);
        println!("[Subscriber] topic={:?} readings={count}", packet.topic);
    }

    publisher.destroy().await;
    subscriber.destroy().await;
    println!("\n[Done] Sessions destroyed");
    Ok(())
}
