//! Acknowledgment round trips.
//!
//! Demonstrates:
//! - Sending messages that request an acknowledgment
//! - Matching replies by the ack id each send returns
//! - Observing every ack through the generic `ack` event
//!
//! Usage:
//!   cargo run --example ack_roundtrip
//!   cargo run --example ack_roundtrip -- localhost:4000
//!   cargo run --example ack_roundtrip -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::{Duration, Instant};

use common::Args;
use serde_json::{Value, json};
use socketio_client::{Client, Error, Result, ack_event, socket};
use tokio::sync::mpsc;
use tokio::time::timeout;

// ============================================================================
// Constants
// ============================================================================

const ROUND_TRIPS: usize = 5;
const ROUND_TRIP_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== Ack Round Trip ===\n");

    let client = Client::builder(&args.address)
        .wait_timeout(Duration::from_millis(ROUND_TRIP_TIMEOUT_MS))
        .connect_and_wait()
        .await?;

    // Forward every ack before sending so a fast reply is not missed
    let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();
    client.on(socket::EVENT_ACK, move |args| {
        let _ = ack_tx.send(args.clone());
    });

    for i in 0..ROUND_TRIPS {
        let started = Instant::now();

        let Some(ack_id) = client.send_event("/", "echo", json!({ "seq": i }), true)? else {
            continue;
        };

        let reply = timeout(client.options().wait_timeout, async {
            while let Some(args) = ack_rx.recv().await {
                if args.first().and_then(Value::as_u64) == Some(ack_id) {
                    return Some(args);
                }
            }
            None
        })
        .await
        .map_err(|_| Error::timeout(ack_event(ack_id), ROUND_TRIP_TIMEOUT_MS))?
        .ok_or_else(|| Error::emitter_finished(ack_event(ack_id)))?;

        println!("[{i}] ack {ack_id} in {:?}: {reply:?}", started.elapsed());
    }

    client.close().await;
    println!("\n=== Done ===");

    Ok(())
}
