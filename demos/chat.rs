//! Namespace events and listeners.
//!
//! Demonstrates:
//! - Connecting and waiting for the default namespace
//! - Listening to `message`, `disconnect` and `close`
//! - Joining a second namespace
//! - Sending named events
//!
//! Usage:
//!   cargo run --example chat
//!   cargo run --example chat -- localhost:4000
//!   cargo run --example chat -- --no-wait
//!   cargo run --example chat -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use common::Args;
use serde_json::json;
use socketio_client::{Client, Result, socket};

// ============================================================================
// Constants
// ============================================================================

const CHAT_NAMESPACE: &str = "/chat";

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
    println!("=== Chat ===\n");

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[1] Connecting to {}...", args.address);
    let client = Client::builder(&args.address).connect_and_wait().await?;
    println!("    ✓ Connected, sid: {:?}\n", client.sid("/"));

    // ========================================================================
    // Listeners
    // ========================================================================

    client.on(socket::EVENT_MESSAGE, |args| {
        println!("    [message] {args:?}");
    });
    client.on(socket::EVENT_DISCONNECT, |args| {
        println!("    [disconnect] {args:?}");
    });
    client.once(socket::EVENT_CLOSE, |_| {
        println!("    [close]");
    });

    // ========================================================================
    // Namespace
    // ========================================================================

    println!("[2] Joining {CHAT_NAMESPACE}...");
    client
        .wait_for_with(socket::EVENT_CONNECT, || {
            client.connect_namespace(CHAT_NAMESPACE)
        })
        .await?;
    println!("    ✓ Joined, sid: {:?}\n", client.sid(CHAT_NAMESPACE));

    println!("[3] Sending events...");
    client.send_event("/", "hello", json!({ "from": "rust" }), false)?;
    client.send_event(CHAT_NAMESPACE, "say", json!("hi everyone"), false)?;
    println!("    ✓ Sent\n");

    common::wait_for_exit(args.no_wait).await;

    client.close().await;
    println!("\n=== Done ===");

    Ok(())
}
