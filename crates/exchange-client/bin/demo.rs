//! # Exchange Demo
//!
//! Publishes a run of keyed messages through an exchange socket, past the
//! ring buffer capacity, then queries what the store kept.
//!
//! ## Running
//!
//! ```bash
//! # Built-in configuration (capacity 10, one ring buffer)
//! cargo run -p exchange-client --bin exchange-demo
//!
//! # Load a JSON ExchangeConfig and publish 25 messages
//! cargo run -p exchange-client --bin exchange-demo -- exchange.json 25
//!
//! # Show store-level logs
//! RUST_LOG=exchange_rs=debug cargo run -p exchange-client --bin exchange-demo
//! ```

use anyhow::{bail, Context, Result};
use exchange_client::{
    get_msgs_fuzz, publish, receive, receive_query, ExchangeSocket, PublishPacket, QoS, RecvQuery,
};
use exchange_rs::{ExchangeConfig, ExchangeStore, Message};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn default_config() -> ExchangeConfig {
    ExchangeConfig::new("exchange1", "topic1")
        .with_capacity(10)
        .with_buffer("ringBuffer1")
        .with_metrics(true)
}

fn load_config(path: Option<&String>) -> Result<ExchangeConfig> {
    match path {
        Some(path) => ExchangeConfig::from_json_file(path)
            .with_context(|| format!("loading exchange config from {path}")),
        None => Ok(default_config()),
    }
}

fn describe(messages: &[Message]) -> String {
    let keys: Vec<String> = messages.iter().map(|m| m.key().to_string()).collect();
    format!("[{}]", keys.join(", "))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = load_config(args.first())?;
    let published: u64 = match args.get(1) {
        Some(count) => count.parse().with_context(|| format!("invalid message count {count}"))?,
        None => config.capacity as u64 + 5,
    };
    if published == 0 {
        bail!("message count must be positive");
    }

    let exchange = Arc::new(ExchangeStore::from_config(&config)?);
    info!(
        exchange = exchange.name(),
        topic = exchange.topic(),
        capacity = config.capacity,
        buffers = ?exchange.buffer_names(),
        "exchange ready"
    );

    let socket = ExchangeSocket::open()?;
    socket.bind(Arc::clone(&exchange))?;

    println!("╔══════════════════════════════════════════════════════════╗");
    println!("║                    EXCHANGE DEMO                         ║");
    println!("╚══════════════════════════════════════════════════════════╝");
    println!();
    println!("Publishing keys 0..{published} on '{}'", config.topic);

    for key in 0..published {
        let payload = format!("payload-{key}");
        let evicted = publish(&socket, &config.topic, key, payload, QoS::AtMostOnce).await?;
        for message in &evicted {
            let packet = PublishPacket::decode(message)?;
            println!(
                "  evicted key {:>3}  ({} payload bytes handed back)",
                message.key(),
                packet.payload.len()
            );
        }
    }

    let newest = published - 1;
    println!();
    for name in exchange.buffer_names() {
        println!("Ring buffer '{name}' keys: {:?}", exchange.buffer_keys(&name)?);
    }

    println!();
    println!("Queries:");

    let exact = receive_query(&socket, RecvQuery::Exact { key: newest }).await?;
    let packet = PublishPacket::decode(&exact[0])?;
    println!(
        "  exact  key {newest:>3}            -> {:?}",
        String::from_utf8_lossy(&packet.payload)
    );

    let window = receive(&socket, newest, 3).await?;
    println!("  window key {newest:>3} count 3    -> {}", describe(&window));

    match receive(&socket, 0, 1).await {
        Ok(messages) => println!("  window key   0 count 1    -> {}", describe(&messages)),
        Err(e) => println!("  window key   0 count 1    -> miss: {e}"),
    }

    let approx = newest.saturating_sub(2);
    let fuzzy = get_msgs_fuzz(&socket, approx, 5)?;
    println!("  fuzzy  key {approx:>3} count 5    -> {}", describe(&fuzzy));

    let metrics = exchange.metrics();
    println!();
    println!("Metrics:");
    println!("  admitted      {:>6}", metrics.messages_admitted);
    println!("  evicted       {:>6}", metrics.messages_evicted);
    println!("  rejected      {:>6}", metrics.messages_rejected);
    println!("  lookups       {:>6}", metrics.lookups);
    println!("  lookup misses {:>6}", metrics.lookup_misses);

    socket.close();
    Ok(())
}
