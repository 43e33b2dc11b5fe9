//! Item server with an in-memory store
//!
//! Run with: cargo run --example item_server [BIND_ADDR] [--demo]
//!
//! Examples:
//!   cargo run --example item_server                    # binds to 0.0.0.0:7000
//!   cargo run --example item_server localhost          # binds to 127.0.0.1:7000
//!   cargo run --example item_server 127.0.0.1:7001     # binds to 127.0.0.1:7001
//!   cargo run --example item_server localhost --demo   # also runs a demo client
//!
//! ## Demo client
//!
//! With `--demo` the example connects its own client, opens a monitor, and
//! sends one item per second alternating between request-response and
//! fire-and-forget. Every item shows up on the monitor.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use itemcast::{ClientConfig, Item, ItemClient, ItemServer, MemoryStore, ServerConfig};

/// Parse bind address from command line argument.
///
/// Accepts formats:
/// - "localhost" -> 127.0.0.1:7000
/// - "localhost:7001" -> 127.0.0.1:7001
/// - "127.0.0.1" -> 127.0.0.1:7000
/// - "0.0.0.0:7000" -> 0.0.0.0:7000
fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    const DEFAULT_PORT: u16 = 7000;

    let normalized = arg.replace("localhost", "127.0.0.1");

    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: item_server [BIND_ADDR] [--demo]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR    Address to bind to (default: 0.0.0.0:7000)");
    eprintln!("  --demo       Connect a demo client that publishes and monitors items");
}

async fn run_demo_client(addr: SocketAddr) -> itemcast::Result<()> {
    // Connect to the loopback side of whatever was bound
    let addr = if addr.ip().is_unspecified() {
        SocketAddr::from(([127, 0, 0, 1], addr.port()))
    } else {
        addr
    };

    let client = ItemClient::connect(ClientConfig::new(addr)).await?;
    let mut feed = client.monitor().await?;

    tokio::spawn(async move {
        while let Some(item) = feed.next().await {
            match item {
                Ok(item) => tracing::info!(item = ?item, "Monitor received item"),
                Err(e) => {
                    tracing::warn!(error = %e, "Monitor ended");
                    break;
                }
            }
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    for n in 0u64.. {
        ticker.tick().await;
        let item = Item::new().with_field("name", format!("item-{}", n)).with_field("seq", n);

        if n % 2 == 0 {
            let stored = client.request_response(&item).await?;
            tracing::debug!(id = ?stored.id(), "Saved via request-response");
        } else {
            client.fire_and_forget(&item).await?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    let demo = args.iter().any(|a| a == "--demo");
    let bind_addr = match args.iter().skip(1).find(|a| !a.starts_with("--")) {
        Some(addr_str) => match parse_bind_addr(addr_str) {
            Ok(addr) => addr,
            Err(e) => {
                eprintln!("Error: {}", e);
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
        },
        None => ServerConfig::default().bind_addr,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("itemcast=debug".parse()?)
                .add_directive("item_server=debug".parse()?),
        )
        .init();

    let config = ServerConfig::with_addr(bind_addr);

    println!("Starting item server on {}", config.bind_addr);
    println!();
    println!("Routes:");
    for route in itemcast::Route::ALL {
        println!("  {:<28} {}", route.as_str(), route.interaction());
    }
    println!();

    let server = Arc::new(ItemServer::new(config, MemoryStore::new()));

    if demo {
        tokio::spawn(async move {
            // Give the listener a moment to bind
            tokio::time::sleep(Duration::from_millis(200)).await;
            if let Err(e) = run_demo_client(bind_addr).await {
                tracing::error!(error = %e, "Demo client failed");
            }
        });
    }

    let reporter = Arc::clone(&server);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let hub = reporter.hub().stats();
            let srv = reporter.stats();
            println!(
                "Stats: connections={} requests={} published={} subscribers={} overflowed={}",
                srv.active_connections, srv.requests, hub.published, hub.subscribers, hub.overflowed,
            );
        }
    });

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                eprintln!("Server error: {}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
    }

    Ok(())
}
