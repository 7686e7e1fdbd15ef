//! # Live Feed Probe
//!
//! Connects to a running dashboard feed through lib_realtime and prints every
//! envelope and lifecycle transition for a bounded time, then disposes the
//! client and prints the final connection snapshot.

use clap::Parser;
use lib_realtime::{NetworkTransports, RealtimeClient, RealtimeOptions};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Dashboard origin the feed path is resolved against
    #[clap(short, long, default_value = "http://localhost:8000")]
    origin: String,

    /// Feed path or absolute ws:// URL
    #[clap(short, long, default_value = "/api/ws")]
    endpoint: String,

    /// How long to listen, in seconds
    #[clap(short, long, default_value_t = 60)]
    seconds: u64,

    /// Reconnect delay in milliseconds
    #[clap(long, default_value_t = 3000)]
    reconnect_delay_ms: u64,

    /// Library log level (trace, debug, info, warn, error)
    #[clap(long, default_value = "warn")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // // Statement: Route the library's log records to stderr so they do not mix with the report
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%H:%M:%S%.3f]"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(args.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .chain(std::io::stderr())
        .apply()?;

    let options = RealtimeOptions {
        origin: args.origin.clone(),
        endpoint: args.endpoint.clone(),
        reconnect_delay: Duration::from_millis(args.reconnect_delay_ms),
        ..RealtimeOptions::default()
    };
    let client = RealtimeClient::new(&options, Arc::new(NetworkTransports::new()))?;

    println!("[*] Primary:  {}", client.endpoints().primary);
    println!("[*] Fallback: {}", client.endpoints().fallback);
    println!("[*] Listening for {}s...", args.seconds);

    let _open = client.on_open(|event| println!("[OPEN]  {:?}", event.origin));
    let _close = client.on_close(|event| {
        println!(
            "[CLOSE] {:?} code={} clean={} reason={:?}",
            event.origin, event.code, event.was_clean, event.reason
        )
    });
    let _error = client.on_error(|event| println!("[ERROR] {:?} {}", event.origin, event.message));
    let _message = client.on_message(|envelope| {
        let stamp = envelope
            .created_at
            .map(|ts| ts.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        println!("[MSG]   {} {} {}", stamp, envelope.event, envelope.payload);
    });

    client.connect();

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(args.seconds)) => {}
        _ = tokio::signal::ctrl_c() => println!("[*] Interrupted."),
    }

    let snapshot = client.snapshot();
    client.dispose();

    println!("-----------------------------------------------");
    println!("[INFO] Final state: {:?}, mode: {:?}, failures: {}", snapshot.state, snapshot.mode, snapshot.failures);
    println!("-----------------------------------------------");
    Ok(())
}
