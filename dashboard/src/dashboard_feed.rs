use anyhow::Result;
use std::sync::Arc;
use tokio::signal;

use lib_realtime::retrieve::ApiClient;
use lib_realtime::{NetworkTransports, RealtimeClient};

mod dashboard_logic;
use dashboard_logic::{config, logger, snapshot, state::DashboardState};

async fn wait_for_shutdown() {
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = async {
            #[cfg(unix)]
            {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut term_signal) => {
                        term_signal.recv().await;
                        log::info!("SIGTERM received, initiating shutdown.");
                    }
                    Err(e) => {
                        log::warn!("Cannot listen for SIGTERM: {}", e);
                        std::future::pending::<()>().await;
                    }
                }
            }
            #[cfg(not(unix))]
            {
                // On non-unix platforms, just wait forever.
                std::future::pending::<()>().await;
            }
        } => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = config::load_config().settings();
    logger::setup_logging(&settings.log_dir, &settings.log_level)?;
    log::info!("Dashboard feed starting against {}", settings.realtime.origin);

    let state = DashboardState::new();
    if settings.skip_snapshot {
        log::info!("Startup snapshot skipped.");
    } else {
        let api = ApiClient::new(&settings.realtime.origin)?;
        match snapshot::fetch_snapshot(&api).await {
            Ok(snapshot) => state.seed(snapshot),
            Err(e) => log::error!("Startup snapshot failed, starting with empty panels: {:#}", e),
        }
    }

    let client = RealtimeClient::new(&settings.realtime, Arc::new(NetworkTransports::new()))?;
    log::info!(
        "Feed endpoints: primary {}, fallback {}",
        client.endpoints().primary,
        client.endpoints().fallback
    );

    // Panels subscribe before the first connect so the initial open is seen
    let _panels = state.attach(client.router());
    let summary_state = state.clone();
    let _summary = client.on_message(move |envelope| {
        log::info!("{} -> {}", envelope.event, summary_state.summary());
    });
    let indicator_state = state.clone();
    let _indicator = client.on_close(move |event| {
        log::warn!(
            "Feed closed (code {}, clean: {}). {}",
            event.code,
            event.was_clean,
            indicator_state.indicator()
        );
    });
    client.connect();

    wait_for_shutdown().await;

    client.dispose();
    log::info!("Shutdown complete. {}", state.summary());
    Ok(())
}
