use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{error, info, warn};

use vinted_harvest::config::load_harvest_config;
use vinted_harvest::harvest::harvest_and_save;
use vinted_harvest::progress::LogProgress;
use vinted_harvest::{dashboard, AppState};

/// Value following `--name` or glued as `--name=value`.
fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    let mut iter = args.iter();
    while let Some(a) = iter.next() {
        if a == name {
            return iter.next().cloned();
        }
        if let Some(rest) = a.strip_prefix(&prefix) {
            return Some(rest.to_string());
        }
    }
    None
}

fn parse_port_from_args(args: &[String]) -> Option<u16> {
    arg_value(args, "--port").and_then(|v| v.trim().parse().ok())
}

fn port_from_env() -> Option<u16> {
    for k in ["VINTED_HARVEST_PORT", "PORT"] {
        if let Ok(v) = std::env::var(k) {
            if let Ok(p) = v.trim().parse::<u16>() {
                return Some(p);
            }
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=warn"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args: Vec<String> = std::env::args().collect();
    let state = Arc::new(AppState::new(load_harvest_config()));

    if args.iter().any(|a| a == "--harvest") {
        return run_cli(state, &args).await;
    }

    let app = dashboard::router(state.clone());

    let port: u16 = parse_port_from_args(&args)
        .or_else(port_from_env)
        .unwrap_or(5000);
    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(l) => l,
        Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
            anyhow::bail!(
                "Address already in use: {}. Stop the existing process or run with --port {} (or set PORT).",
                bind_addr,
                port.saturating_add(1)
            )
        }
        Err(e) => return Err(e.into()),
    };
    info!("Dashboard listening on http://{}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    Ok(())
}

/// One harvest in the foreground, then exit.
async fn run_cli(state: Arc<AppState>, args: &[String]) -> anyhow::Result<()> {
    let Some(launcher) = state.launcher.clone() else {
        anyhow::bail!(
            "No Chrome, Chromium or Brave executable found. Install one or set CHROME_EXECUTABLE."
        );
    };

    let target = match arg_value(args, "--max") {
        Some(v) => v
            .trim()
            .parse::<usize>()
            .map_err(|e| anyhow::anyhow!("invalid --max value {:?}: {}", v, e))?,
        None => state.config.resolve_max_products(),
    };
    let url = arg_value(args, "--url").unwrap_or_else(|| state.config.resolve_target_url());

    tokio::spawn(cancel_on_signal(state.clone()));

    info!("Harvesting up to {} products from {}", target, url);
    match harvest_and_save(&state, launcher, &url, target, &LogProgress).await {
        Ok(report) => {
            info!("{} ({:?})", report.summary(), report.state);
            if let Some(files) = report.files {
                info!("JSON: {}", files.json_path.display());
                if let Some(csv) = files.csv_path {
                    info!("CSV: {}", csv.display());
                }
            }
            Ok(())
        }
        Err(e) => {
            error!("Harvest failed: {:#}", e);
            Err(e)
        }
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).ok();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                if let Some(ref mut s) = sigterm {
                    s.recv().await;
                } else {
                    futures::future::pending::<()>().await;
                }
            } => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

async fn cancel_on_signal(state: Arc<AppState>) {
    wait_for_signal().await;
    warn!("Interrupt received, stopping after the current scroll");
    state.shutdown.store(true, Ordering::Relaxed);
}

async fn shutdown_signal(state: Arc<AppState>) {
    wait_for_signal().await;
    info!("Shutting down");
    state.shutdown.store(true, Ordering::Relaxed);
}
