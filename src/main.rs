use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rand::Rng;
use serde_json::{json, Value};
use tokio::signal;
use tokio::task::JoinSet;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::backend::{BackendRegistry, Dispatch, FnBackend};
use turnstile::config::{LogConfig, TurnstileConfig};
use turnstile::middleware::{Recover, RequestLog};
use turnstile::pipeline::{chain, Context, Handler, Interceptor, Request};
use turnstile::Error;

/// Drive simulated client traffic through a rate-limited pipeline.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated clients, each with its own address
    #[arg(long, default_value_t = 4)]
    clients: u32,

    /// Requests sent by each client
    #[arg(long, default_value_t = 40)]
    requests: u32,

    /// Upper bound of the random pause between a client's requests
    #[arg(long, default_value_t = 25)]
    max_pause_ms: u64,

    /// Emit JSON logs
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Default)]
struct ClientReport {
    admitted: u32,
    rejected: u32,
    failed: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if args.json_logs {
        config.log.json = true;
    }
    init_tracing(&config.log);

    info!("Starting Turnstile");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        rate = config.rate_limit.requests_per_second,
        burst = config.rate_limit.burst,
        key = ?config.rate_limit.key,
        "Configuration loaded"
    );

    let registry = Arc::new(BackendRegistry::new());
    registry.register("users", Arc::new(user_backend()));

    let limiter = Arc::new(config.rate_limit.build_limiter()?);
    let interceptors: Vec<Arc<dyn Interceptor>> = vec![
        Arc::new(Recover),
        Arc::new(RequestLog),
        limiter.clone(),
    ];
    let handler = chain(
        Arc::new(Dispatch::new(registry.clone()).route("UserService", "users")),
        &interceptors,
    );

    tokio::select! {
        reports = simulate(handler, &args) => print_reports(&reports),
        _ = shutdown_signal() => warn!("Simulation interrupted"),
    }

    limiter.stop().await;
    registry.close().await?;

    info!("Turnstile stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if log.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn user_backend() -> FnBackend {
    FnBackend::new()
        .with("UserService", "GetUser", |_ctx, input: Value| async move {
            Ok::<_, Error>(json!({
                "id": input["id"],
                "name": "John Doe",
                "email": "john@example.com",
            }))
        })
        .with("UserService", "ListUsers", |_ctx, _input| async {
            Ok::<_, Error>(json!({
                "users": [
                    { "id": "1", "name": "Alice" },
                    { "id": "2", "name": "Bob" },
                ],
                "total": 2,
            }))
        })
}

async fn simulate(handler: Arc<dyn Handler>, args: &Args) -> Vec<(String, ClientReport)> {
    let mut clients = JoinSet::new();

    for client in 0..args.clients {
        let handler = handler.clone();
        let addr = format!("10.0.{}.{}:{}", client / 250, client % 250 + 1, 40000 + client);
        let requests = args.requests;
        let max_pause_ms = args.max_pause_ms;

        clients.spawn(async move {
            let mut report = ClientReport::default();
            for n in 0..requests {
                let method = if n % 4 == 0 { "ListUsers" } else { "GetUser" };
                let req = Request::new("UserService", method)
                    .with_input(json!({ "id": n.to_string() }))
                    .with_remote_addr(addr.clone());

                match handler.handle(Context::new().with_timeout(Duration::from_secs(1)), req).await {
                    Ok(_) => report.admitted += 1,
                    Err(e) if e.is_rate_limited() => report.rejected += 1,
                    Err(_) => report.failed += 1,
                }

                let pause = rand::thread_rng().gen_range(0..=max_pause_ms);
                tokio::time::sleep(Duration::from_millis(pause)).await;
            }
            (addr, report)
        });
    }

    let mut reports = Vec::with_capacity(args.clients as usize);
    while let Some(joined) = clients.join_next().await {
        match joined {
            Ok(report) => reports.push(report),
            Err(e) => warn!(error = %e, "Client task failed"),
        }
    }
    reports.sort_by(|a, b| a.0.cmp(&b.0));
    reports
}

fn print_reports(reports: &[(String, ClientReport)]) {
    println!("{:<22} {:>9} {:>9} {:>7}", "client", "admitted", "rejected", "failed");
    for (addr, report) in reports {
        println!(
            "{:<22} {:>9} {:>9} {:>7}",
            addr, report.admitted, report.rejected, report.failed
        );
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
