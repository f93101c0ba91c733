mod clients;
mod dualpod;
mod errors;
mod health;
mod metrics;
mod population;
mod store;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use dualpod_clients::shared_http_client;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use tracing_subscriber::EnvFilter;

use crate::clients::HttpClientFactory;
use crate::dualpod::DualPodController;
use crate::metrics::Metrics;
use crate::population::PopulationController;
use crate::store::KubeObjectStore;

/// Dual-pods controller: pairs server-requesting pods with server-providing
/// pods (direct or launcher-backed) and keeps a warm launcher pool per
/// node (§1, §4.1).
#[derive(Parser, Debug)]
#[command(name = "dual-pods-controller", version)]
struct Cli {
    /// Namespace the controller watches and operates in.
    #[arg(long, env = "DUAL_PODS_NAMESPACE")]
    namespace: String,

    /// Number of concurrent C4 reconcile workers.
    #[arg(long, env = "DUAL_PODS_NUM_WORKERS", default_value_t = 2)]
    num_workers: usize,

    /// Node-wide cap on sleeping launcher instances (§4.4 sleeper cap).
    #[arg(long, env = "DUAL_PODS_SLEEPER_LIMIT", default_value_t = 16)]
    sleeper_limit: u32,

    /// Address the `/healthz` and `/metrics` endpoints bind to.
    #[arg(long, env = "DUAL_PODS_HEALTH_ADDR", default_value = "0.0.0.0:8080")]
    health_addr: SocketAddr,

    /// Repeatable: `-v` for debug, `-vv` for trace. Overridden by
    /// `RUST_LOG` if set.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    tracing::info!(namespace = %cli.namespace, num_workers = cli.num_workers, "starting dual-pods controller");

    let client = Client::try_default().await?;
    let store: Arc<dyn store::ObjectStore> =
        Arc::new(KubeObjectStore::new(client.clone(), &cli.namespace));
    let clients: Arc<dyn clients::ClientFactory> =
        Arc::new(HttpClientFactory::new(shared_http_client()?));
    let metrics = Metrics::new();

    let dualpod = Arc::new(DualPodController {
        store: store.clone(),
        clients,
        metrics: metrics.clone(),
        sleeper_limit: cli.sleeper_limit,
    });
    let pod_api: Api<Pod> = Api::namespaced(client.clone(), &cli.namespace);
    let dualpod_gate = dualpod.spawn(pod_api, cli.num_workers).await;

    let population = Arc::new(PopulationController {
        store,
        metrics: metrics.clone(),
    });
    let population_gate = population.spawn(client, &cli.namespace).await;

    let health_metrics = metrics.clone();
    let health_addr = cli.health_addr;
    tokio::spawn(async move {
        if let Err(e) = health::serve(health_addr, health_metrics).await {
            tracing::error!(error = %e, "health server exited");
        }
    });

    dualpod_gate.on_synced(|| tracing::info!("C4 initial sync complete"));
    population_gate.on_synced(|| tracing::info!("C5 initial sync complete"));

    shutdown_signal().await;
    tracing::info!("shutdown signal received, exiting");
    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
