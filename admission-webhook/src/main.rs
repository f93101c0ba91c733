use std::net::SocketAddr;

use admission_webhook::{router, AppState};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Admission boundary check for controller-managed dual-pods pod metadata
/// (§4.7). Serves a single `/validate` route for a
/// `ValidatingWebhookConfiguration` targeting pod UPDATEs.
#[derive(Parser, Debug)]
#[command(name = "dual-pods-admission-webhook", version)]
struct Cli {
    /// Address the webhook server binds to. TLS termination is expected to
    /// sit in front of this (out of scope, §1).
    #[arg(long, env = "DUAL_PODS_WEBHOOK_ADDR", default_value = "0.0.0.0:8443")]
    addr: SocketAddr,

    /// Exact `userInfo.username` the controller's own service account
    /// presents on its own writes; any other requester is a user edit.
    #[arg(long, env = "DUAL_PODS_CONTROLLER_SERVICE_ACCOUNT")]
    controller_service_account: String,

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

    tracing::info!(addr = %cli.addr, "starting dual-pods admission webhook");

    let state = AppState {
        controller_service_account: cli.controller_service_account,
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(cli.addr).await?;
    axum::serve(listener, app).await?;
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
