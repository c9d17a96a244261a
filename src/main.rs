use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use linkgate::accounts::{validate_registration, AccountStore, MemoryAccountStore, PasswordHasher};
use linkgate::config::LinkgateConfig;
use linkgate::credential::CredentialCodec;
use linkgate::http::{router, AppState, HttpServer, RouteLimiters};
use linkgate::links::MemoryLinkStore;
use linkgate::ratelimit::SystemClock;

/// Rate-limited authentication gateway for the Linkgate bookmark service.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(short, long, env = "LINKGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the HTTP listen address
    #[arg(long)]
    bind_addr: Option<std::net::SocketAddr>,

    /// Username of an admin account to create at startup
    #[arg(long, env = "LINKGATE_ADMIN_USER", requires = "admin_password")]
    admin_user: Option<String>,

    /// Password of the admin account created at startup
    #[arg(long, env = "LINKGATE_ADMIN_PASSWORD", hide_env_values = true)]
    admin_password: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    info!("Starting Linkgate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = LinkgateConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.bind_addr {
        config.server.bind_addr = addr;
    }
    info!(bind_addr = %config.server.bind_addr, "Configuration loaded");

    if config.credentials.uses_default_secret() {
        warn!("Using the built-in development signing secret; set LINKGATE_CREDENTIALS__SECRET in production");
    }

    let codec = Arc::new(CredentialCodec::new(&config.credentials.secret)?);
    let accounts = Arc::new(MemoryAccountStore::new(PasswordHasher::new()));

    if let (Some(username), Some(password)) = (cli.admin_user.as_deref(), cli.admin_password.as_deref()) {
        let username = validate_registration(username, password)?;
        let admin = accounts.create(username, password, true).await?;
        info!(user_id = admin.id, username = %admin.username, "Seeded admin account");
    }

    let state = AppState {
        codec,
        accounts,
        links: Arc::new(MemoryLinkStore::new()),
    };

    let limiters = RouteLimiters::new(&config.rate_limiting, Arc::new(SystemClock));
    let sweepers = limiters.spawn_sweepers();
    info!(
        general_capacity = config.rate_limiting.general.capacity,
        auth_capacity = config.rate_limiting.auth.capacity,
        "Rate limiters initialized"
    );

    let app = router(state, &limiters, &config.cors);

    // Run the server with graceful shutdown on Ctrl+C
    HttpServer::new(config.server.bind_addr, app)
        .serve_with_shutdown(shutdown_signal())
        .await?;

    for sweeper in sweepers {
        sweeper.shutdown().await;
    }

    info!("Linkgate stopped");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
