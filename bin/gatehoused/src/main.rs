//! `gatehoused` — the campus gate-access server binary.
//!
//! Usage:
//!   gatehoused serve -c <context-name-or-path> [--listen <addr>]
//!   gatehoused hash-password
//!
//! The context name resolves to `/etc/gatehouse/<name>.toml`.
//! If a path with `/` or `.` is given, it's used directly.

mod auth_middleware;
mod bootstrap;
mod config;
mod login;
mod routes;

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gatehouse_core::Module;
use jsonwebtoken::{DecodingKey, Validation};
use tracing::info;

use auth_middleware::JwtState;
use config::ServerConfig;
use routes::AppState;

/// Gatehouse server.
#[derive(Parser, Debug)]
#[command(name = "gatehoused", about = "Campus gate-access server")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the server.
    Serve {
        /// Context name or path to config file.
        #[arg(short = 'c', long = "config", required = true)]
        config: String,

        /// Listen address (overrides default 0.0.0.0:8080).
        #[arg(long = "listen", default_value = "0.0.0.0:8080")]
        listen: String,
    },

    /// Hash a password for a [[people]] entry.
    HashPassword,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => serve(&config, &listen).await,
        Commands::HashPassword => hash_password(),
    }
}

async fn serve(config: &str, listen: &str) -> anyhow::Result<()> {
    // Load server configuration.
    let config_path = ServerConfig::resolve_path(config);
    info!("Loading configuration from {}", config_path.display());
    let server_config = ServerConfig::load(&config_path)?;

    // Verify configuration is valid.
    bootstrap::verify_config(&server_config)?;

    // Initialize storage.
    let data_dir = std::path::PathBuf::from(&server_config.storage.data_dir);
    std::fs::create_dir_all(&data_dir)?;

    let sql: Arc<dyn gatehouse_sql::SqlStore> = Arc::new(
        gatehouse_sql::SqliteStore::open(&data_dir.join("gatehouse.db"))
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );

    // Identity directory, seeded from configuration.
    let directory: Arc<dyn gatehouse_core::Directory> = Arc::new(
        gatehouse_core::StaticDirectory::new(server_config.directory_people()),
    );

    // Notification outbox + background dispatcher.
    let (outbox, notice_rx) = gatehouse_core::Outbox::channel();
    let notifier: Arc<dyn gatehouse_core::Notifier> = Arc::new(gatehouse_core::LogNotifier);
    let _dispatcher = gatehouse_core::outbox::start_dispatcher(notice_rx, notifier);

    // Initialize modules.
    let leave_module = leave::LeaveModule::new(
        Arc::clone(&sql),
        Arc::clone(&directory),
        outbox.clone(),
    )?;
    info!("Leave module initialized");

    let gate_config = gate::service::GateConfig {
        token_ttl: Duration::from_secs(server_config.gate.token_ttl_secs),
    };
    let gate_module = gate::GateModule::with_config(
        Arc::clone(&sql),
        Arc::clone(leave_module.service()),
        Arc::clone(&directory),
        outbox.clone(),
        gate_config,
    )?;
    info!("Gate module initialized");

    let module_routes = vec![
        (leave_module.name(), leave_module.routes()),
        (gate_module.name(), gate_module.routes()),
    ];

    // Build JWT state for middleware.
    let jwt_state = Arc::new(JwtState {
        decoding_key: DecodingKey::from_secret(server_config.jwt.secret.as_bytes()),
        validation: Validation::default(),
    });

    let server_config = Arc::new(server_config);

    // Build application state.
    let app_state = AppState {
        jwt_state,
        server_config,
    };

    // Build router.
    let app = routes::build_router(app_state, module_routes);

    // Start server.
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!("Gatehouse server listening on {}", listen);
    axum::serve(listener, app).await?;

    Ok(())
}

fn hash_password() -> anyhow::Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let confirm = rpassword::prompt_password("Confirm password: ")?;
    if password != confirm {
        anyhow::bail!("Passwords do not match.");
    }
    if password.is_empty() {
        anyhow::bail!("Password must not be empty.");
    }
    println!("{}", bootstrap::hash_password(&password)?);
    Ok(())
}
