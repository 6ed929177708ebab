use std::{env, sync::Arc};

use fintrack_server::bootstrap::bootstrap_users;
use fintrack_server::config::loader::load_config;
use fintrack_server::{Ledger, ServerBuilder, create_cache_store};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From FINTRACK_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (fintrack.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (FINTRACK_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // .env is optional; only report files that exist but fail to load
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    fintrack_server::observability::init_tracing();

    let (config_path, source) = resolve_config_path();
    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    fintrack_server::observability::apply_logging_level(&cfg.logging.level);

    let ledger = Arc::new(Ledger::new());
    match bootstrap_users(&ledger, &cfg.bootstrap) {
        Ok(0) => tracing::warn!("No users configured; every login will fail"),
        Ok(count) => tracing::info!(count, "Bootstrap users created"),
        Err(e) => {
            eprintln!("Bootstrap failed: {e}");
            std::process::exit(2);
        }
    }

    let store = create_cache_store(&cfg.redis, &cfg.cache);
    let server = ServerBuilder::new()
        .with_config(cfg)
        .with_store(store)
        .with_ledger(ledger)
        .build();

    if let Err(err) = server.run().await {
        tracing::error!(error = %err, "Server error");
        std::process::exit(1);
    }
}

fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("FINTRACK_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    ("fintrack.toml".to_string(), ConfigSource::Default)
}
