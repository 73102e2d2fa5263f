//! tabular-connect entry point.
//!
//! Resolves one endpoint from the environment, initializes it against the
//! server and prints what was found. Runs headless: there is no project
//! handle, so a settings file is optional when server and database are given.

use anyhow::{Context, Result};
use tabular_connect::{Config, ConnectionInfo, ProjectContext, UserIdentity, XmlaServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let config = Config::from_env()?;
    let endpoint = &config.endpoint;

    let mut info = match &endpoint.project_file {
        Some(project_file) => {
            let mut info = ConnectionInfo::for_project(project_file, ProjectContext::Headless);
            info.server_name = endpoint.server.clone();
            info.database_name = endpoint.database.clone();

            let user = endpoint
                .user_name
                .clone()
                .map(UserIdentity::new)
                .or_else(UserIdentity::from_env)
                .context("Could not determine the current user; set TABULAR_USER_NAME")?;
            info.resolve_project(&user)?;
            info
        }
        None => ConnectionInfo::for_database(
            endpoint.server.clone().unwrap_or_default(),
            endpoint.database.clone().unwrap_or_default(),
        ),
    };

    let mut server = XmlaServer::new(config.transport.clone());
    let result = info
        .initialize_compatibility_level(&mut server, endpoint.closed_bim_file)
        .await;
    if let Err(e) = server.disconnect().await {
        tracing::warn!("Failed to end session: {}", e);
    }
    if let Err(e) = result {
        if let Some(hint) = e.suggestion() {
            eprintln!("Hint: {hint}");
        }
        return Err(e.into());
    }

    println!("Server:              {}", info.server_name.as_deref().unwrap_or_default());
    println!("Database:            {}", info.database_name.as_deref().unwrap_or_default());
    if let Some((server, database)) = info.deployment_target() {
        println!("Deployment target:   {}.{}", server, database);
    }
    if let Some(level) = info.compatibility_level() {
        println!("Compatibility level: {}", level);
    }
    if let Some(direct_query) = info.direct_query() {
        println!("Direct query:        {}", direct_query);
    }

    Ok(())
}

/// Initialize tracing subscriber with stderr output.
fn init_logging() {
    let filter = std::env::var("RUST_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::new("warn,tabular_connect=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
