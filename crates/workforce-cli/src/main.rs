mod config;
mod config_watcher;
mod workers;

use clap::{Parser, Subcommand};
use config::WorkforceConfig;
use config_watcher::ConfigWatcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;
use workforce_core::GoalConstraints;
use workforce_gateway::{AuthConfig, GatewayServer};
use workforce_orchestrator::Orchestrator;
use workforce_store::FileStore;

#[derive(Parser)]
#[command(name = "workforce", about = "Workforce: goal-driven multi-agent orchestration")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "workforce.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and execute one goal, then print its deliverable
    Run {
        /// What the workforce should achieve
        goal: String,
        /// TOML file with goal constraints and an optional explicit plan
        #[arg(long)]
        plan: Option<PathBuf>,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 600)]
        timeout_secs: u64,
    },
    /// Start the HTTP and WebSocket gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Validate the config and list the team
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let cli = Cli::parse();
    let config = WorkforceConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Run {
            goal,
            plan,
            timeout_secs,
        } => {
            let constraints = match plan {
                Some(path) => load_constraints(&path).await?,
                None => GoalConstraints::default(),
            };
            let orchestrator = build_orchestrator(&config).await?;
            let goal_id = orchestrator.create_goal(goal, constraints).await?;
            info!(goal_id = %goal_id, "Goal submitted");

            let progress = orchestrator
                .run_until_settled(goal_id, Duration::from_secs(timeout_secs))
                .await?;
            println!("{}", serde_json::to_string_pretty(&progress)?);

            match orchestrator.get_deliverable(goal_id)? {
                Some(deliverable) => {
                    println!(
                        "\n--- Deliverable v{} ({}) ---\n",
                        deliverable.version, deliverable.status
                    );
                    println!("{}", deliverable.content);
                }
                None => println!("\nNo deliverable was published."),
            }

            let held = orchestrator.held_artifacts();
            if !held.is_empty() {
                println!("\nAwaiting human review:");
                for ticket in &held {
                    println!(
                        "  artifact {} (risk {}, score {:.2}): {}",
                        ticket.artifact_id,
                        ticket.risk,
                        ticket.score,
                        ticket.reasons.join("; ")
                    );
                }
                println!("Start `workforce serve` to submit decisions.");
            }
        }
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let orchestrator = Arc::new(build_orchestrator(&config).await?);

            let watched = orchestrator.clone();
            let _watcher = ConfigWatcher::start(cli.config.clone(), 500, move |reload| {
                if let Some(limit) = reload.max_in_flight() {
                    watched.set_max_in_flight(limit);
                    info!(max_in_flight = limit, "Concurrency ceiling reloaded");
                }
            })
            .map_err(|e| warn!(error = %e, "Config hot-reload disabled"))
            .ok();

            let auth_config = AuthConfig::new(config.security.api_keys.clone());
            if auth_config.is_enabled() {
                info!(keys = config.security.api_keys.len(), "API key auth enabled");
            }
            let app = GatewayServer::build_with_auth(orchestrator, auth_config);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Workforce gateway listening on {addr}");
            axum::serve(listener, app).await?;
        }
        Commands::Check => {
            println!("Config OK: {}", cli.config.display());
            println!("  data dir: {}", config.data_dir.display());
            println!(
                "  model: {:?} ({})",
                config.model.provider, config.model.model_id
            );
            if config.agents.is_empty() {
                println!("  team: built-in roster");
            } else {
                println!("  team:");
                for agent in &config.agents {
                    println!(
                        "    {} x{}: {} ({}, {}) [{}]",
                        agent.name,
                        agent.count,
                        agent.role,
                        agent.seniority,
                        agent.kind,
                        agent.capabilities.join(", ")
                    );
                }
            }
        }
    }

    Ok(())
}

async fn load_constraints(path: &Path) -> anyhow::Result<GoalConstraints> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        anyhow::anyhow!("Failed to read plan file '{}': {}", path.display(), e)
    })?;
    Ok(toml::from_str(&raw)?)
}

async fn build_orchestrator(config: &WorkforceConfig) -> anyhow::Result<Orchestrator> {
    let store = Arc::new(FileStore::new(config.store_dir()).await?);
    let capability = workers::capability(&config.model)?;
    let mut builder = Orchestrator::builder()
        .with_workspace_id(config.workspace_id.unwrap_or_else(Uuid::nil))
        .with_config(config.orchestrator.clone())
        .with_store(store)
        .with_capability(capability);
    if !config.agents.is_empty() {
        builder = builder.with_team(config.agents.clone());
    }
    Ok(builder.build().await?)
}
