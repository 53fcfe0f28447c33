//! Agentflow CLI
//!
//! `agentflow run "<goal>"` drives a single agent loop;
//! `agentflow flow run <workflow.json>` executes a workflow.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agentflow::agent::Agent;
use agentflow::config::{self, Config};
use agentflow::flow::{FlowEngine, FlowStatus, Workflow};
use agentflow::llm::OpenAiClient;
use agentflow::mcp::{DiscoveryConfig, DiscoveryService};
use agentflow::storage::store_from_config;
use agentflow::tools::ToolRegistry;
use agentflow::VERSION;

#[derive(Parser)]
#[command(
    name = "agentflow",
    author = "Agentflow Contributors",
    version = VERSION,
    about = "Agentflow - LLM agent runtime with MCP tools and workflows",
    long_about = None
)]
struct Cli {
    /// Path to a configuration file (TOML or JSON5)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level filter (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single goal to completion
    Run {
        /// The natural-language goal
        goal: String,
    },

    /// Workflow commands
    Flow {
        #[command(subcommand)]
        action: FlowCommands,
    },
}

#[derive(Subcommand)]
enum FlowCommands {
    /// Execute a workflow definition file
    Run {
        /// Path to a workflow JSON file
        workflow: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(format!("agentflow={}", cli.log_level))
            }),
        )
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => config::load_config_from_path(path)?,
        None => Config::load()?,
    };
    config::apply_env_overrides(&mut config);

    let validation = config::validate_config(&config);
    for warning in &validation.warnings {
        warn!("config: {}", warning);
    }
    if !validation.is_valid() {
        anyhow::bail!("invalid configuration: {}", validation.errors.join("; "));
    }

    match cli.command {
        Commands::Run { goal } => run_goal(config, &goal).await,
        Commands::Flow {
            action: FlowCommands::Run { workflow },
        } => run_flow(config, &workflow).await,
    }
}

/// Build the shared registry, folding in MCP catalogs when configured
async fn build_registry(config: &Config, token: &CancellationToken) -> anyhow::Result<Arc<ToolRegistry>> {
    let registry = Arc::new(ToolRegistry::new());

    if !config.mcp.servers.is_empty() {
        let discovery = Arc::new(DiscoveryService::new(
            &config.mcp.servers,
            Arc::clone(&registry),
            DiscoveryConfig {
                refresh_interval: config.mcp.refresh_interval,
            },
        )?);
        // Initial discovery happens inside start(); the background task
        // keeps refreshing until the token fires.
        tokio::spawn(Arc::clone(&discovery).start(token.clone()));

        // Give the first discovery pass a moment so the planner sees
        // remote tools on the very first step.
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        info!(tools = registry.len(), "registry ready");
    }

    Ok(registry)
}

async fn run_goal(config: Config, goal: &str) -> anyhow::Result<()> {
    let token = CancellationToken::new();
    let registry = build_registry(&config, &token).await?;
    let model = Arc::new(OpenAiClient::new(config.llm.clone())?);
    let store = store_from_config(&config.storage);

    let agent = Agent::new(model, registry, config.agent.clone());
    let result = agent.run(&token, goal).await;
    token.cancel();

    if let Some(trace) = agent.trace() {
        match store.save(&trace).await {
            Ok(key) => info!(key, "trace saved"),
            Err(e) => warn!(error = %e, "failed to save trace"),
        }
    }

    let answer = result?;
    println!("{}", answer);
    Ok(())
}

async fn run_flow(config: Config, workflow_path: &PathBuf) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(workflow_path)?;
    let workflow: Workflow = serde_json::from_str(&content)?;

    let token = CancellationToken::new();
    let registry = build_registry(&config, &token).await?;
    let model = Arc::new(OpenAiClient::new(config.llm.clone())?);

    let engine = FlowEngine::new(model, registry, config.agent.clone());
    let id = engine.execute(workflow, HashMap::new())?;

    let mut events = engine.subscribe(&id).expect("execution just created");
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.task_id {
                Some(task_id) => info!(flow = %event.flow_id, task = %task_id, "{:?}", event.kind),
                None => info!(flow = %event.flow_id, "{:?}", event.kind),
            }
        }
    });

    let execution = loop {
        match engine.get_execution(&id).await {
            Some(execution)
                if execution.status != FlowStatus::Running
                    && execution.status != FlowStatus::Pending =>
            {
                break execution;
            }
            Some(_) => tokio::time::sleep(std::time::Duration::from_millis(100)).await,
            None => anyhow::bail!("execution disappeared"),
        }
    };
    token.cancel();
    printer.abort();

    println!("{}", serde_json::to_string_pretty(&execution.output)?);

    match execution.status {
        FlowStatus::Completed => Ok(()),
        status => anyhow::bail!(
            "flow ended with status {}: {}",
            status,
            execution.error.unwrap_or_default()
        ),
    }
}
