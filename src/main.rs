use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stackmate::backend::BackendClient;
use stackmate::cloud::DirectoryCloud;
use stackmate::config::RuntimeConfig;
use stackmate::deploy::{self, CommandBuilder, Deploy, FUNCTIONS_DIR, PUBLIC_DIR};
use stackmate::invoke::{Correlator, HttpCaller};
use stackmate::models::{NewNode, Project, Workspace};
use stackmate::store::{self, ProjectStore, WorkspaceStore};
use stackmate::tree_render;

const WORKSPACE_NAME: &str = "default";
const FIRST_STAGE: &str = "dev";

#[derive(Parser)]
#[command(name = "stackmate")]
#[command(about = "Incremental deploys of serverless functions and static sites")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build, diff and deploy the current project
    Deploy {
        /// Stage to deploy (defaults to the project's default stage)
        #[arg(short, long)]
        stage: Option<String>,
    },
    /// Create a new project in a new directory
    New {
        name: String,
    },
    /// Manage project stages
    Stage {
        #[command(subcommand)]
        command: StageCommands,
    },
    /// Invoke a deployed function
    Invoke {
        function: String,

        /// JSON request body
        #[arg(short, long)]
        data: Option<String>,

        #[arg(short, long)]
        stage: Option<String>,
    },
    /// Manage workspace nodes
    Node {
        #[command(subcommand)]
        command: NodeCommands,
    },
}

#[derive(Subcommand)]
enum StageCommands {
    /// Add a stage to the current project
    New {
        name: String,

        /// Node to deploy to (defaults to the workspace default node)
        #[arg(short, long)]
        node: Option<String>,
    },
    /// Tear a stage down and remove it
    Destroy { name: String },
    /// Show stages with their functions and sites
    List,
}

#[derive(Subcommand)]
enum NodeCommands {
    /// Register a cloud account/region as a node
    Add {
        name: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        region: String,
        #[arg(long)]
        bucket: String,
        /// Base URL of the node backend
        #[arg(long)]
        endpoint: String,
    },
    Remove { name: String },
    List,
}

/// Initialize tracing with output to stderr so stdout carries command output
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| "stackmate=info".into()),
    );

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let config = RuntimeConfig::from_env()?;
    let workspace_store = WorkspaceStore::open_default(&config)?;
    let mut workspace = workspace_store.load_or_create(WORKSPACE_NAME)?;

    match cli.command {
        Commands::Deploy { stage } => {
            let cwd = std::env::current_dir()?;
            let project_store = ProjectStore::discover(&cwd)?;
            let mut project = project_store.load(&workspace)?;

            let target = project.resolve_stage(stage.as_deref())?;
            let backend = BackendClient::for_stage(&config, target)?;
            let builder = CommandBuilder::from_config(&config);
            let cloud = DirectoryCloud::new(object_root(&config)?);

            let outcome = Deploy::new(
                &config,
                &project_store,
                &mut project,
                stage.as_deref(),
                &builder,
                &cloud,
                &backend,
            )
            .run()
            .await?;

            for failed in &outcome.failed_builds {
                eprintln!("Build failed for {}: {}", failed.name, failed.error);
            }
            if outcome.nothing_to_deploy {
                println!("Nothing to deploy for {}/{}", outcome.project, outcome.stage);
            } else {
                println!(
                    "Deployed {}/{}: {} added, {} updated, {} removed",
                    outcome.project,
                    outcome.stage,
                    outcome.diff.added_count(),
                    outcome.diff.updated_count(),
                    outcome.diff.removed_count()
                );
                if let Some(rest) = project.stage(&outcome.stage).and_then(|s| s.rest_endpoint()) {
                    println!("Endpoint: {}", rest);
                }
            }
        }
        Commands::New { name } => {
            let root = std::env::current_dir()?.join(&name);
            let project_store = ProjectStore::new(&root);
            if project_store.exists() {
                bail!("Project already exists at {}", root.display());
            }

            let mut project = Project::new(&name)?;
            for dir in [FUNCTIONS_DIR, PUBLIC_DIR] {
                std::fs::create_dir_all(root.join(dir))
                    .with_context(|| format!("Failed to create {}", root.join(dir).display()))?;
            }
            if let Some(node) = workspace.default_node() {
                project.add_stage(FIRST_STAGE, &node.name.clone())?;
            }
            project.wire_up(&workspace);
            project_store.save(&project)?;

            workspace.register_project(&name, &root.to_string_lossy());
            workspace_store.save(&workspace)?;
            println!("Created project {} in {}", name, root.display());
        }
        Commands::Stage { command } => {
            let cwd = std::env::current_dir()?;
            let project_store = ProjectStore::discover(&cwd)?;
            let mut project = project_store.load(&workspace)?;

            match command {
                StageCommands::New { name, node } => {
                    deploy::new_stage(
                        &project_store,
                        &mut project,
                        &workspace,
                        &name,
                        node.as_deref(),
                    )?;
                    println!("Created stage {}", name);
                }
                StageCommands::Destroy { name } => {
                    let stage = project.resolve_stage(Some(&name))?;
                    let backend = BackendClient::for_stage(&config, stage)?;
                    deploy::destroy_stage(&project_store, &mut project, &name, &backend).await?;
                    println!("Destroyed stage {}", name);
                }
                StageCommands::List => {
                    print!("{}", tree_render::render_project(&project));
                }
            }
        }
        Commands::Invoke {
            function,
            data,
            stage,
        } => {
            let cwd = std::env::current_dir()?;
            let project_store = ProjectStore::discover(&cwd)?;
            let project = project_store.load(&workspace)?;
            let stage = project.resolve_stage(stage.as_deref())?;

            let Some(endpoint) = stage.rest_endpoint() else {
                bail!("Stage {} has not been deployed yet", stage.name);
            };
            let request: serde_json::Value = match data {
                Some(data) => serde_json::from_str(&data).context("--data is not valid JSON")?,
                None => serde_json::json!({}),
            };

            let ttl = chrono::Duration::from_std(config.token_ttl)?;
            let token = stage
                .node_ref()?
                .issue_token(&project.name, &stage.name, ttl, Utc::now());
            let client = HttpCaller::client_with_timeout(config.request_timeout)?;
            let caller = HttpCaller::with_client(endpoint, Some(token), client);

            let response: Option<serde_json::Value> = Correlator::new(Arc::new(caller))
                .call(&function, &request)
                .await?;
            if let Some(response) = response {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Commands::Node { command } => run_node_command(command, &mut workspace, &workspace_store)?,
    }

    Ok(())
}

fn run_node_command(
    command: NodeCommands,
    workspace: &mut Workspace,
    workspace_store: &WorkspaceStore,
) -> anyhow::Result<()> {
    match command {
        NodeCommands::Add {
            name,
            account,
            region,
            bucket,
            endpoint,
        } => {
            let node = workspace.add_node(NewNode {
                name,
                account_id: account,
                region,
                bucket,
                endpoint,
            })?;
            println!("Added node {} ({})", node.name, node.id);
            workspace_store.save(workspace)?;
        }
        NodeCommands::Remove { name } => {
            let node = workspace.remove_node(&name)?;
            workspace_store.save(workspace)?;
            println!("Removed node {}", node.name);
        }
        NodeCommands::List => {
            for node in &workspace.nodes {
                let marker = if node.default { "*" } else { " " };
                println!(
                    "{} {} ({}) {} {} {}",
                    marker, node.name, node.id, node.account_id, node.region, node.endpoint
                );
            }
        }
    }
    Ok(())
}

fn object_root(config: &RuntimeConfig) -> anyhow::Result<PathBuf> {
    match &config.object_root {
        Some(root) => Ok(root.clone()),
        None => Ok(store::data_dir()?.join("objects")),
    }
}
