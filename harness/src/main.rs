use azdo::{InMemoryTaskAgentClient, TaskAgentClient};
use clap::{Parser, Subcommand};
use harness::acceptance::{create_and_update_case, default_address, LiveFixture};
use harness::{generate_resource_name, state_file};
use provider::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "harness")]
#[command(about = "Manage Azure DevOps Kubernetes environment resources")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update a resource from a TOML configuration file
    Apply {
        /// Path to the resource configuration (TOML)
        #[arg(short, long)]
        config: PathBuf,
        /// Path to the state file
        #[arg(short, long, default_value = "resource.state.json")]
        state: PathBuf,
        /// Address of the resource in the state
        #[arg(short, long, default_value_t = default_address())]
        address: String,
    },
    /// Refresh a resource from the API and report drift
    Show {
        #[arg(short, long, default_value = "resource.state.json")]
        state: PathBuf,
        #[arg(short, long, default_value_t = default_address())]
        address: String,
    },
    /// Delete a resource and drop it from the state
    Destroy {
        #[arg(short, long, default_value = "resource.state.json")]
        state: PathBuf,
        #[arg(short, long, default_value_t = default_address())]
        address: String,
    },
    /// Adopt an existing resource (<project>/<environment_id>/<resource_id>)
    Import {
        id: String,
        #[arg(short, long, default_value = "resource.state.json")]
        state: PathBuf,
        #[arg(short, long, default_value_t = default_address())]
        address: String,
    },
    /// Run the create/rename/destroy acceptance lifecycle
    Lifecycle {
        /// Project the environment belongs to
        #[arg(long)]
        project: String,
        /// Environment to attach the resource to
        #[arg(long)]
        environment_id: i32,
        /// Kubernetes service connection ID
        #[arg(long)]
        service_endpoint_id: Uuid,
        /// Run against an in-process backend instead of Azure DevOps
        #[arg(long)]
        simulated: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Apply {
            config,
            state,
            address,
        } => {
            apply(&ProviderContext::from_env()?, &config, &state, &address).await?;
        }
        Commands::Show { state, address } => {
            show(&ProviderContext::from_env()?, &state, &address).await?;
        }
        Commands::Destroy { state, address } => {
            destroy(&ProviderContext::from_env()?, &state, &address).await?;
        }
        Commands::Import { id, state, address } => {
            import(&ProviderContext::from_env()?, &id, &state, &address).await?;
        }
        Commands::Lifecycle {
            project,
            environment_id,
            service_endpoint_id,
            simulated,
        } => {
            let fixture = LiveFixture {
                project_id: project,
                environment_id,
                service_endpoint_id,
            };
            let context = if simulated {
                let backend = InMemoryTaskAgentClient::new()
                    .with_environment(fixture.project_id.clone(), fixture.environment_id)
                    .with_service_endpoint(fixture.project_id.clone(), fixture.service_endpoint_id);
                ProviderContext::new(Arc::new(backend) as Arc<dyn TaskAgentClient>)
            } else {
                ProviderContext::from_env()?
            };
            lifecycle(&context, &fixture).await?;
        }
    }

    Ok(())
}

fn read_config(path: &Path) -> Result<ResourceConfig, Box<dyn std::error::Error>> {
    let contents = std::fs::read_to_string(path)?;
    let config: ResourceConfig = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

async fn apply(
    context: &ProviderContext,
    config_path: &Path,
    state_path: &Path,
    address: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let desired = read_config(config_path)?;
    let mut snapshot = state_file::load(state_path)?;
    let prior = snapshot.state(address)?;

    let outcome = context.reconciler().apply(prior.as_ref(), &desired).await?;
    snapshot.set(address, &outcome.state);
    state_file::save(state_path, &snapshot)?;

    println!(
        "{}: {} (id {})",
        address,
        outcome.plan.action(),
        outcome.state.id
    );
    Ok(())
}

async fn show(
    context: &ProviderContext,
    state_path: &Path,
    address: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = state_file::load(state_path)?;
    let Some(recorded) = snapshot.state(address)? else {
        println!("{} is not in the state", address);
        return Ok(());
    };

    match context.reconciler().read(&recorded.resource_ref()).await? {
        ReadOutcome::Found(current) => {
            if current != recorded {
                warn!("{} drifted from the recorded state", address);
                snapshot.set(address, &current);
                state_file::save(state_path, &snapshot)?;
            }
            println!("{}", serde_json::to_string_pretty(&current)?);
        }
        ReadOutcome::NotFound => {
            warn!(
                "{} no longer exists remotely; removing it from the state",
                address
            );
            snapshot.remove(address);
            state_file::save(state_path, &snapshot)?;
            println!("{} was deleted outside of this tool", address);
        }
    }
    Ok(())
}

async fn destroy(
    context: &ProviderContext,
    state_path: &Path,
    address: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = state_file::load(state_path)?;
    let Some(recorded) = snapshot.state(address)? else {
        println!("{} is not in the state", address);
        return Ok(());
    };

    context.reconciler().delete(&recorded.resource_ref()).await?;
    snapshot.remove(address);
    state_file::save(state_path, &snapshot)?;
    println!("{}: destroyed (id {})", address, recorded.id);
    Ok(())
}

async fn import(
    context: &ProviderContext,
    import_id: &str,
    state_path: &Path,
    address: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut snapshot = state_file::load(state_path)?;
    if snapshot.get(address).is_some() {
        return Err(format!("{} is already managed; destroy or remove it first", address).into());
    }

    let state = context.reconciler().import(import_id).await?;
    snapshot.set(address, &state);
    state_file::save(state_path, &snapshot)?;
    println!("{}: imported (id {})", address, state.id);
    Ok(())
}

async fn lifecycle(
    context: &ProviderContext,
    fixture: &LiveFixture,
) -> Result<(), Box<dyn std::error::Error>> {
    let first = generate_resource_name();
    let second = generate_resource_name();
    info!("Running lifecycle with {} -> {}", first, second);

    let outcomes = create_and_update_case(&default_address(), fixture, &first, &second)
        .run(context)
        .await?;

    for outcome in &outcomes {
        let actions: Vec<String> = outcome
            .plans
            .iter()
            .map(|(address, plan)| format!("{} {}", address, plan.action()))
            .collect();
        println!("step {}: {}", outcome.step, actions.join(", "));
    }
    println!("lifecycle passed");
    Ok(())
}
