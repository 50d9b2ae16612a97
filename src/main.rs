use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use salt_describe::config::{load_describe_config, resolve_config_dir};
use salt_describe::describe::{
    ConfigSystem, DescribeOrchestrator, DescribeRequest, DescriberRegistry,
};
use salt_describe::remote::{SaltCliExecutor, TargetType};

#[derive(Parser)]
#[command(name = "salt-describe")]
#[command(
    about = "Describe the live state of minions as Salt states or Ansible playbooks"
)]
#[command(version)]
struct Cli {
    /// Configuration directory (default: /etc/salt-describe if exists, otherwise ~/.config/salt-describe)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query minions and generate state files
    Describe {
        /// What to describe (a describer name from `list`, or `all`)
        fact: String,
        /// Target expression selecting minions
        tgt: String,
        /// How the target expression is matched
        #[arg(long, value_enum, default_value_t = TargetType::Glob)]
        tgt_type: TargetType,
        /// Dialect of the generated files
        #[arg(long, value_enum, default_value_t = ConfigSystem::Salt)]
        config_system: ConfigSystem,
        /// Python environment or pip binary queried by the pip describer
        #[arg(long)]
        bin_env: Option<String>,
        /// Hosts entry for generated Ansible playbooks
        #[arg(long)]
        hosts: Option<String>,
    },
    /// List available describers
    List,
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::List => {
            for describer in DescriberRegistry::all() {
                println!("{:<12} {}", describer.name(), describer.description());
            }
        }
        Commands::Describe {
            fact,
            tgt,
            tgt_type,
            config_system,
            bin_env,
            hosts,
        } => {
            let config_dir = resolve_config_dir(cli.config);
            debug!(config_dir = %config_dir.display(), "loading configuration");
            let config = load_describe_config(&config_dir)?;

            let mut request = DescribeRequest::new(tgt)
                .with_target_type(tgt_type)
                .with_config_system(config_system);
            if let Some(bin_env) = bin_env {
                request = request.with_bin_env(bin_env);
            }
            if let Some(hosts) = hosts {
                request = request.with_hosts(hosts);
            }

            let executor = Arc::new(SaltCliExecutor::new(config.salt.clone()));
            let orchestrator = DescribeOrchestrator::new(executor, config);

            let report = if fact == "all" {
                orchestrator.describe_all(&request).await?
            } else {
                orchestrator.describe_by_name(&fact, &request).await?
            };

            print!("{}", report);
            if !report.is_success() {
                error!("Some files could not be written");
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
