use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use infra_harness::scenario::{check_echo, check_failing_echo};
use infra_harness::{logging, run_simple_creation, Host, KeyPair, ScenarioConfig, Terraform};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "infra-harness")]
#[command(about = "Provision infrastructure with Terraform and check it over SSH")]
#[command(version)]
struct Cli {
    /// Scenario file; falls back to $INFRA_HARNESS_CONFIG, then built-in defaults
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply, check over SSH, destroy
    Run,

    /// Apply only; remember to destroy
    Apply,

    /// Destroy whatever the configuration created
    Destroy,

    /// Run the SSH checks against an existing host
    CheckSsh {
        /// Address of the host; defaults to the terraform output
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the resolved configuration
    Validate,
}

fn load_config(path: Option<&PathBuf>) -> Result<ScenarioConfig> {
    let config = match path {
        Some(path) => ScenarioConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ScenarioConfig::from_env()?,
    };
    Ok(config)
}

async fn check_ssh(config: &ScenarioConfig, host: Option<String>) -> Result<()> {
    let address = match host {
        Some(host) => host,
        None => {
            let terraform = Terraform::new(config.terraform_options())?;
            terraform.output(&config.output_name).await?
        }
    };

    let key_pair = KeyPair::from_files(&config.private_key_path, &config.public_key_path)?;
    let host = Host::new(address, &key_pair, &config.ssh_user)?
        .with_port(config.ssh_port)
        .with_connect_timeout(config.connect_timeout)
        .with_ssh_program(config.ssh_program.clone());

    let output = check_echo(&host, &config.expected_text, config.retry).await?;
    println!("echo: {output}");
    let output = check_failing_echo(&host, &config.expected_text, config.retry).await?;
    println!("failing echo: {output}");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    smol::block_on(async {
        let config = load_config(cli.config.as_ref())?;

        match cli.command {
            Commands::Run => {
                let report = run_simple_creation(&config).await?;
                println!(
                    "{}: {} answered {:?} and {:?}",
                    report.name, report.public_ip, report.echo_output, report.failing_echo_output
                );
            }
            Commands::Apply => {
                let terraform = Terraform::new(config.terraform_options())?;
                terraform.init_and_apply().await?;
                let address = terraform.output(&config.output_name).await?;
                info!("Applied; {} = {}", config.output_name, address);
                println!("{address}");
            }
            Commands::Destroy => {
                let terraform = Terraform::new(config.terraform_options())?;
                terraform.destroy().await?;
                info!("Destroyed {}", config.terraform.terraform_dir.display());
            }
            Commands::CheckSsh { host } => check_ssh(&config, host).await?,
            Commands::Validate => {
                if !config.terraform.terraform_dir.is_dir() {
                    bail!(
                        "terraform_dir {} is not a directory",
                        config.terraform.terraform_dir.display()
                    );
                }
                print!("{}", serde_yaml::to_string(&config)?);
            }
        }

        Ok(())
    })
}
