use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use static_site::config::load_sites;
use static_site::deploy::{staging_bucket, Deployer};
use static_site::stack::STACK_REGION;
use static_site::synth::synthesize;
use static_site::{AppConfig, EnvVars, StaticSiteStack, TemplateFormat};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Json,
    Yaml,
}

impl From<Format> for TemplateFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Json => TemplateFormat::Json,
            Format::Yaml => TemplateFormat::Yaml,
        }
    }
}

/// Synthesize and deploy the static site stack
#[derive(Parser, Debug)]
#[command(name = "static-site")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// .env file read before the process environment (missing file is fine)
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,

    /// YAML file mapping site ids to their parameters
    #[arg(long, global = true, requires = "site")]
    sites: Option<PathBuf>,

    /// Site id to use from the sites file
    #[arg(long, global = true, requires = "sites")]
    site: Option<String>,

    /// Directory the template, manifest and zipped assets are written to
    #[arg(long, global = true, default_value = "site.out")]
    out: PathBuf,

    /// Directory containing lambdas/ and website-dist/
    #[arg(long, global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Template format
    #[arg(long, global = true, value_enum, default_value_t = Format::Json)]
    format: Format,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Write the template and asset manifest (default)
    Synth,
    /// Synthesize, publish assets and create or update the stack
    Deploy,
    /// Delete the stack
    Destroy,
    /// Print the outputs of the deployed stack
    Outputs,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let vars = EnvVars::load(&cli.env_file)?;
    let config = match (&cli.sites, &cli.site) {
        (Some(path), Some(site_id)) => {
            let sites = load_sites(path).with_context(|| format!("loading sites file {}", path.display()))?;
            AppConfig::from_sites(&sites, site_id, &vars)?
        }
        _ => AppConfig::from_env(&vars),
    };
    Ok(config)
}

fn print_outputs(outputs: &std::collections::BTreeMap<String, String>) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(outputs)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(&cli)?;
    let format = TemplateFormat::from(cli.format);
    let stack = StaticSiteStack::from_config(&config, cli.project_dir.clone());
    info!(stack = %stack.stack_name, hostname = %stack.hostname, region = STACK_REGION, "loaded configuration");

    match cli.command.unwrap_or(Commands::Synth) {
        Commands::Synth => {
            let synth = synthesize(&stack, &cli.out, format)?;
            println!("{}", synth.template_path.display());
        }
        Commands::Deploy => {
            let assets_bucket = staging_bucket(&config)?;
            let synth = synthesize(&stack, &cli.out, format)?;
            let body = format.render(&synth.template)?;
            let deployer = Deployer::new(STACK_REGION).await;
            let outputs = deployer
                .deploy(&stack.stack_name, &body, &synth.manifest, &assets_bucket)
                .await
                .with_context(|| format!("deploying {}", stack.stack_name))?;
            print_outputs(&outputs)?;
        }
        Commands::Destroy => {
            let deployer = Deployer::new(STACK_REGION).await;
            deployer.delete_stack(&stack.stack_name).await?;
        }
        Commands::Outputs => {
            let deployer = Deployer::new(STACK_REGION).await;
            print_outputs(&deployer.stack_outputs(&stack.stack_name).await?)?;
        }
    }
    Ok(())
}
