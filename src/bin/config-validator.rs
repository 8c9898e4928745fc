//! # Federation Configuration Validator
//!
//! Command-line tool for validating federation configuration files across
//! environments before a node is started.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use federation_core::config::{ConfigManager, FederationConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate federation configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (development, test, production, ...)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Configuration directory path (default: $FEDERATION_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Validate every configuration section
    All,

    /// Validate one section
    Component {
        /// circuit_breaker, health, failover, federation, rate_limit, events
        name: String,
    },

    /// Print the merged configuration as JSON with secrets masked
    Show,

    /// List environments that have an override file
    Environments,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::All) | None => validate_all_config(&cli),
        Some(Commands::Component { name }) => validate_component(&cli, name),
        Some(Commands::Show) => show_config(&cli),
        Some(Commands::Environments) => list_environments(&cli),
    };

    match result {
        Ok(()) => {
            info!(environment = %cli.environment, "Configuration check finished");
            process::exit(0);
        }
        Err(e) => {
            error!("Configuration validation failed: {:#}", e);
            eprintln!("❌ {e:#}");
            process::exit(1);
        }
    }
}

fn load(cli: &Cli) -> anyhow::Result<std::sync::Arc<ConfigManager>> {
    ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .with_context(|| format!("loading configuration for environment '{}'", cli.environment))
}

fn validate_all_config(cli: &Cli) -> anyhow::Result<()> {
    println!("🔧 Checking federation configuration");
    println!("Environment: {}", cli.environment);

    let manager = load(cli)?;
    println!("Config Directory: {}", manager.config_directory().display());
    println!("✅ Configuration loaded and validated");
    println!();

    let config = manager.config();
    for section in SECTIONS {
        describe_section(config, section)?;
    }

    println!("\n🎉 Every section loaded and validated");
    Ok(())
}

const SECTIONS: [&str; 6] = [
    "circuit_breaker",
    "health",
    "failover",
    "federation",
    "rate_limit",
    "events",
];

fn validate_component(cli: &Cli, name: &str) -> anyhow::Result<()> {
    println!("🔧 Validating Component: {name}");
    let manager = load(cli)?;
    describe_section(manager.config(), &name.to_lowercase().replace('-', "_"))?;
    println!("✅ Component '{name}' validation passed!");
    Ok(())
}

fn describe_section(config: &FederationConfig, section: &str) -> anyhow::Result<()> {
    match section {
        "circuit_breaker" => {
            let cb = &config.circuit_breaker;
            println!("⚡ Circuit breaker");
            println!(
                "   ✅ threshold {} / state ttl {}s / retry timeout {}s",
                cb.failure_threshold, cb.state_ttl_seconds, cb.retry_timeout_seconds
            );
        }
        "health" => {
            let health = &config.health;
            println!("💓 Health scoring");
            println!(
                "   ✅ record ttl {}s / failure penalty {} / round-robin floor {}",
                health.record_ttl_seconds, health.recent_failure_penalty, health.round_robin_min_health
            );
        }
        "failover" => {
            let failover = &config.failover;
            println!("🔁 Failover");
            println!(
                "   ✅ strategy {} / max attempts {} / attempt timeout {}ms",
                failover.strategy,
                failover
                    .max_attempts
                    .map_or_else(|| "all candidates".to_string(), |n| n.to_string()),
                failover.attempt_timeout_ms
            );
            let mut priorities: Vec<_> = failover.provider_priorities.iter().collect();
            priorities.sort();
            for (provider, priority) in priorities {
                println!("   • {provider}: {priority}");
            }
        }
        "federation" => {
            let federation = &config.federation;
            println!("🌐 Node federation");
            println!(
                "   ✅ bind {} / request timeout {}ms / signed tokens {}",
                federation.bind_address, federation.request_timeout_ms, federation.auth.tokens_enabled
            );
            if federation.auth.registration_key.is_none() {
                println!("   ℹ️  Registration is open (no registration key configured)");
            }
        }
        "rate_limit" => {
            let rate_limit = &config.rate_limit;
            println!("🚦 Rate limiting");
            println!(
                "   ✅ enabled {} / {} requests per {}s",
                rate_limit.enabled, rate_limit.max_requests, rate_limit.window_seconds
            );
        }
        "events" => {
            println!("📡 Events");
            println!("   ✅ channel capacity {}", config.events.channel_capacity);
        }
        other => bail!("Unknown component: {other}"),
    }
    Ok(())
}

fn show_config(cli: &Cli) -> anyhow::Result<()> {
    let manager = load(cli)?;
    println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
    Ok(())
}

fn list_environments(cli: &Cli) -> anyhow::Result<()> {
    let directory = cli.config_dir.clone().unwrap_or_else(|| {
        std::env::var("FEDERATION_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    });
    println!("📋 Available Environments in {}:", directory.display());

    if !directory.exists() {
        println!("❌ Configuration directory not found");
        return Ok(());
    }

    let mut environments = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
        let name = entry?.file_name().to_string_lossy().to_string();
        if let Some(environment) = name
            .strip_prefix("federation.")
            .and_then(|rest| rest.strip_suffix(".toml"))
        {
            environments.push(environment.to_string());
        }
    }
    environments.sort();

    for environment in environments {
        println!("  • {environment}");
    }
    Ok(())
}
