//! batchdel CLI
//!
//! Entry point for the `batchdel` command-line tool.

use batchdel::config::{EffectiveConfig, DEFAULT_HOST_CONFIG};
use batchdel::logging::{init_logging, LogFormat};
use batchdel::{run_scenario, Scenario};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "batchdel")]
#[command(about = "Job and reservation deletion control plane", version)]
struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a scenario file against the simulated agent
    Run {
        /// Scenario TOML file
        scenario: PathBuf,

        /// Host config file (default: /etc/batchdel/batchdel.toml)
        #[arg(long)]
        host_config: Option<PathBuf>,

        /// Override the server name used to qualify job ids
        #[arg(long)]
        server_name: Option<String>,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show how a job identifier is classified
    Explain {
        /// The job identifier, e.g. `12[1-9:2].svr`
        job_id: String,

        /// Host config file used for the default server name
        #[arg(long)]
        host_config: Option<PathBuf>,
    },

    /// Print the effective configuration with provenance
    Config {
        /// Host config file (default: /etc/batchdel/batchdel.toml)
        #[arg(long)]
        host_config: Option<PathBuf>,

        /// Override the server name used to qualify job ids
        #[arg(long)]
        server_name: Option<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match cli.command {
        Commands::Run {
            scenario,
            host_config,
            server_name,
            json,
        } => run(&scenario, host_config, cli_overrides(server_name), json),
        Commands::Explain {
            job_id,
            host_config,
        } => explain(&job_id, host_config),
        Commands::Config {
            host_config,
            server_name,
        } => show_config(host_config, cli_overrides(server_name)),
    }
}

fn host_path(host_config: Option<PathBuf>) -> PathBuf {
    host_config.unwrap_or_else(|| PathBuf::from(DEFAULT_HOST_CONFIG))
}

/// Command-line settings layered above every file.
fn cli_overrides(server_name: Option<String>) -> Option<Value> {
    server_name.map(|name| json!({ "server_name": name }))
}

fn run(path: &Path, host_config: Option<PathBuf>, overrides: Option<Value>, json: bool) {
    let scenario = match Scenario::load(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading scenario: {}", e);
            process::exit(1);
        }
    };
    let overlay = match scenario.config_overlay() {
        Ok(o) => o,
        Err(e) => {
            eprintln!("Error in scenario config: {}", e);
            process::exit(1);
        }
    };
    let config = match EffectiveConfig::build(Some(&host_path(host_config)), overlay, overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };

    let report = match run_scenario(&scenario, config.settings) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Scenario failed: {}", e);
            process::exit(1);
        }
    };

    if json {
        match report.to_json() {
            Ok(out) => println!("{}", out),
            Err(e) => {
                eprintln!("Error serializing output: {}", e);
                process::exit(1);
            }
        }
    } else {
        print!("{}", report.human());
    }
}

fn explain(job_id: &str, host_config: Option<PathBuf>) {
    let config = match EffectiveConfig::build(Some(&host_path(host_config)), None, None) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    let explanation = batchdel_jobid::explain(job_id, &config.settings.server_name);
    match explanation.to_json() {
        Ok(out) => println!("{}", out),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
    if explanation.error.is_some() {
        process::exit(1);
    }
}

fn show_config(host_config: Option<PathBuf>, overrides: Option<Value>) {
    let config = match EffectiveConfig::build(Some(&host_path(host_config)), None, overrides) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            process::exit(1);
        }
    };
    match config.to_json() {
        Ok(out) => println!("{}", out),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
