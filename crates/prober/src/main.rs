mod output;
mod runner;
mod telemetry;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use prober_core::config::Config;
use prober_core::time::parse_duration_str;

use crate::output::{print_check_human, print_points};
use crate::runner::Runner;
use crate::telemetry::{LogFormat, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "prober")]
#[command(about = "Per-rule metric collection with policy filtering and hot reload")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true)]
    json: bool,

    #[arg(long, global = true)]
    rules: Option<PathBuf>,

    #[arg(long, global = true)]
    policies: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Collect on an interval and reload definitions as they change")]
    Run {
        #[arg(long, help = "Collection interval (e.g. 10s)")]
        interval: Option<String>,
        #[arg(long, help = "Reload interval for rule and policy files (e.g. 30s)")]
        reload_interval: Option<String>,
    },
    #[command(about = "Run a single collection cycle and print the published points")]
    Once,
    #[command(about = "Validate rule and policy files")]
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(LogFormat::from_env());

    let mut cfg = Config::load().context("loading configuration")?;
    if let Some(path) = cli.rules {
        cfg.rules_path = path;
    }
    if let Some(path) = cli.policies {
        cfg.policies_path = path;
    }

    let runner = Runner::load(&cfg).with_context(|| {
        format!(
            "loading rules from {} and policies from {}",
            cfg.rules_path.display(),
            cfg.policies_path.display()
        )
    })?;

    match cli.command {
        Commands::Run {
            interval,
            reload_interval,
        } => {
            if let Some(v) = interval {
                cfg.collect_interval = parse_duration_str(&v)?;
            }
            if let Some(v) = reload_interval {
                cfg.reload_interval = parse_duration_str(&v)?;
            }
            anyhow::ensure!(
                !cfg.collect_interval.is_zero() && !cfg.reload_interval.is_zero(),
                "intervals must be greater than zero"
            );

            let json = cli.json;
            runner
                .run(
                    cfg.collect_interval,
                    cfg.reload_interval,
                    |points| {
                        if let Err(e) = print_points(points, json) {
                            tracing::warn!(error = %e, "failed to print points");
                        }
                    },
                    async {
                        let _ = tokio::signal::ctrl_c().await;
                    },
                )
                .await;
            Ok(())
        }
        Commands::Once => {
            let points = runner.run_cycle();
            print_points(&points, cli.json)
        }
        Commands::Check => {
            if cli.json {
                let rules = runner
                    .manager()
                    .rules()
                    .iter()
                    .map(|r| (*r.definition()).clone())
                    .collect::<Vec<_>>();
                let summary = serde_json::json!({
                    "rules": rules,
                    "policies": runner.policies().names(),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_check_human(runner.manager(), runner.policies());
            }
            Ok(())
        }
    }
}
