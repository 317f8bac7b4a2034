mod bench;
mod cli;
mod config;
mod render;

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use tagprobe_core::{BleAdapter, BtleplugAdapter, MockAdapter, Orchestrator, ScanOptions, TESTS};

use crate::bench::{Bench, BenchCommand, Flow};
use crate::cli::{Cli, Commands, ConfigAction, RunArgs};
use crate::config::{Config, default_config_path};
use crate::render::Renderer;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Handle completions command early (before tracing init)
    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "tagprobe", &mut io::stdout());
        return Ok(());
    }

    let config_path = cli.config_file.clone().unwrap_or_else(default_config_path);
    let config = Config::load_validated(&config_path)?;

    // Diagnostics go to stderr; stdout carries the event log.
    let filter = if cli.quiet {
        EnvFilter::new("warn")
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    match cli.command.unwrap_or_else(|| Commands::Run(RunArgs::default())) {
        Commands::Run(args) => run(config, args).await?,
        Commands::Tests => {
            for test in TESTS {
                println!("{:<26} {}", test.id, test.title);
            }
        }
        Commands::Config { action } => match action {
            ConfigAction::Path => println!("{}", config_path.display()),
            ConfigAction::Show => print!("{}", config.to_toml()?),
        },
        Commands::Completions { .. } => {
            // Already handled above
            unreachable!()
        }
    }

    Ok(())
}

async fn run(config: Config, args: RunArgs) -> Result<()> {
    let demo = args.demo.then(|| Arc::new(MockAdapter::new()));
    let adapter: Arc<dyn BleAdapter> = match &demo {
        Some(mock) => mock.clone(),
        None => {
            let index = args.adapter.unwrap_or(config.adapter.index);
            let adapter = BtleplugAdapter::with_index(index)
                .await
                .with_context(|| format!("Failed to open Bluetooth adapter {}", index))?;
            Arc::new(adapter.with_name_filter(args.name.or(config.adapter.name_filter)))
        }
    };
    let options =
        ScanOptions::default().allow_duplicates(config.scan.allow_duplicates && !args.no_duplicates);

    let orchestrator = Orchestrator::builder(adapter).scan_options(options).start();
    let result = interact(&orchestrator, demo).await;
    orchestrator.shutdown().await;
    result
}

async fn interact(orchestrator: &Orchestrator, demo: Option<Arc<MockAdapter>>) -> Result<()> {
    let bench = Bench::new(orchestrator, demo);
    let mut renderer = Renderer::new();
    let mut states = orchestrator.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    print_lines(&mut stdout, renderer.render(&orchestrator.state()))?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = states.borrow_and_update().clone();
                print_lines(&mut stdout, renderer.render(&state))?;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match line.parse::<BenchCommand>() {
                    Ok(command) => {
                        if bench.execute(command, &mut stdout)? == Flow::Quit {
                            break;
                        }
                    }
                    Err(e) => writeln!(stdout, "{}", e)?,
                }
                stdout.flush()?;
            }
        }
    }
    Ok(())
}

fn print_lines(out: &mut impl Write, lines: Vec<String>) -> Result<()> {
    for line in lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}
