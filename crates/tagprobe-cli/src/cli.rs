//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tagprobe")]
#[command(author, version, about = "Interactive test bench for BLE peripherals", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Config file to use instead of the default
    #[arg(short = 'c', long = "config", global = true, env = "TAGPROBE_CONFIG")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start scanning and read bench commands from stdin (default)
    Run(RunArgs),

    /// List the registered tests
    Tests,

    /// Show configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Use a simulated SensorTag instead of the Bluetooth adapter
    #[arg(long)]
    pub demo: bool,

    /// Host adapter index (overrides config)
    #[arg(short, long)]
    pub adapter: Option<usize>,

    /// Only report devices whose name contains this text (overrides config)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Report each device once instead of every advertisement
    #[arg(long)]
    pub no_duplicates: bool,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the config file path
    Path,
    /// Print the effective configuration
    Show,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_is_optional() {
        let cli = Cli::try_parse_from(["tagprobe"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_run_args() {
        let cli =
            Cli::try_parse_from(["tagprobe", "run", "--demo", "-a", "1", "-n", "Tag"]).unwrap();
        match cli.command {
            Some(Commands::Run(args)) => {
                assert!(args.demo);
                assert_eq!(args.adapter, Some(1));
                assert_eq!(args.name.as_deref(), Some("Tag"));
                assert!(!args.no_duplicates);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["tagprobe", "-v", "-q", "tests"]).is_err());
    }
}
