//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use glucopatch_cli::config::DiscoveryOverrides;

/// Output format for commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Csv,
}

/// Reusable discovery arguments.
///
/// Anything left unset falls back to the config file.
#[derive(Debug, Clone, Default, Args)]
pub struct FilterArgs {
    /// Scan duration in seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    /// Report every device in range, not just patches
    #[arg(long, conflicts_with = "prefix")]
    pub all: bool,

    /// Only report devices whose advertised name starts with this prefix
    #[arg(long)]
    pub prefix: Option<String>,
}

impl From<FilterArgs> for DiscoveryOverrides {
    fn from(args: FilterArgs) -> Self {
        Self {
            timeout_secs: args.timeout,
            accept_all: args.all,
            name_prefix: args.prefix,
        }
    }
}

#[derive(Parser)]
#[command(name = "glucopatch")]
#[command(author, version, about = "CLI for GlucoPatch glucose/temperature sensor patches", long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Output compact JSON (no pretty-printing)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Disable colored output (any non-empty `NO_COLOR` value counts)
    #[arg(
        long,
        global = true,
        env = "NO_COLOR",
        value_parser = clap::builder::FalseyValueParser::new()
    )]
    pub no_color: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Write output to file instead of stdout
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for nearby patches
    Scan {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Connect to a patch and print readings as they arrive
    Watch {
        /// Device identifier or name, or use GLUCOPATCH_DEVICE env var
        #[arg(short, long, env = "GLUCOPATCH_DEVICE")]
        device: Option<String>,

        #[command(flatten)]
        filter: FilterArgs,

        /// Number of readings to print before exiting (0 for unlimited)
        #[arg(short = 'n', long, default_value = "0")]
        count: u32,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Omit header row in CSV output (useful for appending)
        #[arg(long)]
        no_header: bool,

        /// Use a simulated patch instead of Bluetooth
        #[arg(long)]
        demo: bool,
    },

    /// Decode one notification payload (argument or stdin)
    Decode {
        /// Raw payload; read from stdin when omitted
        payload: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Launch interactive terminal dashboard
    #[cfg(feature = "tui")]
    Dashboard {
        /// Device identifier or name, or use GLUCOPATCH_DEVICE env var
        #[arg(short, long, env = "GLUCOPATCH_DEVICE")]
        device: Option<String>,

        /// Use a simulated patch instead of Bluetooth
        #[arg(long)]
        demo: bool,
    },

    /// Manage configuration
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

/// Configuration subcommands
#[derive(Debug, Clone, Copy, Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_scan_flags() {
        let cli = Cli::parse_from(["glucopatch", "scan", "--timeout", "3", "--prefix", "PATCH"]);
        let Commands::Scan { filter, format } = cli.command else {
            panic!("expected scan");
        };
        assert_eq!(filter.timeout, Some(3));
        assert_eq!(filter.prefix.as_deref(), Some("PATCH"));
        assert!(!filter.all);
        assert_eq!(format, OutputFormat::Text);
    }

    #[test]
    fn test_all_conflicts_with_prefix() {
        let result = Cli::try_parse_from(["glucopatch", "scan", "--all", "--prefix", "X"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_watch_flags() {
        let cli = Cli::parse_from([
            "glucopatch",
            "watch",
            "--device",
            "AA:BB:CC:DD:EE:FF",
            "-n",
            "5",
            "--format",
            "csv",
            "--demo",
        ]);
        let Commands::Watch {
            device,
            count,
            format,
            demo,
            ..
        } = cli.command
        else {
            panic!("expected watch");
        };
        assert_eq!(device.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(count, 5);
        assert_eq!(format, OutputFormat::Csv);
        assert!(demo);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "glucopatch",
            "decode",
            "{}",
            "--config",
            "/tmp/gp.toml",
            "--quiet",
        ]);
        assert!(cli.quiet);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/gp.toml")));
        assert!(matches!(cli.command, Commands::Decode { payload: Some(_), .. }));
    }

    #[test]
    fn test_filter_args_become_overrides() {
        let cli = Cli::parse_from(["glucopatch", "scan", "--all", "-t", "8"]);
        let Commands::Scan { filter, .. } = cli.command else {
            panic!("expected scan");
        };
        let overrides = DiscoveryOverrides::from(filter);
        assert!(overrides.accept_all);
        assert_eq!(overrides.timeout_secs, Some(8));
        assert!(overrides.name_prefix.is_none());
    }

    #[test]
    fn test_no_color_is_a_plain_flag() {
        let cli = Cli::parse_from(["glucopatch", "--no-color", "config", "path"]);
        assert!(cli.no_color);
        let cli = Cli::parse_from(["glucopatch", "config", "path", "--no-color"]);
        assert!(cli.no_color);
    }

    #[test]
    fn test_quiet_conflicts_with_verbose() {
        assert!(Cli::try_parse_from(["glucopatch", "-v", "-q", "config", "path"]).is_err());
    }
}
