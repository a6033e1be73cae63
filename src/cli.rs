//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Message gateway tooling: validate allow-lists, check messages, parse input
#[derive(Parser, Debug)]
#[command(name = "msg-gateway")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "MSG_GATEWAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "warn",
        env = "MSG_GATEWAY_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "MSG_GATEWAY_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load the configuration and build the allow-list
    Validate,

    /// Check a message against the allow-list
    Check {
        /// Message as JSON, e.g. '{"foo":1,"a":2}'
        #[arg(required = true)]
        message: String,

        /// Pattern of the definition the message resolves to
        /// (defaults to the message's own fields)
        #[arg(short, long)]
        definition: Option<String>,
    },

    /// Parse raw request input and print the resulting document
    Parse {
        /// Input file (reads stdin when omitted)
        file: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_check_with_definition() {
        let cli = Cli::try_parse_from([
            "msg-gateway",
            "--config",
            "gw.yaml",
            "check",
            r#"{"foo":1}"#,
            "--definition",
            "foo:1",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("gw.yaml")));
        match cli.command {
            Command::Check { message, definition } => {
                assert_eq!(message, r#"{"foo":1}"#);
                assert_eq!(definition.as_deref(), Some("foo:1"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Cli::try_parse_from(["msg-gateway"]).is_err());
    }

    #[test]
    fn parse_reads_stdin_by_default() {
        let cli = Cli::try_parse_from(["msg-gateway", "parse"]).unwrap();
        assert!(matches!(cli.command, Command::Parse { file: None }));
    }
}
