//! msg-gateway - message gateway tooling
//!
//! Validates gateway configuration, checks messages against the allow-list
//! and shows how raw input is parsed.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{debug, info};

use msg_gateway::{
    allow::AllowRegistry,
    cli::{Cli, Command},
    config::GatewayConfig,
    input::{parse_failure, parse_raw_input},
    pattern::PatternKey,
    setup_tracing,
};

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let Cli {
        config, command, ..
    } = cli;
    match command {
        Command::Validate => run_validate(config),
        Command::Check {
            message,
            definition,
        } => run_check(config, &message, definition.as_deref()),
        Command::Parse { file } => run_parse(file),
    }
}

fn load_allow(config: Option<PathBuf>) -> Result<Option<AllowRegistry>, String> {
    let config = GatewayConfig::load(config.as_deref()).map_err(|e| e.to_string())?;
    config
        .allow
        .as_ref()
        .map(AllowRegistry::from_config)
        .transpose()
        .map_err(|e| e.to_string())
}

/// Load the configuration and build the allow-list
fn run_validate(config: Option<PathBuf>) -> ExitCode {
    match load_allow(config) {
        Ok(Some(allow)) => {
            println!("✅ Configuration valid: {} allow rule(s)", allow.len());
            for shape in allow.shapes() {
                println!("   {shape}");
            }
            ExitCode::SUCCESS
        }
        Ok(None) => {
            println!("✅ Configuration valid: no allow-list, all messages allowed");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Check one message against the allow-list
fn run_check(config: Option<PathBuf>, message: &str, definition: Option<&str>) -> ExitCode {
    let allow = match load_allow(config) {
        Ok(Some(allow)) => allow,
        Ok(None) => {
            println!("✅ allowed (no allow-list configured)");
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let document = parse_raw_input(message);
    let Some(object) = document.as_object().filter(|_| parse_failure(&document).is_none()) else {
        eprintln!("❌ Message must be a JSON object");
        return ExitCode::FAILURE;
    };
    let fields = PatternKey::from_message(object);

    let shape = match definition.map(PatternKey::parse).transpose() {
        Ok(shape) => shape.unwrap_or_else(|| fields.clone()),
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    debug!(shape = %shape, fields = %fields, "Checking message");

    let decision = allow.check(&shape, &fields);
    match serde_json::to_string_pretty(&decision) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ Failed to serialize decision: {e}");
            return ExitCode::FAILURE;
        }
    }
    if decision.allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Parse raw input from a file or stdin
fn run_parse(file: Option<PathBuf>) -> ExitCode {
    let raw = match &file {
        Some(path) => std::fs::read(path),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf).map(|_| buf)
        }
    };
    let raw = match raw {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("❌ Failed to read input: {e}");
            return ExitCode::FAILURE;
        }
    };
    info!(bytes = raw.len(), "Parsing input");

    let document = parse_raw_input(&raw);
    match serde_json::to_string_pretty(&document) {
        Ok(json) => println!("{json}"),
        Err(e) => {
            eprintln!("❌ Failed to serialize document: {e}");
            return ExitCode::FAILURE;
        }
    }
    if parse_failure(&document).is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
