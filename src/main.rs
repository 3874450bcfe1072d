// Path Gate - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// CLI and MCP stdio server. Every path-bearing tool call is validated here
// before it reaches the filesystem.
// Usage:
//   path-gate serve                                  # Run MCP server (stdio)
//   path-gate check <path> --intent read|write|create   # One-shot validation
//   path-gate config                                 # Show effective config

use anyhow::Result;
use clap::{Parser, Subcommand};
use path_gate::config::GatewayConfig;
use path_gate::mcp::Gateway;
use path_gate::validate::{BoundaryIntent, Intent};
use serde_json::json;
use std::path::PathBuf;

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("path-gate/config.json"))
}

#[derive(Parser)]
#[command(name = "path-gate")]
#[command(author = "Joseph Stone")]
#[command(version)]
#[command(about = "Path Gate - MCP filesystem and fetch gateway with path access control")]
struct Cli {
    /// JSON config file (default: <config dir>/path-gate/config.json if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Allowed directories, ':'-separated (';' on Windows). Overrides config and env.
    #[arg(long, global = true)]
    allowed_paths: Option<String>,

    /// Workspace root that relative paths resolve against
    #[arg(long, global = true)]
    workspace: Option<PathBuf>,

    /// Reject caller paths starting with '~'
    #[arg(long, global = true)]
    no_tilde: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run MCP server (stdio JSON-RPC)
    Serve,

    /// Validate one path and print the outcome as JSON. Exits 1 when rejected.
    Check {
        /// Raw path, exactly as a tool caller would send it
        path: String,

        /// read, write or create
        #[arg(long, default_value = "read")]
        intent: BoundaryIntent,
    },

    /// Print the effective config and the resolved allowed directories
    Config,
}

impl Cli {
    /// defaults < file < environment < flags
    fn load_config(&self) -> Result<GatewayConfig> {
        let mut config = match &self.config {
            Some(path) => GatewayConfig::load(path)?,
            None => match default_config_path().filter(|p| p.exists()) {
                Some(path) => GatewayConfig::load(&path)?,
                None => GatewayConfig::default(),
            },
        };

        config.apply_env();

        if let Some(list) = &self.allowed_paths {
            config.allowed_paths = list.clone();
        }
        if let Some(root) = &self.workspace {
            config.workspace_root = Some(root.clone());
        }
        if self.no_tilde {
            config.expand_tilde = false;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Initialize logging (safe if already init)
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    let cli = Cli::parse();
    let config = cli.load_config()?;
    let validator = config.build_validator()?;

    match &cli.command {
        Commands::Serve => {
            let gateway = Gateway::new(validator, &config)?;
            gateway.run();
        }

        Commands::Check { path, intent } => {
            let intent = Intent::from(*intent);
            match validator.validate(path, intent) {
                Ok(resolved) => {
                    let out = json!({"input": path, "intent": intent, "allowed": true, "path": resolved});
                    println!("{}", serde_json::to_string_pretty(&out)?);
                }
                Err(e) => {
                    let out = json!({
                        "input": path,
                        "intent": intent,
                        "allowed": false,
                        "error": {"kind": e.kind(), "message": e.to_string()},
                    });
                    println!("{}", serde_json::to_string_pretty(&out)?);
                    std::process::exit(1);
                }
            }
        }

        Commands::Config => {
            let out = json!({
                "config": config,
                "workspace_root": validator.resolver().workspace_root(),
                "allowed_directories": validator.allowed().entries(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }

    Ok(())
}
