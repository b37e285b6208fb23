// CmdGuard - Main Entry Point
//
// Loads configuration, builds the security policy, and either serves MCP over
// stdio or runs a single command from the command line.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cmdguard_server::config::Config;
use cmdguard_server::logging;
use cmdguard_server::mcp::{McpHandler, McpServer};
use cmdguard_server::tools::{CommandOutcome, CommandService};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

/// CmdGuard: allowlist-only command execution for LLM clients
#[derive(Parser, Debug)]
#[command(name = "cmdguard")]
#[command(author = "CmdGuard Contributors")]
#[command(version)]
#[command(about = "Sandboxed command execution server for MCP clients", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a TOML configuration file
    #[arg(short, long, global = true, env = "CMDGUARD_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve MCP over stdin/stdout (default)
    Serve,
    /// Validate a command without running it
    Check {
        /// Command string, exactly as a client would send it
        command: String,
    },
    /// Validate and run a command once
    Run {
        /// Command string, exactly as a client would send it
        command: String,
    },
    /// Print the active security rules
    Rules {
        /// Print as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&config.logging, args.verbose)?;

    let policy = config
        .security_policy()
        .context("Invalid security policy")?;
    let service = Arc::new(CommandService::new(Arc::new(policy)));

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(service).await,
        Commands::Check { command } => Ok(check(&service, &command)),
        Commands::Run { command } => run(&service, &command).await,
        Commands::Rules { json } => rules(&service, json),
    }
}

/// Serve until stdin closes or Ctrl-C
async fn serve(service: Arc<CommandService>) -> Result<ExitCode> {
    info!(
        "CmdGuard v{} serving {}",
        env!("CARGO_PKG_VERSION"),
        service.policy().allowed_dir().display()
    );

    let server = McpServer::new(McpHandler::new(service));
    tokio::select! {
        result = server.serve(tokio::io::stdin(), tokio::io::stdout()) => {
            result.context("MCP server failed")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            warn!("Interrupted, aborting in-flight requests");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn check(service: &CommandService, command: &str) -> ExitCode {
    match service.check_command(command) {
        Ok(parsed) => {
            println!("OK: {} {}", parsed.name, parsed.argv().join(" "));
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Rejected ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(service: &CommandService, command: &str) -> Result<ExitCode> {
    let outcome = service.run_command(command).await;

    match &outcome {
        CommandOutcome::Completed(result) => {
            std::io::stdout().write_all(&result.stdout)?;
            std::io::stdout().flush()?;
            std::io::stderr().write_all(&result.stderr)?;
            eprintln!("Command completed with return code: {}", result.exit_code);
            if result.truncated() {
                eprintln!("[Output truncated]");
            }
            Ok(ExitCode::SUCCESS)
        }
        CommandOutcome::Rejected(_) => {
            for line in outcome.to_text() {
                eprintln!("{}", line);
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

fn rules(service: &CommandService, json: bool) -> Result<ExitCode> {
    let snapshot = service.show_security_rules();
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot).context("Failed to serialize rules")?
        );
    } else {
        print!("{}", snapshot);
    }
    Ok(ExitCode::SUCCESS)
}
