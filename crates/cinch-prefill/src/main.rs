//! Inspect, apply, and exercise a workspace's `PREFILL.md`.
//!
//! `ask` reads the API key from the `OPENROUTER_KEY` environment variable.
//!
//! # Examples
//!
//! ```sh
//! # Show the prefill a workspace would inject
//! prefill show --workspace ./agent
//!
//! # Just report whether it is enabled
//! prefill show --workspace ./agent --check
//!
//! # Strip the prefill from a saved reply
//! cat reply.txt | prefill strip --workspace ./agent --explain
//!
//! # Run one turn with the prefill injected and stripped
//! prefill ask --workspace ./agent --user "Review src/lib.rs" \
//!   --model anthropic/claude-sonnet-4
//! ```

use cinch_prefill::prelude::*;
use clap::{Args, Parser, Subcommand};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;
use tracing::Level;

/// Inspect, apply, and exercise a workspace's PREFILL.md.
#[derive(Parser)]
#[command(name = "prefill")]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the prefill a workspace would inject
    Show {
        #[command(flatten)]
        workspace: WorkspaceArg,

        /// Print only "enabled" or "disabled"
        #[arg(long)]
        check: bool,
    },
    /// Strip a prefill from a model reply
    Strip {
        #[command(flatten)]
        workspace: WorkspaceArg,

        /// Prefill text to strip (overrides the workspace file)
        #[arg(long)]
        prefill: Option<String>,

        /// Reply text (read from stdin when omitted)
        #[arg(long)]
        response: Option<String>,

        /// Report the matching tier on stderr
        #[arg(long)]
        explain: bool,
    },
    /// Run one turn against OpenRouter with the prefill applied
    Ask(AskArgs),
}

#[derive(Args)]
struct WorkspaceArg {
    /// Workspace root containing PREFILL.md
    #[arg(long, default_value = ".")]
    workspace: PathBuf,
}

#[derive(Args)]
struct AskArgs {
    #[command(flatten)]
    workspace: WorkspaceArg,

    /// System prompt
    #[arg(long)]
    system: Option<String>,

    /// User message to send
    #[arg(long)]
    user: Option<String>,

    /// Read user content from stdin
    #[arg(long)]
    stdin: bool,

    /// Model to use
    #[arg(long, default_value = cinch_prefill::DEFAULT_MODEL)]
    model: String,

    /// Maximum tokens in the response
    #[arg(long, default_value_t = 1024)]
    max_tokens: u32,

    /// Sampling temperature (0.0 = deterministic, 2.0 = very creative)
    #[arg(long, default_value_t = 0.7)]
    temperature: f32,

    /// Stop sequence(s)
    #[arg(long)]
    stop: Vec<String>,

    /// Print the raw reply instead of the stripped one
    #[arg(long)]
    echo_prefill: bool,
}

// ── Helpers ────────────────────────────────────────────────────────

fn read_stdin_content() -> Result<String, String> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .map_err(|e| format!("failed to read stdin: {e}"))?;
    Ok(buf)
}

fn build_user_content(args: &AskArgs) -> Result<String, String> {
    let stdin_text = if args.stdin {
        Some(read_stdin_content()?)
    } else {
        None
    };

    match (&args.user, stdin_text) {
        (Some(msg), Some(piped)) => Ok(format!("{msg}\n\n{piped}")),
        (Some(msg), None) => Ok(msg.clone()),
        (None, Some(piped)) => Ok(piped),
        (None, None) => Err("provide --user, --stdin, or both".to_string()),
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

// ── Commands ───────────────────────────────────────────────────────

async fn show(workspace: &WorkspaceArg, check: bool) -> Result<String, String> {
    let prefill = read_prefill(&workspace.workspace).await;
    if check {
        let state = if prefill.is_some() { "enabled" } else { "disabled" };
        return Ok(format!("{state}\n"));
    }
    match prefill {
        Some(p) => Ok(format!("{p}\n")),
        None => {
            eprintln!(
                "No prefill: {} is missing or empty",
                workspace.workspace.join(PREFILL_FILENAME).display()
            );
            Ok(String::new())
        }
    }
}

async fn strip(
    workspace: &WorkspaceArg,
    prefill: Option<String>,
    response: Option<String>,
    explain: bool,
) -> Result<String, String> {
    let ctx = match prefill {
        Some(p) => TurnContext::with_prefill(&workspace.workspace, Some(p)),
        None => TurnContext::load(&workspace.workspace).await,
    };
    let response = match response {
        Some(r) => r,
        None => read_stdin_content()?,
    };

    let (stripped, outcome) = ctx.finish(&response);
    if explain {
        eprintln!("  [strip] {outcome}");
    }
    Ok(stripped)
}

async fn ask(args: &AskArgs) -> Result<String, String> {
    let api_key = std::env::var("OPENROUTER_KEY")
        .map_err(|_| "OPENROUTER_KEY environment variable is not set".to_string())?;

    let user_content = build_user_content(args)?;

    let mut history = Vec::new();
    if let Some(sys) = &args.system {
        history.push(Message::system(sys));
    }
    history.push(Message::user(user_content));

    let config = TurnConfig::new(&args.workspace.workspace)
        .with_model(&args.model)
        .with_max_tokens(args.max_tokens)
        .with_temperature(args.temperature)
        .with_stop(args.stop.clone());

    let client = OpenRouterClient::with_headers(
        api_key,
        "https://crates.io/crates/cinch-prefill",
        "cinch-prefill",
    )?;

    let outcome = run_turn(&client, &config, &mut history, &LoggingHandler).await?;

    if args.echo_prefill {
        Ok(outcome.raw)
    } else {
        Ok(outcome.stored)
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Command::Show { workspace, check } => show(workspace, *check).await,
        Command::Strip {
            workspace,
            prefill,
            response,
            explain,
        } => strip(workspace, prefill.clone(), response.clone(), *explain).await,
        Command::Ask(args) => ask(args).await,
    };

    match result {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}
