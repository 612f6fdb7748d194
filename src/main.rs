//! LISP assistant - AutoLISP help from a chat model
//!
//! Interactive prompt loop by default, or a single prompt with `--prompt`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lisp_assistant::{
    messaging, Agent, AssistantConfig, CodeArtifactStore, DirectoryChooser, FileArtifactStore,
    ProviderKind, PromptChooser, SessionRunner, TerminalHost, XdgDirs,
};

/// LISP assistant - writes, saves and runs AutoLISP code
#[derive(Parser, Debug)]
#[command(name = "lisp-assistant")]
#[command(version, about, long_about = None)]
struct Args {
    /// Provider to use (openai, gemini, ollama)
    #[arg(long)]
    provider: Option<ProviderKind>,

    /// Model to use with the selected provider
    #[arg(short, long)]
    model: Option<String>,

    /// Config file (defaults to the XDG config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save code into this directory without asking for a file name
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Answer a single prompt and exit
    #[arg(short, long)]
    prompt: Option<String>,

    /// Working directory (like git -C)
    #[arg(short = 'C', long, visible_alias = "directory")]
    cwd: Option<String>,

    /// Enable debug logging (equivalent to RUST_LOG=debug)
    #[arg(short = 'd', long)]
    debug: bool,

    /// Enable verbose logging (equivalent to RUST_LOG=trace)
    #[arg(short = 'v', long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Change working directory if specified (do this early)
    if let Some(cwd) = &args.cwd {
        std::env::set_current_dir(cwd)
            .with_context(|| format!("Failed to change directory to {}", cwd))?;
    }

    init_tracing(&args);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run(args))
}

fn init_tracing(args: &Args) {
    let default_filter = if args.verbose {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        "warn" // Quiet by default for normal use
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .init();

    if args.debug || args.verbose {
        tracing::info!("Debug logging enabled");
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let xdg = XdgDirs::new();
    xdg.ensure_dirs().context("Failed to create application directories")?;

    let config_path = args.config.clone().unwrap_or_else(|| xdg.config_file());
    let mut config = AssistantConfig::load(&config_path)?;
    config.apply_overrides(args.provider, args.model.clone(), args.save_dir.clone());
    let provider = config.provider_config()?;

    let store: Arc<dyn CodeArtifactStore> = match config.save_dir()? {
        Some(dir) => Arc::new(FileArtifactStore::new(DirectoryChooser::new(dir))),
        None => Arc::new(FileArtifactStore::new(PromptChooser::new(xdg.default_save_dir()))),
    };

    let (events, receiver) = messaging::channel();
    let agent = Agent::new(&provider, store, events)?;
    let host = TerminalHost::new(&provider.model_id);
    let mut runner = SessionRunner::new(agent, receiver, host);

    match args.prompt {
        Some(prompt) => {
            runner.run_once(&prompt).await?;
        }
        None => runner.run().await?,
    }

    Ok(())
}
