use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

use heron::agent::{Agent, DEFAULT_MAX_ITERATIONS};
use heron::models::message::Message;
use heron::providers::configs::OpenRouterProviderConfig;
use heron::providers::openrouter::{
    OpenRouterProvider, OPENROUTER_DEFAULT_MODEL, OPENROUTER_HOST,
};
use heron::systems::filesystem::FilesystemSystem;

mod session;

const INSTRUCTIONS: &str =
    "You have filesystem tools. Use them to inspect the workspace before answering, \
     and report what you find.";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The task to run
    prompt: String,

    /// OpenRouter API key (can also be set via OPENROUTER_API_KEY environment variable)
    #[arg(long)]
    api_key: Option<String>,

    /// Model to use
    #[arg(short, long, default_value = OPENROUTER_DEFAULT_MODEL)]
    model: String,

    /// Maximum number of model calls for this task
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    max_iterations: usize,

    /// Copy a file from disk into the agent's workspace (repeatable)
    #[arg(long, value_name = "PATH")]
    load: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let api_key = cli
        .api_key
        .clone()
        .or_else(|| env::var("OPENROUTER_API_KEY").ok())
        .context(
            "API key must be provided via --api-key or OPENROUTER_API_KEY environment variable",
        )?;

    let provider = OpenRouterProvider::new(OpenRouterProviderConfig {
        host: OPENROUTER_HOST.to_string(),
        api_key,
        model: cli.model.clone(),
        temperature: None,
        max_tokens: None,
    })?;

    let system = FilesystemSystem::new();
    for path in &cli.load {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        system.seed(path.to_string_lossy(), content);
    }

    let mut agent =
        Agent::new(Box::new(provider), INSTRUCTIONS).with_max_iterations(cli.max_iterations);
    agent.add_system(Box::new(system));

    eprintln!("{}", style(format!("model: {}", cli.model)).dim());

    let messages = vec![Message::user().with_text(&cli.prompt)];
    let stream = agent.reply(&messages).await?;

    let mut out = io::stdout().lock();
    let mut err = io::stderr().lock();
    let clean = session::drain(stream, &mut out, &mut err).await?;
    drop(out);
    drop(err);

    if !clean {
        std::process::exit(1);
    }
    Ok(())
}
