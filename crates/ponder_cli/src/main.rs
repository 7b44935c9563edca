use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use ponder_core::PonderConfig;
use ponder_reasoning::domain::{Domain, ReasoningType};
use ponder_reasoning::{
    PipelineExecutor, PipelineKind, PipelineTask, ProviderClient, ReactEngine, ReactTask,
    ToolRegistry,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "ponder", author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "ponder.toml", env = "PONDER_CONFIG")]
    config: PathBuf,

    /// Provider for every generation call (openai, gemini, mock)
    #[arg(short, long)]
    provider: Option<String>,

    /// Emit logs as JSON lines on stderr
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer a query with the ReAct loop
    React(ReactArgs),
    /// Extract topics from a query and analyze each one
    Research(PipelineArgs),
    /// Summarize a text
    Summarize(PipelineArgs),
    /// Classify a text with rules, refined by the model
    Classify(PipelineArgs),
    /// Break a research query into entities, questions, timeline and perspectives
    Analyze(PipelineArgs),
}

#[derive(Args, Debug)]
struct ReactArgs {
    /// Query text, or a JSON object carrying `domain` and its fields
    query: String,

    /// Run the domain reasoner first (financial, medical, legal)
    #[arg(long)]
    domain: Option<Domain>,

    /// deductive, inductive or both
    #[arg(long)]
    reasoning_type: Option<ReasoningType>,

    /// JSON object with the domain fields
    #[arg(long)]
    payload: Option<String>,

    /// Include the per-step trace and the message log in the output
    #[arg(long)]
    trace: bool,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Input text
    input: String,

    #[arg(long)]
    system_message: Option<String>,

    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Model override for the selected provider
    #[arg(long)]
    model: Option<String>,
}

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.log_json);

    let config = PonderConfig::load_or_default(&cli.config);
    let client = Arc::new(ProviderClient::from_config(&config)?);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling run...");
            on_signal.cancel();
        }
    });

    let output = match cli.command {
        Command::React(args) => {
            let mut task = ReactTask::from_query(args.query).with_provider(cli.provider);
            // Flags win over fields embedded in a JSON query.
            if args.domain.is_some() {
                task.domain = args.domain;
            }
            if args.reasoning_type.is_some() {
                task.reasoning_type = args.reasoning_type;
            }
            if let Some(raw) = &args.payload {
                let payload = serde_json::from_str(raw).context("--payload is not valid JSON")?;
                task = task.with_payload(payload);
            }

            let engine = ReactEngine::new(
                client,
                Arc::new(ToolRegistry::with_builtin_tools()),
                config.react.clone(),
            );
            let outcome = engine.run(task, &cancel).await?;

            let mut value = serde_json::to_value(&outcome)?;
            if !args.trace {
                if let Some(obj) = value.as_object_mut() {
                    obj.remove("trace");
                    obj.remove("messages");
                }
            }
            value
        }
        Command::Research(args) => {
            let kind = PipelineKind::Research;
            run_pipeline(kind, args, cli.provider, client, &config, &cancel).await?
        }
        Command::Summarize(args) => {
            let kind = PipelineKind::Summarize;
            run_pipeline(kind, args, cli.provider, client, &config, &cancel).await?
        }
        Command::Classify(args) => {
            let kind = PipelineKind::Classify;
            run_pipeline(kind, args, cli.provider, client, &config, &cancel).await?
        }
        Command::Analyze(args) => {
            let kind = PipelineKind::Analyze;
            run_pipeline(kind, args, cli.provider, client, &config, &cancel).await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_pipeline(
    kind: PipelineKind,
    args: PipelineArgs,
    provider: Option<String>,
    client: Arc<ProviderClient>,
    config: &PonderConfig,
    cancel: &CancellationToken,
) -> anyhow::Result<serde_json::Value> {
    let task = PipelineTask {
        provider,
        system_message: args.system_message,
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        model: args.model,
        ..PipelineTask::new(args.input)
    };

    info!("Running {} pipeline", kind);
    let executor = PipelineExecutor::new(client, config.pipeline.clone());
    let outcome = executor.run(&kind.build(), &task, cancel).await?;
    Ok(serde_json::to_value(&outcome)?)
}
