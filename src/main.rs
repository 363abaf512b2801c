use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use context_press::config::{Overrides, parse_available_models};
use context_press::store::{DEFAULT_MODEL, DEFAULT_MODEL_KIND};
use context_press::{
    CompletionClient, CompletionRequest, Config, ContextBuilder, ConversationBundle, Error, Event,
    EventWriter, HttpCompletionClient, Role, StreamEvent,
};

/// cpress - ask a chat model with a compressed conversation context
#[derive(Parser)]
#[command(name = "cpress", version, about)]
struct Cli {
    /// Increase log verbosity on stderr (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Send a message with the compressed conversation as context
    Ask(AskArgs),
    /// Print the compressed context as JSON without calling the model
    Context(ContextArgs),
    /// Create an empty conversation bundle
    New {
        /// Path of the bundle to create
        path: PathBuf,
        /// Model kind recorded in the bundle
        #[arg(long, default_value = DEFAULT_MODEL_KIND)]
        model_kind: String,
        /// Model recorded in the bundle
        #[arg(long, default_value = DEFAULT_MODEL)]
        model: String,
    },
}

/// Where the conversation lives and how hard to compress it
#[derive(Args)]
struct ConversationArgs {
    /// Path to the conversation bundle JSON file
    #[arg(short, long, alias = "conversation-json-path")]
    conversation: PathBuf,

    /// Recent messages sent near-verbatim before older turns are summarized
    #[arg(long)]
    history_window_messages: Option<usize>,

    /// Character budget for the summary of older turns
    #[arg(long)]
    history_summary_max_chars: Option<usize>,
}

impl ConversationArgs {
    const fn overrides(&self) -> Overrides {
        Overrides {
            history_window_messages: self.history_window_messages,
            summary_max_chars: self.history_summary_max_chars,
        }
    }
}

#[derive(Args)]
struct AskArgs {
    #[command(flatten)]
    conversation: ConversationArgs,

    /// Latest user message
    #[arg(short, long)]
    message: String,

    /// Model override
    #[arg(long)]
    model: Option<String>,

    /// Cap on completion tokens
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Comma separated list of models the request may use
    #[arg(long, default_value = "")]
    available_models: String,

    /// Stream tokens as they arrive (default)
    #[arg(long, overrides_with = "no_stream")]
    stream: bool,

    /// Wait for the whole answer instead of streaming
    #[arg(long, overrides_with = "stream")]
    no_stream: bool,

    /// Append the question and answer to the bundle
    #[arg(long)]
    record: bool,
}

impl AskArgs {
    const fn streaming(&self) -> bool {
        self.stream || !self.no_stream
    }
}

#[derive(Args)]
struct ContextArgs {
    #[command(flatten)]
    conversation: ConversationArgs,

    /// Latest user message to append, as `ask` would
    #[arg(short, long)]
    message: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity; stdout carries the event stream
    let filter = match cli.verbose {
        0 => "info,context_press=info",
        1 => "info,context_press=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            EventWriter::new(std::io::stdout()).emit_or_log(&Event::error(format!("{e:#}")));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Ask(args) => ask(args).await,
        Command::Context(args) => print_context(&args),
        Command::New {
            path,
            model_kind,
            model,
        } => create_bundle(&path, &model_kind, &model),
    }
}

async fn ask(args: AskArgs) -> anyhow::Result<()> {
    let message = args.message.trim();
    if message.is_empty() {
        return Err(Error::Config("message cannot be empty".into()).into());
    }

    let config = Config::load().apply_overrides(args.conversation.overrides());
    let client = HttpCompletionClient::new(config.client_options()?)?;

    let path = &args.conversation.conversation;
    let mut bundle = ConversationBundle::load(path)?;

    let available_models = parse_available_models(&args.available_models);
    let model = config.resolve_model(args.model.as_deref(), &bundle.model.name, &available_models);

    let mut context = ContextBuilder::new(config.compression).build(bundle.system_prompt(), bundle.records());
    context.ensure_latest_user_message(message);

    tracing::info!(
        conversation = %bundle.conversation.id,
        model = %model,
        messages = context.messages().len(),
        chars = context.total_chars(),
        "asking"
    );

    let streaming = args.streaming();
    let request = CompletionRequest::new(model, context.into_messages())
        .with_stream(streaming)
        .with_max_tokens(args.max_tokens)
        .with_available_models(available_models);

    let mut events = EventWriter::new(std::io::stdout());
    let completion = client
        .complete_with(&request, &mut |event| match event {
            StreamEvent::Token(token) if streaming => events.emit_or_log(&Event::token(token.as_str())),
            _ => {}
        })
        .await?;

    if let Some(usage) = completion.usage {
        events.emit(&usage.into())?;
    }

    if args.record {
        bundle.record_turn(Role::User, message);
        bundle.record_turn(Role::Assistant, &completion.text);
        bundle.save(path)?;
    }

    events.emit(&Event::Final {
        text: completion.text,
        finish_reason: completion.finish_reason,
    })?;
    Ok(())
}

fn print_context(args: &ContextArgs) -> anyhow::Result<()> {
    let config = Config::load().apply_overrides(args.conversation.overrides());
    let bundle = ConversationBundle::load(&args.conversation.conversation)?;

    let mut context = ContextBuilder::new(config.compression).build(bundle.system_prompt(), bundle.records());
    if let Some(message) = &args.message {
        context.ensure_latest_user_message(message);
    }

    println!("{}", serde_json::to_string_pretty(context.messages())?);
    Ok(())
}

fn create_bundle(path: &Path, model_kind: &str, model: &str) -> anyhow::Result<()> {
    let bundle = ConversationBundle::create(path, model_kind, model)?;
    println!("{}", serde_json::to_string_pretty(&bundle.conversation)?);
    Ok(())
}
