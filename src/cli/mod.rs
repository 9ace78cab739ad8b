//! Command-line interface parsing and handling

pub mod init;
pub mod say;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::init::run_init;
use crate::cli::say::run_say;
use crate::core::config::Config;
use crate::core::session::StreamingSession;
use crate::logging::{self, LogTarget};
use crate::ui::chat_loop::run_chat;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("VERGEN_GIT_SHA"),
    ", built ",
    env!("VERGEN_BUILD_DATE"),
    ")"
);

#[derive(Parser)]
#[command(name = "hai")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Chat with an OpenAI model from the terminal")]
#[command(
    long_about = "hai is a terminal chat client for OpenAI-compatible APIs. Replies are \
streamed into the chat view as they are generated, and every message is sent \
with the full conversation so far.\n\n\
Authentication:\n\
  Run 'hai init' to store your API key in the config file.\n\n\
Environment Variables:\n\
  OPENAI_KEY    API key (takes precedence over the config file)\n\
  HAI_LOG       Log filter, e.g. 'hai=debug' (used with --log)\n\n\
Controls:\n\
  Enter                 Send the message\n\
  PgUp/PgDn, Ctrl+U/D   Scroll the conversation\n\
  Shift+Up/Down         Scroll one line\n\
  Ctrl+C                Quit"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Model to chat with (overrides the config file)
    #[arg(short = 'm', long, global = true, value_name = "MODEL")]
    pub model: Option<String>,

    /// Write diagnostic logs to this file
    #[arg(short = 'l', long, global = true, value_name = "FILE")]
    pub log: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Store an OpenAI API key in the config file
    Init,
    /// Send a single prompt and print the streamed reply
    Say {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        prompt: Vec<String>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let command = args.command.unwrap_or(Commands::Chat);

    let log_target = match (&args.log, &command) {
        (Some(path), _) => LogTarget::File(path),
        (None, Commands::Say { .. }) => LogTarget::Stderr,
        (None, _) => LogTarget::Disabled,
    };
    logging::init(log_target)?;

    match command {
        Commands::Init => run_init(),
        Commands::Say { prompt } => run_say(prompt, args.model).await,
        Commands::Chat => start_chat(args.model).await,
    }
}

/// Starts the chat view, running the init flow first when no API key is
/// available yet.
async fn start_chat(model: Option<String>) -> Result<(), Box<dyn Error>> {
    let mut config = Config::load()?;
    if config.api_key().is_none() {
        run_init()?;
        config = Config::load()?;
    }

    let api_key = config
        .api_key()
        .ok_or("No API key configured. Run 'hai init' or set OPENAI_KEY.")?;
    let session = StreamingSession::new(&api_key, &config.session_settings(model.as_deref()))?;
    run_chat(session).await
}
