//! TUI-less "say" command

use std::error::Error;
use std::io::{self, Write};

use crate::core::config::Config;
use crate::core::session::{SessionEvent, StreamingSession};

pub async fn run_say(prompt: Vec<String>, model: Option<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        return Err("Usage: hai say <prompt>".into());
    }

    let config = Config::load()?;
    let api_key = config
        .api_key()
        .ok_or("No API key configured. Run 'hai init' or set OPENAI_KEY.")?;
    let mut session = StreamingSession::new(&api_key, &config.session_settings(model.as_deref()))?;

    let stdout = io::stdout();
    stream_reply(&mut session, prompt, &mut stdout.lock()).await
}

/// Sends `prompt` and writes the reply to `out` as it streams in.
pub async fn stream_reply<W: Write>(
    session: &mut StreamingSession,
    prompt: String,
    out: &mut W,
) -> Result<(), Box<dyn Error>> {
    session.send(prompt).await?;

    loop {
        match session.recv().await {
            SessionEvent::PartialToken(content) => {
                write!(out, "{content}")?;
                out.flush()?;
            }
            SessionEvent::Done => {
                writeln!(out)?;
                return Ok(());
            }
            SessionEvent::Error(err) => {
                writeln!(out)?;
                return Err(Box::new(err));
            }
        }
    }
}
