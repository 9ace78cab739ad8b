//! First-run setup: asks for an API key and stores it in the config file.

use std::error::Error;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::path::Path;

use tracing::info;

use crate::core::config::Config;

#[derive(Debug)]
pub enum InitError {
    NoKeyEntered,
    Io(io::Error),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::NoKeyEntered => write!(f, "No API key entered"),
            InitError::Io(err) => write!(f, "Failed to read API key: {err}"),
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            InitError::Io(err) => Some(err),
            InitError::NoKeyEntered => None,
        }
    }
}

impl From<io::Error> for InitError {
    fn from(err: io::Error) -> Self {
        InitError::Io(err)
    }
}

pub fn prompt_for_key<R: BufRead, W: Write>(
    mut input: R,
    mut output: W,
) -> Result<String, InitError> {
    write!(output, "OpenAI key: ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let key = line.trim();
    if key.is_empty() {
        return Err(InitError::NoKeyEntered);
    }
    Ok(key.to_string())
}

pub fn save_key_at(config_path: &Path, key: &str) -> Result<(), Box<dyn Error>> {
    Config::update_at(config_path, |config| config.set_openai_key(key))?;
    info!(path = %config_path.display(), "saved API key");
    Ok(())
}

pub fn run_init() -> Result<(), Box<dyn Error>> {
    println!("🔐 hai setup");
    println!();

    let stdin = io::stdin();
    let key = prompt_for_key(stdin.lock(), io::stdout())?;

    let config_path = Config::config_path()?;
    if let Err(err) = save_key_at(&config_path, &key) {
        eprintln!("❌ Error saving file: {err}");
        return Err(err);
    }

    println!("✅ Initialization complete ({})", config_path.display());
    Ok(())
}
