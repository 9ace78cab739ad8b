/// Model used when neither the config file nor `--model` names one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Connect timeout used when the config file does not set one.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Environment variable checked for an API key before the config file.
pub const API_KEY_ENV: &str = "OPENAI_KEY";

/// Environment variable holding the tracing filter directive.
pub const LOG_FILTER_ENV: &str = "HAI_LOG";
