use serde::Deserialize;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_MODEL: &str = "gpt-3.5-turbo-0125";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_TEMPERATURE: f32 = 0.2;
const DEFAULT_MAX_OUTPUT_TOKENS: usize = 1000;
const DEFAULT_SAFETY_MARGIN: usize = 1000;
const DEFAULT_RETRY_ATTEMPTS: usize = 3;
const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 500;
const DEFAULT_DOCUMENTS_DIR: &str = "uploaded_pdfs";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
    /// Configuration was already installed in the global cache.
    #[error("Configuration already initialized")]
    AlreadyInitialized,
}

/// Runtime configuration for Rusty Digest.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Backend that serves chat completions.
    pub completion_provider: CompletionProvider,
    /// Bearer token for OpenAI-compatible endpoints.
    pub openai_api_key: Option<String>,
    /// Base URL of the completion endpoint.
    pub completion_base_url: String,
    /// Model identifier; also selects the tokenizer vocabulary.
    pub completion_model: String,
    /// Fixed sampling temperature for every call.
    pub completion_temperature: f32,
    /// Fixed maximum number of tokens the model may generate per call.
    pub completion_max_tokens: usize,
    /// Context length of the model, in tokens.
    pub model_context_limit: usize,
    /// Extra tokens held back when sizing chunks.
    pub token_safety_margin: usize,
    /// How document text is split into chunks.
    pub chunk_strategy: ChunkStrategy,
    /// Which previously extracted headings are carried into the next chunk's prompt.
    pub heading_context: HeadingContext,
    /// Number of per-chunk answer calls allowed in flight at once.
    pub answer_concurrency: usize,
    /// Maximum attempts per completion call, including the first.
    pub retry_max_attempts: usize,
    /// Base delay for exponential backoff between attempts.
    pub retry_base_delay_ms: u64,
    /// Directory holding uploaded documents for the CLI store.
    pub documents_dir: String,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Any endpoint speaking the OpenAI chat completions protocol.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// Chunk boundary selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    /// Contiguous token windows of exactly the budget size.
    #[default]
    Window,
    /// Sentence and paragraph aware splitting under the same token budget.
    Semantic,
}

/// Heading context passed between consecutive extraction calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingContext {
    /// Only the headings produced by the immediately preceding chunk.
    #[default]
    Previous,
    /// Every distinct heading produced so far, in first-seen order.
    Cumulative,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let completion_provider = optional("COMPLETION_PROVIDER")
            .map(|value| parse_enum(&value, "COMPLETION_PROVIDER"))
            .transpose()?
            .unwrap_or(CompletionProvider::OpenAI);
        let openai_api_key = optional("OPENAI_API_KEY");

        let completion_base_url = optional("COMPLETION_BASE_URL").unwrap_or_else(|| {
            match completion_provider {
                CompletionProvider::OpenAI => DEFAULT_OPENAI_URL,
                CompletionProvider::Ollama => DEFAULT_OLLAMA_URL,
            }
            .to_string()
        });
        let completion_model =
            optional("COMPLETION_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let model_context_limit =
            parse_optional(optional("MODEL_CONTEXT_LIMIT"), "MODEL_CONTEXT_LIMIT")?
                .unwrap_or_else(|| tiktoken_rs::model::get_context_size(&completion_model));

        Ok(Self {
            completion_provider,
            openai_api_key,
            completion_base_url,
            completion_model,
            completion_temperature: parse_optional(
                optional("COMPLETION_TEMPERATURE"),
                "COMPLETION_TEMPERATURE",
            )?
            .unwrap_or(DEFAULT_TEMPERATURE),
            completion_max_tokens: parse_optional(
                optional("COMPLETION_MAX_TOKENS"),
                "COMPLETION_MAX_TOKENS",
            )?
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS),
            model_context_limit,
            token_safety_margin: parse_optional(
                optional("TOKEN_SAFETY_MARGIN"),
                "TOKEN_SAFETY_MARGIN",
            )?
            .unwrap_or(DEFAULT_SAFETY_MARGIN),
            chunk_strategy: optional("CHUNK_STRATEGY")
                .map(|value| parse_enum(&value, "CHUNK_STRATEGY"))
                .transpose()?
                .unwrap_or_default(),
            heading_context: optional("HEADING_CONTEXT")
                .map(|value| parse_enum(&value, "HEADING_CONTEXT"))
                .transpose()?
                .unwrap_or_default(),
            answer_concurrency: parse_optional(
                optional("ANSWER_CONCURRENCY"),
                "ANSWER_CONCURRENCY",
            )?
            .unwrap_or(1)
            .max(1),
            retry_max_attempts: parse_optional(
                optional("RETRY_MAX_ATTEMPTS"),
                "RETRY_MAX_ATTEMPTS",
            )?
            .unwrap_or(DEFAULT_RETRY_ATTEMPTS)
            .max(1),
            retry_base_delay_ms: parse_optional(
                optional("RETRY_BASE_DELAY_MS"),
                "RETRY_BASE_DELAY_MS",
            )?
            .unwrap_or(DEFAULT_RETRY_BASE_DELAY_MS),
            documents_dir: optional("DOCUMENTS_DIR")
                .unwrap_or_else(|| DEFAULT_DOCUMENTS_DIR.to_string()),
        })
    }

    /// Fail when the selected provider needs credentials that were not supplied.
    pub fn require_credentials(&self) -> Result<(), ConfigError> {
        if self.completion_provider == CompletionProvider::OpenAI && self.openai_api_key.is_none()
        {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".to_string()));
        }
        Ok(())
    }

    /// Base delay for retry backoff.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

fn parse_optional<T: std::str::FromStr>(
    value: Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    value
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

fn parse_enum<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

impl std::str::FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for ChunkStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "window" => Ok(Self::Window),
            "semantic" => Ok(Self::Semantic),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for HeadingContext {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "previous" => Ok(Self::Previous),
            "cumulative" => Ok(Self::Cumulative),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        provider = ?config.completion_provider,
        model = %config.completion_model,
        context_limit = config.model_context_limit,
        chunk_strategy = ?config.chunk_strategy,
        heading_context = ?config.heading_context,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::AlreadyInitialized)?;
    CONFIG.get().ok_or(ConfigError::AlreadyInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_model() {
        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")]))
            .expect("config");
        assert_eq!(config.completion_provider, CompletionProvider::OpenAI);
        assert_eq!(config.completion_model, "gpt-3.5-turbo-0125");
        assert_eq!(config.completion_base_url, "https://api.openai.com/v1");
        assert_eq!(config.completion_max_tokens, 1000);
        assert_eq!(config.token_safety_margin, 1000);
        assert_eq!(
            config.model_context_limit,
            tiktoken_rs::model::get_context_size("gpt-3.5-turbo-0125")
        );
        assert!((config.completion_temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(config.chunk_strategy, ChunkStrategy::Window);
        assert_eq!(config.heading_context, HeadingContext::Previous);
        assert_eq!(config.answer_concurrency, 1);
        assert_eq!(config.retry_max_attempts, 3);
        assert_eq!(config.documents_dir, "uploaded_pdfs");
    }

    #[test]
    fn openai_key_is_required_only_for_completion() {
        let config = Config::from_lookup(lookup_from(&[])).expect("config without key");
        assert_eq!(config.documents_dir, "uploaded_pdfs");
        let error = config.require_credentials().unwrap_err();
        assert!(matches!(error, ConfigError::MissingVariable(key) if key == "OPENAI_API_KEY"));

        let config = Config::from_lookup(lookup_from(&[("OPENAI_API_KEY", "sk-test")]))
            .expect("config");
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn ollama_does_not_require_api_key() {
        let config = Config::from_lookup(lookup_from(&[("COMPLETION_PROVIDER", "Ollama")]))
            .expect("config");
        assert_eq!(config.completion_provider, CompletionProvider::Ollama);
        assert_eq!(config.completion_base_url, "http://127.0.0.1:11434");
        assert!(config.require_credentials().is_ok());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("MODEL_CONTEXT_LIMIT", "8192"),
            ("CHUNK_STRATEGY", "semantic"),
            ("HEADING_CONTEXT", "cumulative"),
            ("ANSWER_CONCURRENCY", "0"),
            ("RETRY_BASE_DELAY_MS", "25"),
        ]))
        .expect("config");
        assert_eq!(config.model_context_limit, 8192);
        assert_eq!(config.chunk_strategy, ChunkStrategy::Semantic);
        assert_eq!(config.heading_context, HeadingContext::Cumulative);
        assert_eq!(config.answer_concurrency, 1);
        assert_eq!(config.retry_base_delay(), Duration::from_millis(25));
    }

    #[test]
    fn invalid_numbers_name_the_variable() {
        let error = Config::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("COMPLETION_MAX_TOKENS", "lots"),
        ]))
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "COMPLETION_MAX_TOKENS"));
    }
}
