use std::env;
use std::path::Path;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub storage_path: String,
    pub sessions_path: String,
    pub snapshots_path: String,
    pub openai_api_hostname: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_stream: bool,
    pub openai_timeout_secs: u64,
    // A chat message equal to this (after trimming) snapshots the
    // session instead of being sent to the model
    pub save_command: String,
    // Session used by `POST /chat` when no id is in the path
    pub default_session_id: String,
}

impl AppConfig {
    /// Build a config rooted at `storage_path` with the remaining
    /// fields taken from the environment.
    pub fn with_storage_path(storage_path: &str) -> Self {
        let root = Path::new(storage_path);
        let sessions_path = root.join("sessions").display().to_string();
        let snapshots_path = root.join("snapshots").display().to_string();
        let openai_api_hostname =
            env::var("RELAY_LLM_HOST").unwrap_or_else(|_| "https://api.openai.com".to_string());
        // Not validated here, a missing key fails at request time
        let openai_api_key = env::var("OPENAI_API_KEY").unwrap_or_default();
        let openai_model =
            env::var("RELAY_LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());
        let openai_stream = env::var("RELAY_LLM_STREAM")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        let openai_timeout_secs = env::var("RELAY_LLM_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(600);
        let save_command =
            env::var("RELAY_SAVE_COMMAND").unwrap_or_else(|_| "/save".to_string());
        let default_session_id =
            env::var("RELAY_DEFAULT_SESSION").unwrap_or_else(|_| "default".to_string());

        Self {
            storage_path: storage_path.to_string(),
            sessions_path,
            snapshots_path,
            openai_api_hostname,
            openai_api_key,
            openai_model,
            openai_stream,
            openai_timeout_secs,
            save_command,
            default_session_id,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let storage_path = env::var("RELAY_STORAGE_PATH").unwrap_or("./".to_string());
        Self::with_storage_path(&storage_path)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
