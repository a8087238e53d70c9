use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub openai_api_key: String,
    /// Fixed worker pool size; each worker owns one browser per job
    pub worker_count: usize,
    /// CDP websocket of a remote browser server; local launch when unset
    pub browser_ws_url: Option<String>,
    /// Directory for confirmation screenshots
    pub screenshot_dir: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("PORT must be a valid number")?,
            openai_api_key: env::var("OPENAI_API_KEY").context("OPENAI_API_KEY must be set")?,
            worker_count: env::var("WORKER_COUNT")
                .unwrap_or_else(|_| "4".to_string())
                .parse()
                .context("WORKER_COUNT must be a valid number")?,
            browser_ws_url: env::var("BROWSER_WS_URL").ok(),
            screenshot_dir: env::var("SCREENSHOT_DIR")
                .unwrap_or_else(|_| "./screenshots".to_string()),
        })
    }
}
