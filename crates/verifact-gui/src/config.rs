use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use verifact_core::{ConfigLoader, Settings};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub listen_addr: String,
    pub max_concurrency: usize,
    pub max_upload_bytes: usize,
    pub assets_dir: PathBuf,
    pub gui_enabled: bool,
    pub auth_token: Option<String>,
    pub otel_endpoint: Option<String>,
    /// Finished checks nobody collects are dropped after this long.
    pub record_ttl: Duration,
    /// Crew and backend settings handed to the pipeline.
    pub settings: Settings,
}

impl AppConfig {
    const DEFAULT_LISTEN_ADDR: &'static str = "0.0.0.0:8080";
    const DEFAULT_ASSETS_DIR: &'static str = "crates/verifact-gui/web/dist";
    const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
    const DEFAULT_RECORD_TTL_SECS: u64 = 60 * 60;

    pub fn from_env() -> Result<Self> {
        let settings = ConfigLoader::load(None).context("failed to load verifact settings")?;
        Self::from_env_with_settings(settings)
    }

    /// Read the GUI_* variables around already loaded settings.
    pub fn from_env_with_settings(settings: Settings) -> Result<Self> {
        let listen_addr =
            env::var("GUI_LISTEN_ADDR").unwrap_or_else(|_| Self::DEFAULT_LISTEN_ADDR.to_string());

        let max_concurrency = env::var("GUI_MAX_CONCURRENCY")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|value| *value > 0)
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|nz| nz.get())
                    .unwrap_or(4)
            });

        let max_upload_bytes = env::var("GUI_MAX_UPLOAD_BYTES")
            .ok()
            .map(|value| {
                value
                    .parse::<usize>()
                    .with_context(|| "GUI_MAX_UPLOAD_BYTES must be a byte count")
            })
            .transpose()?
            .unwrap_or(Self::DEFAULT_MAX_UPLOAD_BYTES);

        let record_ttl = env::var("GUI_RECORD_TTL_SECS")
            .ok()
            .map(|value| {
                value
                    .trim()
                    .parse::<u64>()
                    .with_context(|| "GUI_RECORD_TTL_SECS must be a number of seconds")
            })
            .transpose()?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(Self::DEFAULT_RECORD_TTL_SECS));

        let assets_dir = env::var("GUI_ASSETS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_ASSETS_DIR));
        let assets_dir = if assets_dir.is_relative() {
            env::current_dir()
                .map(|cwd| cwd.join(&assets_dir))
                .unwrap_or(assets_dir)
        } else {
            assets_dir
        };

        let gui_enabled = env::var("GUI_ENABLE_GUI")
            .ok()
            .and_then(|value| parse_bool(&value))
            .unwrap_or(false);

        let auth_token = non_empty_var("GUI_AUTH_TOKEN");
        let otel_endpoint = non_empty_var("GUI_OTEL_ENDPOINT");

        let gui_enabled = gui_enabled || auth_token.is_some();

        Ok(Self {
            listen_addr,
            max_concurrency,
            max_upload_bytes,
            assets_dir,
            gui_enabled,
            auth_token,
            otel_endpoint,
            record_ttl,
            settings,
        })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
