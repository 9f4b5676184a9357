use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::geometry::CanvasSize;
use crate::retry::RetryPolicy;

const DEFAULT_API_BASE: &str = "http://localhost:8000";
const DEFAULT_CACHE_PATH: &str = "zone_console.db";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RETRY_MAX: u32 = 5;
const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
const DEFAULT_SYNC_ATTEMPTS: u32 = 1;
const DEFAULT_CANVAS_WIDTH: u32 = 800;
const DEFAULT_CANVAS_HEIGHT: u32 = 600;

#[derive(Debug, Deserialize, Default)]
struct ConsoleConfigFile {
    api: Option<ApiConfigFile>,
    cache: Option<CacheConfigFile>,
    retry: Option<RetryConfigFile>,
    canvas: Option<CanvasConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiConfigFile {
    base: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CacheConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct RetryConfigFile {
    max_attempts: Option<u32>,
    delay_ms: Option<u64>,
    sync_attempts: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct CanvasConfigFile {
    max_width: Option<u32>,
    max_height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ConsoleConfig {
    pub api_base: String,
    pub http_timeout: Duration,
    pub cache_path: PathBuf,
    pub retry: RetrySettings,
    pub canvas: CanvasSize,
}

#[derive(Debug, Clone)]
pub struct RetrySettings {
    /// Total baseline acquisition attempts before giving up.
    pub max_attempts: u32,
    pub delay: Duration,
    /// Total zone listing attempts when the backend is down; 1 disables
    /// background re-sync.
    pub sync_attempts: u32,
}

impl ConsoleConfig {
    /// File named by `ZONE_CONSOLE_CONFIG` (JSON), then environment
    /// overrides, then validation.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ZONE_CONSOLE_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConsoleConfigFile) -> Self {
        let api = file.api.unwrap_or_default();
        let retry = file.retry.unwrap_or_default();
        let canvas = file.canvas.unwrap_or_default();
        Self {
            api_base: api.base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            http_timeout: Duration::from_secs(
                api.timeout_secs.unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
            cache_path: file
                .cache
                .and_then(|cache| cache.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH)),
            retry: RetrySettings {
                max_attempts: retry.max_attempts.unwrap_or(DEFAULT_RETRY_MAX),
                delay: Duration::from_millis(retry.delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS)),
                sync_attempts: retry.sync_attempts.unwrap_or(DEFAULT_SYNC_ATTEMPTS),
            },
            canvas: CanvasSize::new(
                canvas.max_width.unwrap_or(DEFAULT_CANVAS_WIDTH),
                canvas.max_height.unwrap_or(DEFAULT_CANVAS_HEIGHT),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(base) = std::env::var("ZONE_CONSOLE_API_BASE") {
            if !base.trim().is_empty() {
                self.api_base = base.trim().to_string();
            }
        }
        if let Ok(path) = std::env::var("ZONE_CONSOLE_CACHE_PATH") {
            if !path.trim().is_empty() {
                self.cache_path = PathBuf::from(path);
            }
        }
        if let Ok(max) = std::env::var("ZONE_CONSOLE_RETRY_MAX") {
            self.retry.max_attempts = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("ZONE_CONSOLE_RETRY_MAX must be a positive integer"))?;
        }
        if let Ok(delay) = std::env::var("ZONE_CONSOLE_RETRY_DELAY_MS") {
            let millis: u64 = delay.trim().parse().map_err(|_| {
                anyhow!("ZONE_CONSOLE_RETRY_DELAY_MS must be an integer number of milliseconds")
            })?;
            self.retry.delay = Duration::from_millis(millis);
        }
        if let Ok(timeout) = std::env::var("ZONE_CONSOLE_HTTP_TIMEOUT_SECS") {
            let seconds: u64 = timeout.trim().parse().map_err(|_| {
                anyhow!("ZONE_CONSOLE_HTTP_TIMEOUT_SECS must be an integer number of seconds")
            })?;
            self.http_timeout = Duration::from_secs(seconds);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let url = Url::parse(&self.api_base)
            .map_err(|e| anyhow!("invalid api base url '{}': {}", self.api_base, e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "api base url must be http or https, got '{}'",
                url.scheme()
            ));
        }
        self.api_base = self.api_base.trim_end_matches('/').to_string();

        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry max_attempts must be greater than zero"));
        }
        if self.retry.sync_attempts == 0 {
            return Err(anyhow!("retry sync_attempts must be greater than zero"));
        }
        if self.http_timeout.is_zero() {
            return Err(anyhow!("http timeout must be greater than zero"));
        }
        if self.canvas.width == 0 || self.canvas.height == 0 {
            return Err(anyhow!("canvas bounds must be greater than zero"));
        }
        Ok(())
    }

    pub fn acquisition_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry.max_attempts, self.retry.delay)
    }

    pub fn sync_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry.sync_attempts, self.retry.delay)
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self::from_file(ConsoleConfigFile::default())
    }
}

fn read_config_file(path: &Path) -> Result<ConsoleConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
