// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tabula_app::{
    BulkConfig, DEFAULT_BATCH_DELAY, DEFAULT_BATCH_SIZE, DEFAULT_OVERSCAN, DEFAULT_PAGE_SIZE,
    DEFAULT_PREFETCH_THRESHOLD, DEFAULT_REFRESH_INTERVAL, GridSettings, MAX_GENERATED_ROWS,
    MAX_PAGE_SIZE,
};
use tracing_subscriber::EnvFilter;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub grid: Grid,
    #[serde(default)]
    pub bulk: Bulk,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            grid: Grid::default(),
            bulk: Bulk::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Grid {
    pub page_size: Option<usize>,
    pub prefetch_threshold: Option<usize>,
    pub overscan: Option<usize>,
}

impl Default for Grid {
    fn default() -> Self {
        Self {
            page_size: Some(DEFAULT_PAGE_SIZE),
            prefetch_threshold: Some(DEFAULT_PREFETCH_THRESHOLD),
            overscan: Some(DEFAULT_OVERSCAN),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Bulk {
    pub batch_size: Option<usize>,
    pub refresh_interval: Option<String>,
    pub batch_delay: Option<String>,
}

impl Default for Bulk {
    fn default() -> Self {
        Self {
            batch_size: Some(DEFAULT_BATCH_SIZE),
            refresh_interval: Some("2s".to_owned()),
            batch_delay: Some("100ms".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub path: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            path: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("TABULA_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set TABULA_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(tabula_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version; add `version = 1` and put values under [storage], [grid], [bulk], and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            tabula_db::validate_db_path(db_path)?;
        }

        if let Some(page_size) = self.grid.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            bail!(
                "grid.page_size in {} must be between 1 and {MAX_PAGE_SIZE}, got {page_size}",
                path.display()
            );
        }

        if let Some(batch_size) = self.bulk.batch_size
            && !(1..=MAX_GENERATED_ROWS).contains(&batch_size)
        {
            bail!(
                "bulk.batch_size in {} must be between 1 and {MAX_GENERATED_ROWS}, got {batch_size}",
                path.display()
            );
        }

        if let Some(interval) = &self.bulk.refresh_interval
            && parse_duration(interval)? <= Duration::ZERO
        {
            bail!(
                "bulk.refresh_interval in {} must be positive, got {interval}",
                path.display()
            );
        }

        if let Some(delay) = &self.bulk.batch_delay {
            parse_duration(delay)
                .with_context(|| format!("bulk.batch_delay in {}", path.display()))?;
        }

        if let Some(level) = &self.log.level {
            EnvFilter::try_new(level).with_context(|| {
                format!(
                    "log.level {level:?} in {} is not a valid filter; try info or tabula_app=debug",
                    path.display()
                )
            })?;
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => tabula_db::default_db_path(),
        }
    }

    pub fn grid_settings(&self) -> Result<GridSettings> {
        Ok(GridSettings {
            page_size: self.grid.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            prefetch_threshold: self
                .grid
                .prefetch_threshold
                .unwrap_or(DEFAULT_PREFETCH_THRESHOLD),
            overscan: self.grid.overscan.unwrap_or(DEFAULT_OVERSCAN),
            bulk: self.bulk_config()?,
            seed: None,
        })
    }

    pub fn bulk_config(&self) -> Result<BulkConfig> {
        let refresh_interval = match &self.bulk.refresh_interval {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_REFRESH_INTERVAL,
        };
        let batch_delay = match &self.bulk.batch_delay {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_BATCH_DELAY,
        };
        Ok(BulkConfig {
            batch_size: self.bulk.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            refresh_interval,
            batch_delay,
        })
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    /// Log file location: `[log] path`, else next to the default database.
    pub fn log_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.log.path {
            return Ok(PathBuf::from(path));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].path to a writable file")
        })?;
        Ok(data_root.join(tabula_db::APP_NAME).join("tabula.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# tabula config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/tabula/tabula.db)\n# db_path = \"/absolute/path/to/tabula.db\"\n\n[grid]\npage_size = {}\nprefetch_threshold = {}\noverscan = {}\n\n[bulk]\nbatch_size = {}\nrefresh_interval = \"2s\"\nbatch_delay = \"100ms\"\n\n[log]\n# Filter syntax, for example \"info\" or \"tabula_app=debug\". TABULA_LOG overrides it.\nlevel = \"{}\"\n# path = \"/absolute/path/to/tabula.log\"\n",
            path.display(),
            DEFAULT_PAGE_SIZE,
            DEFAULT_PREFETCH_THRESHOLD,
            DEFAULT_OVERSCAN,
            DEFAULT_BATCH_SIZE,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 100ms or 2s)")
}
