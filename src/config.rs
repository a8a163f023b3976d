use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{BucketName, SqliteStorage};
use crate::http::Request;
use crate::lifecycle::LifecycleSettings;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL of the site; manifest and fallback paths resolve against it
  pub origin: Url,
  pub cache: CacheConfig,
  /// Offline substitute served when the network is unreachable
  pub fallback: String,
  #[serde(default = "default_true")]
  pub navigation_preload: bool,
  /// Resources populated at install time
  #[serde(default)]
  pub manifest: Vec<String>,
  /// Optional file listing additional resources, one per line
  pub manifest_file: Option<PathBuf>,
  #[serde(default)]
  pub preload: PreloadConfig,
  #[serde(default)]
  pub network: NetworkConfig,
  /// Write logs to a daily-rolling file in this directory instead of stderr
  pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  pub namespace: String,
  /// Bump to invalidate everything cached by earlier versions
  pub version: u32,
  /// Database file (defaults to $XDG_DATA_HOME/swcache/cache.db)
  pub path: Option<PathBuf>,
  /// Delete other versions of this namespace on activation
  #[serde(default)]
  pub purge_stale_buckets: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreloadConfig {
  /// Maximum concurrent fetches during install
  #[serde(default = "default_concurrency")]
  pub concurrency: usize,
}

impl Default for PreloadConfig {
  fn default() -> Self {
    Self {
      concurrency: default_concurrency(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for NetworkConfig {
  fn default() -> Self {
    Self {
      timeout_secs: default_timeout_secs(),
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_concurrency() -> usize {
  8
}

fn default_timeout_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/swcache/config.yaml\n\
                 or pass --config."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let mut config = Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    // Relative manifest files are relative to the config file
    if let (Some(manifest), Some(dir)) = (&config.manifest_file, path.parent()) {
      if manifest.is_relative() {
        config.manifest_file = Some(dir.join(manifest));
      }
    }

    Ok(config)
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    if config.cache.namespace.is_empty() {
      return Err(eyre!("cache.namespace must not be empty"));
    }
    Ok(config)
  }

  pub fn bucket_name(&self) -> BucketName {
    BucketName::new(&self.cache.namespace, self.cache.version)
  }

  /// Database path, explicit or default.
  pub fn database_path(&self) -> Result<PathBuf> {
    self
      .cache
      .path
      .clone()
      .or_else(SqliteStorage::default_path)
      .ok_or_else(|| eyre!("Could not determine data directory"))
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.network.timeout_secs)
  }

  /// Resolve a site-relative path into a GET request.
  pub fn request_for(&self, path: &str) -> Result<Request> {
    let url = self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid resource path '{}': {}", path, e))?;
    Ok(Request::get(url))
  }

  /// Inline manifest entries followed by those from `manifest_file`.
  pub fn manifest_paths(&self) -> Result<Vec<String>> {
    let mut paths = self.manifest.clone();

    if let Some(file) = &self.manifest_file {
      let contents = std::fs::read_to_string(file)
        .map_err(|e| eyre!("Failed to read manifest {}: {}", file.display(), e))?;
      paths.extend(parse_manifest(&contents));
    }

    Ok(paths)
  }

  pub fn lifecycle_settings(&self) -> Result<LifecycleSettings> {
    let manifest = self
      .manifest_paths()?
      .iter()
      .map(|p| self.request_for(p))
      .collect::<Result<Vec<_>>>()?;

    Ok(LifecycleSettings {
      bucket: self.bucket_name(),
      manifest,
      fallback: self.request_for(&self.fallback)?,
      navigation_preload: self.navigation_preload,
      purge_stale_buckets: self.cache.purge_stale_buckets,
      preload_concurrency: self.preload.concurrency,
    })
  }
}

/// One path per line; blank lines and `#` comments are skipped.
fn parse_manifest(contents: &str) -> impl Iterator<Item = String> + '_ {
  contents
    .lines()
    .map(str::trim)
    .filter(|line| !line.is_empty() && !line.starts_with('#'))
    .map(String::from)
}
