//! Application configuration.
//!
//! One TOML file (`beatportdl.toml`) deserialized into [`AppConfig`]. Every
//! field has a default, so a partial file (or none at all) is valid. Secrets
//! can be supplied through the environment instead of the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog::{HttpCatalogConfig, KeySystem, NamingPreferences, NumberPadding, Store};
use serde::{Deserialize, Serialize};
use tracing::debug;
use transfer_engine::{RetryPolicy, TransferConfig};

use crate::acquisition::Quality;
use crate::delivery::TelegramConfig;
use crate::tagging::{FieldOptions, TagMappings};
use crate::{Error, Result};

pub const CONFIG_FILENAME: &str = "beatportdl.toml";

pub const ENV_BEATPORT_TOKEN: &str = "BEATPORT_ACCESS_TOKEN";
pub const ENV_BEATSOURCE_TOKEN: &str = "BEATSOURCE_ACCESS_TOKEN";
pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_FFMPEG_PATH: &str = "FFMPEG_PATH";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub concurrency: ConcurrencyConfig,
    pub sorting: SortingConfig,
    pub naming: NamingConfig,
    pub tagging: TaggingConfig,
    pub catalog: CatalogConfig,
    pub transfer: TransferSettings,
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Root of the downloads tree.
    pub downloads_directory: PathBuf,
    /// Directory for in-progress files; the platform temp dir when unset.
    pub temp_directory: Option<PathBuf>,
    /// `lossless`, `high`, `medium` or `medium-hls`.
    pub quality: String,
    pub show_progress: bool,
    /// Also write warnings and errors to `error.log` next to the config file.
    pub write_error_log: bool,
    /// Move finished tracks into the downloads tree. Disable to only deliver them.
    pub save_to_disk: bool,
    pub overwrite_existing: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            downloads_directory: PathBuf::from("downloads"),
            temp_directory: None,
            quality: Quality::Lossless.as_str().to_string(),
            show_progress: true,
            write_error_log: false,
            save_to_disk: true,
            overwrite_existing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    pub max_global_workers: usize,
    pub max_download_workers: usize,
    /// Segments fetched at once within one segmented transfer.
    pub segment_concurrency: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_global_workers: 15,
            max_download_workers: 15,
            segment_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SortingConfig {
    /// One directory level per entity (release, playlist, ...).
    pub sort_by_context: bool,
    /// Put release directories under a label directory.
    pub sort_by_label: bool,
    /// Nest playlist and chart tracks in their release directories.
    pub force_release_directories: bool,
}

impl Default for SortingConfig {
    fn default() -> Self {
        Self {
            sort_by_context: true,
            sort_by_label: false,
            force_release_directories: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub track_file_template: String,
    pub release_directory_template: String,
    pub playlist_directory_template: String,
    pub chart_directory_template: String,
    pub label_directory_template: String,
    pub artist_directory_template: String,
    /// Replacement for spaces in rendered names; empty keeps spaces.
    pub whitespace_character: String,
    pub artists_limit: usize,
    pub artists_short_form: String,
    pub track_number_padding: NumberPadding,
    /// `standard`, `standard-short`, `openkey` or `camelot`.
    pub key_system: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            track_file_template: "{number}. {artists} - {name} ({mix_name})".to_string(),
            release_directory_template: "[{catalog_number}] {artists} - {name}".to_string(),
            playlist_directory_template: "{name} [{created_date}]".to_string(),
            chart_directory_template: "{name} [{published_date}]".to_string(),
            label_directory_template: "{name} [{updated_date}]".to_string(),
            artist_directory_template: "{name}".to_string(),
            whitespace_character: String::new(),
            artists_limit: 3,
            artists_short_form: "VA".to_string(),
            track_number_padding: NumberPadding::Auto,
            key_system: "standard-short".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaggingConfig {
    pub fix_tags: bool,
    pub embed_cover: bool,
    /// Keep a `cover.jpg` next to context-sorted tracks.
    pub keep_cover: bool,
    pub cover_size: String,
    pub tag_mappings: TagMappings,
}

impl Default for TaggingConfig {
    fn default() -> Self {
        Self {
            fix_tags: true,
            embed_cover: true,
            keep_cover: false,
            cover_size: catalog::DEFAULT_COVER_SIZE.to_string(),
            tag_mappings: TagMappings::builtin(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub beatport_access_token: Option<String>,
    pub beatsource_access_token: Option<String>,
    pub proxy: Option<String>,
    pub beatport_api_url: String,
    pub beatsource_api_url: String,
    pub timeout_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            beatport_access_token: None,
            beatsource_access_token: None,
            proxy: None,
            beatport_api_url: catalog::client::BEATPORT_API_URL.to_string(),
            beatsource_api_url: catalog::client::BEATSOURCE_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub offload_decryption: bool,
    pub ffmpeg_path: PathBuf,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 15,
            request_timeout_secs: 300,
            max_retries: 3,
            retry_base_delay_ms: 500,
            offload_decryption: true,
            ffmpeg_path: PathBuf::from("ffmpeg"),
        }
    }
}

impl AppConfig {
    /// Location of the configuration file: `explicit`, else the platform
    /// config dir if a file exists there, else the working directory.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(path) = explicit {
            return path.to_path_buf();
        }
        if let Some(path) = dirs::config_dir().map(|d| d.join("beatportdl").join(CONFIG_FILENAME))
            && path.exists()
        {
            return path;
        }
        PathBuf::from(CONFIG_FILENAME)
    }

    /// Load, apply environment overrides and validate.
    ///
    /// A missing file is only an error when it was named explicitly.
    pub fn load(explicit: Option<&Path>) -> Result<(Self, PathBuf)> {
        let path = Self::locate(explicit);
        let mut config = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_toml(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && explicit.is_none() => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Self::default()
            }
            Err(e) => return Err(Error::io_path("reading configuration", &path, e)),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok((config, path))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("invalid configuration: {e}")))
    }

    /// Override secrets and tool paths from the environment.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(token) = get(ENV_BEATPORT_TOKEN) {
            self.catalog.beatport_access_token = Some(token);
        }
        if let Some(token) = get(ENV_BEATSOURCE_TOKEN) {
            self.catalog.beatsource_access_token = Some(token);
        }
        if let Some(token) = get(ENV_TELEGRAM_TOKEN) {
            self.telegram.bot_token = token;
        }
        if let Some(path) = get(ENV_FFMPEG_PATH) {
            self.transfer.ffmpeg_path = PathBuf::from(path);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.downloads_directory.as_os_str().is_empty() {
            return Err(Error::validation("downloads_directory must not be empty"));
        }
        if self.concurrency.max_global_workers == 0 {
            return Err(Error::validation("max_global_workers must be at least 1"));
        }
        if self.concurrency.max_download_workers == 0 {
            return Err(Error::validation("max_download_workers must be at least 1"));
        }
        if self.concurrency.segment_concurrency == 0 {
            return Err(Error::validation("segment_concurrency must be at least 1"));
        }
        self.quality()?;
        self.key_system()?;
        // Empty keeps whitespace as is.
        let ws = &self.naming.whitespace_character;
        if !ws.is_empty() && !catalog::is_valid_whitespace_replacement(ws) {
            return Err(Error::validation(format!(
                "whitespace_character `{}` contains characters not allowed in paths",
                self.naming.whitespace_character
            )));
        }
        if self.telegram.enabled && self.telegram.bot_token.trim().is_empty() {
            return Err(Error::validation(format!(
                "telegram is enabled but no bot token is set (use {ENV_TELEGRAM_TOKEN})"
            )));
        }
        Ok(())
    }

    pub fn quality(&self) -> Result<Quality> {
        self.general.quality.parse()
    }

    pub fn key_system(&self) -> Result<KeySystem> {
        self.naming
            .key_system
            .parse()
            .map_err(|_| Error::validation(format!("unknown key system `{}`", self.naming.key_system)))
    }

    fn whitespace(&self) -> Option<String> {
        Some(self.naming.whitespace_character.clone()).filter(|w| !w.is_empty())
    }

    /// Naming inputs for `template`.
    pub fn naming_preferences(&self, template: &str) -> NamingPreferences {
        NamingPreferences {
            template: template.to_string(),
            whitespace: self.whitespace(),
            artists_limit: self.naming.artists_limit,
            artists_short_form: self.naming.artists_short_form.clone(),
            track_number_padding: self.naming.track_number_padding,
            key_system: self.key_system().unwrap_or_default(),
        }
    }

    pub fn field_options(&self) -> FieldOptions {
        FieldOptions {
            artists_limit: self.naming.artists_limit,
            artists_short_form: self.naming.artists_short_form.clone(),
            track_number_padding: self.naming.track_number_padding,
            key_system: self.key_system().unwrap_or_default(),
        }
    }

    pub fn transfer_config(&self) -> TransferConfig {
        TransferConfig {
            connect_timeout: Duration::from_secs(self.transfer.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.transfer.request_timeout_secs),
            retry: RetryPolicy {
                max_retries: self.transfer.max_retries,
                base_delay: Duration::from_millis(self.transfer.retry_base_delay_ms),
                ..RetryPolicy::default()
            },
            segment_concurrency: self.concurrency.segment_concurrency,
            offload_decryption: self.transfer.offload_decryption,
            proxy: self.catalog.proxy.clone(),
            ..TransferConfig::default()
        }
    }

    pub fn catalog_config(&self, store: Store) -> HttpCatalogConfig {
        let (base_url, token) = match store {
            Store::Beatport => (
                &self.catalog.beatport_api_url,
                &self.catalog.beatport_access_token,
            ),
            Store::Beatsource => (
                &self.catalog.beatsource_api_url,
                &self.catalog.beatsource_access_token,
            ),
        };
        HttpCatalogConfig {
            store,
            base_url: base_url.clone(),
            access_token: token.clone(),
            proxy: self.catalog.proxy.clone(),
            timeout: Duration::from_secs(self.catalog.timeout_secs),
        }
    }

    /// Directory for in-progress files.
    pub fn temp_directory(&self) -> PathBuf {
        self.general
            .temp_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.quality().unwrap(), Quality::Lossless);
        assert!(config.tagging.tag_mappings.0.contains_key("flac"));
    }

    #[test]
    fn test_empty_whitespace_character_keeps_spaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[naming]\nwhitespace_character = \"\"\n").unwrap();

        let (config, _) = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.naming_preferences("{name}").whitespace, None);
    }

    #[test]
    fn test_partial_file() {
        let config = AppConfig::from_toml(
            r#"
            [general]
            quality = "medium-hls"

            [naming]
            whitespace_character = "_"
            track_number_padding = 3

            [tagging.tag_mappings.default]
            track_name = "TITLE"
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.quality().unwrap(), Quality::MediumHls);
        assert_eq!(config.naming.track_number_padding, NumberPadding::Fixed(3));
        assert_eq!(config.concurrency.max_global_workers, 15);
        let prefs = config.naming_preferences("{name}");
        assert_eq!(prefs.whitespace.as_deref(), Some("_"));
        // a configured table set replaces the builtin one
        assert_eq!(config.tagging.tag_mappings.0.len(), 1);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.general.quality = "ultra".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.concurrency.max_download_workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.naming.key_system = "solfege".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.naming.whitespace_character = "/".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.general.downloads_directory = PathBuf::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env = HashMap::from([
            (ENV_BEATPORT_TOKEN, "bp-token"),
            (ENV_TELEGRAM_TOKEN, "123:abc"),
            (ENV_FFMPEG_PATH, "/opt/ffmpeg/bin/ffmpeg"),
            (ENV_BEATSOURCE_TOKEN, "  "),
        ]);
        let mut config = AppConfig::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(
            config.catalog_config(Store::Beatport).access_token.as_deref(),
            Some("bp-token")
        );
        assert_eq!(config.catalog.beatsource_access_token, None);
        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(
            config.transfer.ffmpeg_path,
            PathBuf::from("/opt/ffmpeg/bin/ffmpeg")
        );
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(AppConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_transfer_config_mapping() {
        let mut config = AppConfig::default();
        config.concurrency.segment_concurrency = 6;
        config.transfer.max_retries = 1;
        let transfer = config.transfer_config();
        assert_eq!(transfer.segment_concurrency, 6);
        assert_eq!(transfer.retry.max_retries, 1);
    }
}
