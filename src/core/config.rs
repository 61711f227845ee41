//! Configuration system: TOML file + env var overrides + smart defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::errors::{FeedError, Result};
use crate::feed::compose::ComposePolicy;
use crate::feed::model::SectionId;
use crate::feed::traversal::AdvancePolicy;

/// Full engine configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub compose: ComposeConfig,
    pub associations: AssociationsConfig,
    pub traversal: TraversalConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
    pub paths: PathsConfig,
}

/// Which sections the hosting screen renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct ComposeConfig {
    pub sections: ComposePolicy,
}

/// Association strip normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AssociationsConfig {
    /// Insert the synthetic "all" entry when the fetched list lacks one.
    pub prepend_all_entry: bool,
    pub all_entry_label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct TraversalConfig {
    pub advance_policy: AdvancePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionConfig {
    /// Header name used while nobody is signed in.
    pub anonymous_viewer_name: String,
}

/// JSONL activity log settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub enabled: bool,
    pub jsonl_log: PathBuf,
    pub fallback_path: Option<PathBuf>,
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
}

impl Default for AssociationsConfig {
    fn default() -> Self {
        Self {
            prepend_all_entry: true,
            all_entry_label: "All".to_string(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            anonymous_viewer_name: "Guest".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        let data = home_dir().join(".local").join("share").join("cfeed");
        Self {
            enabled: true,
            jsonl_log: data.join("activity.jsonl"),
            fallback_path: Some(env::temp_dir().join("cfeed-activity.jsonl")),
            max_size_bytes: 10 * 1024 * 1024,
            max_rotated_files: 3,
            channel_capacity: 1024,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            config_file: home_dir().join(".config").join("cfeed").join("config.toml"),
        }
    }
}

fn home_dir() -> PathBuf {
    env::var_os("HOME").map_or_else(
        || {
            eprintln!("[CFE-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
            PathBuf::from("/tmp")
        },
        PathBuf::from,
    )
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// Missing config file is not an error when loading from default path; defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf).map_err(|source| FeedError::Io {
                path: path_buf.clone(),
                source,
            })?;
            Self::from_toml(&raw)?
        } else if path.is_some() {
            return Err(FeedError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(env_var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Deterministic FNV-1a hash of the effective config for logging.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("CFEED_COMPOSE_SECTIONS") {
            self.compose.sections = parse_sections("CFEED_COMPOSE_SECTIONS", &raw)?;
        }

        if let Some(raw) = lookup("CFEED_ASSOCIATIONS_PREPEND_ALL_ENTRY") {
            self.associations.prepend_all_entry =
                parse_env("CFEED_ASSOCIATIONS_PREPEND_ALL_ENTRY", &raw)?;
        }
        if let Some(raw) = lookup("CFEED_ASSOCIATIONS_ALL_ENTRY_LABEL") {
            self.associations.all_entry_label = raw;
        }

        if let Some(raw) = lookup("CFEED_TRAVERSAL_ADVANCE_POLICY") {
            self.traversal.advance_policy = match raw.trim() {
                "reject" => AdvancePolicy::Reject,
                "coalesce" => AdvancePolicy::Coalesce,
                other => {
                    return Err(FeedError::ConfigParse {
                        context: "env",
                        details: format!(
                            "CFEED_TRAVERSAL_ADVANCE_POLICY={other:?}: expected reject or coalesce"
                        ),
                    });
                }
            };
        }

        if let Some(raw) = lookup("CFEED_SESSION_ANONYMOUS_VIEWER_NAME") {
            self.session.anonymous_viewer_name = raw;
        }

        if let Some(raw) = lookup("CFEED_LOGGING_ENABLED") {
            self.logging.enabled = parse_env("CFEED_LOGGING_ENABLED", &raw)?;
        }
        if let Some(raw) = lookup("CFEED_LOGGING_JSONL_LOG") {
            self.logging.jsonl_log = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("CFEED_LOGGING_MAX_SIZE_BYTES") {
            self.logging.max_size_bytes = parse_env("CFEED_LOGGING_MAX_SIZE_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("CFEED_LOGGING_MAX_ROTATED_FILES") {
            self.logging.max_rotated_files = parse_env("CFEED_LOGGING_MAX_ROTATED_FILES", &raw)?;
        }
        if let Some(raw) = lookup("CFEED_LOGGING_CHANNEL_CAPACITY") {
            self.logging.channel_capacity = parse_env("CFEED_LOGGING_CHANNEL_CAPACITY", &raw)?;
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.compose.sections.is_empty() {
            return Err(FeedError::InvalidConfig {
                details: "compose.sections must name at least one section".to_string(),
            });
        }

        if self.associations.prepend_all_entry
            && self.associations.all_entry_label.trim().is_empty()
        {
            return Err(FeedError::InvalidConfig {
                details: "associations.all_entry_label must be non-empty when prepend_all_entry=true"
                    .to_string(),
            });
        }

        if self.session.anonymous_viewer_name.trim().is_empty() {
            return Err(FeedError::InvalidConfig {
                details: "session.anonymous_viewer_name must be non-empty".to_string(),
            });
        }

        if self.logging.max_size_bytes < 1024 {
            return Err(FeedError::InvalidConfig {
                details: format!(
                    "logging.max_size_bytes ({}) must be >= 1024",
                    self.logging.max_size_bytes
                ),
            });
        }
        if self.logging.max_rotated_files == 0 {
            return Err(FeedError::InvalidConfig {
                details: "logging.max_rotated_files must be >= 1".to_string(),
            });
        }
        if self.logging.channel_capacity == 0 {
            return Err(FeedError::InvalidConfig {
                details: "logging.channel_capacity must be >= 1".to_string(),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env<T>(name: &str, raw: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|error| FeedError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: {error}"),
        })
}

fn parse_sections(name: &str, raw: &str) -> Result<ComposePolicy> {
    let mut sections = Vec::new();
    for token in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let section = SectionId::ALL
            .into_iter()
            .find(|s| s.as_str() == token)
            .ok_or_else(|| FeedError::ConfigParse {
                context: "env",
                details: format!("{name}: unknown section {token:?}"),
            })?;
        sections.push(section);
    }
    Ok(ComposePolicy::hosting(sections))
}

#[cfg(test)]
mod tests {
    use super::{Config, FeedError};
    use crate::feed::compose::ComposePolicy;
    use crate::feed::model::SectionId;
    use crate::feed::traversal::AdvancePolicy;
    use std::collections::HashMap;
    use std::path::Path;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.compose.sections, ComposePolicy::full());
        assert_eq!(cfg.traversal.advance_policy, AdvancePolicy::Reject);
    }

    #[test]
    fn toml_sections_parse() {
        let cfg = Config::from_toml(
            r#"
            [compose]
            sections = ["missed_digest", "association_list", "announcement_feed"]

            [traversal]
            advance_policy = "coalesce"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.compose.sections, ComposePolicy::home());
        assert_eq!(cfg.traversal.advance_policy, AdvancePolicy::Coalesce);
        assert_eq!(cfg.associations.all_entry_label, "All");
    }

    #[test]
    fn toml_round_trips_through_printer() {
        let cfg = Config::default();
        let printed = cfg.to_toml().unwrap();
        assert_eq!(Config::from_toml(&printed).unwrap(), cfg);
    }

    #[test]
    fn empty_section_table_rejected() {
        let mut cfg = Config::default();
        cfg.compose.sections = ComposePolicy::hosting([]);
        let err = cfg.validate().expect_err("expected invalid sections");
        match err {
            FeedError::InvalidConfig { details } => assert!(details.contains("compose.sections")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_all_label_rejected_only_when_prepending() {
        let mut cfg = Config::default();
        cfg.associations.all_entry_label = "  ".to_string();
        assert!(cfg.validate().is_err());
        cfg.associations.prepend_all_entry = false;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn tiny_log_size_rejected() {
        let mut cfg = Config::default();
        cfg.logging.max_size_bytes = 10;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let env = vars(&[
            ("CFEED_COMPOSE_SECTIONS", "bookmarks, empty_bookmarks_placeholder"),
            ("CFEED_TRAVERSAL_ADVANCE_POLICY", "coalesce"),
            ("CFEED_SESSION_ANONYMOUS_VIEWER_NAME", "Visitor"),
            ("CFEED_LOGGING_ENABLED", "false"),
            ("CFEED_LOGGING_MAX_ROTATED_FILES", "7"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap();
        assert_eq!(cfg.compose.sections, ComposePolicy::bookmarks());
        assert!(cfg.compose.sections.hosts(SectionId::Bookmarks));
        assert_eq!(cfg.traversal.advance_policy, AdvancePolicy::Coalesce);
        assert_eq!(cfg.session.anonymous_viewer_name, "Visitor");
        assert!(!cfg.logging.enabled);
        assert_eq!(cfg.logging.max_rotated_files, 7);
    }

    #[test]
    fn env_unknown_section_rejected() {
        let env = vars(&[("CFEED_COMPOSE_SECTIONS", "timeline")]);
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap_err();
        assert_eq!(err.code(), "CFE-1003");
    }

    #[test]
    fn env_invalid_boolean_rejected() {
        let env = vars(&[("CFEED_LOGGING_ENABLED", "sometimes")]);
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap_err();
        match err {
            FeedError::ConfigParse { context, details } => {
                assert_eq!(context, "env");
                assert!(details.contains("CFEED_LOGGING_ENABLED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let err = Config::load(Some(Path::new("/nonexistent/cfeed/config.toml"))).unwrap_err();
        assert!(matches!(err, FeedError::MissingConfig { .. }));
    }

    #[test]
    fn load_reads_explicit_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[associations]\nall_entry_label = \"Everyone\"\n",
        )
        .unwrap();
        let cfg = Config::load(Some(&path)).unwrap();
        assert_eq!(cfg.associations.all_entry_label, "Everyone");
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn stable_hash_tracks_changes() {
        let cfg = Config::default();
        let before = cfg.stable_hash().unwrap();
        assert_eq!(before, cfg.stable_hash().unwrap());

        let mut changed = cfg;
        changed.traversal.advance_policy = AdvancePolicy::Coalesce;
        assert_ne!(before, changed.stable_hash().unwrap());
    }
}
