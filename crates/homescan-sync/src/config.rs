use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use homescan_adapters::AdapterBackend;
use homescan_storage::{DataLayout, FlushPolicy, TrackerPolicy};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const CONFIG_FILE_NAME: &str = "homescan.yaml";
pub const LOCATION_PLACEHOLDER: &str = "{location}";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub default_location: String,
    /// Search phrasings; `{location}` is substituted per run.
    pub query_templates: Vec<String>,
    pub max_items: usize,
    pub tracker_flush: FlushPolicy,
    pub retry_failed: bool,
    pub record_skipped_runs: bool,
    pub candidate_source: AdapterBackend,
    pub item_processor: AdapterBackend,
    pub scheduler_enabled: bool,
    /// Six-field cron expression (seconds first).
    pub schedule_cron: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            default_location: "LB Nagar".to_string(),
            query_templates: vec![
                "independent house for sale {location}".to_string(),
                "individual house {location}".to_string(),
                "house for sale {location} Hyderabad".to_string(),
            ],
            max_items: 10,
            tracker_flush: FlushPolicy::PerItem,
            retry_failed: true,
            record_skipped_runs: false,
            candidate_source: AdapterBackend::Fixture {
                dir: PathBuf::from("./fixtures"),
            },
            item_processor: AdapterBackend::Fixture {
                dir: PathBuf::from("./fixtures"),
            },
            scheduler_enabled: false,
            schedule_cron: "0 0 7 * * *".to_string(),
        }
    }
}

impl SyncConfig {
    /// Defaults, then `homescan.yaml` (or `$HOMESCAN_CONFIG`), then environment overrides.
    pub fn from_env() -> Result<Self> {
        Self::load(Path::new("."), |key| std::env::var(key).ok())
    }

    pub fn load(root: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let explicit = lookup("HOMESCAN_CONFIG").map(PathBuf::from);
        let path = explicit.clone().unwrap_or_else(|| root.join(CONFIG_FILE_NAME));

        let mut config = if explicit.is_some() || path.is_file() {
            Self::from_yaml_file(&path)?
        } else {
            Self::default()
        };
        config.apply_env(lookup)?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        debug!(path = %path.display(), "loading config file");
        Self::from_yaml_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = lookup("HOMESCAN_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        if let Some(max) = lookup("HOMESCAN_MAX_ITEMS") {
            self.max_items = max
                .trim()
                .parse()
                .with_context(|| format!("HOMESCAN_MAX_ITEMS must be a count, got {max:?}"))?;
        }
        if let Some(flush) = lookup("HOMESCAN_TRACKER_FLUSH") {
            self.tracker_flush = flush.parse().map_err(anyhow::Error::msg)?;
        }
        if let Some(retry) = lookup("HOMESCAN_RETRY_FAILED") {
            self.retry_failed = parse_flag(&retry);
        }
        if let Some(enabled) = lookup("HOMESCAN_SCHEDULER_ENABLED") {
            self.scheduler_enabled = parse_flag(&enabled);
        }
        if let Some(cron) = lookup("HOMESCAN_SCHEDULE_CRON") {
            self.schedule_cron = cron;
        }
        Ok(())
    }

    pub fn layout(&self) -> DataLayout {
        DataLayout::new(&self.data_dir)
    }

    pub fn tracker_policy(&self) -> TrackerPolicy {
        TrackerPolicy {
            flush: self.tracker_flush,
            retry_failed: self.retry_failed,
        }
    }

    /// Concrete queries for `location`, in template order, without repeats.
    pub fn queries_for(&self, location: &str) -> Vec<String> {
        let mut queries: Vec<String> = Vec::new();
        for template in &self.query_templates {
            let query = template.replace(LOCATION_PLACEHOLDER, location.trim());
            let query = query.split_whitespace().collect::<Vec<_>>().join(" ");
            if !query.is_empty() && !queries.contains(&query) {
                queries.push(query);
            }
        }
        queries
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_file_or_env() {
        let dir = tempfile::tempdir().unwrap();
        let config = SyncConfig::load(dir.path(), env(&[])).unwrap();
        assert_eq!(config, SyncConfig::default());
        assert_eq!(config.layout().lock_file(), PathBuf::from("./data/.lock"));
    }

    #[test]
    fn yaml_then_env_layering() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "data_dir: /var/lib/homescan\nmax_items: 3\ntracker_flush: run_end\n\
             item_processor:\n  kind: command\n  program: extract-property\n  args: [--model, small]\n",
        )
        .unwrap();

        let config =
            SyncConfig::load(dir.path(), env(&[("HOMESCAN_MAX_ITEMS", "25")])).unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/var/lib/homescan"));
        assert_eq!(config.max_items, 25);
        assert_eq!(config.tracker_flush, FlushPolicy::RunEnd);
        assert_eq!(
            config.item_processor,
            AdapterBackend::Command {
                program: "extract-property".into(),
                args: vec!["--model".into(), "small".into()],
            }
        );
        assert_eq!(config.default_location, "LB Nagar");
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let lookup = env(&[("HOMESCAN_CONFIG", missing.to_str().unwrap())]);
        assert!(SyncConfig::load(dir.path(), lookup).is_err());
    }

    #[test]
    fn bad_env_values_are_rejected() {
        let mut config = SyncConfig::default();
        assert!(config.apply_env(env(&[("HOMESCAN_MAX_ITEMS", "lots")])).is_err());
        assert!(config
            .apply_env(env(&[("HOMESCAN_TRACKER_FLUSH", "hourly")]))
            .is_err());
        config
            .apply_env(env(&[
                ("HOMESCAN_RETRY_FAILED", "false"),
                ("HOMESCAN_SCHEDULER_ENABLED", "TRUE"),
            ]))
            .unwrap();
        assert!(!config.retry_failed);
        assert!(config.scheduler_enabled);
    }

    #[test]
    fn shipped_example_config_parses() {
        let config = SyncConfig::from_yaml_str(include_str!("../../../homescan.example.yaml"))
            .expect("example config");
        assert_eq!(config, SyncConfig::default());
    }

    #[test]
    fn templates_expand_location() {
        let config = SyncConfig {
            query_templates: vec![
                "house for sale {location}".into(),
                "{location} house for sale".into(),
                "house for sale  {location}".into(),
            ],
            ..SyncConfig::default()
        };
        assert_eq!(
            config.queries_for(" Uppal "),
            vec!["house for sale Uppal", "Uppal house for sale"]
        );
    }
}
