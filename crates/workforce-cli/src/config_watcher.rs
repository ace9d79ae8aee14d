//! Config hot-reload watcher.
//!
//! Watches `workforce.toml` for modifications and invokes a callback with the
//! freshly parsed [`ReloadableConfig`] after a debounce window.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use workforce_core::{WorkforceError, WorkforceResult};

/// The settings a running server picks up without a restart.
///
/// Every section is optional, so a file that omits them reloads as a no-op.
/// Unknown sections are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadableConfig {
    #[serde(default)]
    pub orchestrator: Option<ReloadableOrchestrator>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadableOrchestrator {
    #[serde(default)]
    pub max_in_flight: Option<usize>,
}

impl ReloadableConfig {
    /// New concurrency ceiling, if the file sets a usable one.
    pub fn max_in_flight(&self) -> Option<usize> {
        self.orchestrator
            .as_ref()
            .and_then(|o| o.max_in_flight)
            .filter(|n| *n > 0)
    }
}

/// Watches a config file on disk and calls back on every (debounced) change.
///
/// Dropping it releases the file-system watch and lets the background
/// thread exit.
pub struct ConfigWatcher {
    _watcher: RecommendedWatcher,
}

impl ConfigWatcher {
    /// Start watching `config_path`.
    ///
    /// `on_reload` runs on a background thread each time the file changes
    /// and parses. Parse errors are logged and skipped.
    pub fn start<F>(config_path: PathBuf, debounce_ms: u64, on_reload: F) -> WorkforceResult<Self>
    where
        F: Fn(ReloadableConfig) + Send + Sync + 'static,
    {
        let (tx, rx) = std_mpsc::channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                if matches!(event.kind, EventKind::Modify(_)) {
                    let _ = tx.send(());
                }
            }
        })
        .map_err(|e| WorkforceError::Config(format!("Failed to create file watcher: {e}")))?;

        watcher
            .watch(config_path.as_ref(), RecursiveMode::NonRecursive)
            .map_err(|e| WorkforceError::Config(format!("Failed to watch config file: {e}")))?;

        let path = config_path.clone();
        std::thread::spawn(move || {
            let mut last_reload = std::time::Instant::now();
            let debounce = std::time::Duration::from_millis(debounce_ms);

            while rx.recv().is_ok() {
                // One reload per burst of writes.
                while rx.try_recv().is_ok() {}

                let elapsed = last_reload.elapsed();
                if elapsed < debounce {
                    std::thread::sleep(debounce - elapsed);
                }
                last_reload = std::time::Instant::now();

                match parse_config(&path) {
                    Ok(config) => on_reload(config),
                    Err(e) => tracing::warn!(error = %e, "Failed to reload config"),
                }
            }

            tracing::debug!("Config watcher thread exiting");
        });

        tracing::info!(path = %config_path.display(), "Config hot-reload watcher started");

        Ok(Self { _watcher: watcher })
    }
}

/// Read and parse the reloadable subset of a TOML config file.
pub fn parse_config(path: &Path) -> WorkforceResult<ReloadableConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        WorkforceError::Config(format!("Failed to read config '{}': {e}", path.display()))
    })?;
    toml::from_str(&content).map_err(|e| {
        WorkforceError::Config(format!("Failed to parse config '{}': {e}", path.display()))
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_picks_up_max_in_flight() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            tmp.as_file_mut(),
            r#"
data_dir = "./data"

[orchestrator]
max_in_flight = 8
max_retries = 2

[[agents]]
name = "writer"
role = "writer"
"#
        )
        .unwrap();

        let config = parse_config(tmp.path()).unwrap();
        assert_eq!(config.max_in_flight(), Some(8));
    }

    #[test]
    fn test_parse_without_section_is_noop() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut()).unwrap();
        let config = parse_config(tmp.path()).unwrap();
        assert!(config.orchestrator.is_none());
        assert_eq!(config.max_in_flight(), None);
    }

    #[test]
    fn test_zero_ceiling_is_ignored() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut(), "[orchestrator]\nmax_in_flight = 0").unwrap();
        assert_eq!(parse_config(tmp.path()).unwrap().max_in_flight(), None);
    }

    #[test]
    fn test_parse_invalid_toml_returns_error() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp.as_file_mut(), "{{{{invalid toml!!!!").unwrap();
        let err = parse_config(tmp.path()).unwrap_err().to_string();
        assert!(err.contains("Failed to parse config"), "unexpected error: {err}");
    }

    #[test]
    fn test_parse_nonexistent_file_returns_error() {
        let err = parse_config(Path::new("/nonexistent/path/workforce.toml"))
            .unwrap_err()
            .to_string();
        assert!(err.contains("Failed to read config"), "unexpected error: {err}");
    }
}
