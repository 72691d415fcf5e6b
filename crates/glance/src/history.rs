//! Remembers the last video source entered by the user.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde_json::{Map, Value};

const DEFAULT_PATH: &str = ".source_history.json";
const DEFAULT_KEY: &str = "video_source";

/// A single remembered value, stored under one key of a small JSON file.
///
/// Failing to read or write the file is never fatal: loading yields `None`, saving logs a
/// warning.
#[derive(Debug, Clone)]
pub struct SourceHistory {
    path: PathBuf,
    key: String,
}

impl Default for SourceHistory {
    /// Uses `.source_history.json` in the working directory, key `video_source`.
    fn default() -> Self {
        Self::new(DEFAULT_PATH, DEFAULT_KEY)
    }
}

impl SourceHistory {
    pub fn new(path: impl Into<PathBuf>, key: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            key: key.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored source, if there is one.
    pub fn load(&self) -> Option<String> {
        let data = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) => {
                log::debug!("no source history at '{}': {e}", self.path.display());
                return None;
            }
        };
        let value = match serde_json::from_str::<Value>(&data) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("ignoring malformed source history '{}': {e}", self.path.display());
                return None;
            }
        };
        match value.get(&self.key) {
            Some(Value::String(source)) => Some(source.clone()),
            _ => {
                log::debug!(
                    "source history '{}' has no string '{}'",
                    self.path.display(),
                    self.key
                );
                None
            }
        }
    }

    /// Stores `source`, replacing the file's previous contents.
    pub fn save(&self, source: &str) {
        let mut map = Map::new();
        map.insert(self.key.clone(), Value::String(source.to_string()));
        let result = serde_json::to_string_pretty(&Value::Object(map))
            .map_err(anyhow::Error::from)
            .and_then(|json| Ok(fs::write(&self.path, json)?));
        if let Err(e) = result {
            log::warn!(
                "failed to save source history to '{}': {e}",
                self.path.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;

    fn temp_history() -> SourceHistory {
        let path = env::temp_dir().join(format!("glance-history-{}.json", fastrand::u64(..)));
        SourceHistory::new(path, DEFAULT_KEY)
    }

    #[test]
    fn save_then_load() {
        let history = temp_history();
        assert_eq!(history.load(), None);

        history.save("rtsp://user:pw@192.168.0.100:554/profile1");
        assert_eq!(
            history.load().as_deref(),
            Some("rtsp://user:pw@192.168.0.100:554/profile1")
        );
        history.save("0");
        assert_eq!(history.load().as_deref(), Some("0"));

        let json = fs::read_to_string(history.path()).unwrap();
        assert_eq!(json, "{\n  \"video_source\": \"0\"\n}");
        fs::remove_file(history.path()).unwrap();
    }

    #[test]
    fn unusable_files_load_nothing() {
        let history = temp_history();
        for contents in ["not json", "[1, 2, 3]", "{\"other\": \"x\"}", "{\"video_source\": 3}"] {
            fs::write(history.path(), contents).unwrap();
            assert_eq!(history.load(), None, "{contents}");
        }
        fs::remove_file(history.path()).unwrap();
    }

    #[test]
    fn save_failure_is_not_fatal() {
        let dir = env::temp_dir().join(format!("glance-missing-{}", fastrand::u64(..)));
        let history = SourceHistory::new(dir.join("history.json"), "video_source");
        history.save("0");
        assert_eq!(history.load(), None);
    }

    #[test]
    fn default_location() {
        let history = SourceHistory::default();
        assert_eq!(history.path(), Path::new(".source_history.json"));
    }
}
