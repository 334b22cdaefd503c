use crate::{
    Result, error,
    paths::{FileMode, write_atomic},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::{collections::BTreeMap, path::PathBuf, sync::RwLock, time::Duration};

/// Detections expire after this long, so a tool that grows a better
/// completion protocol gets re-probed within a day.
pub const DETECTION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct DetectionEntry {
    completer_type: String,
    timestamp: DateTime<Utc>,
}

/// Remembers which completion strategy worked for each tool, so subsequent
/// keystrokes skip the detection race. Only successful detections are stored.
#[derive(Debug)]
pub struct DetectionCache {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, DetectionEntry>>,
}

impl DetectionCache {
    pub fn open(path: PathBuf) -> Self {
        let entries = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "detection cache is corrupt; starting empty"
                    );
                    BTreeMap::new()
                }
            },
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    /// The cached strategy name for a tool, if present and younger than
    /// [`DETECTION_TTL`].
    pub fn get(&self, tool: &str) -> Option<String> {
        let entries = self.entries.read().expect("detection lock poisoned");
        let entry = entries.get(tool)?;

        let age = Utc::now()
            .signed_duration_since(entry.timestamp)
            .to_std()
            .unwrap_or(Duration::MAX);
        if age < DETECTION_TTL {
            Some(entry.completer_type.clone())
        } else {
            None
        }
    }

    /// Record a successful detection. Setting a tool to the strategy already
    /// stored is a no-op and does not touch the file.
    pub fn set(&self, tool: &str, completer_type: &str) -> Result<()> {
        {
            let entries = self.entries.read().expect("detection lock poisoned");
            if entries
                .get(tool)
                .is_some_and(|e| e.completer_type == completer_type)
            {
                return Ok(());
            }
        }

        self.entries.write().expect("detection lock poisoned").insert(
            tool.to_string(),
            DetectionEntry {
                completer_type: completer_type.to_string(),
                timestamp: Utc::now(),
            },
        );
        self.persist()
    }

    pub fn clear_all(&self) -> Result<()> {
        self.entries
            .write()
            .expect("detection lock poisoned")
            .clear();
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let json = {
            let entries = self.entries.read().expect("detection lock poisoned");
            serde_json::to_string_pretty(&*entries).context(error::CacheSerializeSnafu)?
        };

        write_atomic(&self.path, json.as_bytes(), FileMode::Shared).map_err(|e| {
            error::Error::CacheIo {
                path: self.path.clone(),
                source: std::io::Error::other(e.to_string()),
            }
        })
    }
}
