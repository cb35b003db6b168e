//! Durable revival trigger
//!
//! When the process goes away, timers inside it go away too. The revival is handed to something
//! that outlives the process and is picked up again when the process starts. This is best-effort:
//! nothing guarantees the process is ever started again.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::utils::now_millis;

use super::Error;
use super::Result;

/// File name of the marker within the state directory
const MARKER_FILE_NAME: &str = "presence-revival.json";

/// Schedules a revival that survives the process
pub trait RevivalTimer: Send + Sync + 'static {
    /// Schedule a revival after the delay, replacing any earlier one
    fn schedule_revival(&self, delay: Duration) -> Result<()>;

    /// Take the pending revival, if any, as epoch millis of when it is due
    fn take_pending(&self) -> Option<i64>;
}

/// Stored revival
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RevivalMarker {
    fire_at: i64,
}

/// Keeps the pending revival as a marker file in the state directory
#[derive(Clone, Debug)]
pub struct FileRevivalTimer {
    path: PathBuf,
}

impl FileRevivalTimer {
    pub fn new<P: Into<PathBuf>>(state_dir: P) -> Self {
        Self {
            path: state_dir.into().join(MARKER_FILE_NAME),
        }
    }

    fn remove_marker(&self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!("Could not remove revival marker: {err}");
            }
        }
    }
}

impl RevivalTimer for FileRevivalTimer {
    fn schedule_revival(&self, delay: Duration) -> Result<()> {
        let delay = i64::try_from(delay.as_millis()).map_err(|err| Error::Timer(err.to_string()))?;
        let marker = RevivalMarker {
            fire_at: now_millis().saturating_add(delay),
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|err| Error::Timer(err.to_string()))?;
        }

        let contents =
            serde_json::to_vec(&marker).map_err(|err| Error::Timer(err.to_string()))?;

        fs::write(&self.path, contents).map_err(|err| Error::Timer(err.to_string()))?;

        tracing::debug!("Revival marker written to {}", self.path.display());

        Ok(())
    }

    fn take_pending(&self) -> Option<i64> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    tracing::warn!("Could not read revival marker: {err}");
                }

                return None;
            }
        };

        self.remove_marker();

        match serde_json::from_slice::<RevivalMarker>(&contents) {
            Ok(marker) => Some(marker.fire_at),
            Err(err) => {
                tracing::warn!("Ignoring unreadable revival marker: {err}");

                None
            }
        }
    }
}
