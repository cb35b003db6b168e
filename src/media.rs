//! Exclusive access to the audio device
//!
//! An editing session records or plays back one audio block at a time. Holding the device is
//! expressed as a guard, dropping it releases the device.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use thiserror::Error;

use crate::blocks::Block;
use crate::utils::now_millis;

/// Audio device errors
#[derive(Debug, Error)]
pub enum Error {
    /// The device is already in use
    #[error("Audio device is busy: {held_by}")]
    ResourceConflict { held_by: Holder },
}

pub type Result<T> = core::result::Result<T, Error>;

/// What the device is used for
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Holder {
    Recording(PathBuf),
    Playback(PathBuf),
}

impl fmt::Display for Holder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recording(path) => write!(f, "recording {}", path.display()),
            Self::Playback(path) => write!(f, "playing {}", path.display()),
        }
    }
}

/// The audio device of one editing session
#[derive(Clone, Debug)]
pub struct AudioDevice {
    holder: Arc<Mutex<Option<Holder>>>,

    /// Where recordings are stored
    cache_dir: PathBuf,
}

impl AudioDevice {
    pub fn new<P: Into<PathBuf>>(cache_dir: P) -> Self {
        Self {
            holder: Arc::new(Mutex::new(None)),
            cache_dir: cache_dir.into(),
        }
    }

    /// Start a new recording in the cache directory
    pub fn record(&self) -> Result<Recording> {
        let path = self
            .cache_dir
            .join(format!("voice_{}.m4a", now_millis()));

        self.acquire(Holder::Recording(path.clone()))?;

        tracing::debug!("Recording to {}", path.display());

        Ok(Recording {
            release: Release {
                holder: self.holder.clone(),
            },
            path,
        })
    }

    /// Play back an audio file
    pub fn play<P: AsRef<Path>>(&self, path: P) -> Result<Playback> {
        let path = path.as_ref().to_path_buf();

        self.acquire(Holder::Playback(path.clone()))?;

        tracing::debug!("Playing {}", path.display());

        Ok(Playback {
            release: Release {
                holder: self.holder.clone(),
            },
            path,
        })
    }

    /// What holds the device right now
    #[cfg(test)]
    pub fn holder(&self) -> Option<Holder> {
        lock(&self.holder).clone()
    }

    fn acquire(&self, holder: Holder) -> Result<()> {
        let mut current = lock(&self.holder);

        if let Some(held_by) = current.as_ref() {
            tracing::warn!("Audio device is busy {held_by}, not starting {holder}");

            return Err(Error::ResourceConflict {
                held_by: held_by.clone(),
            });
        }

        *current = Some(holder);

        Ok(())
    }
}

/// Releases the device when dropped
#[derive(Debug)]
struct Release {
    holder: Arc<Mutex<Option<Holder>>>,
}

impl Drop for Release {
    fn drop(&mut self) {
        if let Some(holder) = lock(&self.holder).take() {
            tracing::debug!("Audio device released after {holder}");
        }
    }
}

/// A recording in progress
#[derive(Debug)]
pub struct Recording {
    release: Release,
    path: PathBuf,
}

impl Recording {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stop recording, the recorded file becomes an audio block
    pub fn finish(self) -> Block {
        let Self { release, path } = self;
        drop(release);

        Block::audio(path.to_string_lossy())
    }
}

/// A playback in progress
#[derive(Debug)]
pub struct Playback {
    #[allow(dead_code)]
    release: Release,
    path: PathBuf,
}

impl Playback {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
