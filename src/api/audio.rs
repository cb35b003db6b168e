use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use axum::Extension;
use serde::Deserialize;
use serde::Serialize;

use crate::blocks::Block;
use crate::media::AudioDevice;
use crate::media::Playback;
use crate::media::Recording;

use super::Error;
use super::Form;
use super::Success;

/// The audio device with whatever currently holds it
#[derive(Clone)]
pub struct AudioSession {
    device: AudioDevice,
    recording: Arc<Mutex<Option<Recording>>>,
    playback: Arc<Mutex<Option<Playback>>>,
}

impl AudioSession {
    pub fn new(device: AudioDevice) -> Self {
        Self {
            device,
            recording: Arc::new(Mutex::new(None)),
            playback: Arc::new(Mutex::new(None)),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioResponse {
    pub path: String,
}

pub async fn record(
    Extension(session): Extension<AudioSession>,
) -> Result<Success<AudioResponse>, Error> {
    let recording = session.device.record()?;
    let path = recording.path().to_string_lossy().to_string();

    *lock(&session.recording) = Some(recording);

    Ok(Success::created(AudioResponse { path }))
}

/// Stop recording, returns the block to add to the note
pub async fn finish_recording(
    Extension(session): Extension<AudioSession>,
) -> Result<Success<Block>, Error> {
    let recording = lock(&session.recording)
        .take()
        .ok_or_else(|| Error::not_found("No recording in progress"))?;

    Ok(Success::ok(recording.finish()))
}

#[derive(Deserialize)]
pub struct PlayForm {
    path: String,
}

pub async fn play(
    Extension(session): Extension<AudioSession>,
    Form(form): Form<PlayForm>,
) -> Result<Success<AudioResponse>, Error> {
    let playback = session.device.play(&form.path)?;

    *lock(&session.playback) = Some(playback);

    Ok(Success::created(AudioResponse { path: form.path }))
}

pub async fn stop_playback(
    Extension(session): Extension<AudioSession>,
) -> Result<Success<AudioResponse>, Error> {
    lock(&session.playback)
        .take()
        .ok_or_else(|| Error::not_found("Nothing is playing"))?;

    Ok(Success::no_content())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
