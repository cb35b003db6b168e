//! All API endpoint setup

use axum::Router;
use axum::routing::get;
use axum::routing::post;

use crate::storage::Storage;

pub use audio::AudioSession;
pub use request::Form;
pub use request::PathParameters;
pub use request::QueryParameters;
pub use response::Error;
pub use response::Success;

mod audio;
mod notes;
mod presence;
mod request;
mod response;

/// Get the Axum router for all API routes
pub fn router<S: Storage>() -> Router {
    let notes = Router::new()
        .route("/", get(notes::list::<S>).post(notes::create::<S>))
        .route("/sticky", get(notes::sticky::<S>))
        .route("/recent", get(notes::recent::<S>))
        .route("/reminders", get(notes::reminders::<S>))
        .route("/delete", post(notes::delete_many::<S>))
        .route(
            "/{note}",
            get(notes::single::<S>)
                .put(notes::update::<S>)
                .delete(notes::delete::<S>),
        );

    let presence = Router::new()
        .route("/", get(presence::status::<S>))
        .route("/start", post(presence::start::<S>))
        .route("/close", post(presence::close::<S>))
        .route("/dismiss", post(presence::dismiss::<S>));

    let audio = Router::new()
        .route("/recording", post(audio::record))
        .route("/recording/finish", post(audio::finish_recording))
        .route("/playback", post(audio::play).delete(audio::stop_playback));

    Router::new()
        .nest("/notes", notes)
        .nest("/presence", presence)
        .nest("/audio", audio)
        .route("/notifications", get(presence::notifications))
}
