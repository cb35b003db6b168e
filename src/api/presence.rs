use std::sync::Arc;

use axum::Extension;
use serde::Serialize;

use crate::presence::InProcessHost;
use crate::presence::PresenceController;
use crate::presence::PresenceState;
use crate::presence::ShownPresence;
use crate::reminders::ReminderNotification;
use crate::storage::Storage;

use super::Error;
use super::Success;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceResponse {
    pub state: PresenceState,

    /// What the host shows right now, if anything
    pub shown: Option<ShownPresence>,
}

impl PresenceResponse {
    fn current<S: Storage>(controller: &PresenceController<S>, host: &InProcessHost) -> Self {
        Self {
            state: controller.state(),
            shown: host.shown_presence(),
        }
    }
}

pub async fn status<S: Storage>(
    Extension(controller): Extension<PresenceController<S>>,
    Extension(host): Extension<Arc<InProcessHost>>,
) -> Success<PresenceResponse> {
    Success::ok(PresenceResponse::current(&controller, &host))
}

pub async fn start<S: Storage>(
    Extension(controller): Extension<PresenceController<S>>,
    Extension(host): Extension<Arc<InProcessHost>>,
) -> Result<Success<PresenceResponse>, Error> {
    controller.start().await?;

    Ok(Success::ok(PresenceResponse::current(&controller, &host)))
}

/// The close control of the presence
pub async fn close<S: Storage>(
    Extension(controller): Extension<PresenceController<S>>,
    Extension(host): Extension<Arc<InProcessHost>>,
) -> Success<PresenceResponse> {
    controller.stop();

    Success::ok(PresenceResponse::current(&controller, &host))
}

/// The presence was swiped away
pub async fn dismiss<S: Storage>(
    Extension(controller): Extension<PresenceController<S>>,
    Extension(host): Extension<Arc<InProcessHost>>,
) -> Success<PresenceResponse> {
    controller.on_dismissed();

    Success::ok(PresenceResponse::current(&controller, &host))
}

pub async fn notifications(
    Extension(host): Extension<Arc<InProcessHost>>,
) -> Success<Vec<ReminderNotification>> {
    Success::ok(host.delivered())
}
