use serde::{Deserialize, Serialize};

use crate::session::SessionProfile;

/// Body of a successful `POST /validateToken` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationPayload {
    pub user: serde_json::Value,
    #[serde(default)]
    pub tracks: serde_json::Value,
    #[serde(rename = "isSubscriber", default)]
    pub is_subscriber: bool,
}

impl From<ValidationPayload> for SessionProfile {
    fn from(payload: ValidationPayload) -> Self {
        SessionProfile {
            user: payload.user,
            content: payload.tracks,
            entitlement: payload.is_subscriber,
        }
    }
}
