use std::sync::Arc;

use crate::traits::{Action, Geofence, LogFiles, Mission, Offboard, Param, TelemetryStreams, Tune};

/// Handle to one connected vehicle, split into per-concern capabilities.
///
/// Owned by the process for its lifetime; dropping every clone tears the
/// link down. Cloning is cheap (`Arc` per slot).
#[derive(Clone)]
pub struct Session {
    pub telemetry: Arc<dyn TelemetryStreams>,
    pub action: Arc<dyn Action>,
    pub offboard: Arc<dyn Offboard>,
    pub mission: Arc<dyn Mission>,
    pub param: Arc<dyn Param>,
    pub geofence: Arc<dyn Geofence>,
    pub tune: Arc<dyn Tune>,
    pub logs: Arc<dyn LogFiles>,
}

impl Session {
    /// Bundle a backend that implements every capability into a session.
    pub fn from_backend<T>(backend: Arc<T>) -> Self
    where
        T: TelemetryStreams
            + Action
            + Offboard
            + Mission
            + Param
            + Geofence
            + Tune
            + LogFiles
            + 'static,
    {
        Self {
            telemetry: backend.clone(),
            action: backend.clone(),
            offboard: backend.clone(),
            mission: backend.clone(),
            param: backend.clone(),
            geofence: backend.clone(),
            tune: backend.clone(),
            logs: backend,
        }
    }
}
