pub mod error;
pub mod fake;
pub mod session;
pub mod traits;
pub mod types;

pub use error::{ActionError, LogError, MissionError, OffboardError, ParamError, Rejection};
pub use session::Session;
pub use traits::{Action, Geofence, LogFiles, Mission, Offboard, Param, TelemetryStreams, Tune};
pub use types::*;
