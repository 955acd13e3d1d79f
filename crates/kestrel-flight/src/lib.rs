pub mod connection;
pub mod landing;
pub mod missionplan;
pub mod progress;
pub mod sequencer;
pub mod tasks;
pub mod watcher;

pub use connection::ConnectError;
pub use sequencer::{Maneuver, SequenceError};
pub use tasks::TaskRegistry;
