use thiserror::Error;

/// Why the flight controller refused a command, decoded from its ack result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TemporarilyRejected,
    Denied,
    Unsupported,
    Failed,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Rejection::TemporarilyRejected => "TEMPORARILY_REJECTED",
            Rejection::Denied => "DENIED",
            Rejection::Unsupported => "UNSUPPORTED",
            Rejection::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OffboardError {
    #[error("offboard request rejected by flight controller: {0}")]
    Rejected(Rejection),
    /// Offboard mode cannot be entered before a setpoint has been seeded.
    #[error("no setpoint set before offboard start")]
    NoSetpointSet,
    #[error("offboard command timed out waiting for ack")]
    Timeout,
    #[error("vehicle link closed")]
    LinkClosed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("action rejected by flight controller: {0}")]
    Rejected(Rejection),
    #[error("action timed out waiting for ack")]
    Timeout,
    #[error("vehicle link closed")]
    LinkClosed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MissionError {
    #[error("mission transfer rejected by vehicle")]
    Rejected,
    #[error("mission transfer timed out")]
    Timeout,
    #[error("vehicle link closed")]
    LinkClosed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParamError {
    #[error("parameter exchange timed out")]
    Timeout,
    #[error("vehicle link closed")]
    LinkClosed,
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log transfer timed out")]
    Timeout,
    #[error("vehicle link closed")]
    LinkClosed,
    #[error("writing log file: {0}")]
    Io(#[from] std::io::Error),
}
