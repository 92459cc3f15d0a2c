//! Structured handler status.
//!
//! Handlers report an enum of status kinds with a bounded detail payload
//! (typically a device label or bind address); front-ends format them.

/// What a handler slot is currently doing, or why it is not doing it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Status {
    /// Handler exists but nothing has been started.
    #[default]
    Idle,
    /// The engine is slaved to the host clock.
    SystemClock,
    /// Input handler is running and frames are arriving.
    Receiving { detail: String },
    /// Input handler is running but the source went silent.
    Paused { detail: String },
    /// Output handler is running and transmitting.
    Transmitting { detail: String },
    /// Pass-through output is running.
    PassingThrough { detail: String },
    /// Pass-through cannot start until an LTC input with a tap channel runs.
    WaitingForLtcInput,
    /// Input source selected but its device has not been started yet.
    WaitingForDevice,
    /// Art-Net input selected but the socket is not listening.
    NotListening,
    /// No device of the required kind exists on this system.
    NoDevice,
    /// The device refused to open.
    FailedToOpen,
    /// The UDP bind failed even on the wildcard address.
    BindFailed,
    /// The handler was stopped because another handler took its device.
    Conflict { with: String },
}

impl Status {
    /// True for the states in which the handler owns a running device.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Status::Receiving { .. }
                | Status::Paused { .. }
                | Status::Transmitting { .. }
                | Status::PassingThrough { .. }
        )
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Idle => f.write_str(""),
            Status::SystemClock => f.write_str("SYSTEM CLOCK"),
            Status::Receiving { detail } => write!(f, "RX: {detail}"),
            Status::Paused { detail } => write!(f, "PAUSED - {detail}"),
            Status::Transmitting { detail } => write!(f, "TX: {detail}"),
            Status::PassingThrough { detail } => write!(f, "THRU: {detail}"),
            Status::WaitingForLtcInput => f.write_str("WAITING FOR LTC INPUT"),
            Status::WaitingForDevice => f.write_str("WAITING FOR DEVICE..."),
            Status::NotListening => f.write_str("NOT LISTENING"),
            Status::NoDevice => f.write_str("NO DEVICE AVAILABLE"),
            Status::FailedToOpen => f.write_str("FAILED TO OPEN"),
            Status::BindFailed => f.write_str("FAILED TO BIND"),
            Status::Conflict { with } => write!(f, "CONFLICT: same device as {with}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_forms() {
        assert_eq!(Status::SystemClock.to_string(), "SYSTEM CLOCK");
        assert_eq!(
            Status::Receiving { detail: "Scarlett 2i2 Ch 1".into() }.to_string(),
            "RX: Scarlett 2i2 Ch 1"
        );
        assert_eq!(
            Status::Conflict { with: "LTC OUT".into() }.to_string(),
            "CONFLICT: same device as LTC OUT"
        );
    }

    #[test]
    fn active_states() {
        assert!(Status::Receiving { detail: String::new() }.is_active());
        assert!(Status::Paused { detail: String::new() }.is_active());
        assert!(!Status::FailedToOpen.is_active());
        assert!(!Status::Idle.is_active());
    }
}
