//! Lifecycle state machines for sessions and connections

/// Lifecycle state of a [`crate::Sender`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Not transmitting
    Stopped,
    /// Resources are being allocated
    Initializing,
    /// Actively emitting RTP packets
    Running,
    /// Unrecoverable start failure; requires `recover()`
    Error,
}

impl SenderState {
    /// Stable textual name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Initializing => "Initializing",
            Self::Running => "Running",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for SenderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a [`crate::Receiver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    /// Not connected to any stream
    Stopped,
    /// Resources are being allocated
    Initializing,
    /// Connected; socket open but playout not started
    Listening,
    /// Receiving and playing out
    Receiving,
    /// Unrecoverable start failure; requires `recover()`
    Error,
}

impl ReceiverState {
    /// Stable textual name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Initializing => "Initializing",
            Self::Listening => "Listening",
            Self::Receiving => "Receiving",
            Self::Error => "Error",
        }
    }
}

impl std::fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of an IS-05 connection as seen by the control layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport parameters applied
    #[default]
    Disconnected,
    /// Parameters staged, awaiting activation
    Staged,
    /// Connection active; the receiver is ordered to connect and start
    Active,
}

impl ConnectionState {
    /// Stable textual name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Staged => "Staged",
            Self::Active => "Active",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback invoked on every sender lifecycle transition
pub type SenderStateCallback = Box<dyn Fn(SenderState) + Send + Sync>;

/// Callback invoked on every receiver lifecycle transition
pub type ReceiverStateCallback = Box<dyn Fn(ReceiverState) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_names() {
        assert_eq!(SenderState::Running.to_string(), "Running");
        assert_eq!(ReceiverState::Listening.to_string(), "Listening");
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
        assert_eq!(ConnectionState::Active.as_str(), "Active");
    }
}
