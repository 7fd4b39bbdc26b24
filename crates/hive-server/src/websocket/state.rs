//! Session lifecycle states and close reasons.

use std::fmt;

/// Where a live session is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Upgrade accepted; device not yet checked.
    Connecting,
    /// Registered for live readings; sending history.
    Replaying,
    /// Forwarding live readings.
    Live,
    /// Terminal.
    Closed,
}

impl SessionState {
    /// Whether moving to `next` is a legal transition.
    ///
    /// `Closed` is reachable from every other state and is terminal.
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Connecting, Self::Replaying)
                | (Self::Replaying, Self::Live)
                | (Self::Connecting | Self::Replaying | Self::Live, Self::Closed)
        )
    }

    /// Move to `next`, returning the new state. Illegal transitions leave the
    /// state unchanged and are reported in debug builds.
    #[must_use]
    pub fn advance(self, next: Self) -> Self {
        debug_assert!(
            self.can_transition_to(next),
            "illegal session transition {self:?} -> {next:?}"
        );
        if self.can_transition_to(next) {
            next
        } else {
            self
        }
    }
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CloseReason {
    /// The device is not registered (or the key is malformed).
    NotFound,
    /// The device lookup failed.
    LookupFailed,
    /// The viewer closed the connection.
    ViewerClosed,
    /// The server is shutting down.
    Shutdown,
    /// The registry evicted the viewer after a failed delivery.
    Evicted,
    /// Writing to the socket failed.
    SendFailed,
}

impl CloseReason {
    /// WebSocket close code to send, if a close frame is sent at all.
    pub fn close_code(self) -> Option<u16> {
        match self {
            Self::NotFound => Some(1008),
            Self::ViewerClosed => Some(1000),
            Self::Shutdown => Some(1001),
            Self::LookupFailed | Self::Evicted => Some(1011),
            Self::SendFailed => None,
        }
    }

    /// Human-readable close frame reason.
    pub fn reason_text(self) -> &'static str {
        match self {
            Self::NotFound => "Device not found",
            Self::LookupFailed => "Device lookup failed",
            Self::ViewerClosed => "",
            Self::Shutdown => "Server shutting down",
            Self::Evicted => "Viewer too slow",
            Self::SendFailed => "",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not_found",
            Self::LookupFailed => "lookup_failed",
            Self::ViewerClosed => "viewer_closed",
            Self::Shutdown => "shutdown",
            Self::Evicted => "evicted",
            Self::SendFailed => "send_failed",
        };
        f.write_str(s)
    }
}
