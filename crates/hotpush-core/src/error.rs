//! Application error types with retry/fatality classification

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel send error: {message}")]
    ChannelSend { message: String },

    #[error("Channel closed unexpectedly")]
    ChannelClosed,

    // ─────────────────────────────────────────────────────────────
    // Sync Protocol Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Protocol version mismatch on {device_id}: client {client}, device {device}")]
    ProtocolVersionMismatch {
        device_id: String,
        client: u8,
        device: u8,
    },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Sync failed on {device_id} during {stage}: {message}")]
    SyncFailed {
        device_id: String,
        stage: String,
        message: String,
    },

    #[error("Hash manifest unreadable: {message}")]
    ManifestCorrupt { message: String },

    #[error("Device {device_id} is not reachable ({state})")]
    DeviceUnreachable { device_id: String, state: String },

    #[error("Archive error: {message}")]
    Archive { message: String },

    // ─────────────────────────────────────────────────────────────
    // Debug-Attach Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Timed out waiting for {operation} after {millis}ms")]
    Timeout { operation: String, millis: u64 },

    #[error("A debugger is already connected to {app_identifier} on {device_id}")]
    AlreadyConnected {
        device_id: String,
        app_identifier: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    // ─────────────────────────────────────────────────────────────
    // Configuration / Watcher Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("File watcher error: {message}")]
    Watcher { message: String },
}

// ─────────────────────────────────────────────────────────────────
// Convenience Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn sync_failed(
        device_id: impl Into<String>,
        stage: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::SyncFailed {
            device_id: device_id.into(),
            stage: stage.into(),
            message: message.into(),
        }
    }

    pub fn manifest_corrupt(message: impl Into<String>) -> Self {
        Self::ManifestCorrupt {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            millis: timeout.as_millis() as u64,
        }
    }

    pub fn already_connected(
        device_id: impl Into<String>,
        app_identifier: impl Into<String>,
    ) -> Self {
        Self::AlreadyConnected {
            device_id: device_id.into(),
            app_identifier: app_identifier.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn watcher(message: impl Into<String>) -> Self {
        Self::Watcher {
            message: message.into(),
        }
    }

    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive {
            message: message.into(),
        }
    }

    pub fn channel_send(message: impl Into<String>) -> Self {
        Self::ChannelSend {
            message: message.into(),
        }
    }

    /// Transient errors earn exactly one automatic retry of the whole
    /// batch; everything else fails the operation outright.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Io(_))
    }

    /// Fatal for the device: the caller must trigger a new change event
    /// rather than retry automatically.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ProtocolVersionMismatch { .. }
                | Error::SyncFailed { .. }
                | Error::Timeout { .. }
        )
    }

    /// Cancellation is reported distinctly: it is an outcome, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Non-fatal conditions that require user action instead of a retry.
    pub fn needs_user_interaction(&self) -> bool {
        matches!(self, Error::AlreadyConnected { .. })
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Context Extensions
// ─────────────────────────────────────────────────────────────────

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation)
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", context.into(), err);
            err
        })
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| {
            let err = e.into();
            tracing::error!("{}: {:?}", f(), err);
            err
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_display_messages() {
        let err = Error::sync_failed("emulator-5554", "handshake", "connection reset");
        assert_eq!(
            err.to_string(),
            "Sync failed on emulator-5554 during handshake: connection reset"
        );

        let err = Error::ProtocolVersionMismatch {
            device_id: "emulator-5554".to_string(),
            client: 1,
            device: 2,
        };
        assert!(err.to_string().contains("version mismatch"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_version_mismatch_not_retryable() {
        let err = Error::ProtocolVersionMismatch {
            device_id: "x".to_string(),
            client: 1,
            device: 2,
        };
        assert!(!err.is_retryable());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_timeout_not_retryable() {
        let err = Error::timeout("appLaunching", Duration::from_millis(100));
        assert!(!err.is_retryable());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("100ms"));
    }

    #[test]
    fn test_cancelled_is_distinct() {
        let err = Error::Cancelled;
        assert!(err.is_cancelled());
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_already_connected_needs_user_interaction() {
        let err = Error::already_connected("iphone-abc", "org.example.app");
        assert!(err.needs_user_interaction());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_manifest_corrupt_not_fatal() {
        // Treated as "no manifest" upstream, forcing a full sync.
        let err = Error::manifest_corrupt("unexpected EOF");
        assert!(!err.is_fatal());
        assert!(!err.is_retryable());
    }
}
