//! Notification transport capability
//!
//! Device↔host signaling is an injected capability: the engine only
//! relies on `post` and `await_once`, never on how notifications
//! physically travel. Notification names carry their app scope as
//! `<app_identifier>/<event>` so concurrent attach attempts for
//! different apps on one device cannot cross-talk.

use std::time::Duration;

use hotpush_core::prelude::*;

/// Device notification channel.
///
/// `await_once` waits for a single occurrence of the named notification
/// within `timeout`; it must never wait indefinitely.
#[trait_variant::make(NotificationTransport: Send)]
pub trait LocalNotificationTransport {
    async fn post(&self, name: &str, app_identifier: &str) -> Result<()>;

    async fn await_once(
        &self,
        name: &str,
        app_identifier: &str,
        timeout: Duration,
    ) -> Result<()>;
}

/// Scoped notification names.
pub mod names {
    /// Ask a running app to reload its JS/asset layer.
    pub const REFRESH_APP: &str = "refreshApp";

    pub fn scoped(app_identifier: &str, event: &str) -> String {
        format!("{app_identifier}/{event}")
    }
}

#[cfg(test)]
mod tests {
    use super::names;

    #[test]
    fn test_scoped_name_carries_app_identifier() {
        assert_eq!(
            names::scoped("org.example.app", names::REFRESH_APP),
            "org.example.app/refreshApp"
        );
    }
}
