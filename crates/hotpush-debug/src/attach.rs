//! Debug-attach handshake engine
//!
//! A per-device state machine that coordinates pausing app startup for a
//! debugger and querying/requesting an attach, via app-scoped named
//! notifications. Every wait is single-shot with a hard deadline; a stop
//! signal resolves any pending wait as cancelled.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use hotpush_core::prelude::*;
use hotpush_core::{Device, EventBus, LiveSyncEvent};
use hotpush_transport::notify::{names, NotificationTransport};

/// Notification names of the attach handshake.
pub mod events {
    /// Pause the next app launch before executing app code.
    pub const WAIT_FOR_DEBUG: &str = "waitForDebug";
    /// The app process is launching.
    pub const APP_LAUNCHING: &str = "appLaunching";
    /// The app is paused and ready for a debugger.
    pub const READY_FOR_ATTACH: &str = "readyForAttach";
    /// Ask a running app whether a debugger can attach.
    pub const ATTACH_AVAILABILITY_QUERY: &str = "attachAvailabilityQuery";
    /// The app can accept a debugger.
    pub const ATTACH_AVAILABLE: &str = "attachAvailable";
    /// Another debugger already holds the app.
    pub const ALREADY_CONNECTED: &str = "alreadyConnected";
    /// Complete the handshake against a running app.
    pub const ATTACH_REQUEST: &str = "attachRequest";
}

/// Engine state. `LaunchReady`, `AttachAvailable` and `AlreadyConnected`
/// are terminal; `AlreadyConnected` is the non-fatal "user interaction
/// needed" outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Idle,
    LaunchRequested,
    WaitingAppLaunching,
    WaitingReadyForAttach,
    LaunchReady,
    AvailabilityQueried,
    AttachAvailable,
    AlreadyConnected,
    Failed(FailureReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    Timeout,
    Error,
    Cancelled,
}

/// Deadlines of the launch path.
#[derive(Debug, Clone, Copy)]
pub struct LaunchTimeouts {
    /// Deadline for `appLaunching` after the launch is requested.
    pub launch: Duration,
    /// Deadline for `readyForAttach` after the app started launching.
    pub ready_for_attach: Duration,
}

/// Per-device debug-attach engine.
pub struct DebugAttachEngine<N> {
    device: Device,
    notifier: N,
    bus: EventBus,
    state: AttachState,
    stop_rx: watch::Receiver<bool>,
}

impl<N: NotificationTransport + Sync> DebugAttachEngine<N> {
    /// `stop_rx` carries the owning process's stop flag; a pending wait
    /// resolves as cancelled when it flips to `true`.
    pub fn new(device: Device, notifier: N, bus: EventBus, stop_rx: watch::Receiver<bool>) -> Self {
        Self {
            device,
            notifier,
            bus,
            state: AttachState::Idle,
            stop_rx,
        }
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    /// Launch path: arm the launch pause, launch the app, then wait for
    /// `appLaunching` and `readyForAttach` within their deadlines.
    ///
    /// `launch_app` is the external "instruct the app to launch" action;
    /// the engine does not know how apps are started.
    pub async fn execute_launch_request<F>(
        &mut self,
        app_identifier: &str,
        should_break: bool,
        timeouts: LaunchTimeouts,
        launch_app: F,
    ) -> Result<AttachState>
    where
        F: Future<Output = Result<()>> + Send,
    {
        self.state = AttachState::LaunchRequested;
        info!(
            device = %self.device.id,
            app = app_identifier,
            should_break,
            "debug launch requested"
        );

        if should_break {
            self.post(events::WAIT_FOR_DEBUG, app_identifier).await?;
        }

        launch_app.await.map_err(|e| self.fail(e))?;

        self.state = AttachState::WaitingAppLaunching;
        self.await_scoped(events::APP_LAUNCHING, app_identifier, timeouts.launch)
            .await?;

        self.state = AttachState::WaitingReadyForAttach;
        self.await_scoped(
            events::READY_FOR_ATTACH,
            app_identifier,
            timeouts.ready_for_attach,
        )
        .await?;

        self.state = AttachState::LaunchReady;
        info!(device = %self.device.id, app = app_identifier, "app ready for attach");
        Ok(self.state)
    }

    /// Reattach path: query availability, then race `attachAvailable`
    /// against `alreadyConnected` within `timeout`.
    ///
    /// `alreadyConnected` is terminal but non-fatal: the user must close
    /// the existing debugger session; no `attachRequest` is sent and
    /// nothing retries automatically.
    pub async fn execute_attach_request(
        &mut self,
        app_identifier: &str,
        timeout: Duration,
    ) -> Result<AttachState> {
        enum Race {
            Available,
            Connected,
        }

        self.state = AttachState::AvailabilityQueried;
        self.post(events::ATTACH_AVAILABILITY_QUERY, app_identifier)
            .await?;

        let outcome = {
            let available_name = names::scoped(app_identifier, events::ATTACH_AVAILABLE);
            let connected_name = names::scoped(app_identifier, events::ALREADY_CONNECTED);
            let available = self.notifier.await_once(
                &available_name,
                app_identifier,
                timeout,
            );
            let connected = self.notifier.await_once(
                &connected_name,
                app_identifier,
                timeout,
            );
            let mut stop_rx = self.stop_rx.clone();

            tokio::select! {
                res = available => res.map(|()| Race::Available),
                res = connected => res.map(|()| Race::Connected),
                _ = wait_stopped(&mut stop_rx) => Err(Error::Cancelled),
            }
        };

        match outcome {
            Ok(Race::Available) => {
                self.post(events::ATTACH_REQUEST, app_identifier).await?;
                self.state = AttachState::AttachAvailable;
                info!(device = %self.device.id, app = app_identifier, "attach requested");
            }
            Ok(Race::Connected) => {
                self.state = AttachState::AlreadyConnected;
                warn!(
                    device = %self.device.id,
                    app = app_identifier,
                    "a debugger is already connected"
                );
                self.bus.emit(LiveSyncEvent::UserInteractionNeeded {
                    device_id: self.device.id.clone(),
                    app_identifier: app_identifier.to_string(),
                });
            }
            Err(e) => return Err(self.fail(e)),
        }

        Ok(self.state)
    }

    async fn post(&mut self, event: &str, app_identifier: &str) -> Result<()> {
        let name = names::scoped(app_identifier, event);
        self.notifier
            .post(&name, app_identifier)
            .await
            .map_err(|e| self.fail(e))
    }

    /// Single-shot scoped wait, raced against the stop signal.
    async fn await_scoped(
        &mut self,
        event: &str,
        app_identifier: &str,
        timeout: Duration,
    ) -> Result<()> {
        let name = names::scoped(app_identifier, event);
        let mut stop_rx = self.stop_rx.clone();

        let result = tokio::select! {
            res = self.notifier.await_once(&name, app_identifier, timeout) => res,
            _ = wait_stopped(&mut stop_rx) => Err(Error::Cancelled),
        };
        result.map_err(|e| self.fail(e))
    }

    /// Record the failure state and pass the error through.
    fn fail(&mut self, e: Error) -> Error {
        self.state = AttachState::Failed(match &e {
            Error::Cancelled => FailureReason::Cancelled,
            Error::Timeout { .. } => FailureReason::Timeout,
            _ => FailureReason::Error,
        });
        e
    }
}

/// Resolve once the stop flag is `true`.
async fn wait_stopped(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender dropped: the owning process is gone, treat as stop.
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use hotpush_core::{Platform, Reachability};

    /// Notification fake: scripted arrival delays per scoped name.
    #[derive(Clone, Default)]
    struct ScriptedNotifications {
        posts: Arc<Mutex<Vec<String>>>,
        arrivals: Arc<Mutex<HashMap<String, Duration>>>,
    }

    impl ScriptedNotifications {
        fn arrives(self, name: &str, after: Duration) -> Self {
            self.arrivals.lock().unwrap().insert(name.to_string(), after);
            self
        }

        fn posted(&self) -> Vec<String> {
            self.posts.lock().unwrap().clone()
        }
    }

    impl NotificationTransport for ScriptedNotifications {
        async fn post(&self, name: &str, _app_identifier: &str) -> Result<()> {
            self.posts.lock().unwrap().push(name.to_string());
            Ok(())
        }

        async fn await_once(
            &self,
            name: &str,
            _app_identifier: &str,
            timeout: Duration,
        ) -> Result<()> {
            let arrival = self.arrivals.lock().unwrap().get(name).copied();
            match arrival {
                Some(delay) if delay <= timeout => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                _ => {
                    tokio::time::sleep(timeout).await;
                    Err(Error::timeout(name.to_string(), timeout))
                }
            }
        }
    }

    fn test_device() -> Device {
        Device {
            id: "iphone-abc".to_string(),
            name: "iPhone 15".to_string(),
            platform: Platform::Ios,
            emulator: false,
            reachability: Reachability::Connected,
        }
    }

    fn engine(
        notifier: ScriptedNotifications,
    ) -> (DebugAttachEngine<ScriptedNotifications>, watch::Sender<bool>, EventBus) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let bus = EventBus::new();
        let engine = DebugAttachEngine::new(test_device(), notifier, bus.clone(), stop_rx);
        (engine, stop_tx, bus)
    }

    const APP: &str = "org.example.app";

    fn timeouts() -> LaunchTimeouts {
        LaunchTimeouts {
            launch: Duration::from_secs(5),
            ready_for_attach: Duration::from_secs(5),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_happy_path() {
        let notifier = ScriptedNotifications::default()
            .arrives("org.example.app/appLaunching", Duration::from_millis(10))
            .arrives("org.example.app/readyForAttach", Duration::from_millis(20));
        let (mut engine, _stop, _bus) = engine(notifier.clone());

        let state = engine
            .execute_launch_request(APP, true, timeouts(), async { Ok(()) })
            .await
            .unwrap();

        assert_eq!(state, AttachState::LaunchReady);
        assert_eq!(notifier.posted(), vec!["org.example.app/waitForDebug"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_launch_without_break_skips_pause() {
        let notifier = ScriptedNotifications::default()
            .arrives("org.example.app/appLaunching", Duration::from_millis(10))
            .arrives("org.example.app/readyForAttach", Duration::from_millis(10));
        let (mut engine, _stop, _bus) = engine(notifier.clone());

        engine
            .execute_launch_request(APP, false, timeouts(), async { Ok(()) })
            .await
            .unwrap();

        assert!(notifier.posted().is_empty());
    }

    // With a 100ms deadline and no appLaunching ever arriving, the
    // request resolves as a timeout at ~100ms, not later.
    #[tokio::test(start_paused = true)]
    async fn test_launch_times_out_at_deadline() {
        let notifier = ScriptedNotifications::default();
        let (mut engine, _stop, _bus) = engine(notifier);

        let started = tokio::time::Instant::now();
        let err = engine
            .execute_launch_request(
                APP,
                true,
                LaunchTimeouts {
                    launch: Duration::from_millis(100),
                    ready_for_attach: Duration::from_secs(5),
                },
                async { Ok(()) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(engine.state(), AttachState::Failed(FailureReason::Timeout));
        assert_eq!(started.elapsed(), Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_for_attach_timeout() {
        let notifier = ScriptedNotifications::default()
            .arrives("org.example.app/appLaunching", Duration::from_millis(5));
        let (mut engine, _stop, _bus) = engine(notifier);

        let err = engine
            .execute_launch_request(
                APP,
                true,
                LaunchTimeouts {
                    launch: Duration::from_secs(5),
                    ready_for_attach: Duration::from_millis(50),
                },
                async { Ok(()) },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(engine.state(), AttachState::Failed(FailureReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_available_sends_attach_request() {
        let notifier = ScriptedNotifications::default()
            .arrives("org.example.app/attachAvailable", Duration::from_millis(10));
        let (mut engine, _stop, _bus) = engine(notifier.clone());

        let state = engine
            .execute_attach_request(APP, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(state, AttachState::AttachAvailable);
        assert_eq!(
            notifier.posted(),
            vec![
                "org.example.app/attachAvailabilityQuery",
                "org.example.app/attachRequest",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_connected_wins_and_never_attaches() {
        let notifier = ScriptedNotifications::default()
            .arrives("org.example.app/alreadyConnected", Duration::from_millis(5))
            .arrives("org.example.app/attachAvailable", Duration::from_millis(50));
        let (mut engine, _stop, bus) = engine(notifier.clone());
        let mut events = bus.subscribe();

        let state = engine
            .execute_attach_request(APP, Duration::from_secs(2))
            .await
            .unwrap();

        assert_eq!(state, AttachState::AlreadyConnected);
        // attachRequest is never sent for an occupied app.
        assert_eq!(
            notifier.posted(),
            vec!["org.example.app/attachAvailabilityQuery"]
        );
        assert!(matches!(
            events.recv().await.unwrap(),
            LiveSyncEvent::UserInteractionNeeded { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_timeout() {
        let notifier = ScriptedNotifications::default();
        let (mut engine, _stop, _bus) = engine(notifier);

        let err = engine
            .execute_attach_request(APP, Duration::from_millis(100))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(engine.state(), AttachState::Failed(FailureReason::Timeout));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_resolves_pending_wait_as_cancelled() {
        let notifier = ScriptedNotifications::default();
        let (mut engine, stop_tx, _bus) = engine(notifier);

        let handle = tokio::spawn(async move {
            let result = engine
                .execute_launch_request(APP, true, timeouts(), async { Ok(()) })
                .await;
            (result, engine.state())
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        stop_tx.send(true).unwrap();

        let (result, state) = handle.await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(state, AttachState::Failed(FailureReason::Cancelled));
    }
}
