//! Lifecycle state machine.
//!
//! # Example
//!
//! ```
//! use protopixel_net::config::RoleConfig;
//! use protopixel_net::events::EventSubscriptions;
//! use protopixel_net::radio::HostRadio;
//! use protopixel_net::{NodeLifecycle, NodeState, Role};
//!
//! let node = NodeLifecycle::new(HostRadio::new());
//! node.initialize(Role::Coordinator, &RoleConfig::fixed(), EventSubscriptions::none())
//!     .unwrap();
//! assert_eq!(node.state(), NodeState::Active);
//!
//! node.shutdown().unwrap();
//! assert_eq!(node.state(), NodeState::Stopped);
//! ```

use super::error::{InitError, ShutdownError};
use super::role::Role;
use super::state::NodeState;
use crate::config::RoleConfig;
use crate::events::{EventBridge, EventCategory, EventSubscriptions, LinkStatus};
use crate::lock_unpoisoned;
use crate::radio::{Radio, StorageFault};
use log::{debug, error, info, warn};
use std::sync::{Mutex, MutexGuard};

struct Inner<R> {
    state: NodeState,
    role: Option<Role>,
    radio: R,
}

impl<R> Inner<R> {
    fn transition(&mut self, to: NodeState) {
        debug!("Node state: {} -> {}", self.state, to);
        self.state = to;
    }
}

/// Owns a node's lifecycle state and the radio it drives.
///
/// Exactly one instance should exist per device. All transitions take the
/// same lock, so concurrent `initialize`/`shutdown` calls run one after the
/// other. Event handlers run on the bridge's dispatcher thread and may call
/// [`NodeLifecycle::state`] without deadlocking.
pub struct NodeLifecycle<R: Radio> {
    inner: Mutex<Inner<R>>,
    events: EventBridge,
}

impl<R: Radio> NodeLifecycle<R> {
    pub fn new(radio: R) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: NodeState::Uninitialized,
                role: None,
                radio,
            }),
            events: EventBridge::new(),
        }
    }

    pub fn state(&self) -> NodeState {
        self.lock().state
    }

    /// Role applied by the last successful configuration, if any.
    pub fn role(&self) -> Option<Role> {
        self.lock().role
    }

    /// The bridge delivering this node's network events.
    pub fn events(&self) -> &EventBridge {
        &self.events
    }

    /// Diagnostic snapshot of the reported link and addresses.
    pub fn link_status(&self) -> LinkStatus {
        self.events.status()
    }

    /// Run `f` with exclusive access to the radio.
    ///
    /// Blocks lifecycle transitions for the duration of `f`.
    pub fn with_radio<T>(&self, f: impl FnOnce(&mut R) -> T) -> T {
        f(&mut self.lock().radio)
    }

    /// Bring the node up in `role` and start the radio.
    ///
    /// Accepted from `Uninitialized`, `Stopped`, and `RadioReady` (which
    /// resumes at role configuration after an earlier failure). On failure
    /// the node is left in the last state it fully reached:
    ///
    /// | Failure             | State afterwards          |
    /// |---------------------|---------------------------|
    /// | config / role       | unchanged                 |
    /// | storage / stack     | unchanged                 |
    /// | subscribe / apply   | `RadioReady`              |
    /// | start               | `RoleConfigured` (retry with [`activate`](Self::activate)) |
    pub fn initialize(
        &self,
        role: Role,
        config: &RoleConfig,
        subscriptions: EventSubscriptions,
    ) -> Result<(), InitError> {
        let mut inner = self.lock();
        let result = self.initialize_locked(&mut inner, role, config, subscriptions);
        if let Err(e) = &result {
            error!("Initialization as {} failed: {}", role, e);
        }
        result
    }

    /// Like [`initialize`](Self::initialize), selecting the role by raw
    /// radio mode number.
    ///
    /// An unknown mode is rejected before the radio is touched.
    pub fn initialize_mode(
        &self,
        mode: u8,
        config: &RoleConfig,
        subscriptions: EventSubscriptions,
    ) -> Result<(), InitError> {
        let role = Role::from_mode(mode).map_err(|e| {
            error!("Initialization failed: {}", e);
            e
        })?;
        self.initialize(role, config, subscriptions)
    }

    /// Retry starting the radio after an activation fault.
    pub fn activate(&self) -> Result<(), InitError> {
        let mut inner = self.lock();
        match inner.state {
            NodeState::RoleConfigured => {}
            NodeState::Active => return Err(InitError::AlreadyActive),
            other => return Err(InitError::WrongState(other)),
        }
        let result = Self::activate_locked(&mut inner);
        if let Err(e) = &result {
            error!("Activation failed: {}", e);
        }
        result
    }

    /// Stop the radio and release its resources.
    ///
    /// From `Active` this stops then releases. From `Stopping` (a previous
    /// release failed), `RoleConfigured` or `RadioReady` it only releases.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        let mut inner = self.lock();
        let result = self.shutdown_locked(&mut inner);
        if let Err(e) = &result {
            error!("Shutdown failed: {}", e);
        }
        result
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R>> {
        lock_unpoisoned(&self.inner)
    }

    fn initialize_locked(
        &self,
        inner: &mut Inner<R>,
        role: Role,
        config: &RoleConfig,
        subscriptions: EventSubscriptions,
    ) -> Result<(), InitError> {
        let resume = match inner.state {
            NodeState::Uninitialized | NodeState::Stopped => false,
            NodeState::RadioReady => true,
            NodeState::Active => return Err(InitError::AlreadyActive),
            other => return Err(InitError::WrongState(other)),
        };

        // Reject bad input before any radio resource is allocated.
        config.validate(role)?;

        info!("Initializing as {} on '{}'", role, config.ssid());

        if !resume {
            prepare_storage(&mut inner.radio)?;
            inner
                .radio
                .start_base_network_stack()
                .map_err(InitError::TransportFault)?;
            inner.transition(NodeState::RadioReady);
        }

        self.configure_role(inner, role, config, subscriptions)?;
        Self::activate_locked(inner)
    }

    fn configure_role(
        &self,
        inner: &mut Inner<R>,
        role: Role,
        config: &RoleConfig,
        subscriptions: EventSubscriptions,
    ) -> Result<(), InitError> {
        // Handlers go in before the radio can produce a single event.
        self.events.register_all(&subscriptions)?;

        let result = self.subscribe_and_apply(inner, role, config);
        if result.is_err() {
            // Undo only what this call registered.
            if subscriptions.link.is_subscribed() {
                self.events.unregister(EventCategory::Link);
            }
            if subscriptions.address.is_subscribed() {
                self.events.unregister(EventCategory::Address);
            }
            return result;
        }

        inner.role = Some(role);
        inner.transition(NodeState::RoleConfigured);
        Ok(())
    }

    fn subscribe_and_apply(
        &self,
        inner: &mut Inner<R>,
        role: Role,
        config: &RoleConfig,
    ) -> Result<(), InitError> {
        let sink = self.events.start()?;
        for category in [EventCategory::Link, EventCategory::Address] {
            inner
                .radio
                .subscribe(category, sink.clone())
                .map_err(InitError::TransportFault)?;
        }
        inner
            .radio
            .apply_role_configuration(role, config)
            .map_err(InitError::TransportFault)
    }

    fn activate_locked(inner: &mut Inner<R>) -> Result<(), InitError> {
        inner.radio.start().map_err(InitError::ActivationFault)?;
        inner.transition(NodeState::Active);
        if let Some(role) = inner.role {
            info!("Node active as {}", role);
        }
        Ok(())
    }

    fn shutdown_locked(&self, inner: &mut Inner<R>) -> Result<(), ShutdownError> {
        match inner.state {
            NodeState::Active => {
                inner.radio.stop().map_err(ShutdownError::StopFault)?;
                inner.transition(NodeState::Stopping);
            }
            NodeState::Stopping | NodeState::RoleConfigured | NodeState::RadioReady => {}
            other => return Err(ShutdownError::WrongState(other)),
        }

        if let Err(fault) = inner.radio.release() {
            inner.transition(NodeState::Stopping);
            return Err(ShutdownError::ReleaseFault(fault));
        }

        self.events.clear();
        inner.role = None;
        inner.transition(NodeState::Stopped);
        info!("Node stopped");
        Ok(())
    }
}

impl<R: Radio> std::fmt::Debug for NodeLifecycle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("NodeLifecycle")
            .field("state", &inner.state)
            .field("role", &inner.role)
            .finish()
    }
}

/// Prepare storage, erasing and retrying once if it reports stale contents.
fn prepare_storage<R: Radio>(radio: &mut R) -> Result<(), InitError> {
    match radio.prepare_persistent_storage() {
        Ok(()) => Ok(()),
        Err(StorageFault::Stale(fault)) => {
            warn!("Persistent storage stale ({}), erasing", fault);
            radio
                .erase_persistent_storage()
                .map_err(InitError::StorageFault)?;
            radio
                .prepare_persistent_storage()
                .map_err(|f| InitError::StorageFault(f.into_fault()))
        }
        Err(StorageFault::Fatal(fault)) => Err(InitError::StorageFault(fault)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthMode;
    use crate::events::{AddressEvent, EventMask, LinkEvent};
    use crate::radio::fake::{FakeRadio, Script};
    use crate::radio::{HostRadio, RadioFault};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn fake_node() -> (NodeLifecycle<FakeRadio>, Script) {
        let (radio, script) = FakeRadio::new();
        (NodeLifecycle::new(radio), script)
    }

    fn init(node: &NodeLifecycle<FakeRadio>) -> Result<(), InitError> {
        node.initialize(Role::Coordinator, &RoleConfig::fixed(), EventSubscriptions::none())
    }

    fn stale() -> StorageFault {
        StorageFault::Stale(RadioFault::new("prepare_storage", "new version found"))
    }

    #[test]
    fn test_coordinator_bring_up_and_shutdown() {
        let node = NodeLifecycle::new(HostRadio::new());
        let config = RoleConfig::new("Net", "pass", 1, AuthMode::Wpa2Personal);

        node.initialize(Role::Coordinator, &config, EventSubscriptions::none())
            .unwrap();
        assert_eq!(node.state(), NodeState::Active);
        assert_eq!(node.role(), Some(Role::Coordinator));

        node.shutdown().unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
        assert_eq!(node.role(), None);
    }

    #[test]
    fn test_radio_call_order() {
        let (node, script) = fake_node();
        init(&node).unwrap();
        node.shutdown().unwrap();
        assert_eq!(
            script.calls(),
            vec![
                "prepare_storage",
                "start_stack",
                "subscribe",
                "subscribe",
                "apply_config",
                "start",
                "stop",
                "release"
            ]
        );
    }

    #[test]
    fn test_invalid_role_touches_nothing() {
        let (node, script) = fake_node();
        for mode in [0u8, 3, 200] {
            let result = node.initialize_mode(mode, &RoleConfig::fixed(), EventSubscriptions::none());
            assert!(matches!(result, Err(InitError::InvalidRole(m)) if m == mode));
        }
        assert!(script.calls().is_empty());
        assert_eq!(node.state(), NodeState::Uninitialized);
    }

    #[test]
    fn test_valid_mode_initializes() {
        let (node, _) = fake_node();
        node.initialize_mode(Role::MODE_STATION, &RoleConfig::fixed(), EventSubscriptions::none())
            .unwrap();
        assert_eq!(node.role(), Some(Role::Peer));
    }

    #[test]
    fn test_invalid_config_touches_nothing() {
        let (node, script) = fake_node();
        let config = RoleConfig::fixed().with_max_peers(2);
        let result = node.initialize(Role::Coordinator, &config, EventSubscriptions::none());
        assert!(matches!(result, Err(InitError::InvalidConfig(_))));
        assert!(script.calls().is_empty());
        assert_eq!(node.state(), NodeState::Uninitialized);
    }

    #[test]
    fn test_stale_storage_erased_and_retried_once() {
        let (node, script) = fake_node();
        script.storage_results(vec![Err(stale()), Ok(())]);
        init(&node).unwrap();
        assert_eq!(
            &script.calls()[..3],
            &["prepare_storage", "erase_storage", "prepare_storage"]
        );
        assert_eq!(node.state(), NodeState::Active);
    }

    #[test]
    fn test_stale_storage_twice_is_fatal() {
        let (node, script) = fake_node();
        script.storage_results(vec![Err(stale()), Err(stale())]);
        assert!(matches!(init(&node), Err(InitError::StorageFault(_))));
        assert_eq!(
            script.calls(),
            vec!["prepare_storage", "erase_storage", "prepare_storage"]
        );
        assert_eq!(node.state(), NodeState::Uninitialized);
    }

    #[test]
    fn test_fatal_storage_not_retried() {
        let (node, script) = fake_node();
        script.storage_results(vec![Err(StorageFault::Fatal(RadioFault::new(
            "prepare_storage",
            "no partition",
        )))]);
        assert!(matches!(init(&node), Err(InitError::StorageFault(_))));
        assert_eq!(script.calls(), vec!["prepare_storage"]);
    }

    #[test]
    fn test_erase_failure_is_storage_fault() {
        let (node, script) = fake_node();
        script.storage_results(vec![Err(stale())]);
        script.fail("erase_storage");
        assert!(matches!(init(&node), Err(InitError::StorageFault(_))));
        assert_eq!(node.state(), NodeState::Uninitialized);
    }

    #[test]
    fn test_network_stack_failure() {
        let (node, script) = fake_node();
        script.fail("start_stack");
        assert!(matches!(init(&node), Err(InitError::TransportFault(_))));
        assert_eq!(node.state(), NodeState::Uninitialized);
    }

    #[test]
    fn test_configuration_failure_resumes_from_radio_ready() {
        let (node, script) = fake_node();
        script.fail("apply_config");
        let subs = EventSubscriptions::none().on_link(EventMask::ALL, |_| Ok(()));
        assert!(matches!(
            node.initialize(Role::Peer, &RoleConfig::fixed(), subs.clone()),
            Err(InitError::TransportFault(_))
        ));
        assert_eq!(node.state(), NodeState::RadioReady);
        assert!(!node.events().is_registered(EventCategory::Link));

        script.heal("apply_config");
        node.initialize(Role::Peer, &RoleConfig::fixed(), subs).unwrap();
        assert_eq!(node.state(), NodeState::Active);

        // Storage and stack were not prepared a second time.
        let calls = script.calls();
        assert_eq!(calls.iter().filter(|c| **c == "prepare_storage").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "start_stack").count(), 1);
    }

    #[test]
    fn test_activation_failure_stays_configured_for_retry() {
        let (node, script) = fake_node();
        script.fail("start");
        assert!(matches!(init(&node), Err(InitError::ActivationFault(_))));
        assert_eq!(node.state(), NodeState::RoleConfigured);

        // initialize is not the way back in from here.
        assert!(matches!(init(&node), Err(InitError::WrongState(NodeState::RoleConfigured))));

        script.heal("start");
        node.activate().unwrap();
        assert_eq!(node.state(), NodeState::Active);
    }

    #[test]
    fn test_activation_failure_can_tear_down() {
        let (node, script) = fake_node();
        script.fail("start");
        let _ = init(&node);
        node.shutdown().unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
        assert!(!script.calls().contains(&"stop"));
    }

    #[test]
    fn test_uninitialized_accepts_only_initialize() {
        let (node, script) = fake_node();
        assert!(matches!(
            node.shutdown(),
            Err(ShutdownError::WrongState(NodeState::Uninitialized))
        ));
        assert!(matches!(
            node.activate(),
            Err(InitError::WrongState(NodeState::Uninitialized))
        ));
        assert_eq!(node.state(), NodeState::Uninitialized);
        assert!(script.calls().is_empty());
    }

    #[test]
    fn test_active_accepts_only_shutdown() {
        let (node, script) = fake_node();
        init(&node).unwrap();
        let calls_before = script.calls().len();

        assert!(matches!(init(&node), Err(InitError::AlreadyActive)));
        assert!(matches!(node.activate(), Err(InitError::AlreadyActive)));
        assert_eq!(node.state(), NodeState::Active);
        assert_eq!(script.calls().len(), calls_before);
    }

    #[test]
    fn test_stop_fault_stays_active() {
        let (node, script) = fake_node();
        init(&node).unwrap();
        script.fail("stop");
        assert!(matches!(node.shutdown(), Err(ShutdownError::StopFault(_))));
        assert_eq!(node.state(), NodeState::Active);

        script.heal("stop");
        node.shutdown().unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[test]
    fn test_release_fault_stays_stopping_and_retries_release_only() {
        let (node, script) = fake_node();
        init(&node).unwrap();
        script.fail("release");
        assert!(matches!(node.shutdown(), Err(ShutdownError::ReleaseFault(_))));
        assert_eq!(node.state(), NodeState::Stopping);
        assert!(matches!(init(&node), Err(InitError::WrongState(NodeState::Stopping))));

        script.heal("release");
        node.shutdown().unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
        let calls = script.calls();
        assert_eq!(calls.iter().filter(|c| **c == "stop").count(), 1);
        assert_eq!(calls.iter().filter(|c| **c == "release").count(), 2);
    }

    #[test]
    fn test_stopped_rejects_shutdown_and_allows_new_bring_up() {
        let (node, _) = fake_node();
        let subs = || EventSubscriptions::none().on_link(EventMask::ALL, |_| Ok(()));
        node.initialize(Role::Coordinator, &RoleConfig::fixed(), subs())
            .unwrap();
        node.shutdown().unwrap();

        assert!(matches!(
            node.shutdown(),
            Err(ShutdownError::WrongState(NodeState::Stopped))
        ));
        // Handlers were dropped on release, so registering again works.
        node.initialize(Role::Peer, &RoleConfig::fixed(), subs())
            .unwrap();
        assert_eq!(node.role(), Some(Role::Peer));
    }

    #[test]
    fn test_handlers_receive_events_after_activation() {
        let (node, _) = fake_node();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let subs = EventSubscriptions::none().on_link(LinkEvent::AP_STARTED, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        node.initialize(Role::Coordinator, &RoleConfig::fixed(), subs)
            .unwrap();

        assert!(node.events().flush(Duration::from_secs(2)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert!(node.link_status().link_up);
    }

    #[test]
    fn test_failing_handler_does_not_affect_lifecycle() {
        let node = NodeLifecycle::new(HostRadio::new());
        let subs = EventSubscriptions::none()
            .on_link(EventMask::ALL, |_| Err("link handler broke".into()))
            .on_address(EventMask::ALL, |_| panic!("address handler broke"));
        node.initialize(Role::Coordinator, &RoleConfig::fixed(), subs)
            .unwrap();
        assert!(node.events().flush(Duration::from_secs(2)));
        assert_eq!(node.state(), NodeState::Active);
        node.shutdown().unwrap();
    }

    #[test]
    fn test_handler_can_query_state() {
        let node = Arc::new(NodeLifecycle::new(HostRadio::new()));
        let observed = Arc::new(Mutex::new(None));
        let (weak, slot) = (Arc::downgrade(&node), observed.clone());
        let subs = EventSubscriptions::none().on_link(LinkEvent::AP_STARTED, move |_| {
            if let Some(node) = weak.upgrade() {
                *slot.lock().unwrap() = Some(node.state());
            }
            Ok(())
        });
        node.initialize(Role::Coordinator, &RoleConfig::fixed(), subs)
            .unwrap();
        assert!(node.events().flush(Duration::from_secs(2)));
        assert_eq!(*observed.lock().unwrap(), Some(NodeState::Active));
    }

    #[test]
    fn test_new_session_handlers_see_only_new_events() {
        let node = NodeLifecycle::new(HostRadio::new());
        for _ in 0..50 {
            node.initialize(Role::Coordinator, &RoleConfig::fixed(), EventSubscriptions::none())
                .unwrap();
            node.shutdown().unwrap();

            let seen = Arc::new(Mutex::new(Vec::new()));
            let record = seen.clone();
            let subs = EventSubscriptions::none().on_link(EventMask::ALL, move |event| {
                record.lock().unwrap().push(*event);
                Ok(())
            });
            node.initialize(Role::Coordinator, &RoleConfig::fixed(), subs)
                .unwrap();
            assert!(node.events().flush(Duration::from_secs(2)));

            assert_eq!(*seen.lock().unwrap(), vec![LinkEvent::AccessPointStarted]);
            let status = node.link_status();
            assert!(status.link_up);
            assert_eq!(status.events_seen, 2);
            node.shutdown().unwrap();
        }
    }

    #[test]
    fn test_configuration_failure_keeps_directly_registered_handlers() {
        let (node, script) = fake_node();
        node.events()
            .register_address(EventMask::ALL, Arc::new(|_: &AddressEvent| Ok(())))
            .unwrap();
        script.fail("apply_config");

        let subs = EventSubscriptions::none().on_link(EventMask::ALL, |_| Ok(()));
        assert!(node
            .initialize(Role::Peer, &RoleConfig::fixed(), subs)
            .is_err());
        assert!(!node.events().is_registered(EventCategory::Link));
        assert!(node.events().is_registered(EventCategory::Address));
    }

    #[test]
    fn test_concurrent_transitions_are_serialized() {
        let node = Arc::new(NodeLifecycle::new(HostRadio::new()));
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let node = node.clone();
                thread::spawn(move || {
                    node.initialize(Role::Peer, &RoleConfig::fixed(), EventSubscriptions::none())
                        .is_ok()
                })
            })
            .collect();
        let successes = workers
            .into_iter()
            .map(|w| w.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(successes, 1);
        assert_eq!(node.state(), NodeState::Active);
    }
}

#[cfg(feature = "tap-tests")]
mod tap_tests {
    use super::*;
    use protopixel_net_macros::tap_test;
    use crate::radio::HostRadio;

    #[tap_test]
    fn lifecycle_bring_up_and_tear_down() {
        let node = NodeLifecycle::new(HostRadio::new());
        node.initialize(Role::Coordinator, &RoleConfig::fixed(), EventSubscriptions::none())
            .unwrap();
        assert_eq!(node.state(), NodeState::Active);
        node.shutdown().unwrap();
        assert_eq!(node.state(), NodeState::Stopped);
    }

    #[tap_test]
    fn lifecycle_rejects_unknown_mode() -> crate::testing::TestResult {
        let node = NodeLifecycle::new(HostRadio::new());
        match node.initialize_mode(0, &RoleConfig::fixed(), EventSubscriptions::none()) {
            Err(InitError::InvalidRole(0)) => Ok(()),
            other => Err(format!("unexpected result: {:?}", other).into()),
        }
    }
}
