//! Fault-injecting radio for lifecycle tests.

use super::{Radio, RadioFault, StorageFault};
use crate::config::RoleConfig;
use crate::events::{EventCategory, EventSink, LinkEvent};
use crate::lifecycle::Role;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// Shared view of what the fake radio was asked to do.
#[derive(Clone, Default)]
pub(crate) struct Script {
    inner: Arc<Mutex<ScriptInner>>,
}

#[derive(Default)]
struct ScriptInner {
    calls: Vec<&'static str>,
    storage: VecDeque<Result<(), StorageFault>>,
    failing: HashSet<&'static str>,
}

impl Script {
    /// Every radio operation invoked so far, in order.
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Queue results for successive storage preparations.
    pub(crate) fn storage_results(&self, results: Vec<Result<(), StorageFault>>) {
        self.inner.lock().unwrap().storage = results.into();
    }

    /// Make `op` fail until [`Script::heal`] is called.
    pub(crate) fn fail(&self, op: &'static str) {
        self.inner.lock().unwrap().failing.insert(op);
    }

    pub(crate) fn heal(&self, op: &'static str) {
        self.inner.lock().unwrap().failing.remove(op);
    }

    fn record(&self, op: &'static str) -> Result<(), RadioFault> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(op);
        if inner.failing.contains(op) {
            Err(RadioFault::new(op, "injected"))
        } else {
            Ok(())
        }
    }

    fn record_storage(&self) -> Result<(), StorageFault> {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push("prepare_storage");
        inner.storage.pop_front().unwrap_or(Ok(()))
    }
}

pub(crate) struct FakeRadio {
    script: Script,
    link_sink: Option<EventSink>,
}

impl FakeRadio {
    pub(crate) fn new() -> (Self, Script) {
        let script = Script::default();
        (
            Self {
                script: script.clone(),
                link_sink: None,
            },
            script,
        )
    }
}

impl Radio for FakeRadio {
    fn prepare_persistent_storage(&mut self) -> Result<(), StorageFault> {
        self.script.record_storage()
    }

    fn erase_persistent_storage(&mut self) -> Result<(), RadioFault> {
        self.script.record("erase_storage")
    }

    fn start_base_network_stack(&mut self) -> Result<(), RadioFault> {
        self.script.record("start_stack")
    }

    fn subscribe(&mut self, category: EventCategory, sink: EventSink) -> Result<(), RadioFault> {
        self.script.record("subscribe")?;
        if category == EventCategory::Link {
            self.link_sink = Some(sink);
        }
        Ok(())
    }

    fn apply_role_configuration(
        &mut self,
        _role: Role,
        _config: &RoleConfig,
    ) -> Result<(), RadioFault> {
        self.script.record("apply_config")
    }

    fn start(&mut self) -> Result<(), RadioFault> {
        self.script.record("start")?;
        if let Some(sink) = &self.link_sink {
            sink.post_link(LinkEvent::AccessPointStarted);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), RadioFault> {
        self.script.record("stop")
    }

    fn release(&mut self) -> Result<(), RadioFault> {
        self.script.record("release")?;
        self.link_sink = None;
        Ok(())
    }
}
