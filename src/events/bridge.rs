//! Event registration and dispatch.
//!
//! The radio posts events through an [`EventSink`] from whatever context it
//! runs in. Posting never blocks: events go onto an unbounded channel and a
//! dedicated dispatcher thread delivers them. Handlers run on that thread,
//! outside every lock, so a handler may freely query the lifecycle.
//!
//! Every sink belongs to a session. [`EventBridge::clear`] ends the session:
//! events the old sinks posted that are still queued, or posted later, are
//! discarded instead of reaching the next session's handlers.

use super::types::{
    AddressEvent, EventCategory, EventError, EventMask, EventSubscriptions, Handler, LinkEvent,
    NetEvent,
};
use crate::lock_unpoisoned;
use log::{debug, error, warn};
use std::net::Ipv4Addr;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::mpsc;

/// Diagnostic snapshot of what the radio has reported so far.
///
/// Updated for every event, whether or not a handler is registered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStatus {
    /// Access point up (coordinator) or associated (peer).
    pub link_up: bool,
    /// MAC of the associated peer (coordinator only).
    pub peer: Option<[u8; 6]>,
    /// This node's address.
    pub address: Option<Ipv4Addr>,
    /// Address leased to the peer (coordinator only).
    pub peer_address: Option<Ipv4Addr>,
    /// Total events observed.
    pub events_seen: u64,
}

impl LinkStatus {
    fn observe_link(&mut self, event: &LinkEvent) {
        self.events_seen += 1;
        match event {
            LinkEvent::AccessPointStarted | LinkEvent::StationConnected => self.link_up = true,
            LinkEvent::AccessPointStopped => {
                self.link_up = false;
                self.peer = None;
                self.peer_address = None;
            }
            LinkEvent::StationDisconnected | LinkEvent::StationStopped => self.link_up = false,
            LinkEvent::PeerJoined { mac } => self.peer = Some(*mac),
            LinkEvent::PeerLeft { .. } => {
                self.peer = None;
                self.peer_address = None;
            }
            LinkEvent::StationStarted => {}
        }
    }

    fn observe_address(&mut self, event: &AddressEvent) {
        self.events_seen += 1;
        match event {
            AddressEvent::Assigned { ip } => self.address = Some(*ip),
            AddressEvent::Lost => self.address = None,
            AddressEvent::PeerAssigned { ip } => self.peer_address = Some(*ip),
        }
    }
}

enum Posted {
    Link(u64, LinkEvent),
    Address(u64, AddressEvent),
    Barrier(std_mpsc::SyncSender<()>),
    Shutdown,
}

/// Handle the radio uses to post events into the bridge.
#[derive(Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<Posted>,
    session: u64,
}

impl EventSink {
    pub fn post_link(&self, event: LinkEvent) {
        if self.tx.send(Posted::Link(self.session, event)).is_err() {
            debug!("Event dispatcher gone, dropping {:?}", event);
        }
    }

    pub fn post_address(&self, event: AddressEvent) {
        if self.tx.send(Posted::Address(self.session, event)).is_err() {
            debug!("Event dispatcher gone, dropping {:?}", event);
        }
    }
}

impl std::fmt::Debug for EventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSink")
            .field("session", &self.session)
            .field("open", &!self.tx.is_closed())
            .finish()
    }
}

struct Registration<E> {
    mask: EventMask,
    handler: Handler<E>,
}

type Slot<E> = Mutex<Option<Registration<E>>>;

#[derive(Default)]
struct Session {
    id: u64,
    status: LinkStatus,
}

// Lock order: `session`, then `link` / `address`.
#[derive(Default)]
struct Shared {
    link: Slot<LinkEvent>,
    address: Slot<AddressEvent>,
    session: Mutex<Session>,
}

struct Dispatcher {
    tx: mpsc::UnboundedSender<Posted>,
    thread: JoinHandle<()>,
}

/// Routes radio notifications to caller-supplied handlers.
pub struct EventBridge {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            dispatcher: Mutex::new(None),
        }
    }

    /// Register the link handler.
    ///
    /// Fails with [`EventError::AlreadyRegistered`] if one is already
    /// registered; the existing handler stays in place.
    pub fn register_link(
        &self,
        mask: EventMask,
        handler: Handler<LinkEvent>,
    ) -> Result<(), EventError> {
        register(&self.shared.link, mask, handler)
    }

    /// Register the address handler. Same rules as [`EventBridge::register_link`].
    pub fn register_address(
        &self,
        mask: EventMask,
        handler: Handler<AddressEvent>,
    ) -> Result<(), EventError> {
        register(&self.shared.address, mask, handler)
    }

    /// Remove the handler for `category`, if any.
    pub fn unregister(&self, category: EventCategory) {
        match category {
            EventCategory::Link => *lock_unpoisoned(&self.shared.link) = None,
            EventCategory::Address => *lock_unpoisoned(&self.shared.address) = None,
        }
    }

    /// Register every handler present in `subs`, or none of them.
    pub fn register_all(&self, subs: &EventSubscriptions) -> Result<(), EventError> {
        let mut link = lock_unpoisoned(&self.shared.link);
        let mut address = lock_unpoisoned(&self.shared.address);

        if subs.link.handler.is_some() && link.is_some() {
            return Err(EventError::AlreadyRegistered(EventCategory::Link));
        }
        if subs.address.handler.is_some() && address.is_some() {
            return Err(EventError::AlreadyRegistered(EventCategory::Address));
        }

        if let Some(handler) = &subs.link.handler {
            *link = Some(Registration {
                mask: subs.link.mask,
                handler: handler.clone(),
            });
        }
        if let Some(handler) = &subs.address.handler {
            *address = Some(Registration {
                mask: subs.address.mask,
                handler: handler.clone(),
            });
        }
        Ok(())
    }

    pub fn is_registered(&self, category: EventCategory) -> bool {
        match category {
            EventCategory::Link => lock_unpoisoned(&self.shared.link).is_some(),
            EventCategory::Address => lock_unpoisoned(&self.shared.address).is_some(),
        }
    }

    /// Start the dispatcher if needed and return a sink for the current
    /// session.
    pub fn start(&self) -> Result<EventSink, EventError> {
        let session = lock_unpoisoned(&self.shared.session).id;
        let mut dispatcher = lock_unpoisoned(&self.dispatcher);
        if let Some(running) = dispatcher.as_ref() {
            return Ok(EventSink {
                tx: running.tx.clone(),
                session,
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = self.shared.clone();
        let thread = thread::Builder::new()
            .name("net-events".into())
            .spawn(move || run_dispatcher(shared, rx))
            .map_err(EventError::DispatcherSpawn)?;

        *dispatcher = Some(Dispatcher {
            tx: tx.clone(),
            thread,
        });
        debug!("Event dispatcher started");
        Ok(EventSink { tx, session })
    }

    /// Wait until every event posted before this call has been handled.
    ///
    /// Returns `false` on timeout or if the dispatcher is not running.
    /// Calling this from inside a handler always times out.
    pub fn flush(&self, timeout: Duration) -> bool {
        let tx = match lock_unpoisoned(&self.dispatcher).as_ref() {
            Some(running) => running.tx.clone(),
            None => return false,
        };
        let (ack_tx, ack_rx) = std_mpsc::sync_channel(1);
        if tx.send(Posted::Barrier(ack_tx)).is_err() {
            return false;
        }
        ack_rx.recv_timeout(timeout).is_ok()
    }

    /// End the current session: drop all handlers, reset the diagnostic
    /// snapshot and discard anything the session's sinks still deliver.
    pub fn clear(&self) {
        let mut session = lock_unpoisoned(&self.shared.session);
        session.id += 1;
        session.status = LinkStatus::default();
        *lock_unpoisoned(&self.shared.link) = None;
        *lock_unpoisoned(&self.shared.address) = None;
    }

    pub fn status(&self) -> LinkStatus {
        lock_unpoisoned(&self.shared.session).status
    }

    /// Stop the dispatcher thread. Events posted afterwards are dropped.
    pub fn stop(&self) {
        let Some(dispatcher) = lock_unpoisoned(&self.dispatcher).take() else {
            return;
        };
        let _ = dispatcher.tx.send(Posted::Shutdown);
        if dispatcher.thread.join().is_err() {
            error!("Event dispatcher thread panicked");
        }
        debug!("Event dispatcher stopped");
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventBridge {
    fn drop(&mut self) {
        self.stop();
    }
}

fn register<E>(slot: &Slot<E>, mask: EventMask, handler: Handler<E>) -> Result<(), EventError>
where
    E: NetEvent,
{
    let mut slot = lock_unpoisoned(slot);
    if slot.is_some() {
        return Err(EventError::AlreadyRegistered(E::CATEGORY));
    }
    *slot = Some(Registration { mask, handler });
    Ok(())
}

fn run_dispatcher(shared: Arc<Shared>, mut rx: mpsc::UnboundedReceiver<Posted>) {
    while let Some(posted) = rx.blocking_recv() {
        match posted {
            Posted::Link(session, event) => {
                let handler = accept(&shared, session, &shared.link, &event, |status| {
                    status.observe_link(&event)
                });
                if let Some(handler) = handler {
                    deliver(handler, &event);
                }
            }
            Posted::Address(session, event) => {
                let handler = accept(&shared, session, &shared.address, &event, |status| {
                    status.observe_address(&event)
                });
                if let Some(handler) = handler {
                    deliver(handler, &event);
                }
            }
            Posted::Barrier(ack) => {
                let _ = ack.try_send(());
            }
            Posted::Shutdown => break,
        }
    }
}

/// Record an event in the snapshot and pick the handler it goes to.
///
/// The session check, the snapshot update and the handler lookup happen
/// under one lock so [`EventBridge::clear`] can't interleave with them.
fn accept<E: NetEvent>(
    shared: &Shared,
    session: u64,
    slot: &Slot<E>,
    event: &E,
    observe: impl FnOnce(&mut LinkStatus),
) -> Option<Handler<E>> {
    let mut current = lock_unpoisoned(&shared.session);
    if current.id != session {
        debug!("Discarding {:?} from ended session {}", event, session);
        return None;
    }
    observe(&mut current.status);

    // Clone the handler out so it runs without any lock held.
    match lock_unpoisoned(slot).as_ref() {
        Some(reg) if reg.mask.intersects(event.mask()) => Some(reg.handler.clone()),
        _ => {
            debug!("{} event observed, not forwarded: {:?}", E::CATEGORY, event);
            None
        }
    }
}

fn deliver<E: NetEvent>(handler: Handler<E>, event: &E) {
    match catch_unwind(AssertUnwindSafe(|| handler(event))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("{} handler failed on {:?}: {}", E::CATEGORY, event, e),
        Err(payload) => error!(
            "{} handler panicked on {:?}: {}",
            E::CATEGORY,
            event,
            panic_message(payload.as_ref())
        ),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
