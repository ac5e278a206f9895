//! Event categories, masks and handler subscriptions.

use std::fmt;
use std::net::Ipv4Addr;
use std::ops::BitOr;
use std::sync::Arc;

/// Error a handler may return. Logged by the bridge, never propagated.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Caller-supplied handler for one event category.
pub type Handler<E> = Arc<dyn Fn(&E) -> Result<(), HandlerError> + Send + Sync>;

/// The two independent event categories a caller can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventCategory {
    /// Radio association and disassociation.
    Link,
    /// Network address assignment and loss.
    Address,
}

impl fmt::Display for EventCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link => f.write_str("link"),
            Self::Address => f.write_str("address"),
        }
    }
}

/// Set of event kinds within one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventMask(u32);

impl EventMask {
    /// No events.
    pub const NONE: Self = Self(0);
    /// Every event of the category.
    pub const ALL: Self = Self(u32::MAX);

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether any kind in `other` is also in `self`.
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for EventMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Common behaviour of the per-category event types.
pub trait NetEvent: fmt::Debug + Send + 'static {
    const CATEGORY: EventCategory;

    /// Single-bit mask identifying this event's kind.
    fn mask(&self) -> EventMask;
}

/// Radio association events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEvent {
    /// The coordinator's access point is up.
    AccessPointStarted,
    /// The coordinator's access point went down.
    AccessPointStopped,
    /// A station associated with the coordinator.
    PeerJoined { mac: [u8; 6] },
    /// A station left the coordinator.
    PeerLeft { mac: [u8; 6] },
    /// The peer's station interface is up.
    StationStarted,
    /// The peer associated with the coordinator.
    StationConnected,
    /// The peer lost its association.
    StationDisconnected,
    /// The peer's station interface went down.
    StationStopped,
}

impl LinkEvent {
    pub const AP_STARTED: EventMask = EventMask::from_bits(1 << 0);
    pub const AP_STOPPED: EventMask = EventMask::from_bits(1 << 1);
    pub const PEER_JOINED: EventMask = EventMask::from_bits(1 << 2);
    pub const PEER_LEFT: EventMask = EventMask::from_bits(1 << 3);
    pub const STA_STARTED: EventMask = EventMask::from_bits(1 << 4);
    pub const STA_CONNECTED: EventMask = EventMask::from_bits(1 << 5);
    pub const STA_DISCONNECTED: EventMask = EventMask::from_bits(1 << 6);
    pub const STA_STOPPED: EventMask = EventMask::from_bits(1 << 7);
}

impl NetEvent for LinkEvent {
    const CATEGORY: EventCategory = EventCategory::Link;

    fn mask(&self) -> EventMask {
        match self {
            Self::AccessPointStarted => Self::AP_STARTED,
            Self::AccessPointStopped => Self::AP_STOPPED,
            Self::PeerJoined { .. } => Self::PEER_JOINED,
            Self::PeerLeft { .. } => Self::PEER_LEFT,
            Self::StationStarted => Self::STA_STARTED,
            Self::StationConnected => Self::STA_CONNECTED,
            Self::StationDisconnected => Self::STA_DISCONNECTED,
            Self::StationStopped => Self::STA_STOPPED,
        }
    }
}

/// Network address events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressEvent {
    /// This node obtained an address.
    Assigned { ip: Ipv4Addr },
    /// This node lost its address.
    Lost,
    /// The coordinator leased an address to its peer.
    PeerAssigned { ip: Ipv4Addr },
}

impl AddressEvent {
    pub const ASSIGNED: EventMask = EventMask::from_bits(1 << 0);
    pub const LOST: EventMask = EventMask::from_bits(1 << 1);
    pub const PEER_ASSIGNED: EventMask = EventMask::from_bits(1 << 2);
}

impl NetEvent for AddressEvent {
    const CATEGORY: EventCategory = EventCategory::Address;

    fn mask(&self) -> EventMask {
        match self {
            Self::Assigned { .. } => Self::ASSIGNED,
            Self::Lost => Self::LOST,
            Self::PeerAssigned { .. } => Self::PEER_ASSIGNED,
        }
    }
}

/// Optional handler for one category, with the kinds it wants.
///
/// A subscription without a handler means "do not subscribe".
pub struct EventSubscription<E> {
    pub mask: EventMask,
    pub handler: Option<Handler<E>>,
}

impl<E: NetEvent> EventSubscription<E> {
    /// No handler for this category.
    pub fn none() -> Self {
        Self {
            mask: EventMask::NONE,
            handler: None,
        }
    }

    pub fn new<F>(mask: EventMask, handler: F) -> Self
    where
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            mask,
            handler: Some(Arc::new(handler)),
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.handler.is_some()
    }
}

impl<E: NetEvent> Default for EventSubscription<E> {
    fn default() -> Self {
        Self::none()
    }
}

impl<E> Clone for EventSubscription<E> {
    fn clone(&self) -> Self {
        Self {
            mask: self.mask,
            handler: self.handler.clone(),
        }
    }
}

impl<E> fmt::Debug for EventSubscription<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSubscription")
            .field("mask", &self.mask)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

/// Subscriptions for both categories, passed to `initialize`.
#[derive(Debug, Clone, Default)]
pub struct EventSubscriptions {
    pub link: EventSubscription<LinkEvent>,
    pub address: EventSubscription<AddressEvent>,
}

impl EventSubscriptions {
    /// No handlers at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn on_link<F>(mut self, mask: EventMask, handler: F) -> Self
    where
        F: Fn(&LinkEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.link = EventSubscription::new(mask, handler);
        self
    }

    pub fn on_address<F>(mut self, mask: EventMask, handler: F) -> Self
    where
        F: Fn(&AddressEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.address = EventSubscription::new(mask, handler);
        self
    }
}

/// Event registration errors.
#[derive(Debug)]
pub enum EventError {
    /// A handler is already registered for the category.
    AlreadyRegistered(EventCategory),
    /// The dispatcher thread could not be started.
    DispatcherSpawn(std::io::Error),
}

impl fmt::Display for EventError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyRegistered(category) => {
                write!(f, "{} handler already registered", category)
            }
            Self::DispatcherSpawn(e) => write!(f, "failed to start event dispatcher: {}", e),
        }
    }
}

impl std::error::Error for EventError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DispatcherSpawn(e) => Some(e),
            Self::AlreadyRegistered(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_are_distinct_bits() {
        let link = [
            LinkEvent::AP_STARTED,
            LinkEvent::AP_STOPPED,
            LinkEvent::PEER_JOINED,
            LinkEvent::PEER_LEFT,
            LinkEvent::STA_STARTED,
            LinkEvent::STA_CONNECTED,
            LinkEvent::STA_DISCONNECTED,
            LinkEvent::STA_STOPPED,
        ];
        let combined = link.iter().fold(EventMask::NONE, |acc, m| acc | *m);
        assert_eq!(combined.bits().count_ones() as usize, link.len());
    }

    #[test]
    fn test_event_mask_matching() {
        let mask = LinkEvent::PEER_JOINED | LinkEvent::PEER_LEFT;
        assert!(mask.intersects(LinkEvent::PeerJoined { mac: [0; 6] }.mask()));
        assert!(!mask.intersects(LinkEvent::AccessPointStarted.mask()));
        assert!(EventMask::ALL.intersects(AddressEvent::Lost.mask()));
        assert!(!EventMask::NONE.intersects(AddressEvent::Lost.mask()));
    }

    #[test]
    fn test_default_subscriptions_are_empty() {
        let subs = EventSubscriptions::none();
        assert!(!subs.link.is_subscribed());
        assert!(!subs.address.is_subscribed());

        let subs = subs.on_address(AddressEvent::ASSIGNED, |_| Ok(()));
        assert!(!subs.link.is_subscribed());
        assert!(subs.address.is_subscribed());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            EventError::AlreadyRegistered(EventCategory::Link).to_string(),
            "link handler already registered"
        );
    }
}
