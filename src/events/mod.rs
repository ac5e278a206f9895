//! Network status notifications.
//!
//! The radio reports link and address changes from its own execution
//! context. [`EventBridge`] hands them to a dispatcher thread, keeps a
//! diagnostic [`LinkStatus`] snapshot and forwards each event to the
//! caller's handler for that category, if one is registered.
//!
//! - [`types`]: event categories, masks, handlers and subscriptions
//! - [`bridge`]: registration and dispatch

mod bridge;
mod types;

pub use bridge::{EventBridge, EventSink, LinkStatus};
pub use types::{
    AddressEvent, EventCategory, EventError, EventMask, EventSubscription, EventSubscriptions,
    Handler, HandlerError, LinkEvent, NetEvent,
};
