//! Command protocol between the coordinator and its peer.
//!
//! - [`frame`]: the fixed-size command frame and its codec
//! - [`link`]: carriage of frames over the TCP command connection

mod frame;
mod link;

pub use frame::{
    decode, encode, CommandFrame, DecodeError, LedId, LightEffect, FRAME_SIZE,
};
pub use link::{read_frame, write_frame, CommandClient, CommandServer, LinkError};
