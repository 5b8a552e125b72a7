//! Hot module replacement
//!
//! A [`WatchHub`] fans module changes out to every open [`HmrChannel`];
//! each channel forwards the changes it subscribed to over its websocket.

mod channel;
mod hub;

pub use channel::{update_url, Frame, HmrChannel};
pub use hub::{ChannelWatcher, Subscription, WatchEvent, WatchHub};
