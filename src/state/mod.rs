//! Shared bouncer state.
//!
//! The [`Server`] owns the [`User`]s; each user owns its networks and holds
//! handles to the downstream connections attached to it.

mod channel;
mod downstream;
mod server;
mod upstream;
mod user;

pub use channel::{Channel, DEFAULT_MEMBERSHIP_PREFIXES, split_member_prefix};
pub use downstream::{DownstreamHandle, is_channel, split_network_suffix};
pub use server::Server;
pub use upstream::UpstreamConn;
pub use user::User;
