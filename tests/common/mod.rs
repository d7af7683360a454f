//! Integration test common infrastructure.
//!
//! Spawns the bouncer binary, scripted upstream IRC servers and raw IRC
//! clients.

pub mod client;
pub mod server;
pub mod upstream;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{PASSWORD, TestServer};
#[allow(unused_imports)]
pub use upstream::MockUpstream;
