//! Connection registration handlers (NICK, USER, PASS, PING, PONG, QUIT,
//! BOUNCER) and registration finalization.

mod bouncer;
mod nick;
mod pass;
mod ping;
mod quit;
mod user;
mod welcome;

pub use bouncer::BouncerHandler;
pub use nick::NickHandler;
pub use pass::PassHandler;
pub use ping::{PingHandler, PongHandler};
pub use quit::QuitHandler;
pub use user::UserHandler;
pub use welcome::{CHATHISTORY_MAX, register};
