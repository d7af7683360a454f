//! SASL PLAIN over AUTHENTICATE.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use slbnc_proto::{Message, Response};
use tracing::{debug, info};
use zeroize::{Zeroize, Zeroizing};

use crate::caps::SASL_MECHANISMS;
use crate::error::HandlerResult;
use crate::handlers::core::{Context, Handler, SaslState};

/// Size of a full AUTHENTICATE chunk; a shorter one ends the payload.
const CHUNK_SIZE: usize = 400;

/// Upper bound on an accumulated payload.
const MAX_PAYLOAD: usize = 8192;

/// Handler for AUTHENTICATE.
pub struct AuthenticateHandler;

#[async_trait]
impl Handler for AuthenticateHandler {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult {
        let data = msg.params[0].as_str();
        let nick = ctx.nick().to_string();

        if ctx.session.is_registered() || ctx.session.account.is_some() {
            return ctx.send_from_server(Response::err_saslalready(&nick));
        }

        if data == "*" {
            ctx.session.sasl = None;
            return ctx.send_from_server(Response::err_saslaborted(&nick));
        }

        let Some(state) = ctx.session.sasl.as_mut() else {
            // First message names the mechanism
            if !data.eq_ignore_ascii_case("PLAIN") {
                ctx.send_from_server(Response::rpl_saslmechs(&nick, SASL_MECHANISMS))?;
                return ctx.send_from_server(Response::err_saslfail(&nick));
            }
            ctx.session.sasl = Some(SaslState::default());
            return ctx.send(Message::new("AUTHENTICATE", ["+"]));
        };

        if data.len() > CHUNK_SIZE || state.buffer.len() + data.len() > MAX_PAYLOAD {
            state.buffer.zeroize();
            ctx.session.sasl = None;
            return ctx.send_from_server(Response::err_sasltoolong(&nick));
        }
        if data != "+" {
            state.buffer.push_str(data);
        }
        if data.len() == CHUNK_SIZE {
            return Ok(());
        }

        let payload = Zeroizing::new(std::mem::take(&mut state.buffer));
        ctx.session.sasl = None;

        let Some((authcid, password)) = decode_plain(&payload) else {
            debug!(nick = %nick, "Malformed SASL PLAIN payload");
            return ctx.send_from_server(Response::err_saslfail(&nick));
        };

        match ctx.server.authenticate(&authcid, password).await {
            Some(user) => {
                info!(nick = %nick, account = %user.username, "SASL authentication successful");
                let mask = ctx.session.prefix(&ctx.session.handle.addr.ip().to_string()).to_string();
                ctx.send_from_server(Response::rpl_loggedin(&nick, &mask, &user.username))?;
                ctx.send_from_server(Response::rpl_saslsuccess(&nick))?;
                ctx.session.account = Some(user);
                Ok(())
            }
            None => ctx.send_from_server(Response::err_saslfail(&nick)),
        }
    }

    fn min_params(&self) -> usize {
        1
    }
}

/// Decode `authzid \0 authcid \0 password`. The authzid, when present, must
/// name the same account.
fn decode_plain(payload: &str) -> Option<(String, Zeroizing<String>)> {
    let decoded = Zeroizing::new(STANDARD.decode(payload).ok()?);
    let mut parts = decoded.split(|&b| b == 0);
    let authzid = std::str::from_utf8(parts.next()?).ok()?;
    let authcid = std::str::from_utf8(parts.next()?).ok()?;
    let password = std::str::from_utf8(parts.next()?).ok()?;
    if parts.next().is_some() || authcid.is_empty() {
        return None;
    }
    if !authzid.is_empty() && authzid != authcid {
        return None;
    }
    Some((authcid.to_string(), Zeroizing::new(password.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::core::context::test_support::*;
    use crate::security::password::hash_password;

    fn config() -> String {
        format!(
            "[server]\nname = \"bnc.test\"\n\n[[user]]\nusername = \"alice\"\npassword = \"{}\"\n",
            hash_password("secret").unwrap()
        )
    }

    async fn run(ctx: &mut Context<'_>, line: &str) {
        let msg: Message = line.parse().unwrap();
        AuthenticateHandler.handle(ctx, &msg).await.unwrap();
    }

    fn encode(s: &str) -> String {
        STANDARD.encode(s)
    }

    #[test]
    fn test_decode_plain() {
        let (user, pass) = decode_plain(&encode("\0alice\0secret")).unwrap();
        assert_eq!(user, "alice");
        assert_eq!(pass.as_str(), "secret");

        assert!(decode_plain(&encode("bob\0alice\0secret")).is_none());
        assert!(decode_plain(&encode("alice\0secret")).is_none());
        assert!(decode_plain("not base64!").is_none());
    }

    #[tokio::test]
    async fn test_plain_success() {
        let server = server(&config());
        let (mut session, mut rx) = session();
        let mut ctx = Context { server: &server, session: &mut session };

        run(&mut ctx, "AUTHENTICATE PLAIN").await;
        assert_eq!(drain(&mut rx)[0].to_string(), "AUTHENTICATE +\r\n");

        run(&mut ctx, &format!("AUTHENTICATE {}", encode("alice\0alice\0secret"))).await;
        let codes: Vec<_> = drain(&mut rx).into_iter().map(|m| m.command).collect();
        assert_eq!(codes, vec!["900", "903"]);
        assert!(ctx.session.account.is_some());
        assert!(ctx.session.sasl.is_none());

        run(&mut ctx, "AUTHENTICATE PLAIN").await;
        assert_eq!(drain(&mut rx)[0].command, "907");
    }

    #[tokio::test]
    async fn test_plain_wrong_password() {
        let server = server(&config());
        let (mut session, mut rx) = session();
        let mut ctx = Context { server: &server, session: &mut session };

        run(&mut ctx, "AUTHENTICATE PLAIN").await;
        run(&mut ctx, &format!("AUTHENTICATE {}", encode("\0alice\0nope"))).await;
        let out = drain(&mut rx);
        assert_eq!(out.last().unwrap().command, "904");
        assert!(ctx.session.account.is_none());
    }

    #[tokio::test]
    async fn test_abort_and_unknown_mechanism() {
        let server = server(&config());
        let (mut session, mut rx) = session();
        let mut ctx = Context { server: &server, session: &mut session };

        run(&mut ctx, "AUTHENTICATE EXTERNAL").await;
        let codes: Vec<_> = drain(&mut rx).into_iter().map(|m| m.command).collect();
        assert_eq!(codes, vec!["908", "904"]);

        run(&mut ctx, "AUTHENTICATE PLAIN").await;
        run(&mut ctx, "AUTHENTICATE *").await;
        let out = drain(&mut rx);
        assert_eq!(out.last().unwrap().command, "906");
        assert!(ctx.session.sasl.is_none());
    }

    #[tokio::test]
    async fn test_chunked_payload() {
        let server = server(&config());
        let (mut session, mut rx) = session();
        let mut ctx = Context { server: &server, session: &mut session };

        run(&mut ctx, "AUTHENTICATE PLAIN").await;
        run(&mut ctx, &format!("AUTHENTICATE {}", "A".repeat(CHUNK_SIZE))).await;
        assert!(ctx.session.sasl.as_ref().is_some_and(|s| s.buffer.len() == CHUNK_SIZE));

        run(&mut ctx, &format!("AUTHENTICATE {}", "A".repeat(CHUNK_SIZE + 1))).await;
        let out = drain(&mut rx);
        assert_eq!(out.last().unwrap().command, "905");
        assert!(ctx.session.sasl.is_none());
    }
}
