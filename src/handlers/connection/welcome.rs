//! Registration finalization: authentication, attachment to the user, the
//! welcome burst and the channel replay.

use std::sync::Arc;

use slbnc_proto::generate::{generate_isupport, generate_motd};
use slbnc_proto::Response;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::bouncer::unknown_network;
use crate::error::{HandlerError, HandlerResult};
use crate::handlers::core::Context;
use crate::state::{UpstreamConn, User};

const USER_MODES: &str = "aiwroO";
const CHANNEL_MODES: &str = "OovaimnqpsrtklbeI";

/// Largest page a CHATHISTORY query returns.
pub const CHATHISTORY_MAX: usize = 1000;

/// Complete registration once NICK, USER and CAP END are in.
///
/// A failed attempt leaves the connection open and unregistered. The
/// username is cleared so the client has to send USER again before the
/// next attempt.
pub async fn register(ctx: &mut Context<'_>) -> HandlerResult {
    let user = match authenticate(ctx).await {
        Ok(user) => user,
        Err(e) => {
            ctx.session.username = None;
            return Err(e);
        }
    };

    if let Some(id) = ctx.session.network_id
        && !ctx.server.owns_network(&user.username, id)
    {
        warn!(user = %user.username, network = id, "Bind to foreign network refused");
        ctx.session.network_id = None;
        ctx.session.username = None;
        return Err(unknown_network(id));
    }

    let nick = ctx.nick().to_string();
    let handle = Arc::clone(&ctx.session.handle);
    handle.set_network(ctx.session.network_id);
    handle.set_nick(&nick);
    ctx.session.publish_caps();
    ctx.session.password = None;
    ctx.session.user = Some(Arc::clone(&user));

    send_welcome(ctx, &user)?;
    let ctx = &*ctx;
    user.attach(Arc::clone(&handle), |upstreams| replay_channels(ctx, upstreams))?;
    info!(
        user = %user.username,
        nick = %nick,
        network = ?ctx.session.network_id,
        downstreams = user.downstream_count(),
        "Client registered"
    );
    Ok(())
}

async fn authenticate(ctx: &mut Context<'_>) -> Result<Arc<User>, HandlerError> {
    if let Some(user) = ctx.session.account.clone() {
        return Ok(user);
    }
    let username = ctx.session.account_name().unwrap_or_default().to_string();
    let password = ctx
        .session
        .password
        .take()
        .unwrap_or_else(|| Zeroizing::new(String::new()));
    ctx.server
        .authenticate(&username, password)
        .await
        .ok_or(HandlerError::PasswordMismatch)
}

fn send_welcome(ctx: &Context<'_>, user: &User) -> HandlerResult {
    let server = ctx.server;
    let prefix = server.prefix();
    let nick = ctx.nick();
    let name = server.name();

    let welcome = format!("Welcome to slbnc, {nick}");
    let host = format!("Your host is {name}");
    let created = format!("This server was created {}", server.created().to_rfc2822());
    ctx.reply(Response::RPL_WELCOME, [nick, welcome.as_str()])?;
    ctx.reply(Response::RPL_YOURHOST, [nick, host.as_str()])?;
    ctx.reply(Response::RPL_CREATED, [nick, created.as_str()])?;
    ctx.reply(Response::RPL_MYINFO, [nick, name, "slbnc", USER_MODES, CHANNEL_MODES])?;

    match &server.config.server.motd {
        Some(lines) => {
            for msg in generate_motd(&prefix, nick, &lines.join("\n")) {
                ctx.send(msg)?;
            }
        }
        None => ctx.send_from_server(Response::err_nomotd(nick))?,
    }

    let mut tokens = vec!["CASEMAPPING=rfc1459".to_string(), "CHANTYPES=#&".to_string()];
    match ctx.session.network_id.and_then(|id| user.network(id)) {
        Some(network) => {
            tokens.push(format!("NETWORK={}", network.name));
            tokens.push(format!("BOUNCER_NETID={}", network.id));
        }
        None => tokens.push(format!("NETWORK={name}")),
    }
    if server.store.capabilities().chat_history {
        tokens.push(format!("CHATHISTORY={CHATHISTORY_MAX}"));
    }
    for msg in generate_isupport(&prefix, nick, &tokens) {
        ctx.send(msg)?;
    }
    Ok(())
}

/// Bring the client up to date with every complete channel of the
/// networks it follows. Runs while the client is being attached.
fn replay_channels(ctx: &Context<'_>, upstreams: &[Arc<UpstreamConn>]) -> HandlerResult {
    let handle = &ctx.session.handle;
    let server_prefix = ctx.server.prefix();
    let client_prefix = ctx.session.prefix(&handle.addr.ip().to_string());
    let nick = ctx.nick();
    let bound = ctx.session.network_id.is_some();

    for upstream in upstreams {
        if !handle.follows(upstream.network_id()) {
            continue;
        }
        for channel in upstream.complete_channels() {
            let display = if bound {
                channel.name.to_string()
            } else {
                format!("{}/{}", channel.name, upstream.network_name())
            };
            for msg in channel.snapshot(&server_prefix, &client_prefix, nick, &display) {
                ctx.send(msg)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::core::context::test_support::*;
    use crate::security::password::hash_password;

    fn config(motd: bool) -> String {
        let motd = if motd { "motd = [\"hello\", \"world\"]\n" } else { "" };
        format!(
            "[server]\nname = \"bnc.test\"\n{motd}\n[[user]]\nusername = \"alice\"\npassword = \"{}\"\n",
            hash_password("secret").unwrap()
        )
    }

    fn ready(session: &mut crate::handlers::core::Session, password: &str) {
        session.nick = Some("al".into());
        session.username = Some("~alice".into());
        session.password = Some(Zeroizing::new(password.into()));
    }

    #[tokio::test]
    async fn test_register_sends_welcome_burst() {
        let server = server(&config(true));
        let (mut session, mut rx) = session();
        ready(&mut session, "secret");
        let mut ctx = Context { server: &server, session: &mut session };

        register(&mut ctx).await.unwrap();
        assert!(ctx.session.is_registered());
        assert!(ctx.session.password.is_none());

        let codes: Vec<_> = drain(&mut rx).into_iter().map(|m| m.command).collect();
        assert_eq!(codes, vec!["001", "002", "003", "004", "375", "372", "372", "376", "005"]);

        let user = server.user("alice").unwrap();
        assert_eq!(user.downstream_count(), 1);
    }

    #[tokio::test]
    async fn test_register_without_motd() {
        let server = server(&config(false));
        let (mut session, mut rx) = session();
        ready(&mut session, "secret");
        let mut ctx = Context { server: &server, session: &mut session };

        register(&mut ctx).await.unwrap();
        let codes: Vec<_> = drain(&mut rx).into_iter().map(|m| m.command).collect();
        assert!(codes.contains(&"422".to_string()));
    }

    #[tokio::test]
    async fn test_wrong_password_keeps_connection_unregistered() {
        let server = server(&config(false));
        let (mut session, _rx) = session();
        ready(&mut session, "wrong");
        let mut ctx = Context { server: &server, session: &mut session };

        let err = register(&mut ctx).await.unwrap_err();
        assert!(matches!(err, HandlerError::PasswordMismatch));
        assert!(!ctx.session.is_registered());
        assert!(!ctx.session.handle.is_closed());
        assert!(ctx.session.username.is_none());
    }

    #[tokio::test]
    async fn test_unknown_user_gets_same_error() {
        let server = server(&config(false));
        let (mut session, _rx) = session();
        ready(&mut session, "secret");
        session.username = Some("~mallory".into());
        let mut ctx = Context { server: &server, session: &mut session };

        let err = register(&mut ctx).await.unwrap_err();
        let reply = err.to_irc_reply("bnc.test", "al", "USER").unwrap();
        assert_eq!(reply.command, "464");
    }
}
