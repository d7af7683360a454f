//! Per-connection handler context and registration state.

use std::sync::Arc;

use async_trait::async_trait;
use slbnc_proto::{Message, Prefix, Response};
use zeroize::Zeroizing;

use crate::caps::{CapRegistry, CapSnapshot};
use crate::error::{ConnectionError, HandlerError, HandlerResult};
use crate::state::{DownstreamHandle, Server, User};

/// A command handler.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &mut Context<'_>, msg: &Message) -> HandlerResult;

    /// Parameters the command needs before `handle` is called.
    fn min_params(&self) -> usize {
        0
    }
}

/// Where a downstream connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Unregistered,
    NegotiatingCaps,
    Authenticating,
    Registered,
    Closed,
}

/// SASL exchange in progress.
#[derive(Debug, Default)]
pub struct SaslState {
    /// Base64 payload received so far.
    pub buffer: String,
}

/// State owned by a downstream connection task.
pub struct Session {
    pub handle: Arc<DownstreamHandle>,
    pub nick: Option<String>,
    /// Username as given in USER, with the `~` marker.
    pub username: Option<String>,
    pub realname: Option<String>,
    pub password: Option<Zeroizing<String>>,
    /// Network requested with BOUNCER BIND.
    pub network_id: Option<i64>,
    pub caps: CapRegistry,
    pub sasl: Option<SaslState>,
    /// Account proven by SASL.
    pub account: Option<Arc<User>>,
    /// Set once registered.
    pub user: Option<Arc<User>>,
    next_batch: u64,
    closed: bool,
}

impl Session {
    pub fn new(handle: Arc<DownstreamHandle>, caps: CapRegistry) -> Self {
        Self {
            handle,
            nick: None,
            username: None,
            realname: None,
            password: None,
            network_id: None,
            caps,
            sasl: None,
            account: None,
            user: None,
            next_batch: 1,
            closed: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.handle.id
    }

    pub fn state(&self) -> RegistrationState {
        if self.closed {
            RegistrationState::Closed
        } else if self.user.is_some() {
            RegistrationState::Registered
        } else if self.sasl.is_some() {
            RegistrationState::Authenticating
        } else if self.caps.is_negotiating() {
            RegistrationState::NegotiatingCaps
        } else {
            RegistrationState::Unregistered
        }
    }

    pub fn is_registered(&self) -> bool {
        self.user.is_some()
    }

    /// NICK and USER received and no CAP negotiation pending.
    pub fn can_register(&self) -> bool {
        self.nick.is_some()
            && self.username.is_some()
            && !self.caps.is_negotiating()
            && !self.is_registered()
    }

    /// Current nickname, `*` before one is known.
    pub fn nick_or_star(&self) -> &str {
        self.nick.as_deref().unwrap_or("*")
    }

    /// Username without the local `~` marker.
    pub fn account_name(&self) -> Option<&str> {
        self.username
            .as_deref()
            .map(|u| u.strip_prefix('~').unwrap_or(u))
    }

    /// Prefix the client is known by.
    pub fn prefix(&self, host: &str) -> Prefix {
        Prefix::new(
            self.nick_or_star(),
            self.username.as_deref().unwrap_or("~"),
            host,
        )
    }

    /// Republish the enabled capability flags for other tasks.
    pub fn publish_caps(&self) {
        self.handle.set_caps(CapSnapshot::from_registry(&self.caps));
    }

    pub fn next_batch_ref(&mut self) -> String {
        let id = self.next_batch;
        self.next_batch += 1;
        format!("{}-{}", self.handle.id, id)
    }

    /// Tear down the session: stop the writer after it drains and leave
    /// the user's attached set. Fails if already closed.
    pub fn close(&mut self) -> Result<(), ConnectionError> {
        if self.closed {
            return Err(ConnectionError::AlreadyClosed);
        }
        self.closed = true;
        self.handle.shutdown();
        if let Some(user) = &self.user {
            user.detach(self.handle.id);
        }
        Ok(())
    }
}

/// Handler context passed to each command handler.
pub struct Context<'a> {
    pub server: &'a Arc<Server>,
    pub session: &'a mut Session,
}

impl Context<'_> {
    /// Queue a message for this client.
    pub fn send(&self, msg: Message) -> Result<(), HandlerError> {
        self.session.handle.send(msg).map_err(HandlerError::from)
    }

    /// Queue a numeric reply with the server prefix.
    pub fn reply<I, S>(&self, response: Response, params: I) -> Result<(), HandlerError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.send(Message::response(response, params).with_prefix(self.server.prefix()))
    }

    /// Queue an already built reply after setting the server prefix.
    pub fn send_from_server(&self, msg: Message) -> Result<(), HandlerError> {
        self.send(msg.with_prefix(self.server.prefix()))
    }

    pub fn nick(&self) -> &str {
        self.session.nick_or_star()
    }

    /// The registered user. Handlers in the post-registration table may
    /// rely on it.
    pub fn user(&self) -> Result<&Arc<User>, HandlerError> {
        self.session.user.as_ref().ok_or(HandlerError::NotRegistered)
    }
}
