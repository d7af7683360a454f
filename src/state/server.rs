//! Process-wide bouncer state.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use slbnc_proto::{Message, Prefix};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use zeroize::Zeroizing;

use super::user::User;
use crate::config::{Config, UserConfig};
use crate::history::MessageStore;
use crate::intern::{self, StringInterner};
use crate::security::password;

/// Registry of accounts and the services shared by every connection.
pub struct Server {
    pub config: Arc<Config>,
    pub interner: Arc<StringInterner>,
    pub store: Arc<dyn MessageStore>,
    accounts: HashMap<String, UserConfig>,
    network_owners: HashMap<i64, String>,
    /// Users brought online by a successful login. Never removed.
    users: DashMap<String, Arc<User>>,
    next_conn_id: AtomicU64,
    created: DateTime<Utc>,
    shutdown: CancellationToken,
}

impl Server {
    pub fn new(config: Config, store: Arc<dyn MessageStore>) -> Arc<Self> {
        let accounts: HashMap<String, UserConfig> = config
            .users
            .iter()
            .map(|u| (u.username.clone(), u.clone()))
            .collect();
        let network_owners = config
            .users
            .iter()
            .flat_map(|u| u.networks.iter().map(|n| (n.id, u.username.clone())))
            .collect();

        Arc::new(Self {
            config: Arc::new(config),
            interner: Arc::new(StringInterner::new()),
            store,
            accounts,
            network_owners,
            users: DashMap::new(),
            next_conn_id: AtomicU64::new(1),
            created: Utc::now(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Prefix of bouncer-generated messages.
    pub fn prefix(&self) -> Prefix {
        Prefix::ServerName(self.config.server.name.clone())
    }

    pub fn created(&self) -> DateTime<Utc> {
        self.created
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_conn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether any account has a network with this id.
    pub fn network_exists(&self, id: i64) -> bool {
        self.network_owners.contains_key(&id)
    }

    /// Whether `username` owns the network `id`.
    pub fn owns_network(&self, username: &str, id: i64) -> bool {
        self.network_owners.get(&id).is_some_and(|owner| owner == username)
    }

    #[cfg(test)]
    pub fn user(&self, username: &str) -> Option<Arc<User>> {
        self.users.get(username).map(|u| Arc::clone(&u))
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Check credentials and return the (possibly newly started) user.
    ///
    /// Unknown accounts go through a dummy verification so they cost the
    /// same as a wrong password.
    pub async fn authenticate(
        self: &Arc<Self>,
        username: &str,
        password: Zeroizing<String>,
    ) -> Option<Arc<User>> {
        let hash = self.accounts.get(username).map(|a| a.password.clone());
        let verified = tokio::task::spawn_blocking(move || match hash {
            Some(hash) => password::verify_password(&password, &hash),
            None => password::dummy_password_verify(&password),
        })
        .await
        .unwrap_or(false);

        if !verified {
            warn!(username = %username, "Authentication failed");
            return None;
        }
        let account = self.accounts.get(username)?;
        Some(self.get_or_start_user(account))
    }

    fn get_or_start_user(self: &Arc<Self>, account: &UserConfig) -> Arc<User> {
        let user = match self.users.entry(account.username.clone()) {
            Entry::Occupied(e) => return Arc::clone(e.get()),
            Entry::Vacant(e) => Arc::clone(e.insert(Arc::new(User::new(account))).value()),
        };

        info!(user = %user.username, networks = account.networks.len(), "User online");
        for network in user.networks() {
            crate::network::upstream::spawn(Arc::clone(self), Arc::clone(&user), network);
        }
        user
    }

    /// Start the periodic maintenance tasks owned by the server. They stop
    /// when [`Server::shutdown`] is called.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        let every = Duration::from_secs(self.config.intern.reset_interval);
        info!(interval_secs = every.as_secs(), "String cache reset task started");
        intern::spawn_reset_task(Arc::clone(&self.interner), every, self.shutdown_token())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Tell every attached client the bouncer is going away, then cancel
    /// every connection task.
    pub fn shutdown(&self) {
        let farewell = Message::new("ERROR", ["Server shutting down"]);
        let clients: usize = self
            .users
            .iter()
            .map(|user| user.broadcast(&farewell, |dc| !dc.is_closed()))
            .sum();
        info!(users = self.user_count(), clients, "Shutting down");
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("name", &self.config.server.name)
            .field("users", &self.users.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::noop::NoOpStore;
    use crate::state::DownstreamHandle;

    fn server() -> Arc<Server> {
        let hash = password::hash_password("secret").unwrap();
        let config = Config::from_toml(&format!(
            r#"
[server]
name = "bnc.test"

[[user]]
username = "alice"
password = "{hash}"
"#
        ))
        .unwrap();
        Server::new(config, Arc::new(NoOpStore))
    }

    #[test]
    fn test_connection_ids_increase() {
        let server = server();
        let a = server.next_connection_id();
        let b = server.next_connection_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_authenticate() {
        let server = server();
        assert!(
            server
                .authenticate("alice", Zeroizing::new("wrong".into()))
                .await
                .is_none()
        );
        assert!(
            server
                .authenticate("mallory", Zeroizing::new("secret".into()))
                .await
                .is_none()
        );
        assert_eq!(server.user_count(), 0);

        let user = server
            .authenticate("alice", Zeroizing::new("secret".into()))
            .await
            .unwrap();
        assert_eq!(user.username, "alice");

        let again = server
            .authenticate("alice", Zeroizing::new("secret".into()))
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&user, &again));
        assert_eq!(server.user_count(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_says_farewell_to_attached_clients() {
        let server = server();
        let user = server
            .authenticate("alice", Zeroizing::new("secret".into()))
            .await
            .unwrap();
        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        let dc = Arc::new(DownstreamHandle::new(7, "127.0.0.1:9".parse().unwrap(), tx));
        user.attach(dc, |_| ());

        let token = server.shutdown_token();
        server.shutdown();
        assert!(token.is_cancelled());
        let farewell = rx.try_recv().unwrap();
        assert_eq!(farewell.command, "ERROR");
        assert_eq!(farewell.param(0), Some("Server shutting down"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_maintenance_stops_on_shutdown() {
        let server = server();
        server.interner.intern("#rust");
        let task = server.spawn_maintenance();

        tokio::time::sleep(Duration::from_secs(server.config.intern.reset_interval + 1)).await;
        assert!(server.interner.is_empty());

        server.shutdown();
        task.await.unwrap();
    }
}
