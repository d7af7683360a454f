//! Bouncer accounts and their upstream networks.

use serde::Deserialize;

/// One bouncer account.
#[derive(Debug, Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    /// Argon2 PHC string.
    pub password: String,
    #[serde(default, rename = "network")]
    pub networks: Vec<NetworkConfig>,
}

/// One upstream network of an account.
#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    /// Stable identifier, unique across the whole bouncer.
    pub id: i64,
    pub name: String,
    /// `host:port` of the IRC server.
    pub address: String,
    pub nick: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub realname: Option<String>,
    /// Server password sent with PASS.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

impl NetworkConfig {
    pub fn username(&self) -> &str {
        self.username.as_deref().unwrap_or(&self.nick)
    }

    pub fn realname(&self) -> &str {
        self.realname.as_deref().unwrap_or(&self.nick)
    }
}

/// Channel joined automatically once the upstream is registered.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
}
