//! Test server management.
//!
//! Spawns slbnc instances for integration testing.

use std::net::SocketAddr;
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHasher};
use tempfile::TempDir;
use tokio::time::sleep;

/// Password of every account created by [`TestServer::spawn`].
pub const PASSWORD: &str = "hunter2";

/// A running bouncer process with its own config directory.
pub struct TestServer {
    child: Child,
    port: u16,
    _dir: TempDir,
}

/// One `[[user.network]]` entry.
pub struct TestNetwork {
    pub id: i64,
    pub name: &'static str,
    pub address: SocketAddr,
    pub channels: &'static [&'static str],
}

impl TestServer {
    /// Spawn a bouncer with the given accounts.
    ///
    /// `extra` is appended to the generated config before the accounts.
    pub async fn spawn(
        extra: &str,
        users: &[(&str, &[TestNetwork])],
    ) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        let port = free_port()?;
        let hash = Argon2::default()
            .hash_password(PASSWORD.as_bytes(), &SaltString::generate(&mut OsRng))
            .map_err(|e| anyhow::anyhow!("hash failed: {e}"))?
            .to_string();

        let mut config = format!(
            r#"
[server]
name = "bnc.test"
motd = ["Test bouncer"]

[listen]
address = "127.0.0.1:{port}"

[reconnect]
initial = 1
max = 2

{extra}
"#
        );
        for (username, networks) in users {
            config.push_str(&format!(
                "\n[[user]]\nusername = \"{username}\"\npassword = \"{hash}\"\n"
            ));
            for net in *networks {
                let channels: Vec<String> = net
                    .channels
                    .iter()
                    .map(|c| format!("{{ name = \"{c}\" }}"))
                    .collect();
                config.push_str(&format!(
                    "\n[[user.network]]\nid = {}\nname = \"{}\"\naddress = \"{}\"\nnick = \"{username}\"\nchannels = [{}]\n",
                    net.id,
                    net.name,
                    net.address,
                    channels.join(", ")
                ));
            }
        }

        let config_path = dir.path().join("slbnc.toml");
        std::fs::write(&config_path, config)?;

        let child = Command::new(env!("CARGO_BIN_EXE_slbnc"))
            .arg(&config_path)
            .env("RUST_LOG", "slbnc=debug")
            .stdout(Stdio::null())
            .spawn()?;

        let server = Self {
            child,
            port,
            _dir: dir,
        };
        server.wait_until_ready().await?;
        Ok(server)
    }

    /// Wait until the server is accepting connections.
    async fn wait_until_ready(&self) -> anyhow::Result<()> {
        for _ in 0..50 {
            if tokio::net::TcpStream::connect(("127.0.0.1", self.port))
                .await
                .is_ok()
            {
                return Ok(());
            }
            sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("Server failed to start within 5 seconds")
    }

    pub fn address(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    /// Create a new, unregistered test client connected to this server.
    pub async fn connect(&self) -> anyhow::Result<super::client::TestClient> {
        super::client::TestClient::connect(&self.address()).await
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn free_port() -> std::io::Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}
