//! Scripted upstream IRC server.
//!
//! Accepts the bouncer's connection to a network and lets the test read
//! what the bouncer sends and reply line by line.

use std::net::SocketAddr;
use std::time::Duration;

use slbnc_proto::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tokio::time::timeout;

pub struct MockUpstream {
    listener: TcpListener,
}

/// One accepted bouncer connection.
pub struct UpstreamPeer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    pub nick: String,
}

impl MockUpstream {
    pub async fn bind() -> anyhow::Result<Self> {
        Ok(Self {
            listener: TcpListener::bind("127.0.0.1:0").await?,
        })
    }

    pub fn address(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Wait for the bouncer to connect.
    pub async fn accept(&self) -> anyhow::Result<UpstreamPeer> {
        let (stream, _) = timeout(Duration::from_secs(10), self.listener.accept()).await??;
        let (read_half, write_half) = stream.into_split();
        Ok(UpstreamPeer {
            reader: BufReader::new(read_half),
            writer: write_half,
            nick: String::new(),
        })
    }

    /// Accept a connection and complete its registration.
    pub async fn accept_registered(&self) -> anyhow::Result<UpstreamPeer> {
        let mut peer = self.accept().await?;
        peer.register().await?;
        Ok(peer)
    }
}

impl UpstreamPeer {
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        let mut line = String::new();
        let read = timeout(Duration::from_secs(5), self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("bouncer closed the upstream connection");
        }
        line.trim_end()
            .parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error: {e}"))
    }

    /// Read until a message with `command` arrives.
    pub async fn recv_command(&mut self, command: &str) -> anyhow::Result<Message> {
        loop {
            let msg = self.recv().await?;
            if msg.command == command {
                return Ok(msg);
            }
        }
    }

    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\r\n").await?;
        Ok(())
    }

    /// Read NICK and USER, then send the welcome numeric. Capability
    /// negotiation is ignored, as a server without CAP support would.
    pub async fn register(&mut self) -> anyhow::Result<()> {
        let nick = self.recv_command("NICK").await?;
        self.nick = nick.param(0).unwrap_or_default().to_string();
        self.recv_command("USER").await?;
        let welcome = format!(":irc.test 001 {} :Welcome to the test network", self.nick);
        self.send_raw(&welcome).await?;
        self.send_raw(&format!(":irc.test 376 {} :End of MOTD", self.nick))
            .await
    }

    /// Answer a JOIN of `channel` with a full join burst.
    pub async fn join_burst(&mut self, channel: &str, topic: &str, others: &[&str]) -> anyhow::Result<()> {
        let nick = self.nick.clone();
        self.send_raw(&format!(":{nick}!u@test JOIN {channel}")).await?;
        self.send_raw(&format!(":irc.test 332 {nick} {channel} :{topic}"))
            .await?;
        let mut names = vec![format!("@{nick}")];
        names.extend(others.iter().map(|n| n.to_string()));
        self.send_raw(&format!(":irc.test 353 {nick} = {channel} :{}", names.join(" ")))
            .await?;
        self.send_raw(&format!(":irc.test 366 {nick} {channel} :End of /NAMES list"))
            .await
    }
}
