//! Test IRC client.
//!
//! Speaks raw IRC lines to the bouncer and asserts on what comes back.

use std::time::Duration;

use slbnc_proto::Message;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

/// A test IRC client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl TestClient {
    pub async fn connect(address: &str) -> anyhow::Result<Self> {
        let stream = TcpStream::connect(address).await?;
        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
        })
    }

    /// Send a raw IRC line.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        if !line.ends_with("\r\n") {
            self.writer.write_all(b"\r\n").await?;
        }
        self.writer.flush().await?;
        Ok(())
    }

    /// Receive a single message.
    pub async fn recv(&mut self) -> anyhow::Result<Message> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a message with a timeout. EOF is an error.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Message> {
        let mut line = String::new();
        let read = timeout(dur, self.reader.read_line(&mut line)).await??;
        if read == 0 {
            anyhow::bail!("connection closed");
        }
        line.trim_end()
            .parse::<Message>()
            .map_err(|e| anyhow::anyhow!("Parse error: {e}"))
    }

    /// Receive messages until the given predicate returns true.
    pub async fn recv_until<F>(&mut self, mut predicate: F) -> anyhow::Result<Vec<Message>>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut messages = Vec::new();
        loop {
            let msg = self.recv().await?;
            let done = predicate(&msg);
            messages.push(msg);
            if done {
                break;
            }
        }
        Ok(messages)
    }

    /// Receive messages until one with `command` arrives.
    pub async fn recv_command(&mut self, command: &str) -> anyhow::Result<Message> {
        let mut msgs = self.recv_until(|m| m.command == command).await?;
        msgs.pop()
            .ok_or_else(|| anyhow::anyhow!("no {command} received"))
    }

    /// Whether nothing arrives within `dur`.
    pub async fn is_quiet(&mut self, dur: Duration) -> bool {
        self.recv_timeout(dur).await.is_err()
    }

    /// Send PASS, NICK and USER without waiting for a reply.
    pub async fn login(&mut self, nick: &str, username: &str, password: &str) -> anyhow::Result<()> {
        self.send_raw(&format!("PASS {password}")).await?;
        self.send_raw(&format!("NICK {nick}")).await?;
        self.send_raw(&format!("USER {username} 0 * :Test {nick}"))
            .await
    }

    /// Log in and read the welcome burst up to the end of ISUPPORT.
    pub async fn register(&mut self, nick: &str, username: &str) -> anyhow::Result<Vec<Message>> {
        self.login(nick, username, super::PASSWORD).await?;
        let burst = self
            .recv_until(|m| m.command == "005" || m.command == "464")
            .await?;
        if burst.iter().any(|m| m.command == "464") {
            anyhow::bail!("Registration failed: password mismatch");
        }
        Ok(burst)
    }
}
