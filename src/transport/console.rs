//! JSON-lines console transport.
//!
//! Inbound messages are read one per line; outbound actions are written one
//! per line. Handy for piping the bot into another process or a shell.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::Mutex;
use tracing::warn;

use super::{InboundMessage, MessagingClient, OutboundAction};

type SharedWriter = Arc<Mutex<Box<dyn AsyncWrite + Send + Unpin>>>;

#[derive(Clone)]
pub struct ConsoleClient {
    out: SharedWriter,
}

impl ConsoleClient {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }

    pub fn new<W>(writer: W) -> Self
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    async fn emit(&self, action: &OutboundAction) -> Result<()> {
        let mut line = serde_json::to_string(action).context("Failed to encode action")?;
        line.push('\n');

        let mut out = self.out.lock().await;
        out.write_all(line.as_bytes())
            .await
            .context("Failed to write action")?;
        out.flush().await.context("Failed to flush action")?;
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for ConsoleClient {
    async fn send(&self, to: &str, text: &str) -> Result<()> {
        self.emit(&OutboundAction::Send {
            to: to.to_string(),
            text: text.to_string(),
        })
        .await
    }

    async fn reply(&self, to: &str, text: &str, quoted_id: &str) -> Result<()> {
        self.emit(&OutboundAction::Reply {
            to: to.to_string(),
            text: text.to_string(),
            quoted_id: quoted_id.to_string(),
        })
        .await
    }

    async fn set_typing(&self, chat_id: &str, on: bool) -> Result<()> {
        self.emit(&OutboundAction::Typing {
            chat_id: chat_id.to_string(),
            on,
        })
        .await
    }
}

/// Reads inbound messages, skipping blank and malformed lines
pub struct ConsoleReader<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> ConsoleReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
        }
    }

    /// Next message, or `None` at end of input
    pub async fn next_message(&mut self) -> Result<Option<InboundMessage>> {
        while let Some(line) = self
            .lines
            .next_line()
            .await
            .context("Failed to read inbound line")?
        {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<InboundMessage>(line) {
                Ok(message) => return Ok(Some(message)),
                Err(e) => warn!("Skipping malformed inbound line: {}", e),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_reader_skips_bad_lines() {
        let input = concat!(
            "\n",
            "not json\n",
            r#"{"chat_id":"6281","sender":"6281","body":"hello"}"#,
            "\n",
            r#"{"chat_id":"g1","sender":"6282","body":"!help","is_group":true}"#,
            "\n",
        );
        let mut reader = ConsoleReader::new(BufReader::new(input.as_bytes()));

        let first = reader.next_message().await.unwrap().unwrap();
        assert_eq!(first.body, "hello");
        let second = reader.next_message().await.unwrap().unwrap();
        assert!(second.is_group);
        assert!(reader.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_client_writes_json_lines() {
        let (writer, reader) = tokio::io::duplex(1024);
        let client = ConsoleClient::new(writer);

        client.send("6281", "hi").await.unwrap();
        client.reply("6281", "pong", "m1").await.unwrap();
        drop(client);

        let mut lines = BufReader::new(reader).lines();
        let first: OutboundAction =
            serde_json::from_str(&lines.next_line().await.unwrap().unwrap()).unwrap();
        assert_eq!(
            first,
            OutboundAction::Send {
                to: "6281".into(),
                text: "hi".into()
            }
        );
        let second = lines.next_line().await.unwrap().unwrap();
        assert!(second.contains(r#""quoted_id":"m1""#));
    }
}
