//! CLI channel — stdin/stdout dialogue.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin, Stdout};

use crate::channels::{Channel, StatusUpdate};
use crate::error::ChannelError;

/// Reads answers from stdin, writes dialogue to stdout and status to stderr.
pub struct CliChannel {
    stdin: BufReader<Stdin>,
    stdout: Stdout,
}

impl CliChannel {
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
            stdout: tokio::io::stdout(),
        }
    }

    async fn write(&mut self, text: &str) -> Result<(), ChannelError> {
        let send_failed = |e: std::io::Error| ChannelError::SendFailed {
            name: "cli".to_string(),
            reason: e.to_string(),
        };
        self.stdout
            .write_all(text.as_bytes())
            .await
            .map_err(send_failed)?;
        self.stdout.flush().await.map_err(send_failed)
    }
}

/// Read one line, replacing bytes that are not valid UTF-8.
async fn read_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> std::io::Result<Option<String>> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
        return Ok(None);
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

impl Default for CliChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn ask(&mut self, prompt: &str) -> Result<Option<String>, ChannelError> {
        self.write(prompt).await?;
        match read_line_lossy(&mut self.stdin).await {
            Ok(line) => Ok(line.map(|l| l.trim().to_string())), // None on EOF
            Err(e) => Err(ChannelError::ReadFailed {
                name: "cli".to_string(),
                reason: e.to_string(),
            }),
        }
    }

    async fn say(&mut self, text: &str) -> Result<(), ChannelError> {
        self.write(&format!("{text}\n")).await
    }

    async fn send_status(&mut self, status: StatusUpdate) -> Result<(), ChannelError> {
        match status {
            StatusUpdate::Thinking(msg) => eprintln!("⏳ {}", msg),
            StatusUpdate::Verifying(msg) => eprintln!("🔎 {}", msg),
            StatusUpdate::Warning(msg) => eprintln!("⚠️  {}", msg),
            StatusUpdate::Status(msg) => eprintln!("ℹ️  {}", msg),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_utf8_line_is_still_read() {
        let mut input: &[u8] = b"hello\n\xff\xfeok\nlast";

        assert_eq!(read_line_lossy(&mut input).await.unwrap().as_deref(), Some("hello\n"));
        let garbled = read_line_lossy(&mut input).await.unwrap().unwrap();
        assert_eq!(garbled, "\u{FFFD}\u{FFFD}ok\n");
        assert_eq!(read_line_lossy(&mut input).await.unwrap().as_deref(), Some("last"));
        assert_eq!(read_line_lossy(&mut input).await.unwrap(), None);
    }
}
