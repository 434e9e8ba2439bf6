//! Line-delimited stream transport for JSON-RPC messages.

use crate::error::{McpError, ProtocolError, Result};
use crate::protocol::types::{JsonRpcRequest, JsonRpcResponse, Message};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, Stdin, Stdout};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

/// Transport trait for MCP communication.
///
/// `read_message` returning `Ok(None)` means the channel reached clean EOF.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn read_message(&self) -> Result<Option<Message>>;
    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()>;
}

/// Newline-delimited JSON transport over a bidirectional byte channel.
///
/// Generic over the underlying reader/writer; [`StdioTransport`] is the
/// stdin/stdout instance used by the default serving mode.
pub struct StreamTransport<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
}

/// Stream transport bound to the process's standard streams.
pub type StdioTransport = StreamTransport<Stdin, Stdout>;

impl StdioTransport {
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl<R, W> StreamTransport<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
        }
    }

    /// Read the next non-empty line. `None` on EOF.
    async fn read_line(&self) -> Result<Option<String>> {
        let mut reader = self.reader.lock().await;
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => return Ok(None),
                Ok(_) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    trace!("Received line: {}", line);
                    return Ok(Some(line.to_string()));
                }
                Err(e) => {
                    error!("Error reading from transport: {}", e);
                    return Err(McpError::Io(e));
                }
            }
        }
    }

    async fn write_line(&self, content: &str) -> Result<()> {
        let mut writer = self.writer.lock().await;
        trace!("Sending line: {}", content);
        writer.write_all(content.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Send + Unpin,
    W: AsyncWrite + Send + Unpin,
{
    async fn read_message(&self) -> Result<Option<Message>> {
        let Some(line) = self.read_line().await? else {
            return Ok(None);
        };

        // Try to parse as request first, then as response
        match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => {
                debug!("Received request: method={}", request.method);
                Ok(Some(Message::Request(request)))
            }
            Err(_) => match serde_json::from_str::<JsonRpcResponse>(&line) {
                Ok(response) => {
                    debug!("Received response: id={:?}", response.id);
                    Ok(Some(Message::Response(response)))
                }
                Err(e) => {
                    error!("Failed to parse message: {}", e);
                    Err(McpError::Protocol(ProtocolError::ParseError))
                }
            },
        }
    }

    async fn write_response(&self, response: &JsonRpcResponse) -> Result<()> {
        let json = serde_json::to_string(response)?;
        debug!("Sending response: id={:?}", response.id);
        self.write_line(&json).await
    }
}
