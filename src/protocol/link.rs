//! Command frames over TCP.
//!
//! The coordinator listens on [`TCP_COMMAND_PORT`](crate::config::TCP_COMMAND_PORT)
//! and the single peer connects to it. Frames are written back to back with
//! no delimiter; the receiver reads exactly [`FRAME_SIZE`] bytes per frame.
//!
//! A frame with an unknown action is dropped on its own and the connection
//! stays up. A stream that ends in the middle of a frame reports
//! [`DecodeError::WrongLength`].

use super::frame::{decode, encode, CommandFrame, DecodeError, FRAME_SIZE};
use log::{debug, info, warn};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Connection timeout for the peer.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read one frame from a byte stream.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<CommandFrame>, LinkError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; FRAME_SIZE];
    let mut filled = 0;

    while filled < FRAME_SIZE {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(LinkError::Decode(DecodeError::WrongLength {
                expected: FRAME_SIZE,
                actual: filled,
            }));
        }
        filled += n;
    }

    Ok(Some(decode(&buf)?))
}

/// Write one frame to a byte stream.
pub async fn write_frame<W>(writer: &mut W, frame: &CommandFrame) -> Result<(), LinkError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(frame)).await?;
    writer.flush().await?;
    Ok(())
}

/// Coordinator side of the command link.
///
/// Serves one peer at a time, matching the one-station network.
pub struct CommandServer {
    listener: TcpListener,
    cancel: CancellationToken,
}

impl CommandServer {
    /// Bind the command port.
    pub async fn bind(addr: SocketAddr) -> Result<Self, LinkError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Command server listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            cancel: CancellationToken::new(),
        })
    }

    /// Address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops [`CommandServer::serve`] when cancelled.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Accept the peer and forward every decoded frame to `frames`.
    ///
    /// Runs until cancelled or until the receiving side of `frames` is dropped.
    pub async fn serve(self, frames: mpsc::Sender<CommandFrame>) -> Result<(), LinkError> {
        loop {
            let (stream, peer) = tokio::select! {
                _ = self.cancel.cancelled() => break,
                accepted = self.listener.accept() => accepted?,
            };

            info!("Peer connected from {}", peer);
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to disable Nagle's algorithm: {}", e);
            }

            match self.serve_peer(stream, &frames).await {
                PeerOutcome::Disconnected => info!("Peer {} disconnected", peer),
                PeerOutcome::Cancelled => break,
                PeerOutcome::ReceiverGone => {
                    info!("Frame receiver dropped, stopping command server");
                    break;
                }
            }
        }

        debug!("Command server stopped");
        Ok(())
    }

    async fn serve_peer(
        &self,
        mut stream: TcpStream,
        frames: &mpsc::Sender<CommandFrame>,
    ) -> PeerOutcome {
        loop {
            let result = tokio::select! {
                _ = self.cancel.cancelled() => return PeerOutcome::Cancelled,
                result = read_frame(&mut stream) => result,
            };

            match result {
                Ok(Some(frame)) => {
                    debug!("Received command: {}", frame);
                    if frames.send(frame).await.is_err() {
                        return PeerOutcome::ReceiverGone;
                    }
                }
                Ok(None) => return PeerOutcome::Disconnected,
                Err(LinkError::Decode(e @ DecodeError::InvalidAction(_))) => {
                    warn!("Dropping frame: {}", e);
                }
                Err(e) => {
                    warn!("Command link error: {}", e);
                    return PeerOutcome::Disconnected;
                }
            }
        }
    }
}

enum PeerOutcome {
    Disconnected,
    Cancelled,
    ReceiverGone,
}

/// Peer side of the command link.
pub struct CommandClient {
    stream: TcpStream,
    peer: SocketAddr,
}

impl CommandClient {
    /// Connect to the coordinator.
    pub async fn connect(addr: SocketAddr) -> Result<Self, LinkError> {
        info!("Connecting to coordinator at {}", addr);

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| LinkError::Timeout)??;

        if let Err(e) = stream.set_nodelay(true) {
            warn!("Failed to disable Nagle's algorithm: {}", e);
        }

        info!("Connected to coordinator at {}", addr);
        Ok(Self { stream, peer: addr })
    }

    /// Send a command to the coordinator.
    pub async fn send(&mut self, frame: &CommandFrame) -> Result<(), LinkError> {
        debug!("Sending command: {}", frame);
        write_frame(&mut self.stream, frame).await
    }

    /// Address of the coordinator.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl std::fmt::Debug for CommandClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandClient")
            .field("peer", &self.peer)
            .finish()
    }
}

/// Command link errors.
#[derive(Debug)]
pub enum LinkError {
    /// Socket I/O failed.
    Io(io::Error),
    /// A received frame was malformed.
    Decode(DecodeError),
    /// Connecting to the coordinator timed out.
    Timeout,
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Decode(e) => write!(f, "decode error: {}", e),
            Self::Timeout => write!(f, "connection timed out"),
        }
    }
}

impl std::error::Error for LinkError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decode(e) => Some(e),
            Self::Timeout => None,
        }
    }
}

impl From<io::Error> for LinkError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<DecodeError> for LinkError {
    fn from(e: DecodeError) -> Self {
        Self::Decode(e)
    }
}
