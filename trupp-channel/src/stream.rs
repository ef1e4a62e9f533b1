use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    ChannelName, Delivery, EventChannel, Frame, FrameError, Listener, Registry, read_frame,
    write_frame,
};

/// Outgoing frames buffered per connection.
const PEER_BUFFER: usize = 64;

/// Pause between connection attempts of [`run_tcp_client`].
pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

struct Peer {
    id: u64,
    tx: mpsc::Sender<Frame>,
}

/// Channel endpoint that talks to the counterpart process over a byte
/// stream.
///
/// Sends go to the currently attached peer, frames read from the peer are
/// dispatched to this endpoint's local listeners. Without a peer, sends
/// report [`Delivery::NoListener`].
#[derive(Clone)]
pub struct StreamChannel {
    registry: Arc<Registry>,
    peer: Arc<Mutex<Option<Peer>>>,
    next_peer: Arc<AtomicU64>,
}

impl StreamChannel {
    pub fn new() -> Self {
        Self {
            registry: Registry::new(),
            peer: Arc::new(Mutex::new(None)),
            next_peer: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.peer.lock().map(|p| p.is_some()).unwrap_or(false)
    }

    /// Use `stream` as the connection to the counterpart, replacing any
    /// previous one. The returned task ends when the connection closes.
    pub fn attach<S>(&self, stream: S, cancel: CancellationToken) -> JoinHandle<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let id = self.next_peer.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(PEER_BUFFER);

        match self.peer.lock() {
            Ok(mut slot) => {
                if slot.replace(Peer { id, tx }).is_some() {
                    debug!(peer = id, "Replacing previous peer connection");
                }
            }
            Err(e) => error!(error = %e, "Peer slot poisoned"),
        }

        let registry = Arc::clone(&self.registry);
        let peer = Arc::clone(&self.peer);

        tokio::spawn(async move {
            if let Err(e) = run_connection(stream, rx, registry, cancel, id).await {
                warn!(peer = id, error = %e, "Peer connection closed with error");
            }
            if let Ok(mut slot) = peer.lock()
                && slot.as_ref().is_some_and(|p| p.id == id)
            {
                *slot = None;
            }
        })
    }

    /// Let go of the current peer. Frames already queued are still written
    /// before its connection task ends.
    pub fn detach(&self) {
        if let Ok(mut slot) = self.peer.lock()
            && let Some(peer) = slot.take()
        {
            debug!(peer = peer.id, "Detaching peer connection");
        }
    }
}

impl Default for StreamChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel for StreamChannel {
    fn send(&self, name: ChannelName, payload: Vec<u8>) -> Delivery {
        let Ok(slot) = self.peer.lock() else {
            return Delivery::NoListener;
        };
        let Some(peer) = slot.as_ref() else {
            debug!(channel = %name, "No peer connected, dropping message");
            return Delivery::NoListener;
        };

        let frame = Frame {
            channel: name,
            payload,
        };
        match peer.tx.try_send(frame) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(channel = %name, "Peer is not keeping up, dropping message");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::NoListener,
        }
    }

    fn register(&self, name: ChannelName) -> Listener {
        self.registry.register(name)
    }
}

#[instrument(name = "peer", skip(stream, outgoing, registry, cancel))]
async fn run_connection<S>(
    stream: S,
    mut outgoing: mpsc::Receiver<Frame>,
    registry: Arc<Registry>,
    cancel: CancellationToken,
    id: u64,
) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (reader, writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut writer = BufWriter::new(writer);

    info!("Peer connected");

    // Reads run in their own task so a half-read frame is never cancelled
    // by the select below.
    let (incoming_tx, mut incoming) = mpsc::channel::<Result<Option<Frame>, FrameError>>(PEER_BUFFER);
    let read_task = tokio::spawn(async move {
        loop {
            let result = read_frame(&mut reader).await;
            let stop = match &result {
                Ok(None) => true,
                Ok(Some(_)) => false,
                Err(e) => !e.is_recoverable(),
            };
            if incoming_tx.send(result).await.is_err() || stop {
                break;
            }
        }
    });

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("Shutdown signal received");
                break Ok(());
            }
            frame = outgoing.recv() => {
                let Some(frame) = frame else {
                    debug!("Peer detached or superseded");
                    break Ok(());
                };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    break Err(e);
                }
            }
            read = incoming.recv() => {
                match read {
                    Some(Ok(Some(frame))) => {
                        let delivery = registry.dispatch(frame.channel, frame.payload);
                        debug!(channel = %frame.channel, ?delivery, "Frame received");
                    }
                    Some(Err(e)) if e.is_recoverable() => {
                        warn!(error = %e, "Dropping undecodable frame");
                    }
                    Some(Err(e)) => break Err(e),
                    Some(Ok(None)) | None => {
                        info!("Peer closed connection");
                        break Ok(());
                    }
                }
            }
        }
    };

    read_task.abort();
    result
}

/// Accept counterpart connections on `listener` until cancelled. Each new
/// connection replaces the previous one.
#[instrument(name = "channel_listener", skip_all)]
pub async fn serve_tcp(channel: StreamChannel, listener: TcpListener, cancel: CancellationToken) {
    info!("Waiting for counterpart connections");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Closing channel listener");
                break;
            }
            client = listener.accept() => {
                match client {
                    Ok((stream, addr)) => {
                        info!(%addr, "Counterpart connected");
                        channel.attach(stream, cancel.clone());
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        if is_transient_error(&e) {
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        } else {
                            break;
                        }
                    }
                }
            }
        }
    }
}

/// Keep a connection to the counterpart at `addr` until cancelled,
/// reconnecting after [`RECONNECT_DELAY`] whenever it is missing.
#[instrument(name = "channel_client", skip(channel, cancel))]
pub async fn run_tcp_client(channel: StreamChannel, addr: SocketAddr, cancel: CancellationToken) {
    loop {
        match TcpStream::connect(addr).await {
            Ok(stream) => {
                info!("Connected to counterpart");
                let connection = channel.attach(stream, cancel.clone());
                let _ = connection.await;
            }
            Err(e) => {
                debug!(error = %e, "Counterpart not reachable");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

fn is_transient_error(e: &std::io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        e.kind(),
        ConnectionRefused | ConnectionAborted | ConnectionReset | OutOfMemory | Other
    )
}
