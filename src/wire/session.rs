use anyhow::Result;
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};

use super::message::{read_frame, write_frame, Command, RequestFrame, Response, ResponseFrame};

/// The client half of the persistent channel to one peer.
///
/// Requests carry a correlation id, so any number of asks can be in flight on
/// the same connection; a background read loop routes each response frame back
/// to its waiting caller. When the connection drops, every pending ask fails
/// and the session reports itself closed; the membership layer derives peer
/// reachability from that.
pub struct WireSession {
    peer: SocketAddr,
    writer: Mutex<OwnedWriteHalf>,
    pending: Arc<DashMap<u64, oneshot::Sender<Response>>>,
    next_id: AtomicU64,
    closed: Arc<AtomicBool>,
}

impl WireSession {
    /// Connects to a peer and spawns the response read loop.
    pub async fn connect(peer: SocketAddr) -> Result<Arc<Self>> {
        let stream = TcpStream::connect(peer).await?;
        let (reader, writer) = stream.into_split();

        let session = Arc::new(Self {
            peer,
            writer: Mutex::new(writer),
            pending: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            closed: Arc::new(AtomicBool::new(false)),
        });

        let pending = session.pending.clone();
        let closed = session.closed.clone();
        tokio::spawn(async move {
            Self::read_loop(peer, reader, pending, closed).await;
        });

        Ok(session)
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends a command and waits for its response, up to `timeout`.
    /// Expiry or a dropped connection surfaces as an error, which callers
    /// fold into the peer-unreachable case.
    pub async fn ask(&self, command: Command, timeout: Duration) -> Result<Response> {
        if self.is_closed() {
            return Err(anyhow::anyhow!("session to {} is closed", self.peer));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);

        let frame = RequestFrame { id, command };
        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = write_frame(&mut *writer, &frame).await {
                self.pending.remove(&id);
                return Err(e);
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Read loop dropped our sender: connection went away
                Err(anyhow::anyhow!("connection to {} lost", self.peer))
            }
            Err(_) => {
                self.pending.remove(&id);
                Err(anyhow::anyhow!("request to {} timed out", self.peer))
            }
        }
    }

    async fn read_loop(
        peer: SocketAddr,
        mut reader: OwnedReadHalf,
        pending: Arc<DashMap<u64, oneshot::Sender<Response>>>,
        closed: Arc<AtomicBool>,
    ) {
        loop {
            match read_frame::<ResponseFrame, _>(&mut reader).await {
                Ok(frame) => {
                    if let Some((_, tx)) = pending.remove(&frame.id) {
                        // Receiver may have timed out already; that's fine
                        let _ = tx.send(frame.response);
                    } else {
                        tracing::warn!("Unmatched response id {} from {}", frame.id, peer);
                    }
                }
                Err(e) => {
                    tracing::debug!("Session to {} closed: {}", peer, e);
                    break;
                }
            }
        }

        closed.store(true, Ordering::SeqCst);
        // Dropping the senders fails every pending ask
        pending.clear();
    }
}
