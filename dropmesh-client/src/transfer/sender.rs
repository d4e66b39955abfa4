use crate::config::ClientConfig;
use crate::peer::OpenChannels;
use crate::transfer::Progress;
use crate::transport::PeerTransport;
use async_trait::async_trait;
use bytes::Bytes;
use dropmesh_core::{ControlFrame, Frame, FrameError, PeerId, RoomId, RoomState};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Why a send was refused before any frame went out.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("not allowed to send in room {0}")]
    NotPermitted(RoomId),

    #[error("room {0} is busy with another transfer")]
    RoomBusy(RoomId),

    #[error("no open peers to send to")]
    NoTargets,

    #[error("a transfer is already running")]
    AlreadySending,

    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Flips the room's shared busy flag.
#[async_trait]
pub trait RoomControl: Send + Sync {
    async fn set_busy(&self, room_id: &RoomId, busy: bool);
}

#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub chunk_size: usize,
    pub high_water_mark: usize,
    pub backpressure_poll: Duration,
    pub drain_timeout: Duration,
}

impl From<&ClientConfig> for TransferSettings {
    fn from(config: &ClientConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            high_water_mark: config.high_water_mark,
            backpressure_poll: config.backpressure_poll,
            drain_timeout: config.drain_timeout,
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from(&ClientConfig::default())
    }
}

/// A file about to be sent.
pub struct OutgoingFile<R> {
    pub name: String,
    pub size: u64,
    pub mime: String,
    pub reader: R,
}

impl<R> OutgoingFile<R> {
    /// Wrap a reader, guessing the MIME type from `name`.
    pub fn new(name: impl Into<String>, size: u64, reader: R) -> Self {
        let name = name.into();
        let mime = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_owned();
        Self {
            name,
            size,
            mime,
            reader,
        }
    }
}

impl OutgoingFile<tokio::fs::File> {
    pub async fn open(path: &Path) -> io::Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        let size = file.metadata().await?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "file".to_owned());
        Ok(Self::new(name, size, file))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStatus {
    Completed,
    /// Every target closed before the end of the file.
    Aborted,
    /// The source could not be read to the end.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct SendReport {
    pub name: String,
    pub size: u64,
    /// File bytes written to the targets.
    pub sent: u64,
    /// Targets that were still open when `eof` went out.
    pub delivered: Vec<PeerId>,
    pub status: SendStatus,
}

struct Target {
    peer_id: PeerId,
    transport: Arc<dyn PeerTransport>,
}

/// Streams files to a set of open links.
#[derive(Clone)]
pub struct TransferEngine {
    local_id: PeerId,
    channels: OpenChannels,
    room: Arc<dyn RoomControl>,
    settings: TransferSettings,
    sending: Arc<AtomicBool>,
}

impl TransferEngine {
    pub fn new(
        local_id: PeerId,
        channels: OpenChannels,
        room: Arc<dyn RoomControl>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            local_id,
            channels,
            room,
            settings,
            sending: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_sending(&self) -> bool {
        self.sending.load(Ordering::SeqCst)
    }

    /// Send `file` to `targets`.
    ///
    /// Refuses up front when this peer may not send, the room is busy, or no
    /// target is open. Once started, the room is marked busy until the loop
    /// ends, whatever the outcome. Returns only after every remaining target
    /// has flushed its buffer, or after `drain_timeout`.
    pub async fn send_file<R, F>(
        &self,
        room: &RoomState,
        targets: &[PeerId],
        file: OutgoingFile<R>,
        mut on_progress: F,
    ) -> Result<SendReport, SendError>
    where
        R: AsyncRead + Unpin + Send,
        F: FnMut(Progress) + Send,
    {
        if !room.can_send(&self.local_id) {
            return Err(SendError::NotPermitted(room.id.clone()));
        }
        if room.is_busy {
            return Err(SendError::RoomBusy(room.id.clone()));
        }

        let mut targets: Vec<Target> = targets
            .iter()
            .filter(|peer_id| **peer_id != self.local_id)
            .filter_map(|peer_id| {
                let transport = self.channels.get(peer_id)?;
                transport.is_open().then(|| Target {
                    peer_id: peer_id.clone(),
                    transport,
                })
            })
            .collect();
        if targets.is_empty() {
            return Err(SendError::NoTargets);
        }
        let eof = Frame::control(ControlFrame::Eof).encode()?;
        if self.sending.swap(true, Ordering::SeqCst) {
            return Err(SendError::AlreadySending);
        }

        info!(
            "Sending {} ({} bytes) to {} peer(s)",
            file.name,
            file.size,
            targets.len()
        );
        self.room.set_busy(&room.id, true).await;

        let name = file.name.clone();
        let size = file.size;
        let (sent, status) = self.stream(&mut targets, file, &mut on_progress).await;

        self.fan_out(&mut targets, &eof).await;
        self.drain(&targets).await;
        let delivered = targets.into_iter().map(|t| t.peer_id).collect();

        self.room.set_busy(&room.id, false).await;
        self.sending.store(false, Ordering::SeqCst);

        match &status {
            SendStatus::Completed => info!("Finished sending {}", name),
            SendStatus::Aborted => warn!("Sending {} aborted: no peers left", name),
            SendStatus::Failed(reason) => warn!("Sending {} failed: {}", name, reason),
        }
        Ok(SendReport {
            name,
            size,
            sent,
            delivered,
            status,
        })
    }

    /// Broadcast clipboard text to every open link. Returns how many peers
    /// accepted it.
    pub async fn send_clipboard(&self, text: impl Into<String>) -> Result<usize, SendError> {
        let frame = Frame::control(ControlFrame::Clipboard { text: text.into() }).encode()?;
        Ok(self.channels.broadcast(frame).await)
    }

    async fn stream<R, F>(
        &self,
        targets: &mut Vec<Target>,
        file: OutgoingFile<R>,
        on_progress: &mut F,
    ) -> (u64, SendStatus)
    where
        R: AsyncRead + Unpin + Send,
        F: FnMut(Progress) + Send,
    {
        let meta = ControlFrame::Meta {
            name: file.name,
            size: file.size,
            mime: file.mime,
        };
        let meta = match Frame::control(meta).encode() {
            Ok(bytes) => bytes,
            Err(e) => return (0, SendStatus::Failed(e.to_string())),
        };
        self.fan_out(targets, &meta).await;

        let total = file.size;
        let mut reader = file.reader.take(total);
        let mut buf = vec![0u8; self.settings.chunk_size.max(1)];
        let started = Instant::now();
        let mut sent = 0u64;

        loop {
            if targets.is_empty() {
                return (sent, SendStatus::Aborted);
            }

            let n = match read_chunk(&mut reader, &mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => return (sent, SendStatus::Failed(e.to_string())),
            };
            let chunk = match Frame::data(Bytes::copy_from_slice(&buf[..n])).encode() {
                Ok(bytes) => bytes,
                Err(e) => return (sent, SendStatus::Failed(e.to_string())),
            };

            self.fan_out(targets, &chunk).await;
            sent += n as u64;
            on_progress(Progress::compute(sent, total, started.elapsed()));
        }

        if sent < total {
            warn!("Source ended after {} of {} bytes", sent, total);
        }
        if targets.is_empty() {
            (sent, SendStatus::Aborted)
        } else {
            (sent, SendStatus::Completed)
        }
    }

    /// Write one frame to every target still open, dropping the rest.
    async fn fan_out(&self, targets: &mut Vec<Target>, frame: &Bytes) {
        let mut kept = Vec::with_capacity(targets.len());
        for target in targets.drain(..) {
            if !self.wait_for_capacity(&target).await {
                info!("{} closed, dropping it from the transfer", target.peer_id);
                continue;
            }
            match target.transport.send(frame.clone()).await {
                Ok(()) => kept.push(target),
                Err(e) => warn!("Send to {} failed, dropping it: {}", target.peer_id, e),
            }
        }
        *targets = kept;
    }

    /// Poll until the target's buffer is at or under the high-water mark.
    /// Returns false if the target closes meanwhile.
    async fn wait_for_capacity(&self, target: &Target) -> bool {
        let mut logged = false;
        loop {
            if !self.is_live(target) {
                return false;
            }
            let buffered = target.transport.buffered_amount().await;
            if buffered <= self.settings.high_water_mark {
                return true;
            }
            if !logged {
                debug!(
                    "Backpressure on {}: {} bytes buffered",
                    target.peer_id, buffered
                );
                logged = true;
            }
            tokio::time::sleep(self.settings.backpressure_poll).await;
        }
    }

    /// Poll until every live target reports an empty buffer.
    async fn drain(&self, targets: &[Target]) {
        let deadline = Instant::now() + self.settings.drain_timeout;
        for target in targets {
            while self.is_live(target) && target.transport.buffered_amount().await > 0 {
                if Instant::now() >= deadline {
                    warn!(
                        "{} still buffering after {:?}, giving up on the drain",
                        target.peer_id, self.settings.drain_timeout
                    );
                    return;
                }
                tokio::time::sleep(self.settings.backpressure_poll).await;
            }
        }
    }

    fn is_live(&self, target: &Target) -> bool {
        self.channels.contains(&target.peer_id) && target.transport.is_open()
    }
}

/// Fill `buf` as far as the source allows; 0 means end of input.
async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
