use crate::transfer::{FileSink, Progress, ReceivedFile};
use bytes::{BufMut, Bytes, BytesMut};
use dropmesh_core::{ControlFrame, Frame, PeerId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum ReceptionEvent {
    Started {
        peer_id: PeerId,
        name: String,
        size: u64,
    },
    Progress {
        peer_id: PeerId,
        name: String,
        progress: Progress,
    },
    Completed {
        peer_id: PeerId,
        name: String,
        size: u64,
        path: PathBuf,
    },
    /// The file arrived but could not be stored.
    Failed {
        peer_id: PeerId,
        name: String,
        reason: String,
    },
    /// The session ended before `eof`.
    Aborted {
        peer_id: PeerId,
        name: String,
    },
    Clipboard {
        peer_id: PeerId,
        text: String,
    },
}

struct Session {
    name: String,
    mime: String,
    total: u64,
    transferred: u64,
    started: Instant,
    chunks: Vec<Bytes>,
}

impl Session {
    fn assemble(self) -> ReceivedFile {
        let mut data = BytesMut::with_capacity(self.transferred as usize);
        for chunk in self.chunks {
            data.put(chunk);
        }
        ReceivedFile {
            name: self.name,
            mime: self.mime,
            data: data.freeze(),
        }
    }
}

/// Rebuilds files from the frames of each open channel.
///
/// Holds at most one session per remote peer. Frames arrive in order and
/// exactly once, so chunks are appended as they come.
pub struct ReceptionAssembler {
    sink: Arc<dyn FileSink>,
    sessions: HashMap<PeerId, Session>,
    clipboard: Option<String>,
}

impl ReceptionAssembler {
    pub fn new(sink: Arc<dyn FileSink>) -> Self {
        Self {
            sink,
            sessions: HashMap::new(),
            clipboard: None,
        }
    }

    /// Latest clipboard text received from any peer.
    pub fn clipboard(&self) -> Option<&str> {
        self.clipboard.as_deref()
    }

    pub fn is_receiving(&self, peer_id: &PeerId) -> bool {
        self.sessions.contains_key(peer_id)
    }

    pub async fn handle_frame(&mut self, peer_id: PeerId, frame: Frame) -> Option<ReceptionEvent> {
        match frame {
            Frame::Control(ControlFrame::Meta { name, size, mime }) => {
                Some(self.start(peer_id, name, size, mime))
            }
            Frame::Data(chunk) => self.append(peer_id, chunk),
            Frame::Control(ControlFrame::Eof) => self.finish(peer_id).await,
            Frame::Control(ControlFrame::Clipboard { text }) => {
                debug!("Clipboard update from {} ({} chars)", peer_id, text.len());
                self.clipboard = Some(text.clone());
                Some(ReceptionEvent::Clipboard { peer_id, text })
            }
        }
    }

    /// Drop the in-flight session of a peer whose link went away.
    pub fn peer_closed(&mut self, peer_id: &PeerId) -> Option<ReceptionEvent> {
        let session = self.sessions.remove(peer_id)?;
        warn!(
            "Reception of {} from {} aborted at {}/{} bytes",
            session.name, peer_id, session.transferred, session.total
        );
        Some(ReceptionEvent::Aborted {
            peer_id: peer_id.clone(),
            name: session.name,
        })
    }

    fn start(&mut self, peer_id: PeerId, name: String, size: u64, mime: String) -> ReceptionEvent {
        info!("Receiving {} ({} bytes) from {}", name, size, peer_id);
        let session = Session {
            name: name.clone(),
            mime,
            total: size,
            transferred: 0,
            started: Instant::now(),
            chunks: Vec::new(),
        };
        if let Some(previous) = self.sessions.insert(peer_id.clone(), session) {
            warn!(
                "Discarding incomplete {} from {} for a new file",
                previous.name, peer_id
            );
        }
        ReceptionEvent::Started {
            peer_id,
            name,
            size,
        }
    }

    fn append(&mut self, peer_id: PeerId, chunk: Bytes) -> Option<ReceptionEvent> {
        let Some(session) = self.sessions.get_mut(&peer_id) else {
            debug!("Dropping {} bytes from {} outside a file", chunk.len(), peer_id);
            return None;
        };

        // Bytes past the announced size are never buffered.
        let room = session.total - session.transferred;
        let chunk = if chunk.len() as u64 > room {
            warn!(
                "{} from {} overruns its {} announced bytes, dropping {} extra",
                session.name,
                peer_id,
                session.total,
                chunk.len() as u64 - room
            );
            chunk.slice(..room as usize)
        } else {
            chunk
        };
        if chunk.is_empty() {
            return None;
        }

        session.transferred += chunk.len() as u64;
        session.chunks.push(chunk);
        let progress = Progress::compute(
            session.transferred,
            session.total,
            session.started.elapsed(),
        );

        Some(ReceptionEvent::Progress {
            peer_id,
            name: session.name.clone(),
            progress,
        })
    }

    async fn finish(&mut self, peer_id: PeerId) -> Option<ReceptionEvent> {
        let Some(session) = self.sessions.remove(&peer_id) else {
            debug!("Stray eof from {}", peer_id);
            return None;
        };
        if session.transferred != session.total {
            warn!(
                "{} from {} announced {} bytes but {} arrived",
                session.name, peer_id, session.total, session.transferred
            );
        }

        let file = session.assemble();
        let name = file.name.clone();
        let size = file.data.len() as u64;
        match self.sink.store(&file).await {
            Ok(path) => Some(ReceptionEvent::Completed {
                peer_id,
                name,
                size,
                path,
            }),
            Err(e) => {
                warn!("Could not store {} from {}: {}", name, peer_id, e);
                Some(ReceptionEvent::Failed {
                    peer_id,
                    name,
                    reason: e.to_string(),
                })
            }
        }
    }
}
