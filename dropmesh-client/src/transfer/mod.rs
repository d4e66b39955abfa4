mod file_sink;
mod progress;
mod receiver;
mod sender;

pub use file_sink::{DirectorySink, FileSink, ReceivedFile};
pub use progress::{MIN_ELAPSED_SECS, Progress};
pub use receiver::{ReceptionAssembler, ReceptionEvent};
pub use sender::{
    OutgoingFile, RoomControl, SendError, SendReport, SendStatus, TransferEngine, TransferSettings,
};
