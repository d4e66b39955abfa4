use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::info;

const FALLBACK_NAME: &str = "download";

/// A fully reassembled file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFile {
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

/// Where completed files end up.
#[async_trait]
pub trait FileSink: Send + Sync {
    /// Persist `file`, returning where it was written.
    async fn store(&self, file: &ReceivedFile) -> io::Result<PathBuf>;
}

/// Writes files into one directory without overwriting anything.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// Last path component of an announced name; senders do not choose
/// directories.
fn sanitize(name: &str) -> String {
    let unified = name.replace('\\', "/");
    match unified.rsplit('/').next().map(str::trim) {
        Some(base) if !base.is_empty() && base != "." && base != ".." => base.to_owned(),
        _ => FALLBACK_NAME.to_owned(),
    }
}

/// `report.pdf`, `report (1).pdf`, `report (2).pdf`, ...
fn candidate_name(base: &str, attempt: u32) -> String {
    if attempt == 0 {
        return base.to_owned();
    }
    match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem} ({attempt}).{ext}"),
        _ => format!("{base} ({attempt})"),
    }
}

#[async_trait]
impl FileSink for DirectorySink {
    async fn store(&self, file: &ReceivedFile) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let base = sanitize(&file.name);

        let mut attempt = 0;
        loop {
            let path = self.dir.join(candidate_name(&base, attempt));
            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(mut out) => {
                    out.write_all(&file.data).await?;
                    out.flush().await?;
                    info!("Saved {} ({} bytes)", path.display(), file.data.len());
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }
}
