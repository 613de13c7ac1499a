//! Output sinks for exported tables.
//!
//! A sink hands out one entry writer per table. The directory sink writes
//! `<dir>/<table>.json` files; the archive sink spools each entry to an
//! anonymous temporary file and appends it to a single gzip-compressed tar
//! file when the entry is closed.

use std::fs::{self, File};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, info};

use crate::error::Result;

/// Destination of exported table files.
pub enum Sink {
    /// One file per entry inside a directory.
    Directory { root: PathBuf },
    /// One `.tar.gz` archive holding every entry.
    Archive {
        path: PathBuf,
        builder: tar::Builder<GzEncoder<File>>,
    },
}

/// Writer for one entry of a [`Sink`].
pub enum EntryWriter {
    File {
        name: String,
        writer: BufWriter<File>,
    },
    Spooled {
        name: String,
        writer: BufWriter<File>,
    },
}

impl Write for EntryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            EntryWriter::File { writer, .. } | EntryWriter::Spooled { writer, .. } => {
                writer.write(buf)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            EntryWriter::File { writer, .. } | EntryWriter::Spooled { writer, .. } => {
                writer.flush()
            }
        }
    }
}

impl Sink {
    /// Open a directory sink, creating the directory if needed.
    pub fn directory(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Sink::Directory { root })
    }

    /// Open an archive sink writing to `path`.
    pub fn archive(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        let builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
        Ok(Sink::Archive { path, builder })
    }

    /// Open the sink for an export target.
    ///
    /// With `compress`, a target without an extension gets `.tar.gz` appended.
    pub fn open(output: &Path, compress: bool) -> Result<Self> {
        if !compress {
            return Self::directory(output);
        }
        if output.extension().is_some() {
            Self::archive(output)
        } else {
            let mut name = output.as_os_str().to_owned();
            name.push(".tar.gz");
            Self::archive(PathBuf::from(name))
        }
    }

    /// Where the sink writes.
    pub fn location(&self) -> &Path {
        match self {
            Sink::Directory { root } => root,
            Sink::Archive { path, .. } => path,
        }
    }

    /// Start a new entry.
    pub fn create_entry(&mut self, name: &str) -> Result<EntryWriter> {
        match self {
            Sink::Directory { root } => {
                let file = File::create(root.join(name))?;
                Ok(EntryWriter::File {
                    name: name.to_string(),
                    writer: BufWriter::new(file),
                })
            }
            Sink::Archive { .. } => Ok(EntryWriter::Spooled {
                name: name.to_string(),
                writer: BufWriter::new(tempfile::tempfile()?),
            }),
        }
    }

    /// Complete an entry, making its content durable in the sink.
    pub fn close_entry(&mut self, entry: EntryWriter) -> Result<()> {
        match (self, entry) {
            (_, EntryWriter::File { name, mut writer }) => {
                writer.flush()?;
                debug!("Closed entry {}", name);
            }
            (Sink::Archive { builder, .. }, EntryWriter::Spooled { name, writer }) => {
                let mut spool = writer.into_inner().map_err(|e| e.into_error())?;
                let size = spool.metadata()?.len();
                spool.seek(SeekFrom::Start(0))?;

                let mut header = tar::Header::new_gnu();
                header.set_size(size);
                header.set_mode(0o644);
                header.set_mtime(
                    SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0),
                );
                builder.append_data(&mut header, &name, spool)?;
                debug!("Added {} ({} bytes) to archive", name, size);
            }
            (Sink::Directory { root }, EntryWriter::Spooled { name, writer }) => {
                let mut spool = writer.into_inner().map_err(|e| e.into_error())?;
                spool.seek(SeekFrom::Start(0))?;
                io::copy(&mut spool, &mut File::create(root.join(&name))?)?;
            }
        }
        Ok(())
    }

    /// Finish the sink, returning where it was written.
    pub fn finish(self) -> Result<PathBuf> {
        match self {
            Sink::Directory { root } => Ok(root),
            Sink::Archive { path, builder } => {
                let encoder = builder.into_inner()?;
                let file = encoder.finish()?;
                file.sync_all()?;
                info!("Wrote archive {}", path.display());
                Ok(path)
            }
        }
    }
}
