use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Frame one event as `[u32 len][bincode payload][u32 crc32]`, little endian.
fn encode_frame(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc32fast::hash(&payload).to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` means the log ended (cleanly or mid-frame).
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Decode the next frame. `None` on end of log, truncated tail, bad CRC or bad payload.
fn decode_frame(reader: &mut impl Read) -> io::Result<Option<Event>> {
    let mut len_buf = [0u8; 4];
    if !read_or_eof(reader, &mut len_buf)? {
        return Ok(None);
    }
    let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
    if !read_or_eof(reader, &mut payload)? {
        return Ok(None);
    }
    let mut crc_buf = [0u8; 4];
    if !read_or_eof(reader, &mut crc_buf)? {
        return Ok(None);
    }
    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        return Ok(None);
    }
    Ok(bincode::deserialize::<Event>(&payload).ok())
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// Test-only I/O failures.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct Faults {
    /// Write only this many pending bytes, then fail the flush.
    pub write_limit: Option<usize>,
    /// Fail the truncation that undoes a failed flush.
    pub rollback: bool,
}

/// Append-only reservation log.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`.
/// Every committed lifecycle transition is one frame. A crash can leave at
/// most one partial frame at the tail; replay stops there.
///
/// Appends are staged in memory and reach the file only in `flush_sync`.
/// A failed flush truncates the file back to its last committed length, so
/// a batch is durable in full or not at all. If that truncation fails too
/// the log is poisoned and refuses further appends until a compaction
/// rewrites it.
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Encoded frames not yet written.
    pending: Vec<u8>,
    pending_events: u64,
    /// File length after the last successful flush.
    committed_len: u64,
    poisoned: bool,
    appends_since_compact: u64,
    #[cfg(test)]
    pub(crate) faults: Faults,
}

impl Wal {
    /// Open (or create) the WAL file at `path`. Appends go after the existing content.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = open_append(path)?;
        let committed_len = file.metadata()?.len();
        Ok(Self {
            file,
            path: path.to_path_buf(),
            pending: Vec::new(),
            pending_events: 0,
            committed_len,
            poisoned: false,
            appends_since_compact: 0,
            #[cfg(test)]
            faults: Faults::default(),
        })
    }

    /// Append a single event and fsync.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Stage one event. Nothing touches the file until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        self.check_poisoned()?;
        encode_frame(&mut self.pending, event)?;
        self.pending_events += 1;
        Ok(())
    }

    /// Drop every staged event without writing it.
    pub fn discard_buffered(&mut self) {
        self.pending.clear();
        self.pending_events = 0;
    }

    /// Write the staged events and fsync. On failure the file is cut back
    /// to its last committed length and the staged events are dropped.
    pub fn flush_sync(&mut self) -> io::Result<()> {
        if let Err(e) = self.check_poisoned() {
            self.discard_buffered();
            return Err(e);
        }
        if self.pending.is_empty() {
            return Ok(());
        }
        let written = self.write_pending();
        let staged = self.pending.len() as u64;
        let events = self.pending_events;
        self.discard_buffered();
        match written {
            Ok(()) => {
                self.committed_len += staged;
                self.appends_since_compact += events;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = self.rollback() {
                    tracing::error!(
                        "WAL {} poisoned: rollback after failed flush failed: {rollback}",
                        self.path.display()
                    );
                    self.poisoned = true;
                }
                Err(e)
            }
        }
    }

    fn write_pending(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if let Some(limit) = self.faults.write_limit.take() {
            let n = limit.min(self.pending.len());
            self.file.write_all(&self.pending[..n])?;
            return Err(io::Error::other("injected write failure"));
        }
        self.file.write_all(&self.pending)?;
        self.file.sync_all()
    }

    /// Truncate to the committed length and reopen for appends.
    fn rollback(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if self.faults.rollback {
            return Err(io::Error::other("injected rollback failure"));
        }
        self.file.set_len(self.committed_len)?;
        self.file.sync_all()?;
        self.file = open_append(&self.path)?;
        Ok(())
    }

    fn check_poisoned(&self) -> io::Result<()> {
        if self.poisoned {
            return Err(io::Error::other(format!(
                "WAL {} is poisoned after a failed rollback",
                self.path.display()
            )));
        }
        Ok(())
    }

    /// Return the WAL file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(path: &Path) -> PathBuf {
        path.with_extension("wal.tmp")
    }

    /// Write the compacted log next to the live one and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let mut writer = BufWriter::new(File::create(Self::tmp_path(path))?);
        for event in events {
            encode_frame(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the compacted file over the live log and reopen it for appends.
    /// A poisoned log is healthy again afterwards.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        fs::rename(Self::tmp_path(&self.path), &self.path)?;
        self.file = open_append(&self.path)?;
        self.committed_len = self.file.metadata()?.len();
        self.discard_buffered();
        self.poisoned = false;
        self.appends_since_compact = 0;
        Ok(())
    }

    /// Compact in one step: write the temp file, then swap it in.
    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    /// Events durably appended since the last compaction.
    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Every intact event in the log, in append order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        while let Some(event) = decode_frame(&mut reader)? {
            events.push(event);
        }
        Ok(events)
    }
}
