use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Bytes of framing around each payload: length prefix + CRC.
const FRAME_OVERHEAD: u64 = 8;

/// Encode a single event to [len][bincode][crc32] format. Returns the frame size.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<u64> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = payload.len() as u32;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(FRAME_OVERHEAD + payload.len() as u64)
}

/// I/O failures a test can schedule on a log.
#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Fault {
    /// The batch reaches the file, then fsync fails.
    Sync,
    /// Half of the next frame reaches the file, then the write fails.
    TornAppend,
    /// Cutting the file back after a failed batch fails.
    Rollback,
}

/// Faults consumed in order, each by the first operation of its kind.
#[cfg(test)]
pub(crate) type FaultQueue =
    std::sync::Arc<std::sync::Mutex<std::collections::VecDeque<Fault>>>;

/// Outcome of reading a log back.
#[derive(Debug, Default)]
pub struct Replay {
    pub events: Vec<Event>,
    /// Byte offset just past the last intact entry.
    pub valid_len: u64,
    /// True if bytes after `valid_len` were ignored (torn write or corruption).
    pub discarded_tail: bool,
}

/// Append-only write-ahead log of store mutations.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`.
/// A torn or corrupt tail is cut off on open so later appends stay readable.
/// A failed batch is cut off again by `rollback`, so the file never holds
/// bytes past the last successful `flush_sync`.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length as of the last successful `flush_sync`.
    committed_len: u64,
    /// Frame bytes and count buffered since then.
    pending_len: u64,
    pending_appends: u64,
    #[cfg(test)]
    faults: FaultQueue,
}

impl Wal {
    /// Open (or create) the log, truncating anything past `valid_len`.
    pub fn open(path: &Path, valid_len: u64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();
        if len > valid_len {
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            committed_len: len.min(valid_len),
            pending_len: 0,
            pending_appends: 0,
            #[cfg(test)]
            faults: FaultQueue::default(),
        })
    }

    #[cfg(test)]
    pub(crate) fn faults(&self) -> FaultQueue {
        self.faults.clone()
    }

    #[cfg(test)]
    fn take_fault(&self, kind: Fault) -> bool {
        let mut queue = self.faults.lock().unwrap();
        if queue.front() == Some(&kind) {
            queue.pop_front();
            true
        } else {
            false
        }
    }

    /// Append and fsync a single event. Production code batches through the writer task.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer an event without syncing. Durable only after `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        #[cfg(test)]
        if self.take_fault(Fault::TornAppend) {
            let mut frame = Vec::new();
            encode_event(&mut frame, event)?;
            self.writer.write_all(&frame[..frame.len() / 2])?;
            self.writer.flush()?;
            return Err(io::Error::other("injected torn write"));
        }
        self.pending_len += encode_event(&mut self.writer, event)?;
        self.pending_appends += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        #[cfg(test)]
        if self.take_fault(Fault::Sync) {
            return Err(io::Error::other("injected fsync failure"));
        }
        self.writer.get_ref().sync_all()?;
        self.committed_len += self.pending_len;
        self.appends_since_compact += self.pending_appends;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Throw away everything written since the last successful `flush_sync`:
    /// the unflushed buffer and any bytes that already reached the file.
    pub fn rollback(&mut self) -> io::Result<()> {
        #[cfg(test)]
        if self.take_fault(Fault::Rollback) {
            return Err(io::Error::other("injected truncate failure"));
        }
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let stale = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // into_parts hands back unwritten bytes instead of flushing them on drop.
        let (_, _unwritten) = stale.into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.committed_len)?;
        file.sync_all()?;
        self.pending_len = 0;
        self.pending_appends = 0;
        Ok(())
    }

    /// Close the log without writing out anything still buffered.
    pub fn abandon(self) {
        let (_, _unwritten) = self.writer.into_parts();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Write the compacted event set to a temp file next to the log and fsync it.
    /// Returns the length of the written file.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<u64> {
        let tmp_path = path.with_extension("wal.tmp");
        let file = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(file);
        let mut len = 0;
        for event in events {
            len += encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(len)
    }

    /// Rename the temp file of `len` bytes over the log and reopen for appending.
    pub fn swap_compact_file(&mut self, len: u64) -> io::Result<()> {
        self.writer.flush()?;
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        self.committed_len = len;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        let len = Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file(len)
    }

    /// Read every intact event. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Replay> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Replay::default()),
            Err(e) => return Err(e),
        };
        let total_len = file.metadata()?.len();
        let mut reader = BufReader::new(file);
        let mut replay = Replay::default();

        loop {
            let mut len_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut len_buf)? {
                break;
            }
            let len = u32::from_le_bytes(len_buf) as u64;
            if replay.valid_len + FRAME_OVERHEAD + len > total_len {
                break;
            }

            let mut payload = vec![0u8; len as usize];
            if !read_frame_part(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_frame_part(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => replay.events.push(event),
                Err(_) => break,
            }
            replay.valid_len += FRAME_OVERHEAD + len;
        }

        replay.discarded_tail = replay.valid_len < total_len;
        Ok(replay)
    }
}

/// `read_exact` that reports a short read as `false` instead of an error.
fn read_frame_part(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Seat, Ticket};
    use crate::seatmap::Auditorium;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("boxoffice_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn reserved(showtime_id: Ulid) -> Event {
        Event::TicketReserved {
            ticket: Ticket {
                id: Ulid::new(),
                showtime_id,
                seats: vec![Seat::new(1, 1), Seat::new(1, 2)],
                created_at: 1_000,
                paid: false,
            },
        }
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![
            Event::AuditoriumProvisioned {
                auditorium: Auditorium::grid(1, 5, 10).unwrap(),
            },
            reserved(Ulid::new()),
        ];

        {
            let mut wal = Wal::open(&path, 0).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, events);
        assert!(!replay.discarded_tail);
        assert_eq!(replay.valid_len, fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn replay_nonexistent_file() {
        let path = tmp_path("nonexistent.wal");
        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert_eq!(replay.valid_len, 0);
    }

    #[test]
    fn torn_tail_is_discarded_and_truncated() {
        let path = tmp_path("torn_tail.wal");
        let first = reserved(Ulid::new());

        {
            let mut wal = Wal::open(&path, 0).unwrap();
            wal.append(&first).unwrap();
        }
        // Half-written second entry
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[0x40, 0, 0, 0, 1, 2]).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first.clone()]);
        assert!(replay.discarded_tail);

        // Reopen cuts the garbage, so a new append lands right after the good entry.
        let second = reserved(Ulid::new());
        {
            let mut wal = Wal::open(&path, replay.valid_len).unwrap();
            wal.append(&second).unwrap();
        }
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![first, second]);
        assert!(!replay.discarded_tail);
    }

    #[test]
    fn replay_stops_at_bad_crc() {
        let path = tmp_path("corrupt_crc.wal");
        let event = Event::TicketPaid {
            id: Ulid::new(),
            showtime_id: Ulid::new(),
        };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEADBEEFu32.to_le_bytes()).unwrap();
        }

        let replay = Wal::replay(&path).unwrap();
        assert!(replay.events.is_empty());
        assert!(replay.discarded_tail);
    }

    #[test]
    fn rollback_after_failed_sync_drops_the_batch() {
        let path = tmp_path("rollback_sync.wal");
        let kept = reserved(Ulid::new());
        let lost = reserved(Ulid::new());
        let after = reserved(Ulid::new());

        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&kept).unwrap();
        let committed = wal.committed_len();
        assert_eq!(committed, fs::metadata(&path).unwrap().len());

        wal.faults().lock().unwrap().push_back(Fault::Sync);
        assert!(wal.append(&lost).is_err());
        // The frame reached the file before fsync failed.
        assert!(fs::metadata(&path).unwrap().len() > committed);

        wal.rollback().unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
        assert_eq!(wal.appends_since_compact(), 1);

        wal.append(&after).unwrap();
        drop(wal);
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![kept, after]);
        assert!(!replay.discarded_tail);
    }

    #[test]
    fn rollback_after_torn_write_keeps_later_appends_readable() {
        let path = tmp_path("rollback_torn.wal");
        let kept = reserved(Ulid::new());
        let after = reserved(Ulid::new());

        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&kept).unwrap();
        wal.faults().lock().unwrap().push_back(Fault::TornAppend);
        assert!(wal.append_buffered(&reserved(Ulid::new())).is_err());
        wal.rollback().unwrap();

        wal.append(&after).unwrap();
        drop(wal);
        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![kept, after]);
        assert!(!replay.discarded_tail);
    }

    #[test]
    fn rollback_discards_unflushed_buffer() {
        let path = tmp_path("rollback_buffer.wal");
        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append_buffered(&reserved(Ulid::new())).unwrap();
        wal.rollback().unwrap();
        drop(wal);

        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
        assert!(Wal::replay(&path).unwrap().events.is_empty());
    }

    #[test]
    fn compact_shrinks_and_keeps_appending() {
        let path = tmp_path("compact.wal");
        let showtime_id = Ulid::new();
        let keep = reserved(showtime_id);

        let mut wal = Wal::open(&path, 0).unwrap();
        wal.append(&keep).unwrap();
        for _ in 0..10 {
            let churn = reserved(showtime_id);
            let Event::TicketReserved { ticket } = &churn else { unreachable!() };
            let ids = vec![ticket.id];
            wal.append(&churn).unwrap();
            wal.append(&Event::TicketsReclaimed { showtime_id, ids }).unwrap();
        }
        assert_eq!(wal.appends_since_compact(), 21);
        let before = fs::metadata(&path).unwrap().len();

        wal.compact(std::slice::from_ref(&keep)).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);
        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted WAL should be smaller: {after} < {before}");
        assert_eq!(wal.committed_len(), after);

        let paid = Event::TicketPaid { id: Ulid::new(), showtime_id };
        wal.append(&paid).unwrap();
        drop(wal);

        let replay = Wal::replay(&path).unwrap();
        assert_eq!(replay.events, vec![keep, paid]);
    }
}
