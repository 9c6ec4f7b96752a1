use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// A length prefix above this is treated as corruption, not as a record to allocate.
const MAX_RECORD_BYTES: usize = 16 * 1024 * 1024;

/// Encode a single event to [len][bincode][crc32] format.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read one `[len][payload][crc]` frame. `Ok(None)` on clean EOF or a torn tail.
fn read_frame(reader: &mut impl Read) -> io::Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_RECORD_BYTES {
        tracing::warn!("wal: record length {len} exceeds limit, discarding tail");
        return Ok(None);
    }

    let mut payload = vec![0u8; len];
    let mut crc_buf = [0u8; 4];
    for buf in [&mut payload[..], &mut crc_buf[..]] {
        match reader.read_exact(buf) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                tracing::warn!("wal: truncated record at tail, discarding");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
    }

    if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
        tracing::warn!("wal: checksum mismatch, discarding tail");
        return Ok(None);
    }
    Ok(Some(payload))
}

/// Append-only event log for reservations and closures.
///
/// Format per entry: `[u32: len][bincode: Event][u32: crc32]`
/// - `len` is the byte length of the bincode payload (not including the CRC).
/// - A torn or corrupt tail (crash mid-write) is discarded on replay and cut
///   off on open, so new records never land behind it.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
    /// File length as of the last successful flush.
    durable_len: u64,
    /// Appends buffered since then.
    pending: u64,
}

impl Wal {
    /// Open (or create) the log at `path`, truncating any invalid tail.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (_, valid_len) = Self::scan(path)?;
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let on_disk = file.metadata()?.len();
        if on_disk > valid_len {
            tracing::warn!(
                "wal: cutting {} invalid tail bytes from {}",
                on_disk - valid_len,
                path.display()
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }
        Ok(Self {
            writer: BufWriter::new(file),
            path: path.to_path_buf(),
            appends_since_compact: 0,
            durable_len: valid_len,
            pending: 0,
        })
    }

    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    /// Buffer one event. Nothing is durable until `flush_sync`.
    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        self.pending += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        self.durable_len = self.writer.get_ref().metadata()?.len();
        self.pending = 0;
        Ok(())
    }

    /// Discard everything since the last successful flush, buffered or
    /// partly written.
    pub fn truncate_to_durable(&mut self) -> io::Result<()> {
        let file = OpenOptions::new().append(true).open(&self.path)?;
        let failed = std::mem::replace(&mut self.writer, BufWriter::new(file));
        // Drop the unwritten buffer without the flush-on-drop.
        let _ = failed.into_parts();
        let file = self.writer.get_ref();
        file.set_len(self.durable_len)?;
        file.sync_all()?;
        self.appends_since_compact -= self.pending;
        self.pending = 0;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write compacted events to a sibling temp file and fsync.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the temp file over the log and reopen for appends.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        self.durable_len = file.metadata()?.len();
        self.writer = BufWriter::new(file);
        self.appends_since_compact = 0;
        self.pending = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay every valid event in order. A missing file is an empty log.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        Self::scan(path).map(|(events, _)| events)
    }

    /// Valid events plus the byte length they occupy.
    fn scan(path: &Path) -> io::Result<(Vec<Event>, u64)> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok((Vec::new(), 0)),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);
        let mut events = Vec::new();
        let mut valid_len = 0u64;

        while let Some(payload) = read_frame(&mut reader)? {
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => {
                    events.push(event);
                    valid_len += (payload.len() + 8) as u64;
                }
                Err(e) => {
                    tracing::warn!("wal: undecodable record ({e}), discarding tail");
                    break;
                }
            }
        }

        Ok((events, valid_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::{NaiveDate, NaiveTime, Utc};
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("dockslot_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn closed(date: NaiveDate) -> Event {
        Event::SlotClosed {
            closure: ClosedSlot {
                id: Ulid::new(),
                date,
                start_time: None,
                end_time: None,
                reason: "inventory".into(),
                status: ClosureStatus::Closed,
                created_by: 1,
                opened_reason: None,
                created_at: Utc::now(),
                opened_at: None,
            },
        }
    }

    fn booked(date: NaiveDate) -> Event {
        Event::ReservationBooked {
            reservation: Reservation {
                id: Ulid::new(),
                reservation_no: "20240604-001".into(),
                user_id: 7,
                date,
                start_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
                status: ReservationStatus::Booked,
                container_no: "MSCU1234567".into(),
                packing_list: StoredRef("uploads/packing-lists/p.pdf".into()),
                cancel_reason: None,
                created_at: Utc::now(),
                cancelled_at: None,
            },
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 4).unwrap()
    }

    #[test]
    fn append_and_replay() {
        let path = tmp_path("append_and_replay.wal");
        let events = vec![booked(date()), closed(date())];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 2);
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("never_written.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn truncated_tail_is_discarded() {
        let path = tmp_path("truncated.wal");
        let first = booked(date());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&closed(date())).unwrap();
        }
        let len = fs::metadata(&path).unwrap().len();
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        file.set_len(len - 3).unwrap();

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
    }

    #[test]
    fn corrupt_checksum_stops_replay() {
        let path = tmp_path("corrupt.wal");
        let first = booked(date());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&closed(date())).unwrap();
        }
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        assert_eq!(Wal::replay(&path).unwrap(), vec![first]);
    }

    #[test]
    fn absurd_length_prefix_stops_replay() {
        let path = tmp_path("absurd_len.wal");
        fs::write(&path, u32::MAX.to_le_bytes()).unwrap();
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn torn_tail_is_cut_before_new_appends() {
        let path = tmp_path("torn_then_append.wal");
        let first = booked(date());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&first).unwrap();
            wal.append(&closed(date())).unwrap();
        }
        let len = fs::metadata(&path).unwrap().len();
        OpenOptions::new().write(true).open(&path).unwrap().set_len(len - 3).unwrap();

        let later = closed(date());
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&later).unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, later]);
    }

    #[test]
    fn failed_batch_is_rolled_back() {
        let path = tmp_path("rolled_back.wal");
        let first = booked(date());
        let mut wal = Wal::open(&path).unwrap();
        wal.append(&first).unwrap();

        // A batch that reached the file but was never acknowledged.
        wal.append_buffered(&closed(date())).unwrap();
        wal.writer.flush().unwrap();
        wal.append_buffered(&closed(date())).unwrap();
        wal.truncate_to_durable().unwrap();
        assert_eq!(wal.appends_since_compact(), 1);

        let later = closed(date());
        wal.append(&later).unwrap();
        drop(wal);
        assert_eq!(Wal::replay(&path).unwrap(), vec![first, later]);
    }

    #[test]
    fn compact_replaces_contents() {
        let path = tmp_path("compact.wal");
        let mut wal = Wal::open(&path).unwrap();
        for _ in 0..5 {
            wal.append(&closed(date())).unwrap();
        }
        let keep = vec![booked(date())];
        wal.compact(&keep).unwrap();
        assert_eq!(wal.appends_since_compact(), 0);

        let extra = closed(date());
        wal.append(&extra).unwrap();
        drop(wal);

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0], keep[0]);
        assert_eq!(replayed[1], extra);
    }
}
