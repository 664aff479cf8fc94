use std::{
    collections::BTreeSet,
    ffi::OsString,
    fs::{File, OpenOptions},
    io::{BufWriter, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{
    storage::page_store::PageStore,
    types::{
        PAGE_SIZE, PageId, SeqNo,
        error::{DatabaseError, Result},
    },
    utils::hash::frame_checksum,
};

/// page_id(4) + seq(8) + checksum(4)
pub const WAL_FRAME_HEADER_SIZE: usize = 16;
pub const WAL_FRAME_SIZE: usize = WAL_FRAME_HEADER_SIZE + PAGE_SIZE;

/// Page ID sentinel marking a commit frame. A commit frame carries a zeroed
/// image; its sequence number is the transaction being committed.
pub const COMMIT_FRAME: PageId = PageId::MAX;

#[derive(Debug)]
enum WalBacking {
    File(BufWriter<File>),
    Memory(Vec<u8>),
}

/// Append-only write-ahead log.
///
/// The log is a bare sequence of frames starting at offset 0; it ends at
/// EOF or at the first frame whose checksum does not verify (the torn tail
/// of a crash). Frames before a commit marker are not durable until the
/// marker itself is written and fsynced.
#[derive(Debug)]
pub struct Wal {
    backing: WalBacking,
}

pub fn wal_path_for(db_path: &Path) -> PathBuf {
    let mut os: OsString = db_path.as_os_str().to_os_string();
    os.push("-wal");
    PathBuf::from(os)
}

impl Wal {
    pub fn open(db_path: &Path) -> Result<Self> {
        let wal_path = wal_path_for(db_path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&wal_path)?;
        file.seek(SeekFrom::End(0))?;
        Ok(Self {
            backing: WalBacking::File(BufWriter::new(file)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            backing: WalBacking::Memory(Vec::new()),
        }
    }

    pub fn append_frame(&mut self, page_id: PageId, image: &[u8], seq: SeqNo) -> Result<()> {
        if image.len() != PAGE_SIZE {
            return Err(DatabaseError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: image.len(),
            });
        }
        let checksum = frame_checksum(page_id, seq, image);
        match &mut self.backing {
            WalBacking::File(writer) => {
                writer.write_all(&page_id.to_le_bytes())?;
                writer.write_all(&seq.to_le_bytes())?;
                writer.write_all(&checksum.to_le_bytes())?;
                writer.write_all(image)?;
            }
            WalBacking::Memory(buffer) => {
                buffer.extend_from_slice(&page_id.to_le_bytes());
                buffer.extend_from_slice(&seq.to_le_bytes());
                buffer.extend_from_slice(&checksum.to_le_bytes());
                buffer.extend_from_slice(image);
            }
        }
        Ok(())
    }

    pub fn append_commit(&mut self, seq: SeqNo) -> Result<()> {
        let image = vec![0u8; PAGE_SIZE];
        self.append_frame(COMMIT_FRAME, &image, seq)
    }

    /// Flush buffered frames and fsync. A transaction is durable only once
    /// its commit marker has passed through here.
    pub fn sync(&mut self) -> Result<()> {
        if let WalBacking::File(writer) = &mut self.backing {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }

    pub fn size(&mut self) -> Result<u64> {
        match &mut self.backing {
            WalBacking::File(writer) => {
                writer.flush()?;
                Ok(writer.get_ref().metadata()?.len())
            }
            WalBacking::Memory(buffer) => Ok(buffer.len() as u64),
        }
    }

    /// Truncate the log. Invoked after a checkpoint has applied every
    /// committed frame to the page store.
    pub fn reset(&mut self) -> Result<()> {
        match &mut self.backing {
            WalBacking::File(writer) => {
                writer.flush()?;
                let file = writer.get_mut();
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                file.sync_all()?;
            }
            WalBacking::Memory(buffer) => buffer.clear(),
        }
        Ok(())
    }

    /// Replay the log into the page store. Run once at open time.
    ///
    /// Page frames accumulate per transaction; a checksum-valid commit
    /// marker applies every pending frame at or below its sequence number.
    /// A truncated or checksum-invalid frame is the torn tail of a crash:
    /// it and everything after it are discarded. Returns the set of
    /// replayed page IDs and the last committed sequence number.
    pub fn recover(&mut self, store: &mut PageStore) -> Result<(BTreeSet<PageId>, SeqNo)> {
        let data = self.read_all()?;
        if data.is_empty() {
            return Ok((BTreeSet::new(), 0));
        }

        let mut pending: Vec<(PageId, SeqNo, Vec<u8>)> = Vec::new();
        let mut replayed = BTreeSet::new();
        let mut last_committed: SeqNo = 0;
        let mut offset = 0usize;

        while offset + WAL_FRAME_SIZE <= data.len() {
            let page_id = PageId::from_le_bytes([
                data[offset],
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
            ]);
            let seq = SeqNo::from_le_bytes([
                data[offset + 4],
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
                data[offset + 8],
                data[offset + 9],
                data[offset + 10],
                data[offset + 11],
            ]);
            let stored_checksum = u32::from_le_bytes([
                data[offset + 12],
                data[offset + 13],
                data[offset + 14],
                data[offset + 15],
            ]);
            let image = &data[offset + WAL_FRAME_HEADER_SIZE..offset + WAL_FRAME_SIZE];

            if frame_checksum(page_id, seq, image) != stored_checksum {
                warn!(
                    offset,
                    "discarding torn WAL tail (checksum mismatch), expected after a crash"
                );
                break;
            }

            if page_id == COMMIT_FRAME {
                for (frame_page, frame_seq, frame_image) in pending.drain(..) {
                    if frame_seq <= seq {
                        store.ensure_page_count(frame_page + 1)?;
                        store.write_page(frame_page, &frame_image)?;
                        replayed.insert(frame_page);
                    }
                }
                last_committed = last_committed.max(seq);
            } else {
                pending.push((page_id, seq, image.to_vec()));
            }

            offset += WAL_FRAME_SIZE;
        }

        if offset < data.len() && offset + WAL_FRAME_SIZE > data.len() {
            warn!(
                trailing = data.len() - offset,
                "discarding incomplete WAL frame at end of log, expected after a crash"
            );
        }
        if !pending.is_empty() {
            debug!(
                frames = pending.len(),
                "discarding WAL frames with no commit marker"
            );
        }

        if !replayed.is_empty() {
            store.sync()?;
            debug!(
                pages = replayed.len(),
                seq = last_committed,
                "WAL recovery applied committed frames"
            );
        }
        self.reset()?;

        Ok((replayed, last_committed))
    }

    fn read_all(&mut self) -> Result<Vec<u8>> {
        match &mut self.backing {
            WalBacking::File(writer) => {
                writer.flush()?;
                let file = writer.get_mut();
                file.seek(SeekFrom::Start(0))?;
                let mut data = Vec::new();
                file.read_to_end(&mut data)?;
                file.seek(SeekFrom::End(0))?;
                Ok(data)
            }
            WalBacking::Memory(buffer) => Ok(buffer.clone()),
        }
    }
}
