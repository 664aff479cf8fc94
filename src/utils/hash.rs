use crc32fast::Hasher;

use crate::types::{PageId, SeqNo};

/// Checksum of one WAL frame: CRC32 over page_id, sequence number, and the
/// full page image. Covers everything in the frame except the checksum
/// field itself.
pub fn frame_checksum(page_id: PageId, seq: SeqNo, image: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&page_id.to_le_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(image);
    hasher.finalize()
}
