use crate::{
    storage::{FILE_FORMAT_VERSION, FILE_HEADER_SIZE, LUMBUNG_MAGIC},
    types::{PAGE_SIZE, PageId, error::DatabaseError, error::Result},
};

/// File header stored at the start of page 0.
///
/// Layout: magic(4) | version(2) | page_size(2) | freelist_head(4) |
/// schema_root(4). A freelist head of 0 means the free list is empty;
/// page 0 itself is the header and is never on the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub page_size: u16,
    pub freelist_head: PageId,
    pub schema_root: PageId,
}

impl Default for FileHeader {
    fn default() -> Self {
        Self {
            magic: *LUMBUNG_MAGIC,
            version: FILE_FORMAT_VERSION,
            page_size: PAGE_SIZE as u16,
            freelist_head: 0,
            schema_root: 0,
        }
    }
}

impl FileHeader {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(FILE_HEADER_SIZE);
        buffer.extend_from_slice(&self.magic);
        buffer.extend_from_slice(&self.version.to_be_bytes());
        buffer.extend_from_slice(&self.page_size.to_be_bytes());
        buffer.extend_from_slice(&self.freelist_head.to_be_bytes());
        buffer.extend_from_slice(&self.schema_root.to_be_bytes());
        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FILE_HEADER_SIZE {
            return Err(DatabaseError::CorruptHeader {
                reason: "header too short".to_string(),
            });
        }

        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        if &magic != LUMBUNG_MAGIC {
            return Err(DatabaseError::CorruptHeader {
                reason: "invalid magic number".to_string(),
            });
        }

        let version = u16::from_be_bytes([bytes[4], bytes[5]]);
        if version > FILE_FORMAT_VERSION {
            return Err(DatabaseError::CorruptHeader {
                reason: format!("unsupported file format version: {}", version),
            });
        }

        let page_size = u16::from_be_bytes([bytes[6], bytes[7]]);
        if page_size != PAGE_SIZE as u16 {
            return Err(DatabaseError::CorruptHeader {
                reason: format!("unsupported page size: {}", page_size),
            });
        }

        let freelist_head = PageId::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        let schema_root = PageId::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);

        Ok(Self {
            magic,
            version,
            page_size,
            freelist_head,
            schema_root,
        })
    }
}
