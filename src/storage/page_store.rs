use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use tracing::debug;

use crate::{
    storage::{FILE_HEADER_SIZE, header::FileHeader},
    types::{
        PAGE_SIZE, PageId,
        error::{DatabaseError, Result},
        page::{Page, PageType},
    },
};

#[derive(Debug)]
enum Backing {
    File(File),
    Memory(Vec<u8>),
}

/// Fixed-size page I/O over a single database file (or an in-memory image),
/// with free-page tracking through the header's free list.
///
/// Page writes are assumed atomic at the medium level. When that assumption
/// does not hold, `double_write` stages every image in a sidecar scratch
/// file (fsynced before the in-place write) so a torn write never leaves
/// the only copy of a page half-old, half-new.
#[derive(Debug)]
pub struct PageStore {
    backing: Backing,
    header: FileHeader,
    page_count: u32,
    read_only: bool,
    double_write: bool,
    scratch: Option<File>,
}

impl PageStore {
    pub fn create<P: AsRef<Path>>(path: P, double_write: bool) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "creating new database file");
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .read(true)
            .truncate(true)
            .open(path)?;

        let mut header = FileHeader::default();
        header.schema_root = 1;

        let mut page0 = vec![0u8; PAGE_SIZE];
        page0[..FILE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        file.write_all(&page0)?;

        // Page 1 is the catalog root, created empty.
        let catalog_root = Page::new(1, PageType::TableLeaf);
        file.write_all(&catalog_root.to_bytes())?;
        file.sync_all()?;

        let scratch = if double_write {
            Some(open_scratch(path)?)
        } else {
            None
        };

        Ok(Self {
            backing: Backing::File(file),
            header,
            page_count: 2,
            read_only: false,
            double_write,
            scratch,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P, read_only: bool, double_write: bool) -> Result<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), read_only, "opening existing database file");
        let mut options = OpenOptions::new();
        options.read(true);
        if !read_only {
            options.write(true);
        }
        let mut file = options.open(path)?;

        let mut header_buffer = vec![0u8; FILE_HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header_buffer).map_err(|_| {
            DatabaseError::CorruptHeader {
                reason: "file too short for header".to_string(),
            }
        })?;
        let header = FileHeader::from_bytes(&header_buffer)?;

        let file_size = file.metadata()?.len();
        if file_size < PAGE_SIZE as u64 || file_size % PAGE_SIZE as u64 != 0 {
            return Err(DatabaseError::CorruptHeader {
                reason: format!("file size {} is not a whole number of pages", file_size),
            });
        }
        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        let scratch = if double_write && !read_only {
            Some(open_scratch(path)?)
        } else {
            None
        };

        Ok(Self {
            backing: Backing::File(file),
            header,
            page_count,
            read_only,
            double_write,
            scratch,
        })
    }

    pub fn in_memory() -> Result<Self> {
        let mut header = FileHeader::default();
        header.schema_root = 1;

        let mut image = vec![0u8; PAGE_SIZE * 2];
        image[..FILE_HEADER_SIZE].copy_from_slice(&header.to_bytes());
        let catalog_root = Page::new(1, PageType::TableLeaf);
        image[PAGE_SIZE..].copy_from_slice(&catalog_root.to_bytes());

        Ok(Self {
            backing: Backing::Memory(image),
            header,
            page_count: 2,
            read_only: false,
            double_write: false,
            scratch: None,
        })
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn read_page(&mut self, page_id: PageId) -> Result<Vec<u8>> {
        if page_id >= self.page_count {
            return Err(DatabaseError::OutOfRange {
                page_id,
                page_count: self.page_count,
            });
        }
        let mut buffer = vec![0u8; PAGE_SIZE];
        match &mut self.backing {
            Backing::File(file) => {
                file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
                file.read_exact(&mut buffer)?;
            }
            Backing::Memory(image) => {
                let start = page_id as usize * PAGE_SIZE;
                buffer.copy_from_slice(&image[start..start + PAGE_SIZE]);
            }
        }
        Ok(buffer)
    }

    pub fn write_page(&mut self, page_id: PageId, bytes: &[u8]) -> Result<()> {
        if self.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        if bytes.len() != PAGE_SIZE {
            return Err(DatabaseError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: bytes.len(),
            });
        }
        if page_id >= self.page_count {
            return Err(DatabaseError::OutOfRange {
                page_id,
                page_count: self.page_count,
            });
        }

        if self.double_write {
            if let Some(scratch) = &mut self.scratch {
                scratch.seek(SeekFrom::Start(0))?;
                scratch.write_all(&page_id.to_le_bytes())?;
                scratch.write_all(bytes)?;
                scratch.sync_all()?;
            }
        }

        match &mut self.backing {
            Backing::File(file) => {
                file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
                file.write_all(bytes)?;
            }
            Backing::Memory(image) => {
                let start = page_id as usize * PAGE_SIZE;
                image[start..start + PAGE_SIZE].copy_from_slice(bytes);
            }
        }
        Ok(())
    }

    /// Pop the free-list head if non-empty, else extend the backing by one
    /// page. The returned page's previous content is unspecified; callers
    /// format it before use.
    pub fn allocate_page(&mut self) -> Result<PageId> {
        if self.read_only {
            return Err(DatabaseError::ReadOnly);
        }

        if self.header.freelist_head != 0 {
            let page_id = self.header.freelist_head;
            if page_id >= self.page_count {
                return Err(DatabaseError::CorruptPage {
                    page_id,
                    reason: format!(
                        "freelist head out of range (page count: {})",
                        self.page_count
                    ),
                });
            }
            let free_page = Page::from_bytes(&self.read_page(page_id)?)?;
            if free_page.page_type != PageType::Free {
                return Err(DatabaseError::CorruptPage {
                    page_id,
                    reason: "freelist entry is not a free page".to_string(),
                });
            }
            self.header.freelist_head = free_page.next_page.unwrap_or(0);
            self.write_header()?;
            return Ok(page_id);
        }

        let page_id = self.page_count;
        let zeroes = vec![0u8; PAGE_SIZE];
        match &mut self.backing {
            Backing::File(file) => {
                file.seek(SeekFrom::Start(page_id as u64 * PAGE_SIZE as u64))?;
                file.write_all(&zeroes)?;
            }
            Backing::Memory(image) => {
                image.extend_from_slice(&zeroes);
            }
        }
        self.page_count += 1;
        Ok(page_id)
    }

    /// Push a page onto the free list. The page is rewritten as a `Free`
    /// page whose chain link points at the previous head.
    pub fn free_page(&mut self, page_id: PageId) -> Result<()> {
        if self.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        if page_id >= self.page_count {
            return Err(DatabaseError::OutOfRange {
                page_id,
                page_count: self.page_count,
            });
        }
        if page_id == 0 || page_id == self.header.schema_root {
            return Err(DatabaseError::CorruptPage {
                page_id,
                reason: "cannot free a reserved page".to_string(),
            });
        }
        if self.freelist_contains(page_id)? {
            return Err(DatabaseError::CorruptPage {
                page_id,
                reason: "page is already on the free list".to_string(),
            });
        }

        let mut free_page = Page::new(page_id, PageType::Free);
        if self.header.freelist_head != 0 {
            free_page.next_page = Some(self.header.freelist_head);
        }
        self.write_page(page_id, &free_page.to_bytes())?;

        self.header.freelist_head = page_id;
        self.write_header()?;
        Ok(())
    }

    pub fn sync(&mut self) -> Result<()> {
        if let Backing::File(file) = &mut self.backing {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Extend the backing with zeroed pages until `count` pages exist.
    /// Used by WAL recovery when replayed frames reference pages past the
    /// extent the file had at crash time.
    pub(crate) fn ensure_page_count(&mut self, count: u32) -> Result<()> {
        while self.page_count < count {
            self.allocate_page()?;
        }
        Ok(())
    }

    fn write_header(&mut self) -> Result<()> {
        if self.read_only {
            return Err(DatabaseError::ReadOnly);
        }
        let header_bytes = self.header.to_bytes();
        match &mut self.backing {
            Backing::File(file) => {
                file.seek(SeekFrom::Start(0))?;
                file.write_all(&header_bytes)?;
            }
            Backing::Memory(image) => {
                image[..FILE_HEADER_SIZE].copy_from_slice(&header_bytes);
            }
        }
        Ok(())
    }

    fn freelist_contains(&mut self, target: PageId) -> Result<bool> {
        let mut current = self.header.freelist_head;
        let mut seen = 0u32;
        while current != 0 {
            if current == target {
                return Ok(true);
            }
            let page = Page::from_bytes(&self.read_page(current)?)?;
            if page.page_type != PageType::Free {
                return Err(DatabaseError::CorruptPage {
                    page_id: current,
                    reason: "freelist entry is not a free page".to_string(),
                });
            }
            current = page.next_page.unwrap_or(0);
            seen += 1;
            if seen > self.page_count {
                return Err(DatabaseError::CorruptPage {
                    page_id: current,
                    reason: "freelist loop detected".to_string(),
                });
            }
        }
        Ok(false)
    }
}

fn scratch_path_for(db_path: &Path) -> PathBuf {
    let mut os = db_path.as_os_str().to_os_string();
    os.push("-dw");
    PathBuf::from(os)
}

fn open_scratch(db_path: &Path) -> Result<File> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(scratch_path_for(db_path))?;
    Ok(file)
}
