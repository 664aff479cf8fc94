use serde::{Deserialize, Serialize};

use crate::types::{
    NO_PAGE, PAGE_HEADER_SIZE, PAGE_SIZE, PageId, SLOT_DIRECTORY_ENTRY_SIZE,
    error::{DatabaseError, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageType {
    Free = 2,
    Overflow = 10,
    TableLeaf = 13,
}

impl PageType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            2 => Ok(PageType::Free),
            10 => Ok(PageType::Overflow),
            13 => Ok(PageType::TableLeaf),
            _ => Err(DatabaseError::InvalidPageType(value)),
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotEntry {
    pub offset: u16, // Offset from beginning of page
    pub length: u16, // Length of the cell
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDirectory {
    pub slots: Vec<SlotEntry>,
}

/*
 * Page Layout on Disk (Slotted Page Structure)
 * ┌─────────────────────────────────────────────────────────────────┐
 * │                    PAGE HEADER (16 bytes)                       │
 * │  page_id(4) | page_type(1) | next_page(4) |                     │
 * │  cell_count(2) | free_space_offset(2) | reserved(3)             │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                  SLOT DIRECTORY                                 │
 * │  [slot0: offset(2)|len(2)] [slot1: offset(2)|len(2)] ...        │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                    FREE SPACE                                   │
 * ├─────────────────────────────────────────────────────────────────┤
 * │                   CELL DATA                                     │
 * │  [...cell N...] [...cell 2...] [...cell 1...] [...cell 0...]    │
 * └─────────────────────────────────────────────────────────────────┘
 */

#[derive(Debug, Clone)]
pub struct Page {
    pub page_id: PageId,
    pub page_type: PageType,
    pub next_page: Option<PageId>,

    pub slot_directory: SlotDirectory,
    pub free_space_offset: u16,
    pub cell_count: u16,

    pub data: Vec<u8>,
}

impl Page {
    pub fn new(page_id: PageId, page_type: PageType) -> Self {
        Self {
            page_id,
            page_type,
            next_page: None,
            slot_directory: SlotDirectory { slots: Vec::new() },
            free_space_offset: PAGE_SIZE as u16,
            cell_count: 0,
            data: vec![0; PAGE_SIZE],
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = vec![0u8; PAGE_SIZE];
        let mut offset = 0;

        buffer[offset..offset + 4].copy_from_slice(&self.page_id.to_le_bytes());
        offset += 4;

        buffer[offset] = self.page_type.as_u8();
        offset += 1;

        let next_page = self.next_page.unwrap_or(NO_PAGE);
        buffer[offset..offset + 4].copy_from_slice(&next_page.to_le_bytes());
        offset += 4;

        buffer[offset..offset + 2].copy_from_slice(&self.cell_count.to_le_bytes());
        offset += 2;

        buffer[offset..offset + 2].copy_from_slice(&self.free_space_offset.to_le_bytes());

        // reserved bytes pad the header to PAGE_HEADER_SIZE
        offset = PAGE_HEADER_SIZE;

        for slot in &self.slot_directory.slots {
            buffer[offset..offset + 2].copy_from_slice(&slot.offset.to_le_bytes());
            offset += 2;
            buffer[offset..offset + 2].copy_from_slice(&slot.length.to_le_bytes());
            offset += 2;
        }

        // Cell data is already positioned at the tail of self.data.
        buffer[self.free_space_offset as usize..]
            .copy_from_slice(&self.data[self.free_space_offset as usize..]);

        buffer
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PAGE_SIZE {
            return Err(DatabaseError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: bytes.len(),
            });
        }

        let mut offset = 0;

        let page_id = PageId::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        offset += 4;

        let page_type = PageType::from_u8(bytes[offset])?;
        offset += 1;

        let next_page_raw = PageId::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]);
        let next_page = if next_page_raw == NO_PAGE {
            None
        } else {
            Some(next_page_raw)
        };
        offset += 4;

        let cell_count = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
        offset += 2;

        let free_space_offset = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);

        offset = PAGE_HEADER_SIZE;

        let mut slots = Vec::with_capacity(cell_count as usize);
        for _ in 0..cell_count {
            if offset + SLOT_DIRECTORY_ENTRY_SIZE > bytes.len() {
                return Err(DatabaseError::CorruptPage {
                    page_id,
                    reason: "slot directory extends beyond page boundary".to_string(),
                });
            }

            let slot_offset = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            offset += 2;
            let length = u16::from_le_bytes([bytes[offset], bytes[offset + 1]]);
            offset += 2;

            if slot_offset as usize + length as usize > PAGE_SIZE {
                return Err(DatabaseError::CorruptPage {
                    page_id,
                    reason: format!(
                        "slot at offset {} with length {} exceeds page boundary",
                        slot_offset, length
                    ),
                });
            }

            slots.push(SlotEntry {
                offset: slot_offset,
                length,
            });
        }

        if free_space_offset as usize > PAGE_SIZE {
            return Err(DatabaseError::CorruptPage {
                page_id,
                reason: format!("invalid free_space_offset: {}", free_space_offset),
            });
        }

        let mut data = vec![0u8; PAGE_SIZE];
        data.copy_from_slice(bytes);

        Ok(Page {
            page_id,
            page_type,
            next_page,
            slot_directory: SlotDirectory { slots },
            free_space_offset,
            cell_count,
            data,
        })
    }

    pub fn available_space(&self) -> usize {
        let slot_directory_size = self.slot_directory.slots.len() * SLOT_DIRECTORY_ENTRY_SIZE;
        let used_data_space = (PAGE_SIZE as u16 - self.free_space_offset) as usize;
        PAGE_SIZE - PAGE_HEADER_SIZE - slot_directory_size - used_data_space
    }

    pub fn can_fit(&self, data_size: usize) -> bool {
        self.available_space() >= data_size + SLOT_DIRECTORY_ENTRY_SIZE
    }

    pub fn insert_cell(&mut self, data: &[u8]) -> Result<usize> {
        if !self.can_fit(data.len()) {
            return Err(DatabaseError::PageFull {
                page_id: self.page_id,
            });
        }

        // Cells grow downward from the end of the page.
        let new_offset = self.free_space_offset - data.len() as u16;

        let start = new_offset as usize;
        let end = start + data.len();
        self.data[start..end].copy_from_slice(data);

        let slot_index = self.slot_directory.slots.len();
        self.slot_directory.slots.push(SlotEntry {
            offset: new_offset,
            length: data.len() as u16,
        });

        self.free_space_offset = new_offset;
        self.cell_count += 1;

        Ok(slot_index)
    }

    pub fn get_cell(&self, slot_index: usize) -> Option<&[u8]> {
        if let Some(slot) = self.slot_directory.slots.get(slot_index) {
            let start = slot.offset as usize;
            let end = start + slot.length as usize;
            Some(&self.data[start..end])
        } else {
            None
        }
    }

    pub fn delete_cell(&mut self, slot_index: usize) -> Result<()> {
        if slot_index >= self.slot_directory.slots.len() {
            return Err(DatabaseError::InvalidSlotIndex {
                index: slot_index,
                max: self.slot_directory.slots.len(),
            });
        }

        self.slot_directory.slots.remove(slot_index);
        self.cell_count -= 1;

        self.compact_page();

        Ok(())
    }

    /// Remove every cell, leaving an empty page with the same identity and
    /// chain link.
    pub fn clear_cells(&mut self) {
        self.slot_directory.slots.clear();
        self.cell_count = 0;
        self.free_space_offset = PAGE_SIZE as u16;
        self.data[PAGE_HEADER_SIZE..].fill(0);
    }

    // Defragment the page by moving all cells to eliminate gaps
    fn compact_page(&mut self) {
        if self.slot_directory.slots.is_empty() {
            self.free_space_offset = PAGE_SIZE as u16;
            return;
        }

        let mut compacted_data = Vec::new();
        let mut new_offsets = Vec::new();

        // Sort slots by their current offset (highest to lowest) to maintain order
        let mut sorted_slots: Vec<(usize, &SlotEntry)> =
            self.slot_directory.slots.iter().enumerate().collect();
        sorted_slots.sort_by(|a, b| b.1.offset.cmp(&a.1.offset));

        let mut current_offset = PAGE_SIZE as u16;
        for (original_index, slot) in sorted_slots {
            let start = slot.offset as usize;
            let end = start + slot.length as usize;
            compacted_data.extend_from_slice(&self.data[start..end]);

            current_offset -= slot.length;
            new_offsets.push((original_index, current_offset));
        }

        let data_start = current_offset as usize;
        self.data[data_start..PAGE_SIZE].copy_from_slice(&compacted_data);
        self.data[PAGE_HEADER_SIZE..data_start].fill(0);

        for (original_index, new_offset) in new_offsets {
            self.slot_directory.slots[original_index].offset = new_offset;
        }

        self.free_space_offset = current_offset;
    }
}
