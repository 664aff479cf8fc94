use lumbung::types::{
    PAGE_SIZE,
    page::{Page, PageType},
};

#[test]
fn test_new_page_is_empty() {
    let page = Page::new(3, PageType::TableLeaf);
    assert_eq!(page.cell_count, 0);
    assert_eq!(page.free_space_offset, PAGE_SIZE as u16);
    assert!(page.next_page.is_none());
    assert!(page.get_cell(0).is_none());
}

#[test]
fn test_insert_and_get_cells() {
    let mut page = Page::new(1, PageType::TableLeaf);
    let first = page.insert_cell(b"first cell").unwrap();
    let second = page.insert_cell(b"second").unwrap();

    assert_eq!(first, 0);
    assert_eq!(second, 1);
    assert_eq!(page.cell_count, 2);
    assert_eq!(page.get_cell(0).unwrap(), b"first cell");
    assert_eq!(page.get_cell(1).unwrap(), b"second");
}

#[test]
fn test_delete_cell_compacts() {
    let mut page = Page::new(1, PageType::TableLeaf);
    page.insert_cell(b"aaaa").unwrap();
    page.insert_cell(b"bbbb").unwrap();
    page.insert_cell(b"cccc").unwrap();
    let before = page.available_space();

    page.delete_cell(1).unwrap();

    assert_eq!(page.cell_count, 2);
    assert_eq!(page.get_cell(0).unwrap(), b"aaaa");
    assert_eq!(page.get_cell(1).unwrap(), b"cccc");
    // Compaction reclaims the deleted cell's space plus its slot.
    assert!(page.available_space() > before);
}

#[test]
fn test_delete_invalid_slot() {
    let mut page = Page::new(1, PageType::TableLeaf);
    page.insert_cell(b"only").unwrap();
    assert!(page.delete_cell(5).is_err());
}

#[test]
fn test_page_full() {
    let mut page = Page::new(1, PageType::TableLeaf);
    let big = vec![0u8; 2000];
    page.insert_cell(&big).unwrap();
    page.insert_cell(&big).unwrap();
    // Third 2000-byte cell cannot fit in a 4096-byte page.
    assert!(!page.can_fit(big.len()));
    assert!(page.insert_cell(&big).is_err());
}

#[test]
fn test_serialization_roundtrip() {
    let mut page = Page::new(7, PageType::TableLeaf);
    page.next_page = Some(9);
    page.insert_cell(b"hello").unwrap();
    page.insert_cell(b"world!").unwrap();

    let bytes = page.to_bytes();
    assert_eq!(bytes.len(), PAGE_SIZE);

    let decoded = Page::from_bytes(&bytes).unwrap();
    assert_eq!(decoded.page_id, 7);
    assert_eq!(decoded.page_type, PageType::TableLeaf);
    assert_eq!(decoded.next_page, Some(9));
    assert_eq!(decoded.cell_count, 2);
    assert_eq!(decoded.get_cell(0).unwrap(), b"hello");
    assert_eq!(decoded.get_cell(1).unwrap(), b"world!");
}

#[test]
fn test_from_bytes_rejects_bad_input() {
    assert!(Page::from_bytes(&[0u8; 10]).is_err());

    // Unknown page type.
    let mut bytes = Page::new(1, PageType::TableLeaf).to_bytes();
    bytes[4] = 99;
    assert!(Page::from_bytes(&bytes).is_err());

    // Slot pointing past the page boundary.
    let mut page = Page::new(1, PageType::TableLeaf);
    page.insert_cell(b"data").unwrap();
    let mut bytes = page.to_bytes();
    bytes[16] = 0xff;
    bytes[17] = 0xff;
    assert!(Page::from_bytes(&bytes).is_err());
}

#[test]
fn test_clear_cells() {
    let mut page = Page::new(2, PageType::TableLeaf);
    page.next_page = Some(3);
    page.insert_cell(b"row").unwrap();
    page.clear_cells();

    assert_eq!(page.cell_count, 0);
    assert_eq!(page.free_space_offset, PAGE_SIZE as u16);
    // The chain link survives a clear.
    assert_eq!(page.next_page, Some(3));
}
