use std::fs;
use std::io::Write;

use lumbung::{
    storage::{
        page_store::PageStore,
        wal::{Wal, wal_path_for},
    },
    types::{
        PAGE_SIZE,
        page::{Page, PageType},
    },
    utils::mock::create_temp_db_path_with_prefix,
};

fn page_with_cell(page_id: u32, cell: &[u8]) -> Vec<u8> {
    let mut page = Page::new(page_id, PageType::TableLeaf);
    page.insert_cell(cell).unwrap();
    page.to_bytes()
}

fn cleanup(path: &std::path::Path) {
    let _ = fs::remove_file(path);
    let _ = fs::remove_file(wal_path_for(path));
}

#[test]
fn test_recover_applies_committed_frames() {
    let path = create_temp_db_path_with_prefix("wal_commit");
    let mut store = PageStore::create(&path, false).unwrap();
    let page_id = store.allocate_page().unwrap();

    let image = page_with_cell(page_id, b"recovered");
    let mut wal = Wal::open(&path).unwrap();
    wal.append_frame(page_id, &image, 1).unwrap();
    wal.append_commit(1).unwrap();
    wal.sync().unwrap();

    let (replayed, seq) = wal.recover(&mut store).unwrap();
    assert!(replayed.contains(&page_id));
    assert_eq!(seq, 1);

    let page = Page::from_bytes(&store.read_page(page_id).unwrap()).unwrap();
    assert_eq!(page.get_cell(0).unwrap(), b"recovered");

    // Recovery truncates the log so startup is idempotent.
    assert_eq!(wal.size().unwrap(), 0);
    cleanup(&path);
}

#[test]
fn test_recover_ignores_frames_without_commit_marker() {
    let path = create_temp_db_path_with_prefix("wal_uncommitted");
    let mut store = PageStore::create(&path, false).unwrap();
    let page_id = store.allocate_page().unwrap();
    let original = page_with_cell(page_id, b"original");
    store.write_page(page_id, &original).unwrap();
    store.sync().unwrap();

    let mut wal = Wal::open(&path).unwrap();
    let abandoned = page_with_cell(page_id, b"abandoned");
    wal.append_frame(page_id, &abandoned, 1).unwrap();
    wal.sync().unwrap();

    let (replayed, seq) = wal.recover(&mut store).unwrap();
    assert!(replayed.is_empty());
    assert_eq!(seq, 0);

    let page = Page::from_bytes(&store.read_page(page_id).unwrap()).unwrap();
    assert_eq!(page.get_cell(0).unwrap(), b"original");
    cleanup(&path);
}

#[test]
fn test_recover_trims_torn_tail() {
    let path = create_temp_db_path_with_prefix("wal_torn");
    let mut store = PageStore::create(&path, false).unwrap();
    let page_id = store.allocate_page().unwrap();

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append_frame(page_id, &page_with_cell(page_id, b"first"), 1)
            .unwrap();
        wal.append_commit(1).unwrap();
        wal.append_frame(page_id, &page_with_cell(page_id, b"second"), 2)
            .unwrap();
        wal.append_commit(2).unwrap();
        wal.sync().unwrap();
    }

    // Crash mid-write: the second commit marker loses its tail.
    let wal_path = wal_path_for(&path);
    let full_len = fs::metadata(&wal_path).unwrap().len();
    let file = fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.set_len(full_len - 100).unwrap();
    drop(file);

    let mut wal = Wal::open(&path).unwrap();
    let (replayed, seq) = wal.recover(&mut store).unwrap();
    assert!(replayed.contains(&page_id));
    assert_eq!(seq, 1);

    // Only the first commit survives; the torn second one is dropped.
    let page = Page::from_bytes(&store.read_page(page_id).unwrap()).unwrap();
    assert_eq!(page.get_cell(0).unwrap(), b"first");
    cleanup(&path);
}

#[test]
fn test_recover_stops_at_corrupt_frame() {
    let path = create_temp_db_path_with_prefix("wal_corrupt");
    let mut store = PageStore::create(&path, false).unwrap();
    let page_id = store.allocate_page().unwrap();
    let original = page_with_cell(page_id, b"original");
    store.write_page(page_id, &original).unwrap();

    {
        let mut wal = Wal::open(&path).unwrap();
        wal.append_frame(page_id, &page_with_cell(page_id, b"patched"), 1)
            .unwrap();
        wal.append_commit(1).unwrap();
        wal.sync().unwrap();
    }

    // Flip a byte inside the first frame's image.
    let wal_path = wal_path_for(&path);
    let mut bytes = fs::read(&wal_path).unwrap();
    bytes[100] ^= 0xff;
    let mut file = fs::OpenOptions::new().write(true).open(&wal_path).unwrap();
    file.write_all(&bytes).unwrap();
    drop(file);

    let mut wal = Wal::open(&path).unwrap();
    let (replayed, seq) = wal.recover(&mut store).unwrap();
    assert!(replayed.is_empty());
    assert_eq!(seq, 0);

    let page = Page::from_bytes(&store.read_page(page_id).unwrap()).unwrap();
    assert_eq!(page.get_cell(0).unwrap(), b"original");
    cleanup(&path);
}

#[test]
fn test_recover_extends_store_for_new_pages() {
    let path = create_temp_db_path_with_prefix("wal_extend");
    let mut store = PageStore::create(&path, false).unwrap();
    assert_eq!(store.page_count(), 2);

    // A frame for a page the file never grew to before the crash.
    let image = page_with_cell(5, b"late page");
    let mut wal = Wal::open(&path).unwrap();
    wal.append_frame(5, &image, 1).unwrap();
    wal.append_commit(1).unwrap();
    wal.sync().unwrap();

    let (replayed, _) = wal.recover(&mut store).unwrap();
    assert!(replayed.contains(&5));
    assert!(store.page_count() >= 6);

    let page = Page::from_bytes(&store.read_page(5).unwrap()).unwrap();
    assert_eq!(page.get_cell(0).unwrap(), b"late page");
    cleanup(&path);
}

#[test]
fn test_commit_marker_only_covers_earlier_sequences() {
    let path = create_temp_db_path_with_prefix("wal_seq_gate");
    let mut store = PageStore::create(&path, false).unwrap();
    let page_id = store.allocate_page().unwrap();
    let original = page_with_cell(page_id, b"original");
    store.write_page(page_id, &original).unwrap();

    let mut wal = Wal::open(&path).unwrap();
    // Frame from a later transaction than the marker commits.
    wal.append_frame(page_id, &page_with_cell(page_id, b"future"), 2)
        .unwrap();
    wal.append_commit(1).unwrap();
    wal.sync().unwrap();

    let (replayed, seq) = wal.recover(&mut store).unwrap();
    assert!(replayed.is_empty());
    assert_eq!(seq, 1);

    let page = Page::from_bytes(&store.read_page(page_id).unwrap()).unwrap();
    assert_eq!(page.get_cell(0).unwrap(), b"original");
    cleanup(&path);
}

#[test]
fn test_append_frame_rejects_wrong_image_size() {
    let path = create_temp_db_path_with_prefix("wal_size");
    let mut wal = Wal::open(&path).unwrap();
    assert!(wal.append_frame(1, &[0u8; 100], 1).is_err());
    assert!(wal.append_frame(1, &vec![0u8; PAGE_SIZE], 1).is_ok());
    cleanup(&path);
}
