use std::sync::Mutex;

use lumbung::{
    DatabaseError,
    storage::{page_cache::PageCache, page_store::PageStore},
    types::{
        PageId, SeqNo,
        page::{Page, PageType},
    },
};

/// In-memory store with `count` formatted data pages (IDs 2..2+count).
fn store_with_pages(count: u32) -> Mutex<PageStore> {
    let mut store = PageStore::in_memory().unwrap();
    for i in 0..count {
        let page_id = store.allocate_page().unwrap();
        let mut page = Page::new(page_id, PageType::TableLeaf);
        page.insert_cell(format!("page {}", i).as_bytes()).unwrap();
        store.write_page(page_id, &page.to_bytes()).unwrap();
    }
    Mutex::new(store)
}

fn cell_text(page: &Page) -> String {
    String::from_utf8(page.get_cell(0).unwrap().to_vec()).unwrap()
}

const LATEST: SeqNo = SeqNo::MAX;

#[test]
fn test_fetch_faults_and_caches() {
    let store = store_with_pages(1);
    let cache = PageCache::new(8);

    let page = cache.fetch(2, LATEST, false, &store).unwrap();
    assert_eq!(cell_text(&page), "page 0");
    assert_eq!(cache.len(), 1);

    // Second fetch is a hit, not another fault.
    let again = cache.fetch(2, LATEST, false, &store).unwrap();
    assert_eq!(cell_text(&again), "page 0");
    assert_eq!(cache.len(), 1);
}

#[test]
fn test_fetch_out_of_range_propagates() {
    let store = store_with_pages(1);
    let cache = PageCache::new(8);
    let err = cache.fetch(50, LATEST, false, &store).unwrap_err();
    assert!(matches!(err, DatabaseError::OutOfRange { .. }));
}

#[test]
fn test_uncommitted_versions_are_writer_private() {
    let store = store_with_pages(1);
    let cache = PageCache::new(8);

    let mut copy = cache.fetch_mutable(2, &store).unwrap();
    copy.clear_cells();
    copy.insert_cell(b"modified").unwrap();
    cache.install(2, copy).unwrap();

    // Readers still see the committed image.
    let reader_view = cache.fetch(2, LATEST, false, &store).unwrap();
    assert_eq!(cell_text(&reader_view), "page 0");

    // The writer sees its own copy.
    let writer_view = cache.fetch(2, LATEST, true, &store).unwrap();
    assert_eq!(cell_text(&writer_view), "modified");
}

#[test]
fn test_promote_publishes_at_commit_seq() {
    let store = store_with_pages(1);
    let cache = PageCache::new(8);

    let mut copy = cache.fetch_mutable(2, &store).unwrap();
    copy.clear_cells();
    copy.insert_cell(b"v1").unwrap();
    cache.install(2, copy).unwrap();
    cache.promote(1).unwrap();

    // New snapshots see the commit; older snapshots keep the base image.
    let new_snapshot = cache.fetch(2, 1, false, &store).unwrap();
    assert_eq!(cell_text(&new_snapshot), "v1");
    let old_snapshot = cache.fetch(2, 0, false, &store).unwrap();
    assert_eq!(cell_text(&old_snapshot), "page 0");
}

#[test]
fn test_discard_uncommitted() {
    let store = store_with_pages(1);
    let cache = PageCache::new(8);

    let mut copy = cache.fetch_mutable(2, &store).unwrap();
    copy.clear_cells();
    copy.insert_cell(b"doomed").unwrap();
    cache.install(2, copy).unwrap();
    cache.discard_uncommitted().unwrap();

    let view = cache.fetch(2, LATEST, true, &store).unwrap();
    assert_eq!(cell_text(&view), "page 0");
}

#[test]
fn test_flush_dirty_writes_through() {
    let store = store_with_pages(1);
    let cache = PageCache::new(8);

    let mut copy = cache.fetch_mutable(2, &store).unwrap();
    copy.clear_cells();
    copy.insert_cell(b"durable").unwrap();
    cache.install(2, copy).unwrap();
    cache.promote(1).unwrap();
    cache.flush_dirty(&store).unwrap();

    let bytes = store.lock().unwrap().read_page(2).unwrap();
    let page = Page::from_bytes(&bytes).unwrap();
    assert_eq!(cell_text(&page), "durable");
}

#[test]
fn test_lru_eviction_bounds_len() {
    let store = store_with_pages(6);
    let cache = PageCache::new(2);

    for page_id in 2..8u32 {
        let page = cache.fetch(page_id as PageId, LATEST, false, &store).unwrap();
        drop(page);
        assert!(cache.len() <= 2);
    }

    // Evicted pages fault back in with the right content.
    for (i, page_id) in (2..8u32).enumerate() {
        let page = cache.fetch(page_id as PageId, LATEST, false, &store).unwrap();
        assert_eq!(cell_text(&page), format!("page {}", i));
    }
}

#[test]
fn test_outstanding_reference_blocks_eviction() {
    let store = store_with_pages(3);
    let cache = PageCache::new(2);

    let held_a = cache.fetch(2, LATEST, false, &store).unwrap();
    let held_b = cache.fetch(3, LATEST, false, &store).unwrap();

    // Both slots are referenced, so a third fetch cannot make room.
    let err = cache.fetch(4, LATEST, false, &store).unwrap_err();
    assert!(matches!(err, DatabaseError::CacheExhausted { .. }));

    drop(held_a);
    drop(held_b);
    assert!(cache.fetch(4, LATEST, false, &store).is_ok());
}

#[test]
fn test_fetch_mutable_on_full_dirty_cache_is_exhausted() {
    let store = store_with_pages(3);
    let cache = PageCache::new(2);

    // Page 2's base plus its dirty uncommitted copy fill the cache.
    let mut copy = cache.fetch_mutable(2, &store).unwrap();
    copy.clear_cells();
    copy.insert_cell(b"dirty").unwrap();
    cache.install(2, copy).unwrap();
    assert_eq!(cache.len(), 2);

    // Dirty pages are never evicted, so there is no room left.
    let err = cache.fetch_mutable(3, &store).unwrap_err();
    assert!(matches!(
        err,
        DatabaseError::CacheExhausted { capacity: 2 }
    ));
}

#[test]
fn test_prune_drops_superseded_versions() {
    let store = store_with_pages(1);
    let cache = PageCache::new(8);

    let mut copy = cache.fetch_mutable(2, &store).unwrap();
    copy.clear_cells();
    copy.insert_cell(b"v1").unwrap();
    cache.install(2, copy).unwrap();
    cache.promote(1).unwrap();
    cache.flush_dirty(&store).unwrap();
    assert_eq!(cache.len(), 2);

    // Once every live reader is at seq >= 1, the base is superseded.
    cache.set_snapshot_floor(1);
    cache.prune(1).unwrap();
    assert_eq!(cache.len(), 1);

    let view = cache.fetch(2, 1, false, &store).unwrap();
    assert_eq!(cell_text(&view), "v1");
}
