use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    storage::page_store::PageStore,
    types::{
        PageId, SeqNo,
        error::{DatabaseError, Result},
        page::Page,
    },
    utils::lock,
};

pub const DEFAULT_CACHE_PAGES: usize = 256;

/// One cached copy of a page. `seq` is the commit sequence that produced
/// it; `None` marks the active writer's uncommitted copy, invisible to
/// readers until promoted.
#[derive(Debug)]
struct CachedVersion {
    seq: Option<SeqNo>,
    page: Arc<Page>,
    dirty: bool,
    last_access: u64,
}

impl CachedVersion {
    fn is_committed(&self) -> bool {
        self.seq.is_some()
    }
}

#[derive(Debug)]
struct CacheInner {
    /// Committed versions sorted by ascending seq; the uncommitted copy,
    /// if any, is last.
    versions: HashMap<PageId, Vec<CachedVersion>>,
    len: usize,
    access_counter: u64,
}

/// Bounded, versioned cache of hot pages.
///
/// Readers resolve against the newest version at or below their snapshot
/// sequence, faulting the base image in from the page store on miss. The
/// single metadata mutex is held only for bookkeeping; store I/O happens
/// outside it. Capacity is counted in cached versions; eviction is LRU
/// among clean, newest-committed versions that nobody holds a reference to
/// and that no live reader could still need (seq at or below the snapshot
/// floor). Dirty versions are never evicted.
#[derive(Debug)]
pub struct PageCache {
    inner: Mutex<CacheInner>,
    capacity: usize,
    snapshot_floor: AtomicU64,
}

impl PageCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                versions: HashMap::new(),
                len: 0,
                access_counter: 0,
            }),
            capacity: capacity.max(1),
            snapshot_floor: AtomicU64::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.len,
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Oldest snapshot any live reader still needs.
    pub fn set_snapshot_floor(&self, floor: SeqNo) {
        self.snapshot_floor.store(floor, Ordering::SeqCst);
    }

    /// Shared read access to the newest version visible at `snapshot`.
    /// The writer passes `include_uncommitted` to see its own copies.
    pub fn fetch(
        &self,
        page_id: PageId,
        snapshot: SeqNo,
        include_uncommitted: bool,
        store: &Mutex<PageStore>,
    ) -> Result<Arc<Page>> {
        {
            let mut inner = lock(&self.inner)?;
            if let Some(page) = find_version(&mut inner, page_id, snapshot, include_uncommitted) {
                return Ok(page);
            }
        }

        // Miss: fault the base image in from the store, outside the
        // cache lock.
        let bytes = {
            let mut store = lock(store)?;
            store.read_page(page_id)?
        };
        let page = Arc::new(Page::from_bytes(&bytes)?);

        let mut inner = lock(&self.inner)?;
        if let Some(existing) = find_version(&mut inner, page_id, snapshot, include_uncommitted) {
            return Ok(existing);
        }
        self.ensure_room(&mut inner)?;
        inner.access_counter += 1;
        let last_access = inner.access_counter;
        let chain = inner.versions.entry(page_id).or_default();
        // The store image is the oldest state anyone can still observe.
        chain.insert(
            0,
            CachedVersion {
                seq: Some(0),
                page: page.clone(),
                dirty: false,
                last_access,
            },
        );
        inner.len += 1;
        Ok(page)
    }

    /// Exclusive write access: returns a private copy of the latest
    /// version and registers an uncommitted dirty version for the page.
    /// Callers mutate the copy and hand it back through `install`.
    pub fn fetch_mutable(&self, page_id: PageId, store: &Mutex<PageStore>) -> Result<Page> {
        {
            let mut inner = lock(&self.inner)?;
            inner.access_counter += 1;
            let counter = inner.access_counter;
            if let Some(chain) = inner.versions.get_mut(&page_id) {
                if let Some(version) = chain.last_mut() {
                    if !version.is_committed() {
                        version.last_access = counter;
                        return Ok((*version.page).clone());
                    }
                }
            }
        }

        // Make sure the latest committed version is resident, then clone
        // it into an uncommitted copy.
        let base = self.fetch(page_id, SeqNo::MAX, false, store)?;

        let mut inner = lock(&self.inner)?;
        self.ensure_room(&mut inner)?;
        inner.access_counter += 1;
        let last_access = inner.access_counter;
        let chain = inner.versions.entry(page_id).or_default();
        if let Some(version) = chain.last() {
            if !version.is_committed() {
                return Ok((*version.page).clone());
            }
        }
        chain.push(CachedVersion {
            seq: None,
            page: base.clone(),
            dirty: true,
            last_access,
        });
        inner.len += 1;
        Ok((*base).clone())
    }

    /// Install a mutated page as the page's uncommitted version, creating
    /// it if the page is brand new (freshly allocated).
    pub fn install(&self, page_id: PageId, page: Page) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        inner.access_counter += 1;
        let last_access = inner.access_counter;

        if let Some(version) = inner
            .versions
            .get_mut(&page_id)
            .and_then(|chain| chain.last_mut())
            .filter(|version| !version.is_committed())
        {
            version.page = Arc::new(page);
            version.dirty = true;
            version.last_access = last_access;
            return Ok(());
        }

        self.ensure_room(&mut inner)?;
        let chain = inner.versions.entry(page_id).or_default();
        chain.push(CachedVersion {
            seq: None,
            page: Arc::new(page),
            dirty: true,
            last_access,
        });
        inner.len += 1;
        Ok(())
    }

    /// The active writer's uncommitted pages, ordered by page ID.
    pub fn uncommitted_pages(&self) -> Result<Vec<(PageId, Arc<Page>)>> {
        let inner = lock(&self.inner)?;
        let mut pages: Vec<(PageId, Arc<Page>)> = inner
            .versions
            .iter()
            .filter_map(|(&page_id, chain)| {
                chain
                    .last()
                    .filter(|version| !version.is_committed())
                    .map(|version| (page_id, version.page.clone()))
            })
            .collect();
        pages.sort_by_key(|(page_id, _)| *page_id);
        Ok(pages)
    }

    /// Commit: stamp every uncommitted version with the commit sequence,
    /// making it visible to transactions that begin afterwards.
    pub fn promote(&self, commit_seq: SeqNo) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        for chain in inner.versions.values_mut() {
            if let Some(version) = chain.last_mut() {
                if !version.is_committed() {
                    version.seq = Some(commit_seq);
                }
            }
        }
        Ok(())
    }

    /// Abort: drop every uncommitted version without writing it anywhere.
    pub fn discard_uncommitted(&self) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        let mut removed = 0;
        for chain in inner.versions.values_mut() {
            let before = chain.len();
            chain.retain(|version| version.is_committed());
            removed += before - chain.len();
        }
        inner.versions.retain(|_, chain| !chain.is_empty());
        inner.len -= removed;
        Ok(())
    }

    /// Write every dirty committed version through to the page store and
    /// clear dirty flags. Invoked at checkpoint time.
    pub fn flush_dirty(&self, store: &Mutex<PageStore>) -> Result<()> {
        let targets: Vec<(PageId, Arc<Page>)> = {
            let inner = lock(&self.inner)?;
            inner
                .versions
                .iter()
                .filter_map(|(&page_id, chain)| {
                    chain
                        .iter()
                        .rev()
                        .find(|version| version.is_committed())
                        .filter(|version| version.dirty)
                        .map(|version| (page_id, version.page.clone()))
                })
                .collect()
        };

        if targets.is_empty() {
            return Ok(());
        }

        {
            let mut store = lock(store)?;
            for (page_id, page) in &targets {
                store.write_page(*page_id, &page.to_bytes())?;
            }
        }

        let mut inner = lock(&self.inner)?;
        for (page_id, _) in &targets {
            if let Some(chain) = inner.versions.get_mut(page_id) {
                for version in chain.iter_mut() {
                    if version.is_committed() {
                        version.dirty = false;
                    }
                }
            }
        }
        Ok(())
    }

    /// Drop committed versions superseded for every live reader: a version
    /// is prunable when a newer committed version exists with seq at or
    /// below the snapshot floor.
    pub fn prune(&self, floor: SeqNo) -> Result<()> {
        let mut inner = lock(&self.inner)?;
        let mut removed = 0;
        for chain in inner.versions.values_mut() {
            let keep_from = chain
                .iter()
                .rposition(|version| {
                    version
                        .seq
                        .map(|seq| seq <= floor)
                        .unwrap_or(false)
                })
                .unwrap_or(0);
            if keep_from > 0 {
                let drained: Vec<CachedVersion> = chain.drain(..keep_from).collect();
                removed += drained.iter().filter(|version| !version.dirty).count();
                // Never drop a dirty version: it has not been
                // checkpointed yet. Re-insert any that were caught.
                let mut dirty: Vec<CachedVersion> = drained
                    .into_iter()
                    .filter(|version| version.dirty)
                    .collect();
                if !dirty.is_empty() {
                    dirty.append(chain);
                    *chain = dirty;
                }
            }
        }
        inner.versions.retain(|_, chain| !chain.is_empty());
        inner.len -= removed;
        Ok(())
    }

    /// Evict the least-recently-used candidate, if any. Returns whether a
    /// version was dropped.
    pub fn evict(&self) -> Result<bool> {
        let floor = self.snapshot_floor.load(Ordering::SeqCst);
        let mut inner = lock(&self.inner)?;
        Ok(evict_one(&mut inner, floor))
    }

    /// Evict until there is room for one more version. Fails with
    /// `CacheExhausted` when every resident version is dirty, referenced,
    /// or still needed by a live reader.
    fn ensure_room(&self, inner: &mut CacheInner) -> Result<()> {
        let floor = self.snapshot_floor.load(Ordering::SeqCst);
        while inner.len >= self.capacity {
            if !evict_one(inner, floor) {
                return Err(DatabaseError::CacheExhausted {
                    capacity: self.capacity,
                });
            }
        }
        Ok(())
    }
}

/// Drop the LRU version that is clean, unreferenced, the newest committed
/// for its page, and at or below the snapshot floor.
fn evict_one(inner: &mut CacheInner, floor: SeqNo) -> bool {
    let mut victim: Option<(PageId, u64)> = None;
    for (&page_id, chain) in inner.versions.iter() {
        let Some(index) = chain.iter().rposition(|version| version.is_committed()) else {
            continue;
        };
        let version = &chain[index];
        if version.dirty {
            continue;
        }
        if Arc::strong_count(&version.page) > 1 {
            continue;
        }
        if version.seq.unwrap_or(0) > floor {
            continue;
        }
        match victim {
            Some((_, access)) if access <= version.last_access => {}
            _ => victim = Some((page_id, version.last_access)),
        }
    }

    let Some((page_id, _)) = victim else {
        return false;
    };
    if let Some(chain) = inner.versions.get_mut(&page_id) {
        if let Some(index) = chain.iter().rposition(|version| version.is_committed()) {
            chain.remove(index);
            inner.len -= 1;
        }
        if chain.is_empty() {
            inner.versions.remove(&page_id);
        }
    }
    true
}

fn find_version(
    inner: &mut CacheInner,
    page_id: PageId,
    snapshot: SeqNo,
    include_uncommitted: bool,
) -> Option<Arc<Page>> {
    inner.access_counter += 1;
    let counter = inner.access_counter;
    let chain = inner.versions.get_mut(&page_id)?;
    for version in chain.iter_mut().rev() {
        match version.seq {
            None if include_uncommitted => {
                version.last_access = counter;
                return Some(version.page.clone());
            }
            None => continue,
            Some(seq) if seq <= snapshot => {
                version.last_access = counter;
                return Some(version.page.clone());
            }
            Some(_) => continue,
        }
    }
    None
}
