//! Buffer pool manager.

use crate::disk::DiskManager;
use crate::eviction::{EvictionPolicy, SecondChancePolicy};
use crate::frame::{BufferFrame, FrameId};
use arbor_common::page::{PageId, PAGE_SIZE};
use arbor_common::{ArborError, Result};
use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;
use std::collections::HashMap;
use std::sync::Arc;
use sysinfo::System;

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

impl BufferPoolConfig {
    /// Sizes the pool to 25% of available system RAM.
    ///
    /// Minimum 1,000 frames to ensure useful caching even on low-memory
    /// systems.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self { num_frames }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for new pages
/// - Second-chance victim selection, with write-back of dirty victims
/// - Pin counting for concurrent access
///
/// The pool owns the disk manager: a fetch miss reads the page in, and
/// eviction flushes dirty victims out. Callers never see disk traffic.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<Arc<BufferFrame>>,
    /// Page ID to frame ID mapping.
    page_table: RwLock<HashMap<PageId, FrameId>>,
    /// List of free frame IDs.
    free_list: Mutex<Vec<FrameId>>,
    /// Victim selection for full pools.
    policy: SecondChancePolicy,
    /// Backing storage.
    disk: DiskManager,
}

impl BufferPool {
    /// Creates a new buffer pool over the given disk manager.
    pub fn new(config: BufferPoolConfig, disk: DiskManager) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| Arc::new(BufferFrame::new(FrameId(i as u32))))
            .collect();

        // All frames start in the free list
        let free_list: Vec<_> = (0..num_frames).map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: RwLock::new(HashMap::with_capacity(num_frames)),
            free_list: Mutex::new(free_list),
            policy: SecondChancePolicy::new(num_frames),
            disk,
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently resident in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.read().len()
    }

    /// Checks if a page is resident in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.read().contains_key(&page_id)
    }

    /// Allocates a brand-new page and returns it pinned.
    ///
    /// The page id comes from the disk manager; the frame is zeroed.
    pub fn new_page(self: &Arc<Self>) -> Result<PageGuard> {
        let frame_id = self.claim_frame()?;
        let page_id = self.disk.allocate_page();

        let frame = Arc::clone(&self.frames[frame_id.0 as usize]);
        frame.clear();
        frame.zero();
        frame.set_page_id(Some(page_id));
        frame.pin();

        self.policy.frame_pinned(frame_id);
        self.page_table.write().insert(page_id, frame_id);

        Ok(PageGuard::new(Arc::clone(self), frame, page_id))
    }

    /// Fetches a page, reading it from disk if not resident.
    ///
    /// The page is pinned before being returned.
    pub fn fetch_page(self: &Arc<Self>, page_id: PageId) -> Result<PageGuard> {
        if !page_id.is_valid() {
            return Err(ArborError::PageNotFound {
                page_id: page_id.as_u32(),
            });
        }

        // Fast path: resident page. Pin while holding the table lock so a
        // concurrent eviction cannot steal the frame between lookup and pin.
        let resident = {
            let table = self.page_table.read();
            table.get(&page_id).map(|&frame_id| {
                let frame = Arc::clone(&self.frames[frame_id.0 as usize]);
                frame.pin();
                (frame_id, frame)
            })
        };
        if let Some((frame_id, frame)) = resident {
            self.policy.frame_pinned(frame_id);
            return Ok(PageGuard::new(Arc::clone(self), frame, page_id));
        }

        // Miss: read from disk before claiming a frame, so a missing page
        // costs no eviction.
        let data = self.disk.read_page(page_id)?;
        let frame_id = self.claim_frame()?;
        let frame = Arc::clone(&self.frames[frame_id.0 as usize]);

        let mut table = self.page_table.write();
        let existing = table.get(&page_id).copied();
        if let Some(existing) = existing {
            // Another thread loaded the page while we were reading; use
            // theirs and return our claimed frame to the free list.
            let existing_frame = Arc::clone(&self.frames[existing.0 as usize]);
            existing_frame.pin();
            drop(table);
            self.free_list.lock().push(frame_id);
            self.policy.frame_pinned(existing);
            return Ok(PageGuard::new(Arc::clone(self), existing_frame, page_id));
        }

        frame.clear();
        frame.fill_from(&data);
        frame.set_page_id(Some(page_id));
        frame.pin();
        table.insert(page_id, frame_id);
        drop(table);

        self.policy.frame_pinned(frame_id);
        Ok(PageGuard::new(Arc::clone(self), frame, page_id))
    }

    /// Claims a frame for a new resident page.
    ///
    /// Tries the free list first, then evicts a victim, flushing it to
    /// disk if dirty.
    fn claim_frame(&self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_list.lock().pop() {
            return Ok(frame_id);
        }

        let victim_id = self.policy.pick_victim().ok_or(ArborError::BufferPoolFull)?;
        let frame = &self.frames[victim_id.0 as usize];

        // Detach the victim from the page table before touching its data.
        // The table write lock excludes fetchers, so nobody can re-pin the
        // old page once it is gone from the table.
        {
            let mut table = self.page_table.write();
            if frame.is_pinned() {
                // Lost a race with a fetch; the eventual unpin re-offers
                // the frame to the policy
                return Err(ArborError::BufferPoolFull);
            }
            if let Some(old_page_id) = frame.page_id() {
                table.remove(&old_page_id);
            }
        }

        if frame.is_dirty() {
            if let Some(old_page_id) = frame.page_id() {
                let data = frame.data();
                self.disk.write_page(old_page_id, &data)?;
            }
            frame.set_dirty(false);
        }

        Ok(victim_id)
    }

    /// Unpins a page.
    ///
    /// Exactly one call per pin. If the pin count reaches zero the frame
    /// becomes evictable.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let table = self.page_table.read();
        if let Some(&frame_id) = table.get(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if is_dirty {
                frame.set_dirty(true);
            }

            if frame.unpin() == 0 {
                self.policy.frame_unpinned(frame_id);
            }
            return true;
        }
        false
    }

    /// Deletes a page from the buffer pool and releases its disk allocation.
    ///
    /// Returns false if the page is pinned or not resident.
    pub fn delete_page(&self, page_id: PageId) -> bool {
        let mut table = self.page_table.write();
        let frame_id = match table.get(&page_id).copied() {
            Some(frame_id) => frame_id,
            None => return false,
        };
        let frame = &self.frames[frame_id.0 as usize];

        if frame.is_pinned() {
            return false;
        }

        table.remove(&page_id);
        drop(table);

        self.policy.forget(frame_id);
        frame.clear();
        self.free_list.lock().push(frame_id);
        self.disk.deallocate_page(page_id);

        true
    }

    /// Flushes a page to disk if it is resident and dirty.
    ///
    /// Returns true if the page was written.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let table = self.page_table.read();
        if let Some(&frame_id) = table.get(&page_id) {
            let frame = &self.frames[frame_id.0 as usize];

            if frame.is_dirty() {
                let data = frame.data();
                self.disk.write_page(page_id, &data)?;
                drop(data);
                frame.set_dirty(false);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Flushes all dirty resident pages to disk.
    ///
    /// Returns the number of pages written.
    pub fn flush_all(&self) -> Result<usize> {
        let resident: Vec<PageId> = self.page_table.read().keys().copied().collect();

        let mut flushed = 0;
        for page_id in resident {
            if self.flush_page(page_id)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;

        let table = self.page_table.read();
        for &frame_id in table.values() {
            let frame = &self.frames[frame_id.0 as usize];
            if frame.is_pinned() {
                pinned_frames += 1;
            }
            if frame.is_dirty() {
                dirty_frames += 1;
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            free_frames: self.free_count(),
            used_frames: table.len(),
            pinned_frames,
            dirty_frames,
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of free frames.
    pub free_frames: usize,
    /// Number of frames with pages.
    pub used_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

/// Scoped handle to a pinned page.
///
/// Holds exactly one pin and releases it on drop. Any `write()` access
/// marks the guard dirty, so the page is unpinned dirty iff it was
/// written and clean otherwise.
pub struct PageGuard {
    pool: Arc<BufferPool>,
    frame: Arc<BufferFrame>,
    page_id: PageId,
    dirty: Cell<bool>,
}

impl PageGuard {
    fn new(pool: Arc<BufferPool>, frame: Arc<BufferFrame>, page_id: PageId) -> Self {
        Self {
            pool,
            frame,
            page_id,
            dirty: Cell::new(false),
        }
    }

    /// Returns the page ID.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Returns read access to the page data.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.data()
    }

    /// Returns write access to the page data and marks the guard dirty.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty.set(true);
        self.frame.data_mut()
    }

    /// Marks the guard dirty without writing through it.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }

    /// Returns true if this guard will unpin dirty.
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty.get());
    }
}
