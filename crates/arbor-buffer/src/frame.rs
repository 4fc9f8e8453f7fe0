//! Buffer frames: the fixed slots of the pool that pages move through.

use arbor_common::page::{PageId, PAGE_SIZE};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Position of a frame within the pool's frame array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: FrameId = FrameId(u32::MAX);

    /// Returns true if this is a valid frame ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// One page-sized slot in the buffer pool.
///
/// A frame pairs the page bytes with the bookkeeping the pool needs to
/// manage residency: which page currently occupies the slot, how many
/// users hold it pinned, and whether the bytes differ from disk. All
/// bookkeeping is atomic; the bytes themselves sit behind a reader-writer
/// lock.
pub struct BufferFrame {
    /// Position in the pool.
    frame_id: FrameId,
    /// The occupying page; `PageId::INVALID` when the slot is free.
    resident: AtomicU32,
    /// Users currently holding this slot; nonzero blocks eviction.
    pin_count: AtomicU32,
    /// True once the bytes diverge from what disk holds.
    dirty: AtomicBool,
    /// The page bytes.
    bytes: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl BufferFrame {
    /// Creates a free frame at the given position.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            resident: AtomicU32::new(PageId::INVALID.0),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
            bytes: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns this frame's position in the pool.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the occupying page, if any.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        match PageId(self.resident.load(Ordering::Acquire)) {
            id if id.is_valid() => Some(id),
            _ => None,
        }
    }

    /// Records which page occupies the slot (None frees it).
    #[inline]
    pub fn set_page_id(&self, page_id: Option<PageId>) {
        self.resident
            .store(page_id.unwrap_or(PageId::INVALID).0, Ordering::Release);
    }

    /// Returns the number of users holding the slot.
    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    /// Takes one hold on the slot; returns the new pin count.
    #[inline]
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Releases one hold; returns the new pin count.
    ///
    /// Releasing an already-free slot stays at zero rather than wrapping.
    #[inline]
    pub fn unpin(&self) -> u32 {
        match self
            .pin_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            }) {
            Ok(previous) => previous - 1,
            Err(_) => 0,
        }
    }

    /// Returns true while any user holds the slot.
    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    /// Returns true if the bytes differ from what disk holds.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Records whether the bytes differ from disk.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }

    /// Read access to the page bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.bytes.read()
    }

    /// Write access to the page bytes.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.bytes.write()
    }

    /// Overwrites the front of the buffer with the given bytes.
    pub fn fill_from(&self, data: &[u8]) {
        self.bytes.write()[..data.len()].copy_from_slice(data);
    }

    /// Blanks the buffer.
    pub fn zero(&self) {
        self.bytes.write().fill(0);
    }

    /// Returns the slot to its free state: no page, no holds, clean.
    pub fn clear(&self) {
        self.resident.store(PageId::INVALID.0, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
        self.dirty.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_id_sentinels() {
        assert!(!FrameId::INVALID.is_valid());
        assert!(FrameId(0).is_valid());
        assert_eq!(FrameId(3).to_string(), "frame:3");
    }

    #[test]
    fn test_fresh_frame_is_free() {
        let frame = BufferFrame::new(FrameId(5));
        assert_eq!(frame.frame_id(), FrameId(5));
        assert_eq!(frame.page_id(), None);
        assert!(!frame.is_pinned());
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_residency_tracking() {
        let frame = BufferFrame::new(FrameId(0));

        frame.set_page_id(Some(PageId::new(11)));
        assert_eq!(frame.page_id(), Some(PageId::new(11)));

        frame.set_page_id(None);
        assert_eq!(frame.page_id(), None);
    }

    #[test]
    fn test_pin_counts_nest() {
        let frame = BufferFrame::new(FrameId(0));

        assert_eq!(frame.pin(), 1);
        assert_eq!(frame.pin(), 2);
        assert!(frame.is_pinned());

        assert_eq!(frame.unpin(), 1);
        assert_eq!(frame.unpin(), 0);
        assert!(!frame.is_pinned());
    }

    #[test]
    fn test_unpin_of_free_frame_stays_at_zero() {
        let frame = BufferFrame::new(FrameId(0));
        assert_eq!(frame.unpin(), 0);
        assert_eq!(frame.unpin(), 0);
        assert_eq!(frame.pin_count(), 0);
    }

    #[test]
    fn test_dirty_flag() {
        let frame = BufferFrame::new(FrameId(0));
        frame.set_dirty(true);
        assert!(frame.is_dirty());
        frame.set_dirty(false);
        assert!(!frame.is_dirty());
    }

    #[test]
    fn test_bytes_survive_fill_and_read() {
        let frame = BufferFrame::new(FrameId(0));
        frame.fill_from(&[0x5A; 32]);

        let bytes = frame.data();
        assert_eq!(bytes[0], 0x5A);
        assert_eq!(bytes[31], 0x5A);
        assert_eq!(bytes[32], 0);
    }

    #[test]
    fn test_zero_blanks_everything() {
        let frame = BufferFrame::new(FrameId(0));
        frame.fill_from(&[0xEE; PAGE_SIZE]);
        frame.zero();
        assert!(frame.data().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_clear_frees_the_slot() {
        let frame = BufferFrame::new(FrameId(0));
        frame.set_page_id(Some(PageId::new(3)));
        frame.pin();
        frame.set_dirty(true);

        frame.clear();
        assert_eq!(frame.page_id(), None);
        assert!(!frame.is_pinned());
        assert!(!frame.is_dirty());
    }
}
