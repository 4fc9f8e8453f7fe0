//! Page identity for ArborDB storage.

use serde::{Deserialize, Serialize};

/// Page size in bytes (4 KB).
pub const PAGE_SIZE: usize = 4096;

/// Unique identifier for a page within the data file.
///
/// Page ids are dense 32-bit integers assigned by the disk manager.
/// Two values are reserved: `INVALID` ("no page") and `HEADER` (the
/// catalog page at the start of the file).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel denoting the absence of a page.
    pub const INVALID: PageId = PageId(u32::MAX);

    /// The reserved header page holding catalog records.
    pub const HEADER: PageId = PageId(0);

    /// Creates a new PageId.
    pub fn new(page_num: u32) -> Self {
        Self(page_num)
    }

    /// Returns true unless this is the `INVALID` sentinel.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Returns the raw page number.
    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_valid() {
            write!(f, "page:{}", self.0)
        } else {
            write!(f, "page:invalid")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_constant() {
        assert_eq!(PAGE_SIZE, 4096);
    }

    #[test]
    fn test_page_id_new() {
        let page_id = PageId::new(42);
        assert_eq!(page_id.as_u32(), 42);
        assert!(page_id.is_valid());
    }

    #[test]
    fn test_page_id_sentinels() {
        assert!(!PageId::INVALID.is_valid());
        assert!(PageId::HEADER.is_valid());
        assert_eq!(PageId::HEADER.as_u32(), 0);
        assert_ne!(PageId::HEADER, PageId::INVALID);
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(PageId::new(7).to_string(), "page:7");
        assert_eq!(PageId::INVALID.to_string(), "page:invalid");
    }

    #[test]
    fn test_page_id_hash() {
        use std::collections::HashSet;

        let mut set = HashSet::new();
        set.insert(PageId::new(1));
        set.insert(PageId::new(2));
        set.insert(PageId::new(1)); // Duplicate

        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_page_id_serde_roundtrip() {
        let original = PageId::new(500);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: PageId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }
}
