//! Root persistence via catalog records on the reserved header page.
//!
//! The header page (`PageId::HEADER`) holds a packed array of
//! `(index name, root page id)` records behind a record count. The tree
//! inserts its record when the root is first published and updates it on
//! every subsequent root change.

use arbor_common::page::{PageId, PAGE_SIZE};
use arbor_common::{ArborError, Result};

const OFF_COUNT: usize = 0;
const RECORDS_START: usize = 4;

/// View over the header page's catalog records.
pub struct CatalogPage {
    /// Page data buffer.
    data: Box<[u8; PAGE_SIZE]>,
}

impl CatalogPage {
    /// Maximum index name length in bytes.
    pub const NAME_MAX: usize = 32;

    /// On-disk record width: zero-padded name plus root page id.
    pub const RECORD_SIZE: usize = Self::NAME_MAX + 4;

    /// Number of records the page can hold.
    pub const CAPACITY: usize = (PAGE_SIZE - RECORDS_START) / Self::RECORD_SIZE;

    /// Creates a catalog view from raw page bytes.
    pub fn from_bytes(data: &[u8; PAGE_SIZE]) -> Self {
        Self {
            data: Box::new(*data),
        }
    }

    /// Returns the raw page data.
    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    /// Returns the number of records stored.
    pub fn record_count(&self) -> usize {
        u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]) as usize
    }

    fn set_record_count(&mut self, count: usize) {
        self.data[OFF_COUNT..OFF_COUNT + 4].copy_from_slice(&(count as u32).to_le_bytes());
    }

    fn record_offset(index: usize) -> usize {
        RECORDS_START + index * Self::RECORD_SIZE
    }

    fn encode_name(name: &str) -> Result<[u8; Self::NAME_MAX]> {
        let bytes = name.as_bytes();
        if bytes.is_empty() || bytes.len() > Self::NAME_MAX {
            return Err(ArborError::InvalidIndexName {
                len: bytes.len(),
                max: Self::NAME_MAX,
            });
        }
        let mut buf = [0u8; Self::NAME_MAX];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(buf)
    }

    fn find(&self, encoded: &[u8; Self::NAME_MAX]) -> Option<usize> {
        (0..self.record_count()).find(|&i| {
            let off = Self::record_offset(i);
            &self.data[off..off + Self::NAME_MAX] == encoded
        })
    }

    /// Returns the root page id recorded under the given name.
    pub fn record(&self, name: &str) -> Option<PageId> {
        let encoded = Self::encode_name(name).ok()?;
        self.find(&encoded).map(|i| {
            let off = Self::record_offset(i) + Self::NAME_MAX;
            PageId::new(u32::from_le_bytes([
                self.data[off],
                self.data[off + 1],
                self.data[off + 2],
                self.data[off + 3],
            ]))
        })
    }

    /// Inserts a new record.
    ///
    /// Returns false if a record with this name already exists.
    pub fn insert_record(&mut self, name: &str, root: PageId) -> Result<bool> {
        let encoded = Self::encode_name(name)?;
        if self.find(&encoded).is_some() {
            return Ok(false);
        }

        let count = self.record_count();
        if count >= Self::CAPACITY {
            return Err(ArborError::CatalogFull);
        }

        let off = Self::record_offset(count);
        self.data[off..off + Self::NAME_MAX].copy_from_slice(&encoded);
        self.data[off + Self::NAME_MAX..off + Self::RECORD_SIZE]
            .copy_from_slice(&root.as_u32().to_le_bytes());
        self.set_record_count(count + 1);
        Ok(true)
    }

    /// Rewrites the root page id of an existing record.
    ///
    /// Returns false if no record with this name exists.
    pub fn update_record(&mut self, name: &str, root: PageId) -> bool {
        let Ok(encoded) = Self::encode_name(name) else {
            return false;
        };
        match self.find(&encoded) {
            Some(i) => {
                let off = Self::record_offset(i) + Self::NAME_MAX;
                self.data[off..off + 4].copy_from_slice(&root.as_u32().to_le_bytes());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_catalog() -> CatalogPage {
        CatalogPage::from_bytes(&[0u8; PAGE_SIZE])
    }

    #[test]
    fn test_catalog_empty() {
        let catalog = empty_catalog();
        assert_eq!(catalog.record_count(), 0);
        assert_eq!(catalog.record("missing"), None);
    }

    #[test]
    fn test_catalog_insert_and_lookup() {
        let mut catalog = empty_catalog();

        assert!(catalog.insert_record("orders_pk", PageId::new(5)).unwrap());
        assert!(catalog.insert_record("users_pk", PageId::new(9)).unwrap());

        assert_eq!(catalog.record_count(), 2);
        assert_eq!(catalog.record("orders_pk"), Some(PageId::new(5)));
        assert_eq!(catalog.record("users_pk"), Some(PageId::new(9)));
        assert_eq!(catalog.record("other"), None);
    }

    #[test]
    fn test_catalog_insert_duplicate() {
        let mut catalog = empty_catalog();

        assert!(catalog.insert_record("idx", PageId::new(1)).unwrap());
        assert!(!catalog.insert_record("idx", PageId::new(2)).unwrap());

        // Original record untouched
        assert_eq!(catalog.record("idx"), Some(PageId::new(1)));
    }

    #[test]
    fn test_catalog_update() {
        let mut catalog = empty_catalog();

        assert!(!catalog.update_record("idx", PageId::new(2)));

        catalog.insert_record("idx", PageId::new(1)).unwrap();
        assert!(catalog.update_record("idx", PageId::new(2)));
        assert_eq!(catalog.record("idx"), Some(PageId::new(2)));

        // A record can hold the INVALID sentinel (emptied tree)
        assert!(catalog.update_record("idx", PageId::INVALID));
        assert_eq!(catalog.record("idx"), Some(PageId::INVALID));
    }

    #[test]
    fn test_catalog_name_limits() {
        let mut catalog = empty_catalog();

        let long = "x".repeat(CatalogPage::NAME_MAX + 1);
        assert!(matches!(
            catalog.insert_record(&long, PageId::new(1)),
            Err(ArborError::InvalidIndexName { .. })
        ));
        assert!(matches!(
            catalog.insert_record("", PageId::new(1)),
            Err(ArborError::InvalidIndexName { .. })
        ));

        let exact = "y".repeat(CatalogPage::NAME_MAX);
        assert!(catalog.insert_record(&exact, PageId::new(3)).unwrap());
        assert_eq!(catalog.record(&exact), Some(PageId::new(3)));
    }

    #[test]
    fn test_catalog_full() {
        let mut catalog = empty_catalog();

        for i in 0..CatalogPage::CAPACITY {
            catalog
                .insert_record(&format!("idx_{i}"), PageId::new(i as u32))
                .unwrap();
        }

        assert!(matches!(
            catalog.insert_record("one_more", PageId::new(1)),
            Err(ArborError::CatalogFull)
        ));
    }

    #[test]
    fn test_catalog_bytes_roundtrip() {
        let mut catalog = empty_catalog();
        catalog.insert_record("idx", PageId::new(77)).unwrap();

        let restored = CatalogPage::from_bytes(catalog.as_bytes());
        assert_eq!(restored.record("idx"), Some(PageId::new(77)));
    }
}
