//! Disk manager for page-level file I/O.

use arbor_common::page::{PageId, PAGE_SIZE};
use arbor_common::{ArborError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Path to the data file.
    pub path: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/arbor.dat"),
            fsync_enabled: true,
        }
    }
}

/// Manages reading and writing pages to a single data file.
///
/// Page 0 is reserved for the header page holding catalog records and is
/// created when the file is first opened. `allocate_page` hands out dense
/// page numbers starting at 1; pages are materialized in the file on first
/// write.
pub struct DiskManager {
    /// Configuration.
    config: DiskManagerConfig,
    /// The open data file.
    file: Mutex<File>,
    /// Next page number to hand out (also the allocated page count).
    next_page: AtomicU32,
}

impl DiskManager {
    /// Opens or creates the data file.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&config.path)?;

        let file_size = file.metadata()?.len();
        if file_size == 0 {
            // Fresh file: materialize the reserved header page
            file.write_all(&[0u8; PAGE_SIZE])?;
            if config.fsync_enabled {
                file.sync_all()?;
            }
        }

        let num_pages = ((file.metadata()?.len() as usize) / PAGE_SIZE).max(1) as u32;

        Ok(Self {
            config,
            file: Mutex::new(file),
            next_page: AtomicU32::new(num_pages),
        })
    }

    /// Returns the data file path.
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Returns the number of allocated pages (including the header page).
    pub fn num_pages(&self) -> u32 {
        self.next_page.load(Ordering::Acquire)
    }

    /// Allocates a new page number.
    ///
    /// The page is materialized in the file on first write.
    pub fn allocate_page(&self) -> PageId {
        PageId::new(self.next_page.fetch_add(1, Ordering::AcqRel))
    }

    /// Releases a page number.
    ///
    /// Freed pages are abandoned rather than recycled; the id space is
    /// 32 bits wide and the file never shrinks below its high-water mark.
    pub fn deallocate_page(&self, _page_id: PageId) {}

    /// Reads a page from disk.
    ///
    /// Allocated pages that have never been written read back as zeroes.
    pub fn read_page(&self, page_id: PageId) -> Result<[u8; PAGE_SIZE]> {
        if !page_id.is_valid() || page_id.as_u32() >= self.num_pages() {
            return Err(ArborError::PageNotFound {
                page_id: page_id.as_u32(),
            });
        }

        let offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);
        let mut buffer = [0u8; PAGE_SIZE];

        let mut file = self.file.lock();
        let file_size = file.metadata()?.len();
        if offset >= file_size {
            // Allocated but never written
            return Ok(buffer);
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    /// Writes a page to disk.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        if !page_id.is_valid() || page_id.as_u32() >= self.num_pages() {
            return Err(ArborError::PageNotFound {
                page_id: page_id.as_u32(),
            });
        }

        let offset = (page_id.as_u32() as u64) * (PAGE_SIZE as u64);

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;

        if self.config.fsync_enabled {
            file.sync_all()?;
        }

        Ok(())
    }
}
