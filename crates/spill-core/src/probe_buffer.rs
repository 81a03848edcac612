//! The covert-channel receive buffer.

use crate::platform::CacheFlusher;
use crate::util::{CANDIDATES, PAGE_MASK, PAGE_SHIFT, PAGE_SIZE, PROBE_BUFFER_SIZE};
use libc::{MAP_ANONYMOUS, MAP_POPULATE, MAP_PRIVATE};
use log::debug;
use std::ptr::null_mut;

/// Page-aligned buffer of [`CANDIDATES`] pages, one per candidate byte value.
///
/// Page `k` signals the value `k`: a transient access to `page(k)` leaves that
/// page's first cache line warm, which the timing probe later detects. The
/// buffer is owned by a single sampling campaign and reused for every target.
///
/// Every page is written once on allocation. Untouched anonymous pages would
/// all map to the kernel's shared zero page, making their cache lines alias.
#[derive(Debug)]
pub struct ProbeBuffer {
    ptr: *mut u8,
    len: usize,
}

impl ProbeBuffer {
    /// Maps a fresh probe buffer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if mmap fails.
    pub fn new() -> std::io::Result<Self> {
        let p = unsafe {
            libc::mmap(
                null_mut(),
                PROBE_BUFFER_SIZE,
                libc::PROT_READ | libc::PROT_WRITE,
                MAP_PRIVATE | MAP_ANONYMOUS | MAP_POPULATE,
                -1,
                0,
            )
        };
        if p == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }
        let ptr = p as *mut u8;
        assert_eq!(ptr as usize & PAGE_MASK, 0, "mmap returned unaligned memory");
        for page in 0..CANDIDATES {
            unsafe {
                std::ptr::write_bytes(ptr.add(page << PAGE_SHIFT), 0x01, PAGE_SIZE);
            }
        }
        debug!("mapped probe buffer at {:p}", ptr);
        Ok(ProbeBuffer {
            ptr,
            len: PROBE_BUFFER_SIZE,
        })
    }

    /// Returns a pointer to the start of the buffer.
    pub fn ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Returns the buffer length in bytes.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns the address of the page signalling `value`.
    pub fn page(&self, value: u8) -> *const u8 {
        unsafe { self.ptr.add((value as usize) << PAGE_SHIFT) }
    }

    /// Returns the candidate value signalled by `addr`, if it lies inside the buffer.
    pub fn value_of(&self, addr: *const u8) -> Option<u8> {
        let offset = (addr as usize).checked_sub(self.ptr as usize)?;
        if offset >= self.len {
            return None;
        }
        Some((offset >> PAGE_SHIFT) as u8)
    }

    /// Iterates over all page addresses, in candidate order.
    pub fn pages(&self) -> impl Iterator<Item = *const u8> + '_ {
        (0..CANDIDATES).map(|value| self.page(value as u8))
    }

    /// Evicts every page from the cache.
    ///
    /// Must run before each leak attempt, otherwise lines left warm by a
    /// previous round show up as false hits.
    pub fn flush<F: CacheFlusher + ?Sized>(&self, flusher: &F) {
        for page in self.pages() {
            unsafe { flusher.flush(page) };
        }
    }
}

impl Drop for ProbeBuffer {
    fn drop(&mut self) {
        unsafe { libc::munmap(self.ptr as *mut libc::c_void, self.len) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingFlusher(RefCell<Vec<usize>>);

    impl CacheFlusher for RecordingFlusher {
        unsafe fn flush(&self, addr: *const u8) {
            self.0.borrow_mut().push(addr as usize);
        }
    }

    #[test]
    fn test_layout() -> anyhow::Result<()> {
        let buffer = ProbeBuffer::new()?;
        assert_eq!(buffer.len(), 256 * 4096);
        assert_eq!(buffer.ptr() as usize % PAGE_SIZE, 0);
        assert_eq!(buffer.page(0), buffer.ptr());
        assert_eq!(
            buffer.page(0x41) as usize - buffer.ptr() as usize,
            0x41 * PAGE_SIZE
        );
        assert_eq!(
            buffer.page(255) as usize + PAGE_SIZE,
            buffer.ptr() as usize + buffer.len()
        );
        Ok(())
    }

    #[test]
    fn test_pages_are_written() -> anyhow::Result<()> {
        let buffer = ProbeBuffer::new()?;
        for page in buffer.pages() {
            assert_eq!(unsafe { page.read_volatile() }, 0x01);
        }
        Ok(())
    }

    #[test]
    fn test_value_of() -> anyhow::Result<()> {
        let buffer = ProbeBuffer::new()?;
        assert_eq!(buffer.value_of(buffer.page(0x75)), Some(0x75));
        assert_eq!(
            buffer.value_of(unsafe { buffer.page(3).add(100) }),
            Some(3)
        );
        assert_eq!(buffer.value_of(std::ptr::null()), None);
        assert_eq!(
            buffer.value_of(unsafe { buffer.ptr().add(buffer.len()) }),
            None
        );
        Ok(())
    }

    #[test]
    fn test_flush_covers_every_page() -> anyhow::Result<()> {
        let buffer = ProbeBuffer::new()?;
        let flusher = RecordingFlusher(RefCell::new(vec![]));
        buffer.flush(&flusher);
        let flushed = flusher.0.into_inner();
        assert_eq!(flushed.len(), CANDIDATES);
        for (value, addr) in flushed.into_iter().enumerate() {
            assert_eq!(addr, buffer.page(value as u8) as usize);
        }
        Ok(())
    }
}
