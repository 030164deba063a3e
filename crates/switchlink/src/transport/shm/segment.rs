// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! POSIX shared memory segments backing the message queues.
//!
//! The server creates each queue segment (replacing any stale one left by a
//! crashed run) and unlinks it on shutdown; the client only opens and maps.
//! Names follow POSIX rules: leading `/`, no other `/`.

use super::{Result, ShmError};
use std::ffi::CString;
use std::io;
use std::ptr;

/// Mapped shared memory segment. Unmapped on drop, never unlinked on drop.
pub struct ShmSegment {
    ptr: *mut u8,
    size: usize,
    name: String,
}

// SAFETY: the mapping is plain shared memory; all cross-thread access to it
// goes through atomics or the queue's futex lock.
unsafe impl Send for ShmSegment {}
unsafe impl Sync for ShmSegment {}

impl ShmSegment {
    /// Create a zeroed segment of `size` bytes, replacing any existing one.
    pub fn create(name: &str, size: usize) -> Result<Self> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated string. A failing unlink
        // (name absent) is expected and ignored. shm_open result is checked.
        let fd = unsafe {
            libc::shm_unlink(c_name.as_ptr());
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_RDWR | libc::O_EXCL,
                0o600,
            )
        };
        if fd < 0 {
            return Err(ShmError::SegmentCreate(io::Error::last_os_error()));
        }

        // SAFETY: fd is a valid descriptor from shm_open above.
        if unsafe { libc::ftruncate(fd, size as libc::off_t) } < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: fd is valid and not used after this point.
            unsafe { libc::close(fd) };
            return Err(ShmError::SegmentCreate(err));
        }

        let ptr = Self::map(fd, size)?;

        // SAFETY: ptr maps exactly `size` writable bytes and nobody else can
        // have attached yet (the name was created with O_EXCL just above).
        unsafe { ptr::write_bytes(ptr, 0, size) };

        log::debug!("[SHM] created segment {} ({} bytes)", name, size);
        Ok(Self {
            ptr,
            size,
            name: name.to_string(),
        })
    }

    /// Open and map an existing segment.
    ///
    /// Fails with [`ShmError::InvalidLayout`] if the segment is smaller than
    /// `size`, which happens when the creator used different queue limits.
    pub fn open(name: &str, size: usize) -> Result<Self> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated string; mode is ignored
        // without O_CREAT. The result is checked below.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::NotFound {
                return Err(ShmError::NotFound(name.to_string()));
            }
            return Err(ShmError::SegmentOpen(err));
        }

        // SAFETY: fd is valid; stat is a plain C struct, zeroed is a valid
        // bit pattern and fstat fills it.
        let actual = unsafe {
            let mut stat: libc::stat = std::mem::zeroed();
            if libc::fstat(fd, &mut stat) < 0 {
                let err = io::Error::last_os_error();
                libc::close(fd);
                return Err(ShmError::SegmentOpen(err));
            }
            stat.st_size as usize
        };
        if actual < size {
            // SAFETY: fd is valid and not used after this point.
            unsafe { libc::close(fd) };
            return Err(ShmError::InvalidLayout(format!(
                "segment {} is {} bytes, expected at least {}",
                name, actual, size
            )));
        }

        let ptr = Self::map(fd, size)?;
        log::debug!("[SHM] opened segment {} ({} bytes)", name, size);
        Ok(Self {
            ptr,
            size,
            name: name.to_string(),
        })
    }

    /// Map `size` bytes of `fd` and close the descriptor.
    fn map(fd: libc::c_int, size: usize) -> Result<*mut u8> {
        // SAFETY: null hint lets the kernel pick the address; fd is valid;
        // MAP_FAILED is checked below.
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd,
                0,
            )
        };
        let map_err = io::Error::last_os_error();

        // SAFETY: fd is valid; the mapping (if any) keeps its own reference.
        unsafe { libc::close(fd) };

        if ptr == libc::MAP_FAILED {
            return Err(ShmError::Mmap(map_err));
        }
        Ok(ptr as *mut u8)
    }

    fn c_name(name: &str) -> Result<CString> {
        Self::validate_name(name)?;
        CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))
    }

    /// Check POSIX naming rules.
    pub fn validate_name(name: &str) -> Result<()> {
        if !name.starts_with('/') {
            return Err(ShmError::InvalidName(format!(
                "segment name must start with '/': {name}"
            )));
        }
        if name.len() < 2 || name[1..].contains('/') {
            return Err(ShmError::InvalidName(format!(
                "segment name needs one component after '/': {name}"
            )));
        }
        if name.len() > 255 {
            return Err(ShmError::InvalidName(format!(
                "segment name too long (max 255): {name}"
            )));
        }
        Ok(())
    }

    /// Remove a segment name. Absent names are not an error.
    pub fn unlink(name: &str) -> Result<()> {
        let c_name = Self::c_name(name)?;

        // SAFETY: c_name is a valid NUL-terminated string.
        if unsafe { libc::shm_unlink(c_name.as_ptr()) } < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::NotFound {
                return Err(ShmError::SegmentOpen(err));
            }
        }
        Ok(())
    }

    /// Whether a segment with this name exists.
    pub fn exists(name: &str) -> bool {
        let Ok(c_name) = Self::c_name(name) else {
            return false;
        };

        // SAFETY: c_name is a valid NUL-terminated string.
        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDONLY, 0) };
        if fd >= 0 {
            // SAFETY: fd is valid and not used afterwards.
            unsafe { libc::close(fd) };
            true
        } else {
            false
        }
    }

    /// Base address of the mapping.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ShmSegment {
    fn drop(&mut self) {
        // SAFETY: ptr/size come from a successful mmap and are unmapped once.
        unsafe {
            libc::munmap(self.ptr as *mut libc::c_void, self.size);
        }
    }
}
