//! Unix stack mapping using mmap

use std::ptr::NonNull;

use lwt_core::constants::FALLBACK_PAGE_SIZE;
use lwt_core::error::MemoryError;

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        const MAP_FLAGS: libc::c_int =
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE | libc::MAP_STACK;
    } else {
        const MAP_FLAGS: libc::c_int = libc::MAP_PRIVATE | libc::MAP_ANONYMOUS;
    }
}

pub(super) fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        FALLBACK_PAGE_SIZE
    } else {
        size as usize
    }
}

/// Map `len` bytes read/write and turn the lowest `guard` bytes into a guard page
pub(super) fn map_stack(len: usize, guard: usize) -> Result<NonNull<u8>, MemoryError> {
    let base = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            MAP_FLAGS,
            -1,
            0,
        )
    };
    if base == libc::MAP_FAILED {
        return Err(MemoryError::AllocationFailed);
    }

    let ret = unsafe { libc::mprotect(base, guard, libc::PROT_NONE) };
    if ret != 0 {
        unsafe {
            libc::munmap(base, len);
        }
        return Err(MemoryError::ProtectionFailed);
    }

    NonNull::new(base as *mut u8).ok_or(MemoryError::AllocationFailed)
}

pub(super) fn unmap_stack(base: NonNull<u8>, len: usize) {
    let ret = unsafe { libc::munmap(base.as_ptr() as *mut libc::c_void, len) };
    if ret != 0 {
        lwt_core::kwarn!("munmap of stack at {:p} failed", base.as_ptr());
    }
}
