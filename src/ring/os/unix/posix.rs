//! POSIX double-mapping: one backing descriptor, mapped twice into adjacent
//! virtual addresses so offset `k` and offset `k + len` alias the same page.

use std::io::{Error, Result};
use std::os::raw::c_int;
use std::ptr;

use libc::{
    c_void, close, ftruncate, mmap, munmap, off_t, MAP_ANON, MAP_FAILED, MAP_FIXED, MAP_PRIVATE,
    MAP_SHARED, PROT_READ, PROT_WRITE,
};

use super::memfd;

/// Maps `len` bytes of anonymous backing storage twice, back to back, so
/// that the combined `[0, 2*len)` range sees each byte of the backing once
/// at offset `k` and again at `k + len`.
pub unsafe fn map_ring(len: usize) -> Result<*mut u8> {
    let fd = tmp_fd(len)?;
    let result = map_both_halves(len, fd);
    close(fd);
    result
}

/// Undoes a mapping created by [`map_ring`].
pub unsafe fn unmap_ring(base: *mut u8, len: usize) -> Result<()> {
    if munmap(base as *mut c_void, 2 * len) < 0 {
        Err(Error::last_os_error())
    } else {
        Ok(())
    }
}

unsafe fn map_both_halves(len: usize, fd: c_int) -> Result<*mut u8> {
    let base = raw_mmap(ptr::null_mut(), len * 2, MAP_PRIVATE | MAP_ANON, -1)?;
    match try_alias(base, len, fd) {
        Ok(()) => Ok(base),
        Err(err) => {
            munmap(base as *mut c_void, len * 2);
            Err(err)
        }
    }
}

unsafe fn try_alias(base: *mut u8, len: usize, fd: c_int) -> Result<()> {
    raw_mmap(base, len, MAP_SHARED | MAP_FIXED, fd)?;
    raw_mmap(base.add(len), len, MAP_SHARED | MAP_FIXED, fd)?;
    Ok(())
}

unsafe fn raw_mmap(addr: *mut u8, len: usize, flags: c_int, fd: c_int) -> Result<*mut u8> {
    let pg = mmap(addr as *mut c_void, len, PROT_READ | PROT_WRITE, flags, fd, 0);
    if pg == MAP_FAILED {
        Err(Error::last_os_error())
    } else {
        Ok(pg as *mut u8)
    }
}

unsafe fn tmp_fd(len: usize) -> Result<c_int> {
    let fd = memfd::open()?;
    if ftruncate(fd, len as off_t) < 0 {
        let err = Error::last_os_error();
        close(fd);
        return Err(err);
    }
    Ok(fd)
}
