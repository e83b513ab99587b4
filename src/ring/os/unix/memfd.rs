//! Backing-storage acquisition for the double-mapped ring.
//!
//! The ring buffer must not leave a name behind in the filesystem once it
//! has been mapped. On Linux/Android an anonymous `memfd` never has one to
//! begin with; elsewhere we open a short-lived `shm_open` object and unlink
//! it immediately after.

use std::io::{Error, Result};
use std::os::raw::c_int;

#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn open() -> Result<c_int> {
    use std::os::raw::c_char;
    const NAME: &[u8] = b"beamrec-ring\0";
    let fd = unsafe {
        libc::syscall(
            libc::SYS_memfd_create,
            NAME.as_ptr() as *const c_char,
            libc::MFD_CLOEXEC,
        )
    };
    if fd < 0 {
        Err(Error::last_os_error())
    } else {
        Ok(fd as c_int)
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
pub fn open() -> Result<c_int> {
    use rand::distributions::Alphanumeric;
    use rand::{thread_rng, Rng};

    const OFLAGS: c_int = libc::O_RDWR | libc::O_CREAT | libc::O_EXCL | libc::O_CLOEXEC;

    let mut rng = thread_rng();
    loop {
        let name: String = (0..12).map(|_| rng.sample(Alphanumeric) as char).collect();
        let path = std::ffi::CString::new(format!("/beamrec-ring-{}", name)).unwrap();

        let fd = unsafe { libc::shm_open(path.as_ptr(), OFLAGS, 0o600) };
        if fd < 0 {
            let err = Error::last_os_error();
            if err.raw_os_error() != Some(libc::EEXIST) {
                return Err(err);
            }
            continue;
        }
        unsafe { libc::shm_unlink(path.as_ptr()) };
        return Ok(fd);
    }
}
