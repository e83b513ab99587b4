//! OS signal handling via the self-pipe trick.
//!
//! The actual `extern "C"` handler only writes one byte to a pipe — the one
//! thing POSIX guarantees is async-signal-safe here — and a supervisor
//! thread spawned by [`install`] blocks reading that pipe and performs the
//! real `Session::set_stopped` transition plus the condvar notify. `SIGALRM`
//! is armed with `libc::alarm()` for `--duration`/`--End` and funneled
//! through the same pipe, so a timed stop and an externally sent signal are
//! handled by the same code path.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::{DateTime, Utc};
use log::info;

use crate::session::{Session, END_FILE, TERMINATE};

static PIPE_WRITE_FD: AtomicI32 = AtomicI32::new(-1);

extern "C" fn on_signal(sig: libc::c_int) {
    let fd = PIPE_WRITE_FD.load(Ordering::Relaxed);
    if fd >= 0 {
        let byte = sig as u8;
        unsafe {
            libc::write(fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }
}

fn set_handler(sig: libc::c_int) -> io::Result<()> {
    unsafe {
        let mut action: libc::sigaction = std::mem::zeroed();
        action.sa_sigaction = on_signal as usize;
        libc::sigemptyset(&mut action.sa_mask);
        action.sa_flags = libc::SA_RESTART;
        if libc::sigaction(sig, &action, std::ptr::null_mut()) != 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}

fn make_self_pipe() -> io::Result<(RawFd, RawFd)> {
    let mut fds: [RawFd; 2] = [-1, -1];
    #[cfg(target_os = "linux")]
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK | libc::O_CLOEXEC) };
    #[cfg(not(target_os = "linux"))]
    let rc = unsafe {
        let rc = libc::pipe(fds.as_mut_ptr());
        if rc == 0 {
            for fd in fds {
                libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK);
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        rc
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok((fds[0], fds[1]))
}

/// Maps a signal number to the `stopped` transition it requests.
/// `SIGINT`/`SIGTERM`/`SIGALRM` request a clean shutdown; `SIGHUP` closes
/// the current file but keeps listening for the next one.
fn action_for_signal(sig: libc::c_int) -> Option<i8> {
    match sig {
        libc::SIGINT | libc::SIGTERM | libc::SIGALRM => Some(TERMINATE),
        libc::SIGHUP => Some(END_FILE),
        _ => None,
    }
}

/// Installs handlers for `SIGINT`, `SIGTERM`, `SIGHUP`, and `SIGALRM`, arms
/// `libc::alarm()` if `end_at`/`duration_secs` is given, and spawns the
/// supervisor thread that turns received signals into `Session::set_stopped`
/// calls. The returned thread runs for the lifetime of the process; it is
/// not joined on shutdown.
pub fn install(
    session: Arc<Session>,
    end_at: Option<DateTime<Utc>>,
    duration_secs: Option<i64>,
) -> io::Result<()> {
    let (read_fd, write_fd) = make_self_pipe()?;
    PIPE_WRITE_FD.store(write_fd, Ordering::Relaxed);

    for sig in [libc::SIGINT, libc::SIGTERM, libc::SIGHUP, libc::SIGALRM] {
        set_handler(sig)?;
    }

    let alarm_secs = match (end_at, duration_secs) {
        (Some(end), _) => {
            let now = Utc::now();
            (end - now).num_seconds().max(1) as u32
        }
        (None, Some(secs)) => secs.max(1) as u32,
        (None, None) => 0,
    };
    if alarm_secs > 0 {
        unsafe {
            libc::alarm(alarm_secs);
        }
    }

    thread::spawn(move || supervisor_loop(read_fd, session));
    Ok(())
}

fn supervisor_loop(read_fd: RawFd, session: Arc<Session>) {
    use mio::unix::SourceFd;
    use mio::{Events, Interest, Poll, Token};

    const PIPE_TOKEN: Token = Token(0);

    let mut poll = match Poll::new() {
        Ok(poll) => poll,
        Err(err) => {
            log::error!("signal supervisor: failed to create poller: {err}");
            return;
        }
    };
    let mut fd = read_fd;
    if poll
        .registry()
        .register(&mut SourceFd(&mut fd), PIPE_TOKEN, Interest::READABLE)
        .is_err()
    {
        log::error!("signal supervisor: failed to register self-pipe");
        return;
    }

    let mut events = Events::with_capacity(4);
    let mut buf = [0u8; 64];
    loop {
        if poll.poll(&mut events, None).is_err() {
            continue;
        }
        loop {
            let n = unsafe { libc::read(read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
            if n <= 0 {
                break;
            }
            for &byte in &buf[..n as usize] {
                if let Some(action) = action_for_signal(byte as libc::c_int) {
                    info!("signal {} requests stopped={}", byte, action);
                    session.set_stopped(action);
                    if action == TERMINATE {
                        return;
                    }
                }
            }
        }
        if session.stopped() == TERMINATE {
            return;
        }
    }
}
