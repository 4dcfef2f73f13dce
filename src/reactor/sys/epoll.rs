//! Linux backend over `epoll(7)`.
//!
//! Grounded on mio's `sys/unix/selector/epoll.rs`: one `epoll_create1` fd,
//! `epoll_ctl` for register/modify/delete, `epoll_wait` for the blocking
//! select. The readiness-bit translation (`EPOLLIN`/`EPOLLOUT`/`EPOLLRDHUP`/
//! `EPOLLHUP`/`EPOLLERR` -> `ReadySet`) follows the source's `event::*`
//! helper functions.

use super::{PollBackend, RawEvent};
use crate::error::Error;
use crate::event::ReadySet;
use crate::handle::Handle;
use std::io;
use std::os::unix::io::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

macro_rules! syscall {
    ($fn:ident ( $($arg:expr),* $(,)* ) ) => {{
        let res = unsafe { libc::$fn($($arg, )*) };
        if res == -1 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

pub(crate) struct Selector {
    ep: OwnedFd,
}

impl PollBackend for Selector {
    fn new() -> Result<Selector, Error> {
        let fd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC)).map_err(Error::from)?;
        let ep = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Selector { ep })
    }

    fn register(&self, handle: Handle, readable: bool, writable: bool, oneshot: bool) -> Result<(), Error> {
        self.ctl(libc::EPOLL_CTL_ADD, handle, readable, writable, oneshot)
    }

    fn reregister(&self, handle: Handle, readable: bool, writable: bool, oneshot: bool) -> Result<(), Error> {
        self.ctl(libc::EPOLL_CTL_MOD, handle, readable, writable, oneshot)
    }

    fn deregister(&self, handle: Handle) -> Result<(), Error> {
        let fd: RawFd = handle.into();
        syscall!(epoll_ctl(
            self.ep.as_raw_fd(),
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut(),
        ))
        .map(|_| ())
        .map_err(|e| Error::from(io::Error::from(e)))
    }

    fn select(&self, out: &mut Vec<RawEvent>, timeout: Option<Duration>) -> Result<(), Error> {
        let timeout_ms = timeout
            .map(|to| {
                to.checked_add(Duration::from_nanos(999_999))
                    .unwrap_or(to)
                    .as_millis() as libc::c_int
            })
            .unwrap_or(-1);

        let mut raw = vec![empty_epoll_event(); 1024.max(out.capacity())];
        let n = match syscall!(epoll_wait(
            self.ep.as_raw_fd(),
            raw.as_mut_ptr(),
            raw.len() as i32,
            timeout_ms,
        )) {
            Ok(n) => n as usize,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => return Ok(()),
            Err(e) => return Err(Error::from(e)),
        };

        #[cfg(feature = "log")]
        log::trace!("epoll_wait returned {} events (timeout {:?})", n, timeout);

        for ev in &raw[..n] {
            let handle = Handle::new(ev.u64 as i64);
            out.push(RawEvent {
                handle,
                ready: translate(ev.events as libc::c_int),
            });
        }
        Ok(())
    }
}

impl Selector {
    fn ctl(&self, op: libc::c_int, handle: Handle, readable: bool, writable: bool, oneshot: bool) -> Result<(), Error> {
        let fd: RawFd = handle.into();
        let mut events = libc::EPOLLRDHUP;
        if readable {
            events |= libc::EPOLLIN | libc::EPOLLPRI;
        }
        if writable {
            events |= libc::EPOLLOUT;
        }
        if oneshot {
            events |= libc::EPOLLONESHOT;
        }
        let mut event = libc::epoll_event {
            events: events as u32,
            u64: handle.raw() as u64,
        };
        syscall!(epoll_ctl(self.ep.as_raw_fd(), op, fd, &mut event))
            .map(|_| ())
            .map_err(|e| Error::from(io::Error::from(e)))
    }
}

fn empty_epoll_event() -> libc::epoll_event {
    libc::epoll_event { events: 0, u64: 0 }
}

fn translate(events: libc::c_int) -> ReadySet {
    let mut ready = ReadySet::empty();
    if events & (libc::EPOLLIN | libc::EPOLLPRI) != 0 {
        ready.insert(ReadySet::READABLE);
    }
    if events & libc::EPOLLOUT != 0 {
        ready.insert(ReadySet::WRITABLE);
    }
    if events & libc::EPOLLERR != 0 {
        ready.insert(ReadySet::ERROR);
    }
    if events & libc::EPOLLHUP != 0 {
        ready.insert(ReadySet::HANGUP);
    }
    if events & libc::EPOLLRDHUP != 0 {
        ready.insert(ReadySet::SHUTDOWN);
    }
    ready
}
