//! Portable backend over POSIX `poll(2)`.
//!
//! Used on Unix platforms other than Linux (BSD, Darwin): grounded on mio's
//! `sys/unix/selector/poll.rs`, simplified to a `Mutex<Vec<pollfd>>` rescan
//! on every call rather than that file's incremental diffing, since this
//! crate does not need `poll.rs`'s `Arc`-shared-selector story (only one
//! reactor owns this backend).

use super::{PollBackend, RawEvent};
use crate::error::Error;
use crate::event::ReadySet;
use crate::handle::Handle;
use std::os::unix::io::RawFd;
use std::sync::Mutex;
use std::time::Duration;

struct Registration {
    fd: RawFd,
    readable: bool,
    writable: bool,
    oneshot: bool,
}

pub(crate) struct Selector {
    registrations: Mutex<Vec<Registration>>,
}

impl PollBackend for Selector {
    fn new() -> Result<Selector, Error> {
        Ok(Selector {
            registrations: Mutex::new(Vec::new()),
        })
    }

    fn register(&self, handle: Handle, readable: bool, writable: bool, oneshot: bool) -> Result<(), Error> {
        let mut regs = self.registrations.lock().unwrap();
        let fd: RawFd = handle.into();
        if regs.iter().any(|r| r.fd == fd) {
            return Err(Error::from_kind(crate::error::ErrorKind::Invalid));
        }
        regs.push(Registration {
            fd,
            readable,
            writable,
            oneshot,
        });
        Ok(())
    }

    fn reregister(&self, handle: Handle, readable: bool, writable: bool, oneshot: bool) -> Result<(), Error> {
        let mut regs = self.registrations.lock().unwrap();
        let fd: RawFd = handle.into();
        match regs.iter_mut().find(|r| r.fd == fd) {
            Some(r) => {
                r.readable = readable;
                r.writable = writable;
                r.oneshot = oneshot;
                Ok(())
            }
            None => Err(Error::from_kind(crate::error::ErrorKind::Invalid)),
        }
    }

    fn deregister(&self, handle: Handle) -> Result<(), Error> {
        let mut regs = self.registrations.lock().unwrap();
        let fd: RawFd = handle.into();
        let before = regs.len();
        regs.retain(|r| r.fd != fd);
        if regs.len() == before {
            Err(Error::from_kind(crate::error::ErrorKind::Invalid))
        } else {
            Ok(())
        }
    }

    fn select(&self, out: &mut Vec<RawEvent>, timeout: Option<Duration>) -> Result<(), Error> {
        let mut regs = self.registrations.lock().unwrap();
        if regs.is_empty() {
            if let Some(to) = timeout {
                std::thread::sleep(to);
            }
            return Ok(());
        }

        let mut fds: Vec<libc::pollfd> = regs
            .iter()
            .map(|r| {
                let mut events = 0;
                if r.readable {
                    events |= libc::POLLIN;
                }
                if r.writable {
                    events |= libc::POLLOUT;
                }
                libc::pollfd {
                    fd: r.fd,
                    events,
                    revents: 0,
                }
            })
            .collect();

        let timeout_ms = timeout
            .map(|to| to.as_millis().min(i32::MAX as u128) as libc::c_int)
            .unwrap_or(-1);

        #[cfg(feature = "log")]
        log::trace!("polling on {:?}", fds);

        let rc = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        if rc < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(Error::from(err));
        }

        let mut fired_oneshots = Vec::new();
        for (reg, pfd) in regs.iter().zip(fds.iter()) {
            if pfd.revents == 0 {
                continue;
            }
            let ready = translate(pfd.revents);
            out.push(RawEvent {
                handle: Handle::new(reg.fd as i64),
                ready,
            });
            if reg.oneshot {
                fired_oneshots.push(reg.fd);
            }
        }
        if !fired_oneshots.is_empty() {
            regs.retain(|r| !fired_oneshots.contains(&r.fd));
        }
        Ok(())
    }
}

fn translate(revents: libc::c_short) -> ReadySet {
    let revents = revents as libc::c_int;
    let mut ready = ReadySet::empty();
    if revents & libc::POLLIN != 0 {
        ready.insert(ReadySet::READABLE);
    }
    if revents & libc::POLLOUT != 0 {
        ready.insert(ReadySet::WRITABLE);
    }
    if revents & libc::POLLERR != 0 {
        ready.insert(ReadySet::ERROR);
    }
    if revents & libc::POLLHUP != 0 {
        ready.insert(ReadySet::HANGUP);
    }
    ready
}
