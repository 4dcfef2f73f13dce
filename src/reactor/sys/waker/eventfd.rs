//! Grounded on mio's `sys/unix/waker/eventfd.rs`: an `eventfd(2)` counter,
//! written to wake and read to reset.

use crate::error::Error;
use crate::handle::Handle;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd};

pub(super) struct WakerInternal {
    fd: File,
}

impl WakerInternal {
    pub(super) fn new() -> Result<WakerInternal, Error> {
        let raw = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
        if raw == -1 {
            return Err(Error::from(io::Error::last_os_error()));
        }
        let fd = unsafe { File::from_raw_fd(raw) };
        Ok(WakerInternal { fd })
    }

    pub(super) fn handle(&self) -> Handle {
        Handle::from(self.fd.as_raw_fd())
    }

    pub(super) fn wake(&self) -> Result<(), Error> {
        let buf = 1u64.to_ne_bytes();
        match (&self.fd).write(&buf) {
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.ack();
                self.wake()
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    pub(super) fn ack(&self) {
        let mut buf = [0u8; 8];
        let _ = (&self.fd).read(&mut buf);
    }
}
