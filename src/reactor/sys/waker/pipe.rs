//! Grounded on mio's `sys/unix/waker/pipe.rs`: a self-pipe, written to wake,
//! drained to reset. Used wherever `eventfd` isn't available.

use crate::error::Error;
use crate::handle::Handle;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

pub(super) struct WakerInternal {
    sender: File,
    receiver: File,
}

impl WakerInternal {
    pub(super) fn new() -> Result<WakerInternal, Error> {
        let mut fds = [0 as RawFd; 2];
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) } == -1 {
            return Err(Error::from(io::Error::last_os_error()));
        }
        let receiver = unsafe { File::from_raw_fd(fds[0]) };
        let sender = unsafe { File::from_raw_fd(fds[1]) };
        Ok(WakerInternal { sender, receiver })
    }

    pub(super) fn handle(&self) -> Handle {
        Handle::from(self.receiver.as_raw_fd())
    }

    pub(super) fn wake(&self) -> Result<(), Error> {
        match (&self.sender).write(&[1]) {
            Ok(_) => Ok(()),
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                self.ack();
                self.wake()
            }
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => self.wake(),
            Err(e) => Err(Error::from(e)),
        }
    }

    pub(super) fn ack(&self) {
        let mut buf = [0u8; 4096];
        loop {
            match (&self.receiver).read(&mut buf) {
                Ok(n) if n > 0 => continue,
                _ => return,
            }
        }
    }
}
