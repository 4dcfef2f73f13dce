use std::fmt;

/// An opaque integer identifying an OS socket or descriptor.
///
/// Handles are not owned by this crate: the caller guarantees the
/// underlying descriptor stays open while interest is registered, and until
/// `Reactor::detach` completes.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(i64);

impl Handle {
    /// Sentinel meaning "no handle" / invalid.
    pub const INVALID: Handle = Handle(-1);

    pub const fn new(raw: i64) -> Handle {
        Handle(raw)
    }

    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    pub const fn raw(self) -> i64 {
        self.0
    }
}

#[cfg(unix)]
impl From<std::os::unix::io::RawFd> for Handle {
    fn from(fd: std::os::unix::io::RawFd) -> Handle {
        Handle(fd as i64)
    }
}

#[cfg(unix)]
impl From<Handle> for std::os::unix::io::RawFd {
    fn from(h: Handle) -> std::os::unix::io::RawFd {
        h.0 as std::os::unix::io::RawFd
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "Handle({})", self.0)
        } else {
            write!(f, "Handle(invalid)")
        }
    }
}

impl Default for Handle {
    fn default() -> Handle {
        Handle::INVALID
    }
}
