use std::fmt;
use std::io;

/// The categorical result of an operation.
///
/// Every operation in this crate that can fail returns one of these
/// categories, carrying the native OS error number (if any) alongside it for
/// diagnostics. The category, not the number, is the programmatic surface:
/// callers should match on `ErrorKind`, and use `raw_os_error` only for
/// logging or re-raising into code that inspects native errors.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Error {
    kind: ErrorKind,
    raw: i32,
}

/// Fixed taxonomy of error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Ok,
    Unknown,
    WouldBlock,
    Interrupted,
    Pending,
    Cancelled,
    Invalid,
    Eof,
    Limit,
    AddressInUse,
    ConnectionTimeout,
    ConnectionRefused,
    ConnectionReset,
    ConnectionDead,
    Unreachable,
    NotAuthorized,
    NotImplemented,
    NotOpen,
    NotSocket,
}

impl Error {
    pub const fn new(kind: ErrorKind, raw: i32) -> Error {
        Error { kind, raw }
    }

    pub const fn ok() -> Error {
        Error::new(ErrorKind::Ok, 0)
    }

    pub const fn from_kind(kind: ErrorKind) -> Error {
        Error::new(kind, 0)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The native OS error number, if one was captured. `0` for categories
    /// that are not derived from an OS call (e.g. `Invalid`, `Cancelled`).
    pub fn raw_os_error(&self) -> i32 {
        self.raw
    }

    pub fn is_ok(&self) -> bool {
        self.kind == ErrorKind::Ok
    }

    /// Translate a native `errno` value into a category. Unrecognised
    /// values map to `Unknown`, preserving the raw number.
    #[cfg(unix)]
    pub fn from_errno(errno: i32) -> Error {
        let kind = match errno {
            0 => ErrorKind::Ok,
            libc::EAGAIN | libc::EWOULDBLOCK => ErrorKind::WouldBlock,
            libc::EINTR => ErrorKind::Interrupted,
            libc::EINPROGRESS => ErrorKind::Pending,
            libc::ECANCELED => ErrorKind::Cancelled,
            libc::EINVAL => ErrorKind::Invalid,
            libc::EADDRINUSE => ErrorKind::AddressInUse,
            libc::ETIMEDOUT => ErrorKind::ConnectionTimeout,
            libc::ECONNREFUSED => ErrorKind::ConnectionRefused,
            libc::ECONNRESET => ErrorKind::ConnectionReset,
            libc::EPIPE | libc::ENOTCONN => ErrorKind::ConnectionDead,
            libc::EHOSTUNREACH | libc::ENETUNREACH => ErrorKind::Unreachable,
            libc::EACCES | libc::EPERM => ErrorKind::NotAuthorized,
            libc::ENOSYS | libc::EOPNOTSUPP => ErrorKind::NotImplemented,
            libc::EBADF => ErrorKind::NotOpen,
            libc::ENOTSOCK => ErrorKind::NotSocket,
            _ => ErrorKind::Unknown,
        };
        Error::new(kind, errno)
    }

    /// Translate a category back into a representative native `errno`
    /// value. This is the inverse direction of `from_errno`; composing the
    /// two round-trips the category (property 8 of the testable-properties
    /// table: `translate(translate(n)) == translate(n)` as categories).
    #[cfg(unix)]
    pub fn to_errno(kind: ErrorKind) -> i32 {
        match kind {
            ErrorKind::Ok => 0,
            ErrorKind::Unknown => -1,
            ErrorKind::WouldBlock => libc::EAGAIN,
            ErrorKind::Interrupted => libc::EINTR,
            ErrorKind::Pending => libc::EINPROGRESS,
            ErrorKind::Cancelled => libc::ECANCELED,
            ErrorKind::Invalid => libc::EINVAL,
            ErrorKind::Eof => 0,
            ErrorKind::Limit => libc::ENOBUFS,
            ErrorKind::AddressInUse => libc::EADDRINUSE,
            ErrorKind::ConnectionTimeout => libc::ETIMEDOUT,
            ErrorKind::ConnectionRefused => libc::ECONNREFUSED,
            ErrorKind::ConnectionReset => libc::ECONNRESET,
            ErrorKind::ConnectionDead => libc::EPIPE,
            ErrorKind::Unreachable => libc::EHOSTUNREACH,
            ErrorKind::NotAuthorized => libc::EACCES,
            ErrorKind::NotImplemented => libc::ENOSYS,
            ErrorKind::NotOpen => libc::EBADF,
            ErrorKind::NotSocket => libc::ENOTSOCK,
        }
    }

    #[cfg(unix)]
    pub fn translate(errno: i32) -> ErrorKind {
        Error::from_errno(errno).kind()
    }
}

impl From<bool> for ErrorKind {
    fn from(b: bool) -> ErrorKind {
        if b {
            ErrorKind::Unknown
        } else {
            ErrorKind::Ok
        }
    }
}

impl From<Error> for bool {
    /// `Ok` converts to `false` (nothing went wrong); every other category
    /// converts to `true`.
    fn from(e: Error) -> bool {
        e.kind != ErrorKind::Ok
    }
}

fn from_io_error_kind(kind: io::ErrorKind) -> Error {
    match kind {
        io::ErrorKind::WouldBlock => Error::from_kind(ErrorKind::WouldBlock),
        io::ErrorKind::Interrupted => Error::from_kind(ErrorKind::Interrupted),
        io::ErrorKind::TimedOut => Error::from_kind(ErrorKind::ConnectionTimeout),
        io::ErrorKind::UnexpectedEof => Error::from_kind(ErrorKind::Eof),
        io::ErrorKind::NotConnected => Error::from_kind(ErrorKind::ConnectionDead),
        io::ErrorKind::PermissionDenied => Error::from_kind(ErrorKind::NotAuthorized),
        io::ErrorKind::Unsupported => Error::from_kind(ErrorKind::NotImplemented),
        _ => Error::from_kind(ErrorKind::Unknown),
    }
}

#[cfg(unix)]
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        match e.raw_os_error() {
            Some(errno) => Error::from_errno(errno),
            None => from_io_error_kind(e.kind()),
        }
    }
}

#[cfg(not(unix))]
impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        from_io_error_kind(e.kind())
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> io::Error {
        let kind = match e.kind {
            ErrorKind::Ok => return io::Error::from(io::ErrorKind::Other),
            ErrorKind::WouldBlock => io::ErrorKind::WouldBlock,
            ErrorKind::Interrupted => io::ErrorKind::Interrupted,
            ErrorKind::ConnectionTimeout => io::ErrorKind::TimedOut,
            ErrorKind::ConnectionRefused => io::ErrorKind::ConnectionRefused,
            ErrorKind::ConnectionReset => io::ErrorKind::ConnectionReset,
            ErrorKind::ConnectionDead => io::ErrorKind::NotConnected,
            ErrorKind::AddressInUse => io::ErrorKind::AddrInUse,
            ErrorKind::Eof => io::ErrorKind::UnexpectedEof,
            ErrorKind::NotAuthorized => io::ErrorKind::PermissionDenied,
            ErrorKind::NotImplemented => io::ErrorKind::Unsupported,
            ErrorKind::Invalid => io::ErrorKind::InvalidInput,
            _ => io::ErrorKind::Other,
        };
        if e.raw != 0 {
            io::Error::from_raw_os_error(e.raw)
        } else {
            io::Error::from(kind)
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("raw", &self.raw)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.raw != 0 {
            write!(f, "{:?} (os error {})", self.kind, self.raw)
        } else {
            write!(f, "{:?}", self.kind)
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_converts_to_false() {
        let e = Error::ok();
        assert!(!bool::from(e));
    }

    #[test]
    fn non_ok_converts_to_true() {
        let e = Error::from_kind(ErrorKind::Invalid);
        assert!(bool::from(e));
    }

    #[cfg(unix)]
    #[test]
    fn translate_round_trips() {
        for errno in [
            libc::EAGAIN,
            libc::EINTR,
            libc::EINVAL,
            libc::ECONNRESET,
            libc::EADDRINUSE,
        ] {
            let kind = Error::translate(errno);
            let back = Error::to_errno(kind);
            assert_eq!(Error::translate(back), kind);
        }
    }

    #[test]
    fn display_includes_raw_errno_when_present() {
        let e = Error::new(ErrorKind::Invalid, 22);
        let s = format!("{}", e);
        assert!(s.contains("22"));
    }
}
