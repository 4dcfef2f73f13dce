//! NotImplemented fallback for platforms with no polling backend wired up
//! here (anything non-Unix: no Windows IOCP/WSAPoll backend is implemented).
//!
//! Grounded on mio's `sys/shell` module, which exists so the crate still
//! compiles (and fails loudly at the call site, not at build time) on
//! platforms its real backends don't cover.

use super::{PollBackend, RawEvent};
use crate::error::{Error, ErrorKind};
use crate::handle::Handle;
use std::time::Duration;

pub(crate) struct Selector;

impl PollBackend for Selector {
    fn new() -> Result<Selector, Error> {
        Ok(Selector)
    }

    fn register(&self, _handle: Handle, _readable: bool, _writable: bool, _oneshot: bool) -> Result<(), Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }

    fn reregister(&self, _handle: Handle, _readable: bool, _writable: bool, _oneshot: bool) -> Result<(), Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }

    fn deregister(&self, _handle: Handle) -> Result<(), Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }

    fn select(&self, _out: &mut Vec<RawEvent>, _timeout: Option<Duration>) -> Result<(), Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }
}
