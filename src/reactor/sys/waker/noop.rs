//! Stand-in for platforms with no real reactor backend (see `sys::shell`):
//! there is nothing blocked in an OS poller to wake, so this is inert.

use crate::error::{Error, ErrorKind};
use crate::handle::Handle;

pub(super) struct WakerInternal;

impl WakerInternal {
    pub(super) fn new() -> Result<WakerInternal, Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }

    pub(super) fn handle(&self) -> Handle {
        Handle::INVALID
    }

    pub(super) fn wake(&self) -> Result<(), Error> {
        Err(Error::from_kind(ErrorKind::NotImplemented))
    }

    pub(super) fn ack(&self) {}
}
