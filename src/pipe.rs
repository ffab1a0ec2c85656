use std::cell::Cell;
use std::io;
use std::os::unix::io::RawFd;
use std::rc::Rc;

use log::debug;

use crate::posix;

/// Shared state of one OS pipe, jointly owned by its two endpoint
/// descriptors.
///
/// The pipe itself is allocated lazily: whichever endpoint is opened first
/// fills in both file descriptors, and the other endpoint's open becomes a
/// no-op.  Allocation happens at most once per channel, so closing an
/// endpoint and opening it again does not silently produce a second pipe.
#[derive(Debug)]
pub(crate) struct PipeChannel {
    read_fd: Cell<RawFd>,
    write_fd: Cell<RawFd>,
    opened: Cell<bool>,
}

impl PipeChannel {
    pub(crate) fn new() -> Rc<PipeChannel> {
        Rc::new(PipeChannel {
            read_fd: Cell::new(-1),
            write_fd: Cell::new(-1),
            opened: Cell::new(false),
        })
    }

    /// Allocate the OS pipe on first call; later calls are no-ops.
    pub(crate) fn ensure_open(&self) -> io::Result<()> {
        if self.opened.get() {
            return Ok(());
        }
        let (read_fd, write_fd) = posix::pipe()?;
        debug!("allocated pipe: read fd {}, write fd {}", read_fd, write_fd);
        self.read_fd.set(read_fd);
        self.write_fd.set(write_fd);
        self.opened.set(true);
        Ok(())
    }

    pub(crate) fn read_fd(&self) -> RawFd {
        self.read_fd.get()
    }

    pub(crate) fn write_fd(&self) -> RawFd {
        self.write_fd.get()
    }

    /// Close the read half, leaving the write half untouched.
    pub(crate) fn close_read(&self) -> io::Result<()> {
        let fd = self.read_fd.replace(-1);
        if fd >= 0 {
            posix::close(fd)?;
        }
        Ok(())
    }

    /// Close the write half, leaving the read half untouched.
    pub(crate) fn close_write(&self) -> io::Result<()> {
        let fd = self.write_fd.replace(-1);
        if fd >= 0 {
            posix::close(fd)?;
        }
        Ok(())
    }
}

impl Drop for PipeChannel {
    // Last-resort release when neither endpoint was driven through close().
    fn drop(&mut self) {
        let _ = self.close_read();
        let _ = self.close_write();
    }
}
