//! Descriptors: library-level handles to the OS streams a child process
//! reads from and writes to.
//!
//! A [`Descriptor`] wraps one concrete stream variant behind a uniform
//! open/close/fd contract.  The pipeline machinery drives every descriptor
//! through the same life cycle: `open()` right before the owning process is
//! spawned, `close()` right after, both idempotent.

use std::cell::RefCell;
use std::fmt;
use std::fs::File;
use std::io::{self, Write};
use std::os::unix::io::{FromRawFd, RawFd};
use std::path::PathBuf;
use std::rc::Rc;
use std::thread;

use bitflags::bitflags;
use log::warn;

use crate::error::{Error, Result};
use crate::pipe::PipeChannel;
use crate::posix;

/// Identifies one of the three standard streams.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum StandardStream {
    /// Standard input, fd 0.
    Input,
    /// Standard output, fd 1.
    Output,
    /// Standard error, fd 2.
    Error,
}

impl StandardStream {
    pub(crate) fn fd(self) -> RawFd {
        match self {
            StandardStream::Input => 0,
            StandardStream::Output => 1,
            StandardStream::Error => 2,
        }
    }
}

bitflags! {
    /// Directions a descriptor can move data in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// The parent may read from this descriptor's fd.
        const READ = 0b01;
        /// The parent may write to this descriptor's fd.
        const WRITE = 0b10;
    }
}

bitflags! {
    /// Extra open flags for file-backed descriptors.
    ///
    /// The access direction is fixed by the constructor
    /// ([`Descriptor::input_file`] is always read-only,
    /// [`Descriptor::output_file`] always write-only); these flags are or'ed
    /// on top.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileFlags: i32 {
        /// Create the file if it does not exist.
        const CREATE = libc::O_CREAT;
        /// Truncate the file on open.
        const TRUNCATE = libc::O_TRUNC;
        /// Append to the file instead of overwriting.
        const APPEND = libc::O_APPEND;
        /// Fail if the file already exists.
        const EXCL = libc::O_EXCL;
    }
}

#[derive(Debug, Copy, Clone)]
enum Access {
    Read,
    Write,
}

#[derive(Debug)]
enum Kind {
    Standard(StandardStream),
    File {
        path: PathBuf,
        access: Access,
        flags: FileFlags,
        fd: RawFd,
    },
    PipeReader {
        channel: Option<Rc<PipeChannel>>,
    },
    PipeWriter {
        channel: Option<Rc<PipeChannel>>,
    },
    InputBuffer {
        payload: Option<Vec<u8>>,
        fd: RawFd,
    },
    OutputBuffer {
        sink: Rc<RefCell<Vec<u8>>>,
        read_fd: RawFd,
        write_fd: RawFd,
        opened: bool,
    },
}

/// A handle to a readable or writable OS stream.
///
/// `Descriptor` is cheaply cloneable; clones share the same underlying
/// state.  That is how a single stream can serve two slots of a process, as
/// in stderr-to-stdout redirection, and how the two ends of a pipe stay in
/// sync.
///
/// Most callers never construct descriptors directly; the redirection
/// methods on [`Command`](crate::Command) accept strings, paths, and capture
/// buffers and build the right variant.  The constructors here are the
/// escape hatch for wiring streams by hand.
#[derive(Clone)]
pub struct Descriptor {
    inner: Rc<RefCell<Kind>>,
}

thread_local! {
    static STD_IN: Descriptor = Descriptor::new(Kind::Standard(StandardStream::Input));
    static STD_OUT: Descriptor = Descriptor::new(Kind::Standard(StandardStream::Output));
    static STD_ERR: Descriptor = Descriptor::new(Kind::Standard(StandardStream::Error));
}

/// Returns the shared handle to the parent's standard input.
pub fn std_in() -> Descriptor {
    STD_IN.with(|d| d.clone())
}

/// Returns the shared handle to the parent's standard output.
pub fn std_out() -> Descriptor {
    STD_OUT.with(|d| d.clone())
}

/// Returns the shared handle to the parent's standard error.
pub fn std_err() -> Descriptor {
    STD_ERR.with(|d| d.clone())
}

/// Link a pipe read end and a pipe write end into one future OS pipe.
///
/// Linking is one-shot: each endpoint can be linked exactly once, and
/// linking anything that is not an unlinked pipe endpoint is a usage error.
/// The OS pipe itself is allocated by the first `open()` on either end.
pub fn link(reader: &Descriptor, writer: &Descriptor) -> Result<()> {
    if Rc::ptr_eq(&reader.inner, &writer.inner) {
        return Err(Error::Usage("cannot link a pipe endpoint to itself"));
    }
    let mut r = reader.inner.borrow_mut();
    let mut w = writer.inner.borrow_mut();
    match (&mut *r, &mut *w) {
        (Kind::PipeReader { channel: r_ch }, Kind::PipeWriter { channel: w_ch }) => {
            if r_ch.is_some() || w_ch.is_some() {
                return Err(Error::Usage("pipe endpoint is already linked"));
            }
            let channel = PipeChannel::new();
            *r_ch = Some(Rc::clone(&channel));
            *w_ch = Some(channel);
            Ok(())
        }
        _ => Err(Error::Usage(
            "link() takes a pipe read end and a pipe write end",
        )),
    }
}

impl Descriptor {
    fn new(kind: Kind) -> Descriptor {
        Descriptor {
            inner: Rc::new(RefCell::new(kind)),
        }
    }

    /// A file opened read-only, to serve as a child's standard input.
    pub fn input_file(path: impl Into<PathBuf>) -> Descriptor {
        Descriptor::new(Kind::File {
            path: path.into(),
            access: Access::Read,
            flags: FileFlags::empty(),
            fd: -1,
        })
    }

    /// A file opened write-only with the given extra flags, to receive a
    /// child's standard output or standard error.
    pub fn output_file(path: impl Into<PathBuf>, flags: FileFlags) -> Descriptor {
        Descriptor::new(Kind::File {
            path: path.into(),
            access: Access::Write,
            flags,
            fd: -1,
        })
    }

    /// A descriptor that feeds the given bytes to the child's standard
    /// input through an internal pipe.
    pub fn input_buffer(data: impl Into<Vec<u8>>) -> Descriptor {
        Descriptor::new(Kind::InputBuffer {
            payload: Some(data.into()),
            fd: -1,
        })
    }

    /// An unlinked pipe read end.  See [`link`].
    pub fn pipe_reader() -> Descriptor {
        Descriptor::new(Kind::PipeReader { channel: None })
    }

    /// An unlinked pipe write end.  See [`link`].
    pub fn pipe_writer() -> Descriptor {
        Descriptor::new(Kind::PipeWriter { channel: None })
    }

    /// A freshly linked `(reader, writer)` pair.
    ///
    /// No OS resources are allocated yet; the pipe is created by the first
    /// `open()` on either end.
    pub fn pipe() -> (Descriptor, Descriptor) {
        let reader = Descriptor::pipe_reader();
        let writer = Descriptor::pipe_writer();
        link(&reader, &writer).expect("linking fresh pipe endpoints");
        (reader, writer)
    }

    /// Returns the current OS file descriptor, or -1 if not open.
    pub fn fd(&self) -> RawFd {
        match &*self.inner.borrow() {
            Kind::Standard(stream) => stream.fd(),
            Kind::File { fd, .. } => *fd,
            Kind::PipeReader { channel } => channel.as_ref().map_or(-1, |c| c.read_fd()),
            Kind::PipeWriter { channel } => channel.as_ref().map_or(-1, |c| c.write_fd()),
            Kind::InputBuffer { fd, .. } => *fd,
            Kind::OutputBuffer { write_fd, .. } => *write_fd,
        }
    }

    /// Whether the parent side owns this fd and must release it after
    /// spawning.  Standard streams are never closable.
    pub fn closable(&self) -> bool {
        match &*self.inner.borrow() {
            Kind::Standard(_) => false,
            _ => self.fd() >= 0,
        }
    }

    /// The directions this descriptor supports.
    pub fn capabilities(&self) -> Capabilities {
        match &*self.inner.borrow() {
            Kind::Standard(StandardStream::Input) => Capabilities::READ,
            Kind::Standard(_) => Capabilities::WRITE,
            Kind::File {
                access: Access::Read,
                ..
            } => Capabilities::READ,
            Kind::File { .. } => Capabilities::WRITE,
            Kind::PipeReader { .. } | Kind::InputBuffer { .. } => Capabilities::READ,
            Kind::PipeWriter { .. } | Kind::OutputBuffer { .. } => Capabilities::WRITE,
        }
    }

    /// True if the parent may read from this descriptor.
    pub fn can_read(&self) -> bool {
        self.capabilities().contains(Capabilities::READ)
    }

    /// True if the parent may write to this descriptor.
    pub fn can_write(&self) -> bool {
        self.capabilities().contains(Capabilities::WRITE)
    }

    /// Transition from unopened to open, allocating whatever OS resources
    /// the variant needs.  Opening an already-open descriptor is a no-op.
    pub fn open(&self) -> Result<()> {
        match &mut *self.inner.borrow_mut() {
            Kind::Standard(_) => Ok(()),
            Kind::File {
                path,
                access,
                flags,
                fd,
            } => {
                if *fd >= 0 {
                    return Ok(());
                }
                let direction = match access {
                    Access::Read => libc::O_RDONLY,
                    Access::Write => libc::O_WRONLY,
                };
                *fd = posix::open(path, direction | flags.bits(), 0o666)
                    .map_err(|e| Error::os(format!("open {}", path.display()), e))?;
                Ok(())
            }
            Kind::PipeReader { channel } | Kind::PipeWriter { channel } => {
                let channel = channel
                    .as_ref()
                    .ok_or(Error::Usage("pipe endpoint is not linked"))?;
                channel.ensure_open().map_err(|e| Error::os("pipe", e))
            }
            Kind::InputBuffer { payload, fd } => {
                if *fd >= 0 {
                    return Ok(());
                }
                let data = match payload.take() {
                    Some(data) => data,
                    None => return Ok(()),
                };
                let (read_fd, write_fd) = posix::pipe().map_err(|e| Error::os("pipe", e))?;
                if let Err(e) = feed_payload(write_fd, data) {
                    let _ = posix::close(read_fd);
                    return Err(Error::os("stdin feeder", e));
                }
                *fd = read_fd;
                Ok(())
            }
            Kind::OutputBuffer {
                read_fd,
                write_fd,
                opened,
                ..
            } => {
                if *opened {
                    return Ok(());
                }
                let (r, w) = posix::pipe().map_err(|e| Error::os("pipe", e))?;
                *read_fd = r;
                *write_fd = w;
                *opened = true;
                Ok(())
            }
        }
    }

    /// Transition to closed, releasing the OS resources this descriptor
    /// owns and performing any deferred I/O.  Closing an already-closed
    /// descriptor is a no-op.
    ///
    /// For an output buffer this is where the capture happens: the write
    /// end is closed first, then the read end is drained to EOF into the
    /// buffer.  The drain blocks until every copy of the write end is
    /// closed, which for a spawned child means until it exits or closes its
    /// output.
    pub fn close(&self) -> Result<()> {
        match &mut *self.inner.borrow_mut() {
            Kind::Standard(_) => Ok(()),
            Kind::File { fd, .. } | Kind::InputBuffer { fd, .. } => {
                if *fd >= 0 {
                    let closing = *fd;
                    *fd = -1;
                    posix::close(closing).map_err(|e| Error::os("close", e))?;
                }
                Ok(())
            }
            Kind::PipeReader { channel } => match channel {
                Some(channel) => channel.close_read().map_err(|e| Error::os("close", e)),
                None => Ok(()),
            },
            Kind::PipeWriter { channel } => match channel {
                Some(channel) => channel.close_write().map_err(|e| Error::os("close", e)),
                None => Ok(()),
            },
            Kind::OutputBuffer {
                sink,
                read_fd,
                write_fd,
                ..
            } => {
                if *write_fd >= 0 {
                    let closing = *write_fd;
                    *write_fd = -1;
                    posix::close(closing).map_err(|e| Error::os("close", e))?;
                }
                if *read_fd >= 0 {
                    let mut collected = Vec::new();
                    let drained = posix::read_to_end(*read_fd, &mut collected);
                    let closed = posix::close(*read_fd);
                    *read_fd = -1;
                    sink.borrow_mut().extend_from_slice(&collected);
                    drained.map_err(|e| Error::os("read", e))?;
                    closed.map_err(|e| Error::os("close", e))?;
                }
                Ok(())
            }
        }
    }

    /// Write all of `data` to an open, writable descriptor.
    ///
    /// Short writes are retried until the whole buffer is delivered.
    pub fn write_all(&self, data: &[u8]) -> Result<()> {
        if !self.can_write() {
            return Err(Error::Usage("descriptor is not writable"));
        }
        let fd = self.fd();
        if fd < 0 {
            return Err(Error::Usage("descriptor is not open"));
        }
        posix::write_all(fd, data).map_err(|e| Error::os("write", e))
    }

    /// Read an open, readable descriptor to EOF, appending to `out`.
    /// Returns the number of bytes read.
    pub fn read_to_end(&self, out: &mut Vec<u8>) -> Result<usize> {
        if !self.can_read() {
            return Err(Error::Usage("descriptor is not readable"));
        }
        let fd = self.fd();
        if fd < 0 {
            return Err(Error::Usage("descriptor is not open"));
        }
        posix::read_to_end(fd, out).map_err(|e| Error::os("read", e))
    }
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match &*self.inner.borrow() {
            Kind::Standard(StandardStream::Input) => "stdin",
            Kind::Standard(StandardStream::Output) => "stdout",
            Kind::Standard(StandardStream::Error) => "stderr",
            Kind::File {
                access: Access::Read,
                ..
            } => "input file",
            Kind::File { .. } => "output file",
            Kind::PipeReader { .. } => "pipe reader",
            Kind::PipeWriter { .. } => "pipe writer",
            Kind::InputBuffer { .. } => "input buffer",
            Kind::OutputBuffer { .. } => "output buffer",
        };
        write!(f, "Descriptor {{ {}, fd {} }}", name, self.fd())
    }
}

impl Drop for Kind {
    // Last-resort release of fds whose descriptor was never driven through
    // close(), e.g. when a pipeline is dropped without running.  Deferred
    // I/O does not happen here.
    fn drop(&mut self) {
        match self {
            Kind::Standard(_) | Kind::PipeReader { .. } | Kind::PipeWriter { .. } => {}
            Kind::File { fd, .. } | Kind::InputBuffer { fd, .. } => {
                if *fd >= 0 {
                    let _ = posix::close(*fd);
                }
            }
            Kind::OutputBuffer {
                read_fd, write_fd, ..
            } => {
                if *write_fd >= 0 {
                    let _ = posix::close(*write_fd);
                }
                if *read_fd >= 0 {
                    let _ = posix::close(*read_fd);
                }
            }
        }
    }
}

/// Hand the pipe's write end and the payload to a detached feeder thread.
///
/// Writing in a separate thread keeps `open()` from blocking when the
/// payload exceeds the kernel pipe buffer; the child drains the pipe
/// concurrently once it is spawned.  EPIPE means the child stopped reading
/// early and is not an error.
///
/// The write end is marked close-on-exec.  It stays open until the feeder
/// finishes, and a child that inherited a copy would hold its own stdin's
/// write end open and never see EOF.
fn feed_payload(write_fd: RawFd, data: Vec<u8>) -> io::Result<()> {
    let mut sink = unsafe { File::from_raw_fd(write_fd) };
    posix::set_cloexec(write_fd)?;
    thread::Builder::new()
        .name("cmdpipe-stdin-feeder".into())
        .spawn(move || {
            if let Err(e) = sink.write_all(&data) {
                if e.kind() != io::ErrorKind::BrokenPipe {
                    warn!("stdin feeder: write failed: {}", e);
                }
            }
        })?;
    Ok(())
}

/// Captures a child's output into memory.
///
/// Pass a reference to [`Command::stdout`](crate::Command::stdout) or
/// [`Command::stderr`](crate::Command::stderr); after the pipeline has run,
/// the captured bytes are available here.
///
/// ```no_run
/// # fn main() -> cmdpipe::Result<()> {
/// use cmdpipe::{Command, OutputBuffer};
///
/// let out = OutputBuffer::new();
/// Command::new("echo hello").stdout(&out).run()?;
/// assert_eq!(out.contents(), "hello\n");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    sink: Rc<RefCell<Vec<u8>>>,
}

impl OutputBuffer {
    /// Creates an empty capture buffer.
    pub fn new() -> OutputBuffer {
        OutputBuffer::default()
    }

    /// A descriptor that collects into this buffer when closed.
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::new(Kind::OutputBuffer {
            sink: Rc::clone(&self.sink),
            read_fd: -1,
            write_fd: -1,
            opened: false,
        })
    }

    /// The captured output as a string, converted from bytes using
    /// `String::from_utf8_lossy`.
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.sink.borrow()).into_owned()
    }

    /// The captured output as raw bytes.
    pub fn bytes(&self) -> Vec<u8> {
        self.sink.borrow().clone()
    }
}
