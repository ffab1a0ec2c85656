//! The user-facing pipeline builder.

use std::fmt;
use std::ops::BitOr;
use std::path::{Path, PathBuf};

use log::debug;

use crate::descriptor::{Descriptor, FileFlags, OutputBuffer};
use crate::error::{Error, Result};
use crate::expand::{ShellExpander, WordsExpander};
use crate::process::{ExitStatus, Process};

/// A command pipeline: one or more processes connected by pipes, with
/// redirectable endpoints.
///
/// A `Command` starts out as a single command string and grows by piping
/// further commands onto its end, either with [`pipe`](Self::pipe) or with
/// the `|` operator.  The pipeline's outer streams are redirected with
/// [`stdin`](Self::stdin), [`stdout`](Self::stdout) and
/// [`stderr`](Self::stderr), which accept descriptors, byte payloads,
/// capture buffers, and file paths.
///
/// Running the pipeline spawns every stage before waiting on any of them,
/// so a long-running stage cannot deadlock the stages after it.  The
/// pipeline's exit status is the last stage's, as in a shell.
///
/// A pipeline is single-use: its descriptors are consumed by the first run.
///
/// # Examples
///
/// ```no_run
/// # fn main() -> cmdpipe::Result<()> {
/// use cmdpipe::{Command, OutputBuffer};
///
/// let upper = OutputBuffer::new();
/// (Command::new("echo hello") | "tr a-z A-Z")
///     .stdout(&upper)
///     .run()?;
/// assert_eq!(upper.contents(), "HELLO\n");
/// # Ok(())
/// # }
/// ```
///
/// Feed a child from memory and redirect its errors to a file:
///
/// ```no_run
/// # fn main() -> cmdpipe::Result<()> {
/// use cmdpipe::Command;
///
/// Command::new("grep needle")
///     .stdin("haystack\nneedle\n")
///     .stderr_append("/tmp/grep.log")
///     .run()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct Command {
    procs: Vec<Process>,
    expander: Box<dyn ShellExpander>,
    consumed: bool,
}

impl Command {
    /// Creates a pipeline holding the single given command.
    pub fn new(cmd: impl Into<String>) -> Command {
        Command {
            procs: vec![Process::new(cmd)],
            expander: Box::new(WordsExpander),
            consumed: false,
        }
    }

    /// Replaces the expander used to turn command strings into argv
    /// vectors.
    pub fn expander(mut self, expander: impl ShellExpander + 'static) -> Command {
        self.expander = Box::new(expander);
        self
    }

    /// Appends `next` to the pipeline, connecting this pipeline's last
    /// stdout to `next`'s first stdin through a fresh pipe.
    ///
    /// Equivalent to the `|` operator.
    pub fn pipe(mut self, next: impl Into<Command>) -> Command {
        let mut next = next.into();
        let (reader, writer) = Descriptor::pipe();
        next.procs
            .first_mut()
            .expect("pipeline contains at least one process")
            .set_stdin(reader);
        self.last_mut().set_stdout(writer);
        self.procs.append(&mut next.procs);
        self
    }

    /// Redirects the first process's standard input.
    ///
    /// Strings and byte vectors are fed to the child through an internal
    /// pipe; paths are opened read-only; a [`Descriptor`] is used as-is.
    pub fn stdin(mut self, src: impl IntoInputDescriptor) -> Command {
        self.first_mut().set_stdin(src.into_input_descriptor());
        self
    }

    /// Redirects the last process's standard output.
    ///
    /// An [`OutputBuffer`] captures the output in memory; paths are opened
    /// for writing with create-and-truncate; a [`Descriptor`] is used
    /// as-is.
    pub fn stdout(mut self, dst: impl IntoOutputDescriptor) -> Command {
        self.last_mut().set_stdout(dst.into_output_descriptor());
        self
    }

    /// Redirects the last process's standard error.  Accepts the same
    /// destinations as [`stdout`](Self::stdout).
    pub fn stderr(mut self, dst: impl IntoOutputDescriptor) -> Command {
        self.last_mut().set_stderr(dst.into_output_descriptor());
        self
    }

    /// Redirects the last process's standard output to `path`, appending
    /// instead of truncating.
    pub fn stdout_append(mut self, path: impl Into<PathBuf>) -> Command {
        self.last_mut().set_stdout(Descriptor::output_file(
            path,
            FileFlags::CREATE | FileFlags::APPEND,
        ));
        self
    }

    /// Redirects the last process's standard error to `path`, appending
    /// instead of truncating.
    pub fn stderr_append(mut self, path: impl Into<PathBuf>) -> Command {
        self.last_mut().set_stderr(Descriptor::output_file(
            path,
            FileFlags::CREATE | FileFlags::APPEND,
        ));
        self
    }

    /// Sends the last process's standard output wherever its standard
    /// error goes, like `1>&2`.
    pub fn stdout_to_stderr(mut self) -> Command {
        self.last_mut().merge_stdout_into_stderr();
        self
    }

    /// Sends the last process's standard error wherever its standard
    /// output goes, like `2>&1`.
    pub fn stderr_to_stdout(mut self) -> Command {
        self.last_mut().merge_stderr_into_stdout();
        self
    }

    /// The processes of this pipeline, in data-flow order.
    pub fn processes(&self) -> &[Process] {
        &self.procs
    }

    /// Runs the pipeline and returns the last stage's exit status,
    /// whatever it is.
    ///
    /// Every stage is spawned before any stage is waited on.  A failure to
    /// spawn some stage aborts the run: the remaining stages are not
    /// started, every descriptor is released so the already-running stages
    /// see EOF, and those stages are reaped best-effort before the error is
    /// returned.
    pub fn status(&mut self) -> Result<ExitStatus> {
        if self.consumed {
            return Err(Error::Usage("pipeline has already been run"));
        }
        self.consumed = true;
        debug!("running {:?}", self);

        let mut failure = None;
        for proc in &mut self.procs {
            if let Err(e) = proc.execute(&*self.expander) {
                failure = Some(e);
                break;
            }
        }
        if let Some(err) = failure {
            for proc in &self.procs {
                proc.close_streams();
            }
            for proc in &mut self.procs {
                if proc.is_spawned() {
                    let _ = proc.wait();
                }
            }
            return Err(err);
        }

        let mut status = None;
        for proc in &mut self.procs {
            status = Some(proc.wait()?);
        }
        Ok(status.expect("pipeline contains at least one process"))
    }

    /// Runs the pipeline, treating a non-zero exit status as an error.
    ///
    /// Returns the (successful) exit status, or [`Error::Command`] carrying
    /// the status if the last stage failed.  Use [`status`](Self::status)
    /// to get non-zero statuses back as plain values.
    pub fn run(&mut self) -> Result<ExitStatus> {
        let status = self.status()?;
        if !status.success() {
            return Err(Error::Command(status));
        }
        Ok(status)
    }

    fn first_mut(&mut self) -> &mut Process {
        self.procs
            .first_mut()
            .expect("pipeline contains at least one process")
    }

    fn last_mut(&mut self) -> &mut Process {
        self.procs
            .last_mut()
            .expect("pipeline contains at least one process")
    }
}

impl From<&str> for Command {
    fn from(cmd: &str) -> Command {
        Command::new(cmd)
    }
}

impl From<String> for Command {
    fn from(cmd: String) -> Command {
        Command::new(cmd)
    }
}

impl<R: Into<Command>> BitOr<R> for Command {
    type Output = Command;

    /// Pipe this pipeline into `rhs`, which may be another `Command` or a
    /// plain command string.
    fn bitor(self, rhs: R) -> Command {
        self.pipe(rhs)
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cmds: Vec<&str> = self.procs.iter().map(|p| p.command()).collect();
        write!(f, "Command {{ {} }}", cmds.join(" | "))
    }
}

mod sealed {
    pub trait InputSealed {}
    pub trait OutputSealed {}
}

/// Trait for types that can serve as a pipeline's standard input.
///
/// This is a sealed trait that cannot be implemented outside this crate.
pub trait IntoInputDescriptor: sealed::InputSealed {
    /// Convert to a descriptor for the stdin slot.
    #[doc(hidden)]
    fn into_input_descriptor(self) -> Descriptor;
}

/// Trait for types that can receive a pipeline's standard output or
/// standard error.
///
/// This is a sealed trait that cannot be implemented outside this crate.
pub trait IntoOutputDescriptor: sealed::OutputSealed {
    /// Convert to a descriptor for the stdout or stderr slot.
    #[doc(hidden)]
    fn into_output_descriptor(self) -> Descriptor;
}

impl sealed::InputSealed for Descriptor {}
impl IntoInputDescriptor for Descriptor {
    fn into_input_descriptor(self) -> Descriptor {
        self
    }
}

impl sealed::InputSealed for &str {}
impl IntoInputDescriptor for &str {
    fn into_input_descriptor(self) -> Descriptor {
        Descriptor::input_buffer(self.as_bytes().to_vec())
    }
}

impl sealed::InputSealed for String {}
impl IntoInputDescriptor for String {
    fn into_input_descriptor(self) -> Descriptor {
        Descriptor::input_buffer(self.into_bytes())
    }
}

impl sealed::InputSealed for Vec<u8> {}
impl IntoInputDescriptor for Vec<u8> {
    fn into_input_descriptor(self) -> Descriptor {
        Descriptor::input_buffer(self)
    }
}

impl sealed::InputSealed for &[u8] {}
impl IntoInputDescriptor for &[u8] {
    fn into_input_descriptor(self) -> Descriptor {
        Descriptor::input_buffer(self.to_vec())
    }
}

impl sealed::InputSealed for &Path {}
impl IntoInputDescriptor for &Path {
    fn into_input_descriptor(self) -> Descriptor {
        Descriptor::input_file(self)
    }
}

impl sealed::InputSealed for PathBuf {}
impl IntoInputDescriptor for PathBuf {
    fn into_input_descriptor(self) -> Descriptor {
        Descriptor::input_file(self)
    }
}

impl sealed::OutputSealed for Descriptor {}
impl IntoOutputDescriptor for Descriptor {
    fn into_output_descriptor(self) -> Descriptor {
        self
    }
}

impl sealed::OutputSealed for &OutputBuffer {}
impl IntoOutputDescriptor for &OutputBuffer {
    fn into_output_descriptor(self) -> Descriptor {
        self.descriptor()
    }
}

impl sealed::OutputSealed for &Path {}
impl IntoOutputDescriptor for &Path {
    fn into_output_descriptor(self) -> Descriptor {
        Descriptor::output_file(self, FileFlags::CREATE | FileFlags::TRUNCATE)
    }
}

impl sealed::OutputSealed for PathBuf {}
impl IntoOutputDescriptor for PathBuf {
    fn into_output_descriptor(self) -> Descriptor {
        Descriptor::output_file(self, FileFlags::CREATE | FileFlags::TRUNCATE)
    }
}
