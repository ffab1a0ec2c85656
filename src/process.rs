//! A single child process with three pluggable standard streams.

use std::fmt;

use log::debug;

use crate::descriptor::{self, Descriptor, StandardStream};
use crate::error::{Error, Result};
use crate::expand::ShellExpander;
use crate::posix;
use crate::spawn::{self, FileActions};

/// Exit status of a reaped process.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum ExitStatus {
    /// The process exited with the specified exit code.
    ///
    /// Note that the exit code is limited to a much smaller range on
    /// most platforms.
    Exited(u32),

    /// The process exited due to a signal with the specified number.
    Signaled(u8),

    /// The process exit status cannot be described by the preceding
    /// two variants.
    ///
    /// This should not occur in normal operation.
    Other(i32),
}

impl ExitStatus {
    /// True if the exit status of the process is 0.
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// Returns the exit code if the process exited normally.
    pub fn code(&self) -> Option<u32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled(sig) => write!(f, "signal {}", sig),
            ExitStatus::Other(raw) => write!(f, "unrecognized wait status {}", raw),
        }
    }
}

#[derive(Debug)]
enum State {
    Unspawned,
    Spawned(u32),
    Reaped(ExitStatus),
}

/// One child to be spawned: a command string plus three descriptor slots.
///
/// The slots default to the parent's standard streams.  A
/// [`Command`](crate::Command) owns its processes and rewires the slots
/// when building a pipeline; direct use of `Process` is only needed when
/// assembling pipelines by hand.
///
/// A process moves through three states: unspawned, spawned (after
/// [`execute`](Self::execute) records the child's PID), and reaped (after
/// [`wait`](Self::wait) collects its exit status).
#[derive(Debug)]
pub struct Process {
    cmd: String,
    stdin: Descriptor,
    stdout: Descriptor,
    stderr: Descriptor,
    state: State,
}

impl Process {
    /// Creates an unspawned process with all three streams inherited from
    /// the parent.
    pub fn new(cmd: impl Into<String>) -> Process {
        Process {
            cmd: cmd.into(),
            stdin: descriptor::std_in(),
            stdout: descriptor::std_out(),
            stderr: descriptor::std_err(),
            state: State::Unspawned,
        }
    }

    /// The command string this process will run.
    pub fn command(&self) -> &str {
        &self.cmd
    }

    /// The descriptor currently occupying the stdin slot.
    pub fn stdin(&self) -> &Descriptor {
        &self.stdin
    }

    /// The descriptor currently occupying the stdout slot.
    pub fn stdout(&self) -> &Descriptor {
        &self.stdout
    }

    /// The descriptor currently occupying the stderr slot.
    pub fn stderr(&self) -> &Descriptor {
        &self.stderr
    }

    /// Replaces the stdin slot.
    pub fn set_stdin(&mut self, desc: Descriptor) {
        self.stdin = desc;
    }

    /// Replaces the stdout slot.
    pub fn set_stdout(&mut self, desc: Descriptor) {
        self.stdout = desc;
    }

    /// Replaces the stderr slot.
    pub fn set_stderr(&mut self, desc: Descriptor) {
        self.stderr = desc;
    }

    /// Points the stdout slot at the stderr slot's descriptor, the child
    /// equivalent of `1>&2`.
    pub fn merge_stdout_into_stderr(&mut self) {
        self.stdout = self.stderr.clone();
    }

    /// Points the stderr slot at the stdout slot's descriptor, the child
    /// equivalent of `2>&1`.
    pub fn merge_stderr_into_stdout(&mut self) {
        self.stderr = self.stdout.clone();
    }

    /// The child's PID, once spawned and until reaped.
    pub fn pid(&self) -> Option<u32> {
        match self.state {
            State::Spawned(pid) => Some(pid),
            _ => None,
        }
    }

    /// The exit status, once reaped.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self.state {
            State::Reaped(status) => Some(status),
            _ => None,
        }
    }

    pub(crate) fn is_spawned(&self) -> bool {
        matches!(self.state, State::Spawned(_))
    }

    /// Expand the command and spawn the child.
    ///
    /// The steps happen in a fixed order: every stream descriptor is opened
    /// and registered for duplication onto fds 0/1/2 in the child, the
    /// originals are registered for closing in the child, the child is
    /// spawned, and finally the parent-side copies are closed.  Closing the
    /// parent copies after the spawn is what lets downstream pipeline
    /// stages see EOF once this child exits.
    pub fn execute(&mut self, expander: &dyn ShellExpander) -> Result<()> {
        if !matches!(self.state, State::Unspawned) {
            return Err(Error::Usage("process has already been spawned"));
        }
        let argv = expander.expand(&self.cmd)?;

        let mut actions = FileActions::new()?;
        let slots = [
            (&self.stdin, StandardStream::Input),
            (&self.stdout, StandardStream::Output),
            (&self.stderr, StandardStream::Error),
        ];
        for &(desc, target) in &slots {
            desc.open()?;
            actions.dup(desc, target)?;
        }
        for &(desc, _) in &slots {
            actions.close(desc)?;
        }

        let pid = spawn::spawn(&argv, &actions)?;
        self.state = State::Spawned(pid);
        debug!("spawned {:?} as pid {}", self.cmd, pid);

        self.stdin.close()?;
        self.stdout.close()?;
        self.stderr.close()?;
        Ok(())
    }

    /// Reap the child and return its exit status.
    ///
    /// Valid exactly once, after a successful [`execute`](Self::execute);
    /// anything else is a usage error.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        match self.state {
            State::Unspawned => Err(Error::Usage("wait() called before execute()")),
            State::Reaped(_) => Err(Error::Usage("process has already been reaped")),
            State::Spawned(pid) => {
                let (_, status) = posix::waitpid(pid, 0).map_err(|e| Error::os("waitpid", e))?;
                debug!("pid {} finished with {}", pid, status);
                self.state = State::Reaped(status);
                Ok(status)
            }
        }
    }

    // Best-effort release of all three streams, used when a pipeline aborts
    // mid-spawn and the usual close-after-spawn sequence will not run.
    pub(crate) fn close_streams(&self) {
        let _ = self.stdin.close();
        let _ = self.stdout.close();
        let _ = self.stderr.close();
    }
}
