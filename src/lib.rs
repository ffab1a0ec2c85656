//! Shell-style command pipelines without the shell.
//!
//! This crate lets a program describe and execute command pipelines the way
//! a shell script would, but through a typed builder instead of a string
//! handed to `sh -c`: a single command, a chain of commands connected by
//! pipes, with the outer standard streams redirected to files, in-memory
//! buffers, or arbitrary descriptors.
//!
//! The entry point is [`Command`].  A pipeline is built by piping commands
//! together with the `|` operator (or [`Command::pipe`]) and attaching
//! redirections, then run with [`Command::run`] or [`Command::status`].
//! All stages are spawned before any is waited on, and the pipeline's exit
//! status is the last stage's, as in a shell.
//!
//! # Examples
//!
//! Capture the output of a pipeline:
//!
//! ```no_run
//! # fn main() -> cmdpipe::Result<()> {
//! use cmdpipe::{Command, OutputBuffer};
//!
//! let out = OutputBuffer::new();
//! (Command::new("ls") | "sort -r")
//!     .stdout(&out)
//!     .run()?;
//! print!("{}", out.contents());
//! # Ok(())
//! # }
//! ```
//!
//! Feed data through a child and into a file, appending:
//!
//! ```no_run
//! # fn main() -> cmdpipe::Result<()> {
//! use cmdpipe::Command;
//!
//! Command::new("tr a-z A-Z")
//!     .stdin("shouting\n")
//!     .stdout_append("/tmp/shouts.txt")
//!     .run()?;
//! # Ok(())
//! # }
//! ```
//!
//! Inspect a failure without treating it as an error:
//!
//! ```no_run
//! # fn main() -> cmdpipe::Result<()> {
//! use cmdpipe::Command;
//!
//! let status = Command::new("grep -q needle haystack.txt").status()?;
//! if !status.success() {
//!     eprintln!("no needle: {}", status);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The crate is POSIX-only.  Children are created with `posix_spawnp`, so
//! descriptor wiring is applied atomically in the child without a
//! user-visible fork step.

#![warn(missing_docs)]

#[cfg(not(unix))]
compile_error!("cmdpipe runs child processes via posix_spawn and supports only POSIX platforms");

mod command;
mod descriptor;
mod error;
mod expand;
mod pipe;
mod posix;
mod process;
mod spawn;

pub use self::command::{Command, IntoInputDescriptor, IntoOutputDescriptor};
pub use self::descriptor::{
    link, std_err, std_in, std_out, Capabilities, Descriptor, FileFlags, OutputBuffer,
    StandardStream,
};
pub use self::error::{Error, Result};
pub use self::expand::{ShellExpander, WordsExpander};
pub use self::process::{ExitStatus, Process};

#[cfg(test)]
mod tests {
    mod command;
    mod descriptor;
    mod expand;
    mod process;
}
