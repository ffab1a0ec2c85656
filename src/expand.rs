//! Turning a command string into an argv vector.

use std::ffi::OsString;
use std::io;

use crate::error::{Error, Result};

/// Expands a command string into the argv vector handed to the spawn
/// primitive.
///
/// `argv[0]` is the binary name or path (PATH lookup happens at spawn
/// time); the remaining entries are the arguments.  The crate ships
/// [`WordsExpander`] as the default; install a custom implementation with
/// [`Command::expander`](crate::Command::expander) to change quoting or
/// expansion rules.
pub trait ShellExpander {
    /// Expand `command` into a non-empty argv vector.
    fn expand(&self, command: &str) -> Result<Vec<OsString>>;
}

/// The default expander: quote-aware word splitting with filename
/// expansion.
///
/// Splitting follows POSIX shell quoting rules.  After splitting, words
/// containing `*`, `?` or `[` are glob-expanded against the filesystem; a
/// pattern that matches nothing is kept literally, as in a shell without
/// `nullglob`.  Variable and tilde expansion are not performed.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordsExpander;

impl ShellExpander for WordsExpander {
    fn expand(&self, command: &str) -> Result<Vec<OsString>> {
        let words = match shlex::split(command) {
            Some(words) => words,
            None => {
                return Err(Error::os(
                    format!("expand {:?}", command),
                    io::Error::from_raw_os_error(libc::EINVAL),
                ))
            }
        };
        if words.is_empty() {
            return Err(Error::Usage("cannot expand an empty command"));
        }
        let mut argv = Vec::with_capacity(words.len());
        for word in words {
            let has_magic = word.chars().any(|c| matches!(c, '*' | '?' | '['));
            match has_magic.then(|| expand_glob(&word)).flatten() {
                Some(mut matches) => argv.append(&mut matches),
                None => argv.push(OsString::from(word)),
            }
        }
        Ok(argv)
    }
}

fn expand_glob(pattern: &str) -> Option<Vec<OsString>> {
    let entries = glob::glob(pattern).ok()?;
    let mut matches: Vec<OsString> = entries
        .filter_map(|entry| entry.ok())
        .map(|path| path.into_os_string())
        .collect();
    if matches.is_empty() {
        return None;
    }
    matches.sort();
    Some(matches)
}
