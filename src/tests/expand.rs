use std::ffi::OsString;
use std::fs;

use tempfile::TempDir;

use crate::{Error, ShellExpander, WordsExpander};

fn expand(command: &str) -> Vec<OsString> {
    WordsExpander.expand(command).unwrap()
}

#[test]
fn splits_on_whitespace() {
    assert_eq!(expand("ls -l /tmp"), ["ls", "-l", "/tmp"]);
}

#[test]
fn quoting_keeps_words_together() {
    assert_eq!(expand("grep 'two words' file"), ["grep", "two words", "file"]);
    assert_eq!(
        expand("sh -c \"echo a; echo b\""),
        ["sh", "-c", "echo a; echo b"]
    );
}

#[test]
fn empty_command_is_usage_error() {
    assert!(matches!(
        WordsExpander.expand(""),
        Err(Error::Usage(_))
    ));
    assert!(matches!(
        WordsExpander.expand("   "),
        Err(Error::Usage(_))
    ));
}

#[test]
fn unbalanced_quote_is_os_error() {
    assert!(matches!(
        WordsExpander.expand("echo 'oops"),
        Err(Error::Os { .. })
    ));
}

#[test]
fn glob_expands_matching_words() {
    let tmpdir = TempDir::new().unwrap();
    fs::write(tmpdir.path().join("a.txt"), "").unwrap();
    fs::write(tmpdir.path().join("b.txt"), "").unwrap();
    fs::write(tmpdir.path().join("c.log"), "").unwrap();

    let pattern = format!("wc {}/*.txt", tmpdir.path().display());
    let argv = expand(&pattern);
    assert_eq!(argv.len(), 3);
    assert_eq!(argv[0], "wc");
    assert_eq!(argv[1], tmpdir.path().join("a.txt").into_os_string());
    assert_eq!(argv[2], tmpdir.path().join("b.txt").into_os_string());
}

#[test]
fn unmatched_glob_stays_literal() {
    let tmpdir = TempDir::new().unwrap();
    let pattern = format!("ls {}/*.none", tmpdir.path().display());
    let argv = expand(&pattern);
    assert_eq!(argv[1], OsString::from(format!("{}/*.none", tmpdir.path().display())));
}

#[test]
fn plain_words_are_untouched_by_globbing() {
    assert_eq!(expand("tr a-z A-Z"), ["tr", "a-z", "A-Z"]);
}
