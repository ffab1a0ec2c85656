use tempfile::TempDir;

use crate::{Descriptor, Error, ExitStatus, FileFlags, OutputBuffer, Process, WordsExpander};

#[test]
fn exit_code_round_trip() {
    for code in [0u32, 1, 2, 42, 127] {
        let mut p = Process::new(format!("sh -c 'exit {}'", code));
        p.execute(&WordsExpander).unwrap();
        assert_eq!(p.wait().unwrap(), ExitStatus::Exited(code));
    }
}

#[test]
fn wait_before_execute_is_usage_error() {
    let mut p = Process::new("true");
    assert!(matches!(p.wait(), Err(Error::Usage(_))));
}

#[test]
fn wait_twice_is_usage_error() {
    let mut p = Process::new("true");
    p.execute(&WordsExpander).unwrap();
    assert!(p.wait().unwrap().success());
    assert!(matches!(p.wait(), Err(Error::Usage(_))));
    assert_eq!(p.exit_status(), Some(ExitStatus::Exited(0)));
}

#[test]
fn execute_twice_is_usage_error() {
    let mut p = Process::new("true");
    p.execute(&WordsExpander).unwrap();
    assert!(matches!(p.execute(&WordsExpander), Err(Error::Usage(_))));
    p.wait().unwrap();
}

#[test]
fn pid_is_recorded_between_spawn_and_reap() {
    let mut p = Process::new("true");
    assert_eq!(p.pid(), None);
    p.execute(&WordsExpander).unwrap();
    assert!(p.pid().is_some());
    p.wait().unwrap();
    assert_eq!(p.pid(), None);
}

#[test]
fn spawn_failure_names_the_binary() {
    let mut p = Process::new("nosuchcommand_xyz --flag");
    match p.execute(&WordsExpander) {
        Err(Error::Os { op, .. }) => assert!(op.contains("nosuchcommand_xyz")),
        other => panic!("expected os error, got {:?}", other),
    }
}

#[test]
fn parent_descriptors_are_closed_after_spawn() {
    let tmpdir = TempDir::new().unwrap();
    let errpath = tmpdir.path().join("stderr");

    let stdin = Descriptor::input_buffer("data\n");
    let capture = OutputBuffer::new();
    let stdout = capture.descriptor();
    let stderr = Descriptor::output_file(&errpath, FileFlags::CREATE | FileFlags::TRUNCATE);

    let mut p = Process::new("cat");
    p.set_stdin(stdin.clone());
    p.set_stdout(stdout.clone());
    p.set_stderr(stderr.clone());
    p.execute(&WordsExpander).unwrap();

    // Every closable parent-side descriptor must be released by the time
    // execute() returns.
    assert_eq!(stdin.fd(), -1);
    assert_eq!(stdout.fd(), -1);
    assert_eq!(stderr.fd(), -1);

    assert!(p.wait().unwrap().success());
    assert_eq!(capture.contents(), "data\n");
}

#[test]
fn merged_slots_share_one_descriptor() {
    let capture = OutputBuffer::new();
    let mut p = Process::new("sh -c 'echo to-stderr 1>&2'");
    p.set_stdout(capture.descriptor());
    p.merge_stderr_into_stdout();
    assert_eq!(p.stdout().fd(), p.stderr().fd());

    p.execute(&WordsExpander).unwrap();
    assert!(p.wait().unwrap().success());
    assert_eq!(capture.contents(), "to-stderr\n");
}
