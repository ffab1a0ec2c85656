use std::fs;

use tempfile::TempDir;

use crate::{link, std_err, std_in, std_out, Capabilities, Descriptor, Error, FileFlags};

#[test]
fn standard_streams_are_fixed() {
    let streams = [std_in(), std_out(), std_err()];
    for (expected_fd, stream) in streams.iter().enumerate() {
        assert_eq!(stream.fd(), expected_fd as i32);
        assert!(!stream.closable());
        stream.open().unwrap();
        stream.close().unwrap();
        assert_eq!(stream.fd(), expected_fd as i32);
    }
}

#[test]
fn standard_stream_accessors_are_cached() {
    assert_eq!(std_out().fd(), std_out().fd());
    assert_eq!(std_err().fd(), 2);
}

#[test]
fn file_close_is_idempotent() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("input");
    fs::write(&path, "content").unwrap();

    let desc = Descriptor::input_file(&path);
    assert_eq!(desc.fd(), -1);
    desc.open().unwrap();
    assert!(desc.fd() >= 0);
    assert!(desc.closable());
    desc.close().unwrap();
    assert_eq!(desc.fd(), -1);
    desc.close().unwrap();
    desc.close().unwrap();
    assert_eq!(desc.fd(), -1);
    assert!(!desc.closable());
}

#[test]
fn file_open_is_idempotent() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("input");
    fs::write(&path, "content").unwrap();

    let desc = Descriptor::input_file(&path);
    desc.open().unwrap();
    let fd = desc.fd();
    desc.open().unwrap();
    assert_eq!(desc.fd(), fd);
    desc.close().unwrap();
}

#[test]
fn missing_input_file_is_os_error() {
    let desc = Descriptor::input_file("/nonexistent_path_xyz/input");
    match desc.open() {
        Err(Error::Os { op, .. }) => assert!(op.starts_with("open")),
        other => panic!("expected os error, got {:?}", other),
    }
}

#[test]
fn output_file_writes_through() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("output");

    let desc = Descriptor::output_file(&path, FileFlags::CREATE | FileFlags::TRUNCATE);
    desc.open().unwrap();
    desc.write_all(b"written directly").unwrap();
    desc.close().unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), "written directly");
}

#[test]
fn linking_is_one_shot() {
    let reader = Descriptor::pipe_reader();
    let writer = Descriptor::pipe_writer();
    link(&reader, &writer).unwrap();

    let other = Descriptor::pipe_writer();
    assert!(matches!(link(&reader, &other), Err(Error::Usage(_))));
    let other_reader = Descriptor::pipe_reader();
    assert!(matches!(link(&other_reader, &writer), Err(Error::Usage(_))));
}

#[test]
fn linking_requires_pipe_endpoints() {
    let writer = Descriptor::pipe_writer();
    assert!(matches!(link(&std_in(), &writer), Err(Error::Usage(_))));
    let reader = Descriptor::pipe_reader();
    assert!(matches!(
        link(&reader, &Descriptor::input_buffer("x")),
        Err(Error::Usage(_))
    ));
}

#[test]
fn linked_pair_opens_jointly() {
    let (reader, writer) = Descriptor::pipe();
    assert_eq!(reader.fd(), -1);
    assert_eq!(writer.fd(), -1);

    // Opening either end materializes the pipe and fills in both fds.
    reader.open().unwrap();
    let (read_fd, write_fd) = (reader.fd(), writer.fd());
    assert!(read_fd >= 0);
    assert!(write_fd >= 0);

    writer.open().unwrap();
    assert_eq!(reader.fd(), read_fd);
    assert_eq!(writer.fd(), write_fd);

    writer.write_all(b"ping").unwrap();
    writer.close().unwrap();
    assert_eq!(writer.fd(), -1);
    assert_eq!(reader.fd(), read_fd);

    let mut received = Vec::new();
    reader.read_to_end(&mut received).unwrap();
    assert_eq!(received, b"ping");
    reader.close().unwrap();
    reader.close().unwrap();
    assert_eq!(reader.fd(), -1);
}

#[test]
fn unlinked_endpoint_does_not_open() {
    let reader = Descriptor::pipe_reader();
    assert!(matches!(reader.open(), Err(Error::Usage(_))));
}

#[test]
fn capabilities_follow_variant() {
    assert_eq!(std_in().capabilities(), Capabilities::READ);
    assert_eq!(std_out().capabilities(), Capabilities::WRITE);
    assert_eq!(std_err().capabilities(), Capabilities::WRITE);
    assert!(Descriptor::input_file("x").can_read());
    assert!(!Descriptor::input_file("x").can_write());
    assert!(Descriptor::output_file("x", FileFlags::empty()).can_write());
    let (reader, writer) = Descriptor::pipe();
    assert_eq!(reader.capabilities(), Capabilities::READ);
    assert_eq!(writer.capabilities(), Capabilities::WRITE);
    assert!(Descriptor::input_buffer("x").can_read());
    assert!(crate::OutputBuffer::new().descriptor().can_write());
}

#[test]
fn input_buffer_delivers_payload() {
    let desc = Descriptor::input_buffer("line1\nline2\n");
    desc.open().unwrap();
    assert!(desc.fd() >= 0);

    let mut received = Vec::new();
    desc.read_to_end(&mut received).unwrap();
    assert_eq!(received, b"line1\nline2\n");

    desc.close().unwrap();
    assert_eq!(desc.fd(), -1);
    desc.close().unwrap();
}

#[test]
fn input_buffer_open_is_idempotent() {
    let desc = Descriptor::input_buffer("payload");
    desc.open().unwrap();
    let fd = desc.fd();
    desc.open().unwrap();
    assert_eq!(desc.fd(), fd);
    desc.close().unwrap();
}

#[test]
fn input_buffer_survives_large_payload() {
    // Several times the kernel pipe buffer; the feeder thread keeps
    // writing while we drain.
    let payload = vec![b'x'; 256 * 1024];
    let desc = Descriptor::input_buffer(payload.clone());
    desc.open().unwrap();

    let mut received = Vec::new();
    desc.read_to_end(&mut received).unwrap();
    assert_eq!(received.len(), payload.len());
    desc.close().unwrap();
}

#[test]
fn output_buffer_captures_on_close() {
    let buffer = crate::OutputBuffer::new();
    let desc = buffer.descriptor();
    desc.open().unwrap();
    assert!(desc.fd() >= 0);

    desc.write_all(b"captured").unwrap();
    desc.close().unwrap();
    assert_eq!(desc.fd(), -1);
    assert_eq!(buffer.contents(), "captured");

    // A second close must not disturb the captured contents.
    desc.close().unwrap();
    assert_eq!(buffer.contents(), "captured");
}

#[test]
fn output_buffer_open_is_idempotent() {
    let buffer = crate::OutputBuffer::new();
    let desc = buffer.descriptor();
    desc.open().unwrap();
    let fd = desc.fd();
    desc.open().unwrap();
    assert_eq!(desc.fd(), fd);
    desc.close().unwrap();
}

#[test]
fn direction_mismatch_is_usage_error() {
    let tmpdir = TempDir::new().unwrap();
    let path = tmpdir.path().join("input");
    fs::write(&path, "content").unwrap();

    let desc = Descriptor::input_file(&path);
    desc.open().unwrap();
    assert!(matches!(desc.write_all(b"nope"), Err(Error::Usage(_))));
    desc.close().unwrap();

    let mut sink = Vec::new();
    assert!(matches!(
        Descriptor::output_file(&path, FileFlags::empty()).read_to_end(&mut sink),
        Err(Error::Usage(_))
    ));
}

#[test]
fn unopened_descriptor_rejects_io() {
    let desc = Descriptor::input_file("whatever");
    let mut sink = Vec::new();
    assert!(matches!(desc.read_to_end(&mut sink), Err(Error::Usage(_))));
}
