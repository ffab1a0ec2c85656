//! Thin wrappers over the raw syscalls the crate needs.
//!
//! Everything here returns `io::Result`; callers attach the operation name
//! when converting to the crate error type.

use std::ffi::{CString, OsStr};
use std::io::{Error, ErrorKind, Result};
use std::iter;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::io::RawFd;
use std::path::Path;
use std::ptr;

use crate::process::ExitStatus;

fn check_err<T: Ord + Default>(num: T) -> Result<T> {
    if num < T::default() {
        return Err(Error::last_os_error());
    }
    Ok(num)
}

/// The `posix_spawn` family reports failure through its return value rather
/// than `errno`.
pub fn check_spawn_err(code: libc::c_int) -> Result<()> {
    if code != 0 {
        return Err(Error::from_raw_os_error(code));
    }
    Ok(())
}

pub fn pipe() -> Result<(RawFd, RawFd)> {
    let mut fds = [0 as libc::c_int; 2];
    check_err(unsafe { libc::pipe(fds.as_mut_ptr()) })?;
    Ok((fds[0], fds[1]))
}

pub fn open(path: &Path, flags: libc::c_int, mode: libc::mode_t) -> Result<RawFd> {
    let cpath = os_to_cstring(path.as_os_str())?;
    check_err(unsafe { libc::open(cstring_ptr(&cpath), flags, mode as libc::c_uint) })
}

pub fn close(fd: RawFd) -> Result<()> {
    check_err(unsafe { libc::close(fd) })?;
    Ok(())
}

pub fn read(fd: RawFd, buf: &mut [u8]) -> Result<usize> {
    let n = check_err(unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) })?;
    Ok(n as usize)
}

pub fn write(fd: RawFd, buf: &[u8]) -> Result<usize> {
    let n = check_err(unsafe { libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len()) })?;
    Ok(n as usize)
}

/// Read `fd` to EOF, appending to `out`.  Returns the number of bytes read.
///
/// Uses a per-call buffer so concurrent readers on different threads don't
/// trample each other.
pub fn read_to_end(fd: RawFd, out: &mut Vec<u8>) -> Result<usize> {
    let mut buf = [0u8; 2048];
    let mut total = 0;
    loop {
        match read(fd, &mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                total += n;
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// Mark `fd` close-on-exec so spawned children do not inherit it.
pub fn set_cloexec(fd: RawFd) -> Result<()> {
    let old = check_err(unsafe { libc::fcntl(fd, libc::F_GETFD) })?;
    check_err(unsafe { libc::fcntl(fd, libc::F_SETFD, old | libc::FD_CLOEXEC) })?;
    Ok(())
}

/// Write all of `buf` to `fd`, tolerating short writes.
pub fn write_all(fd: RawFd, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match write(fd, buf) {
            Ok(n) => buf = &buf[n..],
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn os_to_cstring(s: &OsStr) -> Result<CString> {
    let bytes = s.as_bytes();
    if bytes.iter().any(|&b| b == 0) {
        return Err(Error::from_raw_os_error(libc::EINVAL));
    }
    Ok(CString::new(bytes)
        // not expected to fail on Unix, as Unix paths *are* C strings
        .expect("converting Unix path to C string"))
}

fn cstring_ptr(s: &CString) -> *const libc::c_char {
    s.as_bytes_with_nul().as_ptr() as _
}

#[derive(Debug)]
struct CVec {
    // Individual C strings; they are not unused as rustc thinks, they
    // are pointed to by elements of self.ptrs.
    #[allow(dead_code)]
    strings: Vec<CString>,

    // nullptr-terminated vector of pointers to data inside
    // self.strings.
    ptrs: Vec<*mut libc::c_char>,
}

impl CVec {
    fn new<S>(slice: &[S]) -> Result<CVec>
    where
        S: AsRef<OsStr>,
    {
        let maybe_vec_cstring: Result<Vec<CString>> =
            slice.iter().map(|x| os_to_cstring(x.as_ref())).collect();
        let vec_cstring = maybe_vec_cstring?;
        let ptrs: Vec<_> = vec_cstring
            .iter()
            .map(|s| cstring_ptr(s) as *mut libc::c_char)
            .chain(iter::once(ptr::null_mut()))
            .collect();
        Ok(CVec {
            strings: vec_cstring,
            ptrs,
        })
    }

    fn as_c_vec(&self) -> *const *mut libc::c_char {
        self.ptrs.as_ptr()
    }
}

/// Spawn `cmd` with PATH lookup, applying `actions` in the child before exec.
pub fn spawnp<S1, S2, S3>(
    cmd: S1,
    args: &[S2],
    env: &[S3],
    actions: *const libc::posix_spawn_file_actions_t,
) -> Result<u32>
where
    S1: AsRef<OsStr>,
    S2: AsRef<OsStr>,
    S3: AsRef<OsStr>,
{
    let cmd_cstring = os_to_cstring(cmd.as_ref())?;
    let argvec = CVec::new(args)?;
    let envvec = CVec::new(env)?;

    let mut pid: libc::pid_t = 0;
    check_spawn_err(unsafe {
        libc::posix_spawnp(
            &mut pid,
            cstring_ptr(&cmd_cstring),
            actions,
            ptr::null(),
            argvec.as_c_vec(),
            envvec.as_c_vec(),
        )
    })?;
    Ok(pid as u32)
}

pub fn waitpid(pid: u32, flags: i32) -> Result<(u32, ExitStatus)> {
    let mut status = 0 as libc::c_int;
    let pid = check_err(unsafe {
        libc::waitpid(
            pid as libc::pid_t,
            &mut status as *mut libc::c_int,
            flags as libc::c_int,
        )
    })?;
    Ok((pid as u32, decode_exit_status(status)))
}

fn decode_exit_status(status: i32) -> ExitStatus {
    if libc::WIFEXITED(status) {
        ExitStatus::Exited(libc::WEXITSTATUS(status) as u32)
    } else if libc::WIFSIGNALED(status) {
        ExitStatus::Signaled(libc::WTERMSIG(status) as u8)
    } else {
        ExitStatus::Other(status)
    }
}
