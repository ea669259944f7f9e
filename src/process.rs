//! Spawning the external programs that are benchmarked.

use std::ffi::CString;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::ptr;

use log::debug;

use crate::error::{Error, Result};
use crate::Pid;

extern "C" {
    static environ: *const *mut libc::c_char;
}

fn c_string(s: &str) -> Result<CString> {
    CString::new(s).map_err(|_| Error::InvalidArgument(s.to_owned()))
}

struct SpawnAttr(libc::posix_spawnattr_t);

impl SpawnAttr {
    fn new() -> Result<SpawnAttr> {
        let mut attr: libc::posix_spawnattr_t = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::posix_spawnattr_init(&mut attr) };
        if ret != 0 {
            return Err(Error::SpawnAttr(io::Error::from_raw_os_error(ret)));
        }
        Ok(SpawnAttr(attr))
    }
}

impl Drop for SpawnAttr {
    fn drop(&mut self) {
        unsafe {
            libc::posix_spawnattr_destroy(&mut self.0);
        }
    }
}

fn process(program: &str, args: &[&str], wait_for_exit: bool) -> Result<Pid> {
    let path = c_string(program)?;
    let mut owned = Vec::with_capacity(args.len() + 1);
    owned.push(path.clone());
    for a in args {
        owned.push(c_string(a)?);
    }
    let mut argv: Vec<*mut libc::c_char> = owned.iter().map(|s| s.as_ptr() as *mut _).collect();
    argv.push(ptr::null_mut());

    let attr = SpawnAttr::new()?;
    let mut pid: Pid = 0;
    let ret = unsafe {
        libc::posix_spawn(
            &mut pid,
            path.as_ptr(),
            ptr::null(),
            &attr.0,
            argv.as_ptr(),
            environ,
        )
    };
    if ret != 0 {
        return Err(Error::Spawn {
            program: program.to_owned(),
            err: io::Error::from_raw_os_error(ret),
        });
    }
    debug!("spawned {} as pid {}", program, pid);

    if wait_for_exit {
        wait(pid)?;
    }
    Ok(pid)
}

/// Starts `program` (a path, no `PATH` lookup) with `args` and the current
/// environment, and returns immediately.
///
/// The caller owns reaping the child with [`wait`].
pub fn spawn(program: &str, args: &[&str]) -> Result<Pid> {
    process(program, args, false)
}

/// Like [`spawn`] but blocks until the program has exited.
pub fn spawn_and_wait(program: &str, args: &[&str]) -> Result<Pid> {
    process(program, args, true)
}

/// Blocks until `pid` exits and reaps it. There is no timeout.
pub fn wait(pid: Pid) -> Result<ExitStatus> {
    let mut status: libc::c_int = 0;
    loop {
        let ret = unsafe { libc::waitpid(pid, &mut status, 0) };
        if ret != -1 {
            break;
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(Error::Wait { pid, err });
        }
    }
    let status = ExitStatus::from_raw(status);
    debug!("pid {} exited with {}", pid, status);
    Ok(status)
}
