use std::{fs::File, io, os::unix::process::CommandExt, process::Stdio};

use libc::{SIGKILL, SIGTERM};

use super::{CommandSpec, ProcessControl, Termination};

/// Process control backed by `setsid`, `kill` and `killpg`.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixProcessControl;

impl UnixProcessControl {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn to_pid(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|pid| *pid > 0)
}

/// Collects the exit status if `pid` is an exited child of this process, so
/// that it does not linger as a zombie and look alive to `kill(pid, 0)`.
/// For any other pid this is a no-op (`ECHILD`).
fn reap(pid: libc::pid_t) {
    let mut status = 0;
    #[allow(unsafe_code)]
    unsafe {
        libc::waitpid(pid, &mut status, libc::WNOHANG);
    }
}

#[async_trait::async_trait]
impl ProcessControl for UnixProcessControl {
    async fn spawn_detached(&self, spec: &CommandSpec, log: File) -> io::Result<u32> {
        let Some((program, args)) = spec.cmd.split_first() else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("empty cmd for service `{}`", spec.name),
            ));
        };

        let mut cmd = std::process::Command::new(program);
        cmd.args(args);
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }
        cmd.envs(&spec.env);

        // A new session detaches the child from our controlling terminal, so
        // closing it does not take the service down with it.
        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(|| {
                if libc::setsid() == -1 {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        cmd.stdin(Stdio::null())
            .stdout(Stdio::from(log.try_clone()?))
            .stderr(Stdio::from(log));

        let child = cmd.spawn()?;
        let pid = child.id();
        tracing::debug!("Spawned `{}` as pid {pid}", spec.name);

        // The child is deliberately not waited on; `is_alive` reaps it.
        drop(child);
        Ok(pid)
    }

    async fn is_alive(&self, pid: u32) -> bool {
        let Some(pid) = to_pid(pid) else {
            return false;
        };
        reap(pid);

        #[allow(unsafe_code)]
        let rc = unsafe { libc::kill(pid, 0) };
        if rc == 0 {
            return true;
        }
        io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    async fn terminate(&self, pid: u32, how: Termination) -> io::Result<()> {
        let Some(pid) = to_pid(pid) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid pid {pid}"),
            ));
        };
        let signal = match how {
            Termination::Graceful => SIGTERM,
            Termination::Forced => SIGKILL,
        };

        // Services are launched as session (and group) leaders; signalling the
        // group also reaches helpers they forked.
        #[allow(unsafe_code)]
        let rc = unsafe {
            if libc::getpgid(pid) == pid {
                libc::killpg(pid, signal)
            } else {
                libc::kill(pid, signal)
            }
        };
        if rc == -1 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ESRCH) {
                return Ok(());
            }
            return Err(err);
        }

        Ok(())
    }
}
