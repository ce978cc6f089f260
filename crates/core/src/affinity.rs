//! Pinning processes to logical CPUs.

use crate::error::{Error, Result};
use tracing::debug;

/// Restricts a process to a single logical CPU.
pub trait AffinityBinder {
    /// Pin `pid` to `cpu`.
    ///
    /// # Errors
    ///
    /// [`Error::Affinity`] if the process does not exist or `cpu` is not a
    /// valid CPU index on this host.
    fn bind(&self, pid: u32, cpu: usize) -> Result<()>;
}

/// Number of logical CPUs currently online.
pub fn online_cpus() -> usize {
    online_cpus_impl().unwrap_or(1)
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn online_cpus_impl() -> Option<usize> {
    // SAFETY: sysconf has no memory-safety preconditions.
    let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    usize::try_from(n).ok().filter(|n| *n > 0)
}

#[cfg(not(unix))]
fn online_cpus_impl() -> Option<usize> {
    std::thread::available_parallelism().ok().map(|n| n.get())
}

/// Logical CPUs this process may be scheduled on, ascending.
///
/// On Linux this is the `sched_getaffinity(2)` mask of the calling process,
/// so offline CPUs and CPUs outside its cpuset are excluded even when the
/// online set has gaps. Elsewhere it is `0..online_cpus()`.
pub fn allowed_cpus() -> Vec<usize> {
    allowed_cpus_impl().unwrap_or_else(|| (0..online_cpus()).collect())
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn allowed_cpus_impl() -> Option<Vec<usize>> {
    use libc::{cpu_set_t, sched_getaffinity, CPU_ISSET, CPU_SETSIZE};

    // SAFETY: cpuset is zero-initialised and the size passed matches it;
    // pid 0 is the calling thread.
    let (rc, cpuset) = unsafe {
        let mut cpuset: cpu_set_t = std::mem::zeroed();
        let rc = sched_getaffinity(0, std::mem::size_of::<cpu_set_t>(), &mut cpuset);
        (rc, cpuset)
    };
    if rc != 0 {
        debug!(err = %std::io::Error::last_os_error(), "sched_getaffinity failed");
        return None;
    }

    let cpus: Vec<usize> = (0..CPU_SETSIZE as usize)
        // SAFETY: every index is below CPU_SETSIZE.
        .filter(|&cpu| unsafe { CPU_ISSET(cpu, &cpuset) })
        .collect();
    (!cpus.is_empty()).then_some(cpus)
}

#[cfg(not(target_os = "linux"))]
fn allowed_cpus_impl() -> Option<Vec<usize>> {
    None
}

/// [`AffinityBinder`] backed by `sched_setaffinity(2)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchedAffinity;

impl SchedAffinity {
    /// Create a binder.
    pub fn new() -> Self {
        Self
    }
}

impl AffinityBinder for SchedAffinity {
    fn bind(&self, pid: u32, cpu: usize) -> Result<()> {
        let allowed = allowed_cpus();
        if !allowed.contains(&cpu) {
            return Err(Error::Affinity {
                pid,
                cpu,
                reason: format!("cpu not available, usable cpus are {allowed:?}"),
            });
        }
        set_affinity(pid, cpu)?;
        debug!(pid, cpu, "pinned process");
        Ok(())
    }
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn set_affinity(pid: u32, cpu: usize) -> Result<()> {
    use libc::{cpu_set_t, sched_setaffinity, CPU_SET, CPU_SETSIZE, CPU_ZERO};

    if cpu >= CPU_SETSIZE as usize {
        return Err(Error::Affinity {
            pid,
            cpu,
            reason: format!("cpu index exceeds CPU_SETSIZE ({CPU_SETSIZE})"),
        });
    }

    // SAFETY: cpuset is zero-initialised, cpu is below CPU_SETSIZE, and the
    // size passed matches the set. An unknown pid is reported through errno.
    let rc = unsafe {
        let mut cpuset: cpu_set_t = std::mem::zeroed();
        CPU_ZERO(&mut cpuset);
        CPU_SET(cpu, &mut cpuset);
        sched_setaffinity(
            pid as libc::pid_t,
            std::mem::size_of::<cpu_set_t>(),
            &cpuset,
        )
    };

    if rc != 0 {
        let err = std::io::Error::last_os_error();
        let reason = match err.raw_os_error() {
            Some(libc::ESRCH) => "no such process".to_string(),
            Some(libc::EINVAL) => "cpu not usable by this process".to_string(),
            _ => err.to_string(),
        };
        return Err(Error::Affinity { pid, cpu, reason });
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_affinity(pid: u32, cpu: usize) -> Result<()> {
    Err(Error::Affinity {
        pid,
        cpu,
        reason: "CPU affinity only on Linux".to_string(),
    })
}
