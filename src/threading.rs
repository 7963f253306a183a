//! Thread creation and best-effort scheduling hints for timer and consumer threads.
use crate::error::{HarnessError, Result};
use std::thread::{self, JoinHandle};

/// Scheduling class requested for a harness thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    /// Periodic producer. Wakeup latency feeds directly into the measured lag, so it asks for a
    /// real-time slot.
    Timer,
    /// Queue consumer. No deadline; default scheduling.
    Consumer,
}

/// Spawn a named thread, surfacing creation failure instead of panicking.
///
/// The new thread applies the scheduling hint for `role` (see [`apply_role`]) before running
/// `body`.
///
/// # Arguments
/// * `name` - Thread name, visible in debuggers and `/proc/<pid>/task/*/comm`
/// * `role` - Scheduling class requested for the thread
/// * `body` - Closure run on the new thread
///
/// # Returns
/// The join handle, or `HarnessError::Spawn` carrying the thread name and the OS error
pub fn spawn_named<F, T>(name: String, role: ThreadRole, body: F) -> Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    thread::Builder::new()
        .name(name.clone())
        .spawn(move || {
            apply_role(role);
            body()
        })
        .map_err(|source| HarnessError::Spawn { name, source })
}

/// Apply the scheduling hint for `role` to the calling thread.
///
/// ## Linux
/// `Timer` requests `SCHED_RR` priority 30 via `pthread_setschedparam`. Without
/// `CAP_SYS_NICE` the call fails and the thread keeps `SCHED_OTHER`; the failure is ignored.
///
/// ## macOS
/// `Timer` maps to `QOS_CLASS_USER_INITIATED`, `Consumer` to `QOS_CLASS_UTILITY`.
///
/// ## Other platforms
/// No-op.
pub fn apply_role(role: ThreadRole) {
    #[cfg(target_os = "linux")]
    {
        use libc::{pthread_self, pthread_setschedparam, sched_param, SCHED_RR};

        if role == ThreadRole::Timer {
            unsafe {
                let mut param: sched_param = std::mem::zeroed();
                param.sched_priority = 30;
                let _ = pthread_setschedparam(pthread_self(), SCHED_RR, &param);
            }
        }
    }
    #[cfg(target_os = "macos")]
    {
        // pthread/qos.h
        const QOS_CLASS_USER_INITIATED: u32 = 0x19;
        const QOS_CLASS_UTILITY: u32 = 0x15;

        extern "C" {
            fn pthread_set_qos_class_self_np(qos_class: u32, relative_priority: i32) -> i32;
        }

        let qos_class = match role {
            ThreadRole::Timer => QOS_CLASS_USER_INITIATED,
            ThreadRole::Consumer => QOS_CLASS_UTILITY,
        };
        unsafe {
            let _ = pthread_set_qos_class_self_np(qos_class, 0);
        }
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos")))]
    {
        let _ = role;
    }
}
