//! The process kernel: pid allocation, spawning and reaping.
//!
//! Guest processes are futures scheduled on a single-threaded pool;
//! concurrency comes from interleaved suspensions (pipe I/O, waitpid,
//! yield), never preemption.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use futures::executor::LocalSpawner;
use futures::future::LocalBoxFuture;
use futures::task::LocalSpawnExt;
use tracing::{debug, trace};

use crate::types::Errno;

/// Process identifier, monotonic from 1.
pub type Pid = u32;

struct ProcessEntry {
    exit_code: Option<i32>,
    waiters: Vec<Waker>,
}

struct KernelState {
    next_pid: Pid,
    processes: HashMap<Pid, ProcessEntry>,
}

/// Owns the process table and the spawner for the shared pool.
///
/// Cloning shares the kernel; everything runs on one thread.
#[derive(Clone)]
pub struct ProcessKernel {
    state: Arc<Mutex<KernelState>>,
    spawner: LocalSpawner,
}

impl ProcessKernel {
    pub fn new(spawner: LocalSpawner) -> Self {
        Self {
            state: Arc::new(Mutex::new(KernelState {
                next_pid: 1,
                processes: HashMap::new(),
            })),
            spawner,
        }
    }

    /// Schedules a guest process and returns its pid. The future's output
    /// is the exit code; completion wakes every waiter.
    pub fn spawn(&self, task: LocalBoxFuture<'static, i32>) -> Pid {
        let pid = {
            let mut state = self.state.lock().unwrap();
            let pid = state.next_pid;
            state.next_pid += 1;
            state.processes.insert(
                pid,
                ProcessEntry {
                    exit_code: None,
                    waiters: Vec::new(),
                },
            );
            pid
        };
        trace!(pid, "spawn process");
        let state = self.state.clone();
        self.spawner
            .spawn_local(async move {
                let code = task.await;
                debug!(pid, code, "process exited");
                let mut state = state.lock().unwrap();
                if let Some(entry) = state.processes.get_mut(&pid) {
                    entry.exit_code = Some(code);
                    for waker in entry.waiters.drain(..) {
                        waker.wake();
                    }
                }
            })
            .expect("process pool accepts tasks");
        pid
    }

    /// Suspends until the process exits. Idempotent after reap: the exit
    /// code stays recorded.
    pub fn waitpid(&self, pid: Pid) -> WaitPid {
        WaitPid {
            kernel: self.clone(),
            pid,
        }
    }

    /// Non-blocking peek at a process's exit code.
    pub fn exit_code(&self, pid: Pid) -> Option<i32> {
        self.state
            .lock()
            .unwrap()
            .processes
            .get(&pid)
            .and_then(|entry| entry.exit_code)
    }
}

/// Future returned by [`ProcessKernel::waitpid`].
pub struct WaitPid {
    kernel: ProcessKernel,
    pid: Pid,
}

impl Future for WaitPid {
    type Output = Result<i32, Errno>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.kernel.state.lock().unwrap();
        match state.processes.get_mut(&self.pid) {
            None => Poll::Ready(Err(Errno::Child)),
            Some(ProcessEntry {
                exit_code: Some(code),
                ..
            }) => Poll::Ready(Ok(*code)),
            Some(entry) => {
                entry.waiters.push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// Cooperative reschedule: yields once, then resumes.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
