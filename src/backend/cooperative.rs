//! The cooperative backend: every logical process on one control thread.
//!
//! An explicit scheduler owns the task list. Each task carries a ready flag
//! set by its waker; the scheduler repeatedly picks a uniformly random ready
//! task and polls it until it suspends or terminates. Explicit yield points
//! are the only preemption boundary, which gives probabilistic fairness
//! rather than FIFO fairness. Cancellation only prevents a task's next
//! resumption — a cooperative primitive cannot be killed mid-step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};

use async_trait::async_trait;
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{yield_now, Backend, ProcessFuture, ProcessHandle, ProcessState, ThreadKind};
use crate::error::SquallResult;

struct TaskShared {
    id: u64,
    state: Mutex<ProcessState>,
    ready: AtomicBool,
}

impl TaskShared {
    fn state(&self) -> ProcessState {
        *self.state.lock()
    }

    fn set_state(&self, state: ProcessState) {
        *self.state.lock() = state;
    }
}

struct TaskWaker {
    shared: Arc<TaskShared>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.shared.ready.store(true, Ordering::SeqCst);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.shared.ready.store(true, Ordering::SeqCst);
    }
}

struct CoopTask {
    shared: Arc<TaskShared>,
    future: ProcessFuture,
    waker: Waker,
}

/// The cooperative scheduler. Registered tasks run only inside
/// [`Backend::drive`], on the calling thread.
pub struct CoopBackend {
    tasks: Vec<CoopTask>,
    rng: ChaCha8Rng,
}

impl CoopBackend {
    /// `seed` fixes the ready-task selection order, making a run's
    /// interleaving reproducible.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            tasks: Vec::new(),
            rng,
        }
    }
}

impl Backend for CoopBackend {
    fn kind(&self) -> ThreadKind {
        ThreadKind::Coroutine
    }

    fn create(&mut self, id: u64, future: ProcessFuture) -> SquallResult<Box<dyn ProcessHandle>> {
        let shared = Arc::new(TaskShared {
            id,
            state: Mutex::new(ProcessState::Created),
            ready: AtomicBool::new(false),
        });
        let waker = Waker::from(Arc::new(TaskWaker {
            shared: Arc::clone(&shared),
        }));
        let mut task = CoopTask {
            shared: Arc::clone(&shared),
            future,
            waker,
        };

        // Begin execution immediately, up to the first yield point; from
        // then on the task is resumed only from `drive`.
        task.shared.set_state(ProcessState::Running);
        let mut cx = Context::from_waker(&task.waker);
        match task.future.as_mut().poll(&mut cx) {
            Poll::Ready(()) => task.shared.set_state(ProcessState::Dead),
            Poll::Pending => self.tasks.push(task),
        }

        Ok(Box::new(CoopHandle { shared }))
    }

    fn drive(&mut self) {
        // Parked tasks are woken by explicit yields or by foreign threads
        // flipping their ready flag. If nothing becomes ready for a while,
        // force a poll round; a Pending result from an un-woken future is
        // permitted by the contract and keeps a missed wake from stalling
        // the whole run.
        const FORCE_POLL_AFTER_SPINS: u32 = 1024;
        let mut spins = 0u32;

        loop {
            self.tasks
                .retain(|task| !task.shared.state().is_terminal());
            if self.tasks.is_empty() {
                break;
            }

            let ready: Vec<usize> = self
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, task)| task.shared.ready.load(Ordering::SeqCst))
                .map(|(idx, _)| idx)
                .collect();

            if ready.is_empty() {
                spins += 1;
                if spins >= FORCE_POLL_AFTER_SPINS {
                    spins = 0;
                    for task in &self.tasks {
                        task.shared.ready.store(true, Ordering::SeqCst);
                    }
                }
                std::thread::yield_now();
                continue;
            }
            spins = 0;

            let picked = ready[self.rng.gen_range(0..ready.len())];
            let task = &mut self.tasks[picked];
            task.shared.ready.store(false, Ordering::SeqCst);
            task.shared.set_state(ProcessState::Running);

            let mut cx = Context::from_waker(&task.waker);
            if let Poll::Ready(()) = task.future.as_mut().poll(&mut cx) {
                task.shared.set_state(ProcessState::Dead);
                self.tasks.swap_remove(picked);
            }
        }
    }
}

/// Handle to one cooperatively scheduled process.
pub struct CoopHandle {
    shared: Arc<TaskShared>,
}

#[async_trait]
impl ProcessHandle for CoopHandle {
    fn id(&self) -> u64 {
        self.shared.id
    }

    fn state(&self) -> ProcessState {
        self.shared.state()
    }

    fn cancel(&self) {
        let mut state = self.shared.state.lock();
        if !state.is_terminal() {
            *state = ProcessState::Cancelled;
        }
    }

    async fn join(&mut self) {
        while !self.shared.state().is_terminal() {
            yield_now().await;
        }
    }
}
