use crate::arch::{Context, EntryFn};
use crate::config::RuntimeConfig;
use crate::error::{ThreadError, ThreadResult};
use crate::sched::RunQueue;
use crate::stack::Stack;
use crate::thread::{Entry, EntryBody, Tcb, ThreadId, ThreadInfo, ThreadState, ThreadStats};
use crate::time::Instant;
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::UnsafeCell;

/// Slot permanently occupied by the bootstrap thread.
pub const MAIN_SLOT: usize = 0;

/// Pool, ready queue and dispatch bookkeeping of one runtime.
///
/// Nothing here switches stacks: [`Scheduler::plan_switch`] only updates the
/// tables and hands back the two contexts the caller must switch between.
pub struct Scheduler {
    pool: Vec<Tcb>,
    current: usize,
    queue: Box<dyn RunQueue>,
    next_id: usize,
    stack_size: usize,
}

/// Contexts produced by [`Scheduler::plan_switch`].
///
/// The pointers stay valid for the life of the scheduler because the pool is
/// never resized.
#[derive(Debug, Clone, Copy)]
pub struct Switch {
    pub from: *mut Context,
    pub to: *const Context,
    pub from_slot: usize,
    pub to_slot: usize,
}

pub struct SchedulerCell(UnsafeCell<Scheduler>);

impl SchedulerCell {
    pub fn new(scheduler: Scheduler) -> Self {
        SchedulerCell(UnsafeCell::new(scheduler))
    }

    /// # Safety
    /// Returns mutable reference to scheduler. The caller must hold the switch
    /// gate and must not keep the reference across a context switch.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get(&self) -> &mut Scheduler {
        &mut *self.0.get()
    }

    pub fn get_mut(&mut self) -> &mut Scheduler {
        self.0.get_mut()
    }
}

impl Scheduler {
    /// Build a pool with room for `config.max_threads` spawned threads plus the
    /// bootstrap thread, which starts out Running.
    pub fn new(config: &RuntimeConfig) -> ThreadResult<Self> {
        let slots = config
            .max_threads
            .checked_add(1)
            .ok_or(ThreadError::InvalidCapacity)?;
        let mut pool = Vec::new();
        pool.try_reserve_exact(slots)
            .map_err(|_| ThreadError::OutOfMemory)?;
        pool.resize_with(slots, Tcb::vacant);

        let main = &mut pool[MAIN_SLOT];
        main.claim(ThreadId::MAIN);
        main.state = ThreadState::Running;
        main.begin_burst(Instant::now());

        Ok(Scheduler {
            pool,
            current: MAIN_SLOT,
            queue: config.policy.into_queue(),
            next_id: 1,
            stack_size: config.stack_size,
        })
    }

    /// Number of threads that may exist besides the bootstrap thread.
    pub fn capacity(&self) -> usize {
        self.pool.len() - 1
    }

    /// Claim the first Free slot for `entry` and queue it.
    ///
    /// The slot's context is prepared to call `start(arg)`; `start` is expected
    /// to fetch the entry with [`Scheduler::current_entry`]. On error nothing
    /// observable changes: the slot stays Free and no id is consumed.
    pub fn spawn(&mut self, entry: Entry, start: EntryFn, arg: usize) -> ThreadResult<ThreadId> {
        let slot = self
            .pool
            .iter()
            .skip(1)
            .position(Tcb::is_free)
            .map(|index| index + 1)
            .ok_or(ThreadError::TooManyThreads)?;

        let stack_size = self.stack_size;
        let tcb = &mut self.pool[slot];

        // Recycle the previous occupant's stack unless it was left damaged.
        if tcb.stack.as_ref().is_some_and(|stack| !stack.canary_intact()) {
            tcb.stack = None;
        }
        let top = match &tcb.stack {
            Some(stack) => stack.top(),
            None => {
                let stack = Stack::allocate(stack_size)?;
                let top = stack.top();
                tcb.stack = Some(stack);
                top
            }
        };

        let id = ThreadId::new(self.next_id);
        self.next_id += 1;

        tcb.claim(id);
        tcb.context = unsafe { Context::prepare(top, start, arg) };
        tcb.entry = Some(entry);
        self.queue.push(&mut self.pool, slot);
        Ok(id)
    }

    /// Raw pointer to the Running thread's body.
    ///
    /// The body stays owned by the TCB until [`Scheduler::retire_current`].
    pub fn current_entry(&mut self) -> Option<*mut EntryBody> {
        self.pool[self.current]
            .entry
            .as_mut()
            .map(|entry| &mut **entry as *mut EntryBody)
    }

    /// Dispatch the next Ready thread in place of the Running one.
    ///
    /// Returns `None`, changing nothing, when no other thread is Ready.
    /// Otherwise the outgoing thread's burst is closed and, unless it has been
    /// retired, it goes to the back of the queue; the incoming thread becomes
    /// Running and opens a new burst.
    pub fn plan_switch(&mut self, now: Instant) -> Option<Switch> {
        let prev = self.current;
        let next = self.queue.pop(&mut self.pool, prev)?;

        if !self.pool[prev].is_free() {
            self.pool[prev].summarize_burst(now);
            self.queue.push(&mut self.pool, prev);
        }

        let incoming = &mut self.pool[next];
        incoming.state = ThreadState::Running;
        incoming.begin_burst(now);
        self.current = next;

        let from = &mut self.pool[prev].context as *mut Context;
        let to = &self.pool[next].context as *const Context;
        Some(Switch {
            from,
            to,
            from_slot: prev,
            to_slot: next,
        })
    }

    /// Mark the Running thread Free and release its body.
    ///
    /// The stack is kept: the thread is still executing on it until the
    /// following switch. Returns the final snapshot of the thread, or `None`
    /// if the Running thread is the bootstrap thread, which is never retired.
    pub fn retire_current(&mut self, now: Instant) -> Option<ThreadInfo> {
        if self.current == MAIN_SLOT {
            return None;
        }
        let slot = self.current;
        let tcb = &mut self.pool[slot];
        tcb.summarize_burst(now);
        tcb.state = ThreadState::Free;
        tcb.entry = None;
        Some(tcb.info(slot))
    }

    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn current_id(&self) -> ThreadId {
        self.pool[self.current].id
    }

    /// Whether the Running thread has overrun its stack.
    pub fn current_overflowed(&self) -> bool {
        self.pool[self.current].check_stack_overflow()
    }

    fn find(&self, id: ThreadId) -> Option<&Tcb> {
        self.pool
            .iter()
            .find(|tcb| tcb.is_runnable() && tcb.id == id)
    }

    pub fn state(&self, id: ThreadId) -> Option<ThreadState> {
        self.find(id).map(|tcb| tcb.state)
    }

    pub fn stats(&self, id: ThreadId) -> Option<ThreadStats> {
        self.find(id).map(|tcb| tcb.stats)
    }

    /// Snapshot of every occupied slot, in slot order.
    pub fn threads(&self) -> Vec<ThreadInfo> {
        self.pool
            .iter()
            .enumerate()
            .filter(|(_, tcb)| tcb.is_runnable())
            .map(|(slot, tcb)| tcb.info(slot))
            .collect()
    }

    pub fn ready_count(&self) -> usize {
        self.queue.len(&self.pool)
    }

    /// Spawned threads that have not terminated.
    pub fn live_count(&self) -> usize {
        self.pool.iter().skip(1).filter(|tcb| tcb.is_runnable()).count()
    }

    pub fn running_count(&self) -> usize {
        self.pool
            .iter()
            .filter(|tcb| tcb.state == ThreadState::Running)
            .count()
    }
}
