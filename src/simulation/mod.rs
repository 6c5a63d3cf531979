//! Single-threaded simulation loop
//!
//! The host adapter calls [`SimLoop::tick`] once per host tick on the host's
//! own thread. Everything that mutates host-visible state runs inside that
//! call: tasks marshaled from workers through [`SimHandle`], delayed tasks
//! whose tick has come, and the animation scheduler.

use crate::animation::AnimationScheduler;
use crate::host::HostServer;
use crate::protocol::SkinBroadcaster;
use crate::skin::SkinApplier;
use crate::sync::ConfigCache;
use crossbeam_channel::{Receiver, Sender};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Host ticks per second
pub const TICKS_PER_SECOND: u64 = 20;

pub type SimTask = Box<dyn FnOnce(&mut SimContext) + Send + 'static>;

enum Scheduled {
    Now(SimTask),
    Later { delay_ticks: u64, task: SimTask },
}

/// Cloneable sender of work onto the simulation loop
#[derive(Clone)]
pub struct SimHandle {
    sender: Sender<Scheduled>,
}

/// Receiving half, consumed by [`SimLoop::new`]
pub struct SimReceiver {
    receiver: Receiver<Scheduled>,
}

impl SimHandle {
    pub fn channel() -> (SimHandle, SimReceiver) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        (SimHandle { sender }, SimReceiver { receiver })
    }

    /// Run `task` on the next tick
    pub fn submit<F>(&self, task: F)
    where
        F: FnOnce(&mut SimContext) + Send + 'static,
    {
        if self.sender.send(Scheduled::Now(Box::new(task))).is_err() {
            debug!("Simulation loop stopped, task dropped");
        }
    }

    /// Run `task` once `delay_ticks` ticks have elapsed
    pub fn submit_later<F>(&self, delay_ticks: u64, task: F)
    where
        F: FnOnce(&mut SimContext) + Send + 'static,
    {
        let scheduled = Scheduled::Later {
            delay_ticks,
            task: Box::new(task),
        };
        if self.sender.send(scheduled).is_err() {
            debug!("Simulation loop stopped, delayed task dropped");
        }
    }
}

/// State owned by the simulation loop
pub struct SimContext {
    pub host: Arc<dyn HostServer>,
    pub configs: ConfigCache,
    pub applier: SkinApplier,
    pub animator: AnimationScheduler,
    pub broadcaster: SkinBroadcaster,
    pub handle: SimHandle,
    tick: u64,
}

impl SimContext {
    pub fn new(
        host: Arc<dyn HostServer>,
        configs: ConfigCache,
        applier: SkinApplier,
        animator: AnimationScheduler,
        broadcaster: SkinBroadcaster,
        handle: SimHandle,
    ) -> Self {
        Self {
            host,
            configs,
            applier,
            animator,
            broadcaster,
            handle,
            tick: 0,
        }
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Apply the first frame of the subject's cached config and restart its animation
    pub fn apply_first_frame(&mut self, subject: uuid::Uuid) -> bool {
        let Some(config) = self.configs.get(subject) else {
            return false;
        };
        self.animator.reset(subject);
        match config.first_frame().and_then(|f| f.to_property()) {
            Some(property) => self.applier.apply_skin(subject, &property),
            None => false,
        }
    }
}

struct DelayedTask {
    due: u64,
    seq: u64,
    task: SimTask,
}

impl PartialEq for DelayedTask {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for DelayedTask {}

impl PartialOrd for DelayedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DelayedTask {
    // reversed: BinaryHeap pops the earliest (due, seq) first
    fn cmp(&self, other: &Self) -> Ordering {
        (other.due, other.seq).cmp(&(self.due, self.seq))
    }
}

pub struct SimLoop {
    ctx: SimContext,
    receiver: Receiver<Scheduled>,
    delayed: BinaryHeap<DelayedTask>,
    seq: u64,
}

impl SimLoop {
    pub fn new(ctx: SimContext, receiver: SimReceiver) -> Self {
        Self {
            ctx,
            receiver: receiver.receiver,
            delayed: BinaryHeap::new(),
            seq: 0,
        }
    }

    pub fn context(&self) -> &SimContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut SimContext {
        &mut self.ctx
    }

    pub fn current_tick(&self) -> u64 {
        self.ctx.tick
    }

    pub fn pending_delayed(&self) -> usize {
        self.delayed.len()
    }

    /// Advance one tick: marshaled tasks, due delayed tasks, then animation
    pub fn tick(&mut self) {
        self.ctx.tick += 1;
        let now = self.ctx.tick;

        while let Ok(scheduled) = self.receiver.try_recv() {
            match scheduled {
                Scheduled::Now(task) => task(&mut self.ctx),
                Scheduled::Later { delay_ticks, task } => {
                    self.seq += 1;
                    self.delayed.push(DelayedTask {
                        due: now + delay_ticks,
                        seq: self.seq,
                        task,
                    });
                }
            }
        }

        while self.delayed.peek().is_some_and(|d| d.due <= now) {
            if let Some(delayed) = self.delayed.pop() {
                (delayed.task)(&mut self.ctx);
            }
        }

        let SimContext {
            host,
            configs,
            animator,
            broadcaster,
            ..
        } = &mut self.ctx;
        animator.tick(host.as_ref(), configs, broadcaster);
    }

    /// Advance `n` ticks back to back
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.tick();
        }
    }

    /// Drive the loop on the current thread at a fixed rate until `running` clears
    pub fn run_fixed_rate(mut self, running: Arc<AtomicBool>) {
        let period = Duration::from_millis(1000 / TICKS_PER_SECOND);
        info!("⏱️ Simulation loop running at {} ticks/s", TICKS_PER_SECOND);
        let mut next = Instant::now();
        while running.load(AtomicOrdering::Acquire) {
            self.tick();
            next += period;
            let now = Instant::now();
            if next > now {
                std::thread::sleep(next - now);
            } else {
                next = now;
            }
        }
        info!("Simulation loop stopped after {} ticks", self.ctx.tick);
    }
}
