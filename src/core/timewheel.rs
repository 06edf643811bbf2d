// src/core/timewheel.rs

//! A single-level hierarchical timing wheel for scheduled callbacks.
//!
//! One scheduler task owns the slot array and the task registry outright;
//! producers interact with it only through the mailbox, so the registry needs
//! no locking. Each slot holds the tasks due on that tick; tasks further than
//! one full revolution away carry a `circle` count that is decremented each
//! time the wheel passes over them.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::debug;

/// Default wheel geometry: one revolution per hour at one tick per second.
pub const DEFAULT_SLOT_NUM: usize = 3600;
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// The deferred work a task runs when its slot comes up. Spawned on a fresh
/// task, so a panicking job never takes the scheduler down.
pub type Job = BoxFuture<'static, ()>;

enum WheelMessage {
    Add {
        delay: Duration,
        key: String,
        job: Job,
    },
    Remove {
        key: String,
    },
    Stop,
}

/// Cloneable handle to the scheduler task.
#[derive(Debug, Clone)]
pub struct TimeWheel {
    tx: mpsc::UnboundedSender<WheelMessage>,
}

impl TimeWheel {
    /// Spawns the scheduler task and returns a handle to it.
    pub fn start(interval: Duration, slot_num: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let core = WheelCore {
            interval,
            slot_num,
            slots: (0..slot_num).map(|_| HashMap::new()).collect(),
            registry: HashMap::new(),
            current: 0,
            rx,
        };
        tokio::spawn(core.run());
        Self { tx }
    }

    pub fn with_defaults() -> Self {
        Self::start(DEFAULT_INTERVAL, DEFAULT_SLOT_NUM)
    }

    /// Schedules `job` to run after `delay`. Re-using a key replaces the
    /// previously scheduled task.
    pub fn delay(&self, delay: Duration, key: String, job: Job) {
        let _ = self.tx.send(WheelMessage::Add { delay, key, job });
    }

    /// Schedules `job` for the wall-clock instant `at`. Instants already in
    /// the past are dropped; lazy paths must cover them.
    pub fn at(&self, at: SystemTime, key: String, job: Job) {
        if let Ok(delay) = at.duration_since(SystemTime::now()) {
            self.delay(delay, key, job);
        }
    }

    /// Cancels the task registered under `key`, if any.
    pub fn cancel(&self, key: &str) {
        let _ = self.tx.send(WheelMessage::Remove {
            key: key.to_string(),
        });
    }

    /// Stops the scheduler task. Pending tasks never fire.
    pub fn stop(&self) {
        let _ = self.tx.send(WheelMessage::Stop);
    }
}

struct WheelTask {
    circle: usize,
    job: Job,
}

struct WheelCore {
    interval: Duration,
    slot_num: usize,
    slots: Vec<HashMap<String, WheelTask>>,
    /// key -> slot index, for O(1) cancel.
    registry: HashMap<String, usize>,
    current: usize,
    rx: mpsc::UnboundedReceiver<WheelMessage>,
}

impl WheelCore {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick of `interval` fires immediately; swallow it so the
        // wheel starts advancing one full interval from now.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.on_tick(),
                msg = self.rx.recv() => match msg {
                    Some(WheelMessage::Add { delay, key, job }) => self.add_task(delay, key, job),
                    Some(WheelMessage::Remove { key }) => self.remove_task(&key),
                    Some(WheelMessage::Stop) | None => {
                        debug!("timing wheel scheduler stopping");
                        return;
                    }
                },
            }
        }
    }

    fn add_task(&mut self, delay: Duration, key: String, job: Job) {
        let ticks = (delay.as_nanos() / self.interval.as_nanos().max(1)) as usize;
        let slot = (self.current + ticks % self.slot_num) % self.slot_num;
        let circle = ticks / self.slot_num;

        // A task already registered under this key is replaced.
        self.remove_task(&key);
        self.slots[slot].insert(key.clone(), WheelTask { circle, job });
        self.registry.insert(key, slot);
    }

    fn remove_task(&mut self, key: &str) {
        if let Some(slot) = self.registry.remove(key) {
            self.slots[slot].remove(key);
        }
    }

    fn on_tick(&mut self) {
        let due = std::mem::take(&mut self.slots[self.current]);
        let slot = self.current;
        self.current = (self.current + 1) % self.slot_num;

        for (key, mut task) in due {
            if task.circle > 0 {
                task.circle -= 1;
                self.slots[slot].insert(key, task);
            } else {
                self.registry.remove(&key);
                tokio::spawn(task.job);
            }
        }
    }
}
