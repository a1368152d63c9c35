use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use gloo_timers::callback::Interval;

use crate::game::GameStore;

/// 游戏计时的触发周期（毫秒）。
pub const TICK_INTERVAL_MS: u32 = 1_000;

/// 已启动计时任务的取消句柄。
pub trait TimerHandle {
    fn cancel(&mut self);
}

/// 周期任务调度器，每次 `arm` 启动一个新的计时任务。
pub trait TickScheduler {
    fn arm(&mut self, period_ms: u32) -> Box<dyn TimerHandle>;
}

/// 浏览器端调度器：通过 `setInterval` 驱动 `GameStateMachine::tick`。
pub struct IntervalScheduler {
    target: Weak<RefCell<GameStore>>,
}

impl IntervalScheduler {
    pub fn new(target: Weak<RefCell<GameStore>>) -> Self {
        Self { target }
    }
}

impl TickScheduler for IntervalScheduler {
    fn arm(&mut self, period_ms: u32) -> Box<dyn TimerHandle> {
        let target = self.target.clone();
        let interval = Interval::new(period_ms, move || {
            let Some(store) = target.upgrade() else {
                return;
            };
            let Ok(mut store) = store.try_borrow_mut() else {
                log::warn!("game store busy, skipping tick");
                return;
            };
            store.game_mut().tick();
        });
        Box::new(IntervalHandle {
            interval: Some(interval),
        })
    }
}

struct IntervalHandle {
    interval: Option<Interval>,
}

impl TimerHandle for IntervalHandle {
    fn cancel(&mut self) {
        if let Some(interval) = self.interval.take() {
            let _ = interval.cancel();
        }
    }
}

/// 测试与回放用调度器：只统计启动与取消次数，由调用方手动 `tick`。
#[derive(Debug, Clone, Default)]
pub struct ManualScheduler {
    armed: Rc<Cell<usize>>,
    cancelled: Rc<Cell<usize>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn armed(&self) -> usize {
        self.armed.get()
    }

    pub fn cancelled(&self) -> usize {
        self.cancelled.get()
    }

    /// 当前仍在运行的计时任务数量。
    pub fn active(&self) -> usize {
        self.armed.get() - self.cancelled.get()
    }
}

impl TickScheduler for ManualScheduler {
    fn arm(&mut self, _period_ms: u32) -> Box<dyn TimerHandle> {
        self.armed.set(self.armed.get() + 1);
        Box::new(ManualHandle {
            cancelled: Rc::clone(&self.cancelled),
            live: true,
        })
    }
}

struct ManualHandle {
    cancelled: Rc<Cell<usize>>,
    live: bool,
}

impl TimerHandle for ManualHandle {
    fn cancel(&mut self) {
        if self.live {
            self.live = false;
            self.cancelled.set(self.cancelled.get() + 1);
        }
    }
}

impl Drop for ManualHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
