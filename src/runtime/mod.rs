//! 运行时协作者：时钟、持久化存储与计时器。

pub mod clock;
pub mod storage;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use storage::{
    parse_high_score, KeyValueStore, LocalStorageStore, MemoryStore, HIGH_SCORE_KEY,
};
pub use timer::{IntervalScheduler, ManualScheduler, TickScheduler, TimerHandle, TICK_INTERVAL_MS};
