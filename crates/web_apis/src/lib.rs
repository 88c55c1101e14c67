//! Browser-side observation and scheduling APIs used by the layer tree:
//! resize observation and idle-time primitives.

pub mod idle;
pub mod resize_observer;

pub use idle::{
    yield_tick, Clock, ClockDeadline, CountdownDeadline, IdleDeadline, ManualClock, SystemClock,
};
pub use resize_observer::{ResizeObserver, ResizeObserverEntry, ResizeTarget};
