//! One-shot promises with `then` chaining, run on a single-threaded event
//! loop.
//!
//! A [`Promise`] starts pending and settles exactly once, either fulfilled
//! with a value or rejected with a reason. Continuations attached with
//! [`Promise::then`], [`Promise::success`] or [`Promise::catch`] always run
//! from a task scheduled on the promise's [`Schedule`]r, even when the promise
//! had already settled, and each of them produces a new promise.
//!
//! ```
//! use thenable::{EventLoop, Promise, Resolution};
//!
//! let event_loop = EventLoop::new();
//! let _guard = event_loop.enter();
//!
//! let answer = Promise::<i32, String>::resolve(6)
//!     .success(|n| Ok(Resolution::Adopt(Promise::resolve(n * 7))))
//!     .map(|n| n.to_string());
//! assert_eq!(event_loop.block_on(answer), Ok(Ok("42".to_string())));
//! ```
use thiserror::Error;

mod combinators;
mod promise;
pub mod runtime;
mod settled;
mod state;

pub use promise::{Promise, Resolution};
pub use runtime::{Clock, EnterGuard, EventLoop, Handle, Options, Schedule, Task};
pub use settled::Settled;
pub use state::{Outcome, Resolver, Status};

/// Failures of the event loop driving promises. Promise rejections are never
/// reported through this type.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    #[error("no event loop is entered on this thread")]
    NoEventLoop,
    #[error("event loop ran out of work before the future completed")]
    Stalled,
    #[error("event loop exceeded its limit of {0} ticks")]
    TickLimit(u64),
    #[error("operation requires an event loop with a manual clock")]
    ManualClockRequired,
}
