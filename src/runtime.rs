//! The deferred-execution facility promises are built on.
//!
//! A [`Schedule`] runs callbacks later instead of synchronously. Promises reach
//! their scheduler through a [`Handle`]; the thread-local *current* handle is
//! installed by [`EventLoop::enter`] and by every `EventLoop` driver method.
//!
//! [`EventLoop`] is the single-threaded scheduler shipped with this crate. It
//! runs on the system clock by default; a [`Clock::Manual`] loop keeps virtual
//! time which only moves when the loop goes idle or [`EventLoop::advance`] is
//! called, so timer behavior can be tested without sleeping.
use crate::Error;
use log::{debug, trace};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::{BinaryHeap, VecDeque},
    fmt,
    future::{Future, IntoFuture},
    pin::pin,
    rc::Rc,
    sync::{
        atomic::{self, AtomicBool},
        Arc,
    },
    task::{Context, Poll, Wake, Waker},
    thread,
    time::{Duration, Instant},
};

/// A callback queued on a scheduler.
pub type Task = Box<dyn FnOnce()>;

/// Runs callbacks after the currently executing code has finished.
pub trait Schedule {
    /// Run `task` once the current synchronous execution completes. Tasks
    /// scheduled this way run in the order they were scheduled.
    fn schedule_async(&self, task: Task);

    /// Run `task` no earlier than `delay` from now.
    fn schedule_after(&self, task: Task, delay: Duration);
}

thread_local! {
    static CURRENT: RefCell<Option<Handle>> = const { RefCell::new(None) };
}

/// A shared reference to a scheduler.
#[derive(Clone)]
pub struct Handle {
    scheduler: Rc<dyn Schedule>,
}

impl Handle {
    pub fn new(scheduler: Rc<dyn Schedule>) -> Self {
        Handle { scheduler }
    }

    /// The handle installed on this thread.
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered [`EventLoop`]. Use
    /// [`Handle::try_current`] to check first.
    pub fn current() -> Self {
        Self::try_current().expect("Handle::current must be called within an entered EventLoop")
    }

    pub fn try_current() -> Result<Self, Error> {
        CURRENT
            .with(|current| current.borrow().clone())
            .ok_or(Error::NoEventLoop)
    }

    /// Install this handle as the thread's current scheduler until the guard
    /// is dropped.
    pub fn enter(&self) -> EnterGuard {
        let prev = CURRENT.with(|current| current.borrow_mut().replace(self.clone()));
        EnterGuard { prev }
    }

    pub fn schedule_async(&self, task: impl FnOnce() + 'static) {
        self.scheduler.schedule_async(Box::new(task))
    }

    pub fn schedule_after(&self, task: impl FnOnce() + 'static, delay: Duration) {
        self.scheduler.schedule_after(Box::new(task), delay)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

/// Restores the previously current handle when dropped.
#[derive(Debug)]
#[must_use = "the handle is only current while the guard is alive"]
pub struct EnterGuard {
    prev: Option<Handle>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT.with(|current| *current.borrow_mut() = prev);
    }
}

/// Where an [`EventLoop`] reads the time from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    /// Wall-clock time; the loop sleeps until the next timer is due.
    #[default]
    System,
    /// Virtual time starting at zero.
    Manual,
}

/// Event loop configuration.
#[derive(Debug, Clone, Default)]
pub struct Options {
    clock: Clock,
    max_ticks: Option<u64>,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    pub fn clock(&mut self, clock: Clock) -> &mut Options {
        self.clock = clock;
        self
    }

    /// Fail with [`Error::TickLimit`] instead of running more than `ticks`
    /// tasks over the lifetime of the loop.
    pub fn max_ticks(&mut self, ticks: u64) -> &mut Options {
        self.max_ticks = Some(ticks);
        self
    }
}

struct Timer {
    deadline: Duration,
    seq: u64,
    task: Task,
}

impl Timer {
    fn key(&self) -> (Duration, u64) {
        (self.deadline, self.seq)
    }
}

impl PartialEq for Timer {
    fn eq(&self, other: &Timer) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Timer) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Reversed so the `BinaryHeap` pops the earliest deadline first.
impl Ord for Timer {
    fn cmp(&self, other: &Timer) -> Ordering {
        other.key().cmp(&self.key())
    }
}

#[derive(Default)]
struct Queue {
    ready: VecDeque<Task>,
    timers: BinaryHeap<Timer>,
    next_seq: u64,
    virtual_now: Duration,
    ticks: u64,
}

impl Queue {
    fn promote_due(&mut self, now: Duration) {
        while self.timers.peek().is_some_and(|timer| timer.deadline <= now) {
            if let Some(timer) = self.timers.pop() {
                trace!("timer {} due at {:?}", timer.seq, timer.deadline);
                self.ready.push_back(timer.task);
            }
        }
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.timers.peek().map(|timer| timer.deadline)
    }
}

struct Inner {
    queue: RefCell<Queue>,
    clock: Clock,
    epoch: Instant,
    max_ticks: Option<u64>,
}

impl Inner {
    fn now(&self, queue: &Queue) -> Duration {
        match self.clock {
            Clock::System => self.epoch.elapsed(),
            Clock::Manual => queue.virtual_now,
        }
    }
}

impl Schedule for Inner {
    fn schedule_async(&self, task: Task) {
        self.queue.borrow_mut().ready.push_back(task);
    }

    fn schedule_after(&self, task: Task, delay: Duration) {
        let mut queue = self.queue.borrow_mut();
        // A deadline past the end of the clock never comes due.
        let Some(deadline) = self.now(&queue).checked_add(delay) else {
            debug!("dropping timer whose delay of {:?} overflows the clock", delay);
            return;
        };
        let seq = queue.next_seq;
        queue.next_seq += 1;
        trace!("timer {} scheduled for {:?}", seq, deadline);
        queue.timers.push(Timer { deadline, seq, task });
    }
}

/// A single-threaded event loop.
///
/// ```
/// use std::time::Duration;
/// use thenable::{Clock, EventLoop, Options, Promise};
///
/// let event_loop = EventLoop::with_options(Options::new().clock(Clock::Manual));
/// let _guard = event_loop.enter();
/// let later = Promise::<&str, ()>::resolve_delay("a", Duration::from_millis(20));
/// assert_eq!(event_loop.block_on(later), Ok(Ok("a")));
/// assert_eq!(event_loop.now(), Duration::from_millis(20));
/// ```
pub struct EventLoop {
    inner: Rc<Inner>,
}

impl EventLoop {
    pub fn new() -> EventLoop {
        EventLoop::with_options(&Options::default())
    }

    pub fn with_options(options: &Options) -> EventLoop {
        EventLoop {
            inner: Rc::new(Inner {
                queue: RefCell::new(Queue::default()),
                clock: options.clock,
                epoch: Instant::now(),
                max_ticks: options.max_ticks,
            }),
        }
    }

    pub fn handle(&self) -> Handle {
        Handle::new(self.inner.clone())
    }

    /// Make this loop the thread's current scheduler, so promises created
    /// without an explicit handle are scheduled on it.
    pub fn enter(&self) -> EnterGuard {
        self.handle().enter()
    }

    /// Time elapsed on the loop's clock since it was created.
    pub fn now(&self) -> Duration {
        self.inner.now(&self.inner.queue.borrow())
    }

    /// Number of queued tasks and timers that have not run yet.
    pub fn pending_tasks(&self) -> usize {
        let queue = self.inner.queue.borrow();
        queue.ready.len() + queue.timers.len()
    }

    /// Run every task that is ready, including timers already due, without
    /// moving the clock. Returns how many tasks ran.
    pub fn run_until_idle(&self) -> Result<usize, Error> {
        let _guard = self.enter();
        let mut ran = 0;
        while self.run_ready()? {
            ran += 1;
        }
        Ok(ran)
    }

    /// Move a manual clock forward by `by`, firing timers in deadline order as
    /// they come due. The clock stops at `Duration::MAX`.
    pub fn advance(&self, by: Duration) -> Result<(), Error> {
        if self.inner.clock != Clock::Manual {
            return Err(Error::ManualClockRequired);
        }
        let _guard = self.enter();
        let target = self.now().saturating_add(by);
        loop {
            while self.run_ready()? {}
            let mut queue = self.inner.queue.borrow_mut();
            match queue.next_deadline() {
                Some(deadline) if deadline <= target => {
                    queue.virtual_now = queue.virtual_now.max(deadline);
                }
                _ => {
                    queue.virtual_now = target;
                    return Ok(());
                }
            }
        }
    }

    /// Run until no tasks or timers remain.
    pub fn run(&self) -> Result<(), Error> {
        let _guard = self.enter();
        while self.turn()? {}
        Ok(())
    }

    /// Drive the loop until `fut` completes.
    ///
    /// Fails with [`Error::Stalled`] if the loop runs out of work first, which
    /// means `fut` can never complete.
    pub fn block_on<F>(&self, fut: F) -> Result<F::Output, Error>
    where
        F: IntoFuture,
    {
        let _guard = self.enter();
        let mut fut = pin!(fut.into_future());

        let flag = Arc::new(WakeFlag::default());
        let waker = Waker::from(flag.clone());
        let mut cx = Context::from_waker(&waker);

        loop {
            if let Poll::Ready(output) = fut.as_mut().poll(&mut cx) {
                return Ok(output);
            }
            while !flag.take() {
                if !self.turn()? {
                    debug!("event loop went idle before the awaited future completed");
                    return Err(Error::Stalled);
                }
            }
        }
    }

    /// Run one ready task, or move the clock to the next timer. Returns
    /// `false` once there is nothing left to do.
    fn turn(&self) -> Result<bool, Error> {
        if self.run_ready()? {
            return Ok(true);
        }
        Ok(self.wait_for_timer())
    }

    fn run_ready(&self) -> Result<bool, Error> {
        let task = {
            let mut queue = self.inner.queue.borrow_mut();
            let now = self.inner.now(&queue);
            queue.promote_due(now);
            if queue.ready.is_empty() {
                return Ok(false);
            }
            if let Some(limit) = self.inner.max_ticks {
                if queue.ticks >= limit {
                    debug!("event loop reached its limit of {} ticks", limit);
                    return Err(Error::TickLimit(limit));
                }
            }
            queue.ticks += 1;
            match queue.ready.pop_front() {
                Some(task) => task,
                None => return Ok(false),
            }
        };
        task();
        Ok(true)
    }

    fn wait_for_timer(&self) -> bool {
        let mut queue = self.inner.queue.borrow_mut();
        let Some(deadline) = queue.next_deadline() else {
            return false;
        };
        match self.inner.clock {
            Clock::Manual => {
                queue.virtual_now = queue.virtual_now.max(deadline);
            }
            Clock::System => {
                drop(queue);
                let now = self.inner.epoch.elapsed();
                if deadline > now {
                    thread::sleep(deadline - now);
                }
            }
        }
        true
    }
}

impl Default for EventLoop {
    fn default() -> EventLoop {
        EventLoop::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.inner.queue.borrow();
        f.debug_struct("EventLoop")
            .field("clock", &self.inner.clock)
            .field("ready", &queue.ready.len())
            .field("timers", &queue.timers.len())
            .field("ticks", &queue.ticks)
            .finish()
    }
}

#[derive(Default)]
struct WakeFlag(AtomicBool);

impl WakeFlag {
    fn take(&self) -> bool {
        self.0.swap(false, atomic::Ordering::Relaxed)
    }
}

impl Wake for WakeFlag {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref()
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.0.store(true, atomic::Ordering::Relaxed);
    }
}
