//! Awaiting a promise from async code.
use crate::{
    promise::Promise,
    state::{Outcome, Waiter},
};
use std::{
    cell::RefCell,
    fmt,
    future::Future,
    pin::Pin,
    rc::Rc,
    task::{Context, Poll, Waker},
};

/// Resolves to `Ok(value)` or `Err(reason)` once the promise it was taken
/// from settles.
///
/// Completion is driven by the promise's scheduler, so the future only makes
/// progress while that loop runs, e.g. under [`EventLoop::block_on`].
///
/// [`EventLoop::block_on`]: crate::EventLoop::block_on
pub struct Settled<T, E> {
    slot: Rc<RefCell<Slot<T, E>>>,
}

struct Slot<T, E> {
    outcome: Option<Outcome<T, E>>,
    waker: Option<Waker>,
}

impl<T, E> Slot<T, E> {
    fn fill(slot: &RefCell<Self>, outcome: Outcome<T, E>) {
        let waker = {
            let mut slot = slot.borrow_mut();
            slot.outcome = Some(outcome);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake()
        }
    }
}

impl<T, E> Settled<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub(crate) fn new(promise: &Promise<T, E>) -> Self {
        let slot = Rc::new(RefCell::new(Slot {
            outcome: None,
            waker: None,
        }));
        let fulfilled = slot.clone();
        let rejected = slot.clone();
        promise.core().subscribe(Waiter::new(
            move |value| Slot::fill(&fulfilled, Outcome::Fulfilled(value)),
            move |reason| Slot::fill(&rejected, Outcome::Rejected(reason)),
        ));
        Settled { slot }
    }
}

impl<T, E> Future for Settled<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.slot.borrow_mut();
        match slot.outcome.take() {
            Some(outcome) => Poll::Ready(outcome.into_result()),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

impl<T, E> fmt::Debug for Settled<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Settled")
            .field("ready", &self.slot.borrow().outcome.is_some())
            .finish()
    }
}
