//! The settlement state machine shared by a [`Promise`] and its [`Resolver`].
use crate::{
    promise::{Promise, Resolution},
    runtime::Handle,
};
use log::trace;
use std::{cell::RefCell, fmt, rc::Rc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

/// The final result of a settled promise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Outcome<T, E> {
    pub fn status(&self) -> Status {
        match self {
            Outcome::Fulfilled(_) => Status::Fulfilled,
            Outcome::Rejected(_) => Status::Rejected,
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Outcome::Fulfilled(value) => Ok(value),
            Outcome::Rejected(reason) => Err(reason),
        }
    }
}

impl<T, E> From<Outcome<T, E>> for Result<T, E> {
    fn from(outcome: Outcome<T, E>) -> Self {
        outcome.into_result()
    }
}

/// A continuation pair queued on a pending promise.
pub(crate) struct Waiter<T, E> {
    on_fulfilled: Box<dyn FnOnce(T)>,
    on_rejected: Box<dyn FnOnce(E)>,
}

impl<T, E> Waiter<T, E> {
    pub(crate) fn new(
        on_fulfilled: impl FnOnce(T) + 'static,
        on_rejected: impl FnOnce(E) + 'static,
    ) -> Self {
        Waiter {
            on_fulfilled: Box::new(on_fulfilled),
            on_rejected: Box::new(on_rejected),
        }
    }

    fn fire(self, outcome: Outcome<T, E>) {
        match outcome {
            Outcome::Fulfilled(value) => (self.on_fulfilled)(value),
            Outcome::Rejected(reason) => (self.on_rejected)(reason),
        }
    }
}

enum State<T, E> {
    Pending(Vec<Waiter<T, E>>),
    Settled(Outcome<T, E>),
}

pub(crate) struct Core<T, E> {
    state: RefCell<State<T, E>>,
    handle: Handle,
}

impl<T, E> Core<T, E> {
    pub(crate) fn new(handle: Handle) -> Rc<Self> {
        Rc::new(Core {
            state: RefCell::new(State::Pending(Vec::new())),
            handle,
        })
    }

    pub(crate) fn handle(&self) -> &Handle {
        &self.handle
    }

    pub(crate) fn status(&self) -> Status {
        match &*self.state.borrow() {
            State::Pending(_) => Status::Pending,
            State::Settled(outcome) => outcome.status(),
        }
    }
}

impl<T, E> Core<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub(crate) fn peek(&self) -> Option<Outcome<T, E>> {
        match &*self.state.borrow() {
            State::Pending(_) => None,
            State::Settled(outcome) => Some(outcome.clone()),
        }
    }

    /// Queue `waiter` until settlement, or schedule it right away if the
    /// promise has already settled. Never fires synchronously.
    pub(crate) fn subscribe(&self, waiter: Waiter<T, E>) {
        let outcome = match &mut *self.state.borrow_mut() {
            State::Pending(waiters) => {
                waiters.push(waiter);
                return;
            }
            State::Settled(outcome) => outcome.clone(),
        };
        self.handle.schedule_async(move || waiter.fire(outcome));
    }

    fn settle(&self, outcome: Outcome<T, E>) {
        let mut state = self.state.borrow_mut();
        let waiters = match &mut *state {
            State::Pending(waiters) => std::mem::take(waiters),
            State::Settled(_) => {
                trace!("promise already settled, dropping {:?}", outcome.status());
                return;
            }
        };
        trace!("promise {:?} with {} waiter(s)", outcome.status(), waiters.len());
        if waiters.is_empty() {
            *state = State::Settled(outcome);
            return;
        }
        *state = State::Settled(outcome.clone());
        drop(state);

        // One task drains every waiter, in registration order.
        self.handle.schedule_async(move || {
            for waiter in waiters {
                waiter.fire(outcome.clone());
            }
        });
    }
}

/// The capability to settle a promise, handed to its executor.
///
/// Only the first settlement takes effect; every later call is ignored.
/// Resolvers may be cloned and kept past the executor's return.
pub struct Resolver<T, E> {
    core: Rc<Core<T, E>>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Resolver {
            core: self.core.clone(),
        }
    }
}

impl<T, E> Resolver<T, E> {
    pub(crate) fn new(core: Rc<Core<T, E>>) -> Self {
        Resolver { core }
    }

    pub(crate) fn handle(&self) -> &Handle {
        self.core.handle()
    }

    pub fn is_pending(&self) -> bool {
        self.core.status() == Status::Pending
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn resolve(&self, value: T) {
        self.core.settle(Outcome::Fulfilled(value))
    }

    pub fn reject(&self, reason: E) {
        self.core.settle(Outcome::Rejected(reason))
    }

    /// Settle with whatever `promise` eventually settles with.
    pub fn adopt(&self, promise: &Promise<T, E>) {
        let fulfill = self.clone();
        let reject = self.clone();
        promise.core().subscribe(Waiter::new(
            move |value| fulfill.resolve(value),
            move |reason| reject.reject(reason),
        ));
    }

    /// Settle from a handler's return value: `Err` rejects, a value fulfills
    /// and a promise is adopted.
    pub fn settle(&self, result: Result<Resolution<T, E>, E>) {
        match result {
            Ok(Resolution::Value(value)) => self.resolve(value),
            Ok(Resolution::Adopt(promise)) => self.adopt(&promise),
            Err(reason) => self.reject(reason),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("status", &self.core.status())
            .finish()
    }
}
