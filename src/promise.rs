use crate::{
    runtime::Handle,
    settled::Settled,
    state::{Core, Outcome, Resolver, Status, Waiter},
};
use log::trace;
use std::{fmt, future::IntoFuture, rc::Rc};

/// What a handler settles its derived promise with.
///
/// Handlers return `Result<Resolution<U, E>, E>`: `Err` rejects the derived
/// promise, `Value` fulfills it and `Adopt` makes it follow another promise.
pub enum Resolution<T, E> {
    Value(T),
    Adopt(Promise<T, E>),
}

impl<T, E> From<Promise<T, E>> for Resolution<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Resolution::Adopt(promise)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Adopt(promise) => f.debug_tuple("Adopt").field(promise).finish(),
        }
    }
}

/// A value that is settled exactly once, later.
///
/// A `Promise` is a cheap handle; clones observe the same settlement. Only
/// the [`Resolver`] handed to the executor can settle it.
///
/// # Examples
///
/// ```
/// use thenable::{EventLoop, Promise, Resolution};
///
/// let event_loop = EventLoop::new();
/// let _guard = event_loop.enter();
///
/// let (keep, resolver) = {
///     let mut slot = None;
///     let promise = Promise::<i32, String>::new(|resolver| {
///         slot = Some(resolver);
///         Ok(())
///     });
///     (promise, slot.unwrap())
/// };
/// let doubled = keep.success(|n| Ok(Resolution::Value(n * 2)));
/// resolver.resolve(21);
/// assert_eq!(event_loop.block_on(doubled), Ok(Ok(42)));
/// ```
pub struct Promise<T, E> {
    core: Rc<Core<T, E>>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise {
            core: self.core.clone(),
        }
    }
}

impl<T, E> Promise<T, E> {
    pub fn status(&self) -> Status {
        self.core.status()
    }

    pub(crate) fn core(&self) -> &Core<T, E> {
        &self.core
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Run `executor` right away with the resolver for a new promise.
    ///
    /// Returning `Err(reason)` from the executor rejects the promise, unless
    /// the executor already settled it.
    ///
    /// # Panics
    ///
    /// Panics outside an entered [`EventLoop`](crate::EventLoop); see
    /// [`Promise::new_in`].
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        Promise::new_in(Handle::current(), executor)
    }

    /// Like [`Promise::new`], scheduling continuations on `handle`.
    pub fn new_in<F>(handle: Handle, executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let core = Core::new(handle);
        let resolver = Resolver::new(core.clone());
        if let Err(reason) = executor(resolver.clone()) {
            trace!("executor failed, rejecting");
            resolver.reject(reason);
        }
        Promise { core }
    }

    /// Derive a promise from the result of `on_fulfilled` or `on_rejected`,
    /// whichever matches how this promise settles.
    ///
    /// The handler always runs from a scheduled task, never inside `then`.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + 'static,
    {
        let source = self.core.clone();
        Promise::new_in(self.core.handle().clone(), move |resolver| {
            let fallback = resolver.clone();
            source.subscribe(Waiter::new(
                move |value| resolver.settle(on_fulfilled(value)),
                move |reason| fallback.settle(on_rejected(reason)),
            ));
            Ok(())
        })
    }

    /// `then` with rejections passed through unchanged.
    pub fn success<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + 'static,
    {
        self.then(on_fulfilled, |reason| Err(reason))
    }

    /// `then` with values passed through unchanged.
    pub fn catch<R>(&self, on_rejected: R) -> Promise<T, E>
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    pub fn map<U, F>(&self, f: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.success(move |value| Ok(Resolution::Value(f(value))))
    }

    /// A clone of the outcome, if settled.
    pub fn peek(&self) -> Option<Outcome<T, E>> {
        self.core.peek()
    }

    /// A future resolving to this promise's result.
    pub fn settled(&self) -> Settled<T, E> {
        Settled::new(self)
    }
}

impl<T, E> IntoFuture for Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;
    type IntoFuture = Settled<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.settled()
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("status", &self.status())
            .finish()
    }
}
