//! Promise constructors built from `Promise::new` and `then`.
use crate::promise::{Promise, Resolution};
use std::{
    cell::{Cell, RefCell},
    rc::Rc,
    time::Duration,
};

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// A promise fulfilled with `value`.
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop). Chain from a promise built with
    /// [`Promise::new_in`] to pick a loop explicitly.
    pub fn resolve(value: T) -> Self {
        Promise::resolve_with(Resolution::Value(value))
    }

    /// A promise settled from `value`: a plain value fulfills it and a
    /// promise is adopted.
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop), like [`Promise::new`].
    pub fn resolve_with(value: impl Into<Resolution<T, E>>) -> Self {
        let value = value.into();
        Promise::new(move |resolver| {
            resolver.settle(Ok(value));
            Ok(())
        })
    }

    /// A promise rejected with `reason`. The reason is never unwrapped.
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop), like [`Promise::new`].
    pub fn reject(reason: E) -> Self {
        Promise::new(move |resolver| {
            resolver.reject(reason);
            Ok(())
        })
    }

    /// Fulfills with every input's value, in input order, once all of them
    /// have fulfilled. Rejects with the first rejection; outcomes arriving
    /// after that are ignored.
    ///
    /// An empty input fulfills with an empty `Vec`. Each input may be a
    /// promise or a [`Resolution`], and is normalized with
    /// [`Promise::resolve_with`].
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop), like [`Promise::new`].
    pub fn all<I>(inputs: I) -> Promise<Vec<T>, E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let inputs: Vec<Self> = inputs.into_iter().map(Self::resolve_with).collect();
        Promise::new(move |resolver| {
            let total = inputs.len();
            if total == 0 {
                resolver.resolve(Vec::new());
                return Ok(());
            }

            let values = Rc::new(RefCell::new(vec![None; total]));
            let fulfilled = Rc::new(Cell::new(0));
            for (index, input) in inputs.iter().enumerate() {
                let values = values.clone();
                let fulfilled = fulfilled.clone();
                let resolve = resolver.clone();
                let reject = resolver.clone();
                input.then(
                    move |value| {
                        values.borrow_mut()[index] = Some(value);
                        fulfilled.set(fulfilled.get() + 1);
                        if fulfilled.get() == total {
                            resolve.resolve(values.take().into_iter().flatten().collect());
                        }
                        Ok(Resolution::Value(()))
                    },
                    move |reason| {
                        reject.reject(reason);
                        Ok(Resolution::Value(()))
                    },
                );
            }
            Ok(())
        })
    }

    /// Settles like whichever input settles first. Never settles for an
    /// empty input. Inputs are normalized like those of [`Promise::all`].
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop), like [`Promise::new`].
    pub fn race<I>(inputs: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let inputs: Vec<Self> = inputs.into_iter().map(Self::resolve_with).collect();
        Promise::new(move |resolver| {
            for input in &inputs {
                resolver.adopt(input);
            }
            Ok(())
        })
    }

    /// Like [`Promise::resolve`], settling no earlier than `time` from now.
    /// A `time` too far out for the loop's clock never settles.
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop), like [`Promise::new`].
    pub fn resolve_delay(value: T, time: Duration) -> Self {
        Promise::resolve_delay_with(Resolution::Value(value), time)
    }

    /// Like [`Promise::resolve_with`], settling no earlier than `time` from
    /// now. A promise `value` is only adopted once `time` has passed.
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop), like [`Promise::new`].
    pub fn resolve_delay_with(value: impl Into<Resolution<T, E>>, time: Duration) -> Self {
        let value = value.into();
        Promise::new(move |resolver| {
            let handle = resolver.handle().clone();
            handle.schedule_after(move || resolver.settle(Ok(value)), time);
            Ok(())
        })
    }

    /// A promise rejected with `reason` no earlier than `time` from now.
    ///
    /// # Panics
    ///
    /// This will panic if called outside of an entered
    /// [`EventLoop`](crate::EventLoop), like [`Promise::new`].
    pub fn reject_delay(reason: E, time: Duration) -> Self {
        Promise::new(move |resolver| {
            let handle = resolver.handle().clone();
            handle.schedule_after(move || resolver.reject(reason), time);
            Ok(())
        })
    }
}
