use std::{cell::RefCell, rc::Rc, time::Duration};
use thenable::{
    Clock, Error, EventLoop, Options, Outcome, Promise, Resolution, Resolver, Status,
};

fn manual_loop() -> EventLoop {
    let _ = env_logger::builder().is_test(true).try_init();
    EventLoop::with_options(Options::new().clock(Clock::Manual))
}

fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

fn pending<T: Clone + 'static, E: Clone + 'static>() -> (Promise<T, E>, Resolver<T, E>) {
    let mut slot = None;
    let promise = Promise::new(|resolver| {
        slot = Some(resolver);
        Ok(())
    });
    (promise, slot.expect("executor runs synchronously"))
}

type Log<T> = Rc<RefCell<Vec<T>>>;

fn log<T>() -> Log<T> {
    Rc::new(RefCell::new(Vec::new()))
}

#[test]
fn test_settlement_is_monotonic() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let (promise, resolver) = pending::<i32, &str>();

    resolver.resolve(1);
    resolver.reject("late");
    resolver.resolve(2);
    assert_eq!(promise.peek(), Some(Outcome::Fulfilled(1)));

    event_loop.run().unwrap();
    resolver.reject("later still");
    assert_eq!(promise.status(), Status::Fulfilled);
    assert_eq!(event_loop.block_on(promise), Ok(Ok(1)));
}

#[test]
fn test_waiters_fire_in_registration_order() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let (promise, resolver) = pending::<i32, &str>();
    let seen = log();
    for name in ["t1", "t2", "t3"] {
        let seen = seen.clone();
        promise.map(move |value| seen.borrow_mut().push((name, value)));
    }

    resolver.resolve(4);
    event_loop.run().unwrap();
    assert_eq!(*seen.borrow(), [("t1", 4), ("t2", 4), ("t3", 4)]);
}

#[test]
fn test_rejection_waiters_fire_in_registration_order() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let (promise, resolver) = pending::<(), &str>();
    let seen = log();
    for name in ["t1", "t2", "t3"] {
        let seen = seen.clone();
        promise.catch(move |reason| {
            seen.borrow_mut().push((name, reason));
            Ok(Resolution::Value(()))
        });
    }

    resolver.reject("e");
    event_loop.run().unwrap();
    assert_eq!(*seen.borrow(), [("t1", "e"), ("t2", "e"), ("t3", "e")]);
}

#[test]
fn test_handlers_never_run_synchronously() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let seen = log();

    let settled = seen.clone();
    Promise::<i32, ()>::resolve(1).map(move |value| settled.borrow_mut().push(value));
    seen.borrow_mut().push(2);
    assert_eq!(*seen.borrow(), [2]);

    event_loop.run().unwrap();
    assert_eq!(*seen.borrow(), [2, 1]);
}

#[test]
fn test_resolving_pending_promise_defers_handlers() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let (promise, resolver) = pending::<i32, ()>();
    let seen = log();

    let settled = seen.clone();
    promise.map(move |value| settled.borrow_mut().push(value));
    resolver.resolve(1);
    seen.borrow_mut().push(2);

    event_loop.run().unwrap();
    assert_eq!(*seen.borrow(), [2, 1]);
}

#[test]
fn test_handler_promise_is_flattened() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let flattened = Promise::<Promise<i32, &str>, &str>::new(|resolver| {
        resolver.resolve(Promise::resolve(5));
        Ok(())
    })
    .success(|inner| Ok(Resolution::Adopt(inner)));

    assert_eq!(event_loop.block_on(flattened), Ok(Ok(5)));
}

#[test]
fn test_nested_promises_resolve_through_each_level() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let nested = Promise::<i32, &str>::resolve(1).success(|one| {
        let inner = Promise::<i32, &str>::resolve_delay(one + 1, ms(10))
            .success(|two| Ok(Resolution::Adopt(Promise::<i32, &str>::resolve_delay(two + 1, ms(10)))));
        Ok(Resolution::Adopt(inner))
    });

    assert_eq!(event_loop.block_on(nested), Ok(Ok(3)));
    assert_eq!(event_loop.now(), ms(20));
}

#[test]
fn test_adopted_rejection_propagates() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let adopted = Promise::<i32, &str>::resolve(1)
        .success(|_| Ok(Resolution::Adopt(Promise::<i32, &str>::reject_delay("inner", ms(5)))));
    assert_eq!(event_loop.block_on(adopted), Ok(Err("inner")));
}

#[test]
fn test_executor_error_becomes_rejection() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let caught = Promise::<&str, &str>::new(|_| Err("x")).catch(|reason| Ok(Resolution::Value(reason)));
    assert_eq!(event_loop.block_on(caught), Ok(Ok("x")));
}

#[test]
fn test_handler_error_rejects_derived_promise() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let failed = Promise::<i32, String>::resolve(1).success(|value| -> Result<Resolution<i32, String>, String> {
        Err(format!("boom {}", value))
    });
    assert_eq!(event_loop.block_on(failed), Ok(Err("boom 1".to_string())));
}

#[test]
fn test_rejection_passes_through_fulfillment_only_chain() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let ran = Rc::new(RefCell::new(false));
    let touched = ran.clone();
    let recovered = Promise::<i32, &str>::reject("first")
        .map(|value| value + 1)
        .map(move |value| {
            *touched.borrow_mut() = true;
            value * 2
        })
        .catch(|reason| Ok(Resolution::Value(reason.len() as i32)));

    assert_eq!(event_loop.block_on(recovered), Ok(Ok(5)));
    assert!(!*ran.borrow());
}

#[test]
fn test_all_fulfills_in_order() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let all = Promise::<i32, &str>::all([Promise::resolve(1), Promise::resolve(2)]);
    assert_eq!(event_loop.block_on(all), Ok(Ok(vec![1, 2])));
}

#[test]
fn test_all_rejects_with_rejection() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let all = Promise::<i32, &str>::all([Promise::resolve(1), Promise::reject("e")]);
    assert_eq!(event_loop.block_on(all), Ok(Err("e")));
}

#[test]
fn test_race_takes_the_earliest() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let race = Promise::<i32, &str>::race([
        Promise::resolve_delay(1, ms(50)),
        Promise::resolve_delay(2, ms(10)),
    ]);
    assert_eq!(event_loop.block_on(race.clone()), Ok(Ok(2)));

    event_loop.run().unwrap();
    assert_eq!(race.peek(), Some(Outcome::Fulfilled(2)));
}

#[test]
fn test_resolve_delay_waits_on_manual_clock() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let delayed = Promise::<&str, ()>::resolve_delay("a", ms(20));

    event_loop.advance(ms(19)).unwrap();
    assert_eq!(delayed.status(), Status::Pending);
    event_loop.advance(ms(1)).unwrap();
    assert_eq!(delayed.peek(), Some(Outcome::Fulfilled("a")));
}

#[test]
fn test_reject_delay_waits_on_manual_clock() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let delayed = Promise::<(), &str>::reject_delay("e", ms(20));

    event_loop.advance(ms(10)).unwrap();
    assert_eq!(delayed.status(), Status::Pending);
    event_loop.advance(ms(10)).unwrap();
    assert_eq!(delayed.peek(), Some(Outcome::Rejected("e")));
}

#[test]
fn test_block_on_reports_stall() {
    let event_loop = manual_loop();
    let _guard = event_loop.enter();
    let never = Promise::<i32, ()>::new(|_| Ok(()));
    assert_eq!(event_loop.block_on(never), Err(Error::Stalled));
}

#[test]
fn test_tick_limit_stops_long_chains() {
    let event_loop = EventLoop::with_options(Options::new().clock(Clock::Manual).max_ticks(3));
    let _guard = event_loop.enter();
    let mut chain = Promise::<u32, ()>::resolve(0);
    for _ in 0..10 {
        chain = chain.map(|n| n + 1);
    }
    assert_eq!(event_loop.block_on(chain), Err(Error::TickLimit(3)));
}

#[test]
fn test_promise_outside_event_loop_needs_handle() {
    assert_eq!(thenable::Handle::try_current().err(), Some(Error::NoEventLoop));

    let event_loop = manual_loop();
    let promise = Promise::<i32, ()>::new_in(event_loop.handle(), |resolver| {
        resolver.resolve(8);
        Ok(())
    });
    let doubled = promise.map(|n| n * 2);
    assert_eq!(event_loop.block_on(doubled), Ok(Ok(16)));
}
