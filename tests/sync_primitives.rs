//! Event, semaphore and lock behavior under the cooperative scheduler.

mod common;

use ringloop::sync::{Event, Lock, Semaphore};
use ringloop::time::sleep;
use ringloop::{spawn, yield_now};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn event_wakes_waiters_in_wait_order() {
    let (rt, _handle) = common::lab();
    let order: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));

    rt.block_on({
        let order = Rc::clone(&order);
        async move {
            let event = Event::new();
            let mut handles = Vec::new();
            for n in 0..4 {
                let event = event.clone();
                let order = Rc::clone(&order);
                handles.push(spawn(async move {
                    event.wait().await?;
                    order.borrow_mut().push(n);
                    Ok(())
                }));
            }
            yield_now().await?;
            event.set();
            for handle in handles {
                handle.await?;
            }
            Ok(())
        }
    })
    .expect("all waiters run");

    assert_eq!(*order.borrow(), vec![0, 1, 2, 3]);
}

#[test]
fn event_wait_after_set_is_immediate() {
    let (rt, _handle) = common::lab();
    rt.block_on(async {
        let event = Event::new();
        event.set();
        event.wait().await?;
        event.wait().await?;
        Ok(())
    })
    .expect("set event never blocks");
}

#[test]
fn semaphore_bounds_concurrency() {
    let (rt, _handle) = common::lab();
    let peak: Rc<RefCell<(u32, u32)>> = Rc::new(RefCell::new((0, 0))); // (current, max)

    rt.block_on({
        let peak = Rc::clone(&peak);
        async move {
            let semaphore = Semaphore::new(2);
            let mut handles = Vec::new();
            for _ in 0..5 {
                let semaphore = semaphore.clone();
                let peak = Rc::clone(&peak);
                handles.push(spawn(async move {
                    semaphore.acquire().await?;
                    {
                        let mut p = peak.borrow_mut();
                        p.0 += 1;
                        p.1 = p.1.max(p.0);
                    }
                    sleep(Duration::from_millis(5)).await?;
                    peak.borrow_mut().0 -= 1;
                    semaphore.release();
                    Ok(())
                }));
            }
            for handle in handles {
                handle.await?;
            }
            Ok(())
        }
    })
    .expect("all workers finish");

    assert_eq!(peak.borrow().1, 2, "at most two workers held a permit");
}

#[test]
fn lock_guard_releases_on_drop() {
    let (rt, _handle) = common::lab();
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    rt.block_on({
        let log = Rc::clone(&log);
        async move {
            let lock = Lock::new();
            let log_a = Rc::clone(&log);
            let lock_a = lock.clone();
            let a = spawn(async move {
                let _guard = lock_a.lock().await?;
                log_a.borrow_mut().push("a in");
                sleep(Duration::from_millis(5)).await?;
                log_a.borrow_mut().push("a out");
                Ok(())
            });
            let log_b = Rc::clone(&log);
            let lock_b = lock.clone();
            let b = spawn(async move {
                let _guard = lock_b.lock().await?;
                log_b.borrow_mut().push("b in");
                log_b.borrow_mut().push("b out");
                Ok(())
            });
            a.await?;
            b.await?;
            assert!(!lock.is_locked());
            Ok(())
        }
    })
    .expect("both critical sections run");

    assert_eq!(*log.borrow(), vec!["a in", "a out", "b in", "b out"]);
}

#[test]
fn cancelled_semaphore_waiter_does_not_lose_the_permit() {
    let (rt, _handle) = common::lab();

    rt.block_on(async {
        let semaphore = Semaphore::new(1);
        semaphore.acquire().await?;

        // A waiter that gets cancelled while queued.
        let sem_waiter = semaphore.clone();
        let waiter = spawn(async move {
            sem_waiter.acquire().await?;
            sem_waiter.release();
            Ok(())
        });
        yield_now().await?;
        waiter.cancel();
        let _ = waiter.await;

        // The permit is released and still acquirable.
        semaphore.release();
        semaphore.acquire().await?;
        semaphore.release();
        Ok(())
    })
    .expect("permit survives a cancelled waiter");
}
