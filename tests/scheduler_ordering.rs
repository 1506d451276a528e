//! Ordering contracts: completions map to their own waiters, resumption is
//! FIFO in readiness order, and reordered kernel delivery is harmless.

mod common;

use ringloop::ring::Op;
use ringloop::runtime::submit;
use ringloop::sync::Event;
use ringloop::{spawn, yield_now, Result};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn reordered_completions_reach_the_right_tasks() {
    let (rt, handle) = common::lab_manual();
    let order: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));

    let order_a = Rc::clone(&order);
    let order_b = Rc::clone(&order);
    let result = rt.block_on(async move {
        let reader_a = spawn(async move {
            let output = submit(Op::Nop).await?;
            let payload = String::from_utf8(output.payload.unwrap_or_default())
                .expect("utf8 payload");
            order_a.borrow_mut().push(payload.clone());
            Ok(payload)
        });
        let reader_b = spawn(async move {
            let output = submit(Op::Nop).await?;
            let payload = String::from_utf8(output.payload.unwrap_or_default())
                .expect("utf8 payload");
            order_b.borrow_mut().push(payload.clone());
            Ok(payload)
        });

        // Both submissions land before the driver runs (spawn order is
        // FIFO within the pass).
        let driver_handle = handle.clone();
        let driver = spawn(async move {
            while driver_handle.pending().len() < 2 {
                yield_now().await?;
            }
            let pending = driver_handle.pending();
            let (token_a, _) = pending[0];
            let (token_b, _) = pending[1];
            // Deliver in reverse submission order.
            assert!(driver_handle.complete_token(token_b, 1, Some(b"B".to_vec())));
            assert!(driver_handle.complete_token(token_a, 1, Some(b"A".to_vec())));
            Ok(())
        });

        let a = reader_a.await?;
        let b = reader_b.await?;
        driver.await?;
        Ok((a, b))
    });

    // token-in == token-out: each task saw its own payload.
    let (a, b) = result.expect("scenario completes");
    assert_eq!(a, "A");
    assert_eq!(b, "B");
    // Tasks resumed in kernel delivery order (B first).
    assert_eq!(*order.borrow(), vec!["B".to_owned(), "A".to_owned()]);
}

#[test]
fn tasks_resume_fifo_in_wake_order() {
    let (rt, _handle) = common::lab();
    let order: Rc<RefCell<Vec<u32>>> = Rc::new(RefCell::new(Vec::new()));

    let result = rt.block_on({
        let order = Rc::clone(&order);
        async move {
            let gate = Event::new();
            let mut waiters = Vec::new();
            for n in 0..3 {
                let gate = gate.clone();
                let order = Rc::clone(&order);
                waiters.push(spawn(async move {
                    gate.wait().await?;
                    order.borrow_mut().push(n);
                    Ok(())
                }));
            }
            // Let every waiter park first.
            yield_now().await?;
            gate.set();
            for waiter in waiters {
                waiter.await?;
            }
            Ok(())
        }
    });

    result.expect("all waiters finish");
    assert_eq!(*order.borrow(), vec![0, 1, 2]);
}

#[test]
fn yielding_tasks_interleave_deterministically() {
    let (rt, _handle) = common::lab();
    let order: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    rt.block_on({
        let order = Rc::clone(&order);
        async move {
            let order_a = Rc::clone(&order);
            let a = spawn(async move {
                for _ in 0..3 {
                    order_a.borrow_mut().push("a");
                    yield_now().await?;
                }
                Ok(())
            });
            let order_b = Rc::clone(&order);
            let b = spawn(async move {
                for _ in 0..3 {
                    order_b.borrow_mut().push("b");
                    yield_now().await?;
                }
                Ok(())
            });
            a.await?;
            b.await?;
            Ok(())
        }
    })
    .expect("both loops finish");

    assert_eq!(*order.borrow(), vec!["a", "b", "a", "b", "a", "b"]);
}

#[test]
fn spawned_task_result_flows_through_join_handle() {
    let (rt, _handle) = common::lab();
    let result: Result<u64> = rt.block_on(async {
        let task = spawn(async { Ok(6 * 7) });
        task.await
    });
    assert_eq!(result.expect("task result"), 42);
}
