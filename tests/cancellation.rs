//! Scoped cancellation: absorb and propagate policies, shielding, manual
//! cancel, and the bounded cleanup allowance.

mod common;

use ringloop::time::sleep;
use ringloop::{
    fail_after, move_on_after, spawn, CancelScope, Error, ErrorKind, Result, ScopeOutcome,
};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn move_on_after_absorbs_its_own_deadline() {
    let (rt, _handle) = common::lab();
    let injections: Rc<RefCell<u32>> = Rc::new(RefCell::new(0));

    let result = rt.block_on({
        let injections = Rc::clone(&injections);
        async move {
            let cut = move_on_after(Duration::from_millis(50), async {
                match sleep(Duration::from_secs(10)).await {
                    Ok(()) => Ok("finished"),
                    Err(err) => {
                        *injections.borrow_mut() += 1;
                        Err(err)
                    }
                }
            })
            .await?;
            // The scope completed normally; the task keeps running and may
            // suspend again.
            sleep(Duration::from_millis(10)).await?;
            Ok(cut)
        }
    });

    assert_eq!(result.expect("scope exit is normal"), None);
    // Exactly one cancellation injection observed by the body.
    assert_eq!(*injections.borrow(), 1);
}

#[test]
fn move_on_after_returns_value_when_body_finishes_first() {
    let (rt, _handle) = common::lab();
    let result = rt.block_on(async {
        move_on_after(Duration::from_secs(10), async {
            sleep(Duration::from_millis(5)).await?;
            Ok(7)
        })
        .await
    });
    assert_eq!(result.expect("body finished"), Some(7));
}

#[test]
fn fail_after_surfaces_a_timeout_error() {
    let (rt, _handle) = common::lab();
    let result: Result<()> = rt.block_on(async {
        fail_after(Duration::from_millis(50), async {
            sleep(Duration::from_secs(10)).await
        })
        .await
    });
    let err = result.expect_err("deadline fired");
    assert_eq!(err.kind(), ErrorKind::TimedOut);
}

#[test]
fn enclosing_cancellation_passes_through_an_inner_scope() {
    let (rt, _handle) = common::lab();
    let result: Result<Option<()>> = rt.block_on(async {
        fail_after(Duration::from_millis(20), async {
            // Inner scope with a later deadline must not absorb the outer
            // cancellation.
            move_on_after(Duration::from_secs(5), async {
                sleep(Duration::from_secs(10)).await
            })
            .await
        })
        .await
    });
    let err = result.expect_err("outer deadline fired");
    assert_eq!(err.kind(), ErrorKind::TimedOut);
}

#[test]
fn shielded_scope_finishes_before_outer_deadline_is_delivered() {
    let (rt, _handle) = common::lab();
    let inner_done: Rc<RefCell<bool>> = Rc::new(RefCell::new(false));

    let result: Result<()> = rt.block_on({
        let inner_done = Rc::clone(&inner_done);
        async move {
            fail_after(Duration::from_millis(20), async move {
                let outcome = CancelScope::new()
                    .shielded(true)
                    .run(async {
                        // Outlives the outer deadline, but is shielded.
                        sleep(Duration::from_millis(100)).await?;
                        *inner_done.borrow_mut() = true;
                        Ok(())
                    })
                    .await?;
                assert!(matches!(outcome, ScopeOutcome::Completed(())));
                // First unshielded suspension: the outer deadline lands.
                sleep(Duration::from_secs(10)).await?;
                Ok(())
            })
            .await
        }
    });

    let err = result.expect_err("outer deadline eventually delivered");
    assert_eq!(err.kind(), ErrorKind::TimedOut);
    assert!(*inner_done.borrow(), "shielded work ran to completion");
}

#[test]
fn manual_cancel_from_a_sibling_task() {
    let (rt, _handle) = common::lab();
    let result = rt.block_on(async {
        let scope = CancelScope::new();
        let handle = scope.handle();
        let canceller = spawn(async move {
            sleep(Duration::from_millis(10)).await?;
            handle.cancel();
            Ok(())
        });
        let outcome = scope
            .run(async { sleep(Duration::from_secs(10)).await })
            .await?;
        canceller.await?;
        Ok(matches!(outcome, ScopeOutcome::CutShort(_)))
    });
    assert!(result.expect("scope absorbed the manual cancel"));
}

#[test]
fn cancelling_before_entry_applies_on_entry() {
    let (rt, _handle) = common::lab();
    let result = rt.block_on(async {
        let scope = CancelScope::new();
        scope.handle().cancel();
        let outcome = scope
            .run(async { sleep(Duration::from_secs(10)).await })
            .await?;
        Ok(matches!(outcome, ScopeOutcome::CutShort(_)))
    });
    assert!(result.expect("pre-cancelled scope cut short"));
}

#[test]
fn join_handle_cancel_injects_into_the_task() {
    let (rt, _handle) = common::lab();
    let result: Result<()> = rt.block_on(async {
        let sleeper = spawn(async {
            sleep(Duration::from_secs(30)).await?;
            Ok(())
        });
        let waiter = spawn(async { sleep(Duration::from_millis(5)).await });
        waiter.await?;
        sleeper.cancel();
        let err = sleeper.await.expect_err("sleeper was cancelled");
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        Ok(())
    });
    result.expect("driver completes");
}

#[test]
fn cleanup_may_suspend_once_then_fails_fast() {
    let (rt, _handle) = common::lab();
    let stages: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    rt.block_on({
        let stages = Rc::clone(&stages);
        async move {
            let stages_task = Rc::clone(&stages);
            let victim = spawn(async move {
                let worked: Result<()> = sleep(Duration::from_secs(30)).await;
                if let Err(first) = worked {
                    stages_task.borrow_mut().push("injected");
                    // One cleanup suspension is honored...
                    if sleep(Duration::from_millis(5)).await.is_ok() {
                        stages_task.borrow_mut().push("cleanup slept");
                    }
                    // ...the next one fails immediately.
                    if sleep(Duration::from_millis(5)).await.is_err() {
                        stages_task.borrow_mut().push("refused");
                    }
                    return Err(first);
                }
                Ok(())
            });
            sleep(Duration::from_millis(10)).await?;
            victim.cancel();
            let err = victim.await.expect_err("victim cancelled");
            assert_eq!(err.kind(), ErrorKind::Cancelled);
            Ok(())
        }
    })
    .expect("driver completes");

    assert_eq!(*stages.borrow(), vec!["injected", "cleanup slept", "refused"]);
}

#[test]
fn zero_cleanup_quota_refuses_all_cleanup_suspensions() {
    common::init_logging();
    let (ring, _handle) = ringloop::ring::LabRing::auto();
    let rt = ringloop::RuntimeBuilder::new()
        .virtual_time(true)
        .cleanup_quota(0)
        .ring(Box::new(ring))
        .build()
        .expect("lab runtime builds");

    let refused: Rc<RefCell<bool>> = Rc::new(RefCell::new(false));
    rt.block_on({
        let refused = Rc::clone(&refused);
        async move {
            let refused_task = Rc::clone(&refused);
            let victim = spawn(async move {
                let worked: Result<()> = sleep(Duration::from_secs(30)).await;
                if let Err(first) = worked {
                    if sleep(Duration::from_millis(1)).await.is_err() {
                        *refused_task.borrow_mut() = true;
                    }
                    return Err(first);
                }
                Ok(())
            });
            sleep(Duration::from_millis(10)).await?;
            victim.cancel();
            let _ = victim.await;
            Ok(())
        }
    })
    .expect("driver completes");
    assert!(*refused.borrow());
}

#[test]
fn cancelled_error_is_distinguishable_from_failure() {
    let err = Error::cancelled(ringloop::CancelReason::user("stop"));
    assert!(err.is_cancelled());
    let failure = Error::user("boom");
    assert!(!failure.is_cancelled());
}
