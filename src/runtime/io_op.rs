//! Awaitable ring operations.
//!
//! [`OpFuture`] is the suspension protocol's leaf for kernel work: it
//! submits its descriptor on first poll, suspends on the completion
//! promise, and resumes with the operation's [`OpOutput`] (or a typed ring
//! error).
//!
//! Dropping an in-flight `OpFuture` abandons its token: the promise leaves
//! the completion map, the ring is asked for best-effort cancellation, and
//! the completion that may still arrive is discarded by the multiplexer.

use crate::error::Result;
use crate::ring::Op;
use crate::runtime::local;
pub use crate::runtime::multiplexer::OpOutput;
use crate::promise::Promise;
use crate::ring::Token;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

/// Future for one submitted ring operation.
#[derive(Debug)]
pub struct OpFuture {
    op: Option<Op>,
    inflight: Option<(Token, Promise<OpOutput>)>,
    done: bool,
}

/// Creates the future for `op`. Submission happens on first poll, inside
/// the runtime.
#[must_use]
pub fn submit(op: Op) -> OpFuture {
    OpFuture {
        op: Some(op),
        inflight: None,
        done: false,
    }
}

impl Future for OpFuture {
    type Output = Result<OpOutput>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        assert!(!this.done, "OpFuture polled after completion");

        if let Some(err) = local::cancel_checkpoint() {
            this.done = true;
            if let Some((token, _)) = this.inflight.take() {
                local::with_state(|state| state.abandon_op(token));
            }
            return Poll::Ready(Err(err));
        }

        if this.inflight.is_none() {
            let op = this.op.take().expect("op present until submission");
            let submitted = local::with_state(|state| state.submit_op(op));
            match submitted {
                None => panic!("ring operations require a running runtime"),
                Some(Err(err)) => {
                    // QueueFull surfaces here; the caller retries or backs
                    // off. Nothing was registered.
                    this.done = true;
                    return Poll::Ready(Err(err));
                }
                Some(Ok(pair)) => this.inflight = Some(pair),
            }
        }

        let promise = match &this.inflight {
            Some((_, promise)) => promise.clone(),
            None => unreachable!("inflight set above"),
        };
        if let Some(result) = promise.try_take() {
            this.done = true;
            return Poll::Ready(result);
        }
        if let Some(err) = local::before_suspend() {
            this.done = true;
            if let Some((token, _)) = this.inflight.take() {
                local::with_state(|state| state.abandon_op(token));
            }
            return Poll::Ready(Err(err));
        }
        promise.subscribe(cx.waker());
        Poll::Pending
    }
}

impl Drop for OpFuture {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        if let Some((token, _)) = self.inflight.take() {
            local::with_state(|state| state.abandon_op(token));
        }
    }
}
