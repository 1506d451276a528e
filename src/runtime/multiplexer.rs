//! Completion multiplexer: maps reaped completions back to promises.
//!
//! The token map is owned here and mutated nowhere else. Each scheduler
//! pass drains the ring to exhaustion and resolves the matching promises
//! *before* any task resumes, so every task that runs in a pass observes
//! the freshest state of all ready operations.
//!
//! A completion whose token is not in the map is discarded silently: the
//! awaiting future was dropped and its token abandoned (a cancel racing an
//! in-flight completion). The backend released the operation's resources
//! when it reaped the completion, so nothing leaks.

use crate::error::{Error, Result};
use crate::promise::Promise;
use crate::ring::{Completion, Ring, Token};
use crate::tracing_compat::trace;
use std::collections::HashMap;
use std::io;

/// Result of a ring operation, as delivered to the awaiting promise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpOutput {
    /// Raw non-negative result code (fd, byte count, or 0).
    pub result: i32,
    /// Filled buffer, for operations that produce one.
    pub payload: Option<Vec<u8>>,
}

/// A settled-but-not-yet-delivered promise resolution.
///
/// Settling runs arbitrary continuations, so the multiplexer hands these
/// back to the scheduler loop, which delivers them with the state borrow
/// released.
pub type PendingSettle = (Promise<OpOutput>, Result<OpOutput>);

/// Token → promise map plus the drain routine.
#[derive(Debug, Default)]
pub struct CompletionMap {
    map: HashMap<Token, Promise<OpOutput>>,
    scratch: Vec<Completion>,
}

impl CompletionMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty map with a drain scratch buffer of `batch`
    /// capacity.
    #[must_use]
    pub fn with_batch_capacity(batch: usize) -> Self {
        Self {
            map: HashMap::new(),
            scratch: Vec::with_capacity(batch),
        }
    }

    /// Registers a promise under a live token.
    ///
    /// # Errors
    ///
    /// Two live registrations under one token mean the ring backend
    /// violated token uniqueness; reported as an internal error.
    pub fn register(&mut self, token: Token, promise: Promise<OpOutput>) -> Result<()> {
        if self.map.insert(token, promise).is_some() {
            return Err(Error::internal("duplicate live correlation token"));
        }
        Ok(())
    }

    /// Drops the registration for `token`.
    ///
    /// Returns true if the token was registered. The in-flight completion,
    /// if it still arrives, will be discarded.
    pub fn abandon(&mut self, token: Token) -> bool {
        self.map.remove(&token).is_some()
    }

    /// Returns the number of registered tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no token is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drains every currently available completion from `ring` and pairs
    /// each with its promise.
    ///
    /// Success codes resolve with the payload; negative codes fail with a
    /// typed ring error carrying the raw code. The caller settles the
    /// returned pairs, in order, once it holds no other borrows.
    ///
    /// # Errors
    ///
    /// Propagates backend drain failures.
    pub fn drain(&mut self, ring: &mut dyn Ring) -> io::Result<Vec<PendingSettle>> {
        self.scratch.clear();
        ring.drain(&mut self.scratch)?;

        let mut settles = Vec::with_capacity(self.scratch.len());
        for completion in self.scratch.drain(..) {
            let Some(promise) = self.map.remove(&completion.token) else {
                // Reaped-token race; expected, not a fault.
                trace!(token = %completion.token, "discarding completion for abandoned token");
                continue;
            };
            let result = if completion.result >= 0 {
                Ok(OpOutput {
                    result: completion.result,
                    payload: completion.payload,
                })
            } else {
                Err(Error::ring(completion.result))
            };
            settles.push((promise, result));
        }
        Ok(settles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring::{LabRing, Op, Ring as _};

    #[test]
    fn drain_resolves_in_delivery_order() {
        let (mut ring, handle) = LabRing::manual();
        let mut map = CompletionMap::new();

        let t1 = ring.submit(Op::Nop).unwrap();
        let t2 = ring.submit(Op::Nop).unwrap();
        let p1 = Promise::new();
        let p2 = Promise::new();
        map.register(t1, p1.clone()).unwrap();
        map.register(t2, p2.clone()).unwrap();

        // Kernel order (t2, t1) must map each token to its own promise.
        handle.complete_token(t2, 7, None);
        handle.complete_token(t1, 3, None);

        let settles = map.drain(&mut ring).unwrap();
        assert_eq!(settles.len(), 2);
        for (promise, result) in settles {
            promise.settle(result).unwrap();
        }

        assert_eq!(p1.try_take().unwrap().unwrap().result, 3);
        assert_eq!(p2.try_take().unwrap().unwrap().result, 7);
        assert!(map.is_empty());
    }

    #[test]
    fn negative_code_becomes_ring_error() {
        let (mut ring, handle) = LabRing::manual();
        let mut map = CompletionMap::new();

        let t = ring.submit(Op::Nop).unwrap();
        let p = Promise::new();
        map.register(t, p.clone()).unwrap();
        handle.complete_token(t, -2, None);

        let settles = map.drain(&mut ring).unwrap();
        for (promise, result) in settles {
            promise.settle(result).unwrap();
        }
        let err = p.try_take().unwrap().unwrap_err();
        assert_eq!(err.ring_code(), Some(-2));
    }

    #[test]
    fn abandoned_token_completion_is_discarded() {
        let (mut ring, handle) = LabRing::manual();
        let mut map = CompletionMap::new();

        let t = ring.submit(Op::Nop).unwrap();
        let p = Promise::new();
        map.register(t, p).unwrap();
        assert!(map.abandon(t));

        handle.complete_token(t, 0, None);
        let settles = map.drain(&mut ring).unwrap();
        assert!(settles.is_empty());
    }

    #[test]
    fn empty_drain_is_noop() {
        let (mut ring, _handle) = LabRing::manual();
        let mut map = CompletionMap::new();
        let t = ring.submit(Op::Nop).unwrap();
        map.register(t, Promise::new()).unwrap();

        let settles = map.drain(&mut ring).unwrap();
        assert!(settles.is_empty());
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn duplicate_token_is_internal_error() {
        let mut map = CompletionMap::new();
        let t = Token::from_raw(1);
        map.register(t, Promise::new()).unwrap();
        assert!(map.register(t, Promise::new()).is_err());
    }
}
