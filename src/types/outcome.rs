//! Four-valued task outcome with a severity lattice.
//!
//! A task that ran to its end produced `Ok` or `Err`; a task that was
//! unwound by cancellation produced `Cancelled`; a task whose computation
//! panicked produced `Panicked`. Severity: `Ok < Err < Cancelled < Panicked`.

use super::cancel::CancelReason;
use core::fmt;

/// Payload captured from a panicking task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a payload from the opaque value `std::panic` hands back.
    #[must_use]
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload.downcast_ref::<&str>().map_or_else(
            || {
                payload
                    .downcast_ref::<String>()
                    .cloned()
                    .unwrap_or_else(|| "panic payload of unknown type".to_owned())
            },
            |s| (*s).to_owned(),
        );
        Self { message }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The terminal outcome of a task.
#[derive(Debug, Clone)]
pub enum Outcome<T, E> {
    /// The computation returned a value.
    Ok(T),
    /// The computation returned an application error.
    Err(E),
    /// The computation was unwound by cancellation.
    Cancelled(CancelReason),
    /// The computation panicked.
    Panicked(PanicPayload),
}

impl<T, E> Outcome<T, E> {
    /// Returns the severity of this outcome (0 = Ok … 3 = Panicked).
    #[must_use]
    pub const fn severity(&self) -> u8 {
        match self {
            Self::Ok(_) => 0,
            Self::Err(_) => 1,
            Self::Cancelled(_) => 2,
            Self::Panicked(_) => 3,
        }
    }

    /// Returns true if this outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true if this outcome is `Err`.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this outcome is `Panicked`.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Maps the success value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U, E> {
        match self {
            Self::Ok(v) => Outcome::Ok(f(v)),
            Self::Err(e) => Outcome::Err(e),
            Self::Cancelled(r) => Outcome::Cancelled(r),
            Self::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Discards the success value, keeping only the outcome shape.
    pub fn summary(&self) -> Outcome<(), E>
    where
        E: Clone,
    {
        match self {
            Self::Ok(_) => Outcome::Ok(()),
            Self::Err(e) => Outcome::Err(e.clone()),
            Self::Cancelled(r) => Outcome::Cancelled(r.clone()),
            Self::Panicked(p) => Outcome::Panicked(p.clone()),
        }
    }
}

impl<T, E: fmt::Display> fmt::Display for Outcome<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(_) => write!(f, "ok"),
            Self::Err(e) => write!(f, "error: {e}"),
            Self::Cancelled(r) => write!(f, "cancelled: {r}"),
            Self::Panicked(p) => write!(f, "{p}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_lattice() {
        let ok: Outcome<(), &str> = Outcome::Ok(());
        let err: Outcome<(), &str> = Outcome::Err("boom");
        let cancelled: Outcome<(), &str> = Outcome::Cancelled(CancelReason::default());
        let panicked: Outcome<(), &str> = Outcome::Panicked(PanicPayload::new("oops"));

        assert!(ok.severity() < err.severity());
        assert!(err.severity() < cancelled.severity());
        assert!(cancelled.severity() < panicked.severity());
    }

    #[test]
    fn panic_payload_downcasts() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("static str panic");
        assert_eq!(PanicPayload::from_panic(&*boxed).message(), "static str panic");

        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("owned panic"));
        assert_eq!(PanicPayload::from_panic(&*boxed).message(), "owned panic");
    }
}
