//! Containment of per-entity and per-timer failures.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
};

use thiserror::Error;

/// A failure of one isolated unit of work.
#[derive(Debug, Error)]
pub enum Fault {
    /// The work returned an error.
    #[error("{0:#}")]
    Error(anyhow::Error),
    /// The work panicked.
    #[error("panicked: {0}")]
    Panic(String),
}

/// Runs `work`, turning both errors and panics into a [`Fault`].
///
/// Locks in the core never poison, so state touched by a panicking unit stays
/// usable for the rest of the step.
pub fn run_isolated<R>(work: impl FnOnce() -> anyhow::Result<R>) -> Result<R, Fault> {
    match panic::catch_unwind(AssertUnwindSafe(work)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(Fault::Error(err)),
        Err(payload) => Err(Fault::Panic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
