//! One-shot promise/future primitive.
//!
//! A [`Promise`] is the write side (complete/fail, idempotent after the first
//! call); a [`FluxorFuture`] is the read side (cancellable await plus
//! combinators). [`join_all`] and [`race`] compose several futures.

mod compose;
mod promise;

pub use compose::{join_all, race};
pub use promise::{FluxorFuture, FutureError, Promise};
