//! Cooperative cancellation.
//!
//! Runs check their token between stages; a stage already running is never
//! interrupted.

mod token;

pub use token::CancellationToken;
