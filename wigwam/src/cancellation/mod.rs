//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is shared between the run controller, the build
//! executor and the binary's Ctrl-C handler.

mod token;

pub use token::CancellationToken;
