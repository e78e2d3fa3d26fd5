#![allow(clippy::module_name_repetitions, clippy::cast_sign_loss)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]
#![deny(unused_must_use)]

//! A live-market client for the MtGox streaming and REST APIs.
//!
//! The crate maintains a continuously consistent view of the public order
//! book and the authenticated account state by consuming the streaming push
//! feed, reconciling it against REST snapshot pulls and publishing change
//! signals to subscribers.
//!
//! To start a streaming session, refer to [`crate::engine::Engine`].

pub mod book;
pub mod engine;
pub mod error;
pub mod history;
pub mod message;
pub mod prelude;
pub mod rest;
pub mod signal;
pub mod signer;
pub mod transport;
pub mod utils;
