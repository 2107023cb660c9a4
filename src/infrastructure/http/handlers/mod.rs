//! HTTP Handlers

mod generation;
mod ping;
mod worker;

pub use generation::*;
pub use ping::*;
pub use worker::*;
