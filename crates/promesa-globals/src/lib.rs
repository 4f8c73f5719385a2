#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]
#![forbid(unsafe_code)]

mod walk;

pub use walk::{find_globals, find_globals_in_block, Globals};
