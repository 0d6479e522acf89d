//! Established connections between two processes.

mod framed;

pub use framed::*;
