//! Graphics backend boundary
//!
//! The graph core only sees the [`GraphicsBackend`] trait. The
//! [`DummyBackend`] records everything it is asked to do and is what the
//! test-suite runs against.

pub mod command;
pub mod dummy;
pub mod traits;
pub mod types;

pub use command::*;
pub use dummy::DummyBackend;
pub use traits::*;
pub use types::*;
