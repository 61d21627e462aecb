//! Shared traits and types for the Ridge 32 emulator core.
//!
//! Everything here is Ridge-agnostic: it knows nothing about opcodes,
//! segments, or the VRT. `ridge-cpu` builds the actual machine on top of
//! these seams.

mod bus;
mod error;
mod observable;

pub use bus::{BusStatus, Device, ExternalBus};
pub use error::CoreError;
pub use observable::{Observable, Value};
