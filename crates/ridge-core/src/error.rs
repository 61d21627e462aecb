//! Host-detected impossibilities (spec.md §7, channel 2).
//!
//! Architectural events (page faults, traps, alignment) are never errors —
//! they are `Event` values the `Processor` resolves internally. `CoreError`
//! is only for conditions the CPU itself has no model of: a VRT link chain
//! that never terminates, a bus status the core doesn't recognise, or a
//! device-enumeration cycle. These bubble out of `step` and halt the
//! processor; there is no retry.

use std::fmt;

#[derive(Debug)]
pub enum CoreError {
    /// The VRT link-chain walk exceeded the safety bound without
    /// resolving to either a match or `link == 0` (spec.md §4.2).
    VrtWalkOverflow { segment: u32, vaddr: u32, steps: u32 },
    /// A bus access returned a status word the core has no case for
    /// (only bits 31 and 30 are architecturally defined).
    UnknownBusStatus(u32),
    /// Device enumeration during interrupt polling looped back on a
    /// device it had already visited this poll.
    DeviceEnumerationCycle,
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VrtWalkOverflow { segment, vaddr, steps } => write!(
                f,
                "VRT walk did not terminate after {steps} steps (segment={segment:#06x}, vaddr={vaddr:#010x})",
            ),
            Self::UnknownBusStatus(status) => {
                write!(f, "bus returned unrecognised status word {status:#010x}")
            }
            Self::DeviceEnumerationCycle => {
                write!(f, "device enumeration cycled back on itself during interrupt poll")
            }
        }
    }
}

impl std::error::Error for CoreError {}
