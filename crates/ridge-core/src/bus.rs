//! The programmed-I/O bus boundary (spec.md §6).
//!
//! The core never talks to a device directly. It goes through `ExternalBus`,
//! which the host harness implements to route `READ`/`WRITE` opcodes and
//! `MAINT` interrupt queries to the floppy/disk/display/keyboard controllers
//! (all out of scope here — §1).

/// Status word returned from a bus access.
///
/// Bit 31 = device not ready, bit 30 = device timed out, 0 = success.
/// Kept as a raw `u32` (not a bitflags enum) because it is written
/// directly into `R[Rx]` by the READ/WRITE opcode handlers.
pub type BusStatus = u32;

pub const STATUS_OK: BusStatus = 0;
pub const STATUS_NOT_READY: BusStatus = 0x8000_0000;
pub const STATUS_TIMEOUT: BusStatus = 0x4000_0000;

/// A device currently asserting an interrupt, as returned by
/// `ExternalBus::interrupt_requested`.
pub trait Device {
    /// Acknowledge the interrupt, returning the 32-bit IOIR (device ID,
    /// unit, and status) for `MAINT` sub-op ITEST or an `ExternalInterrupt`
    /// event's SR0 write.
    fn ack_interrupt(&mut self) -> u32;
}

/// The external, programmed-I/O bus. Implemented by the host harness; the
/// core only calls these three operations (spec.md §6).
pub trait ExternalBus {
    /// The device handle returned by `interrupt_requested`.
    type Device: Device;

    /// READ opcode: `device` and `device_data` come from splitting R[Ry]
    /// (bits 0..7 / 8..31); the bus writes the read word into `data` and
    /// returns a status.
    fn read(&mut self, device: u8, device_data: u32, data: &mut u32) -> BusStatus;

    /// WRITE opcode: same device/data-word split as `read`.
    fn write(&mut self, device: u8, device_data: u32, data: u32) -> BusStatus;

    /// Poll for the highest-priority device currently asserting an
    /// interrupt. Devices are considered in registration order; at most
    /// one request is latched at a time (spec.md §5).
    fn interrupt_requested(&mut self) -> Option<Self::Device>;
}
