//! Core traits and types for discrete-event device emulation.
//!
//! A device is driven by an external scheduler: the scheduler announces a
//! timeslice, calls `execute_step` repeatedly to advance the device through
//! simulated time, and finally commits or rolls back the whole slice. All
//! timing is expressed in device-native ticks, converted to nanoseconds of
//! simulated time through a clock source.

mod bus;
mod clock;
mod device;
mod error;
mod observable;
mod savestate;
mod ticks;

pub use bus::{BusRead, MemoryBus, SimpleBus};
pub use clock::ClockSource;
pub use device::Device;
pub use error::BuildError;
pub use observable::{Observable, Value};
pub use savestate::{read_bool, read_f64, read_u8, read_u16, read_u32, StateNode};
pub use ticks::Ticks;
