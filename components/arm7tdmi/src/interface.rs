// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use common::{numutil::NumExt, Time};

use crate::{state::CpuState, Exception};

/// Enum for the types of memory accesses; either sequential
/// or non-sequential. The numbers assigned to the variants are
/// to speed up reading the wait times in the bus implementation.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Access {
    Seq = 0,
    #[default]
    NonSeq = 16,
}

/// Trait for a system bus that contains this CPU.
/// Allows the CPU to perform memory accesses and drive system time.
pub trait Bus: Sized + 'static {
    /// Increment the system clock by the given amount of CPU ticks.
    fn tick(&mut self, cycles: Time);
    /// Handle pending events on the bus.
    fn handle_events(&mut self, cpu: &mut CpuState);

    /// Callback to perform any system-specific behavior on an exception.
    fn exception_happened(&mut self, cpu: &mut CpuState, kind: Exception);
    /// Callback to perform any system-specific behavior on a pipeline stall.
    fn pipeline_stalled(&mut self, cpu: &mut CpuState);

    /// Get the value at the given memory address.
    fn get<T: RwType>(&mut self, cpu: &mut CpuState, addr: u32) -> T;
    /// Set the value at the given memory address.
    fn set<T: RwType>(&mut self, cpu: &mut CpuState, addr: u32, value: T);
    /// Get the access time in S/N cycles for the given memory address.
    fn wait_time<T: RwType>(&mut self, cpu: &mut CpuState, addr: u32, access: Access) -> u16;

    /// Get the value at the given memory address and add to the system clock.
    fn read<T: RwType>(&mut self, cpu: &mut CpuState, addr: u32, access: Access) -> T::ReadOutput {
        let time = self.wait_time::<T>(cpu, addr, access);
        self.tick(time as Time);

        let value = self.get::<T>(cpu, addr).u32();
        T::ReadOutput::from_u32(if T::WIDTH == 2 && addr.is_bit(0) {
            // Unaligned halfword reads rotate the value into place
            value.rotate_right(8)
        } else {
            value
        })
    }

    /// Set the value at the given memory address and add to the system clock.
    fn write<T: RwType>(&mut self, cpu: &mut CpuState, addr: u32, value: T, access: Access) {
        let time = self.wait_time::<T>(cpu, addr, access);
        self.tick(time as Time);
        self.set(cpu, addr, value);
    }
}

/// Trait for a type that the CPU can read/write memory with.
/// On this ARM CPU, it is u8, u16, u32.
pub trait RwType: NumExt + 'static {
    type ReadOutput: RwType;
}

impl RwType for u8 {
    type ReadOutput = Self;
}

impl RwType for u16 {
    /// u16 outputs u32: On unaligned reads, the CPU
    /// rotates the result, therefore making it 32bit.
    type ReadOutput = u32;
}

impl RwType for u32 {
    type ReadOutput = Self;
}
