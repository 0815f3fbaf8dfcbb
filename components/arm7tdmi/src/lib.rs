// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Implementation of an ARM7TDMI CPU. It is generic over the
//! system bus it is attached to; see `interface.rs`.

mod alu;
pub mod arm;
mod exceptions;
pub mod interface;
pub mod state;
pub mod thumb;

use common::numutil::NumExt;
pub use exceptions::{Exception, Interrupt, InterruptController};
use interface::{Access, Bus, RwType};
use state::{CpuState, Flag::Thumb};

/// The CPU. Owns the bus it is attached to.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Cpu<S: Bus> {
    pub state: CpuState,
    pub bus: S,
}

impl<S: Bus> Cpu<S> {
    pub fn new(bus: S) -> Self {
        Self {
            state: CpuState::default(),
            bus,
        }
    }

    /// Advance emulation by a single instruction.
    #[inline]
    pub fn continue_running(&mut self) {
        self.bus.handle_events(&mut self.state);
        self.state.check_if_interrupt(&mut self.bus);
        self.state.revalidate_pipeline(&mut self.bus);
        if self.state.is_flag(Thumb) {
            let inst = self.fetch_next_inst::<u16>();
            self.run_thumb(thumb::decode(inst.u16()));
        } else {
            let inst = self.fetch_next_inst::<u32>();
            if self.state.eval_condition((inst >> 28).u16()) {
                self.run_arm(arm::decode(inst));
            }
        }
    }

    /// Fetch the next instruction of the CPU and advance the pipeline.
    fn fetch_next_inst<TY: RwType>(&mut self) -> u32 {
        let pc = self.state.bump_pc(TY::WIDTH);
        let access = self.state.access_type;
        let sn_cycles = self.bus.wait_time::<TY>(&mut self.state, pc, access);
        self.bus.tick(sn_cycles as u64);

        let future_inst = self.bus.get::<TY>(&mut self.state, pc).u32();
        self.state.advance_pipeline(future_inst)
    }

    pub(crate) fn swi(&mut self) {
        self.exception_occurred(Exception::Swi);
    }

    pub(crate) fn und_inst<T: std::fmt::UpperHex>(&mut self, code: T) {
        log::warn!("Unknown opcode '{:08X}'", code);
        self.exception_occurred(Exception::Undefined);
    }

    /// Called by multiple load/store instructions when the Rlist was
    /// empty, which causes R15 to be loaded/stored and Rb to be
    /// incremented/decremented by 0x40.
    pub(crate) fn on_empty_rlist(&mut self, rb: u32, str: bool, up: bool, before: bool) {
        let addr = self.state.reg(rb);
        self.set_reg(rb, mod_with_offs(addr, 0x40, up));

        if str {
            let addr = match (up, before) {
                (true, true) => addr.wrapping_add(4),
                (true, false) => addr,
                (false, true) => addr.wrapping_sub(0x40),
                (false, false) => addr.wrapping_sub(0x3C),
            };
            let value = self.state.pc() + self.state.current_instruction_size();
            self.write::<u32>(addr, value, Access::NonSeq);
        } else {
            let val = self.read::<u32>(addr, Access::NonSeq);
            self.set_pc(val);
        }
    }

    /// Idle for 1 cycle and set access type to non-sequential.
    pub(crate) fn idle_nonseq(&mut self) {
        self.bus.tick(1);
        self.state.access_type = Access::NonSeq;
    }

    /// Calculate MUL instruction wait cycles.
    /// The multiplier aborts early on all-zero or all-one upper bytes
    /// of the operand.
    pub(crate) fn mul_wait_cycles(&mut self, mut value: u32, signed: bool) {
        self.idle_nonseq();
        let mut mask = 0xFFFF_FF00;
        loop {
            value &= mask;
            if value == 0 || (signed && value == mask) {
                break;
            }
            self.bus.tick(1);
            mask <<= 8;
        }
    }

    pub(crate) fn read<T: RwType>(&mut self, addr: u32, access: Access) -> T::ReadOutput {
        self.bus.read::<T>(&mut self.state, addr, access)
    }

    pub(crate) fn write<T: RwType>(&mut self, addr: u32, value: T, access: Access) {
        self.bus.write::<T>(&mut self.state, addr, value, access);
    }

    /// Read a half-word from the bus (LE).
    /// If address is unaligned, do LDRSH behavior.
    pub(crate) fn read_hword_ldrsh(&mut self, addr: u32, kind: Access) -> u32 {
        let time = self.bus.wait_time::<u16>(&mut self.state, addr, kind);
        self.bus.tick(time as u64);
        let val = self.bus.get::<u16>(&mut self.state, addr).u32();
        if addr.is_bit(0) {
            // Unaligned, only the high byte is used, sign-extended
            (val >> 8) as i8 as i16 as u32
        } else {
            val
        }
    }

    /// Read a word from the bus (LE).
    /// If address is unaligned, do LDR/SWP behavior.
    pub(crate) fn read_word_ldrswp(&mut self, addr: u32, kind: Access) -> u32 {
        let val = self.read::<u32>(addr, kind);
        if addr & 3 != 0 {
            // Unaligned
            let by = (addr & 3) << 3;
            val.rotate_right(by)
        } else {
            // Aligned
            val
        }
    }
}

/// Modify a value with an offset, either adding or subtracting.
pub(crate) fn mod_with_offs(value: u32, offs: u32, up: bool) -> u32 {
    if up {
        value.wrapping_add(offs)
    } else {
        value.wrapping_sub(offs)
    }
}

pub(crate) fn condition_mnemonic(cond: u16) -> &'static str {
    match cond {
        0x0 => "eq",
        0x1 => "ne",
        0x2 => "cs",
        0x3 => "cc",
        0x4 => "mi",
        0x5 => "pl",
        0x6 => "vs",
        0x7 => "vc",
        0x8 => "hi",
        0x9 => "ls",
        0xA => "ge",
        0xB => "lt",
        0xC => "gt",
        0xD => "le",
        0xE => "",
        _ => "nv",
    }
}
