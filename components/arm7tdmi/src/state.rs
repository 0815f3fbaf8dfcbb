// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use bitmatch::bitmatch;
use common::numutil::NumExt;

use crate::{
    interface::{Access, Bus, RwType},
    Cpu, InterruptController,
};

/// Macro for creating accessors for mode-dependent registers.
macro_rules! mode_reg {
    ($reg:ident, $get:ident, $set:ident) => {
        pub fn $get(&self) -> u32 {
            let mode = self.mode();
            if mode == Mode::System {
                self.$reg[0]
            } else {
                self.$reg[mode as usize]
            }
        }

        pub fn $set(&mut self, val: u32) {
            let mode = self.mode();
            if mode == Mode::System {
                self.$reg[0] = val;
            } else {
                self.$reg[mode as usize] = val;
            }
        }
    };
}

/// A register with values for FIQ and all other modes
#[derive(Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FiqReg {
    pub reg: u32,
    pub fiq: u32,
}

/// A register with different values for the different CPU modes
pub type ModeReg = [u32; 6];

/// The register file, status registers and pipeline state of the CPU,
/// separate from the bus it is attached to.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CpuState {
    // Registers
    pub registers: [u32; 16],
    fiqs: [FiqReg; 5],
    sp: ModeReg,
    lr: ModeReg,
    pub(crate) cpsr: u32,
    spsr: ModeReg,

    // Pipeline + Memory
    pipeline: [u32; 2],
    pipeline_valid: bool,
    pub access_type: Access,

    // Interrupt control
    pub intr: InterruptController,
    pub is_halted: bool,
}

impl CpuState {
    #[inline]
    pub fn sp(&self) -> u32 {
        self.registers[13]
    }

    #[inline]
    pub fn lr(&self) -> u32 {
        self.registers[14]
    }

    #[inline]
    pub fn pc(&self) -> u32 {
        self.registers[15]
    }

    #[inline]
    pub fn set_sp(&mut self, value: u32) {
        self.registers[13] = value;
    }

    #[inline]
    pub fn set_lr(&mut self, value: u32) {
        self.registers[14] = value;
    }

    #[inline]
    pub fn cpsr(&self) -> u32 {
        self.cpsr
    }

    /// Get the 'adjusted' value of the PC that some THUMB instructions need.
    #[inline]
    pub fn adj_pc(&self) -> u32 {
        self.registers[15] & !2
    }

    #[inline]
    pub(crate) fn bump_pc(&mut self, count: u32) -> u32 {
        self.registers[15] = self.registers[15].wrapping_add(count);
        self.registers[15]
    }

    mode_reg!(sp, cpsr_sp, set_cpsr_sp);
    mode_reg!(lr, cpsr_lr, set_cpsr_lr);
    mode_reg!(spsr, spsr, set_spsr);

    #[inline]
    pub fn reg(&self, idx: u32) -> u32 {
        self.registers[idx.us()]
    }

    #[inline]
    pub fn low(&self, idx: u16) -> u32 {
        self.registers[idx.us()]
    }

    /// Get a register's value for the next instruction (PC will be +4)
    pub fn reg_pc4(&self, idx: u32) -> u32 {
        let mut regs = self.registers;
        regs[15] += 4;
        regs[idx.us()]
    }

    /// Set the PC. Needs special behavior to fake the pipeline.
    pub fn set_pc(&mut self, bus: &mut impl Bus, val: u32) {
        // Align to 2/4 depending on mode
        self.registers[15] = val & (!(self.current_instruction_size() - 1));
        self.pipeline_stall(bus);
    }

    #[inline]
    pub fn is_flag(&self, flag: Flag) -> bool {
        self.cpsr.is_bit(flag as u16)
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag, en: bool) {
        self.cpsr = self.cpsr.set_bit(flag as u16, en);
    }

    /// Get the current CPU mode.
    pub fn mode(&self) -> Mode {
        Mode::get(self.cpsr & 0x1F)
    }

    /// Set the mode bits inside CPSR.
    pub fn set_mode(&mut self, ctx: Mode) {
        self.set_cpsr((self.cpsr & !0x1F) | ctx.to_u32());
    }

    /// Get a banked register of the current mode, without it being
    /// swapped in. Used by LDM/STM with user bank transfer.
    pub(crate) fn get_cpsr_reg(&self, idx: u32) -> u32 {
        match idx {
            8..=12 if self.mode() == Mode::Fiq => self.fiqs[(idx - 8).us()].fiq,
            8..=12 => self.fiqs[(idx - 8).us()].reg,
            13 => self.cpsr_sp(),
            14 => self.cpsr_lr(),
            _ => panic!("invalid reg"),
        }
    }

    pub(crate) fn set_cpsr_reg(&mut self, idx: u32, val: u32) {
        match idx {
            8..=12 if self.mode() == Mode::Fiq => self.fiqs[(idx - 8).us()].fiq = val,
            8..=12 => self.fiqs[(idx - 8).us()].reg = val,
            13 => self.set_cpsr_sp(val),
            14 => self.set_cpsr_lr(val),
            _ => panic!("invalid reg"),
        }
    }

    /// Set the CPSR. Needs to consider mode switches, in which case
    /// the current registers need to be copied to their bank and the
    /// new mode's registers swapped in.
    pub fn set_cpsr(&mut self, value: u32) {
        for reg in 8..15 {
            self.set_cpsr_reg(reg, self.registers[reg.us()]);
        }
        self.cpsr = value;
        for reg in 8..15 {
            self.registers[reg.us()] = self.get_cpsr_reg(reg);
        }
    }

    /// Set the CPSR without considering mode switches. Only used when
    /// the new value is known to not change the mode bits.
    pub(crate) fn set_cpsr_flags(&mut self, value: u32) {
        self.cpsr = value;
    }

    /// Evaluate a condition encoded into an instruction.
    pub fn eval_condition(&self, cond: u16) -> bool {
        // This condition table is taken from mGBA sources, which are licensed under
        // MPL2 at https://github.com/mgba-emu/mgba
        // Thank you to endrift and other mGBA contributors!
        const COND_MASKS: [u16; 16] = [
            0xF0F0, // EQ [-Z--]
            0x0F0F, // NE [-z--]
            0xCCCC, // CS [--C-]
            0x3333, // CC [--c-]
            0xFF00, // MI [N---]
            0x00FF, // PL [n---]
            0xAAAA, // VS [---V]
            0x5555, // VC [---v]
            0x0C0C, // HI [-zC-]
            0xF3F3, // LS [-Z--] || [--c-]
            0xAA55, // GE [N--V] || [n--v]
            0x55AA, // LT [N--v] || [n--V]
            0x0A05, // GT [Nz-V] || [nz-v]
            0xF5FA, // LE [-Z--] || [Nz-v] || [nz-V]
            0xFFFF, // AL [----]
            0x0000, // NV
        ];

        let flags = self.cpsr >> 28;
        (COND_MASKS[cond.us()] & (1 << flags)) != 0
    }

    #[inline]
    pub fn current_instruction_size(&self) -> u32 {
        // 4 on ARM, 2 on THUMB
        4 - ((self.is_flag(Flag::Thumb) as u32) << 1)
    }
}

impl CpuState {
    pub(crate) fn invalidate_pipeline(&mut self) {
        self.pipeline_valid = false;
    }

    pub(crate) fn advance_pipeline(&mut self, next: u32) -> u32 {
        let inst = self.pipeline[0];
        self.pipeline[0] = self.pipeline[1];
        self.pipeline[1] = next;
        self.access_type = Access::Seq;
        inst
    }

    /// Update the pipeline to be valid again, without wait states or actual
    /// reads
    pub(crate) fn revalidate_pipeline(&mut self, bus: &mut impl Bus) {
        if self.pipeline_valid {
            return;
        }
        self.pipeline = if self.is_flag(Flag::Thumb) {
            [
                bus.get::<u16>(self, self.pc().wrapping_sub(2)).u32(),
                bus.get::<u16>(self, self.pc()).u32(),
            ]
        } else {
            [
                bus.get::<u32>(self, self.pc().wrapping_sub(4)),
                bus.get::<u32>(self, self.pc()),
            ]
        };
        self.pipeline_valid = true;
    }

    /// Emulate a pipeline stall / fill; used when PC changes.
    /// Charges one non-sequential and one sequential code fetch
    /// at the new location.
    pub(crate) fn pipeline_stall(&mut self, bus: &mut impl Bus) {
        bus.pipeline_stalled(self);
        if self.is_flag(Flag::Thumb) {
            let time = bus.wait_time::<u16>(self, self.pc(), Access::NonSeq);
            bus.tick(time as u64);
            self.bump_pc(2);
            let time = bus.wait_time::<u16>(self, self.pc(), Access::Seq);
            bus.tick(time as u64);
        } else {
            let time = bus.wait_time::<u32>(self, self.pc(), Access::NonSeq);
            bus.tick(time as u64);
            self.bump_pc(4);
            let time = bus.wait_time::<u32>(self, self.pc(), Access::Seq);
            bus.tick(time as u64);
        };
        self.invalidate_pipeline();
        self.access_type = Access::Seq;
    }
}

impl Default for CpuState {
    fn default() -> Self {
        Self {
            registers: [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 4],
            fiqs: Default::default(),
            sp: [0x0300_7F00, 0x0, 0x0300_7FE0, 0x0, 0x0300_7FA0, 0x0],
            lr: Default::default(),
            cpsr: 0xD3,
            spsr: Default::default(),
            pipeline: Default::default(),
            pipeline_valid: Default::default(),
            access_type: Default::default(),
            intr: Default::default(),
            is_halted: Default::default(),
        }
    }
}

impl<S: Bus> Cpu<S> {
    /// Set the PC. Needs special behavior to fake the pipeline.
    #[inline]
    pub fn set_pc(&mut self, val: u32) {
        self.state.set_pc(&mut self.bus, val);
    }

    pub(crate) fn set_reg(&mut self, idx: u32, val: u32) {
        if idx == 15 {
            self.set_pc(val);
        } else {
            self.state.registers[idx.us()] = val;
        }
    }
}

/// Execution context of the CPU.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Mode {
    User,
    Fiq,
    Supervisor,
    Abort,
    Irq,
    Undefined,
    System,
}

impl Mode {
    #[bitmatch]
    pub fn get(n: u32) -> Self {
        #[bitmatch]
        match n {
            "0??00" => Self::User,
            "0??01" => Self::Fiq,
            "0??10" => Self::Irq,
            "0??11" => Self::Supervisor,
            "10000" => Self::User,
            "10001" => Self::Fiq,
            "10010" => Self::Irq,
            "10011" => Self::Supervisor,
            "10111" => Self::Abort,
            "11011" => Self::Undefined,
            "11111" => Self::System,
            _ => panic!("invalid mode bits"),
        }
    }

    pub fn to_u32(self) -> u32 {
        match self {
            Self::User => 0b10000,
            Self::Fiq => 0b10001,
            Self::Irq => 0b10010,
            Self::Supervisor => 0b10011,
            Self::Abort => 0b10111,
            Self::Undefined => 0b11011,
            Self::System => 0b11111,
        }
    }
}

/// Flags inside CPSR.
#[derive(Copy, Clone)]
pub enum Flag {
    Neg = 31,
    Zero = 30,
    Carry = 29,
    Overflow = 28,
    IrqDisable = 7,
    FiqDisable = 6,
    Thumb = 5,
}

impl Flag {
    pub fn mask(self) -> u16 {
        1 << self as u16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trip() {
        for mode in [
            Mode::User,
            Mode::Fiq,
            Mode::Irq,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Undefined,
            Mode::System,
        ] {
            assert_eq!(Mode::get(mode.to_u32()), mode);
        }
        // Legacy 26-bit encodings map to the same modes.
        assert_eq!(Mode::get(0b00001), Mode::Fiq);
        assert_eq!(Mode::get(0b00010), Mode::Irq);
    }

    #[test]
    fn banked_registers_swap_on_mode_change() {
        let mut cpu = CpuState::default();
        cpu.set_mode(Mode::System);
        cpu.registers[13] = 0x100;
        cpu.registers[14] = 0x200;

        cpu.set_mode(Mode::Irq);
        cpu.registers[13] = 0x300;
        cpu.registers[14] = 0x400;

        cpu.set_mode(Mode::System);
        assert_eq!(cpu.registers[13], 0x100);
        assert_eq!(cpu.registers[14], 0x200);

        cpu.set_mode(Mode::Irq);
        assert_eq!(cpu.registers[13], 0x300);
        assert_eq!(cpu.registers[14], 0x400);
    }

    #[test]
    fn user_and_system_share_bank() {
        let mut cpu = CpuState::default();
        cpu.set_mode(Mode::System);
        cpu.registers[13] = 0xCAFE;
        cpu.set_mode(Mode::User);
        assert_eq!(cpu.registers[13], 0xCAFE);
    }

    #[test]
    fn fiq_banks_r8_to_r12() {
        let mut cpu = CpuState::default();
        cpu.set_mode(Mode::System);
        for r in 8..13 {
            cpu.registers[r] = r as u32;
        }
        cpu.set_mode(Mode::Fiq);
        for r in 8..13 {
            cpu.registers[r] = 0xF00 + r as u32;
        }
        cpu.set_mode(Mode::Irq);
        // IRQ only banks r13/r14, r8-r12 come from the shared bank.
        for r in 8..13 {
            assert_eq!(cpu.registers[r], r as u32);
        }
        cpu.set_mode(Mode::Fiq);
        for r in 8..13 {
            assert_eq!(cpu.registers[r], 0xF00 + r as u32);
        }
    }

    #[test]
    fn spsr_is_banked_per_mode() {
        let mut cpu = CpuState::default();
        cpu.set_mode(Mode::Irq);
        cpu.set_spsr(0x1F);
        cpu.set_mode(Mode::Supervisor);
        cpu.set_spsr(0x92);
        assert_eq!(cpu.spsr(), 0x92);
        cpu.set_mode(Mode::Irq);
        assert_eq!(cpu.spsr(), 0x1F);
    }

    #[test]
    fn condition_codes() {
        let mut cpu = CpuState::default();
        cpu.set_flag(Flag::Zero, true);
        assert!(cpu.eval_condition(0x0)); // EQ
        assert!(!cpu.eval_condition(0x1)); // NE
        assert!(cpu.eval_condition(0xE)); // AL
        assert!(!cpu.eval_condition(0xF)); // NV

        cpu.set_flag(Flag::Zero, false);
        cpu.set_flag(Flag::Neg, true);
        cpu.set_flag(Flag::Overflow, false);
        assert!(cpu.eval_condition(0xB)); // LT
        assert!(!cpu.eval_condition(0xA)); // GE
        assert!(cpu.eval_condition(0xD)); // LE
    }
}
