// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use common::numutil::NumExt;

use crate::{
    interface::Bus,
    state::{
        CpuState,
        Flag::{FiqDisable, IrqDisable, Thumb},
        Mode,
    },
    Cpu,
};

impl CpuState {
    /// An exception occurred, jump to the bootrom handler and deal with it.
    pub(crate) fn exception_occurred<S: Bus>(&mut self, bus: &mut S, kind: Exception) {
        bus.exception_happened(self, kind);
        if self.is_flag(Thumb) {
            self.bump_pc(2);
        }

        let cpsr = self.cpsr();
        self.set_mode(kind.mode());

        self.set_flag(Thumb, false);
        self.set_flag(IrqDisable, true);
        if let Exception::Reset | Exception::Fiq = kind {
            self.set_flag(FiqDisable, true);
        }

        let lr = self.pc().wrapping_sub(self.current_instruction_size());
        self.set_lr(lr);
        self.set_spsr(cpsr);
        self.set_pc(bus, kind.vector());
    }

    /// Request an interrupt and wake the CPU if it is halted.
    /// It is serviced once the instruction in flight has finished.
    pub fn request_interrupt(&mut self, int: Interrupt) {
        self.request_interrupt_with_index(int as u16);
    }

    /// Request an interrupt by index.
    pub fn request_interrupt_with_index(&mut self, idx: u16) {
        self.intr.if_ = self.intr.if_.set_bit(idx, true);
        self.check_unsuspend();
    }

    fn is_interrupt_pending(&self) -> bool {
        self.intr.ime && !self.is_flag(IrqDisable) && (self.intr.ie & self.intr.if_) != 0
    }

    /// Check if an interrupt needs to be handled and jump to the handler if so.
    /// Only called at instruction boundaries; an MMIO write that unmasks a
    /// pending interrupt takes effect after its instruction, never during it.
    pub fn check_if_interrupt(&mut self, bus: &mut impl Bus) {
        if self.is_interrupt_pending() {
            self.bump_pc(4);
            self.exception_occurred(bus, Exception::Irq);
        }
    }

    /// Halt the CPU until an interrupt is requested.
    pub fn halt_on_irq(&mut self) {
        self.is_halted = true;
    }

    /// Wake the CPU back up if a requested interrupt is enabled.
    /// Note that this ignores IME; a masked interrupt still ends
    /// the halt, it just does not get serviced.
    pub fn check_unsuspend(&mut self) {
        self.is_halted = self.is_halted && (self.intr.ie & self.intr.if_) == 0;
    }
}

impl<S: Bus> Cpu<S> {
    /// Request an interrupt. Serviced at the next instruction boundary.
    pub fn request_interrupt(&mut self, int: Interrupt) {
        self.state.request_interrupt(int);
    }

    pub fn exception_occurred(&mut self, kind: Exception) {
        self.state.exception_occurred(&mut self.bus, kind);
    }
}

/// Possible interrupts, with their bit index in IE/IF.
#[repr(C)]
#[derive(Copy, Clone)]
pub enum Interrupt {
    VBlank,
    HBlank,
    VCounter,
    Timer0,
    Timer1,
    Timer2,
    Timer3,
    Serial,
    Dma0,
    Dma1,
    Dma2,
    Dma3,
    Joypad,
    GamePak,
}

/// Possible exceptions.
/// Most are only listed to preserve vector order, only SWI, UND
/// and IRQ ever get raised on this system.
#[derive(Debug, Copy, Clone)]
pub enum Exception {
    Reset,
    Undefined,
    Swi,
    PrefetchAbort,
    DataAbort,
    AddressExceeded,
    Irq,
    Fiq,
}

impl Exception {
    /// Vector to set the PC to when this exception occurs.
    fn vector(self) -> u32 {
        self as u32 * 4
    }

    /// Mode to execute the exception in.
    fn mode(self) -> Mode {
        const MODE: [Mode; 8] = [
            Mode::Supervisor,
            Mode::Undefined,
            Mode::Supervisor,
            Mode::Abort,
            Mode::Abort,
            Mode::Supervisor,
            Mode::Irq,
            Mode::Fiq,
        ];
        MODE[self as usize]
    }
}

/// The IME, IE and IF registers of the interrupt controller.
#[derive(Clone, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct InterruptController {
    pub ime: bool,
    pub ie: u32,
    pub if_: u32,
}
