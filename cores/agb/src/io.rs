// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! MMIO register dispatch. Peripherals own a small window inside the
//! `match` here; everything else is open bus / ignored.

use arm7tdmi::state::CpuState;
use common::numutil::{NumExt, U32Ext};

use crate::{addr::*, timer::Timers, AgbBus};

impl AgbBus {
    pub(crate) fn get_mmio(&self, cpu: &CpuState, addr: u32) -> u16 {
        let a = addr & 0x3FF;
        match a {
            // Display
            DISPSTAT => self.display.stat.into(),
            VCOUNT => self.display.vcount,

            // Timers
            TM0CNT_L => Timers::time_read::<0>(self),
            TM1CNT_L => Timers::time_read::<1>(self),
            TM2CNT_L => Timers::time_read::<2>(self),
            TM3CNT_L => Timers::time_read::<3>(self),
            TM0CNT_H => self.timers.control[0].into(),
            TM1CNT_H => self.timers.control[1].into(),
            TM2CNT_H => self.timers.control[2].into(),
            TM3CNT_H => self.timers.control[3].into(),

            // Keyinput
            KEYINPUT => self.keypad.keyinput(),
            KEYCNT => self.keypad.cnt.into(),

            // Interrupt control
            IME => cpu.intr.ime as u16,
            IE => cpu.intr.ie.low(),
            IF => cpu.intr.if_.low(),
            WAITCNT => self.memory.waitcnt,

            // Known 0 registers
            0x136 | 0x142 | 0x15A | 0x206 | 0x20A | POSTFLG | 0x302 => 0,

            _ => {
                log::debug!("Read from unmapped IO register 0x{a:03X}, returning open bus");
                self.invalid_read::<false>(cpu, addr).u16()
            }
        }
    }

    pub(crate) fn set_mmio(&mut self, cpu: &mut CpuState, addr: u32, value: u16) {
        let a = addr & 0x3FF;
        match a {
            // Interrupt control. A write that unmasks a pending interrupt
            // is picked up at the next instruction boundary
            IME => cpu.intr.ime = value.is_bit(0),
            IE => cpu.intr.ie = value.u32(),
            IF => {
                cpu.intr.if_ &= !(value.u32());
                // We assume that acknowledging the interrupt is the last thing the handler
                // does, and set the BIOS read value to the post-interrupt
                // state. Not entirely accurate...
                if self.memory.bios_value == 0xE25E_F004 {
                    self.memory.bios_value = 0xE55E_C002;
                }
            }
            WAITCNT => {
                let prev = self.memory.waitcnt;
                self.memory.waitcnt = value;
                // Only update things as needed
                if value.bits(0, 11) != prev.bits(0, 11) {
                    self.update_wait_times();
                }
            }

            // Display; the low 3 bits of DISPSTAT are read-only
            DISPSTAT => {
                let stat: u16 = self.display.stat.into();
                self.display.stat = ((value & !7) | (stat & 7)).into();
            }

            // Timers
            TM0CNT_L => self.timers.reload[0] = value,
            TM1CNT_L => self.timers.reload[1] = value,
            TM2CNT_L => self.timers.reload[2] = value,
            TM3CNT_L => self.timers.reload[3] = value,
            TM0CNT_H => Timers::hi_write::<0>(self, value),
            TM1CNT_H => Timers::hi_write::<1>(self, value),
            TM2CNT_H => Timers::hi_write::<2>(self, value),
            TM3CNT_H => Timers::hi_write::<3>(self, value),

            // Joypad control
            KEYCNT => {
                self.keypad.cnt = value.into();
                self.check_keycnt(cpu);
            }

            // RO registers, or otherwise invalid
            KEYINPUT | VCOUNT | 0x136 | 0x15A | 0x206 | 0x300 | 0x302 => {
                log::debug!(
                    "Write to read-only IO register 0x{a:03X} (value {value:04X}), ignoring"
                );
            }

            _ => {
                log::warn!("Write to unknown IO register 0x{a:03X} (value {value:04X}), ignoring");
            }
        }
    }
}
