// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Input handler.
//! Only the register surface; mapping host input to buttons is the
//! frontend's job.

use arm7tdmi::{state::CpuState, Interrupt};
use common::numutil::NumExt;
use modular_bitfield::{bitfield, specifiers::B14};

use crate::AgbBus;

#[bitfield]
#[repr(u16)]
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct KeyControl {
    pub irq_enables: B14,
    pub global_irq: bool,
    pub irq_is_and: bool,
}

/// Buttons, with their bit index in KEYINPUT.
#[derive(Debug, Copy, Clone)]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
    R,
    L,
}

#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Keypad {
    pub cnt: KeyControl,
    pressed: u16,
}

impl Keypad {
    /// Value of KEYINPUT; input is active low.
    pub fn keyinput(&self) -> u16 {
        0x3FF ^ self.pressed
    }

    pub fn set_button(&mut self, button: Button, down: bool) {
        self.pressed = self.pressed.set_bit(button as u16, down);
    }
}

impl AgbBus {
    /// Check if KEYCNT should cause a joypad IRQ.
    pub fn check_keycnt(&mut self, cpu: &mut CpuState) {
        // The IRQ condition works on pressed keys, not the active-low register
        let input = self.keypad.pressed;
        let cnt = self.keypad.cnt;
        if cnt.global_irq() {
            let cond = cnt.irq_enables();
            let fire = if !cnt.irq_is_and() {
                cond & input != 0
            } else {
                cond & input == cond
            };
            if fire {
                cpu.request_interrupt(Interrupt::Joypad);
            }
        }
    }
}
