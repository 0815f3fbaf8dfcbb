// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Display phase timing. Only the HBlank/VBlank/VCount cadence with its
//! DISPSTAT/VCOUNT registers and interrupts is emulated; there is no
//! pixel rendering of any kind.

use arm7tdmi::{state::CpuState, Interrupt};
use common::TimeS;
use modular_bitfield::{bitfield, specifiers::*};

use crate::{scheduling::AgbEvent, AgbBus};

/// Lines of the visible frame; VBlank starts here.
const VISIBLE_LINES: u16 = 160;
/// Total lines of a frame, including VBlank.
const FRAME_LINES: u16 = 228;

#[bitfield]
#[repr(u16)]
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DisplayStatus {
    pub in_vblank: bool,
    pub in_hblank: bool,
    pub vcount_match: bool,
    pub vblank_irq: bool,
    pub hblank_irq: bool,
    pub vcount_irq: bool,
    #[skip]
    __: B2,
    pub vcount_compare: B8,
}

#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Display {
    pub stat: DisplayStatus,
    pub vcount: u16,
}

/// Events the display generates.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DisplayEvent {
    /// Start of HBlank.
    HblankStart,
    /// Set HBlank flag in DISPSTAT (this is delayed by 46 cycles)
    SetHblank,
    /// End of HBlank, which is the start of the next scanline.
    HblankEnd,
}

impl Display {
    pub fn handle_event(bus: &mut AgbBus, cpu: &mut CpuState, event: DisplayEvent, late_by: TimeS) {
        let (next_event, cycles) = match event {
            DisplayEvent::HblankStart => {
                if bus.display.stat.hblank_irq() {
                    cpu.request_interrupt(Interrupt::HBlank);
                }
                (DisplayEvent::SetHblank, 46)
            }

            DisplayEvent::SetHblank => {
                bus.display.stat.set_in_hblank(true);
                (DisplayEvent::HblankEnd, 226)
            }

            DisplayEvent::HblankEnd => {
                bus.display.vcount += 1;

                if bus.display.vcount == bus.display.stat.vcount_compare().into() {
                    bus.display.stat.set_vcount_match(true);
                    if bus.display.stat.vcount_irq() {
                        cpu.request_interrupt(Interrupt::VCounter);
                    }
                } else {
                    bus.display.stat.set_vcount_match(false);
                }

                match bus.display.vcount {
                    VISIBLE_LINES => {
                        bus.display.stat.set_in_vblank(true);
                        if bus.display.stat.vblank_irq() {
                            cpu.request_interrupt(Interrupt::VBlank);
                        }
                    }
                    // VBlank flag gets cleared one scanline early
                    l if l == FRAME_LINES - 1 => bus.display.stat.set_in_vblank(false),
                    FRAME_LINES => bus.display.vcount = 0,
                    _ => (),
                }

                bus.display.stat.set_in_hblank(false);
                (DisplayEvent::HblankStart, 960)
            }
        };
        bus.scheduler
            .schedule(AgbEvent::DisplayEvent(next_event), (cycles - late_by).max(0));
    }
}
