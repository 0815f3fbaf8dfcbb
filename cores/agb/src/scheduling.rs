// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arm7tdmi::state::CpuState;
use common::{components::scheduler::Kind, TimeS};

use crate::{
    display::{Display, DisplayEvent},
    timer::Timers,
    AgbBus,
};

/// All scheduler events of the system. The derived `Ord` doubles as the
/// same-cycle firing priority; display phases win ties against timers.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum AgbEvent {
    /// An event handled by the display timing.
    DisplayEvent(DisplayEvent),
    /// A timer overflow.
    TimerOverflow(u8),
}

impl AgbEvent {
    /// Handle the event by delegating to the appropriate handler.
    pub fn dispatch(self, bus: &mut AgbBus, cpu: &mut CpuState, late_by: TimeS) {
        match self {
            Self::DisplayEvent(evt) => Display::handle_event(bus, cpu, evt, late_by),
            Self::TimerOverflow(idx) => Timers::handle_overflow_event(bus, cpu, idx, late_by),
        }
    }
}

impl Kind for AgbEvent {}
