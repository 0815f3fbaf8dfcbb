// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arm7tdmi::{state::CpuState, Interrupt};
use common::{numutil::NumExt, Time, TimeS};
use modular_bitfield::{bitfield, specifiers::*};

use crate::{scheduling::AgbEvent, AgbBus};

pub const DIVS: [u16; 4] = [1, 64, 256, 1024];

#[bitfield]
#[repr(u16)]
#[derive(Default, Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct TimerCtrl {
    pub prescaler: B2,
    pub count_up: bool,
    #[skip]
    __: B3,
    pub irq_en: bool,
    pub enable: bool,
    #[skip]
    __: B8,
}

/// The 4 timers.
/// They run on the scheduler when in regular counting mode;
/// cascading timers tick on the previous timer's overflow instead.
#[derive(Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Timers {
    // Registers
    pub reload: [u16; 4],
    pub control: [TimerCtrl; 4],

    /// Counter value. Used for cascading counters; for scheduled counters this
    /// will be the reload value (actual counter is calculated on read)
    counters: [u16; 4],
    /// The time the timer was scheduled, if it is on the scheduler.
    scheduled_at: [Time; 4],
}

impl Timers {
    /// Handle overflow of a scheduled timer.
    pub fn handle_overflow_event(bus: &mut AgbBus, cpu: &mut CpuState, idx: u8, late_by: TimeS) {
        let until_ov = Self::overflow(bus, cpu, idx) as TimeS;
        // Reschedule event
        // Edge case: with high reload and fast timers, sometimes (late_by > until_ov).
        // In this case, we simply schedule the next overflow event to be immediately.
        bus.timers.scheduled_at[idx.us()] = bus.scheduler.now() - late_by as Time + 2;
        bus.scheduler
            .schedule(AgbEvent::TimerOverflow(idx), (until_ov - late_by).max(0));
    }

    /// Read current time of the given timer. Might be a bit expensive, since
    /// time needs to be calculated for timers on the scheduler.
    pub fn time_read<const TIM: usize>(bus: &AgbBus) -> u16 {
        let ctrl = bus.timers.control[TIM];
        let is_scheduled = ctrl.enable() && (TIM == 0 || !ctrl.count_up());

        if is_scheduled {
            // Is on scheduler, calculate current value
            let scaler = DIVS[ctrl.prescaler().us()] as Time;
            let elapsed = bus.scheduler.now() - (bus.timers.scheduled_at[TIM] - 2);
            bus.timers.counters[TIM].wrapping_add((elapsed / scaler).u16())
        } else {
            // Either off or inc on overflow, just return current counter
            bus.timers.counters[TIM]
        }
    }

    /// Handle CTRL write by scheduling timer as appropriate.
    pub fn hi_write<const TIM: usize>(bus: &mut AgbBus, new_ctrl: u16) {
        // Update current counter value first
        bus.timers.counters[TIM] = Self::time_read::<TIM>(bus);

        let old_ctrl = bus.timers.control[TIM];
        let new_ctrl: TimerCtrl = new_ctrl.into();
        let was_scheduled = old_ctrl.enable() && (TIM == 0 || !old_ctrl.count_up());
        let is_scheduled = new_ctrl.enable() && (TIM == 0 || !new_ctrl.count_up());

        if was_scheduled {
            // Need to cancel current scheduled event
            bus.scheduler.cancel_single(AgbEvent::TimerOverflow(TIM.u8()));
        }
        if is_scheduled {
            if !was_scheduled {
                // Reload counter.
                bus.timers.counters[TIM] = bus.timers.reload[TIM];
            }

            // Need to start scheduling this timer
            let until_ov = Self::next_overflow_time(bus.timers.counters[TIM], new_ctrl);
            bus.timers.scheduled_at[TIM] = bus.scheduler.now() + 2;
            bus.scheduler
                .schedule(AgbEvent::TimerOverflow(TIM.u8()), until_ov as TimeS);
        }

        bus.timers.control[TIM] = new_ctrl;
    }

    /// Handle an overflow and return time until next.
    fn overflow(bus: &mut AgbBus, cpu: &mut CpuState, idx: u8) -> u32 {
        let ctrl = bus.timers.control[idx.us()];
        // Set to reload value
        bus.timers.counters[idx.us()] = bus.timers.reload[idx.us()];
        // Fire IRQ if enabled
        if ctrl.irq_en() {
            cpu.request_interrupt_with_index(Interrupt::Timer0 as u16 + idx.u16());
        }

        if idx != 3 && bus.timers.control[idx.us() + 1].count_up() {
            // Next timer is set to inc when we overflow.
            Self::inc_timer(bus, cpu, idx.us() + 1);
        }

        Self::next_overflow_time(bus.timers.reload[idx.us()], ctrl)
    }

    /// Time until next overflow, for scheduling.
    fn next_overflow_time(reload: u16, ctrl: TimerCtrl) -> u32 {
        let scaler = DIVS[ctrl.prescaler().us()].u32();
        (scaler * (0x1_0000 - reload.u32())) + 6
    }

    /// Increment a timer. Used for cascading timers.
    #[inline]
    fn inc_timer(bus: &mut AgbBus, cpu: &mut CpuState, idx: usize) {
        let new = bus.timers.counters[idx].checked_add(1);
        match new {
            Some(val) => bus.timers.counters[idx] = val,
            None => {
                Self::overflow(bus, cpu, idx.u8());
            }
        }
    }
}
