// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arrayvec::ArrayVec;

/// Monotonic scheduler time, in master clock cycles.
pub type Time = u64;
/// Signed time, used for lateness and deltas.
pub type TimeS = i64;

/// A scheduler used by the emulation cores to drive peripherals.
/// It is generic over the possible events and keeps a sorted list
/// combined with a monotonic u64 timer.
///
/// Events at the same time fire in `Ord` order of their kind,
/// regardless of insertion order.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Scheduler<E: Kind> {
    /// Current time of the scheduler.
    time: Time,
    /// Time of the next event.
    next: Time,
    /// Events currently awaiting execution, sorted so that the
    /// soonest event is last.
    #[cfg_attr(feature = "serde", serde(bound = ""))]
    events: ArrayVec<ScheduledEvent<E>, 16>,
}

impl<E: Kind> Scheduler<E> {
    /// Schedule an event of the given kind after the given amount
    /// of cycles have elapsed from now.
    #[inline]
    pub fn schedule(&mut self, kind: E, after: TimeS) {
        assert!(after >= 0, "scheduled an event in the past");
        let time = self.time + after as Time;
        let event = ScheduledEvent {
            kind,
            execute_at: time,
            queued_at: self.time,
        };
        self.events.push(event);

        // Ensure the event list is still sorted
        // (Swap the new element further back until it is in the right spot)
        for idx in (1..self.events.len()).rev() {
            let other = self.events[idx - 1];
            if (time, kind) > (other.execute_at, other.kind) {
                self.events[idx] = other;
            } else {
                self.events[idx] = event;
                self.next = self.events.last().unwrap().execute_at;
                return;
            }
        }
        // The loop exited without finding a bigger element, this new one is the biggest
        self.events[0] = event;
        self.next = self.events.last().unwrap().execute_at;
    }

    /// Advance the timer by the given amount of ticks.
    #[inline]
    pub fn advance(&mut self, by: Time) {
        self.time += by;
    }

    /// Pop the next pending event, if any. An event is pending once
    /// current time has reached its execution time; `late_by` is the
    /// amount it overshot by.
    #[inline]
    pub fn get_next_pending(&mut self) -> Option<Event<E>> {
        if self.next <= self.time {
            let idx = self.events.len() - 1;
            let event = self.events[idx];
            self.events.truncate(idx);
            self.next = self.events.last().map_or(Time::MAX, |e| e.execute_at);
            Some(Event {
                kind: event.kind,
                late_by: (self.time - event.execute_at) as TimeS,
            })
        } else {
            None
        }
    }

    /// Is at least one event pending?
    #[inline]
    pub fn has_events(&self) -> bool {
        self.next <= self.time
    }

    /// Return the next event immediately, and set the current time to
    /// the event's execution time. This is useful during HALT or similar
    /// states.
    ///
    /// Assumes at least one event is scheduled.
    pub fn pop(&mut self) -> Event<E> {
        let event = self.events.pop().unwrap();
        self.time = event.execute_at;
        self.next = self.events.last().map_or(Time::MAX, |e| e.execute_at);
        Event {
            kind: event.kind,
            late_by: 0,
        }
    }

    /// Cancel the single scheduled event of the given kind, if any.
    /// Returns whether an event was actually removed; cancelling a
    /// kind that is not scheduled does nothing.
    pub fn cancel_single(&mut self, kind: E) -> bool {
        let Some(idx) = self.events.iter().position(|e| e.kind == kind) else {
            return false;
        };
        self.events.remove(idx);
        self.next = self.events.last().map_or(Time::MAX, |e| e.execute_at);
        true
    }

    /// Is an event of the given kind currently scheduled?
    pub fn is_scheduled(&self, kind: E) -> bool {
        self.events.iter().any(|e| e.kind == kind)
    }

    /// Cycles until the given event fires, if it is scheduled.
    pub fn remaining(&self, kind: E) -> Option<Time> {
        self.find(kind).map(|e| e.execute_at.saturating_sub(self.time))
    }

    /// Cycles since the given event was scheduled, if it is scheduled.
    pub fn elapsed(&self, kind: E) -> Option<Time> {
        self.find(kind).map(|e| self.time - e.queued_at)
    }

    /// Total scheduled length of the given event, if it is scheduled.
    pub fn event_length(&self, kind: E) -> Option<Time> {
        self.find(kind).map(|e| e.execute_at - e.queued_at)
    }

    /// Current time of the scheduler.
    #[inline]
    pub fn now(&self) -> Time {
        self.time
    }

    fn find(&self, kind: E) -> Option<&ScheduledEvent<E>> {
        self.events.iter().find(|e| e.kind == kind)
    }
}

impl<E: Kind> Default for Scheduler<E> {
    fn default() -> Self {
        Self {
            time: 0,
            next: Time::MAX,
            events: ArrayVec::new(),
        }
    }
}

/// An event awaiting execution
#[derive(Copy, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
struct ScheduledEvent<E: Kind> {
    /// Kind of event to execute
    #[cfg_attr(feature = "serde", serde(bound = ""))]
    kind: E,
    /// Time of the scheduler to execute it at
    execute_at: Time,
    /// Time the event was scheduled at
    queued_at: Time,
}

/// Trait for event kinds. `Ord` doubles as the same-cycle firing
/// priority, lowest first.
#[cfg(feature = "serde")]
pub trait Kind:
    for<'de> serde::Deserialize<'de> + serde::Serialize + Eq + Ord + Copy + Clone
{
}
#[cfg(not(feature = "serde"))]
pub trait Kind: Eq + Ord + Copy + Clone {}

/// Event that is ready to be handled.
#[derive(Copy, Clone)]
pub struct Event<E: Kind> {
    /// The kind of event to handle
    pub kind: E,
    /// By how many ticks the event was delayed by. For example:
    /// - Event was scheduled to be executed at tick 1000
    /// - Scheduler ran until 1010 before the event got handled
    /// - `late_by` will be 1010 - 1000 = 10.
    pub late_by: TimeS,
}
