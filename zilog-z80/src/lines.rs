//! External line and clock-source plumbing.
//!
//! Peer devices change CPU input lines by name, stamped with a simulated
//! access time. Changes are not applied immediately: they are queued under
//! a mutex and drained by the instruction engine at step boundaries, so
//! the engine always sees line activity as atomic events in time order no
//! matter which wall-clock thread submitted them.

use std::fmt;

/// External input lines of the Z80.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineId {
    /// Active reset input. Level-sensitive.
    Reset,
    /// Bus request: while asserted the CPU releases the bus and stalls.
    BusReq,
    /// Maskable interrupt request. Level-sensitive while IFF1 is set.
    Int,
    /// Non-maskable interrupt. Edge-triggered on the false-to-true
    /// transition.
    Nmi,
}

impl LineId {
    /// Look up a line by its schematic name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RESET" => Some(Self::Reset),
            "BUSREQ" => Some(Self::BusReq),
            "INT" => Some(Self::Int),
            "NMI" => Some(Self::Nmi),
            _ => None,
        }
    }

    /// The schematic name of this line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Reset => "RESET",
            Self::BusReq => "BUSREQ",
            Self::Int => "INT",
            Self::Nmi => "NMI",
        }
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Clock inputs of the Z80. There is exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockId {
    /// The CPU clock; its rate fixes the nanoseconds-per-T-state ratio.
    Clk,
}

impl ClockId {
    /// Look up a clock source by name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "CLK" => Some(Self::Clk),
            _ => None,
        }
    }

    /// The schematic name of this clock input.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Clk => "CLK",
        }
    }
}

/// What a queued access wants to change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum LineChange {
    /// Drive an input line to a new level.
    Line { line: LineId, state: bool },
    /// Re-rate the clock source.
    ClockRate { rate_hz: f64 },
}

/// One pending externally-submitted change, stamped with the simulated
/// time at which it takes effect.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LineAccess {
    pub change: LineChange,
    /// Simulated time relative to the current timeslice start, in ns.
    pub access_time: f64,
    /// Submission counter; the stable tie-break for equal access times.
    pub sequence: u64,
}

/// Time-ordered pending accesses. Kept sorted on insertion so the drain
/// path is a linear scan.
#[derive(Debug, Clone, Default)]
pub(crate) struct LineAccessBuffer {
    entries: Vec<LineAccess>,
    next_sequence: u64,
}

impl LineAccessBuffer {
    /// Insert an access keeping `(access_time, sequence)` order.
    pub fn push(&mut self, change: LineChange, access_time: f64) {
        let access = LineAccess {
            change,
            access_time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        let at = self
            .entries
            .partition_point(|e| (e.access_time, e.sequence) <= (access.access_time, access.sequence));
        self.entries.insert(at, access);
    }

    /// Remove and return all accesses due at or before `time`.
    pub fn drain_due(&mut self, time: f64) -> Vec<LineAccess> {
        let due = self.entries.partition_point(|e| e.access_time <= time);
        self.entries.drain(..due).collect()
    }

    /// Shift every pending timestamp back by `elapsed` ns. Called when a
    /// new timeslice begins: timestamps are relative to slice start.
    pub fn rebase(&mut self, elapsed: f64) {
        for entry in &mut self.entries {
            entry.access_time -= elapsed;
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_keeps_time_order() {
        let mut buffer = LineAccessBuffer::default();
        let set = |line, state| LineChange::Line { line, state };
        buffer.push(set(LineId::Int, true), 500.0);
        buffer.push(set(LineId::Nmi, true), 100.0);
        buffer.push(set(LineId::Int, false), 500.0);

        let due = buffer.drain_due(1000.0);
        assert_eq!(due.len(), 3);
        assert_eq!(due[0].change, set(LineId::Nmi, true));
        // Equal timestamps keep submission order
        assert_eq!(due[1].change, set(LineId::Int, true));
        assert_eq!(due[2].change, set(LineId::Int, false));
    }

    #[test]
    fn drain_due_leaves_future_entries() {
        let mut buffer = LineAccessBuffer::default();
        buffer.push(
            LineChange::Line {
                line: LineId::Int,
                state: true,
            },
            800.0,
        );
        assert!(buffer.drain_due(700.0).is_empty());
        assert!(!buffer.is_empty());
        assert_eq!(buffer.drain_due(800.0).len(), 1);
        assert!(buffer.is_empty());
    }
}
