//! Scheduler and host integration for the Z80 device.
//!
//! The host drives the CPU through the [`Device`] trait: announce a
//! timeslice, step, then commit or roll back. Peer devices poke input
//! lines and the clock rate through the queued accessors here, which are
//! safe to call from any thread.

use device_core::{BuildError, ClockSource, Device, MemoryBus, Observable, StateNode, Ticks, Value};

use crate::cpu::Z80;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::lines::{ClockId, LineAccessBuffer, LineChange, LineId};
use crate::registers::Registers;

/// Complete CPU state for one timeslice, captured on
/// `notify_upcoming_timeslice` and restored on `rollback`.
///
/// Everything the instruction engine can mutate during a slice lives here,
/// the pending line-access queue included, so restoration is a plain copy.
#[derive(Debug, Clone)]
pub(crate) struct TimesliceState {
    regs: Registers,
    mask_interrupts_next_opcode: bool,
    reset_line: bool,
    busreq_line: bool,
    int_line: bool,
    nmi_line: bool,
    nmi_latched: bool,
    suspend_until_line_state_change: bool,
    clock: ClockSource,
    timeslice_length: f64,
    last_timeslice_length: f64,
    timeslice_progress: f64,
    total_ticks: Ticks,
    line_buffer: LineAccessBuffer,
}

impl Default for TimesliceState {
    fn default() -> Self {
        Self {
            regs: Registers::default(),
            mask_interrupts_next_opcode: false,
            reset_line: false,
            busreq_line: false,
            int_line: false,
            nmi_line: false,
            nmi_latched: false,
            suspend_until_line_state_change: false,
            clock: ClockSource::new(0.0),
            timeslice_length: 0.0,
            last_timeslice_length: 0.0,
            timeslice_progress: 0.0,
            total_ticks: Ticks::ZERO,
            line_buffer: LineAccessBuffer::default(),
        }
    }
}

/// Memory access kinds distinguished on the CE outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusAccessKind {
    Read,
    Write,
}

/// CE output lines driven by the CPU during memory access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeLine {
    Rd,
    Wr,
}

impl CeLine {
    /// Look up a CE line by its schematic name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "RD" => Some(Self::Rd),
            "WR" => Some(Self::Wr),
            _ => None,
        }
    }

    /// The schematic name of this CE line.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Rd => "RD",
            Self::Wr => "WR",
        }
    }
}

impl Z80 {
    // =========================================================================
    // External line and clock access (any thread)
    // =========================================================================

    /// Queue a line level change taking effect at `access_time`
    /// (simulated ns relative to the current timeslice start).
    ///
    /// The engine applies the change at the next step boundary at or after
    /// that time; submissions from different threads are serialised by the
    /// queue's time-then-submission ordering.
    pub fn set_line_state(&self, line: LineId, state: bool, access_time: f64) {
        let mut buffer = self.lines.lock().expect("line buffer poisoned");
        buffer.push(LineChange::Line { line, state }, access_time);
    }

    /// Queue a clock-source rate change taking effect at `access_time`.
    pub fn set_clock_source_rate(&self, clock: ClockId, rate_hz: f64, access_time: f64) {
        let ClockId::Clk = clock;
        let mut buffer = self.lines.lock().expect("line buffer poisoned");
        buffer.push(LineChange::ClockRate { rate_hz }, access_time);
    }

    /// Change the clock rate immediately, outside the event stream. For
    /// host configuration, not for simulated devices.
    pub fn transparent_set_clock_source_rate(&mut self, clock: ClockId, rate_hz: f64) {
        let ClockId::Clk = clock;
        self.clock = ClockSource::new(rate_hz);
    }

    /// Current clock rate in Hz.
    #[must_use]
    pub fn clock_rate(&self) -> f64 {
        self.clock.rate_hz
    }

    /// True when the engine can make no progress until an external line
    /// changes (the bus is released, for instance).
    #[must_use]
    pub fn suspended_until_line_state_change(&self) -> bool {
        self.suspend_until_line_state_change
    }

    /// Simulated ns consumed so far in the current timeslice.
    #[must_use]
    pub fn timeslice_progress(&self) -> f64 {
        self.timeslice_progress
    }

    // =========================================================================
    // CE line outputs
    // =========================================================================

    /// Map a CE output line onto a bit of the composite CE word.
    ///
    /// # Errors
    ///
    /// Fails if the bit number does not fit the CE word.
    pub fn set_ce_line_output(&mut self, line: CeLine, bit: u32) -> Result<(), BuildError> {
        if bit >= 32 {
            return Err(BuildError::BadCeMapping {
                line: line.name(),
                bit,
                width: 32,
            });
        }
        match line {
            CeLine::Rd => self.ce_mask_rd = 1 << bit,
            CeLine::Wr => self.ce_mask_wr = 1 << bit,
        }
        Ok(())
    }

    /// CE word the CPU drives for a memory access of the given kind.
    #[must_use]
    pub fn calculate_ce_line_state_memory(&self, access: BusAccessKind) -> u32 {
        match access {
            BusAccessKind::Read => self.ce_mask_rd,
            BusAccessKind::Write => self.ce_mask_wr,
        }
    }

    // =========================================================================
    // Construction
    // =========================================================================

    /// Apply a configuration node. Returns false if the configuration
    /// references unknown lines or is otherwise unusable.
    ///
    /// Expected shape:
    ///
    /// ```json
    /// {
    ///   "CELineOutput": [ { "LineName": "RD", "Bit": 4 } ],
    ///   "ClockRate": 3546895.0
    /// }
    /// ```
    pub fn construct(&mut self, config: &StateNode) -> bool {
        if let Some(rate) = config.get("ClockRate").and_then(StateNode::as_f64) {
            self.clock = ClockSource::new(rate);
        }

        if let Some(mappings) = config.get("CELineOutput") {
            let Some(entries) = mappings.as_array() else {
                return false;
            };
            for entry in entries {
                let name = entry.get("LineName").and_then(StateNode::as_str);
                let bit = entry
                    .get("Bit")
                    .and_then(StateNode::as_u64)
                    .and_then(|b| u32::try_from(b).ok());
                let (Some(name), Some(bit)) = (name, bit) else {
                    return false;
                };
                let Some(line) = CeLine::from_name(name) else {
                    return false;
                };
                if self.set_ce_line_output(line, bit).is_err() {
                    return false;
                }
            }
        }

        true
    }

    /// Validate the assembled device.
    ///
    /// # Errors
    ///
    /// Fails if the configuration left the device unusable.
    pub fn build_device(&self) -> Result<(), BuildError> {
        if self.clock.rate_hz <= 0.0 {
            return Err(BuildError::BadConfig(format!(
                "clock rate {} Hz is not positive",
                self.clock.rate_hz
            )));
        }
        Ok(())
    }

    // =========================================================================
    // Timeslice snapshot
    // =========================================================================

    pub(crate) fn capture_timeslice_state(&self) -> TimesliceState {
        let line_buffer = self.lines.lock().expect("line buffer poisoned").clone();
        TimesliceState {
            regs: self.regs,
            mask_interrupts_next_opcode: self.mask_interrupts_next_opcode,
            reset_line: self.reset_line,
            busreq_line: self.busreq_line,
            int_line: self.int_line,
            nmi_line: self.nmi_line,
            nmi_latched: self.nmi_latched,
            suspend_until_line_state_change: self.suspend_until_line_state_change,
            clock: self.clock,
            timeslice_length: self.timeslice_length,
            last_timeslice_length: self.last_timeslice_length,
            timeslice_progress: self.timeslice_progress,
            total_ticks: self.total_ticks,
            line_buffer,
        }
    }

    fn restore_timeslice_state(&mut self, state: &TimesliceState) {
        self.regs = state.regs;
        self.mask_interrupts_next_opcode = state.mask_interrupts_next_opcode;
        self.reset_line = state.reset_line;
        self.busreq_line = state.busreq_line;
        self.int_line = state.int_line;
        self.nmi_line = state.nmi_line;
        self.nmi_latched = state.nmi_latched;
        self.suspend_until_line_state_change = state.suspend_until_line_state_change;
        self.clock = state.clock;
        self.timeslice_length = state.timeslice_length;
        self.last_timeslice_length = state.last_timeslice_length;
        self.timeslice_progress = state.timeslice_progress;
        self.total_ticks = state.total_ticks;
        *self.lines.lock().expect("line buffer poisoned") = state.line_buffer.clone();
    }
}

impl Device for Z80 {
    fn execute_step<B: MemoryBus>(&mut self, bus: &mut B) -> u32 {
        Z80::execute_step(self, bus)
    }

    fn notify_upcoming_timeslice(&mut self, nanoseconds: f64) {
        let previous = self.timeslice_length;
        {
            let mut buffer = self.lines.lock().expect("line buffer poisoned");
            buffer.rebase(previous);
        }
        // Overshoot from the previous slice carries into this one.
        self.timeslice_progress = (self.timeslice_progress - previous).max(0.0);
        self.last_timeslice_length = previous;
        self.timeslice_length = nanoseconds;
        self.shadow = self.capture_timeslice_state();
    }

    fn send_notify_upcoming_timeslice(&self) -> bool {
        true
    }

    fn commit(&mut self) {
        self.shadow = self.capture_timeslice_state();
    }

    fn rollback(&mut self) {
        let shadow = self.shadow.clone();
        self.restore_timeslice_state(&shadow);
    }

    fn uses_execute_suspend(&self) -> bool {
        true
    }
}

/// All query paths supported by the Z80.
const Z80_QUERY_PATHS: &[&str] = &[
    // Main registers
    "a", "f", "b", "c", "d", "e", "h", "l",
    // Register pairs
    "af", "bc", "de", "hl",
    // Alternate registers
    "a'", "f'", "b'", "c'", "d'", "e'", "h'", "l'",
    "af'", "bc'", "de'", "hl'",
    // Index registers
    "ix", "iy", "ixh", "ixl", "iyh", "iyl",
    // Other registers
    "sp", "pc", "i", "r", "wz",
    // Flags (individual)
    "flags.s", "flags.z", "flags.y", "flags.h",
    "flags.x", "flags.p", "flags.n", "flags.c",
    // Interrupt state
    "iff1", "iff2", "im", "mask_interrupts_next_opcode",
    // External lines
    "lines.reset", "lines.busreq", "lines.int", "lines.nmi",
    // CPU state
    "halted", "clock_rate", "ticks",
];

impl Observable for Z80 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            // Main registers
            "a" => Some(self.regs.a.into()),
            "f" => Some(self.regs.f.into()),
            "b" => Some(self.regs.b.into()),
            "c" => Some(self.regs.c.into()),
            "d" => Some(self.regs.d.into()),
            "e" => Some(self.regs.e.into()),
            "h" => Some(self.regs.h.into()),
            "l" => Some(self.regs.l.into()),

            // Register pairs
            "af" => Some(self.regs.af().into()),
            "bc" => Some(self.regs.bc().into()),
            "de" => Some(self.regs.de().into()),
            "hl" => Some(self.regs.hl().into()),

            // Alternate registers
            "a'" => Some(self.regs.a_alt.into()),
            "f'" => Some(self.regs.f_alt.into()),
            "b'" => Some(self.regs.b_alt.into()),
            "c'" => Some(self.regs.c_alt.into()),
            "d'" => Some(self.regs.d_alt.into()),
            "e'" => Some(self.regs.e_alt.into()),
            "h'" => Some(self.regs.h_alt.into()),
            "l'" => Some(self.regs.l_alt.into()),

            // Alternate pairs
            "af'" => Some(self.regs.af_alt().into()),
            "bc'" => Some(self.regs.bc_alt().into()),
            "de'" => Some(self.regs.de_alt().into()),
            "hl'" => Some(self.regs.hl_alt().into()),

            // Index registers
            "ix" => Some(self.regs.ix.into()),
            "iy" => Some(self.regs.iy.into()),
            "ixh" => Some(self.regs.ixh().into()),
            "ixl" => Some(self.regs.ixl().into()),
            "iyh" => Some(self.regs.iyh().into()),
            "iyl" => Some(self.regs.iyl().into()),

            // Other registers
            "sp" => Some(self.regs.sp.into()),
            "pc" => Some(self.regs.pc.into()),
            "i" => Some(self.regs.i.into()),
            "r" => Some(self.regs.r.into()),
            "wz" => Some(self.regs.wz.into()),

            // Individual flags
            "flags.s" => Some((self.regs.f & SF != 0).into()),
            "flags.z" => Some((self.regs.f & ZF != 0).into()),
            "flags.y" => Some((self.regs.f & YF != 0).into()),
            "flags.h" => Some((self.regs.f & HF != 0).into()),
            "flags.x" => Some((self.regs.f & XF != 0).into()),
            "flags.p" => Some((self.regs.f & PF != 0).into()),
            "flags.n" => Some((self.regs.f & NF != 0).into()),
            "flags.c" => Some((self.regs.f & CF != 0).into()),

            // Interrupt state
            "iff1" => Some(self.regs.iff1.into()),
            "iff2" => Some(self.regs.iff2.into()),
            "im" => Some(self.regs.im.into()),
            "mask_interrupts_next_opcode" => Some(self.mask_interrupts_next_opcode.into()),

            // External lines
            "lines.reset" => Some(self.reset_line.into()),
            "lines.busreq" => Some(self.busreq_line.into()),
            "lines.int" => Some(self.int_line.into()),
            "lines.nmi" => Some(self.nmi_line.into()),

            // CPU state
            "halted" => Some(self.regs.halted.into()),
            "clock_rate" => Some(self.clock.rate_hz.to_string().into()),
            "ticks" => Some(self.total_ticks.get().into()),

            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        Z80_QUERY_PATHS
    }
}
