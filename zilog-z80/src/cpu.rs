//! Z80 CPU core with instruction-atomic execution.
//!
//! Each call to [`Z80::execute_step`] performs one logical event (an
//! instruction, an interrupt acceptance, or an idle stall) and returns
//! the number of T-states it is billed for. All bus access for that event
//! happens inside the call; there is no intra-opcode timing.

#![allow(clippy::cast_possible_truncation)] // Intentional truncation for low byte extraction.
#![allow(clippy::cast_possible_wrap)] // Intentional i8 casts for displacements.
#![allow(clippy::struct_excessive_bools)] // CPU state requires multiple boolean flags.

use std::sync::Mutex;

use device_core::{ClockSource, MemoryBus, Ticks};

use crate::flags::{CF, PF, SF, ZF};
use crate::lines::{LineAccessBuffer, LineChange, LineId};
use crate::registers::Registers;

mod execute;
mod execute_cb;
mod execute_ed;

/// T-states billed for an idle step while the bus is released.
const BUSREQ_STALL_T: u32 = 4;

/// Effective index context for the instruction being decoded.
///
/// DD/FD prefixes do not select different opcode tables; they rewrite how
/// the following instruction resolves HL, (HL), H and L. Opcode bodies ask
/// for their operands through this context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexMode {
    Hl,
    Ix,
    Iy,
}

impl IndexMode {
    /// Extra T-states carried by the effective prefix byte itself.
    pub(crate) const fn prefix_t(self) -> u32 {
        match self {
            Self::Hl => 0,
            Self::Ix | Self::Iy => 4,
        }
    }

    pub(crate) const fn is_hl(self) -> bool {
        matches!(self, Self::Hl)
    }
}

/// The Z80 CPU device.
///
/// The CPU does not own the bus; the host passes it to `execute_step`.
/// Externally visible state lives in [`Registers`] plus the interrupt and
/// line latches below. Everything that must survive a rollback is plain
/// data so the timeslice snapshot is a wholesale copy.
pub struct Z80 {
    pub(crate) regs: Registers,

    // === Interrupt sequencing ===
    /// Set for exactly one instruction boundary after EI executes.
    pub(crate) mask_interrupts_next_opcode: bool,

    // === External line latches ===
    pub(crate) reset_line: bool,
    pub(crate) busreq_line: bool,
    pub(crate) int_line: bool,
    pub(crate) nmi_line: bool,
    /// A false-to-true NMI transition was seen and not yet serviced.
    pub(crate) nmi_latched: bool,

    // === Externally submitted line activity ===
    pub(crate) lines: Mutex<LineAccessBuffer>,
    /// True while the engine has nothing to do until a line changes.
    pub(crate) suspend_until_line_state_change: bool,

    // === Clocking and timeslice ===
    pub(crate) clock: ClockSource,
    pub(crate) timeslice_length: f64,
    pub(crate) last_timeslice_length: f64,
    /// Simulated ns consumed so far in the current timeslice.
    pub(crate) timeslice_progress: f64,
    /// Total T-states elapsed since power-on.
    pub(crate) total_ticks: Ticks,

    // === Rollback snapshot ===
    pub(crate) shadow: crate::device::TimesliceState,

    // === CE line output configuration ===
    pub(crate) ce_mask_rd: u32,
    pub(crate) ce_mask_wr: u32,

    // === Diagnostics ===
    /// Unimplemented ED opcodes already warned about (one bit each).
    warned_ed: [u64; 4],
}

impl Z80 {
    /// Create a CPU with power-on state and a default 4 MHz clock.
    #[must_use]
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            mask_interrupts_next_opcode: false,
            reset_line: false,
            busreq_line: false,
            int_line: false,
            nmi_line: false,
            nmi_latched: false,
            lines: Mutex::new(LineAccessBuffer::default()),
            suspend_until_line_state_change: false,
            clock: ClockSource::new(4_000_000.0),
            timeslice_length: 0.0,
            last_timeslice_length: 0.0,
            timeslice_progress: 0.0,
            total_ticks: Ticks::ZERO,
            shadow: crate::device::TimesliceState::default(),
            ce_mask_rd: 0,
            ce_mask_wr: 0,
            warned_ed: [0; 4],
        };
        cpu.shadow = cpu.capture_timeslice_state();
        cpu
    }

    // =========================================================================
    // Debug surface
    // =========================================================================

    /// Snapshot of the register file.
    #[must_use]
    pub fn registers(&self) -> Registers {
        self.regs
    }

    /// Mutable access to the register file, for host setup and tests.
    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.regs
    }

    /// Current program counter.
    #[must_use]
    pub fn get_current_pc(&self) -> u16 {
        self.regs.pc
    }

    /// Total T-states elapsed since power-on.
    #[must_use]
    pub fn total_ticks(&self) -> Ticks {
        self.total_ticks
    }

    /// Transparent byte read for debuggers: no simulated time passes and
    /// no bus side effects fire.
    pub fn get_raw_data<B: MemoryBus>(&self, bus: &mut B, address: u16) -> u8 {
        bus.read(address, true).data
    }

    // =========================================================================
    // Bus access
    // =========================================================================

    /// Read a byte. Bus-reported elapsed time advances the progress clock
    /// but is never billed as T-states.
    pub(crate) fn read_byte<B: MemoryBus>(&mut self, bus: &mut B, address: u16) -> u8 {
        let result = bus.read(address, false);
        self.timeslice_progress += result.elapsed_ns;
        result.data
    }

    /// Write a byte, accounting bus time as for reads.
    pub(crate) fn write_byte<B: MemoryBus>(&mut self, bus: &mut B, address: u16, value: u8) {
        let elapsed = bus.write(address, value, false);
        self.timeslice_progress += elapsed;
    }

    /// Read from an I/O port through the stub port contract.
    pub(crate) fn io_read_byte<B: MemoryBus>(&mut self, bus: &mut B, port: u16) -> u8 {
        let result = bus.io_read(port);
        self.timeslice_progress += result.elapsed_ns;
        result.data
    }

    /// Write to an I/O port through the stub port contract.
    pub(crate) fn io_write_byte<B: MemoryBus>(&mut self, bus: &mut B, port: u16, value: u8) {
        let elapsed = bus.io_write(port, value);
        self.timeslice_progress += elapsed;
    }

    /// Read a little-endian word.
    pub(crate) fn read_word<B: MemoryBus>(&mut self, bus: &mut B, address: u16) -> u16 {
        let lo = self.read_byte(bus, address);
        let hi = self.read_byte(bus, address.wrapping_add(1));
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Write a little-endian word.
    pub(crate) fn write_word<B: MemoryBus>(&mut self, bus: &mut B, address: u16, value: u16) {
        self.write_byte(bus, address, value as u8);
        self.write_byte(bus, address.wrapping_add(1), (value >> 8) as u8);
    }

    /// M1 fetch: read at PC, advance PC, bump the refresh counter.
    pub(crate) fn fetch_opcode<B: MemoryBus>(&mut self, bus: &mut B) -> u8 {
        let byte = self.read_byte(bus, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        self.regs.add_refresh(1);
        byte
    }

    /// Read the byte at PC and advance. Not an M1 cycle; R untouched.
    pub(crate) fn fetch_byte<B: MemoryBus>(&mut self, bus: &mut B) -> u8 {
        let byte = self.read_byte(bus, self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        byte
    }

    /// Read a little-endian immediate word at PC and advance.
    pub(crate) fn fetch_word<B: MemoryBus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch_byte(bus);
        let hi = self.fetch_byte(bus);
        u16::from(lo) | (u16::from(hi) << 8)
    }

    /// Push a word onto the stack, high byte first.
    pub(crate) fn push_word<B: MemoryBus>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write_byte(bus, self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        self.write_byte(bus, self.regs.sp, value as u8);
    }

    /// Pop a word from the stack.
    pub(crate) fn pop_word<B: MemoryBus>(&mut self, bus: &mut B) -> u16 {
        let value = self.read_word(bus, self.regs.sp);
        self.regs.sp = self.regs.sp.wrapping_add(2);
        value
    }

    // =========================================================================
    // Operand resolution
    // =========================================================================

    /// Resolve the memory operand: (HL), or (IX+d)/(IY+d) with the
    /// displacement consumed from the instruction stream. Sets WZ for the
    /// indexed forms.
    pub(crate) fn mem_operand_addr<B: MemoryBus>(
        &mut self,
        bus: &mut B,
        index: IndexMode,
    ) -> u16 {
        match index {
            IndexMode::Hl => self.regs.hl(),
            IndexMode::Ix => {
                let d = self.fetch_byte(bus) as i8;
                let addr = self.regs.ix.wrapping_add(d as u16);
                self.regs.wz = addr;
                addr
            }
            IndexMode::Iy => {
                let d = self.fetch_byte(bus) as i8;
                let addr = self.regs.iy.wrapping_add(d as u16);
                self.regs.wz = addr;
                addr
            }
        }
    }

    /// Get register by 3-bit encoding. Code 6 is the memory operand and
    /// must be handled by the caller.
    pub(crate) fn get_reg8(&self, code: u8) -> u8 {
        match code & 7 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            7 => self.regs.a,
            _ => unreachable!("(HL) resolved by caller"),
        }
    }

    /// Set register by 3-bit encoding. Code 6 handled by the caller.
    pub(crate) fn set_reg8(&mut self, code: u8, value: u8) {
        match code & 7 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            7 => self.regs.a = value,
            _ => unreachable!("(HL) resolved by caller"),
        }
    }

    /// Get register by 3-bit encoding with the index rewrite applied:
    /// H and L become IXH/IXL (IYH/IYL) under a DD (FD) prefix.
    pub(crate) fn get_reg8_indexed(&self, code: u8, index: IndexMode) -> u8 {
        match (code & 7, index) {
            (4, IndexMode::Ix) => self.regs.ixh(),
            (5, IndexMode::Ix) => self.regs.ixl(),
            (4, IndexMode::Iy) => self.regs.iyh(),
            (5, IndexMode::Iy) => self.regs.iyl(),
            (code, _) => self.get_reg8(code),
        }
    }

    /// Set register by 3-bit encoding with the index rewrite applied.
    pub(crate) fn set_reg8_indexed(&mut self, code: u8, index: IndexMode, value: u8) {
        match (code & 7, index) {
            (4, IndexMode::Ix) => self.regs.set_ixh(value),
            (5, IndexMode::Ix) => self.regs.set_ixl(value),
            (4, IndexMode::Iy) => self.regs.set_iyh(value),
            (5, IndexMode::Iy) => self.regs.set_iyl(value),
            (code, _) => self.set_reg8(code, value),
        }
    }

    /// Get register pair by 2-bit encoding; HL is rewritten to IX/IY.
    pub(crate) fn get_reg16(&self, code: u8, index: IndexMode) -> u16 {
        match code & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.index_reg(index),
            3 => self.regs.sp,
            _ => unreachable!(),
        }
    }

    /// Set register pair by 2-bit encoding; HL is rewritten to IX/IY.
    pub(crate) fn set_reg16(&mut self, code: u8, index: IndexMode, value: u16) {
        match code & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_index_reg(index, value),
            3 => self.regs.sp = value,
            _ => unreachable!(),
        }
    }

    /// Get register pair for PUSH/POP encoding (AF instead of SP).
    pub(crate) fn get_reg16_stack(&self, code: u8, index: IndexMode) -> u16 {
        match code & 3 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.index_reg(index),
            3 => self.regs.af(),
            _ => unreachable!(),
        }
    }

    /// Set register pair for PUSH/POP encoding.
    pub(crate) fn set_reg16_stack(&mut self, code: u8, index: IndexMode, value: u16) {
        match code & 3 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.set_index_reg(index, value),
            3 => self.regs.set_af(value),
            _ => unreachable!(),
        }
    }

    /// The register standing in for HL under the current prefix.
    pub(crate) fn index_reg(&self, index: IndexMode) -> u16 {
        match index {
            IndexMode::Hl => self.regs.hl(),
            IndexMode::Ix => self.regs.ix,
            IndexMode::Iy => self.regs.iy,
        }
    }

    pub(crate) fn set_index_reg(&mut self, index: IndexMode, value: u16) {
        match index {
            IndexMode::Hl => self.regs.set_hl(value),
            IndexMode::Ix => self.regs.ix = value,
            IndexMode::Iy => self.regs.iy = value,
        }
    }

    /// Evaluate condition code (NZ, Z, NC, C, PO, PE, P, M).
    pub(crate) fn condition(&self, cc: u8) -> bool {
        match cc & 7 {
            0 => self.regs.f & ZF == 0,
            1 => self.regs.f & ZF != 0,
            2 => self.regs.f & CF == 0,
            3 => self.regs.f & CF != 0,
            4 => self.regs.f & PF == 0,
            5 => self.regs.f & PF != 0,
            6 => self.regs.f & SF == 0,
            7 => self.regs.f & SF != 0,
            _ => unreachable!(),
        }
    }

    // =========================================================================
    // Step engine
    // =========================================================================

    /// Execute one atomic step and return the T-states consumed.
    ///
    /// Pending line events due at the current simulated time are applied
    /// first; then the acceptance cascade runs: RESET, BUSREQ, NMI, INT,
    /// HALT idle, and finally a normal fetch/execute.
    pub fn execute_step<B: MemoryBus>(&mut self, bus: &mut B) -> u32 {
        self.apply_due_line_accesses();

        let t_states = self.step_inner(bus);

        self.total_ticks += Ticks::new(u64::from(t_states));
        self.timeslice_progress += self.clock.ticks_to_ns(u64::from(t_states));
        t_states
    }

    fn step_inner<B: MemoryBus>(&mut self, bus: &mut B) -> u32 {
        // 1. Reset wins over everything while asserted.
        if self.reset_line {
            self.apply_reset();
            return 3;
        }

        // 2. Bus released: stall without fetching.
        if self.busreq_line {
            self.suspend_until_line_state_change = true;
            return BUSREQ_STALL_T;
        }

        // 3. Non-maskable interrupt (latched edge).
        if self.nmi_latched {
            self.nmi_latched = false;
            return self.accept_nmi(bus);
        }

        // 4. Maskable interrupt.
        if self.int_line && self.regs.iff1 && !self.mask_interrupts_next_opcode {
            return self.accept_int(bus);
        }

        // 5. Stopped processor idles on a virtual NOP.
        if self.regs.halted {
            self.regs.add_refresh(1);
            return 4;
        }

        // 6. Fetch and execute one instruction.
        self.fetch_and_execute(bus)
    }

    /// Drive PC/I/R and the interrupt state to their reset values.
    fn apply_reset(&mut self) {
        self.regs.pc = 0;
        self.regs.i = 0;
        self.regs.r = 0;
        self.regs.im = 0;
        self.regs.iff1 = false;
        self.regs.iff2 = false;
        self.regs.halted = false;
        self.mask_interrupts_next_opcode = false;
    }

    /// Accept an NMI: 11 T-states.
    fn accept_nmi<B: MemoryBus>(&mut self, bus: &mut B) -> u32 {
        self.regs.halted = false;
        self.regs.iff2 = self.regs.iff1;
        self.regs.iff1 = false;

        let return_addr = self.regs.pc;
        self.push_word(bus, return_addr);
        self.regs.pc = 0x0066;
        self.regs.wz = 0x0066;
        11
    }

    /// Accept a maskable interrupt according to the interrupt mode.
    fn accept_int<B: MemoryBus>(&mut self, bus: &mut B) -> u32 {
        self.regs.halted = false;
        self.regs.iff1 = false;
        self.regs.iff2 = false;

        match self.regs.im {
            2 => {
                // Mode 2: vector byte from the acknowledge cycle indexes
                // the table at I<<8. The return address is stacked before
                // the table is read.
                let vector = bus.interrupt_ack();
                let return_addr = self.regs.pc;
                self.push_word(bus, return_addr);
                let table_entry = (u16::from(self.regs.i) << 8) | u16::from(vector);
                let target = self.read_word(bus, table_entry);
                self.regs.pc = target;
                self.regs.wz = target;
                19
            }
            1 => {
                let return_addr = self.regs.pc;
                self.push_word(bus, return_addr);
                self.regs.pc = 0x0038;
                self.regs.wz = 0x0038;
                13
            }
            _ => {
                // Mode 0: execute the opcode supplied on the bus. Only the
                // RST group is honoured; anything else falls back to the
                // RST 38h the data bus floats to.
                let opcode = bus.interrupt_ack();
                let target = if opcode & 0xC7 == 0xC7 {
                    u16::from(opcode & 0x38)
                } else {
                    0x0038
                };
                let return_addr = self.regs.pc;
                self.push_word(bus, return_addr);
                self.regs.pc = target;
                self.regs.wz = target;
                13
            }
        }
    }

    /// Fetch one instruction (prefixes included) and execute it.
    fn fetch_and_execute<B: MemoryBus>(&mut self, bus: &mut B) -> u32 {
        let mut index = IndexMode::Hl;
        let mut superseded_t: u32 = 0;

        // Prefix chain: each DD/FD is its own M1 fetch; only the last one
        // before a real opcode takes effect, each superseded one bills 4T.
        let mut opcode = self.fetch_opcode(bus);
        loop {
            match opcode {
                0xDD => {
                    if !index.is_hl() {
                        superseded_t += 4;
                    }
                    index = IndexMode::Ix;
                }
                0xFD => {
                    if !index.is_hl() {
                        superseded_t += 4;
                    }
                    index = IndexMode::Iy;
                }
                _ => break,
            }
            opcode = self.fetch_opcode(bus);
        }

        let t_states = match opcode {
            0xCB if index.is_hl() => {
                let op = self.fetch_opcode(bus);
                self.execute_cb(bus, op)
            }
            0xCB => {
                // DD CB d op: displacement precedes the opcode byte, and
                // neither byte is an M1 fetch.
                let displacement = self.fetch_byte(bus) as i8;
                let op = self.fetch_byte(bus);
                self.execute_index_cb(bus, index, displacement, op)
            }
            0xED => {
                // ED supersedes any index prefix.
                if !index.is_hl() {
                    superseded_t += 4;
                }
                let op = self.fetch_opcode(bus);
                self.execute_ed(bus, op)
            }
            _ => self.execute_main(bus, opcode, index),
        };

        // EI defers interrupt acceptance past the next instruction; any
        // other opcode ends the deferral window.
        self.mask_interrupts_next_opcode = opcode == 0xFB;

        superseded_t + t_states
    }

    // =========================================================================
    // Line latches
    // =========================================================================

    /// Apply queued external accesses whose time has come.
    pub(crate) fn apply_due_line_accesses(&mut self) {
        let due = {
            let mut buffer = self.lines.lock().expect("line buffer poisoned");
            if buffer.is_empty() {
                return;
            }
            buffer.drain_due(self.timeslice_progress)
        };

        for access in due {
            self.apply_line_change(access.change);
        }
    }

    /// Latch one line change into the engine's view.
    pub(crate) fn apply_line_change(&mut self, change: LineChange) {
        self.suspend_until_line_state_change = false;
        match change {
            LineChange::Line { line, state } => match line {
                LineId::Reset => self.reset_line = state,
                LineId::BusReq => self.busreq_line = state,
                LineId::Int => self.int_line = state,
                LineId::Nmi => {
                    if state && !self.nmi_line {
                        self.nmi_latched = true;
                    }
                    self.nmi_line = state;
                }
            },
            LineChange::ClockRate { rate_hz } => {
                self.clock = ClockSource::new(rate_hz);
            }
        }
    }

    /// Warn exactly once per unimplemented ED opcode number.
    pub(crate) fn warn_unimplemented_ed(&mut self, opcode: u8) {
        let word = usize::from(opcode >> 6);
        let bit = 1u64 << (opcode & 0x3F);
        if self.warned_ed[word] & bit == 0 {
            self.warned_ed[word] |= bit;
            log::warn!("unimplemented ED-prefixed opcode {opcode:#04X}, executing as NOP");
        }
    }
}

impl Default for Z80 {
    fn default() -> Self {
        Self::new()
    }
}
