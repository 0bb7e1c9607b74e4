//! Execution of the CB-prefixed table: rotates, shifts and bit ops.
//!
//! The same 256 operations serve three addressing shapes: plain register,
//! (HL), and the DD CB / FD CB form whose operand is always (IX+d)/(IY+d).
//! In the indexed form every non-BIT result is also copied into the
//! register the opcode names, the documented "undocumented" double store.

use device_core::MemoryBus;

use crate::alu;
use crate::flags::{CF, HF, PF, SF, XF, YF, ZF};

use super::{IndexMode, Z80};

impl Z80 {
    /// Execute a CB-prefixed instruction (no index prefix).
    pub(super) fn execute_cb<B: MemoryBus>(&mut self, bus: &mut B, op: u8) -> u32 {
        let r = op & 7;

        if r == 6 {
            let addr = self.regs.hl();
            let value = self.read_byte(bus, addr);
            // BIT n,(HL) leaks the internal address latch into X/Y.
            let flag_source = (self.regs.wz >> 8) as u8;
            match self.cb_operation(op, value, flag_source) {
                Some(result) => {
                    self.write_byte(bus, addr, result);
                    15
                }
                None => 12,
            }
        } else {
            let value = self.get_reg8(r);
            if let Some(result) = self.cb_operation(op, value, value) {
                self.set_reg8(r, result);
            }
            8
        }
    }

    /// Execute a DD CB / FD CB instruction. The displacement has already
    /// been consumed; the operand is the memory cell at IX+d / IY+d.
    pub(super) fn execute_index_cb<B: MemoryBus>(
        &mut self,
        bus: &mut B,
        index: IndexMode,
        displacement: i8,
        op: u8,
    ) -> u32 {
        let base = match index {
            IndexMode::Ix => self.regs.ix,
            IndexMode::Iy => self.regs.iy,
            IndexMode::Hl => unreachable!("index CB requires a DD/FD prefix"),
        };
        let addr = base.wrapping_add(displacement as u16);
        self.regs.wz = addr;

        let value = self.read_byte(bus, addr);
        let flag_source = (addr >> 8) as u8;

        match self.cb_operation(op, value, flag_source) {
            Some(result) => {
                self.write_byte(bus, addr, result);
                let r = op & 7;
                if r != 6 {
                    self.set_reg8(r, result);
                }
                23
            }
            None => 20,
        }
    }

    /// Apply one CB-table operation. Returns the value to write back, or
    /// `None` for BIT which only sets flags.
    fn cb_operation(&mut self, op: u8, value: u8, flag_source: u8) -> Option<u8> {
        match op >> 6 {
            // Rotate/shift group, selected by bits 5-3
            0 => {
                let result = match (op >> 3) & 7 {
                    0 => alu::rlc8(value),
                    1 => alu::rrc8(value),
                    2 => alu::rl8(value, self.regs.f & CF != 0),
                    3 => alu::rr8(value, self.regs.f & CF != 0),
                    4 => alu::sla8(value),
                    5 => alu::sra8(value),
                    6 => alu::sll8(value),
                    7 => alu::srl8(value),
                    _ => unreachable!(),
                };
                self.regs.f = result.flags;
                Some(result.value)
            }

            // BIT n
            1 => {
                let bit = (op >> 3) & 7;
                let tested = value & (1 << bit);

                let mut flags = (self.regs.f & CF) | HF;
                if tested == 0 {
                    flags |= ZF | PF;
                }
                if bit == 7 && tested != 0 {
                    flags |= SF;
                }
                flags |= flag_source & (XF | YF);
                self.regs.f = flags;
                None
            }

            // RES n
            2 => Some(value & !(1 << ((op >> 3) & 7))),

            // SET n
            3 => Some(value | (1 << ((op >> 3) & 7))),

            _ => unreachable!(),
        }
    }
}
