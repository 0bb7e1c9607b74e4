//! Execution of the ED-prefixed table: block operations, 16-bit
//! carry arithmetic, I/R moves and the interrupt-mode controls.
//!
//! The ED table is never index-rewritten; an ED byte cancels any pending
//! DD/FD prefix. Opcodes the table does not define execute as 8 T-state
//! NOPs, warned about once per opcode number.

#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::cast_possible_truncation)]

use device_core::MemoryBus;

use crate::alu;
use crate::flags::{parity, sz53, sz53p, CF, HF, NF, PF, SF, XF, YF, ZF};
use crate::cpu::IndexMode;

use super::Z80;

impl Z80 {
    /// Execute an ED-prefixed instruction.
    pub(super) fn execute_ed<B: MemoryBus>(&mut self, bus: &mut B, op: u8) -> u32 {
        match op {
            // IN r, (C): 0x70 is the undocumented flags-only form
            0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x70 | 0x78 => {
                let port = self.regs.bc();
                let value = self.io_read_byte(bus, port);
                let r = (op >> 3) & 7;
                if r != 6 {
                    self.set_reg8(r, value);
                }
                self.regs.f = (self.regs.f & CF) | sz53p(value);
                self.regs.wz = port.wrapping_add(1);
                12
            }

            // OUT (C), r: 0x71 is the undocumented OUT (C),0
            0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x71 | 0x79 => {
                let port = self.regs.bc();
                let r = (op >> 3) & 7;
                let value = if r == 6 { 0 } else { self.get_reg8(r) };
                self.io_write_byte(bus, port, value);
                self.regs.wz = port.wrapping_add(1);
                12
            }

            // SBC HL, rr
            0x42 | 0x52 | 0x62 | 0x72 => {
                let hl = self.regs.hl();
                let rr = self.get_reg16((op >> 4) & 3, IndexMode::Hl);
                self.regs.wz = hl.wrapping_add(1);
                let (result, flags) = alu::sbc16(hl, rr, self.regs.f & CF != 0);
                self.regs.set_hl(result);
                self.regs.f = flags;
                15
            }

            // ADC HL, rr
            0x4A | 0x5A | 0x6A | 0x7A => {
                let hl = self.regs.hl();
                let rr = self.get_reg16((op >> 4) & 3, IndexMode::Hl);
                self.regs.wz = hl.wrapping_add(1);
                let (result, flags) = alu::adc16(hl, rr, self.regs.f & CF != 0);
                self.regs.set_hl(result);
                self.regs.f = flags;
                15
            }

            // LD (nn), rr
            0x43 | 0x53 | 0x63 | 0x73 => {
                let addr = self.fetch_word(bus);
                let value = self.get_reg16((op >> 4) & 3, IndexMode::Hl);
                self.write_word(bus, addr, value);
                self.regs.wz = addr.wrapping_add(1);
                20
            }

            // LD rr, (nn)
            0x4B | 0x5B | 0x6B | 0x7B => {
                let addr = self.fetch_word(bus);
                let value = self.read_word(bus, addr);
                self.set_reg16((op >> 4) & 3, IndexMode::Hl, value);
                self.regs.wz = addr.wrapping_add(1);
                20
            }

            // NEG (documented 0x44 plus undocumented aliases)
            0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => {
                let result = alu::neg8(self.regs.a);
                self.regs.a = result.value;
                self.regs.f = result.flags;
                8
            }

            // RETN (and aliases) / RETI: both restore IFF1 from IFF2
            0x45 | 0x4D | 0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => {
                let addr = self.pop_word(bus);
                self.regs.pc = addr;
                self.regs.wz = addr;
                self.regs.iff1 = self.regs.iff2;
                14
            }

            // IM 0 (0x4E/0x6E undocumented, behave as IM 0)
            0x46 | 0x4E | 0x66 | 0x6E => {
                self.regs.im = 0;
                8
            }

            // IM 1
            0x56 | 0x76 => {
                self.regs.im = 1;
                8
            }

            // IM 2
            0x5E | 0x7E => {
                self.regs.im = 2;
                8
            }

            // LD I, A
            0x47 => {
                self.regs.i = self.regs.a;
                9
            }

            // LD R, A: the one path that loads R's bit 7
            0x4F => {
                self.regs.r = self.regs.a;
                9
            }

            // LD A, I: P/V exposes IFF2
            0x57 => {
                self.regs.a = self.regs.i;
                self.regs.f = (self.regs.f & CF)
                    | sz53(self.regs.a)
                    | if self.regs.iff2 { PF } else { 0 };
                9
            }

            // LD A, R: P/V exposes IFF2
            0x5F => {
                self.regs.a = self.regs.r;
                self.regs.f = (self.regs.f & CF)
                    | sz53(self.regs.a)
                    | if self.regs.iff2 { PF } else { 0 };
                9
            }

            // RRD
            0x67 => {
                let addr = self.regs.hl();
                let m = self.read_byte(bus, addr);
                let (result, new_m) = alu::rrd(self.regs.a, m);
                self.write_byte(bus, addr, new_m);
                self.regs.a = result.value;
                self.regs.f = (self.regs.f & CF) | result.flags;
                self.regs.wz = addr.wrapping_add(1);
                18
            }

            // RLD
            0x6F => {
                let addr = self.regs.hl();
                let m = self.read_byte(bus, addr);
                let (result, new_m) = alu::rld(self.regs.a, m);
                self.write_byte(bus, addr, new_m);
                self.regs.a = result.value;
                self.regs.f = (self.regs.f & CF) | result.flags;
                self.regs.wz = addr.wrapping_add(1);
                18
            }

            // LDI / LDD / LDIR / LDDR
            0xA0 => self.block_transfer(bus, 1, false),
            0xA8 => self.block_transfer(bus, u16::MAX, false),
            0xB0 => self.block_transfer(bus, 1, true),
            0xB8 => self.block_transfer(bus, u16::MAX, true),

            // CPI / CPD / CPIR / CPDR
            0xA1 => self.block_compare(bus, 1, false),
            0xA9 => self.block_compare(bus, u16::MAX, false),
            0xB1 => self.block_compare(bus, 1, true),
            0xB9 => self.block_compare(bus, u16::MAX, true),

            // INI / IND / INIR / INDR
            0xA2 => self.block_in(bus, 1, false),
            0xAA => self.block_in(bus, u16::MAX, false),
            0xB2 => self.block_in(bus, 1, true),
            0xBA => self.block_in(bus, u16::MAX, true),

            // OUTI / OUTD / OTIR / OTDR
            0xA3 => self.block_out(bus, 1, false),
            0xAB => self.block_out(bus, u16::MAX, false),
            0xB3 => self.block_out(bus, 1, true),
            0xBB => self.block_out(bus, u16::MAX, true),

            // Everything else in the ED space is a two-byte NOP.
            _ => {
                self.warn_unimplemented_ed(op);
                8
            }
        }
    }

    /// One iteration of LDI/LDD (and the repeating forms).
    ///
    /// `delta` is +1 or -1 as a wrapping u16. A repeating form whose BC is
    /// still nonzero rewinds PC onto its own ED prefix so the scheduler
    /// re-enters the same instruction, and bills the longer cycle count.
    fn block_transfer<B: MemoryBus>(&mut self, bus: &mut B, delta: u16, repeat: bool) -> u32 {
        let hl = self.regs.hl();
        let de = self.regs.de();
        let value = self.read_byte(bus, hl);
        self.write_byte(bus, de, value);
        self.regs.set_hl(hl.wrapping_add(delta));
        self.regs.set_de(de.wrapping_add(delta));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);

        // X/Y come from A + transferred byte: X is its bit 3, Y its bit 1.
        let n = self.regs.a.wrapping_add(value);
        let mut flags = self.regs.f & (SF | ZF | CF);
        if n & 0x08 != 0 {
            flags |= XF;
        }
        if n & 0x02 != 0 {
            flags |= YF;
        }
        if bc != 0 {
            flags |= PF;
        }
        self.regs.f = flags;

        if repeat && bc != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
            21
        } else {
            16
        }
    }

    /// One iteration of CPI/CPD (and the repeating forms).
    fn block_compare<B: MemoryBus>(&mut self, bus: &mut B, delta: u16, repeat: bool) -> u32 {
        let hl = self.regs.hl();
        let value = self.read_byte(bus, hl);
        self.regs.set_hl(hl.wrapping_add(delta));
        let bc = self.regs.bc().wrapping_sub(1);
        self.regs.set_bc(bc);

        let result = self.regs.a.wrapping_sub(value);
        let half_borrow = (self.regs.a & 0x0F) < (value & 0x0F);

        let mut flags = (self.regs.f & CF) | NF;
        if result & 0x80 != 0 {
            flags |= SF;
        }
        if result == 0 {
            flags |= ZF;
        }
        if half_borrow {
            flags |= HF;
        }
        // X/Y from the difference minus the half-borrow
        let n = result.wrapping_sub(u8::from(half_borrow));
        if n & 0x08 != 0 {
            flags |= XF;
        }
        if n & 0x02 != 0 {
            flags |= YF;
        }
        if bc != 0 {
            flags |= PF;
        }
        self.regs.f = flags;
        self.regs.wz = self.regs.wz.wrapping_add(delta);

        if repeat && bc != 0 && result != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            self.regs.wz = self.regs.pc.wrapping_add(1);
            21
        } else {
            16
        }
    }

    /// One iteration of INI/IND (and the repeating forms).
    fn block_in<B: MemoryBus>(&mut self, bus: &mut B, delta: u16, repeat: bool) -> u32 {
        let port = self.regs.bc();
        self.regs.wz = port.wrapping_add(delta);
        let value = self.io_read_byte(bus, port);
        let hl = self.regs.hl();
        self.write_byte(bus, hl, value);
        self.regs.set_hl(hl.wrapping_add(delta));
        let b = self.regs.b.wrapping_sub(1);
        self.regs.b = b;

        // The baroque block-I/O flag recipe from The Undocumented Z80
        // Documented: S/Z/X/Y track the new B, N is bit 7 of the data,
        // H and C come from value + (C+1 or C-1) overflowing a byte.
        let mut flags = sz53(b);
        if value & 0x80 != 0 {
            flags |= NF;
        }
        let k = u16::from(value) + u16::from(self.regs.c.wrapping_add(delta as u8));
        if k > 0xFF {
            flags |= HF | CF;
        }
        if parity((k as u8 & 0x07) ^ b) {
            flags |= PF;
        }
        self.regs.f = flags;

        if repeat && b != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }

    /// One iteration of OUTI/OUTD (and the repeating forms).
    fn block_out<B: MemoryBus>(&mut self, bus: &mut B, delta: u16, repeat: bool) -> u32 {
        let hl = self.regs.hl();
        let value = self.read_byte(bus, hl);
        // B decrements before the port address forms.
        let b = self.regs.b.wrapping_sub(1);
        self.regs.b = b;
        let port = self.regs.bc();
        self.io_write_byte(bus, port, value);
        self.regs.set_hl(hl.wrapping_add(delta));
        self.regs.wz = port.wrapping_add(delta);

        let mut flags = sz53(b);
        if value & 0x80 != 0 {
            flags |= NF;
        }
        let k = u16::from(value) + u16::from(self.regs.l);
        if k > 0xFF {
            flags |= HF | CF;
        }
        if parity((k as u8 & 0x07) ^ b) {
            flags |= PF;
        }
        self.regs.f = flags;

        if repeat && b != 0 {
            self.regs.pc = self.regs.pc.wrapping_sub(2);
            21
        } else {
            16
        }
    }
}
