//! Execution of the unprefixed opcode table.
//!
//! Every body returns the documented T-state total for the form it
//! executed. Under a DD/FD prefix the same bodies run with the index
//! rewrite applied: HL-as-register becomes IX/IY, the (HL) memory operand
//! becomes (IX+d)/(IY+d) with its own timing, and H/L as plain registers
//! become the index halves. EX DE,HL and EXX are exempt from the rewrite.

#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]

use device_core::MemoryBus;

use crate::alu;
use crate::flags::{CF, HF, NF, PF, SF, XF, YF, ZF, sz53p};

use super::{IndexMode, Z80};

impl Z80 {
    /// Execute one instruction from the main table.
    pub(super) fn execute_main<B: MemoryBus>(
        &mut self,
        bus: &mut B,
        op: u8,
        index: IndexMode,
    ) -> u32 {
        let pt = index.prefix_t();

        match op {
            // NOP
            0x00 => 4 + pt,

            // LD rr, nn (01=BC, 11=DE, 21=HL/IX/IY, 31=SP)
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch_word(bus);
                self.set_reg16((op >> 4) & 3, index, value);
                10 + pt
            }

            // LD (BC), A
            0x02 => {
                let addr = self.regs.bc();
                self.write_byte(bus, addr, self.regs.a);
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | (addr.wrapping_add(1) & 0x00FF);
                7 + pt
            }

            // INC rr (03=BC, 13=DE, 23=HL/IX/IY, 33=SP)
            0x03 | 0x13 | 0x23 | 0x33 => {
                let rp = (op >> 4) & 3;
                let value = self.get_reg16(rp, index).wrapping_add(1);
                self.set_reg16(rp, index, value);
                6 + pt
            }

            // INC r / INC (HL) / INC (IX+d)
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let r = (op >> 3) & 7;
                if r == 6 {
                    let addr = self.mem_operand_addr(bus, index);
                    let result = alu::inc8(self.read_byte(bus, addr));
                    self.write_byte(bus, addr, result.value);
                    self.regs.f = (self.regs.f & CF) | result.flags;
                    if index.is_hl() { 11 } else { 23 }
                } else {
                    let result = alu::inc8(self.get_reg8_indexed(r, index));
                    self.set_reg8_indexed(r, index, result.value);
                    self.regs.f = (self.regs.f & CF) | result.flags;
                    4 + pt
                }
            }

            // DEC r / DEC (HL) / DEC (IX+d)
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let r = (op >> 3) & 7;
                if r == 6 {
                    let addr = self.mem_operand_addr(bus, index);
                    let result = alu::dec8(self.read_byte(bus, addr));
                    self.write_byte(bus, addr, result.value);
                    self.regs.f = (self.regs.f & CF) | result.flags;
                    if index.is_hl() { 11 } else { 23 }
                } else {
                    let result = alu::dec8(self.get_reg8_indexed(r, index));
                    self.set_reg8_indexed(r, index, result.value);
                    self.regs.f = (self.regs.f & CF) | result.flags;
                    4 + pt
                }
            }

            // LD r, n / LD (HL), n / LD (IX+d), n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let r = (op >> 3) & 7;
                if r == 6 {
                    // Displacement comes before the immediate byte.
                    let addr = self.mem_operand_addr(bus, index);
                    let value = self.fetch_byte(bus);
                    self.write_byte(bus, addr, value);
                    if index.is_hl() { 10 } else { 19 }
                } else {
                    let value = self.fetch_byte(bus);
                    self.set_reg8_indexed(r, index, value);
                    7 + pt
                }
            }

            // RLCA
            0x07 => {
                let carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | carry;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if carry != 0 { CF } else { 0 };
                4 + pt
            }

            // EX AF, AF'
            0x08 => {
                self.regs.exchange_af();
                4 + pt
            }

            // ADD HL, rr (09=BC, 19=DE, 29=HL/IX/IY, 39=SP)
            0x09 | 0x19 | 0x29 | 0x39 => {
                let dest = self.index_reg(index);
                let rr = self.get_reg16((op >> 4) & 3, index);
                self.regs.wz = dest.wrapping_add(1);
                let (result, flags) = alu::add16(dest, rr);
                self.set_index_reg(index, result);
                self.regs.f = (self.regs.f & (SF | ZF | PF)) | flags;
                11 + pt
            }

            // LD A, (BC)
            0x0A => {
                let addr = self.regs.bc();
                self.regs.a = self.read_byte(bus, addr);
                self.regs.wz = addr.wrapping_add(1);
                7 + pt
            }

            // DEC rr (0B=BC, 1B=DE, 2B=HL/IX/IY, 3B=SP)
            0x0B | 0x1B | 0x2B | 0x3B => {
                let rp = (op >> 4) & 3;
                let value = self.get_reg16(rp, index).wrapping_sub(1);
                self.set_reg16(rp, index, value);
                6 + pt
            }

            // RRCA
            0x0F => {
                let carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | (carry << 7);
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if carry != 0 { CF } else { 0 };
                4 + pt
            }

            // DJNZ e
            0x10 => {
                let displacement = self.fetch_byte(bus) as i8;
                self.regs.b = self.regs.b.wrapping_sub(1);
                if self.regs.b != 0 {
                    self.regs.pc = self.regs.pc.wrapping_add(displacement as u16);
                    self.regs.wz = self.regs.pc;
                    13 + pt
                } else {
                    8 + pt
                }
            }

            // LD (DE), A
            0x12 => {
                let addr = self.regs.de();
                self.write_byte(bus, addr, self.regs.a);
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | (addr.wrapping_add(1) & 0x00FF);
                7 + pt
            }

            // RLA
            0x17 => {
                let old_carry = self.regs.f & CF;
                let new_carry = self.regs.a >> 7;
                self.regs.a = (self.regs.a << 1) | old_carry;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if new_carry != 0 { CF } else { 0 };
                4 + pt
            }

            // JR e
            0x18 => {
                let displacement = self.fetch_byte(bus) as i8;
                self.regs.pc = self.regs.pc.wrapping_add(displacement as u16);
                self.regs.wz = self.regs.pc;
                12 + pt
            }

            // LD A, (DE)
            0x1A => {
                let addr = self.regs.de();
                self.regs.a = self.read_byte(bus, addr);
                self.regs.wz = addr.wrapping_add(1);
                7 + pt
            }

            // RRA
            0x1F => {
                let old_carry = (self.regs.f & CF) << 7;
                let new_carry = self.regs.a & 1;
                self.regs.a = (self.regs.a >> 1) | old_carry;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (YF | XF))
                    | if new_carry != 0 { CF } else { 0 };
                4 + pt
            }

            // JR cc, e (20=NZ, 28=Z, 30=NC, 38=C)
            0x20 | 0x28 | 0x30 | 0x38 => {
                let displacement = self.fetch_byte(bus) as i8;
                let taken = match (op >> 3) & 3 {
                    0 => self.regs.f & ZF == 0,
                    1 => self.regs.f & ZF != 0,
                    2 => self.regs.f & CF == 0,
                    3 => self.regs.f & CF != 0,
                    _ => unreachable!(),
                };
                if taken {
                    self.regs.pc = self.regs.pc.wrapping_add(displacement as u16);
                    self.regs.wz = self.regs.pc;
                    12 + pt
                } else {
                    7 + pt
                }
            }

            // LD (nn), HL/IX/IY
            0x22 => {
                let addr = self.fetch_word(bus);
                let value = self.index_reg(index);
                self.write_word(bus, addr, value);
                self.regs.wz = addr.wrapping_add(1);
                16 + pt
            }

            // DAA
            0x27 => {
                let result = alu::daa(self.regs.a, self.regs.f);
                self.regs.a = result.value;
                self.regs.f = result.flags;
                4 + pt
            }

            // LD HL/IX/IY, (nn)
            0x2A => {
                let addr = self.fetch_word(bus);
                let value = self.read_word(bus, addr);
                self.set_index_reg(index, value);
                self.regs.wz = addr.wrapping_add(1);
                16 + pt
            }

            // CPL
            0x2F => {
                self.regs.a = !self.regs.a;
                self.regs.f = (self.regs.f & (SF | ZF | PF | CF))
                    | HF
                    | NF
                    | (self.regs.a & (XF | YF));
                4 + pt
            }

            // LD (nn), A
            0x32 => {
                let addr = self.fetch_word(bus);
                self.write_byte(bus, addr, self.regs.a);
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | (addr.wrapping_add(1) & 0x00FF);
                13 + pt
            }

            // SCF: X/Y from A
            0x37 => {
                self.regs.f =
                    (self.regs.f & (SF | ZF | PF)) | CF | (self.regs.a & (XF | YF));
                4 + pt
            }

            // LD A, (nn)
            0x3A => {
                let addr = self.fetch_word(bus);
                self.regs.a = self.read_byte(bus, addr);
                self.regs.wz = addr.wrapping_add(1);
                13 + pt
            }

            // CCF: previous carry becomes half-carry, X/Y from A
            0x3F => {
                let old_carry = self.regs.f & CF;
                self.regs.f = (self.regs.f & (SF | ZF | PF))
                    | (self.regs.a & (XF | YF))
                    | if old_carry != 0 { HF } else { CF };
                4 + pt
            }

            // HALT
            0x76 => {
                self.regs.halted = true;
                4 + pt
            }

            // LD r, r' (40-7F except 76)
            0x40..=0x7F => {
                let src = op & 7;
                let dst = (op >> 3) & 7;
                if src == 6 {
                    // LD r, (HL)/(IX+d): destination is the real register
                    // even when it is H or L.
                    let addr = self.mem_operand_addr(bus, index);
                    let value = self.read_byte(bus, addr);
                    self.set_reg8(dst, value);
                    if index.is_hl() { 7 } else { 19 }
                } else if dst == 6 {
                    // LD (HL)/(IX+d), r: source is the real register.
                    let addr = self.mem_operand_addr(bus, index);
                    let value = self.get_reg8(src);
                    self.write_byte(bus, addr, value);
                    if index.is_hl() { 7 } else { 19 }
                } else {
                    let value = self.get_reg8_indexed(src, index);
                    self.set_reg8_indexed(dst, index, value);
                    4 + pt
                }
            }

            // ALU A, r / ALU A, (HL)/(IX+d) (80-BF)
            0x80..=0xBF => {
                let r = op & 7;
                if r == 6 {
                    let addr = self.mem_operand_addr(bus, index);
                    let value = self.read_byte(bus, addr);
                    self.alu_a(op, value);
                    if index.is_hl() { 7 } else { 19 }
                } else {
                    let value = self.get_reg8_indexed(r, index);
                    self.alu_a(op, value);
                    4 + pt
                }
            }

            // RET cc
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition((op >> 3) & 7) {
                    let addr = self.pop_word(bus);
                    self.regs.pc = addr;
                    self.regs.wz = addr;
                    11 + pt
                } else {
                    5 + pt
                }
            }

            // POP rr (C1=BC, D1=DE, E1=HL/IX/IY, F1=AF)
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop_word(bus);
                self.set_reg16_stack((op >> 4) & 3, index, value);
                10 + pt
            }

            // JP cc, nn
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let addr = self.fetch_word(bus);
                self.regs.wz = addr;
                if self.condition((op >> 3) & 7) {
                    self.regs.pc = addr;
                }
                10 + pt
            }

            // JP nn
            0xC3 => {
                let addr = self.fetch_word(bus);
                self.regs.pc = addr;
                self.regs.wz = addr;
                10 + pt
            }

            // CALL cc, nn
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let target = self.fetch_word(bus);
                self.regs.wz = target;
                if self.condition((op >> 3) & 7) {
                    let return_addr = self.regs.pc;
                    self.push_word(bus, return_addr);
                    self.regs.pc = target;
                    17 + pt
                } else {
                    10 + pt
                }
            }

            // PUSH rr (C5=BC, D5=DE, E5=HL/IX/IY, F5=AF)
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let value = self.get_reg16_stack((op >> 4) & 3, index);
                self.push_word(bus, value);
                11 + pt
            }

            // ALU A, n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch_byte(bus);
                self.alu_a(op, value);
                7 + pt
            }

            // RST n
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let target = u16::from(op & 0x38);
                let return_addr = self.regs.pc;
                self.push_word(bus, return_addr);
                self.regs.pc = target;
                self.regs.wz = target;
                11 + pt
            }

            // RET
            0xC9 => {
                let addr = self.pop_word(bus);
                self.regs.pc = addr;
                self.regs.wz = addr;
                10 + pt
            }

            // CALL nn
            0xCD => {
                let target = self.fetch_word(bus);
                self.regs.wz = target;
                let return_addr = self.regs.pc;
                self.push_word(bus, return_addr);
                self.regs.pc = target;
                17 + pt
            }

            // OUT (n), A: port address is A on the high half
            0xD3 => {
                let n = self.fetch_byte(bus);
                let port = (u16::from(self.regs.a) << 8) | u16::from(n);
                self.io_write_byte(bus, port, self.regs.a);
                self.regs.wz =
                    (u16::from(self.regs.a) << 8) | u16::from(n.wrapping_add(1));
                11 + pt
            }

            // EXX
            0xD9 => {
                self.regs.exchange_register_banks();
                4 + pt
            }

            // IN A, (n): no flags affected
            0xDB => {
                let n = self.fetch_byte(bus);
                let port = (u16::from(self.regs.a) << 8) | u16::from(n);
                self.regs.a = self.io_read_byte(bus, port);
                self.regs.wz = port.wrapping_add(1);
                11 + pt
            }

            // EX (SP), HL/IX/IY
            0xE3 => {
                let stacked = self.read_word(bus, self.regs.sp);
                let value = self.index_reg(index);
                self.write_word(bus, self.regs.sp, value);
                self.set_index_reg(index, stacked);
                self.regs.wz = stacked;
                19 + pt
            }

            // JP (HL)/(IX)/(IY)
            0xE9 => {
                self.regs.pc = self.index_reg(index);
                4 + pt
            }

            // EX DE, HL: always the real DE and HL, prefix or not
            0xEB => {
                self.regs.exchange_de_hl();
                4 + pt
            }

            // DI
            0xF3 => {
                self.regs.iff1 = false;
                self.regs.iff2 = false;
                4 + pt
            }

            // LD SP, HL/IX/IY
            0xF9 => {
                self.regs.sp = self.index_reg(index);
                6 + pt
            }

            // EI: acceptance is deferred by the caller for one opcode
            0xFB => {
                self.regs.iff1 = true;
                self.regs.iff2 = true;
                4 + pt
            }

            // CB/ED/DD/FD never reach here; the fetch loop routes them.
            _ => unreachable!("prefix byte {op:#04X} dispatched as an opcode"),
        }
    }

    /// Perform an ALU-group operation on A.
    pub(super) fn alu_a(&mut self, op: u8, value: u8) {
        match (op >> 3) & 7 {
            0 => {
                // ADD
                let result = alu::add8(self.regs.a, value, false);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            1 => {
                // ADC
                let result = alu::add8(self.regs.a, value, self.regs.f & CF != 0);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            2 => {
                // SUB
                let result = alu::sub8(self.regs.a, value, false);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            3 => {
                // SBC
                let result = alu::sub8(self.regs.a, value, self.regs.f & CF != 0);
                self.regs.a = result.value;
                self.regs.f = result.flags;
            }
            4 => {
                // AND
                self.regs.a &= value;
                self.regs.f = sz53p(self.regs.a) | HF;
            }
            5 => {
                // XOR
                self.regs.a ^= value;
                self.regs.f = sz53p(self.regs.a);
            }
            6 => {
                // OR
                self.regs.a |= value;
                self.regs.f = sz53p(self.regs.a);
            }
            7 => {
                // CP: X/Y track the operand, not the difference
                let result = alu::sub8(self.regs.a, value, false);
                self.regs.f = (result.flags & !(YF | XF)) | (value & (YF | XF));
            }
            _ => unreachable!(),
        }
    }
}
