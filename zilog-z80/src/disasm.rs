//! Z80 disassembler backing the debug surface.
//!
//! Decodes one instruction at an arbitrary address using transparent bus
//! reads only, so a debugger can walk through ROM without disturbing the
//! simulation. Covers every prefix combination the execution engine
//! accepts, including the DD CB / FD CB form and the undocumented index
//! register halves.

#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::too_many_lines)]

use device_core::MemoryBus;

use crate::cpu::Z80;

/// Result of disassembling one instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Mnemonic with operands (e.g., `LD A,(IX+5)`).
    pub mnemonic: String,
    /// Raw opcode bytes as hex (e.g., `DD 7E 05`).
    pub bytes: String,
    /// Instruction length in bytes, prefixes included.
    pub length: usize,
}

const R: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const RP: [&str; 4] = ["BC", "DE", "HL", "SP"];
const RP_STACK: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CC: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];
const ALU: [&str; 8] = [
    "ADD A,", "ADC A,", "SUB ", "SBC A,", "AND ", "XOR ", "OR ", "CP ",
];
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];

/// Cursor over the instruction bytes, reading transparently.
struct Peek<'a, B: MemoryBus> {
    bus: &'a mut B,
    base: u16,
    offset: u16,
}

impl<'a, B: MemoryBus> Peek<'a, B> {
    fn new(bus: &'a mut B, base: u16) -> Self {
        Self {
            bus,
            base,
            offset: 0,
        }
    }

    fn next(&mut self) -> u8 {
        let byte = self.bus.read(self.base.wrapping_add(self.offset), true).data;
        self.offset += 1;
        byte
    }

    fn next_word(&mut self) -> u16 {
        let lo = self.next();
        let hi = self.next();
        u16::from(lo) | (u16::from(hi) << 8)
    }
}

/// Format a signed displacement as `+d`/`-d`.
fn disp(d: i8) -> String {
    if d < 0 {
        format!("-{}", -i16::from(d))
    } else {
        format!("+{d}")
    }
}

/// The memory operand: `(HL)` or `(IX+d)` with the displacement consumed.
fn mem_operand<B: MemoryBus>(peek: &mut Peek<'_, B>, index: Option<&str>) -> String {
    match index {
        None => "(HL)".to_string(),
        Some(ix) => {
            let d = peek.next() as i8;
            format!("({ix}{})", disp(d))
        }
    }
}

/// An 8-bit register name under the current index rewrite. `code` must
/// not be 6; the memory operand is handled by `mem_operand`.
fn reg_name(code: u8, index: Option<&str>) -> String {
    match (code & 7, index) {
        (4, Some(ix)) => format!("{ix}H"),
        (5, Some(ix)) => format!("{ix}L"),
        (code, _) => R[code as usize].to_string(),
    }
}

/// A register pair name with HL rewritten to IX/IY.
fn pair_name(table: &[&str; 4], code: u8, index: Option<&str>) -> String {
    match (code & 3, index) {
        (2, Some(ix)) => ix.to_string(),
        (code, _) => table[code as usize].to_string(),
    }
}

impl Z80 {
    /// Disassemble the instruction at `address` using transparent reads.
    pub fn get_opcode_info<B: MemoryBus>(&self, bus: &mut B, address: u16) -> OpcodeInfo {
        let mut peek = Peek::new(bus, address);
        let mnemonic = disassemble_one(&mut peek);
        let length = usize::from(peek.offset);

        let mut bytes = String::new();
        for i in 0..peek.offset {
            if i > 0 {
                bytes.push(' ');
            }
            let byte = peek.bus.read(address.wrapping_add(i), true).data;
            bytes.push_str(&format!("{byte:02X}"));
        }

        OpcodeInfo {
            mnemonic,
            bytes,
            length,
        }
    }
}

fn disassemble_one<B: MemoryBus>(peek: &mut Peek<'_, B>) -> String {
    let mut index: Option<&str> = None;
    let mut op = peek.next();
    loop {
        match op {
            0xDD => index = Some("IX"),
            0xFD => index = Some("IY"),
            _ => break,
        }
        op = peek.next();
    }

    match op {
        0xCB if index.is_none() => {
            let op = peek.next();
            disassemble_cb(op, R[(op & 7) as usize], None)
        }
        0xCB => {
            let ix = index.unwrap_or("IX");
            let d = peek.next() as i8;
            let op = peek.next();
            let target = format!("({ix}{})", disp(d));
            let copy = if op & 7 == 6 {
                None
            } else {
                Some(R[(op & 7) as usize])
            };
            disassemble_cb(op, &target, copy)
        }
        0xED => {
            let op = peek.next();
            disassemble_ed(peek, op)
        }
        _ => disassemble_main(peek, op, index),
    }
}

fn disassemble_cb(op: u8, target: &str, copy: Option<&str>) -> String {
    let bit = (op >> 3) & 7;
    let base = match op >> 6 {
        0 => format!("{} {target}", ROT[bit as usize]),
        1 => return format!("BIT {bit},{target}"),
        2 => format!("RES {bit},{target}"),
        3 => format!("SET {bit},{target}"),
        _ => unreachable!(),
    };
    // Indexed forms that also store into a register show both targets.
    match copy {
        Some(reg) => format!("{base},{reg}"),
        None => base,
    }
}

fn disassemble_main<B: MemoryBus>(peek: &mut Peek<'_, B>, op: u8, index: Option<&str>) -> String {
    let y = (op >> 3) & 7;
    let z = op & 7;
    let p = (op >> 4) & 3;

    match op {
        0x00 => "NOP".to_string(),
        0x08 => "EX AF,AF'".to_string(),
        0x10 => {
            let d = peek.next() as i8;
            format!("DJNZ {}", disp(d))
        }
        0x18 => {
            let d = peek.next() as i8;
            format!("JR {}", disp(d))
        }
        0x20 | 0x28 | 0x30 | 0x38 => {
            let d = peek.next() as i8;
            format!("JR {},{}", CC[(y - 4) as usize], disp(d))
        }

        0x01 | 0x11 | 0x21 | 0x31 => {
            let nn = peek.next_word();
            format!("LD {},${nn:04X}", pair_name(&RP, p, index))
        }
        0x09 | 0x19 | 0x29 | 0x39 => {
            let dest = index.unwrap_or("HL");
            format!("ADD {dest},{}", pair_name(&RP, p, index))
        }

        0x02 => "LD (BC),A".to_string(),
        0x0A => "LD A,(BC)".to_string(),
        0x12 => "LD (DE),A".to_string(),
        0x1A => "LD A,(DE)".to_string(),
        0x22 => {
            let nn = peek.next_word();
            format!("LD (${nn:04X}),{}", index.unwrap_or("HL"))
        }
        0x2A => {
            let nn = peek.next_word();
            format!("LD {},(${nn:04X})", index.unwrap_or("HL"))
        }
        0x32 => {
            let nn = peek.next_word();
            format!("LD (${nn:04X}),A")
        }
        0x3A => {
            let nn = peek.next_word();
            format!("LD A,(${nn:04X})")
        }

        0x03 | 0x13 | 0x23 | 0x33 => format!("INC {}", pair_name(&RP, p, index)),
        0x0B | 0x1B | 0x2B | 0x3B => format!("DEC {}", pair_name(&RP, p, index)),

        0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
            let target = if y == 6 {
                mem_operand(peek, index)
            } else {
                reg_name(y, index)
            };
            format!("INC {target}")
        }
        0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
            let target = if y == 6 {
                mem_operand(peek, index)
            } else {
                reg_name(y, index)
            };
            format!("DEC {target}")
        }
        0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
            // Displacement precedes the immediate.
            let target = if y == 6 {
                mem_operand(peek, index)
            } else {
                reg_name(y, index)
            };
            let n = peek.next();
            format!("LD {target},${n:02X}")
        }

        0x07 => "RLCA".to_string(),
        0x0F => "RRCA".to_string(),
        0x17 => "RLA".to_string(),
        0x1F => "RRA".to_string(),
        0x27 => "DAA".to_string(),
        0x2F => "CPL".to_string(),
        0x37 => "SCF".to_string(),
        0x3F => "CCF".to_string(),

        0x76 => "HALT".to_string(),
        0x40..=0x7F => {
            // When one side is the memory operand, the register side is
            // the real H/L, never the index half.
            if z == 6 {
                let src = mem_operand(peek, index);
                format!("LD {},{src}", R[y as usize])
            } else if y == 6 {
                let dst = mem_operand(peek, index);
                format!("LD {dst},{}", R[z as usize])
            } else {
                format!("LD {},{}", reg_name(y, index), reg_name(z, index))
            }
        }

        0x80..=0xBF => {
            let operand = if z == 6 {
                mem_operand(peek, index)
            } else {
                reg_name(z, index)
            };
            format!("{}{operand}", ALU[y as usize])
        }

        0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
            format!("RET {}", CC[y as usize])
        }
        0xC1 | 0xD1 | 0xE1 | 0xF1 => format!("POP {}", pair_name(&RP_STACK, p, index)),
        0xC5 | 0xD5 | 0xE5 | 0xF5 => format!("PUSH {}", pair_name(&RP_STACK, p, index)),
        0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
            let nn = peek.next_word();
            format!("JP {},${nn:04X}", CC[y as usize])
        }
        0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
            let nn = peek.next_word();
            format!("CALL {},${nn:04X}", CC[y as usize])
        }
        0xC3 => {
            let nn = peek.next_word();
            format!("JP ${nn:04X}")
        }
        0xCD => {
            let nn = peek.next_word();
            format!("CALL ${nn:04X}")
        }
        0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
            let n = peek.next();
            format!("{}${n:02X}", ALU[y as usize])
        }
        0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
            format!("RST ${:02X}", op & 0x38)
        }
        0xC9 => "RET".to_string(),
        0xD3 => {
            let n = peek.next();
            format!("OUT (${n:02X}),A")
        }
        0xDB => {
            let n = peek.next();
            format!("IN A,(${n:02X})")
        }
        0xD9 => "EXX".to_string(),
        0xE3 => format!("EX (SP),{}", index.unwrap_or("HL")),
        0xE9 => format!("JP ({})", index.unwrap_or("HL")),
        0xEB => "EX DE,HL".to_string(),
        0xF3 => "DI".to_string(),
        0xF9 => format!("LD SP,{}", index.unwrap_or("HL")),
        0xFB => "EI".to_string(),

        _ => "?".to_string(),
    }
}

fn disassemble_ed<B: MemoryBus>(peek: &mut Peek<'_, B>, op: u8) -> String {
    let y = (op >> 3) & 7;
    let p = (op >> 4) & 3;

    match op {
        0x40 | 0x48 | 0x50 | 0x58 | 0x60 | 0x68 | 0x78 => {
            format!("IN {},(C)", R[y as usize])
        }
        0x70 => "IN (C)".to_string(),
        0x41 | 0x49 | 0x51 | 0x59 | 0x61 | 0x69 | 0x79 => {
            format!("OUT (C),{}", R[y as usize])
        }
        0x71 => "OUT (C),0".to_string(),
        0x42 | 0x52 | 0x62 | 0x72 => format!("SBC HL,{}", RP[p as usize]),
        0x4A | 0x5A | 0x6A | 0x7A => format!("ADC HL,{}", RP[p as usize]),
        0x43 | 0x53 | 0x63 | 0x73 => {
            let nn = peek.next_word();
            format!("LD (${nn:04X}),{}", RP[p as usize])
        }
        0x4B | 0x5B | 0x6B | 0x7B => {
            let nn = peek.next_word();
            format!("LD {},(${nn:04X})", RP[p as usize])
        }
        0x44 | 0x4C | 0x54 | 0x5C | 0x64 | 0x6C | 0x74 | 0x7C => "NEG".to_string(),
        0x45 => "RETN".to_string(),
        0x4D => "RETI".to_string(),
        0x55 | 0x5D | 0x65 | 0x6D | 0x75 | 0x7D => "RETN".to_string(),
        0x46 | 0x4E | 0x66 | 0x6E => "IM 0".to_string(),
        0x56 | 0x76 => "IM 1".to_string(),
        0x5E | 0x7E => "IM 2".to_string(),
        0x47 => "LD I,A".to_string(),
        0x4F => "LD R,A".to_string(),
        0x57 => "LD A,I".to_string(),
        0x5F => "LD A,R".to_string(),
        0x67 => "RRD".to_string(),
        0x6F => "RLD".to_string(),
        0xA0 => "LDI".to_string(),
        0xA1 => "CPI".to_string(),
        0xA2 => "INI".to_string(),
        0xA3 => "OUTI".to_string(),
        0xA8 => "LDD".to_string(),
        0xA9 => "CPD".to_string(),
        0xAA => "IND".to_string(),
        0xAB => "OUTD".to_string(),
        0xB0 => "LDIR".to_string(),
        0xB1 => "CPIR".to_string(),
        0xB2 => "INIR".to_string(),
        0xB3 => "OTIR".to_string(),
        0xB8 => "LDDR".to_string(),
        0xB9 => "CPDR".to_string(),
        0xBA => "INDR".to_string(),
        0xBB => "OTDR".to_string(),
        _ => "NOP*".to_string(),
    }
}
