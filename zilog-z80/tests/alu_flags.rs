//! Exhaustive flag checks for the single-byte ALU group, plus the CB-table
//! rotate and bit operations.
//!
//! Every 8-bit × 8-bit operand combination is run through the CPU and
//! compared against reference flag recipes computed here with independent
//! formulations (signed range checks for overflow, bit-fold parity).

use device_core::SimpleBus;
use zilog_z80::{Z80, CF, HF, NF, PF, SF, XF, YF, ZF};

/// Execute one `ALU A, B` opcode with the given inputs.
fn exec_alu(cpu: &mut Z80, bus: &mut SimpleBus, opcode: u8, a: u8, b: u8, carry: bool) -> (u8, u8) {
    cpu.registers_mut().pc = 0;
    cpu.registers_mut().a = a;
    cpu.registers_mut().b = b;
    cpu.registers_mut().f = if carry { CF } else { 0 };
    bus.load(0, &[opcode]);
    let t = cpu.execute_step(bus);
    assert_eq!(t, 4);
    let regs = cpu.registers();
    (regs.a, regs.f)
}

/// Parity by bit-fold: true when the 1-bit count is even.
fn even_parity(value: u8) -> bool {
    let mut v = value;
    v ^= v >> 4;
    v ^= v >> 2;
    v ^= v >> 1;
    v & 1 == 0
}

fn ref_add(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let c = u8::from(carry_in);
    let result = a.wrapping_add(b).wrapping_add(c);
    let mut f = 0;
    if result >= 0x80 {
        f |= SF;
    }
    if result == 0 {
        f |= ZF;
    }
    f |= result & (XF | YF);
    if (a & 0x0F) + (b & 0x0F) + c > 0x0F {
        f |= HF;
    }
    let signed = i16::from(a as i8) + i16::from(b as i8) + i16::from(c);
    if !(-128..=127).contains(&signed) {
        f |= PF;
    }
    if u16::from(a) + u16::from(b) + u16::from(c) > 0xFF {
        f |= CF;
    }
    (result, f)
}

fn ref_sub(a: u8, b: u8, carry_in: bool) -> (u8, u8) {
    let c = u8::from(carry_in);
    let result = a.wrapping_sub(b).wrapping_sub(c);
    let mut f = NF;
    if result >= 0x80 {
        f |= SF;
    }
    if result == 0 {
        f |= ZF;
    }
    f |= result & (XF | YF);
    if (a & 0x0F) < (b & 0x0F) + c {
        f |= HF;
    }
    let signed = i16::from(a as i8) - i16::from(b as i8) - i16::from(c);
    if !(-128..=127).contains(&signed) {
        f |= PF;
    }
    if u16::from(a) < u16::from(b) + u16::from(c) {
        f |= CF;
    }
    (result, f)
}

fn ref_logic(result: u8, h: bool) -> u8 {
    let mut f = 0;
    if result >= 0x80 {
        f |= SF;
    }
    if result == 0 {
        f |= ZF;
    }
    f |= result & (XF | YF);
    if h {
        f |= HF;
    }
    if even_parity(result) {
        f |= PF;
    }
    f
}

#[test]
fn add_a_b_exhaustive() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    for a in 0..=255u8 {
        for b in 0..=255u8 {
            let (value, flags) = exec_alu(&mut cpu, &mut bus, 0x80, a, b, false);
            let (want_value, want_flags) = ref_add(a, b, false);
            assert_eq!(value, want_value, "ADD {a:#04X},{b:#04X} result");
            assert_eq!(flags, want_flags, "ADD {a:#04X},{b:#04X} flags");
        }
    }
}

#[test]
fn adc_a_b_exhaustive() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    for carry in [false, true] {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                let (value, flags) = exec_alu(&mut cpu, &mut bus, 0x88, a, b, carry);
                let (want_value, want_flags) = ref_add(a, b, carry);
                assert_eq!(value, want_value, "ADC {a:#04X},{b:#04X},c={carry}");
                assert_eq!(flags, want_flags, "ADC {a:#04X},{b:#04X},c={carry} flags");
            }
        }
    }
}

#[test]
fn sub_a_b_exhaustive() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    for a in 0..=255u8 {
        for b in 0..=255u8 {
            let (value, flags) = exec_alu(&mut cpu, &mut bus, 0x90, a, b, false);
            let (want_value, want_flags) = ref_sub(a, b, false);
            assert_eq!(value, want_value, "SUB {a:#04X},{b:#04X} result");
            assert_eq!(flags, want_flags, "SUB {a:#04X},{b:#04X} flags");
        }
    }
}

#[test]
fn sbc_a_b_exhaustive() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    for carry in [false, true] {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                let (value, flags) = exec_alu(&mut cpu, &mut bus, 0x98, a, b, carry);
                let (want_value, want_flags) = ref_sub(a, b, carry);
                assert_eq!(value, want_value, "SBC {a:#04X},{b:#04X},c={carry}");
                assert_eq!(flags, want_flags, "SBC {a:#04X},{b:#04X},c={carry} flags");
            }
        }
    }
}

#[test]
fn and_xor_or_exhaustive() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    for a in 0..=255u8 {
        for b in 0..=255u8 {
            let (value, flags) = exec_alu(&mut cpu, &mut bus, 0xA0, a, b, true);
            assert_eq!(value, a & b);
            assert_eq!(flags, ref_logic(a & b, true), "AND {a:#04X},{b:#04X}");

            let (value, flags) = exec_alu(&mut cpu, &mut bus, 0xA8, a, b, true);
            assert_eq!(value, a ^ b);
            assert_eq!(flags, ref_logic(a ^ b, false), "XOR {a:#04X},{b:#04X}");

            let (value, flags) = exec_alu(&mut cpu, &mut bus, 0xB0, a, b, true);
            assert_eq!(value, a | b);
            assert_eq!(flags, ref_logic(a | b, false), "OR {a:#04X},{b:#04X}");
        }
    }
}

#[test]
fn cp_a_b_exhaustive() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    for a in 0..=255u8 {
        for b in 0..=255u8 {
            let (value, flags) = exec_alu(&mut cpu, &mut bus, 0xB8, a, b, false);
            assert_eq!(value, a, "CP leaves A untouched");
            // CP takes X/Y from the operand rather than the difference.
            let (_, sub_flags) = ref_sub(a, b, false);
            let want = (sub_flags & !(XF | YF)) | (b & (XF | YF));
            assert_eq!(flags, want, "CP {a:#04X},{b:#04X} flags");
        }
    }
}

#[test]
fn add_a_a_overflow_case() {
    // ADD A,A with A=0x80: result 0x00 with Z, P/V and C set.
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    let (value, flags) = exec_alu(&mut cpu, &mut bus, 0x87, 0x80, 0x00, false);

    assert_eq!(value, 0x00);
    assert_eq!(flags, ZF | PF | CF);
}

#[test]
fn inc_dec_preserve_carry() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();

    cpu.registers_mut().b = 0x7F;
    cpu.registers_mut().f = CF;
    bus.load(0, &[0x04]); // INC B
    cpu.registers_mut().pc = 0;
    cpu.execute_step(&mut bus);
    let f = cpu.registers().f;
    assert_eq!(cpu.registers().b, 0x80);
    assert_ne!(f & PF, 0, "0x7F + 1 overflows");
    assert_ne!(f & CF, 0, "carry survives INC");

    cpu.registers_mut().b = 0x80;
    cpu.registers_mut().f = CF;
    bus.load(0, &[0x05]); // DEC B
    cpu.registers_mut().pc = 0;
    cpu.execute_step(&mut bus);
    let f = cpu.registers().f;
    assert_eq!(cpu.registers().b, 0x7F);
    assert_ne!(f & PF, 0, "0x80 - 1 overflows");
    assert_ne!(f & NF, 0);
    assert_ne!(f & CF, 0, "carry survives DEC");
}

#[test]
fn neg_inverts_a() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[0xED, 0x44]); // NEG

    cpu.registers_mut().a = 0x01;
    cpu.execute_step(&mut bus);
    assert_eq!(cpu.registers().a, 0xFF);
    assert_ne!(cpu.registers().f & CF, 0, "NEG of nonzero borrows");
    assert_ne!(cpu.registers().f & NF, 0);
}

// =============================================================================
// CB table
// =============================================================================

/// Execute one CB-prefixed opcode against register B.
fn exec_cb(cpu: &mut Z80, bus: &mut SimpleBus, op: u8, b: u8, carry: bool) -> (u8, u8, u32) {
    cpu.registers_mut().pc = 0;
    cpu.registers_mut().b = b;
    cpu.registers_mut().f = if carry { CF } else { 0 };
    bus.load(0, &[0xCB, op]);
    let t = cpu.execute_step(bus);
    let regs = cpu.registers();
    (regs.b, regs.f, t)
}

#[test]
fn rlc_b_rotates_bit7_to_carry_and_bit0() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    let (b, f, t) = exec_cb(&mut cpu, &mut bus, 0x00, 0b1000_0001, false);
    assert_eq!(b, 0b0000_0011);
    assert_ne!(f & CF, 0);
    assert_eq!(t, 8);
}

#[test]
fn rr_b_pulls_in_old_carry() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    let (b, f, _) = exec_cb(&mut cpu, &mut bus, 0x18, 0b0000_0010, true);
    assert_eq!(b, 0b1000_0001);
    assert_eq!(f & CF, 0, "bit 0 was clear");
}

#[test]
fn sra_preserves_sign_srl_clears_it() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    let (b, _, _) = exec_cb(&mut cpu, &mut bus, 0x28, 0x81, false); // SRA B
    assert_eq!(b, 0xC0);

    let (b, _, _) = exec_cb(&mut cpu, &mut bus, 0x38, 0x81, false); // SRL B
    assert_eq!(b, 0x40);
}

#[test]
fn sll_shifts_in_a_one() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    let (b, f, _) = exec_cb(&mut cpu, &mut bus, 0x30, 0x80, false); // SLL B (undocumented)
    assert_eq!(b, 0x01);
    assert_ne!(f & CF, 0);
}

#[test]
fn bit_7_h_zero_case() {
    // BIT 7,H with H=0: Z, H and P/V set, S clear, C unchanged.
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[0xCB, 0x7C]);
    cpu.registers_mut().h = 0x00;
    cpu.registers_mut().f = CF;
    let t = cpu.execute_step(&mut bus);

    let f = cpu.registers().f;
    assert_ne!(f & ZF, 0);
    assert_ne!(f & HF, 0);
    assert_ne!(f & PF, 0);
    assert_eq!(f & SF, 0);
    assert_ne!(f & CF, 0, "carry rides through BIT");
    assert_eq!(f & NF, 0);
    assert_eq!(t, 8);
}

#[test]
fn bit_7_set_drives_sign_flag() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[0xCB, 0x78]); // BIT 7, B
    cpu.registers_mut().b = 0x80;
    cpu.execute_step(&mut bus);

    let f = cpu.registers().f;
    assert_eq!(f & ZF, 0);
    assert_ne!(f & SF, 0);
}

#[test]
fn bit_on_register_copies_xy_from_value() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[0xCB, 0x40]); // BIT 0, B
    cpu.registers_mut().b = 0b0010_1001;
    cpu.execute_step(&mut bus);

    let f = cpu.registers().f;
    assert_ne!(f & YF, 0, "Y mirrors bit 5 of the operand");
    assert_ne!(f & XF, 0, "X mirrors bit 3 of the operand");
}

#[test]
fn set_and_res_round_trip() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[
        0xCB, 0xE8, // SET 5, B
        0xCB, 0xA8, // RES 5, B
        0x76,       // HALT
    ]);
    cpu.registers_mut().b = 0x00;

    cpu.execute_step(&mut bus);
    assert_eq!(cpu.registers().b, 0x20);
    cpu.execute_step(&mut bus);
    assert_eq!(cpu.registers().b, 0x00);
}

#[test]
fn cb_on_hl_operand() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[0xCB, 0x06]); // RLC (HL)
    bus.load(0x0040, &[0x81]);
    cpu.registers_mut().set_hl(0x0040);

    let t = cpu.execute_step(&mut bus);
    assert_eq!(bus.peek(0x0040), 0x03);
    assert_eq!(t, 15);
}

#[test]
fn rlca_keeps_szp_group() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[0x07]); // RLCA
    cpu.registers_mut().a = 0x80;
    cpu.registers_mut().f = SF | ZF | PF;
    cpu.execute_step(&mut bus);

    let regs = cpu.registers();
    assert_eq!(regs.a, 0x01);
    let f = regs.f;
    assert_ne!(f & CF, 0);
    assert_ne!(f & SF, 0, "RLCA leaves S alone");
    assert_ne!(f & ZF, 0, "RLCA leaves Z alone");
    assert_ne!(f & PF, 0, "RLCA leaves P/V alone");
    assert_eq!(f & (HF | NF), 0);
}

#[test]
fn rld_rotates_through_memory_nibble() {
    let mut cpu = Z80::new();
    let mut bus = SimpleBus::new();
    bus.load(0, &[0xED, 0x6F]); // RLD
    bus.load(0x0040, &[0x31]);
    cpu.registers_mut().a = 0x7A;
    cpu.registers_mut().set_hl(0x0040);

    let t = cpu.execute_step(&mut bus);
    assert_eq!(cpu.registers().a, 0x73);
    assert_eq!(bus.peek(0x0040), 0x1A);
    assert_eq!(t, 18);
}
