//! Debug surface tests: disassembler, raw data access, savestates,
//! observable queries and device construction.

use device_core::{Observable, SimpleBus, Value};
use serde_json::json;
use zilog_z80::{BusAccessKind, CeLine, Z80, ZF};

fn disasm(bytes: &[u8]) -> (String, usize) {
    let mut bus = SimpleBus::new();
    bus.load(0x0100, bytes);
    let cpu = Z80::new();
    let info = cpu.get_opcode_info(&mut bus, 0x0100);
    (info.mnemonic, info.length)
}

#[test]
fn disassembles_basic_opcodes() {
    assert_eq!(disasm(&[0x00]), ("NOP".to_string(), 1));
    assert_eq!(disasm(&[0x3E, 0x42]), ("LD A,$42".to_string(), 2));
    assert_eq!(disasm(&[0xC3, 0x34, 0x12]), ("JP $1234".to_string(), 3));
    assert_eq!(disasm(&[0x76]), ("HALT".to_string(), 1));
    assert_eq!(disasm(&[0x10, 0xFE]), ("DJNZ -2".to_string(), 2));
    assert_eq!(disasm(&[0x20, 0x05]), ("JR NZ,+5".to_string(), 2));
    assert_eq!(disasm(&[0x87]), ("ADD A,A".to_string(), 1));
    assert_eq!(disasm(&[0xFE, 0x10]), ("CP $10".to_string(), 2));
    assert_eq!(disasm(&[0x36, 0x7F]), ("LD (HL),$7F".to_string(), 2));
    assert_eq!(disasm(&[0xE3]), ("EX (SP),HL".to_string(), 1));
}

#[test]
fn disassembles_cb_and_ed() {
    assert_eq!(disasm(&[0xCB, 0x11]), ("RL C".to_string(), 2));
    assert_eq!(disasm(&[0xCB, 0x7C]), ("BIT 7,H".to_string(), 2));
    assert_eq!(disasm(&[0xCB, 0xC6]), ("SET 0,(HL)".to_string(), 2));
    assert_eq!(disasm(&[0xED, 0xB0]), ("LDIR".to_string(), 2));
    assert_eq!(disasm(&[0xED, 0x47]), ("LD I,A".to_string(), 2));
    assert_eq!(disasm(&[0xED, 0x5E]), ("IM 2".to_string(), 2));
    assert_eq!(
        disasm(&[0xED, 0x43, 0x00, 0x80]),
        ("LD ($8000),BC".to_string(), 4)
    );
    // Undefined ED opcodes disassemble as the NOP they execute as.
    assert_eq!(disasm(&[0xED, 0x77]), ("NOP*".to_string(), 2));
}

#[test]
fn disassembles_index_forms() {
    assert_eq!(disasm(&[0xDD, 0x21, 0x34, 0x12]), ("LD IX,$1234".to_string(), 4));
    assert_eq!(disasm(&[0xDD, 0x7E, 0x05]), ("LD A,(IX+5)".to_string(), 3));
    assert_eq!(disasm(&[0xFD, 0x66, 0xFD]), ("LD H,(IY-3)".to_string(), 3));
    assert_eq!(disasm(&[0xDD, 0x36, 0x05, 0x42]), ("LD (IX+5),$42".to_string(), 4));
    assert_eq!(disasm(&[0xDD, 0x26, 0x12]), ("LD IXH,$12".to_string(), 3));
    assert_eq!(disasm(&[0xDD, 0x65]), ("LD IXH,IXL".to_string(), 2));
    assert_eq!(disasm(&[0xFD, 0xE9]), ("JP (IY)".to_string(), 2));
}

#[test]
fn disassembles_index_cb_forms() {
    assert_eq!(
        disasm(&[0xDD, 0xCB, 0x05, 0x7E]),
        ("BIT 7,(IX+5)".to_string(), 4)
    );
    // The double-store forms name both destinations.
    assert_eq!(
        disasm(&[0xDD, 0xCB, 0x02, 0x80]),
        ("RES 0,(IX+2),B".to_string(), 4)
    );
    assert_eq!(
        disasm(&[0xFD, 0xCB, 0xFF, 0x06]),
        ("RLC (IY-1)".to_string(), 4)
    );
}

#[test]
fn opcode_info_reports_raw_bytes() {
    let mut bus = SimpleBus::new();
    bus.load(0x0200, &[0xDD, 0x7E, 0x05]);
    let cpu = Z80::new();
    let info = cpu.get_opcode_info(&mut bus, 0x0200);
    assert_eq!(info.bytes, "DD 7E 05");
}

#[test]
fn get_raw_data_peeks_memory() {
    let mut bus = SimpleBus::new();
    bus.load(0x1234, &[0xAB]);
    let cpu = Z80::new();
    assert_eq!(cpu.get_raw_data(&mut bus, 0x1234), 0xAB);
}

#[test]
fn savestate_round_trip() {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[
        0x31, 0x00, 0x80, // LD SP, 0x8000
        0x3E, 0x5A,       // LD A, 0x5A
        0x08,             // EX AF, AF'
        0xFB,             // EI
        0xDD, 0x21, 0x34, 0x12, // LD IX, 0x1234
    ]);

    let mut cpu = Z80::new();
    for _ in 0..5 {
        cpu.execute_step(&mut bus);
    }

    let state = cpu.get_state();
    let mut restored = Z80::new();
    assert!(restored.load_state(&state), "clean load reports success");

    assert_eq!(restored.registers(), cpu.registers());
    assert_eq!(restored.clock_rate(), cpu.clock_rate());
}

#[test]
fn load_state_tolerates_missing_keys() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut cpu = Z80::new();
    cpu.registers_mut().a = 0x77;
    cpu.registers_mut().sp = 0x8000;

    // Only PC is present; everything else is missing.
    let partial = json!({ "pc": 0x4000 });
    let ok = cpu.load_state(&partial);

    assert!(!ok, "partial state reports failure");
    assert_eq!(cpu.registers().pc, 0x4000, "present key applied");
    assert_eq!(cpu.registers().a, 0x77, "missing key leaves the field");
    assert_eq!(cpu.registers().sp, 0x8000);
}

#[test]
fn load_state_tolerates_malformed_values() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut cpu = Z80::new();
    cpu.registers_mut().a = 0x11;

    let mut state = cpu.get_state();
    state["a"] = json!("not a byte");
    state["sp"] = json!(0x12_3456); // out of u16 range

    let ok = cpu.load_state(&state);
    assert!(!ok);
    assert_eq!(cpu.registers().a, 0x11, "malformed key leaves the field");
}

#[test]
fn observable_queries() {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0xAF]); // XOR A

    let mut cpu = Z80::new();
    cpu.execute_step(&mut bus);

    assert_eq!(cpu.query("a"), Some(Value::U8(0)));
    assert_eq!(cpu.query("pc"), Some(Value::U16(1)));
    assert_eq!(cpu.query("flags.z"), Some(Value::Bool(true)));
    assert_eq!(cpu.query("iff1"), Some(Value::Bool(false)));
    assert_eq!(cpu.query("no.such.path"), None);

    // Every advertised path answers.
    for path in cpu.query_paths() {
        assert!(cpu.query(path).is_some(), "path {path:?} must resolve");
    }
}

#[test]
fn observable_sees_flag_changes() {
    let mut bus = SimpleBus::new();
    bus.load(0x0000, &[0x3E, 0x00, 0xB7]); // LD A,0; OR A

    let mut cpu = Z80::new();
    cpu.execute_step(&mut bus);
    cpu.execute_step(&mut bus);

    assert_ne!(cpu.registers().f & ZF, 0);
    assert_eq!(cpu.query("flags.z"), Some(Value::Bool(true)));
}

#[test]
fn construct_applies_ce_mappings() {
    let mut cpu = Z80::new();
    let config = json!({
        "CELineOutput": [
            { "LineName": "RD", "Bit": 4 },
            { "LineName": "WR", "Bit": 5 },
        ],
        "ClockRate": 3_546_895.0,
    });

    assert!(cpu.construct(&config));
    assert!(cpu.build_device().is_ok());
    assert_eq!(cpu.calculate_ce_line_state_memory(BusAccessKind::Read), 0x10);
    assert_eq!(cpu.calculate_ce_line_state_memory(BusAccessKind::Write), 0x20);
    assert_eq!(cpu.clock_rate(), 3_546_895.0);
}

#[test]
fn construct_rejects_unknown_line() {
    let mut cpu = Z80::new();
    let config = json!({
        "CELineOutput": [ { "LineName": "MREQ", "Bit": 1 } ],
    });
    assert!(!cpu.construct(&config));
}

#[test]
fn ce_mapping_rejects_out_of_range_bit() {
    let mut cpu = Z80::new();
    assert!(cpu.set_ce_line_output(CeLine::Rd, 32).is_err());
    assert!(cpu.set_ce_line_output(CeLine::Rd, 31).is_ok());
}

#[test]
fn build_device_rejects_dead_clock() {
    let mut cpu = Z80::new();
    let config = json!({ "ClockRate": 0.0 });
    assert!(cpu.construct(&config), "shape is valid");
    assert!(cpu.build_device().is_err(), "but the device is unusable");
}

#[test]
fn unmapped_ce_lines_read_as_zero() {
    let cpu = Z80::new();
    assert_eq!(cpu.calculate_ce_line_state_memory(BusAccessKind::Read), 0);
    assert_eq!(cpu.calculate_ce_line_state_memory(BusAccessKind::Write), 0);
}
