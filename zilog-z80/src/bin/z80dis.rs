//! Disassembler walk over a raw Z80 binary.
//!
//! Usage: `z80dis <file> [origin]`
//!
//! Loads the file at the given origin (hex, default 0) into a flat 64K
//! address space and prints one line per instruction: address, raw bytes
//! and mnemonic. Useful for eyeballing what the decoder will see.

use std::env;
use std::fs;
use std::process::ExitCode;

use device_core::SimpleBus;
use zilog_z80::Z80;

fn main() -> ExitCode {
    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: z80dis <file> [origin-hex]");
        return ExitCode::FAILURE;
    };
    let origin = match args.next() {
        Some(text) => match u16::from_str_radix(text.trim_start_matches("0x"), 16) {
            Ok(origin) => origin,
            Err(err) => {
                eprintln!("bad origin {text:?}: {err}");
                return ExitCode::FAILURE;
            }
        },
        None => 0,
    };

    let data = match fs::read(&path) {
        Ok(data) => data,
        Err(err) => {
            eprintln!("cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let len = data.len().min(0x1_0000 - usize::from(origin));

    let mut bus = SimpleBus::new();
    bus.load(origin, &data[..len]);

    let cpu = Z80::new();
    let end = origin as usize + len;
    let mut address = usize::from(origin);
    while address < end {
        let info = cpu.get_opcode_info(&mut bus, address as u16);
        println!("{address:04X}  {:<12} {}", info.bytes, info.mnemonic);
        address += info.length.max(1);
    }

    ExitCode::SUCCESS
}
