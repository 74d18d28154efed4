/*
Copyright 2025 The J80 Project Contributors

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Program-level disassembly, built on top of [`crate::assembler::codec`].
//! One decoded line per instruction, address-annotated, in the style of
//! the original `Opcodes::printInstruction`.

use crate::assembler::codec;
use crate::ast::Instruction;
use crate::errors::AssemblyError;

/// One decoded instruction plus the address it was read from and its
/// rendered mnemonic.
#[derive(Debug, Clone)]
pub struct DecodedLine {
    pub address: u16,
    pub instruction: Instruction,
    pub length: u16,
    pub mnemonic: String,
}

/// Walk `bytes` from `start`, decoding one instruction at a time until the
/// buffer is exhausted. Stops (without error) on a final partial tail
/// shorter than any opcode's minimum length.
pub fn disassemble(bytes: &[u8], start: u16) -> Result<Vec<DecodedLine>, AssemblyError> {
    let mut lines = Vec::new();
    let mut pc = start;
    let mut offset = 0usize;

    while offset < bytes.len() {
        let (instruction, length) = codec::decode(&bytes[offset..], pc)?;
        let mnemonic = codec::mnemonic(&instruction);
        lines.push(DecodedLine {
            address: pc,
            instruction,
            length,
            mnemonic,
        });
        offset += length as usize;
        pc = pc.wrapping_add(length);
    }

    Ok(lines)
}

/// Render decoded lines as an address-annotated listing: hex address, raw
/// bytes, mnemonic — matching `printInstruction`'s column layout.
pub fn format_lines(lines: &[DecodedLine], bytes: &[u8], start: u16) -> String {
    let mut out = String::new();
    let mut offset = 0usize;
    for line in lines {
        let raw = &bytes[offset..offset + line.length as usize];
        let hex: Vec<String> = raw.iter().map(|b| format!("{b:02x}")).collect();
        out.push_str(&format!("{:04x}: {:<9} {}\n", line.address, hex.join(" "), line.mnemonic));
        offset += line.length as usize;
    }
    let _ = start;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disassembles_nop_then_load_immediate() {
        let bytes = [0x00, 0x88, 0x04, 0x42];
        let lines = disassemble(&bytes, 0).unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].mnemonic, "nop");
        assert_eq!(lines[1].address, 1);
        assert_eq!(lines[1].mnemonic, "ld a, 0x42");
    }

    #[test]
    fn format_lines_includes_address_and_bytes() {
        let bytes = [0x00];
        let lines = disassemble(&bytes, 0).unwrap();
        let rendered = format_lines(&lines, &bytes, 0);
        assert!(rendered.contains("0000:"));
        assert!(rendered.contains("00"));
        assert!(rendered.contains("nop"));
    }

    #[test]
    fn invalid_byte_is_rejected() {
        let bytes = [0b00111_000u8];
        assert!(disassemble(&bytes, 0).is_err());
    }
}
