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

//! A deliberately small textual front-end: turns `.j80` source into the
//! `Item` list the assembler pipeline consumes. No macros, no expression
//! folding, no `.include` — a grammar-driven parser is out of scope here;
//! this exists only so the CLI has something to run end to end.

use crate::assembler::Assembler;
use crate::ast::{AluOp, Condition, Instruction, Item, Reg16, Reg8, Value};
use crate::errors::AssemblyError;

/// Parse `source` and load every directive, label, and instruction it
/// contains into `asm`.
pub fn parse_into(source: &str, asm: &mut Assembler) -> Result<(), AssemblyError> {
    for (index, raw_line) in source.lines().enumerate() {
        let line_no = index + 1;
        let line = strip_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        if let Some(label) = line.strip_suffix(':') {
            validate_identifier(label, line_no)?;
            asm.push(Item::Label(label.to_string()));
            continue;
        }

        if let Some(rest) = line.strip_prefix('.') {
            parse_directive(rest, line_no, asm)?;
            continue;
        }

        let instr = parse_instruction(line, line_no)?;
        asm.push(Item::Instruction(instr));
    }
    Ok(())
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(idx) => &line[..idx],
        None => line,
    }
}

fn validate_identifier(name: &str, line: usize) -> Result<(), AssemblyError> {
    let ok = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_alphanumeric() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AssemblyError::ParseError {
            line,
            reason: format!("'{name}' is not a valid identifier"),
        })
    }
}

fn parse_directive(rest: &str, line: usize, asm: &mut Assembler) -> Result<(), AssemblyError> {
    let mut parts = rest.splitn(2, char::is_whitespace);
    let keyword = parts.next().unwrap_or("").trim();
    let args = parts.next().unwrap_or("").trim();

    match keyword {
        "const" => {
            let mut it = args.splitn(2, char::is_whitespace);
            let name = it.next().unwrap_or("").trim();
            let value = it.next().unwrap_or("").trim();
            validate_identifier(name, line)?;
            let parsed = parse_integer(value, line)?;
            asm.define_const(name, parsed as u16)
        }
        "data" => {
            let mut it = args.splitn(2, char::is_whitespace);
            let name = it.next().unwrap_or("").trim();
            let rest = it.next().unwrap_or("").trim();
            validate_identifier(name, line)?;
            let bytes = parse_data_bytes(rest, line)?;
            asm.define_data(name, bytes)
        }
        "entry" => {
            asm.set_entry_point(parse_integer(args, line)? as u16);
            Ok(())
        }
        "stack" => {
            asm.set_stack_base(parse_integer(args, line)? as u16);
            Ok(())
        }
        "interrupt" => {
            let index = parse_integer(args, line)? as u8;
            if index > 3 {
                return Err(AssemblyError::SemanticError {
                    line,
                    reason: format!("interrupt index {index} is out of range 0..=3"),
                });
            }
            asm.push(Item::InterruptEntryPoint(index));
            Ok(())
        }
        other => Err(AssemblyError::ParseError {
            line,
            reason: format!("unknown directive '.{other}'"),
        }),
    }
}

fn parse_data_bytes(text: &str, line: usize) -> Result<Vec<u8>, AssemblyError> {
    if let Some(stripped) = text.strip_prefix('"') {
        let inner = stripped.strip_suffix('"').ok_or_else(|| AssemblyError::ParseError {
            line,
            reason: "unterminated string literal".to_string(),
        })?;
        return Ok(inner.as_bytes().to_vec());
    }
    text.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| Ok(parse_integer(t, line)? as u8))
        .collect()
}

fn parse_integer(text: &str, line: usize) -> Result<i64, AssemblyError> {
    let (negative, text) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let magnitude = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else if text.starts_with('\'') && text.ends_with('\'') && text.len() >= 3 {
        return Ok(text.as_bytes()[1] as i64 * if negative { -1 } else { 1 });
    } else {
        text.parse::<i64>()
    };
    let magnitude = magnitude.map_err(|_| AssemblyError::ParseError {
        line,
        reason: format!("'{text}' is not a valid integer"),
    })?;
    Ok(if negative { -magnitude } else { magnitude })
}

fn reg8_from_name(name: &str) -> Option<Reg8> {
    Some(match name {
        "a" => Reg8::A,
        "d" => Reg8::D,
        "f" => Reg8::F,
        "y" => Reg8::Y,
        "b" => Reg8::B,
        "c" => Reg8::C,
        "e" => Reg8::E,
        "x" => Reg8::X,
        _ => return None,
    })
}

fn reg16_from_name(name: &str) -> Option<Reg16> {
    Some(match name {
        "ba" => Reg16::Ba,
        "cd" => Reg16::Cd,
        "ef" => Reg16::Ef,
        "xy" => Reg16::Xy,
        "sp" => Reg16::Sp,
        "fp" => Reg16::Fp,
        "ix" => Reg16::Ix,
        "iy" => Reg16::Iy,
        _ => return None,
    })
}

/// `NNNN` or `NNNN+OFFSET` against a register pair, for `[PP+SS]` forms.
fn parse_indexed(inner: &str, line: usize) -> Result<(Reg16, i8), AssemblyError> {
    let inner = inner.trim();
    let (base_tok, offset) = if let Some(pos) = inner.find(['+', '-']) {
        let (base, off) = inner.split_at(pos);
        (base.trim(), parse_integer(off, line)? as i8)
    } else {
        (inner, 0)
    };
    let base = reg16_from_name(base_tok).ok_or_else(|| AssemblyError::ParseError {
        line,
        reason: format!("'{base_tok}' is not a register pair"),
    })?;
    Ok((base, offset))
}

/// A bare value token: numeric literal, char literal, `len(name)`, or an
/// identifier (treated as a data-label address, which resolves against
/// the const table too — see `assembler::value::resolve`).
fn parse_value(token: &str, line: usize) -> Result<Value, AssemblyError> {
    let token = token.trim();
    if let Some(inner) = token.strip_prefix("len(").and_then(|t| t.strip_suffix(')')) {
        validate_identifier(inner, line)?;
        return Ok(Value::data_length(inner));
    }
    if token.starts_with(|c: char| c.is_ascii_digit()) || token.starts_with('-') {
        return Ok(Value::literal(parse_integer(token, line)?));
    }
    validate_identifier(token, line)?;
    Ok(Value::data_address(token, 0))
}

fn split_operands(rest: &str) -> Vec<String> {
    rest.split(',').map(|t| t.trim().to_string()).collect::<Vec<_>>()
}

fn condition_from_suffix(suffix: &str) -> Option<Condition> {
    Some(match suffix {
        "" => Condition::Unconditional,
        "c" => Condition::Carry,
        "nc" => Condition::NotCarry,
        "z" => Condition::Zero,
        "nz" => Condition::NotZero,
        "n" => Condition::Sign,
        "nn" => Condition::NotSign,
        "v" => Condition::Overflow,
        "nv" => Condition::NotOverflow,
        _ => return None,
    })
}

fn alu_op_from_name(name: &str) -> Option<AluOp> {
    Some(match name {
        "add" => AluOp::Add,
        "adc" => AluOp::Adc,
        "sub" => AluOp::Sub,
        "sbc" => AluOp::Sbc,
        "and" => AluOp::And,
        "or" => AluOp::Or,
        "xor" => AluOp::Xor,
        "not" => AluOp::Not,
        _ => return None,
    })
}

fn parse_instruction(line: &str, line_no: usize) -> Result<Instruction, AssemblyError> {
    let mut head = line.splitn(2, char::is_whitespace);
    let mnemonic = head.next().unwrap_or("").to_lowercase();
    let rest = head.next().unwrap_or("").trim();
    let ops = if rest.is_empty() { Vec::new() } else { split_operands(rest) };

    let unknown = || AssemblyError::ParseError {
        line: line_no,
        reason: format!("unknown or malformed instruction: '{line}'"),
    };

    match mnemonic.as_str() {
        "nop" => Ok(Instruction::Nop),
        "ei" => Ok(Instruction::EnableInterrupts),
        "di" => Ok(Instruction::DisableInterrupts),

        "lf" => {
            if ops.len() != 1 {
                return Err(unknown());
            }
            let reg = reg8_from_name(&ops[0]).ok_or_else(unknown)?;
            Ok(Instruction::LoadFlags { reg })
        }
        "sf" => {
            if ops.len() != 1 {
                return Err(unknown());
            }
            let reg = reg8_from_name(&ops[0]).ok_or_else(unknown)?;
            Ok(Instruction::StoreFlags { reg })
        }
        "sext" => {
            if ops.len() != 1 {
                return Err(unknown());
            }
            let reg = reg8_from_name(&ops[0]).ok_or_else(unknown)?;
            Ok(Instruction::SignExtend { reg })
        }

        "push" | "pop" => {
            if ops.len() != 1 {
                return Err(unknown());
            }
            let is_push = mnemonic == "push";
            if let Some(reg) = reg8_from_name(&ops[0]) {
                Ok(if is_push {
                    Instruction::Push8 { reg }
                } else {
                    Instruction::Pop8 { reg }
                })
            } else if let Some(reg) = reg16_from_name(&ops[0]) {
                Ok(if is_push {
                    Instruction::Push16 { reg }
                } else {
                    Instruction::Pop16 { reg }
                })
            } else {
                Err(unknown())
            }
        }

        "ld" if ops.len() == 2 => parse_load(&ops, line_no),
        "st" if ops.len() == 2 => parse_store(&ops, line_no),
        "lsh" | "rsh" if ops.len() == 2 => {
            let dst = reg8_from_name(&ops[0]).ok_or_else(unknown)?;
            let src = reg8_from_name(&ops[1]).ok_or_else(unknown)?;
            let op = if mnemonic == "lsh" { AluOp::Lsh } else { AluOp::Rsh };
            Ok(Instruction::RegMove {
                dst: dst.index(),
                src: src.index(),
                op,
                ext: false,
            })
        }

        "cmp" if ops.len() == 2 => parse_cmp(&ops, line_no),

        _ if alu_op_from_name(&mnemonic).is_some() => parse_alu(&mnemonic, &ops, line_no),

        _ if mnemonic.starts_with("jmp") => {
            let cond = condition_from_suffix(&mnemonic[3..]).ok_or_else(unknown)?;
            if ops.len() != 1 {
                return Err(unknown());
            }
            if let Some(reg) = reg16_from_name(&ops[0]) {
                Ok(Instruction::JumpIndirect { cond, reg })
            } else {
                Ok(Instruction::Jump {
                    cond,
                    target: parse_jump_target(&ops[0], line_no)?,
                })
            }
        }
        _ if mnemonic.starts_with("call") => {
            let cond = condition_from_suffix(&mnemonic[4..]).ok_or_else(unknown)?;
            if ops.len() != 1 {
                return Err(unknown());
            }
            Ok(Instruction::Call {
                cond,
                target: parse_jump_target(&ops[0], line_no)?,
            })
        }
        _ if mnemonic.starts_with("ret") => {
            let cond = condition_from_suffix(&mnemonic[3..]).ok_or_else(unknown)?;
            Ok(Instruction::Return { cond })
        }

        _ => Err(unknown()),
    }
}

/// A jump/call target: a bare label name becomes an unresolved label for
/// `solveJumps`; a numeric literal is already resolved.
fn parse_jump_target(token: &str, line: usize) -> Result<Value, AssemblyError> {
    let token = token.trim();
    if token.starts_with(|c: char| c.is_ascii_digit()) || token.starts_with('-') {
        Ok(Value::literal(parse_integer(token, line)?))
    } else {
        validate_identifier(token, line)?;
        Ok(Value::unresolved_label(token))
    }
}

fn bracketed(token: &str) -> Option<&str> {
    token.strip_prefix('[').and_then(|t| t.strip_suffix(']'))
}

fn parse_load(ops: &[String], line: usize) -> Result<Instruction, AssemblyError> {
    let dst_tok = ops[0].as_str();
    let src_tok = ops[1].as_str();

    if let Some(inner) = bracketed(src_tok) {
        let dst = reg8_from_name(dst_tok).ok_or_else(|| AssemblyError::ParseError {
            line,
            reason: format!("'{dst_tok}' is not an 8-bit register"),
        })?;
        if let Ok((base, offset)) = parse_indexed(inner, line) {
            if inner.contains(['+', '-']) {
                return Ok(Instruction::LoadIndexed { dst, base, offset });
            }
        }
        return Ok(Instruction::LoadAbs {
            dst,
            addr: parse_value(inner, line)?,
        });
    }

    if let Some(dst) = reg8_from_name(dst_tok) {
        if let Some(src) = reg8_from_name(src_tok) {
            return Ok(Instruction::RegMove {
                dst: dst.index(),
                src: src.index(),
                op: AluOp::TransferB,
                ext: false,
            });
        }
        return Ok(Instruction::LoadImm8 {
            dst,
            value: parse_value(src_tok, line)?,
        });
    }

    if let Some(dst) = reg16_from_name(dst_tok) {
        if let Some(src) = reg16_from_name(src_tok) {
            return Ok(Instruction::RegMove {
                dst: dst.index(),
                src: src.index(),
                op: AluOp::TransferB,
                ext: true,
            });
        }
        return Ok(Instruction::LoadImm16 {
            dst,
            value: parse_value(src_tok, line)?,
        });
    }

    Err(AssemblyError::ParseError {
        line,
        reason: format!("'{dst_tok}' is not a register"),
    })
}

fn parse_store(ops: &[String], line: usize) -> Result<Instruction, AssemblyError> {
    let dst_tok = ops[0].as_str();
    let src_tok = ops[1].as_str();
    let inner = bracketed(dst_tok).ok_or_else(|| AssemblyError::ParseError {
        line,
        reason: "store destination must be bracketed, e.g. [0x1000] or [ba+1]".to_string(),
    })?;
    let src = reg8_from_name(src_tok).ok_or_else(|| AssemblyError::ParseError {
        line,
        reason: format!("'{src_tok}' is not an 8-bit register"),
    })?;
    if inner.contains(['+', '-']) {
        let (base, offset) = parse_indexed(inner, line)?;
        return Ok(Instruction::StoreIndexed { base, offset, src });
    }
    Ok(Instruction::StoreAbs {
        addr: parse_value(inner, line)?,
        src,
    })
}

fn parse_cmp(ops: &[String], line: usize) -> Result<Instruction, AssemblyError> {
    let a_tok = ops[0].as_str();
    let b_tok = ops[1].as_str();
    if let Some(r) = reg8_from_name(a_tok) {
        if let Some(r2) = reg8_from_name(b_tok) {
            return Ok(Instruction::CmpReg {
                r1: r.index(),
                r2: r2.index(),
                ext: false,
            });
        }
        return Ok(Instruction::CmpImm8 {
            r,
            value: parse_value(b_tok, line)?,
        });
    }
    if let Some(p) = reg16_from_name(a_tok) {
        if let Some(p2) = reg16_from_name(b_tok) {
            return Ok(Instruction::CmpReg {
                r1: p.index(),
                r2: p2.index(),
                ext: true,
            });
        }
        return Ok(Instruction::CmpImm16 {
            p,
            value: parse_value(b_tok, line)?,
        });
    }
    Err(AssemblyError::ParseError {
        line,
        reason: format!("'{a_tok}' is not a register"),
    })
}

/// `ADD/ADC/SUB/SBC/AND/OR/XOR/NOT dst, src1[, src2]`: three register
/// operands is the `ALU R,S,Q` form; two registers plus a literal is the
/// immediate form (8- or 16-bit, by register width).
fn parse_alu(mnemonic: &str, ops: &[String], line: usize) -> Result<Instruction, AssemblyError> {
    let op = alu_op_from_name(mnemonic).expect("caller already checked this mnemonic is an ALU op");
    let unknown = || AssemblyError::ParseError {
        line,
        reason: format!("malformed '{mnemonic}' operands"),
    };

    if ops.len() == 3 {
        let dst = reg8_from_name(&ops[0]).ok_or_else(unknown)?;
        let src1 = reg8_from_name(&ops[1]).ok_or_else(unknown)?;
        // `ADD dst, src, imm` (dst and a distinct source register, then an
        // immediate) vs `ADD dst, src1, src2` (three registers) — disambiguate
        // on whether the third operand names a register.
        if let Some(src2) = reg8_from_name(&ops[2]) {
            return Ok(Instruction::AluReg {
                dst: dst.index(),
                src1: src1.index(),
                src2: src2.index(),
                op,
                ext: false,
            });
        }
        return Ok(Instruction::AluImm8 {
            dst,
            src: src1,
            op,
            value: parse_value(&ops[2], line)?,
        });
    }

    if ops.len() != 2 {
        return Err(unknown());
    }
    let dst_tok = ops[0].as_str();
    let src_tok = ops[1].as_str();

    if let Some(dst) = reg8_from_name(dst_tok) {
        return Ok(Instruction::AluImm8 {
            dst,
            src: dst,
            op,
            value: parse_value(src_tok, line)?,
        });
    }
    if let Some(dst) = reg16_from_name(dst_tok) {
        return Ok(Instruction::AluImm16 {
            dst,
            src: dst,
            op,
            value: parse_value(src_tok, line)?,
        });
    }
    Err(unknown())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(source: &str) -> Assembler {
        let mut asm = Assembler::new();
        parse_into(source, &mut asm).unwrap();
        asm
    }

    #[test]
    fn nop_only_program_assembles() {
        let mut asm = parsed("main:\n  nop\n");
        let image = asm.assemble().unwrap();
        assert_eq!(image.code.bytes, vec![0x00]);
    }

    #[test]
    fn load_immediate_matches_external_scenario() {
        let mut asm = parsed("main:\n  ld a, 0x42\n");
        let image = asm.assemble().unwrap();
        assert_eq!(image.code.bytes, vec![0x88, 0x04, 0x42]);
    }

    #[test]
    fn push_ba_then_pop_cd() {
        let mut asm = parsed("main:\n  ld ba, 0x1234\n  push ba\n  pop cd\n");
        let image = asm.assemble().unwrap();
        assert_eq!(image.code.bytes[3], 0b01001_000);
        assert_eq!(image.code.bytes[4], 0b01011_001);
    }

    #[test]
    fn jump_to_label_resolves() {
        let mut asm = parsed("main:\n  jmp main\n");
        let image = asm.assemble().unwrap();
        assert_eq!(&image.code.bytes[0..3], &[0xC8, 0x00, 0x00]);
    }

    #[test]
    fn data_directive_and_length_reference() {
        let mut asm = parsed("main:\n  ld a, len(msg)\n.data msg \"AB\"\n");
        let image = asm.assemble().unwrap();
        assert_eq!(image.code.bytes[2], 0x02);
    }

    #[test]
    fn unknown_directive_is_rejected() {
        let mut asm = Assembler::new();
        assert!(parse_into(".bogus 1\n", &mut asm).is_err());
    }

    #[test]
    fn malformed_instruction_is_rejected() {
        let mut asm = Assembler::new();
        assert!(parse_into("frobnicate a, b\n", &mut asm).is_err());
    }

    #[test]
    fn bare_lf_sf_sext_with_no_operand_is_rejected_not_a_panic() {
        let mut asm = Assembler::new();
        assert!(parse_into("main:\n  lf\n", &mut asm).is_err());
        let mut asm = Assembler::new();
        assert!(parse_into("main:\n  sf\n", &mut asm).is_err());
        let mut asm = Assembler::new();
        assert!(parse_into("main:\n  sext\n", &mut asm).is_err());
    }
}
