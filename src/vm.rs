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

//! The register file, ALU, and dispatch loop. Executes the same
//! [`Instruction`] IR the assembler encodes, decoded fresh from RAM on
//! every step via [`crate::assembler::codec`].

use crate::assembler::codec;
use crate::ast::{AluOp, Condition, Instruction, Reg16, Reg8};
use crate::errors::VmError;

const RAM_SIZE: usize = 1 << 16;
const STDOUT_ADDRESS: u16 = 0xFFFF;

pub const CARRY: u8 = 0x1;
pub const ZERO: u8 = 0x2;
pub const SIGN: u8 = 0x4;
pub const OVERFLOW: u8 = 0x8;

/// Where the VM's memory-mapped stdout writes end up. A capturing sink
/// (`Vec<u8>`) makes the dispatch loop testable without a real terminal.
pub trait StdOut {
    fn out(&mut self, byte: u8);
}

impl StdOut for Vec<u8> {
    fn out(&mut self, byte: u8) {
        self.push(byte);
    }
}

impl<S: StdOut + ?Sized> StdOut for &mut S {
    fn out(&mut self, byte: u8) {
        (**self).out(byte);
    }
}

/// The eight logical register slots, stored as bytes indexed by the
/// canonical half mapping from `Reg8`. Pairs are views over two of these
/// bytes, never separate storage, so a half write and a pair read agree by
/// construction.
#[derive(Debug, Clone)]
struct Registers {
    halves: [u8; 8],
    sp: u16,
    fp: u16,
    ix: u16,
    iy: u16,
}

impl Default for Registers {
    fn default() -> Registers {
        Registers {
            halves: [0; 8],
            sp: 0,
            fp: 0,
            ix: 0,
            iy: 0,
        }
    }
}

impl Registers {
    fn read8(&self, reg: Reg8) -> u8 {
        self.halves[reg.index() as usize]
    }

    fn write8(&mut self, reg: Reg8, value: u8) {
        self.halves[reg.index() as usize] = value;
    }

    fn read16(&self, reg: Reg16) -> u16 {
        match reg.halves() {
            Some((low, high)) => u16::from_le_bytes([self.read8(low), self.read8(high)]),
            None => match reg {
                Reg16::Sp => self.sp,
                Reg16::Fp => self.fp,
                Reg16::Ix => self.ix,
                Reg16::Iy => self.iy,
                _ => unreachable!("halves() only returns None for SP/FP/IX/IY"),
            },
        }
    }

    fn write16(&mut self, reg: Reg16, value: u16) {
        match reg.halves() {
            Some((low, high)) => {
                let [low_byte, high_byte] = value.to_le_bytes();
                self.write8(low, low_byte);
                self.write8(high, high_byte);
            }
            None => match reg {
                Reg16::Sp => self.sp = value,
                Reg16::Fp => self.fp = value,
                Reg16::Ix => self.ix = value,
                Reg16::Iy => self.iy = value,
                _ => unreachable!("halves() only returns None for SP/FP/IX/IY"),
            },
        }
    }
}

/// The outcome of one ALU evaluation: the arithmetic result and the flags
/// it would set. Separated from the write-back so `CMP` can discard the
/// result while still applying flags — per the source's own caution that
/// `dest` must not be written when `saveResult` is false.
struct AluOutcome {
    result: u16,
    flags: u8,
}

fn signbit(value: u16, width: u32) -> bool {
    value & (1 << (width - 1)) != 0
}

fn alu_eval(op: AluOp, a: u16, b: u16, carry_in: bool, width: u32) -> AluOutcome {
    let mask = if width == 8 { 0xFF } else { 0xFFFF };
    let a = a & mask;
    let b = b & mask;

    let (result, flags) = match op {
        AluOp::TransferA | AluOp::TransferB => (b, 0),
        AluOp::Add | AluOp::Adc => {
            let carry_add = if op == AluOp::Adc && carry_in { 1 } else { 0 };
            let wide = a as u32 + b as u32 + carry_add;
            let result = (wide & mask as u32) as u16;
            let carry = wide > mask as u32;
            let overflow = signbit(a, width) == signbit(b, width) && signbit(a, width) != signbit(result, width);
            (result, flag_bits(carry, result == 0, signbit(result, width), overflow))
        }
        AluOp::Sub | AluOp::Sbc => {
            let carry_sub = if op == AluOp::Sbc && carry_in { 1 } else { 0 };
            let wide = a as i64 - b as i64 - carry_sub as i64;
            let result = (wide & mask as i64) as u16;
            let carry = wide < 0;
            let overflow = signbit(a, width) != signbit(b, width) && signbit(a, width) != signbit(result, width);
            (result, flag_bits(carry, result == 0, signbit(result, width), overflow))
        }
        AluOp::And => {
            let result = a & b;
            (result, flag_bits(false, result == 0, false, false))
        }
        AluOp::Or => {
            let result = a | b;
            (result, flag_bits(false, result == 0, false, false))
        }
        AluOp::Xor => {
            let result = a ^ b;
            (result, flag_bits(false, result == 0, false, false))
        }
        AluOp::Not => {
            let result = (!a) & mask;
            (result, flag_bits(false, result == 0, false, false))
        }
        AluOp::Lsh => {
            let carry = signbit(a, width);
            let result = (a << 1) & mask;
            (result, flag_bits(carry, result == 0, false, false))
        }
        AluOp::Rsh => {
            let carry = a & 1 != 0;
            let result = a >> 1;
            (result, flag_bits(carry, result == 0, false, false))
        }
    };

    AluOutcome { result, flags }
}

fn flag_bits(carry: bool, zero: bool, sign: bool, overflow: bool) -> u8 {
    (if carry { CARRY } else { 0 })
        | (if zero { ZERO } else { 0 })
        | (if sign { SIGN } else { 0 })
        | (if overflow { OVERFLOW } else { 0 })
}

/// The full machine state: registers, flags, program counter, 64 KiB RAM,
/// and an `interruptEnabled` bit mirroring the original's bookkeeping
/// field. Owns the `StdOut` sink its memory-mapped writes deliver to.
pub struct Vm<O: StdOut> {
    regs: Registers,
    flags: u8,
    pc: u16,
    ram: Vec<u8>,
    stdout: O,
    interrupts_enabled: bool,
}

impl<O: StdOut> Vm<O> {
    pub fn new(stdout: O) -> Vm<O> {
        Vm {
            regs: Registers::default(),
            flags: 0,
            pc: 0,
            ram: vec![0; RAM_SIZE],
            stdout,
            interrupts_enabled: false,
        }
    }

    /// Zero registers, flags, and PC. RAM is untouched — the host loads
    /// code and data before calling this, via `copy_to_ram`.
    pub fn reset(&mut self) {
        tracing::info!("resetting VM state (registers, flags, PC)");
        self.regs = Registers::default();
        self.flags = 0;
        self.pc = 0;
        self.interrupts_enabled = false;
    }

    pub fn copy_to_ram(&mut self, bytes: &[u8], offset: u16) {
        let start = offset as usize;
        let end = start + bytes.len();
        self.ram[start..end].copy_from_slice(bytes);
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn flags(&self) -> u8 {
        self.flags
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.interrupts_enabled
    }

    pub fn read8(&self, reg: Reg8) -> u8 {
        self.regs.read8(reg)
    }

    pub fn read16(&self, reg: Reg16) -> u16 {
        self.regs.read16(reg)
    }

    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    fn ram_read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    fn ram_write(&mut self, addr: u16, value: u8) {
        if addr == STDOUT_ADDRESS {
            self.stdout.out(value);
        } else {
            self.ram[addr as usize] = value;
        }
    }

    fn ram_read16(&self, addr: u16) -> u16 {
        u16::from_le_bytes([self.ram_read(addr), self.ram_read(addr.wrapping_add(1))])
    }

    fn ram_write16(&mut self, addr: u16, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.ram_write(addr, low);
        self.ram_write(addr.wrapping_add(1), high);
    }

    fn condition_true(&self, cond: Condition) -> bool {
        match cond {
            Condition::Unconditional => true,
            Condition::Carry => self.flags & CARRY != 0,
            Condition::NotCarry => self.flags & CARRY == 0,
            Condition::Zero => self.flags & ZERO != 0,
            Condition::NotZero => self.flags & ZERO == 0,
            Condition::Sign => self.flags & SIGN != 0,
            Condition::NotSign => self.flags & SIGN == 0,
            Condition::Overflow => self.flags & OVERFLOW != 0,
            Condition::NotOverflow => self.flags & OVERFLOW == 0,
        }
    }

    fn push8(&mut self, value: u8) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        let sp = self.regs.sp;
        self.ram_write(sp, value);
    }

    fn pop8(&mut self) -> u8 {
        let sp = self.regs.sp;
        let value = self.ram_read(sp);
        self.regs.sp = self.regs.sp.wrapping_add(1);
        value
    }

    fn push16(&mut self, value: u16) {
        // Low byte pushed first, so it lands at the higher address; high
        // byte pushed second ends up at the final (lowest) stack address.
        let [low, high] = value.to_le_bytes();
        self.push8(low);
        self.push8(high);
    }

    fn pop16(&mut self) -> u16 {
        let high = self.pop8();
        let low = self.pop8();
        u16::from_le_bytes([low, high])
    }

    /// Decode and execute one instruction at `pc`. Advances `pc` by the
    /// instruction's length unless the instruction itself replaced `pc`
    /// (jumps, calls, returns).
    pub fn step(&mut self) -> Result<(), VmError> {
        let pc = self.pc as usize;
        if pc >= self.ram.len() {
            return Err(VmError::AddressOverflow(pc as u32));
        }
        let window = &self.ram[pc..];
        let (instr, len) = codec::decode(window, self.pc).map_err(|_| VmError::InvalidOpcode(window[0]))?;

        let mut pc_set = false;
        self.execute(&instr, &mut pc_set);

        if !pc_set {
            self.pc = self.pc.wrapping_add(len);
        }
        Ok(())
    }

    fn execute(&mut self, instr: &Instruction, pc_set: &mut bool) {
        match instr {
            Instruction::Nop => {}

            Instruction::RegMove { dst, src, op, ext } => {
                let width = if *ext { 16 } else { 8 };
                self.apply_reg_alu(*dst, *src, *src, *op, width, true);
            }

            Instruction::LoadImm8 { dst, value } => {
                self.regs.write8(*dst, value.resolved as u8);
            }
            Instruction::LoadImm16 { dst, value } => {
                self.regs.write16(*dst, value.resolved as u16);
            }
            Instruction::LoadAbs { dst, addr } => {
                let byte = self.ram_read(addr.resolved as u16);
                self.regs.write8(*dst, byte);
            }
            Instruction::LoadIndexed { dst, base, offset } => {
                let addr = (self.regs.read16(*base) as i32 + *offset as i32) as u16;
                let byte = self.ram_read(addr);
                self.regs.write8(*dst, byte);
            }
            Instruction::StoreAbs { addr, src } => {
                let value = self.regs.read8(*src);
                self.ram_write(addr.resolved as u16, value);
            }
            Instruction::StoreIndexed { base, offset, src } => {
                let addr = (self.regs.read16(*base) as i32 + *offset as i32) as u16;
                let value = self.regs.read8(*src);
                self.ram_write(addr, value);
            }

            Instruction::AluReg {
                dst,
                src1,
                src2,
                op,
                ext,
            } => {
                let width = if *ext { 16 } else { 8 };
                self.apply_reg_alu(*dst, *src1, *src2, *op, width, true);
            }
            Instruction::AluImm8 { dst, src: _, op, value } => {
                // `a` reads the destination's current value, not `src` —
                // pinned by the worked `ADD A, B, 5` example (A=0xFE,
                // B=0x03 -> A=0x03), which only holds if B never enters
                // the computation. `src` still rides along in byte 1 of
                // the encoding but is otherwise a don't-care at this shape.
                let a = self.regs.read8(*dst) as u16;
                let b = value.resolved as u16;
                let outcome = alu_eval(*op, a, b, self.flags & CARRY != 0, 8);
                self.regs.write8(*dst, outcome.result as u8);
                self.flags = outcome.flags;
            }
            Instruction::AluImm16 { dst, src: _, op, value } => {
                let a = self.regs.read16(*dst);
                let b = value.resolved as u16;
                let outcome = alu_eval(*op, a, b, self.flags & CARRY != 0, 16);
                self.regs.write16(*dst, outcome.result);
                self.flags = outcome.flags;
            }

            Instruction::CmpReg { r1, r2, ext } => {
                let width = if *ext { 16 } else { 8 };
                self.apply_reg_alu(*r1, *r1, *r2, AluOp::Sub, width, false);
            }
            Instruction::CmpImm8 { r, value } => {
                let a = self.regs.read8(*r) as u16;
                let outcome = alu_eval(AluOp::Sub, a, value.resolved as u16, false, 8);
                self.flags = outcome.flags;
            }
            Instruction::CmpImm16 { p, value } => {
                let a = self.regs.read16(*p);
                let outcome = alu_eval(AluOp::Sub, a, value.resolved as u16, false, 16);
                self.flags = outcome.flags;
            }

            Instruction::Jump { cond, target } => {
                if self.condition_true(*cond) {
                    self.pc = target.resolved as u16;
                    *pc_set = true;
                }
            }
            Instruction::JumpIndirect { cond, reg } => {
                if self.condition_true(*cond) {
                    self.pc = self.regs.read16(*reg);
                    *pc_set = true;
                }
            }
            Instruction::Call { cond, target } => {
                if self.condition_true(*cond) {
                    let return_addr = self.pc.wrapping_add(instr.length());
                    self.push16(return_addr);
                    self.pc = target.resolved as u16;
                    *pc_set = true;
                }
            }
            Instruction::Return { cond } => {
                if self.condition_true(*cond) {
                    self.pc = self.pop16();
                    *pc_set = true;
                }
            }

            Instruction::Push8 { reg } => {
                let value = self.regs.read8(*reg);
                self.push8(value);
            }
            Instruction::Pop8 { reg } => {
                let value = self.pop8();
                self.regs.write8(*reg, value);
            }
            Instruction::Push16 { reg } => {
                let value = self.regs.read16(*reg);
                self.push16(value);
            }
            Instruction::Pop16 { reg } => {
                let value = self.pop16();
                self.regs.write16(*reg, value);
            }

            Instruction::LoadFlags { reg } => {
                self.flags = self.regs.read8(*reg) & 0x0F;
            }
            Instruction::StoreFlags { reg } => {
                self.regs.write8(*reg, self.flags & 0x0F);
            }
            Instruction::EnableInterrupts => self.interrupts_enabled = true,
            Instruction::DisableInterrupts => self.interrupts_enabled = false,
            Instruction::SignExtend { reg } => {
                let high = reg.paired_high();
                let extended = if self.regs.read8(*reg) & 0x80 != 0 { 0xFF } else { 0x00 };
                self.regs.write8(high, extended);
            }
        }
    }

    /// Shared path for every register-indexed ALU form (`LD/LSH/RSH R,S`,
    /// `ALU R,S,Q`, `CMP R,S`). `save_result=false` still runs `alu_eval`
    /// for its flags but never writes `dst` — the source's own caution
    /// about not double-writing on the `CMP` path.
    fn apply_reg_alu(&mut self, dst: u8, src1: u8, src2: u8, op: AluOp, width: u32, save_result: bool) {
        let (a, b) = if width == 16 {
            let p1 = Reg16::from_index(src1 & 0x07);
            let p2 = Reg16::from_index(src2 & 0x07);
            (self.regs.read16(p1), self.regs.read16(p2))
        } else {
            let r1 = Reg8::from_index(src1 & 0x07);
            let r2 = Reg8::from_index(src2 & 0x07);
            (self.regs.read8(r1) as u16, self.regs.read8(r2) as u16)
        };

        let outcome = alu_eval(op, a, b, self.flags & CARRY != 0, width);

        // CMP routes through here with save_result=false: flags still
        // apply, but dst (aliased to src1) is never written.
        if save_result {
            if width == 16 {
                self.regs.write16(Reg16::from_index(dst & 0x07), outcome.result);
            } else {
                self.regs.write8(Reg8::from_index(dst & 0x07), outcome.result as u8);
            }
        }

        if !matches!(op, AluOp::TransferA | AluOp::TransferB) {
            self.flags = outcome.flags;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Value;

    fn vm() -> Vm<Vec<u8>> {
        Vm::new(Vec::new())
    }

    #[test]
    fn load_immediate_8_matches_external_scenario() {
        let mut m = vm();
        m.copy_to_ram(&[0x88, 0x04, 0x42], 0);
        m.step().unwrap();
        assert_eq!(m.read8(Reg8::A), 0x42);
        assert_eq!(m.pc(), 3);
    }

    #[test]
    fn push_ba_pop_cd_round_trips_across_the_pair() {
        let mut m = vm();
        m.regs.write16(Reg16::Ba, 0x1234);
        let start_sp = m.regs.sp;
        m.push16(m.regs.read16(Reg16::Ba));
        let popped = m.pop16();
        m.regs.write16(Reg16::Cd, popped);
        assert_eq!(m.regs.read16(Reg16::Cd), 0x1234);
        assert_eq!(m.regs.sp, start_sp);
    }

    #[test]
    fn push16_writes_low_byte_at_the_higher_address() {
        let mut m = vm();
        m.regs.sp = 0x2000;
        m.push16(0x1234);
        // low byte (0x34) pushed first lands at the higher address;
        // high byte (0x12) pushed second ends up at the final, lowest sp.
        assert_eq!(m.regs.sp, 0x1FFE);
        assert_eq!(m.ram[0x1FFF], 0x34);
        assert_eq!(m.ram[0x1FFE], 0x12);
    }

    #[test]
    fn add_sets_flags_matching_external_scenario() {
        let mut m = vm();
        m.regs.write8(Reg8::A, 0xFE);
        m.regs.write8(Reg8::B, 0x03);
        // `ADD A, B, 5` — B's value never enters the computation; only
        // A's current value and the immediate do.
        let instr = Instruction::AluImm8 {
            dst: Reg8::A,
            src: Reg8::B,
            op: AluOp::Add,
            value: Value::literal(0x05),
        };
        let mut pc_set = false;
        m.execute(&instr, &mut pc_set);
        assert_eq!(m.read8(Reg8::A), 0x03);
        assert_eq!(m.flags() & CARRY, CARRY);
        assert_eq!(m.flags() & ZERO, 0);
        assert_eq!(m.flags() & SIGN, 0);
        assert_eq!(m.flags() & OVERFLOW, 0);
    }

    #[test]
    fn cmp_leaves_registers_unchanged_but_sets_flags() {
        let mut m = vm();
        m.regs.write8(Reg8::A, 10);
        let instr = Instruction::CmpImm8 {
            r: Reg8::A,
            value: Value::literal(10),
        };
        let mut pc_set = false;
        m.execute(&instr, &mut pc_set);
        assert_eq!(m.read8(Reg8::A), 10);
        assert_eq!(m.flags() & ZERO, ZERO);
    }

    #[test]
    fn sign_extend_fills_paired_high_from_sign_bit() {
        let mut m = vm();
        m.regs.write8(Reg8::A, 0x80);
        let instr = Instruction::SignExtend { reg: Reg8::A };
        let mut pc_set = false;
        m.execute(&instr, &mut pc_set);
        assert_eq!(m.read8(Reg8::B), 0xFF);
    }

    #[test]
    fn stdout_writes_divert_to_the_sink_not_ram() {
        let mut m = vm();
        m.regs.write8(Reg8::A, b'!');
        let instr = Instruction::StoreAbs {
            addr: Value::literal(0xFFFF),
            src: Reg8::A,
        };
        let mut pc_set = false;
        m.execute(&instr, &mut pc_set);
        assert_eq!(m.stdout, vec![b'!']);
        assert_eq!(m.ram[0xFFFF], 0);
    }

    #[test]
    fn invalid_opcode_is_fatal() {
        let mut m = vm();
        m.copy_to_ram(&[0b00111_000], 0);
        assert!(matches!(m.step(), Err(VmError::InvalidOpcode(_))));
    }
}
