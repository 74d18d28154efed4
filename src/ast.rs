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

//! The instruction IR: a tagged variant covering every encodable instruction
//! shape plus the three IR-only pseudo-items (label, interrupt entry point,
//! padding). One `Instruction` arm per row of the shape table; each arm holds
//! exactly the operand fields that shape needs.

/// An 8-bit register half. `0:A, 1:D, 2:F, 3:Y, 4:B, 5:C, 6:E, 7:X`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reg8 {
    A,
    D,
    F,
    Y,
    B,
    C,
    E,
    X,
}

impl Reg8 {
    pub const ALL: [Reg8; 8] = [
        Reg8::A,
        Reg8::D,
        Reg8::F,
        Reg8::Y,
        Reg8::B,
        Reg8::C,
        Reg8::E,
        Reg8::X,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Reg8 {
        Self::ALL[(index & 0x07) as usize]
    }

    /// The 8-bit half overlapping the high byte of this register's pair,
    /// per `SEXT`'s "index the register table with `r | 0b100`" rule.
    pub fn paired_high(self) -> Reg8 {
        Self::from_index(self.index() | 0b100)
    }
}

/// A 16-bit register pair. `BA=0, CD=1, EF=2, XY=3, SP=4, FP=5, IX=6, IY=7`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Reg16 {
    Ba,
    Cd,
    Ef,
    Xy,
    Sp,
    Fp,
    Ix,
    Iy,
}

impl Reg16 {
    pub const ALL: [Reg16; 8] = [
        Reg16::Ba,
        Reg16::Cd,
        Reg16::Ef,
        Reg16::Xy,
        Reg16::Sp,
        Reg16::Fp,
        Reg16::Ix,
        Reg16::Iy,
    ];

    pub fn index(self) -> u8 {
        self as u8
    }

    pub fn from_index(index: u8) -> Reg16 {
        Self::ALL[(index & 0x07) as usize]
    }

    /// `Some((low, high))` halves for the four pairs that decompose;
    /// `None` for `SP/FP/IX/IY`, which have no 8-bit view.
    pub fn halves(self) -> Option<(Reg8, Reg8)> {
        match self {
            Reg16::Ba => Some((Reg8::A, Reg8::B)),
            Reg16::Cd => Some((Reg8::D, Reg8::C)),
            Reg16::Ef => Some((Reg8::F, Reg8::E)),
            Reg16::Xy => Some((Reg8::Y, Reg8::X)),
            Reg16::Sp | Reg16::Fp | Reg16::Ix | Reg16::Iy => None,
        }
    }
}

/// The shared ALU/shift selector. The codec appends the extended bit; see
/// [`crate::assembler::codec::alu_selector`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AluOp {
    TransferA,
    TransferB,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Or,
    Xor,
    Not,
    Lsh,
    Rsh,
}

impl AluOp {
    /// Base selector value before the extended bit is folded in. `TransferB`
    /// is pinned at base `2` (giving `alu5 = 0b00100` for its 8-bit form) by
    /// the worked `LD R,NN` example in the external interface scenarios;
    /// the remaining bases are this crate's own choice, not otherwise
    /// pinned by the wire format.
    pub fn base(self) -> u8 {
        match self {
            AluOp::TransferA => 0,
            AluOp::TransferB => 2,
            AluOp::Add => 3,
            AluOp::Adc => 4,
            AluOp::Sub => 5,
            AluOp::Sbc => 6,
            AluOp::And => 7,
            AluOp::Or => 8,
            AluOp::Xor => 9,
            AluOp::Not => 10,
            AluOp::Lsh => 11,
            AluOp::Rsh => 12,
        }
    }

    pub fn from_base(base: u8) -> Option<AluOp> {
        Some(match base {
            0 => AluOp::TransferA,
            2 => AluOp::TransferB,
            3 => AluOp::Add,
            4 => AluOp::Adc,
            5 => AluOp::Sub,
            6 => AluOp::Sbc,
            7 => AluOp::And,
            8 => AluOp::Or,
            9 => AluOp::Xor,
            10 => AluOp::Not,
            11 => AluOp::Lsh,
            12 => AluOp::Rsh,
            _ => return None,
        })
    }
}

/// The 4-bit branch condition. `UNCOND` is only ever used by the encoder's
/// "which opcode constant" trick: it selects the unconditional-specific
/// opcode but is still folded into byte 0's low bits like any other code.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Condition {
    Carry,
    Zero,
    Sign,
    Overflow,
    NotCarry,
    NotZero,
    NotSign,
    NotOverflow,
    Unconditional,
}

impl Condition {
    pub fn code(self) -> u8 {
        match self {
            Condition::Carry => 0,
            Condition::Zero => 1,
            Condition::Sign => 2,
            Condition::Overflow => 3,
            Condition::NotCarry => 4,
            Condition::NotZero => 5,
            Condition::NotSign => 6,
            Condition::NotOverflow => 7,
            Condition::Unconditional => 8,
        }
    }

    pub fn from_code(code: u8) -> Option<Condition> {
        Some(match code {
            0 => Condition::Carry,
            1 => Condition::Zero,
            2 => Condition::Sign,
            3 => Condition::Overflow,
            4 => Condition::NotCarry,
            5 => Condition::NotZero,
            6 => Condition::NotSign,
            7 => Condition::NotOverflow,
            8 => Condition::Unconditional,
            _ => return None,
        })
    }
}

/// A symbolic-or-literal operand. See [`crate::assembler::value`] for the
/// resolution pipeline that reduces every non-literal kind to a literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Literal,
    ConstRef,
    DataLabelAddress,
    DataLabelLength,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub kind: ValueKind,
    pub resolved: i64,
    pub label: Option<String>,
    pub offset: i32,
}

impl Value {
    pub fn literal(value: i64) -> Value {
        Value {
            kind: ValueKind::Literal,
            resolved: value,
            label: None,
            offset: 0,
        }
    }

    /// A jump/call target awaiting `solveJumps`. Kept as `kind: Literal` so
    /// the codec (which only ever reads `resolved`) can't accidentally
    /// encode it before it's patched; `solveJumps` — not `resolve()` — is
    /// what fills in `resolved` for these, via a separate label→address
    /// map rather than the const/data resolution pipeline.
    pub fn unresolved_label(name: impl Into<String>) -> Value {
        Value {
            kind: ValueKind::Literal,
            resolved: 0,
            label: Some(name.into()),
            offset: 0,
        }
    }

    pub fn const_ref(name: impl Into<String>, offset: i32) -> Value {
        Value {
            kind: ValueKind::ConstRef,
            resolved: 0,
            label: Some(name.into()),
            offset,
        }
    }

    pub fn data_address(name: impl Into<String>, offset: i32) -> Value {
        Value {
            kind: ValueKind::DataLabelAddress,
            resolved: 0,
            label: Some(name.into()),
            offset,
        }
    }

    pub fn data_length(name: impl Into<String>) -> Value {
        Value {
            kind: ValueKind::DataLabelLength,
            resolved: 0,
            label: Some(name.into()),
            offset: 0,
        }
    }

    pub fn is_literal(&self) -> bool {
        self.kind == ValueKind::Literal
    }
}

/// One entry in the ordered IR list the assembler consumes. Real
/// instructions encode to bytes; `Label`, `InterruptEntryPoint` and
/// `Padding` are zero-cost bookkeeping markers the resolver and layout
/// passes understand but the codec never sees directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Item {
    Instruction(Instruction),
    Label(String),
    InterruptEntryPoint(u8),
    Padding(u16),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Nop,

    /// `LD/LSH/RSH R,S`: a register-to-register move or in-place shift,
    /// selected by `op`. `ext` picks the 8- vs 16-bit view independently of
    /// which halves/pairs `dst`/`src` name (callers are expected to pass a
    /// consistent pair of 8-bit or 16-bit operands).
    RegMove {
        dst: u8,
        src: u8,
        op: AluOp,
        ext: bool,
    },
    /// `LD R,NN`
    LoadImm8 { dst: Reg8, value: Value },
    /// `LD P,NNNN`
    LoadImm16 { dst: Reg16, value: Value },
    /// `LD R,[NNNN]`
    LoadAbs { dst: Reg8, addr: Value },
    /// `LD R,[PP+SS]`
    LoadIndexed {
        dst: Reg8,
        base: Reg16,
        offset: i8,
    },
    /// `ST [NNNN],R`
    StoreAbs { addr: Value, src: Reg8 },
    /// `ST [PP+SS],R`
    StoreIndexed {
        base: Reg16,
        offset: i8,
        src: Reg8,
    },

    /// `ALU R,S,Q` (3-operand register form, 8- or 16-bit per `ext`).
    AluReg {
        dst: u8,
        src1: u8,
        src2: u8,
        op: AluOp,
        ext: bool,
    },
    /// `ALU R,S,NN`
    AluImm8 {
        dst: Reg8,
        src: Reg8,
        op: AluOp,
        value: Value,
    },
    /// `ALU P,Q,NNNN`
    AluImm16 {
        dst: Reg16,
        src: Reg16,
        op: AluOp,
        value: Value,
    },

    /// `CMP R,S`
    CmpReg { r1: u8, r2: u8, ext: bool },
    /// `CMP R,NN`
    CmpImm8 { r: Reg8, value: Value },
    /// `CMP P,NNNN`
    CmpImm16 { p: Reg16, value: Value },

    /// `JMP{C} NNNN`
    Jump { cond: Condition, target: Value },
    /// `JMP{C} PP`
    JumpIndirect { cond: Condition, reg: Reg16 },
    /// `CALL{C} NNNN`
    Call { cond: Condition, target: Value },
    /// `RET{C}`
    Return { cond: Condition },

    Push8 { reg: Reg8 },
    Pop8 { reg: Reg8 },
    Push16 { reg: Reg16 },
    Pop16 { reg: Reg16 },

    /// `LF R`
    LoadFlags { reg: Reg8 },
    /// `SF R`
    StoreFlags { reg: Reg8 },
    EnableInterrupts,
    DisableInterrupts,
    /// `SEXT R`
    SignExtend { reg: Reg8 },
}

impl Instruction {
    /// Encoded length in bytes, per the shape table. Kept independent of
    /// [`crate::assembler::codec`] so the layout passes can size an
    /// instruction without encoding it (values may still be symbolic).
    pub fn length(&self) -> u16 {
        match self {
            Instruction::Nop
            | Instruction::Return { .. }
            | Instruction::Push8 { .. }
            | Instruction::Pop8 { .. }
            | Instruction::Push16 { .. }
            | Instruction::Pop16 { .. }
            | Instruction::LoadFlags { .. }
            | Instruction::StoreFlags { .. }
            | Instruction::EnableInterrupts
            | Instruction::DisableInterrupts
            | Instruction::SignExtend { .. } => 1,

            Instruction::RegMove { .. }
            | Instruction::CmpReg { .. }
            | Instruction::JumpIndirect { .. } => 2,

            Instruction::LoadImm8 { .. }
            | Instruction::LoadImm16 { .. }
            | Instruction::LoadAbs { .. }
            | Instruction::LoadIndexed { .. }
            | Instruction::StoreAbs { .. }
            | Instruction::StoreIndexed { .. }
            | Instruction::AluReg { .. }
            | Instruction::AluImm8 { .. }
            | Instruction::CmpImm8 { .. }
            | Instruction::Jump { .. }
            | Instruction::Call { .. } => 3,

            Instruction::AluImm16 { .. } | Instruction::CmpImm16 { .. } => 4,
        }
    }
}
