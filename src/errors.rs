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

use thiserror::Error;

/// Errors produced while parsing, resolving and encoding a program.
///
/// Every variant is fatal: there is no partial-output recovery anywhere in
/// the pipeline, so the first error returned by any pass aborts assembly.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum AssemblyError {
    #[error("Parse Error on line {line}: {reason}")]
    ParseError { line: usize, reason: String },

    #[error("Structural Error on line {line}: {reason}")]
    StructuralError { line: usize, reason: String },

    #[error("Semantic Error on line {line}: {reason}")]
    SemanticError { line: usize, reason: String },

    #[error("Semantic Error: {reason}")]
    SemanticErrorNoLine { reason: String },

    #[error("Undefined label: {0}")]
    UnresolvedLabel(String),

    #[error("Undefined constant: {0}")]
    UnresolvedConst(String),

    #[error("Reference to undefined data entry: {0}")]
    UnresolvedData(String),

    #[error("Value {value:#06x} does not fit in {bits} bits (line {line})")]
    ValueTooLarge { line: usize, value: i64, bits: u8 },

    #[error("'{0}' refers to a data entry's byte offset, but only its length may be taken here")]
    OffsetOnLengthRef(String),

    #[error("Opcode {0:#04x} does not correspond to any instruction")]
    InvalidOpcode(u8),

    #[error("Assembled image of {size} bytes overflows the {limit}-byte address space")]
    ImageOverflow { size: usize, limit: usize },
}

/// Errors the virtual machine can raise while executing a loaded image.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum VmError {
    #[error("Opcode {0:#04x} does not correspond to any instruction")]
    InvalidOpcode(u8),

    #[error("Execution ran past the end of addressable memory at {0:#06x}")]
    AddressOverflow(u32),
}
