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

//! The five-pass assembler pipeline: `prepareSource`, `buildDataSegment`,
//! `solveDataReferences`, `solveJumps`, `buildCodeSegment`.

pub mod codec;
pub mod value;

use std::collections::HashMap;

use crate::ast::{Condition, Instruction, Item, Reg16, Value};
use crate::errors::AssemblyError;
use value::{DataEntry, Environment};

pub type ConstantTable = HashMap<String, u16>;

/// A map from data-label name to its entry, preserving insertion order —
/// tested by emission order in the data-segment scenario.
#[derive(Default, Debug, Clone)]
pub struct DataTable {
    order: Vec<String>,
    entries: HashMap<String, DataEntry>,
}

impl DataTable {
    pub fn insert(&mut self, name: String, entry: DataEntry) {
        if !self.entries.contains_key(&name) {
            self.order.push(name.clone());
        }
        self.entries.insert(name, entry);
    }

    pub fn get(&self, name: &str) -> Option<&DataEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut DataEntry> {
        self.entries.get_mut(name)
    }

    pub fn iter_ordered(&self) -> impl Iterator<Item = (&str, &DataEntry)> {
        self.order.iter().map(move |name| {
            (
                name.as_str(),
                self.entries.get(name).expect("order and entries stay in sync"),
            )
        })
    }
}

/// A laid-out region of the final image.
#[derive(Debug, Default, Clone)]
pub struct Segment {
    pub offset: u32,
    pub length: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default, Clone)]
pub struct Image {
    pub code: Segment,
    pub data: Segment,
}

impl Image {
    /// Code bytes then data bytes, the raw binary layout.
    pub fn concat(&self) -> Vec<u8> {
        let mut out = self.code.bytes.clone();
        out.extend_from_slice(&self.data.bytes);
        out
    }

    /// Address-annotated hex+mnemonic listing of the code segment, in the
    /// style of the original assembler's `printProgram`.
    pub fn format_listing(&self) -> Result<String, AssemblyError> {
        let lines = crate::disassembler::disassemble(&self.code.bytes, self.code.offset as u16)?;
        Ok(crate::disassembler::format_lines(&lines, &self.code.bytes, self.code.offset as u16))
    }
}

const ADDRESS_SPACE: usize = 1 << 16;
const INTERRUPT_VECTOR_BASE: u16 = 0x10;
const INTERRUPT_SLOT_COUNT: u8 = 4;

fn interrupt_entry_name(index: u8) -> String {
    format!("__interrupt_entry_{index}")
}

/// Owns the ordered IR list plus the constant and data tables that build up
/// alongside it. A fresh `Assembler` is fully independent of any other —
/// there is no shared process-wide state.
#[derive(Default)]
pub struct Assembler {
    items: Vec<Item>,
    consts: ConstantTable,
    data: DataTable,
    entry_point: Option<u16>,
    stack_base: Option<u16>,
}

impl Assembler {
    pub fn new() -> Assembler {
        Assembler::default()
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }

    pub fn define_const(&mut self, name: impl Into<String>, value: u16) -> Result<(), AssemblyError> {
        let name = name.into();
        if self.consts.contains_key(&name) {
            return Err(AssemblyError::SemanticErrorNoLine {
                reason: format!("Duplicate constant definition: {name}"),
            });
        }
        self.consts.insert(name, value);
        Ok(())
    }

    pub fn define_data(&mut self, name: impl Into<String>, bytes: Vec<u8>) -> Result<(), AssemblyError> {
        let name = name.into();
        if self.data.get(&name).is_some() {
            return Err(AssemblyError::SemanticErrorNoLine {
                reason: format!("Duplicate data label: {name}"),
            });
        }
        self.data.insert(name, DataEntry { bytes, offset: None });
        Ok(())
    }

    pub fn set_entry_point(&mut self, addr: u16) {
        self.entry_point = Some(addr);
    }

    pub fn set_stack_base(&mut self, addr: u16) {
        self.stack_base = Some(addr);
    }

    /// Run the full pipeline and produce the final image.
    pub fn assemble(&mut self) -> Result<Image, AssemblyError> {
        let code_offset = self.entry_point.unwrap_or(0) as u32;

        self.prepare_source()?;
        self.build_data_segment();
        self.solve_data_references()?;
        self.solve_jumps()?;
        let code = self.build_code_segment(code_offset)?;

        let data_offset = code.offset + code.length;
        let data_bytes = self.finalize_data_bytes();
        if data_offset as usize + data_bytes.len() > ADDRESS_SPACE {
            return Err(AssemblyError::ImageOverflow {
                size: data_offset as usize + data_bytes.len(),
                limit: ADDRESS_SPACE,
            });
        }
        let data = Segment {
            offset: data_offset,
            length: data_bytes.len() as u32,
            bytes: data_bytes,
        };

        Ok(Image { code, data })
    }

    fn has_label(&self, name: &str) -> bool {
        self.items
            .iter()
            .any(|item| matches!(item, Item::Label(label) if label == name))
    }

    fn label_position(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| matches!(item, Item::Label(label) if label == name))
    }

    /// Pass 1: inject the `main` label, the stack-pointer preamble, and the
    /// fixed interrupt vector table.
    fn prepare_source(&mut self) -> Result<(), AssemblyError> {
        if !self.has_label("main") {
            self.items.insert(0, Item::Label("main".to_string()));
        }

        if let Some(stack_base) = self.stack_base {
            let main_pos = self
                .label_position("main")
                .expect("main label was just ensured to exist");
            self.items.insert(
                main_pos + 1,
                Item::Instruction(Instruction::LoadImm16 {
                    dst: Reg16::Sp,
                    value: Value::literal(stack_base as i64),
                }),
            );
        }

        let interrupts_used: Vec<bool> = (0..INTERRUPT_SLOT_COUNT)
            .map(|i| {
                self.items
                    .iter()
                    .any(|item| matches!(item, Item::InterruptEntryPoint(idx) if *idx == i))
            })
            .collect();

        if interrupts_used.iter().any(|used| *used) {
            let mut prefix = Vec::new();
            prefix.push(Item::Instruction(Instruction::Jump {
                cond: Condition::Unconditional,
                target: Value::unresolved_label("main"),
            }));
            let jump_len = Instruction::Jump {
                cond: Condition::Unconditional,
                target: Value::literal(0),
            }
            .length();
            let pad = INTERRUPT_VECTOR_BASE.saturating_sub(jump_len);
            if pad > 0 {
                prefix.push(Item::Padding(pad));
            }
            for (i, used) in interrupts_used.iter().enumerate() {
                if *used {
                    prefix.push(Item::Instruction(Instruction::Jump {
                        cond: Condition::Unconditional,
                        target: Value::unresolved_label(interrupt_entry_name(i as u8)),
                    }));
                    prefix.push(Item::Instruction(Instruction::Nop));
                } else {
                    prefix.push(Item::Padding(4));
                }
            }
            self.items.splice(0..0, prefix);
        }

        Ok(())
    }

    /// Pass 2: lay out the data segment, assigning each entry's offset.
    fn build_data_segment(&mut self) {
        let order = self.data.order.clone();
        let mut running: u32 = 0;
        for name in order {
            let entry = self.data.get_mut(&name).expect("order and entries stay in sync");
            entry.offset = Some(running);
            running += entry.length();
        }
    }

    /// The data segment's base address in the final image: the code
    /// segment's starting offset (the entry point, if any) plus the total
    /// length of every IR item emitted before it.
    fn data_segment_base(&self) -> u32 {
        let code_offset = self.entry_point.unwrap_or(0) as u32;
        code_offset + self.items.iter().map(item_length).sum::<u32>()
    }

    /// Pass 3: resolve every const/data-label `Value` carried by an
    /// instruction. Jump/call targets are untouched here — they resolve in
    /// `solve_jumps` instead.
    fn solve_data_references(&mut self) -> Result<(), AssemblyError> {
        let base = self.data_segment_base();
        let env = Environment {
            consts: &self.consts,
            data: &self.data,
            data_segment_base: base,
        };

        for (index, item) in self.items.iter_mut().enumerate() {
            let Item::Instruction(instr) = item else {
                continue;
            };
            resolve_instruction_values(instr, &env, index)?;
        }
        Ok(())
    }

    /// Pass 4: build the label→address map, then patch every symbolic jump
    /// and call target against it.
    fn solve_jumps(&mut self) -> Result<(), AssemblyError> {
        let code_offset = self.entry_point.unwrap_or(0) as u32;
        let mut addresses: HashMap<String, u32> = HashMap::new();
        let mut running = code_offset;
        for item in &self.items {
            match item {
                Item::Label(name) => {
                    addresses.insert(name.clone(), running);
                }
                Item::InterruptEntryPoint(index) => {
                    addresses.insert(interrupt_entry_name(*index), running);
                }
                _ => {}
            }
            running += item_length(item);
        }

        for item in &mut self.items {
            let Item::Instruction(instr) = item else {
                continue;
            };
            let target = match instr {
                Instruction::Jump { target, .. } => Some(target),
                Instruction::Call { target, .. } => Some(target),
                _ => None,
            };
            let Some(target) = target else { continue };
            let Some(name) = target.label.clone() else {
                continue;
            };
            match addresses.get(&name) {
                Some(addr) => target.resolved = *addr as i64,
                None if name.starts_with("__interrupt_entry_") => {
                    tracing::warn!(label = %name, "interrupt vector target never defined");
                }
                None => return Err(AssemblyError::UnresolvedLabel(name)),
            }
        }
        Ok(())
    }

    /// Pass 5: encode every instruction into the final code segment.
    fn build_code_segment(&self, code_offset: u32) -> Result<Segment, AssemblyError> {
        let mut bytes = Vec::new();
        for item in &self.items {
            match item {
                Item::Label(_) | Item::InterruptEntryPoint(_) => {}
                Item::Padding(n) => bytes.extend(std::iter::repeat(0u8).take(*n as usize)),
                Item::Instruction(instr) => bytes.extend(codec::encode(instr)?),
            }
        }
        if code_offset as usize + bytes.len() > ADDRESS_SPACE {
            return Err(AssemblyError::ImageOverflow {
                size: code_offset as usize + bytes.len(),
                limit: ADDRESS_SPACE,
            });
        }
        Ok(Segment {
            offset: code_offset,
            length: bytes.len() as u32,
            bytes,
        })
    }

    fn finalize_data_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();
        for (_, entry) in self.data.iter_ordered() {
            bytes.extend_from_slice(&entry.bytes);
        }
        bytes
    }
}

fn item_length(item: &Item) -> u32 {
    match item {
        Item::Label(_) | Item::InterruptEntryPoint(_) => 0,
        Item::Padding(n) => *n as u32,
        Item::Instruction(instr) => instr.length() as u32,
    }
}

fn resolve_instruction_values(
    instr: &mut Instruction,
    env: &Environment,
    line: usize,
) -> Result<(), AssemblyError> {
    match instr {
        Instruction::LoadImm8 { value, .. }
        | Instruction::AluImm8 { value, .. }
        | Instruction::CmpImm8 { value, .. } => value::resolve(value, env, line, 8),
        Instruction::LoadImm16 { value, .. }
        | Instruction::AluImm16 { value, .. }
        | Instruction::CmpImm16 { value, .. } => value::resolve(value, env, line, 16),
        Instruction::LoadAbs { addr, .. } | Instruction::StoreAbs { addr, .. } => {
            value::resolve(addr, env, line, 16)
        }
        // Register moves, indexed forms, jumps/calls, stack ops and the
        // flag/interrupt instructions carry no resolvable Value.
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Reg8;

    #[test]
    fn nop_only_program_matches_external_scenario() {
        let mut asm = Assembler::new();
        asm.push(Item::Label("main".to_string()));
        asm.push(Item::Instruction(Instruction::Nop));
        let image = asm.assemble().unwrap();
        assert_eq!(image.code.bytes, vec![0x00]);
        assert_eq!(image.code.length, 1);
        assert_eq!(image.data.offset, 1);
    }

    #[test]
    fn code_and_data_offsets_are_contiguous() {
        let mut asm = Assembler::new();
        asm.push(Item::Label("main".to_string()));
        asm.push(Item::Instruction(Instruction::Nop));
        asm.define_data("msg", vec![b'h', b'i']).unwrap();
        let image = asm.assemble().unwrap();
        assert_eq!(image.code.offset + image.code.length, image.data.offset);
    }

    #[test]
    fn unresolved_label_is_fatal() {
        let mut asm = Assembler::new();
        asm.push(Item::Label("main".to_string()));
        asm.push(Item::Instruction(Instruction::Jump {
            cond: Condition::Unconditional,
            target: Value::unresolved_label("nowhere"),
        }));
        assert!(matches!(
            asm.assemble(),
            Err(AssemblyError::UnresolvedLabel(ref l)) if l == "nowhere"
        ));
    }

    #[test]
    fn jump_resolution_matches_external_scenario() {
        let mut asm = Assembler::new();
        asm.push(Item::Label("main".to_string()));
        asm.push(Item::Instruction(Instruction::Jump {
            cond: Condition::Unconditional,
            target: Value::unresolved_label("main"),
        }));
        let image = asm.assemble().unwrap();
        assert_eq!(&image.code.bytes[0..3], &[0xC8, 0x00, 0x00]);
    }

    #[test]
    fn data_length_reference_resolves_to_byte_count() {
        let mut asm = Assembler::new();
        asm.push(Item::Label("main".to_string()));
        asm.define_data("msg", vec![b'A', b'B']).unwrap();
        asm.push(Item::Instruction(Instruction::LoadImm8 {
            dst: Reg8::A,
            value: Value::data_length("msg"),
        }));
        let image = asm.assemble().unwrap();
        assert_eq!(image.code.bytes[2], 0x02);
    }

    #[test]
    fn data_label_address_accounts_for_a_nonzero_entry_point() {
        let mut asm = Assembler::new();
        asm.set_entry_point(0x100);
        asm.push(Item::Label("main".to_string()));
        asm.define_data("msg", vec![b'A', b'B']).unwrap();
        asm.push(Item::Instruction(Instruction::LoadAbs {
            dst: Reg8::A,
            addr: Value::data_address("msg", 0),
        }));
        let image = asm.assemble().unwrap();
        assert_eq!(image.data.offset, 0x103);
        let resolved = u16::from_le_bytes([image.code.bytes[1], image.code.bytes[2]]);
        assert_eq!(resolved, 0x103);
    }

    #[test]
    fn interrupt_vector_table_reserves_sixteen_bytes_before_slots() {
        let mut asm = Assembler::new();
        asm.push(Item::Label("main".to_string()));
        asm.push(Item::InterruptEntryPoint(0));
        asm.push(Item::Instruction(Instruction::Return {
            cond: Condition::Unconditional,
        }));
        let image = asm.assemble().unwrap();
        // JMP main (3) + 13 NOPs pads to 16, then slot 0's JMP+NOP, then
        // three empty Padding(4) slots.
        assert_eq!(image.code.bytes[0], 0xC8);
        assert_eq!(&image.code.bytes[3..16], &[0u8; 13]);
        assert_eq!(image.code.bytes[16], 0xC8);
    }
}
