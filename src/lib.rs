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

pub mod assembler;
pub mod ast;
pub mod disassembler;
pub mod errors;
pub mod file_reader;
pub mod output;
pub mod parser;
pub mod vm;

use std::path::Path;

use anyhow::{Context, Result};
use file_reader::FileReader;

/// Parse and assemble a `.j80` source file read through `reader`, returning
/// the final flat image (code segment followed by data segment).
pub fn assemble<F: FileReader>(
    source_path: &Path,
    entry_point: Option<u16>,
    stack_base: Option<u16>,
    reader: &F,
) -> Result<assembler::Image> {
    let source = reader
        .read_to_string(source_path)
        .with_context(|| format!("Failed to read source file: {}", source_path.display()))?;

    let mut asm = assembler::Assembler::new();
    if let Some(entry) = entry_point {
        asm.set_entry_point(entry);
    }
    if let Some(stack) = stack_base {
        asm.set_stack_base(stack);
    }

    parser::parse_into(&source, &mut asm).context("Failed while parsing source")?;
    let image = asm.assemble().context("Failed while assembling program")?;
    Ok(image)
}
