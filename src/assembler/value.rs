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

//! Resolution of symbolic [`Value`]s against the assembler's constant and
//! data tables. Only `LITERAL` values may reach the codec; every other kind
//! is reduced to one here, during `solveDataReferences`.

use crate::ast::{Value, ValueKind};
use crate::errors::AssemblyError;

/// A data-segment entry: its bytes, and the offset assigned once
/// `buildDataSegment` has run.
#[derive(Debug, Clone)]
pub struct DataEntry {
    pub bytes: Vec<u8>,
    pub offset: Option<u32>,
}

impl DataEntry {
    pub fn length(&self) -> u32 {
        self.bytes.len() as u32
    }
}

/// Everything a `Value` needs to resolve against: the constant table, the
/// data table (insertion-order preserved by its caller), and the base
/// address of the data segment.
pub struct Environment<'a> {
    pub consts: &'a crate::assembler::ConstantTable,
    pub data: &'a crate::assembler::DataTable,
    pub data_segment_base: u32,
}

/// Resolve `value` in place against `env`. `bits` bounds the result (`8` or
/// `16`); a result that does not fit is `ValueTooLarge`.
pub fn resolve(value: &mut Value, env: &Environment, line: usize, bits: u8) -> Result<(), AssemblyError> {
    match value.kind {
        ValueKind::Literal => {}
        ValueKind::ConstRef => {
            let name = value.label.clone().unwrap_or_default();
            let base = *env
                .consts
                .get(&name)
                .ok_or_else(|| AssemblyError::UnresolvedConst(name.clone()))?;
            value.resolved = base as i64 + value.offset as i64;
            value.kind = ValueKind::Literal;
        }
        ValueKind::DataLabelAddress => {
            let name = value.label.clone().unwrap_or_default();
            if let Some(entry) = env.data.get(&name) {
                let offset = entry
                    .offset
                    .expect("buildDataSegment must run before solveDataReferences");
                value.resolved = offset as i64 + env.data_segment_base as i64 + value.offset as i64;
            } else if let Some(base) = env.consts.get(&name) {
                value.resolved = *base as i64 + value.offset as i64;
            } else {
                return Err(AssemblyError::UnresolvedData(name));
            }
            value.kind = ValueKind::Literal;
        }
        ValueKind::DataLabelLength => {
            if value.offset != 0 {
                let name = value.label.clone().unwrap_or_default();
                return Err(AssemblyError::OffsetOnLengthRef(name));
            }
            let name = value.label.clone().unwrap_or_default();
            let entry = env
                .data
                .get(&name)
                .ok_or_else(|| AssemblyError::UnresolvedData(name.clone()))?;
            value.resolved = entry.length() as i64;
            value.kind = ValueKind::Literal;
        }
    }

    match bits {
        8 => {
            if !(-128..=255).contains(&value.resolved) {
                return Err(AssemblyError::ValueTooLarge {
                    line,
                    value: value.resolved,
                    bits: 8,
                });
            }
        }
        16 => {
            if !(-32768..=65535).contains(&value.resolved) {
                return Err(AssemblyError::ValueTooLarge {
                    line,
                    value: value.resolved,
                    bits: 16,
                });
            }
        }
        _ => unreachable!("resolve() is only called with bits = 8 or 16"),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn literal_is_a_no_op() {
        let consts = HashMap::new();
        let data = crate::assembler::DataTable::default();
        let env = Environment {
            consts: &consts,
            data: &data,
            data_segment_base: 0,
        };
        let mut value = Value::literal(42);
        resolve(&mut value, &env, 1, 8).unwrap();
        assert_eq!(value.resolved, 42);
    }

    #[test]
    fn const_ref_resolves_with_offset() {
        let mut consts = HashMap::new();
        consts.insert("FOO".to_string(), 10u16);
        let data = crate::assembler::DataTable::default();
        let env = Environment {
            consts: &consts,
            data: &data,
            data_segment_base: 0,
        };
        let mut value = Value::const_ref("FOO", 5);
        resolve(&mut value, &env, 1, 16).unwrap();
        assert_eq!(value.resolved, 15);
    }

    #[test]
    fn missing_const_is_fatal() {
        let consts = HashMap::new();
        let data = crate::assembler::DataTable::default();
        let env = Environment {
            consts: &consts,
            data: &data,
            data_segment_base: 0,
        };
        let mut value = Value::const_ref("MISSING", 0);
        assert!(matches!(
            resolve(&mut value, &env, 1, 16),
            Err(AssemblyError::UnresolvedConst(_))
        ));
    }

    #[test]
    fn data_length_rejects_nonzero_offset() {
        let consts = HashMap::new();
        let mut data = crate::assembler::DataTable::default();
        data.insert(
            "msg".to_string(),
            DataEntry {
                bytes: vec![b'A', b'B'],
                offset: Some(0),
            },
        );
        let env = Environment {
            consts: &consts,
            data: &data,
            data_segment_base: 0,
        };
        let mut value = Value::data_length("msg");
        value.offset = 1;
        assert!(matches!(
            resolve(&mut value, &env, 1, 8),
            Err(AssemblyError::OffsetOnLengthRef(_))
        ));
    }

    #[test]
    fn data_length_resolves_to_byte_count() {
        let consts = HashMap::new();
        let mut data = crate::assembler::DataTable::default();
        data.insert(
            "msg".to_string(),
            DataEntry {
                bytes: vec![b'A', b'B'],
                offset: Some(0),
            },
        );
        let env = Environment {
            consts: &consts,
            data: &data,
            data_segment_base: 0,
        };
        let mut value = Value::data_length("msg");
        resolve(&mut value, &env, 1, 8).unwrap();
        assert_eq!(value.resolved, 2);
    }

    #[test]
    fn value_too_large_for_8_bits_is_fatal() {
        let consts = HashMap::new();
        let data = crate::assembler::DataTable::default();
        let env = Environment {
            consts: &consts,
            data: &data,
            data_segment_base: 0,
        };
        let mut value = Value::literal(256);
        assert!(matches!(
            resolve(&mut value, &env, 1, 8),
            Err(AssemblyError::ValueTooLarge { .. })
        ));
    }
}
