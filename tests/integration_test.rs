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

use std::path::Path;

use j80::assemble;
use j80::ast::{Reg16, Reg8};
use j80::file_reader::MockFileReader;
use j80::vm::Vm;

fn assemble_source(source: &str) -> j80::assembler::Image {
    let mut reader = MockFileReader::default();
    reader.add_file("test.j80", source);
    assemble(Path::new("test.j80"), None, None, &reader).unwrap()
}

#[test]
fn nop_only_program_produces_a_single_byte_image() {
    let image = assemble_source("main:\n    nop\n");
    assert_eq!(image.code.bytes, vec![0x00]);
    assert_eq!(image.code.length, 1);
    assert_eq!(image.data.offset, 1);
}

#[test]
fn load_immediate_8_matches_the_worked_encoding() {
    let image = assemble_source("main:\n    ld a, 0x42\n");
    assert_eq!(image.code.bytes, vec![0x88, 0x04, 0x42]);

    let mut vm = Vm::new(Vec::<u8>::new());
    vm.copy_to_ram(&image.concat(), 0);
    vm.reset();
    vm.step().unwrap();
    assert_eq!(vm.read8(Reg8::A), 0x42);
    assert_eq!(vm.pc(), 3);
}

#[test]
fn load_ba_push_pop_round_trips_through_cd() {
    let image = assemble_source("main:\n    ld ba, 0x1234\n    push ba\n    pop cd\n");
    let mut vm = Vm::new(Vec::<u8>::new());
    vm.copy_to_ram(&image.concat(), 0);
    vm.reset();
    let starting_sp = vm.read16(Reg16::Sp);
    vm.step().unwrap();
    vm.step().unwrap();
    vm.step().unwrap();
    assert_eq!(vm.read16(Reg16::Cd), 0x1234);
    assert_eq!(vm.read16(Reg16::Sp), starting_sp);
}

#[test]
fn add_with_destination_and_source_registers_matches_the_worked_example() {
    let image = assemble_source("main:\n    ld a, 0xFE\n    ld b, 0x03\n    add a, b, 5\n");
    let mut vm = Vm::new(Vec::<u8>::new());
    vm.copy_to_ram(&image.concat(), 0);
    vm.reset();
    vm.step().unwrap();
    vm.step().unwrap();
    vm.step().unwrap();
    assert_eq!(vm.read8(Reg8::A), 0x03);
    assert_eq!(vm.flags() & 0x1, 0x1); // CARRY
    assert_eq!(vm.flags() & 0x2, 0); // ZERO
    assert_eq!(vm.flags() & 0x4, 0); // SIGN
    assert_eq!(vm.flags() & 0x8, 0); // OVERFLOW
}

#[test]
fn jump_to_a_label_resolves_to_a_big_endian_target() {
    let image = assemble_source("main:\n    nop\n    jmp main\n");
    assert_eq!(&image.code.bytes[1..4], &[0xC8, 0x00, 0x00]);
}

#[test]
fn data_length_reference_resolves_to_the_byte_count() {
    let image = assemble_source(".data msg \"AB\"\nmain:\n    ld a, len(msg)\n");
    assert_eq!(image.code.bytes[2], 0x02);
}

#[test]
fn data_segment_starts_immediately_after_code() {
    let image = assemble_source(".data msg \"hi\"\nmain:\n    nop\n");
    assert_eq!(image.code.offset + image.code.length, image.data.offset);
    assert_eq!(image.data.bytes, vec![b'h', b'i']);
}

#[test]
fn unresolved_jump_target_is_a_fatal_assembly_error() {
    let mut reader = MockFileReader::default();
    reader.add_file("test.j80", "main:\n    jmp nowhere\n");
    let result = assemble(Path::new("test.j80"), None, None, &reader);
    assert!(result.is_err());
}

#[test]
fn stdout_writes_go_to_the_sink_not_ram() {
    let image = assemble_source("main:\n    ld a, 0x41\n    st [0xFFFF], a\n");
    let mut sink = Vec::<u8>::new();
    {
        let mut vm = Vm::new(&mut sink);
        vm.copy_to_ram(&image.concat(), 0);
        vm.reset();
        vm.step().unwrap();
        vm.step().unwrap();
    }
    assert_eq!(sink, vec![0x41]);
}

#[test]
fn cmp_sets_flags_like_subtract_but_leaves_registers_unchanged() {
    let image = assemble_source("main:\n    ld a, 5\n    ld b, 5\n    cmp a, b\n");
    let mut vm = Vm::new(Vec::<u8>::new());
    vm.copy_to_ram(&image.concat(), 0);
    vm.reset();
    vm.step().unwrap();
    vm.step().unwrap();
    vm.step().unwrap();
    assert_eq!(vm.read8(Reg8::A), 5);
    assert_eq!(vm.read8(Reg8::B), 5);
    assert_eq!(vm.flags() & 0x2, 0x2); // ZERO
}

#[test]
fn stack_base_directive_emits_a_preamble_load_into_sp() {
    let image = assemble_source(".stack 0x7FFF\nmain:\n    nop\n");
    let mut vm = Vm::new(Vec::<u8>::new());
    vm.copy_to_ram(&image.concat(), 0);
    vm.reset();
    vm.step().unwrap(); // LD SP, 0x7FFF
    assert_eq!(vm.read16(Reg16::Sp), 0x7FFF);
}

#[test]
fn interrupt_entry_point_reserves_a_vector_slot() {
    let image = assemble_source("main:\n    nop\n.interrupt 0\n    ret\n");
    // JMP main, then 13 bytes of padding up to the 0x10 boundary, then
    // slot 0's JMP/NOP pair.
    assert_eq!(image.code.bytes[0], 0xC8);
    assert_eq!(&image.code.bytes[3..16], &[0u8; 13]);
    assert_eq!(image.code.bytes[16], 0xC8);
}

#[test]
fn assembling_the_same_source_twice_is_independent() {
    let first = assemble_source("main:\n    ld a, 1\n");
    let second = assemble_source("main:\n    ld a, 1\n    ld b, 2\n");
    assert_ne!(first.code.length, second.code.length);
}

#[test]
fn raw_and_logisim_outputs_round_trip_the_same_bytes() {
    let image = assemble_source("main:\n    ld a, 0x42\n");
    let bytes = image.concat();
    let logisim = j80::output::write_logisim(&bytes);
    let parsed = j80::output::parse_logisim(&logisim).unwrap();
    assert_eq!(parsed, bytes);
}

#[test]
fn disassembling_an_assembled_image_recovers_the_mnemonics() {
    let image = assemble_source("main:\n    ld a, 0x42\n    nop\n");
    let listing = image.format_listing().unwrap();
    assert!(listing.to_lowercase().contains("42"));
}
