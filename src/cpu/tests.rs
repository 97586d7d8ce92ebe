use super::*;
use crate::memory::{Ram, Rom};

fn setup() -> (Cpu, Bus) {
    let mut bus = Bus::new();
    bus.attach(Box::new(Ram::new(0x10000)), "ram", 0x0000)
        .unwrap();
    // Reset vector -> 0x8000
    bus.write(0xFFFC, 0x00).unwrap();
    bus.write(0xFFFD, 0x80).unwrap();
    let mut cpu = Cpu::new();
    cpu.reset(&mut bus).unwrap();
    (cpu, bus)
}

fn load_program(bus: &mut Bus, program: &[u8], start: u16) {
    for (i, &byte) in program.iter().enumerate() {
        bus.write(start + i as u16, byte).unwrap();
    }
}

#[test]
fn reset_reads_vector_from_rom() {
    // Scenario A: 4KB RAM at 0x0000, ROM at 0xF000 whose last two bytes
    // hold the reset vector 0x1000.
    let mut bus = Bus::new();
    bus.attach(Box::new(Ram::new(0x1000)), "ram", 0x0000)
        .unwrap();
    let mut image = vec![0xEA; 0x1000];
    image[0x0FFC] = 0x00;
    image[0x0FFD] = 0x10;
    bus.attach(Box::new(Rom::new(image)), "kernal", 0xF000)
        .unwrap();

    let mut cpu = Cpu::new();
    cpu.reset(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x1000);
}

#[test]
fn lda_immediate_sets_flags() {
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0xA9, 0x42], 0x8000);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0x42);
    assert_eq!(cpu.pc, 0x8002);
    assert!(!cpu.status.contains(StatusFlags::ZERO));
    assert!(!cpu.status.contains(StatusFlags::NEGATIVE));

    load_program(&mut bus, &[0xA9, 0x00, 0xA9, 0x80], 0x8002);
    cpu.step(&mut bus).unwrap();
    assert!(cpu.status.contains(StatusFlags::ZERO));
    cpu.step(&mut bus).unwrap();
    assert!(cpu.status.contains(StatusFlags::NEGATIVE));
}

#[test]
fn ldx_immediate_loads_ff() {
    // The instruction behind debugger Scenario B.
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0xA2, 0xFF], 0x8000);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.x, 0xFF);
    assert!(cpu.status.contains(StatusFlags::NEGATIVE));
}

#[test]
fn sta_zero_page_and_absolute() {
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0xA9, 0x5A, 0x85, 0x10, 0x8D, 0x34, 0x12], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0010).unwrap(), 0x5A);
    assert_eq!(bus.read(0x1234).unwrap(), 0x5A);
}

#[test]
fn indexed_addressing_wraps_zero_page() {
    let (mut cpu, mut bus) = setup();
    bus.write(0x000F, 0x77).unwrap();
    // LDX #$FF; LDA $10,X -> wraps to $0F
    load_program(&mut bus, &[0xA2, 0xFF, 0xB5, 0x10], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0x77);
}

#[test]
fn indirect_indexed_load() {
    let (mut cpu, mut bus) = setup();
    // ($20),Y with pointer 0x3000, Y=5 -> 0x3005
    bus.write(0x0020, 0x00).unwrap();
    bus.write(0x0021, 0x30).unwrap();
    bus.write(0x3005, 0xAB).unwrap();
    load_program(&mut bus, &[0xA0, 0x05, 0xB1, 0x20], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0xAB);
}

#[test]
fn adc_carry_and_overflow() {
    let (mut cpu, mut bus) = setup();
    // CLC; LDA #$50; ADC #$50 -> 0xA0, overflow set, carry clear
    load_program(&mut bus, &[0x18, 0xA9, 0x50, 0x69, 0x50], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0xA0);
    assert!(cpu.status.contains(StatusFlags::OVERFLOW));
    assert!(!cpu.status.contains(StatusFlags::CARRY));
    assert!(cpu.status.contains(StatusFlags::NEGATIVE));

    // LDA #$FF; ADC #$01 (carry clear) -> 0x00, carry set, zero set
    load_program(&mut bus, &[0x18, 0xA9, 0xFF, 0x69, 0x01], 0x8005);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0x00);
    assert!(cpu.status.contains(StatusFlags::CARRY));
    assert!(cpu.status.contains(StatusFlags::ZERO));
}

#[test]
fn sbc_borrow_semantics() {
    let (mut cpu, mut bus) = setup();
    // SEC; LDA #$10; SBC #$08 -> 0x08, carry still set (no borrow)
    load_program(&mut bus, &[0x38, 0xA9, 0x10, 0xE9, 0x08], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0x08);
    assert!(cpu.status.contains(StatusFlags::CARRY));

    // SEC; LDA #$08; SBC #$10 -> 0xF8, borrow (carry clear)
    load_program(&mut bus, &[0x38, 0xA9, 0x08, 0xE9, 0x10], 0x8005);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0xF8);
    assert!(!cpu.status.contains(StatusFlags::CARRY));
}

#[test]
fn shifts_and_rotates() {
    let (mut cpu, mut bus) = setup();
    // LDA #$81; ASL A -> 0x02, carry set
    load_program(&mut bus, &[0xA9, 0x81, 0x0A, 0x2A], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0x02);
    assert!(cpu.status.contains(StatusFlags::CARRY));
    // ROL A rotates the carry back in -> 0x05
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.ac, 0x05);
    assert!(!cpu.status.contains(StatusFlags::CARRY));
}

#[test]
fn inc_dec_memory() {
    let (mut cpu, mut bus) = setup();
    bus.write(0x0040, 0xFF).unwrap();
    load_program(&mut bus, &[0xE6, 0x40, 0xC6, 0x40], 0x8000);
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0040).unwrap(), 0x00);
    assert!(cpu.status.contains(StatusFlags::ZERO));
    cpu.step(&mut bus).unwrap();
    assert_eq!(bus.read(0x0040).unwrap(), 0xFF);
    assert!(cpu.status.contains(StatusFlags::NEGATIVE));
}

#[test]
fn compare_sets_carry_zero() {
    let (mut cpu, mut bus) = setup();
    // LDA #$40; CMP #$40 / CMP #$41 / CMP #$3F
    load_program(&mut bus, &[0xA9, 0x40, 0xC9, 0x40], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert!(cpu.status.contains(StatusFlags::CARRY));
    assert!(cpu.status.contains(StatusFlags::ZERO));

    load_program(&mut bus, &[0xC9, 0x41], 0x8004);
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.status.contains(StatusFlags::CARRY));
    assert!(!cpu.status.contains(StatusFlags::ZERO));
}

#[test]
fn bit_reflects_operand_bits() {
    let (mut cpu, mut bus) = setup();
    bus.write(0x0050, 0xC0).unwrap();
    load_program(&mut bus, &[0xA9, 0x3F, 0x24, 0x50], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert!(cpu.status.contains(StatusFlags::ZERO));
    assert!(cpu.status.contains(StatusFlags::NEGATIVE));
    assert!(cpu.status.contains(StatusFlags::OVERFLOW));
}

#[test]
fn branch_taken_and_not_taken() {
    let (mut cpu, mut bus) = setup();
    // LDA #$00; BEQ +2 (skips the LDA #$01)
    load_program(&mut bus, &[0xA9, 0x00, 0xF0, 0x02, 0xA9, 0x01, 0xEA], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x8006);

    // BNE with zero set falls through
    load_program(&mut bus, &[0xD0, 0x10], 0x8006);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x8008);
}

#[test]
fn branch_backwards() {
    let (mut cpu, mut bus) = setup();
    // LDX #$02 / loop: DEX; BNE loop
    load_program(&mut bus, &[0xA2, 0x02, 0xCA, 0xD0, 0xFD], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap(); // DEX -> 1
    cpu.step(&mut bus).unwrap(); // BNE taken, back to 0x8002
    assert_eq!(cpu.pc, 0x8002);
    cpu.step(&mut bus).unwrap(); // DEX -> 0
    cpu.step(&mut bus).unwrap(); // BNE not taken
    assert_eq!(cpu.pc, 0x8005);
}

#[test]
fn jmp_indirect_page_wrap_quirk() {
    let (mut cpu, mut bus) = setup();
    // Vector at 0x30FF: low byte from 0x30FF, high byte from 0x3000.
    bus.write(0x30FF, 0x34).unwrap();
    bus.write(0x3100, 0x99).unwrap();
    bus.write(0x3000, 0x12).unwrap();
    load_program(&mut bus, &[0x6C, 0xFF, 0x30], 0x8000);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x1234);
}

#[test]
fn jsr_rts_round_trip() {
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0x20, 0x00, 0x90], 0x8000); // JSR $9000
    load_program(&mut bus, &[0x60], 0x9000); // RTS
    let sp_before = cpu.sp;
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x9000);
    assert_eq!(cpu.sp, sp_before.wrapping_sub(2));
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x8003);
    assert_eq!(cpu.sp, sp_before);
}

#[test]
fn brk_pushes_state_and_vectors() {
    let (mut cpu, mut bus) = setup();
    bus.write(0xFFFE, 0x00).unwrap();
    bus.write(0xFFFF, 0x90).unwrap();
    load_program(&mut bus, &[0x00], 0x8000);
    cpu.step(&mut bus).unwrap();
    assert_eq!(cpu.pc, 0x9000);
    assert!(cpu.status.contains(StatusFlags::INTERRUPT_DISABLE));
    // Pushed return address is BRK address + 2.
    assert_eq!(bus.read(0x01FD).unwrap(), 0x80);
    assert_eq!(bus.read(0x01FC).unwrap(), 0x02);
}

#[test]
fn rti_restores_status_and_pc() {
    let (mut cpu, mut bus) = setup();
    bus.write(0xFFFE, 0x00).unwrap();
    bus.write(0xFFFF, 0x90).unwrap();
    load_program(&mut bus, &[0x38, 0x00], 0x8000); // SEC; BRK
    load_program(&mut bus, &[0x18, 0x40], 0x9000); // CLC; RTI
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap(); // CLC in handler
    assert!(!cpu.status.contains(StatusFlags::CARRY));
    cpu.step(&mut bus).unwrap(); // RTI
    assert_eq!(cpu.pc, 0x8003);
    assert!(cpu.status.contains(StatusFlags::CARRY));
}

#[test]
fn stack_push_pull() {
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0xA9, 0x42, 0x48, 0xA9, 0x00, 0x68], 0x8000);
    for _ in 0..4 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.ac, 0x42);
    assert!(!cpu.status.contains(StatusFlags::ZERO));
}

#[test]
fn php_plp_round_trip_masks_break() {
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0x38, 0x08, 0x18, 0x28], 0x8000); // SEC; PHP; CLC; PLP
    for _ in 0..4 {
        cpu.step(&mut bus).unwrap();
    }
    assert!(cpu.status.contains(StatusFlags::CARRY));
    assert!(cpu.status.contains(StatusFlags::UNUSED));
}

#[test]
fn flag_instructions() {
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0x38, 0xF8, 0x78, 0x18, 0xD8, 0x58], 0x8000);
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert!(cpu.status.contains(StatusFlags::CARRY));
    assert!(cpu.status.contains(StatusFlags::DECIMAL));
    assert!(cpu.status.contains(StatusFlags::INTERRUPT_DISABLE));
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    cpu.step(&mut bus).unwrap();
    assert!(!cpu.status.contains(StatusFlags::CARRY));
    assert!(!cpu.status.contains(StatusFlags::DECIMAL));
    assert!(!cpu.status.contains(StatusFlags::INTERRUPT_DISABLE));
}

#[test]
fn transfers() {
    let (mut cpu, mut bus) = setup();
    load_program(&mut bus, &[0xA9, 0x7F, 0xAA, 0xA8, 0x9A, 0xBA], 0x8000);
    for _ in 0..6 {
        cpu.step(&mut bus).unwrap();
    }
    assert_eq!(cpu.x, 0x7F);
    assert_eq!(cpu.y, 0x7F);
    assert_eq!(cpu.sp, 0x7F);
}

#[test]
fn unknown_opcode_is_fatal_with_context() {
    let (cpu, mut bus) = setup();
    bus.write(0x8000, 0x02).unwrap();
    let err = cpu.fetch(&mut bus).unwrap_err();
    match err {
        CpuError::UnknownOpcode { pc, opcode } => {
            assert_eq!(pc, 0x8000);
            assert_eq!(opcode, 0x02);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn fetch_does_not_move_pc() {
    let (cpu, mut bus) = setup();
    load_program(&mut bus, &[0xA9, 0x42], 0x8000);
    let in_ = cpu.fetch(&mut bus).unwrap();
    assert_eq!(in_.bytes, 2);
    assert_eq!(cpu.pc, 0x8000);
}

#[test]
fn fetch_into_unmapped_memory_is_fatal() {
    let mut bus = Bus::new();
    bus.attach(Box::new(Ram::new(0x1000)), "ram", 0x0000)
        .unwrap();
    let mut cpu = Cpu::new();
    cpu.pc = 0x0FFF;
    bus.write(0x0FFF, 0xA9).unwrap(); // LDA # with operand out of range
    assert!(matches!(
        cpu.fetch(&mut bus),
        Err(CpuError::Bus(BusError::Unmapped { .. }))
    ));
}

#[test]
fn display_format() {
    let (mut cpu, _bus) = setup();
    cpu.pc = 0xF31F;
    cpu.status = StatusFlags::UNUSED | StatusFlags::BREAK | StatusFlags::INTERRUPT_DISABLE;
    assert_eq!(
        cpu.to_string(),
        "CPU PC:0xF31F AC:0x00 X:0x00 Y:0x00 SP:0xFD SR:--_b-i--"
    );
}
