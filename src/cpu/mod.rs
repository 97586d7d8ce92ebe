//! 6502 execution engine: registers, fetch/decode/execute, monitor hook.

use bitflags::bitflags;
use std::fmt;
use thiserror::Error;

use crate::bus::{Bus, BusError};

pub mod instruction;
#[cfg(test)]
mod tests;

pub use instruction::{decode, AddressingMode, Instruction, Mnemonic, Operand};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct StatusFlags: u8 {
        const CARRY = 0b0000_0001;
        const ZERO = 0b0000_0010;
        const INTERRUPT_DISABLE = 0b0000_0100;
        const DECIMAL = 0b0000_1000;
        const BREAK = 0b0001_0000;
        const UNUSED = 0b0010_0000;
        const OVERFLOW = 0b0100_0000;
        const NEGATIVE = 0b1000_0000;
    }
}

#[derive(Debug, Error)]
pub enum CpuError {
    #[error("unknown opcode ${opcode:02X} at PC ${pc:04X}")]
    UnknownOpcode { pc: u16, opcode: u8 },
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Observer invoked with each decoded instruction before it executes.
/// Monitors run in attachment order and may block (the debugger does).
pub trait Monitor {
    fn before_execute(&mut self, cpu: &mut Cpu, bus: &mut Bus, instruction: &Instruction);

    fn shutdown(&mut self) {}
}

const STACK_BASE: u16 = 0x0100;
const IRQ_VECTOR: u16 = 0xFFFE;
const RESET_VECTOR: u16 = 0xFFFC;

pub struct Cpu {
    pub pc: u16,
    pub ac: u8,
    pub x: u8,
    pub y: u8,
    pub sp: u8,
    pub status: StatusFlags,
    decimal_warned: bool,
}

impl Cpu {
    pub fn new() -> Self {
        Cpu {
            pc: 0,
            ac: 0,
            x: 0,
            y: 0,
            sp: 0xFD,
            status: StatusFlags::UNUSED | StatusFlags::BREAK | StatusFlags::INTERRUPT_DISABLE,
            decimal_warned: false,
        }
    }

    /// Hardware reset: load PC from the little-endian reset vector.
    pub fn reset(&mut self, bus: &mut Bus) -> Result<(), CpuError> {
        self.ac = 0;
        self.x = 0;
        self.y = 0;
        self.sp = 0xFD;
        self.status =
            StatusFlags::UNUSED | StatusFlags::BREAK | StatusFlags::INTERRUPT_DISABLE;
        self.pc = bus.read_word(RESET_VECTOR)?;
        log::info!("cpu: reset, PC=${:04X}", self.pc);
        Ok(())
    }

    /// Decode the instruction at PC without committing anything.
    pub fn fetch(&self, bus: &mut Bus) -> Result<Instruction, CpuError> {
        let opcode = bus.read(self.pc)?;
        let (mnemonic, mode) = decode(opcode).ok_or(CpuError::UnknownOpcode {
            pc: self.pc,
            opcode,
        })?;
        let operand = match mode.operand_len() {
            0 => Operand::None,
            1 => Operand::Byte(bus.read(self.pc.wrapping_add(1))?),
            _ => Operand::Word(bus.read_word(self.pc.wrapping_add(1))?),
        };
        Ok(Instruction {
            opcode,
            mnemonic,
            mode,
            operand,
            bytes: 1 + mode.operand_len(),
        })
    }

    /// Fetch and execute one instruction. Monitors are the machine's
    /// concern; this is the raw engine step.
    pub fn step(&mut self, bus: &mut Bus) -> Result<(), CpuError> {
        let instruction = self.fetch(bus)?;
        self.execute(&instruction, bus)
    }

    /// Commit one decoded instruction: advance PC (unless the opcode
    /// redirects control flow) and apply its register/memory mutation.
    pub fn execute(&mut self, in_: &Instruction, bus: &mut Bus) -> Result<(), CpuError> {
        use Mnemonic::*;

        let next_pc = self.pc.wrapping_add(in_.bytes as u16);
        self.pc = next_pc;

        match in_.mnemonic {
            Lda => {
                self.ac = self.operand_value(in_, bus)?;
                self.set_zn(self.ac);
            }
            Ldx => {
                self.x = self.operand_value(in_, bus)?;
                self.set_zn(self.x);
            }
            Ldy => {
                self.y = self.operand_value(in_, bus)?;
                self.set_zn(self.y);
            }
            Sta => {
                let addr = self.operand_addr(in_, bus)?;
                bus.write(addr, self.ac)?;
            }
            Stx => {
                let addr = self.operand_addr(in_, bus)?;
                bus.write(addr, self.x)?;
            }
            Sty => {
                let addr = self.operand_addr(in_, bus)?;
                bus.write(addr, self.y)?;
            }

            Tax => {
                self.x = self.ac;
                self.set_zn(self.x);
            }
            Tay => {
                self.y = self.ac;
                self.set_zn(self.y);
            }
            Txa => {
                self.ac = self.x;
                self.set_zn(self.ac);
            }
            Tya => {
                self.ac = self.y;
                self.set_zn(self.ac);
            }
            Tsx => {
                self.x = self.sp;
                self.set_zn(self.x);
            }
            Txs => {
                // No flags on TXS.
                self.sp = self.x;
            }

            Pha => self.push(bus, self.ac)?,
            Php => {
                let pushed = self.status | StatusFlags::BREAK | StatusFlags::UNUSED;
                self.push(bus, pushed.bits())?;
            }
            Pla => {
                self.ac = self.pull(bus)?;
                self.set_zn(self.ac);
            }
            Plp => {
                let bits = self.pull(bus)?;
                self.status = StatusFlags::from_bits_truncate(bits)
                    - StatusFlags::BREAK
                    | StatusFlags::UNUSED;
            }

            Adc => {
                let v = self.operand_value(in_, bus)?;
                self.add_with_carry(v);
            }
            Sbc => {
                let v = self.operand_value(in_, bus)?;
                self.add_with_carry(!v);
            }

            And => {
                self.ac &= self.operand_value(in_, bus)?;
                self.set_zn(self.ac);
            }
            Ora => {
                self.ac |= self.operand_value(in_, bus)?;
                self.set_zn(self.ac);
            }
            Eor => {
                self.ac ^= self.operand_value(in_, bus)?;
                self.set_zn(self.ac);
            }

            Asl => self.read_modify_write(in_, bus, |cpu, v| {
                cpu.status.set(StatusFlags::CARRY, v & 0x80 != 0);
                v << 1
            })?,
            Lsr => self.read_modify_write(in_, bus, |cpu, v| {
                cpu.status.set(StatusFlags::CARRY, v & 0x01 != 0);
                v >> 1
            })?,
            Rol => self.read_modify_write(in_, bus, |cpu, v| {
                let carry_in = cpu.status.contains(StatusFlags::CARRY) as u8;
                cpu.status.set(StatusFlags::CARRY, v & 0x80 != 0);
                v << 1 | carry_in
            })?,
            Ror => self.read_modify_write(in_, bus, |cpu, v| {
                let carry_in = (cpu.status.contains(StatusFlags::CARRY) as u8) << 7;
                cpu.status.set(StatusFlags::CARRY, v & 0x01 != 0);
                v >> 1 | carry_in
            })?,

            Inc => self.read_modify_write(in_, bus, |_, v| v.wrapping_add(1))?,
            Dec => self.read_modify_write(in_, bus, |_, v| v.wrapping_sub(1))?,
            Inx => {
                self.x = self.x.wrapping_add(1);
                self.set_zn(self.x);
            }
            Iny => {
                self.y = self.y.wrapping_add(1);
                self.set_zn(self.y);
            }
            Dex => {
                self.x = self.x.wrapping_sub(1);
                self.set_zn(self.x);
            }
            Dey => {
                self.y = self.y.wrapping_sub(1);
                self.set_zn(self.y);
            }

            Cmp => {
                let v = self.operand_value(in_, bus)?;
                self.compare(self.ac, v);
            }
            Cpx => {
                let v = self.operand_value(in_, bus)?;
                self.compare(self.x, v);
            }
            Cpy => {
                let v = self.operand_value(in_, bus)?;
                self.compare(self.y, v);
            }
            Bit => {
                let v = self.operand_value(in_, bus)?;
                self.status.set(StatusFlags::ZERO, self.ac & v == 0);
                self.status.set(StatusFlags::NEGATIVE, v & 0x80 != 0);
                self.status.set(StatusFlags::OVERFLOW, v & 0x40 != 0);
            }

            Bcc => self.branch(in_, !self.status.contains(StatusFlags::CARRY)),
            Bcs => self.branch(in_, self.status.contains(StatusFlags::CARRY)),
            Bne => self.branch(in_, !self.status.contains(StatusFlags::ZERO)),
            Beq => self.branch(in_, self.status.contains(StatusFlags::ZERO)),
            Bpl => self.branch(in_, !self.status.contains(StatusFlags::NEGATIVE)),
            Bmi => self.branch(in_, self.status.contains(StatusFlags::NEGATIVE)),
            Bvc => self.branch(in_, !self.status.contains(StatusFlags::OVERFLOW)),
            Bvs => self.branch(in_, self.status.contains(StatusFlags::OVERFLOW)),

            Jmp => {
                self.pc = self.operand_addr(in_, bus)?;
            }
            Jsr => {
                let ret = next_pc.wrapping_sub(1);
                self.push(bus, (ret >> 8) as u8)?;
                self.push(bus, ret as u8)?;
                self.pc = in_.op16();
            }
            Rts => {
                let lo = self.pull(bus)? as u16;
                let hi = self.pull(bus)? as u16;
                self.pc = (hi << 8 | lo).wrapping_add(1);
            }
            Brk => {
                // BRK pushes the address of the byte after its padding byte.
                let ret = self.pc.wrapping_add(1);
                self.push(bus, (ret >> 8) as u8)?;
                self.push(bus, ret as u8)?;
                let pushed = self.status | StatusFlags::BREAK | StatusFlags::UNUSED;
                self.push(bus, pushed.bits())?;
                self.status.insert(StatusFlags::INTERRUPT_DISABLE);
                self.pc = bus.read_word(IRQ_VECTOR)?;
            }
            Rti => {
                let bits = self.pull(bus)?;
                self.status = StatusFlags::from_bits_truncate(bits)
                    - StatusFlags::BREAK
                    | StatusFlags::UNUSED;
                let lo = self.pull(bus)? as u16;
                let hi = self.pull(bus)? as u16;
                self.pc = hi << 8 | lo;
            }

            Clc => self.status.remove(StatusFlags::CARRY),
            Sec => self.status.insert(StatusFlags::CARRY),
            Cli => self.status.remove(StatusFlags::INTERRUPT_DISABLE),
            Sei => self.status.insert(StatusFlags::INTERRUPT_DISABLE),
            Clv => self.status.remove(StatusFlags::OVERFLOW),
            Cld => self.status.remove(StatusFlags::DECIMAL),
            Sed => self.status.insert(StatusFlags::DECIMAL),

            Nop => {}
        }

        Ok(())
    }

    fn set_zn(&mut self, value: u8) {
        self.status.set(StatusFlags::ZERO, value == 0);
        self.status.set(StatusFlags::NEGATIVE, value & 0x80 != 0);
    }

    fn compare(&mut self, reg: u8, value: u8) {
        self.status.set(StatusFlags::CARRY, reg >= value);
        self.set_zn(reg.wrapping_sub(value));
    }

    fn add_with_carry(&mut self, value: u8) {
        if self.status.contains(StatusFlags::DECIMAL) && !self.decimal_warned {
            log::warn!("cpu: decimal mode not implemented, computing binary result");
            self.decimal_warned = true;
        }
        let carry_in = self.status.contains(StatusFlags::CARRY) as u16;
        let sum = self.ac as u16 + value as u16 + carry_in;
        let result = sum as u8;
        self.status.set(StatusFlags::CARRY, sum > 0xFF);
        self.status.set(
            StatusFlags::OVERFLOW,
            (!(self.ac ^ value) & (self.ac ^ result)) & 0x80 != 0,
        );
        self.ac = result;
        self.set_zn(result);
    }

    fn branch(&mut self, in_: &Instruction, taken: bool) {
        if taken {
            let offset = in_.op8() as i8;
            self.pc = (self.pc as i32 + offset as i32) as u16;
        }
    }

    fn read_modify_write<F>(
        &mut self,
        in_: &Instruction,
        bus: &mut Bus,
        f: F,
    ) -> Result<(), CpuError>
    where
        F: FnOnce(&mut Cpu, u8) -> u8,
    {
        if in_.mode == AddressingMode::Accumulator {
            let result = f(self, self.ac);
            self.ac = result;
            self.set_zn(result);
        } else {
            let addr = self.operand_addr(in_, bus)?;
            let value = bus.read(addr)?;
            let result = f(self, value);
            bus.write(addr, result)?;
            self.set_zn(result);
        }
        Ok(())
    }

    /// Effective address for memory-addressed modes.
    fn operand_addr(&self, in_: &Instruction, bus: &mut Bus) -> Result<u16, CpuError> {
        use AddressingMode::*;
        let addr = match in_.mode {
            ZeroPage => in_.op8() as u16,
            ZeroPageX => in_.op8().wrapping_add(self.x) as u16,
            ZeroPageY => in_.op8().wrapping_add(self.y) as u16,
            Absolute => in_.op16(),
            AbsoluteX => in_.op16().wrapping_add(self.x as u16),
            AbsoluteY => in_.op16().wrapping_add(self.y as u16),
            Indirect => {
                // NMOS quirk: the vector high byte is fetched without
                // carrying into the page.
                let ptr = in_.op16();
                let lo = bus.read(ptr)? as u16;
                let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr)? as u16;
                hi << 8 | lo
            }
            IndirectX => {
                let zp = in_.op8().wrapping_add(self.x);
                let lo = bus.read(zp as u16)? as u16;
                let hi = bus.read(zp.wrapping_add(1) as u16)? as u16;
                hi << 8 | lo
            }
            IndirectY => {
                let zp = in_.op8();
                let lo = bus.read(zp as u16)? as u16;
                let hi = bus.read(zp.wrapping_add(1) as u16)? as u16;
                (hi << 8 | lo).wrapping_add(self.y as u16)
            }
            Implied | Accumulator | Immediate | Relative => {
                unreachable!("mode {:?} has no effective address", in_.mode)
            }
        };
        Ok(addr)
    }

    /// Operand value for read-class instructions.
    fn operand_value(&self, in_: &Instruction, bus: &mut Bus) -> Result<u8, CpuError> {
        match in_.mode {
            AddressingMode::Immediate => Ok(in_.op8()),
            AddressingMode::Accumulator => Ok(self.ac),
            _ => {
                let addr = self.operand_addr(in_, bus)?;
                Ok(bus.read(addr)?)
            }
        }
    }

    fn push(&mut self, bus: &mut Bus, value: u8) -> Result<(), CpuError> {
        bus.write(STACK_BASE + self.sp as u16, value)?;
        self.sp = self.sp.wrapping_sub(1);
        Ok(())
    }

    fn pull(&mut self, bus: &mut Bus) -> Result<u8, CpuError> {
        self.sp = self.sp.wrapping_add(1);
        Ok(bus.read(STACK_BASE + self.sp as u16)?)
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Cpu::new()
    }
}

impl fmt::Display for Cpu {
    /// `CPU PC:0xF31F AC:0x00 X:0x00 Y:0x00 SP:0x00 SR:--_b-i--`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sr: String = [
            (StatusFlags::NEGATIVE, 'n'),
            (StatusFlags::OVERFLOW, 'v'),
            (StatusFlags::UNUSED, '_'),
            (StatusFlags::BREAK, 'b'),
            (StatusFlags::DECIMAL, 'd'),
            (StatusFlags::INTERRUPT_DISABLE, 'i'),
            (StatusFlags::ZERO, 'z'),
            (StatusFlags::CARRY, 'c'),
        ]
        .iter()
        .map(|&(flag, c)| {
            if flag == StatusFlags::UNUSED {
                '_'
            } else if self.status.contains(flag) {
                c
            } else {
                '-'
            }
        })
        .collect();
        write!(
            f,
            "CPU PC:0x{:04X} AC:0x{:02X} X:0x{:02X} Y:0x{:02X} SP:0x{:02X} SR:{}",
            self.pc, self.ac, self.x, self.y, self.sp, sr
        )
    }
}
