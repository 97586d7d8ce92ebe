//! Opcode decode table and the transient `Instruction` representation.

use std::fmt;
use std::str::FromStr;

/// The 56 official NMOS 6502 mnemonics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Mnemonic {
    Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
    Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
    Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
    Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
    Tsx, Txa, Txs, Tya,
}

impl Mnemonic {
    pub fn name(self) -> &'static str {
        use Mnemonic::*;
        match self {
            Adc => "ADC", And => "AND", Asl => "ASL", Bcc => "BCC",
            Bcs => "BCS", Beq => "BEQ", Bit => "BIT", Bmi => "BMI",
            Bne => "BNE", Bpl => "BPL", Brk => "BRK", Bvc => "BVC",
            Bvs => "BVS", Clc => "CLC", Cld => "CLD", Cli => "CLI",
            Clv => "CLV", Cmp => "CMP", Cpx => "CPX", Cpy => "CPY",
            Dec => "DEC", Dex => "DEX", Dey => "DEY", Eor => "EOR",
            Inc => "INC", Inx => "INX", Iny => "INY", Jmp => "JMP",
            Jsr => "JSR", Lda => "LDA", Ldx => "LDX", Ldy => "LDY",
            Lsr => "LSR", Nop => "NOP", Ora => "ORA", Pha => "PHA",
            Php => "PHP", Pla => "PLA", Plp => "PLP", Rol => "ROL",
            Ror => "ROR", Rti => "RTI", Rts => "RTS", Sbc => "SBC",
            Sec => "SEC", Sed => "SED", Sei => "SEI", Sta => "STA",
            Stx => "STX", Sty => "STY", Tax => "TAX", Tay => "TAY",
            Tsx => "TSX", Txa => "TXA", Txs => "TXS", Tya => "TYA",
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Mnemonic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        use Mnemonic::*;
        let all = [
            Adc, And, Asl, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
            Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dec, Dex, Dey, Eor, Inc, Inx,
            Iny, Jmp, Jsr, Lda, Ldx, Ldy, Lsr, Nop, Ora, Pha, Php, Pla, Plp,
            Rol, Ror, Rti, Rts, Sbc, Sec, Sed, Sei, Sta, Stx, Sty, Tax, Tay,
            Tsx, Txa, Txs, Tya,
        ];
        all.iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Implied,
    Accumulator,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
    Relative,
}

impl AddressingMode {
    /// Operand bytes following the opcode.
    pub fn operand_len(self) -> u8 {
        use AddressingMode::*;
        match self {
            Implied | Accumulator => 0,
            Absolute | AbsoluteX | AbsoluteY | Indirect => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for AddressingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AddressingMode::*;
        let name = match self {
            Implied => "implied",
            Accumulator => "accumulator",
            Immediate => "immediate",
            ZeroPage => "zeropage",
            ZeroPageX => "zeropageX",
            ZeroPageY => "zeropageY",
            Absolute => "absolute",
            AbsoluteX => "absoluteX",
            AbsoluteY => "absoluteY",
            Indirect => "indirect",
            IndirectX => "(indirect,X)",
            IndirectY => "(indirect),Y",
            Relative => "relative",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    None,
    Byte(u8),
    Word(u16),
}

/// One decoded opcode occurrence. Created per fetch, never persisted.
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub opcode: u8,
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    pub operand: Operand,
    /// Total length including the opcode byte.
    pub bytes: u8,
}

impl Instruction {
    /// True for modes carrying a 16-bit operand, where the debugger can
    /// resolve the target through the symbol table.
    pub fn is_absolute(&self) -> bool {
        matches!(self.operand, Operand::Word(_))
    }

    pub fn op8(&self) -> u8 {
        match self.operand {
            Operand::Byte(b) => b,
            _ => 0,
        }
    }

    pub fn op16(&self) -> u16 {
        match self.operand {
            Operand::Word(w) => w,
            _ => 0,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operand {
            Operand::None => write!(f, "{} {}", self.mnemonic, self.mode),
            Operand::Byte(b) => write!(f, "{} {} ${:02X}", self.mnemonic, self.mode, b),
            Operand::Word(w) => write!(f, "{} {} ${:04X}", self.mnemonic, self.mode, w),
        }
    }
}

/// Decode one opcode byte. `None` means an illegal/undocumented opcode,
/// which the CPU treats as fatal.
#[rustfmt::skip]
pub fn decode(opcode: u8) -> Option<(Mnemonic, AddressingMode)> {
    use AddressingMode::*;
    use Mnemonic::*;
    let decoded = match opcode {
        0x69 => (Adc, Immediate),   0x65 => (Adc, ZeroPage),
        0x75 => (Adc, ZeroPageX),   0x6D => (Adc, Absolute),
        0x7D => (Adc, AbsoluteX),   0x79 => (Adc, AbsoluteY),
        0x61 => (Adc, IndirectX),   0x71 => (Adc, IndirectY),

        0x29 => (And, Immediate),   0x25 => (And, ZeroPage),
        0x35 => (And, ZeroPageX),   0x2D => (And, Absolute),
        0x3D => (And, AbsoluteX),   0x39 => (And, AbsoluteY),
        0x21 => (And, IndirectX),   0x31 => (And, IndirectY),

        0x0A => (Asl, Accumulator), 0x06 => (Asl, ZeroPage),
        0x16 => (Asl, ZeroPageX),   0x0E => (Asl, Absolute),
        0x1E => (Asl, AbsoluteX),

        0x90 => (Bcc, Relative),    0xB0 => (Bcs, Relative),
        0xF0 => (Beq, Relative),    0x30 => (Bmi, Relative),
        0xD0 => (Bne, Relative),    0x10 => (Bpl, Relative),
        0x50 => (Bvc, Relative),    0x70 => (Bvs, Relative),

        0x24 => (Bit, ZeroPage),    0x2C => (Bit, Absolute),

        0x00 => (Brk, Implied),

        0x18 => (Clc, Implied),     0xD8 => (Cld, Implied),
        0x58 => (Cli, Implied),     0xB8 => (Clv, Implied),

        0xC9 => (Cmp, Immediate),   0xC5 => (Cmp, ZeroPage),
        0xD5 => (Cmp, ZeroPageX),   0xCD => (Cmp, Absolute),
        0xDD => (Cmp, AbsoluteX),   0xD9 => (Cmp, AbsoluteY),
        0xC1 => (Cmp, IndirectX),   0xD1 => (Cmp, IndirectY),

        0xE0 => (Cpx, Immediate),   0xE4 => (Cpx, ZeroPage),
        0xEC => (Cpx, Absolute),
        0xC0 => (Cpy, Immediate),   0xC4 => (Cpy, ZeroPage),
        0xCC => (Cpy, Absolute),

        0xC6 => (Dec, ZeroPage),    0xD6 => (Dec, ZeroPageX),
        0xCE => (Dec, Absolute),    0xDE => (Dec, AbsoluteX),
        0xCA => (Dex, Implied),     0x88 => (Dey, Implied),

        0x49 => (Eor, Immediate),   0x45 => (Eor, ZeroPage),
        0x55 => (Eor, ZeroPageX),   0x4D => (Eor, Absolute),
        0x5D => (Eor, AbsoluteX),   0x59 => (Eor, AbsoluteY),
        0x41 => (Eor, IndirectX),   0x51 => (Eor, IndirectY),

        0xE6 => (Inc, ZeroPage),    0xF6 => (Inc, ZeroPageX),
        0xEE => (Inc, Absolute),    0xFE => (Inc, AbsoluteX),
        0xE8 => (Inx, Implied),     0xC8 => (Iny, Implied),

        0x4C => (Jmp, Absolute),    0x6C => (Jmp, Indirect),
        0x20 => (Jsr, Absolute),

        0xA9 => (Lda, Immediate),   0xA5 => (Lda, ZeroPage),
        0xB5 => (Lda, ZeroPageX),   0xAD => (Lda, Absolute),
        0xBD => (Lda, AbsoluteX),   0xB9 => (Lda, AbsoluteY),
        0xA1 => (Lda, IndirectX),   0xB1 => (Lda, IndirectY),

        0xA2 => (Ldx, Immediate),   0xA6 => (Ldx, ZeroPage),
        0xB6 => (Ldx, ZeroPageY),   0xAE => (Ldx, Absolute),
        0xBE => (Ldx, AbsoluteY),

        0xA0 => (Ldy, Immediate),   0xA4 => (Ldy, ZeroPage),
        0xB4 => (Ldy, ZeroPageX),   0xAC => (Ldy, Absolute),
        0xBC => (Ldy, AbsoluteX),

        0x4A => (Lsr, Accumulator), 0x46 => (Lsr, ZeroPage),
        0x56 => (Lsr, ZeroPageX),   0x4E => (Lsr, Absolute),
        0x5E => (Lsr, AbsoluteX),

        0xEA => (Nop, Implied),

        0x09 => (Ora, Immediate),   0x05 => (Ora, ZeroPage),
        0x15 => (Ora, ZeroPageX),   0x0D => (Ora, Absolute),
        0x1D => (Ora, AbsoluteX),   0x19 => (Ora, AbsoluteY),
        0x01 => (Ora, IndirectX),   0x11 => (Ora, IndirectY),

        0x48 => (Pha, Implied),     0x08 => (Php, Implied),
        0x68 => (Pla, Implied),     0x28 => (Plp, Implied),

        0x2A => (Rol, Accumulator), 0x26 => (Rol, ZeroPage),
        0x36 => (Rol, ZeroPageX),   0x2E => (Rol, Absolute),
        0x3E => (Rol, AbsoluteX),

        0x6A => (Ror, Accumulator), 0x66 => (Ror, ZeroPage),
        0x76 => (Ror, ZeroPageX),   0x6E => (Ror, Absolute),
        0x7E => (Ror, AbsoluteX),

        0x40 => (Rti, Implied),     0x60 => (Rts, Implied),

        0xE9 => (Sbc, Immediate),   0xE5 => (Sbc, ZeroPage),
        0xF5 => (Sbc, ZeroPageX),   0xED => (Sbc, Absolute),
        0xFD => (Sbc, AbsoluteX),   0xF9 => (Sbc, AbsoluteY),
        0xE1 => (Sbc, IndirectX),   0xF1 => (Sbc, IndirectY),

        0x38 => (Sec, Implied),     0xF8 => (Sed, Implied),
        0x78 => (Sei, Implied),

        0x85 => (Sta, ZeroPage),    0x95 => (Sta, ZeroPageX),
        0x8D => (Sta, Absolute),    0x9D => (Sta, AbsoluteX),
        0x99 => (Sta, AbsoluteY),   0x81 => (Sta, IndirectX),
        0x91 => (Sta, IndirectY),

        0x86 => (Stx, ZeroPage),    0x96 => (Stx, ZeroPageY),
        0x8E => (Stx, Absolute),
        0x84 => (Sty, ZeroPage),    0x94 => (Sty, ZeroPageX),
        0x8C => (Sty, Absolute),

        0xAA => (Tax, Implied),     0xA8 => (Tay, Implied),
        0xBA => (Tsx, Implied),     0x8A => (Txa, Implied),
        0x9A => (Txs, Implied),     0x98 => (Tya, Implied),

        _ => return None,
    };
    Some(decoded)
}
