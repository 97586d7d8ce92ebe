//! Interactive stepping debugger.
//!
//! Attached to the machine as a monitor, it sees every decoded instruction
//! before execution, checks breakpoints against the pre-execution CPU state
//! and, unless free-running, blocks on a command prompt. Example session:
//!
//! ```text
//! CPU PC:0xF31F AC:0x00 X:0x00 Y:0x00 SP:0x00 SR:--_b-i--
//! Next: SEI implied
//! $F31F> step
//! CPU PC:0xF320 AC:0x00 X:0x00 Y:0x00 SP:0x00 SR:--_b----
//! Next: LDX immediate $FF
//! $F320> break-register X $FF
//! Breakpoint set: X = $FF (255)
//! $F320> continue
//! Breakpoint for X = $FF (255)
//! CPU PC:0xF322 AC:0x00 X:0xFF Y:0x00 SP:0x00 SR:n-_b----
//! Next: TXS implied
//! $F322> q
//! ```

use std::collections::VecDeque;
use std::io::{BufRead, Write};

use thiserror::Error;

use crate::bus::{Bus, BusError};
use crate::cpu::{Cpu, Instruction, Mnemonic, Monitor};
use crate::halt::HaltSignal;
use crate::symbols::SymbolTable;

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
    #[error("missing argument for {0}")]
    MissingArgument(&'static str),
    #[error("cannot parse number: {0:?}")]
    BadNumber(String),
    #[error("multiple addresses for {symbol}: {}", format_addresses(.addresses))]
    AmbiguousSymbol { symbol: String, addresses: Vec<u16> },
    #[error("invalid register {0:?} for break-register")]
    BadRegister(String),
    #[error("unknown instruction mnemonic {0:?}")]
    BadMnemonic(String),
    #[error(transparent)]
    Bus(#[from] BusError),
}

fn format_addresses(addresses: &[u16]) -> String {
    addresses
        .iter()
        .map(|a| format!("${a:04X}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// The closed command set; anything else parses to an error, never to a
/// silent fallthrough.
#[derive(Debug, Clone, PartialEq)]
enum Command {
    None,
    BreakAddress { arg: String },
    BreakInstruction { arg: String },
    BreakRegister { reg: String, value: String },
    Continue,
    Exit,
    Help,
    Next,
    Read { arg: String },
    Read16 { arg: String },
    Read32 { arg: String },
    Step,
}

fn parse_command(input: &str) -> Result<Command, DebugError> {
    let mut fields = input.split_whitespace();
    let word = match fields.next() {
        Some(w) => w.to_lowercase(),
        None => return Ok(Command::None),
    };
    let mut arg = |name| {
        fields
            .next()
            .map(str::to_string)
            .ok_or(DebugError::MissingArgument(name))
    };
    let cmd = match word.as_str() {
        "break-address" | "break-addr" | "ba" => Command::BreakAddress {
            arg: arg("break-address")?,
        },
        "break-instruction" | "bi" => Command::BreakInstruction {
            arg: arg("break-instruction")?,
        },
        "break-register" | "break-reg" | "br" => Command::BreakRegister {
            reg: arg("break-register")?,
            value: arg("break-register")?,
        },
        "continue" | "c" => Command::Continue,
        "exit" | "quit" | "q" => Command::Exit,
        "help" | "h" | "?" => Command::Help,
        "next" | "n" => Command::Next,
        "read" => Command::Read { arg: arg("read")? },
        "read16" => Command::Read16 {
            arg: arg("read16")?,
        },
        "read32" => Command::Read32 {
            arg: arg("read32")?,
        },
        "step" | "st" | "s" => Command::Step,
        _ => return Err(DebugError::UnknownCommand(input.to_string())),
    };
    Ok(cmd)
}

pub struct Debugger {
    symbols: SymbolTable,
    input_queue: VecDeque<String>,
    halt: HaltSignal,
    last_cmd: Option<Command>,
    /// Free-run: execute without prompting until a breakpoint fires.
    run: bool,
    break_address: Option<u16>,
    /// Set by `next`: the address breakpoint disarms itself when hit.
    break_address_one_shot: bool,
    break_instruction: Option<Mnemonic>,
    break_reg_a: Option<u8>,
    break_reg_x: Option<u8>,
    break_reg_y: Option<u8>,
}

impl Debugger {
    pub fn new(symbols: SymbolTable, halt: HaltSignal) -> Self {
        Debugger {
            symbols,
            input_queue: VecDeque::new(),
            halt,
            last_cmd: None,
            run: false,
            break_address: None,
            break_address_one_shot: false,
            break_instruction: None,
            break_reg_a: None,
            break_reg_x: None,
            break_reg_y: None,
        }
    }

    /// Queue commands to be executed at the next prompt(s), ahead of
    /// interactive input. Useful for scripting a session from config.
    pub fn queue_commands<I, S>(&mut self, cmds: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_queue.extend(cmds.into_iter().map(Into::into));
    }

    fn check_reg_breakpoint(run: &mut bool, name: &str, target: Option<u8>, actual: u8) {
        if let Some(expect) = target {
            if actual == expect {
                println!("Breakpoint for {name} = ${expect:02X} ({expect})");
                *run = false;
            }
        }
    }

    fn check_breakpoints(&mut self, cpu: &Cpu, in_: &Instruction) {
        if self.break_instruction == Some(in_.mnemonic) {
            println!("Breakpoint for instruction {}", in_.mnemonic);
            self.run = false;
        }

        if self.break_address == Some(cpu.pc) {
            println!("Breakpoint for PC address = ${:04X}", cpu.pc);
            self.run = false;
            if self.break_address_one_shot {
                self.break_address = None;
                self.break_address_one_shot = false;
            }
        }

        Self::check_reg_breakpoint(&mut self.run, "A", self.break_reg_a, cpu.ac);
        Self::check_reg_breakpoint(&mut self.run, "X", self.break_reg_x, cpu.x);
        Self::check_reg_breakpoint(&mut self.run, "Y", self.break_reg_y, cpu.y);
    }

    /// Returns true when control is to be released back to the CPU.
    fn command_loop(&mut self, cpu: &Cpu, bus: &mut Bus, in_: &Instruction) -> bool {
        let cmd = loop {
            match self.next_command(cpu) {
                Ok(Command::None) => match &self.last_cmd {
                    Some(last) => break last.clone(),
                    None => continue,
                },
                Ok(cmd) => {
                    self.last_cmd = Some(cmd.clone());
                    break cmd;
                }
                Err(e) => println!("{e}"),
            }
        };

        match self.dispatch(&cmd, cpu, bus, in_) {
            Ok(release) => release,
            Err(e) => {
                println!("{e}");
                false
            }
        }
    }

    fn dispatch(
        &mut self,
        cmd: &Command,
        cpu: &Cpu,
        bus: &mut Bus,
        in_: &Instruction,
    ) -> Result<bool, DebugError> {
        match cmd {
            Command::None => Ok(false),
            Command::BreakAddress { arg } => {
                let addr = self.parse_u16(arg, cpu.pc)?;
                self.break_address = Some(addr);
                self.break_address_one_shot = false;
                println!("break-address set to ${addr:04X}");
                Ok(false)
            }
            Command::BreakInstruction { arg } => {
                let mnemonic: Mnemonic = arg
                    .parse()
                    .map_err(|_| DebugError::BadMnemonic(arg.clone()))?;
                self.break_instruction = Some(mnemonic);
                Ok(false)
            }
            Command::BreakRegister { reg, value } => {
                self.command_break_register(reg, value)?;
                Ok(false)
            }
            Command::Continue => {
                self.run = true;
                Ok(true)
            }
            Command::Exit => {
                self.halt.request(0);
                self.run = true;
                Ok(true)
            }
            Command::Help => {
                self.command_help();
                Ok(false)
            }
            Command::Next => {
                // Break at the address following the current instruction,
                // stepping over JSR/JMP rather than into them.
                let addr = cpu.pc.wrapping_add(in_.bytes as u16);
                self.break_address = Some(addr);
                self.break_address_one_shot = true;
                self.run = true;
                Ok(true)
            }
            Command::Read { arg } => {
                let addr = self.parse_u16(arg, cpu.pc)?;
                let v = bus.read(addr)?;
                println!("${addr:04X} => ${v:02X} 0b{v:08b} {v} {:?}", v as char);
                Ok(false)
            }
            Command::Read16 { arg } => {
                let addr = self.parse_u16(arg, cpu.pc)?;
                let v = bus.read_word(addr)?;
                println!(
                    "${:04X},{:04X} => ${v:04X} 0b{v:016b} {v}",
                    addr,
                    addr.wrapping_add(1)
                );
                Ok(false)
            }
            Command::Read32 { arg } => {
                let addr = self.parse_u16(arg, cpu.pc)?;
                let mut v: u32 = 0;
                for i in (0..4).rev() {
                    v = v << 8 | bus.read(addr.wrapping_add(i))? as u32;
                }
                println!(
                    "${:04X}..{:04X} => ${v:08X} 0b{v:032b} {v}",
                    addr,
                    addr.wrapping_add(3)
                );
                Ok(false)
            }
            Command::Step => Ok(true),
        }
    }

    fn command_break_register(&mut self, reg: &str, value: &str) -> Result<(), DebugError> {
        let value = Self::parse_u8(value)?;
        let name = match reg {
            "A" | "a" | "AC" | "ac" => {
                self.break_reg_a = Some(value);
                "A"
            }
            "X" | "x" => {
                self.break_reg_x = Some(value);
                "X"
            }
            "Y" | "y" => {
                self.break_reg_y = Some(value);
                "Y"
            }
            _ => return Err(DebugError::BadRegister(reg.to_string())),
        };
        println!("Breakpoint set: {name} = ${value:02X} ({value})");
        Ok(())
    }

    fn command_help(&self) {
        println!();
        println!("pda6502 debugger");
        println!("----------------");
        println!("break-address <addr> (alias: ba) e.g. ba 0x1000");
        println!("break-instruction <mnemonic> (alias: bi) e.g. bi NOP");
        println!("break-register <a|x|y> <value> (alias: br) e.g. br x 128");
        println!("continue (alias: c) Run continuously until breakpoint.");
        println!("exit (alias: quit, q) Shut down the emulator.");
        println!("help (alias: h, ?) This help.");
        println!("next (alias: n) Next instruction; step over subroutines.");
        println!("read <address> - Read and display 8-bit integer at address.");
        println!("read16 <address> - Read and display 16-bit integer at address.");
        println!("read32 <address> - Read and display 32-bit integer at address.");
        println!("step (alias: s) Run only the current instruction.");
        println!("(blank) Repeat the previous command.");
        println!();
        println!("Hex input formats: 0x1234 $1234");
        println!("Commands expecting uint16 treat . as current address (PC).");
    }

    fn next_command(&mut self, cpu: &Cpu) -> Result<Command, DebugError> {
        let input = match self.input_queue.pop_front() {
            Some(queued) => {
                println!("{}{}", self.prompt(cpu.pc), queued);
                queued
            }
            None => self.read_input(cpu.pc),
        };
        parse_command(&input)
    }

    fn read_input(&mut self, pc: u16) -> String {
        print!("{}", self.prompt(pc));
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            // EOF on stdin: nothing more will ever arrive, shut down.
            Ok(0) => "exit".to_string(),
            Ok(_) => line.trim().to_string(),
            Err(e) => {
                log::warn!("debugger: stdin read failed: {e}");
                "exit".to_string()
            }
        }
    }

    fn prompt(&self, pc: u16) -> String {
        let labels = self.symbols.labels_for(pc).join(",");
        format!("${pc:04X} {labels}> ")
    }

    fn parse_u16(&self, s: &str, pc: u16) -> Result<u16, DebugError> {
        if s == "." {
            return Ok(pc);
        }
        match self.symbols.addresses_for(s) {
            [addr] => return Ok(*addr),
            [] => {}
            addresses => {
                return Err(DebugError::AmbiguousSymbol {
                    symbol: s.to_string(),
                    addresses: addresses.to_vec(),
                })
            }
        }
        Self::parse_number(s, 16).map(|v| v as u16)
    }

    fn parse_u8(s: &str) -> Result<u8, DebugError> {
        Self::parse_number(s, 8).map(|v| v as u8)
    }

    fn parse_number(s: &str, bits: u32) -> Result<u32, DebugError> {
        let bad = || DebugError::BadNumber(s.to_string());
        let value = if let Some(hex) = s.strip_prefix('$') {
            u32::from_str_radix(hex, 16).map_err(|_| bad())?
        } else if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            u32::from_str_radix(hex, 16).map_err(|_| bad())?
        } else {
            s.parse::<u32>().map_err(|_| bad())?
        };
        if value >> bits != 0 {
            return Err(bad());
        }
        Ok(value)
    }
}

impl Monitor for Debugger {
    /// Receives each decoded instruction just before the program counter
    /// is advanced and the instruction executed.
    fn before_execute(&mut self, cpu: &mut Cpu, bus: &mut Bus, in_: &Instruction) {
        self.check_breakpoints(cpu, in_);

        if self.run {
            return;
        }

        println!("{cpu}");

        let labels = if in_.is_absolute() {
            self.symbols.labels_for(in_.op16())
        } else {
            &[]
        };
        if labels.is_empty() {
            println!("Next: {in_}");
        } else {
            println!("Next: {in_} ({})", labels.join(","));
        }

        while !self.command_loop(cpu, bus, in_) {
            // next command
        }
    }
}
