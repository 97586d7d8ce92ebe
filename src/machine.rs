//! The assembled computer: CPU, bus, monitors, run loop and shutdown.

use thiserror::Error;

use crate::bus::Bus;
use crate::config::{Config, ConfigError};
use crate::cpu::{Cpu, CpuError, Monitor};
use crate::debugger::Debugger;
use crate::halt::HaltSignal;
use crate::memory::Ram;
use crate::speedometer::Speedometer;
use crate::symbols::{SymbolError, SymbolTable};

#[derive(Debug, Error)]
pub enum MachineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot load symbols: {0}")]
    Symbols(#[from] SymbolError),
}

pub struct Machine {
    cpu: Cpu,
    bus: Bus,
    monitors: Vec<Box<dyn Monitor>>,
    halt: HaltSignal,
    dump_core: Option<String>,
}

impl Machine {
    /// Assemble the machine a config describes. `force_debugger` attaches
    /// the debugger even when the config leaves it off.
    pub fn build(
        config: &Config,
        halt: HaltSignal,
        force_debugger: bool,
    ) -> Result<Self, MachineError> {
        let bus = config.build_bus()?;

        let mut monitors: Vec<Box<dyn Monitor>> = Vec::new();
        if config.debug.debugger || force_debugger {
            let symbols = match &config.debug.symbol_file {
                Some(path) => SymbolTable::load(path)?,
                None => SymbolTable::new(),
            };
            let mut debugger = Debugger::new(symbols, halt.clone());
            debugger.queue_commands(config.debug.debug_commands.iter().cloned());
            monitors.push(Box::new(debugger));
        }
        if config.debug.speedometer {
            monitors.push(Box::new(Speedometer::new()));
        }

        Ok(Machine {
            cpu: Cpu::new(),
            bus,
            monitors,
            halt,
            dump_core: config.debug.dump_core.clone(),
        })
    }

    /// Reset, then step until a halt is requested. Returns the exit status.
    /// Errors inside the loop (unknown opcode, unmapped access) are fatal:
    /// logged, then converted into a halt with status 1.
    pub fn run(&mut self) -> i32 {
        if let Err(e) = self.cpu.reset(&mut self.bus) {
            log::error!("machine: {e}");
            self.halt.request(1);
        }
        while !self.halt.is_requested() {
            if let Err(e) = self.step() {
                log::error!("machine: {e}");
                self.halt.request(1);
            }
        }
        self.stop();
        self.halt.status()
    }

    /// One instruction: fetch, give every monitor a look, then execute.
    /// When a monitor requests a halt (the debugger's `exit`) the fetched
    /// instruction is not executed.
    pub fn step(&mut self) -> Result<(), CpuError> {
        let instruction = self.cpu.fetch(&mut self.bus)?;

        let mut monitors = std::mem::take(&mut self.monitors);
        for monitor in &mut monitors {
            monitor.before_execute(&mut self.cpu, &mut self.bus, &instruction);
        }
        self.monitors = monitors;

        if self.halt.is_requested() {
            return Ok(());
        }
        self.cpu.execute(&instruction, &mut self.bus)
    }

    /// Final CPU state, core dumps, device and monitor shutdown.
    fn stop(&mut self) {
        println!("{}", self.cpu);

        if let Some(prefix) = &self.dump_core {
            let mut index = 0;
            self.bus.for_each_ram(|_name, contents| {
                let filename = format!("{prefix}-{index}.core");
                println!("Dumping ram {index} to {filename}");
                if let Err(e) = Ram::dump(contents, &filename) {
                    log::error!("machine: cannot write {filename}: {e}");
                }
                index += 1;
            });
        }

        self.bus.shutdown();
        for monitor in &mut self.monitors {
            monitor.shutdown();
        }
    }
}
