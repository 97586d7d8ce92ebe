mod acia;
mod bus;
mod config;
mod cpu;
mod debugger;
mod halt;
mod machine;
mod memory;
mod sd;
mod speedometer;
mod spi;
mod symbols;
mod via;

use std::env;
use std::process;

use config::Config;
use halt::HaltSignal;
use machine::Machine;

fn usage(program: &str) {
    eprintln!("Usage: {program} [-c <config.yaml>] [--debug]");
    eprintln!("  -c, --config <file>  Machine description (default: config.yaml)");
    eprintln!("      --debug          Attach the debugger even if the config leaves it off");
    eprintln!("  -h, --help           This help");
}

fn main() {
    env_logger::init();
    process::exit(run());
}

fn run() -> i32 {
    let args: Vec<String> = env::args().collect();

    let mut config_file = String::from("config.yaml");
    let mut force_debugger = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-c" | "--config" => {
                if i + 1 >= args.len() {
                    eprintln!("{} requires a value", args[i]);
                    return 2;
                }
                config_file = args[i + 1].clone();
                i += 2;
            }
            "--debug" => {
                force_debugger = true;
                i += 1;
            }
            "-h" | "--help" => {
                usage(&args[0]);
                return 0;
            }
            s => {
                eprintln!("Unknown option: {s}");
                usage(&args[0]);
                return 2;
            }
        }
    }

    let config = match Config::load(&config_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    let halt = HaltSignal::new();
    halt::install_signal_handler(halt.clone());

    let mut machine = match Machine::build(&config, halt, force_debugger) {
        Ok(machine) => machine,
        Err(e) => {
            eprintln!("{e}");
            return 1;
        }
    };

    machine.run()
}
