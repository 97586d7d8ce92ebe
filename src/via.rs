//! 6522 VIA parallel controller.
//!
//! Two 8-bit ports with data-direction registers; peripherals (SPI devices,
//! displays) hang off the port lines. Only the output/direction registers
//! are emulated; timer and shift-register offsets read zero.
//!
//! Port semantics: writing an output register pushes the byte to every
//! peripheral on that port; reading it combines the output latch (for
//! DDR=1 bits) with peripheral-driven input lines (DDR=0 bits).

use crate::bus::Device;
use crate::sd::SdCardPeripheral;

const VIA_ORB: u16 = 0x0;
const VIA_ORA: u16 = 0x1;
const VIA_DDRB: u16 = 0x2;
const VIA_DDRA: u16 = 0x3;
const VIA_SIZE: usize = 16;

/// A device wired to one VIA port.
pub trait ParallelPeripheral {
    /// Bits of the port the peripheral drives.
    fn pin_mask(&self) -> u8;

    /// Current state of the lines the peripheral drives.
    fn read(&self) -> u8;

    /// Notify the peripheral of a new port state.
    fn write(&mut self, data: u8);

    fn shutdown(&mut self) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ViaOptions {
    /// Print port A writes as ASCII (handy for firmware debug prints).
    pub dump_ascii: bool,
    /// Print port A writes as bit patterns.
    pub dump_binary: bool,
}

#[derive(Default)]
struct Port {
    or: u8,
    ddr: u8,
    peripherals: Vec<Box<dyn ParallelPeripheral>>,
}

impl Port {
    fn write_or(&mut self, data: u8) {
        self.or = data;
        for p in &mut self.peripherals {
            p.write(data);
        }
    }

    /// Output latch for output bits, peripheral lines for input bits.
    fn read_or(&self) -> u8 {
        let mut input = 0;
        for p in &self.peripherals {
            input |= p.read() & p.pin_mask();
        }
        self.or & self.ddr | input & !self.ddr
    }
}

#[derive(Default)]
pub struct Via6522 {
    a: Port,
    b: Port,
    options: ViaOptions,
}

impl Via6522 {
    pub fn new(options: ViaOptions) -> Self {
        Via6522 {
            options,
            ..Default::default()
        }
    }

    pub fn attach_to_port_a(&mut self, peripheral: Box<dyn ParallelPeripheral>) {
        self.a.peripherals.push(peripheral);
    }

    pub fn attach_to_port_b(&mut self, peripheral: Box<dyn ParallelPeripheral>) {
        self.b.peripherals.push(peripheral);
    }

    pub fn reset(&mut self) {
        self.a.or = 0;
        self.a.ddr = 0;
        self.b.or = 0;
        self.b.ddr = 0;
    }

    fn dump_port_a(&self, data: u8) {
        if self.options.dump_binary {
            println!("VIA PA: {data:08b}");
        }
        if self.options.dump_ascii {
            print!("{}", data as char);
        }
    }
}

impl Device for Via6522 {
    fn size(&self) -> usize {
        VIA_SIZE
    }

    fn read(&mut self, offset: u16) -> u8 {
        match offset {
            VIA_ORB => self.b.read_or(),
            VIA_ORA => self.a.read_or(),
            VIA_DDRB => self.b.ddr,
            VIA_DDRA => self.a.ddr,
            _ => {
                log::warn!("via: read from unimplemented register ${offset:X}");
                0
            }
        }
    }

    fn write(&mut self, offset: u16, value: u8) {
        match offset {
            VIA_ORB => self.b.write_or(value),
            VIA_ORA => {
                self.dump_port_a(value);
                self.a.write_or(value);
            }
            VIA_DDRB => self.b.ddr = value,
            VIA_DDRA => self.a.ddr = value,
            _ => {
                log::warn!("via: ignoring write of ${value:02X} to unimplemented register ${offset:X}")
            }
        }
    }

    fn shutdown(&mut self) {
        for p in self.a.peripherals.iter_mut().chain(&mut self.b.peripherals) {
            p.shutdown();
        }
    }
}

impl ParallelPeripheral for SdCardPeripheral {
    fn pin_mask(&self) -> u8 {
        SdCardPeripheral::pin_mask(self)
    }

    fn read(&self) -> u8 {
        SdCardPeripheral::read(self)
    }

    fn write(&mut self, data: u8) {
        SdCardPeripheral::write(self, data)
    }
}
