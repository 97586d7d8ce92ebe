//! SPI slave shift register, driven bit-by-bit from a parallel port.
//!
//! The master wiggles clock and MOSI lines through VIA port writes; the
//! slave samples MOSI on each rising clock edge while shifting the next
//! MISO bit onto the port. After eight exchanged bits `done` is set and
//! `mosi` holds the assembled byte until the next edge starts a new one.

/// Which port bit carries which SPI line.
#[derive(Debug, Clone, Copy)]
pub struct PinMap {
    pub sclk: u8,
    pub mosi: u8,
    pub miso: u8,
    pub ss: u8,
}

pub struct Slave {
    pins: PinMap,
    last_sclk: bool,
    mosi_shift: u8,
    miso_shift: u8,
    bit_count: u8,
    /// True exactly when 8 bits have been exchanged since the last
    /// completed byte.
    pub done: bool,
    /// The completed incoming byte, valid while `done` is set.
    pub mosi: u8,
    /// Last byte presented on the port (MISO line included).
    port: u8,
}

impl Slave {
    pub fn new(pins: PinMap) -> Self {
        Slave {
            pins,
            last_sclk: false,
            mosi_shift: 0,
            miso_shift: 0,
            bit_count: 0,
            done: false,
            mosi: 0,
            port: 0,
        }
    }

    /// Bits of the port this slave drives.
    pub fn pin_mask(&self) -> u8 {
        1 << self.pins.miso
    }

    /// Load the outgoing shift register with the next byte to emit,
    /// MSB first.
    pub fn queue_miso_bits(&mut self, byte: u8) {
        self.miso_shift = byte;
    }

    /// Current port state as seen by the master, MISO bit driven by the
    /// outgoing shift register.
    pub fn read(&self) -> u8 {
        let miso_bit = (self.miso_shift >> 7) & 1;
        (self.port & !(1 << self.pins.miso)) | (miso_bit << self.pins.miso)
    }

    /// Take an updated parallel port state. Returns true when the write
    /// produced a clock edge; bits shift on the rising edge only.
    pub fn write(&mut self, data: u8) -> bool {
        self.port = data;
        let sclk = data & (1 << self.pins.sclk) != 0;
        if sclk == self.last_sclk {
            return false;
        }
        self.last_sclk = sclk;
        if !sclk {
            // Falling edge: lines settle, nothing shifts.
            return true;
        }

        if self.done {
            // First edge of a new byte.
            self.done = false;
            self.bit_count = 0;
        }

        let mosi_bit = (data >> self.pins.mosi) & 1;
        self.mosi_shift = self.mosi_shift << 1 | mosi_bit;
        self.miso_shift <<= 1;
        self.bit_count += 1;

        if self.bit_count == 8 {
            self.mosi = self.mosi_shift;
            self.mosi_shift = 0;
            self.done = true;
        }
        true
    }
}
