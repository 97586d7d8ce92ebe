//! SD card emulation behind the SPI slave.
//!
//! The card consumes the command stream assembled by the shift register and
//! queues response bytes; when the queue is empty the bus idles at `0xFF`.
//! Power-up is modeled by pre-queueing two busy bytes and a ready byte.

use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use crate::spi::{PinMap, Slave};

const FILLER: u8 = 0xFF;
const BLOCK_SIZE: usize = 512;

const R1_READY: u8 = 0x00;
const R1_IDLE: u8 = 0x01;
const R1_ILLEGAL: u8 = 0x05;
const DATA_TOKEN: u8 = 0xFE;

const CMD_GO_IDLE: u8 = 0;
const CMD_SET_BLOCKLEN: u8 = 16;
const CMD_READ_SINGLE_BLOCK: u8 = 17;
const CMD_APP_CMD: u8 = 55;
const ACMD_SEND_OP_COND: u8 = 41;

struct SdCard {
    data: Vec<u8>,
    miso_queue: VecDeque<u8>,
    command: Vec<u8>,
    app_cmd: bool,
}

impl SdCard {
    fn new() -> Self {
        SdCard {
            data: Vec::new(),
            miso_queue: VecDeque::new(),
            command: Vec::new(),
            app_cmd: false,
        }
    }

    fn queue_miso_bytes(&mut self, bytes: &[u8]) {
        self.miso_queue.extend(bytes);
    }

    /// Next outgoing byte, or the filler when nothing is queued.
    fn shift_miso(&mut self) -> u8 {
        self.miso_queue.pop_front().unwrap_or(FILLER)
    }

    /// Feed one assembled MOSI byte into the command parser. Commands are
    /// 6-byte frames: `0x40|cmd`, four argument bytes, CRC.
    fn consume_byte(&mut self, byte: u8) {
        if self.command.is_empty() {
            // Waiting for a start byte; ignore bus idle.
            if byte & 0xC0 != 0x40 {
                return;
            }
        }
        self.command.push(byte);
        if self.command.len() == 6 {
            self.dispatch_command();
            self.command.clear();
        }
    }

    fn dispatch_command(&mut self) {
        let cmd = self.command[0] & 0x3F;
        let arg = u32::from_be_bytes([
            self.command[1],
            self.command[2],
            self.command[3],
            self.command[4],
        ]);

        let app_cmd = std::mem::replace(&mut self.app_cmd, false);
        if app_cmd {
            match cmd {
                ACMD_SEND_OP_COND => self.queue_miso_bytes(&[R1_READY]),
                _ => {
                    log::warn!("sd: unhandled ACMD{cmd}");
                    self.queue_miso_bytes(&[R1_ILLEGAL]);
                }
            }
            return;
        }

        match cmd {
            CMD_GO_IDLE => self.queue_miso_bytes(&[R1_IDLE]),
            CMD_SET_BLOCKLEN => self.queue_miso_bytes(&[R1_READY]),
            CMD_READ_SINGLE_BLOCK => self.read_block(arg),
            CMD_APP_CMD => {
                self.app_cmd = true;
                self.queue_miso_bytes(&[R1_IDLE]);
            }
            _ => {
                log::warn!("sd: unhandled CMD{cmd}");
                self.queue_miso_bytes(&[R1_ILLEGAL]);
            }
        }
    }

    fn read_block(&mut self, addr: u32) {
        let start = addr as usize;
        self.queue_miso_bytes(&[R1_READY, DATA_TOKEN]);
        for i in 0..BLOCK_SIZE {
            let byte = self.data.get(start + i).copied().unwrap_or(FILLER);
            self.miso_queue.push_back(byte);
        }
        // Dummy CRC.
        self.queue_miso_bytes(&[0x00, 0x00]);
    }
}

/// SPI slave plus card model, attachable to a VIA parallel port.
pub struct SdCardPeripheral {
    card: SdCard,
    spi: Slave,
}

impl SdCardPeripheral {
    pub fn new(pins: PinMap) -> Self {
        let mut card = SdCard::new();
        // Two busy bytes, then ready.
        card.queue_miso_bytes(&[0x00, 0x00, 0xFF]);
        let mut spi = Slave::new(pins);
        let first = card.shift_miso();
        spi.queue_miso_bits(first);
        SdCardPeripheral { card, spi }
    }

    /// Equivalent to inserting a card.
    pub fn load_file<P: AsRef<Path>>(&mut self, path: P) -> std::io::Result<()> {
        self.card.data = fs::read(path)?;
        log::info!("sd: loaded {} bytes", self.card.data.len());
        Ok(())
    }

    pub fn pin_mask(&self) -> u8 {
        self.spi.pin_mask()
    }

    pub fn read(&self) -> u8 {
        self.spi.read()
    }

    /// Takes an updated parallel port state.
    pub fn write(&mut self, data: u8) {
        if self.spi.write(data) && self.spi.done {
            // Consume the completed byte, then present the next response.
            self.card.consume_byte(self.spi.mosi);
            let next = self.card.shift_miso();
            self.spi.queue_miso_bits(next);
        }
    }
}
