//! RAM and ROM bus devices.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use crate::bus::Device;

/// Volatile memory, zero-initialized. Contents can be dumped to a core file
/// on shutdown.
pub struct Ram {
    data: Vec<u8>,
}

impl Ram {
    pub fn new(size: usize) -> Self {
        Ram {
            data: vec![0; size],
        }
    }

    /// Write the full contents as a raw binary file.
    pub fn dump<P: AsRef<Path>>(data: &[u8], path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }
}

impl Device for Ram {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, offset: u16) -> u8 {
        self.data[offset as usize]
    }

    fn write(&mut self, offset: u16, value: u8) {
        self.data[offset as usize] = value;
    }

    fn ram_contents(&self) -> Option<&[u8]> {
        Some(&self.data)
    }
}

/// Read-only memory backed by an image file. The socket has no write line;
/// writes are dropped with a warning.
pub struct Rom {
    data: Vec<u8>,
}

impl Rom {
    pub fn new(data: Vec<u8>) -> Self {
        Rom { data }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let mut file = File::open(&path)?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)?;
        log::info!(
            "rom: loaded {} bytes from {}",
            data.len(),
            path.as_ref().display()
        );
        Ok(Rom { data })
    }
}

impl Device for Rom {
    fn size(&self) -> usize {
        self.data.len()
    }

    fn read(&mut self, offset: u16) -> u8 {
        self.data[offset as usize]
    }

    fn write(&mut self, offset: u16, value: u8) {
        log::warn!("rom: ignoring write of ${:02X} at offset ${:04X}", value, offset);
    }
}
