//! Memory-mapped address bus.
//!
//! The bus owns every attached device and routes 16-bit reads/writes to the
//! region containing the address, passing the device a local offset. Regions
//! may not overlap; an access outside every region is an error the caller
//! must treat as fatal (undefined hardware behavior is not modeled).

use thiserror::Error;

/// A single addressable device on the bus: RAM, ROM or a peripheral chip.
///
/// Devices see offsets relative to their attach address, never absolute
/// addresses, so the same chip can be mapped anywhere.
pub trait Device {
    /// Number of bytes the device occupies on the bus.
    fn size(&self) -> usize;

    /// Read a byte at a device-local offset.
    fn read(&mut self, offset: u16) -> u8;

    /// Write a byte at a device-local offset.
    fn write(&mut self, offset: u16, value: u8);

    /// Release any resources (close streams, flush peripherals).
    fn shutdown(&mut self) {}

    /// RAM devices expose their contents for core dumps; everything else
    /// returns `None`.
    fn ram_contents(&self) -> Option<&[u8]> {
        None
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("device {name} at ${base:04X}..${end:04X} overlaps region {existing}")]
    Overlap {
        name: String,
        base: u16,
        end: u32,
        existing: String,
    },
    #[error("device {name} at ${base:04X} runs past the 64KB address space")]
    OutOfRange { name: String, base: u16 },
    #[error("no device mapped at ${addr:04X}")]
    Unmapped { addr: u16 },
}

struct Region {
    name: String,
    base: u16,
    end: u32, // exclusive, at most 0x10000
    device: Box<dyn Device>,
}

#[derive(Default)]
pub struct Bus {
    regions: Vec<Region>,
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            regions: Vec::new(),
        }
    }

    /// Register `device` at `base` for `device.size()` bytes. The binding
    /// table is left untouched when the range collides or overflows.
    pub fn attach(
        &mut self,
        device: Box<dyn Device>,
        name: &str,
        base: u16,
    ) -> Result<(), BusError> {
        let end = base as u32 + device.size() as u32;
        if end > 0x10000 {
            return Err(BusError::OutOfRange {
                name: name.to_string(),
                base,
            });
        }
        for region in &self.regions {
            if (base as u32) < region.end && (region.base as u32) < end {
                return Err(BusError::Overlap {
                    name: name.to_string(),
                    base,
                    end,
                    existing: region.name.clone(),
                });
            }
        }
        log::info!("bus: {} at ${:04X}..${:04X}", name, base, end - 1);
        self.regions.push(Region {
            name: name.to_string(),
            base,
            end,
            device,
        });
        Ok(())
    }

    pub fn read(&mut self, addr: u16) -> Result<u8, BusError> {
        let region = self.region_mut(addr)?;
        let offset = addr - region.base;
        Ok(region.device.read(offset))
    }

    pub fn write(&mut self, addr: u16, value: u8) -> Result<(), BusError> {
        let region = self.region_mut(addr)?;
        let offset = addr - region.base;
        region.device.write(offset, value);
        Ok(())
    }

    /// Little-endian 16-bit read, used for the reset vector and the
    /// debugger's `read16`.
    pub fn read_word(&mut self, addr: u16) -> Result<u16, BusError> {
        let lo = self.read(addr)? as u16;
        let hi = self.read(addr.wrapping_add(1))? as u16;
        Ok(hi << 8 | lo)
    }

    /// Visit each RAM region's contents, in attach order, for core dumps.
    pub fn for_each_ram<F: FnMut(&str, &[u8])>(&self, mut f: F) {
        for region in &self.regions {
            if let Some(contents) = region.device.ram_contents() {
                f(&region.name, contents);
            }
        }
    }

    pub fn shutdown(&mut self) {
        for region in &mut self.regions {
            region.device.shutdown();
        }
    }

    fn region_mut(&mut self, addr: u16) -> Result<&mut Region, BusError> {
        self.regions
            .iter_mut()
            .find(|r| addr >= r.base && (addr as u32) < r.end)
            .ok_or(BusError::Unmapped { addr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Ram;

    #[test]
    fn dispatches_to_local_offset() {
        let mut bus = Bus::new();
        bus.attach(Box::new(Ram::new(0x100)), "lo", 0x0000).unwrap();
        bus.attach(Box::new(Ram::new(0x100)), "hi", 0x2000).unwrap();

        bus.write(0x2005, 0xAB).unwrap();
        assert_eq!(bus.read(0x2005).unwrap(), 0xAB);
        // The low region is untouched at the same local offset.
        assert_eq!(bus.read(0x0005).unwrap(), 0x00);
    }

    #[test]
    fn overlap_is_rejected_without_mutation() {
        let mut bus = Bus::new();
        bus.attach(Box::new(Ram::new(0x1000)), "ram", 0x1000)
            .unwrap();
        let err = bus
            .attach(Box::new(Ram::new(0x1000)), "clash", 0x1FFF)
            .unwrap_err();
        assert!(matches!(err, BusError::Overlap { .. }));
        // Original binding still answers.
        bus.write(0x1FFF, 0x42).unwrap();
        assert_eq!(bus.read(0x1FFF).unwrap(), 0x42);
        // The rejected region was never attached.
        assert!(matches!(
            bus.read(0x2FFE),
            Err(BusError::Unmapped { addr: 0x2FFE })
        ));
    }

    #[test]
    fn attach_past_top_of_memory_fails() {
        let mut bus = Bus::new();
        let err = bus
            .attach(Box::new(Ram::new(0x2000)), "high", 0xF000)
            .unwrap_err();
        assert!(matches!(err, BusError::OutOfRange { .. }));
    }

    #[test]
    fn unmapped_read_is_an_error() {
        let mut bus = Bus::new();
        assert!(matches!(
            bus.read(0x1234),
            Err(BusError::Unmapped { addr: 0x1234 })
        ));
    }

    #[test]
    fn read_word_is_little_endian() {
        let mut bus = Bus::new();
        bus.attach(Box::new(Ram::new(0x2000)), "ram", 0x0000)
            .unwrap();
        bus.write(0x1000, 0x34).unwrap();
        bus.write(0x1001, 0x12).unwrap();
        assert_eq!(bus.read_word(0x1000).unwrap(), 0x1234);
    }
}
