//! YAML machine descriptor: which chips exist and where they live on the
//! address bus, plus debug options.
//!
//! ```yaml
//! debug:
//!   debugger: true
//!   debugCommands: ["ba $F000", "continue"]
//!   symbolFile: kernel.lbl
//!   speedometer: false
//!   dumpCore: core
//! hardware:
//!   - { name: ram,     address: "0000", ram: { size: 32768 } }
//!   - { name: via,     address: "9000", "6522": { sdcard: image.bin } }
//!   - { name: console, address: "9010", "6551": { peripheral: console } }
//!   - { name: kernal,  address: "F000", rom: { filename: kernel.rom } }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::acia::{Acia6551, NopPeripheral, Terminal};
use crate::bus::{Bus, BusError, Device};
use crate::memory::{Ram, Rom};
use crate::sd::SdCardPeripheral;
use crate::spi::PinMap;
use crate::via::{Via6522, ViaOptions};

/// SD card wiring on VIA port B.
const SD_PINS: PinMap = PinMap {
    sclk: 0,
    mosi: 6,
    miso: 7,
    ss: 4,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("hardware entry {name}: address must be 4 hex digits, got {address:?}")]
    BadAddress { name: String, address: String },
    #[error("hardware entry {name}: no chip defined")]
    NoChip { name: String },
    #[error("hardware entry {name}: ram size {size} below 1024-byte minimum")]
    RamTooSmall { name: String, size: u32 },
    #[error("hardware entry {name}: cannot load {path}: {source}")]
    ChipFile {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Bus(#[from] BusError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub debug: DebugConfig,
    pub hardware: Vec<Hardware>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DebugConfig {
    pub debugger: bool,
    pub debug_commands: Vec<String>,
    pub symbol_file: Option<PathBuf>,
    pub speedometer: bool,
    /// Core file prefix; RAM regions are dumped as `<prefix>-<n>.core`.
    pub dump_core: Option<String>,
}

/// One bus device. Exactly one of the chip fields must be set.
#[derive(Debug, Deserialize)]
pub struct Hardware {
    pub name: String,
    /// Big-endian, exactly four hex digits.
    pub address: String,
    #[serde(default)]
    pub ram: Option<RamChip>,
    #[serde(default)]
    pub rom: Option<RomChip>,
    #[serde(default, rename = "6551")]
    pub acia: Option<AciaChip>,
    #[serde(default, rename = "6522")]
    pub via: Option<ViaChip>,
}

#[derive(Debug, Deserialize)]
pub struct RamChip {
    pub size: u32,
}

#[derive(Debug, Deserialize)]
pub struct RomChip {
    pub filename: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AciaChip {
    pub peripheral: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViaChip {
    pub dump_ascii: bool,
    pub dump_binary: bool,
    /// SD card image to attach to port B.
    pub sdcard: Option<PathBuf>,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Instantiate every hardware entry and attach it to a fresh bus.
    pub fn build_bus(&self) -> Result<Bus, ConfigError> {
        let mut bus = Bus::new();
        for h in &self.hardware {
            let address = parse_address(&h.name, &h.address)?;
            let device = h.configure()?;
            bus.attach(device, &h.name, address)?;
        }
        Ok(bus)
    }
}

impl Hardware {
    fn configure(&self) -> Result<Box<dyn Device>, ConfigError> {
        if let Some(ram) = &self.ram {
            if ram.size < 1024 {
                return Err(ConfigError::RamTooSmall {
                    name: self.name.clone(),
                    size: ram.size,
                });
            }
            return Ok(Box::new(Ram::new(ram.size as usize)));
        }

        if let Some(rom) = &self.rom {
            let rom = Rom::from_file(&rom.filename).map_err(|source| ConfigError::ChipFile {
                name: self.name.clone(),
                path: rom.filename.clone(),
                source,
            })?;
            return Ok(Box::new(rom));
        }

        if let Some(acia) = &self.acia {
            let acia = match acia.peripheral.as_deref() {
                Some("console") => Acia6551::new(Box::new(Terminal::console())),
                _ => Acia6551::new(Box::new(NopPeripheral)),
            };
            return Ok(Box::new(acia));
        }

        if let Some(via) = &self.via {
            let mut chip = Via6522::new(ViaOptions {
                dump_ascii: via.dump_ascii,
                dump_binary: via.dump_binary,
            });
            if let Some(image) = &via.sdcard {
                let mut sd = SdCardPeripheral::new(SD_PINS);
                sd.load_file(image).map_err(|source| ConfigError::ChipFile {
                    name: self.name.clone(),
                    path: image.clone(),
                    source,
                })?;
                chip.attach_to_port_b(Box::new(sd));
            }
            chip.reset();
            return Ok(Box::new(chip));
        }

        Err(ConfigError::NoChip {
            name: self.name.clone(),
        })
    }
}

fn parse_address(name: &str, address: &str) -> Result<u16, ConfigError> {
    let bad = || ConfigError::BadAddress {
        name: name.to_string(),
        address: address.to_string(),
    };
    if address.len() != 4 {
        return Err(bad());
    }
    u16::from_str_radix(address, 16).map_err(|_| bad())
}
