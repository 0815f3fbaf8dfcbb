// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use crate::memory::KB;

/// A cartridge: the ROM image and its 32K of SRAM.
/// With no image loaded, the ROM region reads as open bus.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Cartridge {
    #[cfg_attr(feature = "serde", serde(skip))]
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
}

impl Cartridge {
    /// Load a ROM image, making it visible on the bus.
    pub fn load_rom(&mut self, mut rom: Vec<u8>) {
        // Word accesses may read up to 3 bytes past the image
        while rom.len() % 4 != 0 {
            rom.push(0);
        }
        self.rom = rom;
        log::info!("Loaded cartridge '{}'", self.title());
    }

    /// Unload the current ROM image; the region returns to open bus.
    pub fn unload(&mut self) {
        self.rom = Vec::new();
    }

    pub fn rom_loaded(&self) -> bool {
        !self.rom.is_empty()
    }

    /// Game title from the cartridge header.
    pub fn title(&self) -> String {
        self.rom
            .get(0xA0..0xAC)
            .map(|t| String::from_utf8_lossy(t).trim_end_matches('\0').to_string())
            .unwrap_or_default()
    }

    pub fn read_ram_byte(&self, addr: usize) -> u8 {
        self.ram[addr & 0x7FFF]
    }

    pub fn write_ram_byte(&mut self, addr: usize, value: u8) {
        self.ram[addr & 0x7FFF] = value;
    }
}

impl Default for Cartridge {
    fn default() -> Self {
        Self {
            rom: Vec::new(),
            ram: vec![0xFF; 32 * KB],
        }
    }
}
