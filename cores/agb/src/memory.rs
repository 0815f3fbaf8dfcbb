// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use arm7tdmi::{
    interface::Access::{self, *},
    state::{CpuState, Flag},
};
use common::numutil::{hword, word, NumExt, U16Ext, U32Ext};

use crate::AgbBus;

pub const KB: usize = 1024;

/// Memory struct containing the system's memory regions along with
/// cached wait time information.
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Memory {
    pub bios: Vec<u8>,
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    pub ewram: [u8; 256 * KB],
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    pub iwram: [u8; 32 * KB],
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    pub palette: [u8; KB],
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    pub vram: [u8; 96 * KB],
    #[cfg_attr(feature = "serde", serde(with = "serde_arrays"))]
    pub oam: [u8; KB],

    pub waitcnt: u16,
    /// Value to return when trying to read BIOS outside of it
    pub(crate) bios_value: u32,

    pub(crate) wait_word: [u16; 32],
    pub(crate) wait_other: [u16; 32],
}

impl AgbBus {
    /// Read a byte from the bus. Does no timing-related things; simply fetches
    /// the value.
    pub fn get_byte(&self, cpu: &CpuState, addr: u32) -> u8 {
        match addr {
            0x0000_0000..=0x0000_3FFF if cpu.pc() < 0x0100_0000 => self.bios_byte(addr),
            0x0000_0000..=0x0000_3FFF => self.memory.bios_value.u8(),

            0x0200_0000..=0x02FF_FFFF => self.memory.ewram[addr.us() & 0x3_FFFF],
            0x0300_0000..=0x03FF_FFFF => self.memory.iwram[addr.us() & 0x7FFF],

            0x0400_0000..=0x04FF_FFFF if addr.is_bit(0) => self.get_mmio(cpu, addr).high(),
            0x0400_0000..=0x04FF_FFFF => self.get_mmio(cpu, addr).low(),

            0x0500_0000..=0x05FF_FFFF => self.memory.palette[addr.us() & 0x3FF],
            0x0600_0000..=0x06FF_FFFF => self.memory.vram[Self::vram_idx(addr)],
            0x0700_0000..=0x07FF_FFFF => self.memory.oam[addr.us() & 0x3FF],

            0x0800_0000..=0x0DFF_FFFF if (addr.us() & 0x1FF_FFFF) < self.cart.rom.len() => {
                self.cart.rom[addr.us() & 0x1FF_FFFF]
            }

            0x0E00_0000..=0x0FFF_FFFF => self.cart.read_ram_byte(addr.us() & 0x7FFF),

            _ => self.invalid_read::<false>(cpu, addr).u8(),
        }
    }

    /// Read a half-word from the bus (LE). Does no timing-related things;
    /// simply fetches the value.
    pub fn get_hword(&self, cpu: &CpuState, addr: u32) -> u16 {
        let addr = addr & !1;
        match addr {
            0x0000_0000..=0x0000_3FFF if cpu.pc() < 0x0100_0000 => {
                hword(self.bios_byte(addr), self.bios_byte(addr + 1))
            }
            0x0000_0000..=0x0000_3FFF => self.memory.bios_value.u16(),

            0x0200_0000..=0x02FF_FFFF => {
                let a = addr.us() & 0x3_FFFF;
                hword(self.memory.ewram[a], self.memory.ewram[a + 1])
            }
            0x0300_0000..=0x03FF_FFFF => {
                let a = addr.us() & 0x7FFF;
                hword(self.memory.iwram[a], self.memory.iwram[a + 1])
            }

            0x0400_0000..=0x04FF_FFFF => self.get_mmio(cpu, addr),

            0x0500_0000..=0x05FF_FFFF => {
                let a = addr.us() & 0x3FF;
                hword(self.memory.palette[a], self.memory.palette[a + 1])
            }
            0x0600_0000..=0x06FF_FFFF => {
                let a = Self::vram_idx(addr);
                hword(self.memory.vram[a], self.memory.vram[a + 1])
            }
            0x0700_0000..=0x07FF_FFFF => {
                let a = addr.us() & 0x3FF;
                hword(self.memory.oam[a], self.memory.oam[a + 1])
            }

            0x0800_0000..=0x0DFF_FFFF if (addr.us() & 0x1FF_FFFF) < self.cart.rom.len() => {
                let a = addr.us() & 0x1FF_FFFF;
                hword(self.cart.rom[a], self.cart.rom[a + 1])
            }

            0x0E00_0000..=0x0FFF_FFFF => {
                // Reading halfwords causes the byte to be repeated
                let byte = self.cart.read_ram_byte(addr.us() & 0x7FFF);
                hword(byte, byte)
            }

            _ => self.invalid_read::<false>(cpu, addr).u16(),
        }
    }

    /// Read a word from the bus (LE). Does no timing-related things; simply
    /// fetches the value. Also does not handle unaligned reads.
    pub fn get_word(&self, cpu: &CpuState, addr: u32) -> u32 {
        let addr = addr & !3;
        match addr {
            0x0000_0000..=0x0000_3FFF if cpu.pc() >= 0x0100_0000 => self.memory.bios_value,
            0x0100_0000..=0x01FF_FFFF => self.invalid_read::<true>(cpu, addr),
            0x0800_0000..=0x0DFF_FFFF if (addr.us() & 0x1FF_FFFF) >= self.cart.rom.len() => {
                self.invalid_read::<true>(cpu, addr)
            }

            0x0E00_0000..=0x0FFF_FFFF => {
                // Reading words causes the byte to be repeated
                let byte = self.cart.read_ram_byte(addr.us() & 0x7FFF);
                let hword = hword(byte, byte);
                word(hword, hword)
            }

            0x0000_0000..=0x0DFF_FFFF => word(
                self.get_hword(cpu, addr),
                self.get_hword(cpu, addr.wrapping_add(2)),
            ),

            _ => self.invalid_read::<true>(cpu, addr),
        }
    }

    pub(crate) fn invalid_read<const WORD: bool>(&self, cpu: &CpuState, addr: u32) -> u32 {
        match addr {
            0x0800_0000..=0x0DFF_FFFF => {
                // Out of bounds ROM read
                let addr = (addr & !if WORD { 3 } else { 1 }) >> 1;
                let low = addr.u16();
                word(low, low.wrapping_add(1))
            }

            _ => {
                // Open bus
                if cpu.pc() > 0xFFF_FFFF || (cpu.pc() > 0x3FFF && cpu.pc() < 0x200_0000) {
                    return 0;
                }

                if !cpu.is_flag(Flag::Thumb) {
                    // Simple case: just read PC in ARM mode
                    self.get_word(cpu, cpu.pc())
                } else {
                    // Thumb mode... complicated.
                    // https://problemkaputt.de/gbatek.htm#gbaunpredictablethings
                    match cpu.pc() >> 24 {
                        0x02 | 0x05 | 0x06 | 0x08..=0xD => {
                            let hword = self.get_hword(cpu, cpu.pc());
                            word(hword, hword)
                        }
                        _ if cpu.pc().is_bit(1) => word(
                            self.get_hword(cpu, cpu.pc() - 2),
                            self.get_hword(cpu, cpu.pc()),
                        ),
                        0x00 | 0x07 => word(
                            self.get_hword(cpu, cpu.pc()),
                            self.get_hword(cpu, cpu.pc() + 2),
                        ),
                        _ => word(
                            self.get_hword(cpu, cpu.pc()),
                            self.get_hword(cpu, cpu.pc() - 2),
                        ),
                    }
                }
            }
        }
    }

    /// Write a byte to the bus. Does no timing-related things; simply sets the
    /// value.
    pub fn set_byte(&mut self, cpu: &mut CpuState, addr: u32, value: u8) {
        match addr {
            // HALTCNT
            0x0400_0301 => cpu.halt_on_irq(),

            // MMIO is on a 16bit bus, byte writes are widened
            0x0400_0000..=0x0400_0301 if addr.is_bit(0) => {
                let prev = self.get_hword(cpu, addr);
                self.set_hword(cpu, addr, prev.set_high(value));
            }
            0x0400_0000..=0x0400_0301 => {
                let prev = self.get_hword(cpu, addr);
                self.set_hword(cpu, addr, prev.set_low(value));
            }

            0x0200_0000..=0x02FF_FFFF => self.memory.ewram[addr.us() & 0x3_FFFF] = value,
            0x0300_0000..=0x03FF_FFFF => self.memory.iwram[addr.us() & 0x7FFF] = value,

            // Palette and VRAM are on a 16bit bus, byte writes set both lanes
            0x0500_0000..=0x06FF_FFFF => self.set_hword(cpu, addr & !1, hword(value, value)),
            // OAM ignores byte writes entirely
            0x0700_0000..=0x07FF_FFFF => (),

            0x0E00_0000..=0x0FFF_FFFF => self.cart.write_ram_byte(addr.us() & 0x7FFF, value),

            _ => (),
        }
    }

    /// Write a half-word from the bus (LE). Does no timing-related things;
    /// simply sets the value.
    pub fn set_hword(&mut self, cpu: &mut CpuState, addr_unaligned: u32, value: u16) {
        let addr = addr_unaligned & !1; // Forcibly align: All write instructions do this
        match addr {
            0x0400_0000..=0x0400_0300 => self.set_mmio(cpu, addr, value),

            0x0200_0000..=0x02FF_FFFF => {
                let a = addr.us() & 0x3_FFFF;
                self.memory.ewram[a] = value.low();
                self.memory.ewram[a + 1] = value.high();
            }
            0x0300_0000..=0x03FF_FFFF => {
                let a = addr.us() & 0x7FFF;
                self.memory.iwram[a] = value.low();
                self.memory.iwram[a + 1] = value.high();
            }
            0x0500_0000..=0x05FF_FFFF => {
                let a = addr.us() & 0x3FF;
                self.memory.palette[a] = value.low();
                self.memory.palette[a + 1] = value.high();
            }
            0x0600_0000..=0x06FF_FFFF => {
                let a = Self::vram_idx(addr);
                self.memory.vram[a] = value.low();
                self.memory.vram[a + 1] = value.high();
            }
            0x0700_0000..=0x07FF_FFFF => {
                let a = addr.us() & 0x3FF;
                self.memory.oam[a] = value.low();
                self.memory.oam[a + 1] = value.high();
            }

            0x0E00_0000..=0x0FFF_FFFF => {
                // Writing halfwords causes a byte from it to be written
                let byte = if addr_unaligned.is_bit(0) {
                    value.high()
                } else {
                    value.low()
                };
                self.cart.write_ram_byte(addr_unaligned.us() & 0x7FFF, byte);
            }

            _ => (),
        }
    }

    /// Write a word from the bus (LE). Does no timing-related things; simply
    /// sets the value.
    pub fn set_word(&mut self, cpu: &mut CpuState, addr_unaligned: u32, value: u32) {
        let addr = addr_unaligned & !3; // Forcibly align: All write instructions do this
        match addr {
            0x0400_0000..=0x0400_0300 => {
                self.set_mmio(cpu, addr, value.low());
                self.set_mmio(cpu, addr.wrapping_add(2), value.high());
            }

            0x0E00_0000..=0x0FFF_FFFF => {
                // Writing words causes a byte from it to be written
                let byte_shift = (addr_unaligned & 3) * 8;
                let byte = (value >> byte_shift) & 0xFF;
                self.cart
                    .write_ram_byte(addr_unaligned.us() & 0x7FFF, byte.u8());
            }

            _ => {
                self.set_hword(cpu, addr, value.low());
                self.set_hword(cpu, addr.wrapping_add(2), value.high());
            }
        }
    }

    fn bios_byte(&self, addr: u32) -> u8 {
        self.memory
            .bios
            .get(addr.us() & 0x3FFF)
            .copied()
            .unwrap_or(0)
    }

    fn vram_idx(addr: u32) -> usize {
        // The upper 32K of VRAM mirror the last bank
        let a = addr.us() & 0x1_FFFF;
        if a >= 0x1_8000 {
            a - 0x8000
        } else {
            a
        }
    }

    pub(crate) fn update_wait_times(&mut self) {
        for i in 0..16 {
            let addr = i.u32() * 0x100_0000;
            self.memory.wait_word[i] = self.calc_wait_time::<4>(addr, Seq);
            self.memory.wait_other[i] = self.calc_wait_time::<2>(addr, Seq);
            self.memory.wait_word[i + 16] = self.calc_wait_time::<4>(addr, NonSeq);
            self.memory.wait_other[i + 16] = self.calc_wait_time::<2>(addr, NonSeq);
        }
    }

    const WS_NONSEQ: [u16; 4] = [5, 4, 3, 9];

    fn calc_wait_time<const W: u32>(&self, addr: u32, ty: Access) -> u16 {
        match (addr, W, ty) {
            (0x0200_0000..=0x02FF_FFFF, 4, _) => 6,
            (0x0200_0000..=0x02FF_FFFF, _, _) => 3,
            (0x0500_0000..=0x06FF_FFFF, 4, _) => 2,

            (0x0800_0000..=0x0DFF_FFFF, 4, _) => {
                // Cart bus is 16bit, word access is therefore 2x
                self.calc_wait_time::<2>(addr, ty) + self.calc_wait_time::<2>(addr, Seq)
            }

            (0x0800_0000..=0x09FF_FFFF, _, Seq) => 3 - self.memory.waitcnt.bit(4),
            (0x0800_0000..=0x09FF_FFFF, _, NonSeq) => {
                Self::WS_NONSEQ[self.memory.waitcnt.bits(2, 2).us()]
            }

            (0x0A00_0000..=0x0BFF_FFFF, _, Seq) => 5 - (self.memory.waitcnt.bit(7) * 3),
            (0x0A00_0000..=0x0BFF_FFFF, _, NonSeq) => {
                Self::WS_NONSEQ[self.memory.waitcnt.bits(5, 2).us()]
            }

            (0x0C00_0000..=0x0DFF_FFFF, _, Seq) => 9 - (self.memory.waitcnt.bit(10) * 7),
            (0x0C00_0000..=0x0DFF_FFFF, _, NonSeq) => {
                Self::WS_NONSEQ[self.memory.waitcnt.bits(8, 2).us()]
            }

            (0x0E00_0000..=0x0FFF_FFFF, _, _) => {
                Self::WS_NONSEQ[self.memory.waitcnt.bits(0, 2).us()]
            }

            _ => 1,
        }
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            bios: Vec::new(),
            ewram: [0; 256 * KB],
            iwram: [0; 32 * KB],
            palette: [0; KB],
            vram: [0; 96 * KB],
            oam: [0; KB],
            waitcnt: 0,
            bios_value: 0xE129_F000,
            wait_word: [0; 32],
            wait_other: [0; 32],
        }
    }
}
