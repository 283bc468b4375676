//! The cartridge: ROM image, external RAM, and whatever bank-switching
//! hardware the header says is on board.

mod header;
mod mbc;
mod rtc;

pub use header::{CartridgeHeader, MbcKind};
pub use mbc::Mbc;

use crate::error::CoreError;

pub struct Cartridge {
    pub header: CartridgeHeader,
    rom: Vec<u8>,
    ram: Vec<u8>,
    mbc: Mbc,
}

impl Cartridge {
    pub fn load(rom_data: &[u8]) -> Result<Self, CoreError> {
        let header = CartridgeHeader::parse(rom_data)?;
        let expected_rom_len = header.rom_banks * 0x4000;
        if rom_data.len() < expected_rom_len {
            log::warn!(
                "cartridge '{}' declares {} ROM banks ({} bytes) but the image is only {} bytes",
                header.title,
                header.rom_banks,
                expected_rom_len,
                rom_data.len()
            );
        }

        let ram_len = if header.mbc_kind == MbcKind::Mbc2 {
            512
        } else {
            header.ram_bytes
        };

        let mbc = Mbc::new(header.mbc_kind, header.rom_banks.max(1), header.has_rtc);

        Ok(Cartridge {
            rom: rom_data.to_vec(),
            ram: vec![0; ram_len],
            mbc,
            header,
        })
    }

    /// Reads a byte mapped somewhere in 0x0000-0x7FFF.
    pub fn read_rom(&self, addr: u16) -> u8 {
        let offset = self.mbc.translate_rom_addr(addr);
        self.rom.get(offset % self.rom.len().max(1)).copied().unwrap_or(0xFF)
    }

    /// A write into 0x0000-0x7FFF is always a bank-control write, never ROM data.
    pub fn write_rom_control(&mut self, addr: u16, value: u8) {
        self.mbc.write_control(addr, value);
    }

    /// Reads a byte from the external-RAM window, 0xA000-0xBFFF.
    pub fn read_ext_ram(&self, addr: u16) -> u8 {
        self.mbc.read_ext(addr, &self.ram)
    }

    pub fn write_ext_ram(&mut self, addr: u16, value: u8) {
        self.mbc.write_ext(addr, value, &mut self.ram);
    }

    /// Advances cartridge-side hardware (currently only the MBC3 RTC).
    pub fn step(&mut self, t_cycles: u32) {
        self.mbc.tick(t_cycles);
    }

    pub fn has_battery_backed_ram(&self) -> bool {
        self.header.has_battery && !self.ram.is_empty()
    }

    pub fn ram_bytes(&self) -> &[u8] {
        &self.ram
    }

    pub fn load_ram_bytes(&mut self, bytes: &[u8]) {
        let n = self.ram.len().min(bytes.len());
        self.ram[..n].copy_from_slice(&bytes[..n]);
    }

    /// Serializes external RAM and bank-control state. The ROM image and
    /// header aren't included; `load_state` expects the same cartridge
    /// already inserted via `Cartridge::load`.
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.ram.len() as u32).to_le_bytes());
        out.extend_from_slice(&self.ram);
        self.mbc.save_state(out);
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<usize, CoreError> {
        if data.len() < 4 {
            return Err(CoreError::StateCorruption("cartridge ram length truncated".into()));
        }
        let ram_len = u32::from_le_bytes(data[0..4].try_into().unwrap()) as usize;
        let mut n = 4;
        if data.len() < n + ram_len {
            return Err(CoreError::StateCorruption("cartridge ram truncated".into()));
        }
        if ram_len != self.ram.len() {
            return Err(CoreError::StateCorruption(
                "cartridge ram size doesn't match the loaded ROM".into(),
            ));
        }
        self.ram.copy_from_slice(&data[n..n + ram_len]);
        n += ram_len;
        n += self
            .mbc
            .load_state(&data[n..])
            .map_err(CoreError::StateCorruption)?;
        Ok(n)
    }
}
