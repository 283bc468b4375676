//! Cartridge header parsing (0x0100-0x014F) and the boot-ROM checksum.

use crate::error::CoreError;

pub const HEADER_START: usize = 0x0100;
pub const HEADER_END: usize = 0x014F;
pub const TITLE_START: usize = 0x0134;
pub const CARTRIDGE_TYPE_ADDR: usize = 0x0147;
pub const ROM_SIZE_ADDR: usize = 0x0148;
pub const RAM_SIZE_ADDR: usize = 0x0149;
pub const HEADER_CHECKSUM_ADDR: usize = 0x014D;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    RomOnly,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc5,
}

#[derive(Debug, Clone)]
pub struct CartridgeHeader {
    pub title: String,
    pub cartridge_type_code: u8,
    pub mbc_kind: MbcKind,
    pub has_ram: bool,
    pub has_battery: bool,
    pub has_rtc: bool,
    pub rom_banks: usize,
    pub ram_bytes: usize,
    pub checksum_ok: bool,
}

impl CartridgeHeader {
    /// Parses the header out of a full ROM image. `rom_data.len()` must
    /// already have been checked against `HEADER_END + 1` by the caller.
    pub fn parse(rom_data: &[u8]) -> Result<Self, CoreError> {
        if rom_data.len() <= HEADER_END {
            return Err(CoreError::InvalidRom(format!(
                "ROM is {} bytes, shorter than the header region ending at {:#06X}",
                rom_data.len(),
                HEADER_END
            )));
        }

        let title_bytes = &rom_data[TITLE_START..TITLE_START + 16];
        let title = title_bytes
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect::<String>();

        let cartridge_type_code = rom_data[CARTRIDGE_TYPE_ADDR];
        let (mbc_kind, has_ram, has_battery, has_rtc) = decode_cartridge_type(cartridge_type_code)?;

        let rom_size_code = rom_data[ROM_SIZE_ADDR];
        let rom_banks = match rom_size_code {
            0x00..=0x08 => 2usize << rom_size_code,
            0x52 => 72,
            0x53 => 80,
            0x54 => 96,
            other => {
                return Err(CoreError::InvalidRom(format!(
                    "unsupported ROM size code {:#04X}",
                    other
                )));
            }
        };

        let ram_size_code = rom_data[RAM_SIZE_ADDR];
        let ram_bytes = match ram_size_code {
            0x00 => 0,
            0x01 => 2 * 1024,
            0x02 => 8 * 1024,
            0x03 => 32 * 1024,
            0x04 => 128 * 1024,
            0x05 => 64 * 1024,
            other => {
                return Err(CoreError::InvalidRom(format!(
                    "unsupported RAM size code {:#04X}",
                    other
                )));
            }
        };

        let checksum_ok = verify_header_checksum(rom_data);
        if !checksum_ok {
            log::warn!(
                "cartridge '{}' failed header checksum validation; loading anyway",
                title
            );
        }

        Ok(CartridgeHeader {
            title,
            cartridge_type_code,
            mbc_kind,
            has_ram,
            has_battery,
            has_rtc,
            rom_banks,
            ram_bytes,
            checksum_ok,
        })
    }
}

/// `((sum over 0x134..0x14C of !byte) - 12) & 0xFF == byte[0x14D]`
fn verify_header_checksum(rom_data: &[u8]) -> bool {
    let mut checksum: u8 = 0;
    for &byte in &rom_data[0x0134..=0x014C] {
        checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
    }
    checksum == rom_data[HEADER_CHECKSUM_ADDR]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_rom() -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[TITLE_START..TITLE_START + 4].copy_from_slice(b"TEST");
        rom[CARTRIDGE_TYPE_ADDR] = 0x00; // ROM ONLY
        rom[ROM_SIZE_ADDR] = 0x00; // 32 KiB
        rom[RAM_SIZE_ADDR] = 0x00; // no RAM
        let mut checksum: u8 = 0;
        for &byte in &rom[0x0134..=0x014C] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        rom[HEADER_CHECKSUM_ADDR] = checksum;
        rom
    }

    #[test]
    fn valid_checksum_parses_without_warning_flag() {
        let rom = minimal_rom();
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert!(header.checksum_ok);
        assert_eq!(header.title, "TEST");
        assert_eq!(header.mbc_kind, MbcKind::RomOnly);
        assert_eq!(header.rom_banks, 2);
    }

    #[test]
    fn corrupted_title_byte_fails_checksum_but_still_loads() {
        let mut rom = minimal_rom();
        rom[TITLE_START] ^= 0x01; // flip a bit inside the checksummed range
        let header = CartridgeHeader::parse(&rom).unwrap();
        assert!(!header.checksum_ok);
    }

    #[test]
    fn too_short_rom_is_rejected() {
        let rom = vec![0u8; 0x10];
        assert!(CartridgeHeader::parse(&rom).is_err());
    }
}

fn decode_cartridge_type(code: u8) -> Result<(MbcKind, bool, bool, bool), CoreError> {
    use MbcKind::*;
    Ok(match code {
        0x00 => (RomOnly, false, false, false),
        0x01 => (Mbc1, false, false, false),
        0x02 => (Mbc1, true, false, false),
        0x03 => (Mbc1, true, true, false),
        0x05 => (Mbc2, false, false, false),
        0x06 => (Mbc2, false, true, false), // MBC2's on-chip RAM is always present
        0x08 => (RomOnly, true, false, false),
        0x09 => (RomOnly, true, true, false),
        0x0F => (Mbc3, false, true, true),
        0x10 => (Mbc3, true, true, true),
        0x11 => (Mbc3, false, false, false),
        0x12 => (Mbc3, true, false, false),
        0x13 => (Mbc3, true, true, false),
        0x19 => (Mbc5, false, false, false),
        0x1A => (Mbc5, true, false, false),
        0x1B => (Mbc5, true, true, false),
        0x1C => (Mbc5, false, false, false), // +Rumble
        0x1D => (Mbc5, true, false, false),  // +Rumble+RAM
        0x1E => (Mbc5, true, true, false),   // +Rumble+RAM+BATT
        other => {
            return Err(CoreError::InvalidRom(format!(
                "unsupported cartridge type code {:#04X}",
                other
            )));
        }
    })
}
