use crate::cartridge::Cartridge;
use crate::joypad::{Joypad, Key};
use crate::memory_map::*;
use std::fmt;

/// A register write the bus can't fully resolve itself because the
/// register's authoritative state lives in a sibling component (`Timer`,
/// `Apu`). `Machine::step` drains these after each CPU step and forwards
/// them on, the same way the PPU already resyncs LCDC/STAT on every call
/// to `Ppu::step` -- no back-pointer from the bus to its siblings needed.
#[derive(Clone, Copy, Debug)]
pub struct IoEvent {
    pub addr: u16,
    pub value: u8,
}

/// The Game Boy's address space. Owns VRAM/WRAM/OAM/HRAM and the cartridge;
/// defers to `Joypad` for P1 and records everything destined for `Timer`
/// or `Apu` as an `IoEvent` for the caller to forward.
pub struct MemoryBus {
    vram: Box<[u8; VRAM_SIZE]>,
    wram_bank_0: Box<[u8; WRAM_BANK_0_SIZE]>,
    wram_bank_n: Box<[u8; WRAM_BANK_N_SIZE]>,
    oam: Box<[u8; OAM_SIZE]>,
    io_registers: Box<[u8; IO_REGISTERS_SIZE]>,
    hram: Box<[u8; HRAM_SIZE]>,
    interrupt_enable: u8,

    cartridge: Option<Cartridge>,
    pub joypad: Joypad,

    div_reset_pending: bool,
    io_events: Vec<IoEvent>,

    boot_rom_disabled: bool,
}

const SOUND_REGISTERS: std::ops::RangeInclusive<u16> = 0xFF10..=0xFF26;
const TIMER_REGISTERS: [u16; 3] = [TIMA_ADDR, TMA_ADDR, TAC_ADDR];

impl MemoryBus {
    pub fn new() -> Self {
        let mut io_regs = [0u8; IO_REGISTERS_SIZE];
        io_regs[(SC_ADDR - IO_REGISTERS_START) as usize] = 0x7E;
        io_regs[(IF_ADDR - IO_REGISTERS_START) as usize] = 0xE1;
        io_regs[(LCDC_ADDR - IO_REGISTERS_START) as usize] = 0x91;
        io_regs[(STAT_ADDR - IO_REGISTERS_START) as usize] = 0x85;
        io_regs[(BGP_ADDR - IO_REGISTERS_START) as usize] = 0xFC;
        io_regs[(OBP0_ADDR - IO_REGISTERS_START) as usize] = 0xFF;
        io_regs[(OBP1_ADDR - IO_REGISTERS_START) as usize] = 0xFF;
        io_regs[(DMA_ADDR - IO_REGISTERS_START) as usize] = 0xFF;

        let mut bus = MemoryBus {
            vram: Box::new([0; VRAM_SIZE]),
            wram_bank_0: Box::new([0; WRAM_BANK_0_SIZE]),
            wram_bank_n: Box::new([0; WRAM_BANK_N_SIZE]),
            oam: Box::new([0; OAM_SIZE]),
            io_registers: Box::new(io_regs),
            hram: Box::new([0; HRAM_SIZE]),
            interrupt_enable: 0x00,
            cartridge: None,
            joypad: Joypad::new(),
            div_reset_pending: false,
            io_events: Vec::new(),
            boot_rom_disabled: true,
        };

        let joyp_val = bus.joypad.read_p1();
        bus.io_registers[(P1_JOYP_ADDR - IO_REGISTERS_START) as usize] = joyp_val;
        bus
    }

    pub fn insert_cartridge(&mut self, cartridge: Cartridge) {
        self.cartridge = Some(cartridge);
    }

    pub fn cartridge(&self) -> Option<&Cartridge> {
        self.cartridge.as_ref()
    }

    pub fn cartridge_mut(&mut self) -> Option<&mut Cartridge> {
        self.cartridge.as_mut()
    }

    /// Removes the cartridge, leaving the bus with none. Used by `Machine::reset`
    /// to preserve the loaded game across a reset that otherwise rebuilds the bus.
    pub fn take_cartridge(&mut self) -> Option<Cartridge> {
        self.cartridge.take()
    }

    // --- Read/Write ---

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            ROM_BANK_0_START..=ROM_BANK_N_END => self
                .cartridge
                .as_ref()
                .map(|c| c.read_rom(addr))
                .unwrap_or(0xFF),
            VRAM_START..=VRAM_END => self.vram[(addr - VRAM_START) as usize],
            EXT_RAM_START..=EXT_RAM_END => self
                .cartridge
                .as_ref()
                .map(|c| c.read_ext_ram(addr))
                .unwrap_or(0xFF),
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize]
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize]
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.read_byte(addr - 0x2000),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize],
            NOT_USABLE_START..=NOT_USABLE_END => 0xFF,
            IO_REGISTERS_START..=IO_REGISTERS_END => {
                let offset = (addr - IO_REGISTERS_START) as usize;
                match addr {
                    P1_JOYP_ADDR => self.joypad.read_p1(),
                    STAT_ADDR => self.io_registers[offset] | 0x80,
                    _ => self.io_registers[offset],
                }
            }
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize],
            INTERRUPT_ENABLE_REGISTER => self.interrupt_enable,
        }
    }

    pub fn write_byte(&mut self, addr: u16, value: u8) {
        match addr {
            0x0000..=0x7FFF => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.write_rom_control(addr, value);
                }
            }
            VRAM_START..=VRAM_END => self.vram[(addr - VRAM_START) as usize] = value,
            EXT_RAM_START..=EXT_RAM_END => {
                if let Some(cart) = self.cartridge.as_mut() {
                    cart.write_ext_ram(addr, value);
                }
            }
            WRAM_BANK_0_START..=WRAM_BANK_0_END => {
                self.wram_bank_0[(addr - WRAM_BANK_0_START) as usize] = value;
            }
            WRAM_BANK_N_START..=WRAM_BANK_N_END => {
                self.wram_bank_n[(addr - WRAM_BANK_N_START) as usize] = value;
            }
            ECHO_RAM_START..=ECHO_RAM_END => self.write_byte(addr - 0x2000, value),
            OAM_START..=OAM_END => self.oam[(addr - OAM_START) as usize] = value,
            NOT_USABLE_START..=NOT_USABLE_END => {}
            IO_REGISTERS_START..=IO_REGISTERS_END => {
                let offset = (addr - IO_REGISTERS_START) as usize;
                match addr {
                    P1_JOYP_ADDR => self.joypad.write_p1(value),
                    DIV_ADDR => {
                        self.io_registers[offset] = 0;
                        self.div_reset_pending = true;
                    }
                    IF_ADDR => {
                        self.io_registers[offset] = (value & 0x1F) | (self.io_registers[offset] & 0xE0);
                    }
                    STAT_ADDR => {
                        self.io_registers[offset] =
                            (value & 0b0111_1000) | (self.io_registers[offset] & 0b1000_0111);
                    }
                    DMA_ADDR => {
                        self.io_registers[offset] = value;
                        self.perform_dma_transfer(value);
                    }
                    0xFF50 => {
                        self.io_registers[offset] = value;
                        if value != 0 {
                            self.boot_rom_disabled = true;
                        }
                    }
                    _ if TIMER_REGISTERS.contains(&addr) || SOUND_REGISTERS.contains(&addr) => {
                        self.io_registers[offset] = value;
                        self.io_events.push(IoEvent { addr, value });
                    }
                    _ if (WAVE_PATTERN_RAM_START..=WAVE_PATTERN_RAM_END).contains(&addr) => {
                        self.io_registers[offset] = value;
                        self.io_events.push(IoEvent { addr, value });
                    }
                    _ => self.io_registers[offset] = value,
                }
            }
            HRAM_START..=HRAM_END => self.hram[(addr - HRAM_START) as usize] = value,
            INTERRUPT_ENABLE_REGISTER => self.interrupt_enable = value & 0x1F,
        }
    }

    /// Drains pending writes destined for `Timer`/`Apu`. Called once per
    /// CPU step by `Machine`.
    pub fn drain_io_events(&mut self) -> Vec<IoEvent> {
        std::mem::take(&mut self.io_events)
    }

    pub fn take_div_reset_pending(&mut self) -> bool {
        std::mem::replace(&mut self.div_reset_pending, false)
    }

    pub fn request_interrupt(&mut self, bit: u8) {
        if bit < 5 {
            let offset = (IF_ADDR - IO_REGISTERS_START) as usize;
            self.io_registers[offset] |= 1 << bit;
        }
    }

    pub fn read_word(&self, addr: u16) -> u16 {
        let low = self.read_byte(addr) as u16;
        let high = self.read_byte(addr.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    pub fn write_word(&mut self, addr: u16, value: u16) {
        let low = (value & 0xFF) as u8;
        let high = (value >> 8) as u8;
        self.write_byte(addr, low);
        self.write_byte(addr.wrapping_add(1), high);
    }

    fn perform_dma_transfer(&mut self, source_high_byte: u8) {
        let source_start_addr = (source_high_byte as u16) << 8;
        if source_start_addr >= 0xFE00 {
            log::warn!(
                "DMA transfer requested from restricted area {:#06X}",
                source_start_addr
            );
            return;
        }
        for i in 0..OAM_SIZE {
            let byte_to_copy = self.read_byte(source_start_addr + i as u16);
            self.oam[i] = byte_to_copy;
        }
    }

    pub fn key_down(&mut self, key: Key) {
        if self.joypad.key_down(key) {
            self.request_interrupt(JOYPAD_INTERRUPT_BIT);
        }
        let p1 = self.joypad.read_p1();
        self.io_registers[(P1_JOYP_ADDR - IO_REGISTERS_START) as usize] = p1;
    }

    pub fn key_up(&mut self, key: Key) {
        self.joypad.key_up(key);
        let p1 = self.joypad.read_p1();
        self.io_registers[(P1_JOYP_ADDR - IO_REGISTERS_START) as usize] = p1;
    }

    pub fn get_io_reg(&self, addr: u16) -> u8 {
        if (IO_REGISTERS_START..=IO_REGISTERS_END).contains(&addr) {
            self.io_registers[(addr - IO_REGISTERS_START) as usize]
        } else if addr == INTERRUPT_ENABLE_REGISTER {
            self.interrupt_enable
        } else {
            0xFF
        }
    }

    /// Writes a register byte without going through `write_byte`'s side
    /// effects. Used by `Ppu`/`Timer`/`Apu` to publish their computed
    /// register state back onto the bus.
    pub fn set_io_reg_direct(&mut self, addr: u16, value: u8) {
        if (IO_REGISTERS_START..=IO_REGISTERS_END).contains(&addr) {
            self.io_registers[(addr - IO_REGISTERS_START) as usize] = value;
        } else if addr == INTERRUPT_ENABLE_REGISTER {
            self.interrupt_enable = value & 0x1F;
        }
    }

    pub fn get_vram(&self) -> &[u8; VRAM_SIZE] {
        &self.vram
    }

    pub fn get_oam(&self) -> &[u8; OAM_SIZE] {
        &self.oam
    }

    pub fn boot_rom_disabled(&self) -> bool {
        self.boot_rom_disabled
    }

    /// Serializes every RAM region the bus owns directly (VRAM/WRAM/OAM/IO
    /// registers/HRAM/IE) plus the joypad. The cartridge is serialized
    /// separately by `Machine::save_state` since it owns its own ROM image.
    pub fn save_state(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.vram.as_ref());
        out.extend_from_slice(self.wram_bank_0.as_ref());
        out.extend_from_slice(self.wram_bank_n.as_ref());
        out.extend_from_slice(self.oam.as_ref());
        out.extend_from_slice(self.io_registers.as_ref());
        out.extend_from_slice(self.hram.as_ref());
        out.push(self.interrupt_enable);
        out.push(self.boot_rom_disabled as u8);
        self.joypad.save_state(out);
    }

    pub fn load_state(&mut self, data: &[u8]) -> Result<usize, String> {
        let fixed_len = VRAM_SIZE + WRAM_BANK_0_SIZE + WRAM_BANK_N_SIZE + OAM_SIZE
            + IO_REGISTERS_SIZE + HRAM_SIZE + 1 + 1;
        if data.len() < fixed_len {
            return Err("memory bus state truncated".to_string());
        }
        let mut pos = 0;
        self.vram.copy_from_slice(&data[pos..pos + VRAM_SIZE]);
        pos += VRAM_SIZE;
        self.wram_bank_0.copy_from_slice(&data[pos..pos + WRAM_BANK_0_SIZE]);
        pos += WRAM_BANK_0_SIZE;
        self.wram_bank_n.copy_from_slice(&data[pos..pos + WRAM_BANK_N_SIZE]);
        pos += WRAM_BANK_N_SIZE;
        self.oam.copy_from_slice(&data[pos..pos + OAM_SIZE]);
        pos += OAM_SIZE;
        self.io_registers.copy_from_slice(&data[pos..pos + IO_REGISTERS_SIZE]);
        pos += IO_REGISTERS_SIZE;
        self.hram.copy_from_slice(&data[pos..pos + HRAM_SIZE]);
        pos += HRAM_SIZE;
        self.interrupt_enable = data[pos];
        pos += 1;
        self.boot_rom_disabled = data[pos] != 0;
        pos += 1;
        pos += self.joypad.load_state(&data[pos..])?;
        self.div_reset_pending = false;
        self.io_events.clear();
        Ok(pos)
    }
}

impl fmt::Debug for MemoryBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryBus")
            .field("IE", &format_args!("{:#04X}", self.interrupt_enable))
            .field("IF", &format_args!("{:#04X}", self.get_io_reg(IF_ADDR)))
            .field("joypad", &self.joypad)
            .finish_non_exhaustive()
    }
}
