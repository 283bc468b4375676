//! Top-level aggregate wiring the CPU together with the memory bus and the
//! three cycle-driven peripherals (`Ppu`, `Apu`, `Timer`) that live as
//! siblings rather than fields of `MemoryBus`, so that stepping one of them
//! never needs a second mutable borrow of the bus it also reads from. Each
//! `step()` call drains the bus's `IoEvent` queue left behind by the CPU's
//! writes, forwards it to whichever peripheral owns that register, steps
//! every peripheral by the cycles the CPU just spent, and republishes their
//! computed register state back onto the bus -- the same resync pattern
//! `Ppu::step` already uses for LY/STAT.

use crate::apu::Apu;
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::error::CoreError;
use crate::joypad::Key;
use crate::memory_bus::MemoryBus;
use crate::memory_map::{DIV_ADDR, TIMA_ADDR};
use crate::ppu::{Ppu, FRAME_BUFFER_SIZE, GB_HEIGHT, GB_WIDTH};
use crate::timer::Timer;

/// Save-state format tag, bumped whenever a section's layout changes.
const SAVE_STATE_MAGIC: &[u8; 4] = b"GBST";
const SAVE_STATE_VERSION: u8 = 1;

/// One full frame: 154 scanlines of 456 dots apiece.
const CYCLES_PER_FRAME: u32 = 70224;

/// Owns every emulated component and drives them through one shared
/// instruction/peripheral step loop. This is the crate's host-facing entry
/// point: load a ROM, feed it input, pull frames and audio out of it.
pub struct Machine {
    cpu: Cpu,
    bus: MemoryBus,
    ppu: Ppu,
    apu: Apu,
    timer: Timer,
    skip_boot_rom: bool,
}

impl Machine {
    /// Creates a machine with no cartridge inserted. `skip_boot_rom` selects
    /// whether the CPU starts at the post-boot-ROM register state (the usual
    /// case absent an actual boot ROM image) or at 0x0000 with registers
    /// zeroed.
    pub fn new(skip_boot_rom: bool) -> Self {
        let mut bus = MemoryBus::new();
        let cpu = Cpu::new(skip_boot_rom);
        if skip_boot_rom {
            Cpu::initialize_post_boot_io(&mut bus);
        }
        Machine {
            cpu,
            bus,
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            skip_boot_rom,
        }
    }

    /// Parses and inserts a cartridge image, replacing any previously
    /// inserted one.
    pub fn load_rom(&mut self, rom_data: &[u8]) -> Result<(), CoreError> {
        let cartridge = Cartridge::load(rom_data)?;
        self.bus.insert_cartridge(cartridge);
        Ok(())
    }

    /// Resets every component to its post-power-on state while keeping the
    /// currently inserted cartridge (battery-backed RAM and all).
    pub fn reset(&mut self) {
        let cartridge = self.bus.take_cartridge();
        self.bus = MemoryBus::new();
        if let Some(cartridge) = cartridge {
            self.bus.insert_cartridge(cartridge);
        }
        let strict_mode = self.cpu.strict_mode();
        self.cpu = Cpu::new(self.skip_boot_rom);
        self.cpu.set_strict_mode(strict_mode);
        if self.skip_boot_rom {
            Cpu::initialize_post_boot_io(&mut self.bus);
        }
        self.ppu = Ppu::new();
        self.apu = Apu::new();
        self.timer = Timer::new();
    }

    /// Opts into treating an unknown opcode as a hard `CoreError::InvalidRom`
    /// instead of a logged-once NOP. Off by default.
    pub fn set_strict_mode(&mut self, strict: bool) {
        self.cpu.set_strict_mode(strict);
    }

    pub fn key_down(&mut self, key: Key) {
        self.bus.key_down(key);
    }

    pub fn key_up(&mut self, key: Key) {
        self.bus.key_up(key);
    }

    /// Runs until a full frame's worth of CPU cycles has elapsed, returning
    /// the number of T-cycles actually executed (never less than
    /// `CYCLES_PER_FRAME`, since the last instruction of a frame may overrun
    /// the boundary slightly).
    pub fn run_frame(&mut self) -> Result<u64, CoreError> {
        let mut cycles_this_frame: u32 = 0;
        while cycles_this_frame < CYCLES_PER_FRAME {
            cycles_this_frame += self.step_instruction()? as u32;
        }
        Ok(cycles_this_frame as u64)
    }

    /// Executes exactly one CPU instruction (or interrupt dispatch, or a
    /// single halted/stopped tick) and advances every peripheral by the same
    /// number of cycles. Exposed for callers that want finer-grained control
    /// than `run_frame`, e.g. a single-step debugger.
    pub fn step_instruction(&mut self) -> Result<u16, CoreError> {
        let executed_cycles = self.cpu.step(&mut self.bus).map_err(|message| {
            if self.cpu.strict_mode() {
                CoreError::InvalidRom(message)
            } else {
                CoreError::ExecutionFault(message)
            }
        })?;

        for event in self.bus.drain_io_events() {
            self.timer.apply_event(event.addr, event.value);
            self.apu.write_byte(event.addr, event.value);
        }
        if self.bus.take_div_reset_pending() {
            self.timer.write_div();
        }

        if self.timer.step(executed_cycles as u32) {
            self.bus.request_interrupt(Timer::INTERRUPT_BIT);
        }
        self.bus.set_io_reg_direct(DIV_ADDR, self.timer.read_div());
        self.bus.set_io_reg_direct(TIMA_ADDR, self.timer.read_tima());

        self.apu.step(executed_cycles as u32);
        self.apu.sync_registers_to_bus(&mut self.bus);

        if let Some(cartridge) = self.bus.cartridge_mut() {
            cartridge.step(executed_cycles as u32);
        }

        self.ppu.step(executed_cycles as u32, &mut self.bus);

        Ok(executed_cycles)
    }

    /// The current contents of the 160x144 frame buffer, one palette index
    /// (0-3) per pixel, row-major.
    pub fn frame_buffer(&self) -> &[u8; FRAME_BUFFER_SIZE] {
        self.ppu.get_frame_buffer()
    }

    pub const SCREEN_WIDTH: usize = GB_WIDTH;
    pub const SCREEN_HEIGHT: usize = GB_HEIGHT;

    /// Drains buffered audio samples into `out`, returning how many were
    /// written. Call every frame (or on a fixed timer) to keep the internal
    /// buffer from growing unbounded.
    pub fn read_audio(&mut self, out: &mut [f32]) -> usize {
        self.apu.read_audio(out)
    }

    /// True if the inserted cartridge has battery-backed RAM worth
    /// persisting between sessions.
    pub fn has_battery_backed_ram(&self) -> bool {
        self.bus
            .cartridge()
            .map(Cartridge::has_battery_backed_ram)
            .unwrap_or(false)
    }

    /// The inserted cartridge's external RAM, for battery-save persistence.
    pub fn cartridge_ram(&self) -> Option<&[u8]> {
        self.bus.cartridge().map(Cartridge::ram_bytes)
    }

    /// Restores external RAM saved by a previous session. No-op if no
    /// cartridge is inserted.
    pub fn load_cartridge_ram(&mut self, bytes: &[u8]) {
        if let Some(cartridge) = self.bus.cartridge_mut() {
            cartridge.load_ram_bytes(bytes);
        }
    }

    /// Serializes the complete machine state -- everything needed to resume
    /// exactly where this call left off, aside from the ROM image itself
    /// (the caller is expected to `load_rom` the same image before calling
    /// `load_state`).
    pub fn save_state(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(SAVE_STATE_MAGIC);
        out.push(SAVE_STATE_VERSION);
        self.cpu.save_state(&mut out);
        self.timer.save_state(&mut out);
        self.ppu.save_state(&mut out);
        self.apu.save_state(&mut out);
        self.bus.save_state(&mut out);
        match self.bus.cartridge() {
            Some(cartridge) => {
                out.push(1);
                let mut cart_bytes = Vec::new();
                cartridge.save_state(&mut cart_bytes);
                out.extend_from_slice(&(cart_bytes.len() as u32).to_le_bytes());
                out.extend_from_slice(&cart_bytes);
            }
            None => out.push(0),
        }
        out
    }

    /// Restores state written by `save_state`. The caller must `load_rom`
    /// the matching ROM image first so the cartridge's MBC variant and RAM
    /// size line up with what was saved.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), CoreError> {
        if data.len() < 5 || &data[0..4] != SAVE_STATE_MAGIC {
            return Err(CoreError::StateCorruption(
                "not a save state produced by this crate".into(),
            ));
        }
        if data[4] != SAVE_STATE_VERSION {
            return Err(CoreError::StateCorruption(format!(
                "unsupported save state version {} (expected {})",
                data[4], SAVE_STATE_VERSION
            )));
        }

        let mut pos = 5;
        pos += self
            .cpu
            .load_state(&data[pos..])
            .map_err(CoreError::StateCorruption)?;
        pos += self
            .timer
            .load_state(&data[pos..])
            .map_err(CoreError::StateCorruption)?;
        pos += self
            .ppu
            .load_state(&data[pos..])
            .map_err(CoreError::StateCorruption)?;
        pos += self
            .apu
            .load_state(&data[pos..])
            .map_err(CoreError::StateCorruption)?;
        pos += self
            .bus
            .load_state(&data[pos..])
            .map_err(CoreError::StateCorruption)?;

        if pos >= data.len() {
            return Err(CoreError::StateCorruption(
                "save state truncated before cartridge section".into(),
            ));
        }
        let has_cartridge = data[pos] != 0;
        pos += 1;
        if has_cartridge {
            if data.len() < pos + 4 {
                return Err(CoreError::StateCorruption(
                    "save state truncated before cartridge length".into(),
                ));
            }
            let cart_len = u32::from_le_bytes(data[pos..pos + 4].try_into().unwrap()) as usize;
            pos += 4;
            if data.len() < pos + cart_len {
                return Err(CoreError::StateCorruption(
                    "save state truncated in cartridge section".into(),
                ));
            }
            let cartridge = self.bus.cartridge_mut().ok_or_else(|| {
                CoreError::StateCorruption(
                    "save state has a cartridge section but none is loaded".into(),
                )
            })?;
            cartridge.load_state(&data[pos..pos + cart_len])?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_rom_with_program(program: &[u8]) -> Vec<u8> {
        let mut rom = vec![0u8; 0x8000];
        rom[0x0100..0x0100 + program.len()].copy_from_slice(program);
        rom[0x0147] = 0x00; // ROM ONLY
        rom[0x0148] = 0x00; // 32 KiB
        rom[0x0149] = 0x00; // no RAM
        let mut checksum: u8 = 0;
        for &byte in &rom[0x0134..=0x014C] {
            checksum = checksum.wrapping_sub(byte).wrapping_sub(1);
        }
        rom[0x014D] = checksum;
        rom
    }

    #[test]
    fn run_frame_reports_exactly_one_frame_of_cycles() {
        // An infinite JR -2 loop (18 FE) so the frame boundary, not program
        // length, decides when run_frame returns.
        let mut machine = Machine::new(true);
        machine.load_rom(&minimal_rom_with_program(&[0x18, 0xFE])).unwrap();
        let cycles = machine.run_frame().unwrap();
        assert!(cycles >= CYCLES_PER_FRAME as u64);
    }

    #[test]
    fn unknown_opcode_does_not_abort_run_frame_by_default() {
        let mut machine = Machine::new(true);
        // 0xD3 (undefined) followed by an infinite JR -2 loop.
        machine
            .load_rom(&minimal_rom_with_program(&[0xD3, 0x18, 0xFE]))
            .unwrap();
        assert!(machine.run_frame().is_ok());
    }

    #[test]
    fn strict_mode_surfaces_unknown_opcode_as_invalid_rom() {
        let mut machine = Machine::new(true);
        machine
            .load_rom(&minimal_rom_with_program(&[0xD3, 0x18, 0xFE]))
            .unwrap();
        machine.set_strict_mode(true);
        let err = machine.step_instruction().unwrap_err();
        assert!(matches!(err, CoreError::InvalidRom(_)));
    }

    #[test]
    fn reset_keeps_the_inserted_cartridge() {
        let mut machine = Machine::new(true);
        machine.load_rom(&minimal_rom_with_program(&[])).unwrap();
        assert!(machine.bus.cartridge().is_some());
        machine.reset();
        assert!(machine.bus.cartridge().is_some());
    }

    #[test]
    fn save_state_then_load_state_round_trips_cpu_registers() {
        let mut machine = Machine::new(true);
        machine
            .load_rom(&minimal_rom_with_program(&[0x3E, 0x77])) // LD A, 0x77
            .unwrap();
        machine.step_instruction().unwrap();

        let saved = machine.save_state();

        let mut restored = Machine::new(true);
        restored
            .load_rom(&minimal_rom_with_program(&[0x3E, 0x77]))
            .unwrap();
        restored.load_state(&saved).unwrap();

        assert_eq!(restored.cpu.registers(), machine.cpu.registers());
        assert_eq!(restored.cpu.pc(), machine.cpu.pc());
    }

    #[test]
    fn load_state_rejects_bad_magic() {
        let mut machine = Machine::new(true);
        let err = machine.load_state(&[0, 0, 0, 0, 0]).unwrap_err();
        assert!(matches!(err, CoreError::StateCorruption(_)));
    }
}
