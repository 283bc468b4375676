//! Opcode dispatch tables.
//!
//! `INSTRUCTIONS` covers the unprefixed opcode space, `CB_INSTRUCTIONS`
//! the `CB`-prefixed bit/rotate space. Both are built once behind
//! `lazy_static` since a `[Instruction; 256]` of function pointers can't
//! be assembled in a `const` context on stable without a lot of
//! boilerplate, and the table is read far more often than built.
//!
//! `cycles` on a table entry is the *base* T-cycle cost of the
//! instruction (for conditional branches, the cost taken when the
//! condition is false). `Cpu::step` adds whatever the `execute` fn
//! returns as `additional` on top of that base. For CB-prefixed ops the
//! base is always 4 (the prefix fetch itself, accounted for in
//! `Cpu::step`) and the table's `cycles` field holds the extra cost of
//! the specific bit/rotate operation.

use super::{Cpu, CpuResult};
use crate::memory_bus::MemoryBus;
use lazy_static::lazy_static;

#[derive(Clone)]
pub struct Instruction {
    pub mnemonic: &'static str,
    pub length: u8,
    pub cycles: u8,
    pub execute: fn(&mut Cpu, &mut MemoryBus) -> CpuResult<u16>,
}

impl Instruction {
    pub const fn new(
        mnemonic: &'static str,
        length: u8,
        cycles: u8,
        execute: fn(&mut Cpu, &mut MemoryBus) -> CpuResult<u16>,
    ) -> Self {
        Instruction {
            mnemonic,
            length,
            cycles,
            execute,
        }
    }

    pub const fn invalid() -> Self {
        Instruction {
            mnemonic: "INVALID",
            length: 1,
            cycles: 4,
            execute: Cpu::handle_invalid_opcode,
        }
    }
}

macro_rules! instr {
    ($mne:expr, $len:expr, $cyc:expr, $exec:expr) => {
        Instruction::new($mne, $len, $cyc, $exec)
    };
}
macro_rules! invalid {
    () => {
        Instruction::invalid()
    };
}

lazy_static! {
    pub static ref INSTRUCTIONS: [Instruction; 256] = [
        instr!("NOP", 1, 4, Cpu::op_nop),               // 00 NOP
        instr!("LD BC, d16", 3, 12, Cpu::op_ld_bc_d16), // 01 LD BC, d16
        instr!("LD (BC), A", 1, 8, Cpu::op_ld_bc_a),    // 02 LD (BC), A
        instr!("INC BC", 1, 8, Cpu::op_inc_bc),         // 03 INC BC
        instr!("INC B", 1, 4, Cpu::op_inc_b),           // 04 INC B
        instr!("DEC B", 1, 4, Cpu::op_dec_b),           // 05 DEC B
        instr!("LD B, d8", 2, 8, Cpu::op_ld_b_d8),      // 06 LD B, d8
        instr!("RLCA", 1, 4, Cpu::op_rlca),             // 07 RLCA
        instr!("LD (a16), SP", 3, 20, Cpu::op_ld_a16_sp), // 08 LD (a16), SP
        instr!("ADD HL, BC", 1, 8, Cpu::op_add_hl_bc),   // 09 ADD HL, BC
        instr!("LD A, (BC)", 1, 8, Cpu::op_ld_a_bc),    // 0A LD A, (BC)
        instr!("DEC BC", 1, 8, Cpu::op_dec_bc),         // 0B DEC BC
        instr!("INC C", 1, 4, Cpu::op_inc_c),           // 0C INC C
        instr!("DEC C", 1, 4, Cpu::op_dec_c),           // 0D DEC C
        instr!("LD C, d8", 2, 8, Cpu::op_ld_c_d8),      // 0E LD C, d8
        instr!("RRCA", 1, 4, Cpu::op_rrca),             // 0F RRCA
        // --- 0x10 ---
        instr!("STOP", 2, 4, Cpu::op_stop),             // 10 STOP 00
        instr!("LD DE, d16", 3, 12, Cpu::op_ld_de_d16), // 11 LD DE, d16
        instr!("LD (DE), A", 1, 8, Cpu::op_ld_de_a),    // 12 LD (DE), A
        instr!("INC DE", 1, 8, Cpu::op_inc_de),         // 13 INC DE
        instr!("INC D", 1, 4, Cpu::op_inc_d),           // 14 INC D
        instr!("DEC D", 1, 4, Cpu::op_dec_d),           // 15 DEC D
        instr!("LD D, d8", 2, 8, Cpu::op_ld_d_d8),      // 16 LD D, d8
        instr!("RLA", 1, 4, Cpu::op_rla),               // 17 RLA
        instr!("JR r8", 2, 12, Cpu::op_jr_r8),          // 18 JR r8 (Always takes 12 cycles)
        instr!("ADD HL, DE", 1, 8, Cpu::op_add_hl_de),   // 19 ADD HL, DE
        instr!("LD A, (DE)", 1, 8, Cpu::op_ld_a_de),    // 1A LD A, (DE)
        instr!("DEC DE", 1, 8, Cpu::op_dec_de),         // 1B DEC DE
        instr!("INC E", 1, 4, Cpu::op_inc_e),           // 1C INC E
        instr!("DEC E", 1, 4, Cpu::op_dec_e),           // 1D DEC E
        instr!("LD E, d8", 2, 8, Cpu::op_ld_e_d8),      // 1E LD E, d8
        instr!("RRA", 1, 4, Cpu::op_rra),               // 1F RRA
        // --- 0x20 --- JR NZ,r8 (8 cycles if no jump, 12 if jump)
        instr!("JR NZ, r8", 2, 8, Cpu::op_jr_nz_r8),    // 20 JR NZ, r8
        instr!("LD HL, d16", 3, 12, Cpu::op_ld_hl_d16), // 21 LD HL, d16
        instr!("LD (HL+), A", 1, 8, Cpu::op_ld_hli_a),  // 22 LD (HL+), A
        instr!("INC HL", 1, 8, Cpu::op_inc_hl),         // 23 INC HL
        instr!("INC H", 1, 4, Cpu::op_inc_h),           // 24 INC H
        instr!("DEC H", 1, 4, Cpu::op_dec_h),           // 25 DEC H
        instr!("LD H, d8", 2, 8, Cpu::op_ld_h_d8),      // 26 LD H, d8
        instr!("DAA", 1, 4, Cpu::op_daa),               // 27 DAA
        // --- 0x28 --- JR Z,r8 (8 cycles if no jump, 12 if jump)
        instr!("JR Z, r8", 2, 8, Cpu::op_jr_z_r8),      // 28 JR Z, r8
        instr!("ADD HL, HL", 1, 8, Cpu::op_add_hl_hl),   // 29 ADD HL, HL
        instr!("LD A, (HL+)", 1, 8, Cpu::op_ld_a_hli),  // 2A LD A, (HL+)
        instr!("DEC HL", 1, 8, Cpu::op_dec_hl),         // 2B DEC HL
        instr!("INC L", 1, 4, Cpu::op_inc_l),           // 2C INC L
        instr!("DEC L", 1, 4, Cpu::op_dec_l),           // 2D DEC L
        instr!("LD L, d8", 2, 8, Cpu::op_ld_l_d8),      // 2E LD L, d8
        instr!("CPL", 1, 4, Cpu::op_cpl),               // 2F CPL
        // --- 0x30 --- JR NC,r8 (8 cycles if no jump, 12 if jump)
        instr!("JR NC, r8", 2, 8, Cpu::op_jr_nc_r8),    // 30 JR NC, r8
        instr!("LD SP, d16", 3, 12, Cpu::op_ld_sp_d16), // 31 LD SP, d16
        instr!("LD (HL-), A", 1, 8, Cpu::op_ld_hld_a),  // 32 LD (HL-), A
        instr!("INC SP", 1, 8, Cpu::op_inc_sp),         // 33 INC SP
        instr!("INC (HL)", 1, 12, Cpu::op_inc_hlp),     // 34 INC (HL)
        instr!("DEC (HL)", 1, 12, Cpu::op_dec_hlp),     // 35 DEC (HL)
        instr!("LD (HL), d8", 2, 12, Cpu::op_ld_hlp_d8), // 36 LD (HL), d8
        instr!("SCF", 1, 4, Cpu::op_scf),               // 37 SCF
        // --- 0x38 --- JR C,r8 (8 cycles if no jump, 12 if jump)
        instr!("JR C, r8", 2, 8, Cpu::op_jr_c_r8),      // 38 JR C, r8
        instr!("ADD HL, SP", 1, 8, Cpu::op_add_hl_sp),   // 39 ADD HL, SP
        instr!("LD A, (HL-)", 1, 8, Cpu::op_ld_a_hld),  // 3A LD A, (HL-)
        instr!("DEC SP", 1, 8, Cpu::op_dec_sp),         // 3B DEC SP
        instr!("INC A", 1, 4, Cpu::op_inc_a),           // 3C INC A
        instr!("DEC A", 1, 4, Cpu::op_dec_a),           // 3D DEC A
        instr!("LD A, d8", 2, 8, Cpu::op_ld_a_d8),      // 3E LD A, d8
        instr!("CCF", 1, 4, Cpu::op_ccf),               // 3F CCF

        // --- 0x40..0x7F: LD r, r' ---
        // 0x40 - 0x47 : LD B, r
        instr!("LD B, B", 1, 4, Cpu::op_ld_b_b),
        instr!("LD B, C", 1, 4, Cpu::op_ld_b_c),
        instr!("LD B, D", 1, 4, Cpu::op_ld_b_d),
        instr!("LD B, E", 1, 4, Cpu::op_ld_b_e),
        instr!("LD B, H", 1, 4, Cpu::op_ld_b_h),
        instr!("LD B, L", 1, 4, Cpu::op_ld_b_l),
        instr!("LD B, (HL)", 1, 8, Cpu::op_ld_b_hlp),
        instr!("LD B, A", 1, 4, Cpu::op_ld_b_a),
        // 0x48 - 0x4F : LD C, r
        instr!("LD C, B", 1, 4, Cpu::op_ld_c_b),
        instr!("LD C, C", 1, 4, Cpu::op_ld_c_c),
        instr!("LD C, D", 1, 4, Cpu::op_ld_c_d),
        instr!("LD C, E", 1, 4, Cpu::op_ld_c_e),
        instr!("LD C, H", 1, 4, Cpu::op_ld_c_h),
        instr!("LD C, L", 1, 4, Cpu::op_ld_c_l),
        instr!("LD C, (HL)", 1, 8, Cpu::op_ld_c_hlp),
        instr!("LD C, A", 1, 4, Cpu::op_ld_c_a),
        // 0x50 - 0x57 : LD D, r
        instr!("LD D, B", 1, 4, Cpu::op_ld_d_b),
        instr!("LD D, C", 1, 4, Cpu::op_ld_d_c),
        instr!("LD D, D", 1, 4, Cpu::op_ld_d_d),
        instr!("LD D, E", 1, 4, Cpu::op_ld_d_e),
        instr!("LD D, H", 1, 4, Cpu::op_ld_d_h),
        instr!("LD D, L", 1, 4, Cpu::op_ld_d_l),
        instr!("LD D, (HL)", 1, 8, Cpu::op_ld_d_hlp),
        instr!("LD D, A", 1, 4, Cpu::op_ld_d_a),
        // 0x58 - 0x5F : LD E, r
        instr!("LD E, B", 1, 4, Cpu::op_ld_e_b),
        instr!("LD E, C", 1, 4, Cpu::op_ld_e_c),
        instr!("LD E, D", 1, 4, Cpu::op_ld_e_d),
        instr!("LD E, E", 1, 4, Cpu::op_ld_e_e),
        instr!("LD E, H", 1, 4, Cpu::op_ld_e_h),
        instr!("LD E, L", 1, 4, Cpu::op_ld_e_l),
        instr!("LD E, (HL)", 1, 8, Cpu::op_ld_e_hlp),
        instr!("LD E, A", 1, 4, Cpu::op_ld_e_a),
        // 0x60 - 0x67 : LD H, r
        instr!("LD H, B", 1, 4, Cpu::op_ld_h_b),
        instr!("LD H, C", 1, 4, Cpu::op_ld_h_c),
        instr!("LD H, D", 1, 4, Cpu::op_ld_h_d),
        instr!("LD H, E", 1, 4, Cpu::op_ld_h_e),
        instr!("LD H, H", 1, 4, Cpu::op_ld_h_h),
        instr!("LD H, L", 1, 4, Cpu::op_ld_h_l),
        instr!("LD H, (HL)", 1, 8, Cpu::op_ld_h_hlp),
        instr!("LD H, A", 1, 4, Cpu::op_ld_h_a),
        // 0x68 - 0x6F : LD L, r
        instr!("LD L, B", 1, 4, Cpu::op_ld_l_b),
        instr!("LD L, C", 1, 4, Cpu::op_ld_l_c),
        instr!("LD L, D", 1, 4, Cpu::op_ld_l_d),
        instr!("LD L, E", 1, 4, Cpu::op_ld_l_e),
        instr!("LD L, H", 1, 4, Cpu::op_ld_l_h),
        instr!("LD L, L", 1, 4, Cpu::op_ld_l_l),
        instr!("LD L, (HL)", 1, 8, Cpu::op_ld_l_hlp),
        instr!("LD L, A", 1, 4, Cpu::op_ld_l_a),
        // 0x70 - 0x77 : LD (HL), r
        instr!("LD (HL), B", 1, 8, Cpu::op_ld_hlp_b),
        instr!("LD (HL), C", 1, 8, Cpu::op_ld_hlp_c),
        instr!("LD (HL), D", 1, 8, Cpu::op_ld_hlp_d),
        instr!("LD (HL), E", 1, 8, Cpu::op_ld_hlp_e),
        instr!("LD (HL), H", 1, 8, Cpu::op_ld_hlp_h),
        instr!("LD (HL), L", 1, 8, Cpu::op_ld_hlp_l),
        instr!("HALT", 1, 4, Cpu::op_halt),             // 76 HALT
        instr!("LD (HL), A", 1, 8, Cpu::op_ld_hlp_a),
        // 0x78 - 0x7F : LD A, r
        instr!("LD A, B", 1, 4, Cpu::op_ld_a_b),
        instr!("LD A, C", 1, 4, Cpu::op_ld_a_c),
        instr!("LD A, D", 1, 4, Cpu::op_ld_a_d),
        instr!("LD A, E", 1, 4, Cpu::op_ld_a_e),
        instr!("LD A, H", 1, 4, Cpu::op_ld_a_h),
        instr!("LD A, L", 1, 4, Cpu::op_ld_a_l),
        instr!("LD A, (HL)", 1, 8, Cpu::op_ld_a_hlp),
        instr!("LD A, A", 1, 4, Cpu::op_ld_a_a),

        // --- 0x80..0xBF: ALU A, r ---
        // 0x80 - 0x87 : ADD A, r
        instr!("ADD A, B", 1, 4, Cpu::op_add_a_b),
        instr!("ADD A, C", 1, 4, Cpu::op_add_a_c),
        instr!("ADD A, D", 1, 4, Cpu::op_add_a_d),
        instr!("ADD A, E", 1, 4, Cpu::op_add_a_e),
        instr!("ADD A, H", 1, 4, Cpu::op_add_a_h),
        instr!("ADD A, L", 1, 4, Cpu::op_add_a_l),
        instr!("ADD A, (HL)", 1, 8, Cpu::op_add_a_hlp),
        instr!("ADD A, A", 1, 4, Cpu::op_add_a_a),
        // 0x88 - 0x8F : ADC A, r
        instr!("ADC A, B", 1, 4, Cpu::op_adc_a_b),
        instr!("ADC A, C", 1, 4, Cpu::op_adc_a_c),
        instr!("ADC A, D", 1, 4, Cpu::op_adc_a_d),
        instr!("ADC A, E", 1, 4, Cpu::op_adc_a_e),
        instr!("ADC A, H", 1, 4, Cpu::op_adc_a_h),
        instr!("ADC A, L", 1, 4, Cpu::op_adc_a_l),
        instr!("ADC A, (HL)", 1, 8, Cpu::op_adc_a_hlp),
        instr!("ADC A, A", 1, 4, Cpu::op_adc_a_a),
        // 0x90 - 0x97 : SUB A, r
        instr!("SUB A, B", 1, 4, Cpu::op_sub_a_b),
        instr!("SUB A, C", 1, 4, Cpu::op_sub_a_c),
        instr!("SUB A, D", 1, 4, Cpu::op_sub_a_d),
        instr!("SUB A, E", 1, 4, Cpu::op_sub_a_e),
        instr!("SUB A, H", 1, 4, Cpu::op_sub_a_h),
        instr!("SUB A, L", 1, 4, Cpu::op_sub_a_l),
        instr!("SUB A, (HL)", 1, 8, Cpu::op_sub_a_hlp),
        instr!("SUB A, A", 1, 4, Cpu::op_sub_a_a),
        // 0x98 - 0x9F : SBC A, r
        instr!("SBC A, B", 1, 4, Cpu::op_sbc_a_b),
        instr!("SBC A, C", 1, 4, Cpu::op_sbc_a_c),
        instr!("SBC A, D", 1, 4, Cpu::op_sbc_a_d),
        instr!("SBC A, E", 1, 4, Cpu::op_sbc_a_e),
        instr!("SBC A, H", 1, 4, Cpu::op_sbc_a_h),
        instr!("SBC A, L", 1, 4, Cpu::op_sbc_a_l),
        instr!("SBC A, (HL)", 1, 8, Cpu::op_sbc_a_hlp),
        instr!("SBC A, A", 1, 4, Cpu::op_sbc_a_a),
        // 0xA0 - 0xA7 : AND A, r
        instr!("AND A, B", 1, 4, Cpu::op_and_a_b),
        instr!("AND A, C", 1, 4, Cpu::op_and_a_c),
        instr!("AND A, D", 1, 4, Cpu::op_and_a_d),
        instr!("AND A, E", 1, 4, Cpu::op_and_a_e),
        instr!("AND A, H", 1, 4, Cpu::op_and_a_h),
        instr!("AND A, L", 1, 4, Cpu::op_and_a_l),
        instr!("AND A, (HL)", 1, 8, Cpu::op_and_a_hlp),
        instr!("AND A, A", 1, 4, Cpu::op_and_a_a),
        // 0xA8 - 0xAF : XOR A, r
        instr!("XOR A, B", 1, 4, Cpu::op_xor_a_b),
        instr!("XOR A, C", 1, 4, Cpu::op_xor_a_c),
        instr!("XOR A, D", 1, 4, Cpu::op_xor_a_d),
        instr!("XOR A, E", 1, 4, Cpu::op_xor_a_e),
        instr!("XOR A, H", 1, 4, Cpu::op_xor_a_h),
        instr!("XOR A, L", 1, 4, Cpu::op_xor_a_l),
        instr!("XOR A, (HL)", 1, 8, Cpu::op_xor_a_hlp),
        instr!("XOR A, A", 1, 4, Cpu::op_xor_a_a),
        // 0xB0 - 0xB7 : OR A, r
        instr!("OR A, B", 1, 4, Cpu::op_or_a_b),
        instr!("OR A, C", 1, 4, Cpu::op_or_a_c),
        instr!("OR A, D", 1, 4, Cpu::op_or_a_d),
        instr!("OR A, E", 1, 4, Cpu::op_or_a_e),
        instr!("OR A, H", 1, 4, Cpu::op_or_a_h),
        instr!("OR A, L", 1, 4, Cpu::op_or_a_l),
        instr!("OR A, (HL)", 1, 8, Cpu::op_or_a_hlp),
        instr!("OR A, A", 1, 4, Cpu::op_or_a_a),
        // 0xB8 - 0xBF : CP A, r
        instr!("CP A, B", 1, 4, Cpu::op_cp_a_b),
        instr!("CP A, C", 1, 4, Cpu::op_cp_a_c),
        instr!("CP A, D", 1, 4, Cpu::op_cp_a_d),
        instr!("CP A, E", 1, 4, Cpu::op_cp_a_e),
        instr!("CP A, H", 1, 4, Cpu::op_cp_a_h),
        instr!("CP A, L", 1, 4, Cpu::op_cp_a_l),
        instr!("CP A, (HL)", 1, 8, Cpu::op_cp_a_hlp),
        instr!("CP A, A", 1, 4, Cpu::op_cp_a_a),

        // --- 0xC0 --- RET NZ (8 cycles if no return, 20 if return)
        instr!("RET NZ", 1, 8, Cpu::op_ret_nz),         // C0 RET NZ
        instr!("POP BC", 1, 12, Cpu::op_pop_bc),        // C1 POP BC
        // --- 0xC2 --- JP NZ,a16 (12 cycles if no jump, 16 if jump)
        instr!("JP NZ, a16", 3, 12, Cpu::op_jp_nz_a16), // C2 JP NZ, a16
        instr!("JP a16", 3, 16, Cpu::op_jp_a16),        // C3 JP a16
        // --- 0xC4 --- CALL NZ,a16 (12 cycles if no call, 24 if call)
        instr!("CALL NZ, a16", 3, 12, Cpu::op_call_nz_a16), // C4 CALL NZ, a16
        instr!("PUSH BC", 1, 16, Cpu::op_push_bc),      // C5 PUSH BC
        instr!("ADD A, d8", 2, 8, Cpu::op_add_a_d8),    // C6 ADD A, d8
        instr!("RST 00H", 1, 16, Cpu::op_rst_00h),      // C7 RST 00H
        // --- 0xC8 --- RET Z (8 cycles if no return, 20 if return)
        instr!("RET Z", 1, 8, Cpu::op_ret_z),           // C8 RET Z
        instr!("RET", 1, 16, Cpu::op_ret),              // C9 RET
        // --- 0xCA --- JP Z,a16 (12 cycles if no jump, 16 if jump)
        instr!("JP Z, a16", 3, 12, Cpu::op_jp_z_a16),   // CA JP Z, a16
        instr!("PREFIX CB", 2, 4, Cpu::op_prefix_cb),   // CB PREFIX CB (2 bytes: prefix + sub-opcode)
        // --- 0xCC --- CALL Z,a16 (12 cycles if no call, 24 if call)
        instr!("CALL Z, a16", 3, 12, Cpu::op_call_z_a16), // CC CALL Z, a16
        instr!("CALL a16", 3, 24, Cpu::op_call_a16),    // CD CALL a16
        instr!("ADC A, d8", 2, 8, Cpu::op_adc_a_d8),    // CE ADC A, d8
        instr!("RST 08H", 1, 16, Cpu::op_rst_08h),      // CF RST 08H

        // --- 0xD0 --- RET NC (8 cycles if no return, 20 if return)
        instr!("RET NC", 1, 8, Cpu::op_ret_nc),         // D0 RET NC
        instr!("POP DE", 1, 12, Cpu::op_pop_de),        // D1 POP DE
        // --- 0xD2 --- JP NC,a16 (12 cycles if no jump, 16 if jump)
        instr!("JP NC, a16", 3, 12, Cpu::op_jp_nc_a16), // D2 JP NC, a16
        invalid!(),                                     // D3 Invalid
        // --- 0xD4 --- CALL NC,a16 (12 cycles if no call, 24 if call)
        instr!("CALL NC, a16", 3, 12, Cpu::op_call_nc_a16), // D4 CALL NC, a16
        instr!("PUSH DE", 1, 16, Cpu::op_push_de),      // D5 PUSH DE
        instr!("SUB A, d8", 2, 8, Cpu::op_sub_a_d8),    // D6 SUB A, d8
        instr!("RST 10H", 1, 16, Cpu::op_rst_10h),      // D7 RST 10H
        // --- 0xD8 --- RET C (8 cycles if no return, 20 if return)
        instr!("RET C", 1, 8, Cpu::op_ret_c),           // D8 RET C
        instr!("RETI", 1, 16, Cpu::op_reti),            // D9 RETI
        // --- 0xDA --- JP C,a16 (12 cycles if no jump, 16 if jump)
        instr!("JP C, a16", 3, 12, Cpu::op_jp_c_a16),   // DA JP C, a16
        invalid!(),                                     // DB Invalid
        // --- 0xDC --- CALL C,a16 (12 cycles if no call, 24 if call)
        instr!("CALL C, a16", 3, 12, Cpu::op_call_c_a16), // DC CALL C, a16
        invalid!(),                                     // DD Invalid
        instr!("SBC A, d8", 2, 8, Cpu::op_sbc_a_d8),    // DE SBC A, d8
        instr!("RST 18H", 1, 16, Cpu::op_rst_18h),      // DF RST 18H

        // --- 0xE0 ---
        instr!("LDH (a8), A", 2, 12, Cpu::op_ldh_a8_a), // E0 LDH (a8), A
        instr!("POP HL", 1, 12, Cpu::op_pop_hl),        // E1 POP HL
        instr!("LD (C), A", 1, 8, Cpu::op_ld_cp_a),     // E2 LD (C), A ; Note: Mnemonic uses C not (C)
        invalid!(),                                     // E3 Invalid
        invalid!(),                                     // E4 Invalid
        instr!("PUSH HL", 1, 16, Cpu::op_push_hl),      // E5 PUSH HL
        instr!("AND A, d8", 2, 8, Cpu::op_and_a_d8),    // E6 AND A, d8
        instr!("RST 20H", 1, 16, Cpu::op_rst_20h),      // E7 RST 20H
        instr!("ADD SP, r8", 2, 16, Cpu::op_add_sp_r8), // E8 ADD SP, r8
        instr!("JP HL", 1, 4, Cpu::op_jp_hl),           // E9 JP HL ; Mnemonic sometimes (HL)
        instr!("LD (a16), A", 3, 16, Cpu::op_ld_a16_a), // EA LD (a16), A
        invalid!(),                                     // EB Invalid
        invalid!(),                                     // EC Invalid
        invalid!(),                                     // ED Invalid
        instr!("XOR A, d8", 2, 8, Cpu::op_xor_a_d8),    // EE XOR A, d8
        instr!("RST 28H", 1, 16, Cpu::op_rst_28h),      // EF RST 28H

        // --- 0xF0 ---
        instr!("LDH A, (a8)", 2, 12, Cpu::op_ldh_a_a8), // F0 LDH A, (a8)
        instr!("POP AF", 1, 12, Cpu::op_pop_af),        // F1 POP AF
        instr!("LD A, (C)", 1, 8, Cpu::op_ld_a_cp),     // F2 LD A, (C) ; Note: Mnemonic uses C not (C)
        instr!("DI", 1, 4, Cpu::op_di),                 // F3 DI
        invalid!(),                                     // F4 Invalid
        instr!("PUSH AF", 1, 16, Cpu::op_push_af),      // F5 PUSH AF
        instr!("OR A, d8", 2, 8, Cpu::op_or_a_d8),      // F6 OR A, d8
        instr!("RST 30H", 1, 16, Cpu::op_rst_30h),      // F7 RST 30H
        instr!("LD HL, SP+r8", 2, 12, Cpu::op_ld_hl_sp_r8), // F8 LD HL, SP+r8
        instr!("LD SP, HL", 1, 8, Cpu::op_ld_sp_hl),    // F9 LD SP, HL
        instr!("LD A, (a16)", 3, 16, Cpu::op_ld_a_a16), // FA LD A, (a16)
        instr!("EI", 1, 4, Cpu::op_ei),                 // FB EI
        invalid!(),                                     // FC Invalid
        invalid!(),                                     // FD Invalid
        instr!("CP A, d8", 2, 8, Cpu::op_cp_a_d8),      // FE CP A, d8
        instr!("RST 38H", 1, 16, Cpu::op_rst_38h),      // FF RST 38H
    ];

    pub static ref CB_INSTRUCTIONS: [Instruction; 256] = [
        instr!("RLC B", 1, 4, Cpu::op_cb_rlc_b), // CB 00
        instr!("RLC C", 1, 4, Cpu::op_cb_rlc_c), // CB 01
        instr!("RLC D", 1, 4, Cpu::op_cb_rlc_d), // CB 02
        instr!("RLC E", 1, 4, Cpu::op_cb_rlc_e), // CB 03
        instr!("RLC H", 1, 4, Cpu::op_cb_rlc_h), // CB 04
        instr!("RLC L", 1, 4, Cpu::op_cb_rlc_l), // CB 05
        instr!("RLC (HL)", 1, 12, Cpu::op_cb_rlc_hl), // CB 06
        instr!("RLC A", 1, 4, Cpu::op_cb_rlc_a), // CB 07
        instr!("RRC B", 1, 4, Cpu::op_cb_rrc_b), // CB 08
        instr!("RRC C", 1, 4, Cpu::op_cb_rrc_c), // CB 09
        instr!("RRC D", 1, 4, Cpu::op_cb_rrc_d), // CB 0A
        instr!("RRC E", 1, 4, Cpu::op_cb_rrc_e), // CB 0B
        instr!("RRC H", 1, 4, Cpu::op_cb_rrc_h), // CB 0C
        instr!("RRC L", 1, 4, Cpu::op_cb_rrc_l), // CB 0D
        instr!("RRC (HL)", 1, 12, Cpu::op_cb_rrc_hl), // CB 0E
        instr!("RRC A", 1, 4, Cpu::op_cb_rrc_a), // CB 0F
        instr!("RL B", 1, 4, Cpu::op_cb_rl_b), // CB 10
        instr!("RL C", 1, 4, Cpu::op_cb_rl_c), // CB 11
        instr!("RL D", 1, 4, Cpu::op_cb_rl_d), // CB 12
        instr!("RL E", 1, 4, Cpu::op_cb_rl_e), // CB 13
        instr!("RL H", 1, 4, Cpu::op_cb_rl_h), // CB 14
        instr!("RL L", 1, 4, Cpu::op_cb_rl_l), // CB 15
        instr!("RL (HL)", 1, 12, Cpu::op_cb_rl_hl), // CB 16
        instr!("RL A", 1, 4, Cpu::op_cb_rl_a), // CB 17
        instr!("RR B", 1, 4, Cpu::op_cb_rr_b), // CB 18
        instr!("RR C", 1, 4, Cpu::op_cb_rr_c), // CB 19
        instr!("RR D", 1, 4, Cpu::op_cb_rr_d), // CB 1A
        instr!("RR E", 1, 4, Cpu::op_cb_rr_e), // CB 1B
        instr!("RR H", 1, 4, Cpu::op_cb_rr_h), // CB 1C
        instr!("RR L", 1, 4, Cpu::op_cb_rr_l), // CB 1D
        instr!("RR (HL)", 1, 12, Cpu::op_cb_rr_hl), // CB 1E
        instr!("RR A", 1, 4, Cpu::op_cb_rr_a), // CB 1F
        instr!("SLA B", 1, 4, Cpu::op_cb_sla_b), // CB 20
        instr!("SLA C", 1, 4, Cpu::op_cb_sla_c), // CB 21
        instr!("SLA D", 1, 4, Cpu::op_cb_sla_d), // CB 22
        instr!("SLA E", 1, 4, Cpu::op_cb_sla_e), // CB 23
        instr!("SLA H", 1, 4, Cpu::op_cb_sla_h), // CB 24
        instr!("SLA L", 1, 4, Cpu::op_cb_sla_l), // CB 25
        instr!("SLA (HL)", 1, 12, Cpu::op_cb_sla_hl), // CB 26
        instr!("SLA A", 1, 4, Cpu::op_cb_sla_a), // CB 27
        instr!("SRA B", 1, 4, Cpu::op_cb_sra_b), // CB 28
        instr!("SRA C", 1, 4, Cpu::op_cb_sra_c), // CB 29
        instr!("SRA D", 1, 4, Cpu::op_cb_sra_d), // CB 2A
        instr!("SRA E", 1, 4, Cpu::op_cb_sra_e), // CB 2B
        instr!("SRA H", 1, 4, Cpu::op_cb_sra_h), // CB 2C
        instr!("SRA L", 1, 4, Cpu::op_cb_sra_l), // CB 2D
        instr!("SRA (HL)", 1, 12, Cpu::op_cb_sra_hl), // CB 2E
        instr!("SRA A", 1, 4, Cpu::op_cb_sra_a), // CB 2F
        instr!("SWAP B", 1, 4, Cpu::op_cb_swap_b), // CB 30
        instr!("SWAP C", 1, 4, Cpu::op_cb_swap_c), // CB 31
        instr!("SWAP D", 1, 4, Cpu::op_cb_swap_d), // CB 32
        instr!("SWAP E", 1, 4, Cpu::op_cb_swap_e), // CB 33
        instr!("SWAP H", 1, 4, Cpu::op_cb_swap_h), // CB 34
        instr!("SWAP L", 1, 4, Cpu::op_cb_swap_l), // CB 35
        instr!("SWAP (HL)", 1, 12, Cpu::op_cb_swap_hl), // CB 36
        instr!("SWAP A", 1, 4, Cpu::op_cb_swap_a), // CB 37
        instr!("SRL B", 1, 4, Cpu::op_cb_srl_b), // CB 38
        instr!("SRL C", 1, 4, Cpu::op_cb_srl_c), // CB 39
        instr!("SRL D", 1, 4, Cpu::op_cb_srl_d), // CB 3A
        instr!("SRL E", 1, 4, Cpu::op_cb_srl_e), // CB 3B
        instr!("SRL H", 1, 4, Cpu::op_cb_srl_h), // CB 3C
        instr!("SRL L", 1, 4, Cpu::op_cb_srl_l), // CB 3D
        instr!("SRL (HL)", 1, 12, Cpu::op_cb_srl_hl), // CB 3E
        instr!("SRL A", 1, 4, Cpu::op_cb_srl_a), // CB 3F
        instr!("BIT 0, B", 1, 4, Cpu::op_cb_bit_0_b), // CB 40
        instr!("BIT 0, C", 1, 4, Cpu::op_cb_bit_0_c), // CB 41
        instr!("BIT 0, D", 1, 4, Cpu::op_cb_bit_0_d), // CB 42
        instr!("BIT 0, E", 1, 4, Cpu::op_cb_bit_0_e), // CB 43
        instr!("BIT 0, H", 1, 4, Cpu::op_cb_bit_0_h), // CB 44
        instr!("BIT 0, L", 1, 4, Cpu::op_cb_bit_0_l), // CB 45
        instr!("BIT 0, (HL)", 1, 8, Cpu::op_cb_bit_0_hl), // CB 46
        instr!("BIT 0, A", 1, 4, Cpu::op_cb_bit_0_a), // CB 47
        instr!("BIT 1, B", 1, 4, Cpu::op_cb_bit_1_b), // CB 48
        instr!("BIT 1, C", 1, 4, Cpu::op_cb_bit_1_c), // CB 49
        instr!("BIT 1, D", 1, 4, Cpu::op_cb_bit_1_d), // CB 4A
        instr!("BIT 1, E", 1, 4, Cpu::op_cb_bit_1_e), // CB 4B
        instr!("BIT 1, H", 1, 4, Cpu::op_cb_bit_1_h), // CB 4C
        instr!("BIT 1, L", 1, 4, Cpu::op_cb_bit_1_l), // CB 4D
        instr!("BIT 1, (HL)", 1, 8, Cpu::op_cb_bit_1_hl), // CB 4E
        instr!("BIT 1, A", 1, 4, Cpu::op_cb_bit_1_a), // CB 4F
        instr!("BIT 2, B", 1, 4, Cpu::op_cb_bit_2_b), // CB 50
        instr!("BIT 2, C", 1, 4, Cpu::op_cb_bit_2_c), // CB 51
        instr!("BIT 2, D", 1, 4, Cpu::op_cb_bit_2_d), // CB 52
        instr!("BIT 2, E", 1, 4, Cpu::op_cb_bit_2_e), // CB 53
        instr!("BIT 2, H", 1, 4, Cpu::op_cb_bit_2_h), // CB 54
        instr!("BIT 2, L", 1, 4, Cpu::op_cb_bit_2_l), // CB 55
        instr!("BIT 2, (HL)", 1, 8, Cpu::op_cb_bit_2_hl), // CB 56
        instr!("BIT 2, A", 1, 4, Cpu::op_cb_bit_2_a), // CB 57
        instr!("BIT 3, B", 1, 4, Cpu::op_cb_bit_3_b), // CB 58
        instr!("BIT 3, C", 1, 4, Cpu::op_cb_bit_3_c), // CB 59
        instr!("BIT 3, D", 1, 4, Cpu::op_cb_bit_3_d), // CB 5A
        instr!("BIT 3, E", 1, 4, Cpu::op_cb_bit_3_e), // CB 5B
        instr!("BIT 3, H", 1, 4, Cpu::op_cb_bit_3_h), // CB 5C
        instr!("BIT 3, L", 1, 4, Cpu::op_cb_bit_3_l), // CB 5D
        instr!("BIT 3, (HL)", 1, 8, Cpu::op_cb_bit_3_hl), // CB 5E
        instr!("BIT 3, A", 1, 4, Cpu::op_cb_bit_3_a), // CB 5F
        instr!("BIT 4, B", 1, 4, Cpu::op_cb_bit_4_b), // CB 60
        instr!("BIT 4, C", 1, 4, Cpu::op_cb_bit_4_c), // CB 61
        instr!("BIT 4, D", 1, 4, Cpu::op_cb_bit_4_d), // CB 62
        instr!("BIT 4, E", 1, 4, Cpu::op_cb_bit_4_e), // CB 63
        instr!("BIT 4, H", 1, 4, Cpu::op_cb_bit_4_h), // CB 64
        instr!("BIT 4, L", 1, 4, Cpu::op_cb_bit_4_l), // CB 65
        instr!("BIT 4, (HL)", 1, 8, Cpu::op_cb_bit_4_hl), // CB 66
        instr!("BIT 4, A", 1, 4, Cpu::op_cb_bit_4_a), // CB 67
        instr!("BIT 5, B", 1, 4, Cpu::op_cb_bit_5_b), // CB 68
        instr!("BIT 5, C", 1, 4, Cpu::op_cb_bit_5_c), // CB 69
        instr!("BIT 5, D", 1, 4, Cpu::op_cb_bit_5_d), // CB 6A
        instr!("BIT 5, E", 1, 4, Cpu::op_cb_bit_5_e), // CB 6B
        instr!("BIT 5, H", 1, 4, Cpu::op_cb_bit_5_h), // CB 6C
        instr!("BIT 5, L", 1, 4, Cpu::op_cb_bit_5_l), // CB 6D
        instr!("BIT 5, (HL)", 1, 8, Cpu::op_cb_bit_5_hl), // CB 6E
        instr!("BIT 5, A", 1, 4, Cpu::op_cb_bit_5_a), // CB 6F
        instr!("BIT 6, B", 1, 4, Cpu::op_cb_bit_6_b), // CB 70
        instr!("BIT 6, C", 1, 4, Cpu::op_cb_bit_6_c), // CB 71
        instr!("BIT 6, D", 1, 4, Cpu::op_cb_bit_6_d), // CB 72
        instr!("BIT 6, E", 1, 4, Cpu::op_cb_bit_6_e), // CB 73
        instr!("BIT 6, H", 1, 4, Cpu::op_cb_bit_6_h), // CB 74
        instr!("BIT 6, L", 1, 4, Cpu::op_cb_bit_6_l), // CB 75
        instr!("BIT 6, (HL)", 1, 8, Cpu::op_cb_bit_6_hl), // CB 76
        instr!("BIT 6, A", 1, 4, Cpu::op_cb_bit_6_a), // CB 77
        instr!("BIT 7, B", 1, 4, Cpu::op_cb_bit_7_b), // CB 78
        instr!("BIT 7, C", 1, 4, Cpu::op_cb_bit_7_c), // CB 79
        instr!("BIT 7, D", 1, 4, Cpu::op_cb_bit_7_d), // CB 7A
        instr!("BIT 7, E", 1, 4, Cpu::op_cb_bit_7_e), // CB 7B
        instr!("BIT 7, H", 1, 4, Cpu::op_cb_bit_7_h), // CB 7C
        instr!("BIT 7, L", 1, 4, Cpu::op_cb_bit_7_l), // CB 7D
        instr!("BIT 7, (HL)", 1, 8, Cpu::op_cb_bit_7_hl), // CB 7E
        instr!("BIT 7, A", 1, 4, Cpu::op_cb_bit_7_a), // CB 7F
        instr!("RES 0, B", 1, 4, Cpu::op_cb_res_0_b), // CB 80
        instr!("RES 0, C", 1, 4, Cpu::op_cb_res_0_c), // CB 81
        instr!("RES 0, D", 1, 4, Cpu::op_cb_res_0_d), // CB 82
        instr!("RES 0, E", 1, 4, Cpu::op_cb_res_0_e), // CB 83
        instr!("RES 0, H", 1, 4, Cpu::op_cb_res_0_h), // CB 84
        instr!("RES 0, L", 1, 4, Cpu::op_cb_res_0_l), // CB 85
        instr!("RES 0, (HL)", 1, 12, Cpu::op_cb_res_0_hl), // CB 86
        instr!("RES 0, A", 1, 4, Cpu::op_cb_res_0_a), // CB 87
        instr!("RES 1, B", 1, 4, Cpu::op_cb_res_1_b), // CB 88
        instr!("RES 1, C", 1, 4, Cpu::op_cb_res_1_c), // CB 89
        instr!("RES 1, D", 1, 4, Cpu::op_cb_res_1_d), // CB 8A
        instr!("RES 1, E", 1, 4, Cpu::op_cb_res_1_e), // CB 8B
        instr!("RES 1, H", 1, 4, Cpu::op_cb_res_1_h), // CB 8C
        instr!("RES 1, L", 1, 4, Cpu::op_cb_res_1_l), // CB 8D
        instr!("RES 1, (HL)", 1, 12, Cpu::op_cb_res_1_hl), // CB 8E
        instr!("RES 1, A", 1, 4, Cpu::op_cb_res_1_a), // CB 8F
        instr!("RES 2, B", 1, 4, Cpu::op_cb_res_2_b), // CB 90
        instr!("RES 2, C", 1, 4, Cpu::op_cb_res_2_c), // CB 91
        instr!("RES 2, D", 1, 4, Cpu::op_cb_res_2_d), // CB 92
        instr!("RES 2, E", 1, 4, Cpu::op_cb_res_2_e), // CB 93
        instr!("RES 2, H", 1, 4, Cpu::op_cb_res_2_h), // CB 94
        instr!("RES 2, L", 1, 4, Cpu::op_cb_res_2_l), // CB 95
        instr!("RES 2, (HL)", 1, 12, Cpu::op_cb_res_2_hl), // CB 96
        instr!("RES 2, A", 1, 4, Cpu::op_cb_res_2_a), // CB 97
        instr!("RES 3, B", 1, 4, Cpu::op_cb_res_3_b), // CB 98
        instr!("RES 3, C", 1, 4, Cpu::op_cb_res_3_c), // CB 99
        instr!("RES 3, D", 1, 4, Cpu::op_cb_res_3_d), // CB 9A
        instr!("RES 3, E", 1, 4, Cpu::op_cb_res_3_e), // CB 9B
        instr!("RES 3, H", 1, 4, Cpu::op_cb_res_3_h), // CB 9C
        instr!("RES 3, L", 1, 4, Cpu::op_cb_res_3_l), // CB 9D
        instr!("RES 3, (HL)", 1, 12, Cpu::op_cb_res_3_hl), // CB 9E
        instr!("RES 3, A", 1, 4, Cpu::op_cb_res_3_a), // CB 9F
        instr!("RES 4, B", 1, 4, Cpu::op_cb_res_4_b), // CB A0
        instr!("RES 4, C", 1, 4, Cpu::op_cb_res_4_c), // CB A1
        instr!("RES 4, D", 1, 4, Cpu::op_cb_res_4_d), // CB A2
        instr!("RES 4, E", 1, 4, Cpu::op_cb_res_4_e), // CB A3
        instr!("RES 4, H", 1, 4, Cpu::op_cb_res_4_h), // CB A4
        instr!("RES 4, L", 1, 4, Cpu::op_cb_res_4_l), // CB A5
        instr!("RES 4, (HL)", 1, 12, Cpu::op_cb_res_4_hl), // CB A6
        instr!("RES 4, A", 1, 4, Cpu::op_cb_res_4_a), // CB A7
        instr!("RES 5, B", 1, 4, Cpu::op_cb_res_5_b), // CB A8
        instr!("RES 5, C", 1, 4, Cpu::op_cb_res_5_c), // CB A9
        instr!("RES 5, D", 1, 4, Cpu::op_cb_res_5_d), // CB AA
        instr!("RES 5, E", 1, 4, Cpu::op_cb_res_5_e), // CB AB
        instr!("RES 5, H", 1, 4, Cpu::op_cb_res_5_h), // CB AC
        instr!("RES 5, L", 1, 4, Cpu::op_cb_res_5_l), // CB AD
        instr!("RES 5, (HL)", 1, 12, Cpu::op_cb_res_5_hl), // CB AE
        instr!("RES 5, A", 1, 4, Cpu::op_cb_res_5_a), // CB AF
        instr!("RES 6, B", 1, 4, Cpu::op_cb_res_6_b), // CB B0
        instr!("RES 6, C", 1, 4, Cpu::op_cb_res_6_c), // CB B1
        instr!("RES 6, D", 1, 4, Cpu::op_cb_res_6_d), // CB B2
        instr!("RES 6, E", 1, 4, Cpu::op_cb_res_6_e), // CB B3
        instr!("RES 6, H", 1, 4, Cpu::op_cb_res_6_h), // CB B4
        instr!("RES 6, L", 1, 4, Cpu::op_cb_res_6_l), // CB B5
        instr!("RES 6, (HL)", 1, 12, Cpu::op_cb_res_6_hl), // CB B6
        instr!("RES 6, A", 1, 4, Cpu::op_cb_res_6_a), // CB B7
        instr!("RES 7, B", 1, 4, Cpu::op_cb_res_7_b), // CB B8
        instr!("RES 7, C", 1, 4, Cpu::op_cb_res_7_c), // CB B9
        instr!("RES 7, D", 1, 4, Cpu::op_cb_res_7_d), // CB BA
        instr!("RES 7, E", 1, 4, Cpu::op_cb_res_7_e), // CB BB
        instr!("RES 7, H", 1, 4, Cpu::op_cb_res_7_h), // CB BC
        instr!("RES 7, L", 1, 4, Cpu::op_cb_res_7_l), // CB BD
        instr!("RES 7, (HL)", 1, 12, Cpu::op_cb_res_7_hl), // CB BE
        instr!("RES 7, A", 1, 4, Cpu::op_cb_res_7_a), // CB BF
        instr!("SET 0, B", 1, 4, Cpu::op_cb_set_0_b), // CB C0
        instr!("SET 0, C", 1, 4, Cpu::op_cb_set_0_c), // CB C1
        instr!("SET 0, D", 1, 4, Cpu::op_cb_set_0_d), // CB C2
        instr!("SET 0, E", 1, 4, Cpu::op_cb_set_0_e), // CB C3
        instr!("SET 0, H", 1, 4, Cpu::op_cb_set_0_h), // CB C4
        instr!("SET 0, L", 1, 4, Cpu::op_cb_set_0_l), // CB C5
        instr!("SET 0, (HL)", 1, 12, Cpu::op_cb_set_0_hl), // CB C6
        instr!("SET 0, A", 1, 4, Cpu::op_cb_set_0_a), // CB C7
        instr!("SET 1, B", 1, 4, Cpu::op_cb_set_1_b), // CB C8
        instr!("SET 1, C", 1, 4, Cpu::op_cb_set_1_c), // CB C9
        instr!("SET 1, D", 1, 4, Cpu::op_cb_set_1_d), // CB CA
        instr!("SET 1, E", 1, 4, Cpu::op_cb_set_1_e), // CB CB
        instr!("SET 1, H", 1, 4, Cpu::op_cb_set_1_h), // CB CC
        instr!("SET 1, L", 1, 4, Cpu::op_cb_set_1_l), // CB CD
        instr!("SET 1, (HL)", 1, 12, Cpu::op_cb_set_1_hl), // CB CE
        instr!("SET 1, A", 1, 4, Cpu::op_cb_set_1_a), // CB CF
        instr!("SET 2, B", 1, 4, Cpu::op_cb_set_2_b), // CB D0
        instr!("SET 2, C", 1, 4, Cpu::op_cb_set_2_c), // CB D1
        instr!("SET 2, D", 1, 4, Cpu::op_cb_set_2_d), // CB D2
        instr!("SET 2, E", 1, 4, Cpu::op_cb_set_2_e), // CB D3
        instr!("SET 2, H", 1, 4, Cpu::op_cb_set_2_h), // CB D4
        instr!("SET 2, L", 1, 4, Cpu::op_cb_set_2_l), // CB D5
        instr!("SET 2, (HL)", 1, 12, Cpu::op_cb_set_2_hl), // CB D6
        instr!("SET 2, A", 1, 4, Cpu::op_cb_set_2_a), // CB D7
        instr!("SET 3, B", 1, 4, Cpu::op_cb_set_3_b), // CB D8
        instr!("SET 3, C", 1, 4, Cpu::op_cb_set_3_c), // CB D9
        instr!("SET 3, D", 1, 4, Cpu::op_cb_set_3_d), // CB DA
        instr!("SET 3, E", 1, 4, Cpu::op_cb_set_3_e), // CB DB
        instr!("SET 3, H", 1, 4, Cpu::op_cb_set_3_h), // CB DC
        instr!("SET 3, L", 1, 4, Cpu::op_cb_set_3_l), // CB DD
        instr!("SET 3, (HL)", 1, 12, Cpu::op_cb_set_3_hl), // CB DE
        instr!("SET 3, A", 1, 4, Cpu::op_cb_set_3_a), // CB DF
        instr!("SET 4, B", 1, 4, Cpu::op_cb_set_4_b), // CB E0
        instr!("SET 4, C", 1, 4, Cpu::op_cb_set_4_c), // CB E1
        instr!("SET 4, D", 1, 4, Cpu::op_cb_set_4_d), // CB E2
        instr!("SET 4, E", 1, 4, Cpu::op_cb_set_4_e), // CB E3
        instr!("SET 4, H", 1, 4, Cpu::op_cb_set_4_h), // CB E4
        instr!("SET 4, L", 1, 4, Cpu::op_cb_set_4_l), // CB E5
        instr!("SET 4, (HL)", 1, 12, Cpu::op_cb_set_4_hl), // CB E6
        instr!("SET 4, A", 1, 4, Cpu::op_cb_set_4_a), // CB E7
        instr!("SET 5, B", 1, 4, Cpu::op_cb_set_5_b), // CB E8
        instr!("SET 5, C", 1, 4, Cpu::op_cb_set_5_c), // CB E9
        instr!("SET 5, D", 1, 4, Cpu::op_cb_set_5_d), // CB EA
        instr!("SET 5, E", 1, 4, Cpu::op_cb_set_5_e), // CB EB
        instr!("SET 5, H", 1, 4, Cpu::op_cb_set_5_h), // CB EC
        instr!("SET 5, L", 1, 4, Cpu::op_cb_set_5_l), // CB ED
        instr!("SET 5, (HL)", 1, 12, Cpu::op_cb_set_5_hl), // CB EE
        instr!("SET 5, A", 1, 4, Cpu::op_cb_set_5_a), // CB EF
        instr!("SET 6, B", 1, 4, Cpu::op_cb_set_6_b), // CB F0
        instr!("SET 6, C", 1, 4, Cpu::op_cb_set_6_c), // CB F1
        instr!("SET 6, D", 1, 4, Cpu::op_cb_set_6_d), // CB F2
        instr!("SET 6, E", 1, 4, Cpu::op_cb_set_6_e), // CB F3
        instr!("SET 6, H", 1, 4, Cpu::op_cb_set_6_h), // CB F4
        instr!("SET 6, L", 1, 4, Cpu::op_cb_set_6_l), // CB F5
        instr!("SET 6, (HL)", 1, 12, Cpu::op_cb_set_6_hl), // CB F6
        instr!("SET 6, A", 1, 4, Cpu::op_cb_set_6_a), // CB F7
        instr!("SET 7, B", 1, 4, Cpu::op_cb_set_7_b), // CB F8
        instr!("SET 7, C", 1, 4, Cpu::op_cb_set_7_c), // CB F9
        instr!("SET 7, D", 1, 4, Cpu::op_cb_set_7_d), // CB FA
        instr!("SET 7, E", 1, 4, Cpu::op_cb_set_7_e), // CB FB
        instr!("SET 7, H", 1, 4, Cpu::op_cb_set_7_h), // CB FC
        instr!("SET 7, L", 1, 4, Cpu::op_cb_set_7_l), // CB FD
        instr!("SET 7, (HL)", 1, 12, Cpu::op_cb_set_7_hl), // CB FE
        instr!("SET 7, A", 1, 4, Cpu::op_cb_set_7_a), // CB FF
    ];
}
