// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use common::numutil::NumExt;

use super::{
    AluOp, ArmOp, ArmOperand, LdmStmConfig, LdrStrConfig, LdrStrKind, LdrStrOffset, MulOp,
    PsrSource, ShiftKind,
};
use crate::{
    interface::{Access, Bus},
    mod_with_offs,
    state::{
        Flag::{Carry, Thumb},
        Mode,
    },
    Cpu,
};

impl<S: Bus> Cpu<S> {
    pub(crate) fn run_arm(&mut self, op: ArmOp) {
        match op {
            ArmOp::Branch { offset, link } => {
                if link {
                    self.state.set_lr(self.state.pc().wrapping_sub(4));
                }
                let pc = self.state.pc();
                self.set_pc(pc.wrapping_add_signed(offset));
            }

            ArmOp::BranchExchange { rn } => {
                let rn = self.state.reg(rn);
                self.state.set_flag(Thumb, rn.is_bit(0));
                self.set_pc(rn);
            }

            ArmOp::SoftwareInterrupt => self.swi(),

            ArmOp::Mrs { rd, spsr } => {
                let psr = if spsr {
                    self.state.spsr()
                } else {
                    // Bit 4 of the mode field is hardwired
                    self.state.cpsr() | (1 << 4)
                };
                self.set_reg(rd, psr);
            }

            ArmOp::Msr {
                src,
                flags,
                ctrl,
                spsr,
            } => self.msr(src, flags, ctrl, spsr),

            ArmOp::DataProcessing {
                op,
                rn,
                rd,
                op2,
                set_flags,
            } => {
                if set_flags {
                    self.data_processing::<true>(op, rn, rd, op2);
                } else {
                    self.data_processing::<false>(op, rn, rd, op2);
                }
            }

            ArmOp::Multiply {
                op,
                rd,
                rn,
                rs,
                rm,
                set_flags,
            } => self.multiply(op, rd, rn, rs, rm, set_flags),

            ArmOp::SingleTransfer {
                kind,
                cfg,
                rn,
                rd,
                offset,
            } => self.single_transfer(kind, cfg, rn, rd, offset),

            ArmOp::BlockTransfer {
                cfg,
                rn,
                rlist,
                user,
            } => self.block_transfer(cfg, rn, rlist, user),

            ArmOp::Swap { rn, rd, rm, byte } => {
                let addr = self.state.reg(rn);
                let mem = if byte {
                    self.read::<u8>(addr, Access::NonSeq).u32()
                } else {
                    self.read_word_ldrswp(addr, Access::NonSeq)
                };
                let reg = self.state.reg(rm);
                if byte {
                    self.write::<u8>(addr, reg.u8(), Access::NonSeq);
                } else {
                    self.write::<u32>(addr & !3, reg, Access::NonSeq);
                }
                self.set_reg(rd, mem);
                self.idle_nonseq();
            }

            ArmOp::Undefined(inst) => self.und_inst(inst),
        }
    }

    fn msr(&mut self, src: PsrSource, flags: bool, ctrl: bool, spsr: bool) {
        let value = match src {
            PsrSource::Immediate(imm) => imm,
            PsrSource::Register(r) => self.state.reg(r),
        };

        let mut mask = 0;
        if flags {
            mask |= 0xFF00_0000;
        }
        if ctrl && self.state.mode() != Mode::User {
            mask |= 0x0000_00FF;
        }

        if spsr {
            let psr = (self.state.spsr() & !mask) | (value & mask);
            self.state.set_spsr(psr);
        } else {
            // The T bit may not be changed through MSR
            let mut psr = (self.state.cpsr() & !mask) | (value & mask);
            psr = psr.set_bit(5, self.state.is_flag(Thumb));
            self.state.set_cpsr(psr);
            self.state.check_if_interrupt(&mut self.bus);
        }
    }

    fn data_processing<const CPSR: bool>(&mut self, op: AluOp, rn: u32, rd: u32, op2: ArmOperand) {
        // A shift by register takes an extra cycle and makes
        // operand reads of the PC see it 4 bytes further
        let reg_shift = matches!(op2, ArmOperand::RegShiftReg { .. });
        let second = self.alu_operand::<CPSR>(op2);
        let first = if reg_shift {
            self.state.reg_pc4(rn)
        } else {
            self.state.reg(rn)
        };
        if reg_shift {
            self.idle_nonseq();
        }

        let carry = self.state.is_flag(Carry) as u32;
        let value = match op {
            AluOp::And | AluOp::Tst => self.state.and::<CPSR>(first, second),
            AluOp::Eor | AluOp::Teq => self.state.xor::<CPSR>(first, second),
            AluOp::Sub | AluOp::Cmp => self.state.sub::<CPSR>(first, second),
            AluOp::Rsb => self.state.sub::<CPSR>(second, first),
            AluOp::Add | AluOp::Cmn => self.state.add::<CPSR>(first, second),
            AluOp::Adc => self.state.adc::<CPSR>(first, second, carry),
            AluOp::Sbc => self.state.sbc::<CPSR>(first, second, carry),
            AluOp::Rsc => self.state.sbc::<CPSR>(second, first, carry),
            AluOp::Orr => self.state.or::<CPSR>(first, second),
            AluOp::Mov => {
                self.state.set_nz::<CPSR>(second);
                second
            }
            AluOp::Bic => self.state.bit_clear::<CPSR>(first, second),
            AluOp::Mvn => self.state.not::<CPSR>(second),
        };

        if CPSR && rd == 15 && !matches!(self.state.mode(), Mode::User | Mode::System) {
            // Return from exception
            let spsr = self.state.spsr();
            self.state.set_cpsr(spsr);
        }
        if !op.is_test() {
            self.set_reg(rd, value);
        }
    }

    fn alu_operand<const CPSR: bool>(&mut self, op2: ArmOperand) -> u32 {
        match op2 {
            ArmOperand::Immediate { value, ror_by } => {
                if ror_by == 0 {
                    value
                } else {
                    self.state.ror::<CPSR, false>(value, ror_by)
                }
            }
            ArmOperand::RegShiftImm { rm, kind, by } => {
                let value = self.state.reg(rm);
                self.shift::<CPSR, true>(kind, value, by)
            }
            ArmOperand::RegShiftReg { rm, kind, rs } => {
                let by = self.state.reg(rs) & 0xFF;
                let value = self.state.reg_pc4(rm);
                self.shift::<CPSR, false>(kind, value, by)
            }
        }
    }

    pub(crate) fn shift<const CPSR: bool, const COERCE: bool>(
        &mut self,
        kind: ShiftKind,
        value: u32,
        by: u32,
    ) -> u32 {
        match kind {
            ShiftKind::Lsl => self.state.lsl::<CPSR>(value, by),
            ShiftKind::Lsr => self.state.lsr::<CPSR, COERCE>(value, by),
            ShiftKind::Asr => self.state.asr::<CPSR, COERCE>(value, by),
            ShiftKind::Ror => self.state.ror::<CPSR, COERCE>(value, by),
        }
    }

    fn multiply(&mut self, op: MulOp, rd: u32, rn: u32, rs: u32, rm: u32, set_flags: bool) {
        let a = self.state.reg(rm);
        let b = self.state.reg(rs);

        match op {
            MulOp::Mul | MulOp::Mla => {
                let mut res = a.wrapping_mul(b);
                if op == MulOp::Mla {
                    res = res.wrapping_add(self.state.reg(rn));
                    self.bus.tick(1);
                }
                if set_flags {
                    self.state.set_nz::<true>(res);
                    self.state.set_flag(Carry, false);
                }
                self.set_reg(rd, res);
            }
            _ => {
                let mut res = match op {
                    MulOp::Umull | MulOp::Umlal => (a as u64).wrapping_mul(b as u64),
                    _ => (a as i32 as i64).wrapping_mul(b as i32 as i64) as u64,
                };
                if let MulOp::Umlal | MulOp::Smlal = op {
                    let acc = ((self.state.reg(rd) as u64) << 32) | (self.state.reg(rn) as u64);
                    res = res.wrapping_add(acc);
                    self.bus.tick(1);
                }
                self.bus.tick(1);
                if set_flags {
                    self.state.set_nz64::<true>(res);
                    self.state.set_flag(Carry, false);
                }
                self.set_reg(rn, res as u32);
                self.set_reg(rd, (res >> 32) as u32);
            }
        }

        let signed = !matches!(op, MulOp::Umull | MulOp::Umlal);
        self.mul_wait_cycles(b, signed);
    }

    fn single_transfer(
        &mut self,
        kind: LdrStrKind,
        cfg: LdrStrConfig,
        rn: u32,
        rd: u32,
        offset: LdrStrOffset,
    ) {
        let offs = match offset {
            LdrStrOffset::Immediate(imm) => imm,
            LdrStrOffset::Register(r) => self.state.reg(r),
            LdrStrOffset::ShiftedRegister { rm, kind, by } => {
                let value = self.state.reg(rm);
                self.shift::<false, true>(kind, value, by)
            }
        };

        let base = self.state.reg(rn);
        let addr = if cfg.pre {
            mod_with_offs(base, offs, cfg.up)
        } else {
            base
        };

        let loaded = match kind {
            LdrStrKind::StoreWord => {
                let val = self.state.reg_pc4(rd);
                self.write::<u32>(addr & !3, val, Access::NonSeq);
                None
            }
            LdrStrKind::StoreHalfword => {
                let val = self.state.reg_pc4(rd);
                self.write::<u16>(addr & !1, val.u16(), Access::NonSeq);
                None
            }
            LdrStrKind::StoreByte => {
                let val = self.state.reg_pc4(rd);
                self.write::<u8>(addr, val.u8(), Access::NonSeq);
                None
            }
            LdrStrKind::LoadWord => Some(self.read_word_ldrswp(addr, Access::NonSeq)),
            LdrStrKind::LoadHalfword => Some(self.read::<u16>(addr, Access::NonSeq)),
            LdrStrKind::LoadByte => Some(self.read::<u8>(addr, Access::NonSeq).u32()),
            LdrStrKind::LoadSignedByte => {
                Some(self.read::<u8>(addr, Access::NonSeq) as i8 as i32 as u32)
            }
            LdrStrKind::LoadSignedHalfword => Some(self.read_hword_ldrsh(addr, Access::NonSeq)),
        };

        // Post-indexing always writes back; a load of the base
        // register wins over the writeback
        let writeback = !cfg.pre || cfg.writeback;
        if writeback && (kind.is_str() || rn != rd) {
            let wb = if cfg.pre {
                addr
            } else {
                mod_with_offs(base, offs, cfg.up)
            };
            self.set_reg(rn, wb);
        }

        if let Some(value) = loaded {
            self.set_reg(rd, value);
            self.idle_nonseq();
        } else {
            self.state.access_type = Access::NonSeq;
        }
    }

    fn block_transfer(&mut self, cfg: LdmStmConfig, rn: u32, rlist: u16, user: bool) {
        if rlist == 0 {
            self.on_empty_rlist(rn, !cfg.ldr, cfg.up, cfg.pre);
            self.state.access_type = Access::NonSeq;
            return;
        }

        // User bank transfer: execution continues in the current mode,
        // only the register bank is swapped
        let cpsr = self.state.cpsr();
        if user {
            self.state.set_mode(Mode::System);
        }

        let count = rlist.count_ones();
        let base = self.state.reg(rn);
        let final_base = mod_with_offs(base, 4 * count, cfg.up);

        // The lowest register always lands at the lowest address,
        // so decrementing modes walk up from the final base instead
        let mut addr = if cfg.up { base } else { final_base };
        let bump_before = cfg.pre == cfg.up;

        let mut access = Access::NonSeq;
        let mut first = true;
        for reg in 0..16 {
            if !rlist.is_bit(reg) {
                continue;
            }
            let reg = reg as u32;
            if bump_before {
                addr = addr.wrapping_add(4);
            }

            if cfg.ldr {
                let value = self.read::<u32>(addr, access);
                self.set_reg(reg, value);
            } else {
                // A stored base that is not the first entry reads
                // as the written-back value
                let value = if reg == rn && !first {
                    final_base
                } else {
                    self.state.reg_pc4(reg)
                };
                self.write::<u32>(addr, value, access);
            }

            if !bump_before {
                addr = addr.wrapping_add(4);
            }
            access = Access::Seq;
            first = false;
        }

        // A load that includes the base register skips writeback
        if cfg.writeback && (!cfg.ldr || !rlist.is_bit(rn.u16())) {
            self.set_reg(rn, final_base);
        }

        if user {
            self.state.set_cpsr(cpsr);
        }

        if cfg.ldr {
            self.idle_nonseq();
        } else {
            self.state.access_type = Access::NonSeq;
        }
    }
}

#[cfg(test)]
mod tests {
    use common::{numutil::NumExt, Time};

    use crate::{
        interface::{Access, Bus, RwType},
        state::CpuState,
        Cpu, Exception,
    };

    struct TestBus {
        mem: Vec<u8>,
    }

    impl Bus for TestBus {
        fn tick(&mut self, _cycles: Time) {}

        fn handle_events(&mut self, _cpu: &mut CpuState) {}

        fn exception_happened(&mut self, _cpu: &mut CpuState, _kind: Exception) {}

        fn pipeline_stalled(&mut self, _cpu: &mut CpuState) {}

        fn get<T: RwType>(&mut self, _cpu: &mut CpuState, addr: u32) -> T {
            let a = addr.us() & 0xFFFF;
            match T::WIDTH {
                1 => T::from_u8(self.mem[a]),
                2 => {
                    let a = a & !1;
                    T::from_u16(u16::from_le_bytes([self.mem[a], self.mem[a + 1]]))
                }
                _ => {
                    let a = a & !3;
                    T::from_u32(u32::from_le_bytes([
                        self.mem[a],
                        self.mem[a + 1],
                        self.mem[a + 2],
                        self.mem[a + 3],
                    ]))
                }
            }
        }

        fn set<T: RwType>(&mut self, _cpu: &mut CpuState, addr: u32, value: T) {
            let a = addr.us() & 0xFFFF;
            let value = value.u32();
            for i in 0..T::WIDTH.us() {
                self.mem[(a + i) & 0xFFFF] = (value >> (i * 8)).u8();
            }
        }

        fn wait_time<T: RwType>(
            &mut self,
            _cpu: &mut CpuState,
            _addr: u32,
            _access: Access,
        ) -> u16 {
            1
        }
    }

    fn cpu_with(program: &[u32]) -> Cpu<TestBus> {
        let mut mem = vec![0; 0x1_0000];
        for (i, inst) in program.iter().enumerate() {
            mem[i * 4..i * 4 + 4].copy_from_slice(&inst.to_le_bytes());
        }
        Cpu::new(TestBus { mem })
    }

    fn run(cpu: &mut Cpu<TestBus>, count: usize) {
        for _ in 0..count {
            cpu.continue_running();
        }
    }

    #[test]
    fn data_processing() {
        // mov r0, #1; add r1, r0, r0; subs r2, r1, #2
        let mut cpu = cpu_with(&[0xE3A0_0001, 0xE080_1000, 0xE251_2002]);
        run(&mut cpu, 3);
        assert_eq!(cpu.state.reg(0), 1);
        assert_eq!(cpu.state.reg(1), 2);
        assert_eq!(cpu.state.reg(2), 0);
        assert!(cpu.state.eval_condition(0x0)); // Z set
    }

    #[test]
    fn conditional_execution() {
        // movs r0, #0; moveq r1, #5; movne r2, #5
        let mut cpu = cpu_with(&[0xE3B0_0000, 0x03A0_1005, 0x13A0_2005]);
        run(&mut cpu, 3);
        assert_eq!(cpu.state.reg(1), 5);
        assert_eq!(cpu.state.reg(2), 0);
    }

    #[test]
    fn branch_with_link() {
        // bl +0; mov r0, #1 (skipped); mov r0, #2
        let mut cpu = cpu_with(&[0xEB00_0000, 0xE3A0_0001, 0xE3A0_0002]);
        run(&mut cpu, 2);
        assert_eq!(cpu.state.lr(), 4);
        assert_eq!(cpu.state.reg(0), 2);
    }

    #[test]
    fn load_store() {
        // mov r2, #0x100; mov r0, #0xFF; str r0, [r2]; ldrb r3, [r2]
        let mut cpu = cpu_with(&[0xE3A0_2C01, 0xE3A0_00FF, 0xE582_0000, 0xE5D2_3000]);
        run(&mut cpu, 4);
        assert_eq!(cpu.state.reg(3), 0xFF);
        assert_eq!(cpu.bus.mem[0x100], 0xFF);
    }

    #[test]
    fn unaligned_word_load_rotates() {
        // mov r2, #0x100; mov r0, #0xFF; str r0, [r2]; ldr r3, [r2, #1]
        let mut cpu = cpu_with(&[0xE3A0_2C01, 0xE3A0_00FF, 0xE582_0000, 0xE592_3001]);
        run(&mut cpu, 4);
        assert_eq!(cpu.state.reg(3), 0xFF00_0000);
    }

    #[test]
    fn block_transfer() {
        // mov r0, #1; mov r1, #2; mov r2, #0x100;
        // stmia r2!, {r0, r1}; sub r2, r2, #8; ldmia r2, {r3, r4}
        let mut cpu = cpu_with(&[
            0xE3A0_0001,
            0xE3A0_1002,
            0xE3A0_2C01,
            0xE8A2_0003,
            0xE242_2008,
            0xE892_0018,
        ]);
        run(&mut cpu, 6);
        assert_eq!(cpu.state.reg(2), 0x100);
        assert_eq!(cpu.state.reg(3), 1);
        assert_eq!(cpu.state.reg(4), 2);
    }

    #[test]
    fn stmdb_stores_descending() {
        // mov r0, #1; mov r1, #2; mov r2, #0x100; stmdb r2!, {r0, r1}
        let mut cpu = cpu_with(&[0xE3A0_0001, 0xE3A0_1002, 0xE3A0_2C01, 0xE922_0003]);
        run(&mut cpu, 4);
        assert_eq!(cpu.state.reg(2), 0xF8);
        assert_eq!(cpu.bus.mem[0xF8], 1);
        assert_eq!(cpu.bus.mem[0xFC], 2);
    }

    #[test]
    fn msr_flags() {
        // msr cpsr_f, #0x80000000
        let mut cpu = cpu_with(&[0xE328_F208]);
        run(&mut cpu, 1);
        assert!(cpu.state.eval_condition(0x4)); // MI
    }

    #[test]
    fn swap() {
        // mov r2, #0x100; mov r0, #7; str r0, [r2]; mov r1, #9; swp r3, r1, [r2]
        let mut cpu = cpu_with(&[
            0xE3A0_2C01,
            0xE3A0_0007,
            0xE582_0000,
            0xE3A0_1009,
            0xE102_3091,
        ]);
        run(&mut cpu, 5);
        assert_eq!(cpu.state.reg(3), 7);
        assert_eq!(cpu.bus.mem[0x100], 9);
    }

    #[test]
    fn long_multiply() {
        // mvn r0, #0; mov r1, #2; umull r3, r4, r0, r1
        let mut cpu = cpu_with(&[0xE3E0_0000, 0xE3A0_1002, 0xE084_3190]);
        run(&mut cpu, 3);
        // 0xFFFFFFFF * 2 = 0x1_FFFF_FFFE
        assert_eq!(cpu.state.reg(3), 0xFFFF_FFFE);
        assert_eq!(cpu.state.reg(4), 1);
    }
}
