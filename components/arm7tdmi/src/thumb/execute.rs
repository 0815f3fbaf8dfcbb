// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

use common::numutil::NumExt;

use super::{Imm8Op, LdrStrImmOp, LdrStrRegOp, ThumbAluOp, ThumbOp};
use crate::{
    interface::{Access, Bus},
    state::Flag::{Carry, Thumb},
    Cpu,
};

impl<S: Bus> Cpu<S> {
    pub(crate) fn run_thumb(&mut self, op: ThumbOp) {
        match op {
            ThumbOp::ShiftImm { op, rd, rs, by } => {
                let value = self.state.low(rs);
                let value = self.shift::<true, true>(op, value, by);
                self.state.registers[rd.us()] = value;
            }

            ThumbOp::AddSub {
                sub,
                imm,
                rd,
                rs,
                n,
            } => {
                let rs = self.state.low(rs);
                let second = if imm { n.u32() } else { self.state.low(n) };
                let value = if sub {
                    self.state.sub::<true>(rs, second)
                } else {
                    self.state.add::<true>(rs, second)
                };
                self.state.registers[rd.us()] = value;
            }

            ThumbOp::Imm8 { op, rd, n } => {
                let prev = self.state.low(rd);
                match op {
                    Imm8Op::Mov => {
                        self.state.set_nz::<true>(n);
                        self.state.registers[rd.us()] = n;
                    }
                    Imm8Op::Cmp => {
                        self.state.sub::<true>(prev, n);
                    }
                    Imm8Op::Add => {
                        self.state.registers[rd.us()] = self.state.add::<true>(prev, n)
                    }
                    Imm8Op::Sub => {
                        self.state.registers[rd.us()] = self.state.sub::<true>(prev, n)
                    }
                }
            }

            ThumbOp::Alu { op, rd, rs } => self.thumb_alu(op, rd, rs),

            ThumbOp::HiAdd { rd, rs } => {
                let value = self.state.reg(rd).wrapping_add(self.state.reg(rs));
                self.set_reg(rd, value);
            }
            ThumbOp::HiCmp { rd, rs } => {
                let rs = self.state.reg(rs);
                let rd = self.state.reg(rd);
                self.state.sub::<true>(rd, rs);
            }
            ThumbOp::HiMov { rd, rs } => {
                let value = self.state.reg(rs);
                self.set_reg(rd, value);
            }
            ThumbOp::Bx { rs } => {
                if rs == 15 {
                    // BX PC switches to ARM at the aligned PC
                    self.state.set_flag(Thumb, false);
                    let pc = self.state.pc();
                    self.set_pc(pc);
                } else {
                    let rn = self.state.reg(rs);
                    if rn.is_bit(0) {
                        self.set_pc(rn & !1);
                    } else {
                        self.state.set_flag(Thumb, false);
                        self.set_pc(rn & !3);
                    }
                }
            }

            ThumbOp::LdrPc { rd, offset } => {
                let addr = self.state.adj_pc().wrapping_add(offset);
                let value = self.read_word_ldrswp(addr, Access::NonSeq);
                self.state.registers[rd.us()] = value;
                self.idle_nonseq();
            }

            ThumbOp::LdrStrReg { op, rd, rb, ro } => {
                let addr = self.state.low(rb).wrapping_add(self.state.low(ro));
                self.ldrstr_reg(op, rd, addr);
            }

            ThumbOp::LdrStrImm { op, rd, rb, offset } => {
                let addr = self.state.low(rb).wrapping_add(offset);
                let value = self.state.low(rd);
                self.state.access_type = Access::NonSeq;
                match op {
                    LdrStrImmOp::Str => self.write::<u32>(addr, value, Access::NonSeq),
                    LdrStrImmOp::Strh => self.write::<u16>(addr, value.u16(), Access::NonSeq),
                    LdrStrImmOp::Strb => self.write::<u8>(addr, value.u8(), Access::NonSeq),
                    LdrStrImmOp::Ldr => {
                        self.state.registers[rd.us()] =
                            self.read_word_ldrswp(addr, Access::NonSeq);
                        self.idle_nonseq();
                    }
                    LdrStrImmOp::Ldrh => {
                        self.state.registers[rd.us()] = self.read::<u16>(addr, Access::NonSeq);
                        self.idle_nonseq();
                    }
                    LdrStrImmOp::Ldrb => {
                        self.state.registers[rd.us()] =
                            self.read::<u8>(addr, Access::NonSeq).u32();
                        self.idle_nonseq();
                    }
                }
            }

            ThumbOp::LdrStrSp { load, rd, offset } => {
                let addr = self.state.sp().wrapping_add(offset);
                self.state.access_type = Access::NonSeq;
                if load {
                    self.state.registers[rd.us()] = self.read_word_ldrswp(addr, Access::NonSeq);
                    self.idle_nonseq();
                } else {
                    let value = self.state.low(rd);
                    self.write::<u32>(addr, value, Access::NonSeq);
                }
            }

            ThumbOp::RelAddr { sp, rd, offset } => {
                let base = if sp {
                    self.state.sp()
                } else {
                    self.state.adj_pc()
                };
                self.state.registers[rd.us()] = base.wrapping_add(offset);
            }

            ThumbOp::SpOffset { offset } => {
                let sp = self.state.sp();
                self.state.set_sp(sp.wrapping_add_signed(offset));
            }

            ThumbOp::Push { rlist, lr } => self.push(rlist, lr),
            ThumbOp::Pop { rlist, pc } => self.pop(rlist, pc),
            ThumbOp::Stmia { rb, rlist } => self.stmia(rb, rlist),
            ThumbOp::Ldmia { rb, rlist } => self.ldmia(rb, rlist),

            ThumbOp::BranchCond { cond, offset } => {
                if self.state.eval_condition(cond) {
                    let pc = self.state.pc();
                    self.set_pc(pc.wrapping_add_signed(offset));
                }
            }
            ThumbOp::Swi => self.swi(),
            ThumbOp::Branch { offset } => {
                let pc = self.state.pc();
                self.set_pc(pc.wrapping_add_signed(offset));
            }
            ThumbOp::BlSetup { offset } => {
                let lr = self.state.pc().wrapping_add_signed(offset);
                self.state.set_lr(lr);
            }
            ThumbOp::Bl { offset } => {
                let pc = self.state.pc();
                let target = self.state.lr().wrapping_add(offset);
                self.set_pc(target);
                // Bit 0 of LR marks the return as THUMB
                self.state.set_lr(pc.wrapping_sub(1));
            }

            ThumbOp::Undefined(inst) => self.und_inst(inst),
        }
    }

    fn thumb_alu(&mut self, op: ThumbAluOp, rd: u16, rs: u16) {
        let prev = self.state.low(rd);
        let rs = self.state.low(rs);

        self.state.registers[rd.us()] = match op {
            ThumbAluOp::And => self.state.and::<true>(prev, rs),
            ThumbAluOp::Eor => self.state.xor::<true>(prev, rs),
            ThumbAluOp::Lsl => {
                self.idle_nonseq();
                self.state.lsl::<true>(prev, rs & 0xFF)
            }
            ThumbAluOp::Lsr => {
                self.idle_nonseq();
                self.state.lsr::<true, false>(prev, rs & 0xFF)
            }
            ThumbAluOp::Asr => {
                self.idle_nonseq();
                self.state.asr::<true, false>(prev, rs & 0xFF)
            }
            ThumbAluOp::Adc => {
                let c = self.state.is_flag(Carry) as u32;
                self.state.adc::<true>(prev, rs, c)
            }
            ThumbAluOp::Sbc => {
                let c = self.state.is_flag(Carry) as u32;
                self.state.sbc::<true>(prev, rs, c)
            }
            ThumbAluOp::Ror => {
                self.idle_nonseq();
                self.state.ror::<true, false>(prev, rs & 0xFF)
            }
            ThumbAluOp::Tst => {
                self.state.and::<true>(prev, rs);
                prev
            }
            ThumbAluOp::Neg => self.state.neg::<true>(rs),
            ThumbAluOp::Cmp => {
                self.state.sub::<true>(prev, rs);
                prev
            }
            ThumbAluOp::Cmn => {
                self.state.add::<true>(prev, rs);
                prev
            }
            ThumbAluOp::Orr => self.state.or::<true>(prev, rs),
            ThumbAluOp::Mul => {
                self.mul_wait_cycles(prev, true);
                self.state.mul::<true>(prev, rs)
            }
            ThumbAluOp::Bic => self.state.bit_clear::<true>(prev, rs),
            ThumbAluOp::Mvn => self.state.not::<true>(rs),
        };
    }

    fn ldrstr_reg(&mut self, op: LdrStrRegOp, rd: u16, addr: u32) {
        let value = self.state.low(rd);
        self.state.access_type = Access::NonSeq;

        let loaded = match op {
            LdrStrRegOp::Str => {
                self.write::<u32>(addr, value, Access::NonSeq);
                None
            }
            LdrStrRegOp::Strh => {
                self.write::<u16>(addr, value.u16(), Access::NonSeq);
                None
            }
            LdrStrRegOp::Strb => {
                self.write::<u8>(addr, value.u8(), Access::NonSeq);
                None
            }
            LdrStrRegOp::Ldsb => Some(self.read::<u8>(addr, Access::NonSeq) as i8 as i32 as u32),
            LdrStrRegOp::Ldr => Some(self.read_word_ldrswp(addr, Access::NonSeq)),
            LdrStrRegOp::Ldrh => Some(self.read::<u16>(addr, Access::NonSeq)),
            LdrStrRegOp::Ldrb => Some(self.read::<u8>(addr, Access::NonSeq).u32()),
            // An unaligned LDSH behaves as LDSB of the addressed byte
            LdrStrRegOp::Ldsh if addr.is_bit(0) => {
                Some(self.read::<u8>(addr, Access::NonSeq) as i8 as i32 as u32)
            }
            LdrStrRegOp::Ldsh => {
                Some(self.read::<u16>(addr, Access::NonSeq) as u16 as i16 as i32 as u32)
            }
        };

        if let Some(value) = loaded {
            self.state.registers[rd.us()] = value;
            self.idle_nonseq();
        }
    }

    fn push(&mut self, rlist: u8, lr: bool) {
        let mut sp = self.state.sp();
        let mut access = Access::NonSeq;

        if lr {
            sp = sp.wrapping_sub(4);
            let lr = self.state.lr();
            self.write::<u32>(sp, lr, access);
            access = Access::Seq;
        }
        for reg in (0..8).rev() {
            if rlist.is_bit(reg) {
                sp = sp.wrapping_sub(4);
                let value = self.state.registers[reg.us()];
                self.write::<u32>(sp, value, access);
                access = Access::Seq;
            }
        }

        self.state.set_sp(sp);
        self.state.access_type = Access::NonSeq;
    }

    fn pop(&mut self, rlist: u8, pc: bool) {
        let mut sp = self.state.sp();
        let mut access = Access::NonSeq;

        for reg in 0..8 {
            if rlist.is_bit(reg) {
                self.state.registers[reg.us()] = self.read::<u32>(sp, access);
                sp = sp.wrapping_add(4);
                access = Access::Seq;
            }
        }
        if pc {
            let value = self.read::<u32>(sp, access);
            sp = sp.wrapping_add(4);
            self.set_pc(value);
        }

        self.state.set_sp(sp);
        self.idle_nonseq();
    }

    fn stmia(&mut self, rb: u16, rlist: u8) {
        if rlist == 0 {
            self.on_empty_rlist(rb.u32(), true, true, false);
            self.state.access_type = Access::NonSeq;
            return;
        }

        let mut access = Access::NonSeq;
        let mut base_in_list_addr = None;
        let mut addr = self.state.low(rb);
        for reg in 0..8 {
            if rlist.is_bit(reg) {
                if reg == rb && access != Access::NonSeq {
                    base_in_list_addr = Some(self.state.low(rb));
                }
                let value = self.state.registers[reg.us()];
                self.write::<u32>(addr, value, access);
                addr = addr.wrapping_add(4);
                self.state.registers[rb.us()] = addr;
                access = Access::Seq;
            }
        }
        if let Some(addr) = base_in_list_addr {
            // A stored base that was not the first entry reads as the
            // written-back value; fix the slot up after the fact
            let value = self.state.low(rb);
            self.bus.set::<u32>(&mut self.state, addr, value);
        }
        self.state.access_type = Access::NonSeq;
    }

    fn ldmia(&mut self, rb: u16, rlist: u8) {
        if rlist == 0 {
            self.on_empty_rlist(rb.u32(), false, true, false);
            self.idle_nonseq();
            return;
        }

        let mut access = Access::NonSeq;
        for reg in 0..8 {
            if rlist.is_bit(reg) {
                let addr = self.state.low(rb);
                self.state.registers[reg.us()] = self.read::<u32>(addr, access);
                self.state.registers[rb.us()] = addr.wrapping_add(4);
                access = Access::Seq;
            }
        }
        self.idle_nonseq();
    }
}

#[cfg(test)]
mod tests {
    use common::{numutil::NumExt, Time};

    use crate::{
        interface::{Access, Bus, RwType},
        state::{CpuState, Flag},
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

    fn cpu_with(program: &[u16]) -> Cpu<TestBus> {
        let mut mem = vec![0; 0x1_0000];
        for (i, inst) in program.iter().enumerate() {
            mem[i * 2..i * 2 + 2].copy_from_slice(&inst.to_le_bytes());
        }
        let mut cpu = Cpu::new(TestBus { mem });
        cpu.state.set_flag(Flag::Thumb, true);
        cpu.state.set_sp(0x8000);
        cpu.set_pc(0);
        cpu
    }

    fn run(cpu: &mut Cpu<TestBus>, count: usize) {
        for _ in 0..count {
            cpu.continue_running();
        }
    }

    #[test]
    fn immediate_arithmetic() {
        // mov r0, #5; add r0, #3; lsl r1, r0, #2
        let mut cpu = cpu_with(&[0x2005, 0x3003, 0x0081]);
        run(&mut cpu, 3);
        assert_eq!(cpu.state.low(0), 8);
        assert_eq!(cpu.state.low(1), 32);
    }

    #[test]
    fn alu_flags() {
        // mov r0, #5; sub r0, #5; beq +2; mov r1, #7 (skipped); mov r2, #9
        let mut cpu = cpu_with(&[0x2005, 0x3805, 0xD001, 0x2107, 0x2107, 0x2209]);
        run(&mut cpu, 4);
        assert_eq!(cpu.state.low(2), 9);
        assert_eq!(cpu.state.low(1), 0);
    }

    #[test]
    fn push_pop_round_trip() {
        // mov r0, #5; push {r0}; mov r0, #0; pop {r1}
        let mut cpu = cpu_with(&[0x2005, 0xB401, 0x2000, 0xBC02]);
        run(&mut cpu, 4);
        assert_eq!(cpu.state.low(1), 5);
        assert_eq!(cpu.state.sp(), 0x8000);
    }

    #[test]
    fn load_store_immediate() {
        // mov r1, #0x80; mov r0, #0x55; str r0, [r1]; ldr r2, [r1]
        let mut cpu = cpu_with(&[0x2180, 0x2055, 0x6008, 0x680A]);
        run(&mut cpu, 4);
        assert_eq!(cpu.state.low(2), 0x55);
    }

    #[test]
    fn long_branch_with_link() {
        // bl setup + offset; target is two instructions ahead
        let mut cpu = cpu_with(&[0xF000, 0xF802, 0x2001, 0x2001, 0x2002]);
        run(&mut cpu, 3);
        assert_eq!(cpu.state.low(0), 2);
        // Return address is the instruction after the pair, bit 0 set
        assert_eq!(cpu.state.lr(), 5);
    }

    #[test]
    fn stmia_advances_base() {
        // mov r0, #1; mov r1, #2; mov r2, #0x80; stmia r2!, {r0, r1}
        let mut cpu = cpu_with(&[0x2001, 0x2102, 0x2280, 0xC203]);
        run(&mut cpu, 4);
        assert_eq!(cpu.state.low(2), 0x88);
        assert_eq!(cpu.bus.mem[0x80], 1);
        assert_eq!(cpu.bus.mem[0x84], 2);
    }

    #[test]
    fn bx_switches_to_arm() {
        // mov r0, #0x80; bx r0
        let mut cpu = cpu_with(&[0x2080, 0x4700]);
        run(&mut cpu, 2);
        assert!(!cpu.state.is_flag(Flag::Thumb));
        assert_eq!(cpu.state.pc(), 0x84);
    }
}
