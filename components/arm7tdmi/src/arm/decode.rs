// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder for ARM instructions. Decoding is pure classification of a
//! fetched word into exactly one shape; no state, no memory access.
//! The arms are ordered so that the more specific encodings (BX, SWP,
//! PSR transfer, multiplies) win over the data processing patterns
//! they overlap with.

use bitmatch::bitmatch;
use common::numutil::{NumExt, U32Ext};

use crate::condition_mnemonic;

/// A decoded ARM instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArmOp {
    /// B/BL, offset in bytes relative to the pipeline PC.
    Branch { offset: i32, link: bool },
    /// BX, branch with optional state switch on bit 0.
    BranchExchange { rn: u32 },
    SoftwareInterrupt,
    Mrs {
        rd: u32,
        spsr: bool,
    },
    Msr {
        src: PsrSource,
        flags: bool,
        ctrl: bool,
        spsr: bool,
    },
    DataProcessing {
        op: AluOp,
        rn: u32,
        rd: u32,
        op2: ArmOperand,
        set_flags: bool,
    },
    Multiply {
        op: MulOp,
        rd: u32,
        rn: u32,
        rs: u32,
        rm: u32,
        set_flags: bool,
    },
    SingleTransfer {
        kind: LdrStrKind,
        cfg: LdrStrConfig,
        rn: u32,
        rd: u32,
        offset: LdrStrOffset,
    },
    BlockTransfer {
        cfg: LdmStmConfig,
        rn: u32,
        rlist: u16,
        user: bool,
    },
    Swap {
        rn: u32,
        rd: u32,
        rm: u32,
        byte: bool,
    },
    Undefined(u32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd)]
pub enum AluOp {
    And,
    Eor,
    Sub,
    Rsb,
    Add,
    Adc,
    Sbc,
    Rsc,
    Tst,
    Teq,
    Cmp,
    Cmn,
    Orr,
    Mov,
    Bic,
    Mvn,
}

impl AluOp {
    fn of(bits: u32) -> Self {
        const OPS: [AluOp; 16] = [
            AluOp::And,
            AluOp::Eor,
            AluOp::Sub,
            AluOp::Rsb,
            AluOp::Add,
            AluOp::Adc,
            AluOp::Sbc,
            AluOp::Rsc,
            AluOp::Tst,
            AluOp::Teq,
            AluOp::Cmp,
            AluOp::Cmn,
            AluOp::Orr,
            AluOp::Mov,
            AluOp::Bic,
            AluOp::Mvn,
        ];
        OPS[bits.us() & 15]
    }

    /// TST/TEQ/CMP/CMN only set flags, they never write Rd.
    pub fn is_test(self) -> bool {
        (Self::Tst..=Self::Cmn).contains(&self)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShiftKind {
    Lsl,
    Lsr,
    Asr,
    Ror,
}

impl ShiftKind {
    fn of(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Lsl,
            1 => Self::Lsr,
            2 => Self::Asr,
            _ => Self::Ror,
        }
    }

    fn mnemonic(self) -> &'static str {
        match self {
            Self::Lsl => "lsl",
            Self::Lsr => "lsr",
            Self::Asr => "asr",
            Self::Ror => "ror",
        }
    }
}

/// Second operand of a data processing instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ArmOperand {
    /// 8-bit immediate rotated right by a 4-bit amount doubled.
    Immediate { value: u32, ror_by: u32 },
    /// Register shifted by a 5-bit immediate.
    RegShiftImm { rm: u32, kind: ShiftKind, by: u32 },
    /// Register shifted by the low byte of another register.
    RegShiftReg { rm: u32, kind: ShiftKind, rs: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PsrSource {
    /// Pre-rotated immediate.
    Immediate(u32),
    Register(u32),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MulOp {
    Mul,
    Mla,
    Umull,
    Umlal,
    Smull,
    Smlal,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd)]
pub enum LdrStrKind {
    LoadWord,
    LoadByte,
    LoadHalfword,
    LoadSignedByte,
    LoadSignedHalfword,
    StoreWord,
    StoreByte,
    StoreHalfword,
}

impl LdrStrKind {
    pub fn is_str(self) -> bool {
        self >= Self::StoreWord
    }

    /// Access width in bytes.
    pub fn width(self) -> u32 {
        match self {
            Self::LoadWord | Self::StoreWord => 4,
            Self::LoadHalfword | Self::LoadSignedHalfword | Self::StoreHalfword => 2,
            _ => 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LdrStrConfig {
    pub pre: bool,
    pub up: bool,
    pub writeback: bool,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LdrStrOffset {
    Immediate(u32),
    Register(u32),
    ShiftedRegister { rm: u32, kind: ShiftKind, by: u32 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LdmStmConfig {
    pub pre: bool,
    pub up: bool,
    pub ldr: bool,
    pub writeback: bool,
}

/// Decode an ARM instruction word. The condition field is not part of
/// the decoded shape; it is evaluated before decoding.
#[bitmatch]
pub fn decode(inst: u32) -> ArmOp {
    #[bitmatch]
    match inst {
        // Branch and exchange
        "????000100101111111111110001nnnn" => ArmOp::BranchExchange { rn: n },

        // Single data swap
        "????00010b00nnnndddd00001001mmmm" => ArmOp::Swap {
            rn: n,
            rd: d,
            rm: m,
            byte: b == 1,
        },

        // PSR transfer
        "????00010s001111dddd000000000000" => ArmOp::Mrs { rd: d, spsr: s == 1 },
        "????00010s10f??c111100000000mmmm" => ArmOp::Msr {
            src: PsrSource::Register(m),
            flags: f == 1,
            ctrl: c == 1,
            spsr: s == 1,
        },
        "????00110s10f??c1111rrrriiiiiiii" => ArmOp::Msr {
            src: PsrSource::Immediate(i.rotate_right(r * 2)),
            flags: f == 1,
            ctrl: c == 1,
            spsr: s == 1,
        },

        // Multiply and multiply long
        "????0000ooocddddnnnnssss1001mmmm" => {
            let op = match o {
                0b000 => MulOp::Mul,
                0b001 => MulOp::Mla,
                0b100 => MulOp::Umull,
                0b101 => MulOp::Umlal,
                0b110 => MulOp::Smull,
                0b111 => MulOp::Smlal,
                _ => return ArmOp::Undefined(inst),
            };
            ArmOp::Multiply {
                op,
                rd: d,
                rn: n,
                rs: s,
                rm: m,
                set_flags: c == 1,
            }
        }

        // Halfword and signed transfers
        "????000puiwlnnnnddddjjjj1oo1mmmm" => {
            let kind = match (l == 1, o) {
                (true, 1) => LdrStrKind::LoadHalfword,
                (true, 2) => LdrStrKind::LoadSignedByte,
                (true, 3) => LdrStrKind::LoadSignedHalfword,
                (false, 1) => LdrStrKind::StoreHalfword,
                _ => return ArmOp::Undefined(inst),
            };
            ArmOp::SingleTransfer {
                kind,
                cfg: LdrStrConfig {
                    pre: p == 1,
                    up: u == 1,
                    writeback: w == 1,
                },
                rn: n,
                rd: d,
                offset: if i == 1 {
                    LdrStrOffset::Immediate((j << 4) | m)
                } else {
                    LdrStrOffset::Register(m)
                },
            }
        }

        // Data processing
        "????000oooocnnnnddddaaaaaqq0mmmm" => dp_op(
            inst,
            o,
            c,
            n,
            d,
            ArmOperand::RegShiftImm {
                rm: m,
                kind: ShiftKind::of(q),
                by: a,
            },
        ),
        "????000oooocnnnnddddssss0qq1mmmm" => dp_op(
            inst,
            o,
            c,
            n,
            d,
            ArmOperand::RegShiftReg {
                rm: m,
                kind: ShiftKind::of(q),
                rs: s,
            },
        ),
        "????001oooocnnnnddddrrrriiiiiiii" => dp_op(
            inst,
            o,
            c,
            n,
            d,
            ArmOperand::Immediate {
                value: i,
                ror_by: r * 2,
            },
        ),

        // Single data transfer
        "????010pubwlnnnnddddiiiiiiiiiiii" => ArmOp::SingleTransfer {
            kind: ldrstr_kind(l == 1, b == 1),
            cfg: LdrStrConfig {
                pre: p == 1,
                up: u == 1,
                writeback: w == 1,
            },
            rn: n,
            rd: d,
            offset: LdrStrOffset::Immediate(i),
        },
        "????011pubwlnnnnddddaaaaaqq0mmmm" => ArmOp::SingleTransfer {
            kind: ldrstr_kind(l == 1, b == 1),
            cfg: LdrStrConfig {
                pre: p == 1,
                up: u == 1,
                writeback: w == 1,
            },
            rn: n,
            rd: d,
            offset: LdrStrOffset::ShiftedRegister {
                rm: m,
                kind: ShiftKind::of(q),
                by: a,
            },
        },

        // Block data transfer
        "????100puswlnnnnrrrrrrrrrrrrrrrr" => ArmOp::BlockTransfer {
            cfg: LdmStmConfig {
                pre: p == 1,
                up: u == 1,
                ldr: l == 1,
                writeback: w == 1,
            },
            rn: n,
            rlist: r.u16(),
            user: s == 1,
        },

        // Branches and software interrupt
        "????101lnnnnnnnnnnnnnnnnnnnnnnnn" => ArmOp::Branch {
            offset: n.i24() * 4,
            link: l == 1,
        },
        "????1111????????????????????????" => ArmOp::SoftwareInterrupt,

        // The canonical undefined space and the coprocessor space
        _ => ArmOp::Undefined(inst),
    }
}

fn ldrstr_kind(load: bool, byte: bool) -> LdrStrKind {
    match (load, byte) {
        (true, true) => LdrStrKind::LoadByte,
        (true, false) => LdrStrKind::LoadWord,
        (false, true) => LdrStrKind::StoreByte,
        (false, false) => LdrStrKind::StoreWord,
    }
}

fn dp_op(inst: u32, o: u32, s: u32, rn: u32, rd: u32, op2: ArmOperand) -> ArmOp {
    let op = AluOp::of(o);
    if op.is_test() && s == 0 {
        // TST/TEQ/CMP/CMN without S is the PSR transfer space,
        // anything left over here is undefined
        return ArmOp::Undefined(inst);
    }
    ArmOp::DataProcessing {
        op,
        rn,
        rd,
        op2,
        set_flags: s == 1,
    }
}

/// Disassemble an ARM instruction word, mostly for logging and tests.
#[bitmatch]
pub fn mnemonic(inst: u32) -> String {
    let co = condition_mnemonic(((inst >> 28) & 0xF).u16());
    #[bitmatch]
    match inst {
        "????000100101111111111110001nnnn" => format!("bx{co} r{n}"),
        "????00010b00nnnndddd00001001mmmm" => {
            let b = if b == 1 { "b" } else { "" };
            format!("swp{b}{co} r{d}, r{m}, [r{n}]")
        }
        "????00010s001111dddd000000000000" => {
            format!("mrs{co} r{d}, {}", if s == 1 { "spsr" } else { "cpsr" })
        }
        "????00010?10???c111100000000mmmm" => {
            format!("msr{co} {}, r{m}", if c == 1 { "psr" } else { "psr_f" })
        }
        "????00110?10???c1111rrrriiiiiiii" => {
            format!("msr{co} psr, #0x{:X}", i.rotate_right(r * 2))
        }
        "????0000000cddddnnnnssss1001mmmm" => format!("mul{co} r{d}, r{m}, r{s} ({c})"),
        "????0000001cddddnnnnssss1001mmmm" => format!("mla{co} r{d}, r{m}, r{s}, r{n} ({c})"),
        "????0000100cddddnnnnssss1001mmmm" => format!("umull{co} r{d}r{n}, (r{m} * r{s}) ({c})"),
        "????0000101cddddnnnnssss1001mmmm" => format!("umlal{co} r{d}r{n} ({c})"),
        "????0000110cddddnnnnssss1001mmmm" => format!("smull{co} r{d}r{n}, (r{m} * r{s}) ({c})"),
        "????0000111cddddnnnnssss1001mmmm" => format!("smlal{co} r{d}r{n} ({c})"),
        "????000pu?wlnnnnddddjjjj1oo1mmmm" => {
            let op = match (l == 1, o) {
                (true, 1) => "ldrh",
                (true, 2) => "ldrsb",
                (true, 3) => "ldrsh",
                _ => "strh",
            };
            let u = if u == 1 { "+" } else { "-" };
            if p == 1 {
                format!("{op}{co} r{d}, [r{n} {u}0x{:X}]", (j << 4) | m)
            } else {
                format!("{op}{co} r{d}, [r{n}], {u}0x{:X}", (j << 4) | m)
            }
        }
        "????000oooocnnnnddddaaaaaqq0mmmm" => {
            dp_mnemonic(co, o, c, n, d, &format!("(r{m} {} {a})", ShiftKind::of(q).mnemonic()))
        }
        "????000oooocnnnnddddssss0qq1mmmm" => {
            dp_mnemonic(co, o, c, n, d, &format!("(r{m} {} r{s})", ShiftKind::of(q).mnemonic()))
        }
        "????001oooocnnnnddddrrrriiiiiiii" => {
            dp_mnemonic(co, o, c, n, d, &format!("#0x{:X}", i.rotate_right(r * 2)))
        }
        "????010pubwlnnnnddddiiiiiiiiiiii" => {
            let op = if l == 1 { "ldr" } else { "str" };
            let b = if b == 1 { "b" } else { "" };
            let u = if u == 1 { "+" } else { "-" };
            if p == 1 {
                format!("{op}{b}{co} r{d}, [r{n}{u}0x{:X}]", i)
            } else {
                format!("{op}{b}{co} r{d}, [r{n}], {u}0x{:X}", i)
            }
        }
        "????011pubwlnnnnddddaaaaaqq0mmmm" => {
            let op = if l == 1 { "ldr" } else { "str" };
            let b = if b == 1 { "b" } else { "" };
            let u = if u == 1 { "+" } else { "-" };
            format!(
                "{op}{b}{co} r{d}, [r{n}] {u}(r{m} {} {a})",
                ShiftKind::of(q).mnemonic()
            )
        }
        "????100puswlnnnnrrrrrrrrrrrrrrrr" => {
            let op = if l == 1 { "ldm" } else { "stm" };
            let pu = match (p == 1, u == 1) {
                (true, true) => "ib",
                (false, true) => "ia",
                (true, false) => "db",
                (false, false) => "da",
            };
            let w = if w == 1 { "!" } else { "" };
            let s = if s == 1 { "^" } else { "" };
            format!("{op}{pu}{co} r{n}{w}, {:016b}{s}", r)
        }
        "????101lnnnnnnnnnnnnnnnnnnnnnnnn" => {
            let l = if l == 1 { "l" } else { "" };
            format!("b{l}{co} {}", n.i24() * 4 + 8)
        }
        "????1111nnnnnnnnnnnnnnnnnnnnnnnn" => format!("swi{co} 0x{:06X}", n),
        _ => format!("undefined 0x{inst:08X}"),
    }
}

fn dp_mnemonic(co: &str, o: u32, s: u32, n: u32, d: u32, op2: &str) -> String {
    let op = AluOp::of(o);
    let name = format!("{op:?}").to_lowercase();
    let s = if s == 1 { "s" } else { "" };
    match op {
        AluOp::Mov | AluOp::Mvn => format!("{name}{s}{co} r{d}, {op2}"),
        _ if op.is_test() => format!("{name}{co} r{n}, {op2}"),
        _ => format!("{name}{s}{co} r{d}, r{n}, {op2}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_branches() {
        assert_eq!(
            decode(0xEA00_0000),
            ArmOp::Branch {
                offset: 0,
                link: false
            }
        );
        assert_eq!(
            decode(0xEBFF_FFFF),
            ArmOp::Branch {
                offset: -4,
                link: true
            }
        );
        assert_eq!(decode(0xE12F_FF11), ArmOp::BranchExchange { rn: 1 });
        assert_eq!(decode(0xEF00_0000), ArmOp::SoftwareInterrupt);
    }

    #[test]
    fn decode_data_processing() {
        // mov r0, #1
        assert_eq!(
            decode(0xE3A0_0001),
            ArmOp::DataProcessing {
                op: AluOp::Mov,
                rn: 0,
                rd: 0,
                op2: ArmOperand::Immediate { value: 1, ror_by: 0 },
                set_flags: false,
            }
        );
        // adds r2, r1, r0 lsl #4
        assert_eq!(
            decode(0xE091_2200),
            ArmOp::DataProcessing {
                op: AluOp::Add,
                rn: 1,
                rd: 2,
                op2: ArmOperand::RegShiftImm {
                    rm: 0,
                    kind: ShiftKind::Lsl,
                    by: 4
                },
                set_flags: true,
            }
        );
        // cmp r1, r2 ror r3
        assert_eq!(
            decode(0xE151_0372),
            ArmOp::DataProcessing {
                op: AluOp::Cmp,
                rn: 1,
                rd: 0,
                op2: ArmOperand::RegShiftReg {
                    rm: 2,
                    kind: ShiftKind::Ror,
                    rs: 3
                },
                set_flags: true,
            }
        );
    }

    #[test]
    fn decode_psr_transfer() {
        // mrs r0, cpsr
        assert_eq!(
            decode(0xE10F_0000),
            ArmOp::Mrs {
                rd: 0,
                spsr: false
            }
        );
        // msr cpsr_fc, r0
        assert_eq!(
            decode(0xE129_F000),
            ArmOp::Msr {
                src: PsrSource::Register(0),
                flags: true,
                ctrl: true,
                spsr: false,
            }
        );
        // TEQ without S never decodes as data processing
        assert!(matches!(decode(0xE120_0000), ArmOp::Undefined(_)));
    }

    #[test]
    fn decode_transfers() {
        // ldr r0, [r1, #8]
        assert_eq!(
            decode(0xE591_0008),
            ArmOp::SingleTransfer {
                kind: LdrStrKind::LoadWord,
                cfg: LdrStrConfig {
                    pre: true,
                    up: true,
                    writeback: false
                },
                rn: 1,
                rd: 0,
                offset: LdrStrOffset::Immediate(8),
            }
        );
        // strh r2, [r3], #-2
        assert_eq!(
            decode(0xE043_20B2),
            ArmOp::SingleTransfer {
                kind: LdrStrKind::StoreHalfword,
                cfg: LdrStrConfig {
                    pre: false,
                    up: false,
                    writeback: false
                },
                rn: 3,
                rd: 2,
                offset: LdrStrOffset::Immediate(2),
            }
        );
        // ldmia r13!, {r0-r3}
        assert_eq!(
            decode(0xE8BD_000F),
            ArmOp::BlockTransfer {
                cfg: LdmStmConfig {
                    pre: false,
                    up: true,
                    ldr: true,
                    writeback: true
                },
                rn: 13,
                rlist: 0xF,
                user: false,
            }
        );
        // swpb r0, r1, [r2]
        assert_eq!(
            decode(0xE142_0091),
            ArmOp::Swap {
                rn: 2,
                rd: 0,
                rm: 1,
                byte: true
            }
        );
    }

    #[test]
    fn decode_multiplies() {
        // mul r0, r1, r2
        assert_eq!(
            decode(0xE000_0291),
            ArmOp::Multiply {
                op: MulOp::Mul,
                rd: 0,
                rn: 0,
                rs: 2,
                rm: 1,
                set_flags: false,
            }
        );
        // umulls r1, r0, r2, r3
        assert_eq!(
            decode(0xE091_0392),
            ArmOp::Multiply {
                op: MulOp::Umull,
                rd: 1,
                rn: 0,
                rs: 3,
                rm: 2,
                set_flags: true,
            }
        );
    }

    #[test]
    fn undefined_space() {
        // Bit 4 set in the register-offset transfer space
        assert!(matches!(decode(0xE7F0_0010), ArmOp::Undefined(_)));
        // Coprocessor space
        assert!(matches!(decode(0xEE00_0000), ArmOp::Undefined(_)));
    }

    #[test]
    fn mnemonics() {
        assert_eq!(mnemonic(0xE3A0_0001), "mov r0, #0x1");
        assert_eq!(mnemonic(0xE12F_FF11), "bx r1");
        assert_eq!(mnemonic(0x0A00_0000), "beq 8");
    }
}
