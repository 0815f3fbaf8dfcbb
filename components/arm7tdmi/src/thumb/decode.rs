// Unless otherwise noted, this file is released and thus subject to the
// terms of the Mozilla Public License Version 2.0 (MPL2). Also, it is
// "Incompatible With Secondary Licenses", as defined by the MPL2.
// If a copy of the MPL2 was not distributed with this file, you can
// obtain one at https://mozilla.org/MPL/2.0/.

//! Decoder for THUMB instructions. Same idea as the ARM decoder,
//! with the formats of the compressed instruction set. BLX encodings
//! are not part of ARMv4T and decode as undefined.

use bitmatch::bitmatch;
use common::numutil::NumExt;

use crate::{arm::ShiftKind, condition_mnemonic};

/// A decoded THUMB instruction.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ThumbOp {
    /// Format 1, shift by immediate.
    ShiftImm {
        op: ShiftKind,
        rd: u16,
        rs: u16,
        by: u32,
    },
    /// Format 2, 3-bit add/subtract.
    AddSub {
        sub: bool,
        imm: bool,
        rd: u16,
        rs: u16,
        n: u16,
    },
    /// Format 3, 8-bit immediate operations.
    Imm8 { op: Imm8Op, rd: u16, n: u32 },
    /// Format 4, register ALU operations.
    Alu { op: ThumbAluOp, rd: u16, rs: u16 },
    /// Format 5, high register operations.
    HiAdd { rd: u32, rs: u32 },
    HiCmp { rd: u32, rs: u32 },
    HiMov { rd: u32, rs: u32 },
    Bx { rs: u32 },
    /// Format 6, PC-relative load.
    LdrPc { rd: u16, offset: u32 },
    /// Formats 7 and 8, loads/stores with register offset.
    LdrStrReg {
        op: LdrStrRegOp,
        rd: u16,
        rb: u16,
        ro: u16,
    },
    /// Formats 9 and 10, loads/stores with immediate offset.
    LdrStrImm {
        op: LdrStrImmOp,
        rd: u16,
        rb: u16,
        offset: u32,
    },
    /// Format 11, SP-relative loads/stores.
    LdrStrSp { load: bool, rd: u16, offset: u32 },
    /// Format 12, load address relative to PC or SP.
    RelAddr { sp: bool, rd: u16, offset: u32 },
    /// Format 13, SP adjustment.
    SpOffset { offset: i32 },
    /// Format 14, push/pop.
    Push { rlist: u8, lr: bool },
    Pop { rlist: u8, pc: bool },
    /// Format 15, multiple loads/stores.
    Stmia { rb: u16, rlist: u8 },
    Ldmia { rb: u16, rlist: u8 },
    /// Formats 16 through 19.
    BranchCond { cond: u16, offset: i32 },
    Swi,
    Branch { offset: i32 },
    BlSetup { offset: i32 },
    Bl { offset: u32 },
    Undefined(u16),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Imm8Op {
    Mov,
    Cmp,
    Add,
    Sub,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ThumbAluOp {
    And,
    Eor,
    Lsl,
    Lsr,
    Asr,
    Adc,
    Sbc,
    Ror,
    Tst,
    Neg,
    Cmp,
    Cmn,
    Orr,
    Mul,
    Bic,
    Mvn,
}

impl ThumbAluOp {
    fn of(bits: u16) -> Self {
        const OPS: [ThumbAluOp; 16] = [
            ThumbAluOp::And,
            ThumbAluOp::Eor,
            ThumbAluOp::Lsl,
            ThumbAluOp::Lsr,
            ThumbAluOp::Asr,
            ThumbAluOp::Adc,
            ThumbAluOp::Sbc,
            ThumbAluOp::Ror,
            ThumbAluOp::Tst,
            ThumbAluOp::Neg,
            ThumbAluOp::Cmp,
            ThumbAluOp::Cmn,
            ThumbAluOp::Orr,
            ThumbAluOp::Mul,
            ThumbAluOp::Bic,
            ThumbAluOp::Mvn,
        ];
        OPS[bits.us() & 15]
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LdrStrRegOp {
    Str,
    Strh,
    Strb,
    Ldsb,
    Ldr,
    Ldrh,
    Ldrb,
    Ldsh,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LdrStrImmOp {
    Str,
    Ldr,
    Strb,
    Ldrb,
    Strh,
    Ldrh,
}

/// Sign-extend an 11-bit branch field.
fn sign11(n: u16) -> i32 {
    ((n as i32) << 21) >> 21
}

/// Decode a THUMB instruction halfword.
#[bitmatch]
pub fn decode(inst: u16) -> ThumbOp {
    #[bitmatch]
    match inst {
        "11011111????????" => ThumbOp::Swi,

        "00011ionnnsssddd" => ThumbOp::AddSub {
            sub: o == 1,
            imm: i == 1,
            rd: d,
            rs: s,
            n,
        },
        "000oonnnnnsssddd" => ThumbOp::ShiftImm {
            op: match o {
                0 => ShiftKind::Lsl,
                1 => ShiftKind::Lsr,
                _ => ShiftKind::Asr,
            },
            rd: d,
            rs: s,
            by: n.u32(),
        },
        "001oodddnnnnnnnn" => ThumbOp::Imm8 {
            op: match o {
                0 => Imm8Op::Mov,
                1 => Imm8Op::Cmp,
                2 => Imm8Op::Add,
                _ => Imm8Op::Sub,
            },
            rd: d,
            n: n.u32(),
        },

        "010000oooosssddd" => ThumbOp::Alu {
            op: ThumbAluOp::of(o),
            rd: d,
            rs: s,
        },
        "010001oohssssddd" => {
            let rd = (d | (h << 3)).u32();
            let rs = s.u32();
            match o {
                0 => ThumbOp::HiAdd { rd, rs },
                1 => ThumbOp::HiCmp { rd, rs },
                2 => ThumbOp::HiMov { rd, rs },
                _ if h == 0 => ThumbOp::Bx { rs },
                _ => ThumbOp::Undefined(inst),
            }
        }

        "01001dddnnnnnnnn" => ThumbOp::LdrPc {
            rd: d,
            offset: n.u32() << 2,
        },
        "0101ooosssbbbddd" => {
            const OPS: [LdrStrRegOp; 8] = [
                LdrStrRegOp::Str,
                LdrStrRegOp::Strh,
                LdrStrRegOp::Strb,
                LdrStrRegOp::Ldsb,
                LdrStrRegOp::Ldr,
                LdrStrRegOp::Ldrh,
                LdrStrRegOp::Ldrb,
                LdrStrRegOp::Ldsh,
            ];
            ThumbOp::LdrStrReg {
                op: OPS[o.us()],
                rd: d,
                rb: b,
                ro: s,
            }
        }
        "011oonnnnnbbbddd" => {
            let (op, offset) = match o {
                0 => (LdrStrImmOp::Str, n.u32() << 2),
                1 => (LdrStrImmOp::Ldr, n.u32() << 2),
                2 => (LdrStrImmOp::Strb, n.u32()),
                _ => (LdrStrImmOp::Ldrb, n.u32()),
            };
            ThumbOp::LdrStrImm {
                op,
                rd: d,
                rb: b,
                offset,
            }
        }
        "1000lnnnnnbbbddd" => ThumbOp::LdrStrImm {
            op: if l == 1 {
                LdrStrImmOp::Ldrh
            } else {
                LdrStrImmOp::Strh
            },
            rd: d,
            rb: b,
            offset: n.u32() << 1,
        },
        "1001ldddnnnnnnnn" => ThumbOp::LdrStrSp {
            load: l == 1,
            rd: d,
            offset: n.u32() << 2,
        },

        "1010sdddnnnnnnnn" => ThumbOp::RelAddr {
            sp: s == 1,
            rd: d,
            offset: n.u32() << 2,
        },
        "10110000snnnnnnn" => {
            let n = (n as i32) << 2;
            ThumbOp::SpOffset {
                offset: if s == 1 { -n } else { n },
            }
        }
        "1011010lrrrrrrrr" => ThumbOp::Push {
            rlist: r.u8(),
            lr: l == 1,
        },
        "1011110lrrrrrrrr" => ThumbOp::Pop {
            rlist: r.u8(),
            pc: l == 1,
        },
        "1100obbbrrrrrrrr" => {
            if o == 1 {
                ThumbOp::Ldmia {
                    rb: b,
                    rlist: r.u8(),
                }
            } else {
                ThumbOp::Stmia {
                    rb: b,
                    rlist: r.u8(),
                }
            }
        }

        "1101ccccnnnnnnnn" => {
            if c == 0xE {
                // The 0b1110 condition slot is undefined in THUMB
                ThumbOp::Undefined(inst)
            } else {
                ThumbOp::BranchCond {
                    cond: c,
                    offset: (n as i8 as i32) * 2,
                }
            }
        }
        "11100nnnnnnnnnnn" => ThumbOp::Branch {
            offset: sign11(n) * 2,
        },
        "11110nnnnnnnnnnn" => ThumbOp::BlSetup {
            offset: sign11(n) << 12,
        },
        "11111nnnnnnnnnnn" => ThumbOp::Bl {
            offset: n.u32() << 1,
        },

        _ => ThumbOp::Undefined(inst),
    }
}

/// Disassemble a THUMB instruction halfword.
#[bitmatch]
pub fn mnemonic(inst: u16) -> String {
    #[bitmatch]
    match inst {
        "11011111nnnnnnnn" => format!("swi 0x{:02X}", n),

        "0001100nnnsssddd" => format!("add r{d}, r{s}, r{n}"),
        "0001101nnnsssddd" => format!("sub r{d}, r{s}, r{n}"),
        "0001110nnnsssddd" => format!("add r{d}, r{s}, #0x{:X}", n),
        "0001111nnnsssddd" => format!("sub r{d}, r{s}, #0x{:X}", n),
        "00000nnnnnsssddd" => format!("lsl r{d}, r{s}, #0x{:X}", n),
        "00001nnnnnsssddd" => format!("lsr r{d}, r{s}, #0x{:X}", n),
        "00010nnnnnsssddd" => format!("asr r{d}, r{s}, #0x{:X}", n),

        "00100dddnnnnnnnn" => format!("mov r{d}, #{n}"),
        "00101dddnnnnnnnn" => format!("cmp r{d}, #{n}"),
        "00110dddnnnnnnnn" => format!("add r{d}, #{n}"),
        "00111dddnnnnnnnn" => format!("sub r{d}, #{n}"),

        "010000oooosssddd" => {
            let op = match o {
                0x0 => "and",
                0x1 => "eor",
                0x2 => "lsl",
                0x3 => "lsr",
                0x4 => "asr",
                0x5 => "adc",
                0x6 => "sbc",
                0x7 => "ror",
                0x8 => "tst",
                0x9 => "neg",
                0xA => "cmp",
                0xB => "cmn",
                0xC => "orr",
                0xD => "mul",
                0xE => "bic",
                _ => "mvn",
            };
            format!("{op} r{d}, r{s}")
        }

        "01000100hssssddd" => format!("add r{}, r{s}", d | (h << 3)),
        "01000101hssssddd" => format!("cmp r{}, r{s}", d | (h << 3)),
        "01000110hssssddd" => format!("mov r{}, r{s}", d | (h << 3)),
        "010001110ssss???" => format!("bx r{s}"),

        "01001dddnnnnnnnn" => format!("ldr r{d}, [pc, #0x{:X}]", n << 2),
        "0101ooosssbbbddd" => {
            let op = match o {
                0 => "str",
                1 => "strh",
                2 => "strb",
                3 => "ldsb",
                4 => "ldr",
                5 => "ldrh",
                6 => "ldrb",
                _ => "ldsh",
            };
            format!("{op} r{d}, [r{b}, r{s}]")
        }
        "011oonnnnnbbbddd" => {
            let op = match o {
                0 => "str",
                1 => "ldr",
                2 => "strb",
                _ => "ldrb",
            };
            let n = if o < 2 { n << 2 } else { n };
            format!("{op} r{d}, [r{b}, #0x{:X}]", n)
        }
        "10000nnnnnbbbddd" => format!("strh r{d}, [r{b}, #0x{:X}]", n << 1),
        "10001nnnnnbbbddd" => format!("ldrh r{d}, [r{b}, #0x{:X}]", n << 1),
        "10010dddnnnnnnnn" => format!("str r{d}, [sp, #0x{:X}]", n << 2),
        "10011dddnnnnnnnn" => format!("ldr r{d}, [sp, #0x{:X}]", n << 2),

        "10100dddnnnnnnnn" => format!("add r{d}, pc, #0x{:X}", n << 2),
        "10101dddnnnnnnnn" => format!("add r{d}, sp, #0x{:X}", n << 2),
        "101100000nnnnnnn" => format!("add sp, #0x{:X}", n << 2),
        "101100001nnnnnnn" => format!("add sp, #-0x{:X}", n << 2),

        "10110100rrrrrrrr" => format!("push {:08b}", r),
        "10110101rrrrrrrr" => format!("push {:08b}, lr", r),
        "10111100rrrrrrrr" => format!("pop {:08b}", r),
        "10111101rrrrrrrr" => format!("pop {:08b}, pc", r),
        "11000bbbrrrrrrrr" => format!("stmia r{b}!, {:08b}", r),
        "11001bbbrrrrrrrr" => format!("ldmia r{b}!, {:08b}", r),

        "1101ccccnnnnnnnn" => format!(
            "b{} {}",
            condition_mnemonic(c),
            ((n as i8 as i32) * 2) + 4
        ),
        "11100nnnnnnnnnnn" => format!("b {}", (sign11(n) * 2) + 4),
        "11110nnnnnnnnnnn" => format!("mov lr, (pc + 0x{:X})", n << 12),
        "11111nnnnnnnnnnn" => format!("bl lr + 0x{:X}", n << 1),

        _ => format!("undefined 0x{inst:04X}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_immediate_formats() {
        assert_eq!(
            decode(0x2005),
            ThumbOp::Imm8 {
                op: Imm8Op::Mov,
                rd: 0,
                n: 5
            }
        );
        assert_eq!(
            decode(0x1842),
            ThumbOp::AddSub {
                sub: false,
                imm: false,
                rd: 2,
                rs: 0,
                n: 1
            }
        );
        assert_eq!(
            decode(0x0081),
            ThumbOp::ShiftImm {
                op: ShiftKind::Lsl,
                rd: 1,
                rs: 0,
                by: 2
            }
        );
    }

    #[test]
    fn decode_hi_register_formats() {
        assert_eq!(decode(0x4680), ThumbOp::HiMov { rd: 8, rs: 0 });
        assert_eq!(decode(0x4700), ThumbOp::Bx { rs: 0 });
        // BLX does not exist on this core
        assert!(matches!(decode(0x4780), ThumbOp::Undefined(_)));
    }

    #[test]
    fn decode_transfers() {
        assert_eq!(
            decode(0x6008),
            ThumbOp::LdrStrImm {
                op: LdrStrImmOp::Str,
                rd: 0,
                rb: 1,
                offset: 0
            }
        );
        assert_eq!(
            decode(0x5C53),
            ThumbOp::LdrStrReg {
                op: LdrStrRegOp::Ldrb,
                rd: 3,
                rb: 2,
                ro: 1
            }
        );
        assert_eq!(decode(0xB403), ThumbOp::Push { rlist: 3, lr: false });
        assert_eq!(decode(0xBD01), ThumbOp::Pop { rlist: 1, pc: true });
        assert_eq!(decode(0xC1FF), ThumbOp::Stmia { rb: 1, rlist: 0xFF });
        assert_eq!(decode(0xC9FF), ThumbOp::Ldmia { rb: 1, rlist: 0xFF });
    }

    #[test]
    fn decode_branches() {
        assert_eq!(decode(0xDF00), ThumbOp::Swi);
        assert_eq!(
            decode(0xD001),
            ThumbOp::BranchCond { cond: 0, offset: 2 }
        );
        assert_eq!(decode(0xD0FF), ThumbOp::BranchCond { cond: 0, offset: -2 });
        // Condition 0xE is the undefined slot
        assert!(matches!(decode(0xDE00), ThumbOp::Undefined(_)));
        assert_eq!(decode(0xE7FE), ThumbOp::Branch { offset: -4 });
        assert_eq!(decode(0xF000), ThumbOp::BlSetup { offset: 0 });
        assert_eq!(decode(0xF802), ThumbOp::Bl { offset: 4 });
    }

    #[test]
    fn mnemonics() {
        assert_eq!(mnemonic(0x2005), "mov r0, #5");
        assert_eq!(mnemonic(0x4700), "bx r0");
        assert_eq!(mnemonic(0xE7FE), "b 0");
        assert_eq!(mnemonic(0xD001), "beq 6");
    }
}
