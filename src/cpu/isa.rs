use core::fmt;
use std::fmt::Debug;

/// Decoded instruction with operands information.
///
/// The number of M-cycles(=4 T-cycles) needed to execute an instruction
/// is the number of bytes need to be read/wrote from/to the main memory for
/// its execution by the CPU.
/// Every instructions needs at least one M-cycle since it needs to be first
/// fetched from the memory. Instructions containing immediates or
/// register-indirect operand needs extra cycles.
///
/// For branch instructions cycles needed to execute depend on if the branch
/// was taken or not as the number of memory accesses can vary according to it.
/// If a branch is taken then all plus one extra M-cycle is consumed, presumably
/// for adjusting the PC(program counter) in the hardware.
#[derive(Clone, Copy)]
pub(crate) struct Instr {
    pub(crate) op: Opcode,
    pub(crate) op1: Operand,
    pub(crate) op2: Operand,
    /// M-cycles consumed executing this instruction (branch not taken, if conditional).
    pub(crate) mcycles: u8,
    /// M-cycles consumed when a conditional branch instruction is taken.
    /// Equal to `mcycles` for non-branch instructions.
    pub(crate) branch_mcycles: u8,
}

impl Default for Instr {
    fn default() -> Self {
        Instr {
            op: Opcode::Nop,
            op1: Operand::Absent,
            op2: Operand::Absent,
            mcycles: 1,
            branch_mcycles: 1,
        }
    }
}

/// Number of M-cycles taken to execute an instruction given its fully
/// resolved opcode and operands, as: (not-taken/unconditional, taken).
/// Mirrors the M-cycle counts from the official opcode tables; for
/// CB-prefixed instructions the returned count already includes the
/// prefix-byte fetch, since by the time this runs the decoder has
/// already folded the prefix away into the final opcode.
pub(crate) fn timing(op: Opcode, op1: Operand, op2: Operand) -> (u8, u8) {
    use Opcode::*;
    let is_hl_mem = |o: Operand| matches!(o, Operand::RegMem(Reg::HL));
    let is_reg16_direct = |o: Operand| {
        matches!(
            o,
            Operand::Reg(Reg::BC | Reg::DE | Reg::HL | Reg::SP | Reg::AF)
        )
    };

    let n = match op {
        Nop | Di | Ei | Halt | Stop | Illegal | Prefix => 1,
        Rlca | Rrca | Rla | Rra | Cpl | Ccf | Scf | Daa => 1,

        Ld | Ldh => {
            return ld_timing(op, op1, op2);
        }

        Push => 4,
        Pop => 3,

        Inc | Dec => {
            if is_hl_mem(op1) {
                3
            } else if is_reg16_direct(op1) {
                2
            } else {
                1
            }
        }

        Add if matches!(op1, Operand::Reg(Reg::SP)) => 4,
        Add if is_reg16_direct(op1) => 2,
        Add | Adc | Sub | Sbc | And | Xor | Or | Cp => {
            if is_hl_mem(op2) || matches!(op2, Operand::U8(_)) {
                2
            } else {
                1
            }
        }

        Rlc | Rrc | Rl | Rr | Sla | Sra | Srl | Swap => {
            if is_hl_mem(op1) {
                4
            } else {
                2
            }
        }
        Bit => {
            if is_hl_mem(op2) {
                3
            } else {
                2
            }
        }
        Res | Set => {
            if is_hl_mem(op2) {
                4
            } else {
                2
            }
        }

        Jr => return branch_timing(op1, 3, 2),
        Jp => {
            if matches!(op1, Operand::Reg(Reg::HL)) {
                1
            } else {
                return branch_timing(op1, 4, 3);
            }
        }
        Call => return branch_timing(op1, 6, 3),
        Ret => return branch_timing(op1, 5, 2),
        Reti => 4,
        Rst => 4,
    };

    (n, n)
}

/// Branch instructions cost `taken` M-cycles if unconditional or if the
/// condition holds, and `not_taken` only when a condition is present and
/// fails; `first_operand` is the instruction's first operand as decoded.
fn branch_timing(first_operand: Operand, taken: u8, not_taken: u8) -> (u8, u8) {
    if matches!(first_operand, Operand::Cond(_)) {
        (not_taken, taken)
    } else {
        (taken, taken)
    }
}

fn ld_timing(op: Opcode, op1: Operand, op2: Operand) -> (u8, u8) {
    use Operand::*;
    let n = match (op, op1, op2) {
        (Opcode::Ldh, A8(_), _) | (Opcode::Ldh, _, A8(_)) => 3,
        (Opcode::Ldh, RegMem(Reg::C), _) | (Opcode::Ldh, _, RegMem(Reg::C)) => 2,

        (_, A16(_), Reg(Reg::SP)) => 5,
        (_, A16(_), _) | (_, _, A16(_)) => 4,

        (_, Reg(Reg::HL), SPplusI8(_)) => 3,
        (_, Reg(Reg::SP), Reg(Reg::HL)) => 2,

        (_, Reg(r), U16(_)) if matches!(r, Reg::BC | Reg::DE | Reg::HL | Reg::SP) => 3,

        (_, RegMem(_), Reg(_)) | (_, Reg(_), RegMem(_)) => 2,
        (_, Reg(_), U8(_)) => 2,
        (_, RegMem(Reg::HL), U8(_)) => 3,

        _ => 1,
    };
    (n, n)
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opcode = format!("{:?}", self.op).to_ascii_uppercase();
        match (
            !matches!(self.op1, Operand::Absent),
            !matches!(self.op2, Operand::Absent),
        ) {
            (true, true) => write!(f, "{} {}, {}", opcode, self.op1, self.op2),
            (true, false) => write!(f, "{} {}", opcode, self.op1),
            (false, false) => write!(f, "{}", opcode),
            (false, true) => panic!("invalid: first operand absent but second present"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Operand {
    /// No operand
    Absent,
    /// Register value
    Reg(Reg),
    /// Register value as memory address
    RegMem(Reg),
    /// Branch condition
    Cond(Cond),
    /// Bit Index
    B3(u8),
    /// RST target vector value
    Tgt(u8),
    /// Unsigned 8-bit imm
    U8(u8),
    /// Signed 8-bit imm
    I8(i8),
    /// Unsigned 16-bit imme
    U16(u16),
    /// 8-bit imm as memory address
    A8(u8),
    /// 16-bit imm as memory address
    A16(u16),
    /// For the operand `SP + i8`
    SPplusI8(i8),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Absent => write!(f, "<?>"),
            Operand::Reg(r) => write!(f, "{r:?}"),
            Operand::RegMem(r) => write!(f, "[{r:?}]"),
            Operand::Cond(c) => write!(f, "{c:?}"),
            Operand::B3(b) => write!(f, "{b}"),
            Operand::Tgt(t) => write!(f, "${t:04X}"),
            Operand::U8(u) => write!(f, "${u:02X}"),
            Operand::I8(i) => write!(f, "#{i:+}"),
            Operand::U16(u) => write!(f, "${u:04X}"),
            Operand::A8(a) => write!(f, "[$FF00 + ${a:02X}]"),
            Operand::A16(a) => write!(f, "[${a:04X}]"),
            Operand::SPplusI8(i) => write!(f, "SP + ${i:02X}"),
        }
    }
}

// Operation to perform for an instrution.
// These values do not correspond in any way the actual opcodes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Opcode {
    // Memory
    Ld,
    Ldh, // Adds 0xFF00 to its address operand
    Push,
    Pop,

    // Arithmetic
    Inc,
    Dec,
    Add,
    Adc,
    Sub,
    Sbc,
    And,
    Xor,
    Or,
    Cp,

    // Bit Shift and Rotations
    Rla,
    Rlca,
    Rra,
    Rrca,
    Rlc,
    Rrc,
    Rl,
    Rr,
    Sla,
    Sra,
    Srl,
    Swap,
    Bit,
    Res,
    Set,

    // Branch
    Jr,
    Jp,
    Call,
    Ret,
    Reti,
    Rst,

    // Interrupt and system control
    Di,
    Ei,
    Halt,
    Stop,

    // Misc
    Cpl,
    Ccf,
    Scf,
    Nop,
    Daa,
    Prefix,

    Illegal,
}

/// All register names present in r8, r16, r16mem and r16stk are
/// represented by a single type for simplicity.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Reg {
    A,
    // F, // never needed
    B,
    C,
    D,
    E,
    H,
    L,
    AF,
    BC,
    DE,
    HL,
    HLinc,
    HLdec,
    SP,
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Cond {
    NZ,
    Z,
    NC,
    C,
}
