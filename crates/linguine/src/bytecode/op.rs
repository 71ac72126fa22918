//! The bytecode instruction set (§4.4.2).

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// One opcode byte. Operand shapes are documented per-variant; see §4.4.1 for the encodings
/// (`tmpvar` = u16 big-endian, `imm8` = one byte, `imm32` = u32 big-endian, `string` =
/// nul-terminated UTF-8 inline in the code stream).
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub(crate) enum Opcode {
    Nop = 0,
    /// imm32 line
    LineInfo = 1,
    /// dst, src
    Assign = 2,
    /// dst, imm32
    IConst = 3,
    /// dst, imm32 (IEEE-754 bit pattern)
    FConst = 4,
    /// dst, string
    SConst = 5,
    /// dst
    AConst = 6,
    /// dst
    DConst = 7,
    /// dst
    Inc = 8,
    /// dst, s1, s2
    Add = 9,
    Sub = 10,
    Mul = 11,
    Div = 12,
    Mod = 13,
    And = 14,
    Or = 15,
    Xor = 16,
    /// dst, src
    Neg = 17,
    /// dst, s1, s2
    Lt = 18,
    Lte = 19,
    Gt = 20,
    Gte = 21,
    Eq = 22,
    Neq = 23,
    /// alias of Eq (optimization hint)
    EqI = 24,
    /// dst, container, subscript
    LoadArray = 25,
    /// container, subscript, src
    StoreArray = 26,
    /// dst, src
    Len = 27,
    /// dst, dict, i
    GetDictKeyByIndex = 28,
    /// dst, dict, i
    GetDictValByIndex = 29,
    /// dst, string
    LoadSymbol = 30,
    /// string, src
    StoreSymbol = 31,
    /// dst, dict, string
    LoadDot = 32,
    /// dict, string, src
    StoreDot = 33,
    /// dst, func, argc (imm8), arg tmpvars x argc
    Call = 34,
    /// dst, obj, method_name (string), argc, args
    ThisCall = 35,
    /// imm32 target
    Jmp = 36,
    /// src, imm32 target
    JmpIfTrue = 37,
    /// src, imm32 target
    JmpIfFalse = 38,
    /// alias of JmpIfTrue (optimization hint)
    JmpIfEq = 39,
}

impl Opcode {
    /// Mnemonic as it appears in the opcode table, used in `BrokenBytecode` messages.
    pub(crate) fn mnemonic(self) -> &'static str {
        match self {
            Self::Nop => "NOP",
            Self::LineInfo => "LINEINFO",
            Self::Assign => "ASSIGN",
            Self::IConst => "ICONST",
            Self::FConst => "FCONST",
            Self::SConst => "SCONST",
            Self::AConst => "ACONST",
            Self::DConst => "DCONST",
            Self::Inc => "INC",
            Self::Add => "ADD",
            Self::Sub => "SUB",
            Self::Mul => "MUL",
            Self::Div => "DIV",
            Self::Mod => "MOD",
            Self::And => "AND",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Neg => "NEG",
            Self::Lt => "LT",
            Self::Lte => "LTE",
            Self::Gt => "GT",
            Self::Gte => "GTE",
            Self::Eq => "EQ",
            Self::Neq => "NEQ",
            Self::EqI => "EQI",
            Self::LoadArray => "LOADARRAY",
            Self::StoreArray => "STOREARRAY",
            Self::Len => "LEN",
            Self::GetDictKeyByIndex => "GETDICTKEYBYINDEX",
            Self::GetDictValByIndex => "GETDICTVALBYINDEX",
            Self::LoadSymbol => "LOADSYMBOL",
            Self::StoreSymbol => "STORESYMBOL",
            Self::LoadDot => "LOADDOT",
            Self::StoreDot => "STOREDOT",
            Self::Call => "CALL",
            Self::ThisCall => "THISCALL",
            Self::Jmp => "JMP",
            Self::JmpIfTrue => "JMPIFTRUE",
            Self::JmpIfFalse => "JMPIFFALSE",
            Self::JmpIfEq => "JMPIFEQ",
        }
    }
}
