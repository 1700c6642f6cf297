//! The opcode table.
//!
//! [`opcode_table!`] holds the canonical list of operations. Each entry
//! names the enum variant, its numeric code, the assembly name, the operator
//! symbol, the three operand types, the module version that introduced it
//! and, optionally, a disassembly format.
//!
//! Operand types describe how the interpreter reads a slot:
//! - `Void`: the slot is unused and must be zero
//! - `Short`: the slot holds a signed immediate
//! - anything else: the slot is an index into the global array
//!
//! Disassembly formats use `%` escapes followed by an operand letter:
//! `%G` global with its contents, `%g` global without contents, `%s` short
//! immediate, `%O` branch target, `%V` return-style operand. Entries without
//! a format use [`DEFAULT_FORMAT`].

use super::types::{EType, PROG_ID_VERSION, PROG_VERSION};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;

/// Format used by entries that do not declare their own.
pub const DEFAULT_FORMAT: &str = "%Ga, %Gb, %gc";

/// Static description of one opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeDef {
    pub opcode: Opcode,
    /// Assembly name, e.g. `add.f`.
    pub opname: &'static str,
    /// Operator symbol as the compiler spells it.
    pub symbol: &'static str,
    pub type_a: EType,
    pub type_b: EType,
    pub type_c: EType,
    /// First module version that may contain this opcode.
    pub min_version: u32,
    pub format: Option<&'static str>,
}

impl OpcodeDef {
    pub fn code(&self) -> u16 {
        self.opcode as u16
    }

    /// The disassembly format, falling back to the default.
    pub fn format(&self) -> &'static str {
        self.format.unwrap_or(DEFAULT_FORMAT)
    }

    /// Operand types in slot order.
    pub fn operand_types(&self) -> [EType; 3] {
        [self.type_a, self.type_b, self.type_c]
    }

    /// Whether a module of `version` may use this opcode.
    pub fn allowed_in(&self, version: u32) -> bool {
        match version {
            PROG_ID_VERSION => self.min_version == PROG_ID_VERSION,
            _ => true,
        }
    }
}

macro_rules! opcode_format {
    () => {
        None
    };
    ($format:literal) => {
        Some($format)
    };
}

macro_rules! opcode_table {
    (
        $(
            $name:ident = $code:literal, $opname:literal, $symbol:literal
                => [$ta:ident, $tb:ident, $tc:ident], $version:ident $(, $format:literal)?;
        )*
    ) => {
        /// Numeric operation codes understood by the interpreter.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum Opcode {
            $( $name = $code, )*
        }

        impl Opcode {
            /// Every opcode in table order.
            pub const ALL: &'static [Opcode] = &[ $( Opcode::$name, )* ];

            /// Decode a raw statement opcode.
            pub fn from_u16(code: u16) -> Option<Opcode> {
                match code {
                    $( $code => Some(Opcode::$name), )*
                    _ => None,
                }
            }

            /// The table entry for this opcode.
            pub fn def(self) -> &'static OpcodeDef {
                match self {
                    $(
                        Opcode::$name => &OpcodeDef {
                            opcode: Opcode::$name,
                            opname: $opname,
                            symbol: $symbol,
                            type_a: EType::$ta,
                            type_b: EType::$tb,
                            type_c: EType::$tc,
                            min_version: $version,
                            format: opcode_format!($($format)?),
                        },
                    )*
                }
            }
        }
    };
}

opcode_table! {
    Done = 0, "done", "<DONE>" => [Entity, Field, Void], PROG_ID_VERSION, "%Va";

    MulF = 1, "mul.f", "*" => [Float, Float, Float], PROG_ID_VERSION;
    MulV = 2, "mul.v", "*" => [Vector, Vector, Float], PROG_ID_VERSION;
    MulFV = 3, "mul.fv", "*" => [Float, Vector, Vector], PROG_ID_VERSION;
    MulVF = 4, "mul.vf", "*" => [Vector, Float, Vector], PROG_ID_VERSION;
    DivF = 5, "div.f", "/" => [Float, Float, Float], PROG_ID_VERSION;
    AddF = 6, "add.f", "+" => [Float, Float, Float], PROG_ID_VERSION;
    AddV = 7, "add.v", "+" => [Vector, Vector, Vector], PROG_ID_VERSION;
    SubF = 8, "sub.f", "-" => [Float, Float, Float], PROG_ID_VERSION;
    SubV = 9, "sub.v", "-" => [Vector, Vector, Vector], PROG_ID_VERSION;

    EqF = 10, "eq.f", "==" => [Float, Float, Integer], PROG_ID_VERSION;
    EqV = 11, "eq.v", "==" => [Vector, Vector, Integer], PROG_ID_VERSION;
    EqS = 12, "eq.s", "==" => [String, String, Integer], PROG_ID_VERSION;
    EqE = 13, "eq.e", "==" => [Entity, Entity, Integer], PROG_ID_VERSION;
    EqFnc = 14, "eq.fnc", "==" => [Function, Function, Integer], PROG_ID_VERSION;
    NeF = 15, "ne.f", "!=" => [Float, Float, Integer], PROG_ID_VERSION;
    NeV = 16, "ne.v", "!=" => [Vector, Vector, Integer], PROG_ID_VERSION;
    NeS = 17, "ne.s", "!=" => [String, String, Integer], PROG_ID_VERSION;
    NeE = 18, "ne.e", "!=" => [Entity, Entity, Integer], PROG_ID_VERSION;
    NeFnc = 19, "ne.fnc", "!=" => [Function, Function, Integer], PROG_ID_VERSION;

    LeF = 20, "le.f", "<=" => [Float, Float, Float], PROG_ID_VERSION;
    GeF = 21, "ge.f", ">=" => [Float, Float, Float], PROG_ID_VERSION;
    LtF = 22, "lt.f", "<" => [Float, Float, Float], PROG_ID_VERSION;
    GtF = 23, "gt.f", ">" => [Float, Float, Float], PROG_ID_VERSION;

    LoadF = 24, "load.f", "." => [Entity, Field, Float], PROG_ID_VERSION;
    LoadV = 25, "load.v", "." => [Entity, Field, Vector], PROG_ID_VERSION;
    LoadS = 26, "load.s", "." => [Entity, Field, String], PROG_ID_VERSION;
    LoadEnt = 27, "load.ent", "." => [Entity, Field, Entity], PROG_ID_VERSION;
    LoadFld = 28, "load.fld", "." => [Entity, Field, Field], PROG_ID_VERSION;
    LoadFnc = 29, "load.fnc", "." => [Entity, Field, Function], PROG_ID_VERSION;
    Address = 30, "address", "&" => [Entity, Field, Pointer], PROG_ID_VERSION;

    StoreF = 31, "store.f", "=" => [Float, Float, Void], PROG_ID_VERSION, "%Ga, %gb";
    StoreV = 32, "store.v", "=" => [Vector, Vector, Void], PROG_ID_VERSION, "%Ga, %gb";
    StoreS = 33, "store.s", "=" => [String, String, Void], PROG_ID_VERSION, "%Ga, %gb";
    StoreEnt = 34, "store.ent", "=" => [Entity, Entity, Void], PROG_ID_VERSION, "%Ga, %gb";
    StoreFld = 35, "store.fld", "=" => [Field, Field, Void], PROG_ID_VERSION, "%Ga, %gb";
    StoreFnc = 36, "store.fnc", "=" => [Function, Function, Void], PROG_ID_VERSION, "%Ga, %gb";

    StorePF = 37, "storep.f", ".=" => [Float, Pointer, Void], PROG_ID_VERSION, "%Ga, %Gb";
    StorePV = 38, "storep.v", ".=" => [Vector, Pointer, Void], PROG_ID_VERSION, "%Ga, %Gb";
    StorePS = 39, "storep.s", ".=" => [String, Pointer, Void], PROG_ID_VERSION, "%Ga, %Gb";
    StorePEnt = 40, "storep.ent", ".=" => [Entity, Pointer, Void], PROG_ID_VERSION, "%Ga, %Gb";
    StorePFld = 41, "storep.fld", ".=" => [Field, Pointer, Void], PROG_ID_VERSION, "%Ga, %Gb";
    StorePFnc = 42, "storep.fnc", ".=" => [Function, Pointer, Void], PROG_ID_VERSION, "%Ga, %Gb";

    Return = 43, "return", "<RETURN>" => [Void, Void, Void], PROG_ID_VERSION, "%Va";

    NotF = 44, "not.f", "!" => [Float, Void, Integer], PROG_ID_VERSION, "%Ga, %gc";
    NotV = 45, "not.v", "!" => [Vector, Void, Integer], PROG_ID_VERSION, "%Ga, %gc";
    NotS = 46, "not.s", "!" => [String, Void, Integer], PROG_ID_VERSION, "%Ga, %gc";
    NotEnt = 47, "not.ent", "!" => [Entity, Void, Integer], PROG_ID_VERSION, "%Ga, %gc";
    NotFnc = 48, "not.fnc", "!" => [Function, Void, Integer], PROG_ID_VERSION, "%Ga, %gc";

    If = 49, "if", "<IF>" => [Integer, Short, Void], PROG_ID_VERSION, "%Ga branch %sb (%Ob)";
    IfNot = 50, "ifnot", "<IFNOT>" => [Integer, Short, Void], PROG_ID_VERSION, "%Ga branch %sb (%Ob)";

    Call0 = 51, "call0", "<CALL0>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call1 = 52, "call1", "<CALL1>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call2 = 53, "call2", "<CALL2>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call3 = 54, "call3", "<CALL3>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call4 = 55, "call4", "<CALL4>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call5 = 56, "call5", "<CALL5>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call6 = 57, "call6", "<CALL6>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call7 = 58, "call7", "<CALL7>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";
    Call8 = 59, "call8", "<CALL8>" => [Function, Void, Void], PROG_ID_VERSION, "%Ga";

    State = 60, "state", "<STATE>" => [Float, Function, Void], PROG_ID_VERSION, "%Ga, %Gb";
    Goto = 61, "goto", "<GOTO>" => [Short, Void, Void], PROG_ID_VERSION, "branch %sa (%Oa)";
    And = 62, "and.f", "&&" => [Float, Float, Integer], PROG_ID_VERSION;
    Or = 63, "or.f", "||" => [Float, Float, Integer], PROG_ID_VERSION;
    BitAnd = 64, "bitand", "&" => [Float, Float, Float], PROG_ID_VERSION;
    BitOr = 65, "bitor", "|" => [Float, Float, Float], PROG_ID_VERSION;

    AddS = 66, "add.s", "+" => [String, String, String], PROG_VERSION;
    LeS = 67, "le.s", "<=" => [String, String, Integer], PROG_VERSION;
    GeS = 68, "ge.s", ">=" => [String, String, Integer], PROG_VERSION;
    LtS = 69, "lt.s", "<" => [String, String, Integer], PROG_VERSION;
    GtS = 70, "gt.s", ">" => [String, String, Integer], PROG_VERSION;

    AddI = 71, "add.i", "+" => [Integer, Integer, Integer], PROG_VERSION;
    SubI = 72, "sub.i", "-" => [Integer, Integer, Integer], PROG_VERSION;
    MulI = 73, "mul.i", "*" => [Integer, Integer, Integer], PROG_VERSION;
    DivI = 74, "div.i", "/" => [Integer, Integer, Integer], PROG_VERSION;
    BitAndI = 75, "bitand.i", "&" => [Integer, Integer, Integer], PROG_VERSION;
    BitOrI = 76, "bitor.i", "|" => [Integer, Integer, Integer], PROG_VERSION;
    GeI = 77, "ge.i", ">=" => [Integer, Integer, Integer], PROG_VERSION;
    LeI = 78, "le.i", "<=" => [Integer, Integer, Integer], PROG_VERSION;
    GtI = 79, "gt.i", ">" => [Integer, Integer, Integer], PROG_VERSION;
    LtI = 80, "lt.i", "<" => [Integer, Integer, Integer], PROG_VERSION;
    AndI = 81, "and.i", "&&" => [Integer, Integer, Integer], PROG_VERSION;
    OrI = 82, "or.i", "||" => [Integer, Integer, Integer], PROG_VERSION;
    NotI = 83, "not.i", "!" => [Integer, Void, Integer], PROG_VERSION, "%Ga, %gc";
    EqI = 84, "eq.i", "==" => [Integer, Integer, Integer], PROG_VERSION;
    NeI = 85, "ne.i", "!=" => [Integer, Integer, Integer], PROG_VERSION;
    StoreI = 86, "store.i", "=" => [Integer, Integer, Void], PROG_VERSION, "%Ga, %gb";
    StorePI = 87, "storep.i", ".=" => [Integer, Pointer, Void], PROG_VERSION, "%Ga, %Gb";
    LoadI = 88, "load.i", "." => [Entity, Field, Integer], PROG_VERSION;

    ConvIF = 89, "conv.if", "=" => [Integer, Void, Float], PROG_VERSION, "%Ga, %gc";
    ConvFI = 90, "conv.fi", "=" => [Float, Void, Integer], PROG_VERSION, "%Ga, %gc";
    BitXorF = 91, "bitxor.f", "^" => [Float, Float, Float], PROG_VERSION;
    BitXorI = 92, "bitxor.i", "^" => [Integer, Integer, Integer], PROG_VERSION;
    BitNotF = 93, "bitnot.f", "~" => [Float, Void, Float], PROG_VERSION, "%Ga, %gc";
    BitNotI = 94, "bitnot.i", "~" => [Integer, Void, Integer], PROG_VERSION, "%Ga, %gc";
    ShlF = 95, "shl.f", "<<" => [Float, Float, Float], PROG_VERSION;
    ShrF = 96, "shr.f", ">>" => [Float, Float, Float], PROG_VERSION;
    ShlI = 97, "shl.i", "<<" => [Integer, Integer, Integer], PROG_VERSION;
    ShrI = 98, "shr.i", ">>" => [Integer, Integer, Integer], PROG_VERSION;
    ModF = 99, "mod.f", "%" => [Float, Float, Float], PROG_VERSION;
    ModI = 100, "mod.i", "%" => [Integer, Integer, Integer], PROG_VERSION;

    LoadBF = 101, "loadb.f", "." => [Pointer, Integer, Float], PROG_VERSION;
    LoadBV = 102, "loadb.v", "." => [Pointer, Integer, Vector], PROG_VERSION;
    LoadBS = 103, "loadb.s", "." => [Pointer, Integer, String], PROG_VERSION;
    LoadBEnt = 104, "loadb.ent", "." => [Pointer, Integer, Entity], PROG_VERSION;
    LoadBFld = 105, "loadb.fld", "." => [Pointer, Integer, Field], PROG_VERSION;
    LoadBFnc = 106, "loadb.fnc", "." => [Pointer, Integer, Function], PROG_VERSION;
    LoadBI = 107, "loadb.i", "." => [Pointer, Integer, Integer], PROG_VERSION;
    LoadBP = 108, "loadb.p", "." => [Pointer, Integer, Pointer], PROG_VERSION;

    LoadBIF = 109, "loadbi.f", "." => [Pointer, Short, Float], PROG_VERSION, "%Ga, %sb, %gc";
    LoadBIV = 110, "loadbi.v", "." => [Pointer, Short, Vector], PROG_VERSION, "%Ga, %sb, %gc";
    LoadBIS = 111, "loadbi.s", "." => [Pointer, Short, String], PROG_VERSION, "%Ga, %sb, %gc";
    LoadBIEnt = 112, "loadbi.ent", "." => [Pointer, Short, Entity], PROG_VERSION, "%Ga, %sb, %gc";
    LoadBIFld = 113, "loadbi.fld", "." => [Pointer, Short, Field], PROG_VERSION, "%Ga, %sb, %gc";
    LoadBIFnc = 114, "loadbi.fnc", "." => [Pointer, Short, Function], PROG_VERSION, "%Ga, %sb, %gc";
    LoadBII = 115, "loadbi.i", "." => [Pointer, Short, Integer], PROG_VERSION, "%Ga, %sb, %gc";
    LoadBIP = 116, "loadbi.p", "." => [Pointer, Short, Pointer], PROG_VERSION, "%Ga, %sb, %gc";

    StoreBF = 117, "storeb.f", ".=" => [Float, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBV = 118, "storeb.v", ".=" => [Vector, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBS = 119, "storeb.s", ".=" => [String, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBEnt = 120, "storeb.ent", ".=" => [Entity, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBFld = 121, "storeb.fld", ".=" => [Field, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBFnc = 122, "storeb.fnc", ".=" => [Function, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBI = 123, "storeb.i", ".=" => [Integer, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBP = 124, "storeb.p", ".=" => [Pointer, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";

    StoreBIF = 125, "storebi.f", ".=" => [Float, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    StoreBIV = 126, "storebi.v", ".=" => [Vector, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    StoreBIS = 127, "storebi.s", ".=" => [String, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    StoreBIEnt = 128, "storebi.ent", ".=" => [Entity, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    StoreBIFld = 129, "storebi.fld", ".=" => [Field, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    StoreBIFnc = 130, "storebi.fnc", ".=" => [Function, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    StoreBII = 131, "storebi.i", ".=" => [Integer, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    StoreBIP = 132, "storebi.p", ".=" => [Pointer, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";

    LoadP = 133, "load.p", "." => [Entity, Field, Pointer], PROG_VERSION;
    StoreP = 134, "store.p", "=" => [Pointer, Pointer, Void], PROG_VERSION, "%Ga, %gb";
    StorePP = 135, "storep.p", ".=" => [Pointer, Pointer, Void], PROG_VERSION, "%Ga, %Gb";

    AddressF = 136, "address.f", "&" => [Float, Void, Pointer], PROG_VERSION, "%Ga, %gc";
    AddressV = 137, "address.v", "&" => [Vector, Void, Pointer], PROG_VERSION, "%Ga, %gc";
    AddressS = 138, "address.s", "&" => [String, Void, Pointer], PROG_VERSION, "%Ga, %gc";
    AddressEnt = 139, "address.ent", "&" => [Entity, Void, Pointer], PROG_VERSION, "%Ga, %gc";
    AddressFld = 140, "address.fld", "&" => [Field, Void, Pointer], PROG_VERSION, "%Ga, %gc";
    AddressFnc = 141, "address.fnc", "&" => [Function, Void, Pointer], PROG_VERSION, "%Ga, %gc";
    AddressI = 142, "address.i", "&" => [Integer, Void, Pointer], PROG_VERSION, "%Ga, %gc";
    AddressP = 143, "address.p", "&" => [Pointer, Void, Pointer], PROG_VERSION, "%Ga, %gc";

    Lea = 144, "lea", "&" => [Pointer, Integer, Pointer], PROG_VERSION;
    Leai = 145, "leai", "&" => [Pointer, Short, Pointer], PROG_VERSION, "%Ga, %sb, %gc";

    IfBe = 146, "ifbe", "<IFBE>" => [Integer, Short, Void], PROG_VERSION, "%Ga branch %sb (%Ob)";
    IfB = 147, "ifb", "<IFB>" => [Integer, Short, Void], PROG_VERSION, "%Ga branch %sb (%Ob)";
    IfAe = 148, "ifae", "<IFAE>" => [Integer, Short, Void], PROG_VERSION, "%Ga branch %sb (%Ob)";
    IfA = 149, "ifa", "<IFA>" => [Integer, Short, Void], PROG_VERSION, "%Ga branch %sb (%Ob)";
    Jump = 150, "jump", "<JUMP>" => [Integer, Void, Void], PROG_VERSION, "%Ga";
    JumpB = 151, "jumpb", "<JUMPB>" => [Pointer, Integer, Void], PROG_VERSION, "%Ga, %Gb";

    LtU = 152, "lt.u", "<" => [UInteger, UInteger, Integer], PROG_VERSION;
    GtU = 153, "gt.u", ">" => [UInteger, UInteger, Integer], PROG_VERSION;
    LeU = 154, "le.u", "<=" => [UInteger, UInteger, Integer], PROG_VERSION;
    GeU = 155, "ge.u", ">=" => [UInteger, UInteger, Integer], PROG_VERSION;

    GeP = 156, "ge.p", ">=" => [Pointer, Pointer, Integer], PROG_VERSION;
    LeP = 157, "le.p", "<=" => [Pointer, Pointer, Integer], PROG_VERSION;
    GtP = 158, "gt.p", ">" => [Pointer, Pointer, Integer], PROG_VERSION;
    LtP = 159, "lt.p", "<" => [Pointer, Pointer, Integer], PROG_VERSION;
    EqP = 160, "eq.p", "==" => [Pointer, Pointer, Integer], PROG_VERSION;
    NeP = 161, "ne.p", "!=" => [Pointer, Pointer, Integer], PROG_VERSION;
    NotP = 162, "not.p", "!" => [Pointer, Void, Integer], PROG_VERSION, "%Ga, %gc";

    Move = 163, "move", "<MOVE>" => [Struct, Short, Struct], PROG_VERSION, "%Ga, %sb, %gc";
    MoveP = 164, "movep", "<MOVE>" => [Pointer, Integer, Pointer], PROG_VERSION, "%Ga, %Gb, %Gc";

    LoadU = 165, "load.u", "." => [Entity, Field, UInteger], PROG_VERSION;
    StoreU = 166, "store.u", "=" => [UInteger, UInteger, Void], PROG_VERSION, "%Ga, %gb";
    StorePU = 167, "storep.u", ".=" => [UInteger, Pointer, Void], PROG_VERSION, "%Ga, %Gb";
    LoadBU = 168, "loadb.u", "." => [Pointer, Integer, UInteger], PROG_VERSION;
    LoadBIU = 169, "loadbi.u", "." => [Pointer, Short, UInteger], PROG_VERSION, "%Ga, %sb, %gc";
    StoreBU = 170, "storeb.u", ".=" => [UInteger, Pointer, Integer], PROG_VERSION, "%Ga, %Gb, %Gc";
    StoreBIU = 171, "storebi.u", ".=" => [UInteger, Pointer, Short], PROG_VERSION, "%Ga, %Gb, %sc";
    AddressU = 172, "address.u", "&" => [UInteger, Void, Pointer], PROG_VERSION, "%Ga, %gc";

    ConvIU = 173, "conv.iu", "=" => [Integer, Void, UInteger], PROG_VERSION, "%Ga, %gc";
    ConvUI = 174, "conv.ui", "=" => [UInteger, Void, Integer], PROG_VERSION, "%Ga, %gc";

    AddU = 175, "add.u", "+" => [UInteger, UInteger, UInteger], PROG_VERSION;
    SubU = 176, "sub.u", "-" => [UInteger, UInteger, UInteger], PROG_VERSION;
    MulU = 177, "mul.u", "*" => [UInteger, UInteger, UInteger], PROG_VERSION;
    DivU = 178, "div.u", "/" => [UInteger, UInteger, UInteger], PROG_VERSION;
    ModU = 179, "mod.u", "%" => [UInteger, UInteger, UInteger], PROG_VERSION;
    BitAndU = 180, "bitand.u", "&" => [UInteger, UInteger, UInteger], PROG_VERSION;
    BitOrU = 181, "bitor.u", "|" => [UInteger, UInteger, UInteger], PROG_VERSION;
    BitXorU = 182, "bitxor.u", "^" => [UInteger, UInteger, UInteger], PROG_VERSION;
    BitNotU = 183, "bitnot.u", "~" => [UInteger, Void, UInteger], PROG_VERSION, "%Ga, %gc";
    ShlU = 184, "shl.u", "<<" => [UInteger, UInteger, UInteger], PROG_VERSION;
    ShrU = 185, "shr.u", ">>" => [UInteger, UInteger, UInteger], PROG_VERSION;

    AndU = 186, "and.u", "&&" => [UInteger, UInteger, Integer], PROG_VERSION;
    OrU = 187, "or.u", "||" => [UInteger, UInteger, Integer], PROG_VERSION;
    NotU = 188, "not.u", "!" => [UInteger, Void, Integer], PROG_VERSION, "%Ga, %gc";
    EqU = 189, "eq.u", "==" => [UInteger, UInteger, Integer], PROG_VERSION;
    NeU = 190, "ne.u", "!=" => [UInteger, UInteger, Integer], PROG_VERSION;
}

static BY_CODE: Lazy<HashMap<u16, &'static OpcodeDef>> = Lazy::new(|| {
    Opcode::ALL
        .iter()
        .map(|op| (*op as u16, op.def()))
        .collect()
});

static BY_NAME: Lazy<HashMap<&'static str, &'static OpcodeDef>> = Lazy::new(|| {
    Opcode::ALL
        .iter()
        .map(|op| (op.def().opname, op.def()))
        .collect()
});

/// Look up the table entry for a raw opcode value.
pub fn lookup(code: u16) -> Option<&'static OpcodeDef> {
    BY_CODE.get(&code).copied()
}

impl Opcode {
    /// Look up an opcode by its assembly name.
    pub fn by_name(name: &str) -> Option<Opcode> {
        BY_NAME.get(name).map(|def| def.opcode)
    }

    pub fn name(self) -> &'static str {
        self.def().opname
    }

    /// Number of argument words a call opcode passes, `None` for other ops.
    pub fn call_argc(self) -> Option<usize> {
        let code = self as u16;
        if (Opcode::Call0 as u16..=Opcode::Call8 as u16).contains(&code) {
            Some((code - Opcode::Call0 as u16) as usize)
        } else {
            None
        }
    }

    /// Opcodes whose `b` slot is a relative branch offset.
    pub fn is_conditional_branch(self) -> bool {
        matches!(
            self,
            Opcode::If | Opcode::IfNot | Opcode::IfBe | Opcode::IfB | Opcode::IfAe | Opcode::IfA
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
