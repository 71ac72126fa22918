//! Bytecode representation and virtual machine for Linguine (§4.4, §6.2).
//!
//! # Module structure
//!
//! - `op` - the opcode enum
//! - `module` - the text-framed bytecode module loader/writer (§6.2)
//! - `builder` - `FunctionBuilder` for emitting bytecode (used by tests and by hosts that
//!   build modules in-process rather than loading the text format)
//! - `vm` - the interpreter dispatch loop

pub(crate) mod builder;
pub(crate) mod module;
mod op;
pub(crate) mod vm;

pub(crate) use module::{CompiledFunction, ModuleParseError, parse_module, write_module};
pub(crate) use op::Opcode;
pub(crate) use vm::run_function;
