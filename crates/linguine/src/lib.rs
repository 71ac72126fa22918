//! Linguine's embeddable bytecode core: a register-style interpreter, a two-tier
//! nursery/tenured mark-and-sweep heap, and the host embedding surface for calling into
//! compiled or native functions. Deliberately just the runtime — no source parser, IR
//! generators, or CLI driver live here.

mod builtins;
mod bytecode;
mod error;
mod frame;
mod function;
mod heap;
mod intern;
#[cfg(feature = "template-jit")]
mod jit;
mod resource;
mod runtime;
mod value;

pub use crate::{
    error::{ErrorKind, RunError, RunResult},
    resource::Limits,
    runtime::Runtime,
    value::HostValue,
};
