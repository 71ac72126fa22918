//! Function objects: bytecode- or host-backed (§3.5, §4.2).

use crate::{error::RunResult, runtime::Runtime, value::Value};

/// Maximum number of parameters a function may declare, and the maximum number of
/// arguments a single call may pass (§3.5, §4.4.4).
pub(crate) const MAX_ARITY: usize = 32;

/// A host-registered native function.
///
/// Unlike a C-shaped "return bool, write `$return` out-of-band" calling convention,
/// this is plain `Fn(&mut Runtime, &[Value]) -> RunResult<Value>`: `Ok(v)`
/// becomes the call's `$return` value, `Err(e)` is the `HostError` failure path. Idiomatic
/// `Result` plays the same role as a boolean return without an out-parameter.
///
/// Deliberately not `Send + Sync`: the runtime itself is single-threaded (§5 — one runtime
/// handle is owned by exactly one thread of control at a time), so a native closure is free
/// to close over thread-local host state such as `Rc<RefCell<_>>` without having to wrap it
/// in `Arc<Mutex<_>>` just to satisfy a bound this core never needs.
pub(crate) type NativeFn = Box<dyn Fn(&mut Runtime, &[Value]) -> RunResult<Value>>;

pub(crate) enum FunctionBody {
    /// Bytecode bytes plus the number of temporary slots the frame must allocate.
    Bytecode { code: Vec<u8>, tmpvar_size: u16 },
    Native(NativeFn),
}

pub(crate) struct Function {
    pub(crate) name: Box<str>,
    pub(crate) params: Vec<Box<str>>,
    pub(crate) file: Box<str>,
    pub(crate) body: FunctionBody,
}

impl Function {
    pub(crate) fn arity(&self) -> usize {
        self.params.len()
    }
}
