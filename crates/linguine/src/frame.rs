//! Per-call activation record and the enter/leave discipline that feeds the GC
//! (§3.6, §4.3).

use crate::{
    intern::FunctionId,
    value::{ArrayId, DictId, StringId, Value},
};

/// A single name-to-value local binding.
///
/// A linked list would model locals naturally; a flat `Vec` gives the same
/// shadow-then-fall-through-to-globals lookup semantics (§4.3) without the pointer
/// chasing, and is what every other name-keyed table in this core already uses.
pub(crate) struct LocalBinding {
    pub(crate) name: Box<str>,
    pub(crate) value: Value,
}

/// An activation record: the temporary slots a function's bytecode operates on, its local
/// bindings (including `this` and `$return` when present), and the three nursery lists that
/// own every heap object this frame has allocated and not yet promoted.
pub(crate) struct Frame {
    pub(crate) function: FunctionId,
    /// Dense array of temporary slots, length `tmpvar_size` (§3.6).
    pub(crate) tmp: Vec<Value>,
    pub(crate) locals: Vec<LocalBinding>,
    pub(crate) nursery_strings: Vec<StringId>,
    pub(crate) nursery_arrays: Vec<ArrayId>,
    pub(crate) nursery_dicts: Vec<DictId>,
    /// Program counter into the owning function's bytecode (§4.4.5).
    pub(crate) pc: usize,
}

pub(crate) const RETURN_LOCAL: &str = "$return";
pub(crate) const THIS_LOCAL: &str = "this";

impl Frame {
    pub(crate) fn new(function: FunctionId, tmpvar_size: u16) -> Self {
        Self {
            function,
            tmp: vec![Value::default(); tmpvar_size as usize],
            locals: Vec::new(),
            nursery_strings: Vec::new(),
            nursery_arrays: Vec::new(),
            nursery_dicts: Vec::new(),
            pc: 0,
        }
    }

    pub(crate) fn find_local(&self, name: &str) -> Option<Value> {
        self.locals.iter().find(|b| b.name.as_ref() == name).map(|b| b.value)
    }

    /// Binds or overwrites a local. Used for parameter binding, `this`, `$return`, and
    /// `STORESYMBOL` when the name is neither an existing local nor an existing global.
    pub(crate) fn set_local(&mut self, name: &str, value: Value) {
        if let Some(binding) = self.locals.iter_mut().find(|b| b.name.as_ref() == name) {
            binding.value = value;
        } else {
            self.locals.push(LocalBinding { name: name.into(), value });
        }
    }

    pub(crate) fn return_value(&self) -> Value {
        self.find_local(RETURN_LOCAL).unwrap_or_default()
    }
}
