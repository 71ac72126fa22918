//! `CALL`/`THISCALL` (§4.4.4, §4.2, §4.3).

use super::type_error;
use crate::{
    error::{ErrorKind, RunError, RunResult},
    runtime::Runtime,
    value::Value,
};

pub(crate) fn call(rt: &mut Runtime, func: u16, args: &[Value], file: &str, line: u32) -> RunResult<Value> {
    match rt.tmp(func)? {
        Value::Func(id) => rt.call(id, args),
        other => Err(type_error(file, line, "CALL", other)),
    }
}

/// `THISCALL` resolves `method_name` as an entry on the object dict, then calls it with
/// `this` bound to that object (§4.3's `this` binding, §4.4.4).
pub(crate) fn this_call(rt: &mut Runtime, obj: u16, method_name: &str, args: &[Value], file: &str, line: u32) -> RunResult<Value> {
    let receiver = rt.tmp(obj)?;
    let method = match receiver {
        Value::Dict(id) => rt.heap().dict_get(id, method_name, file, line)?,
        other => return Err(type_error(file, line, "THISCALL", other)),
    };
    match method {
        Value::Func(id) => rt.this_call(id, receiver, args),
        other => Err(RunError::new(
            ErrorKind::TypeError,
            file,
            line,
            format!("'{method_name}' is a {}, not a func", other.type_name()),
        )),
    }
}
