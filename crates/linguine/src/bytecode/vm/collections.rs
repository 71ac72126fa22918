//! `LOADARRAY`/`STOREARRAY`/`LEN`/`GETDICTKEYBYINDEX`/`GETDICTVALBYINDEX`/`LOADSYMBOL`/
//! `STORESYMBOL`/`LOADDOT`/`STOREDOT` (§4.4.3, §4.3).

use super::type_error;
use crate::{
    error::{ErrorKind, RunError, RunResult},
    runtime::Runtime,
    value::Value,
};

/// "array-or-dict indexed load" (§4.4.2): an `Int` subscript indexes an array, a `String`
/// subscript looks up a dict key — the same opcode serves both `a[i]` and `d[k]` forms.
pub(crate) fn load_array(rt: &mut Runtime, container: u16, subscript: u16, file: &str, line: u32) -> RunResult<Value> {
    let container_value = rt.tmp(container)?;
    let subscript_value = rt.tmp(subscript)?;
    match (container_value, subscript_value) {
        (Value::Array(id), Value::Int(index)) => rt.heap().array_get(id, index, file, line),
        (Value::Array(_), other) => Err(type_error(file, line, "LOADARRAY", other)),
        (Value::Dict(id), Value::String(key_id)) => {
            let key = String::from_utf8_lossy(rt.heap().string(key_id).as_bytes()).into_owned();
            rt.heap().dict_get(id, &key, file, line)
        }
        (Value::Dict(_), other) => Err(type_error(file, line, "LOADARRAY", other)),
        (other, _) => Err(type_error(file, line, "LOADARRAY", other)),
    }
}

pub(crate) fn store_array(rt: &mut Runtime, container: u16, subscript: u16, src: u16, file: &str, line: u32) -> RunResult<()> {
    let container_value = rt.tmp(container)?;
    let subscript_value = rt.tmp(subscript)?;
    let value = rt.tmp(src)?;
    match (container_value, subscript_value) {
        (Value::Array(id), Value::Int(index)) => rt.array_set(id, index, value, file, line),
        (Value::Array(_), other) => Err(type_error(file, line, "STOREARRAY", other)),
        (Value::Dict(id), Value::String(key_id)) => {
            let key = String::from_utf8_lossy(rt.heap().string(key_id).as_bytes()).into_owned();
            rt.dict_set(id, &key, value);
            Ok(())
        }
        (Value::Dict(_), other) => Err(type_error(file, line, "STOREARRAY", other)),
        (other, _) => Err(type_error(file, line, "STOREARRAY", other)),
    }
}

pub(crate) fn len(rt: &mut Runtime, src: u16, file: &str, line: u32) -> RunResult<Value> {
    match rt.tmp(src)? {
        Value::Array(id) => Ok(Value::Int(rt.heap().array_len(id) as i32)),
        Value::Dict(id) => Ok(Value::Int(rt.heap().dict_len(id) as i32)),
        Value::String(id) => Ok(Value::Int(rt.heap().string(id).as_bytes().len() as i32)),
        other => Err(type_error(file, line, "LEN", other)),
    }
}

pub(crate) fn dict_key_by_index(rt: &mut Runtime, dict: u16, index: u16, file: &str, line: u32) -> RunResult<Value> {
    let i = expect_int(rt.tmp(index)?, file, line, "GETDICTKEYBYINDEX")?;
    match rt.tmp(dict)? {
        Value::Dict(id) => {
            let key = {
                let obj = rt.heap().dict(id);
                if i < 0 || (i as usize) >= obj.size() {
                    return Err(RunError::new(ErrorKind::IndexOutOfRange, file, line, format!("dict index {i} out of range")));
                }
                obj.key_at(i as usize).unwrap().to_owned()
            };
            Ok(rt.make_string(key.as_bytes()))
        }
        other => Err(type_error(file, line, "GETDICTKEYBYINDEX", other)),
    }
}

pub(crate) fn dict_val_by_index(rt: &mut Runtime, dict: u16, index: u16, file: &str, line: u32) -> RunResult<Value> {
    let i = expect_int(rt.tmp(index)?, file, line, "GETDICTVALBYINDEX")?;
    match rt.tmp(dict)? {
        Value::Dict(id) => {
            let obj = rt.heap().dict(id);
            if i < 0 || (i as usize) >= obj.size() {
                return Err(RunError::new(ErrorKind::IndexOutOfRange, file, line, format!("dict index {i} out of range")));
            }
            Ok(obj.value_at(i as usize).unwrap())
        }
        other => Err(type_error(file, line, "GETDICTVALBYINDEX", other)),
    }
}

/// `this`/locals shadow globals (§4.3).
pub(crate) fn load_symbol(rt: &mut Runtime, name: &str, file: &str, line: u32) -> RunResult<Value> {
    if let Some(v) = rt.current_frame().find_local(name) {
        return Ok(v);
    }
    if let Some(v) = rt.get_global(name) {
        return Ok(v);
    }
    Err(RunError::new(ErrorKind::SymbolNotFound, file, line, format!("symbol '{name}' not found")))
}

/// Updates whichever of local/global already binds `name`; if neither does, creates a new
/// local (§4.3 — locals, not globals, absorb first-write-creates-binding semantics).
pub(crate) fn store_symbol(rt: &mut Runtime, name: &str, value: Value) {
    if rt.current_frame().find_local(name).is_some() {
        rt.current_frame_mut().set_local(name, value);
        return;
    }
    if rt.get_global(name).is_some() {
        rt.set_global(name, value);
        return;
    }
    rt.current_frame_mut().set_local(name, value);
}

pub(crate) fn load_dot(rt: &mut Runtime, dict: u16, name: &str, file: &str, line: u32) -> RunResult<Value> {
    match rt.tmp(dict)? {
        Value::Dict(id) => rt.heap().dict_get(id, name, file, line),
        other => Err(type_error(file, line, "LOADDOT", other)),
    }
}

pub(crate) fn store_dot(rt: &mut Runtime, dict: u16, name: &str, src: u16, file: &str, line: u32) -> RunResult<()> {
    let value = rt.tmp(src)?;
    match rt.tmp(dict)? {
        Value::Dict(id) => {
            rt.dict_set(id, name, value);
            Ok(())
        }
        other => Err(type_error(file, line, "STOREDOT", other)),
    }
}

fn expect_int(value: Value, file: &str, line: u32, op: &str) -> RunResult<i32> {
    match value {
        Value::Int(i) => Ok(i),
        other => Err(type_error(file, line, op, other)),
    }
}
