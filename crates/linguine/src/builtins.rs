//! The four host intrinsics every runtime registers at creation time (§6.3): `len`,
//! `push`, `unset`, `resize`. Everything else a host needs — printing, I/O, anything
//! environment-specific — is the host's own `register_native` call, not ours.

use crate::{
    error::{ErrorKind, RunError, RunResult},
    runtime::Runtime,
    value::Value,
};

pub(crate) fn register_all(rt: &mut Runtime) {
    let _ = rt.register_native_raw("len", &["value"], Box::new(len));
    let _ = rt.register_native_raw("push", &["array", "value"], Box::new(push));
    let _ = rt.register_native_raw("unset", &["container", "key"], Box::new(unset));
    let _ = rt.register_native_raw("resize", &["array", "size"], Box::new(resize));
}

fn len(rt: &mut Runtime, args: &[Value]) -> RunResult<Value> {
    match args[0] {
        Value::Array(id) => Ok(Value::Int(rt.heap().array_len(id) as i32)),
        Value::Dict(id) => Ok(Value::Int(rt.heap().dict_len(id) as i32)),
        Value::String(id) => Ok(Value::Int(rt.heap().string(id).as_bytes().len() as i32)),
        // Int/Float/Func have no length; the intrinsic reports 0 rather than erroring (§6.3).
        Value::Int(_) | Value::Float(_) | Value::Func(_) => Ok(Value::Int(0)),
    }
}

fn push(rt: &mut Runtime, args: &[Value]) -> RunResult<Value> {
    match args[0] {
        Value::Array(id) => {
            let index = rt.heap().array_len(id) as i32;
            rt.array_set(id, index, args[1], "<native:push>", 0)?;
            Ok(Value::Int(rt.heap().array_len(id) as i32))
        }
        other => Err(host_type_error("push", other)),
    }
}

fn unset(rt: &mut Runtime, args: &[Value]) -> RunResult<Value> {
    match (args[0], args[1]) {
        (Value::Dict(id), Value::String(key_id)) => {
            let key = String::from_utf8_lossy(rt.heap().string(key_id).as_bytes()).into_owned();
            rt.dict_remove(id, &key, "<native:unset>", 0)?;
            Ok(Value::Int(1))
        }
        (other, _) if !matches!(other, Value::Dict(_)) => Err(host_type_error("unset", other)),
        (_, other) => Err(host_type_error("unset", other)),
    }
}

fn resize(rt: &mut Runtime, args: &[Value]) -> RunResult<Value> {
    match (args[0], args[1]) {
        (Value::Array(id), Value::Int(size)) if size >= 0 => {
            rt.array_resize(id, size as usize);
            Ok(args[0])
        }
        (Value::Array(_), Value::Int(_)) => {
            Err(RunError::new(ErrorKind::HostError, "<native:resize>", 0, "resize does not accept a negative size"))
        }
        (other, _) if !matches!(other, Value::Array(_)) => Err(host_type_error("resize", other)),
        (_, other) => Err(host_type_error("resize", other)),
    }
}

fn host_type_error(name: &str, value: Value) -> RunError {
    RunError::new(ErrorKind::TypeError, "<native>", 0, format!("{name} does not accept a {}", value.type_name()))
}
