//! `LT`/`LTE`/`GT`/`GTE`/`EQ`/`NEQ`/`EQI` (§4.4.3).
//!
//! Ordering compares ints and floats only (mixed operands promote the int side), and the
//! result is always an `Int` of `0` or `1`. Equality additionally compares strings
//! byte-for-byte (§4.4.3's "String vs String compares lexicographically byte-wise" applies
//! to every comparison opcode in this group, not only the ordering ones) and considers two
//! non-string heap-backed values equal only when they name the same object (identity, not
//! deep structural equality — arrays/dicts have no structural-equality rule in the spec).

use super::type_error;
use crate::{bytecode::op::Opcode, error::RunResult, runtime::Runtime, value::Value};

pub(crate) fn apply(rt: &Runtime, op: Opcode, a: Value, b: Value, file: &str, line: u32) -> RunResult<Value> {
    match op {
        Opcode::Eq | Opcode::EqI => Ok(bool_value(values_equal(rt, a, b))),
        Opcode::Neq => Ok(bool_value(!values_equal(rt, a, b))),
        Opcode::Lt => order(rt, a, b, file, line, "LT", |o| o == std::cmp::Ordering::Less),
        Opcode::Lte => order(rt, a, b, file, line, "LTE", |o| o != std::cmp::Ordering::Greater),
        Opcode::Gt => order(rt, a, b, file, line, "GT", |o| o == std::cmp::Ordering::Greater),
        Opcode::Gte => order(rt, a, b, file, line, "GTE", |o| o != std::cmp::Ordering::Less),
        _ => unreachable!("apply called with non-compare opcode"),
    }
}

fn bool_value(b: bool) -> Value {
    Value::Int(i32::from(b))
}

fn values_equal(rt: &Runtime, a: Value, b: Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x == y,
        (Value::Float(x), Value::Float(y)) => x == y,
        (Value::Int(x), Value::Float(y)) | (Value::Float(y), Value::Int(x)) => x as f32 == y,
        (Value::String(x), Value::String(y)) => {
            x == y || rt.heap().string(x).as_bytes() == rt.heap().string(y).as_bytes()
        }
        (Value::Array(x), Value::Array(y)) => x == y,
        (Value::Dict(x), Value::Dict(y)) => x == y,
        (Value::Func(x), Value::Func(y)) => x == y,
        _ => false,
    }
}

fn order(
    rt: &crate::runtime::Runtime,
    a: Value,
    b: Value,
    file: &str,
    line: u32,
    name: &str,
    accept: impl Fn(std::cmp::Ordering) -> bool,
) -> RunResult<Value> {
    let ordering = match (a, b) {
        (Value::Int(x), Value::Int(y)) => x.cmp(&y),
        (Value::Int(x), Value::Float(y)) => (x as f32).partial_cmp(&y).unwrap_or(std::cmp::Ordering::Less),
        (Value::Float(x), Value::Int(y)) => x.partial_cmp(&(y as f32)).unwrap_or(std::cmp::Ordering::Less),
        (Value::Float(x), Value::Float(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Less),
        // Lexicographic byte-wise comparison, same as Rust's derived `Ord` on `[u8]` (§4.4.3).
        (Value::String(x), Value::String(y)) => rt.heap().string(x).as_bytes().cmp(rt.heap().string(y).as_bytes()),
        (x, _) if !matches!(x, Value::Int(_) | Value::Float(_) | Value::String(_)) => return Err(type_error(file, line, name, x)),
        (_, y) => return Err(type_error(file, line, name, y)),
    };
    Ok(bool_value(accept(ordering)))
}
