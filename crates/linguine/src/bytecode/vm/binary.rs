//! `ADD`/`SUB`/`MUL`/`DIV`/`MOD`/`AND`/`OR`/`XOR` (§4.4.3).
//!
//! Arithmetic on two ints stays an int; mixing an int and a float promotes the int side and
//! produces a float. `ADD` additionally concatenates two strings. Bitwise ops require both
//! operands to be ints. Anything else is a `TypeError`.

use super::type_error;
use crate::{
    bytecode::op::Opcode,
    error::{ErrorKind, RunError, RunResult},
    runtime::Runtime,
    value::Value,
};

pub(crate) fn apply(rt: &mut Runtime, op: Opcode, a: Value, b: Value, file: &str, line: u32) -> RunResult<Value> {
    match op {
        Opcode::Add => add(rt, a, b, file, line),
        Opcode::Sub => numeric(a, b, file, line, "SUB", |x, y| x - y, |x, y| x.wrapping_sub(y)),
        Opcode::Mul => numeric(a, b, file, line, "MUL", |x, y| x * y, |x, y| x.wrapping_mul(y)),
        Opcode::Div => div(a, b, file, line),
        Opcode::Mod => rem(a, b, file, line),
        Opcode::And => bitwise(a, b, file, line, "AND", |x, y| x & y),
        Opcode::Or => bitwise(a, b, file, line, "OR", |x, y| x | y),
        Opcode::Xor => bitwise(a, b, file, line, "XOR", |x, y| x ^ y),
        _ => unreachable!("apply called with non-binary opcode"),
    }
}

/// ADD also accepts a `String` on either side paired with `Int`/`Float`/`String` (§4.4.3):
/// the non-string operand is formatted (`%d` for ints, `%f` for floats) and concatenated,
/// producing a freshly-allocated string. Two non-string operands fall through to the shared
/// numeric-promotion path.
fn add(rt: &mut Runtime, a: Value, b: Value, file: &str, line: u32) -> RunResult<Value> {
    if a.is_string_operand() || b.is_string_operand() {
        return string_concat(rt, a, b, file, line);
    }
    numeric(a, b, file, line, "ADD", |x, y| x + y, |x, y| x.wrapping_add(y))
}

fn string_concat(rt: &mut Runtime, a: Value, b: Value, file: &str, line: u32) -> RunResult<Value> {
    let left = format_operand(rt, a, file, line)?;
    let right = format_operand(rt, b, file, line)?;
    let mut bytes = left;
    bytes.extend_from_slice(&right);
    Ok(rt.make_string(&bytes))
}

fn format_operand(rt: &mut Runtime, value: Value, file: &str, line: u32) -> RunResult<Vec<u8>> {
    match value {
        Value::String(id) => Ok(rt.heap().string(id).as_bytes().to_vec()),
        Value::Int(i) => Ok(i.to_string().into_bytes()),
        Value::Float(f) => Ok(format!("{f:.6}").into_bytes()),
        other => Err(type_error(file, line, "ADD", other)),
    }
}

fn numeric(
    a: Value,
    b: Value,
    file: &str,
    line: u32,
    name: &str,
    on_float: impl Fn(f32, f32) -> f32,
    on_int: impl Fn(i32, i32) -> i32,
) -> RunResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(on_int(x, y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(on_float(x as f32, y))),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(on_float(x, y as f32))),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(on_float(x, y))),
        (x, _) if !matches!(x, Value::Int(_) | Value::Float(_)) => Err(type_error(file, line, name, x)),
        (_, y) => Err(type_error(file, line, name, y)),
    }
}

/// DIV by a zero of the divisor's own kind is `DivisionByZero` regardless of the dividend's
/// kind: an int divisor of `0` or a float divisor of `0.0` both count (§4.4.3).
fn div(a: Value, b: Value, file: &str, line: u32) -> RunResult<Value> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) | (_, Value::Float(0.0)) => {
            Err(RunError::new(ErrorKind::DivisionByZero, file, line, "division by zero"))
        }
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_div(y))),
        (Value::Int(x), Value::Float(y)) => Ok(Value::Float(x as f32 / y)),
        (Value::Float(x), Value::Int(y)) => Ok(Value::Float(x / y as f32)),
        (Value::Float(x), Value::Float(y)) => Ok(Value::Float(x / y)),
        (x, _) if !matches!(x, Value::Int(_) | Value::Float(_)) => Err(type_error(file, line, "DIV", x)),
        (_, y) => Err(type_error(file, line, "DIV", y)),
    }
}

/// MOD is integer-only: unlike the other arithmetic ops, mixing in a float is a `TypeError`
/// rather than a promotion (§4.4.3's "MOD integer-only" note).
fn rem(a: Value, b: Value, file: &str, line: u32) -> RunResult<Value> {
    match (a, b) {
        (Value::Int(_), Value::Int(0)) => {
            Err(RunError::new(ErrorKind::DivisionByZero, file, line, "modulo by zero"))
        }
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(x.wrapping_rem(y))),
        (x, _) if !matches!(x, Value::Int(_)) => Err(type_error(file, line, "MOD", x)),
        (_, y) => Err(type_error(file, line, "MOD", y)),
    }
}

fn bitwise(a: Value, b: Value, file: &str, line: u32, name: &str, f: impl Fn(i32, i32) -> i32) -> RunResult<Value> {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => Ok(Value::Int(f(x, y))),
        (x, _) if !matches!(x, Value::Int(_)) => Err(type_error(file, line, name, x)),
        (_, y) => Err(type_error(file, line, name, y)),
    }
}
