//! The interpreter dispatch loop (§4.4).
//!
//! One `run_function` call drives the frame currently on top of the runtime's call stack
//! until its program counter runs past the end of its bytecode; the frame's `$return` local
//! at that point becomes the call's result. There is no explicit return opcode (§4.4.2's
//! table has none) — falling off the end of a function's code is the only way out.

pub(crate) mod binary;
pub(crate) mod call;
pub(crate) mod collections;
pub(crate) mod compare;

use smallvec::SmallVec;

use crate::{
    bytecode::op::Opcode,
    error::{ErrorKind, RunError, RunResult},
    runtime::Runtime,
    value::Value,
};

struct Cursor<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn fetch_u8(&mut self, file: &str, line: u32) -> RunResult<u8> {
        let b = *self.code.get(self.pos).ok_or_else(|| truncated(file, line))?;
        self.pos += 1;
        Ok(b)
    }

    fn fetch_u16(&mut self, file: &str, line: u32) -> RunResult<u16> {
        let bytes = self.code.get(self.pos..self.pos + 2).ok_or_else(|| truncated(file, line))?;
        self.pos += 2;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    fn fetch_u32(&mut self, file: &str, line: u32) -> RunResult<u32> {
        let bytes = self.code.get(self.pos..self.pos + 4).ok_or_else(|| truncated(file, line))?;
        self.pos += 4;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a nul-terminated inline string operand.
    fn fetch_string(&mut self, file: &str, line: u32) -> RunResult<String> {
        let rest = &self.code[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(|| truncated(file, line))?;
        let s = std::str::from_utf8(&rest[..end])
            .map_err(|_| RunError::new(ErrorKind::BrokenBytecode, file, line, "non-UTF-8 string operand"))?
            .to_owned();
        self.pos += end + 1;
        Ok(s)
    }
}

fn truncated(file: &str, line: u32) -> RunError {
    RunError::new(ErrorKind::BrokenBytecode, file, line, "instruction truncated")
}

/// Truthiness for `JMPIFTRUE`/`JMPIFFALSE`/`JMPIFEQ` (§4.4.3): numbers are truthy when
/// nonzero; every heap-backed value (string/array/dict/func) is always truthy.
fn is_truthy(value: Value) -> bool {
    match value {
        Value::Int(i) => i != 0,
        Value::Float(f) => f != 0.0,
        Value::String(_) | Value::Array(_) | Value::Dict(_) | Value::Func(_) => true,
    }
}

/// Runs the frame on top of `rt`'s call stack to completion.
pub(crate) fn run_function(rt: &mut Runtime) -> RunResult<()> {
    let function_id = rt.current_frame().function;
    let (code, file) = {
        let function = rt.function(function_id);
        let code = match &function.body {
            crate::function::FunctionBody::Bytecode { code, .. } => code.clone(),
            crate::function::FunctionBody::Native(_) => unreachable!("run_function invoked on a native function"),
        };
        (code, function.file.clone())
    };
    rt.set_location(&file, 0);

    loop {
        let pc = rt.current_frame().pc;
        if pc >= code.len() {
            return Ok(());
        }

        let mut cursor = Cursor { code: &code, pos: pc };
        let line = rt.current_line();
        let op_byte = cursor.fetch_u8(&file, line)?;
        let opcode = Opcode::try_from(op_byte)
            .map_err(|_| RunError::new(ErrorKind::BrokenBytecode, file.as_ref(), line, format!("unknown opcode byte {op_byte}")))?;

        step(rt, opcode, &mut cursor, &file)?;
        rt.current_frame_mut().pc = cursor.pos;
    }
}

fn step(rt: &mut Runtime, opcode: Opcode, cursor: &mut Cursor<'_>, file: &str) -> RunResult<()> {
    let line = rt.current_line();
    match opcode {
        Opcode::Nop => {}

        Opcode::LineInfo => {
            let new_line = cursor.fetch_u32(file, line)?;
            rt.set_location(file, new_line);
        }

        Opcode::Assign => {
            let dst = cursor.fetch_u16(file, line)?;
            let src = cursor.fetch_u16(file, line)?;
            let value = rt.tmp(src)?;
            rt.set_tmp(dst, value)?;
        }

        Opcode::IConst => {
            let dst = cursor.fetch_u16(file, line)?;
            let imm = cursor.fetch_u32(file, line)? as i32;
            rt.set_tmp(dst, Value::Int(imm))?;
        }

        Opcode::FConst => {
            let dst = cursor.fetch_u16(file, line)?;
            let bits = cursor.fetch_u32(file, line)?;
            rt.set_tmp(dst, Value::Float(f32::from_bits(bits)))?;
        }

        Opcode::SConst => {
            let dst = cursor.fetch_u16(file, line)?;
            let s = cursor.fetch_string(file, line)?;
            let value = rt.make_string(s.as_bytes());
            rt.set_tmp(dst, value)?;
        }

        Opcode::AConst => {
            let dst = cursor.fetch_u16(file, line)?;
            let value = rt.make_empty_array();
            rt.set_tmp(dst, value)?;
        }

        Opcode::DConst => {
            let dst = cursor.fetch_u16(file, line)?;
            let value = rt.make_empty_dict();
            rt.set_tmp(dst, value)?;
        }

        Opcode::Inc => {
            let dst = cursor.fetch_u16(file, line)?;
            let value = rt.tmp(dst)?;
            let incremented = match value {
                Value::Int(i) => Value::Int(i.wrapping_add(1)),
                _ => return Err(broken_operand(file, line, Opcode::Inc, value)),
            };
            rt.set_tmp(dst, incremented)?;
        }

        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::And | Opcode::Or | Opcode::Xor => {
            let dst = cursor.fetch_u16(file, line)?;
            let s1 = cursor.fetch_u16(file, line)?;
            let s2 = cursor.fetch_u16(file, line)?;
            let a = rt.tmp(s1)?;
            let b = rt.tmp(s2)?;
            let result = binary::apply(rt, opcode, a, b, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::Neg => {
            let dst = cursor.fetch_u16(file, line)?;
            let src = cursor.fetch_u16(file, line)?;
            let value = rt.tmp(src)?;
            let complemented = match value {
                Value::Int(i) => Value::Int(!i),
                other => return Err(type_error(file, line, "NEG", other)),
            };
            rt.set_tmp(dst, complemented)?;
        }

        Opcode::Lt | Opcode::Lte | Opcode::Gt | Opcode::Gte | Opcode::Eq | Opcode::Neq | Opcode::EqI => {
            let dst = cursor.fetch_u16(file, line)?;
            let s1 = cursor.fetch_u16(file, line)?;
            let s2 = cursor.fetch_u16(file, line)?;
            let a = rt.tmp(s1)?;
            let b = rt.tmp(s2)?;
            let result = compare::apply(rt, opcode, a, b, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::LoadArray => {
            let dst = cursor.fetch_u16(file, line)?;
            let container = cursor.fetch_u16(file, line)?;
            let subscript = cursor.fetch_u16(file, line)?;
            let result = collections::load_array(rt, container, subscript, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::StoreArray => {
            let container = cursor.fetch_u16(file, line)?;
            let subscript = cursor.fetch_u16(file, line)?;
            let src = cursor.fetch_u16(file, line)?;
            collections::store_array(rt, container, subscript, src, file, line)?;
        }

        Opcode::Len => {
            let dst = cursor.fetch_u16(file, line)?;
            let src = cursor.fetch_u16(file, line)?;
            let result = collections::len(rt, src, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::GetDictKeyByIndex => {
            let dst = cursor.fetch_u16(file, line)?;
            let dict = cursor.fetch_u16(file, line)?;
            let index = cursor.fetch_u16(file, line)?;
            let result = collections::dict_key_by_index(rt, dict, index, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::GetDictValByIndex => {
            let dst = cursor.fetch_u16(file, line)?;
            let dict = cursor.fetch_u16(file, line)?;
            let index = cursor.fetch_u16(file, line)?;
            let result = collections::dict_val_by_index(rt, dict, index, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::LoadSymbol => {
            let dst = cursor.fetch_u16(file, line)?;
            let name = cursor.fetch_string(file, line)?;
            let result = collections::load_symbol(rt, &name, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::StoreSymbol => {
            let name = cursor.fetch_string(file, line)?;
            let src = cursor.fetch_u16(file, line)?;
            let value = rt.tmp(src)?;
            collections::store_symbol(rt, &name, value);
        }

        Opcode::LoadDot => {
            let dst = cursor.fetch_u16(file, line)?;
            let dict = cursor.fetch_u16(file, line)?;
            let name = cursor.fetch_string(file, line)?;
            let result = collections::load_dot(rt, dict, &name, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::StoreDot => {
            let dict = cursor.fetch_u16(file, line)?;
            let name = cursor.fetch_string(file, line)?;
            let src = cursor.fetch_u16(file, line)?;
            collections::store_dot(rt, dict, &name, src, file, line)?;
        }

        Opcode::Call => {
            let dst = cursor.fetch_u16(file, line)?;
            let func = cursor.fetch_u16(file, line)?;
            let argc = cursor.fetch_u8(file, line)?;
            let mut args: SmallVec<[Value; 3]> = SmallVec::with_capacity(argc as usize);
            for _ in 0..argc {
                let slot = cursor.fetch_u16(file, line)?;
                args.push(rt.tmp(slot)?);
            }
            let result = call::call(rt, func, &args, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::ThisCall => {
            let dst = cursor.fetch_u16(file, line)?;
            let obj = cursor.fetch_u16(file, line)?;
            let method_name = cursor.fetch_string(file, line)?;
            let argc = cursor.fetch_u8(file, line)?;
            let mut args: SmallVec<[Value; 3]> = SmallVec::with_capacity(argc as usize);
            for _ in 0..argc {
                let slot = cursor.fetch_u16(file, line)?;
                args.push(rt.tmp(slot)?);
            }
            let result = call::this_call(rt, obj, &method_name, &args, file, line)?;
            rt.set_tmp(dst, result)?;
        }

        Opcode::Jmp => {
            let target = cursor.fetch_u32(file, line)? as usize;
            cursor.pos = check_jump_target(target, cursor.code.len(), file, line)?;
        }

        Opcode::JmpIfTrue | Opcode::JmpIfEq => {
            let src = cursor.fetch_u16(file, line)?;
            let target = cursor.fetch_u32(file, line)? as usize;
            if is_truthy(rt.tmp(src)?) {
                cursor.pos = check_jump_target(target, cursor.code.len(), file, line)?;
            }
        }

        Opcode::JmpIfFalse => {
            let src = cursor.fetch_u16(file, line)?;
            let target = cursor.fetch_u32(file, line)? as usize;
            if !is_truthy(rt.tmp(src)?) {
                cursor.pos = check_jump_target(target, cursor.code.len(), file, line)?;
            }
        }
    }
    Ok(())
}

/// Jump targets are absolute byte offsets and must satisfy `target <= bytecode_size`, with
/// equality denoting a normal return (§4.4.2, testable property 1): anything past the end of
/// the code is corrupt and must raise `BrokenBytecode` rather than silently falling through
/// to `run_function`'s own `pc >= code.len()` normal-exit check.
fn check_jump_target(target: usize, bytecode_size: usize, file: &str, line: u32) -> RunResult<usize> {
    if target > bytecode_size {
        return Err(RunError::new(
            ErrorKind::BrokenBytecode,
            file,
            line,
            format!("jump target {target} exceeds bytecode size {bytecode_size}"),
        ));
    }
    Ok(target)
}

pub(crate) fn type_error(file: &str, line: u32, op: &str, value: Value) -> RunError {
    RunError::new(ErrorKind::TypeError, file, line, format!("{op} does not accept a {}", value.type_name()))
}

/// Unlike `type_error`, for opcodes whose operand shape is fixed by the instruction set
/// itself rather than by the language's own type rules — a non-`Int` `INC` operand can only
/// come from bytecode the interpreter should never have been handed (§4.4.2, §4.4.3).
pub(crate) fn broken_operand(file: &str, line: u32, op: Opcode, value: Value) -> RunError {
    RunError::new(
        ErrorKind::BrokenBytecode,
        file,
        line,
        format!("{} requires an Int operand, got a {}", op.mnemonic(), value.type_name()),
    )
}
