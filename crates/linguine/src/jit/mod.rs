//! Feature-gated template JIT.
//!
//! Running scripts only requires the tree-walking interpreter in [`crate::bytecode::vm`];
//! this module is the optional "compile once, dispatch through native closures instead of
//! re-decoding bytes" path it allows for. Rather than emitting raw machine code, each
//! instruction is lowered one-to-one into a boxed closure that calls the exact same
//! per-opcode helpers [`crate::bytecode::vm::run_function`] uses (`binary::apply`,
//! `compare::apply`, `collections::*`, `call::*`), so a compiled function and an
//! interpreted one can never disagree on semantics — only on how many times the bytecode
//! gets decoded. That is a deliberate substitution for unsafe native code generation, which
//! cannot be hand-verified without a compiler to run it through.
//!
//! Disabled by default; enable with the `template-jit` feature.

use std::collections::HashMap;

use crate::{
    bytecode::{
        vm::{binary, broken_operand, call, collections, compare, type_error},
        Opcode,
    },
    error::{ErrorKind, RunError, RunResult},
    runtime::Runtime,
    value::Value,
};

enum Flow {
    Next,
    Jump(usize),
}

type Thunk = Box<dyn Fn(&mut Runtime) -> RunResult<Flow> + Send + Sync>;

/// A function's bytecode, decoded once into a chain of closures plus a byte-offset-to-chain-
/// index map so jump targets (which are still byte offsets in the original encoding) resolve
/// to a chain position.
pub(crate) struct CompiledFunction {
    thunks: Vec<Thunk>,
}

struct Decoder<'a> {
    code: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn done(&self) -> bool {
        self.pos >= self.code.len()
    }

    fn fetch_u8(&mut self) -> RunResult<u8> {
        let b = *self.code.get(self.pos).ok_or_else(truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn fetch_u16(&mut self) -> RunResult<u16> {
        let b = self.code.get(self.pos..self.pos + 2).ok_or_else(truncated)?;
        self.pos += 2;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn fetch_u32(&mut self) -> RunResult<u32> {
        let b = self.code.get(self.pos..self.pos + 4).ok_or_else(truncated)?;
        self.pos += 4;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn fetch_string(&mut self) -> RunResult<Box<str>> {
        let rest = &self.code[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or_else(truncated)?;
        let s = std::str::from_utf8(&rest[..end]).map_err(|_| RunError::new(ErrorKind::BrokenBytecode, "<jit>", 0, "non-UTF-8 string operand"))?;
        let owned = s.into();
        self.pos += end + 1;
        Ok(owned)
    }
}

fn truncated() -> RunError {
    RunError::new(ErrorKind::BrokenBytecode, "<jit>", 0, "instruction truncated")
}

fn is_truthy(value: Value) -> bool {
    match value {
        Value::Int(i) => i != 0,
        Value::Float(f) => f != 0.0,
        Value::String(_) | Value::Array(_) | Value::Dict(_) | Value::Func(_) => true,
    }
}

/// Decodes `code` into a [`CompiledFunction`]. The only way this fails is truncated or
/// unrecognized bytecode — the same condition `run_function` would reject at the point it
/// reached that instruction.
pub(crate) fn compile(code: &[u8]) -> RunResult<CompiledFunction> {
    let mut offsets = Vec::new();
    let mut ops: Vec<(Opcode, Vec<Operand>)> = Vec::new();

    let mut d = Decoder { code, pos: 0 };
    while !d.done() {
        offsets.push(d.pos);
        let op_byte = d.fetch_u8()?;
        let opcode =
            Opcode::try_from(op_byte).map_err(|_| RunError::new(ErrorKind::BrokenBytecode, "<jit>", 0, format!("unknown opcode byte {op_byte}")))?;
        let operands = decode_operands(opcode, &mut d)?;
        ops.push((opcode, operands));
    }

    let offset_to_index: HashMap<usize, usize> = offsets.iter().enumerate().map(|(i, &off)| (off, i)).collect();
    let code_len = code.len();
    let thunk_count = ops.len();
    // A target equal to the bytecode size is valid (§4.4.2: "equality permitted to denote
    // the end, producing a normal return") even though it names no instruction start; map it
    // to one past the last thunk so `run`'s `index < thunks.len()` loop exits normally.
    let resolve = move |target: u32| -> RunResult<usize> {
        if target as usize == code_len {
            return Ok(thunk_count);
        }
        offset_to_index.get(&(target as usize)).copied().ok_or_else(|| RunError::new(ErrorKind::BrokenBytecode, "<jit>", 0, "jump targets mid-instruction"))
    };

    let mut thunks = Vec::with_capacity(ops.len());
    for (opcode, operands) in ops {
        thunks.push(build_thunk(opcode, operands, &resolve)?);
    }

    Ok(CompiledFunction { thunks })
}

#[derive(Clone)]
enum Operand {
    Tmp(u16),
    Imm32(u32),
    Imm8(u8),
    Str(Box<str>),
    Target(usize),
    Args(Vec<u16>),
}

fn decode_operands(opcode: Opcode, d: &mut Decoder<'_>) -> RunResult<Vec<Operand>> {
    use Operand::*;
    Ok(match opcode {
        Opcode::Nop => vec![],
        Opcode::LineInfo => vec![Imm32(d.fetch_u32()?)],
        Opcode::Assign | Opcode::Neg | Opcode::Len => vec![Tmp(d.fetch_u16()?), Tmp(d.fetch_u16()?)],
        Opcode::IConst | Opcode::FConst => vec![Tmp(d.fetch_u16()?), Imm32(d.fetch_u32()?)],
        Opcode::SConst => vec![Tmp(d.fetch_u16()?), Str(d.fetch_string()?)],
        Opcode::AConst | Opcode::DConst | Opcode::Inc => vec![Tmp(d.fetch_u16()?)],
        Opcode::Add
        | Opcode::Sub
        | Opcode::Mul
        | Opcode::Div
        | Opcode::Mod
        | Opcode::And
        | Opcode::Or
        | Opcode::Xor
        | Opcode::Lt
        | Opcode::Lte
        | Opcode::Gt
        | Opcode::Gte
        | Opcode::Eq
        | Opcode::Neq
        | Opcode::EqI
        | Opcode::LoadArray
        | Opcode::GetDictKeyByIndex
        | Opcode::GetDictValByIndex => vec![Tmp(d.fetch_u16()?), Tmp(d.fetch_u16()?), Tmp(d.fetch_u16()?)],
        Opcode::StoreArray => vec![Tmp(d.fetch_u16()?), Tmp(d.fetch_u16()?), Tmp(d.fetch_u16()?)],
        Opcode::LoadSymbol => vec![Tmp(d.fetch_u16()?), Str(d.fetch_string()?)],
        Opcode::StoreSymbol => vec![Str(d.fetch_string()?), Tmp(d.fetch_u16()?)],
        Opcode::LoadDot => vec![Tmp(d.fetch_u16()?), Tmp(d.fetch_u16()?), Str(d.fetch_string()?)],
        Opcode::StoreDot => vec![Tmp(d.fetch_u16()?), Str(d.fetch_string()?), Tmp(d.fetch_u16()?)],
        Opcode::Call => {
            let dst = Tmp(d.fetch_u16()?);
            let func = Tmp(d.fetch_u16()?);
            let argc = d.fetch_u8()?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(d.fetch_u16()?);
            }
            vec![dst, func, Args(args)]
        }
        Opcode::ThisCall => {
            let dst = Tmp(d.fetch_u16()?);
            let obj = Tmp(d.fetch_u16()?);
            let method = Str(d.fetch_string()?);
            let argc = d.fetch_u8()?;
            let mut args = Vec::with_capacity(argc as usize);
            for _ in 0..argc {
                args.push(d.fetch_u16()?);
            }
            vec![dst, obj, method, Args(args)]
        }
        Opcode::Jmp => vec![Imm32(d.fetch_u32()?)],
        Opcode::JmpIfTrue | Opcode::JmpIfFalse | Opcode::JmpIfEq => vec![Tmp(d.fetch_u16()?), Imm32(d.fetch_u32()?)],
    })
}

fn tmp_of(operands: &[Operand], i: usize) -> u16 {
    match &operands[i] {
        Operand::Tmp(t) => *t,
        _ => panic!("jit: operand {i} is not a tmpvar"),
    }
}

fn str_of(operands: &[Operand], i: usize) -> Box<str> {
    match &operands[i] {
        Operand::Str(s) => s.clone(),
        _ => panic!("jit: operand {i} is not a string"),
    }
}

fn args_of(operands: &[Operand], i: usize) -> Vec<u16> {
    match &operands[i] {
        Operand::Args(a) => a.clone(),
        _ => panic!("jit: operand {i} is not an arg list"),
    }
}

fn build_thunk(opcode: Opcode, operands: Vec<Operand>, resolve: &impl Fn(u32) -> RunResult<usize>) -> RunResult<Thunk> {
    let loc = |rt: &Runtime| (rt.current_file().to_owned(), rt.current_line());

    Ok(match opcode {
        Opcode::Nop => Box::new(|_rt| Ok(Flow::Next)),

        Opcode::LineInfo => {
            let Operand::Imm32(new_line) = operands[0] else { unreachable!() };
            Box::new(move |rt| {
                let file = rt.current_file().to_owned();
                rt.set_location(&file, new_line);
                Ok(Flow::Next)
            })
        }

        Opcode::Assign => {
            let (dst, src) = (tmp_of(&operands, 0), tmp_of(&operands, 1));
            Box::new(move |rt| {
                let v = rt.tmp(src)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::IConst => {
            let dst = tmp_of(&operands, 0);
            let Operand::Imm32(imm) = operands[1] else { unreachable!() };
            Box::new(move |rt| {
                rt.set_tmp(dst, Value::Int(imm as i32))?;
                Ok(Flow::Next)
            })
        }

        Opcode::FConst => {
            let dst = tmp_of(&operands, 0);
            let Operand::Imm32(bits) = operands[1] else { unreachable!() };
            Box::new(move |rt| {
                rt.set_tmp(dst, Value::Float(f32::from_bits(bits)))?;
                Ok(Flow::Next)
            })
        }

        Opcode::SConst => {
            let dst = tmp_of(&operands, 0);
            let s = str_of(&operands, 1);
            Box::new(move |rt| {
                let v = rt.make_string(s.as_bytes());
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::AConst => {
            let dst = tmp_of(&operands, 0);
            Box::new(move |rt| {
                let v = rt.make_empty_array();
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::DConst => {
            let dst = tmp_of(&operands, 0);
            Box::new(move |rt| {
                let v = rt.make_empty_dict();
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::Inc => {
            let dst = tmp_of(&operands, 0);
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = match rt.tmp(dst)? {
                    Value::Int(i) => Value::Int(i.wrapping_add(1)),
                    other => return Err(broken_operand(&file, line, Opcode::Inc, other)),
                };
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Mod | Opcode::And | Opcode::Or | Opcode::Xor => {
            let (dst, s1, s2) = (tmp_of(&operands, 0), tmp_of(&operands, 1), tmp_of(&operands, 2));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let a = rt.tmp(s1)?;
                let b = rt.tmp(s2)?;
                let v = binary::apply(rt, opcode, a, b, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::Neg => {
            let (dst, src) = (tmp_of(&operands, 0), tmp_of(&operands, 1));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = match rt.tmp(src)? {
                    Value::Int(i) => Value::Int(!i),
                    other => return Err(type_error(&file, line, "NEG", other)),
                };
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::Lt | Opcode::Lte | Opcode::Gt | Opcode::Gte | Opcode::Eq | Opcode::Neq | Opcode::EqI => {
            let (dst, s1, s2) = (tmp_of(&operands, 0), tmp_of(&operands, 1), tmp_of(&operands, 2));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let a = rt.tmp(s1)?;
                let b = rt.tmp(s2)?;
                let v = compare::apply(rt, opcode, a, b, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::LoadArray => {
            let (dst, container, subscript) = (tmp_of(&operands, 0), tmp_of(&operands, 1), tmp_of(&operands, 2));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = collections::load_array(rt, container, subscript, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::StoreArray => {
            let (container, subscript, src) = (tmp_of(&operands, 0), tmp_of(&operands, 1), tmp_of(&operands, 2));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                collections::store_array(rt, container, subscript, src, &file, line)?;
                Ok(Flow::Next)
            })
        }

        Opcode::Len => {
            let (dst, src) = (tmp_of(&operands, 0), tmp_of(&operands, 1));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = collections::len(rt, src, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::GetDictKeyByIndex => {
            let (dst, dict, index) = (tmp_of(&operands, 0), tmp_of(&operands, 1), tmp_of(&operands, 2));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = collections::dict_key_by_index(rt, dict, index, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::GetDictValByIndex => {
            let (dst, dict, index) = (tmp_of(&operands, 0), tmp_of(&operands, 1), tmp_of(&operands, 2));
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = collections::dict_val_by_index(rt, dict, index, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::LoadSymbol => {
            let dst = tmp_of(&operands, 0);
            let name = str_of(&operands, 1);
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = collections::load_symbol(rt, &name, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::StoreSymbol => {
            let name = str_of(&operands, 0);
            let src = tmp_of(&operands, 1);
            Box::new(move |rt| {
                let v = rt.tmp(src)?;
                collections::store_symbol(rt, &name, v);
                Ok(Flow::Next)
            })
        }

        Opcode::LoadDot => {
            let dst = tmp_of(&operands, 0);
            let dict = tmp_of(&operands, 1);
            let name = str_of(&operands, 2);
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let v = collections::load_dot(rt, dict, &name, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::StoreDot => {
            let dict = tmp_of(&operands, 0);
            let name = str_of(&operands, 1);
            let src = tmp_of(&operands, 2);
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                collections::store_dot(rt, dict, &name, src, &file, line)?;
                Ok(Flow::Next)
            })
        }

        Opcode::Call => {
            let dst = tmp_of(&operands, 0);
            let func = tmp_of(&operands, 1);
            let args = args_of(&operands, 2);
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let arg_values: RunResult<Vec<Value>> = args.iter().map(|&slot| rt.tmp(slot)).collect();
                let v = call::call(rt, func, &arg_values?, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::ThisCall => {
            let dst = tmp_of(&operands, 0);
            let obj = tmp_of(&operands, 1);
            let method = str_of(&operands, 2);
            let args = args_of(&operands, 3);
            Box::new(move |rt| {
                let (file, line) = loc(rt);
                let arg_values: RunResult<Vec<Value>> = args.iter().map(|&slot| rt.tmp(slot)).collect();
                let v = call::this_call(rt, obj, &method, &arg_values?, &file, line)?;
                rt.set_tmp(dst, v)?;
                Ok(Flow::Next)
            })
        }

        Opcode::Jmp => {
            let Operand::Imm32(target) = operands[0] else { unreachable!() };
            let index = resolve(target)?;
            Box::new(move |_rt| Ok(Flow::Jump(index)))
        }

        Opcode::JmpIfTrue | Opcode::JmpIfEq => {
            let src = tmp_of(&operands, 0);
            let Operand::Imm32(target) = operands[1] else { unreachable!() };
            let index = resolve(target)?;
            Box::new(move |rt| if is_truthy(rt.tmp(src)?) { Ok(Flow::Jump(index)) } else { Ok(Flow::Next) })
        }

        Opcode::JmpIfFalse => {
            let src = tmp_of(&operands, 0);
            let Operand::Imm32(target) = operands[1] else { unreachable!() };
            let index = resolve(target)?;
            Box::new(move |rt| if !is_truthy(rt.tmp(src)?) { Ok(Flow::Jump(index)) } else { Ok(Flow::Next) })
        }
    })
}

/// Runs a compiled function to completion against the runtime's current top frame, exactly
/// as `bytecode::vm::run_function` would for the interpreted path.
pub(crate) fn run(rt: &mut Runtime, compiled: &CompiledFunction) -> RunResult<()> {
    let mut index = 0usize;
    while index < compiled.thunks.len() {
        match (compiled.thunks[index])(rt)? {
            Flow::Next => index += 1,
            Flow::Jump(target) => index = target,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::builder::FunctionBuilder;

    #[test]
    fn compiles_a_straight_line_function() {
        let mut b = FunctionBuilder::new();
        b.emit_iconst(0, 41);
        b.emit_inc(0);
        let code = b.finish();
        let compiled = compile(&code).expect("should compile");
        assert_eq!(compiled.thunks.len(), 2);
    }
}
