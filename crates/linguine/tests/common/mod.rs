//! A tiny bytecode assembler for the integration tests, standing in for the external
//! low-IR generator (out of scope for the core itself, per §1). It emits the exact wire
//! format §4.4.1/§6.2 describe, opcode byte values included, so these tests exercise the
//! public `Runtime::register_bytecode` entry point the same way a real host would.

#![allow(dead_code)]

const OP_NOP: u8 = 0;
const OP_LINEINFO: u8 = 1;
const OP_ASSIGN: u8 = 2;
const OP_ICONST: u8 = 3;
const OP_FCONST: u8 = 4;
const OP_SCONST: u8 = 5;
const OP_ACONST: u8 = 6;
const OP_DCONST: u8 = 7;
const OP_INC: u8 = 8;
const OP_ADD: u8 = 9;
const OP_SUB: u8 = 10;
const OP_MUL: u8 = 11;
const OP_DIV: u8 = 12;
const OP_MOD: u8 = 13;
const OP_AND: u8 = 14;
const OP_OR: u8 = 15;
const OP_XOR: u8 = 16;
const OP_NEG: u8 = 17;
const OP_LT: u8 = 18;
const OP_LTE: u8 = 19;
const OP_GT: u8 = 20;
const OP_GTE: u8 = 21;
const OP_EQ: u8 = 22;
const OP_NEQ: u8 = 23;
const OP_LOADARRAY: u8 = 25;
const OP_STOREARRAY: u8 = 26;
const OP_LEN: u8 = 27;
const OP_GETDICTKEYBYINDEX: u8 = 28;
const OP_GETDICTVALBYINDEX: u8 = 29;
const OP_LOADSYMBOL: u8 = 30;
const OP_STORESYMBOL: u8 = 31;
const OP_LOADDOT: u8 = 32;
const OP_STOREDOT: u8 = 33;
const OP_CALL: u8 = 34;
const OP_THISCALL: u8 = 35;
const OP_JMP: u8 = 36;
const OP_JMPIFTRUE: u8 = 37;
const OP_JMPIFFALSE: u8 = 38;

/// A forward-or-backward jump target, resolved once [`Asm::bind`] fixes its offset.
#[derive(Clone, Copy)]
pub struct Label(usize);

/// Assembles one function's bytecode by hand, the way the low-IR generator the core
/// receives modules from would.
pub struct Asm {
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
}

impl Asm {
    pub fn new() -> Self {
        Self { code: Vec::new(), labels: Vec::new(), fixups: Vec::new() }
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) {
        self.labels[label.0] = Some(self.code.len() as u32);
    }

    fn u16(&mut self, v: u16) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn string(&mut self, s: &str) {
        self.code.extend_from_slice(s.as_bytes());
        self.code.push(0);
    }

    fn target(&mut self, label: Label) {
        self.fixups.push((self.code.len(), label));
        self.u32(0);
    }

    pub fn line(&mut self, line: u32) {
        self.code.push(OP_LINEINFO);
        self.u32(line);
    }

    pub fn assign(&mut self, dst: u16, src: u16) {
        self.code.push(OP_ASSIGN);
        self.u16(dst);
        self.u16(src);
    }

    pub fn iconst(&mut self, dst: u16, v: i32) {
        self.code.push(OP_ICONST);
        self.u16(dst);
        self.u32(v as u32);
    }

    pub fn fconst(&mut self, dst: u16, v: f32) {
        self.code.push(OP_FCONST);
        self.u16(dst);
        self.u32(v.to_bits());
    }

    pub fn sconst(&mut self, dst: u16, v: &str) {
        self.code.push(OP_SCONST);
        self.u16(dst);
        self.string(v);
    }

    pub fn aconst(&mut self, dst: u16) {
        self.code.push(OP_ACONST);
        self.u16(dst);
    }

    pub fn dconst(&mut self, dst: u16) {
        self.code.push(OP_DCONST);
        self.u16(dst);
    }

    pub fn inc(&mut self, dst: u16) {
        self.code.push(OP_INC);
        self.u16(dst);
    }

    fn binary3(&mut self, op: u8, dst: u16, s1: u16, s2: u16) {
        self.code.push(op);
        self.u16(dst);
        self.u16(s1);
        self.u16(s2);
    }

    pub fn add(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_ADD, dst, s1, s2);
    }
    pub fn sub(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_SUB, dst, s1, s2);
    }
    pub fn mul(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_MUL, dst, s1, s2);
    }
    pub fn div(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_DIV, dst, s1, s2);
    }
    pub fn rem(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_MOD, dst, s1, s2);
    }
    pub fn and(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_AND, dst, s1, s2);
    }
    pub fn or(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_OR, dst, s1, s2);
    }
    pub fn xor(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_XOR, dst, s1, s2);
    }

    pub fn neg(&mut self, dst: u16, src: u16) {
        self.code.push(OP_NEG);
        self.u16(dst);
        self.u16(src);
    }

    pub fn lt(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_LT, dst, s1, s2);
    }
    pub fn lte(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_LTE, dst, s1, s2);
    }
    pub fn gt(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_GT, dst, s1, s2);
    }
    pub fn gte(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_GTE, dst, s1, s2);
    }
    pub fn eq(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_EQ, dst, s1, s2);
    }
    pub fn neq(&mut self, dst: u16, s1: u16, s2: u16) {
        self.binary3(OP_NEQ, dst, s1, s2);
    }

    pub fn load_array(&mut self, dst: u16, container: u16, subscript: u16) {
        self.code.push(OP_LOADARRAY);
        self.u16(dst);
        self.u16(container);
        self.u16(subscript);
    }

    pub fn store_array(&mut self, container: u16, subscript: u16, src: u16) {
        self.code.push(OP_STOREARRAY);
        self.u16(container);
        self.u16(subscript);
        self.u16(src);
    }

    pub fn len(&mut self, dst: u16, src: u16) {
        self.code.push(OP_LEN);
        self.u16(dst);
        self.u16(src);
    }

    pub fn get_dict_key_by_index(&mut self, dst: u16, dict: u16, i: u16) {
        self.code.push(OP_GETDICTKEYBYINDEX);
        self.u16(dst);
        self.u16(dict);
        self.u16(i);
    }

    pub fn get_dict_val_by_index(&mut self, dst: u16, dict: u16, i: u16) {
        self.code.push(OP_GETDICTVALBYINDEX);
        self.u16(dst);
        self.u16(dict);
        self.u16(i);
    }

    pub fn load_symbol(&mut self, dst: u16, name: &str) {
        self.code.push(OP_LOADSYMBOL);
        self.u16(dst);
        self.string(name);
    }

    pub fn store_symbol(&mut self, name: &str, src: u16) {
        self.code.push(OP_STORESYMBOL);
        self.string(name);
        self.u16(src);
    }

    pub fn load_dot(&mut self, dst: u16, dict: u16, name: &str) {
        self.code.push(OP_LOADDOT);
        self.u16(dst);
        self.u16(dict);
        self.string(name);
    }

    pub fn store_dot(&mut self, dict: u16, name: &str, src: u16) {
        self.code.push(OP_STOREDOT);
        self.u16(dict);
        self.string(name);
        self.u16(src);
    }

    pub fn call(&mut self, dst: u16, func: u16, args: &[u16]) {
        self.code.push(OP_CALL);
        self.u16(dst);
        self.u16(func);
        self.code.push(args.len() as u8);
        for &a in args {
            self.u16(a);
        }
    }

    pub fn this_call(&mut self, dst: u16, obj: u16, method: &str, args: &[u16]) {
        self.code.push(OP_THISCALL);
        self.u16(dst);
        self.u16(obj);
        self.string(method);
        self.code.push(args.len() as u8);
        for &a in args {
            self.u16(a);
        }
    }

    pub fn jmp(&mut self, target: Label) {
        self.code.push(OP_JMP);
        self.target(target);
    }

    pub fn jmp_if_true(&mut self, src: u16, target: Label) {
        self.code.push(OP_JMPIFTRUE);
        self.u16(src);
        self.target(target);
    }

    pub fn jmp_if_false(&mut self, src: u16, target: Label) {
        self.code.push(OP_JMPIFFALSE);
        self.u16(src);
        self.target(target);
    }

    pub fn nop(&mut self) {
        self.code.push(OP_NOP);
    }

    pub fn finish(mut self) -> Vec<u8> {
        for (offset, label) in &self.fixups {
            let target = self.labels[label.0].expect("label referenced but never bound");
            self.code[*offset..*offset + 4].copy_from_slice(&target.to_be_bytes());
        }
        self.code
    }
}

impl Default for Asm {
    fn default() -> Self {
        Self::new()
    }
}

/// One function record: name, parameter names, local slot count, and assembled bytecode.
pub struct FnDef {
    pub name: &'static str,
    pub params: &'static [&'static str],
    pub tmpvar_size: u16,
    pub code: Vec<u8>,
}

/// Serializes function records into the §6.2 text-framed module container.
pub fn build_module(source_file: &str, functions: &[FnDef]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"Linguine Bytecode\n");
    out.extend_from_slice(b"Source\n");
    out.extend_from_slice(source_file.as_bytes());
    out.push(b'\n');
    out.extend_from_slice(b"Number Of Functions\n");
    out.extend_from_slice(functions.len().to_string().as_bytes());
    out.push(b'\n');

    for f in functions {
        out.extend_from_slice(b"Begin Function\n");
        out.extend_from_slice(b"Name\n");
        out.extend_from_slice(f.name.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"Parameters\n");
        out.extend_from_slice(f.params.len().to_string().as_bytes());
        out.push(b'\n');
        for p in f.params {
            out.extend_from_slice(p.as_bytes());
            out.push(b'\n');
        }
        out.extend_from_slice(b"Local Size\n");
        out.extend_from_slice(f.tmpvar_size.to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(b"Bytecode Size\n");
        out.extend_from_slice(f.code.len().to_string().as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&f.code);
        out.push(b'\n');
        out.extend_from_slice(b"End Function\n");
    }

    out
}
