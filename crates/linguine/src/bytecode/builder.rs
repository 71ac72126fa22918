//! `FunctionBuilder`: an in-process way to assemble a function's bytecode without going
//! through the text module format, used by the integration tests and by any host that
//! wants to build functions programmatically (§4.4.1, §4.4.2).

use super::op::Opcode;

/// A forward or backward jump target. Bound exactly once with [`FunctionBuilder::bind_label`];
/// every `Jmp*` instruction that references it is patched once the final offset is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Label(usize);

pub(crate) struct FunctionBuilder {
    code: Vec<u8>,
    labels: Vec<Option<u32>>,
    /// Offsets into `code` holding an unresolved imm32 target, paired with the label it refers to.
    fixups: Vec<(usize, Label)>,
}

impl FunctionBuilder {
    pub(crate) fn new() -> Self {
        Self { code: Vec::new(), labels: Vec::new(), fixups: Vec::new() }
    }

    pub(crate) fn offset(&self) -> usize {
        self.code.len()
    }

    pub(crate) fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds `label` to the current write position. Must be called exactly once per label
    /// before [`Self::finish`].
    pub(crate) fn bind_label(&mut self, label: Label) {
        self.labels[label.0] = Some(u32::try_from(self.code.len()).expect("function larger than u32"));
    }

    fn emit_op(&mut self, op: Opcode) {
        self.code.push(op.into());
    }

    fn emit_u8(&mut self, v: u8) {
        self.code.push(v);
    }

    fn emit_u16(&mut self, v: u16) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn emit_u32(&mut self, v: u32) {
        self.code.extend_from_slice(&v.to_be_bytes());
    }

    fn emit_string(&mut self, s: &str) {
        self.code.extend_from_slice(s.as_bytes());
        self.code.push(0);
    }

    /// Emits an imm32 placeholder for `label` and records it for later patching.
    fn emit_label_ref(&mut self, label: Label) {
        self.fixups.push((self.code.len(), label));
        self.emit_u32(0);
    }

    pub(crate) fn emit_nop(&mut self) {
        self.emit_op(Opcode::Nop);
    }

    pub(crate) fn emit_line_info(&mut self, line: u32) {
        self.emit_op(Opcode::LineInfo);
        self.emit_u32(line);
    }

    pub(crate) fn emit_assign(&mut self, dst: u16, src: u16) {
        self.emit_op(Opcode::Assign);
        self.emit_u16(dst);
        self.emit_u16(src);
    }

    pub(crate) fn emit_iconst(&mut self, dst: u16, value: i32) {
        self.emit_op(Opcode::IConst);
        self.emit_u16(dst);
        self.emit_u32(value as u32);
    }

    pub(crate) fn emit_fconst(&mut self, dst: u16, value: f32) {
        self.emit_op(Opcode::FConst);
        self.emit_u16(dst);
        self.emit_u32(value.to_bits());
    }

    pub(crate) fn emit_sconst(&mut self, dst: u16, value: &str) {
        self.emit_op(Opcode::SConst);
        self.emit_u16(dst);
        self.emit_string(value);
    }

    pub(crate) fn emit_aconst(&mut self, dst: u16) {
        self.emit_op(Opcode::AConst);
        self.emit_u16(dst);
    }

    pub(crate) fn emit_dconst(&mut self, dst: u16) {
        self.emit_op(Opcode::DConst);
        self.emit_u16(dst);
    }

    pub(crate) fn emit_inc(&mut self, dst: u16) {
        self.emit_op(Opcode::Inc);
        self.emit_u16(dst);
    }

    fn emit_binary3(&mut self, op: Opcode, dst: u16, s1: u16, s2: u16) {
        self.emit_op(op);
        self.emit_u16(dst);
        self.emit_u16(s1);
        self.emit_u16(s2);
    }

    pub(crate) fn emit_add(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Add, dst, s1, s2);
    }

    pub(crate) fn emit_sub(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Sub, dst, s1, s2);
    }

    pub(crate) fn emit_mul(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Mul, dst, s1, s2);
    }

    pub(crate) fn emit_div(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Div, dst, s1, s2);
    }

    pub(crate) fn emit_mod(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Mod, dst, s1, s2);
    }

    pub(crate) fn emit_and(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::And, dst, s1, s2);
    }

    pub(crate) fn emit_or(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Or, dst, s1, s2);
    }

    pub(crate) fn emit_xor(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Xor, dst, s1, s2);
    }

    pub(crate) fn emit_neg(&mut self, dst: u16, src: u16) {
        self.emit_op(Opcode::Neg);
        self.emit_u16(dst);
        self.emit_u16(src);
    }

    pub(crate) fn emit_lt(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Lt, dst, s1, s2);
    }

    pub(crate) fn emit_lte(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Lte, dst, s1, s2);
    }

    pub(crate) fn emit_gt(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Gt, dst, s1, s2);
    }

    pub(crate) fn emit_gte(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Gte, dst, s1, s2);
    }

    pub(crate) fn emit_eq(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Eq, dst, s1, s2);
    }

    pub(crate) fn emit_neq(&mut self, dst: u16, s1: u16, s2: u16) {
        self.emit_binary3(Opcode::Neq, dst, s1, s2);
    }

    pub(crate) fn emit_load_array(&mut self, dst: u16, container: u16, subscript: u16) {
        self.emit_op(Opcode::LoadArray);
        self.emit_u16(dst);
        self.emit_u16(container);
        self.emit_u16(subscript);
    }

    pub(crate) fn emit_store_array(&mut self, container: u16, subscript: u16, src: u16) {
        self.emit_op(Opcode::StoreArray);
        self.emit_u16(container);
        self.emit_u16(subscript);
        self.emit_u16(src);
    }

    pub(crate) fn emit_len(&mut self, dst: u16, src: u16) {
        self.emit_op(Opcode::Len);
        self.emit_u16(dst);
        self.emit_u16(src);
    }

    pub(crate) fn emit_get_dict_key_by_index(&mut self, dst: u16, dict: u16, i: u16) {
        self.emit_op(Opcode::GetDictKeyByIndex);
        self.emit_u16(dst);
        self.emit_u16(dict);
        self.emit_u16(i);
    }

    pub(crate) fn emit_get_dict_val_by_index(&mut self, dst: u16, dict: u16, i: u16) {
        self.emit_op(Opcode::GetDictValByIndex);
        self.emit_u16(dst);
        self.emit_u16(dict);
        self.emit_u16(i);
    }

    pub(crate) fn emit_load_symbol(&mut self, dst: u16, name: &str) {
        self.emit_op(Opcode::LoadSymbol);
        self.emit_u16(dst);
        self.emit_string(name);
    }

    pub(crate) fn emit_store_symbol(&mut self, name: &str, src: u16) {
        self.emit_op(Opcode::StoreSymbol);
        self.emit_string(name);
        self.emit_u16(src);
    }

    pub(crate) fn emit_load_dot(&mut self, dst: u16, dict: u16, name: &str) {
        self.emit_op(Opcode::LoadDot);
        self.emit_u16(dst);
        self.emit_u16(dict);
        self.emit_string(name);
    }

    pub(crate) fn emit_store_dot(&mut self, dict: u16, name: &str, src: u16) {
        self.emit_op(Opcode::StoreDot);
        self.emit_u16(dict);
        self.emit_string(name);
        self.emit_u16(src);
    }

    pub(crate) fn emit_call(&mut self, dst: u16, func: u16, args: &[u16]) {
        assert!(args.len() <= crate::function::MAX_ARITY, "call exceeds 32 arguments");
        self.emit_op(Opcode::Call);
        self.emit_u16(dst);
        self.emit_u16(func);
        self.emit_u8(args.len() as u8);
        for &a in args {
            self.emit_u16(a);
        }
    }

    pub(crate) fn emit_this_call(&mut self, dst: u16, obj: u16, method_name: &str, args: &[u16]) {
        assert!(args.len() <= crate::function::MAX_ARITY, "call exceeds 32 arguments");
        self.emit_op(Opcode::ThisCall);
        self.emit_u16(dst);
        self.emit_u16(obj);
        self.emit_string(method_name);
        self.emit_u8(args.len() as u8);
        for &a in args {
            self.emit_u16(a);
        }
    }

    pub(crate) fn emit_jmp(&mut self, target: Label) {
        self.emit_op(Opcode::Jmp);
        self.emit_label_ref(target);
    }

    pub(crate) fn emit_jmp_if_true(&mut self, src: u16, target: Label) {
        self.emit_op(Opcode::JmpIfTrue);
        self.emit_u16(src);
        self.emit_label_ref(target);
    }

    pub(crate) fn emit_jmp_if_false(&mut self, src: u16, target: Label) {
        self.emit_op(Opcode::JmpIfFalse);
        self.emit_u16(src);
        self.emit_label_ref(target);
    }

    /// Resolves every label reference and returns the finished bytecode. Panics if a label
    /// created with `new_label` was never bound — that would be a bug in the caller, not a
    /// recoverable runtime condition.
    pub(crate) fn finish(mut self) -> Vec<u8> {
        for (offset, label) in &self.fixups {
            let target = self.labels[label.0].expect("label referenced but never bound");
            self.code[*offset..*offset + 4].copy_from_slice(&target.to_be_bytes());
        }
        self.code
    }
}

impl Default for FunctionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patches_a_forward_jump_to_the_bound_offset() {
        let mut b = FunctionBuilder::new();
        let end = b.new_label();
        b.emit_iconst(0, 1);
        b.emit_jmp(end);
        b.emit_iconst(0, 2);
        b.bind_label(end);
        b.emit_nop();
        let code = b.finish();
        // Jmp opcode byte + imm32 target should point at the trailing Nop.
        let jmp_at = 1 + 2 + 4; // IConst: op, dst(u16), imm32(u32)
        assert_eq!(code[jmp_at], Opcode::Jmp.into());
        let target = u32::from_be_bytes(code[jmp_at + 1..jmp_at + 5].try_into().unwrap());
        assert_eq!(target as usize, code.len() - 1);
    }
}
