//! The embeddable runtime: function table, globals, heap, call stack, and the host-facing
//! embedding API (§3, §6.1).

use indexmap::IndexMap;

use crate::{
    bytecode::{self, CompiledFunction},
    error::{ErrorKind, RunError, RunResult},
    frame::{Frame, RETURN_LOCAL, THIS_LOCAL},
    function::{Function, FunctionBody, NativeFn, MAX_ARITY},
    heap::Heap,
    intern::FunctionId,
    resource::Limits,
    value::{ArrayId, DictId, HostValue, Value},
};

/// The top-level embeddable runtime (§3, §6.1).
///
/// Owns every function ever registered, the global namespace, the heap, and the call stack
/// for whatever call is currently in flight. A host typically keeps exactly one of these per
/// script instance; nothing here is `Send`/`Sync` because the heap's nursery lists are only
/// valid while their owning frame is on `frames`.
pub struct Runtime {
    functions: Vec<Function>,
    function_names: IndexMap<Box<str>, FunctionId>,
    globals: Vec<(Box<str>, Value)>,
    heap: Heap,
    frames: Vec<Frame>,
    limits: Limits,
    last_error: Option<RunError>,
    current_file: Box<str>,
    current_line: u32,
}

impl Runtime {
    /// Creates a fresh runtime with the four built-in intrinsics registered (§6.3).
    pub fn create() -> Self {
        let mut rt = Self {
            functions: Vec::new(),
            function_names: IndexMap::new(),
            globals: Vec::new(),
            heap: Heap::new(),
            frames: Vec::new(),
            limits: Limits::default(),
            last_error: None,
            current_file: "<core>".into(),
            current_line: 0,
        };
        crate::builtins::register_all(&mut rt);
        rt
    }

    pub fn with_limits(limits: Limits) -> Self {
        let mut rt = Self::create();
        rt.limits = limits;
        rt
    }

    // ---- registration (§6.1) ----

    /// Loads a compiled bytecode module (§6.2) and registers each function it contains.
    /// Registering two functions under the same name overwrites the earlier one, matching
    /// how `register_native` behaves.
    pub fn register_bytecode(&mut self, module: &[u8]) -> RunResult<()> {
        let (source_file, compiled) = bytecode::parse_module(module).map_err(|e| {
            RunError::new(ErrorKind::BrokenBytecode, self.current_file.as_ref(), self.current_line, e.to_string())
        })?;
        for CompiledFunction { name, params, tmpvar_size, code } in compiled {
            if params.len() > MAX_ARITY {
                return Err(RunError::new(
                    ErrorKind::BrokenBytecode,
                    source_file.as_str(),
                    0,
                    format!("function '{name}' declares more than {MAX_ARITY} parameters"),
                ));
            }
            let function = Function {
                name: name.as_str().into(),
                params: params.iter().map(|p| p.as_str().into()).collect(),
                file: source_file.as_str().into(),
                body: FunctionBody::Bytecode { code, tmpvar_size },
            };
            self.define_function(name, function);
        }
        Ok(())
    }

    /// Registers a single host-implemented function under `name` (§6.1).
    ///
    /// Takes a closure over [`HostValue`] rather than the core's internal, crate-private
    /// `Value` representation, so a host outside this crate can actually name the types it
    /// needs to implement one: every argument is copied off the heap into a `HostValue`
    /// before the call and the result is copied back on after. The four built-in intrinsics
    /// (§6.3) skip this conversion by going through [`Self::register_native_raw`] directly,
    /// since they already operate in terms of the internal representation.
    pub fn register_native(
        &mut self,
        name: &str,
        params: &[&str],
        native: impl Fn(&mut Runtime, &[HostValue]) -> RunResult<HostValue> + 'static,
    ) -> RunResult<()> {
        let wrapped: NativeFn = Box::new(move |rt, args: &[Value]| {
            let host_args: Vec<HostValue> = args.iter().map(|&v| rt.value_to_host(v)).collect();
            let result = native(rt, &host_args)?;
            Ok(rt.host_to_value(&result))
        });
        self.register_native_raw(name, params, wrapped)
    }

    /// Registers a host function operating directly on the internal `Value` representation.
    /// Crate-internal only: used by the built-in intrinsics (§6.3) to avoid a host-boundary
    /// conversion round trip they don't need.
    pub(crate) fn register_native_raw(&mut self, name: &str, params: &[&str], native: NativeFn) -> RunResult<()> {
        if params.len() > MAX_ARITY {
            return Err(RunError::new(
                ErrorKind::HostError,
                self.current_file.as_ref(),
                self.current_line,
                format!("native function '{name}' declares more than {MAX_ARITY} parameters"),
            ));
        }
        let function = Function {
            name: name.into(),
            params: params.iter().map(|p| (*p).into()).collect(),
            file: "<native>".into(),
            body: FunctionBody::Native(native),
        };
        self.define_function(name.to_owned(), function);
        Ok(())
    }

    /// Registers `function` under `name`, then binds that name to a `Func` global: "registration
    /// appends a function as a Func-valued global" (§4.2), so scripted code can reference a
    /// registered function (bytecode- or host-backed) by plain `LOADSYMBOL`, not only through
    /// `call_by_name`/`CALL`'s own function-table lookup.
    fn define_function(&mut self, name: String, function: Function) {
        let name: Box<str> = name.into_boxed_str();
        let id = if let Some(&id) = self.function_names.get(&name) {
            self.functions[id.index()] = function;
            id
        } else {
            let id = FunctionId::from_index(self.functions.len());
            self.functions.push(function);
            self.function_names.insert(name.clone(), id);
            id
        };
        self.set_global(&name, Value::Func(id));
    }

    pub(crate) fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.index()]
    }

    pub(crate) fn lookup_function(&self, name: &str) -> Option<FunctionId> {
        self.function_names.get(name).copied()
    }

    // ---- globals (§3.3) ----

    pub(crate) fn get_global(&self, name: &str) -> Option<Value> {
        self.globals.iter().find(|(n, _)| n.as_ref() == name).map(|(_, v)| *v)
    }

    pub(crate) fn set_global(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.globals.iter_mut().find(|(n, _)| n.as_ref() == name) {
            slot.1 = value;
        } else {
            self.globals.push((name.into(), value));
        }
        self.heap.promote(&mut self.frames, value);
    }

    fn global_roots(&self) -> Vec<Value> {
        self.globals.iter().map(|(_, v)| *v).collect()
    }

    // ---- calling (§4.2, §4.3) ----

    /// Calls a function by name with host-facing argument values, returning the host-facing
    /// result. This is the primary host/core boundary (§6.1): arguments are copied onto the
    /// heap, the call runs to completion or error, and the result is copied back off.
    pub fn call_by_name(&mut self, name: &str, args: &[HostValue]) -> RunResult<HostValue> {
        let id = self.lookup_function(name).ok_or_else(|| {
            RunError::new(ErrorKind::CallError, self.current_file.as_ref(), self.current_line, format!("no such function '{name}'"))
        })?;
        let values: Vec<Value> = args.iter().map(|a| self.host_to_value(a)).collect();
        let result = self.call(id, &values)?;
        Ok(self.value_to_host(result))
    }

    /// Calls a function already identified by table index. Used internally by `CALL`/`THISCALL`
    /// and exposed so natives can call back into scripted functions.
    pub(crate) fn call(&mut self, id: FunctionId, args: &[Value]) -> RunResult<Value> {
        if self.limits.exceeds_call_depth(self.frames.len() + 1) {
            return Err(self.error(ErrorKind::CallError, "call stack exceeded the configured maximum depth"));
        }
        if args.len() > MAX_ARITY {
            return Err(self.error(ErrorKind::CallError, format!("call passes {} arguments, max is {MAX_ARITY}", args.len())));
        }
        let arity = self.functions[id.index()].arity();
        if args.len() != arity {
            let name = self.functions[id.index()].name.clone();
            return Err(self.error(
                ErrorKind::CallError,
                format!("function '{name}' expects {arity} arguments, got {}", args.len()),
            ));
        }

        match &self.functions[id.index()].body {
            FunctionBody::Native(_) => self.call_native(id, args, None),
            FunctionBody::Bytecode { .. } => self.call_bytecode(id, args, None),
        }
    }

    /// `THISCALL`'s variant of `call`: binds `this` to `receiver` before running the body.
    ///
    /// A method literal's declared parameter list may itself start with an explicit `this`
    /// name (the source language's own method-definition style, §3.6: local bindings include
    /// "`this` when applicable, the parameter names" as separate items) — `THISCALL`'s own
    /// `args` never include the receiver, since it is supplied out of band. So the expected
    /// argument count is the declared arity minus one when the function's first parameter is
    /// literally named `this`, and zero otherwise.
    pub(crate) fn this_call(&mut self, id: FunctionId, receiver: Value, args: &[Value]) -> RunResult<Value> {
        if self.limits.exceeds_call_depth(self.frames.len() + 1) {
            return Err(self.error(ErrorKind::CallError, "call stack exceeded the configured maximum depth"));
        }
        if args.len() > MAX_ARITY {
            return Err(self.error(ErrorKind::CallError, format!("call passes {} arguments, max is {MAX_ARITY}", args.len())));
        }
        let params = &self.functions[id.index()].params;
        let declares_this = params.first().map(|p| p.as_ref()) == Some(THIS_LOCAL);
        let expected = params.len() - usize::from(declares_this);
        if args.len() != expected {
            let name = self.functions[id.index()].name.clone();
            return Err(self.error(
                ErrorKind::CallError,
                format!("method '{name}' expects {expected} arguments, got {}", args.len()),
            ));
        }
        match &self.functions[id.index()].body {
            FunctionBody::Native(_) => self.call_native(id, args, Some(receiver)),
            FunctionBody::Bytecode { .. } => self.call_bytecode(id, args, Some(receiver)),
        }
    }

    /// Calling a native needs `&mut self` to reach the function itself and to hand the
    /// runtime to the closure at the same time. Swapping the body out for the duration of
    /// the call (rather than holding a borrow across it) sidesteps that without unsafe code;
    /// re-entrant calls to the same native just see its placeholder slot as a dead end, which
    /// cannot happen since natives are only invoked through this table.
    fn call_native(&mut self, id: FunctionId, args: &[Value], receiver: Option<Value>) -> RunResult<Value> {
        let _ = receiver;
        let placeholder = FunctionBody::Bytecode { code: Vec::new(), tmpvar_size: 0 };
        let body = std::mem::replace(&mut self.functions[id.index()].body, placeholder);
        let result = match &body {
            FunctionBody::Native(f) => f(self, args),
            FunctionBody::Bytecode { .. } => unreachable!("call_native invoked on a bytecode function"),
        };
        self.functions[id.index()].body = body;
        result
    }

    fn call_bytecode(&mut self, id: FunctionId, args: &[Value], receiver: Option<Value>) -> RunResult<Value> {
        let tmpvar_size = match &self.functions[id.index()].body {
            FunctionBody::Bytecode { tmpvar_size, .. } => *tmpvar_size,
            FunctionBody::Native(_) => unreachable!(),
        };
        self.enter_frame(id, tmpvar_size, receiver, args);
        let result = bytecode::run_function(self);
        let value = self.frames.last().map(|f| f.return_value()).unwrap_or_default();
        // The callee's frame is about to retire; a heap-backed `$return` still sitting on
        // its nursery would retire right along with it and dangle the moment a shallow GC
        // runs. Re-home it into the caller (or tenured, with no caller left) first.
        let caller_depth = (self.frames.len() >= 2).then(|| u32::try_from(self.frames.len() - 2).expect("call stack deeper than u32"));
        self.heap.reown_return_value(&mut self.frames, value, caller_depth);
        self.leave_frame();
        result?;
        Ok(value)
    }

    /// Pushes a new activation record, binding parameters (and `this`, if present) as locals
    /// (§4.3).
    pub(crate) fn enter_frame(&mut self, id: FunctionId, tmpvar_size: u16, receiver: Option<Value>, args: &[Value]) {
        let mut frame = Frame::new(id, tmpvar_size);
        let params = self.functions[id.index()].params.clone();
        let mut declared = params.iter();
        if let Some(this) = receiver {
            frame.set_local(THIS_LOCAL, this);
            // A method literal may declare `this` as its own first parameter name (see
            // `this_call`'s doc comment); skip it here so the remaining declared names line
            // up positionally with `args`, which `THISCALL` never includes the receiver in.
            if declared.as_slice().first().map(|p| p.as_ref()) == Some(THIS_LOCAL) {
                declared.next();
            }
        }
        for (param, value) in declared.zip(args) {
            frame.set_local(param, *value);
        }
        self.frames.push(frame);
    }

    /// Pops the current activation record, moving its nursery objects onto the heap's
    /// garbage lists for the next shallow collection (§4.3, §4.5). Does not free anything
    /// itself — a live reference (e.g. a `$return` value a caller hasn't re-homed yet) stays
    /// valid until `collect_garbage` actually runs.
    pub(crate) fn leave_frame(&mut self) {
        if let Some(mut frame) = self.frames.pop() {
            self.heap.retire_frame(&mut frame);
        }
    }

    pub(crate) fn current_frame(&self) -> &Frame {
        self.frames.last().expect("no active frame")
    }

    pub(crate) fn current_frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("no active frame")
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub(crate) fn tmp(&self, slot: u16) -> RunResult<Value> {
        self.current_frame()
            .tmp
            .get(slot as usize)
            .copied()
            .ok_or_else(|| RunError::new(ErrorKind::BrokenBytecode, self.current_file.as_ref(), self.current_line, format!("tmpvar {slot} out of range")))
    }

    pub(crate) fn set_tmp(&mut self, slot: u16, value: Value) -> RunResult<()> {
        let file = self.current_file.clone();
        let line = self.current_line;
        match self.current_frame_mut().tmp.get_mut(slot as usize) {
            Some(cell) => {
                *cell = value;
                Ok(())
            }
            None => Err(RunError::new(ErrorKind::BrokenBytecode, file.as_ref(), line, format!("tmpvar {slot} out of range"))),
        }
    }

    pub(crate) fn heap(&self) -> &Heap {
        &self.heap
    }

    // The methods below thread `self.heap` and `self.frames` together so call sites never
    // need to borrow both mutably themselves (which the borrow checker can't split through
    // a `&mut self` accessor method).

    pub(crate) fn make_string(&mut self, bytes: &[u8]) -> Value {
        self.heap.make_string(&mut self.frames, bytes)
    }

    pub(crate) fn make_empty_array(&mut self) -> Value {
        self.heap.make_empty_array(&mut self.frames)
    }

    pub(crate) fn make_empty_dict(&mut self) -> Value {
        self.heap.make_empty_dict(&mut self.frames)
    }

    pub(crate) fn array_set(&mut self, id: ArrayId, index: i32, value: Value, file: &str, line: u32) -> RunResult<()> {
        self.heap.array_set(&mut self.frames, id, index, value, file, line)
    }

    pub(crate) fn array_resize(&mut self, id: ArrayId, new_size: usize) {
        self.heap.array_resize(id, new_size)
    }

    pub(crate) fn dict_set(&mut self, id: DictId, key: &str, value: Value) {
        self.heap.dict_set(&mut self.frames, id, key, value)
    }

    pub(crate) fn dict_remove(&mut self, id: DictId, key: &str, file: &str, line: u32) -> RunResult<()> {
        self.heap.dict_remove(id, key, file, line)
    }

    pub(crate) fn promote(&mut self, value: Value) {
        self.heap.promote(&mut self.frames, value)
    }

    // ---- garbage collection (§4.5, §6.1) ----

    /// Frees everything that fell out of scope at every `leave_frame` since the last
    /// collection (O(garbage)). Not run automatically; a host drives GC timing itself.
    pub fn collect_garbage(&mut self) {
        self.heap.shallow_gc();
    }

    /// Full mark-and-sweep over the tenured heap, rooted in the global namespace.
    pub fn collect_garbage_deep(&mut self) {
        let roots = self.global_roots();
        self.heap.deep_gc(roots);
    }

    pub fn heap_usage(&self) -> usize {
        self.heap.heap_usage()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    // ---- error/location state (§3.7, §7) ----

    pub(crate) fn error(&mut self, kind: ErrorKind, message: impl Into<String>) -> RunError {
        let err = RunError::new(kind, self.current_file.as_ref(), self.current_line, message);
        self.last_error = Some(err.clone());
        err
    }

    pub(crate) fn set_location(&mut self, file: &str, line: u32) {
        self.current_file = file.into();
        self.current_line = line;
    }

    pub(crate) fn current_file(&self) -> &str {
        &self.current_file
    }

    pub(crate) fn current_line(&self) -> u32 {
        self.current_line
    }

    pub fn last_error(&self) -> Option<&RunError> {
        self.last_error.as_ref()
    }

    // ---- value conversion across the host boundary (§6.1) ----

    pub(crate) fn host_to_value(&mut self, host: &HostValue) -> Value {
        match host {
            HostValue::Int(i) => Value::Int(*i),
            HostValue::Float(f) => Value::Float(*f),
            HostValue::String(s) => self.heap.make_string(&mut self.frames, s.as_bytes()),
            HostValue::Array(items) => {
                let array = self.heap.make_empty_array(&mut self.frames);
                let Value::Array(id) = array else { unreachable!() };
                for (i, item) in items.iter().enumerate() {
                    let v = self.host_to_value(item);
                    let _ = self.heap.array_set(&mut self.frames, id, i as i32, v, "<host>", 0);
                }
                array
            }
            HostValue::Dict(pairs) => {
                let dict = self.heap.make_empty_dict(&mut self.frames);
                let Value::Dict(id) = dict else { unreachable!() };
                for (key, item) in pairs {
                    let v = self.host_to_value(item);
                    self.heap.dict_set(&mut self.frames, id, key, v);
                }
                dict
            }
            HostValue::Func(name) => {
                let id = self.lookup_function(name).unwrap_or_else(|| FunctionId::from_index(0));
                Value::Func(id)
            }
        }
    }

    pub(crate) fn value_to_host(&self, value: Value) -> HostValue {
        match value {
            Value::Int(i) => HostValue::Int(i),
            Value::Float(f) => HostValue::Float(f),
            Value::String(id) => HostValue::String(String::from_utf8_lossy(self.heap.string(id).as_bytes()).into_owned()),
            Value::Array(id) => {
                let obj = self.heap.array(id);
                HostValue::Array(obj.as_slice().iter().map(|v| self.value_to_host(*v)).collect())
            }
            Value::Dict(id) => {
                let obj = self.heap.dict(id);
                let mut pairs = Vec::with_capacity(obj.size());
                for i in 0..obj.size() {
                    let key = obj.key_at(i).unwrap().to_owned();
                    let value = obj.value_at(i).unwrap();
                    pairs.push((key, self.value_to_host(value)));
                }
                HostValue::Dict(pairs)
            }
            Value::Func(id) => HostValue::Func(self.functions[id.index()].name.to_string()),
        }
    }
}

#[cfg(test)]
impl Runtime {
    pub(crate) fn function_count(&self) -> usize {
        self.functions.len()
    }
}
