//! End-to-end scenarios a conforming core must pass (§8), built against the public
//! embedding API: register a hand-assembled module (standing in for what the external
//! low-IR generator would emit, §1), call into it, and check what comes back.

mod common;

use std::{cell::RefCell, rc::Rc};

use common::{build_module, Asm, FnDef};
use linguine::{ErrorKind, HostValue, Runtime};

#[test]
fn hello_calls_a_host_intrinsic_with_a_string_argument() {
    let received: Rc<RefCell<Option<String>>> = Rc::new(RefCell::new(None));
    let received_in_closure = received.clone();

    let mut rt = Runtime::create();
    rt.register_native("print", &["message"], move |_rt, args| {
        if let HostValue::String(s) = &args[0] {
            *received_in_closure.borrow_mut() = Some(s.clone());
        }
        Ok(HostValue::Int(0))
    })
    .unwrap();

    let mut main = Asm::new();
    main.sconst(0, "hello");
    let print_fn = 1u16;
    main.load_symbol(print_fn, "print");
    main.call(2, print_fn, &[0]);

    let module = build_module(
        "hello.lg",
        &[FnDef { name: "main", params: &[], tmpvar_size: 3, code: main.finish() }],
    );
    rt.register_bytecode(&module).unwrap();

    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::Int(0));
    assert_eq!(received.borrow().as_deref(), Some("hello"));
}

#[test]
fn ranged_for_sums_zero_through_four() {
    let mut rt = Runtime::create();

    let mut main = Asm::new();
    // t0 = i, t1 = s, t2 = 5 (limit), t3 = condition
    main.iconst(0, 0);
    main.iconst(1, 0);
    main.iconst(2, 5);
    let loop_start = main.label();
    let loop_end = main.label();
    main.bind(loop_start);
    main.lt(3, 0, 2);
    main.jmp_if_false(3, loop_end);
    main.add(1, 1, 0);
    main.inc(0);
    main.jmp(loop_start);
    main.bind(loop_end);
    main.store_symbol("$return", 1);

    let module =
        build_module("for.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 4, code: main.finish() }]);
    rt.register_bytecode(&module).unwrap();

    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::Int(10));
}

#[test]
fn dict_method_call_binds_this_and_runs_the_body() {
    let mut rt = Runtime::create();

    // hello(this, x) { return x + 1; } -- params are name-bound locals, not tmpvars, so `x`
    // has to come in through LOADSYMBOL before arithmetic can touch it (§4.3, §4.4.2).
    let mut hello = Asm::new();
    hello.load_symbol(0, "x");
    hello.iconst(1, 1);
    hello.add(2, 0, 1);
    hello.store_symbol("$return", 2);

    // main() { o = {}; o.hello = hello; return o.hello(41); }
    let mut main = Asm::new();
    main.dconst(0); // t0 = o
    main.load_symbol(1, "hello"); // t1 = hello (registered as a Func global, §4.2)
    main.store_dot(0, "hello", 1);
    main.iconst(2, 41);
    main.this_call(3, 0, "hello", &[2]);
    main.store_symbol("$return", 3);

    let module = build_module(
        "dict_method.lg",
        &[
            FnDef { name: "hello", params: &["this", "x"], tmpvar_size: 3, code: hello.finish() },
            FnDef { name: "main", params: &[], tmpvar_size: 4, code: main.finish() },
        ],
    );
    rt.register_bytecode(&module).unwrap();

    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::Int(42));
}

#[test]
fn string_concat_formats_the_non_string_side() {
    let mut rt = Runtime::create();

    let mut main = Asm::new();
    main.sconst(0, "n=");
    main.iconst(1, 3);
    main.add(2, 0, 1);
    main.store_symbol("$return", 2);

    let module =
        build_module("concat.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 3, code: main.finish() }]);
    rt.register_bytecode(&module).unwrap();

    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::String("n=3".to_owned()));
}

#[test]
fn array_growth_is_reclaimed_by_a_shallow_gc_after_the_call() {
    let mut rt = Runtime::create();

    // main() { a = []; i = 0; while (i < 1000) { push(a, i); i = i + 1; } return len(a); }
    let mut main = Asm::new();
    main.aconst(0); // t0 = a
    main.iconst(1, 0); // t1 = i
    main.iconst(2, 1000); // t2 = limit
    let loop_start = main.label();
    let loop_end = main.label();
    main.bind(loop_start);
    main.lt(3, 1, 2);
    main.jmp_if_false(3, loop_end);
    main.load_symbol(4, "push");
    main.call(5, 4, &[0, 1]);
    main.inc(1);
    main.jmp(loop_start);
    main.bind(loop_end);
    main.load_symbol(6, "len");
    main.call(7, 6, &[0]);
    main.store_symbol("$return", 7);

    let module = build_module(
        "growth.lg",
        &[FnDef { name: "main", params: &[], tmpvar_size: 8, code: main.finish() }],
    );
    rt.register_bytecode(&module).unwrap();

    let before = rt.heap_usage();
    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::Int(1000));

    // `a` was never assigned to a global, so it fell out of scope with the frame; the array
    // (and the 1000 ints it held, inline - no further heap objects) should be reclaimed.
    rt.collect_garbage();
    assert_eq!(rt.heap_usage(), before);
}

#[test]
fn a_returned_string_survives_into_the_caller_and_a_gc_after_the_call() {
    let mut rt = Runtime::create();

    // make_greeting() { t2 = "hi " + 1; return t2; } -- the concat allocates a fresh string
    // on make_greeting's own frame nursery.
    let mut make_greeting = Asm::new();
    make_greeting.sconst(0, "hi ");
    make_greeting.iconst(1, 1);
    make_greeting.add(2, 0, 1);
    make_greeting.store_symbol("$return", 2);

    // main() { t0 = make_greeting; t1 = t0(); return t1; }
    let mut main = Asm::new();
    main.load_symbol(0, "make_greeting");
    main.call(1, 0, &[]);
    main.store_symbol("$return", 1);

    let module = build_module(
        "nested_return.lg",
        &[
            FnDef { name: "make_greeting", params: &[], tmpvar_size: 3, code: make_greeting.finish() },
            FnDef { name: "main", params: &[], tmpvar_size: 2, code: main.finish() },
        ],
    );
    rt.register_bytecode(&module).unwrap();

    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::String("hi 1".to_owned()));
}

#[test]
fn a_returned_array_carries_its_nursery_owned_contents_into_the_caller() {
    let mut rt = Runtime::create();

    // build_one() { a = []; a[0] = "x" + 1; return a; } -- the array and the string it holds
    // are both still on build_one's own frame nursery when it returns.
    let mut build_one = Asm::new();
    build_one.aconst(0);
    build_one.sconst(1, "x");
    build_one.iconst(2, 1);
    build_one.add(3, 1, 2);
    build_one.iconst(4, 0);
    build_one.store_array(0, 4, 3);
    build_one.store_symbol("$return", 0);

    // main() { t0 = build_one; t1 = t0(); return t1[0]; }
    let mut main = Asm::new();
    main.load_symbol(0, "build_one");
    main.call(1, 0, &[]);
    main.iconst(2, 0);
    main.load_array(3, 1, 2);
    main.store_symbol("$return", 3);

    let module = build_module(
        "nested_array_return.lg",
        &[
            FnDef { name: "build_one", params: &[], tmpvar_size: 5, code: build_one.finish() },
            FnDef { name: "main", params: &[], tmpvar_size: 4, code: main.finish() },
        ],
    );
    rt.register_bytecode(&module).unwrap();

    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::String("x1".to_owned()));
}

#[test]
fn inc_on_a_non_int_operand_is_broken_bytecode() {
    let mut rt = Runtime::create();

    let mut main = Asm::new();
    main.fconst(0, 1.5);
    main.inc(0);
    main.store_symbol("$return", 0);

    let module = build_module("inc_float.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 1, code: main.finish() }]);
    rt.register_bytecode(&module).unwrap();

    let err = rt.call_by_name("main", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::BrokenBytecode);
}

#[test]
fn calling_an_unregistered_function_surfaces_an_error() {
    let mut rt = Runtime::create();
    let err = rt.call_by_name("ghost", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::CallError);
}

#[test]
fn a_jump_target_past_the_end_of_the_function_is_broken_bytecode() {
    let mut rt = Runtime::create();

    // A forward JMP whose target overshoots the function's own bytecode size. A real
    // low-IR generator never emits this; this stands in for corrupt bytecode reaching the
    // core directly through `register_bytecode` (§4.4.2, testable property 1).
    let mut main = Asm::new();
    let past_the_end = main.label();
    main.jmp(past_the_end);
    main.bind(past_the_end);
    let mut code = main.finish();
    // Patch the fixup to point one byte past the end of the function instead of binding it.
    let overshoot = code.len() as u32 + 1;
    let last4 = code.len() - 4;
    code[last4..].copy_from_slice(&overshoot.to_be_bytes());

    let module = build_module("broken.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 1, code }]);
    rt.register_bytecode(&module).unwrap();

    let err = rt.call_by_name("main", &[]).unwrap_err();
    assert_eq!(err.kind, ErrorKind::BrokenBytecode);
}

#[test]
fn a_jump_target_exactly_at_the_end_of_the_function_is_a_normal_return() {
    let mut rt = Runtime::create();

    // JMP to exactly `bytecode_size` is the documented end-of-function case (§4.4.2): it
    // must succeed as a normal return, not be rejected the way an overshooting target is.
    let mut main = Asm::new();
    main.iconst(0, 7);
    main.store_symbol("$return", 0);
    let end = main.label();
    main.jmp(end);
    main.iconst(0, 99); // unreachable: would overwrite $return if the jump didn't land exactly
    main.store_symbol("$return", 0);
    main.bind(end);
    let code = main.finish();

    let module = build_module("jump_to_end.lg", &[FnDef { name: "main", params: &[], tmpvar_size: 1, code }]);
    rt.register_bytecode(&module).unwrap();

    let ret = rt.call_by_name("main", &[]).unwrap();
    assert_eq!(ret, HostValue::Int(7));
}
