use std::cell::RefCell;
use std::rc::Rc;

use sorrel::compiler::ast::{Expr, ExprKind, FunctionDecl, Op, Param, Stmt, StmtKind};
use sorrel::{SorrelError, Value, VM};

fn run(program: Vec<Stmt>) -> Result<Value, SorrelError> {
    VM::new().run_script("test", &program)
}

fn eval(program: Vec<Stmt>) -> Value {
    run(program).unwrap()
}

fn runtime_message(result: Result<Value, SorrelError>) -> String {
    match result {
        Err(SorrelError::RuntimeError(trace)) => trace.message,
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

fn num(value: f64) -> Expr {
    Expr::number(value, 1)
}

fn string(value: &str) -> Expr {
    Expr::string(value, 1)
}

fn id(name: &str) -> Expr {
    Expr::identifier(name, 1)
}

fn infix(op: Op, lhs: Expr, rhs: Expr) -> Expr {
    Expr::infix(op, lhs, rhs, 1)
}

fn list(values: Vec<Expr>) -> Expr {
    Expr::new(ExprKind::List(values), 1)
}

fn call(name: &str, args: Vec<Expr>) -> Expr {
    Expr::call(id(name), args, 1)
}

fn resume(target: Expr) -> Expr {
    Expr::new(ExprKind::Resume(Box::new(target)), 1)
}

fn yield_value(value: Expr) -> Expr {
    Expr::new(ExprKind::Yield(Some(Box::new(value))), 1)
}

fn assign(name: &str, value: Expr) -> Stmt {
    Stmt::expr(Expr::new(
        ExprKind::Assign(name.to_string(), Box::new(value)),
        1,
    ))
}

fn function(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
    Stmt::new(
        StmtKind::Function(FunctionDecl {
            name: name.to_string(),
            params,
            has_vargs: false,
            is_generator: false,
            body,
        }),
        1,
    )
}

fn generator(name: &str, params: Vec<Param>, body: Vec<Stmt>) -> Stmt {
    Stmt::new(
        StmtKind::Function(FunctionDecl {
            name: name.to_string(),
            params,
            has_vargs: false,
            is_generator: true,
            body,
        }),
        1,
    )
}

fn anonymous(params: Vec<Param>, body: Vec<Stmt>) -> Expr {
    Expr::new(
        ExprKind::Function(Box::new(FunctionDecl {
            name: String::new(),
            params,
            has_vargs: false,
            is_generator: false,
            body,
        })),
        1,
    )
}

fn value_list(values: Vec<Value>) -> Value {
    Value::List(Rc::new(RefCell::new(values)))
}

#[test]
fn test_arithmetic() {
    // (1 + 2) * 3
    let program = vec![Stmt::expr(infix(
        Op::Multiply,
        infix(Op::Add, num(1.0), num(2.0)),
        num(3.0),
    ))];
    assert_eq!(eval(program), Value::Number(9.0));
}

#[test]
fn test_string_concatenation_and_indexing() {
    // ("foo" + "bar")[3]
    let program = vec![Stmt::expr(Expr::new(
        ExprKind::Index(
            Box::new(infix(Op::Add, string("foo"), string("bar"))),
            Box::new(num(3.0)),
        ),
        1,
    ))];
    assert_eq!(eval(program), Value::String("b".into()));
}

#[test]
fn test_closures_capture_by_reference() {
    // var x = 5; var f = fn() { x + 1 }; x = 10; f()
    let program = vec![
        Stmt::var("x", num(5.0)),
        Stmt::var(
            "f",
            anonymous(vec![], vec![Stmt::expr(infix(Op::Add, id("x"), num(1.0)))]),
        ),
        assign("x", num(10.0)),
        Stmt::expr(call("f", vec![])),
    ];
    assert_eq!(eval(program), Value::Number(11.0));
}

#[test]
fn test_closed_captures_survive_their_frame() {
    // fun make_counter() { var count = 0; fn() { count = count + 1; count } }
    // var c = make_counter(); c(); c(); c()
    let counter_body = vec![
        assign("count", infix(Op::Add, id("count"), num(1.0))),
        Stmt::expr(id("count")),
    ];
    let program = vec![
        function(
            "make_counter",
            vec![],
            vec![
                Stmt::var("count", num(0.0)),
                Stmt::expr(anonymous(vec![], counter_body)),
            ],
        ),
        Stmt::var("c", call("make_counter", vec![])),
        Stmt::expr(call("c", vec![])),
        Stmt::expr(call("c", vec![])),
        Stmt::expr(call("c", vec![])),
    ];
    assert_eq!(eval(program), Value::Number(3.0));
}

#[test]
fn test_iter_loop_collects_results() {
    // iter i = 0 to 5 { i }
    let program = vec![Stmt::new(
        StmtKind::Iter {
            label: None,
            var: "i".to_string(),
            init: num(0.0),
            limit: num(5.0),
            step: None,
            body: vec![Stmt::expr(id("i"))],
        },
        1,
    )];
    assert_eq!(
        eval(program),
        value_list(vec![
            Value::Number(0.0),
            Value::Number(1.0),
            Value::Number(2.0),
            Value::Number(3.0),
            Value::Number(4.0),
        ])
    );
}

#[test]
fn test_iter_loop_counts_down_by_default() {
    // var last = nil; iter i = 3 to 0 { last = i }; last
    let program = vec![
        Stmt::new(StmtKind::Var("last".to_string(), None), 1),
        Stmt::new(
            StmtKind::Iter {
                label: None,
                var: "i".to_string(),
                init: num(3.0),
                limit: num(0.0),
                step: None,
                body: vec![assign("last", id("i"))],
            },
            1,
        ),
        Stmt::expr(id("last")),
    ];
    assert_eq!(eval(program), Value::Number(1.0));
}

#[test]
fn test_iter_step_pointing_away_from_limit_raises() {
    // iter i = 0 to 10 by -1 { i }
    let program = vec![Stmt::new(
        StmtKind::Iter {
            label: None,
            var: "i".to_string(),
            init: num(0.0),
            limit: num(10.0),
            step: Some(num(-1.0)),
            body: vec![Stmt::expr(id("i"))],
        },
        1,
    )];
    assert_eq!(
        runtime_message(run(program)),
        "Unhandled exception: Invalid iter step. The given step will lead the \
         index away from the limit, dooming the loop to never complete."
    );
}

#[test]
fn test_generator_yields_then_dies() {
    // gen fun counter() { yield 1; yield 2 }
    // var g = counter(); [resume g, resume g, resume g]
    let program = vec![
        generator(
            "counter",
            vec![],
            vec![
                Stmt::expr(yield_value(num(1.0))),
                Stmt::expr(yield_value(num(2.0))),
            ],
        ),
        Stmt::var("g", call("counter", vec![])),
        Stmt::var("a", resume(id("g"))),
        Stmt::var("b", resume(id("g"))),
        Stmt::var("c", resume(id("g"))),
        Stmt::expr(list(vec![id("a"), id("b"), id("c")])),
    ];
    assert_eq!(
        eval(program),
        value_list(vec![Value::Number(1.0), Value::Number(2.0), Value::Nil])
    );
}

#[test]
fn test_resume_after_the_last_yield_produces_no_value() {
    // gen fun numbers() { yield 1; 42 }
    // var g = numbers(); [resume g, resume g]
    let program = vec![
        generator(
            "numbers",
            vec![],
            vec![Stmt::expr(yield_value(num(1.0))), Stmt::expr(num(42.0))],
        ),
        Stmt::var("g", call("numbers", vec![])),
        Stmt::var("a", resume(id("g"))),
        Stmt::var("b", resume(id("g"))),
        Stmt::expr(list(vec![id("a"), id("b")])),
    ];
    // the body's final value never escapes the dying generator
    assert_eq!(
        eval(program),
        value_list(vec![Value::Number(1.0), Value::Nil])
    );
}

#[test]
fn test_resuming_a_running_generator_raises() {
    // var g = nil; gen fun loopy() { resume g }
    // g = loopy(); resume g
    let program = vec![
        Stmt::var("g", Expr::new(ExprKind::Nil, 1)),
        generator("loopy", vec![], vec![Stmt::expr(resume(id("g")))]),
        assign("g", call("loopy", vec![])),
        Stmt::expr(resume(id("g"))),
    ];
    assert_eq!(
        runtime_message(run(program)),
        "Unhandled exception: Attempt to resume a running generator."
    );
}

#[test]
fn test_resuming_a_dead_generator_raises() {
    let program = vec![
        generator("once", vec![], vec![Stmt::expr(yield_value(num(1.0)))]),
        Stmt::var("g", call("once", vec![])),
        Stmt::expr(resume(id("g"))),
        Stmt::expr(resume(id("g"))),
        Stmt::expr(resume(id("g"))),
    ];
    assert_eq!(
        runtime_message(run(program)),
        "Unhandled exception: Attempt to resume a dead generator."
    );
}

#[test]
fn test_resuming_a_non_generator_raises() {
    let program = vec![Stmt::expr(resume(num(5.0)))];
    assert_eq!(
        runtime_message(run(program)),
        "Unhandled exception: Expected a generator to resume, got a(n) number."
    );
}

#[test]
fn test_handlers_survive_a_yield() {
    // gen fun g() { try { yield 1; throw "inside" } catch e { yield e } }
    let program = vec![
        generator(
            "g",
            vec![],
            vec![Stmt::new(
                StmtKind::Try {
                    body: vec![
                        Stmt::expr(yield_value(num(1.0))),
                        Stmt::new(StmtKind::Throw(string("inside")), 1),
                    ],
                    name: Some("e".to_string()),
                    handler: vec![Stmt::expr(yield_value(id("e")))],
                },
                1,
            )],
        ),
        Stmt::var("k", call("g", vec![])),
        Stmt::var("a", resume(id("k"))),
        Stmt::var("b", resume(id("k"))),
        Stmt::expr(list(vec![id("a"), id("b")])),
    ];
    assert_eq!(
        eval(program),
        value_list(vec![Value::Number(1.0), Value::String("inside".into())])
    );
}

#[test]
fn test_tail_recursion_does_not_grow_the_stack() {
    // fun countdown(n) { if n == 0 { return "done" } tailrec(n - 1) }
    // countdown(100000)
    let program = vec![
        function(
            "countdown",
            vec![Param::new("n")],
            vec![
                Stmt::new(
                    StmtKind::If {
                        cond: infix(Op::Equals, id("n"), num(0.0)),
                        then: vec![Stmt::new(StmtKind::Return(Some(string("done"))), 1)],
                        or_else: None,
                    },
                    1,
                ),
                Stmt::expr(Expr::new(
                    ExprKind::TailRec(vec![infix(Op::Subtract, id("n"), num(1.0))]),
                    1,
                )),
            ],
        ),
        Stmt::expr(call("countdown", vec![num(100_000.0)])),
    ];
    assert_eq!(eval(program), Value::String("done".into()));
}

#[test]
fn test_exceptions_unwind_to_a_handler_frames_away() {
    // fun boom() { throw "bang" }
    // fun call_boom() { boom() }
    // try { call_boom() } catch e { e + "!" }
    let program = vec![
        function(
            "boom",
            vec![],
            vec![Stmt::new(StmtKind::Throw(string("bang")), 1)],
        ),
        function("call_boom", vec![], vec![Stmt::expr(call("boom", vec![]))]),
        Stmt::new(
            StmtKind::Try {
                body: vec![Stmt::expr(call("call_boom", vec![]))],
                name: Some("e".to_string()),
                handler: vec![Stmt::expr(infix(Op::Add, id("e"), string("!")))],
            },
            1,
        ),
    ];
    assert_eq!(eval(program), Value::String("bang!".into()));
}

#[test]
fn test_unhandled_exceptions_carry_a_trace() {
    let program = vec![Stmt::expr(Expr::identifier("missing_var", 3))];
    match run(program) {
        Err(SorrelError::RuntimeError(trace)) => {
            assert_eq!(
                trace.message,
                "Unhandled exception: Undefined variable 'missing_var'."
            );
            assert_eq!(trace.frames.len(), 1);
            assert_eq!(trace.frames[0].function, "script");
            assert_eq!(trace.frames[0].file, "test");
            assert_eq!(trace.frames[0].line, 3);
            assert_eq!(
                trace.to_string(),
                "Unhandled exception: Undefined variable 'missing_var'.\
                 \n\tcaused by test on line 3"
            );
        }
        other => panic!("expected a runtime error, got {:?}", other),
    }
}

#[test]
fn test_each_loop_enumerates_a_list() {
    // var total = 0; each x in [1, 2, 3] { total = total + x }; total
    let program = vec![
        Stmt::var("total", num(0.0)),
        Stmt::new(
            StmtKind::Each {
                label: None,
                var: "x".to_string(),
                value: list(vec![num(1.0), num(2.0), num(3.0)]),
                body: vec![assign("total", infix(Op::Add, id("total"), id("x")))],
            },
            1,
        ),
        Stmt::expr(id("total")),
    ];
    assert_eq!(eval(program), Value::Number(6.0));
}

#[test]
fn test_each_loop_enumerates_a_generator() {
    // gen fun nums() { yield 10; yield 20 }
    // var total = 0; each x in nums() { total = total + x }; total
    let program = vec![
        generator(
            "nums",
            vec![],
            vec![
                Stmt::expr(yield_value(num(10.0))),
                Stmt::expr(yield_value(num(20.0))),
            ],
        ),
        Stmt::var("total", num(0.0)),
        Stmt::new(
            StmtKind::Each {
                label: None,
                var: "x".to_string(),
                value: call("nums", vec![]),
                body: vec![assign("total", infix(Op::Add, id("total"), id("x")))],
            },
            1,
        ),
        Stmt::expr(id("total")),
    ];
    assert_eq!(eval(program), Value::Number(30.0));
}

#[test]
fn test_indexed_each_counts_from_one() {
    // var indices = []; each i, x in ["a", "b"] { indices[+]= i }; indices
    let append = Stmt::expr(Expr::new(
        ExprKind::OperIndexAssign {
            target: Box::new(id("indices")),
            oper: Op::Add,
            value: Box::new(id("i")),
        },
        1,
    ));
    let program = vec![
        Stmt::var("indices", list(vec![])),
        Stmt::new(
            StmtKind::IndexedEach {
                label: None,
                index: "i".to_string(),
                var: "x".to_string(),
                value: list(vec![string("a"), string("b")]),
                body: vec![append],
            },
            1,
        ),
        Stmt::expr(id("indices")),
    ];
    assert_eq!(
        eval(program),
        value_list(vec![Value::Number(1.0), Value::Number(2.0)])
    );
}

#[test]
fn test_default_parameters_fill_missing_arguments() {
    // fun add(a, b = 10) { a + b }; add(1)
    let program = vec![
        function(
            "add",
            vec![Param::new("a"), Param::with_default("b", num(10.0))],
            vec![Stmt::expr(infix(Op::Add, id("a"), id("b")))],
        ),
        Stmt::expr(call("add", vec![num(1.0)])),
    ];
    assert_eq!(eval(program), Value::Number(11.0));
}

#[test]
fn test_variadic_parameters_collect_the_excess() {
    // fun count_rest(first, rest..) { rest.length }; count_rest(1, 2, 3, 4)
    let program = vec![
        Stmt::new(
            StmtKind::Function(FunctionDecl {
                name: "count_rest".to_string(),
                params: vec![Param::new("first"), Param::new("rest")],
                has_vargs: true,
                is_generator: false,
                body: vec![Stmt::expr(Expr::new(
                    ExprKind::Field(Box::new(id("rest")), "length".to_string()),
                    1,
                ))],
            }),
            1,
        ),
        Stmt::expr(call(
            "count_rest",
            vec![num(1.0), num(2.0), num(3.0), num(4.0)],
        )),
    ];
    assert_eq!(eval(program), Value::Number(3.0));
}

#[test]
fn test_labeled_break_leaves_both_loops() {
    // var n = 0
    // while true 'outer { while true { n = n + 1; break outer } }
    // n
    let inner = Stmt::new(
        StmtKind::While {
            label: None,
            cond: Expr::new(ExprKind::Boolean(true), 1),
            body: vec![
                assign("n", infix(Op::Add, id("n"), num(1.0))),
                Stmt::new(StmtKind::Break(Some("outer".to_string())), 1),
            ],
            or_else: None,
        },
        1,
    );
    let program = vec![
        Stmt::var("n", num(0.0)),
        Stmt::new(
            StmtKind::While {
                label: Some("outer".to_string()),
                cond: Expr::new(ExprKind::Boolean(true), 1),
                body: vec![inner],
                or_else: None,
            },
            1,
        ),
        Stmt::expr(id("n")),
    ];
    assert_eq!(eval(program), Value::Number(1.0));
}

#[test]
fn test_while_else_runs_when_the_first_test_fails() {
    // var r = "loop"; while false { r = "body" } else { r = "else" }; r
    let program = vec![
        Stmt::var("r", string("loop")),
        Stmt::new(
            StmtKind::While {
                label: None,
                cond: Expr::new(ExprKind::Boolean(false), 1),
                body: vec![assign("r", string("body"))],
                or_else: Some(vec![assign("r", string("else"))]),
            },
            1,
        ),
        Stmt::expr(id("r")),
    ];
    assert_eq!(eval(program), Value::String("else".into()));
}

#[test]
fn test_while_else_is_skipped_once_the_loop_ran() {
    // var n = 0; while n < 3 { n = n + 1 } else { n = 100 }; n
    let program = vec![
        Stmt::var("n", num(0.0)),
        Stmt::new(
            StmtKind::While {
                label: None,
                cond: infix(Op::Less, id("n"), num(3.0)),
                body: vec![assign("n", infix(Op::Add, id("n"), num(1.0)))],
                or_else: Some(vec![assign("n", num(100.0))]),
            },
            1,
        ),
        Stmt::expr(id("n")),
    ];
    assert_eq!(eval(program), Value::Number(3.0));
}

#[test]
fn test_and_or_short_circuit() {
    // [false and missing(), nil or "fallback", 1 and 2]
    let and_expr = Expr::new(
        ExprKind::And(
            Box::new(Expr::new(ExprKind::Boolean(false), 1)),
            Box::new(call("missing", vec![])),
        ),
        1,
    );
    let or_expr = Expr::new(
        ExprKind::Or(
            Box::new(Expr::new(ExprKind::Nil, 1)),
            Box::new(string("fallback")),
        ),
        1,
    );
    let both = Expr::new(
        ExprKind::And(Box::new(num(1.0)), Box::new(num(2.0))),
        1,
    );
    let program = vec![Stmt::expr(list(vec![and_expr, or_expr, both]))];
    assert_eq!(
        eval(program),
        value_list(vec![
            Value::Boolean(false),
            Value::String("fallback".into()),
            Value::Number(2.0),
        ])
    );
}

#[test]
fn test_if_else_in_result_position() {
    let program = vec![Stmt::new(
        StmtKind::If {
            cond: Expr::new(ExprKind::Boolean(false), 1),
            then: vec![Stmt::expr(num(1.0))],
            or_else: Some(vec![Stmt::expr(num(2.0))]),
        },
        1,
    )];
    assert_eq!(eval(program), Value::Number(2.0));
}

#[test]
fn test_list_index_assignment() {
    // var xs = [1, 2, 3]; xs[1] = 20; xs
    let program = vec![
        Stmt::var("xs", list(vec![num(1.0), num(2.0), num(3.0)])),
        Stmt::expr(Expr::new(
            ExprKind::IndexAssign {
                target: Box::new(id("xs")),
                index: Box::new(num(1.0)),
                value: Box::new(num(20.0)),
            },
            1,
        )),
        Stmt::expr(id("xs")),
    ];
    assert_eq!(
        eval(program),
        value_list(vec![
            Value::Number(1.0),
            Value::Number(20.0),
            Value::Number(3.0),
        ])
    );
}

#[test]
fn test_host_can_call_into_the_module() {
    // fun double(x) { x * 2 }
    let program = vec![function(
        "double",
        vec![Param::new("x")],
        vec![Stmt::expr(infix(Op::Multiply, id("x"), num(2.0)))],
    )];
    let prototype = sorrel::compiler::compile("embed", &program).unwrap();
    let module = sorrel::Module::new("embed");

    let mut vm = VM::new();
    vm.interpret(prototype, Rc::clone(&module)).unwrap();

    let double = match module.borrow().get_var("double") {
        Some(Value::Closure(closure)) => closure,
        other => panic!("expected a closure, got {:?}", other),
    };
    assert_eq!(
        vm.call_function(&double, vec![Value::Number(21.0)]),
        Ok(Value::Number(42.0))
    );
}

#[test]
fn test_break_outside_a_loop_is_a_compile_error() {
    let program = vec![Stmt::new(StmtKind::Break(None), 1)];
    match run(program) {
        Err(SorrelError::CompileError(diagnostics)) => {
            assert_eq!(
                diagnostics[0].message,
                "There is no enclosing control flow block to break out of."
            );
        }
        other => panic!("expected a compile error, got {:?}", other),
    }
}
