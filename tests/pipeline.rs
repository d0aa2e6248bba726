//! End-to-end tests: build a module with the AST builder, compile it, run it
//! on the machine, and assert on results, printed output, and diagnostics.

use basalt::ast::{AstBuilder, BinaryOp, IncDecOp, Item, Module, Stmt, UnaryOp};
use basalt::bytecode::{CallTarget, Instruction, JUMP_SENTINEL};
use basalt::vm::{Value, VirtualMachine};
use basalt::{CompileError, RuntimeError};

/// Compile, run `entry` with no arguments, and capture printed output.
fn run(module: &Module, entry: &str) -> (Value, String) {
    let program = basalt::compile(module).unwrap();
    let mut vm = VirtualMachine::with_output(&program, Vec::new());
    let result = vm.call(entry, vec![]).unwrap();
    let out = String::from_utf8(vm.into_output()).unwrap();
    (result, out)
}

// =============================================================================
// Straight-line code, control flow, recursion
// =============================================================================

fn abs_module() -> Module {
    // func abs(x: int): int { if (x >= 0) { return x; } return -x; }
    let mut b = AstBuilder::new();
    let int_ty = b.ty("int");
    let x = b.param("x", int_ty);
    let ret_ty = b.ty("int");

    let x1 = b.name("x");
    let zero = b.int(0);
    let cond = b.binary(BinaryOp::Ge, x1, zero);
    let x2 = b.name("x");
    let ret_x = b.ret(Some(x2));
    let then = b.block(vec![ret_x]);
    let if_stmt = b.if_stmt(cond, then, None);
    let x3 = b.name("x");
    let neg = b.unary(UnaryOp::Neg, x3);
    let ret_neg = b.ret(Some(neg));
    let body = b.block(vec![if_stmt, ret_neg]);
    let abs = b.function("abs", vec![x], Some(ret_ty), body);
    Module {
        items: vec![Item::Function(abs)],
    }
}

#[test]
fn abs_of_both_signs() {
    let module = abs_module();
    let program = basalt::compile(&module).unwrap();
    let mut vm = VirtualMachine::with_output(&program, Vec::new());
    let neg = vm.call("abs", vec![Value::Int(-13)]).unwrap();
    let zero = vm.call("abs", vec![Value::Int(0)]).unwrap();
    assert!(neg.eq_value(&Value::Int(13)));
    assert!(zero.eq_value(&Value::Int(0)));
}

#[test]
fn factorial_recursion() {
    let mut b = AstBuilder::new();
    let int_ty = b.ty("int");
    let n = b.param("n", int_ty);
    let ret_ty = b.ty("int");

    let n1 = b.name("n");
    let one = b.int(1);
    let cond = b.binary(BinaryOp::Le, n1, one);
    let one2 = b.int(1);
    let ret_one = b.ret(Some(one2));
    let then = b.block(vec![ret_one]);
    let if_stmt = b.if_stmt(cond, then, None);
    let n2 = b.name("n");
    let n3 = b.name("n");
    let one3 = b.int(1);
    let n_minus = b.binary(BinaryOp::Sub, n3, one3);
    let rec = b.call_named("fact", vec![n_minus]);
    let prod = b.binary(BinaryOp::Mul, n2, rec);
    let ret = b.ret(Some(prod));
    let body = b.block(vec![if_stmt, ret]);
    let fact = b.function("fact", vec![n], Some(ret_ty), body);
    let module = Module {
        items: vec![Item::Function(fact)],
    };

    let program = basalt::compile(&module).unwrap();
    let mut vm = VirtualMachine::with_output(&program, Vec::new());
    let result = vm.call("fact", vec![Value::Int(10)]).unwrap();
    assert!(result.eq_value(&Value::Int(3_628_800)));
}

#[test]
fn mutual_recursion_across_declaration_order() {
    let mut b = AstBuilder::new();

    // isEven(n) calls isOdd, declared later.
    let int_ty = b.ty("int");
    let n = b.param("n", int_ty);
    let bool_ty = b.ty("boolean");
    let n1 = b.name("n");
    let zero = b.int(0);
    let cond = b.binary(BinaryOp::Eq, n1, zero);
    let t = b.boolean(true);
    let ret_t = b.ret(Some(t));
    let then = b.block(vec![ret_t]);
    let if_stmt = b.if_stmt(cond, then, None);
    let n2 = b.name("n");
    let one = b.int(1);
    let minus = b.binary(BinaryOp::Sub, n2, one);
    let call = b.call_named("isOdd", vec![minus]);
    let ret = b.ret(Some(call));
    let body = b.block(vec![if_stmt, ret]);
    let is_even = b.function("isEven", vec![n], Some(bool_ty), body);

    let int_ty2 = b.ty("int");
    let m = b.param("n", int_ty2);
    let bool_ty2 = b.ty("boolean");
    let m1 = b.name("n");
    let zero2 = b.int(0);
    let cond2 = b.binary(BinaryOp::Eq, m1, zero2);
    let f = b.boolean(false);
    let ret_f = b.ret(Some(f));
    let then2 = b.block(vec![ret_f]);
    let if2 = b.if_stmt(cond2, then2, None);
    let m2 = b.name("n");
    let one2 = b.int(1);
    let minus2 = b.binary(BinaryOp::Sub, m2, one2);
    let call2 = b.call_named("isEven", vec![minus2]);
    let ret2 = b.ret(Some(call2));
    let body2 = b.block(vec![if2, ret2]);
    let is_odd = b.function("isOdd", vec![m], Some(bool_ty2), body2);

    let module = Module {
        items: vec![Item::Function(is_even), Item::Function(is_odd)],
    };
    let program = basalt::compile(&module).unwrap();
    let mut vm = VirtualMachine::with_output(&program, Vec::new());
    let even = vm.call("isEven", vec![Value::Int(10)]).unwrap();
    let odd = vm.call("isEven", vec![Value::Int(7)]).unwrap();
    assert!(even.eq_value(&Value::Bool(true)));
    assert!(odd.eq_value(&Value::Bool(false)));
}

#[test]
fn assignment_is_an_expression() {
    // var y = 0; var x = (y = 3); return x + y;  ->  6
    let mut b = AstBuilder::new();
    let zero = b.int(0);
    let y_decl = b.var_stmt("y", None, Some(zero));
    let y1 = b.name("y");
    let three = b.int(3);
    let asg = b.assign(y1, three);
    let x_decl = b.var_stmt("x", None, Some(asg));
    let x1 = b.name("x");
    let y2 = b.name("y");
    let sum = b.binary(BinaryOp::Add, x1, y2);
    let ret = b.ret(Some(sum));
    let ret_ty = b.ty("int");
    let body = b.block(vec![y_decl, x_decl, ret]);
    let f = b.function("f", vec![], Some(ret_ty), body);
    let module = Module {
        items: vec![Item::Function(f)],
    };

    let (result, _) = run(&module, "f");
    assert!(result.eq_value(&Value::Int(6)));
}

#[test]
fn postfix_increment_yields_the_old_value() {
    // var x = 5; var y = x++; return x * 10 + y;  ->  65
    let mut b = AstBuilder::new();
    let five = b.int(5);
    let x_decl = b.var_stmt("x", None, Some(five));
    let x1 = b.name("x");
    let inc = b.inc_dec(IncDecOp::Inc, false, x1);
    let y_decl = b.var_stmt("y", None, Some(inc));
    let x2 = b.name("x");
    let ten = b.int(10);
    let scaled = b.binary(BinaryOp::Mul, x2, ten);
    let y1 = b.name("y");
    let sum = b.binary(BinaryOp::Add, scaled, y1);
    let ret = b.ret(Some(sum));
    let ret_ty = b.ty("int");
    let body = b.block(vec![x_decl, y_decl, ret]);
    let f = b.function("f", vec![], Some(ret_ty), body);
    let module = Module {
        items: vec![Item::Function(f)],
    };

    let (result, _) = run(&module, "f");
    assert!(result.eq_value(&Value::Int(65)));
}

#[test]
fn int_argument_widens_for_a_concrete_double_parameter() {
    // half(x: double) = x / 2.0, called as half(5).
    let mut b = AstBuilder::new();
    let d_ty = b.ty("double");
    let x = b.param("x", d_ty);
    let ret_ty = b.ty("double");
    let x1 = b.name("x");
    let two = b.double(2.0);
    let quot = b.binary(BinaryOp::Div, x1, two);
    let ret = b.ret(Some(quot));
    let body = b.block(vec![ret]);
    let half = b.function("half", vec![x], Some(ret_ty), body);

    let five = b.int(5);
    let call = b.call_named("half", vec![five]);
    let ret_main = b.ret(Some(call));
    let ret_ty2 = b.ty("double");
    let main_body = b.block(vec![ret_main]);
    let main = b.function("main", vec![], Some(ret_ty2), main_body);
    let module = Module {
        items: vec![Item::Function(half), Item::Function(main)],
    };

    let (result, _) = run(&module, "main");
    assert!(result.eq_value(&Value::Double(2.5)));
}

#[test]
fn assignment_to_a_parameter_writes_its_slot() {
    // func bump(n: int): int { n = n + 1; return n; }
    let mut b = AstBuilder::new();
    let int_ty = b.ty("int");
    let n = b.param("n", int_ty);
    let ret_ty = b.ty("int");
    let n1 = b.name("n");
    let n2 = b.name("n");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, n2, one);
    let set = b.assign(n1, sum);
    let set_stmt = b.expr_stmt(set);
    let n3 = b.name("n");
    let ret = b.ret(Some(n3));
    let body = b.block(vec![set_stmt, ret]);
    let bump = b.function("bump", vec![n], Some(ret_ty), body);
    let module = Module {
        items: vec![Item::Function(bump)],
    };

    let program = basalt::compile(&module).unwrap();
    assert!(program
        .instructions
        .iter()
        .any(|i| matches!(i, Instruction::StoreArg(0))));
    let mut vm = VirtualMachine::with_output(&program, Vec::new());
    let result = vm.call("bump", vec![Value::Int(41)]).unwrap();
    assert!(result.eq_value(&Value::Int(42)));
}

// =============================================================================
// Sierpinski triangle: loops, string concatenation, print intrinsics
// =============================================================================

fn sierpinski_module() -> Module {
    let mut b = AstBuilder::new();

    // choose(n, k): binomial coefficient, exact at every step.
    let int_ty = b.ty("int");
    let n = b.param("n", int_ty);
    let int_ty2 = b.ty("int");
    let k = b.param("k", int_ty2);
    let ret_ty = b.ty("int");
    let one = b.int(1);
    let result_decl = b.var_stmt("result", None, Some(one));
    let zero = b.int(0);
    let i_decl = b.var_stmt("i", None, Some(zero));
    let i1 = b.name("i");
    let k1 = b.name("k");
    let cond = b.binary(BinaryOp::Lt, i1, k1);
    let r1 = b.name("result");
    let n1 = b.name("n");
    let i2 = b.name("i");
    let diff = b.binary(BinaryOp::Sub, n1, i2);
    let prod = b.binary(BinaryOp::Mul, r1, diff);
    let i3 = b.name("i");
    let one2 = b.int(1);
    let den = b.binary(BinaryOp::Add, i3, one2);
    let quot = b.binary(BinaryOp::Div, prod, den);
    let r2 = b.name("result");
    let set_result = b.assign(r2, quot);
    let s1 = b.expr_stmt(set_result);
    let i4 = b.name("i");
    let step = b.inc_dec(IncDecOp::Inc, false, i4);
    let s2 = b.expr_stmt(step);
    let loop_body = b.block(vec![s1, s2]);
    let loop_stmt = b.while_stmt(cond, loop_body);
    let r3 = b.name("result");
    let ret = b.ret(Some(r3));
    let body = b.block(vec![result_decl, i_decl, loop_stmt, ret]);
    let choose = b.function("choose", vec![n, k], Some(ret_ty), body);

    // main: 16 rows, star where choose(row, col) is odd.
    let zero2 = b.int(0);
    let row_decl = b.var_stmt("row", None, Some(zero2));
    let row1 = b.name("row");
    let sixteen = b.int(16);
    let outer_cond = b.binary(BinaryOp::Lt, row1, sixteen);

    let empty = b.string("");
    let line_decl = b.var_stmt("line", None, Some(empty));
    let zero3 = b.int(0);
    let col_decl = b.var_stmt("col", None, Some(zero3));
    let col1 = b.name("col");
    let row2 = b.name("row");
    let inner_cond = b.binary(BinaryOp::Le, col1, row2);

    let row3 = b.name("row");
    let col2 = b.name("col");
    let c = b.call_named("choose", vec![row3, col2]);
    let two = b.int(2);
    let rem = b.binary(BinaryOp::Mod, c, two);
    let one3 = b.int(1);
    let is_odd = b.binary(BinaryOp::Eq, rem, one3);
    let line1 = b.name("line");
    let star = b.string("*");
    let with_star = b.compound_assign(BinaryOp::Add, line1, star);
    let star_stmt = b.expr_stmt(with_star);
    let then = b.block(vec![star_stmt]);
    let line2 = b.name("line");
    let blank = b.string(" ");
    let with_blank = b.compound_assign(BinaryOp::Add, line2, blank);
    let blank_stmt = b.expr_stmt(with_blank);
    let else_b = b.block(vec![blank_stmt]);
    let cell = b.if_stmt(is_odd, then, Some(else_b));
    let col3 = b.name("col");
    let col_step = b.inc_dec(IncDecOp::Inc, false, col3);
    let col_step_stmt = b.expr_stmt(col_step);
    let inner_body = b.block(vec![cell, col_step_stmt]);
    let inner_loop = b.while_stmt(inner_cond, inner_body);

    let line3 = b.name("line");
    let print = b.call_named("printLine", vec![line3]);
    let print_stmt = b.expr_stmt(print);
    let row4 = b.name("row");
    let row_step = b.inc_dec(IncDecOp::Inc, false, row4);
    let row_step_stmt = b.expr_stmt(row_step);
    let outer_body = b.block(vec![
        line_decl,
        col_decl,
        inner_loop,
        print_stmt,
        row_step_stmt,
    ]);
    let outer_loop = b.while_stmt(outer_cond, outer_body);
    let main_body = b.block(vec![row_decl, outer_loop]);
    let main = b.function("main", vec![], None, main_body);

    Module {
        items: vec![Item::Function(choose), Item::Function(main)],
    }
}

#[test]
fn sierpinski_prints_sixteen_rows() {
    let module = sierpinski_module();
    let (_, out) = run(&module, "main");
    let expected = "\
*
**
* *
****
*   *
**  **
* * * *
********
*       *
**      **
* *     * *
****    ****
*   *   *   *
**  **  **  **
* * * * * * * *
****************
";
    assert_eq!(out, expected);
}

#[test]
fn compilation_is_deterministic() {
    let first = basalt::compile(&sierpinski_module()).unwrap();
    let second = basalt::compile(&sierpinski_module()).unwrap();
    assert_eq!(first.instructions, second.instructions);
    assert_eq!(first.disassemble(), second.disassemble());
}

#[test]
fn no_sentinel_or_symbolic_operands_survive_codegen() {
    let program = basalt::compile(&sierpinski_module()).unwrap();
    for (addr, i) in program.instructions.iter().enumerate() {
        match i {
            Instruction::Jump(a) | Instruction::JumpIfFalse(a) => {
                assert_ne!(*a, JUMP_SENTINEL, "unpatched jump at {addr}");
                assert!((*a as usize) < program.instructions.len());
            }
            Instruction::Call { target, .. } => {
                assert!(
                    matches!(target, CallTarget::Address(_)),
                    "symbolic call target at {addr}"
                );
            }
            _ => {}
        }
    }
}

// =============================================================================
// Classes, interfaces, vtable dispatch
// =============================================================================

fn shapes_module() -> Module {
    let mut b = AstBuilder::new();

    // interface Shape { area(): double }
    let area_ret = b.ty("double");
    let area_sig = b.method_sig("area", vec![], Some(area_ret));
    let shape = b.interface("Shape", vec![area_sig]);

    // class Rect implements Shape { w, h: double; ctor; area() }
    let impl_ref = b.ty("Shape");
    let w_ty = b.ty("double");
    let w_field = b.field("w", w_ty);
    let h_ty = b.ty("double");
    let h_field = b.field("h", h_ty);

    let pw_ty = b.ty("double");
    let pw = b.param("w", pw_ty);
    let ph_ty = b.ty("double");
    let ph = b.param("h", ph_ty);
    let this1 = b.this();
    let fw = b.field_access(this1, "w");
    let w1 = b.name("w");
    let set_w = b.assign(fw, w1);
    let sw = b.expr_stmt(set_w);
    let this2 = b.this();
    let fh = b.field_access(this2, "h");
    let h1 = b.name("h");
    let set_h = b.assign(fh, h1);
    let sh = b.expr_stmt(set_h);
    let ctor_body = b.block(vec![sw, sh]);
    let ctor = b.function("Rect", vec![pw, ph], None, ctor_body);

    let m_ret = b.ty("double");
    let this3 = b.this();
    let gw = b.field_access(this3, "w");
    let this4 = b.this();
    let gh = b.field_access(this4, "h");
    let prod = b.binary(BinaryOp::Mul, gw, gh);
    let ret = b.ret(Some(prod));
    let area_body = b.block(vec![ret]);
    let area = b.function("area", vec![], Some(m_ret), area_body);

    let rect = b.class("Rect", vec![impl_ref], vec![w_field, h_field], vec![ctor], vec![area]);

    // measure(s: Shape): double { return s.area(); }
    let s_ty = b.ty("Shape");
    let s = b.param("s", s_ty);
    let meas_ret = b.ty("double");
    let s1 = b.name("s");
    let call = b.call_method(s1, "area", vec![]);
    let ret2 = b.ret(Some(call));
    let meas_body = b.block(vec![ret2]);
    let measure = b.function("measure", vec![s], Some(meas_ret), meas_body);

    // main(): double { var r = Rect(3.0, 4.0); printLine(measure(r)); return measure(r); }
    let three = b.double(3.0);
    let four = b.double(4.0);
    let new_rect = b.call_named("Rect", vec![three, four]);
    let r_decl = b.var_stmt("r", None, Some(new_rect));
    let r1 = b.name("r");
    let m1 = b.call_named("measure", vec![r1]);
    let print = b.call_named("printLine", vec![m1]);
    let print_stmt = b.expr_stmt(print);
    let r2 = b.name("r");
    let m2 = b.call_named("measure", vec![r2]);
    let ret3 = b.ret(Some(m2));
    let main_ret = b.ty("double");
    let main_body = b.block(vec![r_decl, print_stmt, ret3]);
    let main = b.function("main", vec![], Some(main_ret), main_body);

    Module {
        items: vec![
            Item::Interface(shape),
            Item::Class(rect),
            Item::Function(measure),
            Item::Function(main),
        ],
    }
}

#[test]
fn interface_dispatch_through_the_vtable() {
    let module = shapes_module();
    let (result, out) = run(&module, "main");
    assert!(result.eq_value(&Value::Double(12.0)));
    assert_eq!(out, "12.0\n");
}

#[test]
fn shapes_listing_names_methods_and_virtual_calls() {
    let program = basalt::compile(&shapes_module()).unwrap();
    let listing = program.disassemble();
    assert!(listing.contains("Rect::area(): double"), "{listing}");
    assert!(listing.contains("Rect::Rect(double, double): Rect"), "{listing}");
    assert!(listing.contains("CALL_VIRT"), "{listing}");
    assert!(listing.contains("NEW_OBJ 0"), "{listing}");
}

#[test]
fn default_constructor_and_field_updates() {
    // class Counter { n: int; bump(): int { return ++this.n; } }
    let mut b = AstBuilder::new();
    let n_ty = b.ty("int");
    let n_field = b.field("n", n_ty);
    let bump_ret = b.ty("int");
    let this1 = b.this();
    let fld = b.field_access(this1, "n");
    let inc = b.inc_dec(IncDecOp::Inc, true, fld);
    let ret = b.ret(Some(inc));
    let bump_body = b.block(vec![ret]);
    let bump = b.function("bump", vec![], Some(bump_ret), bump_body);
    let counter = b.class("Counter", vec![], vec![n_field], vec![], vec![bump]);

    // main: var c = Counter(); c.bump(); return c.bump();
    let new_counter = b.call_named("Counter", vec![]);
    let c_decl = b.var_stmt("c", None, Some(new_counter));
    let c1 = b.name("c");
    let first = b.call_method(c1, "bump", vec![]);
    let first_stmt = b.expr_stmt(first);
    let c2 = b.name("c");
    let second = b.call_method(c2, "bump", vec![]);
    let ret2 = b.ret(Some(second));
    let main_ret = b.ty("int");
    let main_body = b.block(vec![c_decl, first_stmt, ret2]);
    let main = b.function("main", vec![], Some(main_ret), main_body);
    let module = Module {
        items: vec![Item::Class(counter), Item::Function(main)],
    };

    let (result, _) = run(&module, "main");
    assert!(result.eq_value(&Value::Int(2)));
}

#[test]
fn object_assignment_shares_the_instance() {
    // var a = Counter(); var b = a; a.n = 7; return b.n;
    let mut b = AstBuilder::new();
    let n_ty = b.ty("int");
    let n_field = b.field("n", n_ty);
    let counter = b.class("Counter", vec![], vec![n_field], vec![], vec![]);

    let new_counter = b.call_named("Counter", vec![]);
    let a_decl = b.var_stmt("a", None, Some(new_counter));
    let a1 = b.name("a");
    let b_decl = b.var_stmt("b", None, Some(a1));
    let a2 = b.name("a");
    let an = b.field_access(a2, "n");
    let seven = b.int(7);
    let set = b.assign(an, seven);
    let set_stmt = b.expr_stmt(set);
    let b1 = b.name("b");
    let bn = b.field_access(b1, "n");
    let ret = b.ret(Some(bn));
    let main_ret = b.ty("int");
    let main_body = b.block(vec![a_decl, b_decl, set_stmt, ret]);
    let main = b.function("main", vec![], Some(main_ret), main_body);
    let module = Module {
        items: vec![Item::Class(counter), Item::Function(main)],
    };

    let (result, _) = run(&module, "main");
    assert!(result.eq_value(&Value::Int(7)));
}

#[test]
fn constructor_return_runs_its_expression() {
    // class C { C() { return printLine("built"); } }  function main() { C(); }
    let mut b = AstBuilder::new();
    let msg = b.string("built");
    let call = b.call_named("printLine", vec![msg]);
    let ret = b.ret(Some(call));
    let ctor_body = b.block(vec![ret]);
    let ctor = b.function("C", vec![], None, ctor_body);
    let class = b.class("C", vec![], vec![], vec![ctor], vec![]);

    let new_c = b.call_named("C", vec![]);
    let stmt = b.expr_stmt(new_c);
    let main_body = b.block(vec![stmt]);
    let main = b.function("main", vec![], None, main_body);
    let module = Module {
        items: vec![Item::Class(class), Item::Function(main)],
    };

    let (result, out) = run(&module, "main");
    assert!(result.eq_value(&Value::Void));
    assert_eq!(out, "built\n");
}

// =============================================================================
// Globals
// =============================================================================

#[test]
fn globals_initialize_once_and_persist_across_calls() {
    // var counter = 10;  function bump(): int { counter = counter + 1; return counter; }
    let mut b = AstBuilder::new();
    let ten = b.int(10);
    let g = b.var("counter", None, Some(ten));
    let c1 = b.name("counter");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, c1, one);
    let c2 = b.name("counter");
    let set = b.assign(c2, sum);
    let set_stmt = b.expr_stmt(set);
    let c3 = b.name("counter");
    let ret = b.ret(Some(c3));
    let ret_ty = b.ty("int");
    let body = b.block(vec![set_stmt, ret]);
    let bump = b.function("bump", vec![], Some(ret_ty), body);
    let module = Module {
        items: vec![Item::Global(g), Item::Function(bump)],
    };

    let program = basalt::compile(&module).unwrap();
    let mut vm = VirtualMachine::with_output(&program, Vec::new());
    let first = vm.call("bump", vec![]).unwrap();
    let second = vm.call("bump", vec![]).unwrap();
    assert!(first.eq_value(&Value::Int(11)));
    assert!(second.eq_value(&Value::Int(12)));
}

#[test]
fn global_initializer_faults_on_every_call() {
    // var g: int = 1 / 0;  function main(): int { return g; }
    let mut b = AstBuilder::new();
    let g_ty = b.ty("int");
    let one = b.int(1);
    let zero = b.int(0);
    let div = b.binary(BinaryOp::Div, one, zero);
    let g = b.var("g", Some(g_ty), Some(div));
    let g_ref = b.name("g");
    let ret = b.ret(Some(g_ref));
    let ret_ty = b.ty("int");
    let body = b.block(vec![ret]);
    let main = b.function("main", vec![], Some(ret_ty), body);
    let module = Module {
        items: vec![Item::Global(g), Item::Function(main)],
    };

    let program = basalt::compile(&module).unwrap();
    let mut vm = VirtualMachine::with_output(&program, Vec::new());
    let first = vm.call("main", vec![]).unwrap_err();
    let second = vm.call("main", vec![]).unwrap_err();
    assert!(matches!(first, RuntimeError::InvalidOperation { .. }), "{first}");
    assert_eq!(first, second);
}

// =============================================================================
// Compile-time diagnostics
// =============================================================================

#[test]
fn undeclared_symbol_aborts_compilation() {
    let mut b = AstBuilder::new();
    let missing = b.name("missing");
    let one = b.int(1);
    let sum = b.binary(BinaryOp::Add, missing, one);
    let stmt = b.expr_stmt(sum);
    let body = b.block(vec![stmt]);
    let f = b.function("main", vec![], None, body);
    let module = Module {
        items: vec![Item::Function(f)],
    };

    let err = basalt::compile(&module).unwrap_err();
    assert_eq!(
        err,
        CompileError::UndeclaredSymbol {
            name: "missing".to_string()
        }
    );
}

#[test]
fn string_initializer_for_int_is_a_type_mismatch() {
    let mut b = AstBuilder::new();
    let int_ty = b.ty("int");
    let s = b.string("a");
    let decl = b.var_stmt("x", Some(int_ty), Some(s));
    let body = b.block(vec![decl]);
    let f = b.function("main", vec![], None, body);
    let module = Module {
        items: vec![Item::Function(f)],
    };

    let err = basalt::compile(&module).unwrap_err();
    assert!(matches!(err, CompileError::TypeMismatch { .. }), "{err}");
}

#[test]
fn print_rejects_boolean_arguments() {
    let mut b = AstBuilder::new();
    let arg = b.boolean(true);
    let call = b.call_named("print", vec![arg]);
    let stmt = b.expr_stmt(call);
    let body = b.block(vec![stmt]);
    let f = b.function("main", vec![], None, body);
    let module = Module {
        items: vec![Item::Function(f)],
    };

    let err = basalt::compile(&module).unwrap_err();
    assert!(matches!(err, CompileError::NoMatchingOverload { .. }), "{err}");
}

#[test]
fn overloads_dispatch_on_exact_argument_types() {
    // tag(x: int) = 1, tag(x: string) = 2.
    let mut b = AstBuilder::new();
    let int_ty = b.ty("int");
    let p1 = b.param("x", int_ty);
    let r1 = b.ty("int");
    let one = b.int(1);
    let ret1 = b.ret(Some(one));
    let body1 = b.block(vec![ret1]);
    let tag_int = b.function("tag", vec![p1], Some(r1), body1);

    let str_ty = b.ty("string");
    let p2 = b.param("x", str_ty);
    let r2 = b.ty("int");
    let two = b.int(2);
    let ret2 = b.ret(Some(two));
    let body2 = b.block(vec![ret2]);
    let tag_str = b.function("tag", vec![p2], Some(r2), body2);

    let s = b.string("hi");
    let call = b.call_named("tag", vec![s]);
    let ret3 = b.ret(Some(call));
    let r3 = b.ty("int");
    let main_body = b.block(vec![ret3]);
    let main = b.function("main", vec![], Some(r3), main_body);
    let module = Module {
        items: vec![
            Item::Function(tag_int),
            Item::Function(tag_str),
            Item::Function(main),
        ],
    };

    let (result, _) = run(&module, "main");
    assert!(result.eq_value(&Value::Int(2)));
}

// =============================================================================
// Print intrinsics
// =============================================================================

#[test]
fn print_and_print_line_formatting() {
    // print("n="); printLine(42); printLine(2.5);
    let mut b = AstBuilder::new();
    let label = b.string("n=");
    let p1 = b.call_named("print", vec![label]);
    let s1 = b.expr_stmt(p1);
    let n = b.int(42);
    let p2 = b.call_named("printLine", vec![n]);
    let s2 = b.expr_stmt(p2);
    let d = b.double(2.5);
    let p3 = b.call_named("printLine", vec![d]);
    let s3 = b.expr_stmt(p3);
    let body = b.block(vec![s1, s2, s3]);
    let main = b.function("main", vec![], None, body);
    let module = Module {
        items: vec![Item::Function(main)],
    };

    let (_, out) = run(&module, "main");
    assert_eq!(out, "n=42\n2.5\n");
}

#[test]
fn shadowed_locals_keep_their_own_slots() {
    // var x = 1; { var x = 2; } return x;
    let mut b = AstBuilder::new();
    let one = b.int(1);
    let outer = b.var_stmt("x", None, Some(one));
    let two = b.int(2);
    let inner_decl = b.var_stmt("x", None, Some(two));
    let inner = b.block(vec![inner_decl]);
    let x1 = b.name("x");
    let ret = b.ret(Some(x1));
    let ret_ty = b.ty("int");
    let body = b.block(vec![outer, Stmt::Block(inner), ret]);
    let f = b.function("f", vec![], Some(ret_ty), body);
    let module = Module {
        items: vec![Item::Function(f)],
    };

    let (result, _) = run(&module, "f");
    assert!(result.eq_value(&Value::Int(1)));
}
