//! The virtual machine.
//!
//! A frame-per-call interpreter over the flat instruction array. Each frame
//! owns its argument slots, local slots, and operand stack; `CALL` pops the
//! arguments into a fresh frame and `RETURN` hands the popped value back to
//! the caller's stack. The outermost frame carries a sentinel return address,
//! so returning from it ends execution and yields the result.
//!
//! The machine is dynamically tagged: numeric opcodes inspect the operand
//! tags, which is how an int widened into a double position needs no
//! conversion instruction. Any tag the opcode cannot handle is a fault, and
//! faults halt execution.

use std::io::{self, Write};
use std::rc::Rc;

use crate::bytecode::{BytecodeProgram, CallTarget, Instruction, JUMP_SENTINEL};
use crate::error::RuntimeError;

use super::object::{allocate, ObjRef};
use super::value::Value;

/// Return-address sentinel of the outermost frame.
pub const OUTERMOST: u32 = u32::MAX;

struct Frame {
    args: Vec<Value>,
    locals: Vec<Value>,
    stack: Vec<Value>,
    return_to: u32,
}

pub struct VirtualMachine<'p, W: Write = io::Stdout> {
    program: &'p BytecodeProgram,
    globals: Vec<Value>,
    globals_ready: bool,
    out: W,
}

impl<'p> VirtualMachine<'p, io::Stdout> {
    pub fn new(program: &'p BytecodeProgram) -> Self {
        Self::with_output(program, io::stdout())
    }
}

impl<'p, W: Write> VirtualMachine<'p, W> {
    /// A machine whose print intrinsics write to `out`.
    pub fn with_output(program: &'p BytecodeProgram, out: W) -> Self {
        Self {
            program,
            globals: Vec::new(),
            globals_ready: false,
            out,
        }
    }

    /// Consume the machine and recover the output sink.
    pub fn into_output(self) -> W {
        self.out
    }

    /// Call a function by name. Global initializers run once, before the
    /// first call into the program.
    pub fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let address = self
            .program
            .function_named(name)
            .ok_or_else(|| RuntimeError::UnknownFunction {
                name: name.to_string(),
            })?
            .address;
        self.ensure_globals()?;
        self.execute(address, args)
    }

    fn ensure_globals(&mut self) -> Result<(), RuntimeError> {
        if self.globals_ready {
            return Ok(());
        }
        // Ready latches only on success; a faulted initializer runs again
        // from defaults on the next call instead of leaving stale globals.
        self.globals = vec![Value::Void; self.program.global_count as usize];
        if let Some(address) = self.program.global_init {
            self.execute(address, Vec::new())?;
        }
        self.globals_ready = true;
        Ok(())
    }

    fn execute(&mut self, address: u32, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let program = self.program;
        let mut frames = vec![Frame {
            args,
            locals: Vec::new(),
            stack: Vec::new(),
            return_to: OUTERMOST,
        }];
        let mut pc = address as usize;

        loop {
            let instruction = program.instructions.get(pc).ok_or_else(|| {
                RuntimeError::InvalidOperation {
                    opcode: "<none>".to_string(),
                    position: pc,
                    detail: "execution ran past the end of the program".to_string(),
                }
            })?;
            let at = pc;
            pc += 1;

            match instruction {
                Instruction::PushInt(v) => push(&mut frames, Value::Int(*v)),
                Instruction::PushDouble(v) => push(&mut frames, Value::Double(*v)),
                Instruction::PushString(v) => {
                    push(&mut frames, Value::Str(Rc::from(v.as_str())));
                }
                Instruction::PushBool(v) => push(&mut frames, Value::Bool(*v)),
                Instruction::PushVoid => push(&mut frames, Value::Void),

                Instruction::LoadLocal(slot) => {
                    let value = read_slot(&frames, |f| &f.locals, *slot)
                        .ok_or_else(|| fault(instruction, at, "local slot out of range"))?;
                    push(&mut frames, value);
                }
                Instruction::StoreLocal(slot) => {
                    let value = pop(&mut frames, instruction, at)?;
                    write_slot(&mut frames, |f| &mut f.locals, *slot, value)
                        .map_err(|()| fault(instruction, at, "local slot out of range"))?;
                }
                Instruction::LoadArg(slot) => {
                    let value = read_slot(&frames, |f| &f.args, *slot)
                        .ok_or_else(|| fault(instruction, at, "argument slot out of range"))?;
                    push(&mut frames, value);
                }
                Instruction::StoreArg(slot) => {
                    let value = pop(&mut frames, instruction, at)?;
                    write_slot(&mut frames, |f| &mut f.args, *slot, value)
                        .map_err(|()| fault(instruction, at, "argument slot out of range"))?;
                }
                Instruction::LoadGlobal(slot) => {
                    let value = self
                        .globals
                        .get(*slot as usize)
                        .cloned()
                        .ok_or_else(|| fault(instruction, at, "global slot out of range"))?;
                    push(&mut frames, value);
                }
                Instruction::StoreGlobal(slot) => {
                    let value = pop(&mut frames, instruction, at)?;
                    match self.globals.get_mut(*slot as usize) {
                        Some(g) => *g = value,
                        None => return Err(fault(instruction, at, "global slot out of range")),
                    }
                }
                Instruction::LoadField(index) => {
                    let obj = pop_object(&mut frames, instruction, at)?;
                    let value = obj
                        .borrow()
                        .fields
                        .get(*index as usize)
                        .cloned()
                        .ok_or_else(|| fault(instruction, at, "field index out of range"))?;
                    push(&mut frames, value);
                }
                Instruction::StoreField(index) => {
                    let obj = pop_object(&mut frames, instruction, at)?;
                    let value = pop(&mut frames, instruction, at)?;
                    match obj.borrow_mut().fields.get_mut(*index as usize) {
                        Some(field) => *field = value.clone(),
                        None => return Err(fault(instruction, at, "field index out of range")),
                    }
                    push(&mut frames, value);
                }

                Instruction::Dup => {
                    let value = pop(&mut frames, instruction, at)?;
                    push(&mut frames, value.clone());
                    push(&mut frames, value);
                }
                Instruction::Swap => {
                    let a = pop(&mut frames, instruction, at)?;
                    let b = pop(&mut frames, instruction, at)?;
                    push(&mut frames, a);
                    push(&mut frames, b);
                }
                Instruction::Pop => {
                    pop(&mut frames, instruction, at)?;
                }

                Instruction::Add
                | Instruction::Sub
                | Instruction::Mul
                | Instruction::Div
                | Instruction::Mod
                | Instruction::Lt
                | Instruction::Le
                | Instruction::Gt
                | Instruction::Ge => {
                    let rhs = pop(&mut frames, instruction, at)?;
                    let lhs = pop(&mut frames, instruction, at)?;
                    push(&mut frames, arith(instruction, at, lhs, rhs)?);
                }
                Instruction::Eq => {
                    let rhs = pop(&mut frames, instruction, at)?;
                    let lhs = pop(&mut frames, instruction, at)?;
                    push(&mut frames, Value::Bool(lhs.eq_value(&rhs)));
                }
                Instruction::Ne => {
                    let rhs = pop(&mut frames, instruction, at)?;
                    let lhs = pop(&mut frames, instruction, at)?;
                    push(&mut frames, Value::Bool(!lhs.eq_value(&rhs)));
                }
                Instruction::And | Instruction::Or => {
                    let rhs = pop_bool(&mut frames, instruction, at)?;
                    let lhs = pop_bool(&mut frames, instruction, at)?;
                    let result = if matches!(instruction, Instruction::And) {
                        lhs && rhs
                    } else {
                        lhs || rhs
                    };
                    push(&mut frames, Value::Bool(result));
                }
                Instruction::Neg => {
                    let value = pop(&mut frames, instruction, at)?;
                    let negated = match value {
                        Value::Int(v) => Value::Int(v.wrapping_neg()),
                        Value::Double(v) => Value::Double(-v),
                        other => {
                            return Err(fault(
                                instruction,
                                at,
                                &format!("cannot negate {}", other.type_name()),
                            ));
                        }
                    };
                    push(&mut frames, negated);
                }
                Instruction::Not => {
                    let value = pop_bool(&mut frames, instruction, at)?;
                    push(&mut frames, Value::Bool(!value));
                }

                Instruction::Jump(dest) => {
                    if *dest == JUMP_SENTINEL {
                        return Err(fault(instruction, at, "unpatched jump"));
                    }
                    pc = *dest as usize;
                }
                Instruction::JumpIfFalse(dest) => {
                    if *dest == JUMP_SENTINEL {
                        return Err(fault(instruction, at, "unpatched jump"));
                    }
                    if !pop_bool(&mut frames, instruction, at)? {
                        pc = *dest as usize;
                    }
                }

                Instruction::StackAlloc(count) => {
                    if let Some(frame) = frames.last_mut() {
                        frame.locals.resize(*count as usize, Value::Void);
                    }
                }

                Instruction::Call { target, argc } => {
                    let callee = match target {
                        CallTarget::Address(a) => *a,
                        CallTarget::Function(_) => {
                            return Err(fault(instruction, at, "unpatched call target"));
                        }
                    };
                    let args = pop_args(&mut frames, instruction, at, *argc)?;
                    frames.push(Frame {
                        args,
                        locals: Vec::new(),
                        stack: Vec::new(),
                        return_to: pc as u32,
                    });
                    pc = callee as usize;
                }
                Instruction::CallVirt {
                    interface,
                    slot,
                    argc,
                } => {
                    let args = pop_args(&mut frames, instruction, at, *argc)?;
                    let receiver = match args.first() {
                        Some(Value::Object(obj)) => Rc::clone(obj),
                        _ => {
                            return Err(fault(instruction, at, "receiver is not an object"));
                        }
                    };
                    let type_index = receiver.borrow().type_index;
                    let info = self
                        .program
                        .types
                        .get(type_index as usize)
                        .ok_or_else(|| fault(instruction, at, "unknown object type"))?;
                    let callee = info
                        .vtables
                        .get(interface)
                        .and_then(|table| table.get(*slot as usize))
                        .copied()
                        .ok_or_else(|| {
                            fault(
                                instruction,
                                at,
                                &format!("type '{}' has no method for this slot", info.name),
                            )
                        })?;
                    frames.push(Frame {
                        args,
                        locals: Vec::new(),
                        stack: Vec::new(),
                        return_to: pc as u32,
                    });
                    pc = callee as usize;
                }
                Instruction::CallIntrinsic(intrinsic) => {
                    let value = pop(&mut frames, instruction, at)?;
                    let result = if intrinsic.is_line() {
                        writeln!(self.out, "{value}")
                    } else {
                        write!(self.out, "{value}")
                    };
                    result.map_err(|e| fault(instruction, at, &e.to_string()))?;
                    push(&mut frames, Value::Void);
                }

                Instruction::NewObj(type_index) => {
                    let info = self
                        .program
                        .types
                        .get(*type_index as usize)
                        .ok_or_else(|| fault(instruction, at, "unknown object type"))?;
                    push(&mut frames, Value::Object(allocate(*type_index, info)));
                }

                Instruction::Return => {
                    let value = pop(&mut frames, instruction, at)?;
                    let frame = match frames.pop() {
                        Some(f) => f,
                        None => return Err(fault(instruction, at, "return without a frame")),
                    };
                    debug_assert!(
                        frame.stack.is_empty(),
                        "operand stack not empty at return"
                    );
                    if frame.return_to == OUTERMOST {
                        return Ok(value);
                    }
                    pc = frame.return_to as usize;
                    push(&mut frames, value);
                }
            }
        }
    }
}

fn fault(instruction: &Instruction, at: usize, detail: &str) -> RuntimeError {
    RuntimeError::InvalidOperation {
        opcode: instruction.opcode().to_string(),
        position: at,
        detail: detail.to_string(),
    }
}

fn push(frames: &mut [Frame], value: Value) {
    if let Some(frame) = frames.last_mut() {
        frame.stack.push(value);
    }
}

fn pop(frames: &mut [Frame], instruction: &Instruction, at: usize) -> Result<Value, RuntimeError> {
    frames
        .last_mut()
        .and_then(|f| f.stack.pop())
        .ok_or_else(|| fault(instruction, at, "operand stack underflow"))
}

fn pop_bool(
    frames: &mut [Frame],
    instruction: &Instruction,
    at: usize,
) -> Result<bool, RuntimeError> {
    match pop(frames, instruction, at)? {
        Value::Bool(v) => Ok(v),
        other => Err(fault(
            instruction,
            at,
            &format!("expected boolean, found {}", other.type_name()),
        )),
    }
}

fn pop_object(
    frames: &mut [Frame],
    instruction: &Instruction,
    at: usize,
) -> Result<ObjRef, RuntimeError> {
    match pop(frames, instruction, at)? {
        Value::Object(obj) => Ok(obj),
        other => Err(fault(
            instruction,
            at,
            &format!("receiver is not an object, found {}", other.type_name()),
        )),
    }
}

/// Pop `argc` values into call order: the first-pushed argument lands in
/// slot 0.
fn pop_args(
    frames: &mut [Frame],
    instruction: &Instruction,
    at: usize,
    argc: u8,
) -> Result<Vec<Value>, RuntimeError> {
    let mut args = Vec::with_capacity(argc as usize);
    for _ in 0..argc {
        args.push(pop(frames, instruction, at)?);
    }
    args.reverse();
    Ok(args)
}

fn read_slot(
    frames: &[Frame],
    select: impl Fn(&Frame) -> &Vec<Value>,
    slot: u16,
) -> Option<Value> {
    frames
        .last()
        .and_then(|f| select(f).get(slot as usize))
        .cloned()
}

fn write_slot(
    frames: &mut [Frame],
    select: impl Fn(&mut Frame) -> &mut Vec<Value>,
    slot: u16,
    value: Value,
) -> Result<(), ()> {
    match frames.last_mut().and_then(|f| select(f).get_mut(slot as usize)) {
        Some(s) => {
            *s = value;
            Ok(())
        }
        None => Err(()),
    }
}

/// Numeric (and for `ADD`, string) binary operations. Mixed int and double
/// operands compute in double.
fn arith(
    instruction: &Instruction,
    at: usize,
    lhs: Value,
    rhs: Value,
) -> Result<Value, RuntimeError> {
    if let (Value::Str(a), Value::Str(b)) = (&lhs, &rhs) {
        if matches!(instruction, Instruction::Add) {
            return Ok(Value::Str(Rc::from(format!("{a}{b}"))));
        }
    }
    if let (Value::Int(a), Value::Int(b)) = (&lhs, &rhs) {
        let (a, b) = (*a, *b);
        return match instruction {
            Instruction::Add => Ok(Value::Int(a.wrapping_add(b))),
            Instruction::Sub => Ok(Value::Int(a.wrapping_sub(b))),
            Instruction::Mul => Ok(Value::Int(a.wrapping_mul(b))),
            Instruction::Div if b == 0 => Err(fault(instruction, at, "division by zero")),
            Instruction::Div => Ok(Value::Int(a.wrapping_div(b))),
            Instruction::Mod if b == 0 => Err(fault(instruction, at, "division by zero")),
            Instruction::Mod => Ok(Value::Int(a.wrapping_rem(b))),
            Instruction::Lt => Ok(Value::Bool(a < b)),
            Instruction::Le => Ok(Value::Bool(a <= b)),
            Instruction::Gt => Ok(Value::Bool(a > b)),
            Instruction::Ge => Ok(Value::Bool(a >= b)),
            _ => Err(fault(instruction, at, "not a binary operation")),
        };
    }

    let (a, b) = match (&lhs, &rhs) {
        (Value::Int(a), Value::Double(b)) => (*a as f64, *b),
        (Value::Double(a), Value::Int(b)) => (*a, *b as f64),
        (Value::Double(a), Value::Double(b)) => (*a, *b),
        _ => {
            return Err(fault(
                instruction,
                at,
                &format!(
                    "cannot apply to {} and {}",
                    lhs.type_name(),
                    rhs.type_name()
                ),
            ));
        }
    };
    match instruction {
        Instruction::Add => Ok(Value::Double(a + b)),
        Instruction::Sub => Ok(Value::Double(a - b)),
        Instruction::Mul => Ok(Value::Double(a * b)),
        Instruction::Div => Ok(Value::Double(a / b)),
        Instruction::Mod => Ok(Value::Double(a % b)),
        Instruction::Lt => Ok(Value::Bool(a < b)),
        Instruction::Le => Ok(Value::Bool(a <= b)),
        Instruction::Gt => Ok(Value::Bool(a > b)),
        Instruction::Ge => Ok(Value::Bool(a >= b)),
        _ => Err(fault(instruction, at, "not a binary operation")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::FunctionInfo;

    fn program(instructions: Vec<Instruction>, functions: Vec<FunctionInfo>) -> BytecodeProgram {
        BytecodeProgram::new(instructions, functions, vec![], vec![], 0, None)
    }

    fn entry(name: &str, address: u32) -> FunctionInfo {
        FunctionInfo {
            name: name.to_string(),
            address,
            param_types: vec![],
            return_type: "int".to_string(),
        }
    }

    #[test]
    fn arguments_arrive_in_push_order() {
        // sub(a, b) = a - b, called as sub(10, 4).
        let p = program(
            vec![
                Instruction::StackAlloc(0),
                Instruction::LoadArg(0),
                Instruction::LoadArg(1),
                Instruction::Sub,
                Instruction::Return,
                Instruction::StackAlloc(0),
                Instruction::PushInt(10),
                Instruction::PushInt(4),
                Instruction::Call {
                    target: CallTarget::Address(0),
                    argc: 2,
                },
                Instruction::Return,
            ],
            vec![entry("sub", 0), entry("main", 5)],
        );
        let mut vm = VirtualMachine::with_output(&p, Vec::new());
        let result = vm.call("main", vec![]).unwrap();
        assert!(result.eq_value(&Value::Int(6)));
    }

    #[test]
    fn outermost_return_yields_the_result() {
        let p = program(
            vec![Instruction::StackAlloc(0), Instruction::PushInt(42), Instruction::Return],
            vec![entry("answer", 0)],
        );
        let mut vm = VirtualMachine::with_output(&p, Vec::new());
        let result = vm.call("answer", vec![]).unwrap();
        assert!(result.eq_value(&Value::Int(42)));
    }

    #[test]
    fn mixed_numeric_arithmetic_computes_in_double() {
        let p = program(
            vec![
                Instruction::StackAlloc(0),
                Instruction::PushInt(1),
                Instruction::PushDouble(0.5),
                Instruction::Add,
                Instruction::Return,
            ],
            vec![entry("f", 0)],
        );
        let mut vm = VirtualMachine::with_output(&p, Vec::new());
        let result = vm.call("f", vec![]).unwrap();
        assert!(result.eq_value(&Value::Double(1.5)));
    }

    #[test]
    fn integer_division_by_zero_faults() {
        let p = program(
            vec![
                Instruction::StackAlloc(0),
                Instruction::PushInt(1),
                Instruction::PushInt(0),
                Instruction::Div,
                Instruction::Return,
            ],
            vec![entry("f", 0)],
        );
        let mut vm = VirtualMachine::with_output(&p, Vec::new());
        let err = vm.call("f", vec![]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::InvalidOperation {
                opcode: "DIV".to_string(),
                position: 3,
                detail: "division by zero".to_string(),
            }
        );
    }

    #[test]
    fn calling_a_missing_function_fails() {
        let p = program(vec![Instruction::Return], vec![]);
        let mut vm = VirtualMachine::with_output(&p, Vec::new());
        let err = vm.call("missing", vec![]).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::UnknownFunction {
                name: "missing".to_string()
            }
        );
    }

    #[test]
    fn stack_underflow_faults() {
        let p = program(
            vec![Instruction::StackAlloc(0), Instruction::Add],
            vec![entry("f", 0)],
        );
        let mut vm = VirtualMachine::with_output(&p, Vec::new());
        let err = vm.call("f", vec![]).unwrap_err();
        assert!(matches!(err, RuntimeError::InvalidOperation { .. }), "{err}");
    }
}
