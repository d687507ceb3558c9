//! The stack-based virtual machine (component H): per-instruction
//! dispatch against a rung's accumulator and push-stack, with a
//! per-instruction wall-clock timeout.

use std::time::{Duration, Instant};

use crate::data::{self, DataType, Value};
use crate::error::{PlcError, PlcResult};
use crate::image::ProcessImage;
use crate::instruction::{Instruction, Modifier, Opcode, Target};
use crate::rung::{ExecState, Rung};

/// Run one rung to completion (or until it jumps, traps, or times out),
/// against `image`. `budget` is the wall-clock ceiling for the *whole*
/// rung (spec.md §4.4: "the VM receives a microsecond budget").
pub fn run_rung(rung: &Rung, image: &mut ProcessImage, budget: Duration) -> PlcResult<()> {
    let mut state = ExecState::new();
    let deadline = Instant::now() + budget;
    let mut pc: usize = 0;

    while pc < rung.instructions.len() {
        if Instant::now() >= deadline {
            return Err(PlcError::Timeout);
        }
        let instr = &rung.instructions[pc];
        pc = step(instr, &mut state, image, pc)?;
    }
    Ok(())
}

/// Execute one instruction, returning the next program counter.
fn step(instr: &Instruction, state: &mut ExecState, image: &mut ProcessImage, pc: usize) -> PlcResult<usize> {
    match instr.opcode {
        Opcode::Nop | Opcode::Cal | Opcode::Ret => Ok(pc + 1),

        Opcode::Jmp => {
            let target = jump_target(instr)?;
            if instr.modifier == Modifier::Cond && !state.acc.is_truthy() {
                Ok(pc + 1)
            } else {
                Ok(target)
            }
        }

        Opcode::Pop => {
            let frame = state.pop()?;
            state.acc = data::operate(frame.op, false, frame.ty, frame.value, state.acc)?;
            state.acc_ty = frame.ty;
            Ok(pc + 1)
        }

        Opcode::Set => {
            if instr.modifier == Modifier::Cond && !state.acc.is_truthy() {
                return Ok(pc + 1);
            }
            image.set_coil(operand(instr)?)?;
            Ok(pc + 1)
        }
        Opcode::Reset => {
            if instr.modifier == Modifier::Cond && !state.acc.is_truthy() {
                return Ok(pc + 1);
            }
            image.reset_coil(operand(instr)?)?;
            Ok(pc + 1)
        }

        Opcode::Ld => {
            let op = operand(instr)?;
            let mut value = image.read(op)?;
            let ty = op.data_type()?;
            if instr.modifier == Modifier::Negate {
                value = negate(value, ty);
            }
            state.acc = value;
            state.acc_ty = ty;
            Ok(pc + 1)
        }

        Opcode::St => {
            let op = operand(instr)?;
            let ty = op.data_type()?;
            let mut value = state.acc;
            if instr.modifier == Modifier::Negate {
                value = negate(value, ty);
            }
            image.write(op, value)?;
            Ok(pc + 1)
        }

        // Stackable opcodes (AND..LE): see spec.md §4.4.
        _ => {
            let op = operand(instr)?;
            let ty = op.data_type()?;
            if instr.modifier == Modifier::Push {
                state.push(instr.opcode)?;
                state.acc = image.read(op)?;
                state.acc_ty = ty;
            } else {
                let rhs = image.read(op)?;
                let negate = instr.modifier == Modifier::Negate;
                state.acc = data::operate(instr.opcode, negate, ty, state.acc, rhs)?;
                state.acc_ty = ty;
            }
            Ok(pc + 1)
        }
    }
}

fn operand(instr: &Instruction) -> PlcResult<&crate::instruction::Operand> {
    instr.operand().ok_or(PlcError::BadOperand)
}

fn jump_target(instr: &Instruction) -> PlcResult<usize> {
    match &instr.target {
        Target::Jump { resolved: Some(idx), .. } => Ok(*idx),
        _ => Err(PlcError::BadProg),
    }
}

/// `!` on `LD`/`ST`: logical negation for booleans, arithmetic
/// complement modulo `2^w` for multi-byte integers, sign flip for reals.
fn negate(value: Value, ty: DataType) -> Value {
    match (ty, value) {
        (DataType::Real, v) => Value::Real(-v.as_f64()),
        (DataType::Bool, v) => Value::bool_val(!v.is_truthy()),
        (_, v) => {
            let mask = data::mask_width(ty.bit_width());
            Value::Int((!v.as_u64()) & mask)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::ImageLayout;
    use crate::parser::il::parse_program;

    fn layout() -> ImageLayout {
        ImageLayout {
            digital_inputs: 8,
            digital_outputs: 8,
            analog_inputs: 2,
            analog_outputs: 2,
            timers: 1,
            blinkers: 1,
            memory: 2,
            real_memory: 1,
            step_ms: 10,
        }
    }

    #[test]
    fn triple_majority_gate() {
        let src = "LD  %i0/0\nAND %i0/1\nOR( %i0/2\nAND %i0/1\n)\nOR( %i0/2\nAND %i0/0\n)\nST %q0/0\n";
        let rung = parse_program(src).unwrap();

        for bits in 0u8..8 {
            let mut image = ProcessImage::new(layout());
            let raw = bits;
            image.decode_digital_inputs(&[raw]);
            run_rung(&rung, &mut image, Duration::from_millis(50)).unwrap();
            let out = image.encode_digital_outputs();
            let ones = (0..3).filter(|i| (bits >> i) & 1 == 1).count();
            let expected = ones >= 2;
            assert_eq!((out[0] & 1) == 1, expected, "bits={bits:03b}");
        }
    }

    #[test]
    fn timeout_aborts_rung() {
        let src = "start: LD %m0\nJMP start\n";
        let rung = parse_program(src).unwrap();
        let mut image = ProcessImage::new(layout());
        let err = run_rung(&rung, &mut image, Duration::from_micros(10)).unwrap_err();
        assert_eq!(err, PlcError::Timeout);
    }

    #[test]
    fn encode_round_trip_via_set() {
        let src = "LD %i0/0\nST %Q0/0\nLD %i0/0\nS %Q0/1\n";
        let rung = parse_program(src).unwrap();
        let mut image = ProcessImage::new(layout());
        image.decode_digital_inputs(&[0x01]);
        run_rung(&rung, &mut image, Duration::from_millis(50)).unwrap();
        assert!(image.digital_outputs[0].level);
        assert!(image.digital_outputs[1].set_pending);
    }
}
