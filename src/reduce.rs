use anyhow::{Result, bail};

use crate::model::{Instruction, MethodIdentifier, opcodes};

/// Fate of one operand-stack value during the backward relevance scan.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Need {
    Live,
    Dead,
}

/// Removes instructions whose only effect is on values never read by a later
/// flow- or return-relevant instruction, preserving everything that
/// determines returned values.
///
/// Single backward pass: Return/Throw/ExceptionHandler/Store sites seed
/// relevance; an instruction is kept when it produces a value some kept
/// instruction consumes, or when it may have observable side effects outside
/// the fixed purity allow-list. Operand chains feeding dropped consumers are
/// dropped transitively, including through `Dup`.
pub(crate) fn reduce(instructions: &[Instruction]) -> Result<Vec<Instruction>> {
    let mut keep = vec![false; instructions.len()];
    // Backward view of the operand stack: one fate per value that will be on
    // the stack when execution reaches the already-scanned suffix.
    let mut needs: Vec<Need> = Vec::new();

    for (index, instruction) in instructions.iter().enumerate().rev() {
        let produced: Vec<Need> = (0..instruction.pushed())
            .map(|_| needs.pop().unwrap_or(Need::Dead))
            .collect();
        let any_live = produced.contains(&Need::Live);

        let kept = match instruction {
            Instruction::Return { .. } | Instruction::Throw | Instruction::Store { .. } => true,
            Instruction::ExceptionHandler => {
                // Stack resets at the handler boundary; nothing pushed
                // before it can satisfy demand after it.
                needs.clear();
                keep[index] = true;
                continue;
            }
            Instruction::Invoke(identifier) => any_live || !droppable_call(identifier),
            Instruction::SizeChanging { opcode, .. } => {
                any_live && !matches!(*opcode, opcodes::MONITORENTER | opcodes::MONITOREXIT)
            }
            Instruction::Push(_)
            | Instruction::Load { .. }
            | Instruction::GetStatic { .. }
            | Instruction::Dup
            | Instruction::CreateHandle { .. } => any_live,
            Instruction::Default { .. } => false,
        };

        keep[index] = kept;
        let fate = if kept { Need::Live } else { Need::Dead };
        for _ in 0..instruction.popped() {
            needs.push(fate);
        }
    }

    let reduced: Vec<Instruction> = instructions
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(instruction, _)| instruction.clone())
        .collect();
    validate_stack_shape(&reduced)?;
    Ok(reduced)
}

/// Calls with no effect the analysis observes beyond their result: safe to
/// drop when that result is unused. No interprocedural purity analysis; a
/// fixed allow-list plus logging sinks only.
fn droppable_call(identifier: &MethodIdentifier) -> bool {
    is_pure_value_call(identifier) || is_logging_sink(identifier)
}

fn is_pure_value_call(identifier: &MethodIdentifier) -> bool {
    match identifier.class_name.as_str() {
        "java.lang.String" => matches!(identifier.method_name.as_str(), "valueOf" | "concat"),
        "java.lang.StringBuilder" => {
            matches!(identifier.method_name.as_str(), "<init>" | "append" | "toString")
        }
        "java.lang.Integer" | "java.lang.Long" | "java.lang.Double" | "java.lang.Boolean" => {
            identifier.method_name == "valueOf"
        }
        "java.util.Objects" => identifier.method_name == "requireNonNull",
        _ => false,
    }
}

fn is_logging_sink(identifier: &MethodIdentifier) -> bool {
    matches!(
        identifier.class_name.as_str(),
        "org.slf4j.Logger" | "java.util.logging.Logger" | "java.io.PrintStream"
    )
}

/// Forward stack-depth accounting over the reduced sequence. Underflow here
/// means the reduction (or the upstream instruction model) is defective, not
/// a recoverable input condition.
fn validate_stack_shape(instructions: &[Instruction]) -> Result<()> {
    let mut depth: usize = 0;
    for (index, instruction) in instructions.iter().enumerate() {
        if matches!(instruction, Instruction::ExceptionHandler) {
            depth = 1;
            continue;
        }
        let popped = instruction.popped();
        if depth < popped {
            bail!(
                "inconsistent stack accounting at reduced instruction {index} ({instruction:?}): \
                 depth {depth}, needs {popped}"
            );
        }
        depth = depth - popped + instruction.pushed();
    }
    Ok(())
}
