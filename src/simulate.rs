use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use anyhow::{Result, anyhow};
use tracing::debug;

use crate::element::{Element, HttpResponse, JsonValue, MethodHandle, PossibleValue};
use crate::model::{Constant, Instruction, MethodIdentifier, opcodes, types};
use crate::reduce::reduce;
use crate::resolve::{Builtin, ProjectIndex, Resolution, status_constant};

/// Operand-stack and local-table slots share element identity, so a value
/// duplicated by `Dup` and stored into two locals stays one element.
type Slot = Rc<RefCell<Element>>;

/// Outcome of simulating one method body.
#[derive(Clone, Debug)]
pub(crate) struct MethodResult {
    /// Every distinct element observed at a return point, plus responses
    /// synthesized from recognized thrown exceptions. Heterogeneous return
    /// types are retained side by side, never unified.
    pub(crate) elements: BTreeSet<Element>,
    /// Project-defined invocation targets encountered anywhere in the run,
    /// including nested simulations.
    pub(crate) encountered: BTreeSet<MethodIdentifier>,
}

impl MethodResult {
    /// Union view used at call sites: one element typed by the declared
    /// return type whose values span every observed outcome.
    pub(crate) fn merged(&self, declared_type: Option<&str>) -> Element {
        let type_name = declared_type
            .map(str::to_string)
            .or_else(|| self.elements.iter().next().map(|e| e.type_name.clone()))
            .unwrap_or_else(|| types::OBJECT.to_string());
        let mut merged = Element::unknown(type_name);
        for element in &self.elements {
            merged.merge(element);
        }
        merged
    }
}

/// Abstractly executes an instruction sequence with no incoming arguments;
/// unbound locals read as unknown values of their declared type.
pub(crate) fn simulate(index: &ProjectIndex, instructions: &[Instruction]) -> Result<MethodResult> {
    simulate_with_arguments(index, instructions, Vec::new())
}

/// Abstractly executes an instruction sequence with incoming argument
/// elements bound to the leading local slots (receiver first for instance
/// methods, widths per JVM slot rules handled by the caller's identifier).
pub(crate) fn simulate_with_arguments(
    index: &ProjectIndex,
    instructions: &[Instruction],
    arguments: Vec<(usize, Element)>,
) -> Result<MethodResult> {
    let mut simulator = Simulator {
        index,
        visited: BTreeSet::new(),
        encountered: BTreeSet::new(),
    };
    let mut locals: BTreeMap<usize, Slot> = BTreeMap::new();
    for (slot, element) in arguments {
        locals.insert(slot, Rc::new(RefCell::new(element)));
    }
    let elements = simulator.run(instructions, locals)?;
    Ok(MethodResult {
        elements,
        encountered: simulator.encountered,
    })
}

struct Simulator<'a> {
    index: &'a ProjectIndex,
    /// Methods currently on the recursive simulation path; re-entry yields a
    /// conservative unknown instead of recursing forever.
    visited: BTreeSet<MethodIdentifier>,
    encountered: BTreeSet<MethodIdentifier>,
}

impl Simulator<'_> {
    fn run(
        &mut self,
        instructions: &[Instruction],
        mut locals: BTreeMap<usize, Slot>,
    ) -> Result<BTreeSet<Element>> {
        let mut stack: Vec<Slot> = Vec::new();
        let mut returned: BTreeSet<Element> = BTreeSet::new();

        for instruction in instructions {
            match instruction {
                Instruction::Push(constant) => {
                    stack.push(slot(Element::constant(
                        constant_type(constant),
                        constant.clone(),
                    )));
                }
                Instruction::Load {
                    slot: index,
                    type_name,
                    ..
                } => {
                    let value = locals
                        .entry(*index)
                        .or_insert_with(|| slot(Element::unknown(type_name.clone())))
                        .clone();
                    stack.push(value);
                }
                Instruction::Store { slot: index, .. } => {
                    let value = pop(&mut stack)?;
                    match locals.get(index) {
                        // Merge-on-store folds every assignment a slot sees
                        // on any path into the element later loads observe.
                        Some(existing) if !Rc::ptr_eq(existing, &value) => {
                            existing.borrow_mut().merge(&value.borrow());
                        }
                        Some(_) => {}
                        None => {
                            locals.insert(*index, value);
                        }
                    }
                }
                Instruction::Dup => {
                    let top = stack
                        .last()
                        .cloned()
                        .ok_or_else(|| anyhow!("operand stack underflow at dup"))?;
                    stack.push(top);
                }
                Instruction::Invoke(identifier) => {
                    self.invoke(identifier, &mut stack)?;
                }
                Instruction::CreateHandle { target, captured } => {
                    let transferred = pop_snapshots(&mut stack, *captured)?;
                    stack.push(slot(Element::of(
                        types::OBJECT,
                        PossibleValue::Handle(MethodHandle::new(target.clone(), transferred)),
                    )));
                }
                Instruction::GetStatic {
                    class_name,
                    field_name,
                    type_name,
                } => {
                    // Status codes are int-typed everywhere the builders and
                    // getStatusCode see them; a wider constant here would make
                    // the same code two distinct set members.
                    let element = match status_constant(class_name, field_name) {
                        Some(code) => {
                            Element::constant(type_name.clone(), Constant::Int(code as i32))
                        }
                        None => Element::unknown(type_name.clone()),
                    };
                    stack.push(slot(element));
                }
                Instruction::Return { has_value } => {
                    // One path ends here; later instructions belong to the
                    // remaining reduced paths, so the scan continues.
                    if *has_value {
                        let value = pop(&mut stack)?;
                        returned.insert(value.borrow().clone());
                    }
                }
                Instruction::Throw => {
                    let thrown = pop(&mut stack)?;
                    let responses: Vec<HttpResponse> =
                        thrown.borrow().responses().into_iter().cloned().collect();
                    if !responses.is_empty() {
                        let mut element = Element::unknown(types::RESPONSE);
                        for response in responses {
                            element.values.insert(PossibleValue::Response(response));
                        }
                        returned.insert(element);
                    }
                }
                Instruction::ExceptionHandler => {
                    stack.clear();
                    stack.push(slot(Element::unknown(types::THROWABLE)));
                }
                Instruction::SizeChanging {
                    opcode,
                    popped,
                    pushed,
                } => {
                    let operands = pop_snapshots(&mut stack, *popped)?;
                    if *pushed == 1
                        && let Some(folded) = fold_constant(*opcode, &operands)
                    {
                        stack.push(slot(folded));
                    } else {
                        for _ in 0..*pushed {
                            stack.push(slot(Element::unknown(types::OBJECT)));
                        }
                    }
                }
                Instruction::Default { .. } => {}
            }
        }

        Ok(returned)
    }

    fn invoke(&mut self, identifier: &MethodIdentifier, stack: &mut Vec<Slot>) -> Result<()> {
        let mut arguments = Vec::with_capacity(identifier.parameter_types.len());
        for _ in 0..identifier.parameter_types.len() {
            arguments.push(pop(stack)?);
        }
        arguments.reverse();
        let receiver = if identifier.is_static {
            None
        } else {
            Some(pop(stack)?)
        };

        match self.index.resolve(identifier) {
            Resolution::Builtin(builtin) => {
                self.apply_builtin(builtin, identifier, receiver, arguments, stack)
            }
            Resolution::Project(method) => {
                self.encountered.insert(identifier.clone());
                let instructions = method.instructions.clone();
                let result =
                    self.simulate_call(identifier, receiver.clone(), &arguments, &instructions);
                if identifier.return_type.is_some() {
                    stack.push(slot(result));
                }
                Ok(())
            }
            Resolution::Unknown => {
                // Handles are still dispatched for void calls, for their
                // encountered-method side effects; only non-void calls may
                // leave a result on the stack.
                let handle_result = receiver
                    .as_ref()
                    .map(|receiver| self.invoke_handles(receiver, &arguments))
                    .unwrap_or_default();
                if let Some(return_type) = &identifier.return_type {
                    let element = handle_result
                        .unwrap_or_else(|| Element::unknown(return_type.clone()));
                    stack.push(slot(element));
                }
                Ok(())
            }
        }
    }

    /// Recursively simulates a project method with the call-site arguments
    /// bound to its parameter slots. Cycles yield an unknown element of the
    /// declared return type, silently.
    fn simulate_call(
        &mut self,
        identifier: &MethodIdentifier,
        receiver: Option<Slot>,
        arguments: &[Slot],
        instructions: &[Instruction],
    ) -> Element {
        let declared = identifier
            .return_type
            .clone()
            .unwrap_or_else(|| types::OBJECT.to_string());
        if !self.visited.insert(identifier.clone()) {
            return Element::unknown(declared);
        }

        let locals = bind_arguments(identifier, receiver, arguments);
        let outcome = reduce(instructions).and_then(|reduced| self.run(&reduced, locals));
        self.visited.remove(identifier);

        match outcome {
            Ok(elements) => {
                let result = MethodResult {
                    elements,
                    encountered: BTreeSet::new(),
                };
                result.merged(Some(&declared))
            }
            Err(error) => {
                debug!("degrading call to {identifier}: {error:#}");
                Element::unknown(declared)
            }
        }
    }

    /// Invocation through bound method handles: every possible target is
    /// simulated with transferred arguments prepended to the call-site
    /// arguments and the outcomes merged.
    fn invoke_handles(&mut self, receiver: &Slot, arguments: &[Slot]) -> Option<Element> {
        let handles: Vec<MethodHandle> =
            receiver.borrow().handles().into_iter().cloned().collect();
        if handles.is_empty() {
            return None;
        }

        let mut merged: Option<Element> = None;
        for handle in handles {
            for target in &handle.identifiers {
                let mut combined: Vec<Slot> =
                    handle.transferred.iter().cloned().map(slot).collect();
                combined.extend(arguments.iter().cloned());

                let element = match self.index.project_method(target) {
                    Some(method) => {
                        self.encountered.insert(target.clone());
                        let (target_receiver, target_arguments) = if target.is_static {
                            (None, combined)
                        } else if combined.is_empty() {
                            (None, combined)
                        } else {
                            let receiver = combined.remove(0);
                            (Some(receiver), combined)
                        };
                        let instructions = method.instructions.clone();
                        self.simulate_call(
                            target,
                            target_receiver,
                            &target_arguments,
                            &instructions,
                        )
                    }
                    None => Element::unknown(
                        target
                            .return_type
                            .clone()
                            .unwrap_or_else(|| types::OBJECT.to_string()),
                    ),
                };
                match merged.as_mut() {
                    Some(existing) => existing.merge(&element),
                    None => merged = Some(element),
                }
            }
        }
        merged
    }

    fn apply_builtin(
        &mut self,
        builtin: Builtin,
        identifier: &MethodIdentifier,
        receiver: Option<Slot>,
        arguments: Vec<Slot>,
        stack: &mut Vec<Slot>,
    ) -> Result<()> {
        match builtin {
            Builtin::ResponseStatus => {
                let mut response = HttpResponse::default();
                if let Some(argument) = arguments.first() {
                    response.statuses.extend(integral_values(argument));
                }
                stack.push(slot(Element::of(
                    types::RESPONSE_BUILDER,
                    PossibleValue::Response(response),
                )));
            }
            Builtin::ResponseFixed(code) => {
                stack.push(slot(Element::of(
                    types::RESPONSE_BUILDER,
                    PossibleValue::Response(HttpResponse::with_status(code)),
                )));
            }
            Builtin::ResponseOk => {
                let mut response = HttpResponse::with_status(200);
                if let Some(entity) = arguments.first() {
                    absorb_entity(&mut response, entity);
                }
                if let Some(media_type) = arguments.get(1) {
                    response
                        .content_types
                        .extend(media_type.borrow().string_values());
                }
                stack.push(slot(Element::of(
                    types::RESPONSE_BUILDER,
                    PossibleValue::Response(response),
                )));
            }
            Builtin::BuilderBuild => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                let responses: Vec<HttpResponse> =
                    builder.borrow().responses().into_iter().cloned().collect();
                let mut element = Element::unknown(types::RESPONSE);
                for response in responses {
                    element.values.insert(PossibleValue::Response(response));
                }
                stack.push(slot(element));
            }
            Builtin::BuilderStatus => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                let statuses: BTreeSet<i64> = arguments
                    .first()
                    .map(integral_values)
                    .unwrap_or_default();
                update_responses(&builder, |response| {
                    response.statuses = statuses.clone();
                });
                stack.push(builder);
            }
            Builtin::BuilderHeader => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                let names: Vec<String> = arguments
                    .first()
                    .map(|argument| argument.borrow().string_values())
                    .unwrap_or_default();
                update_responses(&builder, |response| {
                    response.headers.extend(names.iter().cloned());
                });
                stack.push(builder);
            }
            Builtin::BuilderEntity => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                if let Some(entity) = arguments.first() {
                    let mut absorbed = HttpResponse::default();
                    absorb_entity(&mut absorbed, entity);
                    update_responses(&builder, |response| response.merge(&absorbed));
                }
                stack.push(builder);
            }
            Builtin::BuilderType => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                let media_types: Vec<String> = arguments
                    .first()
                    .map(|argument| argument.borrow().string_values())
                    .unwrap_or_default();
                update_responses(&builder, |response| {
                    response.content_types.extend(media_types.iter().cloned());
                });
                stack.push(builder);
            }
            Builtin::CreateObjectBuilder => {
                stack.push(slot(Element::of(
                    types::JSON_OBJECT_BUILDER,
                    PossibleValue::Json(JsonValue::empty_object()),
                )));
            }
            Builtin::CreateArrayBuilder => {
                stack.push(slot(Element::of(
                    types::JSON_ARRAY_BUILDER,
                    PossibleValue::Json(JsonValue::empty_array()),
                )));
            }
            Builtin::ObjectBuilderAdd => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                let keys: Vec<String> = arguments
                    .first()
                    .map(|argument| argument.borrow().string_values())
                    .unwrap_or_default();
                let value = arguments
                    .get(1)
                    .map(snapshot)
                    .unwrap_or_else(|| Element::unknown(types::OBJECT));
                update_json(&builder, |json| {
                    for key in &keys {
                        json.write_key(key, value.clone());
                    }
                });
                stack.push(builder);
            }
            Builtin::ArrayBuilderAdd => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                let value = arguments
                    .first()
                    .map(snapshot)
                    .unwrap_or_else(|| Element::unknown(types::OBJECT));
                update_json(&builder, |json| json.append(value.clone()));
                stack.push(builder);
            }
            Builtin::JsonBuild => {
                let builder = receiver.ok_or_else(|| anyhow!("builder call without receiver"))?;
                let trees: Vec<JsonValue> =
                    builder.borrow().json_values().into_iter().cloned().collect();
                let mut element = Element::unknown(types::JSON_STRUCTURE);
                for tree in trees {
                    element.values.insert(PossibleValue::Json(tree));
                }
                stack.push(slot(element));
            }
            Builtin::Boxing => {
                let value = arguments
                    .into_iter()
                    .next()
                    .ok_or_else(|| anyhow!("boxing call without argument"))?;
                stack.push(value);
            }
            Builtin::StatusGetCode => {
                let status = receiver.ok_or_else(|| anyhow!("status call without receiver"))?;
                let mut element = Element::unknown(types::PRIMITIVE_INT);
                for code in integral_values(&status) {
                    element
                        .values
                        .insert(PossibleValue::Constant(Constant::Int(code as i32)));
                }
                stack.push(slot(element));
            }
            Builtin::WebApplicationExceptionInit => {
                let exception =
                    receiver.ok_or_else(|| anyhow!("constructor call without receiver"))?;
                let response = web_application_response(identifier, &arguments);
                exception
                    .borrow_mut()
                    .values
                    .insert(PossibleValue::Response(response));
            }
        }
        Ok(())
    }
}

/// Binds call-site slots to the callee's local table, honoring the two-slot
/// width of long and double parameters.
fn bind_arguments(
    identifier: &MethodIdentifier,
    receiver: Option<Slot>,
    arguments: &[Slot],
) -> BTreeMap<usize, Slot> {
    let mut locals = BTreeMap::new();
    let mut index = 0;
    if let Some(receiver) = receiver {
        locals.insert(0, slot(snapshot(&receiver)));
        index = 1;
    }
    for (parameter_type, argument) in identifier.parameter_types.iter().zip(arguments) {
        locals.insert(index, slot(snapshot(argument)));
        index += match parameter_type.as_str() {
            types::PRIMITIVE_LONG | types::PRIMITIVE_DOUBLE => 2,
            _ => 1,
        };
    }
    locals
}

/// Status/response carried by a `WebApplicationException` constructor call.
fn web_application_response(identifier: &MethodIdentifier, arguments: &[Slot]) -> HttpResponse {
    for (parameter_type, argument) in identifier.parameter_types.iter().zip(arguments) {
        match parameter_type.as_str() {
            types::PRIMITIVE_INT => {
                let statuses = integral_values(argument);
                if !statuses.is_empty() {
                    let mut response = HttpResponse::default();
                    response.statuses = statuses;
                    return response;
                }
            }
            _ if crate::resolve::is_response_type(parameter_type) => {
                let responses = argument.borrow().responses().into_iter().cloned().collect::<Vec<_>>();
                if let Some(first) = responses.first() {
                    let mut merged = first.clone();
                    for response in &responses[1..] {
                        merged.merge(response);
                    }
                    return merged;
                }
            }
            _ => {}
        }
    }
    // No explicit status: the JAX-RS default for this exception type.
    HttpResponse::with_status(500)
}

fn absorb_entity(response: &mut HttpResponse, entity: &Slot) {
    let entity = entity.borrow();
    response.entity_types.insert(entity.type_name.clone());
    for json in entity.json_values() {
        response.inline_entities.insert(json.clone());
    }
}

fn update_responses(builder: &Slot, mut apply: impl FnMut(&mut HttpResponse)) {
    let mut element = builder.borrow_mut();
    // An unknown builder still records what the chain adds to it.
    if element.responses().is_empty() {
        element
            .values
            .insert(PossibleValue::Response(HttpResponse::default()));
    }
    let values = std::mem::take(&mut element.values);
    element.values = values
        .into_iter()
        .map(|value| match value {
            PossibleValue::Response(mut response) => {
                apply(&mut response);
                PossibleValue::Response(response)
            }
            other => other,
        })
        .collect();
}

fn update_json(builder: &Slot, mut apply: impl FnMut(&mut JsonValue)) {
    let mut element = builder.borrow_mut();
    let values = std::mem::take(&mut element.values);
    element.values = values
        .into_iter()
        .map(|value| match value {
            PossibleValue::Json(mut json) => {
                apply(&mut json);
                PossibleValue::Json(json)
            }
            other => other,
        })
        .collect();
}

fn integral_values(argument: &Slot) -> BTreeSet<i64> {
    argument
        .borrow()
        .values
        .iter()
        .filter_map(|value| match value {
            PossibleValue::Constant(constant) => constant.integral(),
            _ => None,
        })
        .collect()
}

/// Numeric constant folding for size-changing opcodes whose operands are all
/// single known values. Anything else falls back to an unknown of the right
/// stack shape.
fn fold_constant(opcode: u8, operands: &[Element]) -> Option<Element> {
    let mut values = Vec::with_capacity(operands.len());
    for operand in operands {
        values.push(operand.single_integral()?);
    }
    let (result, long_width) = match (opcode, values.as_slice()) {
        (opcodes::IADD, [a, b]) => (a.wrapping_add(*b), false),
        (opcodes::LADD, [a, b]) => (a.wrapping_add(*b), true),
        (opcodes::ISUB, [a, b]) => (a.wrapping_sub(*b), false),
        (opcodes::LSUB, [a, b]) => (a.wrapping_sub(*b), true),
        (opcodes::IMUL, [a, b]) => (a.wrapping_mul(*b), false),
        (opcodes::LMUL, [a, b]) => (a.wrapping_mul(*b), true),
        (opcodes::IDIV, [a, b]) => (a.checked_div(*b)?, false),
        (opcodes::LDIV, [a, b]) => (a.checked_div(*b)?, true),
        (opcodes::IREM, [a, b]) => (a.checked_rem(*b)?, false),
        (opcodes::LREM, [a, b]) => (a.checked_rem(*b)?, true),
        (opcodes::INEG, [a]) => (a.wrapping_neg(), false),
        (opcodes::LNEG, [a]) => (a.wrapping_neg(), true),
        (opcodes::LCMP, [a, b]) => (i64::from(a.cmp(b) as i8), false),
        _ => return None,
    };
    let element = if long_width {
        Element::constant(types::PRIMITIVE_LONG, Constant::Long(result))
    } else {
        Element::constant(
            types::PRIMITIVE_INT,
            Constant::Int(i32::try_from(result).ok()?),
        )
    };
    Some(element)
}

fn constant_type(constant: &Constant) -> &'static str {
    match constant {
        Constant::Int(_) => types::PRIMITIVE_INT,
        Constant::Long(_) => types::PRIMITIVE_LONG,
        Constant::Float(_) => "float",
        Constant::Double(_) => types::PRIMITIVE_DOUBLE,
        Constant::Str(_) => types::STRING,
        Constant::ClassLiteral(_) => "java.lang.Class",
        Constant::Null => types::OBJECT,
    }
}

fn slot(element: Element) -> Slot {
    Rc::new(RefCell::new(element))
}

fn snapshot(value: &Slot) -> Element {
    value.borrow().clone()
}

fn pop(stack: &mut Vec<Slot>) -> Result<Slot> {
    stack
        .pop()
        .ok_or_else(|| anyhow!("operand stack underflow"))
}

/// Pops `count` values and returns their snapshots in push order.
fn pop_snapshots(stack: &mut Vec<Slot>, count: usize) -> Result<Vec<Element>> {
    let mut snapshots = Vec::with_capacity(count);
    for _ in 0..count {
        snapshots.push(snapshot(&pop(stack)?));
    }
    snapshots.reverse();
    Ok(snapshots)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{MethodResult, simulate};
    use crate::element::{Element, JsonValue, PossibleValue};
    use crate::model::test_support::{identifier, load_int, store_int};
    use crate::model::{Constant, Instruction, opcodes, types};
    use crate::reduce::reduce;
    use crate::resolve::{ProjectClass, ProjectIndex, ProjectMethod};

    fn empty_index() -> ProjectIndex {
        ProjectIndex::new(&[])
    }

    fn push_int(value: i32) -> Instruction {
        Instruction::Push(Constant::Int(value))
    }

    fn push_str(value: &str) -> Instruction {
        Instruction::Push(Constant::Str(value.to_string()))
    }

    fn response_status() -> Instruction {
        Instruction::Invoke(identifier(
            types::RESPONSE,
            "status",
            Some(types::RESPONSE_BUILDER),
            true,
            &["int"],
        ))
    }

    fn response_ok() -> Instruction {
        Instruction::Invoke(identifier(
            types::RESPONSE,
            "ok",
            Some(types::RESPONSE_BUILDER),
            true,
            &[],
        ))
    }

    fn builder_build() -> Instruction {
        Instruction::Invoke(identifier(
            types::RESPONSE_BUILDER,
            "build",
            Some(types::RESPONSE),
            false,
            &[],
        ))
    }

    fn statuses(result: &MethodResult) -> BTreeSet<i64> {
        result
            .elements
            .iter()
            .flat_map(|element| element.responses())
            .flat_map(|response| response.statuses.iter().copied())
            .collect()
    }

    #[test]
    fn folds_integer_division() {
        let instructions = vec![
            push_int(6),
            push_int(3),
            Instruction::SizeChanging {
                opcode: opcodes::IDIV,
                popped: 2,
                pushed: 1,
            },
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        let expected = Element::constant(types::PRIMITIVE_INT, Constant::Int(2));
        assert_eq!(result.elements, BTreeSet::from([expected]));
    }

    #[test]
    fn unfoldable_arithmetic_degrades_to_unknown() {
        let instructions = vec![
            load_int(1),
            push_int(3),
            Instruction::SizeChanging {
                opcode: opcodes::IDIV,
                popped: 2,
                pushed: 1,
            },
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(result.elements.len(), 1);
        let element = result.elements.iter().next().expect("one element");
        assert!(element.values.is_empty());
    }

    #[test]
    fn multi_assignment_aliases_both_locals() {
        // status = anotherStatus = 300; both slots observe {300}.
        let instructions = vec![
            push_int(300),
            Instruction::Dup,
            store_int(2),
            store_int(1),
            load_int(1),
            Instruction::Return { has_value: true },
            load_int(2),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        let expected = Element::constant(types::PRIMITIVE_INT, Constant::Int(300));
        assert_eq!(result.elements, BTreeSet::from([expected]));
    }

    #[test]
    fn branch_merge_retains_both_values() {
        // if (cond) { status = 100 } else { status = 200 } return status;
        let instructions = vec![
            push_int(100),
            store_int(1),
            push_int(200),
            store_int(1),
            load_int(1),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(result.elements.len(), 1);
        let element = result.elements.iter().next().expect("one element");
        let values: BTreeSet<_> = element
            .values
            .iter()
            .filter_map(|value| match value {
                PossibleValue::Constant(constant) => constant.integral(),
                _ => None,
            })
            .collect();
        assert_eq!(values, BTreeSet::from([100, 200]));
    }

    #[test]
    fn exception_handler_contributes_catch_path_response() {
        let instructions = vec![
            response_ok(),
            builder_build(),
            Instruction::Return { has_value: true },
            Instruction::ExceptionHandler,
            Instruction::Store {
                slot: 1,
                type_name: types::THROWABLE.to_string(),
                variable_name: None,
            },
            push_int(500),
            response_status(),
            builder_build(),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(result.elements.len(), 2);
        assert_eq!(statuses(&result), BTreeSet::from([200, 500]));
    }

    #[test]
    fn recursive_project_method_terminates() {
        let recursive = identifier(
            "com.example.Orders",
            "retry",
            Some(types::RESPONSE),
            true,
            &[],
        );
        let body = vec![
            Instruction::Invoke(recursive.clone()),
            Instruction::Return { has_value: true },
        ];
        let index = ProjectIndex::new(&[ProjectClass {
            name: "com.example.Orders".to_string(),
            methods: vec![ProjectMethod {
                identifier: recursive.clone(),
                instructions: body.clone(),
                rest: None,
            }],
        }]);

        let result = simulate(&index, &body).expect("simulate");

        assert!(result.encountered.contains(&recursive));
        assert_eq!(result.elements.len(), 1);
        let element = result.elements.iter().next().expect("one element");
        assert_eq!(element.type_name, types::RESPONSE);
    }

    #[test]
    fn mutually_recursive_project_methods_terminate() {
        let ping = identifier("com.example.A", "ping", Some(types::RESPONSE), true, &[]);
        let pong = identifier("com.example.B", "pong", Some(types::RESPONSE), true, &[]);
        let ping_body = vec![
            Instruction::Invoke(pong.clone()),
            Instruction::Return { has_value: true },
        ];
        let pong_body = vec![
            Instruction::Invoke(ping.clone()),
            Instruction::Return { has_value: true },
        ];
        let index = ProjectIndex::new(&[
            ProjectClass {
                name: "com.example.A".to_string(),
                methods: vec![ProjectMethod {
                    identifier: ping.clone(),
                    instructions: ping_body.clone(),
                    rest: None,
                }],
            },
            ProjectClass {
                name: "com.example.B".to_string(),
                methods: vec![ProjectMethod {
                    identifier: pong.clone(),
                    instructions: pong_body,
                    rest: None,
                }],
            },
        ]);

        let result = simulate(&index, &ping_body).expect("simulate");

        assert!(result.encountered.contains(&ping));
        assert!(result.encountered.contains(&pong));
    }

    #[test]
    fn project_call_result_feeds_the_caller() {
        let helper = identifier(
            "com.example.Orders",
            "defaultStatus",
            Some("int"),
            true,
            &[],
        );
        let helper_body = vec![push_int(201), Instruction::Return { has_value: true }];
        let index = ProjectIndex::new(&[ProjectClass {
            name: "com.example.Orders".to_string(),
            methods: vec![ProjectMethod {
                identifier: helper.clone(),
                instructions: helper_body,
                rest: None,
            }],
        }]);
        let caller = vec![
            Instruction::Invoke(helper.clone()),
            response_status(),
            builder_build(),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&index, &caller).expect("simulate");

        assert_eq!(statuses(&result), BTreeSet::from([201]));
        assert_eq!(result.encountered, BTreeSet::from([helper]));
    }

    #[test]
    fn incoming_arguments_bind_to_parameter_slots() {
        let target = identifier(
            "com.example.Orders",
            "byStatus",
            Some(types::RESPONSE),
            true,
            &["int"],
        );
        let body = vec![
            load_int(0),
            response_status(),
            builder_build(),
            Instruction::Return { has_value: true },
        ];
        let index = ProjectIndex::new(&[ProjectClass {
            name: "com.example.Orders".to_string(),
            methods: vec![ProjectMethod {
                identifier: target.clone(),
                instructions: body,
                rest: None,
            }],
        }]);
        let caller = vec![
            push_int(418),
            Instruction::Invoke(target),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&index, &caller).expect("simulate");

        assert_eq!(statuses(&result), BTreeSet::from([418]));
    }

    #[test]
    fn builder_chain_records_headers_and_content_types() {
        let header = Instruction::Invoke(identifier(
            types::RESPONSE_BUILDER,
            "header",
            Some(types::RESPONSE_BUILDER),
            false,
            &[types::STRING, types::OBJECT],
        ));
        let instructions = vec![
            push_int(201),
            response_status(),
            push_str("Location"),
            push_str("/orders/1"),
            header,
            builder_build(),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(result.elements.len(), 1);
        let element = result.elements.iter().next().expect("one element");
        let responses = element.responses();
        assert_eq!(responses.len(), 1);
        assert!(responses[0].headers.contains("Location"));
        assert_eq!(responses[0].statuses, BTreeSet::from([201]));
    }

    #[test]
    fn status_enum_constant_reaches_the_builder() {
        let status_overload = Instruction::Invoke(identifier(
            types::RESPONSE,
            "status",
            Some(types::RESPONSE_BUILDER),
            true,
            &[types::RESPONSE_STATUS],
        ));
        let instructions = vec![
            Instruction::GetStatic {
                class_name: types::RESPONSE_STATUS.to_string(),
                field_name: "NOT_FOUND".to_string(),
                type_name: types::RESPONSE_STATUS.to_string(),
            },
            status_overload,
            builder_build(),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(statuses(&result), BTreeSet::from([404]));
    }

    #[test]
    fn status_constant_and_int_literal_collapse_to_one_value() {
        // Both branches assign 404, once via Status.NOT_FOUND.getStatusCode()
        // and once as a literal; the merged slot must hold a single value.
        let get_code = Instruction::Invoke(identifier(
            types::RESPONSE_STATUS,
            "getStatusCode",
            Some("int"),
            false,
            &[],
        ));
        let instructions = vec![
            Instruction::GetStatic {
                class_name: types::RESPONSE_STATUS.to_string(),
                field_name: "NOT_FOUND".to_string(),
                type_name: types::RESPONSE_STATUS.to_string(),
            },
            get_code,
            store_int(1),
            push_int(404),
            store_int(1),
            load_int(1),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(result.elements.len(), 1);
        let element = result.elements.iter().next().expect("one element");
        assert_eq!(element.values.len(), 1);
        assert_eq!(element.single_integral(), Some(404));
    }

    #[test]
    fn thrown_web_application_exception_contributes_status() {
        let ctor = Instruction::Invoke(identifier(
            types::WEB_APPLICATION_EXCEPTION,
            "<init>",
            None,
            false,
            &["int"],
        ));
        let instructions = vec![
            // new WebApplicationException(404); throw;
            Instruction::SizeChanging {
                opcode: 0xbb,
                popped: 0,
                pushed: 1,
            },
            Instruction::Dup,
            push_int(404),
            ctor,
            Instruction::Throw,
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(statuses(&result), BTreeSet::from([404]));
    }

    fn json_chain() -> Vec<Instruction> {
        let create = Instruction::Invoke(identifier(
            types::JSON,
            "createObjectBuilder",
            Some(types::JSON_OBJECT_BUILDER),
            true,
            &[],
        ));
        let add_string = Instruction::Invoke(identifier(
            types::JSON_OBJECT_BUILDER,
            "add",
            Some(types::JSON_OBJECT_BUILDER),
            false,
            &[types::STRING, types::STRING],
        ));
        let add_int = Instruction::Invoke(identifier(
            types::JSON_OBJECT_BUILDER,
            "add",
            Some(types::JSON_OBJECT_BUILDER),
            false,
            &[types::STRING, "int"],
        ));
        let build = Instruction::Invoke(identifier(
            types::JSON_OBJECT_BUILDER,
            "build",
            Some("javax.json.JsonObject"),
            false,
            &[],
        ));
        vec![
            create,
            push_str("key"),
            push_str("value"),
            add_string,
            push_str("duke"),
            push_int(42),
            add_int,
            build,
            Instruction::Return { has_value: true },
        ]
    }

    #[test]
    fn json_builder_chain_is_deterministic() {
        let first = simulate(&empty_index(), &json_chain()).expect("simulate");
        let second = simulate(&empty_index(), &json_chain()).expect("simulate");

        assert_eq!(first.elements, second.elements);
        assert_eq!(first.elements.len(), 1);
        let element = first.elements.iter().next().expect("one element");
        let trees = element.json_values();
        assert_eq!(trees.len(), 1);
        let JsonValue::Object(structure) = trees[0] else {
            panic!("object expected");
        };
        assert_eq!(
            structure["key"],
            Element::constant(types::STRING, Constant::Str("value".to_string()))
        );
        assert_eq!(
            structure["duke"],
            Element::constant(types::PRIMITIVE_INT, Constant::Int(42))
        );
    }

    #[test]
    fn method_handle_invocation_merges_all_targets() {
        let target = identifier(
            "com.example.Orders",
            "fallback",
            Some(types::RESPONSE),
            true,
            &["int"],
        );
        let body = vec![
            load_int(0),
            response_status(),
            builder_build(),
            Instruction::Return { has_value: true },
        ];
        let index = ProjectIndex::new(&[ProjectClass {
            name: "com.example.Orders".to_string(),
            methods: vec![ProjectMethod {
                identifier: target.clone(),
                instructions: body,
                rest: None,
            }],
        }]);
        let functional_get = identifier(
            "java.util.function.Supplier",
            "get",
            Some(types::OBJECT),
            false,
            &[],
        );
        let instructions = vec![
            push_int(503),
            Instruction::CreateHandle {
                target: target.clone(),
                captured: 1,
            },
            Instruction::Invoke(functional_get),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&index, &instructions).expect("simulate");

        assert_eq!(statuses(&result), BTreeSet::from([503]));
        assert!(result.encountered.contains(&target));
    }

    #[test]
    fn void_handle_invocation_leaves_the_stack_intact() {
        let target = identifier("com.example.Orders", "audit", None, true, &[]);
        let body = vec![Instruction::Return { has_value: false }];
        let index = ProjectIndex::new(&[ProjectClass {
            name: "com.example.Orders".to_string(),
            methods: vec![ProjectMethod {
                identifier: target.clone(),
                instructions: body,
                rest: None,
            }],
        }]);
        let functional_run = identifier("java.lang.Runnable", "run", None, false, &[]);
        let instructions = vec![
            push_int(418),
            Instruction::CreateHandle {
                target: target.clone(),
                captured: 0,
            },
            Instruction::Invoke(functional_run),
            response_status(),
            builder_build(),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&index, &instructions).expect("simulate");

        // The void dispatch must not leave an extra element above 418.
        assert_eq!(statuses(&result), BTreeSet::from([418]));
        assert!(result.encountered.contains(&target));
    }

    #[test]
    fn unresolvable_call_degrades_to_unknown() {
        let instructions = vec![
            Instruction::Invoke(identifier(
                "com.example.Gateway",
                "fetch",
                Some(types::STRING),
                true,
                &[],
            )),
            Instruction::Return { has_value: true },
        ];

        let result = simulate(&empty_index(), &instructions).expect("simulate");

        assert_eq!(result.elements.len(), 1);
        let element = result.elements.iter().next().expect("one element");
        assert_eq!(element.type_name, types::STRING);
        assert!(element.values.is_empty());
    }

    #[test]
    fn stack_underflow_is_fatal() {
        let instructions = vec![Instruction::Return { has_value: true }];
        let error = simulate(&empty_index(), &instructions).expect_err("underflow");
        assert!(format!("{error:#}").contains("underflow"));
    }

    #[test]
    fn reduction_preserves_simulation_results() {
        let log_call = Instruction::Invoke(identifier(
            "org.slf4j.Logger",
            "info",
            None,
            false,
            &[types::STRING],
        ));
        let logger = Instruction::GetStatic {
            class_name: "com.example.Orders".to_string(),
            field_name: "LOG".to_string(),
            type_name: "org.slf4j.Logger".to_string(),
        };
        let cases: Vec<Vec<Instruction>> = vec![
            json_chain(),
            vec![
                logger,
                push_str("handling"),
                log_call,
                push_int(100),
                store_int(1),
                push_int(200),
                store_int(1),
                load_int(1),
                Instruction::Return { has_value: true },
            ],
            vec![
                push_int(300),
                Instruction::Dup,
                store_int(2),
                store_int(1),
                load_int(1),
                Instruction::Return { has_value: true },
            ],
            vec![
                response_ok(),
                builder_build(),
                Instruction::Return { has_value: true },
                Instruction::ExceptionHandler,
                push_int(500),
                response_status(),
                builder_build(),
                Instruction::Return { has_value: true },
            ],
        ];

        for case in cases {
            let reduced = reduce(&case).expect("reduce");
            let full = simulate(&empty_index(), &case).expect("simulate full");
            let pruned = simulate(&empty_index(), &reduced).expect("simulate reduced");
            assert_eq!(full.elements, pruned.elements);
        }
    }
}
