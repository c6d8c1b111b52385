use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::descriptor::{parameter_type_names, return_type_name};
use crate::model::{Constant, Instruction, MethodIdentifier};
use crate::resolve::{ProjectClass, ProjectMethod, RestMetadata};

/// Loads the class model emitted by the external bytecode reader: a JSON
/// document per project (or a directory of them), already lowered to the
/// simplified instruction set. Raw class-file binaries never reach this
/// crate.
pub(crate) fn load_project(input: &Path) -> Result<Vec<ProjectClass>> {
    let mut classes = Vec::new();
    if input.is_dir() {
        let mut entries = Vec::new();
        for entry in fs::read_dir(input)
            .with_context(|| format!("failed to read directory {}", input.display()))?
        {
            let entry = entry
                .with_context(|| format!("failed to read entry under {}", input.display()))?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                entries.push(path);
            }
        }
        // Deterministic ordering regardless of directory iteration order.
        entries.sort();
        if entries.is_empty() {
            bail!("no class model documents under {}", input.display());
        }
        for entry in entries {
            classes.extend(load_document(&entry)?);
        }
    } else {
        classes.extend(load_document(input)?);
    }
    Ok(classes)
}

fn load_document(path: &Path) -> Result<Vec<ProjectClass>> {
    let data =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut deserializer = serde_json::Deserializer::from_slice(&data);
    let document: RawDocument = serde_path_to_error::deserialize(&mut deserializer)
        .map_err(|error| {
            anyhow::anyhow!(
                "failed to parse {} at {}: {}",
                path.display(),
                error.path(),
                error.inner()
            )
        })?;

    let mut classes = Vec::with_capacity(document.classes.len());
    for raw_class in document.classes {
        let mut methods = Vec::with_capacity(raw_class.methods.len());
        for raw_method in raw_class.methods {
            let identifier = method_identifier(
                &raw_class.name,
                &raw_method.name,
                &raw_method.descriptor,
                raw_method.is_static,
            )
            .with_context(|| {
                format!("method {}.{}", raw_class.name, raw_method.name)
            })?;
            let mut instructions = Vec::with_capacity(raw_method.instructions.len());
            for raw_instruction in raw_method.instructions {
                instructions.push(convert_instruction(raw_instruction).with_context(|| {
                    format!("method {}.{}", raw_class.name, raw_method.name)
                })?);
            }
            methods.push(ProjectMethod {
                identifier,
                instructions,
                rest: raw_method.rest.map(RawRest::into_metadata),
            });
        }
        classes.push(ProjectClass {
            name: dotted(&raw_class.name),
            methods,
        });
    }
    Ok(classes)
}

fn convert_instruction(raw: RawInstruction) -> Result<Instruction> {
    let instruction = match raw {
        RawInstruction::Push { value } => Instruction::Push(value.into_constant()),
        RawInstruction::Load {
            slot,
            type_name,
            variable,
        } => Instruction::Load {
            slot,
            type_name: dotted(&type_name),
            variable_name: variable,
        },
        RawInstruction::Store {
            slot,
            type_name,
            variable,
        } => Instruction::Store {
            slot,
            type_name: dotted(&type_name),
            variable_name: variable,
        },
        RawInstruction::Dup => Instruction::Dup,
        RawInstruction::Invoke {
            owner,
            name,
            descriptor,
            is_static,
        } => Instruction::Invoke(method_identifier(&owner, &name, &descriptor, is_static)?),
        RawInstruction::Handle {
            owner,
            name,
            descriptor,
            is_static,
            captured,
        } => Instruction::CreateHandle {
            target: method_identifier(&owner, &name, &descriptor, is_static)?,
            captured,
        },
        RawInstruction::GetStatic {
            owner,
            name,
            type_name,
        } => Instruction::GetStatic {
            class_name: dotted(&owner),
            field_name: name,
            type_name: dotted(&type_name),
        },
        RawInstruction::Return { value } => Instruction::Return { has_value: value },
        RawInstruction::Throw => Instruction::Throw,
        RawInstruction::Handler => Instruction::ExceptionHandler,
        RawInstruction::Sized {
            opcode,
            popped,
            pushed,
        } => Instruction::SizeChanging {
            opcode,
            popped,
            pushed,
        },
        RawInstruction::Other { opcode } => Instruction::Default { opcode },
    };
    Ok(instruction)
}

/// Owner/name/descriptor triple into a structural identifier, the one
/// conversion in the pipeline that touches JVM descriptors.
fn method_identifier(
    owner: &str,
    name: &str,
    descriptor: &str,
    is_static: bool,
) -> Result<MethodIdentifier> {
    Ok(MethodIdentifier {
        class_name: dotted(owner),
        method_name: name.to_string(),
        return_type: return_type_name(descriptor)?,
        is_static,
        parameter_types: parameter_type_names(descriptor)?,
    })
}

// Owners arrive in either slash or dotted form depending on reader version.
fn dotted(name: &str) -> String {
    name.replace('/', ".")
}

#[derive(Deserialize)]
struct RawDocument {
    classes: Vec<RawClass>,
}

#[derive(Deserialize)]
struct RawClass {
    name: String,
    #[serde(default)]
    methods: Vec<RawMethod>,
}

#[derive(Deserialize)]
struct RawMethod {
    name: String,
    descriptor: String,
    #[serde(rename = "static", default)]
    is_static: bool,
    #[serde(default)]
    rest: Option<RawRest>,
    #[serde(default)]
    instructions: Vec<RawInstruction>,
}

#[derive(Deserialize)]
struct RawRest {
    #[serde(rename = "httpMethod")]
    http_method: String,
    path: String,
    #[serde(default)]
    consumes: Vec<String>,
    #[serde(default)]
    produces: Vec<String>,
}

impl RawRest {
    fn into_metadata(self) -> RestMetadata {
        RestMetadata {
            http_method: self.http_method,
            path: self.path,
            consumes: self.consumes,
            produces: self.produces,
        }
    }
}

#[derive(Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum RawInstruction {
    Push {
        value: RawConstant,
    },
    Load {
        slot: usize,
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        variable: Option<String>,
    },
    Store {
        slot: usize,
        #[serde(rename = "type")]
        type_name: String,
        #[serde(default)]
        variable: Option<String>,
    },
    Dup,
    Invoke {
        owner: String,
        name: String,
        descriptor: String,
        #[serde(rename = "static", default)]
        is_static: bool,
    },
    Handle {
        owner: String,
        name: String,
        descriptor: String,
        #[serde(rename = "static", default)]
        is_static: bool,
        #[serde(default)]
        captured: usize,
    },
    GetStatic {
        owner: String,
        name: String,
        #[serde(rename = "type")]
        type_name: String,
    },
    Return {
        #[serde(default)]
        value: bool,
    },
    Throw,
    Handler,
    Sized {
        opcode: u8,
        popped: usize,
        pushed: usize,
    },
    Other {
        opcode: u8,
    },
}

#[derive(Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
enum RawConstant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(String),
    Null,
}

impl RawConstant {
    fn into_constant(self) -> Constant {
        match self {
            RawConstant::Int(value) => Constant::Int(value),
            RawConstant::Long(value) => Constant::Long(value),
            RawConstant::Float(value) => Constant::Float(value),
            RawConstant::Double(value) => Constant::Double(value),
            RawConstant::String(value) => Constant::Str(value),
            RawConstant::Class(name) => Constant::ClassLiteral(dotted(&name)),
            RawConstant::Null => Constant::Null,
        }
    }
}
