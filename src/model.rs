use std::cmp::Ordering;
use std::fmt;

/// JVM opcodes that survive reduction as `SizeChanging` operations and the
/// ones the reducer is allowed to discard outright.
pub(crate) mod opcodes {
    pub(crate) const IADD: u8 = 0x60;
    pub(crate) const LADD: u8 = 0x61;
    pub(crate) const ISUB: u8 = 0x64;
    pub(crate) const LSUB: u8 = 0x65;
    pub(crate) const IMUL: u8 = 0x68;
    pub(crate) const LMUL: u8 = 0x69;
    pub(crate) const IDIV: u8 = 0x6c;
    pub(crate) const LDIV: u8 = 0x6d;
    pub(crate) const IREM: u8 = 0x70;
    pub(crate) const LREM: u8 = 0x71;
    pub(crate) const INEG: u8 = 0x74;
    pub(crate) const LNEG: u8 = 0x75;
    pub(crate) const LCMP: u8 = 0x94;
    pub(crate) const MONITORENTER: u8 = 0xc2;
    pub(crate) const MONITOREXIT: u8 = 0xc3;
}

/// Well-known Java type names the simulator keys its domain knowledge on.
pub(crate) mod types {
    pub(crate) const PRIMITIVE_INT: &str = "int";
    pub(crate) const PRIMITIVE_LONG: &str = "long";
    pub(crate) const PRIMITIVE_DOUBLE: &str = "double";
    pub(crate) const OBJECT: &str = "java.lang.Object";
    pub(crate) const STRING: &str = "java.lang.String";
    pub(crate) const THROWABLE: &str = "java.lang.Throwable";
    pub(crate) const RESPONSE: &str = "javax.ws.rs.core.Response";
    pub(crate) const RESPONSE_BUILDER: &str = "javax.ws.rs.core.Response$ResponseBuilder";
    pub(crate) const RESPONSE_STATUS: &str = "javax.ws.rs.core.Response$Status";
    pub(crate) const WEB_APPLICATION_EXCEPTION: &str = "javax.ws.rs.WebApplicationException";
    pub(crate) const JSON: &str = "javax.json.Json";
    pub(crate) const JSON_OBJECT_BUILDER: &str = "javax.json.JsonObjectBuilder";
    pub(crate) const JSON_ARRAY_BUILDER: &str = "javax.json.JsonArrayBuilder";
    pub(crate) const JSON_STRUCTURE: &str = "javax.json.JsonStructure";
}

/// Literal pushed by a `Push` instruction or recognized static field read.
#[derive(Clone, Debug)]
pub(crate) enum Constant {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    ClassLiteral(String),
    Null,
}

impl Constant {
    /// Integral view used by constant folding and status-code extraction.
    pub(crate) fn integral(&self) -> Option<i64> {
        match self {
            Constant::Int(value) => Some(i64::from(*value)),
            Constant::Long(value) => Some(*value),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Constant::Int(_) => 0,
            Constant::Long(_) => 1,
            Constant::Float(_) => 2,
            Constant::Double(_) => 3,
            Constant::Str(_) => 4,
            Constant::ClassLiteral(_) => 5,
            Constant::Null => 6,
        }
    }
}

// Float literals must live inside ordered sets, so ordering is total_cmp
// based rather than derived.
impl PartialEq for Constant {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Constant {}

impl PartialOrd for Constant {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Constant {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Constant::Int(left), Constant::Int(right)) => left.cmp(right),
            (Constant::Long(left), Constant::Long(right)) => left.cmp(right),
            (Constant::Float(left), Constant::Float(right)) => left.total_cmp(right),
            (Constant::Double(left), Constant::Double(right)) => left.total_cmp(right),
            (Constant::Str(left), Constant::Str(right)) => left.cmp(right),
            (Constant::ClassLiteral(left), Constant::ClassLiteral(right)) => left.cmp(right),
            (Constant::Null, Constant::Null) => Ordering::Equal,
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int(value) => write!(f, "{value}"),
            Constant::Long(value) => write!(f, "{value}"),
            Constant::Float(value) => write!(f, "{value}"),
            Constant::Double(value) => write!(f, "{value}"),
            Constant::Str(value) => write!(f, "{value:?}"),
            Constant::ClassLiteral(value) => write!(f, "{value}.class"),
            Constant::Null => write!(f, "null"),
        }
    }
}

/// Structural identity of a callable. Used as the visited-set key that
/// bounds recursive project-method simulation.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct MethodIdentifier {
    pub(crate) class_name: String,
    pub(crate) method_name: String,
    /// Declared return type; `None` for void.
    pub(crate) return_type: Option<String>,
    pub(crate) is_static: bool,
    pub(crate) parameter_types: Vec<String>,
}

impl MethodIdentifier {
    /// Stack slots consumed at an invoke site: arguments plus receiver.
    pub(crate) fn popped(&self) -> usize {
        self.parameter_types.len() + usize::from(!self.is_static)
    }

    pub(crate) fn pushed(&self) -> usize {
        usize::from(self.return_type.is_some())
    }
}

impl fmt::Display for MethodIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}({})",
            self.class_name,
            self.method_name,
            self.parameter_types.join(", ")
        )
    }
}

/// One simplified bytecode operation as emitted by the bytecode reader.
///
/// Post-reduction, branches are encoded as concatenated alternative paths
/// rather than explicit jump targets, so no instruction carries a target
/// offset.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Instruction {
    Push(Constant),
    Load {
        slot: usize,
        type_name: String,
        variable_name: Option<String>,
    },
    Store {
        slot: usize,
        type_name: String,
        variable_name: Option<String>,
    },
    Dup,
    Invoke(MethodIdentifier),
    /// Bound lambda/method-reference creation, modeled as a clean symbolic
    /// operation by the bytecode reader instead of raw bootstrap metadata.
    CreateHandle {
        target: MethodIdentifier,
        captured: usize,
    },
    GetStatic {
        class_name: String,
        field_name: String,
        type_name: String,
    },
    Return {
        has_value: bool,
    },
    Throw,
    /// Start of an exception handler region; the simulator resets the
    /// operand stack to a single synthetic exception value here.
    ExceptionHandler,
    /// Generic fallback for opcodes that only change stack depth by a known
    /// amount. Folded to a constant when every operand is a known numeric.
    SizeChanging {
        opcode: u8,
        popped: usize,
        pushed: usize,
    },
    /// Flow-irrelevant opcode kept only for structural completeness.
    Default {
        opcode: u8,
    },
}

impl Instruction {
    /// Stack slots this instruction consumes. Fixed and statically known for
    /// every variant; the reducer relies on this to validate its output.
    pub(crate) fn popped(&self) -> usize {
        match self {
            Instruction::Push(_)
            | Instruction::Load { .. }
            | Instruction::GetStatic { .. }
            | Instruction::ExceptionHandler
            | Instruction::Default { .. } => 0,
            Instruction::Store { .. } | Instruction::Throw => 1,
            Instruction::Dup => 1,
            Instruction::Invoke(identifier) => identifier.popped(),
            Instruction::CreateHandle { captured, .. } => *captured,
            Instruction::Return { has_value } => usize::from(*has_value),
            Instruction::SizeChanging { popped, .. } => *popped,
        }
    }

    /// Stack slots this instruction produces.
    pub(crate) fn pushed(&self) -> usize {
        match self {
            Instruction::Push(_)
            | Instruction::Load { .. }
            | Instruction::GetStatic { .. }
            | Instruction::CreateHandle { .. }
            | Instruction::ExceptionHandler => 1,
            Instruction::Dup => 2,
            Instruction::Invoke(identifier) => identifier.pushed(),
            Instruction::Store { .. }
            | Instruction::Return { .. }
            | Instruction::Throw
            | Instruction::Default { .. } => 0,
            Instruction::SizeChanging { pushed, .. } => *pushed,
        }
    }
}
