use std::str::FromStr;

use anyhow::{Context, Result};
use jdescriptor::{MethodDescriptor, TypeDescriptor};

/// Parameter type names of a JVM method descriptor, as dotted Java names.
pub(crate) fn parameter_type_names(descriptor: &str) -> Result<Vec<String>> {
    let descriptor = MethodDescriptor::from_str(descriptor).context("parse method descriptor")?;
    Ok(descriptor.parameter_types().iter().map(type_name).collect())
}

/// Return type name of a JVM method descriptor; `None` for void.
pub(crate) fn return_type_name(descriptor: &str) -> Result<Option<String>> {
    let descriptor = MethodDescriptor::from_str(descriptor).context("parse method descriptor")?;
    Ok(match descriptor.return_type() {
        TypeDescriptor::Void => None,
        other => Some(type_name(other)),
    })
}

/// Field or single-type descriptor as a dotted Java name.
pub(crate) fn field_type_name(descriptor: &str) -> Result<String> {
    let descriptor = TypeDescriptor::from_str(descriptor).context("parse type descriptor")?;
    Ok(type_name(&descriptor))
}

// Nested-class separators ($) stay as-is so Response$Status keeps its
// binary name.
fn type_name(descriptor: &TypeDescriptor) -> String {
    match descriptor {
        TypeDescriptor::Byte => "byte".to_string(),
        TypeDescriptor::Char => "char".to_string(),
        TypeDescriptor::Double => "double".to_string(),
        TypeDescriptor::Float => "float".to_string(),
        TypeDescriptor::Integer => "int".to_string(),
        TypeDescriptor::Long => "long".to_string(),
        TypeDescriptor::Short => "short".to_string(),
        TypeDescriptor::Boolean => "boolean".to_string(),
        TypeDescriptor::Void => "void".to_string(),
        TypeDescriptor::Object(name) => name.replace('/', "."),
        TypeDescriptor::Array(inner, dimensions) => {
            let mut name = type_name(inner);
            for _ in 0..*dimensions {
                name.push_str("[]");
            }
            name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{field_type_name, parameter_type_names, return_type_name};

    #[test]
    fn parses_parameter_names() {
        let names = parameter_type_names("(ILjava/lang/String;[B)V").expect("parse descriptor");
        assert_eq!(names, ["int", "java.lang.String", "byte[]"]);
    }

    #[test]
    fn void_return_is_none() {
        assert_eq!(return_type_name("()V").expect("parse descriptor"), None);
        assert_eq!(
            return_type_name("()Ljavax/ws/rs/core/Response;").expect("parse descriptor"),
            Some("javax.ws.rs.core.Response".to_string())
        );
    }

    #[test]
    fn nested_class_keeps_binary_name() {
        assert_eq!(
            field_type_name("Ljavax/ws/rs/core/Response$Status;").expect("parse descriptor"),
            "javax.ws.rs.core.Response$Status"
        );
        assert_eq!(field_type_name("J").expect("parse descriptor"), "long");
    }
}
