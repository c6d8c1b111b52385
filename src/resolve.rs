use std::collections::BTreeMap;

use crate::model::{Instruction, MethodIdentifier, types};

/// REST metadata attached to a method by the external annotation
/// interpreter. Carried through verbatim; the core never inspects
/// annotations itself.
#[derive(Clone, Debug)]
pub(crate) struct RestMetadata {
    pub(crate) http_method: String,
    pub(crate) path: String,
    pub(crate) consumes: Vec<String>,
    pub(crate) produces: Vec<String>,
}

/// A method defined in the analyzed project, with its simplified
/// instruction sequence.
#[derive(Clone, Debug)]
pub(crate) struct ProjectMethod {
    pub(crate) identifier: MethodIdentifier,
    pub(crate) instructions: Vec<Instruction>,
    pub(crate) rest: Option<RestMetadata>,
}

/// A class of the analyzed project as delivered by the bytecode reader.
#[derive(Clone, Debug)]
pub(crate) struct ProjectClass {
    pub(crate) name: String,
    pub(crate) methods: Vec<ProjectMethod>,
}

/// What an invoke target resolved to.
pub(crate) enum Resolution<'a> {
    /// Known external API shape with fixed symbolic semantics.
    Builtin(Builtin),
    /// Project-defined method whose body is simulated recursively.
    Project(&'a ProjectMethod),
    /// Opaque external call; degrades to an unknown value of the declared
    /// return type.
    Unknown,
}

/// Index of every project-defined method, keyed structurally.
pub(crate) struct ProjectIndex {
    methods: BTreeMap<MethodIdentifier, ProjectMethod>,
}

impl ProjectIndex {
    pub(crate) fn new(classes: &[ProjectClass]) -> Self {
        let mut methods = BTreeMap::new();
        for class in classes {
            for method in &class.methods {
                methods.insert(method.identifier.clone(), method.clone());
            }
        }
        Self { methods }
    }

    pub(crate) fn resolve(&self, identifier: &MethodIdentifier) -> Resolution<'_> {
        if let Some(builtin) = known_builtin(identifier) {
            return Resolution::Builtin(builtin);
        }
        match self.methods.get(identifier) {
            Some(method) => Resolution::Project(method),
            None => Resolution::Unknown,
        }
    }

    pub(crate) fn project_method(&self, identifier: &MethodIdentifier) -> Option<&ProjectMethod> {
        self.methods.get(identifier)
    }
}

/// External API shapes the simulator models directly instead of resolving.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum Builtin {
    /// `Response.status(x)` — response builder carrying status x.
    ResponseStatus,
    /// `Response.ok([entity[, mediaType]])` — builder with status 200.
    ResponseOk,
    /// Shorthand static factories with a fixed status code.
    ResponseFixed(i64),
    /// `ResponseBuilder.build()` — finalize into a Response value.
    BuilderBuild,
    /// `ResponseBuilder.status(x)` — replace statuses.
    BuilderStatus,
    /// `ResponseBuilder.header(name, value)`.
    BuilderHeader,
    /// `ResponseBuilder.entity(obj)`.
    BuilderEntity,
    /// `ResponseBuilder.type(mediaType)`.
    BuilderType,
    /// `Json.createObjectBuilder()`.
    CreateObjectBuilder,
    /// `Json.createArrayBuilder()`.
    CreateArrayBuilder,
    /// `JsonObjectBuilder.add(name, value)`.
    ObjectBuilderAdd,
    /// `JsonArrayBuilder.add(value)`.
    ArrayBuilderAdd,
    /// `Json*Builder.build()` — the built structure is the builder's tree.
    JsonBuild,
    /// Primitive boxing; the argument passes through unchanged.
    Boxing,
    /// `Response.Status.getStatusCode()`.
    StatusGetCode,
    /// `WebApplicationException` constructors carrying a status/response.
    WebApplicationExceptionInit,
}

/// Looks up fixed domain knowledge for an external callable. The jakarta
/// and javax namespaces are equivalent here.
pub(crate) fn known_builtin(identifier: &MethodIdentifier) -> Option<Builtin> {
    let class_name = normalized(&identifier.class_name);
    let method = identifier.method_name.as_str();
    let builtin = match class_name.as_str() {
        types::RESPONSE => match method {
            "status" => Builtin::ResponseStatus,
            "ok" => Builtin::ResponseOk,
            "noContent" => Builtin::ResponseFixed(204),
            "accepted" => Builtin::ResponseFixed(202),
            "created" => Builtin::ResponseFixed(201),
            "notAcceptable" => Builtin::ResponseFixed(406),
            "serverError" => Builtin::ResponseFixed(500),
            _ => return None,
        },
        types::RESPONSE_BUILDER => match method {
            "build" => Builtin::BuilderBuild,
            "status" => Builtin::BuilderStatus,
            "header" => Builtin::BuilderHeader,
            "entity" => Builtin::BuilderEntity,
            "type" => Builtin::BuilderType,
            _ => return None,
        },
        types::RESPONSE_STATUS => match method {
            "getStatusCode" => Builtin::StatusGetCode,
            _ => return None,
        },
        types::JSON => match method {
            "createObjectBuilder" => Builtin::CreateObjectBuilder,
            "createArrayBuilder" => Builtin::CreateArrayBuilder,
            _ => return None,
        },
        types::JSON_OBJECT_BUILDER => match method {
            "add" => Builtin::ObjectBuilderAdd,
            "build" => Builtin::JsonBuild,
            _ => return None,
        },
        types::JSON_ARRAY_BUILDER => match method {
            "add" => Builtin::ArrayBuilderAdd,
            "build" => Builtin::JsonBuild,
            _ => return None,
        },
        types::WEB_APPLICATION_EXCEPTION => match method {
            "<init>" => Builtin::WebApplicationExceptionInit,
            _ => return None,
        },
        "java.lang.Integer" | "java.lang.Long" | "java.lang.Short" | "java.lang.Byte"
        | "java.lang.Double" | "java.lang.Float" | "java.lang.Boolean"
        | "java.lang.Character" => match method {
            "valueOf" => Builtin::Boxing,
            _ => return None,
        },
        _ => return None,
    };
    Some(builtin)
}

/// Numeric status of a recognized `Response.Status` enum constant.
pub(crate) fn status_constant(class_name: &str, field_name: &str) -> Option<i64> {
    if normalized(class_name) != types::RESPONSE_STATUS {
        return None;
    }
    let code = match field_name {
        "OK" => 200,
        "CREATED" => 201,
        "ACCEPTED" => 202,
        "NO_CONTENT" => 204,
        "RESET_CONTENT" => 205,
        "PARTIAL_CONTENT" => 206,
        "MOVED_PERMANENTLY" => 301,
        "FOUND" => 302,
        "SEE_OTHER" => 303,
        "NOT_MODIFIED" => 304,
        "TEMPORARY_REDIRECT" => 307,
        "BAD_REQUEST" => 400,
        "UNAUTHORIZED" => 401,
        "PAYMENT_REQUIRED" => 402,
        "FORBIDDEN" => 403,
        "NOT_FOUND" => 404,
        "METHOD_NOT_ALLOWED" => 405,
        "NOT_ACCEPTABLE" => 406,
        "PROXY_AUTHENTICATION_REQUIRED" => 407,
        "REQUEST_TIMEOUT" => 408,
        "CONFLICT" => 409,
        "GONE" => 410,
        "PRECONDITION_FAILED" => 412,
        "UNSUPPORTED_MEDIA_TYPE" => 415,
        "INTERNAL_SERVER_ERROR" => 500,
        "NOT_IMPLEMENTED" => 501,
        "BAD_GATEWAY" => 502,
        "SERVICE_UNAVAILABLE" => 503,
        "GATEWAY_TIMEOUT" => 504,
        _ => return None,
    };
    Some(code)
}

/// Response-ish declared types that mark a method as producing HTTP
/// responses directly.
pub(crate) fn is_response_type(type_name: &str) -> bool {
    let normalized = normalized(type_name);
    normalized == types::RESPONSE || normalized == types::RESPONSE_BUILDER
}

fn normalized(class_name: &str) -> String {
    match class_name.strip_prefix("jakarta.") {
        Some(rest) => format!("javax.{rest}"),
        None => class_name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{Builtin, known_builtin, status_constant};
    use crate::model::test_support::identifier;
    use crate::model::types;

    #[test]
    fn response_factories_resolve_to_builtins() {
        let status = identifier(
            types::RESPONSE,
            "status",
            Some(types::RESPONSE_BUILDER),
            true,
            &["int"],
        );
        assert_eq!(known_builtin(&status), Some(Builtin::ResponseStatus));

        let no_content = identifier(
            types::RESPONSE,
            "noContent",
            Some(types::RESPONSE_BUILDER),
            true,
            &[],
        );
        assert_eq!(known_builtin(&no_content), Some(Builtin::ResponseFixed(204)));
    }

    #[test]
    fn jakarta_namespace_is_equivalent() {
        let build = identifier(
            "jakarta.ws.rs.core.Response$ResponseBuilder",
            "build",
            Some("jakarta.ws.rs.core.Response"),
            false,
            &[],
        );
        assert_eq!(known_builtin(&build), Some(Builtin::BuilderBuild));
        assert_eq!(
            status_constant("jakarta.ws.rs.core.Response$Status", "NOT_FOUND"),
            Some(404)
        );
    }

    #[test]
    fn unknown_externals_are_not_builtins() {
        let other = identifier("com.example.Orders", "load", Some(types::RESPONSE), false, &[]);
        assert_eq!(known_builtin(&other), None);
        assert_eq!(status_constant("com.example.Codes", "OK"), None);
    }
}
