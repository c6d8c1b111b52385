use std::collections::{BTreeMap, BTreeSet};

use crate::model::{Constant, MethodIdentifier};

/// Symbolic runtime value: a type tag plus the set of values a stack slot or
/// local may concretely hold at a program point. An element with an empty
/// value set is "unknown" — the type is all the analysis can say.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct Element {
    pub(crate) type_name: String,
    pub(crate) values: BTreeSet<PossibleValue>,
}

/// One member of an element's possible-value set.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum PossibleValue {
    Constant(Constant),
    Json(JsonValue),
    Response(HttpResponse),
    Handle(MethodHandle),
}

impl Element {
    pub(crate) fn unknown(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            values: BTreeSet::new(),
        }
    }

    pub(crate) fn of(type_name: impl Into<String>, value: PossibleValue) -> Self {
        let mut values = BTreeSet::new();
        values.insert(value);
        Self {
            type_name: type_name.into(),
            values,
        }
    }

    pub(crate) fn constant(type_name: impl Into<String>, constant: Constant) -> Self {
        Self::of(type_name, PossibleValue::Constant(constant))
    }

    /// Union of possible values. The receiver's type is retained; merging
    /// never unifies heterogeneous types.
    pub(crate) fn merge(&mut self, other: &Element) {
        for value in &other.values {
            self.values.insert(value.clone());
        }
    }

    /// The single known integral value, when the set holds exactly one.
    /// Constant folding and status extraction refuse anything more diffuse.
    pub(crate) fn single_integral(&self) -> Option<i64> {
        if self.values.len() != 1 {
            return None;
        }
        match self.values.iter().next() {
            Some(PossibleValue::Constant(constant)) => constant.integral(),
            _ => None,
        }
    }

    /// All string constants in the value set, for header/media-type names.
    pub(crate) fn string_values(&self) -> Vec<String> {
        self.values
            .iter()
            .filter_map(|value| match value {
                PossibleValue::Constant(Constant::Str(text)) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn responses(&self) -> Vec<&HttpResponse> {
        self.values
            .iter()
            .filter_map(|value| match value {
                PossibleValue::Response(response) => Some(response),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn handles(&self) -> Vec<&MethodHandle> {
        self.values
            .iter()
            .filter_map(|value| match value {
                PossibleValue::Handle(handle) => Some(handle),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn json_values(&self) -> Vec<&JsonValue> {
        self.values
            .iter()
            .filter_map(|value| match value {
                PossibleValue::Json(json) => Some(json),
                _ => None,
            })
            .collect()
    }
}

/// Bound lambda or method reference. Invocation resolves across every
/// possible identifier, prepending the transferred arguments captured at
/// creation time to the arguments supplied at the call site. Handles from
/// different branches stay distinct set members; invocation covers them all.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct MethodHandle {
    pub(crate) identifiers: BTreeSet<MethodIdentifier>,
    pub(crate) transferred: Vec<Element>,
}

impl MethodHandle {
    pub(crate) fn new(target: MethodIdentifier, transferred: Vec<Element>) -> Self {
        let mut identifiers = BTreeSet::new();
        identifiers.insert(target);
        Self {
            identifiers,
            transferred,
        }
    }
}

/// JSON tree observed while simulating javax.json builder chains.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) enum JsonValue {
    Object(BTreeMap<String, Element>),
    Array(Vec<Element>),
}

impl JsonValue {
    pub(crate) fn empty_object() -> Self {
        JsonValue::Object(BTreeMap::new())
    }

    pub(crate) fn empty_array() -> Self {
        JsonValue::Array(Vec::new())
    }

    /// Control-flow reconciliation of two JSON trees of the same shape.
    ///
    /// Objects union key-wise (colliding keys merge their elements). Arrays
    /// concatenate without deduplication: each branch contributes its
    /// elements literally. The asymmetry with set-union merging elsewhere is
    /// intentional and load-bearing for rendered array samples.
    pub(crate) fn merge(&mut self, other: &JsonValue) {
        match (self, other) {
            (JsonValue::Object(structure), JsonValue::Object(additions)) => {
                for (key, element) in additions {
                    match structure.get_mut(key) {
                        Some(existing) => existing.merge(element),
                        None => {
                            structure.insert(key.clone(), element.clone());
                        }
                    }
                }
            }
            (JsonValue::Array(elements), JsonValue::Array(additions)) => {
                elements.extend(additions.iter().cloned());
            }
            // Shape mismatch across branches; keep the receiver.
            _ => {}
        }
    }

    /// Sequential write into an object: last writer per key wins. Merging is
    /// reserved for branch reconciliation.
    pub(crate) fn write_key(&mut self, key: &str, element: Element) {
        if let JsonValue::Object(structure) = self {
            structure.insert(key.to_string(), element);
        }
    }

    pub(crate) fn append(&mut self, element: Element) {
        if let JsonValue::Array(elements) = self {
            elements.push(element);
        }
    }
}

/// Everything the analysis learned about one possible HTTP response.
#[derive(Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub(crate) struct HttpResponse {
    pub(crate) statuses: BTreeSet<i64>,
    pub(crate) headers: BTreeSet<String>,
    pub(crate) entity_types: BTreeSet<String>,
    pub(crate) content_types: BTreeSet<String>,
    pub(crate) inline_entities: BTreeSet<JsonValue>,
}

impl HttpResponse {
    pub(crate) fn with_status(status: i64) -> Self {
        let mut response = Self::default();
        response.statuses.insert(status);
        response
    }

    pub(crate) fn merge(&mut self, other: &HttpResponse) {
        self.statuses.extend(other.statuses.iter().copied());
        self.headers.extend(other.headers.iter().cloned());
        self.entity_types.extend(other.entity_types.iter().cloned());
        self.content_types.extend(other.content_types.iter().cloned());
        self.inline_entities
            .extend(other.inline_entities.iter().cloned());
    }
}
