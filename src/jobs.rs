use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Mutex;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::element::{Element, JsonValue, PossibleValue};
use crate::model::MethodIdentifier;
use crate::reduce::reduce;
use crate::resolve::{ProjectClass, ProjectIndex, is_response_type};
use crate::simulate::simulate;

/// Analyzed surface of one project method: REST metadata forwarded from the
/// reader plus everything simulation learned about its outcomes.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MethodReport {
    pub(crate) class_name: String,
    pub(crate) method_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) path: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) consumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) produces: Vec<String>,
    pub(crate) statuses: BTreeSet<i64>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub(crate) headers: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub(crate) content_types: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub(crate) entity_types: BTreeSet<String>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub(crate) return_types: BTreeSet<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub(crate) entity_samples: Vec<serde_json::Value>,
}

/// Whole-project analysis output, ordered structurally.
#[derive(Clone, Debug, Serialize)]
pub(crate) struct ProjectReport {
    pub(crate) methods: Vec<MethodReport>,
}

/// Class names awaiting analysis. Explicitly owned by the orchestrator and
/// passed where needed; duplicate scheduling is suppressed by the seen set.
pub(crate) struct JobQueue {
    state: Mutex<QueueState>,
}

struct QueueState {
    pending: VecDeque<String>,
    seen: BTreeSet<String>,
}

impl JobQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                seen: BTreeSet::new(),
            }),
        }
    }

    /// Schedules a class unless it was ever scheduled before.
    pub(crate) fn push(&self, class_name: &str) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.seen.insert(class_name.to_string()) {
            state.pending.push_back(class_name.to_string());
        }
    }

    /// Takes everything scheduled so far as one analysis round.
    pub(crate) fn drain_round(&self) -> Vec<String> {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.pending.drain(..).collect()
    }
}

/// Analyzes the project in rounds: REST-annotated root classes seed the
/// queue, each round runs class jobs in parallel, and sub-resource classes
/// discovered while simulating locators feed later rounds.
pub(crate) fn analyze_project(classes: &[ProjectClass]) -> ProjectReport {
    let index = ProjectIndex::new(classes);
    let by_name: BTreeMap<&str, &ProjectClass> = classes
        .iter()
        .map(|class| (class.name.as_str(), class))
        .collect();

    // A model with no REST metadata at all still gets analyzed wholesale.
    let has_rest = classes
        .iter()
        .any(|class| class.methods.iter().any(|method| method.rest.is_some()));
    let queue = JobQueue::new();
    for class in classes {
        if !has_rest || class.methods.iter().any(|method| method.rest.is_some()) {
            queue.push(&class.name);
        }
    }
    run_rounds(queue, &by_name, &index)
}

fn run_rounds(
    queue: JobQueue,
    by_name: &BTreeMap<&str, &ProjectClass>,
    index: &ProjectIndex,
) -> ProjectReport {
    let mut reports: Vec<MethodReport> = Vec::new();
    let mut round_number = 0;
    loop {
        let round = queue.drain_round();
        if round.is_empty() {
            break;
        }
        round_number += 1;
        info!("analysis round {round_number}: {} classes", round.len());

        let outcomes: Vec<ClassOutcome> = round
            .par_iter()
            .filter_map(|class_name| {
                by_name
                    .get(class_name.as_str())
                    .map(|class| analyze_class(class, index))
            })
            .collect();

        for outcome in outcomes {
            for discovered in &outcome.discovered {
                if by_name.contains_key(discovered.as_str()) {
                    debug!("scheduling sub-resource class {discovered}");
                    queue.push(discovered);
                }
            }
            reports.extend(outcome.reports);
        }
    }

    reports.sort_by(|a, b| {
        (&a.class_name, &a.method_name).cmp(&(&b.class_name, &b.method_name))
    });
    ProjectReport { methods: reports }
}

struct ClassOutcome {
    reports: Vec<MethodReport>,
    discovered: BTreeSet<String>,
}

/// One class job: reduce and simulate every method. A failing method is
/// abandoned with an empty result; the rest of the class still reports.
fn analyze_class(class: &ProjectClass, index: &ProjectIndex) -> ClassOutcome {
    let mut reports = Vec::new();
    let mut discovered = BTreeSet::new();

    for method in &class.methods {
        let elements = match reduce(&method.instructions)
            .and_then(|reduced| simulate(index, &reduced))
        {
            Ok(result) => result.elements,
            Err(failure) => {
                error!(
                    "abandoning {}.{}: {failure:#}",
                    class.name, method.identifier.method_name
                );
                BTreeSet::new()
            }
        };

        // Sub-resource locators: a returned project-class type schedules
        // that class for a later round.
        for element in &elements {
            if !is_response_type(&element.type_name) && element.type_name != class.name {
                discovered.insert(element.type_name.clone());
            }
        }

        reports.push(build_report(&class.name, &method.identifier, method, &elements));
    }

    ClassOutcome {
        reports,
        discovered,
    }
}

fn build_report(
    class_name: &str,
    identifier: &MethodIdentifier,
    method: &crate::resolve::ProjectMethod,
    elements: &BTreeSet<Element>,
) -> MethodReport {
    let mut report = MethodReport {
        class_name: class_name.to_string(),
        method_name: identifier.method_name.clone(),
        http_method: method.rest.as_ref().map(|rest| rest.http_method.clone()),
        path: method.rest.as_ref().map(|rest| rest.path.clone()),
        consumes: method
            .rest
            .as_ref()
            .map(|rest| rest.consumes.clone())
            .unwrap_or_default(),
        produces: method
            .rest
            .as_ref()
            .map(|rest| rest.produces.clone())
            .unwrap_or_default(),
        statuses: BTreeSet::new(),
        headers: BTreeSet::new(),
        content_types: BTreeSet::new(),
        entity_types: BTreeSet::new(),
        return_types: BTreeSet::new(),
        entity_samples: Vec::new(),
    };

    for element in elements {
        report.return_types.insert(element.type_name.clone());
        for response in element.responses() {
            report.statuses.extend(response.statuses.iter().copied());
            report.headers.extend(response.headers.iter().cloned());
            report
                .content_types
                .extend(response.content_types.iter().cloned());
            report
                .entity_types
                .extend(response.entity_types.iter().cloned());
            for entity in &response.inline_entities {
                report.entity_samples.push(render_json(entity));
            }
        }
        for json in element.json_values() {
            report.entity_samples.push(render_json(json));
        }
    }
    report
}

/// Rendered sample of an observed JSON tree. Known constants appear
/// literally; anything diffuse falls back to its type name.
fn render_json(value: &JsonValue) -> serde_json::Value {
    match value {
        JsonValue::Object(structure) => serde_json::Value::Object(
            structure
                .iter()
                .map(|(key, element)| (key.clone(), render_element(element)))
                .collect(),
        ),
        JsonValue::Array(elements) => {
            serde_json::Value::Array(elements.iter().map(render_element).collect())
        }
    }
}

fn render_element(element: &Element) -> serde_json::Value {
    if element.values.len() == 1 {
        match element.values.iter().next() {
            Some(PossibleValue::Constant(constant)) => {
                if let Some(number) = constant.integral() {
                    return serde_json::Value::Number(number.into());
                }
                if let crate::model::Constant::Str(text) = constant {
                    return serde_json::Value::String(text.clone());
                }
            }
            Some(PossibleValue::Json(json)) => return render_json(json),
            _ => {}
        }
    }
    serde_json::Value::String(element.type_name.clone())
}
