use std::collections::BTreeSet;

use osm_reader::{Element, ElementId, ElementKind};

use crate::{City, CriticalValidationError};

/// How bad a validation message is. Errors invalidate the city; warnings
/// and notices do not.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Notice,
}

/// The element a message is about, kept as structured data. Rendering into
/// the `message (relation 123, "name")` form happens only at the output
/// boundary.
#[derive(Clone, Debug)]
pub struct MessageContext {
    pub kind: &'static str,
    pub id: i64,
    pub name: String,
}

impl MessageContext {
    fn from_element(el: &Element) -> MessageContext {
        MessageContext {
            kind: el.id.kind.name(),
            id: el.id.id,
            name: el
                .tags
                .get("name")
                .or_else(|| el.tags.get("ref"))
                .cloned()
                .unwrap_or_default(),
        }
    }

    fn from_id(id: ElementId) -> MessageContext {
        MessageContext {
            kind: id.kind.name(),
            id: id.id,
            name: String::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ValidationMessage {
    pub severity: Severity,
    pub text: String,
    pub context: Option<MessageContext>,
}

impl ValidationMessage {
    pub fn render(&self) -> String {
        match &self.context {
            Some(ctx) => format!("{} ({} {}, \"{}\")", self.text, ctx.kind, ctx.id, ctx.name),
            None => self.text.clone(),
        }
    }
}

/// Per-city accumulator for the three message severities.
#[derive(Clone, Debug, Default)]
pub struct ValidationLog {
    messages: Vec<ValidationMessage>,
}

impl ValidationLog {
    pub fn new() -> ValidationLog {
        ValidationLog::default()
    }

    /// A critical problem that invalidates the city.
    pub fn error(&mut self, text: impl Into<String>, el: Option<&Element>) {
        self.push(Severity::Error, text, el);
    }

    /// Definitely a problem, but doesn't prevent building an output file
    /// and doesn't invalidate the city.
    pub fn warn(&mut self, text: impl Into<String>, el: Option<&Element>) {
        self.push(Severity::Warning, text, el);
    }

    /// May point to a potential problem.
    pub fn notice(&mut self, text: impl Into<String>, el: Option<&Element>) {
        self.push(Severity::Notice, text, el);
    }

    /// Like `error`, for when only the id of the offending object is at
    /// hand.
    pub fn error_for_id(&mut self, text: impl Into<String>, id: ElementId) {
        self.messages.push(ValidationMessage {
            severity: Severity::Error,
            text: text.into(),
            context: Some(MessageContext::from_id(id)),
        });
    }

    fn push(&mut self, severity: Severity, text: impl Into<String>, el: Option<&Element>) {
        self.messages.push(ValidationMessage {
            severity,
            text: text.into(),
            context: el.map(MessageContext::from_element),
        });
    }

    pub fn messages(&self) -> &[ValidationMessage] {
        &self.messages
    }

    fn rendered(&self, severity: Severity) -> Vec<String> {
        self.messages
            .iter()
            .filter(|m| m.severity == severity)
            .map(|m| m.render())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.rendered(Severity::Error)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.rendered(Severity::Warning)
    }

    pub fn notices(&self) -> Vec<String> {
        self.rendered(Severity::Notice)
    }

    pub fn has_errors(&self) -> bool {
        self.messages.iter().any(|m| m.severity == Severity::Error)
    }
}

/// Sorts elements into cities by bbox containment. An element may land in
/// several cities.
pub fn add_osm_elements_to_cities(elements: &[Element], cities: &mut [City]) {
    for el in elements {
        for city in cities.iter_mut() {
            if city.contains(el) {
                city.add(el);
            }
        }
    }
}

/// Validates each city in turn. Exceptions never cross city boundaries: a
/// critical validation error or an internal logic error becomes a single
/// error entry on the offending city.
pub fn validate_cities(cities: &mut [City]) {
    for city in cities {
        match city.extract_routes() {
            Err(err) => {
                if let Some(critical) = err.downcast_ref::<CriticalValidationError>() {
                    error!(
                        "Critical validation error while processing {}: {}",
                        city.name, critical
                    );
                    city.log.error(critical.to_string(), None);
                } else {
                    error!(
                        "Validation logic error while processing {}: {}",
                        city.name, err
                    );
                    city.log
                        .error(format!("Validation logic error: {}", err), None);
                }
            }
            Ok(()) => {
                city.validate();
                if city.is_good() {
                    city.calculate_distances();
                }
            }
        }
    }
}

/// Collects global interchanges from stop_area_group relations, keeping
/// only members that belong to some validated city. Cities may share a stop
/// area near their bbox boundary, so this works on ids, not objects.
pub fn find_transfers(elements: &[Element], cities: &[City]) -> Vec<BTreeSet<ElementId>> {
    let mut stopareas_in_good_cities: BTreeSet<ElementId> = BTreeSet::new();
    for city in cities {
        if city.is_good() {
            stopareas_in_good_cities.extend(city.stopareas());
        }
    }

    let mut transfers = Vec::new();
    for el in elements {
        if el.id.kind != ElementKind::Relation
            || el.members().is_empty()
            || !el.tags.is("public_transport", "stop_area_group")
        {
            continue;
        }
        let transfer: BTreeSet<ElementId> = el
            .members()
            .iter()
            .map(|m| m.element_id())
            .filter(|id| stopareas_in_good_cities.contains(id))
            .collect();
        if transfer.len() > 1 {
            transfers.push(transfer);
        }
    }
    transfers
}
