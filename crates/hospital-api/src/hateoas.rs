//! Hypermedia link builder.
//!
//! Every response carries a `_links` object. Entity and collection links are
//! absolute and resolved against the base URL of the current request; error
//! links are relative to the server root.

use axum::http::{Method, StatusCode};
use hospital_storage::{Patient, Prescription, Report, Visit};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub templated: Option<bool>,
}

impl Link {
    pub fn new(href: impl Into<String>, method: &Method) -> Self {
        Self {
            href: href.into(),
            method: method.as_str().to_string(),
            templated: None,
        }
    }

    pub fn get(href: impl Into<String>) -> Self {
        Self::new(href, &Method::GET)
    }

    pub fn post(href: impl Into<String>) -> Self {
        Self::new(href, &Method::POST)
    }

    /// Marks the href as a URI template.
    pub fn templated(mut self) -> Self {
        self.templated = Some(true);
        self
    }
}

/// Relation name to link, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkSet(IndexMap<String, Link>);

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a relation, keeping its original position.
    pub fn insert(&mut self, rel: impl Into<String>, link: Link) {
        self.0.insert(rel.into(), link);
    }

    pub fn with(mut self, rel: impl Into<String>, link: Link) -> Self {
        self.insert(rel, link);
        self
    }

    pub fn get(&self, rel: &str) -> Option<&Link> {
        self.0.get(rel)
    }

    pub fn contains(&self, rel: &str) -> bool {
        self.0.contains_key(rel)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn relations(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn extend(&mut self, other: LinkSet) {
        self.0.extend(other.0);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Patient,
    Visit,
    Prescription,
    Report,
}

impl EntityKind {
    pub fn collection_path(&self) -> &'static str {
        match self {
            EntityKind::Patient => "/patients",
            EntityKind::Visit => "/visits",
            EntityKind::Prescription => "/prescriptions",
            EntityKind::Report => "/reports",
        }
    }

    pub fn item_path(&self, id: i64) -> String {
        format!("{}/{id}", self.collection_path())
    }
}

/// An entity reference carrying the ids its links need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Patient(i64),
    Visit(i64),
    Prescription { id: i64, patient_id: i64 },
    Report { id: i64, patient_id: i64 },
}

impl Entity {
    pub fn kind(&self) -> EntityKind {
        match self {
            Entity::Patient(_) => EntityKind::Patient,
            Entity::Visit(_) => EntityKind::Visit,
            Entity::Prescription { .. } => EntityKind::Prescription,
            Entity::Report { .. } => EntityKind::Report,
        }
    }

    pub fn id(&self) -> i64 {
        match *self {
            Entity::Patient(id) | Entity::Visit(id) => id,
            Entity::Prescription { id, .. } | Entity::Report { id, .. } => id,
        }
    }
}

/// Records that can describe themselves as an [`Entity`].
pub trait Linked {
    fn entity(&self) -> Entity;
}

impl Linked for Patient {
    fn entity(&self) -> Entity {
        Entity::Patient(self.id)
    }
}

impl Linked for Visit {
    fn entity(&self) -> Entity {
        Entity::Visit(self.id)
    }
}

impl Linked for Prescription {
    fn entity(&self) -> Entity {
        Entity::Prescription {
            id: self.id,
            patient_id: self.patient_id,
        }
    }
}

impl Linked for Report {
    fn entity(&self) -> Entity {
        Entity::Report {
            id: self.id,
            patient_id: self.patient_id,
        }
    }
}

fn join(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Canonical relations for a single entity.
///
/// A patient links to itself and to its visits, reports and prescriptions. A
/// visit advertises the two follow-up actions (`prescribe`, `add_report`).
/// Prescriptions and reports link to themselves and to their patient.
pub fn entity_links(base_url: &str, entity: Entity) -> LinkSet {
    match entity {
        Entity::Patient(id) => LinkSet::new()
            .with("self", Link::get(join(base_url, &format!("/patients/{id}"))))
            .with("visits", Link::get(join(base_url, &format!("/visits?patient={id}"))))
            .with("reports", Link::get(join(base_url, &format!("/reports?patient={id}"))))
            .with(
                "prescriptions",
                Link::get(join(base_url, &format!("/prescriptions?patient={id}"))),
            ),
        Entity::Visit(_) => LinkSet::new()
            .with("prescribe", Link::post(join(base_url, "/prescriptions")))
            .with("add_report", Link::post(join(base_url, "/reports"))),
        Entity::Prescription { id, patient_id } => LinkSet::new()
            .with("self", Link::get(join(base_url, &format!("/prescriptions/{id}"))))
            .with("patient", Link::get(join(base_url, &format!("/patients/{patient_id}")))),
        Entity::Report { id, patient_id } => LinkSet::new()
            .with("self", Link::get(join(base_url, &format!("/reports/{id}"))))
            .with("patient", Link::get(join(base_url, &format!("/patients/{patient_id}")))),
    }
}

/// `self` and `create` links for a collection endpoint.
pub fn collection_links(base_url: &str, kind: EntityKind) -> LinkSet {
    let href = join(base_url, kind.collection_path());
    LinkSet::new()
        .with("self", Link::get(href.clone()))
        .with("create", Link::post(href))
}

struct ErrorHint {
    status: StatusCode,
    rel: &'static str,
    href: &'static str,
    templated: bool,
}

const ERROR_HINTS: &[ErrorHint] = &[
    ErrorHint {
        status: StatusCode::NOT_FOUND,
        rel: "hospital:search",
        href: "/patients?q={search_term}",
        templated: true,
    },
    ErrorHint {
        status: StatusCode::BAD_REQUEST,
        rel: "hospital:validation-help",
        href: "/docs/validation-rules",
        templated: false,
    },
];

/// Recovery links for an error response: `self` and `home`, plus the
/// status-specific hints from a fixed table.
pub fn error_links(request_path: &str, request_method: &Method, status: StatusCode) -> LinkSet {
    let mut links = LinkSet::new()
        .with("self", Link::new(request_path, request_method))
        .with("home", Link::get("/"));
    for hint in ERROR_HINTS.iter().filter(|h| h.status == status) {
        let link = Link::get(hint.href);
        links.insert(
            hint.rel,
            if hint.templated { link.templated() } else { link },
        );
    }
    links
}
