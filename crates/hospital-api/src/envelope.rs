//! JSON envelopes wrapping records with their links.

use serde::{Deserialize, Serialize};

use crate::hateoas::{EntityKind, LinkSet, Linked, collection_links, entity_links};

/// A single record: `{"data": ..., "_links": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource<T> {
    pub data: T,
    #[serde(rename = "_links")]
    pub links: LinkSet,
}

impl<T: Linked> Resource<T> {
    pub fn linked(base_url: &str, data: T) -> Self {
        let links = entity_links(base_url, data.entity());
        Self { data, links }
    }
}

/// A collection item: the record's fields with `_links` alongside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedItem<T> {
    #[serde(flatten)]
    pub item: T,
    #[serde(rename = "_links")]
    pub links: LinkSet,
}

/// `{"data": [...], "count": n, "_links": {self, create}}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection<T> {
    pub data: Vec<LinkedItem<T>>,
    pub count: usize,
    #[serde(rename = "_links")]
    pub links: LinkSet,
}

impl<T: Linked> Collection<T> {
    pub fn linked(base_url: &str, kind: EntityKind, items: Vec<T>) -> Self {
        let data: Vec<LinkedItem<T>> = items
            .into_iter()
            .map(|item| LinkedItem {
                links: entity_links(base_url, item.entity()),
                item,
            })
            .collect();
        Self {
            count: data.len(),
            data,
            links: collection_links(base_url, kind),
        }
    }
}
