//! Memoised access to external data collaborators.
//!
//! Every distinct lookup reaches its collaborator at most once for the life of
//! the [`ExternalCache`], including lookups which find nothing or fail. Each
//! key owns a [`OnceLock`], so concurrent requests for the same key wait on a
//! single fetch while the key map itself is only write-locked long enough to
//! insert the empty cell.

use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, OnceLock},
};

/// An error from an external collaborator.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// No collaborator is configured.
    #[error("no external data source is configured")]
    Unavailable,

    /// The collaborator failed.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A query for the knowledge-base collaborator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KnowledgeQuery<'a> {
    /// The label and description of an item, answered as
    /// `{"itemLabel": {"value"}, "itemDescription": {"value"}}`.
    Item {
        /// The entity ID.
        id: &'a str,
        /// The language of the label and description.
        language: &'a str,
    },
    /// A full entity, answered as `{"entities": {"<id>": {...}}}`.
    Entity {
        /// The entity ID.
        id: &'a str,
    },
    /// The item connected to a page, answered as
    /// `{"item": {"value": "<entity URI>"}}`.
    EntityIdForTitle {
        /// The page title.
        title: &'a str,
        /// The site ID, e.g. 'enwiktionary'.
        site: &'a str,
        /// The content language.
        language: &'a str,
    },
}

/// A knowledge-base (Wikidata-like) data source.
pub trait KnowledgeBase: Send + Sync {
    /// Runs a query. The result is already-decoded JSON.
    fn query(&self, query: &KnowledgeQuery<'_>) -> Result<Value, LookupError>;
}

/// One entry of the interwiki table.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
pub struct InterwikiEntry {
    /// The interwiki prefix.
    pub prefix: String,
    /// Whether the target is considered local to this wiki farm.
    #[serde(default)]
    pub local: bool,
    /// The language name, for language links.
    #[serde(default)]
    pub language: Option<String>,
    /// The BCP 47 language code, for language links.
    #[serde(default)]
    pub bcp47: Option<String>,
    /// The URL template, with `$1` standing for the page title.
    pub url: String,
    /// Whether the URL is protocol-relative.
    #[serde(default)]
    pub protorel: bool,
}

/// An interwiki table data source.
pub trait InterwikiSource: Send + Sync {
    /// Returns the full interwiki table.
    fn interwiki_data(&self) -> Result<Vec<InterwikiEntry>, LookupError>;
}

/// A collaborator which has no data.
pub struct NoExternalData;

impl KnowledgeBase for NoExternalData {
    fn query(&self, _: &KnowledgeQuery<'_>) -> Result<Value, LookupError> {
        Err(LookupError::Unavailable)
    }
}

impl InterwikiSource for NoExternalData {
    fn interwiki_data(&self) -> Result<Vec<InterwikiEntry>, LookupError> {
        Ok(Vec::new())
    }
}

/// The identity of one cached lookup.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
enum LookupKey {
    /// Label and description of an item.
    Item(String),
    /// A whole entity.
    Entity(String),
    /// The title of a sitelink of an entity.
    Sitelink(String, String),
    /// The entity connected to a page title on a site.
    EntityIdForTitle(String, String),
}

/// A cached lookup result. `None` records that nothing was found.
type Cell = Arc<OnceLock<Option<Arc<Value>>>>;

/// Memoised access to the knowledge-base and interwiki collaborators.
pub struct ExternalCache {
    /// The content language, used for labels.
    language: String,
    /// The knowledge-base collaborator.
    knowledge_base: Arc<dyn KnowledgeBase>,
    /// The interwiki collaborator.
    interwiki: Arc<dyn InterwikiSource>,
    /// Knowledge-base results.
    entries: RwLock<HashMap<LookupKey, Cell>>,
    /// The interwiki table.
    interwiki_map: OnceLock<Vec<InterwikiEntry>>,
}

impl ExternalCache {
    /// Creates a new cache with no collaborators.
    pub(super) fn new(language: &str) -> Self {
        Self {
            language: language.to_string(),
            knowledge_base: Arc::new(NoExternalData),
            interwiki: Arc::new(NoExternalData),
            entries: RwLock::default(),
            interwiki_map: OnceLock::new(),
        }
    }

    /// Replaces the knowledge-base collaborator.
    pub(super) fn set_knowledge_base(&mut self, source: Arc<dyn KnowledgeBase>) {
        self.knowledge_base = source;
    }

    /// Replaces the interwiki collaborator.
    pub(super) fn set_interwiki(&mut self, source: Arc<dyn InterwikiSource>) {
        self.interwiki = source;
    }

    /// Returns the cached value for `key`, calling `fetch` to fill it if this
    /// is the first request.
    fn get_or_fetch<F>(&self, key: LookupKey, fetch: F) -> Option<Arc<Value>>
    where
        F: FnOnce() -> Result<Option<Value>, LookupError>,
    {
        let cell = self.entries.read().get(&key).cloned();
        let cell = cell
            .unwrap_or_else(|| Arc::clone(self.entries.write().entry(key.clone()).or_default()));
        cell.get_or_init(|| {
            log::trace!("External lookup {key:?}");
            match fetch() {
                Ok(value) => value.map(Arc::new),
                Err(err) => {
                    log::warn!("External lookup {key:?} failed: {err}");
                    None
                }
            }
        })
        .clone()
    }

    /// Runs a knowledge-base query.
    fn query(&self, query: &KnowledgeQuery<'_>) -> Result<Value, LookupError> {
        self.knowledge_base.query(query)
    }

    /// Returns the label and description bindings of the item `id`.
    fn item(&self, id: &str) -> Option<Arc<Value>> {
        self.get_or_fetch(LookupKey::Item(id.to_string()), || {
            self.query(&KnowledgeQuery::Item {
                id,
                language: &self.language,
            })
            .map(Some)
        })
    }

    /// Returns the label of the item `id`.
    pub fn label(&self, id: &str) -> Option<String> {
        binding(self.item(id)?.get("itemLabel")?)
    }

    /// Returns the description of the item `id`.
    pub fn description(&self, id: &str) -> Option<String> {
        binding(self.item(id)?.get("itemDescription")?)
    }

    /// Returns the structured entity `id`.
    pub fn entity(&self, id: &str) -> Option<Arc<Value>> {
        self.get_or_fetch(LookupKey::Entity(id.to_string()), || {
            let mut response = self.query(&KnowledgeQuery::Entity { id })?;
            Ok(response
                .get_mut("entities")
                .and_then(|entities| entities.get_mut(id))
                .map(Value::take)
                .filter(Value::is_object))
        })
    }

    /// Returns the page title of the sitelink of entity `id` on `site`.
    pub fn sitelink(&self, id: &str, site: &str) -> Option<String> {
        let key = LookupKey::Sitelink(id.to_string(), site.to_string());
        self.get_or_fetch(key, || {
            Ok(self
                .entity(id)
                .and_then(|entity| entity.pointer(&format!("/sitelinks/{site}/title")).cloned()))
        })
        .and_then(|title| title.as_str().map(ToString::to_string))
    }

    /// Returns the ID of the entity connected to `title` on `site`.
    pub fn entity_id_for_title(&self, title: &str, site: &str) -> Option<String> {
        let key = LookupKey::EntityIdForTitle(title.to_string(), site.to_string());
        self.get_or_fetch(key, || {
            let response = self.query(&KnowledgeQuery::EntityIdForTitle {
                title,
                site,
                language: &self.language,
            })?;
            Ok(binding(response.get("item").unwrap_or(&Value::Null)).and_then(|uri| {
                uri.rsplit('/')
                    .next()
                    .filter(|id| !id.is_empty())
                    .map(|id| Value::String(id.to_string()))
            }))
        })
        .and_then(|id| id.as_str().map(ToString::to_string))
    }

    /// Returns the interwiki table.
    pub fn interwiki_map(&self) -> &[InterwikiEntry] {
        self.interwiki_map.get_or_init(|| {
            log::trace!("Loading interwiki table");
            self.interwiki.interwiki_data().unwrap_or_else(|err| {
                log::warn!("Interwiki lookup failed: {err}");
                Vec::new()
            })
        })
    }
}

/// Extracts the string value of a query result binding like
/// `{"value": "..."}`.
fn binding(value: &Value) -> Option<String> {
    value
        .get("value")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}
