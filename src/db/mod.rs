//! Page storage and cached external data.
//!
//! A [`Database`] is shared by every expansion worker. It holds the page
//! records supplied by a dump reader (or inserted directly), the site
//! configuration, and the [`ExternalCache`] which fronts the knowledge-base
//! and interwiki collaborators.

use crate::{
    config::{Configuration, Namespace},
    title::Title,
};
pub use external::{
    ExternalCache, InterwikiEntry, InterwikiSource, KnowledgeBase, KnowledgeQuery, LookupError,
    NoExternalData,
};
use parking_lot::RwLock;
use serde::Deserialize;
use std::{collections::HashMap, io::BufRead, str::FromStr, sync::Arc};

mod external;

/// The result type for database operations.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Errors that may occur when interacting with the page database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An I/O error occurred reading page records.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A page record was not valid JSON.
    #[error("line {1}: invalid page record: {0}")]
    Json(#[source] serde_json::Error, usize),

    /// A page record used an unknown content model.
    #[error("unknown content model '{0}'")]
    Model(String),
}

/// The content model of a page.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Model {
    /// Wikitext.
    Wikitext,
    /// A Scribunto Lua module.
    Script,
    /// JSON data.
    Json,
    /// A redirect to another page.
    Redirect,
}

impl FromStr for Model {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "wikitext" => Self::Wikitext,
            "Scribunto" | "scribunto" | "script" | "lua" => Self::Script,
            "json" | "JsonConfig" => Self::Json,
            "redirect" => Self::Redirect,
            _ => return Err(Error::Model(s.to_string())),
        })
    }
}

/// A single page.
#[derive(Clone, Debug)]
pub struct Page {
    /// The normalised title of the page, including its namespace prefix.
    pub title: String,
    /// The namespace ID.
    pub namespace: i32,
    /// The content of the page, to be interpreted according to
    /// [`model`](Self::model).
    pub body: String,
    /// The content model.
    pub model: Model,
    /// If this page is a redirect, the title of the destination page.
    pub redirect_to: Option<String>,
}

/// A storage engine for pages.
pub trait PageBackend: Send + Sync {
    /// Returns the page with the given namespace and normalised title.
    fn get(&self, namespace: i32, title: &str) -> Option<Arc<Page>>;

    /// Inserts or replaces a page.
    fn put(&self, page: Page);

    /// Returns the normalised titles of all pages in the given namespace.
    fn titles(&self, namespace: i32) -> Vec<String>;

    /// Releases any resources held by the backend.
    fn close(&self) {}
}

/// An in-memory page backend.
#[derive(Default)]
pub struct MemoryBackend {
    /// Pages keyed by namespace and normalised title.
    pages: RwLock<HashMap<(i32, String), Arc<Page>>>,
}

impl PageBackend for MemoryBackend {
    fn get(&self, namespace: i32, title: &str) -> Option<Arc<Page>> {
        self.pages
            .read()
            .get(&(namespace, title.to_string()))
            .cloned()
    }

    fn put(&self, page: Page) {
        let key = (page.namespace, page.title.clone());
        self.pages.write().insert(key, Arc::new(page));
    }

    fn titles(&self, namespace: i32) -> Vec<String> {
        let mut titles = self
            .pages
            .read()
            .keys()
            .filter(|(ns, _)| *ns == namespace)
            .map(|(_, title)| title.clone())
            .collect::<Vec<_>>();
        titles.sort_unstable();
        titles
    }

    fn close(&self) {
        self.pages.write().clear();
    }
}

/// One line of a JSON Lines page dump.
#[derive(Deserialize)]
struct PageRecord {
    /// The page title.
    title: String,
    /// The namespace ID.
    #[serde(default)]
    ns: i32,
    /// The page content.
    #[serde(default)]
    body: Option<String>,
    /// The content model name.
    #[serde(default)]
    model: Option<String>,
    /// The redirect target.
    #[serde(default)]
    redirect_to: Option<String>,
}

/// A page database.
pub struct Database {
    /// The site configuration.
    config: Arc<Configuration>,
    /// The page storage engine.
    backend: Box<dyn PageBackend>,
    /// Cached results from external collaborators.
    external: ExternalCache,
}

impl Database {
    /// Creates a new empty in-memory database.
    pub fn new(config: Configuration) -> Self {
        Self::with_backend(config, Box::new(MemoryBackend::default()))
    }

    /// Creates a new database using the given storage engine.
    pub fn with_backend(config: Configuration, backend: Box<dyn PageBackend>) -> Self {
        let config = Arc::new(config);
        Self {
            external: ExternalCache::new(&config.lang_code),
            config,
            backend,
        }
    }

    /// Replaces the knowledge-base collaborator.
    #[must_use]
    pub fn with_knowledge_base(mut self, source: Arc<dyn KnowledgeBase>) -> Self {
        self.external.set_knowledge_base(source);
        self
    }

    /// Replaces the interwiki collaborator.
    #[must_use]
    pub fn with_interwiki(mut self, source: Arc<dyn InterwikiSource>) -> Self {
        self.external.set_interwiki(source);
        self
    }

    /// The site configuration.
    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// The external data cache.
    pub fn external(&self) -> &ExternalCache {
        &self.external
    }

    /// Inserts or replaces a page.
    ///
    /// This is the page callback of a dump reader. When `model` is not given,
    /// it is inferred from the redirect target and the namespace.
    pub fn add_page(
        &self,
        title: &str,
        namespace_id: i32,
        body: Option<&str>,
        model: Option<Model>,
        redirect_to: Option<&str>,
    ) {
        let title = self.title(namespace_id, title);
        let model = model.unwrap_or_else(|| {
            if redirect_to.is_some() {
                Model::Redirect
            } else if title.namespace() == Namespace::MODULE {
                if title.key().ends_with(".json") {
                    Model::Json
                } else {
                    Model::Script
                }
            } else {
                Model::Wikitext
            }
        });

        log::trace!("add_page({title}, {model:?})");
        self.backend.put(Page {
            namespace: title.namespace(),
            title: title.key().to_string(),
            body: body.unwrap_or_default().to_string(),
            model,
            redirect_to: redirect_to.map(ToString::to_string),
        });
    }

    /// Gets a page by namespace and unnormalised title. A missing page is not
    /// an error.
    pub fn get_page(&self, namespace_id: i32, title: &str) -> Option<Arc<Page>> {
        self.get(&self.title(namespace_id, title))
    }

    /// Gets a page by title.
    pub fn get(&self, title: &Title) -> Option<Arc<Page>> {
        self.backend.get(title.namespace(), title.key())
    }

    /// Returns true if a page with the given title exists.
    pub fn contains(&self, title: &Title) -> bool {
        self.get(title).is_some()
    }

    /// Follows up to two redirects from the given page. A redirect to a
    /// missing page resolves to the redirect itself.
    pub fn resolve_redirects(&self, mut page: Arc<Page>) -> Arc<Page> {
        for _ in 0..2 {
            let Some(target) = &page.redirect_to else {
                break;
            };
            let target = Title::new(target, Namespace::MAIN, &self.config);
            match self.get(&target) {
                Some(next) => page = next,
                None => break,
            }
        }
        page
    }

    /// Returns the normalised titles of all pages in the given namespace.
    pub fn titles(&self, namespace_id: i32) -> Vec<String> {
        self.backend.titles(namespace_id)
    }

    /// Loads page records from JSON Lines, one
    /// `{"title", "ns", "body", "model", "redirect_to"}` object per line.
    /// Returns the number of pages loaded.
    pub fn load_json_lines(&self, reader: impl BufRead) -> Result<usize> {
        let mut count = 0;
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record = serde_json::from_str::<PageRecord>(&line)
                .map_err(|err| Error::Json(err, index + 1))?;
            let model = record.model.as_deref().map(Model::from_str).transpose()?;
            self.add_page(
                &record.title,
                record.ns,
                record.body.as_deref(),
                model,
                record.redirect_to.as_deref(),
            );
            count += 1;
        }
        Ok(count)
    }

    /// Releases the storage engine.
    pub fn close(&self) {
        self.backend.close();
    }

    /// Normalises a title in the given default namespace.
    pub fn title(&self, namespace_id: i32, title: &str) -> Title {
        Title::new(title, namespace_id, &self.config)
    }
}
