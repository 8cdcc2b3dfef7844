//! Wikitext expansion types and functions.
//!
//! Expanding a Wikitext document requires out-of-band configuration data
//! (namespace names, extension tag names, and the site name), which is
//! supplied by the [`Database`].
//!
//! The smallest atom that a template can produce is a *character*, so the
//! expander works on text, not on a syntax tree. It runs as-if these steps
//! happen in order:
//!
//! 1. Remove comments and process inclusion control tags (`<noinclude>`,
//!    `<onlyinclude>`, and `<includeonly>`) according to whether the document
//!    is being transcluded or rendered directly.
//!
//! 2. Replace every extension tag (`<nowiki>`, `<ref>`, `<pre>`, …) with a
//!    strip marker. Because the strip marker is exposed to Lua scripts and
//!    parser functions, it MUST be a text sequence starting with
//!    ``\x7f'"`UNIQ-`` and ending with ``-QINU`"'\x7f``. Markers are never
//!    substituted back by the expander; that is left to the consumer of the
//!    output.
//!
//! 3. Recursively expand template expressions.
//!
//!    If the expression is a template parameter, interpolate into the source
//!    text:
//!
//!    1. The value of the matching argument from the parent; otherwise
//!    2. The expansion of the default value from the parameter; otherwise
//!    3. The template parameter expression itself, as plain text.
//!
//!    If the expression is a template, interpolate into the source text:
//!
//!    1. If the expression has no arguments, and it matches a variable name,
//!       the variable’s value; otherwise
//!    2. If the target-part of the expression contains a `:`, and the part
//!       before the `:` matches a parser function, the result of the parser
//!       function; otherwise
//!    3. If the target-part of the expression is a valid and existing template,
//!       the result of expanding the template; otherwise
//!    4. If the target-part of the expression is a valid but non-existing
//!       template, the Wikitext expression `[[:Template:<target>]]`; otherwise
//!    5. The template expression itself, as plain text.

use crate::{config::Namespace, db::Database, lua, title::Title};
use core::fmt;
use piccolo::Lua;
use preprocess::{Inclusion, Parsed};
use schnellru::{ByLength, LruMap};
pub(crate) use stack::StackFrame;
use std::{rc::Rc, sync::Arc};
pub use strip_markers::{MARKER_PREFIX, MARKER_SUFFIX, StripMarkers, kill_markers, marker_kind};

pub(crate) use parser_fns::call_parser_fn;
pub(crate) use stack::{Arguments, FnArg, FnArgs};
pub(crate) use template::{call_template, extension_tag, preprocess_for_script};

mod expand;
mod parser_fns;
mod preprocess;
mod stack;
mod strip_markers;
mod template;
#[cfg(test)]
mod tests;

/// A Wikitext expansion error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A write to a buffer failed.
    #[error("fmt error: {0}")]
    Fmt(#[from] fmt::Error),

    /// Some Lua host code raised an error.
    #[error("{0:#}")]
    Lua(#[from] piccolo::ExternError),

    /// An `#invoke` call was missing the required function argument.
    #[error("script error: you must specify a function to call")]
    MissingFunctionName,

    /// A backtraced Lua module error.
    #[error("{err}\n  at '{name}'|{fn_name}")]
    Module {
        /// The title of the module.
        name: String,
        /// The name of the function.
        fn_name: String,
        /// The error.
        #[source]
        err: Box<Error>,
    },

    /// A Lua module ran out of time or memory.
    #[error("script budget exceeded: {0}")]
    ScriptBudget(&'static str),

    /// Too many nested template calls.
    #[error("template stack overflow: {0}")]
    StackOverflow(String),
}

impl Error {
    /// Returns true if this error, or the error it wraps, is a script budget
    /// overrun.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::ScriptBudget(_) => true,
            Self::Module { err, .. } => err.is_timeout(),
            _ => false,
        }
    }
}

/// The standard result type used by all fallible renderer functions.
pub type Result<T = (), E = Error> = core::result::Result<T, E>;

/// Values which live for the entire lifetime of a renderer.
pub(crate) struct Statics {
    /// The page database.
    pub db: Arc<Database>,
    /// Parsed template cache.
    template_cache: LruMap<String, Rc<Parsed>, ByLength>,
    /// The Lua interpreter.
    pub vm: Lua,
}

/// Renderer state that is shared across stack frames.
pub(crate) struct State<'s> {
    /// Renderer static values.
    pub statics: &'s mut Statics,
    /// Strip markers minted for the current page.
    pub strip_markers: &'s mut StripMarkers,
}

impl State<'_> {
    /// Returns the parsed body of the given transcluded page, parsing it if it
    /// is not already cached.
    fn parse_cached(&mut self, key: &str, body: &str) -> Rc<Parsed> {
        if let Some(parsed) = self.statics.template_cache.get(key) {
            return Rc::clone(parsed);
        }

        log::trace!("Parsing {key}");
        let parsed = Rc::new(preprocess::parse(
            body,
            Inclusion::Transclude,
            self.statics.db.config(),
        ));
        self.statics
            .template_cache
            .insert(key.to_string(), Rc::clone(&parsed));
        parsed
    }
}

/// A page expansion connection.
///
/// A renderer owns everything which must not be shared across threads: the Lua
/// VM and its loaded-data cache, the template parse cache, and the strip
/// markers of the current page. Use one renderer per worker thread; the
/// [`Database`] they share is thread-safe.
pub struct Renderer {
    /// Renderer static values.
    statics: Statics,
    /// Strip markers minted for the current page.
    strip_markers: StripMarkers,
    /// The title of the current page.
    title: Title,
}

impl Renderer {
    /// Creates a new renderer for the given database.
    pub fn new(db: Arc<Database>) -> Result<Self> {
        let vm = lua::new_vm(&db)?;
        let title = db.title(Namespace::MAIN, "Main Page");
        let entries = db.config().limits.template_cache_entries;
        Ok(Self {
            statics: Statics {
                db,
                template_cache: LruMap::new(ByLength::new(entries)),
                vm,
            },
            strip_markers: StripMarkers::default(),
            title,
        })
    }

    /// The page database.
    pub fn db(&self) -> &Arc<Database> {
        &self.statics.db
    }

    /// Starts expanding a new page with the given title. Strip marker counters
    /// are reset.
    pub fn start_page(&mut self, title: &str) -> Result {
        self.title = self.statics.db.title(Namespace::MAIN, title);
        log::debug!("Starting page {}", self.title);
        self.strip_markers.reset();
        lua::reset_vm(&mut self.statics.vm, &self.title)?;
        Ok(())
    }

    /// The title of the current page.
    pub fn title(&self) -> &Title {
        &self.title
    }

    /// Expands templates, parameters, parser functions, and module calls in
    /// the given Wikitext, as if it were the body of the current page.
    pub fn expand(&mut self, text: &str) -> Result<String> {
        let parsed = preprocess::parse(text, Inclusion::Direct, self.statics.db.config());
        let sp = StackFrame::root(self.title.clone());
        let mut state = State {
            statics: &mut self.statics,
            strip_markers: &mut self.strip_markers,
        };
        let mut out = String::with_capacity(text.len());
        expand::expand_nodes(&mut out, &mut state, &sp, &parsed.source, &parsed.nodes)?;
        Ok(out)
    }

    /// Expands the body of the page with the given title, after calling
    /// [`Self::start_page`] for it. Returns `None` if the page does not exist.
    pub fn expand_page(&mut self, title: &str) -> Result<Option<String>> {
        self.start_page(title)?;
        let Some(page) = self.statics.db.get(&self.title) else {
            return Ok(None);
        };
        let page = self.statics.db.resolve_redirects(page);
        self.expand(&page.body).map(Some)
    }

    /// The strip markers minted for the current page.
    pub fn strip_markers(&self) -> &StripMarkers {
        &self.strip_markers
    }

    /// Releases the renderer. The database is closed too if this renderer
    /// held the last reference to it.
    pub fn close(self) {
        let Statics { db, vm, .. } = self.statics;
        drop(vm);
        if let Some(db) = Arc::into_inner(db) {
            db.close();
        }
    }
}
