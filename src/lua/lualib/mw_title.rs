//! MediaWiki Scribunto Lua article support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{get_db, prelude::*};
use crate::{
    common::url_encode,
    config::Namespace,
    db::{Database, Model},
    title::Title,
};
use arc_cell::OptionalArcCell;
use core::fmt::Write as _;
use std::cell::RefCell;

/// The article support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(crate) struct TitleLibrary {
    /// The page database.
    db: OptionalArcCell<Database>,
    /// The title of the page being expanded.
    title: RefCell<Option<Title>>,
}

impl TitleLibrary {
    /// Sets the title of the page being expanded.
    pub fn set_title(&self, title: &Title) {
        *self.title.borrow_mut() = Some(title.clone());
    }

    /// Attaches the page database.
    pub(super) fn set_db(&self, db: &Arc<Database>) {
        self.db.set(Some(Arc::clone(db)));
    }

    /// Returns the fields of a title object for the page being expanded.
    fn get_current_title<'gc>(
        &self,
        ctx: Context<'gc>,
        (): (),
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let title = self.title.borrow();
        Ok(title
            .as_ref()
            .map_or(Value::Nil, |title| title_fields(ctx, title, true).into()))
    }

    /// Gets the body of the page with the given full title text, or nil if
    /// the page does not exist.
    fn get_content<'gc>(
        &self,
        ctx: Context<'gc>,
        full_text: VmString<'_>,
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let title = Title::new(full_text.to_str()?, Namespace::MAIN, db.config());
        log::trace!("mw.title.getContent({title})");
        Ok(db.get(&title).map_or(Value::Nil, |page| {
            Value::String(ctx.intern(page.body.as_bytes()))
        }))
    }

    /// Gets the data about a page which requires a database lookup.
    fn get_expensive_data<'gc>(
        &self,
        ctx: Context<'gc>,
        full_text: VmString<'_>,
    ) -> Result<Table<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let title = Title::new(full_text.to_str()?, Namespace::MAIN, db.config());
        let page = db.get(&title);
        let page = page.as_deref();

        let content_model = match page.map(|page| page.model) {
            Some(Model::Script) => "Scribunto",
            Some(Model::Json) => "json",
            _ if title.namespace() == Namespace::MODULE => "Scribunto",
            _ => "wikitext",
        };

        let data = table! {
            using ctx;

            contentModel = content_model,
            exists = page.is_some(),
            isRedirect = page.is_some_and(|page| page.redirect_to.is_some()),
        };
        if let Some(target) = page.and_then(|page| page.redirect_to.as_deref()) {
            data.set_field(ctx, "redirectTarget", ctx.intern(target.as_bytes()));
        }
        Ok(data)
    }

    /// Creates a URL for the page with the given full title text and optional
    /// query string.
    ///
    /// The `which` argument describes the kind of URL to create:
    ///
    /// * 'fullUrl': A protocol-relative URL for the title.
    /// * 'canonicalUrl': A fully qualified URL for the title.
    /// * 'localUrl': A URL containing only the path to the title.
    fn get_url<'gc>(
        &self,
        ctx: Context<'gc>,
        (text, which, query): (VmString<'_>, VmString<'_>, Option<Value<'gc>>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let config = db.config();
        let title = Title::new(text.to_str()?, Namespace::MAIN, config);
        let path = url_encode(&title.key().replace(' ', "_")).to_string();

        let query = match query {
            Some(Value::Table(table)) => make_query_string(ctx, table)?,
            Some(Value::String(query)) => query.to_str()?.to_string(),
            _ => String::new(),
        };

        let mut url = match which.as_bytes() {
            b"fullUrl" => format!("//{}.{}.org", config.lang_code, config.project),
            b"canonicalUrl" => format!("https://{}.{}.org", config.lang_code, config.project),
            b"localUrl" => String::new(),
            _ => return Err("invalid 'which' argument".into_value(ctx).into()),
        };
        if query.is_empty() {
            let _ = write!(url, "/wiki/{path}");
        } else {
            let _ = write!(url, "/w/index.php?title={path}&{query}");
        }
        Ok(ctx.intern(url.as_bytes()))
    }

    /// Makes the fields of a title object from a namespace and title text
    /// which is never parsed for a namespace prefix.
    fn make_title<'gc>(
        &self,
        ctx: Context<'gc>,
        (ns, text): (Value<'gc>, VmString<'gc>),
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let Some(ns) = namespace_from_value(ctx, &db, ns)? else {
            return Ok(Value::Nil);
        };
        let title = Title::from_parts(ns, text.to_str()?);
        Ok(self.fields(ctx, &title))
    }

    /// Makes the fields of a title object from title text, using the given
    /// default namespace if the text has no namespace prefix.
    fn new_title<'gc>(
        &self,
        ctx: Context<'gc>,
        (text, default_ns): (Value<'gc>, Option<Value<'gc>>),
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let Some(text) = text.into_string(ctx) else {
            return Err(format!(
                "bad argument #1 to 'mw.title.new' (string expected, got {})",
                text.type_name()
            )
            .into_value(ctx)
            .into());
        };

        let db = get_db(&self.db)?;
        let default_ns = match default_ns {
            Some(ns) => match namespace_from_value(ctx, &db, ns)? {
                Some(ns) => ns.id,
                None => return Ok(Value::Nil),
            },
            None => Namespace::MAIN,
        };

        let title = Title::new(text.to_str()?, default_ns, db.config());
        Ok(self.fields(ctx, &title))
    }

    /// Returns the fields of a title object, or nil if the title is not
    /// valid.
    fn fields<'gc>(&self, ctx: Context<'gc>, title: &Title) -> Value<'gc> {
        if title.text().is_empty() {
            return Value::Nil;
        }
        let is_current = self.title.borrow().as_ref() == Some(title);
        title_fields(ctx, title, is_current).into()
    }
}

impl MwInterface for TitleLibrary {
    const NAME: &str = "mw.title";
    const CODE: &[u8] = include_bytes!("./modules/mw.title.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            getContent = get_content,
            getCurrentTitle = get_current_title,
            getExpensiveData = get_expensive_data,
            getUrl = get_url,
            makeTitle = make_title,
            newTitle = new_title,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(table! {
            using ctx;

            NS_MAIN = Namespace::MAIN,
            NS_MODULE = Namespace::MODULE,
        })
    }
}

/// Builds a URL query string from a Lua table.
fn make_query_string<'gc>(ctx: Context<'gc>, query: Table<'gc>) -> Result<String, VmError<'gc>> {
    let mut pairs = Vec::new();
    for (k, v) in query {
        if matches!(v, Value::Nil | Value::Boolean(false)) {
            continue;
        }
        let v = v.into_string(ctx).ok_or_else(|| {
            VmError::from("query values must be strings or numbers".into_value(ctx))
        })?;
        pairs.push(format!(
            "{}={}",
            url_encode(&k.display().to_string()),
            url_encode(v.to_str()?)
        ));
    }
    pairs.sort_unstable();
    Ok(pairs.join("&"))
}

/// Finds a namespace from a Lua value, which may be a namespace ID or name.
fn namespace_from_value<'a, 'gc>(
    ctx: Context<'gc>,
    db: &'a Database,
    ns: Value<'gc>,
) -> Result<Option<&'a Namespace>, VmError<'gc>> {
    let config = db.config();
    Ok(match ns {
        Value::Integer(id) => i32::try_from(id).ok().and_then(|id| config.namespace(id)),
        #[allow(clippy::cast_possible_truncation)]
        Value::Number(id) if id.fract() == 0.0 => config.namespace(id as i32),
        Value::String(name) => {
            let name = name.to_str()?;
            match name.parse::<i32>() {
                Ok(id) => config.namespace(id),
                Err(_) => config.namespace_by_name(name),
            }
        }
        ns => {
            return Err(format!("invalid namespace type {}", ns.type_name())
                .into_value(ctx)
                .into());
        }
    })
}

/// Creates the fields of a Lua title object from a [`Title`].
fn title_fields<'gc>(ctx: Context<'gc>, title: &Title, is_current: bool) -> Table<'gc> {
    table! {
        using ctx;

        isCurrentTitle = is_current,
        interwiki = "",
        namespace = title.namespace(),
        nsText = ctx.intern(title.ns_text().as_bytes()),
        text = ctx.intern(title.text().as_bytes()),
        prefixedText = ctx.intern(title.key().as_bytes()),
        baseText = ctx.intern(title.base_text().as_bytes()),
        rootText = ctx.intern(title.root_text().as_bytes()),
        subpageText = ctx.intern(title.subpage_text().as_bytes()),
        fragment = "",
    }
}
