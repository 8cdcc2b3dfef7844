//! MediaWiki Scribunto Lua site information support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{get_db, prelude::*};
use crate::{
    config::{Namespace, NamespaceCase},
    db::{Database, InterwikiEntry},
};
use arc_cell::OptionalArcCell;

/// The site information support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(super) struct SiteLibrary {
    /// The page database.
    db: OptionalArcCell<Database>,
}

impl SiteLibrary {
    /// Returns the ID of the namespace with the given name, if one exists.
    fn get_ns_index<'gc>(
        &self,
        _: Context<'gc>,
        name: VmString<'_>,
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        Ok(db
            .config()
            .namespace_by_name(name.to_str()?)
            .map_or(Value::Nil, |ns| i64::from(ns.id).into()))
    }

    /// Returns a table of interwiki prefixes, optionally restricted to only
    /// `"local"` or only `"!local"` entries.
    fn interwiki_map<'gc>(
        &self,
        ctx: Context<'gc>,
        filter: Option<VmString<'_>>,
    ) -> Result<Table<'gc>, VmError<'gc>> {
        let local = filter
            .map(|filter| match filter.as_bytes() {
                b"local" => Ok(true),
                b"!local" => Ok(false),
                _ => Err(format!(
                    "bad argument #1 to 'interwikiMap' (unknown filter '{}')",
                    filter.display_lossy()
                )
                .into_value(ctx)),
            })
            .transpose()?;

        let db = get_db(&self.db)?;
        let config = db.config();
        let current = format!("https://{}.{}.org", config.lang_code, config.project);

        let map = Table::new(&ctx);
        for entry in db.external().interwiki_map() {
            if local.is_some_and(|local| local != entry.local) {
                continue;
            }
            map.set(
                ctx,
                ctx.intern(entry.prefix.as_bytes()),
                interwiki_info(ctx, entry, &current),
            )?;
        }
        Ok(map)
    }

    /// Attaches the page database.
    pub(super) fn set_db(&self, db: &Arc<Database>) {
        self.db.set(Some(Arc::clone(db)));
    }
}

impl MwInterface for SiteLibrary {
    const NAME: &str = "mw.site";
    const CODE: &[u8] = include_bytes!("./modules/mw.site.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            getNsIndex = get_ns_index,
            interwikiMap = interwiki_map,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        let db = self
            .db
            .get()
            .ok_or_else(|| RuntimeError::new(anyhow::anyhow!("mw.site: no database")))?;
        let config = db.config();
        let namespaces = make_namespaces(ctx, &config.namespaces)?;

        Ok(table! {
            using ctx;

            currentVersion = env!("CARGO_PKG_VERSION"),
            namespaces = namespaces,
            scriptPath = "/w",
            server = ctx.intern(
                format!("https://{}.{}.org", config.lang_code, config.project).as_bytes()
            ),
            siteName = ctx.intern(config.site_name.as_bytes()),
            stylePath = "/w/skins",
        })
    }
}

/// Builds the Lua description of one interwiki prefix.
fn interwiki_info<'gc>(ctx: Context<'gc>, entry: &InterwikiEntry, current: &str) -> Table<'gc> {
    let url = if entry.protorel {
        entry.url.strip_prefix("https:").unwrap_or(&entry.url)
    } else {
        &entry.url
    };

    let info = table! {
        using ctx;

        prefix = ctx.intern(entry.prefix.as_bytes()),
        url = ctx.intern(url.as_bytes()),
        isProtocolRelative = entry.protorel,
        isLocal = entry.local,
        isCurrentWiki = entry.url.starts_with(current),
        isTranscludable = false,
        isExtraLanguageLink = false,
    };
    if let Some(language) = &entry.language {
        info.set_field(ctx, "displayText", ctx.intern(language.as_bytes()));
    }
    info
}

/// Builds the table of namespaces to be exposed to Lua. Talk, subject, and
/// associated namespaces are given as IDs and resolved on the Lua side.
fn make_namespaces<'gc>(
    ctx: Context<'gc>,
    all: &[Namespace],
) -> Result<Table<'gc>, RuntimeError> {
    let namespaces = Table::new(&ctx);
    for ns in all {
        let aliases = Table::new(&ctx);
        for (index, alias) in (1_i64..).zip(&ns.aliases) {
            aliases.set(ctx, index, ctx.intern(alias.as_bytes()))?;
        }

        let is_talk = ns.is_talk();
        let subject = if is_talk { ns.id - 1 } else { ns.id };
        let info = table! {
            using ctx;

            id = ns.id,
            name = ctx.intern(ns.name.as_bytes()),
            canonicalName = ctx.intern(ns.canonical.as_deref().unwrap_or(&ns.name).as_bytes()),
            hasSubpages = ns.subpages,
            hasGenderDistinction = [Namespace::USER, Namespace::USER + 1].contains(&ns.id),
            isCapitalized = ns.case == NamespaceCase::FirstLetter,
            isContent = ns.content,
            isIncludable = true,
            isMovable = ns.id >= Namespace::MAIN,
            isSubject = !is_talk,
            isTalk = is_talk,
            defaultContentModel = if ns.id == Namespace::MODULE { "Scribunto" } else { "wikitext" },
            aliases = aliases,
            subject = subject,
        };

        if ns.id >= Namespace::MAIN {
            let talk = subject + 1;
            info.set_field(ctx, "talk", talk);
            info.set_field(ctx, "associated", if is_talk { subject } else { talk });
        }

        namespaces.set(ctx, ns.id, info)?;
    }

    Ok(namespaces)
}
