//! Wikibase client Lua support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Wikibase
// <https://github.com/wikimedia/mediawiki-extensions-Wikibase>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{get_db, prelude::*};
use crate::db::Database;
use arc_cell::OptionalArcCell;

/// The Wikibase client library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(super) struct WikibaseLibrary {
    /// The page database, which owns the external data cache.
    db: OptionalArcCell<Database>,
}

impl WikibaseLibrary {
    /// Attaches the page database.
    pub(super) fn set_db(&self, db: &Arc<Database>) {
        self.db.set(Some(Arc::clone(db)));
    }

    /// Returns the label of the entity `id` in the content language.
    fn get_label<'gc>(
        &self,
        ctx: Context<'gc>,
        id: VmString<'_>,
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        Ok(optional_string(ctx, db.external().label(id.to_str()?)))
    }

    /// Returns the description of the entity `id` in the content language.
    fn get_description<'gc>(
        &self,
        ctx: Context<'gc>,
        id: VmString<'_>,
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        Ok(optional_string(ctx, db.external().description(id.to_str()?)))
    }

    /// Returns the structured data of the entity `id` as a Lua table.
    fn get_entity<'gc>(
        &self,
        ctx: Context<'gc>,
        id: VmString<'_>,
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let Some(entity) = db.external().entity(id.to_str()?) else {
            return Ok(Value::Nil);
        };
        let ser = piccolo_util::serde::ser::Serializer::new(ctx, <_>::default());
        Ok(serde_transcode::transcode(&*entity, ser)?)
    }

    /// Returns the ID of the item connected to the page `title` on `site`.
    /// The default site is this wiki.
    fn get_entity_id_for_title<'gc>(
        &self,
        ctx: Context<'gc>,
        (title, site): (VmString<'_>, Option<VmString<'_>>),
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let site = match site {
            Some(site) => site.to_str()?.to_string(),
            None => global_site_id(&db),
        };
        Ok(optional_string(
            ctx,
            db.external().entity_id_for_title(title.to_str()?, &site),
        ))
    }

    /// Returns the global ID of this wiki, like 'enwiktionary'.
    fn get_global_site_id<'gc>(
        &self,
        ctx: Context<'gc>,
        (): (),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        Ok(ctx.intern(global_site_id(&db).as_bytes()))
    }

    /// Returns the title of the page linked to entity `id` on `site`. The
    /// default site is this wiki.
    fn get_sitelink<'gc>(
        &self,
        ctx: Context<'gc>,
        (id, site): (VmString<'_>, Option<VmString<'_>>),
    ) -> Result<Value<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let site = match site {
            Some(site) => site.to_str()?.to_string(),
            None => global_site_id(&db),
        };
        Ok(optional_string(ctx, db.external().sitelink(id.to_str()?, &site)))
    }
}

impl MwInterface for WikibaseLibrary {
    const NAME: &str = "mw.wikibase";
    const CODE: &[u8] = include_bytes!("./modules/mw.wikibase.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            getDescription = get_description,
            getEntity = get_entity,
            getEntityIdForTitle = get_entity_id_for_title,
            getGlobalSiteId = get_global_site_id,
            getLabel = get_label,
            getSitelink = get_sitelink,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(Table::new(&ctx))
    }
}

/// Returns the global site ID of the wiki, which is the language code plus the
/// project family. Wikipedia is abbreviated to 'wiki'.
fn global_site_id(db: &Database) -> String {
    let config = db.config();
    let project = if config.project == "wikipedia" {
        "wiki"
    } else {
        &config.project
    };
    format!("{}{project}", config.lang_code)
}

/// Converts an optional string into a Lua string or nil.
fn optional_string(ctx: Context<'_>, value: Option<String>) -> Value<'_> {
    value.map_or(Value::Nil, |value| ctx.intern(value.as_bytes()).into())
}
