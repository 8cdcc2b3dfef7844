//! MediaWiki `JsonConfig` extension Lua support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-JsonConfig
// <https://github.com/wikimedia/mediawiki-extensions-JsonConfig>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{get_db, prelude::*};
use crate::{config::Namespace, db::Database};
use arc_cell::OptionalArcCell;
use core::cell::RefCell;
use std::collections::HashSet;

/// The prefix of tabular data page titles.
const DATA_PREFIX: &str = "Data:";

/// Tabular data access.
///
/// Tabular data lives on a shared repository wiki which is never contacted,
/// so every request is answered with an empty table.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(super) struct TabularDataLibrary {
    /// The page database.
    db: OptionalArcCell<Database>,
    /// Normalised titles which have already been reported.
    requested: RefCell<HashSet<String>>,
}

impl TabularDataLibrary {
    /// Attaches the page database.
    pub(super) fn set_db(&self, db: &Arc<Database>) {
        self.db.set(Some(Arc::clone(db)));
    }

    /// Returns a new empty tabular data table for `Data:{title}`.
    fn get<'gc>(
        &self,
        ctx: Context<'gc>,
        (title, _lang): (VmString<'gc>, Option<VmString<'gc>>),
    ) -> Result<Table<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        let title = db.title(Namespace::MAIN, &format!("{DATA_PREFIX}{}", title.to_str()?));
        if self.requested.borrow_mut().insert(title.key().to_string()) {
            log::debug!("mw.ext.data.get: {title} is not available");
        }

        Ok(table! {
            using ctx;

            data = Table::new(&ctx),
            schema = table! {
                using ctx;

                fields = Table::new(&ctx),
            }
        })
    }
}

impl MwInterface for TabularDataLibrary {
    const NAME: &str = "mw.ext.data";
    const CODE: &[u8] = include_bytes!("./modules/mw.ext.data.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            get = get,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(Table::new(&ctx))
    }
}
