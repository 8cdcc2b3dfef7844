//! MediaWiki Scribunto Lua HTML support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::prelude::*;
use crate::{
    common::encode_html,
    renderer::{MARKER_PREFIX, MARKER_SUFFIX},
};
use std::borrow::Cow;

/// The HTML support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(super) struct HtmlLibrary;

impl HtmlLibrary {
    /// Encodes an attribute value.
    fn encode<'gc>(
        &self,
        ctx: Context<'gc>,
        value: VmString<'gc>,
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        Ok(match encode_html(value.to_str()?) {
            Cow::Borrowed(_) => value,
            Cow::Owned(value) => ctx.intern(value.as_bytes()),
        })
    }
}

impl MwInterface for HtmlLibrary {
    const NAME: &str = "mw.html";
    const CODE: &[u8] = include_bytes!("./modules/mw.html.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            encode = encode,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(table! {
            using ctx;

            uniqPrefix = MARKER_PREFIX,
            uniqSuffix = MARKER_SUFFIX,
        })
    }
}
