//! MediaWiki Scribunto Lua localisation support library.

// This code is (very, very loosely) adapted from mediawiki-extensions-Scribunto
// <https://github.com/wikimedia/mediawiki-extensions-Scribunto>.
//
// The upstream copyright is:
//
// SPDX-License-Identifier: GPL-2.0-or-later

use super::{get_db, prelude::*};
use crate::{date, db::Database};
use arc_cell::OptionalArcCell;

/// A known language.
struct LanguageInfo {
    /// The name of the language in the language itself.
    autonym: &'static str,
    /// The name of the language in English.
    english: &'static str,
    /// Whether the language is written right-to-left.
    rtl: bool,
}

/// Shorthand for building the language table.
macro_rules! lang {
    ($autonym:literal, $english:literal) => {
        LanguageInfo {
            autonym: $autonym,
            english: $english,
            rtl: false,
        }
    };
    ($autonym:literal, $english:literal, rtl) => {
        LanguageInfo {
            autonym: $autonym,
            english: $english,
            rtl: true,
        }
    };
}

/// Known language codes.
static LANGUAGES: phf::Map<&'static str, LanguageInfo> = phf::phf_map! {
    "af" => lang!("Afrikaans", "Afrikaans"),
    "am" => lang!("አማርኛ", "Amharic"),
    "ang" => lang!("Ænglisc", "Old English"),
    "ar" => lang!("العربية", "Arabic", rtl),
    "az" => lang!("azərbaycanca", "Azerbaijani"),
    "be" => lang!("беларуская", "Belarusian"),
    "bg" => lang!("български", "Bulgarian"),
    "bn" => lang!("বাংলা", "Bangla"),
    "br" => lang!("brezhoneg", "Breton"),
    "ca" => lang!("català", "Catalan"),
    "cs" => lang!("čeština", "Czech"),
    "cy" => lang!("Cymraeg", "Welsh"),
    "da" => lang!("dansk", "Danish"),
    "de" => lang!("Deutsch", "German"),
    "el" => lang!("Ελληνικά", "Greek"),
    "en" => lang!("English", "English"),
    "eo" => lang!("Esperanto", "Esperanto"),
    "es" => lang!("español", "Spanish"),
    "et" => lang!("eesti", "Estonian"),
    "eu" => lang!("euskara", "Basque"),
    "fa" => lang!("فارسی", "Persian", rtl),
    "fi" => lang!("suomi", "Finnish"),
    "fo" => lang!("føroyskt", "Faroese"),
    "fr" => lang!("français", "French"),
    "fy" => lang!("Frysk", "Western Frisian"),
    "ga" => lang!("Gaeilge", "Irish"),
    "gd" => lang!("Gàidhlig", "Scottish Gaelic"),
    "gl" => lang!("galego", "Galician"),
    "got" => lang!("𐌲𐌿𐍄𐌹𐍃𐌺", "Gothic"),
    "grc" => lang!("Ἀρχαία ἑλληνικὴ", "Ancient Greek"),
    "he" => lang!("עברית", "Hebrew", rtl),
    "hi" => lang!("हिन्दी", "Hindi"),
    "hr" => lang!("hrvatski", "Croatian"),
    "hu" => lang!("magyar", "Hungarian"),
    "hy" => lang!("հայերեն", "Armenian"),
    "id" => lang!("Bahasa Indonesia", "Indonesian"),
    "is" => lang!("íslenska", "Icelandic"),
    "it" => lang!("italiano", "Italian"),
    "ja" => lang!("日本語", "Japanese"),
    "ka" => lang!("ქართული", "Georgian"),
    "kk" => lang!("қазақша", "Kazakh"),
    "km" => lang!("ភាសាខ្មែរ", "Khmer"),
    "ko" => lang!("한국어", "Korean"),
    "ku" => lang!("kurdî", "Kurdish"),
    "la" => lang!("Latina", "Latin"),
    "lb" => lang!("Lëtzebuergesch", "Luxembourgish"),
    "lt" => lang!("lietuvių", "Lithuanian"),
    "lv" => lang!("latviešu", "Latvian"),
    "mk" => lang!("македонски", "Macedonian"),
    "ml" => lang!("മലയാളം", "Malayalam"),
    "mn" => lang!("монгол", "Mongolian"),
    "ms" => lang!("Bahasa Melayu", "Malay"),
    "mt" => lang!("Malti", "Maltese"),
    "my" => lang!("မြန်မာဘာသာ", "Burmese"),
    "nb" => lang!("norsk bokmål", "Norwegian Bokmål"),
    "nl" => lang!("Nederlands", "Dutch"),
    "nn" => lang!("norsk nynorsk", "Norwegian Nynorsk"),
    "no" => lang!("norsk", "Norwegian"),
    "oc" => lang!("occitan", "Occitan"),
    "pl" => lang!("polski", "Polish"),
    "pt" => lang!("português", "Portuguese"),
    "ro" => lang!("română", "Romanian"),
    "ru" => lang!("русский", "Russian"),
    "sa" => lang!("संस्कृतम्", "Sanskrit"),
    "sk" => lang!("slovenčina", "Slovak"),
    "sl" => lang!("slovenščina", "Slovenian"),
    "sq" => lang!("shqip", "Albanian"),
    "sr" => lang!("српски / srpski", "Serbian"),
    "sv" => lang!("svenska", "Swedish"),
    "sw" => lang!("Kiswahili", "Swahili"),
    "ta" => lang!("தமிழ்", "Tamil"),
    "te" => lang!("తెలుగు", "Telugu"),
    "th" => lang!("ไทย", "Thai"),
    "tl" => lang!("Tagalog", "Tagalog"),
    "tr" => lang!("Türkçe", "Turkish"),
    "uk" => lang!("українська", "Ukrainian"),
    "ur" => lang!("اردو", "Urdu", rtl),
    "uz" => lang!("oʻzbekcha / ўзбекча", "Uzbek"),
    "vi" => lang!("Tiếng Việt", "Vietnamese"),
    "yi" => lang!("ייִדיש", "Yiddish", rtl),
    "zh" => lang!("中文", "Chinese"),
};

/// Returns the name of the language with the given `code`, in the language
/// `target` if one is given, or in the language itself otherwise.
///
/// Only English and native names are known, so names for every other target
/// language are given in English.
pub(crate) fn fetch_language_name(code: &str, target: Option<&str>) -> Option<&'static str> {
    let code = code.trim().to_ascii_lowercase();
    let info = LANGUAGES.get(code.as_str())?;
    Some(match target.map(str::to_ascii_lowercase) {
        None => info.autonym,
        Some(target) if target == code => info.autonym,
        Some(_) => info.english,
    })
}

/// The localisation support library.
#[derive(gc_arena::Collect, Default)]
#[collect(require_static)]
pub(crate) struct LanguageLibrary {
    /// The page database.
    db: OptionalArcCell<Database>,
}

impl LanguageLibrary {
    /// Attaches the page database.
    pub(super) fn set_db(&self, db: &Arc<Database>) {
        self.db.set(Some(Arc::clone(db)));
    }

    /// Returns the name of the language matching the given `code`. If
    /// `in_language` is provided, the name is localised to that language;
    /// otherwise, the native name of the language is used. Unknown codes give
    /// an empty string.
    fn fetch_language_name<'gc>(
        &self,
        ctx: Context<'gc>,
        (code, in_language): (VmString<'gc>, Option<VmString<'gc>>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let in_language = in_language.map(VmString::to_str).transpose()?;
        let name = fetch_language_name(code.to_str()?, in_language).unwrap_or_default();
        Ok(ctx.intern(name.as_bytes()))
    }

    /// Returns a table of `code: language name`. If `in_language` is provided,
    /// the language names are localised to that language; otherwise, the
    /// native names of each language are used.
    fn fetch_language_names<'gc>(
        &self,
        ctx: Context<'gc>,
        (in_language, _include): (Option<VmString<'gc>>, Option<VmString<'gc>>),
    ) -> Result<Table<'gc>, VmError<'gc>> {
        let in_language = in_language.map(VmString::to_str).transpose()?;
        let names = Table::new(&ctx);
        for code in LANGUAGES.keys() {
            if let Some(name) = fetch_language_name(code, in_language) {
                names.set(ctx, *code, name)?;
            }
        }
        Ok(names)
    }

    /// Formats `timestamp`, or the current time, using a MediaWiki time format
    /// string. If `local` is true, the result is given in the system time
    /// zone; otherwise, it is given in UTC.
    fn format_date<'gc>(
        &self,
        ctx: Context<'gc>,
        (_code, format, timestamp, local): (
            VmString<'gc>,
            VmString<'gc>,
            Option<VmString<'gc>>,
            Option<bool>,
        ),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let timestamp = timestamp.map(VmString::to_str).transpose()?;
        match date::format_date(format.to_str()?, timestamp, local == Some(true)) {
            Ok(text) => Ok(ctx.intern(text.as_bytes())),
            Err(err) => Err(format!("bad argument #2 to 'formatDate' ({err})")
                .into_value(ctx)
                .into()),
        }
    }

    /// Formats a number with thousands separators, unless the `noCommafy`
    /// option is set.
    fn format_num<'gc>(
        &self,
        ctx: Context<'gc>,
        (_code, n, options): (VmString<'gc>, Value<'gc>, Option<Table<'gc>>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let no_separators = options.is_some_and(|options| {
            options.get_value(ctx, "noCommafy").to_bool()
        });
        let text = n.display().to_string();
        Ok(ctx.intern(format_number(&text, no_separators).as_bytes()))
    }

    /// Returns the content language code of the wiki.
    fn get_cont_lang_code<'gc>(
        &self,
        ctx: Context<'gc>,
        (): (),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let db = get_db(&self.db)?;
        Ok(ctx.intern(db.config().lang_code.as_bytes()))
    }

    /// Returns true if the given string is a well-formed language tag.
    fn is_known_language_tag<'gc>(
        &self,
        _: Context<'gc>,
        code: VmString<'gc>,
    ) -> Result<bool, VmError<'gc>> {
        Ok(LANGUAGES.contains_key(code.to_str()?))
    }

    /// Returns true if the language with the given code is written
    /// right-to-left.
    fn is_rtl<'gc>(&self, _: Context<'gc>, code: VmString<'gc>) -> Result<bool, VmError<'gc>> {
        Ok(LANGUAGES
            .get(code.to_str()?)
            .is_some_and(|info| info.rtl))
    }

    /// Converts a string to lowercase.
    fn lc<'gc>(
        &self,
        ctx: Context<'gc>,
        (_code, text): (VmString<'gc>, VmString<'gc>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        Ok(ctx.intern(text.to_str()?.to_lowercase().as_bytes()))
    }

    /// Converts the first letter of a string to lowercase.
    fn lcfirst<'gc>(
        &self,
        ctx: Context<'gc>,
        (_code, text): (VmString<'gc>, VmString<'gc>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let mut chars = text.to_str()?.chars();
        Ok(if let Some(first) = chars.next() {
            ctx.intern(format!("{}{}", first.to_lowercase(), chars.as_str()).as_bytes())
        } else {
            text
        })
    }

    /// Converts a string to uppercase.
    fn uc<'gc>(
        &self,
        ctx: Context<'gc>,
        (_code, text): (VmString<'gc>, VmString<'gc>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        Ok(ctx.intern(text.to_str()?.to_uppercase().as_bytes()))
    }

    /// Converts the first letter of a string to uppercase.
    fn ucfirst<'gc>(
        &self,
        ctx: Context<'gc>,
        (_code, text): (VmString<'gc>, VmString<'gc>),
    ) -> Result<VmString<'gc>, VmError<'gc>> {
        let mut chars = text.to_str()?.chars();
        Ok(if let Some(first) = chars.next() {
            ctx.intern(format!("{}{}", first.to_uppercase(), chars.as_str()).as_bytes())
        } else {
            text
        })
    }
}

impl MwInterface for LanguageLibrary {
    const NAME: &str = "mw.language";
    const CODE: &[u8] = include_bytes!("./modules/mw.language.lua");

    fn register(ctx: Context<'_>) -> Table<'_> {
        interface! {
            using Self, ctx;

            fetchLanguageName = fetch_language_name,
            fetchLanguageNames = fetch_language_names,
            formatDate = format_date,
            formatNum = format_num,
            getContLangCode = get_cont_lang_code,
            isKnownLanguageTag = is_known_language_tag,
            isRTL = is_rtl,
            lc = lc,
            lcfirst = lcfirst,
            uc = uc,
            ucfirst = ucfirst,
        }
    }

    fn setup<'gc>(&self, ctx: Context<'gc>) -> Result<Table<'gc>, RuntimeError> {
        Ok(Table::new(&ctx))
    }
}

/// Inserts thousands separators into the integer part of a formatted
/// number.
fn format_number(text: &str, no_separators: bool) -> String {
    if no_separators {
        return text.to_string();
    }

    let (sign, rest) = text
        .strip_prefix('-')
        .map_or(("", text), |rest| ("-", rest));
    let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
    let (int, frac) = rest.split_at(digits);

    let mut out = String::with_capacity(text.len() + digits / 3);
    out += sign;
    for (index, c) in int.chars().enumerate() {
        if index != 0 && (digits - index) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out += frac;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_names() {
        assert_eq!(fetch_language_name("fr", None), Some("français"));
        assert_eq!(fetch_language_name("fr", Some("en")), Some("French"));
        assert_eq!(fetch_language_name("fr", Some("fr")), Some("français"));
        assert_eq!(fetch_language_name("xx-nope", None), None);
    }

    #[test]
    fn number_separators() {
        assert_eq!(format_number("1234567.5", false), "1,234,567.5");
        assert_eq!(format_number("-1000", false), "-1,000");
        assert_eq!(format_number("999", false), "999");
        assert_eq!(format_number("1234", true), "1234");
    }
}
