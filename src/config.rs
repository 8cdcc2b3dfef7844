//! Site configuration.
//!
//! Wikitext documents are not self-encapsulated and cannot be expanded without
//! out-of-band configuration data: namespace names and aliases, the set of
//! extension tag names, and the name and language of the site. Everything here
//! can be loaded from JSON; [`Configuration::default`] describes an English
//! Wiktionary-like installation.

use serde::Deserialize;
use std::{collections::HashSet, path::Path, time::Duration};
use unicase::UniCase;

/// The title casing strategy for a namespace.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceCase {
    /// The first letter of a title is capitalised.
    #[default]
    FirstLetter,
    /// Titles are case-sensitive.
    CaseSensitive,
}

/// A page namespace.
#[derive(Clone, Debug, Deserialize)]
pub struct Namespace {
    /// The namespace ID.
    pub id: i32,
    /// The display name of the namespace.
    pub name: String,
    /// The canonical name of the namespace.
    ///
    /// The canonical 'Project' namespace is normally given a display name
    /// matching the name of the wiki.
    #[serde(default)]
    pub canonical: Option<String>,
    /// Named aliases for the namespace.
    #[serde(default)]
    pub aliases: Vec<String>,
    /// The case folding strategy for titles in the namespace.
    #[serde(default)]
    pub case: NamespaceCase,
    /// Whether the namespace supports subpages.
    #[serde(default)]
    pub subpages: bool,
    /// Whether pages in this namespace are the main content of the wiki.
    #[serde(default)]
    pub content: bool,
}

impl Namespace {
    /// The main namespace ID.
    pub const MAIN: i32 = 0;
    /// The user namespace ID.
    pub const USER: i32 = 2;
    /// The project namespace ID.
    pub const PROJECT: i32 = 4;
    /// The template namespace ID.
    pub const TEMPLATE: i32 = 10;
    /// The ID of the Scribunto `Module:` namespace.
    pub const MODULE: i32 = 828;

    /// Returns true if `name` matches the display name, the canonical name, or
    /// any alias of this namespace, ignoring case.
    pub fn matches(&self, name: &str) -> bool {
        let name = UniCase::new(name);
        name == UniCase::new(self.name.as_str())
            || self
                .canonical
                .as_deref()
                .is_some_and(|canonical| name == UniCase::new(canonical))
            || self
                .aliases
                .iter()
                .any(|alias| name == UniCase::new(alias.as_str()))
    }

    /// Returns true if this is a talk namespace.
    pub fn is_talk(&self) -> bool {
        self.id > Self::MAIN && self.id % 2 == 1
    }
}

/// Resource limits for expansion and script execution.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// The maximum template expansion depth.
    pub max_depth: usize,
    /// The wall-clock budget for one `#invoke`.
    #[serde(with = "seconds")]
    pub script_time: Duration,
    /// The maximum size of the Lua heap, in bytes.
    pub script_memory: usize,
    /// The number of VM instructions to run between budget checks.
    pub fuel_per_step: i32,
    /// The number of parsed templates to keep in memory.
    pub template_cache_entries: u32,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_depth: 40,
            script_time: Duration::from_secs(10),
            script_memory: 128 * 1_048_576,
            fuel_per_step: 16384,
            template_cache_entries: 512,
        }
    }
}

/// (De)serialisation of a [`Duration`] as fractional seconds.
mod seconds {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(de)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// The configuration of one MediaWiki installation.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// The name of the site, which is also the display name of the project
    /// namespace.
    pub site_name: String,
    /// The content language code.
    pub lang_code: String,
    /// The project family, e.g. 'wiktionary'.
    pub project: String,
    /// The registered namespaces.
    pub namespaces: Vec<Namespace>,
    /// The names of extension tags whose contents are replaced by strip
    /// markers.
    pub extension_tags: HashSet<String>,
    /// Resource limits.
    pub limits: Limits,
}

impl Configuration {
    /// Loads a configuration from a JSON file. Missing fields take their
    /// default values.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path.as_ref())?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    /// Finds the namespace with the given numeric ID.
    pub fn namespace(&self, id: i32) -> Option<&Namespace> {
        self.namespaces.iter().find(|ns| ns.id == id)
    }

    /// Finds the namespace with the given case-insensitive name, canonical
    /// name, or alias.
    pub fn namespace_by_name(&self, name: &str) -> Option<&Namespace> {
        let name = name.trim().replace('_', " ");
        self.namespaces.iter().find(|ns| ns.matches(&name))
    }

    /// Returns true if `name` is a registered extension tag.
    pub fn is_extension_tag(&self, name: &str) -> bool {
        self.extension_tags.contains(name)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        let site_name = "Wiktionary";
        let ns = |id, name: &str, canonical: Option<&str>, aliases: &[&str]| Namespace {
            id,
            name: name.to_string(),
            canonical: canonical.map(ToString::to_string),
            aliases: aliases.iter().map(ToString::to_string).collect(),
            case: NamespaceCase::FirstLetter,
            subpages: id != Namespace::MAIN,
            content: id == Namespace::MAIN,
        };

        Self {
            site_name: site_name.to_string(),
            lang_code: "en".to_string(),
            project: "wiktionary".to_string(),
            namespaces: vec![
                ns(-2, "Media", Some("Media"), &[]),
                ns(-1, "Special", Some("Special"), &[]),
                ns(0, "", None, &[]),
                ns(1, "Talk", Some("Talk"), &[]),
                ns(2, "User", Some("User"), &[]),
                ns(3, "User talk", Some("User talk"), &[]),
                ns(4, site_name, Some("Project"), &["WT"]),
                ns(5, "Wiktionary talk", Some("Project talk"), &["WT talk"]),
                ns(6, "File", Some("File"), &["Image"]),
                ns(7, "File talk", Some("File talk"), &["Image talk"]),
                ns(8, "MediaWiki", Some("MediaWiki"), &[]),
                ns(9, "MediaWiki talk", Some("MediaWiki talk"), &[]),
                ns(10, "Template", Some("Template"), &["T"]),
                ns(11, "Template talk", Some("Template talk"), &[]),
                ns(12, "Help", Some("Help"), &[]),
                ns(13, "Help talk", Some("Help talk"), &[]),
                ns(14, "Category", Some("Category"), &["CAT"]),
                ns(15, "Category talk", Some("Category talk"), &[]),
                ns(100, "Appendix", None, &["AP"]),
                ns(118, "Reconstruction", None, &["RC"]),
                ns(828, "Module", Some("Module"), &["MOD"]),
                ns(829, "Module talk", Some("Module talk"), &[]),
            ],
            extension_tags: [
                "ce", "chem", "gallery", "graph", "hiero", "imagemap", "indicator",
                "mapframe", "maplink", "math", "nowiki", "poem", "pre", "ref", "references",
                "score", "section", "source", "syntaxhighlight", "templatedata",
                "templatestyles", "timeline",
            ]
            .into_iter()
            .map(ToString::to_string)
            .collect(),
            limits: Limits::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_alias() {
        let config = Configuration::default();
        let ns = config.namespace_by_name("project").unwrap();
        assert_eq!(ns.id, Namespace::PROJECT);
        assert_eq!(ns.name, "Wiktionary");
        assert_eq!(config.namespace_by_name("wt").unwrap().id, Namespace::PROJECT);
        assert_eq!(
            config.namespace_by_name("Module_talk").unwrap().id,
            Namespace::MODULE + 1
        );
        assert!(config.namespace_by_name("Nope").is_none());
    }

    #[test]
    fn partial_json() {
        let config = serde_json::from_str::<Configuration>(
            r#"{ "site_name": "Wikipedia", "limits": { "max_depth": 5, "script_time": 0.5 } }"#,
        )
        .unwrap();
        assert_eq!(config.site_name, "Wikipedia");
        assert_eq!(config.limits.max_depth, 5);
        assert_eq!(config.limits.script_time, Duration::from_millis(500));
        assert_eq!(config.limits.fuel_per_step, Limits::default().fuel_per_step);
        assert!(config.is_extension_tag("nowiki"));
    }
}
