use super::*;
use crate::{
    config::Configuration,
    db::{MemoryBackend, Model, Page, PageBackend},
};
use std::sync::atomic::{AtomicBool, Ordering};

fn db() -> Database {
    let _ = env_logger::try_init();
    Database::new(Configuration::default())
}

fn template(db: &Database, title: &str, body: &str) {
    db.add_page(title, Namespace::TEMPLATE, Some(body), None, None);
}

/// Expands `text` on the page `title` in a new renderer.
fn expand(db: Database, title: &str, text: &str) -> String {
    let mut renderer = Renderer::new(Arc::new(db)).unwrap();
    renderer.start_page(title).unwrap();
    renderer.expand(text).unwrap()
}

#[test]
fn parameters_and_defaults() {
    let db = db();
    template(&db, "Template:t", "{{{1}}}-{{{2|two}}}-{{{name|}}}-{{{missing}}}");
    assert_eq!(
        expand(db, "", "{{t| a |name= b }}"),
        " a -two-b-{{{missing}}}"
    );
}

#[test]
fn positional_ordinals_skip_named_arguments() {
    let db = db();
    template(&db, "Template:t", "{{{1}}},{{{2}}},{{{x}}}");
    assert_eq!(expand(db, "", "{{t|a|x=y|b}}"), "a,b,y");
}

#[test]
fn expanded_equals_sign_is_not_a_name() {
    let db = db();
    template(&db, "Template:t", "{{{1|none}}}/{{{a|none}}}");
    assert_eq!(expand(db, "", "{{t|a{{=}}b}}"), "a=b/none");
}

#[test]
fn later_duplicate_argument_wins() {
    let db = db();
    template(&db, "Template:t", "{{{1}}}");
    assert_eq!(expand(db, "", "{{t|first|1=second}}"), "second");
}

#[test]
fn missing_template() {
    assert_eq!(expand(db(), "", "a{{no such thing}}b"), "a[[:Template:No such thing]]b");
}

#[test]
fn invalid_target_is_text() {
    assert_eq!(expand(db(), "", "{{a<b|c}}"), "{{a<b|c}}");
    assert_eq!(expand(db(), "", "{{unclosed"), "{{unclosed");
}

#[test]
fn malformed_nesting_is_text() {
    let text = "{{a|".repeat(3000);
    assert_eq!(expand(db(), "", &text), text);

    let text = format!("{}x{}", "[[".repeat(20000), "]]".repeat(20000));
    assert_eq!(expand(db(), "", &text), text);
}

#[test]
fn redirects_are_followed() {
    let db = db();
    db.add_page("Template:old", Namespace::TEMPLATE, None, None, Some("Template:new"));
    template(&db, "Template:new", "new {{{1}}}");
    assert_eq!(expand(db, "", "{{old|x}}"), "new x");
}

#[test]
fn inclusion_control() {
    let db = db();
    template(
        &db,
        "Template:t",
        "a<noinclude>doc</noinclude><includeonly>b</includeonly><!-- c -->",
    );
    template(
        &db,
        "Template:only",
        "x<onlyinclude>y</onlyinclude>z<onlyinclude>w</onlyinclude>",
    );
    assert_eq!(expand(db, "", "{{t}}|{{only}}"), "ab|yw");
}

#[test]
fn direct_expansion_drops_includeonly() {
    assert_eq!(
        expand(db(), "", "a<includeonly>b</includeonly><noinclude>c</noinclude>"),
        "ac"
    );
}

#[test]
fn depth_overflow_only_affects_its_branch() {
    let db = db();
    template(&db, "Template:loop", "x{{loop}}");
    template(&db, "Template:ok", "fine");
    let out = expand(db, "", "{{loop}}|{{ok}}");
    assert!(out.starts_with("xxxx"));
    assert!(out.contains(r#"<strong class="error">template stack overflow: Template:Loop</strong>"#));
    assert!(out.ends_with("|fine"));
}

#[test]
fn configured_depth_limit() {
    let mut config = Configuration::default();
    config.limits.max_depth = 2;
    let db = Database::new(config);
    template(&db, "Template:loop", "x{{loop}}");
    assert_eq!(
        expand(db, "", "{{loop}}"),
        r#"xx<strong class="error">template stack overflow: Template:Loop</strong>"#
    );
}

#[test]
fn conditionals() {
    let db = db();
    let text = concat!(
        "{{#if: x | yes | no }}|{{#if: | yes | no }}|",
        "{{#ifeq: 01 | 1 | same | different }}|{{#ifeq: a | b | same | different }}|",
        "{{#switch: b | a = A | b | c = BC | #default = D }}|{{#switch: z | a = A | D }}|",
        "{{#ifexist: Template:t | there | missing }}|{{#ifexist: Nope | there | missing }}",
    );
    template(&db, "Template:t", "");
    assert_eq!(
        expand(db, "", text),
        "yes|no|same|different|BC|D|there|missing"
    );
}

#[test]
fn iferror() {
    assert_eq!(
        expand(
            db(),
            "",
            r#"{{#iferror: <strong class="error">x</strong> | bad | good }}|{{#iferror: fine | bad }}"#
        ),
        "bad|fine"
    );
}

#[test]
fn string_functions() {
    assert_eq!(
        expand(
            db(),
            "",
            "{{lc:ABC}}|{{uc:abc}}|{{ucfirst:abc}}|{{lcfirst:ABC}}|{{padleft:7|3}}|{{padright:a|3|bc}}"
        ),
        "abc|ABC|Abc|aBC|007|abc"
    );
}

#[test]
fn variables() {
    assert_eq!(
        expand(
            db(),
            "Appendix:foo/bar",
            "{{PAGENAME}}|{{FULLPAGENAME}}|{{NAMESPACE}}|{{SITENAME}}|{{SUBPAGENAME}}|{{!}}"
        ),
        "Foo/bar|Appendix:Foo/bar|Appendix|Wiktionary|bar||"
    );
}

#[test]
fn namespace_names() {
    assert_eq!(
        expand(db(), "", "{{ns:4}}|{{ns:project}}|{{ns:Module}}"),
        "Wiktionary|Wiktionary|Module"
    );
}

#[test]
fn language_names() {
    assert_eq!(
        expand(db(), "", "{{#language:fr}}|{{#language:fr|en}}|{{#language:xx-nope}}"),
        "français|French|xx-nope"
    );
}

#[test]
fn tag_parser_function() {
    let db = db();
    let mut renderer = Renderer::new(Arc::new(db)).unwrap();
    renderer.start_page("").unwrap();
    assert_eq!(
        renderer.expand(r#"{{#tag:span|text|class="a"}}"#).unwrap(),
        r#"<span class="a">text</span>"#
    );

    let out = renderer.expand("{{#tag:ref|note|name=x}}").unwrap();
    assert_eq!(out, "\x7f'\"`UNIQ--ref-00000000-QINU`\"'\x7f");
    assert_eq!(
        renderer.strip_markers().get(&out),
        Some(r#"<ref name="x">note</ref>"#)
    );
}

#[test]
fn extension_tags_become_markers() {
    let db = db();
    let mut renderer = Renderer::new(Arc::new(db)).unwrap();
    renderer.start_page("").unwrap();
    let out = renderer
        .expand("a<nowiki>{{x}}</nowiki>b<nowiki>{{x}}</nowiki>")
        .unwrap();
    assert_eq!(
        out,
        concat!(
            "a\x7f'\"`UNIQ--nowiki-00000000-QINU`\"'\x7f",
            "b\x7f'\"`UNIQ--nowiki-00000001-QINU`\"'\x7f",
        )
    );
    assert_eq!(
        renderer.strip_markers().unstrip(&out),
        "a<nowiki>{{x}}</nowiki>b<nowiki>{{x}}</nowiki>"
    );

    renderer.start_page("other").unwrap();
    assert!(renderer.strip_markers().is_empty());
    assert_eq!(
        renderer.expand("<nowiki/>").unwrap(),
        "\x7f'\"`UNIQ--nowiki-00000000-QINU`\"'\x7f"
    );
}

#[test]
fn expand_page() {
    let db = db();
    db.add_page("Some page", Namespace::MAIN, Some("{{t|1=x}}"), Some(Model::Wikitext), None);
    template(&db, "Template:t", "[[{{{1}}}|{{PAGENAME}}]]");
    let mut renderer = Renderer::new(Arc::new(db)).unwrap();
    assert_eq!(
        renderer.expand_page("Some page").unwrap().as_deref(),
        Some("[[x|Some page]]")
    );
    assert_eq!(renderer.expand_page("Missing page").unwrap(), None);
    renderer.close();
}

/// A memory backend which records whether it was closed.
#[derive(Default)]
struct ClosingBackend {
    pages: MemoryBackend,
    closed: Arc<AtomicBool>,
}

impl PageBackend for ClosingBackend {
    fn get(&self, namespace: i32, title: &str) -> Option<Arc<Page>> {
        self.pages.get(namespace, title)
    }

    fn put(&self, page: Page) {
        self.pages.put(page);
    }

    fn titles(&self, namespace: i32) -> Vec<String> {
        self.pages.titles(namespace)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pages.close();
    }
}

#[test]
fn closing_a_renderer_keeps_the_shared_store() {
    let backend = ClosingBackend::default();
    let closed = Arc::clone(&backend.closed);
    let db = Database::with_backend(Configuration::default(), Box::new(backend));
    template(&db, "Template:t", "body");
    let db = Arc::new(db);

    let first = Renderer::new(Arc::clone(&db)).unwrap();
    let mut second = Renderer::new(Arc::clone(&db)).unwrap();
    first.close();
    assert!(!closed.load(Ordering::SeqCst));
    second.start_page("").unwrap();
    assert_eq!(second.expand("{{t}}").unwrap(), "body");

    drop(db);
    second.close();
    assert!(closed.load(Ordering::SeqCst));
}
