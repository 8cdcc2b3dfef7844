use crate::{
    config::{Configuration, Namespace},
    db::{
        Database, InterwikiEntry, InterwikiSource, KnowledgeBase, KnowledgeQuery, LookupError,
        MemoryBackend, Model, Page, PageBackend,
    },
    renderer::Renderer,
};
use serde_json::{Value, json};
use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// A knowledge base which answers every query with the same response and
/// counts how often it was asked.
struct FixedKnowledgeBase {
    response: Value,
    calls: AtomicUsize,
}

impl FixedKnowledgeBase {
    fn new(response: Value) -> Arc<Self> {
        Arc::new(Self {
            response,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KnowledgeBase for FixedKnowledgeBase {
    fn query(&self, _: &KnowledgeQuery<'_>) -> Result<Value, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

/// An interwiki source with a single prefix which counts how often it was
/// asked.
#[derive(Default)]
struct FixedInterwiki {
    calls: AtomicUsize,
}

impl FixedInterwiki {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl InterwikiSource for FixedInterwiki {
    fn interwiki_data(&self) -> Result<Vec<InterwikiEntry>, LookupError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![InterwikiEntry {
            prefix: "en".into(),
            local: true,
            language: Some("English".into()),
            bcp47: Some("en".into()),
            url: "https://en.wikipedia.org/wiki/$1".into(),
            protorel: false,
        }])
    }
}

/// A memory backend which counts reads of the given module pages.
struct CountingBackend {
    pages: MemoryBackend,
    watched: &'static [&'static str],
    reads: Arc<AtomicUsize>,
}

impl CountingBackend {
    fn new(watched: &'static [&'static str]) -> Self {
        Self {
            pages: MemoryBackend::default(),
            watched,
            reads: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl PageBackend for CountingBackend {
    fn get(&self, namespace: i32, title: &str) -> Option<Arc<Page>> {
        if namespace == Namespace::MODULE
            && self.watched.iter().any(|watched| watched.eq_ignore_ascii_case(title))
        {
            self.reads.fetch_add(1, Ordering::SeqCst);
        }
        self.pages.get(namespace, title)
    }

    fn put(&self, page: Page) {
        self.pages.put(page);
    }

    fn titles(&self, namespace: i32) -> Vec<String> {
        self.pages.titles(namespace)
    }
}

/// Creates a database whose reads of the `watched` modules are counted.
fn counting_db(watched: &'static [&'static str]) -> (Database, Arc<AtomicUsize>) {
    let _ = env_logger::try_init();
    let backend = CountingBackend::new(watched);
    let reads = Arc::clone(&backend.reads);
    (
        Database::with_backend(Configuration::default(), Box::new(backend)),
        reads,
    )
}

fn module(db: &Database, title: &str, body: &str) {
    db.add_page(title, Namespace::MODULE, Some(body), Some(Model::Script), None);
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

/// Expands `{{#invoke:test|test}}` with the given module body.
fn invoke_test(db: Database, body: &str) -> String {
    module(&db, "Module:test", body);
    expand(db, "", "{{#invoke:test|test}}")
}

fn db() -> Database {
    let _ = env_logger::try_init();
    Database::new(Configuration::default())
}

#[test]
fn fetch_language_name() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test()
          local value = mw.language.fetchLanguageName("fr")
          return value .. " " .. mw.language.fetchLanguageName("fr", "en")
        end
        return export
        "#,
    );
    assert_eq!(out, "français French");
}

#[test]
fn language_format_date() {
    let out = invoke_test(
        db(),
        r"
        local export = {}
        function export.test()
          local lang = mw.language.getContentLanguage()
          local ok, err = pcall(lang.formatDate, lang, 'Y', 'not a date')
          return lang:formatDate('j F Y H:i', '2001-09-11 08:46') .. '|' ..
            lang:formatDate('U', '@0') .. '|' ..
            #lang:formatDate('Y-m-d') .. '|' ..
            tostring(ok) .. '|' .. tostring(err:find('formatDate', 1, true) ~= nil)
        end
        return export
        ",
    );
    assert_eq!(out, "11 September 2001 08:46|0|10|false|true");
}

#[test]
fn invocations_have_isolated_globals() {
    let db = db();
    module(
        &db,
        "Module:a",
        r#"
        local export = {}
        value = "a"
        function export.func()
          return mw.getCurrentFrame():expandTemplate{title="b"} .. " " .. value
        end
        return export
        "#,
    );
    module(
        &db,
        "Module:b",
        r"
        local export = {}
        value = 'b'
        function export.func()
          return value
        end
        return export
        ",
    );
    module(
        &db,
        "Module:c",
        r#"
        local export = {}
        function export.func()
          return value or "c"
        end
        return export
        "#,
    );
    template(&db, "Template:a", "{{#invoke:a|func}}");
    template(&db, "Template:b", "{{#invoke:b|func}}");
    template(&db, "Template:c", "{{#invoke:b|func}} {{#invoke:c|func}}");

    let mut renderer = Renderer::new(Arc::new(db)).unwrap();
    renderer.start_page("test lua env").unwrap();
    assert_eq!(renderer.expand("{{c}}").unwrap(), "b c");
    assert_eq!(renderer.expand("{{a}}").unwrap(), "b a");
}

#[test]
fn required_modules_share_the_environment() {
    let db = db();
    module(
        &db,
        "Module:a",
        r#"
        local export = {}
        b = require("Module:b")
        c = require("Module:c")
        function export.func()
          return c.func()
        end
        return export
        "#,
    );
    module(
        &db,
        "Module:b",
        r#"
        local export = {}
        function export.func()
          return "b"
        end
        return export
        "#,
    );
    module(
        &db,
        "Module:c",
        r"
        local export = {}
        function export.func()
          return b.func()
        end
        return export
        ",
    );
    assert_eq!(expand(db, "test lua env", "{{#invoke:a|func}}"), "b");
}

#[test]
fn library_changes_do_not_leak() {
    let db = db();
    module(
        &db,
        "Module:a",
        r"
        local export = {}
        function export.func()
          string.foo = 'leaked'
          mw.foo = 'leaked'
          return 'a'
        end
        return export
        ",
    );
    module(
        &db,
        "Module:b",
        r"
        local export = {}
        function export.func()
          return tostring(string.foo) .. tostring(mw.foo)
        end
        return export
        ",
    );
    assert_eq!(
        expand(db, "", "{{#invoke:a|func}} {{#invoke:b|func}}"),
        "a nilnil"
    );
}

#[test]
fn interwiki_map() {
    let source = FixedInterwiki::new();
    let db = db().with_interwiki(source.clone());
    module(
        &db,
        "Module:test",
        r"
        local export = {}
        function export.test()
          local first = mw.site.interwikiMap().en.url
          assert(mw.site.interwikiMap().en.url == first)
          return first
        end
        return export
        ",
    );
    assert_eq!(
        expand(db, "", "{{#invoke:test|test}} {{#invoke:test|test}}"),
        "https://en.wikipedia.org/wiki/$1 https://en.wikipedia.org/wiki/$1"
    );
    assert_eq!(source.calls(), 1);
}

#[test]
fn wikibase_label_and_description() {
    let kb = FixedKnowledgeBase::new(json!({
        "itemLabel": { "value": "Humphry Davy" },
        "itemDescription": { "value": "British chemist" },
    }));
    let db = db().with_knowledge_base(kb.clone());
    let out = invoke_test(
        db,
        r#"
        local export = {}
        function export.test()
          local coiner = "Q131761"
          return mw.wikibase.getDescription(coiner) .. " " ..
            mw.wikibase.getLabel(coiner)
        end
        return export
        "#,
    );
    assert_eq!(out, "British chemist Humphry Davy");
    assert_eq!(kb.calls(), 1);
}

#[test]
fn nowiki_extension_tag_markers() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test(frame)
          return frame:extensionTag("nowiki", "") ..
            frame:extensionTag("nowiki", "")
        end
        return export
        "#,
    );
    assert_eq!(
        out,
        "\x7f'\"`UNIQ--nowiki-00000000-QINU`\"'\x7f\x7f'\"`UNIQ--nowiki-00000001-QINU`\"'\x7f"
    );
}

#[test]
fn preprocess_heading_markers() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test(frame)
          return frame:preprocess("==a==") ..
            frame:preprocess("==a==") ..
            frame:preprocess("==b==") ..
            frame:preprocess("=b=")
        end
        return export
        "#,
    );
    assert_eq!(
        out,
        concat!(
            "==\x7f'\"`UNIQ--h-00000000-QINU`\"'\x7fa==",
            "==\x7f'\"`UNIQ--h-00000001-QINU`\"'\x7fa==",
            "==\x7f'\"`UNIQ--h-00000002-QINU`\"'\x7fb==",
            "=\x7f'\"`UNIQ--h-00000003-QINU`\"'\x7fb=",
        )
    );
}

#[test]
fn html_builder() {
    let out = invoke_test(
        db(),
        r"
        local export = {}
        function export.test()
          local root = mw.html.create('')
          root:tag('span'):wikitext('foo'):done()
          return tostring(root)
        end
        return export
        ",
    );
    assert_eq!(out, "<span>foo</span>");

    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test()
          return tostring(mw.html.create('div')
            :attr('id', 'a"b')
            :addClass('x'):addClass('y')
            :css('color', 'red')
            :tag('br'):done()
            :wikitext('text'))
        end
        return export
        "#,
    );
    assert_eq!(
        out,
        r#"<div id="a&quot;b" class="x y" style="color:red"><br />text</div>"#
    );
}

#[test]
fn wikibase_entity_id_for_title() {
    let kb = FixedKnowledgeBase::new(json!({
        "item": { "value": "http://www.wikidata.org/entity/Q42" },
        "itemLabel": { "value": "Douglas Adams" },
    }));
    let db = db().with_knowledge_base(kb.clone());
    let out = invoke_test(
        db,
        r#"
        local export = {}
        function export.test(frame)
          local a = mw.wikibase.getEntityIdForTitle("Douglas Adams", "enwiki")
          local b = mw.wikibase.getEntityIdForTitle("Douglas Adams", "enwiki")
          return a .. b
        end
        return export
        "#,
    );
    assert_eq!(out, "Q42Q42");
    assert_eq!(kb.calls(), 1);
}

#[test]
fn wikibase_entity_id_for_title_not_found() {
    let kb = FixedKnowledgeBase::new(json!({}));
    let db = db().with_knowledge_base(kb.clone());
    let out = invoke_test(
        db,
        r#"
        local export = {}
        function export.test(frame)
          local a = mw.wikibase.getEntityIdForTitle("not exist page", "enwiki")
          local b = mw.wikibase.getEntityIdForTitle("not exist page", "enwiki")
          return a
        end
        return export
        "#,
    );
    assert_eq!(out, "");
    assert_eq!(kb.calls(), 1);
}

#[test]
fn wikibase_badges() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test(frame)
          local a = mw.wikibase.getBadges("Douglas Adams", "enwiki")
          if type(a) == 'table' and next(a) == nil then
            return 'foo'
          end
          return 'bar'
        end
        return export
        "#,
    );
    assert_eq!(out, "foo");
}

#[test]
fn wikibase_entity() {
    let kb = FixedKnowledgeBase::new(json!({ "entities": { "Q42": { "id": "Q42" } } }));
    let db = db().with_knowledge_base(kb.clone());
    let out = invoke_test(
        db,
        r#"
        local export = {}
        function export.test(frame)
          local a = mw.wikibase.getEntity("Q42")
          local b = mw.wikibase.getEntity("Q42")
          return a:getId() .. b:getId()
        end
        return export
        "#,
    );
    assert_eq!(out, "Q42Q42");
    assert_eq!(kb.calls(), 1);
}

#[test]
fn wikibase_statements() {
    let kb = FixedKnowledgeBase::new(json!({ "entities": { "Q42": {
        "id": "Q42",
        "claims": { "P31": [
            { "type": "statement", "rank": "normal", "id": "a" },
            { "type": "statement", "rank": "preferred", "id": "b" },
        ] },
    } } }));
    let db = db().with_knowledge_base(kb);
    let out = invoke_test(
        db,
        r#"
        local export = {}
        function export.test(frame)
          return mw.wikibase.getAllStatements("Q42", "P31")[1].type ..
            mw.wikibase.getBestStatements("Q42", "P31")[1].id ..
            #mw.wikibase.getAllStatements("Q42", "P999")
        end
        return export
        "#,
    );
    assert_eq!(out, "statementb0");
}

#[test]
fn wikibase_sitelink() {
    let kb = FixedKnowledgeBase::new(json!({ "entities": { "Q37041": {
        "id": "Q37041",
        "sitelinks": { "kowiki": { "title": "한문" } },
    } } }));
    let db = db().with_knowledge_base(kb.clone());
    let out = invoke_test(
        db,
        r#"
        local export = {}
        function export.test(frame)
          local a = mw.wikibase.getSitelink("Q37041", "kowiki")
          local b = mw.wikibase.getSitelink("Q37041", "kowiki")
          return a .. b
        end
        return export
        "#,
    );
    assert_eq!(out, "한문한문");
    assert_eq!(kb.calls(), 1);
}

#[test]
fn tabular_data_placeholder() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test(frame)
          local a = mw.ext.data.get("Douglas Adams", "_")
          if type(a) ~= 'table' or type(a.schema) ~= 'table' then
            return 'bar'
          end
          a.data[1] = 'changed'
          if #mw.ext.data.get("Douglas Adams").data ~= 0 then
            return 'shared'
          end
          if type(a.schema.fields) ~= 'table' or type(a.data) ~= 'table' then
            return 'bar'
          end
          return 'foo'
        end
        return export
        "#,
    );
    assert_eq!(out, "foo");
}

#[test]
fn text_decode() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test(frame)
          local a = mw.text.decode("&lt;-&vert;-&#124;-&#x7c;")
          local b = mw.text.decode("&lt;-&vert;-&#124;-&#x7c;", true)
          return a .. "--" .. b
        end
        return export
        "#,
    );
    assert_eq!(out, "<-&vert;-|-|--<-|-|-|");
}

#[test]
fn text_helpers() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test(frame)
          return mw.text.trim("  a b  ") .. "|" ..
            mw.text.listToText({ "x", "y", "z" }) .. "|" ..
            table.concat(mw.text.split("a,b,,c", ","), ";") .. "|" ..
            mw.text.tag("br", nil, false) .. "|" ..
            mw.text.encode("<&>")
        end
        return export
        "#,
    );
    assert_eq!(out, "a b|x, y and z|a;b;;c|<br />|&lt;&amp;&gt;");
}

#[test]
fn call_parser_function_ignores_nil() {
    let out = invoke_test(
        db(),
        r#"
        local export = {}
        function export.test(frame)
          return frame:callParserFunction("#tag", "a", "text", nil)
        end
        return export
        "#,
    );
    assert_eq!(out, "<a>text</a>");
}

#[test]
fn load_data_runs_in_a_separate_environment() {
    let db = db();
    module(
        &db,
        "Module:Citation/CS1",
        r"
        require ('strict');
        local export = {}
        function export.citation(frame)
          return mw.loadData('Module:Citation/CS1/Configuration');
        end
        return export
        ",
    );
    module(
        &db,
        "Module:Citation/CS1/Configuration",
        r#"
        uncategorized_namespaces_t = {[2]=true};
        return "Configuration"
        "#,
    );
    assert_eq!(
        expand(db, "", "{{#invoke:Citation/CS1|citation}}"),
        "Configuration"
    );
}

#[test]
fn strict_rejects_undeclared_reads() {
    let out = invoke_test(
        db(),
        r"
        require('strict')
        local export = {}
        function export.test(frame)
          return undeclared_value
        end
        return export
        ",
    );
    assert!(out.contains(r#"<strong class="error">Lua execution error"#));
}

#[test]
fn load_data_is_read_only() {
    let db = db();
    module(&db, "Module:data", "return { a = { b = 'c' } }");
    let out = invoke_test(
        db,
        r"
        local export = {}
        function export.test(frame)
          local data = mw.loadData('Module:data')
          local ok = pcall(function () data.a.b = 'x' end)
          return data.a.b .. tostring(ok)
        end
        return export
        ",
    );
    assert_eq!(out, "cfalse");
}

#[test]
fn load_json_data() {
    let db = db();
    db.add_page(
        "Module:test.json",
        Namespace::MODULE,
        Some(r#"{"key": "value"}"#),
        Some(Model::Json),
        None,
    );
    let out = invoke_test(
        db,
        r#"
        local export = {}
        function export.test(frame)
          local data = mw.loadJsonData('Module:test.json')
          return data["key"]
        end
        return export
        "#,
    );
    assert_eq!(out, "value");
}

#[test]
fn loaded_data_is_shared_across_invocations_and_pages() {
    let (db, reads) = counting_db(&["Module:data", "Module:test.json"]);
    module(&db, "Module:data", "return { value = 'x' }");
    db.add_page(
        "Module:test.json",
        Namespace::MODULE,
        Some(r#"{"key": "value"}"#),
        Some(Model::Json),
        None,
    );
    module(
        &db,
        "Module:test",
        r"
        local export = {}
        function export.test(frame)
          local data = mw.loadData('Module:data')
          local json = mw.loadJsonData('Module:test.json')
          assert(mw.loadData('data') == data)
          assert(mw.loadJsonData('Module:test.json') == json)
          return tostring(data) .. '/' .. tostring(json)
        end
        return export
        ",
    );

    let mut renderer = Renderer::new(Arc::new(db)).unwrap();
    renderer.start_page("first").unwrap();
    let out = renderer
        .expand("{{#invoke:test|test}}|{{#invoke:test|test}}")
        .unwrap();
    let (first, second) = out.split_once('|').unwrap();
    assert_eq!(first, second);

    renderer.start_page("second").unwrap();
    assert_eq!(renderer.expand("{{#invoke:test|test}}").unwrap(), first);
    assert_eq!(reads.load(Ordering::SeqCst), 2);
}

#[test]
fn load_data_caches_modules_returning_nil() {
    let (db, reads) = counting_db(&["Module:nothing"]);
    module(&db, "Module:nothing", "local unused = 1");
    module(
        &db,
        "Module:test",
        r"
        local export = {}
        function export.test(frame)
          return tostring(mw.loadData('nothing')) .. tostring(mw.loadData('Module:nothing'))
        end
        return export
        ",
    );
    assert_eq!(
        expand(db, "", "{{#invoke:test|test}} {{#invoke:test|test}}"),
        "nilnil nilnil"
    );
    assert_eq!(reads.load(Ordering::SeqCst), 1);
}

#[test]
fn invoke_from_preprocess_gets_a_fresh_environment() {
    let db = db();
    module(
        &db,
        "Module:a",
        r"
        local export = {}
        function export.func(frame)
          value = 'a'
          return frame:preprocess('{{#invoke:b|func}}') .. value
        end
        return export
        ",
    );
    module(
        &db,
        "Module:b",
        r"
        local export = {}
        function export.func()
          local seen = tostring(value)
          value = 'b'
          return seen
        end
        return export
        ",
    );
    assert_eq!(expand(db, "", "{{#invoke:a|func}}"), "nila");
}

#[test]
fn host_call_errors_can_be_caught() {
    let mut config = Configuration::default();
    config.limits.max_depth = 1;
    let db = Database::new(config);
    let out = invoke_test(
        db,
        r"
        local export = {}
        function export.test(frame)
          local child = frame:newChild{ title = 'x' }
          local ok, err = pcall(child.expandTemplate, child, { title = 'y' })
          return tostring(ok) .. '|' .. tostring(err:find('stack overflow', 1, true) ~= nil)
        end
        return export
        ",
    );
    assert_eq!(out, "false|true");
}

#[test]
fn ustring_patterns() {
    let out = invoke_test(
        db(),
        r"
        local export = {}
        function export.test(frame)
          local words = {}
          for word in mw.ustring.gmatch('α β γ', '%S+') do
            words[#words + 1] = word
          end
          return table.concat({ mw.ustring.find('héllo', 'l+') }, ',') .. '|' ..
            mw.ustring.match('añb-c', '(%a+)') .. '|' ..
            mw.ustring.gsub('héllo', 'é', 'e') .. '|' ..
            table.concat(words, ',')
        end
        return export
        ",
    );
    assert_eq!(out, "3,4|añb|hello|α,β,γ");
}

#[test]
fn text_split_with_patterns() {
    let out = invoke_test(
        db(),
        r"
        local export = {}
        function export.test(frame)
          return table.concat(mw.text.split('a1b22c', '%d+'), ';') .. '|' ..
            table.concat(mw.text.split('a%db', '%d', true), ';')
        end
        return export
        ",
    );
    assert_eq!(out, "a;b;c|a;b");
}

#[test]
fn module_named_like_a_library() {
    let db = db();
    module(
        &db,
        "Module:math",
        r"
        local export = {}
        function export.sum(frame)
          return 1
        end
        return export
        ",
    );
    assert_eq!(expand(db, "sea", "{{#invoke:math|sum}}"), "1");
}

#[test]
fn uri_anchor_encode() {
    let db = db();
    module(
        &db,
        "Module:test",
        r#"
        local export = {}
        function export.test(frame)
          return mw.uri.anchorEncode("&#42;") .. mw.uri.anchorEncode("&#x2A;")
        end
        return export
        "#,
    );
    assert_eq!(
        expand(db, "Reconstruction:Proto-Turkic/us-", "{{#invoke:test|test}}"),
        "**"
    );
}

#[test]
fn numeric_looking_argument_names() {
    let db = db();
    module(
        &db,
        "Module:test",
        r#"
        local export = {}
        function export.test(frame)
          return tostring(frame.args['0']) .. "|" ..
            tostring(frame.args['00']) .. "|" ..
            tostring(frame.args[1]) .. "|" ..
            tostring(frame.args[2]) .. "|" ..
            tostring(frame.args['named'])
        end
        return export
        "#,
    );
    assert_eq!(
        expand(
            db,
            "θηλυκός",
            "{{#invoke:test|test|0= 0 |00= 00 | first |2= second |named= named }}"
        ),
        "0|00| first |second|named"
    );
}

#[test]
fn named_argument_is_trimmed_after_expansion() {
    let db = db();
    module(
        &db,
        "Module:test",
        r"
        local export = {}
        function export.test(frame)
          return tostring(frame.args['foo'])
        end
        return export
        ",
    );
    assert_eq!(
        expand(
            db,
            "θηλυκός",
            "{{#invoke:test|test|foo=  {{#if||}} {{#if||}} }}"
        ),
        ""
    );
}

#[test]
fn parent_frame_arguments() {
    let db = db();
    module(
        &db,
        "Module:test",
        r#"
        local export = {}
        function export.test(frame)
          local parent = frame:getParent()
          local count = 0
          for _ in pairs(parent.args) do
            count = count + 1
          end
          return parent.args[1] .. parent.args['2'] .. parent.args.x .. count ..
            "|" .. parent:getTitle() .. "|" .. frame:getTitle()
        end
        return export
        "#,
    );
    template(&db, "Template:wrap", "{{#invoke:test|test}}");
    assert_eq!(
        expand(db, "", "{{wrap|a|b|x=y}}"),
        "aby3|Template:Wrap|Module:Test"
    );
}

#[test]
fn site_namespaces_by_canonical_name() {
    let out = invoke_test(
        db(),
        r"
        local export = {}
        function export.test(frame)
          return mw.site.namespaces.Project.name
        end
        return export
        ",
    );
    assert_eq!(out, "Wiktionary");
}

#[test]
fn current_title() {
    let db = db();
    module(
        &db,
        "Module:test",
        r#"
        local export = {}
        function export.test(frame)
          local title = mw.title.getCurrentTitle()
          return title.text .. "|" .. title.baseText .. "|" ..
            title.subpageText .. "|" .. tostring(title.isSubpage)
        end
        return export
        "#,
    );
    assert_eq!(
        expand(db, "Module:foo/bar/baz", "{{#invoke:test|test}}"),
        "Foo/bar/baz|Foo/bar|baz|true"
    );
}

#[test]
fn script_errors_do_not_stop_expansion() {
    let db = db();
    module(
        &db,
        "Module:test",
        r"
        local export = {}
        function export.bad(frame)
          error('oops')
        end
        function export.good(frame)
          return 'ok'
        end
        return export
        ",
    );
    let out = expand(db, "", "{{#invoke:test|bad}} {{#invoke:test|good}}");
    assert!(out.starts_with(r#"<strong class="error">Lua execution error in Module:Test"#));
    assert!(out.ends_with(" ok"));
}

#[test]
fn script_time_budget() {
    let mut config = Configuration::default();
    config.limits.script_time = Duration::from_millis(50);
    config.limits.fuel_per_step = 1024;
    let db = Database::new(config);
    let out = invoke_test(
        db,
        r"
        local export = {}
        function export.test(frame)
          while true do end
        end
        return export
        ",
    );
    assert!(out.contains("Lua timeout error"));
}

#[test]
fn missing_module() {
    assert_eq!(
        expand(db(), "", "{{#invoke:does not exist|test}}"),
        "[[:Module:Does not exist]]"
    );
}
