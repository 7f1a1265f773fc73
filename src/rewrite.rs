//! Rewriting of collected article bodies.
//!
//! Collectors leave inline tag markers in bodies (see
//! [`crate::collectors::TAG_MARKER_CLASS`]). Before publishing, each marker is
//! replaced by a plain link to the target site's tag page:
//!
//! ```text
//! <span class="collect-tag" data-tag-alias="rust" data-tag-name="Rust">x</span>
//!   → <a href="/tags-rust.html" target="_blank" class="collect-tag">Rust</a>
//! ```
//!
//! The body is parsed once and written back node by node, so everything that
//! is not a marker keeps its position and content.

use crate::collectors::{TAG_ALIAS_ATTR, TAG_MARKER_CLASS, TAG_NAME_ATTR};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Node, Selector};
use std::collections::HashMap;

static TAG_MARKER: Lazy<Selector> =
    Lazy::new(|| Selector::parse(&format!(".{TAG_MARKER_CLASS}")).unwrap());

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];
/// Elements whose text content is written back unescaped.
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "iframe", "noembed", "noframes", "noscript", "script", "style", "xmp",
];

/// What a marker turns into on the target site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagLink {
    pub name: String,
    pub alias: String,
}

/// Link to a tag page on a site with the rewrite rules `initialize` installs.
pub fn tag_href(alias: &str) -> String {
    format!("/tags-{alias}.html")
}

/// Escape text for HTML element content.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    s.replace('&', "&amp;").replace('"', "&quot;")
}

/// Replace every tag marker in `body` with a link.
///
/// `links` maps a marker's source alias to the tag it was reconciled to;
/// markers without an entry use their own attributes.
///
/// A body that starts with a doctype is handled as a whole page; anything
/// else as a fragment of `<body>`.
pub fn rewrite_tag_links(body: &str, links: &HashMap<String, TagLink>) -> String {
    let mut out = String::with_capacity(body.len());
    if is_full_document(body) {
        let doc = Html::parse_document(body);
        for child in doc.tree.root().children() {
            write_node(child.value(), ElementRef::wrap(child), false, links, &mut out);
        }
    } else {
        let fragment = Html::parse_fragment(body);
        write_children(fragment.root_element(), links, &mut out);
    }
    out
}

fn is_full_document(body: &str) -> bool {
    body.trim_start()
        .get(..9)
        .is_some_and(|start| start.eq_ignore_ascii_case("<!doctype"))
}

fn write_children(parent: ElementRef<'_>, links: &HashMap<String, TagLink>, out: &mut String) {
    let raw = RAW_TEXT_ELEMENTS.contains(&parent.value().name());
    for child in parent.children() {
        write_node(child.value(), ElementRef::wrap(child), raw, links, out);
    }
}

/// Write one node. `element` is set when `node` is an element.
fn write_node(
    node: &Node,
    element: Option<ElementRef<'_>>,
    raw: bool,
    links: &HashMap<String, TagLink>,
    out: &mut String,
) {
    match node {
        Node::Text(text) if raw => out.push_str(text),
        Node::Text(text) => out.push_str(&escape_html(text)),
        Node::Comment(comment) => {
            out.push_str("<!--");
            out.push_str(comment);
            out.push_str("-->");
        }
        Node::Doctype(doctype) => {
            out.push_str("<!DOCTYPE ");
            out.push_str(&doctype.name);
            out.push('>');
        }
        Node::ProcessingInstruction(pi) => {
            out.push_str("<?");
            out.push_str(&pi.target);
            out.push(' ');
            out.push_str(&pi.data);
            out.push('>');
        }
        Node::Element(_) => {
            if let Some(element) = element {
                write_element(element, links, out);
            }
        }
        Node::Document | Node::Fragment => {}
    }
}

fn write_element(element: ElementRef<'_>, links: &HashMap<String, TagLink>, out: &mut String) {
    if TAG_MARKER.matches(&element) {
        write_tag_link(element, links, out);
        return;
    }

    let name = element.value().name();
    out.push('<');
    out.push_str(name);
    for (key, value) in element.value().attrs() {
        push_attr(out, key, value);
    }
    out.push('>');

    if VOID_ELEMENTS.contains(&name) {
        return;
    }
    write_children(element, links, out);
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn write_tag_link(marker: ElementRef<'_>, links: &HashMap<String, TagLink>, out: &mut String) {
    let attrs = marker.value();
    let source_alias = attrs.attr(TAG_ALIAS_ATTR).unwrap_or_default();
    let link = links.get(source_alias).cloned().unwrap_or_else(|| TagLink {
        name: attrs.attr(TAG_NAME_ATTR).unwrap_or_default().to_string(),
        alias: source_alias.to_string(),
    });

    out.push_str("<a");
    push_attr(out, "href", &tag_href(&link.alias));
    push_attr(out, "target", "_blank");
    for (key, value) in attrs.attrs() {
        if matches!(key, "href" | "target") || key == TAG_ALIAS_ATTR || key == TAG_NAME_ATTR {
            continue;
        }
        push_attr(out, key, value);
    }
    out.push('>');
    out.push_str(&escape_html(&link.name));
    out.push_str("</a>");
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&escape_attr(value));
    out.push('"');
}
