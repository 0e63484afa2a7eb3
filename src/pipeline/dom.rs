use async_trait::async_trait;
use ego_tree::NodeId;
use html5ever::tendril::StrTendril;
use html5ever::{LocalName, Namespace, QualName};
use scraper::node::Element;
use scraper::{Html, Node, Selector};

use super::{Item, Pipeline, PipelineError};
use crate::util::resolve_href;

/// Rewrites the item body so it is safe to render inside the reader.
pub struct DomPipeline;

#[async_trait]
impl Pipeline for DomPipeline {
    fn name(&self) -> &'static str {
        "dom"
    }

    async fn process_item(&self, mut item: Item) -> Result<Item, PipelineError> {
        item.content = sanitize_html(&item.content, &item.url, &item.trims)?;
        Ok(item)
    }
}

/// Sanitize an HTML fragment.
///
/// - every `<a>` gets an absolute `href` resolved against `base_url` and
///   `target="_blank"`
/// - `<script>` elements become `<noscript>` with the same content
/// - elements matching any selector in `trims` keep their tag but lose all
///   attributes and children
///
/// The tree is edited in place and serialized by html5ever, so everything
/// else comes out as parsed. Fails only when a trim selector is not valid CSS.
pub fn sanitize_html(
    content: &str,
    base_url: &str,
    trims: &[String],
) -> Result<String, PipelineError> {
    let mut fragment = Html::parse_fragment(content);

    let mut cleared: Vec<NodeId> = Vec::new();
    for css in trims {
        let selector =
            Selector::parse(css).map_err(|e| PipelineError::Selector(format!("'{css}': {e}")))?;
        cleared.extend(fragment.select(&selector).map(|el| el.id()));
    }

    let mut links: Vec<(NodeId, String)> = Vec::new();
    let mut scripts: Vec<NodeId> = Vec::new();
    for node in fragment.tree.root().descendants() {
        let Node::Element(el) = node.value() else {
            continue;
        };
        match el.name() {
            "a" => links.push((node.id(), resolve_href(base_url, el.attr("href")))),
            "script" => scripts.push(node.id()),
            _ => {}
        }
    }

    for (id, href) in links {
        edit_element(&mut fragment, id, |el| {
            set_attr(el, "href", &href);
            set_attr(el, "target", "_blank");
        });
    }
    for id in scripts {
        edit_element(&mut fragment, id, |el| el.name.local = LocalName::from("noscript"));
    }
    // Cleared last so a trimmed link or script ends up empty too
    for id in cleared {
        edit_element(&mut fragment, id, |el| el.attrs.clear());
        if let Some(mut node) = fragment.tree.get_mut(id) {
            while let Some(mut child) = node.first_child() {
                child.detach();
            }
        }
    }

    // parse_fragment wraps the input in a synthetic <html> element
    Ok(fragment.root_element().inner_html())
}

fn edit_element(fragment: &mut Html, id: NodeId, edit: impl FnOnce(&mut Element)) {
    if let Some(mut node) = fragment.tree.get_mut(id) {
        if let Node::Element(el) = node.value() {
            edit(el);
        }
    }
}

/// Set an un-namespaced attribute, keeping the list sorted for lookups.
fn set_attr(el: &mut Element, name: &str, value: &str) {
    let value = StrTendril::from_slice(value);
    let existing = el
        .attrs
        .iter_mut()
        .find(|(key, _)| key.prefix.is_none() && &*key.local == name);
    match existing {
        Some((_, current)) => *current = value,
        None => {
            let key = QualName::new(None, Namespace::from(""), LocalName::from(name));
            el.attrs.push((key, value));
            el.attrs.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
    }
}
