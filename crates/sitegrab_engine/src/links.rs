use std::collections::HashSet;

use ego_tree::NodeId;
use scraper::{Html, Node};

use crate::css::{extract_css_urls, rewrite_css_urls};

/// Where in the document a link was found, so it can be rewritten in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkSlot {
    /// A resource attribute (`src`, `href`, `data`) on an element.
    Attribute { node: NodeId, name: &'static str },
    /// A `url(...)` inside an element's `style` attribute.
    InlineStyle { node: NodeId },
    /// A `url(...)` inside the text of a `<style>` element.
    StyleText { node: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    pub url: String,
    pub slot: LinkSlot,
}

/// Attribute holding the resource reference for the tags we follow.
fn resource_attribute(tag: &str) -> Option<&'static str> {
    match tag {
        "video" | "audio" | "img" | "script" | "iframe" => Some("src"),
        "object" => Some("data"),
        "a" | "link" => Some("href"),
        _ => None,
    }
}

/// A parsed HTML page whose links can be listed and rewritten.
pub struct HtmlDocument {
    html: Html,
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Self {
        Self {
            html: Html::parse_document(source),
        }
    }

    /// All links in pre-order document order. Within one element the resource
    /// attribute comes before references in its `style` attribute.
    pub fn links(&self) -> Vec<ExtractedLink> {
        let mut links = Vec::new();
        for node in self.html.tree.root().descendants() {
            match node.value() {
                Node::Element(element) => {
                    if let Some(name) = resource_attribute(element.name()) {
                        if let Some(value) = element.attr(name).map(str::trim) {
                            if !value.is_empty() {
                                links.push(ExtractedLink {
                                    url: value.to_string(),
                                    slot: LinkSlot::Attribute {
                                        node: node.id(),
                                        name,
                                    },
                                });
                            }
                        }
                    }
                    if let Some(style) = element.attr("style") {
                        for url in extract_css_urls(style) {
                            links.push(ExtractedLink {
                                url,
                                slot: LinkSlot::InlineStyle { node: node.id() },
                            });
                        }
                    }
                }
                Node::Text(text) => {
                    let in_style = node
                        .parent()
                        .and_then(|parent| parent.value().as_element())
                        .is_some_and(|parent| parent.name() == "style");
                    if in_style {
                        for url in extract_css_urls(&text.text) {
                            links.push(ExtractedLink {
                                url,
                                slot: LinkSlot::StyleText { node: node.id() },
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        links
    }

    /// Rewrite every link for which `transform` returns a replacement.
    /// Returns how many links changed.
    pub fn rewrite_links<F>(&mut self, mut transform: F) -> usize
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut changed = 0;
        let mut styled: HashSet<NodeId> = HashSet::new();
        for link in self.links() {
            match link.slot {
                LinkSlot::Attribute { node, name } => {
                    if let Some(replacement) = transform(&link.url) {
                        if replacement != link.url {
                            self.set_attribute(node, name, &replacement);
                            changed += 1;
                        }
                    }
                }
                LinkSlot::InlineStyle { node } | LinkSlot::StyleText { node } => {
                    if !styled.insert(node) {
                        continue;
                    }
                    changed += self.rewrite_css_slot(link.slot, &mut transform);
                }
            }
        }
        changed
    }

    /// Serialize the (possibly rewritten) document.
    pub fn render(&self) -> String {
        self.html.html()
    }

    fn rewrite_css_slot<F>(&mut self, slot: LinkSlot, transform: &mut F) -> usize
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut changed = 0;
        let mut apply = |css: &str| {
            rewrite_css_urls(css, |url| match transform(url) {
                Some(replacement) => {
                    if replacement != url {
                        changed += 1;
                    }
                    replacement
                }
                None => url.to_string(),
            })
        };
        match slot {
            LinkSlot::InlineStyle { node } => {
                let Some(style) = self.attribute(node, "style") else {
                    return 0;
                };
                let rewritten = apply(style.as_str());
                self.set_attribute(node, "style", &rewritten);
            }
            LinkSlot::StyleText { node } => {
                let Some(mut text_node) = self.html.tree.get_mut(node) else {
                    return 0;
                };
                if let Node::Text(text) = text_node.value() {
                    let current = text.text.to_string();
                    text.text = apply(current.as_str()).as_str().into();
                }
            }
            LinkSlot::Attribute { .. } => {}
        }
        changed
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.html
            .tree
            .get(node)
            .and_then(|node| node.value().as_element())
            .and_then(|element| element.attr(name))
            .map(str::to_string)
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) {
        let Some(mut node) = self.html.tree.get_mut(node) else {
            return;
        };
        if let Node::Element(element) = node.value() {
            for (attr, current) in element.attrs.iter_mut() {
                if &*attr.local == name {
                    *current = value.into();
                }
            }
        }
    }
}

/// Link values of `html` in document order.
pub fn extract_html_links(html: &str) -> Vec<String> {
    HtmlDocument::parse(html)
        .links()
        .into_iter()
        .map(|link| link.url)
        .collect()
}
