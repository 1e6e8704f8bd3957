// src/feed/shape.rs
//! Item-shape predicate: which nodes are feed items and where their text lives.

use super::node::Node;

/// An item is an element tagged `item_tag` that holds a descendant carrying `text_attr`
/// (a language-tagged text node). Defaults match the feed the watcher was built for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemShape {
    pub item_tag: String,
    pub text_attr: String,
}

impl Default for ItemShape {
    fn default() -> Self {
        Self {
            item_tag: "article".to_string(),
            text_attr: "lang".to_string(),
        }
    }
}

/// A feed item admitted for extraction. `anchor` is where the indicator is attached
/// (the parent of the tagged text node).
#[derive(Debug, Clone)]
pub struct FeedItem {
    pub node: Node,
    pub anchor: Node,
    pub text: String,
}

impl ItemShape {
    pub fn new(item_tag: impl Into<String>, text_attr: impl Into<String>) -> Self {
        Self {
            item_tag: item_tag.into(),
            text_attr: text_attr.into(),
        }
    }

    pub fn is_item(&self, node: &Node) -> bool {
        node.tag().eq_ignore_ascii_case(&self.item_tag)
    }

    /// Items carried by one added node: the node itself if it qualifies, otherwise every
    /// qualifying descendant.
    pub fn extract(&self, added: &Node) -> Vec<FeedItem> {
        if self.is_item(added) {
            return self.to_item(added).into_iter().collect();
        }
        added
            .find_all(|n| self.is_item(n))
            .iter()
            .filter_map(|n| self.to_item(n))
            .collect()
    }

    /// Builds the item view of `node`. `None` when the tagged text node is missing or its
    /// trimmed text is empty.
    pub fn to_item(&self, node: &Node) -> Option<FeedItem> {
        let text_node = node.find_first(|n| n.has_attr(&self.text_attr))?;
        let text = text_node.text_content().trim().to_string();
        if text.is_empty() {
            return None;
        }
        let anchor = text_node.parent().unwrap_or_else(|| node.clone());
        Some(FeedItem {
            node: node.clone(),
            anchor,
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tweet(text: &str) -> Node {
        Node::element("article")
            .child(Node::element("div").child(Node::element("div").attr("lang", "en").text(text)))
            .build()
    }

    #[test]
    fn extracts_the_node_itself() {
        let shape = ItemShape::default();
        let t = tweet("  Vaccines cause autism \n");
        let items = shape.extract(&t);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].node, t);
        assert_eq!(items[0].text, "Vaccines cause autism");
        assert_eq!(items[0].anchor.tag(), "div");
        assert!(!items[0].anchor.has_attr("lang"));
    }

    #[test]
    fn extracts_nested_items_from_a_wrapper() {
        let shape = ItemShape::default();
        let wrapper = Node::element("div")
            .child(Node::element("section").child(tweet("one")).child(tweet("two")))
            .child(Node::element("p").text("not an item"))
            .build();
        let texts: Vec<String> = shape.extract(&wrapper).into_iter().map(|i| i.text).collect();
        assert_eq!(texts, vec!["one".to_string(), "two".to_string()]);
    }

    #[test]
    fn items_without_text_are_skipped() {
        let shape = ItemShape::default();
        let empty = tweet("   ");
        let no_lang = Node::element("article").child(Node::element("div").text("x")).build();
        assert!(shape.extract(&empty).is_empty());
        assert!(shape.extract(&no_lang).is_empty());
    }

    #[test]
    fn tag_match_is_case_insensitive() {
        let shape = ItemShape::new("ARTICLE", "lang");
        assert!(shape.is_item(&tweet("x")));
    }
}
