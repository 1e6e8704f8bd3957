// src/annotate.rs
//! Annotator: renders the single verdict indicator attached to a feed item.
//!
//! Indicators are child nodes of the item's anchor marked with `INDICATOR_CLASS`. Every
//! operation inspects and mutates the anchor's children under one lock, so interleaved
//! pending/final writes can never leave two indicators behind.

use crate::analyze::Label;
use crate::feed::{FeedItem, Node};

pub const INDICATOR_CLASS: &str = "misinfo-indicator";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BadgeColor {
    Gray,
    Green,
    Red,
    Orange,
}

impl BadgeColor {
    pub fn as_str(self) -> &'static str {
        match self {
            BadgeColor::Gray => "gray",
            BadgeColor::Green => "green",
            BadgeColor::Red => "red",
            BadgeColor::Orange => "orange",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Badge {
    pub color: BadgeColor,
    pub text: &'static str,
}

pub const PENDING_BADGE: Badge = Badge {
    color: BadgeColor::Gray,
    text: "Analyzing...",
};

/// Visual bucket for a final label. `Unknown` shares the `Opinion` bucket; `Failed` has
/// no badge at all.
pub fn badge_for(label: Label) -> Option<Badge> {
    match label {
        Label::Factual => Some(Badge {
            color: BadgeColor::Green,
            text: "FACT",
        }),
        Label::Misinformation => Some(Badge {
            color: BadgeColor::Red,
            text: "MISINFO",
        }),
        Label::Opinion | Label::Unknown => Some(Badge {
            color: BadgeColor::Orange,
            text: "OPINION",
        }),
        Label::Failed => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Pending,
    Final(Label),
}

#[derive(Debug, Clone, Default)]
pub struct Annotator;

impl Annotator {
    pub fn new() -> Self {
        Self
    }

    /// Inserts a pending indicator unless one (of any kind) already exists.
    pub fn show_pending(&self, item: &FeedItem) -> bool {
        item.anchor
            .append_child_unless(render(Indicator::Pending, PENDING_BADGE), is_indicator)
    }

    /// Replaces whatever indicator exists with exactly one final indicator. `Failed`
    /// clears the item instead.
    pub fn show_final(&self, item: &FeedItem, label: Label) {
        let replacement = badge_for(label).map(|b| render(Indicator::Final(label), b));
        item.anchor.replace_children_where(is_indicator, replacement);
    }

    pub fn clear(&self, item: &FeedItem) -> bool {
        item.anchor.replace_children_where(is_indicator, None) > 0
    }

    pub fn indicator_count(&self, item: &FeedItem) -> usize {
        item.anchor.children().iter().filter(|c| is_indicator(c)).count()
    }

    pub fn current(&self, item: &FeedItem) -> Option<Indicator> {
        item.anchor
            .children()
            .iter()
            .find(|c| is_indicator(c))
            .and_then(read_indicator)
    }
}

fn is_indicator(node: &Node) -> bool {
    node.attr("class") == Some(INDICATOR_CLASS)
}

fn render(indicator: Indicator, badge: Badge) -> Node {
    let (state, label) = match indicator {
        Indicator::Pending => ("pending", None),
        Indicator::Final(l) => ("final", Some(l)),
    };
    let mut b = Node::element("span")
        .attr("class", INDICATOR_CLASS)
        .attr("data-state", state)
        .attr("data-color", badge.color.as_str())
        .text(badge.text);
    if let Some(l) = label {
        b = b.attr("data-label", l.as_str());
    }
    b.build()
}

fn read_indicator(node: &Node) -> Option<Indicator> {
    match node.attr("data-state")? {
        "pending" => Some(Indicator::Pending),
        "final" => node
            .attr("data-label")
            .and_then(Label::from_stored)
            .map(Indicator::Final),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::ItemShape;

    fn item() -> FeedItem {
        let n = Node::element("article")
            .child(Node::element("div").child(Node::element("div").attr("lang", "en").text("t")))
            .build();
        ItemShape::default().to_item(&n).expect("item")
    }

    #[test]
    fn label_buckets() {
        assert_eq!(badge_for(Label::Factual).map(|b| (b.color, b.text)), Some((BadgeColor::Green, "FACT")));
        assert_eq!(badge_for(Label::Misinformation).map(|b| (b.color, b.text)), Some((BadgeColor::Red, "MISINFO")));
        assert_eq!(badge_for(Label::Opinion), badge_for(Label::Unknown));
        assert_eq!(badge_for(Label::Unknown).map(|b| b.text), Some("OPINION"));
        assert_eq!(badge_for(Label::Failed), None);
    }

    #[test]
    fn pending_is_idempotent() {
        let a = Annotator::new();
        let it = item();
        assert!(a.show_pending(&it));
        assert!(!a.show_pending(&it));
        assert_eq!(a.indicator_count(&it), 1);
        assert_eq!(a.current(&it), Some(Indicator::Pending));
    }

    #[test]
    fn final_replaces_and_pending_does_not_downgrade() {
        let a = Annotator::new();
        let it = item();
        a.show_pending(&it);
        a.show_final(&it, Label::Misinformation);
        assert_eq!(a.indicator_count(&it), 1);
        assert_eq!(a.current(&it), Some(Indicator::Final(Label::Misinformation)));

        assert!(!a.show_pending(&it));
        a.show_final(&it, Label::Factual);
        assert_eq!(a.indicator_count(&it), 1);
        assert_eq!(a.current(&it), Some(Indicator::Final(Label::Factual)));
    }

    #[test]
    fn failed_leaves_no_indicator() {
        let a = Annotator::new();
        let it = item();
        a.show_pending(&it);
        a.show_final(&it, Label::Failed);
        assert_eq!(a.indicator_count(&it), 0);
        assert_eq!(a.current(&it), None);
    }

    #[test]
    fn indicator_text_does_not_leak_into_item_text() {
        let a = Annotator::new();
        let it = item();
        a.show_final(&it, Label::Factual);
        assert_eq!(ItemShape::default().to_item(&it.node).map(|i| i.text).as_deref(), Some("t"));
    }
}
