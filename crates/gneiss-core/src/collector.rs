//! The item collector: committed items, keyed by label.
//!
//! Targets, configs and toolchains are committed here as their
//! declaration blocks finish. Commits happen on the main thread only;
//! the resolver consumes the whole collection after loading ends.

use crate::item::Item;
use crate::label::Label;
use gneiss_dsl::{Error, ErrorKind};
use indexmap::IndexMap;

#[derive(Debug, Default)]
pub struct ItemCollector {
    items: IndexMap<Label, Item>,
}

impl ItemCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit an item; duplicate labels are fatal.
    pub fn commit(&mut self, item: Item) -> Result<(), Error> {
        if let Some(existing) = self.items.get(item.label()) {
            return Err(Error::new(
                ErrorKind::Name,
                item.decl_span(),
                format!(
                    "duplicate {} \"{}\" (already declared as a {})",
                    item.kind_name(),
                    item.label(),
                    existing.kind_name()
                ),
            )
            .with_label(existing.decl_span(), "first declared here"));
        }
        self.items.insert(item.label().clone(), item);
        Ok(())
    }

    pub fn get(&self, label: &Label) -> Option<&Item> {
        self.items.get(label)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Label, &Item)> {
        self.items.iter()
    }

    /// Labels of items committed at or after index `from`, for the
    /// loader's discovery of newly referenced directories.
    pub fn items_since(&self, from: usize) -> impl Iterator<Item = &Item> {
        self.items.values().skip(from)
    }

    pub fn into_items(self) -> IndexMap<Label, Item> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{Config, ConfigValues};
    use gneiss_dsl::Span;

    fn config(label: &str) -> Item {
        Item::Config(Config {
            label: Label::resolve(label, "//", Span::zero(0)).unwrap(),
            decl_span: Span::zero(0),
            values: ConfigValues::default(),
            configs: Vec::new(),
            visibility: None,
        })
    }

    #[test]
    fn test_commit_and_lookup() {
        let mut collector = ItemCollector::new();
        collector.commit(config("//a:warnings")).unwrap();
        assert_eq!(collector.len(), 1);

        let label = Label::resolve("//a:warnings", "//", Span::zero(0)).unwrap();
        assert!(collector.get(&label).is_some());
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let mut collector = ItemCollector::new();
        collector.commit(config("//a:x")).unwrap();
        let err = collector.commit(config("//a:x")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Name);
        assert!(err.message.contains("duplicate"));
    }

    #[test]
    fn test_items_since() {
        let mut collector = ItemCollector::new();
        collector.commit(config("//a:x")).unwrap();
        let mark = collector.len();
        collector.commit(config("//a:y")).unwrap();
        let new: Vec<_> = collector.items_since(mark).collect();
        assert_eq!(new.len(), 1);
        assert_eq!(new[0].label().to_string(), "//a:y");
    }
}
