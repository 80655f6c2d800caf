//! Item layout strategies.
//!
//! A module container renders its items in one of a few known shapes. The
//! layouts are tried in order and the first one that matches any item wins.

use scraper::{ElementRef, Selector};

use crate::error::{AppError, Result};

/// Which link of an item carries the title and target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPick {
    First,
    Last,
}

/// One structural shape of a module's item list.
#[derive(Debug)]
pub struct ItemLayout {
    name: &'static str,
    item: Selector,
    date: Selector,
    link: Selector,
    link_pick: LinkPick,
}

impl ItemLayout {
    pub fn new(
        name: &'static str,
        item_selector: &str,
        date_selector: &str,
        link_pick: LinkPick,
    ) -> Result<Self> {
        Ok(Self {
            name,
            item: parse_selector(item_selector)?,
            date: parse_selector(date_selector)?,
            link: parse_selector("a")?,
            link_pick,
        })
    }

    pub fn name(&self) -> &str {
        self.name
    }

    /// Item elements of this layout inside a container.
    pub fn items<'a>(&self, container: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        container.select(&self.item).collect()
    }

    /// The link element of an item, if it has one.
    pub fn link<'a>(&self, item: ElementRef<'a>) -> Option<ElementRef<'a>> {
        let mut links = item.select(&self.link);
        match self.link_pick {
            LinkPick::First => links.next(),
            LinkPick::Last => links.last(),
        }
    }

    /// Raw date text of an item, if it renders one.
    pub fn date(&self, item: ElementRef<'_>) -> Option<String> {
        item.select(&self.date)
            .next()
            .map(|el| el.text().collect::<String>())
    }
}

/// Ordered list of layouts tried per module.
#[derive(Debug)]
pub struct LayoutSet {
    layouts: Vec<ItemLayout>,
}

impl LayoutSet {
    pub fn new(layouts: Vec<ItemLayout>) -> Self {
        Self { layouts }
    }

    /// The layouts observed on the watched sites, most specific first.
    pub fn standard() -> Result<Self> {
        Ok(Self::new(vec![
            ItemLayout::new("news_list", "ul.news_list li.news", ".news-time2", LinkPick::First)?,
            ItemLayout::new("box_content", "div.box-content ul li", "span", LinkPick::Last)?,
            ItemLayout::new("any_list_item", "li", ".news-time2", LinkPick::First)?,
        ]))
    }

    /// First layout with at least one item in the container.
    pub fn detect<'a>(
        &self,
        container: ElementRef<'a>,
    ) -> Option<(&ItemLayout, Vec<ElementRef<'a>>)> {
        self.layouts.iter().find_map(|layout| {
            let items = layout.items(container);
            if items.is_empty() {
                None
            } else {
                log::debug!("Detected item layout '{}'", layout.name);
                Some((layout, items))
            }
        })
    }

    pub fn len(&self) -> usize {
        self.layouts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layouts.is_empty()
    }
}

/// Parse a CSS selector into the crate error type.
pub(crate) fn parse_selector(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| AppError::selector(s, format!("{e:?}")))
}
