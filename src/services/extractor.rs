// src/services/extractor.rs

//! Module extraction service.
//!
//! Turns the fetched page into one record list per configured module.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::error::Result;
use crate::models::{CleaningConfig, ModuleConfig, ModuleLocator, Record, Snapshot};
use crate::services::layouts::{ItemLayout, LayoutSet, parse_selector};
use crate::utils::resolve_url;

/// Suffix some boxed headings carry next to their title.
const MORE_SUFFIX: &str = "+more";

/// Service extracting announcement records from module containers.
pub struct ModuleExtractor {
    base_url: Url,
    cleaning: CleaningConfig,
    layouts: LayoutSet,
    box_sel: Selector,
    box_title_sel: Selector,
}

impl ModuleExtractor {
    /// Create an extractor resolving links against `page_url`.
    pub fn new(page_url: &str, cleaning: CleaningConfig) -> Result<Self> {
        Self::with_layouts(page_url, cleaning, LayoutSet::standard()?)
    }

    /// Create an extractor with a custom layout list.
    pub fn with_layouts(
        page_url: &str,
        cleaning: CleaningConfig,
        layouts: LayoutSet,
    ) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(page_url)?,
            cleaning,
            layouts,
            box_sel: parse_selector("div.box")?,
            box_title_sel: parse_selector(".box-title")?,
        })
    }

    /// Parse the page once and extract every configured module.
    pub fn extract_all(&self, html: &str, modules: &[ModuleConfig]) -> Result<Snapshot> {
        let document = Html::parse_document(html);
        let mut snapshot = Snapshot::new();

        for module in modules {
            let records = self.extract(&document, module)?;
            log::info!("Module '{}': {} records", module.name, records.len());
            snapshot.insert(module.name.clone(), records);
        }
        Ok(snapshot)
    }

    /// Extract the records of one module.
    ///
    /// A missing container yields an empty list.
    pub fn extract(&self, document: &Html, module: &ModuleConfig) -> Result<Vec<Record>> {
        let Some(container) = self.locate(document, &module.locator()?)? else {
            log::debug!("Module '{}' not found on page", module.name);
            return Ok(Vec::new());
        };

        let Some((layout, items)) = self.layouts.detect(container) else {
            return Ok(Vec::new());
        };

        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for item in items {
            let Some(record) = self.parse_item(layout, item) else {
                continue;
            };
            let key = record.identity_key(module.identity).into_owned();
            if seen.insert(key) {
                records.push(record);
            } else {
                log::debug!(
                    "Module '{}': dropping duplicate item {}",
                    module.name,
                    record.url
                );
            }
        }
        Ok(records)
    }

    fn locate<'a>(
        &self,
        document: &'a Html,
        locator: &ModuleLocator<'_>,
    ) -> Result<Option<ElementRef<'a>>> {
        match locator {
            ModuleLocator::ElementId(id) => {
                let selector = parse_selector(&format!("[id=\"{}\"]", id.replace('"', "\\\"")))?;
                Ok(document.select(&selector).next())
            }
            ModuleLocator::Heading(heading) => Ok(document.select(&self.box_sel).find(|el| {
                el.select(&self.box_title_sel)
                    .next()
                    .is_some_and(|title| Self::heading_text(title) == *heading)
            })),
        }
    }

    fn heading_text(title: ElementRef<'_>) -> String {
        let text: String = title.text().map(str::trim).collect();
        text.replace(MORE_SUFFIX, "").trim().to_string()
    }

    fn parse_item(&self, layout: &ItemLayout, item: ElementRef<'_>) -> Option<Record> {
        let link = layout.link(item)?;
        let raw_href = link.value().attr("href")?.trim();
        if raw_href.is_empty() {
            return None;
        }

        let raw_title = link
            .value()
            .attr("title")
            .filter(|t| !t.trim().is_empty())
            .map(String::from)
            .unwrap_or_else(|| link.text().collect());
        let title = self.cleaning.clean_title(&raw_title);

        let date = layout
            .date(item)
            .map(|raw| self.cleaning.clean_date(&raw))
            .filter(|d| !d.is_empty());

        Some(Record::new(title, resolve_url(&self.base_url, raw_href), date))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::IdentityPolicy;

    const PAGE: &str = "http://nubs.nju.edu.cn/main.htm";

    const NEWS_PAGE: &str = r#"
        <html><body>
          <div id="wp_news_w47">
            <ul class="news_list">
              <li class="news">
                <a href="/2024/0101/c1/page.htm" title="关于举办讲座的通知">关于举办...</a>
                <span class="news-time2"> 2024-01-01 </span>
              </li>
              <li class="news">
                <a href="https://other.nju.edu.cn/x.htm">  外部
                   链接 </a>
              </li>
              <li class="news"><span>no link</span></li>
              <li class="news">
                <a href="/2024/0101/c1/page.htm" title="关于举办讲座的通知">dup</a>
                <span class="news-time2">2024-01-01</span>
              </li>
            </ul>
          </div>
          <div id="wp_news_w48"></div>
        </body></html>"#;

    const BOX_PAGE: &str = r#"
        <div class="two">
          <div class="box">
            <div class="box-title">通知公告<a href="/more">+more</a></div>
            <div class="box-content"><ul>
              <li><span>05-01</span><a href="list.htm">[通知]</a><a href="info/1.htm">实习安排</a></li>
            </ul></div>
          </div>
          <div class="box">
            <div class="box-title">就业招聘</div>
            <div class="box-content"><ul></ul></div>
          </div>
        </div>"#;

    fn extractor(url: &str) -> ModuleExtractor {
        ModuleExtractor::new(url, CleaningConfig::default()).unwrap()
    }

    #[test]
    fn test_extracts_news_list_items() {
        let doc = Html::parse_document(NEWS_PAGE);
        let module = ModuleConfig::by_id("notices", "wp_news_w47");
        let records = extractor(PAGE).extract(&doc, &module).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].title, "关于举办讲座的通知");
        assert_eq!(records[0].url, "http://nubs.nju.edu.cn/2024/0101/c1/page.htm");
        assert_eq!(records[0].date.as_deref(), Some("2024-01-01"));
        assert!(records[0].fingerprint.is_some());

        assert_eq!(records[1].title, "外部 链接");
        assert_eq!(records[1].url, "https://other.nju.edu.cn/x.htm");
        assert_eq!(records[1].date, None);
    }

    #[test]
    fn test_missing_or_empty_container_is_empty() {
        let doc = Html::parse_document(NEWS_PAGE);
        let ex = extractor(PAGE);
        let empty = ModuleConfig::by_id("events", "wp_news_w48");
        let missing = ModuleConfig::by_id("procurement", "wp_news_w100");
        assert!(ex.extract(&doc, &empty).unwrap().is_empty());
        assert!(ex.extract(&doc, &missing).unwrap().is_empty());
    }

    #[test]
    fn test_fingerprint_identity_keeps_same_url_with_other_title() {
        let html = r#"<div id="m"><ul>
            <li><a href="/1">A</a></li>
            <li><a href="/1">B</a></li>
            <li><a href="/1">A</a></li>
        </ul></div>"#;
        let doc = Html::parse_document(html);
        let ex = extractor(PAGE);

        let by_url = ModuleConfig::by_id("m", "m");
        assert_eq!(ex.extract(&doc, &by_url).unwrap().len(), 1);

        let by_fp = ModuleConfig::by_id("m", "m").with_identity(IdentityPolicy::Fingerprint);
        assert_eq!(ex.extract(&doc, &by_fp).unwrap().len(), 2);
    }

    #[test]
    fn test_extracts_boxed_module_by_heading() {
        let doc = Html::parse_document(BOX_PAGE);
        let ex = extractor("http://syxg.nju.edu.cn/");
        let notices = ModuleConfig::by_heading("notices", "通知公告");
        let records = ex.extract(&doc, &notices).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "实习安排");
        assert_eq!(records[0].url, "http://syxg.nju.edu.cn/info/1.htm");
        assert_eq!(records[0].date.as_deref(), Some("05-01"));

        let jobs = ModuleConfig::by_heading("jobs", "就业招聘");
        assert!(ex.extract(&doc, &jobs).unwrap().is_empty());
    }

    #[test]
    fn test_extract_all_covers_every_module() {
        let modules = vec![
            ModuleConfig::by_id("notices", "wp_news_w47"),
            ModuleConfig::by_id("events", "wp_news_w48"),
            ModuleConfig::by_id("procurement", "wp_news_w100"),
        ];
        let snapshot = extractor(PAGE).extract_all(NEWS_PAGE, &modules).unwrap();
        assert_eq!(snapshot.module_count(), 3);
        assert_eq!(snapshot.records("notices").len(), 2);
        assert!(snapshot.contains_module("procurement"));
    }

    #[test]
    fn test_invalid_locator_is_error() {
        let doc = Html::parse_document(NEWS_PAGE);
        let mut module = ModuleConfig::by_id("notices", "wp_news_w47");
        module.id = None;
        assert!(extractor(PAGE).extract(&doc, &module).is_err());
    }

    #[test]
    fn test_blank_href_is_skipped() {
        let html = r#"<div id="m"><ul class="news_list">
            <li class="news"><a href="">置顶</a></li>
            <li class="news"><a href="  ">空白</a></li>
            <li class="news"><a href="/1.htm">正常</a></li>
        </ul></div>"#;
        let doc = Html::parse_document(html);
        let records = extractor(PAGE)
            .extract(&doc, &ModuleConfig::by_id("m", "m"))
            .unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].url, "http://nubs.nju.edu.cn/1.htm");
    }
}
