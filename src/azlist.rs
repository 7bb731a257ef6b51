//! Parsing of the Sachgeschichten A–Z overview pages.
//!
//! Each letter page lists every episode ever made. Episodes WDR still hosts
//! are links; episodes that were never put online are plain spans. Both carry
//! the original broadcast year in a nested `abiszJahr` span.

use anyhow::{Context, Result, bail};
use scraper::{ElementRef, Html, Node, Selector};
use std::sync::LazyLock;
use url::Url;

pub const AZ_BASE_URL: &str = "https://www.wdrmaus.de/filme/sachgeschichten/a-bis-z.php5";

static FILTER_LIST: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("ul.filterbuchstaben").unwrap());
static LINK: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static AVAILABLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a.intern[href]").unwrap());
static MISSING: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li > span > span.abiszTitel").unwrap());
static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.abiszTitel").unwrap());
static YEAR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("span.abiszJahr").unwrap());

/// One row of an A–Z page. `url` is `None` for episodes that are not online.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzEntry {
    pub title: String,
    pub year: String,
    pub url: Option<String>,
}

/// Resolves every letter filter link on the A–Z start page.
pub fn parse_filter_letters(html: &str, base_url: &str) -> Result<Vec<String>> {
    let base = Url::parse(base_url).with_context(|| format!("invalid base URL {base_url}"))?;
    let document = Html::parse_document(html);
    let Some(list) = document.select(&FILTER_LIST).next() else {
        bail!("could not find filterbuchstaben list");
    };

    let mut urls = Vec::new();
    for link in list.select(&LINK) {
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        if !href.contains("?filter=") {
            continue;
        }
        let resolved = base
            .join(href)
            .with_context(|| format!("resolving filter link {href}"))?;
        urls.push(resolved.to_string());
    }
    Ok(urls)
}

/// Splits a letter page into (available, missing) entries.
pub fn parse_bulk_page(html: &str, base_url: &str) -> Result<(Vec<AzEntry>, Vec<AzEntry>)> {
    let base = Url::parse(base_url).with_context(|| format!("invalid base URL {base_url}"))?;
    let document = Html::parse_document(html);

    let mut available = Vec::new();
    for link in document.select(&AVAILABLE) {
        let Some(title_span) = link.select(&TITLE).next() else {
            continue;
        };
        let Some((title, year)) = title_and_year(title_span) else {
            continue;
        };
        let Some(href) = link.value().attr("href") else {
            continue;
        };
        let url = base
            .join(href)
            .with_context(|| format!("resolving episode link {href}"))?;
        available.push(AzEntry {
            title,
            year,
            url: Some(url.to_string()),
        });
    }

    let missing = document
        .select(&MISSING)
        .filter_map(title_and_year)
        .map(|(title, year)| AzEntry {
            title,
            year,
            url: None,
        })
        .collect();

    Ok((available, missing))
}

/// The title is the span's own text; the year sits in a child span as
/// `(1994)`. Entries without a four digit year are skipped.
fn title_and_year(span: ElementRef<'_>) -> Option<(String, String)> {
    let title: String = span
        .children()
        .filter_map(|child| match child.value() {
            Node::Text(text) => Some(String::from(&**text)),
            _ => None,
        })
        .collect();
    let title = title.trim().to_string();
    let year_text: String = span.select(&YEAR).next()?.text().collect();
    let year = year_text.trim().trim_start_matches('(').trim_end_matches(')');
    if title.is_empty() || year.len() != 4 || !year.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((title, year.to_string()))
}

/// Upper-cased filter value of a letter URL, for progress headers.
pub fn filter_label(url: &str) -> String {
    url.rsplit_once("filter=")
        .map(|(_, label)| label.to_uppercase())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const LETTER_URL: &str = "https://www.wdrmaus.de/filme/sachgeschichten/a-bis-z.php5?filter=b";

    const START_PAGE: &str = r##"<html><body>
        <ul class="navigation"><a href="/impressum.php5">Impressum</a></ul>
        <ul class="filterbuchstaben">
          <li><a href="../../filme/sachgeschichten/a-bis-z.php5?filter=a">A</a></li>
          <li><a href="../../filme/sachgeschichten/a-bis-z.php5?filter=b">B</a></li>
          <li><a href="#top">nach oben</a></li>
          <li><a href="a-bis-z.php5?filter=0-9">0-9</a></li>
        </ul>
    </body></html>"##;

    const LETTER_PAGE: &str = r#"<html><body><div class="abiszAusgabe"><ul>
        <li><a class="intern" href="brot.php5"><span class="abiszTitel">Brot &amp; Butter <span class="abiszJahr">(2020)</span></span></a></li>
        <li><a class="intern" href="/filme/sachgeschichten/bagger.php5" title="Bagger"><span class="abiszTitel"><i></i>Bagger <span class="abiszJahr">(1994)</span></span></a></li>
        <li><span><span class="abiszTitel">Bananen <span class="abiszJahr">(1977)</span></span></span></li>
        <li><span><span class="abiszTitel">Ohne Jahr</span></span></li>
    </ul></div></body></html>"#;

    #[test]
    fn filter_letters_are_resolved_against_the_base() {
        let urls = parse_filter_letters(START_PAGE, AZ_BASE_URL).unwrap();
        assert_eq!(
            urls,
            vec![
                "https://www.wdrmaus.de/filme/sachgeschichten/a-bis-z.php5?filter=a",
                "https://www.wdrmaus.de/filme/sachgeschichten/a-bis-z.php5?filter=b",
                "https://www.wdrmaus.de/filme/sachgeschichten/a-bis-z.php5?filter=0-9",
            ]
        );
    }

    #[test]
    fn missing_filter_list_is_an_error() {
        let err = parse_filter_letters("<html></html>", AZ_BASE_URL).unwrap_err();
        assert!(err.to_string().contains("filterbuchstaben"));
    }

    #[test]
    fn bulk_page_splits_available_and_missing() {
        let (available, missing) = parse_bulk_page(LETTER_PAGE, LETTER_URL).unwrap();
        assert_eq!(
            available,
            vec![
                AzEntry {
                    title: "Brot & Butter".into(),
                    year: "2020".into(),
                    url: Some("https://www.wdrmaus.de/filme/sachgeschichten/brot.php5".into()),
                },
                AzEntry {
                    title: "Bagger".into(),
                    year: "1994".into(),
                    url: Some("https://www.wdrmaus.de/filme/sachgeschichten/bagger.php5".into()),
                },
            ]
        );
        assert_eq!(
            missing,
            vec![AzEntry {
                title: "Bananen".into(),
                year: "1977".into(),
                url: None,
            }]
        );
    }

    #[test]
    fn filter_label_uppercases_the_letter() {
        assert_eq!(filter_label(LETTER_URL), "B");
        assert_eq!(filter_label("https://x/a-bis-z.php5"), "");
    }
}
