use lol_html::{element, text, HtmlRewriter, Settings};
use std::cell::RefCell;
use tracing::warn;

use crate::record::{resolve_url, CandidateRecord, UNKNOWN};

const ITEM: &str = "li.ipc-metadata-list-summary-item";
const CREDIT: &str = "li.ipc-metadata-list__item";
const CREDIT_LINK: &str = "a.ipc-metadata-list-item__list-content-item--link";

#[derive(Default)]
struct PartialCandidate {
    titles: u32,
    title: String,
    href: Option<String>,
    year_items: u32,
    year: String,
    ratings: u32,
    rating: String,
}

impl PartialCandidate {
    fn finish(self, base_url: &str) -> CandidateRecord {
        let title = strip_rank(&decode(&self.title));
        CandidateRecord {
            title: if title.is_empty() { UNKNOWN.to_string() } else { title },
            year: Some(decode(&self.year)).filter(|y| !y.is_empty()),
            rating: decode(&self.rating).parse::<f64>().ok().filter(|r| r.is_finite()),
            url: self.href.and_then(|href| resolve_url(base_url, &href)),
        }
    }
}

#[derive(Default)]
struct CreditItem {
    label: String,
    anchors: u32,
    first_anchor: String,
}

/// Pulls one candidate per list entry out of a search results page.
///
/// Missing fields come back as `None` rather than failing the page.
pub fn extract_candidates(html: &str, base_url: &str) -> Vec<CandidateRecord> {
    let items: RefCell<Vec<PartialCandidate>> = RefCell::new(Vec::new());

    let title_sel = format!("{ITEM} h3.ipc-title__text");
    let link_sel = format!("{ITEM} a.ipc-title-link-wrapper[href]");
    let year_sel = format!("{ITEM} .dli-title-metadata-item");
    let rating_sel = format!("{ITEM} .ipc-rating-star--rating");

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!(ITEM, |_el| {
                    items.borrow_mut().push(PartialCandidate::default());
                    Ok(())
                }),
                element!(title_sel, |_el| {
                    if let Some(item) = items.borrow_mut().last_mut() {
                        item.titles += 1;
                    }
                    Ok(())
                }),
                text!(title_sel, |t| {
                    if let Some(item) = items.borrow_mut().last_mut()
                        && item.titles == 1
                    {
                        item.title.push_str(t.as_str());
                    }
                    Ok(())
                }),
                element!(link_sel, |el| {
                    if let Some(item) = items.borrow_mut().last_mut()
                        && item.href.is_none()
                    {
                        item.href = el.get_attribute("href");
                    }
                    Ok(())
                }),
                element!(year_sel, |_el| {
                    if let Some(item) = items.borrow_mut().last_mut() {
                        item.year_items += 1;
                    }
                    Ok(())
                }),
                text!(year_sel, |t| {
                    if let Some(item) = items.borrow_mut().last_mut()
                        && item.year_items == 1
                    {
                        item.year.push_str(t.as_str());
                    }
                    Ok(())
                }),
                element!(rating_sel, |_el| {
                    if let Some(item) = items.borrow_mut().last_mut() {
                        item.ratings += 1;
                    }
                    Ok(())
                }),
                text!(rating_sel, |t| {
                    if let Some(item) = items.borrow_mut().last_mut()
                        && item.ratings == 1
                    {
                        item.rating.push_str(t.as_str());
                    }
                    Ok(())
                }),
            ],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );

    let written = rewriter.write(html.as_bytes()).and_then(|_| rewriter.end());
    if let Err(e) = written {
        warn!(base_url, error = %e, "list page only partially parsed");
    }

    items
        .into_inner()
        .into_iter()
        .map(|partial| partial.finish(base_url))
        .collect()
}

/// Director named in the principal credits of a detail page.
pub fn extract_director(html: &str) -> Option<String> {
    let credits: RefCell<Vec<CreditItem>> = RefCell::new(Vec::new());
    let fallback = RefCell::new((0u32, String::new()));

    let label_sel = format!("{CREDIT} span");
    let anchor_sel = format!("{CREDIT} a");

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: vec![
                element!(CREDIT, |_el| {
                    credits.borrow_mut().push(CreditItem::default());
                    Ok(())
                }),
                text!(label_sel, |t| {
                    if let Some(item) = credits.borrow_mut().last_mut() {
                        item.label.push_str(t.as_str());
                    }
                    Ok(())
                }),
                element!(anchor_sel, |_el| {
                    if let Some(item) = credits.borrow_mut().last_mut() {
                        item.anchors += 1;
                    }
                    Ok(())
                }),
                text!(anchor_sel, |t| {
                    if let Some(item) = credits.borrow_mut().last_mut()
                        && item.anchors == 1
                    {
                        item.first_anchor.push_str(t.as_str());
                    }
                    Ok(())
                }),
                element!(CREDIT_LINK, |_el| {
                    fallback.borrow_mut().0 += 1;
                    Ok(())
                }),
                text!(CREDIT_LINK, |t| {
                    let mut fallback = fallback.borrow_mut();
                    if fallback.0 == 1 {
                        fallback.1.push_str(t.as_str());
                    }
                    Ok(())
                }),
            ],
            ..Settings::new()
        },
        |_: &[u8]| {},
    );

    let written = rewriter.write(html.as_bytes()).and_then(|_| rewriter.end());
    if let Err(e) = written {
        warn!(error = %e, "detail page only partially parsed");
    }

    let labelled = credits
        .into_inner()
        .into_iter()
        .filter(|item| item.label.contains("Director"))
        .map(|item| decode(&item.first_anchor))
        .find(|name| !name.is_empty());

    labelled.or_else(|| Some(decode(&fallback.into_inner().1)).filter(|name| !name.is_empty()))
}

fn decode(raw: &str) -> String {
    html_escape::decode_html_entities(raw).trim().to_string()
}

/// "12. Heat" -> "Heat"
fn strip_rank(title: &str) -> String {
    match title.split_once(". ") {
        Some((rank, rest)) if !rank.is_empty() && rank.chars().all(|c| c.is_ascii_digit()) => {
            rest.trim().to_string()
        }
        _ => title.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://www.imdb.com/search/title/?title_type=feature";

    fn list_item(title: &str, href: Option<&str>, year: &str, rating: Option<&str>) -> String {
        let link = href
            .map(|h| format!(r#"<a class="ipc-title-link-wrapper" href="{h}"><h3 class="ipc-title__text">{title}</h3></a>"#))
            .unwrap_or_else(|| format!(r#"<h3 class="ipc-title__text">{title}</h3>"#));
        let rating = rating
            .map(|r| format!(r#"<span class="ipc-rating-star--rating">{r}</span>"#))
            .unwrap_or_default();
        format!(
            r#"<li class="ipc-metadata-list-summary-item"><div>{link}</div>
               <div><span class="dli-title-metadata-item">{year}</span><span class="dli-title-metadata-item">2h 32m</span></div>
               {rating}</li>"#
        )
    }

    #[test]
    fn extracts_every_list_entry() {
        let html = format!(
            "<html><body><ul>{}{}</ul></body></html>",
            list_item("1. The Dark Knight", Some("/title/tt0468569/?ref_=sr_t_1"), "2008", Some("9.0")),
            list_item("2. Heat &amp; Dust", Some("/title/tt0113277/"), "1995", Some("8.3")),
        );

        let candidates = extract_candidates(&html, BASE);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].title, "The Dark Knight");
        assert_eq!(candidates[0].year.as_deref(), Some("2008"));
        assert_eq!(candidates[0].rating, Some(9.0));
        assert_eq!(
            candidates[0].url.as_deref(),
            Some("https://www.imdb.com/title/tt0468569/")
        );
        assert_eq!(candidates[1].title, "Heat & Dust");
    }

    #[test]
    fn missing_fields_become_absent() {
        let html = format!("<ul>{}</ul>", list_item("", None, "", None));
        let candidates = extract_candidates(&html, BASE);

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].title, UNKNOWN);
        assert_eq!(candidates[0].year, None);
        assert_eq!(candidates[0].rating, None);
        assert_eq!(candidates[0].url, None);
    }

    #[test]
    fn unparsable_rating_is_absent() {
        let html = format!("<ul>{}</ul>", list_item("3. Alien", Some("/title/tt0078748/"), "1979", Some("n/a")));
        assert_eq!(extract_candidates(&html, BASE)[0].rating, None);
    }

    #[test]
    fn page_without_entries_yields_nothing() {
        assert!(extract_candidates("<html><body>No results</body></html>", BASE).is_empty());
        assert!(extract_candidates("", BASE).is_empty());
    }

    #[test]
    fn title_without_rank_is_kept() {
        assert_eq!(strip_rank("Dr. Strangelove"), "Dr. Strangelove");
        assert_eq!(strip_rank("42. Dr. Strangelove"), "Dr. Strangelove");
    }

    #[test]
    fn director_from_labelled_credit() {
        let html = r#"
            <ul>
              <li class="ipc-metadata-list__item"><span>Writers</span>
                <a class="ipc-metadata-list-item__list-content-item--link">Jonathan Nolan</a></li>
              <li class="ipc-metadata-list__item"><span>Director</span>
                <div><ul><li><a class="ipc-metadata-list-item__list-content-item--link">Christopher Nolan</a></li></ul></div></li>
            </ul>"#;
        assert_eq!(extract_director(html).as_deref(), Some("Christopher Nolan"));
    }

    #[test]
    fn director_falls_back_to_first_credit_link() {
        let html = r#"<div><a class="ipc-metadata-list-item__list-content-item--link">S&eacute;bastien Lifshitz</a>
                      <a class="ipc-metadata-list-item__list-content-item--link">Someone Else</a></div>"#;
        assert_eq!(extract_director(html).as_deref(), Some("Sébastien Lifshitz"));
    }

    #[test]
    fn director_absent() {
        assert_eq!(extract_director("<html><body><p>Nothing here</p></body></html>"), None);
    }
}
