use crate::models::{RawPriceRecord, RawQualityRecord};
use crate::scraper::cleaner::{parse_localized_number, round2};
use anyhow::Result;
use scraper::{ElementRef, Html, Selector};

/// The two page layouts served per city.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    /// Product rows with a min/max price bar.
    CostOfLiving,
    /// Flat indicator table (one row per index).
    QualityOfLife,
}

impl PageKind {
    /// URL path segment for this page kind.
    pub fn path(&self) -> &'static str {
        match self {
            PageKind::CostOfLiving => "cost-of-living",
            PageKind::QualityOfLife => "quality-of-life",
        }
    }
}

/// Records extracted from one page, tagged by kind.
#[derive(Debug, Clone)]
pub enum PageRecords {
    Prices(Vec<RawPriceRecord>),
    Quality(Vec<RawQualityRecord>),
}

impl PageRecords {
    pub fn len(&self) -> usize {
        match self {
            PageRecords::Prices(v) => v.len(),
            PageRecords::Quality(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Extract raw records from a fetched page. Malformed rows are skipped,
/// never fatal; a page with no usable rows returns an empty vector.
pub fn extract_records(kind: PageKind, html: &str, city: &str) -> Result<PageRecords> {
    match kind {
        PageKind::CostOfLiving => Ok(PageRecords::Prices(extract_price_rows(html, city)?)),
        PageKind::QualityOfLife => Ok(PageRecords::Quality(extract_quality_rows(html, city)?)),
    }
}

fn sel(s: &str) -> Result<Selector> {
    Selector::parse(s).map_err(|e| anyhow::anyhow!("selector {}: {:?}", s, e))
}

fn cell_text(el: ElementRef) -> String {
    el.text().collect::<String>().trim().to_string()
}

// ── Cost-of-living page ───────────────────────────────────────────────────────

/// Walk every table row: the first cell is the product label, and the
/// priceBarTd following it holds the low/high bounds as two nested spans.
/// A row missing either bound yields no record.
pub fn extract_price_rows(html: &str, city: &str) -> Result<Vec<RawPriceRecord>> {
    let doc = Html::parse_document(html);

    let tr_sel = sel("tr")?;
    let td_sel = sel("td")?;
    let left_sel = sel("span.barTextLeft")?;
    let right_sel = sel("span.barTextRight")?;

    let mut records = Vec::new();

    for tr in doc.select(&tr_sel) {
        let tds: Vec<ElementRef> = tr.select(&td_sel).collect();
        if tds.len() < 2 {
            continue;
        }

        let produit = cell_text(tds[0]);
        if produit.is_empty() {
            continue;
        }

        // The bar must follow the label cell as a sibling; a bar inside a
        // nested table belongs to the inner row's own label.
        let Some(bar) = tds[0].next_siblings().find_map(|node| {
            ElementRef::wrap(node).filter(|el| el.value().classes().any(|c| c == "priceBarTd"))
        }) else {
            continue;
        };

        let prix_min = bar
            .select(&left_sel)
            .next()
            .map(cell_text)
            .and_then(|t| parse_localized_number(&t));
        let prix_max = bar
            .select(&right_sel)
            .next()
            .map(cell_text)
            .and_then(|t| parse_localized_number(&t));

        let (Some(prix_min), Some(prix_max)) = (prix_min, prix_max) else {
            continue;
        };

        records.push(RawPriceRecord {
            ville: city.to_string(),
            produit,
            prix_min,
            prix_max,
            prix_moyen: round2((prix_min + prix_max) / 2.0),
        });
    }

    Ok(records)
}

// ── Quality-of-life page ──────────────────────────────────────────────────────

/// Rows live inside the innerWidth content sections: cell 1 is the index
/// name (trailing colon stripped), cell 2 the raw value, cell 3 an optional
/// qualitative level defaulting to "N/A".
pub fn extract_quality_rows(html: &str, city: &str) -> Result<Vec<RawQualityRecord>> {
    let doc = Html::parse_document(html);

    let section_sel = sel("div.innerWidth")?;
    let tr_sel = sel("tr")?;
    let td_sel = sel("td")?;

    let mut records = Vec::new();

    for section in doc.select(&section_sel) {
        for tr in section.select(&tr_sel) {
            let tds: Vec<ElementRef> = tr.select(&td_sel).collect();
            if tds.len() < 2 {
                continue;
            }

            let indice = cell_text(tds[0]).trim_end_matches(':').trim().to_string();
            let valeur = cell_text(tds[1]);
            let niveau = tds
                .get(2)
                .map(|td| cell_text(*td))
                .unwrap_or_else(|| "N/A".to_string());

            records.push(RawQualityRecord {
                ville: city.to_string(),
                indice,
                valeur,
                niveau,
            });
        }
    }

    Ok(records)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const PRICE_PAGE: &str = r#"
        <table>
          <tr>
            <td>Banana (1kg)</td>
            <td class="priceBarTd">
              <span class="barTextLeft">1,20</span>
              <span class="barTextRight">2,40 €</span>
            </td>
          </tr>
          <tr>
            <td>Milk (regular), (1 liter)</td>
            <td class="priceBarTd">
              <span class="barTextLeft">0,90</span>
            </td>
          </tr>
          <tr>
            <td>Broken row</td>
          </tr>
        </table>
    "#;

    #[test]
    fn price_rows_average_and_skip() {
        let records = extract_price_rows(PRICE_PAGE, "Paris").unwrap();
        // Only the complete row survives: the milk row misses the right
        // bound, the last row has a single cell.
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.ville, "Paris");
        assert_eq!(r.produit, "Banana (1kg)");
        assert_eq!(r.prix_min, 1.2);
        assert_eq!(r.prix_max, 2.4);
        assert_eq!(r.prix_moyen, 1.8);
    }

    #[test]
    fn bar_pairs_with_its_own_label_cell_only() {
        // The outer row has no sibling bar of its own; the only bar lives
        // in a nested table and belongs to the inner label.
        let page = r#"
            <table>
              <tr>
                <td>Outer</td>
                <td>
                  <table>
                    <tr>
                      <td>Inner</td>
                      <td class="priceBarTd">
                        <span class="barTextLeft">1,00</span>
                        <span class="barTextRight">2,00</span>
                      </td>
                    </tr>
                  </table>
                </td>
              </tr>
            </table>
        "#;
        let records = extract_price_rows(page, "Paris").unwrap();
        let produits: Vec<&str> = records.iter().map(|r| r.produit.as_str()).collect();
        assert_eq!(produits, vec!["Inner"]);
    }

    #[test]
    fn price_page_without_rows_is_empty() {
        let records = extract_price_rows("<html><body></body></html>", "Paris").unwrap();
        assert!(records.is_empty());
    }

    const QUALITY_PAGE: &str = r#"
        <div class="innerWidth">
          <table>
            <tr>
              <td>Safety Index:</td>
              <td>72,5</td>
              <td>High</td>
            </tr>
            <tr>
              <td>Pollution Index:</td>
              <td>44.1</td>
            </tr>
          </table>
        </div>
        <table>
          <tr><td>Outside section:</td><td>99</td></tr>
        </table>
    "#;

    #[test]
    fn quality_rows_strip_colon_and_default_level() {
        let records = extract_quality_rows(QUALITY_PAGE, "Lyon").unwrap();
        // The row outside div.innerWidth is ignored.
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].indice, "Safety Index");
        assert_eq!(records[0].valeur, "72,5");
        assert_eq!(records[0].niveau, "High");
        assert_eq!(records[1].indice, "Pollution Index");
        assert_eq!(records[1].niveau, "N/A");
    }

    #[test]
    fn extract_records_tags_by_kind() {
        let prices = extract_records(PageKind::CostOfLiving, PRICE_PAGE, "Paris").unwrap();
        assert!(matches!(prices, PageRecords::Prices(ref v) if v.len() == 1));

        let quality = extract_records(PageKind::QualityOfLife, QUALITY_PAGE, "Lyon").unwrap();
        assert!(matches!(quality, PageRecords::Quality(ref v) if v.len() == 2));
    }
}
