use crate::error::{ExtractionError, Result};
use crate::schema::StatementType;
use crate::utils::normalize_line;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CanonicalLineItem {
    #[schemars(description = "Stable snake_case identifier of the row, e.g. 'total_assets'")]
    pub canonical_label: String,

    #[schemars(description = "Human readable row name used when rendering, e.g. 'Total Assets'")]
    pub display_name: String,

    pub statement_type: StatementType,

    #[schemars(
        description = "Phrases that identify this row, tried in order. Specific phrases must come before general ones ('total non-current assets' before 'total assets')."
    )]
    pub phrase_variants: Vec<String>,
}

impl CanonicalLineItem {
    pub fn new(
        canonical_label: &str,
        display_name: &str,
        statement_type: StatementType,
        phrase_variants: &[&str],
    ) -> Self {
        Self {
            canonical_label: canonical_label.to_string(),
            display_name: display_name.to_string(),
            statement_type,
            phrase_variants: phrase_variants.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// A taxonomy phrase found in a line.
#[derive(Debug, Clone, Copy)]
pub struct PhraseMatch<'a> {
    pub item: &'a CanonicalLineItem,
    pub phrase: &'a str,
    /// Byte offset just past the phrase in the normalized line.
    pub end: usize,
}

/// Ordered, validated set of canonical line-items.
///
/// Matching walks items in order and each item's variants in order; the
/// first variant contained in the line wins.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    items: Vec<CanonicalLineItem>,
}

impl Taxonomy {
    pub fn new(items: Vec<CanonicalLineItem>) -> Result<Self> {
        let items: Vec<CanonicalLineItem> = items
            .into_iter()
            .map(|mut item| {
                item.phrase_variants = item
                    .phrase_variants
                    .iter()
                    .map(|p| normalize_line(p))
                    .collect();
                item
            })
            .collect();

        validate_items(&items)?;
        Ok(Self { items })
    }

    pub fn standard() -> Result<Self> {
        Self::new(standard_line_items())
    }

    pub fn items(&self) -> &[CanonicalLineItem] {
        &self.items
    }

    pub fn items_for(
        &self,
        statement_type: StatementType,
    ) -> impl Iterator<Item = &CanonicalLineItem> {
        self.items
            .iter()
            .filter(move |item| item.statement_type == statement_type)
    }

    pub fn get(&self, canonical_label: &str) -> Option<&CanonicalLineItem> {
        self.items
            .iter()
            .find(|item| item.canonical_label == canonical_label)
    }

    /// Finds the highest-priority phrase of `statement_type` in an already
    /// normalized line.
    pub fn match_line(
        &self,
        statement_type: StatementType,
        normalized: &str,
    ) -> Option<PhraseMatch<'_>> {
        self.items_for(statement_type).find_map(|item| {
            item.phrase_variants.iter().find_map(|phrase| {
                normalized.find(phrase.as_str()).map(|start| PhraseMatch {
                    item,
                    phrase: phrase.as_str(),
                    end: start + phrase.len(),
                })
            })
        })
    }
}

fn validate_items(items: &[CanonicalLineItem]) -> Result<()> {
    let mut seen = HashSet::new();

    for item in items {
        if item.canonical_label.trim().is_empty() {
            return Err(ExtractionError::InvalidTaxonomy {
                label: item.display_name.clone(),
                details: "canonical label is empty".to_string(),
            });
        }

        if !seen.insert(item.canonical_label.as_str()) {
            return Err(ExtractionError::InvalidTaxonomy {
                label: item.canonical_label.clone(),
                details: "canonical label is defined more than once".to_string(),
            });
        }

        if item.phrase_variants.is_empty() || item.phrase_variants.iter().any(|p| p.is_empty()) {
            return Err(ExtractionError::InvalidTaxonomy {
                label: item.canonical_label.clone(),
                details: "phrase variants must be non-empty".to_string(),
            });
        }
    }

    // An earlier phrase contained in a later one makes the later one unreachable.
    for statement_type in StatementType::ALL {
        let ordered: Vec<(&str, &str)> = items
            .iter()
            .filter(|item| item.statement_type == statement_type)
            .flat_map(|item| {
                item.phrase_variants
                    .iter()
                    .map(move |p| (item.canonical_label.as_str(), p.as_str()))
            })
            .collect();

        for (i, (earlier_label, earlier)) in ordered.iter().enumerate() {
            for (later_label, later) in &ordered[i + 1..] {
                if later.contains(earlier) {
                    return Err(ExtractionError::InvalidTaxonomy {
                        label: later_label.to_string(),
                        details: format!(
                            "phrase '{}' can never match because '{}' ({}) is tried first",
                            later, earlier, earlier_label
                        ),
                    });
                }
            }
        }
    }

    Ok(())
}

pub fn standard_line_items() -> Vec<CanonicalLineItem> {
    use StatementType::{BalanceSheet, IncomeStatement};

    vec![
        CanonicalLineItem::new(
            "total_non_current_assets",
            "Total Non-Current Assets",
            BalanceSheet,
            &["total non-current assets", "total non current assets"],
        ),
        CanonicalLineItem::new(
            "total_current_assets",
            "Total Current Assets",
            BalanceSheet,
            &["total current assets"],
        ),
        CanonicalLineItem::new("total_assets", "Total Assets", BalanceSheet, &["total assets"]),
        CanonicalLineItem::new(
            "total_non_current_liabilities",
            "Total Non-Current Liabilities",
            BalanceSheet,
            &["total non-current liabilities", "total non current liabilities"],
        ),
        CanonicalLineItem::new(
            "total_current_liabilities",
            "Total Current Liabilities",
            BalanceSheet,
            &["total current liabilities"],
        ),
        CanonicalLineItem::new(
            "total_equity_and_liabilities",
            "Total Equity and Liabilities",
            BalanceSheet,
            &["total equity and liabilities", "total liabilities and equity"],
        ),
        CanonicalLineItem::new(
            "total_liabilities",
            "Total Liabilities",
            BalanceSheet,
            &["total liabilities"],
        ),
        CanonicalLineItem::new("total_equity", "Total Equity", BalanceSheet, &["total equity"]),
        CanonicalLineItem::new(
            "total_income",
            "Total Income",
            IncomeStatement,
            &["total income", "total revenue"],
        ),
        CanonicalLineItem::new(
            "total_expenses",
            "Total Expenses",
            IncomeStatement,
            &["total expenses", "total expenditure"],
        ),
        CanonicalLineItem::new(
            "profit_before_tax",
            "Profit Before Tax",
            IncomeStatement,
            &["profit/(loss) before tax", "profit before tax", "loss before tax"],
        ),
        CanonicalLineItem::new(
            "other_comprehensive_income",
            "Other Comprehensive Income",
            IncomeStatement,
            &["other comprehensive income", "other comprehensive loss"],
        ),
        CanonicalLineItem::new(
            "total_comprehensive_loss",
            "Total Comprehensive Loss",
            IncomeStatement,
            &["total comprehensive loss", "comprehensive loss"],
        ),
        CanonicalLineItem::new(
            "total_comprehensive_income",
            "Total Comprehensive Income",
            IncomeStatement,
            &[
                "total comprehensive income",
                "comprehensive profit",
                "comprehensive income",
            ],
        ),
        CanonicalLineItem::new(
            "loss_per_share",
            "Loss per Equity Share",
            IncomeStatement,
            &["loss per equity share", "loss per share"],
        ),
        CanonicalLineItem::new(
            "earnings_per_share",
            "Earnings per Equity Share",
            IncomeStatement,
            &["earnings per equity share", "earnings per share"],
        ),
    ]
}
