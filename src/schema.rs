use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StatementType {
    #[schemars(
        description = "Statement of assets and liabilities: point-in-time balances (assets, liabilities, equity)"
    )]
    BalanceSheet,

    #[schemars(
        description = "Statement of profit and loss: activity over a period (income, expenses, comprehensive income, per-share figures)"
    )]
    IncomeStatement,
}

impl StatementType {
    pub const ALL: [StatementType; 2] = [StatementType::BalanceSheet, StatementType::IncomeStatement];

    pub fn display_name(&self) -> &'static str {
        match self {
            StatementType::BalanceSheet => "Balance Sheet",
            StatementType::IncomeStatement => "Income Statement",
        }
    }
}

impl fmt::Display for StatementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// The plain text of one document, page by page and line by line.
///
/// Supplied by an external text-extraction step; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DocumentText {
    #[schemars(description = "Caller-chosen identity of the document (usually its path)")]
    pub id: String,

    #[schemars(description = "Pages in document order, each an ordered list of text lines")]
    pub pages: Vec<Vec<String>>,
}

impl DocumentText {
    pub fn new(id: impl Into<String>, pages: Vec<Vec<String>>) -> Self {
        Self {
            id: id.into(),
            pages,
        }
    }

    /// Builds a document from one text blob per page, splitting each on line breaks.
    pub fn from_page_texts<I, S>(id: impl Into<String>, pages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pages = pages
            .into_iter()
            .map(|text| text.as_ref().lines().map(str::to_string).collect())
            .collect();
        Self::new(id, pages)
    }

    /// Splits a plain-text dump on form feeds, the page separator most
    /// text extractors emit.
    pub fn from_text_dump(id: impl Into<String>, text: &str) -> Self {
        Self::from_page_texts(id, text.split('\x0c'))
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(Vec::len).sum()
    }

    /// All lines in document order with their positions.
    pub fn lines(&self) -> Vec<DocumentLine<'_>> {
        let mut lines = Vec::with_capacity(self.line_count());
        for (page, page_lines) in self.pages.iter().enumerate() {
            for (line, text) in page_lines.iter().enumerate() {
                let index = lines.len();
                lines.push(DocumentLine {
                    position: LinePosition { page, line, index },
                    text,
                });
            }
        }
        lines
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct LinePosition {
    #[schemars(description = "Zero-based page number")]
    pub page: usize,
    #[schemars(description = "Zero-based line number within the page")]
    pub line: usize,
    #[schemars(description = "Zero-based index in the flattened line stream")]
    pub index: usize,
}

impl fmt::Display for LinePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "page {}, line {}", self.page + 1, self.line + 1)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DocumentLine<'a> {
    pub position: LinePosition,
    pub text: &'a str,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum LocatorStrategy {
    #[schemars(description = "A configured statement title such as 'Statement of Assets and Liabilities'")]
    Identifier,
    #[schemars(description = "A generic keyword such as 'as at' or 'particulars'")]
    FallbackKeyword,
}

/// Where a statement's table begins and which rule found it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SectionMatch {
    pub position: LinePosition,
    pub strategy: LocatorStrategy,
    pub phrase: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct PeriodHeader {
    #[schemars(
        description = "Column labels; column 0 is the row-label column, the rest are reporting periods, most recent first"
    )]
    pub column_labels: Vec<String>,

    #[schemars(description = "Line the period labels were read from, if a header line was found")]
    pub detected_at: Option<LinePosition>,
}

impl PeriodHeader {
    pub fn row_label_only(row_label: impl Into<String>) -> Self {
        Self {
            column_labels: vec![row_label.into()],
            detected_at: None,
        }
    }

    pub fn period_count(&self) -> usize {
        self.column_labels.len().saturating_sub(1)
    }

    pub fn periods(&self) -> &[String] {
        self.column_labels.get(1..).unwrap_or(&[])
    }

    pub fn is_detected(&self) -> bool {
        self.detected_at.is_some()
    }

    /// Appends synthesized `Value N` labels until the header has `periods` data columns.
    pub fn widen_to(&mut self, periods: usize) {
        while self.period_count() < periods {
            let next = self.period_count() + 1;
            self.column_labels.push(format!("Value {}", next));
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowOrigin {
    /// Read from a document line that matched a taxonomy phrase.
    Extracted {
        position: LinePosition,
        matched_phrase: String,
        source_text: String,
    },
    /// Computed column by column from two extracted rows.
    DerivedRatio {
        numerator: String,
        denominator: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExtractedRow {
    pub canonical_label: String,
    pub display_name: String,

    #[schemars(
        description = "One entry per period column; null marks a value absent from the document, never zero"
    )]
    pub values: Vec<Option<f64>>,

    pub origin: RowOrigin,
}

impl ExtractedRow {
    pub fn value(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied().flatten()
    }

    /// Right-pads with absent markers; never truncates.
    pub fn pad_to(&mut self, width: usize) {
        if self.values.len() < width {
            self.values.resize(width, None);
        }
    }

    pub fn is_derived(&self) -> bool {
        matches!(self.origin, RowOrigin::DerivedRatio { .. })
    }
}

/// Recoverable data problems met while assembling a table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "note", rename_all = "snake_case")]
pub enum DataQualityNote {
    MalformedNumber {
        position: LinePosition,
        token: String,
    },
    DuplicateRow {
        canonical_label: String,
        position: LinePosition,
    },
    RowWithoutValues {
        canonical_label: String,
        position: LinePosition,
    },
    DivisionByZero {
        canonical_label: String,
        column: usize,
    },
    HeaderNotFound,
    HeaderWidened {
        from_periods: usize,
        to_periods: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct StatementTable {
    pub statement_type: StatementType,

    #[schemars(description = "Name of the statement template that produced this table")]
    pub template: String,

    pub section: SectionMatch,
    pub header: PeriodHeader,

    #[schemars(description = "At most one row per canonical label, in first-seen order, derived rows last")]
    pub rows: Vec<ExtractedRow>,

    #[serde(default)]
    pub notes: Vec<DataQualityNote>,
}

impl StatementTable {
    pub fn row(&self, canonical_label: &str) -> Option<&ExtractedRow> {
        self.rows.iter().find(|r| r.canonical_label == canonical_label)
    }

    pub fn extracted_rows(&self) -> impl Iterator<Item = &ExtractedRow> {
        self.rows.iter().filter(|r| !r.is_derived())
    }

    pub fn derived_rows(&self) -> impl Iterator<Item = &ExtractedRow> {
        self.rows.iter().filter(|r| r.is_derived())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(StatementTable)
    }

    pub fn schema_as_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_lines_are_flattened_in_order() {
        let doc = DocumentText::from_page_texts("doc", ["a\nb", "c"]);
        let lines = doc.lines();

        assert_eq!(doc.page_count(), 2);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[2].text, "c");
        assert_eq!(lines[2].position.page, 1);
        assert_eq!(lines[2].position.line, 0);
        assert_eq!(lines[2].position.index, 2);
    }

    #[test]
    fn test_text_dump_splits_on_form_feed() {
        let doc = DocumentText::from_text_dump("dump", "page one\n\x0cpage two\nmore");
        assert_eq!(doc.page_count(), 2);
        assert_eq!(doc.pages[1], vec!["page two".to_string(), "more".to_string()]);
    }

    #[test]
    fn test_header_widening() {
        let mut header = PeriodHeader::row_label_only("Particulars");
        assert_eq!(header.period_count(), 0);
        assert!(header.periods().is_empty());

        header.widen_to(2);
        assert_eq!(header.column_labels, vec!["Particulars", "Value 1", "Value 2"]);

        header.widen_to(1);
        assert_eq!(header.period_count(), 2);
    }

    #[test]
    fn test_row_padding_never_truncates() {
        let mut row = ExtractedRow {
            canonical_label: "total_assets".to_string(),
            display_name: "Total Assets".to_string(),
            values: vec![Some(1.0), Some(2.0)],
            origin: RowOrigin::DerivedRatio {
                numerator: "a".to_string(),
                denominator: "b".to_string(),
            },
        };

        row.pad_to(4);
        assert_eq!(row.values, vec![Some(1.0), Some(2.0), None, None]);

        row.pad_to(1);
        assert_eq!(row.values.len(), 4);
        assert_eq!(row.value(1), Some(2.0));
        assert_eq!(row.value(3), None);
        assert_eq!(row.value(9), None);
    }

    #[test]
    fn test_table_schema_generation() {
        let schema_json = StatementTable::schema_as_json().unwrap();
        assert!(schema_json.contains("column_labels"));
        assert!(schema_json.contains("canonical_label"));
    }
}
