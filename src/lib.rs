//! # Financial Statement Extractor
//!
//! A library for pulling balance-sheet and income-statement tables out of the
//! plain text of financial reports, and for deriving ratios and
//! period-over-period changes from them.
//!
//! ## Core Concepts
//!
//! - **Document Text**: per-page lines supplied by an external text extractor; nothing here parses PDFs
//! - **Canonical Line-Items**: normalized row labels ("total assets") with prioritized phrase variants
//! - **Statement Templates**: how to find one statement (identifiers, fallback keywords) and when to stop reading it
//! - **Statement Table**: period header plus one deduplicated, column-aligned row per canonical label
//! - **Derived Metrics**: guarded ratios and period-over-period changes computed from the table itself
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_statement_extractor::*;
//!
//! let doc = DocumentText::from_page_texts(
//!     "annual-report.pdf",
//!     [
//!         "Statement of Assets and Liabilities\n\
//!          As at 31 March 2024   As at 31 March 2023\n\
//!          Total assets  1,50,000.00  1,20,000.00\n\
//!          Total liabilities  60,000.00  50,000.00",
//!     ],
//! );
//!
//! let outcome = extract_statement(&doc, StatementType::BalanceSheet).unwrap();
//! match outcome {
//!     ExtractionOutcome::Found(table) => println!("{}", render_grid(&table)),
//!     ExtractionOutcome::NotFound(reason) => {
//!         println!("{}", reason.user_message(StatementType::BalanceSheet))
//!     }
//! }
//! ```

pub mod assembler;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod header;
pub mod locator;
pub mod metrics;
pub mod render;
pub mod schema;
pub mod taxonomy;
pub mod tokenizer;
pub mod utils;

pub use assembler::{AssembledTable, AssemblyState, RowAssembler};
pub use cache::{content_fingerprint, ResultCache};
pub use config::{
    ExtractorConfig, FallbackScope, RatioDefinition, StatementTemplate, TerminationRule,
    ZeroDivisionSentinel,
};
pub use engine::{DocumentExtraction, ExtractionEngine, ExtractionOutcome, NotFoundReason};
pub use error::{ExtractionError, Result};
pub use header::{is_most_recent_first, parse_period_date, PeriodHeaderExtractor};
pub use locator::SectionLocator;
pub use metrics::{
    percentage_change, period_over_period, ratio_values, DerivedMetricsEngine, DocumentAnalysis,
    GuardedRatio, MetricAnalysis, MetricSeries, PeriodChange, RatioAnalysis, RatioSeries,
    TableAnalysis,
};
pub use render::{format_currency, render_analysis, render_document_analysis, render_grid};
pub use schema::*;
pub use taxonomy::{standard_line_items, CanonicalLineItem, PhraseMatch, Taxonomy};
pub use tokenizer::{NumericToken, NumericTokenizer};

use log::{debug, info};
use std::sync::Arc;

/// Extraction, analysis and caching behind one handle.
///
/// The cache is injected so several processors (or threads) can share it.
pub struct StatementProcessor {
    engine: ExtractionEngine,
    metrics: DerivedMetricsEngine,
    cache: Arc<ResultCache>,
}

impl StatementProcessor {
    pub fn new(config: ExtractorConfig, cache: Arc<ResultCache>) -> Result<Self> {
        let metrics = DerivedMetricsEngine::new(config.zero_division);
        let engine = ExtractionEngine::new(config)?;
        Ok(Self {
            engine,
            metrics,
            cache,
        })
    }

    pub fn with_standard_config() -> Result<Self> {
        Self::new(ExtractorConfig::standard(), Arc::new(ResultCache::new()))
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn extract(&self, doc: &DocumentText) -> Arc<DocumentExtraction> {
        info!(
            "Extracting statements from '{}' ({} pages, {} lines)",
            doc.id,
            doc.page_count(),
            doc.line_count()
        );
        self.cache.get_or_extract(&self.engine, doc)
    }

    pub fn analyze(&self, doc: &DocumentText) -> DocumentAnalysis {
        let extraction = self.extract(doc);
        self.metrics
            .analyze_document(&extraction, self.engine.config())
    }

    /// Grids of every extracted statement followed by the analysis report.
    pub fn report(&self, doc: &DocumentText) -> String {
        let extraction = self.extract(doc);
        let mut output = String::new();

        for (statement_type, outcome) in &extraction.statements {
            output.push_str(&format!("{}\n", statement_type.display_name()));
            match outcome.table() {
                Some(table) => output.push_str(&render_grid(table)),
                None => output.push_str(&outcome.user_message(*statement_type)),
            }
            output.push_str("\n\n");
        }

        let analysis = self
            .metrics
            .analyze_document(&extraction, self.engine.config());
        output.push_str(&render_document_analysis(&analysis));

        debug!("Report for '{}' is {} bytes", doc.id, output.len());
        output
    }
}

/// Extracts one statement with the built-in configuration.
pub fn extract_statement(
    doc: &DocumentText,
    statement_type: StatementType,
) -> Result<ExtractionOutcome> {
    let engine = ExtractionEngine::with_standard_config()?;
    Ok(engine.extract(doc, statement_type))
}

/// Extracts and analyzes both statements with the built-in configuration.
pub fn analyze_document(doc: &DocumentText) -> Result<DocumentAnalysis> {
    let config = ExtractorConfig::standard();
    let engine = ExtractionEngine::new(config.clone())?;
    let extraction = engine.extract_all(doc);
    Ok(DerivedMetricsEngine::new(config.zero_division).analyze_document(&extraction, &config))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_statement_doc() -> DocumentText {
        DocumentText::from_page_texts(
            "report",
            [
                "Statement of Profit and Loss for the year ended 31 March 2024\n\
                 Particulars   Year ended 31 March 2024   Year ended 31 March 2023\n\
                 I. Total Income  5,000.00  4,000.00\n\
                 II. Total Expenses  3,000.00  3,000.00",
                "Balance Sheet\nAs at 31 March 2024   As at 31 March 2023\n\
                 Total assets  1,50,000.00  1,20,000.00\n\
                 Total liabilities  60,000.00  50,000.00\n\
                 Total equity  90,000.00  70,000.00",
            ],
        )
    }

    #[test]
    fn test_end_to_end_processing() {
        let processor = StatementProcessor::with_standard_config().unwrap();
        let doc = two_statement_doc();

        let extraction = processor.extract(&doc);
        let income = extraction.table(StatementType::IncomeStatement).unwrap();
        assert_eq!(
            income.row("total_income").unwrap().values,
            vec![Some(5000.0), Some(4000.0)]
        );
        assert_eq!(income.extracted_rows().count(), 2);

        let analysis = processor.analyze(&doc);
        let income_change = &analysis.metric("total_income").unwrap().changes[0];
        assert!((income_change.pct_change - 25.0).abs() < 1e-9);
        let expenses_change = &analysis.metric("total_expenses").unwrap().changes[0];
        assert_eq!(expenses_change.pct_change, 0.0);
        assert!(analysis.unavailable.is_empty());

        assert_eq!(processor.cache().len(), 1);
    }

    #[test]
    fn test_report_lists_missing_statement() {
        let doc = DocumentText::from_page_texts(
            "bs-only",
            ["Balance Sheet\nAs at 31 March 2024   As at 31 March 2023\nTotal assets  200.00  100.00"],
        );
        let report = StatementProcessor::with_standard_config()
            .unwrap()
            .report(&doc);

        assert!(report.contains("COMPREHENSIVE FINANCIAL ANALYSIS"));
        assert!(report.contains("Could not find the income statement in the document."));
        assert!(report.contains("Increase: 100.00%"));
    }

    #[test]
    fn test_convenience_functions() {
        let doc = two_statement_doc();
        let outcome = extract_statement(&doc, StatementType::BalanceSheet).unwrap();
        assert!(outcome.is_found());

        let analysis = analyze_document(&doc).unwrap();
        assert_eq!(analysis.statements.len(), 2);
        let ratio = analysis
            .statement(StatementType::BalanceSheet)
            .and_then(|t| t.ratio("assets_to_liabilities"))
            .unwrap();
        assert_eq!(ratio.ratio.values, vec![Some(2.5), Some(2.4)]);
    }
}
