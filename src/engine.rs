use crate::assembler::{AssemblyState, RowAssembler};
use crate::cache::content_fingerprint;
use crate::config::{ExtractorConfig, StatementTemplate};
use crate::error::Result;
use crate::header::PeriodHeaderExtractor;
use crate::locator::SectionLocator;
use crate::metrics::{DerivedMetricsEngine, TableAnalysis};
use crate::schema::{DocumentText, SectionMatch, StatementTable, StatementType};
use crate::taxonomy::Taxonomy;
use crate::tokenizer::NumericTokenizer;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum NotFoundReason {
    /// The configuration has no template for the statement type.
    NoTemplate,
    /// No identifier or fallback keyword occurs in the document.
    NoSection,
    /// A section was located but no dated header line follows it.
    NoHeader { section: SectionMatch },
    /// A section was located but no line matched a canonical line-item.
    NoMatchingRows { section: SectionMatch },
}

impl NotFoundReason {
    /// How far the pass got before giving up; later stages rank higher.
    pub fn stage(&self) -> u8 {
        match self {
            NotFoundReason::NoTemplate => 0,
            NotFoundReason::NoSection => 1,
            NotFoundReason::NoHeader { .. } => 2,
            NotFoundReason::NoMatchingRows { .. } => 3,
        }
    }

    pub fn user_message(&self, statement_type: StatementType) -> String {
        let name = statement_type.display_name().to_lowercase();
        match self {
            NotFoundReason::NoTemplate => {
                format!("No template is configured for the {}.", name)
            }
            NotFoundReason::NoSection => {
                format!("Could not find the {} in the document.", name)
            }
            NotFoundReason::NoHeader { section } => format!(
                "Found the {} at {} but could not find its reporting periods.",
                name, section.position
            ),
            NotFoundReason::NoMatchingRows { section } => format!(
                "Found the {} at {} but could not read any line items from it.",
                name, section.position
            ),
        }
    }
}

/// Result of extracting one statement: a table, or an explicit reason why
/// there is none. An empty table is never returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Found(StatementTable),
    NotFound(NotFoundReason),
}

impl ExtractionOutcome {
    pub fn table(&self) -> Option<&StatementTable> {
        match self {
            ExtractionOutcome::Found(table) => Some(table),
            ExtractionOutcome::NotFound(_) => None,
        }
    }

    pub fn into_table(self) -> Option<StatementTable> {
        match self {
            ExtractionOutcome::Found(table) => Some(table),
            ExtractionOutcome::NotFound(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ExtractionOutcome::Found(_))
    }

    pub fn user_message(&self, statement_type: StatementType) -> String {
        match self {
            ExtractionOutcome::Found(table) => format!(
                "Extracted the {} with {} rows.",
                statement_type.display_name().to_lowercase(),
                table.rows.len()
            ),
            ExtractionOutcome::NotFound(reason) => reason.user_message(statement_type),
        }
    }
}

/// Every statement extracted from one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub document_id: String,
    /// Hex SHA-256 of the document text.
    pub fingerprint: String,
    pub statements: BTreeMap<StatementType, ExtractionOutcome>,
}

impl DocumentExtraction {
    pub fn outcome(&self, statement_type: StatementType) -> Option<&ExtractionOutcome> {
        self.statements.get(&statement_type)
    }

    pub fn table(&self, statement_type: StatementType) -> Option<&StatementTable> {
        self.outcome(statement_type).and_then(ExtractionOutcome::table)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Configurable extraction engine: one taxonomy and a set of statement
/// templates drive the locator, header extractor and row assembler.
pub struct ExtractionEngine {
    config: ExtractorConfig,
    taxonomy: Taxonomy,
    tokenizer: NumericTokenizer,
    header_extractor: PeriodHeaderExtractor,
}

impl ExtractionEngine {
    pub fn new(config: ExtractorConfig) -> Result<Self> {
        config.validate()?;
        let taxonomy = Taxonomy::new(config.line_items.clone())?;

        debug!(
            "Extraction engine ready: {} line-items, {} templates",
            taxonomy.items().len(),
            config.templates.len()
        );

        Ok(Self {
            header_extractor: PeriodHeaderExtractor::new(config.header_lookahead),
            tokenizer: NumericTokenizer::new(),
            taxonomy,
            config,
        })
    }

    pub fn with_standard_config() -> Result<Self> {
        Self::new(ExtractorConfig::standard())
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Tries each template for `statement_type` in configured order and
    /// returns the first table found. When every template fails, the reason
    /// from the template that got furthest is kept (the earliest on ties).
    pub fn extract(&self, doc: &DocumentText, statement_type: StatementType) -> ExtractionOutcome {
        let mut best = NotFoundReason::NoTemplate;

        for template in self.config.templates_for(statement_type) {
            let reason = match self.extract_with_template(doc, template) {
                ExtractionOutcome::Found(table) => return ExtractionOutcome::Found(table),
                ExtractionOutcome::NotFound(reason) => reason,
            };
            debug!(
                "Template '{}' found nothing in '{}': {:?}",
                template.name, doc.id, reason
            );
            if reason.stage() > best.stage() {
                best = reason;
            }
        }

        ExtractionOutcome::NotFound(best)
    }

    /// One sequential pass over `doc` with a single template.
    pub fn extract_with_template(
        &self,
        doc: &DocumentText,
        template: &StatementTemplate,
    ) -> ExtractionOutcome {
        let lines = doc.lines();
        let mut assembler = RowAssembler::new(
            template,
            &self.taxonomy,
            &self.tokenizer,
            self.config.zero_division,
        );

        let Some(section) = SectionLocator::new(template).locate(&lines) else {
            return ExtractionOutcome::NotFound(NotFoundReason::NoSection);
        };

        assembler.transition(AssemblyState::ReadingHeader);
        let header = self
            .header_extractor
            .extract(&lines, section.position.index, &template.row_label);
        if template.require_header && !header.is_detected() {
            info!(
                "No period header for {} in '{}' near {}",
                template.statement_type, doc.id, section.position
            );
            return ExtractionOutcome::NotFound(NotFoundReason::NoHeader { section });
        }

        assembler.transition(AssemblyState::ReadingRows);
        for line in &lines[section.position.index..] {
            if assembler.feed(line) == AssemblyState::Done {
                break;
            }
        }

        if assembler.rows().is_empty() {
            info!(
                "No {} rows in '{}' after {}",
                template.statement_type, doc.id, section.position
            );
            return ExtractionOutcome::NotFound(NotFoundReason::NoMatchingRows { section });
        }

        let assembled = assembler.finish(header);
        let table = StatementTable {
            statement_type: template.statement_type,
            template: template.name.clone(),
            section,
            header: assembled.header,
            rows: assembled.rows,
            notes: assembled.notes,
        };

        info!(
            "Assembled {} for '{}': {} periods, {} rows, {} notes",
            table.statement_type,
            doc.id,
            table.header.period_count(),
            table.rows.len(),
            table.notes.len()
        );

        ExtractionOutcome::Found(table)
    }

    pub fn extract_all(&self, doc: &DocumentText) -> DocumentExtraction {
        let statements = StatementType::ALL
            .iter()
            .map(|&statement_type| (statement_type, self.extract(doc, statement_type)))
            .collect();

        DocumentExtraction {
            document_id: doc.id.clone(),
            fingerprint: content_fingerprint(doc),
            statements,
        }
    }

    /// Analysis of a table using the ratios of the template that produced it.
    pub fn analyze(&self, table: &StatementTable) -> TableAnalysis {
        let ratios = self
            .config
            .template(&table.template)
            .map(|t| t.ratios.as_slice())
            .unwrap_or_default();
        DerivedMetricsEngine::new(self.config.zero_division).analyze(table, ratios)
    }
}
