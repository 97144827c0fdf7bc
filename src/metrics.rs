use crate::config::{ExtractorConfig, RatioDefinition, ZeroDivisionSentinel};
use crate::engine::DocumentExtraction;
use crate::schema::{ExtractedRow, PeriodHeader, StatementTable, StatementType};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column-wise ratio values plus the columns where the denominator was zero.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardedRatio {
    pub values: Vec<Option<f64>>,
    pub zero_denominators: Vec<usize>,
}

/// Divides column by column. An absent operand gives an absent result; a
/// zero denominator gives the configured sentinel and is reported.
pub fn ratio_values(
    numerator: &[Option<f64>],
    denominator: &[Option<f64>],
    sentinel: ZeroDivisionSentinel,
) -> GuardedRatio {
    let width = numerator.len().max(denominator.len());
    let mut values = Vec::with_capacity(width);
    let mut zero_denominators = Vec::new();

    for column in 0..width {
        let num = numerator.get(column).copied().flatten();
        let den = denominator.get(column).copied().flatten();

        let value = match (num, den) {
            (_, Some(d)) if d == 0.0 => {
                zero_denominators.push(column);
                sentinel.value()
            }
            (Some(n), Some(d)) => Some(n / d),
            _ => None,
        };
        values.push(value);
    }

    GuardedRatio {
        values,
        zero_denominators,
    }
}

/// `(current - previous) / |previous| * 100`, or 0 when `previous` is 0.
pub fn percentage_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    (current - previous) / previous.abs() * 100.0
}

/// One metric across periods, most recent period first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    pub label: String,
    pub display_name: String,
    pub periods: Vec<String>,
    pub values: Vec<f64>,
}

impl MetricSeries {
    pub fn new(label: impl Into<String>, periods: Vec<String>, values: Vec<f64>) -> Self {
        let label = label.into();
        Self {
            display_name: label.clone(),
            label,
            periods,
            values,
        }
    }

    /// Takes the leading run of present values; the first absent value ends the series.
    pub fn from_row(row: &ExtractedRow, header: &PeriodHeader) -> Option<Self> {
        let values: Vec<f64> = row.values.iter().map_while(|v| *v).collect();
        if values.is_empty() {
            return None;
        }
        if values.len() < row.values.iter().flatten().count() {
            debug!(
                "Series '{}' truncated at its first absent value",
                row.canonical_label
            );
        }

        Some(Self {
            label: row.canonical_label.clone(),
            display_name: row.display_name.clone(),
            periods: period_labels(header, values.len()),
            values,
        })
    }

    pub fn latest(&self) -> Option<f64> {
        self.values.first().copied()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn period_labels(header: &PeriodHeader, count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            header
                .periods()
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("Value {}", i + 1))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodChange {
    /// (current period, previous period)
    pub period_pair: (String, String),
    pub current: f64,
    pub previous: f64,
    pub pct_change: f64,
    /// The previous value was zero, so `pct_change` is 0 by convention.
    pub zero_base: bool,
}

/// Compares each period with the one after it (the earlier period).
pub fn period_over_period(series: &MetricSeries) -> Vec<PeriodChange> {
    series
        .values
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (current, previous) = (pair[0], pair[1]);
            let zero_base = previous == 0.0;
            if zero_base {
                warn!(
                    "'{}' is zero in period '{}'; percentage change reported as 0",
                    series.label,
                    series.periods.get(i + 1).map(String::as_str).unwrap_or("?")
                );
            }
            PeriodChange {
                period_pair: (
                    series.periods.get(i).cloned().unwrap_or_default(),
                    series.periods.get(i + 1).cloned().unwrap_or_default(),
                ),
                current,
                previous,
                pct_change: percentage_change(current, previous),
                zero_base,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioSeries {
    pub label: String,
    pub display_name: String,
    pub numerator: String,
    pub denominator: String,
    pub periods: Vec<String>,
    pub values: Vec<Option<f64>>,
    pub zero_denominators: Vec<usize>,
}

impl RatioSeries {
    /// The leading run of defined ratio values as a plain series.
    pub fn as_series(&self) -> Option<MetricSeries> {
        let values: Vec<f64> = self.values.iter().map_while(|v| *v).collect();
        if values.is_empty() {
            return None;
        }
        Some(MetricSeries {
            label: self.label.clone(),
            display_name: self.display_name.clone(),
            periods: self.periods.iter().take(values.len()).cloned().collect(),
            values,
        })
    }

    /// Period-over-period movement of the ratio itself.
    pub fn changes(&self) -> Vec<PeriodChange> {
        self.as_series()
            .map(|series| period_over_period(&series))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricAnalysis {
    pub series: MetricSeries,
    pub changes: Vec<PeriodChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioAnalysis {
    pub ratio: RatioSeries,
    pub changes: Vec<PeriodChange>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableAnalysis {
    pub statement_type: StatementType,
    pub metrics: Vec<MetricAnalysis>,
    pub ratios: Vec<RatioAnalysis>,
}

impl TableAnalysis {
    pub fn metric(&self, label: &str) -> Option<&MetricAnalysis> {
        self.metrics.iter().find(|m| m.series.label == label)
    }

    pub fn ratio(&self, label: &str) -> Option<&RatioAnalysis> {
        self.ratios.iter().find(|r| r.ratio.label == label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    pub document_id: String,
    pub statements: BTreeMap<StatementType, TableAnalysis>,
    /// User-facing reasons for statements that could not be analyzed.
    pub unavailable: BTreeMap<StatementType, String>,
}

impl DocumentAnalysis {
    pub fn statement(&self, statement_type: StatementType) -> Option<&TableAnalysis> {
        self.statements.get(&statement_type)
    }

    pub fn metric(&self, label: &str) -> Option<&MetricAnalysis> {
        self.statements.values().find_map(|t| t.metric(label))
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

/// Ratios and period-over-period changes computed from assembled tables.
///
/// Period order is taken from the table as-is (most recent first).
#[derive(Debug, Clone, Copy, Default)]
pub struct DerivedMetricsEngine {
    zero_division: ZeroDivisionSentinel,
}

impl DerivedMetricsEngine {
    pub fn new(zero_division: ZeroDivisionSentinel) -> Self {
        Self { zero_division }
    }

    pub fn series(&self, table: &StatementTable, label: &str) -> Option<MetricSeries> {
        table
            .row(label)
            .and_then(|row| MetricSeries::from_row(row, &table.header))
    }

    /// Ratio of two series, aligned by position.
    pub fn ratio(&self, numerator: &MetricSeries, denominator: &MetricSeries) -> RatioSeries {
        let to_options = |values: &[f64]| values.iter().map(|v| Some(*v)).collect::<Vec<_>>();
        let guarded = ratio_values(
            &to_options(&numerator.values),
            &to_options(&denominator.values),
            self.zero_division,
        );

        let periods = if numerator.periods.len() >= denominator.periods.len() {
            numerator.periods.clone()
        } else {
            denominator.periods.clone()
        };

        RatioSeries {
            label: format!("{}_to_{}", numerator.label, denominator.label),
            display_name: format!("{}/{}", numerator.display_name, denominator.display_name),
            numerator: numerator.label.clone(),
            denominator: denominator.label.clone(),
            periods,
            values: guarded.values,
            zero_denominators: guarded.zero_denominators,
        }
    }

    /// Ratio of two rows of a table, column by column over the full header.
    pub fn table_ratio(
        &self,
        table: &StatementTable,
        definition: &RatioDefinition,
    ) -> Option<RatioSeries> {
        let numerator = table.row(&definition.numerator)?;
        let denominator = table.row(&definition.denominator)?;
        let guarded = ratio_values(&numerator.values, &denominator.values, self.zero_division);

        for column in &guarded.zero_denominators {
            warn!(
                "'{}' is zero in column {}; ratio '{}' uses the sentinel",
                definition.denominator, column, definition.canonical_label
            );
        }

        Some(RatioSeries {
            label: definition.canonical_label.clone(),
            display_name: definition.display_name.clone(),
            numerator: definition.numerator.clone(),
            denominator: definition.denominator.clone(),
            periods: period_labels(&table.header, guarded.values.len()),
            values: guarded.values,
            zero_denominators: guarded.zero_denominators,
        })
    }

    pub fn changes(&self, table: &StatementTable, label: &str) -> Option<MetricAnalysis> {
        let series = self.series(table, label)?;
        let changes = period_over_period(&series);
        Some(MetricAnalysis { series, changes })
    }

    /// Analyzes every extracted row and every listed ratio of `table`.
    pub fn analyze(&self, table: &StatementTable, ratios: &[RatioDefinition]) -> TableAnalysis {
        let metrics: Vec<MetricAnalysis> = table
            .extracted_rows()
            .filter_map(|row| self.changes(table, &row.canonical_label))
            .collect();

        let ratios: Vec<RatioAnalysis> = ratios
            .iter()
            .filter_map(|definition| self.table_ratio(table, definition))
            .map(|ratio| RatioAnalysis {
                changes: ratio.changes(),
                ratio,
            })
            .collect();

        debug!(
            "{} analysis: {} metrics, {} ratios",
            table.statement_type,
            metrics.len(),
            ratios.len()
        );

        TableAnalysis {
            statement_type: table.statement_type,
            metrics,
            ratios,
        }
    }

    /// Analyzes every statement found in a document, using each table's
    /// template ratios from `config`.
    pub fn analyze_document(
        &self,
        extraction: &DocumentExtraction,
        config: &ExtractorConfig,
    ) -> DocumentAnalysis {
        let mut statements = BTreeMap::new();
        let mut unavailable = BTreeMap::new();

        for (statement_type, outcome) in &extraction.statements {
            match outcome.table() {
                Some(table) => {
                    let ratios = config
                        .template(&table.template)
                        .map(|t| t.ratios.as_slice())
                        .unwrap_or_default();
                    statements.insert(*statement_type, self.analyze(table, ratios));
                }
                None => {
                    let message = outcome.user_message(*statement_type);
                    unavailable.insert(*statement_type, message);
                }
            }
        }

        info!(
            "Analyzed document '{}': {} statements, {} unavailable",
            extraction.document_id,
            statements.len(),
            unavailable.len()
        );

        DocumentAnalysis {
            document_id: extraction.document_id.clone(),
            statements,
            unavailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LinePosition, LocatorStrategy, RowOrigin, SectionMatch};

    fn row(label: &str, values: Vec<Option<f64>>) -> ExtractedRow {
        ExtractedRow {
            canonical_label: label.to_string(),
            display_name: label.to_string(),
            values,
            origin: RowOrigin::Extracted {
                position: LinePosition {
                    page: 0,
                    line: 0,
                    index: 0,
                },
                matched_phrase: label.to_string(),
                source_text: label.to_string(),
            },
        }
    }

    fn table(rows: Vec<ExtractedRow>) -> StatementTable {
        StatementTable {
            statement_type: StatementType::BalanceSheet,
            template: "standard_balance_sheet".to_string(),
            section: SectionMatch {
                position: LinePosition {
                    page: 0,
                    line: 0,
                    index: 0,
                },
                strategy: LocatorStrategy::Identifier,
                phrase: "balance sheet".to_string(),
            },
            header: PeriodHeader {
                column_labels: vec![
                    "Particulars".to_string(),
                    "2024".to_string(),
                    "2023".to_string(),
                    "2022".to_string(),
                ],
                detected_at: None,
            },
            rows,
            notes: Vec::new(),
        }
    }

    #[test]
    fn test_percentage_change_record() {
        let series = MetricSeries::new(
            "total_income",
            vec!["FY24".to_string(), "FY23".to_string()],
            vec![100.0, 50.0],
        );
        let changes = period_over_period(&series);

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].current, 100.0);
        assert_eq!(changes[0].previous, 50.0);
        assert!((changes[0].pct_change - 100.0).abs() < 1e-9);
        assert_eq!(
            changes[0].period_pair,
            ("FY24".to_string(), "FY23".to_string())
        );
    }

    #[test]
    fn test_percentage_change_uses_absolute_base() {
        assert!((percentage_change(-50.0, -100.0) - 50.0).abs() < 1e-9);
        assert!((percentage_change(50.0, 100.0) + 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_base_is_flagged() {
        let series = MetricSeries::new("x", vec!["a".into(), "b".into(), "c".into()], vec![10.0, 0.0, 5.0]);
        let changes = period_over_period(&series);

        assert_eq!(changes.len(), 2);
        assert!(changes[0].zero_base);
        assert_eq!(changes[0].pct_change, 0.0);
        assert!(!changes[1].zero_base);
        assert!((changes[1].pct_change + 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_guard() {
        let guarded = ratio_values(
            &[Some(10.0), Some(5.0), None, Some(1.0)],
            &[Some(4.0), Some(0.0), Some(2.0)],
            ZeroDivisionSentinel::Zero,
        );
        assert_eq!(guarded.values, vec![Some(2.5), Some(0.0), None, None]);
        assert_eq!(guarded.zero_denominators, vec![1]);

        let guarded = ratio_values(&[Some(5.0)], &[Some(0.0)], ZeroDivisionSentinel::Absent);
        assert_eq!(guarded.values, vec![None]);
    }

    #[test]
    fn test_series_from_row_stops_at_absent() {
        let t = table(vec![row("total_assets", vec![Some(3.0), None, Some(1.0)])]);
        let series = DerivedMetricsEngine::default()
            .series(&t, "total_assets")
            .unwrap();

        assert_eq!(series.values, vec![3.0]);
        assert_eq!(series.periods, vec!["2024"]);
        assert_eq!(series.latest(), Some(3.0));
        assert!(period_over_period(&series).is_empty());
    }

    #[test]
    fn test_series_ratio() {
        let engine = DerivedMetricsEngine::new(ZeroDivisionSentinel::Zero);
        let liabilities = MetricSeries::new("liabilities", vec!["a".into(), "b".into()], vec![60.0, 50.0]);
        let equity = MetricSeries::new("equity", vec!["a".into(), "b".into()], vec![30.0, 0.0]);

        let ratio = engine.ratio(&liabilities, &equity);
        assert_eq!(ratio.values, vec![Some(2.0), Some(0.0)]);
        assert_eq!(ratio.zero_denominators, vec![1]);
        assert_eq!(ratio.label, "liabilities_to_equity");
    }

    #[test]
    fn test_analyze_table() {
        let t = table(vec![
            row("total_assets", vec![Some(150.0), Some(120.0), Some(100.0)]),
            row("total_liabilities", vec![Some(60.0), Some(50.0), Some(50.0)]),
        ]);
        let ratios = vec![RatioDefinition::new(
            "assets_to_liabilities",
            "Assets/Liabilities",
            "total_assets",
            "total_liabilities",
        )];

        let analysis = DerivedMetricsEngine::default().analyze(&t, &ratios);

        let assets = analysis.metric("total_assets").unwrap();
        assert_eq!(assets.changes.len(), 2);
        assert!((assets.changes[0].pct_change - 25.0).abs() < 1e-9);
        assert!((assets.changes[1].pct_change - 20.0).abs() < 1e-9);

        let ratio = analysis.ratio("assets_to_liabilities").unwrap();
        assert_eq!(ratio.ratio.values, vec![Some(2.5), Some(2.4), Some(2.0)]);
        assert_eq!(ratio.changes.len(), 2);
        assert!(analysis.metric("missing").is_none());
    }
}
