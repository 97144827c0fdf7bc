use crate::config::{StatementTemplate, TerminationRule, ZeroDivisionSentinel};
use crate::metrics::ratio_values;
use crate::schema::{DataQualityNote, DocumentLine, ExtractedRow, PeriodHeader, RowOrigin};
use crate::taxonomy::Taxonomy;
use crate::tokenizer::{NumericToken, NumericTokenizer};
use crate::utils::normalize_line;
use log::{debug, warn};

/// Progress of one extraction pass over one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    SearchingSection,
    ReadingHeader,
    ReadingRows,
    Done,
}

pub struct AssembledTable {
    pub header: PeriodHeader,
    pub rows: Vec<ExtractedRow>,
    pub notes: Vec<DataQualityNote>,
}

/// Turns matched lines into canonical rows for one statement template.
///
/// Rows keep first-seen order and each canonical label appears once. The
/// caller moves the pass through `SearchingSection` and `ReadingHeader`;
/// while `ReadingRows`, [`RowAssembler::feed`] consumes lines until the
/// template's termination rule moves it to `Done`.
pub struct RowAssembler<'a> {
    template: &'a StatementTemplate,
    taxonomy: &'a Taxonomy,
    tokenizer: &'a NumericTokenizer,
    zero_division: ZeroDivisionSentinel,
    state: AssemblyState,
    rows: Vec<ExtractedRow>,
    notes: Vec<DataQualityNote>,
    first_row_page: Option<usize>,
}

impl<'a> RowAssembler<'a> {
    pub fn new(
        template: &'a StatementTemplate,
        taxonomy: &'a Taxonomy,
        tokenizer: &'a NumericTokenizer,
        zero_division: ZeroDivisionSentinel,
    ) -> Self {
        Self {
            template,
            taxonomy,
            tokenizer,
            zero_division,
            state: AssemblyState::SearchingSection,
            rows: Vec::new(),
            notes: Vec::new(),
            first_row_page: None,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    pub fn rows(&self) -> &[ExtractedRow] {
        &self.rows
    }

    pub fn transition(&mut self, next: AssemblyState) {
        if self.state != next {
            debug!(
                "Template '{}': {:?} -> {:?}",
                self.template.name, self.state, next
            );
            self.state = next;
        }
    }

    /// Consumes one line while reading rows and returns the resulting state.
    pub fn feed(&mut self, line: &DocumentLine<'_>) -> AssemblyState {
        if self.state != AssemblyState::ReadingRows {
            return self.state;
        }

        if self.template.termination == TerminationRule::PageEnd
            && self
                .first_row_page
                .is_some_and(|page| line.position.page > page)
        {
            self.transition(AssemblyState::Done);
            return self.state;
        }

        let normalized = normalize_line(line.text);
        let Some(found) = self
            .taxonomy
            .match_line(self.template.statement_type, &normalized)
        else {
            return self.state;
        };
        let item = found.item;

        if self
            .rows
            .iter()
            .any(|r| r.canonical_label == item.canonical_label)
        {
            debug!(
                "Dropping duplicate '{}' at {}",
                item.canonical_label, line.position
            );
            self.notes.push(DataQualityNote::DuplicateRow {
                canonical_label: item.canonical_label.clone(),
                position: line.position,
            });
            return self.state;
        }

        // Only text after the phrase is read, so note numbers and section
        // numbers in front of the label never become values.
        let mut values = Vec::new();
        for token in self.tokenizer.scan(&normalized[found.end..]) {
            match token {
                NumericToken::Value(value) => values.push(Some(value)),
                NumericToken::Nil(marker) => {
                    debug!("Nil marker '{}' at {}", marker, line.position);
                    values.push(None);
                }
                NumericToken::Malformed(raw) => {
                    debug!("Malformed number '{}' at {}", raw, line.position);
                    self.notes.push(DataQualityNote::MalformedNumber {
                        position: line.position,
                        token: raw.to_string(),
                    });
                }
            }
        }

        if values.is_empty() {
            debug!(
                "'{}' at {} carries no values",
                item.canonical_label, line.position
            );
            self.notes.push(DataQualityNote::RowWithoutValues {
                canonical_label: item.canonical_label.clone(),
                position: line.position,
            });
            return self.state;
        }

        debug!(
            "Matched '{}' via '{}' at {}: {:?}",
            item.canonical_label, found.phrase, line.position, values
        );

        self.rows.push(ExtractedRow {
            canonical_label: item.canonical_label.clone(),
            display_name: item.display_name.clone(),
            values,
            origin: RowOrigin::Extracted {
                position: line.position,
                matched_phrase: found.phrase.to_string(),
                source_text: line.text.trim().to_string(),
            },
        });
        self.first_row_page.get_or_insert(line.position.page);

        if let TerminationRule::RequiredLabels { labels } = &self.template.termination {
            let complete = labels
                .iter()
                .all(|label| self.rows.iter().any(|r| &r.canonical_label == label));
            if complete {
                self.transition(AssemblyState::Done);
            }
        }

        self.state
    }

    /// Aligns every row to the header and appends the template's ratio rows.
    pub fn finish(mut self, mut header: PeriodHeader) -> AssembledTable {
        let widest = self.rows.iter().map(|r| r.values.len()).max().unwrap_or(0);
        let declared = header.period_count();

        if !header.is_detected() {
            self.notes.insert(0, DataQualityNote::HeaderNotFound);
        }

        if widest > declared {
            if header.is_detected() {
                warn!(
                    "Template '{}': rows carry {} values but the header has {} periods; widening header",
                    self.template.name, widest, declared
                );
                self.notes.push(DataQualityNote::HeaderWidened {
                    from_periods: declared,
                    to_periods: widest,
                });
            }
            header.widen_to(widest);
        }

        let width = header.period_count();
        for row in &mut self.rows {
            row.pad_to(width);
        }

        let mut derived = Vec::new();
        for ratio in &self.template.ratios {
            let numerator = self.rows.iter().find(|r| r.canonical_label == ratio.numerator);
            let denominator = self
                .rows
                .iter()
                .find(|r| r.canonical_label == ratio.denominator);

            let (Some(numerator), Some(denominator)) = (numerator, denominator) else {
                debug!(
                    "Skipping ratio '{}': operands not both extracted",
                    ratio.canonical_label
                );
                continue;
            };

            let guarded = ratio_values(&numerator.values, &denominator.values, self.zero_division);
            for &column in &guarded.zero_denominators {
                warn!(
                    "Ratio '{}' has a zero denominator in column {}",
                    ratio.canonical_label, column
                );
                self.notes.push(DataQualityNote::DivisionByZero {
                    canonical_label: ratio.canonical_label.clone(),
                    column,
                });
            }

            let mut row = ExtractedRow {
                canonical_label: ratio.canonical_label.clone(),
                display_name: ratio.display_name.clone(),
                values: guarded.values,
                origin: RowOrigin::DerivedRatio {
                    numerator: ratio.numerator.clone(),
                    denominator: ratio.denominator.clone(),
                },
            };
            row.pad_to(width);
            derived.push(row);
        }

        self.rows.extend(derived);
        self.transition(AssemblyState::Done);

        AssembledTable {
            header,
            rows: self.rows,
            notes: self.notes,
        }
    }
}
