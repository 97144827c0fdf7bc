use crate::schema::{DocumentLine, PeriodHeader};
use crate::utils::{collapse_whitespace, last_day_of_month, month_from_name};
use chrono::NaiveDate;
use log::{debug, warn};
use regex::Regex;

const DATE_PATTERN: &str = r"(?i)(?:\b(?:as\s+(?:at|of|on)|(?:year|period|quarter|half[\s-]year|months?)\s+ended)\s+)?\b(?P<date>(?:\d{1,2}(?:st|nd|rd|th)?\s+)?(?:january|february|march|april|may|june|july|august|september|october|november|december|jan|feb|mar|apr|jun|jul|aug|sept|sep|oct|nov|dec)\b\.?,?\s+(?:\d{1,2}(?:st|nd|rd|th)?,?\s+)?\d{4})\b";

/// Reads reporting-period labels ("31 March 2024") from the lines just
/// below a statement's start.
pub struct PeriodHeaderExtractor {
    date: Regex,
    lookahead: usize,
}

impl PeriodHeaderExtractor {
    pub fn new(lookahead: usize) -> Self {
        Self {
            date: Regex::new(DATE_PATTERN).expect("period date pattern is valid"),
            lookahead,
        }
    }

    /// Every date in `line`, left to right, without its "as at" prefix.
    pub fn period_labels(&self, line: &str) -> Vec<String> {
        self.date
            .captures_iter(line)
            .filter_map(|caps| caps.name("date"))
            .map(|m| collapse_whitespace(m.as_str()))
            .collect()
    }

    /// Builds the header from the lookahead window starting at `start`.
    ///
    /// The window line with the most dates wins, earliest on ties. Without
    /// any dated line the header holds only the row-label column.
    pub fn extract(
        &self,
        lines: &[DocumentLine<'_>],
        start: usize,
        row_label: &str,
    ) -> PeriodHeader {
        let end = start.saturating_add(self.lookahead).min(lines.len());
        let window = lines.get(start..end).unwrap_or(&[]);

        let mut best: Option<(&DocumentLine<'_>, Vec<String>)> = None;
        for line in window {
            let labels = self.period_labels(line.text);
            let better = match &best {
                Some((_, current)) => labels.len() > current.len(),
                None => !labels.is_empty(),
            };
            if better {
                best = Some((line, labels));
            }
        }

        let Some((line, labels)) = best else {
            debug!(
                "No period header within {} lines of line {}",
                self.lookahead, start
            );
            return PeriodHeader::row_label_only(row_label);
        };

        debug!("Period header at {}: {:?}", line.position, labels);

        let mut column_labels = Vec::with_capacity(labels.len() + 1);
        column_labels.push(row_label.to_string());
        column_labels.extend(labels);

        let header = PeriodHeader {
            column_labels,
            detected_at: Some(line.position),
        };

        if is_most_recent_first(&header) == Some(false) {
            warn!(
                "Period columns at {} are not most-recent-first: {:?}",
                line.position,
                header.periods()
            );
        }

        header
    }
}

/// Parses a period label such as "31 March 2024", "March 31, 2024" or
/// "Mar 2024". Month-only labels resolve to the last day of the month.
pub fn parse_period_date(label: &str) -> Option<NaiveDate> {
    let mut day = None;
    let mut month = None;
    let mut year = None;

    for token in label
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
    {
        let digits: String = token.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            month = month.or_else(|| month_from_name(token));
        } else if digits.len() == 4 {
            year = digits.parse::<i32>().ok();
        } else if digits.len() <= 2 {
            day = digits.parse::<u32>().ok();
        }
    }

    let (year, month) = (year?, month?);
    match day {
        Some(day) => NaiveDate::from_ymd_opt(year, month, day),
        None => last_day_of_month(year, month),
    }
}

/// Whether the header's dated columns run from latest to earliest.
///
/// `None` when fewer than two periods or any label fails to parse.
pub fn is_most_recent_first(header: &PeriodHeader) -> Option<bool> {
    let dates: Option<Vec<NaiveDate>> = header
        .periods()
        .iter()
        .map(|label| parse_period_date(label))
        .collect();
    let dates = dates?;

    if dates.len() < 2 {
        return None;
    }
    Some(dates.windows(2).all(|pair| pair[0] >= pair[1]))
}
