use log::debug;
use regex::{Match, Matches, Regex};

/// One numeric-looking fragment of a line: a parsed amount, a nil marker
/// holding a column, or a fragment rejected by the grammar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumericToken<'t> {
    Value(f64),
    /// A standalone `-`, `–` or `—` printed in place of a zero or nil amount.
    Nil(&'t str),
    Malformed(&'t str),
}

/// Extracts monetary amounts from statement text.
///
/// A token is an optional sign, then either western grouping (`1,234,567.89`)
/// or Indian lakh grouping (`12,34,567.89`), with an optional two-digit
/// fraction. `(1,234.56)` reads as `-1234.56`. A dash standing alone between
/// spaces is a nil marker. Anything else that looks numeric (years, note
/// references like `4.1`, percentages) is reported as malformed. Both nil
/// markers and malformed fragments are skipped by [`NumericTokenizer::tokens`].
pub struct NumericTokenizer {
    candidate: Regex,
    western: Regex,
    indian: Regex,
}

impl NumericTokenizer {
    pub fn new() -> Self {
        Self {
            candidate: Regex::new(r"\(?-?\b\d[\d,]*(?:\.\d+)?\b\)?|[-–—]+")
                .expect("numeric candidate pattern is valid"),
            western: Regex::new(r"^\d{1,3}(?:,\d{3})*(?:\.\d{2})?$")
                .expect("western grouping pattern is valid"),
            indian: Regex::new(r"^\d{1,2}(?:,\d{2})*,\d{3}(?:\.\d{2})?$")
                .expect("lakh grouping pattern is valid"),
        }
    }

    /// Lazily yields the well-formed values in `text`, left to right.
    pub fn tokens<'r, 't>(&'r self, text: &'t str) -> NumericValues<'r, 't> {
        NumericValues {
            scan: self.scan(text),
        }
    }

    /// Lazily yields every numeric-looking fragment, including rejected ones.
    pub fn scan<'r, 't>(&'r self, text: &'t str) -> NumericScan<'r, 't> {
        NumericScan {
            tokenizer: self,
            text,
            matches: self.candidate.find_iter(text),
        }
    }

    /// Parses a single standalone token such as `"(1,234.56)"`.
    pub fn parse(&self, token: &str) -> Option<f64> {
        let token = token.trim();
        let m = self.candidate.find(token)?;
        if m.start() != 0 || m.end() != token.len() {
            return None;
        }
        match self.classify(token, m)? {
            NumericToken::Value(value) => Some(value),
            NumericToken::Nil(_) | NumericToken::Malformed(_) => None,
        }
    }

    // None for dashes inside words ("non-current"), which are not tokens at all.
    fn classify<'t>(&self, text: &'t str, m: Match<'t>) -> Option<NumericToken<'t>> {
        let raw = m.as_str();
        if raw.chars().all(|c| matches!(c, '-' | '–' | '—')) {
            let spaced_before = text[..m.start()]
                .chars()
                .next_back()
                .map_or(true, char::is_whitespace);
            let spaced_after = text[m.end()..].chars().next().map_or(true, char::is_whitespace);
            return (spaced_before && spaced_after).then_some(NumericToken::Nil(raw));
        }

        let parenthesized = raw.starts_with('(') && raw.ends_with(')');
        let mut body = raw.trim_start_matches('(').trim_end_matches(')');

        let mut negative = parenthesized;
        if let Some(rest) = body.strip_prefix('-') {
            // "2023-24" is a range, not a negative 24
            let glued = !raw.starts_with('(')
                && text[..m.start()]
                    .chars()
                    .next_back()
                    .is_some_and(|c| c.is_ascii_alphanumeric());
            if glued {
                return Some(NumericToken::Malformed(raw));
            }
            negative = true;
            body = rest;
        }

        if !(self.western.is_match(body) || self.indian.is_match(body)) {
            return Some(NumericToken::Malformed(raw));
        }

        Some(match body.replace(',', "").parse::<f64>() {
            Ok(value) if negative => NumericToken::Value(-value),
            Ok(value) => NumericToken::Value(value),
            Err(_) => NumericToken::Malformed(raw),
        })
    }
}

impl Default for NumericTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

pub struct NumericScan<'r, 't> {
    tokenizer: &'r NumericTokenizer,
    text: &'t str,
    matches: Matches<'r, 't>,
}

impl<'r, 't> Iterator for NumericScan<'r, 't> {
    type Item = NumericToken<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let m = self.matches.next()?;
            if let Some(token) = self.tokenizer.classify(self.text, m) {
                return Some(token);
            }
        }
    }
}

pub struct NumericValues<'r, 't> {
    scan: NumericScan<'r, 't>,
}

impl<'r, 't> Iterator for NumericValues<'r, 't> {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        loop {
            match self.scan.next()? {
                NumericToken::Value(value) => return Some(value),
                NumericToken::Nil(_) => {}
                NumericToken::Malformed(token) => {
                    debug!("Skipping malformed numeric token '{}'", token);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(text: &str) -> Vec<f64> {
        NumericTokenizer::new().tokens(text).collect()
    }

    #[test]
    fn test_parenthesized_negatives() {
        assert_eq!(values("1,234.56 and (789.00)"), vec![1234.56, -789.00]);
        assert_eq!(values("Loss per share (0.45) (1.20)"), vec![-0.45, -1.20]);
    }

    #[test]
    fn test_grouping_styles() {
        assert_eq!(values("1,50,000.00  1,20,000.00"), vec![150_000.0, 120_000.0]);
        assert_eq!(values("12,34,56,789"), vec![123_456_789.0]);
        assert_eq!(values("1,234,567.89"), vec![1_234_567.89]);
        assert_eq!(values("60,000.00 50,000.00"), vec![60_000.0, 50_000.0]);
    }

    #[test]
    fn test_minus_sign() {
        assert_eq!(values("Net change -1,000.00"), vec![-1000.0]);
        assert_eq!(values("FY 2023-24 total 5.00"), vec![5.0]);
    }

    #[test]
    fn test_malformed_tokens_are_skipped() {
        // years, three-decimal amounts and ungrouped long runs all fail the grammar
        assert_eq!(values("As at 31 March 2024"), vec![31.0]);
        assert_eq!(values("1,234.567 150000 12.5% 7.00"), vec![7.0]);
        assert_eq!(values("Particulars"), Vec::<f64>::new());
    }

    #[test]
    fn test_trailing_punctuation() {
        assert_eq!(values("Note 3, amount 1,000."), vec![3.0, 1000.0]);
    }

    #[test]
    fn test_scan_reports_malformed() {
        let tokenizer = NumericTokenizer::new();
        let scanned: Vec<NumericToken> = tokenizer.scan("2024 1,000.00").collect();
        assert_eq!(
            scanned,
            vec![NumericToken::Malformed("2024"), NumericToken::Value(1000.0)]
        );
    }

    #[test]
    fn test_standalone_dash_is_nil() {
        let tokenizer = NumericTokenizer::new();
        let scanned: Vec<NumericToken> = tokenizer.scan("- 1,000.00 – (5.00) —").collect();
        assert_eq!(
            scanned,
            vec![
                NumericToken::Nil("-"),
                NumericToken::Value(1000.0),
                NumericToken::Nil("–"),
                NumericToken::Value(-5.0),
                NumericToken::Nil("—"),
            ]
        );
        assert_eq!(values("- 1,000.00"), vec![1000.0]);
        assert_eq!(tokenizer.parse("-"), None);
    }

    #[test]
    fn test_hyphenated_words_are_not_tokens() {
        let tokenizer = NumericTokenizer::new();
        let scanned: Vec<NumericToken> = tokenizer.scan("non-current 7.00 -x").collect();
        assert_eq!(scanned, vec![NumericToken::Value(7.0)]);
    }

    #[test]
    fn test_tokens_are_lazy_and_ordered() {
        let tokenizer = NumericTokenizer::new();
        let first = tokenizer.tokens("3.00 1.00 2.00").next();
        assert_eq!(first, Some(3.0));
    }

    #[test]
    fn test_parse_single_token() {
        let tokenizer = NumericTokenizer::new();
        assert_eq!(tokenizer.parse("(1,234.56)"), Some(-1234.56));
        assert_eq!(tokenizer.parse(" 1,50,000.00 "), Some(150_000.0));
        assert_eq!(tokenizer.parse("1,2345"), None);
        assert_eq!(tokenizer.parse("12 34"), None);
    }
}
