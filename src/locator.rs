use crate::config::{FallbackScope, StatementTemplate};
use crate::schema::{DocumentLine, LocatorStrategy, SectionMatch};
use crate::utils::normalize_line;
use log::{debug, info};

/// Finds the first line where a statement's table begins.
///
/// Configured identifiers are searched through the whole stream first; the
/// fallback keywords are only consulted when no identifier occurs anywhere.
/// With [`FallbackScope::AfterIdentifier`] the keywords instead mark the
/// table start below the identifier line, and never stand in for a missing
/// identifier.
pub struct SectionLocator<'a> {
    template: &'a StatementTemplate,
    identifiers: Vec<String>,
    fallback_keywords: Vec<String>,
}

impl<'a> SectionLocator<'a> {
    pub fn new(template: &'a StatementTemplate) -> Self {
        Self {
            template,
            identifiers: normalized(&template.identifiers),
            fallback_keywords: normalized(&template.fallback_keywords),
        }
    }

    pub fn locate(&self, lines: &[DocumentLine<'_>]) -> Option<SectionMatch> {
        let found = match self.template.fallback_scope {
            FallbackScope::Document => self
                .scan(lines, &self.identifiers, LocatorStrategy::Identifier)
                .or_else(|| {
                    debug!(
                        "No identifier for template '{}' found; trying fallback keywords",
                        self.template.name
                    );
                    self.scan(lines, &self.fallback_keywords, LocatorStrategy::FallbackKeyword)
                }),
            FallbackScope::AfterIdentifier => self
                .scan(lines, &self.identifiers, LocatorStrategy::Identifier)
                .map(|title| self.table_start_after(lines, title)),
        };

        match &found {
            Some(section) => info!(
                "Located {} section at {} via {:?} '{}'",
                self.template.statement_type, section.position, section.strategy, section.phrase
            ),
            None => info!(
                "No {} section found for template '{}'",
                self.template.statement_type, self.template.name
            ),
        }

        found
    }

    // First keyword line below the title, or the title itself when none follows.
    fn table_start_after(&self, lines: &[DocumentLine<'_>], title: SectionMatch) -> SectionMatch {
        let below = lines.get(title.position.index + 1..).unwrap_or_default();
        match self.scan(below, &self.fallback_keywords, LocatorStrategy::FallbackKeyword) {
            Some(start) => {
                debug!(
                    "Table for template '{}' starts at {} below title '{}'",
                    self.template.name, start.position, title.phrase
                );
                start
            }
            None => title,
        }
    }

    fn scan(
        &self,
        lines: &[DocumentLine<'_>],
        phrases: &[String],
        strategy: LocatorStrategy,
    ) -> Option<SectionMatch> {
        if phrases.is_empty() {
            return None;
        }

        lines.iter().find_map(|line| {
            let normalized = normalize_line(line.text);
            phrases
                .iter()
                .find(|phrase| normalized.contains(phrase.as_str()))
                .map(|phrase| SectionMatch {
                    position: line.position,
                    strategy,
                    phrase: phrase.clone(),
                })
        })
    }
}

fn normalized(phrases: &[String]) -> Vec<String> {
    phrases
        .iter()
        .map(|p| normalize_line(p))
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DocumentText;

    #[test]
    fn test_identifier_takes_precedence_over_keywords() {
        let doc = DocumentText::from_page_texts(
            "doc",
            [
                "Particulars of the company\nAssets under management",
                "STATEMENT OF ASSETS AND LIABILITIES\nAs at 31 March 2024",
            ],
        );
        let template = StatementTemplate::standard_balance_sheet();
        let section = SectionLocator::new(&template).locate(&doc.lines()).unwrap();

        assert_eq!(section.strategy, LocatorStrategy::Identifier);
        assert_eq!(section.position.page, 1);
        assert_eq!(section.position.index, 2);
        assert_eq!(section.phrase, "statement of assets and liabilities");
    }

    #[test]
    fn test_fallback_keyword_returns_first_line() {
        let doc = DocumentText::from_page_texts(
            "doc",
            ["Annual report\nFigures as at 31 March 2024\nParticulars"],
        );
        let template = StatementTemplate::standard_balance_sheet();
        let section = SectionLocator::new(&template).locate(&doc.lines()).unwrap();

        assert_eq!(section.strategy, LocatorStrategy::FallbackKeyword);
        assert_eq!(section.position.index, 1);
        assert_eq!(section.phrase, "as at");
    }

    #[test]
    fn test_missing_section() {
        let doc = DocumentText::from_page_texts("doc", ["Directors' report\nNothing to see"]);
        let template = StatementTemplate::standard_balance_sheet();
        assert!(SectionLocator::new(&template).locate(&doc.lines()).is_none());
    }

    #[test]
    fn test_scoped_keywords_need_a_title() {
        let template = StatementTemplate::standard_income_statement();
        let doc = DocumentText::from_page_texts(
            "doc",
            ["Balance Sheet\nParticulars  As at 31 March 2024\nOther income 10.00"],
        );
        assert!(SectionLocator::new(&template).locate(&doc.lines()).is_none());
    }

    #[test]
    fn test_scoped_keywords_mark_start_below_title() {
        let template = StatementTemplate::standard_income_statement();
        let doc = DocumentText::from_page_texts(
            "doc",
            [
                "Particulars of directors\nStatement of Profit and Loss\nRupees in lakh\n\
                 Particulars  Year ended 31 March 2024",
            ],
        );
        let section = SectionLocator::new(&template).locate(&doc.lines()).unwrap();

        assert_eq!(section.strategy, LocatorStrategy::FallbackKeyword);
        assert_eq!(section.position.index, 3);
        assert_eq!(section.phrase, "particulars");
    }

    #[test]
    fn test_template_without_keywords() {
        let mut template = StatementTemplate::standard_income_statement();
        template.fallback_keywords.clear();

        let doc = DocumentText::from_page_texts("doc", ["Total income 1,000.00"]);
        assert!(SectionLocator::new(&template).locate(&doc.lines()).is_none());
    }
}
