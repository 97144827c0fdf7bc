use crate::error::{ExtractionError, Result};
use crate::schema::StatementType;
use crate::taxonomy::{standard_line_items, CanonicalLineItem, Taxonomy};
use log::debug;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_ROW_LABEL: &str = "Particulars";
pub const DEFAULT_HEADER_LOOKAHEAD: usize = 5;

fn default_row_label() -> String {
    DEFAULT_ROW_LABEL.to_string()
}

fn default_header_lookahead() -> usize {
    DEFAULT_HEADER_LOOKAHEAD
}

fn default_require_header() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum TerminationRule {
    #[schemars(description = "Stop reading rows once every listed canonical label has a row")]
    RequiredLabels { labels: Vec<String> },

    #[schemars(description = "Stop at the end of the first page that produced at least one row")]
    PageEnd,

    #[schemars(description = "Read rows until the end of the document")]
    EndOfDocument,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FallbackScope {
    #[default]
    #[schemars(description = "Fallback keywords are searched through the whole document when no identifier occurs")]
    Document,

    #[schemars(
        description = "Fallback keywords only count after an identifier line; without an identifier there is no section"
    )]
    AfterIdentifier,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ZeroDivisionSentinel {
    #[default]
    #[schemars(description = "A zero denominator yields 0")]
    Zero,

    #[schemars(description = "A zero denominator yields an absent value")]
    Absent,
}

impl ZeroDivisionSentinel {
    pub fn value(&self) -> Option<f64> {
        match self {
            ZeroDivisionSentinel::Zero => Some(0.0),
            ZeroDivisionSentinel::Absent => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RatioDefinition {
    #[schemars(description = "Label of the derived row, e.g. 'debt_to_equity'")]
    pub canonical_label: String,
    pub display_name: String,
    #[schemars(description = "Canonical label of the numerator row")]
    pub numerator: String,
    #[schemars(description = "Canonical label of the denominator row")]
    pub denominator: String,
}

impl RatioDefinition {
    pub fn new(canonical_label: &str, display_name: &str, numerator: &str, denominator: &str) -> Self {
        Self {
            canonical_label: canonical_label.to_string(),
            display_name: display_name.to_string(),
            numerator: numerator.to_string(),
            denominator: denominator.to_string(),
        }
    }
}

/// How one statement is found and read in one family of documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct StatementTemplate {
    pub name: String,
    pub statement_type: StatementType,

    #[schemars(
        description = "Statement titles searched first, case-insensitively (e.g. 'Statement of Assets and Liabilities')"
    )]
    #[serde(default)]
    pub identifiers: Vec<String>,

    #[schemars(
        description = "Generic keywords used when no identifier is found; the first line containing one starts the table"
    )]
    #[serde(default)]
    pub fallback_keywords: Vec<String>,

    #[serde(default)]
    pub fallback_scope: FallbackScope,

    #[schemars(description = "Label of column 0 in the period header")]
    #[serde(default = "default_row_label")]
    pub row_label: String,

    #[schemars(
        description = "When false, a section without a dated header line is still read and its columns are labelled 'Value 1', 'Value 2', ..."
    )]
    #[serde(default = "default_require_header")]
    pub require_header: bool,

    pub termination: TerminationRule,

    #[schemars(description = "Ratio rows appended when both operand rows were extracted")]
    #[serde(default)]
    pub ratios: Vec<RatioDefinition>,
}

impl StatementTemplate {
    pub fn standard_balance_sheet() -> Self {
        Self {
            name: "standard_balance_sheet".to_string(),
            statement_type: StatementType::BalanceSheet,
            identifiers: vec![
                "statement of assets and liabilities".to_string(),
                "balance sheet".to_string(),
            ],
            fallback_keywords: vec![
                "as at".to_string(),
                "particulars".to_string(),
                "assets".to_string(),
            ],
            fallback_scope: FallbackScope::Document,
            row_label: default_row_label(),
            require_header: true,
            termination: TerminationRule::RequiredLabels {
                labels: vec![
                    "total_assets".to_string(),
                    "total_liabilities".to_string(),
                    "total_equity".to_string(),
                ],
            },
            ratios: vec![
                RatioDefinition::new(
                    "debt_to_equity",
                    "DOE (Debt/Equity Ratio)",
                    "total_liabilities",
                    "total_equity",
                ),
                RatioDefinition::new(
                    "assets_to_liabilities",
                    "Assets/Liabilities",
                    "total_assets",
                    "total_liabilities",
                ),
            ],
        }
    }

    pub fn standard_income_statement() -> Self {
        Self {
            name: "standard_income_statement".to_string(),
            statement_type: StatementType::IncomeStatement,
            identifiers: vec![
                "statement of profit and loss".to_string(),
                "profit and loss statement".to_string(),
                "statement of comprehensive income".to_string(),
            ],
            fallback_keywords: vec![
                "particulars".to_string(),
                "income".to_string(),
                "expenses".to_string(),
                "ended".to_string(),
            ],
            fallback_scope: FallbackScope::AfterIdentifier,
            row_label: default_row_label(),
            require_header: true,
            termination: TerminationRule::PageEnd,
            ratios: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ExtractorConfig {
    #[schemars(description = "Canonical line-items in matching priority order")]
    pub line_items: Vec<CanonicalLineItem>,

    #[schemars(description = "Statement templates; for each statement type they are tried in order")]
    pub templates: Vec<StatementTemplate>,

    #[schemars(description = "Number of lines from the section start searched for the period header")]
    #[serde(default = "default_header_lookahead")]
    pub header_lookahead: usize,

    #[serde(default)]
    pub zero_division: ZeroDivisionSentinel,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtractorConfig {
    pub fn standard() -> Self {
        Self {
            line_items: standard_line_items(),
            templates: vec![
                StatementTemplate::standard_balance_sheet(),
                StatementTemplate::standard_income_statement(),
            ],
            header_lookahead: DEFAULT_HEADER_LOOKAHEAD,
            zero_division: ZeroDivisionSentinel::default(),
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading extractor configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn templates_for(
        &self,
        statement_type: StatementType,
    ) -> impl Iterator<Item = &StatementTemplate> {
        self.templates
            .iter()
            .filter(move |t| t.statement_type == statement_type)
    }

    pub fn template(&self, name: &str) -> Option<&StatementTemplate> {
        self.templates.iter().find(|t| t.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.header_lookahead == 0 {
            return Err(ExtractionError::InvalidConfig(
                "header_lookahead must be at least 1".to_string(),
            ));
        }

        let taxonomy = Taxonomy::new(self.line_items.clone())?;

        let mut names = HashSet::new();
        for template in &self.templates {
            let invalid = |details: String| ExtractionError::InvalidTemplate {
                template: template.name.clone(),
                details,
            };

            if !names.insert(template.name.as_str()) {
                return Err(invalid("template name is used more than once".to_string()));
            }

            if template.identifiers.is_empty() && template.fallback_keywords.is_empty() {
                return Err(invalid(
                    "at least one identifier or fallback keyword is required".to_string(),
                ));
            }

            if template.fallback_scope == FallbackScope::AfterIdentifier
                && template.identifiers.is_empty()
            {
                return Err(invalid(
                    "fallback keywords scoped after an identifier need at least one identifier"
                        .to_string(),
                ));
            }

            let known = |label: &str| {
                taxonomy
                    .get(label)
                    .is_some_and(|item| item.statement_type == template.statement_type)
            };

            if let TerminationRule::RequiredLabels { labels } = &template.termination {
                if labels.is_empty() {
                    return Err(invalid("required label list is empty".to_string()));
                }
                if let Some(unknown) = labels.iter().find(|l| !known(l)) {
                    return Err(invalid(format!(
                        "required label '{}' is not a {} line-item",
                        unknown, template.statement_type
                    )));
                }
            }

            for ratio in &template.ratios {
                for operand in [&ratio.numerator, &ratio.denominator] {
                    if !known(operand) {
                        return Err(invalid(format!(
                            "ratio '{}' refers to unknown {} line-item '{}'",
                            ratio.canonical_label, template.statement_type, operand
                        )));
                    }
                }
                if taxonomy.get(&ratio.canonical_label).is_some() {
                    return Err(invalid(format!(
                        "ratio label '{}' collides with a line-item",
                        ratio.canonical_label
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ExtractorConfig)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::generate_json_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_standard_config_is_valid() {
        let config = ExtractorConfig::standard();
        assert!(config.validate().is_ok());
        assert_eq!(config.templates_for(StatementType::BalanceSheet).count(), 1);
        assert_eq!(config.header_lookahead, 5);
        assert_eq!(config.zero_division, ZeroDivisionSentinel::Zero);
    }

    #[test]
    fn test_json_round_trip_with_defaults() {
        let json = ExtractorConfig::standard().to_json().unwrap();
        assert!(json.contains("\"rule\": \"required_labels\""));

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value.as_object_mut().unwrap().remove("header_lookahead");
        value.as_object_mut().unwrap().remove("zero_division");

        let config = ExtractorConfig::from_json_str(&value.to_string()).unwrap();
        assert_eq!(config.header_lookahead, DEFAULT_HEADER_LOOKAHEAD);
        assert_eq!(config, ExtractorConfig::standard());
    }

    #[test]
    fn test_unknown_ratio_operand_is_rejected() {
        let mut config = ExtractorConfig::standard();
        config.templates[0]
            .ratios
            .push(RatioDefinition::new("quick_ratio", "Quick Ratio", "total_quick_assets", "total_current_liabilities"));

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("total_quick_assets"));
    }

    #[test]
    fn test_cross_statement_required_label_is_rejected() {
        let mut config = ExtractorConfig::standard();
        config.templates[1].termination = TerminationRule::RequiredLabels {
            labels: vec!["total_assets".to_string()],
        };
        assert!(matches!(
            config.validate(),
            Err(ExtractionError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_scoped_fallback_needs_identifiers() {
        let mut config = ExtractorConfig::standard();
        config.templates[1].identifiers.clear();
        assert!(matches!(
            config.validate(),
            Err(ExtractionError::InvalidTemplate { .. })
        ));
    }

    #[test]
    fn test_zero_lookahead_is_rejected() {
        let mut config = ExtractorConfig::standard();
        config.header_lookahead = 0;
        assert!(matches!(
            config.validate(),
            Err(ExtractionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ExtractorConfig::standard().to_json().unwrap().as_bytes())
            .unwrap();

        let config = ExtractorConfig::from_path(file.path()).unwrap();
        assert!(config.template("standard_income_statement").is_some());
        assert!(ExtractorConfig::from_path("/definitely/not/here.json").is_err());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = ExtractorConfig::schema_as_json().unwrap();
        assert!(schema_json.contains("line_items"));
        assert!(schema_json.contains("header_lookahead"));
    }
}
