//! Classification rules and the scoring engine.

use regex::Regex;
use uuid::Uuid;

use super::ClassificationResult;
use crate::config::{ConfigError, PipelineConfig};
use crate::models::DocumentType;

/// One scoring rule for a candidate type.
///
/// Keyword score is the fraction of the rule's keywords present in the
/// lowercased text, scaled by the rule weight. A matching pattern adds its
/// own weight on top.
pub struct ClassificationRule {
    pub keywords: Vec<String>,
    pub weight: f32,
    pub pattern: Option<Regex>,
    pub pattern_weight: f32,
}

impl ClassificationRule {
    pub fn keywords(keywords: &[&str], weight: f32) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            weight,
            pattern: None,
            pattern_weight: 0.0,
        }
    }

    pub fn with_pattern(mut self, pattern: &str, weight: f32) -> Result<Self, ConfigError> {
        let compiled = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.pattern = Some(compiled);
        self.pattern_weight = weight;
        Ok(self)
    }

    fn score(&self, text: &str) -> f32 {
        let mut score = 0.0;
        if !self.keywords.is_empty() {
            let matched = self.keywords.iter().filter(|k| text.contains(k.as_str())).count();
            score += (matched as f32 / self.keywords.len() as f32) * self.weight;
        }
        if let Some(pattern) = &self.pattern {
            if pattern.is_match(text) {
                score += self.pattern_weight;
            }
        }
        score
    }
}

/// Built-in rule set for the supported document types. `Other` carries no
/// rules; it is the sentinel for "nothing matched".
pub fn default_rules() -> Result<Vec<(DocumentType, Vec<ClassificationRule>)>, ConfigError> {
    Ok(vec![
        (
            DocumentType::TaxReturn,
            vec![ClassificationRule::keywords(
                &[
                    "form 1040",
                    "u.s. individual income tax return",
                    "adjusted gross income",
                    "taxable income",
                    "filing status",
                ],
                0.8,
            )
            .with_pattern(r"\b1040\b", 0.2)?],
        ),
        (
            DocumentType::W2Form,
            vec![ClassificationRule::keywords(
                &[
                    "form w-2",
                    "wage and tax statement",
                    "wages, tips",
                    "federal income tax withheld",
                    "employer identification number",
                ],
                0.8,
            )
            .with_pattern(r"\bw-?2\b", 0.2)?],
        ),
        (
            DocumentType::BankStatement,
            vec![ClassificationRule::keywords(
                &[
                    "beginning balance",
                    "ending balance",
                    "statement period",
                    "account number",
                    "deposits and credits",
                ],
                0.8,
            )
            .with_pattern(r"\$\d{1,3}(,\d{3})*\.\d{2}", 0.15)?],
        ),
        (
            DocumentType::Identification,
            vec![ClassificationRule::keywords(
                &[
                    "passport",
                    "driver license",
                    "driver's license",
                    "identification card",
                    "date of birth",
                ],
                0.8,
            )
            .with_pattern(r"\bdob\b", 0.1)?],
        ),
        (
            DocumentType::Transcript,
            vec![ClassificationRule::keywords(
                &[
                    "official transcript",
                    "cumulative gpa",
                    "credit hours",
                    "semester",
                    "academic record",
                ],
                0.8,
            )
            .with_pattern(r"\bgpa\b", 0.15)?],
        ),
    ])
}

/// File-name keywords worth a small confidence boost per type.
fn filename_keywords(doc_type: DocumentType) -> &'static [&'static str] {
    match doc_type {
        DocumentType::TaxReturn => &["1040", "tax_return", "tax-return", "taxreturn"],
        DocumentType::W2Form => &["w2", "w-2"],
        DocumentType::BankStatement => &["bank", "statement"],
        DocumentType::Identification => &["passport", "license", "state_id"],
        DocumentType::Transcript => &["transcript"],
        DocumentType::Other => &[],
    }
}

pub struct DocumentClassifier {
    rules: Vec<(DocumentType, Vec<ClassificationRule>)>,
    filename_boost: f32,
}

impl DocumentClassifier {
    pub fn new(
        rules: Vec<(DocumentType, Vec<ClassificationRule>)>,
        config: &PipelineConfig,
    ) -> Result<Self, ConfigError> {
        if rules.iter().all(|(_, r)| r.is_empty()) {
            return Err(ConfigError::EmptyRuleSet);
        }
        Ok(Self {
            rules,
            filename_boost: config.filename_boost,
        })
    }

    pub fn with_default_rules(config: &PipelineConfig) -> Result<Self, ConfigError> {
        Self::new(default_rules()?, config)
    }

    /// Score every candidate type. Per-type totals are clamped to [0, 1]
    /// after the file-name boost; order follows the fixed type order so
    /// repeated runs over the same input produce identical maps.
    fn score_map(&self, text_lower: &str, file_lower: &str) -> Vec<(DocumentType, f32)> {
        DocumentType::all()
            .iter()
            .map(|&doc_type| {
                let mut score: f32 = self
                    .rules
                    .iter()
                    .filter(|(t, _)| *t == doc_type)
                    .flat_map(|(_, rules)| rules.iter())
                    .map(|rule| rule.score(text_lower))
                    .sum();
                score = score.min(1.0);
                if score > 0.0
                    && filename_keywords(doc_type).iter().any(|k| file_lower.contains(k))
                {
                    score = (score + self.filename_boost).min(1.0);
                }
                (doc_type, score.max(0.0))
            })
            .collect()
    }

    /// Classify one document from its extracted text and declared file name.
    /// Pure and deterministic; never fails.
    pub fn classify(&self, document_id: Uuid, text: &str, file_name: &str) -> ClassificationResult {
        let text_lower = text.to_lowercase();
        let file_lower = file_name.to_lowercase();
        let scores = self.score_map(&text_lower, &file_lower);

        let mut best = (DocumentType::Other, 0.0f32);
        for &(doc_type, score) in &scores {
            if score > best.1 {
                best = (doc_type, score);
            }
        }

        tracing::debug!(
            document_id = %document_id,
            document_type = %best.0,
            confidence = best.1,
            "Classified document"
        );

        ClassificationResult {
            document_id,
            document_type: best.0,
            confidence: best.1,
            scores,
            classified_at: chrono::Utc::now(),
            error: None,
        }
    }

    /// Top-N candidate types by score, for disambiguation prompts. Zero
    /// scores are omitted.
    pub fn suggested_types(
        &self,
        text: &str,
        file_name: &str,
        max_suggestions: usize,
    ) -> Vec<(DocumentType, f32)> {
        let text_lower = text.to_lowercase();
        let file_lower = file_name.to_lowercase();

        let mut scored: Vec<(DocumentType, f32)> = self
            .score_map(&text_lower, &file_lower)
            .into_iter()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(max_suggestions);
        scored
    }
}
