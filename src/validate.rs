//! Structural validation of extracted fields.
//!
//! Validation is per field and independent: one malformed value never blocks
//! the rest, and failures produce human-readable messages for a reviewer,
//! not hard errors. Semantic checks (does the SSN belong to this applicant)
//! are out of scope here.

use chrono::NaiveDate;

use crate::extraction::types::{ExtractedField, FieldDataType};

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%m-%d-%Y",
    "%B %d, %Y",
    "%b %d, %Y",
];

/// A failed structural check on one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    pub field_name: String,
    pub message: String,
}

/// Outcome of validating one document's extracted fields.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub field_errors: Vec<FieldError>,
    pub warnings: Vec<String>,
    pub fields_checked: usize,
}

impl ValidationReport {
    /// Fraction of checked fields that passed, in [0, 1]. A document with
    /// no fields validates trivially.
    pub fn pass_fraction(&self) -> f32 {
        if self.fields_checked == 0 {
            return 1.0;
        }
        (self.fields_checked - self.field_errors.len()) as f32 / self.fields_checked as f32
    }
}

pub struct FieldValidator;

impl FieldValidator {
    /// Validate every field against its declared data type, stamping the
    /// error message onto failing fields.
    pub fn validate(fields: &mut [ExtractedField]) -> ValidationReport {
        let mut field_errors = Vec::new();
        let warnings = Vec::new();

        for field in fields.iter_mut() {
            let value = field.value_text();
            if let Err(message) = check_value(field.data_type, &value) {
                field.validation_error = Some(message.clone());
                field_errors.push(FieldError {
                    field_name: field.name.clone(),
                    message,
                });
            } else {
                field.validation_error = None;
            }
        }

        ValidationReport {
            is_valid: field_errors.is_empty(),
            field_errors,
            warnings,
            fields_checked: fields.len(),
        }
    }
}

fn check_value(data_type: FieldDataType, value: &str) -> Result<(), String> {
    match data_type {
        FieldDataType::Currency => check_currency(value),
        FieldDataType::Date => check_date(value),
        FieldDataType::Number => check_number(value),
        FieldDataType::Ssn => check_ssn(value),
        FieldDataType::Email => check_email(value),
        // Text, Boolean, Address, Phone pass structurally.
        _ => Ok(()),
    }
}

fn check_currency(value: &str) -> Result<(), String> {
    let stripped: String = value
        .trim()
        .chars()
        .filter(|c| *c != '$' && *c != ',')
        .collect();
    stripped
        .parse::<f64>()
        .map(|_| ())
        .map_err(|_| format!("'{value}' is not a valid currency amount"))
}

fn check_date(value: &str) -> Result<(), String> {
    let trimmed = value.trim();
    if DATE_FORMATS
        .iter()
        .any(|fmt| NaiveDate::parse_from_str(trimmed, fmt).is_ok())
    {
        Ok(())
    } else {
        Err(format!("'{value}' is not a recognized date"))
    }
}

fn check_number(value: &str) -> Result<(), String> {
    let trimmed = value.trim();
    if trimmed.parse::<i64>().is_ok() || trimmed.parse::<f64>().is_ok() {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid number"))
    }
}

fn check_ssn(value: &str) -> Result<(), String> {
    let digits: String = value
        .chars()
        .filter(|c| *c != '-' && *c != ' ')
        .collect();
    if digits.len() == 9 && digits.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err("SSN must contain exactly nine digits".to_string())
    }
}

fn check_email(value: &str) -> Result<(), String> {
    let trimmed = value.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !trimmed.contains(char::is_whitespace)
                && !domain.contains('@')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(format!("'{value}' is not a valid email address"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn field(name: &str, value: serde_json::Value, data_type: FieldDataType) -> ExtractedField {
        ExtractedField::new(name, value, 0.9, data_type, 0.7)
    }

    #[test]
    fn ssn_accept_and_reject_vectors() {
        assert!(check_ssn("123-45-6789").is_ok());
        assert!(check_ssn("123456789").is_ok());
        assert!(check_ssn("123 45 6789").is_ok());
        assert!(check_ssn("12345678").is_err());
        assert!(check_ssn("12345678A").is_err());
    }

    #[test]
    fn currency_strips_symbols() {
        assert!(check_currency("$52,000.00").is_ok());
        assert!(check_currency("1042.5").is_ok());
        assert!(check_currency("-12.00").is_ok());
        assert!(check_currency("twelve dollars").is_err());
    }

    #[test]
    fn date_accepts_common_formats() {
        assert!(check_date("2024-04-15").is_ok());
        assert!(check_date("04/15/2024").is_ok());
        assert!(check_date("April 15, 2024").is_ok());
        assert!(check_date("Apr 15, 2024").is_ok());
        assert!(check_date("15th of April").is_err());
    }

    #[test]
    fn number_accepts_int_and_float() {
        assert!(check_number("42").is_ok());
        assert!(check_number("-3.14").is_ok());
        assert!(check_number("4e2").is_ok());
        assert!(check_number("forty-two").is_err());
    }

    #[test]
    fn email_syntax_check() {
        assert!(check_email("student@university.edu").is_ok());
        assert!(check_email("no-at-sign.example.com").is_err());
        assert!(check_email("two@at@signs.com").is_err());
        assert!(check_email("name@nodot").is_err());
    }

    #[test]
    fn text_and_address_pass_unconditionally() {
        assert!(check_value(FieldDataType::Text, "anything at all").is_ok());
        assert!(check_value(FieldDataType::Address, "1 Main St ???").is_ok());
        assert!(check_value(FieldDataType::Phone, "not-a-phone").is_ok());
        assert!(check_value(FieldDataType::Boolean, "maybe").is_ok());
    }

    #[test]
    fn one_bad_field_never_blocks_the_rest() {
        let mut fields = vec![
            field("ssn", json!("12345678A"), FieldDataType::Ssn),
            field("wages", json!("$52,000.00"), FieldDataType::Currency),
            field("tax_year_end", json!("2024-12-31"), FieldDataType::Date),
        ];
        let report = FieldValidator::validate(&mut fields);

        assert!(!report.is_valid);
        assert_eq!(report.field_errors.len(), 1);
        assert_eq!(report.field_errors[0].field_name, "ssn");
        assert!(fields[0].validation_error.is_some());
        assert!(fields[1].validation_error.is_none());
        assert!(fields[2].validation_error.is_none());
    }

    #[test]
    fn pass_fraction_counts_failures() {
        let mut fields = vec![
            field("a", json!("12345678"), FieldDataType::Ssn),
            field("b", json!("123456789"), FieldDataType::Ssn),
            field("c", json!("$1.00"), FieldDataType::Currency),
            field("d", json!("1.00"), FieldDataType::Currency),
        ];
        let report = FieldValidator::validate(&mut fields);
        assert!((report.pass_fraction() - 0.75).abs() < 1e-6);
    }

    #[test]
    fn empty_field_list_is_trivially_valid() {
        let mut fields: Vec<ExtractedField> = vec![];
        let report = FieldValidator::validate(&mut fields);
        assert!(report.is_valid);
        assert_eq!(report.pass_fraction(), 1.0);
    }

    #[test]
    fn numeric_json_values_validate_via_text_rendering() {
        let mut fields = vec![field("agi", json!(48210.55), FieldDataType::Currency)];
        let report = FieldValidator::validate(&mut fields);
        assert!(report.is_valid);
    }
}
