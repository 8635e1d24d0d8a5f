//! Scope metadata codec
//!
//! The initiator embeds the scope in the processor's free-form `extra1` field as
//! `component|paymentarea|itemid|userid`. There is no escaping, so component and
//! payment area names must never contain the delimiter; [`validate_name`]
//! enforces that before a transaction is started.

use regex::Regex;
use std::sync::OnceLock;

use crate::database::transaction_record::TransactionRecord;
use crate::error::{PaymentError, PaymentResult};
use crate::payments::types::{Scope, ScopeField};

const DELIMITER: char = '|';

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("static pattern"))
}

/// Check a component or payment area name
pub fn validate_name(field: ScopeField, value: &str) -> PaymentResult<()> {
    if name_pattern().is_match(value) {
        Ok(())
    } else {
        Err(PaymentError::invalid_argument(format!(
            "{} '{}' must match [a-z][a-z0-9_]*",
            field, value
        )))
    }
}

pub fn encode(scope: &Scope) -> String {
    format!(
        "{}{d}{}{d}{}{d}{}",
        scope.component,
        scope.payment_area,
        scope.item_id,
        scope.user_id,
        d = DELIMITER
    )
}

/// Scope fields as echoed back by the processor, kept as raw strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchoedScope {
    pub component: String,
    pub payment_area: String,
    pub item_id: String,
    pub user_id: String,
}

/// Split the metadata into its four fields; missing fields decode as empty
pub fn decode(metadata: &str) -> EchoedScope {
    let mut parts = metadata.splitn(4, DELIMITER);
    let mut next = || parts.next().unwrap_or_default().to_string();
    EchoedScope {
        component: next(),
        payment_area: next(),
        item_id: next(),
        user_id: next(),
    }
}

/// Compare the echoed metadata against the stored record, field by field
pub fn verify(metadata: &str, record: &TransactionRecord) -> PaymentResult<()> {
    let echoed = decode(metadata);

    if echoed.component != record.component {
        return Err(PaymentError::ScopeMismatch {
            field: ScopeField::Component,
        });
    }
    if echoed.payment_area != record.payment_area {
        return Err(PaymentError::ScopeMismatch {
            field: ScopeField::PaymentArea,
        });
    }
    if echoed.item_id != record.item_id.to_string() {
        return Err(PaymentError::ScopeMismatch {
            field: ScopeField::ItemId,
        });
    }
    if echoed.user_id != record.user_id.to_string() {
        return Err(PaymentError::ScopeMismatch {
            field: ScopeField::UserId,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::transaction_record::NewTransactionRecord;
    use chrono::Utc;

    fn record() -> TransactionRecord {
        NewTransactionRecord {
            scope: Scope::new("enrol_fee", "fee", 42, 7),
            transaction_id: "EX-1".to_string(),
            payment_reference: "ref".to_string(),
            test_mode: false,
        }
        .into_record(Utc::now())
    }

    #[test]
    fn test_encode_layout() {
        assert_eq!(encode(&Scope::new("enrol_fee", "fee", 42, 7)), "enrol_fee|fee|42|7");
    }

    #[test]
    fn test_verify_accepts_matching_scope() {
        assert!(verify("enrol_fee|fee|42|7", &record()).is_ok());
    }

    #[test]
    fn test_verify_reports_first_mismatching_field() {
        let cases = [
            ("mod_shop|fee|42|7", ScopeField::Component),
            ("enrol_fee|cart|42|7", ScopeField::PaymentArea),
            ("enrol_fee|fee|43|7", ScopeField::ItemId),
            ("enrol_fee|fee|42|8", ScopeField::UserId),
            ("enrol_fee|fee", ScopeField::ItemId),
            ("", ScopeField::Component),
        ];
        for (metadata, expected) in cases {
            match verify(metadata, &record()) {
                Err(PaymentError::ScopeMismatch { field }) => assert_eq!(field, expected),
                other => panic!("expected mismatch for {metadata}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_validate_name_rejects_delimiter() {
        assert!(validate_name(ScopeField::Component, "enrol_fee").is_ok());
        assert!(validate_name(ScopeField::Component, "enrol|fee").is_err());
        assert!(validate_name(ScopeField::PaymentArea, "").is_err());
        assert!(validate_name(ScopeField::PaymentArea, "Fee").is_err());
    }
}
