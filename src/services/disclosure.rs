// src/services/disclosure.rs
//! Disclosure Engine
//!
//! Turns a relying party's request into a frozen [`Disclosure`]: either one raw
//! attribute from the allow-list, or the boolean outcome of a predicate over an
//! attribute. Predicates are evaluated here, once; the token ledger only ever
//! replays the stored result.

use crate::error::{ConsentError, ConsentResult};
use crate::models::credential::{AttributeValue, Credential};
use crate::models::token::{Disclosure, Operator};
use crate::utils::clock::Clock;
use chrono::{Datelike, NaiveDate};
use std::sync::Arc;

/// Derived attribute computed from `date_of_birth`.
pub const AGE_FIELD: &str = "age";

/// Reads one allow-listed attribute.
///
/// # Errors
/// `Forbidden` for any name outside `{name, date_of_birth, gender, id_hash}`.
pub fn get_field(credential: &Credential, field: &str) -> ConsentResult<AttributeValue> {
    match field {
        "name" => Ok(AttributeValue::Text(credential.name.clone())),
        "date_of_birth" => Ok(AttributeValue::Date(credential.date_of_birth)),
        "gender" => Ok(AttributeValue::Text(credential.gender.clone())),
        "id_hash" => Ok(AttributeValue::Text(credential.id_hash.clone())),
        other => Err(ConsentError::Forbidden(other.to_string())),
    }
}

/// Whole years between `date_of_birth` and `today`.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> i64 {
    let mut age = i64::from(today.year()) - i64::from(date_of_birth.year());
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    age
}

/// Applies `operator` to `actual` and `comparand`.
///
/// - `gt`/`ge`: integers or dates, both sides the same type
/// - `eq`: both sides the same type
/// - `in`: text comparand found inside text actual (substring), or actual found
///   in a list comparand, or comparand found in a list actual
///
/// Any other pairing is a `TypeMismatch`; nothing is coerced.
pub fn compare(
    operator: Operator,
    actual: &AttributeValue,
    comparand: &AttributeValue,
) -> ConsentResult<bool> {
    use AttributeValue::*;

    let mismatch = || {
        ConsentError::TypeMismatch(format!(
            "'{}' cannot compare {} with {}",
            operator,
            actual.type_name(),
            comparand.type_name()
        ))
    };

    match operator {
        Operator::Gt | Operator::Ge => {
            let ordering = match (actual, comparand) {
                (Integer(a), Integer(b)) => a.cmp(b),
                (Date(a), Date(b)) => a.cmp(b),
                _ => return Err(mismatch()),
            };
            Ok(match operator {
                Operator::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
        Operator::Eq => {
            if std::mem::discriminant(actual) != std::mem::discriminant(comparand) {
                return Err(mismatch());
            }
            Ok(actual == comparand)
        }
        Operator::In => match (actual, comparand) {
            (Text(haystack), Text(needle)) => Ok(haystack.contains(needle.as_str())),
            (List(_), List(_)) => Err(mismatch()),
            (value, List(items)) => Ok(items.contains(value)),
            (List(items), value) => Ok(items.contains(value)),
            _ => Err(mismatch()),
        },
    }
}

/// Parses a raw form value into a comparand typed after the field it targets:
/// `age` wants an integer, `date_of_birth` a `YYYY-MM-DD` date, everything else
/// text. For `in`, a comma-separated value becomes a list. Values that do not
/// parse stay text so the comparison reports the mismatch.
pub fn parse_comparand(field: &str, operator: Operator, raw: &str) -> AttributeValue {
    let raw = raw.trim();
    if operator == Operator::In && raw.contains(',') {
        let items = raw
            .split(',')
            .map(|part| parse_comparand(field, Operator::Eq, part))
            .collect();
        return AttributeValue::List(items);
    }
    match field {
        AGE_FIELD => raw
            .parse::<i64>()
            .map(AttributeValue::Integer)
            .unwrap_or_else(|_| AttributeValue::Text(raw.to_string())),
        "date_of_birth" => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(AttributeValue::Date)
            .unwrap_or_else(|_| AttributeValue::Text(raw.to_string())),
        _ => AttributeValue::Text(raw.to_string()),
    }
}

/// Evaluates requests against a credential using the injected clock for "today".
#[derive(Clone)]
pub struct DisclosureEngine {
    clock: Arc<dyn Clock>,
}

impl DisclosureEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// The value a predicate sees for `field`: `age` is derived, everything
    /// else must be allow-listed.
    fn actual_value(&self, credential: &Credential, field: &str) -> ConsentResult<AttributeValue> {
        if field == AGE_FIELD {
            let age = age_on(credential.date_of_birth, self.clock.today());
            return Ok(AttributeValue::Integer(age));
        }
        get_field(credential, field)
    }

    /// Computes a derived boolean fact about the credential.
    pub fn evaluate(
        &self,
        credential: &Credential,
        operator: Operator,
        field: &str,
        comparand: &AttributeValue,
    ) -> ConsentResult<bool> {
        let actual = self.actual_value(credential, field)?;
        compare(operator, &actual, comparand)
    }

    /// Freezes a raw-value disclosure.
    pub fn disclose_value(&self, credential: &Credential, field: &str) -> ConsentResult<Disclosure> {
        let field = field.trim();
        let value = get_field(credential, field)?;
        Ok(Disclosure::Value {
            field: field.to_string(),
            value,
        })
    }

    /// Evaluates the predicate now and freezes the result.
    pub fn disclose_predicate(
        &self,
        credential: &Credential,
        operator: Operator,
        field: &str,
        comparand: AttributeValue,
    ) -> ConsentResult<Disclosure> {
        let field = field.trim();
        let result = self.evaluate(credential, operator, field, &comparand)?;
        log::debug!("predicate {} {} evaluated", field, operator);
        Ok(Disclosure::Predicate {
            operator,
            field: field.to_string(),
            comparand,
            result,
        })
    }
}
