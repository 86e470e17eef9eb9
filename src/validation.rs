// ✅ Input Validation - form fields checked before anything touches the store
//
// Every check returns `Err(message)` with text fit for the user. Checks are
// collected with `Problems` so a form reports all of its mistakes at once.

use crate::error::{LedgerError, Result};
use crate::money::Amount;
use crate::payments::PaymentMethod;

/// Collects failed checks; empty means valid
#[derive(Debug, Default)]
pub struct Problems(Vec<String>);

impl Problems {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(&mut self, result: std::result::Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.0.push(message);
        }
        self
    }

    pub fn into_result(self) -> Result<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::Validation(self.0))
        }
    }
}

// ============================================================================
// FIELD CHECKS
// ============================================================================

pub fn required(value: &str, field: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is required"));
    }
    Ok(())
}

pub fn username(value: &str) -> std::result::Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Username is required".to_string());
    }
    if value.chars().count() < 4 {
        return Err("Username must be at least 4 characters".to_string());
    }
    if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("Username can only contain letters, numbers, and underscores".to_string());
    }
    Ok(())
}

pub fn password(value: &str) -> std::result::Result<(), String> {
    if value.is_empty() {
        return Err("Password is required".to_string());
    }
    if value.chars().count() < 6 {
        return Err("Password must be at least 6 characters".to_string());
    }
    Ok(())
}

/// First/last name: letters and spaces, at least two characters
pub fn person_name(value: &str, field: &str) -> std::result::Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(format!("{field} is required"));
    }
    if value.chars().count() < 2 {
        return Err(format!("{field} must be at least 2 characters"));
    }
    if !value.chars().all(|c| c.is_alphabetic() || c == ' ') {
        return Err(format!("{field} can only contain letters"));
    }
    Ok(())
}

/// Registration contact number: phone punctuation allowed, 10+ characters
pub fn contact_number(value: &str) -> std::result::Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Contact number is required".to_string());
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '(' | ')' | ' '))
    {
        return Err("Invalid contact number format".to_string());
    }
    if value.len() < 10 {
        return Err("Contact number must be at least 10 digits".to_string());
    }
    Ok(())
}

/// Philippine mobile number: exactly 11 digits starting with "09"
pub fn mobile_number(value: &str) -> std::result::Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Contact number is required".to_string());
    }
    if value.chars().count() != 11 {
        return Err("Contact number must be exactly 11 digits".to_string());
    }
    if !value.starts_with("09") {
        return Err("Contact number must start with '09'".to_string());
    }
    if !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err("Contact number must contain only digits".to_string());
    }
    Ok(())
}

pub fn plate_number(value: &str) -> std::result::Result<(), String> {
    let value = value.trim();
    if value.is_empty() {
        return Err("Plate number is required".to_string());
    }
    if value.chars().count() < 3 {
        return Err("Plate number is too short".to_string());
    }
    Ok(())
}

// ============================================================================
// PAYMENT FORM
// ============================================================================

/// What the payer typed into the payment form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentForm {
    pub method: PaymentMethod,
    pub amount: Amount,
    pub payer_name: String,
    pub contact: String,
    /// Transaction reference; required for online methods only
    pub reference: Option<String>,
}

pub fn payment_form(form: &PaymentForm) -> Result<()> {
    let mut problems = Problems::new();

    problems
        .check(required(&form.payer_name, "Payer name"))
        .check(mobile_number(&form.contact));

    if form.method.requires_reference() {
        let has_reference = form
            .reference
            .as_deref()
            .map(|r| !r.trim().is_empty())
            .unwrap_or(false);
        if !has_reference {
            problems.check(Err(format!(
                "{} reference number is required",
                form.method
            )));
        }
    }

    if !form.amount.is_positive() {
        problems.check(Err("Payment amount must be greater than zero".to_string()));
    } else if form.amount > Amount::MAX_CHARGE {
        problems.check(Err(format!(
            "Payment amount cannot exceed {}",
            Amount::MAX_CHARGE
        )));
    }

    problems.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn form(method: PaymentMethod, reference: Option<&str>) -> PaymentForm {
        PaymentForm {
            method,
            amount: Amount::pesos(500),
            payer_name: "Juan Dela Cruz".to_string(),
            contact: "09171234567".to_string(),
            reference: reference.map(str::to_string),
        }
    }

    #[test]
    fn test_mobile_number() {
        assert!(mobile_number("09171234567").is_ok());
        assert!(mobile_number(" 09171234567 ").is_ok());
        assert!(mobile_number("0917123456").is_err());
        assert!(mobile_number("19171234567").is_err());
        assert!(mobile_number("0917123456a").is_err());
        assert!(mobile_number("").is_err());
    }

    #[test]
    fn test_cash_needs_no_reference() {
        assert!(payment_form(&form(PaymentMethod::Cash, None)).is_ok());
    }

    #[test]
    fn test_online_methods_need_reference() {
        for method in PaymentMethod::ALL.iter().filter(|m| m.requires_reference()) {
            let err = payment_form(&form(*method, None)).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation);

            let blank = payment_form(&form(*method, Some("   "))).unwrap_err();
            assert_eq!(blank.kind(), ErrorKind::Validation);

            assert!(payment_form(&form(*method, Some("REF-1234"))).is_ok());
        }
    }

    #[test]
    fn test_all_problems_reported_together() {
        let bad = PaymentForm {
            method: PaymentMethod::GCash,
            amount: Amount::ZERO,
            payer_name: "  ".to_string(),
            contact: "12345".to_string(),
            reference: None,
        };

        match payment_form(&bad).unwrap_err() {
            LedgerError::Validation(messages) => {
                assert_eq!(messages.len(), 4);
                assert!(messages.contains(&"Payer name is required".to_string()));
                assert!(messages.contains(&"GCash reference number is required".to_string()));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_amount_above_cap_rejected() {
        let mut over = form(PaymentMethod::Cash, None);
        over.amount = Amount::MAX_CHARGE.checked_add(Amount::from_centavos(1)).unwrap();
        assert_eq!(payment_form(&over).unwrap_err().kind(), ErrorKind::Validation);

        over.amount = Amount::MAX_CHARGE;
        assert!(payment_form(&over).is_ok());
    }

    #[test]
    fn test_registration_fields() {
        assert!(username("juan_dc").is_ok());
        assert!(username("ab").is_err());
        assert!(username("juan.dc").is_err());
        assert!(password("pass123").is_ok());
        assert!(password("12345").is_err());
        assert!(person_name("Maria Clara", "First name").is_ok());
        assert!(person_name("M", "First name").is_err());
        assert!(person_name("R2D2", "First name").is_err());
        assert!(contact_number("(02) 8123-4567").is_ok());
        assert!(contact_number("12345").is_err());
        assert!(plate_number("ABC1234").is_ok());
        assert!(plate_number("AB").is_err());
    }
}
