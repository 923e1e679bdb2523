//! Input validation helpers
//!
//! Text length limits and checks for customer contact and shipping input.
//! Each check yields a user-facing message; callers aggregate them.

use shared::models::{ContactInfo, ShippingAddress};

// ── Text length limits ──────────────────────────────────────────────

/// Customer names
pub const MAX_NAME_LEN: usize = 200;

/// Email addresses (RFC 5321)
pub const MAX_EMAIL_LEN: usize = 254;

/// Phone numbers, postal codes
pub const MAX_SHORT_TEXT_LEN: usize = 100;

/// Address lines
pub const MAX_ADDRESS_LEN: usize = 500;

/// Client correlation hints
pub const MAX_HINT_LEN: usize = 128;

// ── Validation helpers ──────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} is required"));
    }
    if value.len() > max_len {
        return Err(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        ));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> Result<(), String> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(format!("{field} is too long ({} chars, max {max_len})", v.len()));
    }
    Ok(())
}

/// Shape check only: one `@`, non-empty local part, dotted domain
pub fn validate_email(value: &str) -> Result<(), String> {
    validate_required_text(value, "Email", MAX_EMAIL_LEN)?;
    let value = value.trim();
    let valid = value.split_once('@').is_some_and(|(local, domain)| {
        !local.is_empty()
            && !domain.contains('@')
            && domain.contains('.')
            && !domain.starts_with('.')
            && !domain.ends_with('.')
    });
    if valid && !value.contains(char::is_whitespace) {
        Ok(())
    } else {
        Err("Email is invalid".to_string())
    }
}

/// Two-letter ISO country code
pub fn validate_country(value: &str) -> Result<(), String> {
    let value = value.trim();
    if value.len() == 2 && value.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err("Country must be a two-letter code".to_string())
    }
}

/// All contact errors, in field order
pub fn validate_contact(contact: &ContactInfo) -> Vec<String> {
    [
        validate_email(&contact.email),
        validate_required_text(&contact.name, "Name", MAX_NAME_LEN),
        validate_optional_text(&contact.phone, "Phone", MAX_SHORT_TEXT_LEN),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect()
}

/// All shipping address errors, in field order
pub fn validate_shipping(address: &ShippingAddress) -> Vec<String> {
    [
        validate_required_text(&address.line1, "Address", MAX_ADDRESS_LEN),
        validate_optional_text(&address.line2, "Address line 2", MAX_ADDRESS_LEN),
        validate_required_text(&address.city, "City", MAX_NAME_LEN),
        validate_required_text(&address.postal_code, "Postal code", MAX_SHORT_TEXT_LEN),
        validate_country(&address.country),
    ]
    .into_iter()
    .filter_map(Result::err)
    .collect()
}
