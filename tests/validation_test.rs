//! Unit tests for the input validation rules

use zappies_core::validation::InputValidator;

#[test]
fn test_validate_email_valid() {
    assert!(InputValidator::validate_email("test@example.com").is_ok());
}

#[test]
fn test_validate_email_valid_subdomain() {
    assert!(InputValidator::validate_email("user@mail.example.com").is_ok());
}

#[test]
fn test_validate_email_trims_whitespace() {
    assert!(InputValidator::validate_email("  test@example.com  ").is_ok());
}

#[test]
fn test_validate_email_empty() {
    assert!(InputValidator::validate_email("").is_err());
}

#[test]
fn test_validate_email_no_at_symbol() {
    assert!(InputValidator::validate_email("testexample.com").is_err());
}

#[test]
fn test_validate_email_multiple_at_symbols() {
    assert!(InputValidator::validate_email("test@@example.com").is_err());
}

#[test]
fn test_validate_email_no_local_part() {
    assert!(InputValidator::validate_email("@example.com").is_err());
}

#[test]
fn test_validate_email_no_domain_dot() {
    assert!(InputValidator::validate_email("test@example").is_err());
}

#[test]
fn test_validate_email_inner_whitespace() {
    assert!(InputValidator::validate_email("te st@example.com").is_err());
}

#[test]
fn test_validate_password_valid() {
    assert!(InputValidator::validate_password("Secret123").is_ok());
}

#[test]
fn test_validate_password_empty() {
    assert!(InputValidator::validate_password("").is_err());
}

#[test]
fn test_validate_password_too_short() {
    assert!(InputValidator::validate_password("Ab1").is_err());
}

#[test]
fn test_validate_password_exactly_min_length() {
    assert!(InputValidator::validate_password("Abcdef12").is_ok());
}

#[test]
fn test_validate_password_missing_uppercase() {
    assert!(InputValidator::validate_password("secret123").is_err());
}

#[test]
fn test_validate_password_missing_lowercase() {
    assert!(InputValidator::validate_password("SECRET123").is_err());
}

#[test]
fn test_validate_password_missing_digit() {
    assert!(InputValidator::validate_password("SecretPass").is_err());
}

#[test]
fn test_validate_phone_empty_is_allowed() {
    assert!(InputValidator::validate_phone("").is_ok());
    assert!(InputValidator::validate_phone("   ").is_ok());
}

#[test]
fn test_validate_phone_international() {
    assert!(InputValidator::validate_phone("+5215512345678").is_ok());
}

#[test]
fn test_validate_phone_with_formatting() {
    assert!(InputValidator::validate_phone("+1 (555) 123-4567").is_ok());
}

#[test]
fn test_validate_phone_too_short() {
    assert!(InputValidator::validate_phone("12345").is_err());
}

#[test]
fn test_validate_phone_with_letters() {
    assert!(InputValidator::validate_phone("+1555CALLNOW").is_err());
}

#[test]
fn test_validate_full_name_valid() {
    assert!(InputValidator::validate_full_name("José García").is_ok());
}

#[test]
fn test_validate_full_name_empty() {
    assert!(InputValidator::validate_full_name("").is_err());
    assert!(InputValidator::validate_full_name("   ").is_err());
}

#[test]
fn test_validate_full_name_too_long() {
    assert!(InputValidator::validate_full_name(&"a".repeat(101)).is_err());
}

#[test]
fn test_validate_full_name_with_newline() {
    assert!(InputValidator::validate_full_name("John\nDoe").is_err());
}

#[test]
fn test_validate_business_name_valid() {
    assert!(InputValidator::validate_business_name("Acme & Sons").is_ok());
}

#[test]
fn test_validate_business_name_empty() {
    assert!(InputValidator::validate_business_name("").is_err());
}

#[test]
fn test_validate_business_name_too_long() {
    assert!(InputValidator::validate_business_name(&"a".repeat(101)).is_err());
}

#[test]
fn test_validate_bot_name_valid() {
    assert!(InputValidator::validate_bot_name("Support Bot").is_ok());
}

#[test]
fn test_validate_bot_name_empty() {
    assert!(InputValidator::validate_bot_name("  ").is_err());
}

#[test]
fn test_validate_bot_name_too_long() {
    assert!(InputValidator::validate_bot_name(&"a".repeat(51)).is_err());
}

#[test]
fn test_validate_bot_name_exactly_max() {
    assert!(InputValidator::validate_bot_name(&"a".repeat(50)).is_ok());
}
