//! Client-side checks run before `login` and `register`.

use crate::operations::AccountRole;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;
/// Maximum length of first and last names.
pub const MAX_NAME_LENGTH: usize = 50;

const PASSWORD_SYMBOLS: &str = r#"!@#$%^&*()_+-=[]{};':"\|,.<>/?"#;

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"\S+@\S+\.\S+").expect("email pattern is valid"))
}

fn phone_regex() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?\d{8,16}$").expect("phone pattern is valid"))
}

/// Which password criteria are met.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordValidation {
    pub is_valid: bool,
    pub has_min_length: bool,
    pub has_uppercase: bool,
    pub has_lowercase: bool,
    pub has_number: bool,
    pub has_symbol: bool,
    /// Unmet criteria, in display order.
    pub errors: Vec<String>,
}

impl PasswordValidation {
    fn met_count(&self) -> usize {
        [
            self.has_min_length,
            self.has_uppercase,
            self.has_lowercase,
            self.has_number,
            self.has_symbol,
        ]
        .iter()
        .filter(|met| **met)
        .count()
    }
}

pub fn validate_password(password: &str) -> PasswordValidation {
    let has_min_length = password.chars().count() >= MIN_PASSWORD_LENGTH;
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());
    let has_number = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| PASSWORD_SYMBOLS.contains(c));

    let mut errors = Vec::new();
    if !has_min_length {
        errors.push(format!("At least {} characters", MIN_PASSWORD_LENGTH));
    }
    if !has_uppercase {
        errors.push("One uppercase letter".to_string());
    }
    if !has_lowercase {
        errors.push("One lowercase letter".to_string());
    }
    if !has_number {
        errors.push("One number".to_string());
    }
    if !has_symbol {
        errors.push("One special character".to_string());
    }

    PasswordValidation {
        is_valid: errors.is_empty(),
        has_min_length,
        has_uppercase,
        has_lowercase,
        has_number,
        has_symbol,
        errors,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

/// Weak with at most two criteria met, medium with at most four.
pub fn password_strength(password: &str) -> PasswordStrength {
    match validate_password(password).met_count() {
        0..=2 => PasswordStrength::Weak,
        3..=4 => PasswordStrength::Medium,
        _ => PasswordStrength::Strong,
    }
}

pub fn is_valid_email(email: &str) -> bool {
    email_regex().is_match(email)
}

/// Formatting characters are ignored; 8-16 digits with an optional leading `+`.
pub fn is_valid_phone(phone: &str) -> bool {
    let cleaned: String = phone
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();
    phone_regex().is_match(&cleaned)
}

/// Field name to message, empty when the form is valid.
pub type FieldErrors = BTreeMap<&'static str, String>;

pub fn validate_login_form(email: &str, password: &str) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if email.is_empty() {
        errors.insert("email", "Email is required".to_string());
    } else if !is_valid_email(email) {
        errors.insert("email", "Please enter a valid email".to_string());
    }

    if password.is_empty() {
        errors.insert("password", "Password is required".to_string());
    }

    errors
}

/// Registration form as typed by the user.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
    pub role: Option<AccountRole>,
    pub store_name: Option<String>,
}

pub fn validate_registration_form(form: &RegistrationForm) -> FieldErrors {
    let mut errors = FieldErrors::new();

    check_name(&mut errors, "firstName", "First name", &form.first_name);
    check_name(&mut errors, "lastName", "Last name", &form.last_name);

    if form.email.is_empty() {
        errors.insert("email", "Email is required".to_string());
    } else if !is_valid_email(&form.email) {
        errors.insert("email", "Please enter a valid email".to_string());
    }

    if form.phone.is_empty() {
        errors.insert("phone", "Phone number is required".to_string());
    } else if !is_valid_phone(&form.phone) {
        errors.insert(
            "phone",
            "Please enter a valid phone number (8-16 digits, can start with +)".to_string(),
        );
    }

    if form.password.is_empty() {
        errors.insert("password", "Password is required".to_string());
    } else if !validate_password(&form.password).is_valid {
        errors.insert("password", "Password does not meet requirements".to_string());
    }

    if form.confirm_password.is_empty() {
        errors.insert("confirmPassword", "Please confirm your password".to_string());
    } else if form.password != form.confirm_password {
        errors.insert("confirmPassword", "Passwords do not match".to_string());
    }

    let store_name_missing = form
        .store_name
        .as_deref()
        .map_or(true, |name| name.is_empty());
    if form.role == Some(AccountRole::Vendor) && store_name_missing {
        errors.insert("storeName", "Store name is required for vendors".to_string());
    }

    errors
}

fn check_name(errors: &mut FieldErrors, field: &'static str, label: &str, value: &str) {
    if value.is_empty() {
        errors.insert(field, format!("{} is required", label));
    } else if value.chars().count() > MAX_NAME_LENGTH {
        errors.insert(
            field,
            format!("{} must be {} characters or less", label, MAX_NAME_LENGTH),
        );
    }
}
