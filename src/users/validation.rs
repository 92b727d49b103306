use lazy_static::lazy_static;
use regex::Regex;
use time::{macros::format_description, Date, OffsetDateTime};

use crate::error::{AppError, FieldError};

pub const LANGUAGES: [&str; 4] = ["en", "fr", "ar", "es"];

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    static ref PHONE_RE: Regex = Regex::new(r"^\+?[0-9 ()\-]{7,20}$").unwrap();
    static ref NAME_RE: Regex = Regex::new(r"^[\p{L} '\-]+$").unwrap();
}

pub fn is_valid_email(email: &str) -> bool {
    email.len() <= 255 && EMAIL_RE.is_match(email)
}

/// Accumulates field errors so a response can list all of them at once.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if value.is_empty() {
            self.push(field, "Email is required");
        } else if !is_valid_email(value) {
            self.push(field, "Please provide a valid email");
        }
    }

    /// At least 6 characters with a lowercase letter, an uppercase letter and a digit.
    pub fn password(&mut self, field: &str, value: &str) {
        if value.chars().count() < 6 {
            self.push(field, "Password must be at least 6 characters");
        } else if !(value.chars().any(|c| c.is_ascii_lowercase())
            && value.chars().any(|c| c.is_ascii_uppercase())
            && value.chars().any(|c| c.is_ascii_digit()))
        {
            self.push(
                field,
                "Password must contain an uppercase letter, a lowercase letter and a number",
            );
        }
    }

    pub fn name(&mut self, field: &str, value: Option<&str>) {
        let Some(value) = value else { return };
        let len = value.chars().count();
        if !(1..=50).contains(&len) {
            self.push(field, "Name must be between 1 and 50 characters");
        } else if !NAME_RE.is_match(value) {
            self.push(field, "Name can only contain letters, spaces, hyphens and apostrophes");
        }
    }

    pub fn phone(&mut self, field: &str, value: Option<&str>) {
        if matches!(value, Some(v) if !PHONE_RE.is_match(v)) {
            self.push(field, "Please provide a valid phone number");
        }
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) {
        if matches!(value, Some(v) if v.chars().count() > max) {
            self.push(field, &format!("Must be at most {max} characters"));
        }
    }

    pub fn language(&mut self, field: &str, value: Option<&str>) {
        if matches!(value, Some(v) if !LANGUAGES.contains(&v)) {
            self.push(field, "Language must be one of en, fr, ar, es");
        }
    }

    /// Parses `YYYY-MM-DD`; the date has to lie in the past.
    pub fn birth_date(&mut self, field: &str, value: Option<&str>) -> Option<Date> {
        let value = value?;
        let format = format_description!("[year]-[month]-[day]");
        match Date::parse(value, &format) {
            Ok(date) if date < OffsetDateTime::now_utc().date() => Some(date),
            Ok(_) => {
                self.push(field, "Date of birth must be in the past");
                None
            }
            Err(_) => {
                self.push(field, "Date of birth must be formatted as YYYY-MM-DD");
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }
}

/// Empty strings from forms count as "not provided".
pub fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
