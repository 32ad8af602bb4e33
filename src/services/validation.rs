//! Form validation shared by the profile, committee, summary and admin forms.
//!
//! Errors are collected per field and rendered back next to the inputs;
//! messages are the ones adherents see.

use chrono::NaiveDate;
use url::Url;

pub const NOT_BLANK: &str = "Cette valeur ne doit pas être vide.";
pub const INVALID_CHOICE: &str = "Cette valeur n'est pas valide.";
pub const INVALID_URL: &str = "Cette valeur n'est pas une URL valide.";
pub const INVALID_EMAIL: &str = "Cette valeur n'est pas une adresse email valide.";
pub const INVALID_DATE: &str = "Cette valeur n'est pas une date valide.";
pub const INVALID_POSTAL_CODE: &str = "Cette valeur n'est pas un code postal français valide.";
pub const UNRECOGNIZED_ADDRESS: &str =
    "Votre adresse n'est pas reconnue. Vérifiez qu'elle soit correcte.";
pub const ADDRESS_REQUIRED: &str = "L'adresse est obligatoire.";
pub const INVALID_TWITTER_NICKNAME: &str =
    "Un identifiant Twitter ne peut contenir que des lettres, des chiffres et des underscores.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct FormErrors {
    errors: Vec<FieldError>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: FormErrors) {
        self.errors.extend(other.errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn all(&self) -> &[FieldError] {
        &self.errors
    }

    /// Messages attached to one field, in insertion order
    pub fn for_field(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field == field)
            .map(|e| e.message.as_str())
            .collect()
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    pub fn not_blank(&mut self, field: &str, value: &str) -> bool {
        if value.trim().is_empty() {
            self.add(field, NOT_BLANK);
            return false;
        }
        true
    }

    pub fn min_length(&mut self, field: &str, value: &str, min: usize, message: &str) {
        if value.trim().chars().count() < min {
            self.add(field, message);
        }
    }

    pub fn max_length(&mut self, field: &str, value: &str, max: usize) {
        if value.chars().count() > max {
            self.add(
                field,
                format!(
                    "Cette chaîne est trop longue. Elle doit avoir au maximum {} caractères.",
                    max
                ),
            );
        }
    }

    /// Empty values pass; use [`FormErrors::not_blank`] when the field is required
    pub fn optional_url(&mut self, field: &str, value: &str) {
        if !value.trim().is_empty() && !is_valid_url(value) {
            self.add(field, INVALID_URL);
        }
    }

    pub fn optional_twitter_nickname(&mut self, field: &str, value: &str) {
        if !value.trim().is_empty() && !is_valid_twitter_nickname(value) {
            self.add(field, INVALID_TWITTER_NICKNAME);
        }
    }

    pub fn email(&mut self, field: &str, value: &str) {
        if self.not_blank(field, value) && !is_valid_email(value) {
            self.add(field, INVALID_EMAIL);
        }
    }

    /// Checks a value against a closed list of choices
    pub fn choice(&mut self, field: &str, value: &str, choices: &[&str]) -> bool {
        if !choices.contains(&value) {
            self.add(field, INVALID_CHOICE);
            return false;
        }
        true
    }

    pub fn choices(&mut self, field: &str, values: &[String], choices: &[&str]) -> bool {
        if values.iter().any(|v| !choices.contains(&v.as_str())) {
            self.add(field, INVALID_CHOICE);
            return false;
        }
        true
    }

    /// Parses an `<input type="date">` value; blank gives `None`
    pub fn optional_date(&mut self, field: &str, value: &str) -> Option<NaiveDate> {
        let value = value.trim();
        if value.is_empty() {
            return None;
        }

        match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.add(field, INVALID_DATE);
                None
            }
        }
    }

    /// French postal address: street, postal code and `<postal>-<insee>` city code
    pub fn address(
        &mut self,
        prefix: &str,
        country: &str,
        address: &str,
        postal_code: &str,
        city_code: &str,
    ) {
        let postal_field = format!("{}.postal_code", prefix);
        let city_field = format!("{}.city", prefix);

        if country == "FR" {
            if !is_valid_french_postal_code(postal_code) {
                self.add(&postal_field, INVALID_POSTAL_CODE);
            }
            if !city_code_matches(postal_code, city_code) {
                self.add(&city_field, UNRECOGNIZED_ADDRESS);
            }
        } else if postal_code.trim().is_empty() {
            self.add(&postal_field, NOT_BLANK);
        }

        if address.trim().is_empty() {
            self.add(&format!("{}.address", prefix), ADDRESS_REQUIRED);
        }
    }
}

pub fn is_valid_url(value: &str) -> bool {
    match Url::parse(value.trim()) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Letters, digits and underscores, with an optional leading `@`
pub fn is_valid_twitter_nickname(value: &str) -> bool {
    let nickname = value.trim().trim_start_matches('@');
    !nickname.is_empty()
        && nickname.len() <= 15
        && nickname
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn is_valid_email(value: &str) -> bool {
    let value = value.trim();
    match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && domain.contains('.')
                && !domain.ends_with('.')
                && !value.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Five digits whose two first ones are a metropolitan or overseas department
pub fn is_valid_french_postal_code(value: &str) -> bool {
    let value = value.trim();
    if value.len() != 5 || !value.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    let department: u32 = value[..2].parse().unwrap_or(0);
    let overseas: u32 = value[..3].parse().unwrap_or(0);

    (1..=95).contains(&department) || (971..=976).contains(&overseas) || overseas == 980
}

/// City codes are `<postal code>-<INSEE code>`, as produced by the city picker
pub fn city_code_matches(postal_code: &str, city_code: &str) -> bool {
    match city_code.trim().split_once('-') {
        Some((postal, insee)) => {
            postal == postal_code.trim()
                && !insee.is_empty()
                && insee.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}
