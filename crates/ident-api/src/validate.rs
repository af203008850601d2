//! Input validation for `POST /identify`.
//!
//! Every rule is checked and every violation reported, so callers can fix a
//! request in one round trip.

use std::sync::LazyLock;

use ident_core::identity::IdentifyRequest;
use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::error::{ApiError, FieldError};

pub const EMAIL_MAX_LEN: usize = 255;
pub const PHONE_MAX_LEN: usize = 20;

static EMAIL_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid regex"));

// E.164: optional '+', no leading zero, 2 to 15 digits.
static PHONE_RE: LazyLock<Regex> =
  LazyLock::new(|| Regex::new(r"^\+?[1-9][0-9]{1,14}$").expect("valid regex"));

/// JSON body accepted by `POST /identify`. Unknown fields are ignored and
/// `null` reads as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyBody {
  #[serde(default)]
  pub email:        Option<String>,
  /// Accepted as a string or a bare JSON number.
  #[serde(default, deserialize_with = "string_or_number")]
  pub phone_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
  String(String),
  Number(serde_json::Number),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(Option::<StringOrNumber>::deserialize(deserializer)?.map(|v| match v {
    StringOrNumber::String(s) => s,
    StringOrNumber::Number(n) => n.to_string(),
  }))
}

impl IdentifyBody {
  /// Check every field and build the resolver's request.
  pub fn validate(self) -> Result<IdentifyRequest, ApiError> {
    let mut errors = Vec::new();

    if let Some(email) = &self.email {
      check(&mut errors, "email", email, EMAIL_MAX_LEN, &EMAIL_RE, Messages {
        empty:    "Email must not be empty",
        too_long: "Email must be less than 255 characters",
        invalid:  "Please provide a valid email address",
      });
    }

    if let Some(phone) = &self.phone_number {
      check(&mut errors, "phoneNumber", phone, PHONE_MAX_LEN, &PHONE_RE, Messages {
        empty:    "Phone number must not be empty",
        too_long: "Phone number must be less than 20 characters",
        invalid:  "Please provide a valid phone number",
      });
    }

    if self.email.is_none() && self.phone_number.is_none() {
      errors.push(FieldError {
        field:   "body",
        message: "At least one of email or phoneNumber must be provided".into(),
      });
    }

    if !errors.is_empty() {
      return Err(ApiError::Validation(errors));
    }

    IdentifyRequest::new(self.email, self.phone_number)
      .map_err(|e| ApiError::BadRequest(e.to_string()))
  }
}

struct Messages {
  empty:    &'static str,
  too_long: &'static str,
  invalid:  &'static str,
}

fn check(
  errors: &mut Vec<FieldError>,
  field: &'static str,
  value: &str,
  max_len: usize,
  pattern: &Regex,
  messages: Messages,
) {
  if value.is_empty() {
    errors.push(FieldError { field, message: messages.empty.into() });
    return;
  }
  if value.chars().count() > max_len {
    errors.push(FieldError { field, message: messages.too_long.into() });
  }
  if !pattern.is_match(value) {
    errors.push(FieldError { field, message: messages.invalid.into() });
  }
}
