//! Turning page state into `Identity` and `MessageState` values.
//!
//! Extraction is heuristic text scraping of a page we don't control, so it
//! is built to always produce a value where it can. Per-selector faults
//! degrade to a default (identity field) or a zero contribution (unread
//! count) and are recorded on the returned [`Extraction`]. Only a page that
//! cannot be read at all fails the whole extraction.
//!
//! Each extraction takes one page snapshot and runs all of its selectors
//! against it, so a report never mixes two renders of the page.

use log::debug;
use thiserror::Error;

use crate::config::{FieldSelector, IdentityConfig};
use crate::platform::{Document, Page};
use crate::protocol::{Identity, MessageState};

/// Errors from reading the page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("document unavailable: {0}")]
    DocumentUnavailable(String),
    #[error("extraction panicked: {0}")]
    Panicked(String),
}

/// A value produced by an extraction, plus any faults that were absorbed
/// while producing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction<T> {
    pub value: T,
    pub faults: Vec<ExtractError>,
}

impl<T> Extraction<T> {
    pub fn is_degraded(&self) -> bool {
        !self.faults.is_empty()
    }
}

/// Parse the leading integer of an indicator's text.
///
/// Follows page-script `parseInt` rules (optional sign, `0x` hex prefix,
/// longest digit run, trailing junk ignored) but never goes below zero:
/// anything unparseable or negative counts as 0, and huge values saturate.
pub fn parse_leading_int(text: &str) -> u32 {
    let text = text.trim();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let (radix, digits) = match rest.get(..2) {
        Some("0x") | Some("0X") => (16, &rest[2..]),
        _ => (10, rest),
    };

    let mut value: u32 = 0;
    let mut seen = false;
    for c in digits.chars() {
        let Some(digit) = c.to_digit(radix) else {
            break;
        };
        seen = true;
        value = value.saturating_mul(radix).saturating_add(digit);
    }

    if !seen || negative { 0 } else { value }
}

/// Count unread messages by summing the leading integer of every element
/// matched by each selector. Selectors are queried independently, so an
/// element matched by two selectors contributes twice.
pub fn extract_message_state(
    selectors: &[String],
    document: &dyn Document,
) -> Result<Extraction<MessageState>, ExtractError> {
    let page = document.snapshot()?;
    let mut count: u32 = 0;
    let mut faults = Vec::new();

    for selector in selectors {
        match page.select_text(selector) {
            Ok(texts) => {
                for text in &texts {
                    count = count.saturating_add(parse_leading_int(text));
                }
            }
            Err(ExtractError::DocumentUnavailable(reason)) => {
                return Err(ExtractError::DocumentUnavailable(reason));
            }
            Err(fault) => {
                debug!("Selector '{}' contributes nothing: {}", selector, fault);
                faults.push(fault);
            }
        }
    }

    Ok(Extraction {
        value: MessageState::new(count),
        faults,
    })
}

/// Resolve the current identity. Fields without a selector, or whose
/// selector finds nothing, keep their configured default, so an identity
/// config with no selectors is a constant and never touches the page.
pub fn extract_identity(
    config: &IdentityConfig,
    document: &dyn Document,
) -> Result<Extraction<Identity>, ExtractError> {
    let defaults = &config.defaults;
    if config.is_constant() {
        return Ok(Extraction {
            value: defaults.clone(),
            faults: Vec::new(),
        });
    }

    let page = document.snapshot()?;
    let fields = &config.selectors;
    let mut faults = Vec::new();

    let mut resolve = |field: &Option<FieldSelector>, default: &str| -> Result<String, ExtractError> {
        let Some(field) = field else {
            return Ok(default.to_string());
        };
        match read_field(field, page.as_ref()) {
            Ok(Some(value)) => Ok(value),
            Ok(None) => Ok(default.to_string()),
            Err(ExtractError::DocumentUnavailable(reason)) => {
                Err(ExtractError::DocumentUnavailable(reason))
            }
            Err(fault) => {
                debug!("Identity selector '{}' unusable: {}", field.selector, fault);
                faults.push(fault);
                Ok(default.to_string())
            }
        }
    };

    let identity = Identity {
        user_name: resolve(&fields.user_name, &defaults.user_name)?,
        mall_name: resolve(&fields.mall_name, &defaults.mall_name)?,
        user_id: resolve(&fields.user_id, &defaults.user_id)?,
        mall_id: resolve(&fields.mall_id, &defaults.mall_id)?,
        avatar: resolve(&fields.avatar, &defaults.avatar)?,
    };

    Ok(Extraction {
        value: identity,
        faults,
    })
}

// First non-blank value the field selector yields.
fn read_field(field: &FieldSelector, page: &dyn Page) -> Result<Option<String>, ExtractError> {
    let values = match &field.attribute {
        Some(attribute) => page.select_attribute(&field.selector, attribute)?,
        None => page.select_text(&field.selector)?,
    };
    Ok(values
        .iter()
        .map(|value| value.trim())
        .find(|value| !value.is_empty())
        .map(str::to_string))
}

#[cfg(test)]
#[path = "extract_tests.rs"]
mod tests;
