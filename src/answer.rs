//! Answer model and wire codec.
//!
//! Devices publish answers as plain text: `<MAC-address><sep><question-id><sep><choice>`.
//! The question id may itself contain the separator, so decoding splits on the
//! FIRST separator for the device address and the LAST separator for the choice.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default field separator for inbound payloads.
pub const DEFAULT_SEPARATOR: char = '|';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer than two separators in the payload.
    MissingSeparator,
    InvalidDeviceId(String),
    InvalidChoice(String),
    ChoiceOutOfRange(i64),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::MissingSeparator => {
                write!(f, "expected message in format <MAC-address>|<question ID>|<choice>")
            }
            DecodeError::InvalidDeviceId(raw) => {
                write!(f, "invalid device address {:?}", raw)
            }
            DecodeError::InvalidChoice(raw) => {
                write!(f, "choice {:?} is not an integer", raw)
            }
            DecodeError::ChoiceOutOfRange(value) => {
                write!(f, "choice {} is outside 0..=3", value)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// One of the four possible answer choices.
///
/// Constructing any value outside `{0, 1, 2, 3}` fails, so every `Choice`
/// in the system is valid by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Choice(u8);

impl Choice {
    pub const MAX: u8 = 3;

    pub fn new(value: u8) -> Result<Self, DecodeError> {
        if value <= Self::MAX {
            Ok(Self(value))
        } else {
            Err(DecodeError::ChoiceOutOfRange(i64::from(value)))
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Choice {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Choice::new(value).map_err(|e| e.to_string())
    }
}

impl From<Choice> for u8 {
    fn from(choice: Choice) -> Self {
        choice.0
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One submitted answer.
///
/// `received_at` is server-assigned at insertion time; it is `None` until the
/// store has committed the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub device_id: String,
    pub question_id: String,
    pub choice: Choice,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl Answer {
    pub fn new(device_id: &str, question_id: &str, choice: u8) -> Result<Self, DecodeError> {
        Ok(Self {
            device_id: canonicalize_device_id(device_id)?,
            question_id: question_id.trim().to_string(),
            choice: Choice::new(choice)?,
            received_at: None,
        })
    }

    /// Decode an answer from a raw payload.
    ///
    /// `"00-B0-D0-63-C2-26|spam|2"` decodes to device `00:b0:d0:63:c2:26`,
    /// question `spam`, choice `2`. `"FF-DE-AD-BE-EF-FF|who|expected|that|1"`
    /// keeps the embedded separators: question `who|expected|that`, choice `1`.
    pub fn from_message(message: &str, sep: char) -> Result<Self, DecodeError> {
        let (device_id, details) = message
            .split_once(sep)
            .ok_or(DecodeError::MissingSeparator)?;
        let (question_id, choice_text) = details
            .rsplit_once(sep)
            .ok_or(DecodeError::MissingSeparator)?;

        let choice: i64 = choice_text
            .trim()
            .parse()
            .map_err(|_| DecodeError::InvalidChoice(choice_text.to_string()))?;
        if !(0..=i64::from(Choice::MAX)).contains(&choice) {
            return Err(DecodeError::ChoiceOutOfRange(choice));
        }

        Ok(Self {
            device_id: canonicalize_device_id(device_id)?,
            question_id: question_id.trim().to_string(),
            choice: Choice(choice as u8),
            received_at: None,
        })
    }

    /// Render the wire form of this answer. Inverse of [`Answer::from_message`]
    /// for canonical device ids.
    pub fn to_message(&self, sep: char) -> String {
        format!(
            "{}{}{}{}{}",
            self.device_id, sep, self.question_id, sep, self.choice
        )
    }
}

impl fmt::Display for Answer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Answer(device_id={}, question_id={:?}, choice={})",
            self.device_id, self.question_id, self.choice
        )
    }
}

/// Canonicalize a hardware address to lowercase colon-separated hex octets.
/// Accepts hyphen- or colon-delimited input.
pub fn canonicalize_device_id(raw: &str) -> Result<String, DecodeError> {
    let trimmed = raw.trim();
    let octets: Vec<&str> = trimmed.split(|c| c == ':' || c == '-').collect();
    if octets.len() != 6 {
        return Err(DecodeError::InvalidDeviceId(raw.to_string()));
    }

    let mut canonical = Vec::with_capacity(6);
    for octet in octets {
        if octet.len() != 2 || !octet.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(DecodeError::InvalidDeviceId(raw.to_string()));
        }
        canonical.push(octet.to_ascii_lowercase());
    }
    Ok(canonical.join(":"))
}
