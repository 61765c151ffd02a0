//! Test-case identifiers of the form `<APP>-TC-<NNN>`.
//!
//! The application code is taken verbatim from the document's `app` field.
//! The sequence number is strictly positive and zero-padded to three digits
//! below 1000; wider numbers are written unpadded.

use std::fmt;
use std::num::NonZeroU64;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Literal separating the application code from the sequence number.
pub const CASE_ID_INFIX: &str = "-TC-";

const SEQUENCE_PAD_WIDTH: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseIdError {
    #[error("identifier is empty")]
    Empty,
    #[error("identifier `{0}` has no `-TC-` separator")]
    MissingInfix(String),
    #[error("identifier `{0}` has an empty application code")]
    EmptyApp(String),
    #[error("identifier `{0}` has a non-numeric sequence")]
    InvalidSequence(String),
    #[error("identifier `{0}` has sequence zero; sequences start at 1")]
    ZeroSequence(String),
    #[error("identifier `{found}` is not canonically padded; expected `{expected}`")]
    NonCanonicalPadding { found: String, expected: String },
    #[error("identifier `{found}` does not belong to app `{expected_app}`")]
    AppMismatch { found: String, expected_app: String },
}

/// A test-case identifier: application code plus per-application sequence.
///
/// Never stored independently of the corpus; the highest allocated sequence
/// is always recomputed from the persisted document ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CaseId {
    app: String,
    sequence: NonZeroU64,
}

impl CaseId {
    pub fn new(app: impl Into<String>, sequence: NonZeroU64) -> Self {
        Self {
            app: app.into(),
            sequence,
        }
    }

    /// Returns `None` for sequence zero.
    pub fn from_raw(app: impl Into<String>, sequence: u64) -> Option<Self> {
        NonZeroU64::new(sequence).map(|seq| Self::new(app, seq))
    }

    /// First identifier of an application (`<APP>-TC-001`).
    pub fn first(app: impl Into<String>) -> Self {
        Self::new(app, NonZeroU64::MIN)
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.get()
    }

    /// The identifier following this one, or `None` on overflow.
    pub fn next(&self) -> Option<Self> {
        self.sequence
            .checked_add(1)
            .map(|seq| Self::new(self.app.clone(), seq))
    }

    /// Whether this id belongs to `app`, ignoring ASCII case.
    pub fn belongs_to(&self, app: &str) -> bool {
        self.app.eq_ignore_ascii_case(app)
    }

    /// Strict parse: the text must be exactly the canonical rendering.
    pub fn parse(text: &str) -> Result<Self, CaseIdError> {
        let (app, digits) = split(text)?;
        let id = Self::new(app, parse_sequence(text, digits)?);
        let canonical = id.to_string();
        if canonical != text {
            return Err(CaseIdError::NonCanonicalPadding {
                found: text.to_string(),
                expected: canonical,
            });
        }
        Ok(id)
    }

    /// Strict parse that also requires the application code to equal `app`.
    pub fn parse_for_app(text: &str, app: &str) -> Result<Self, CaseIdError> {
        let id = Self::parse(text)?;
        if id.app != app {
            return Err(CaseIdError::AppMismatch {
                found: text.to_string(),
                expected_app: app.to_string(),
            });
        }
        Ok(id)
    }

    /// Tolerant parse used when scanning a corpus: any zero padding is
    /// accepted and the `TC` literal may be in any case. Returns `None` for
    /// anything that does not look like a case identifier.
    pub fn parse_lenient(text: &str) -> Option<Self> {
        let text = text.trim();
        let upper = text.to_ascii_uppercase();
        let at = upper.rfind(CASE_ID_INFIX)?;
        let app = &text[..at];
        let digits = &text[at + CASE_ID_INFIX.len()..];
        if app.is_empty() || app.chars().any(char::is_whitespace) {
            return None;
        }
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u64 = digits.parse().ok()?;
        Self::from_raw(app, value)
    }
}

/// Whether `text` is an unassigned placeholder such as `APP1-TC-XXX`.
pub fn is_placeholder(text: &str) -> bool {
    match split(text) {
        Ok((_, digits)) => !digits.is_empty() && digits.chars().all(|c| c == 'X' || c == 'x'),
        Err(_) => false,
    }
}

fn split(text: &str) -> Result<(&str, &str), CaseIdError> {
    if text.is_empty() {
        return Err(CaseIdError::Empty);
    }
    let Some((app, digits)) = text.rsplit_once(CASE_ID_INFIX) else {
        return Err(CaseIdError::MissingInfix(text.to_string()));
    };
    if app.is_empty() || app.chars().any(char::is_whitespace) {
        return Err(CaseIdError::EmptyApp(text.to_string()));
    }
    Ok((app, digits))
}

fn parse_sequence(text: &str, digits: &str) -> Result<NonZeroU64, CaseIdError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CaseIdError::InvalidSequence(text.to_string()));
    }
    let value: u64 = digits
        .parse()
        .map_err(|_| CaseIdError::InvalidSequence(text.to_string()))?;
    NonZeroU64::new(value).ok_or_else(|| CaseIdError::ZeroSequence(text.to_string()))
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{:0width$}",
            self.app,
            CASE_ID_INFIX,
            self.sequence.get(),
            width = SEQUENCE_PAD_WIDTH
        )
    }
}

impl FromStr for CaseId {
    type Err = CaseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CaseId {
    type Error = CaseIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CaseId> for String {
    fn from(value: CaseId) -> Self {
        value.to_string()
    }
}
