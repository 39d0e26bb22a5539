//! Input validation and conflict resolution.
//!
//! Small, pure checks for values that come from users or from parsed
//! documents: format validators, bounded integers, strict equality between
//! two values that must agree, and collapsing several optional hints into
//! the one value they all agree on.

use regex::Regex;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

/// Two values that were required to agree did not.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueMismatchError {
    #[error("{first_label} {first} does not match {second_label} {second}")]
    Values {
        first_label: String,
        first: String,
        second_label: String,
        second: String,
    },

    #[error(
        "Found multiple candidates for the {label}: \n{first}\n...and...\n{second}\n\
         Please correct or clarify your search parameters."
    )]
    Candidates {
        label: String,
        first: String,
        second: String,
    },
}

/// The expected value(s) reported by [`InvalidInputError::ValueUnsupported`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expected {
    One(String),
    AnyOf(Vec<String>),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One(value) => f.write_str(value),
            Self::AnyOf(values) => {
                let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
                write!(f, "one of {}", quoted.join(", "))
            }
        }
    }
}

impl From<&str> for Expected {
    fn from(value: &str) -> Self {
        Self::One(value.to_string())
    }
}

impl From<Vec<&str>> for Expected {
    fn from(values: Vec<&str>) -> Self {
        Self::AnyOf(values.into_iter().map(str::to_string).collect())
    }
}

/// User-supplied or extracted data failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidInputError {
    #[error("'{value}' is not a valid {kind}")]
    Malformed { kind: &'static str, value: String },

    #[error("'{0}' contains invalid whitespace")]
    Whitespace(String),

    #[error(transparent)]
    ValueMismatch(#[from] ValueMismatchError),

    #[error("Unsupported value '{actual}' for {value_type} - expected {expected}")]
    ValueUnsupported {
        value_type: String,
        actual: String,
        expected: Expected,
    },

    #[error("Value '{actual}' for {value_type} is too low - must be at least {minimum}")]
    ValueTooLow {
        value_type: String,
        actual: i64,
        minimum: i64,
    },

    #[error("Value '{actual}' for {value_type} is too high - must be at most {maximum}")]
    ValueTooHigh {
        value_type: String,
        actual: i64,
        maximum: i64,
    },
}

// ============================================================================
// Equality and Conflicts
// ============================================================================

/// Renders a structured value (a parsed document node, for instance) in its
/// serialized JSON form when it shows up in an error message.
///
/// Values JSON can't represent (maps with non-string keys, for instance) fall
/// back to their `Debug` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Serialized<T>(pub T);

impl<T: Serialize + fmt::Debug> fmt::Display for Serialized<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Fails unless `first` and `second` are equal.
///
/// ```
/// use cot_core::validation::match_or_die;
///
/// assert!(match_or_die("disk capacity", &100, "file size", &100).is_ok());
/// let err = match_or_die("disk capacity", &100, "file size", &200).unwrap_err();
/// assert_eq!(err.to_string(), "disk capacity 100 does not match file size 200");
/// ```
pub fn match_or_die<T, U>(
    first_label: &str,
    first: &T,
    second_label: &str,
    second: &U,
) -> Result<(), ValueMismatchError>
where
    T: PartialEq<U> + fmt::Display + ?Sized,
    U: fmt::Display + ?Sized,
{
    if first == second {
        return Ok(());
    }
    Err(ValueMismatchError::Values {
        first_label: first_label.to_string(),
        first: first.to_string(),
        second_label: second_label.to_string(),
        second: second.to_string(),
    })
}

/// Collapses several optional candidates into the one they all agree on.
///
/// `None` entries have no opinion. Every present entry is compared against
/// every later present entry, failing on the first pair that differs. With no
/// conflict, the last present entry is returned (`None` if there are none).
pub fn check_for_conflict<'a, T>(
    label: &str,
    candidates: &'a [Option<T>],
) -> Result<Option<&'a T>, ValueMismatchError>
where
    T: PartialEq + fmt::Display,
{
    let mut result = None;
    for (i, first) in candidates.iter().enumerate() {
        let Some(first) = first else { continue };
        for second in candidates[i + 1..].iter().flatten() {
            if first != second {
                return Err(ValueMismatchError::Candidates {
                    label: label.to_string(),
                    first: first.to_string(),
                    second: second.to_string(),
                });
            }
        }
        result = Some(first);
    }
    Ok(result)
}

// ============================================================================
// Format Validators
// ============================================================================

fn mac_regexes() -> &'static [Regex; 3] {
    static RES: OnceLock<[Regex; 3]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"^([0-9a-fA-F]{2}:){5}[0-9a-fA-F]{2}$").expect("valid MAC regex"),
            Regex::new(r"^([0-9a-fA-F]{2}-){5}[0-9a-fA-F]{2}$").expect("valid MAC regex"),
            Regex::new(r"^([0-9a-fA-F]{4}\.){2}[0-9a-fA-F]{4}$").expect("valid MAC regex"),
        ]
    })
}

fn device_address_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d+:\d+$").expect("valid device address regex"))
}

/// Validates a MAC address in `xx:xx:xx:xx:xx:xx`, `xx-xx-xx-xx-xx-xx` or
/// `xxxx.xxxx.xxxx` form. Returns it trimmed.
pub fn mac_address(s: &str) -> Result<&str, InvalidInputError> {
    let s = s.trim();
    if mac_regexes().iter().any(|re| re.is_match(s)) {
        return Ok(s);
    }
    Err(InvalidInputError::Malformed {
        kind: "MAC address",
        value: s.to_string(),
    })
}

/// Validates a device address such as `1:0`. Returns it trimmed.
pub fn device_address(s: &str) -> Result<&str, InvalidInputError> {
    let s = s.trim();
    if device_address_regex().is_match(s) {
        return Ok(s);
    }
    Err(InvalidInputError::Malformed {
        kind: "device address",
        value: s.to_string(),
    })
}

/// Rejects strings with whitespace inside them. Returns the string trimmed.
pub fn no_whitespace(s: &str) -> Result<&str, InvalidInputError> {
    let s = s.trim();
    if s.split_whitespace().count() > 1 {
        return Err(InvalidInputError::Whitespace(s.to_string()));
    }
    Ok(s)
}

/// Parses an integer and checks it against inclusive `min` / `max` bounds.
pub fn validate_int(
    s: &str,
    min: Option<i64>,
    max: Option<i64>,
    label: &str,
) -> Result<i64, InvalidInputError> {
    let value: i64 = s
        .trim()
        .parse()
        .map_err(|_| InvalidInputError::ValueUnsupported {
            value_type: label.to_string(),
            actual: s.to_string(),
            expected: Expected::from("integer"),
        })?;

    if let Some(minimum) = min {
        if value < minimum {
            return Err(InvalidInputError::ValueTooLow {
                value_type: label.to_string(),
                actual: value,
                minimum,
            });
        }
    }
    if let Some(maximum) = max {
        if value > maximum {
            return Err(InvalidInputError::ValueTooHigh {
                value_type: label.to_string(),
                actual: value,
                maximum,
            });
        }
    }
    Ok(value)
}

/// An integer that is 0 or more.
pub fn non_negative_int(s: &str) -> Result<i64, InvalidInputError> {
    validate_int(s, Some(0), None, "input")
}

/// An integer that is 1 or more.
pub fn positive_int(s: &str) -> Result<i64, InvalidInputError> {
    validate_int(s, Some(1), None, "input")
}

// ============================================================================
// Natural Ordering
// ============================================================================

#[derive(Debug)]
enum Segment<'a> {
    Text(&'a str),
    Number(&'a str),
}

impl Ord for Segment<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => {
                let a = a.trim_start_matches('0');
                let b = b.trim_start_matches('0');
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialEq for Segment<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Segment<'_> {}

impl PartialOrd for Segment<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Splits into alternating text and digit runs, always starting with text.
fn segments(s: &str) -> Vec<Segment<'_>> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new("[0-9]+").expect("valid digits regex"));

    let mut parts = Vec::new();
    let mut last = 0;
    for m in digits.find_iter(s) {
        parts.push(Segment::Text(&s[last..m.start()]));
        parts.push(Segment::Number(m.as_str()));
        last = m.end();
    }
    parts.push(Segment::Text(&s[last..]));
    parts
}

/// Compares strings so that runs of digits compare by numeric value.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    segments(a).cmp(&segments(b))
}

/// Sorts strings "naturally": `file9` comes before `file10`.
///
/// ```
/// use cot_core::validation::natural_sort;
///
/// let mut items = vec!["item10", "item2", "item1"];
/// natural_sort(&mut items);
/// assert_eq!(items, ["item1", "item2", "item10"]);
/// ```
pub fn natural_sort<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}
