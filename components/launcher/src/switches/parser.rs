//! Token validation against a [`SwitchSpec`].

// Local crates
use crate::switches::spec::{SwitchSpec, ValueKind};

// External crates
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::instrument;

/// Prefix every switch token must carry.
const SWITCH_MARKER: &str = "--";

/// Typed value of a supplied switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchValue {
    /// Value of an integer switch.
    Integer(i32),
    /// Only ever `true`, absent flags are not stored.
    Flag(bool),
    /// Value of a string switch.
    String(String),
}

impl fmt::Display for SwitchValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchValue::Integer(n) => write!(f, "{n}"),
            SwitchValue::Flag(b) => write!(f, "{b}"),
            SwitchValue::String(s) => f.write_str(s),
        }
    }
}

/// User-facing command line errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// A token in switch position does not start with `--` and a name.
    #[error("Unknown switch: {0}")]
    UnknownSwitch(String),

    /// The switch is not in the table.
    #[error("Unsupported switch: {0}")]
    UnsupportedSwitch(String),

    /// The command line ended before the switch's value.
    #[error("Argument {0} requires a value")]
    MissingValue(String),

    /// An integer switch got something other than a number.
    #[error("Value for argument {0} is not a number")]
    InvalidNumericValue(String),

    /// A mandatory switch never appeared.
    #[error("Mandatory command line switch `--{0}' was not provided")]
    MissingMandatorySwitch(String),
}

/// Validated result of a successful [`parse`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArguments {
    values: HashMap<String, SwitchValue>,
}

impl ParsedArguments {
    /// Typed value for `name`, or `None` if the switch was not supplied.
    ///
    /// `name` may be a bare switch name or a full `name=flags` declaration.
    pub fn get(&self, name: &str) -> Option<&SwitchValue> {
        self.values.get(strip_declaration(name))
    }

    /// Whether the switch was supplied, regardless of its type.
    pub fn exists(&self, name: &str) -> bool {
        self.values.contains_key(strip_declaration(name))
    }

    /// Value of an integer switch, if supplied.
    pub fn integer(&self, name: &str) -> Option<i32> {
        match self.get(name) {
            Some(SwitchValue::Integer(n)) => Some(*n),
            _ => None,
        }
    }

    /// Value of a string switch, if supplied.
    pub fn string(&self, name: &str) -> Option<&str> {
        match self.get(name) {
            Some(SwitchValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}

fn strip_declaration(name: &str) -> &str {
    name.split_once('=').map_or(name, |(bare, _)| bare)
}

/// Parse `tokens` against `spec`.
///
/// Tokens are consumed left to right, the last occurrence of a switch wins,
/// and mandatory switches are checked in declaration order once every token
/// has been consumed. Nothing is returned unless the whole parse succeeds.
#[instrument(
    name = "jleaker_switches::parse",
    target = "switches::parser",
    level = "debug",
    skip_all
)]
pub fn parse<I, S>(tokens: I, spec: &SwitchSpec) -> Result<ParsedArguments, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut values = HashMap::new();
    let mut tokens = tokens.into_iter();

    while let Some(token) = tokens.next() {
        let token = token.as_ref();

        let name = match token.strip_prefix(SWITCH_MARKER) {
            Some(name) if !name.is_empty() && !name.starts_with('-') => name,
            _ => {
                tracing::debug!(token = %token, "Rejecting malformed switch token");
                return Err(ParseError::UnknownSwitch(token.to_string()));
            }
        };

        let definition = spec
            .get(name)
            .ok_or_else(|| ParseError::UnsupportedSwitch(name.to_string()))?;

        let value = if definition.accepts_value() {
            let raw = tokens
                .next()
                .ok_or_else(|| ParseError::MissingValue(name.to_string()))?;
            let raw = raw.as_ref();

            if definition.value_kind == ValueKind::Integer {
                let number = raw
                    .parse::<i32>()
                    .map_err(|_| ParseError::InvalidNumericValue(name.to_string()))?;
                SwitchValue::Integer(number)
            } else {
                SwitchValue::String(raw.to_string())
            }
        } else {
            SwitchValue::Flag(true)
        };

        tracing::trace!(switch = %name, value = %value, "Switch accepted");
        values.insert(name.to_string(), value);
    }

    if let Some(missing) = spec
        .iter()
        .find(|d| d.mandatory && !values.contains_key(&d.name))
    {
        return Err(ParseError::MissingMandatorySwitch(missing.name.clone()));
    }

    let parsed = ParsedArguments { values };
    tracing::debug!(switch_count = parsed.len(), "Command line parsed");
    Ok(parsed)
}
