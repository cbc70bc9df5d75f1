//! Switch declarations and the table built from them.

// External crates
use thiserror::Error;
use tracing::instrument;

/// Kind of value a switch carries on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Free-form string, taken verbatim from the next token.
    String,
    /// Base-10 signed integer, taken from the next token.
    Integer,
    /// No value, presence alone sets the switch.
    Flag,
}

/// A single declared switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchDefinition {
    /// Name without the `--` marker.
    pub name: String,
    /// What follows the switch.
    pub value_kind: ValueKind,
    /// Parsing fails when the switch is absent.
    pub mandatory: bool,
}

impl SwitchDefinition {
    /// A definition from its parts.
    pub fn new(name: impl Into<String>, value_kind: ValueKind, mandatory: bool) -> Self {
        Self {
            name: name.into(),
            value_kind,
            mandatory,
        }
    }

    /// Whether the switch consumes the following token as its value.
    pub fn accepts_value(&self) -> bool {
        self.value_kind != ValueKind::Flag
    }

    /// Parse a `"<name>=<flags>"` declaration, e.g. `pid=im` or `debug=b`.
    ///
    /// - `i` integer value
    /// - `b` flag, no value
    /// - `m` mandatory
    /// - `s` explicit string (the default when neither `i` nor `b` is given)
    pub fn from_declaration(declaration: &str) -> Result<Self, SpecError> {
        let (name, flags) = declaration
            .split_once('=')
            .ok_or_else(|| SpecError::MissingSeparator(declaration.to_string()))?;

        if name.is_empty() {
            return Err(SpecError::EmptyName(declaration.to_string()));
        }

        let mut integer = false;
        let mut flag = false;
        let mut mandatory = false;
        for c in flags.chars() {
            match c {
                'i' => integer = true,
                'b' => flag = true,
                'm' => mandatory = true,
                's' => {}
                other => {
                    return Err(SpecError::UnknownModifier {
                        switch: name.to_string(),
                        modifier: other,
                    });
                }
            }
        }

        let value_kind = match (integer, flag) {
            (true, true) => return Err(SpecError::ConflictingKinds(name.to_string())),
            (true, false) => ValueKind::Integer,
            (false, true) => ValueKind::Flag,
            (false, false) => ValueKind::String,
        };

        Ok(Self::new(name, value_kind, mandatory))
    }
}

/// Errors raised while building a [`SwitchSpec`] from declarations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecError {
    /// No `=` between name and modifiers.
    #[error("switch declaration `{0}' has no `=' separator")]
    MissingSeparator(String),

    /// Nothing before the `=`.
    #[error("switch declaration `{0}' has an empty name")]
    EmptyName(String),

    /// A modifier other than `i`, `b`, `m` or `s`.
    #[error("switch `{switch}' has unknown modifier `{modifier}'")]
    UnknownModifier {
        /// Switch being declared.
        switch: String,
        /// The offending character.
        modifier: char,
    },

    /// Both `i` and `b` were given.
    #[error("switch `{0}' cannot be both integer and flag")]
    ConflictingKinds(String),

    /// Two definitions share a name.
    #[error("switch `{0}' is declared more than once")]
    Duplicate(String),
}

/// Immutable, ordered table of switch definitions.
///
/// Declaration order is kept so the mandatory-switch scan always reports the
/// first declared missing switch.
#[derive(Debug, Clone, Default)]
pub struct SwitchSpec {
    switches: Vec<SwitchDefinition>,
}

impl SwitchSpec {
    /// Build a table from already structured definitions.
    pub fn new(switches: Vec<SwitchDefinition>) -> Result<Self, SpecError> {
        for (idx, def) in switches.iter().enumerate() {
            if switches[..idx].iter().any(|d| d.name == def.name) {
                return Err(SpecError::Duplicate(def.name.clone()));
            }
        }
        Ok(Self { switches })
    }

    /// Build a table from `"<name>=<flags>"` declarations.
    #[instrument(
        name = "jleaker_switches::spec_from_declarations",
        target = "switches::spec",
        level = "trace",
        skip_all
    )]
    pub fn from_declarations<'a, I>(declarations: I) -> Result<Self, SpecError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let switches = declarations
            .into_iter()
            .map(SwitchDefinition::from_declaration)
            .collect::<Result<Vec<_>, _>>()?;

        let spec = Self::new(switches)?;
        tracing::trace!(switch_count = spec.len(), "Switch table built");
        Ok(spec)
    }

    /// Case-sensitive exact lookup.
    pub fn get(&self, name: &str) -> Option<&SwitchDefinition> {
        self.switches.iter().find(|d| d.name == name)
    }

    /// Definitions in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &SwitchDefinition> {
        self.switches.iter()
    }

    pub(crate) fn len(&self) -> usize {
        self.switches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn declaration_flags_map_to_structured_fields() {
        let pid = SwitchDefinition::from_declaration("pid=im").unwrap();
        assert_eq!(pid, SwitchDefinition::new("pid", ValueKind::Integer, true));
        assert!(pid.accepts_value());

        let debug = SwitchDefinition::from_declaration("debug=b").unwrap();
        assert_eq!(debug.value_kind, ValueKind::Flag);
        assert!(!debug.accepts_value());
        assert!(!debug.mandatory);

        let lib = SwitchDefinition::from_declaration("lib-path=m").unwrap();
        assert_eq!(lib, SwitchDefinition::new("lib-path", ValueKind::String, true));

        let conf = SwitchDefinition::from_declaration("conf-file=s").unwrap();
        assert_eq!(conf.value_kind, ValueKind::String);
    }

    #[test]
    fn mandatory_flag_is_allowed() {
        let def = SwitchDefinition::from_declaration("force=bm").unwrap();
        assert_eq!(def.value_kind, ValueKind::Flag);
        assert!(def.mandatory);
    }

    #[test]
    fn malformed_declarations_are_rejected() {
        assert_eq!(
            SwitchDefinition::from_declaration("pid"),
            Err(SpecError::MissingSeparator("pid".into()))
        );
        assert_eq!(
            SwitchDefinition::from_declaration("=i"),
            Err(SpecError::EmptyName("=i".into()))
        );
        assert_eq!(
            SwitchDefinition::from_declaration("pid=ix"),
            Err(SpecError::UnknownModifier {
                switch: "pid".into(),
                modifier: 'x'
            })
        );
        assert_eq!(
            SwitchDefinition::from_declaration("pid=ib"),
            Err(SpecError::ConflictingKinds("pid".into()))
        );
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = SwitchSpec::from_declarations(["pid=i", "debug=b", "pid=im"]).unwrap_err();
        assert_eq!(err, SpecError::Duplicate("pid".into()));
    }

    #[test]
    fn lookup_is_case_sensitive_and_ordered() {
        let spec = SwitchSpec::from_declarations(["pid=im", "debug=b", "conf-path=m"]).unwrap();
        assert!(spec.get("pid").is_some());
        assert!(spec.get("PID").is_none());

        let names: Vec<&str> = spec.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["pid", "debug", "conf-path"]);
        assert_eq!(spec.len(), 3);
    }
}
