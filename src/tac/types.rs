//! Names used by TAC: temporaries, globals and labels.

use std::fmt;

/// A temporary, written `%root` or `%root.k` once versioned by SSA conversion.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Temp {
    root: String,
    version: Option<u32>,
}

impl Temp {
    pub fn new(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            version: None,
        }
    }

    pub fn versioned(root: impl Into<String>, version: u32) -> Self {
        Self {
            root: root.into(),
            version: Some(version),
        }
    }

    /// The discard temporary `%_`
    pub fn sink() -> Self {
        Self::new("_")
    }

    pub fn is_sink(&self) -> bool {
        self.root == "_" && self.version.is_none()
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn version(&self) -> Option<u32> {
        self.version
    }

    /// Same root, new version
    pub fn with_version(&self, version: u32) -> Temp {
        Temp::versioned(self.root.clone(), version)
    }

    /// Parse a temporary name written without its leading `%`.
    pub fn parse(name: &str) -> Option<Temp> {
        let (root, version) = match name.split_once('.') {
            Some((root, version)) => (root, Some(version)),
            None => (name, None),
        };

        let root_ok = root == "_"
            || root == "0"
            || (root.starts_with(|c: char| c.is_ascii_digit() && c != '0')
                && root.chars().all(|c| c.is_ascii_digit()))
            || (root.starts_with(|c: char| c.is_ascii_alphabetic())
                && root.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
        if !root_ok {
            return None;
        }

        match version {
            None => Some(Temp::new(root)),
            Some(v) if root != "_" && !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()) => {
                v.parse().ok().map(|v| Temp::versioned(root, v))
            }
            Some(_) => None,
        }
    }
}

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) => write!(f, "%{}.{}", self.root, v),
            None => write!(f, "%{}", self.root),
        }
    }
}

/// A global symbol: a procedure or a global variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Global(String);

impl Global {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Symbol name without the `@` sigil
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Global {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A code label, always written with its `.L` prefix.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Label(String);

impl Label {
    /// Build a label from its full text (`.L1`) or from its suffix (`1`).
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.starts_with(".L") {
            Self(name)
        } else {
            Self(format!(".L{}", name))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The part after `.L`
    pub fn suffix(&self) -> &str {
        &self.0[2..]
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A value operand: a temporary or a memory-resident global variable.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Var {
    Temp(Temp),
    Global(Global),
}

impl Var {
    pub fn temp(&self) -> Option<&Temp> {
        match self {
            Var::Temp(t) => Some(t),
            Var::Global(_) => None,
        }
    }

    pub fn sink() -> Self {
        Var::Temp(Temp::sink())
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, Var::Temp(t) if t.is_sink())
    }
}

impl From<Temp> for Var {
    fn from(t: Temp) -> Self {
        Var::Temp(t)
    }
}

impl From<Global> for Var {
    fn from(g: Global) -> Self {
        Var::Global(g)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Var::Temp(t) => write!(f, "{}", t),
            Var::Global(g) => write!(f, "{}", g),
        }
    }
}
