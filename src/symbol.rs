use crate::error::IndexError;
use std::fmt;

/// Scheme written by both extraction strategies. Matches the external
/// indexer so that symbols from either side compare equal.
pub const SCHEME: &str = "scip-go";
pub const MANAGER: &str = "gomod";
/// Stand-in for an empty package name or version.
pub const PLACEHOLDER: &str = ".";

const LOCAL_PREFIX: &str = "local ";
const PARAM_PREFIX: &str = "param ";

/// Canonical identifier for a definable entity.
///
/// Serialized as five space-separated fields:
/// `scheme manager package-name package-version descriptor`. The serialized
/// string is the natural key of a Symbol node in the graph.
///
/// Descriptor suffixes tell kinds apart so that equal short names never
/// collide:
///
/// | kind      | example                          |
/// |-----------|----------------------------------|
/// | namespace | `` `example.com/app/pkg`/ ``     |
/// | type      | `` `example.com/app`/User# ``    |
/// | callable  | `` `example.com/app`/User#Get(). `` |
/// | term      | `` `example.com/app`/User#ID. `` |
/// | local     | `local 12`                       |
/// | parameter | `` param `example.com/app`/F().(x) `` |
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    pub scheme: String,
    pub manager: String,
    pub package_name: String,
    pub package_version: String,
    pub descriptor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    Namespace,
    Type,
    Method,
    Term,
    Local,
    Parameter,
    Unknown,
}

impl Symbol {
    pub fn build(package_name: &str, version: &str, descriptor: impl Into<String>) -> Self {
        Symbol {
            scheme: SCHEME.to_string(),
            manager: MANAGER.to_string(),
            package_name: or_placeholder(package_name),
            package_version: or_placeholder(version),
            descriptor: descriptor.into(),
        }
    }

    pub fn parse(input: &str) -> Result<Self, IndexError> {
        let parts: Vec<&str> = input.split(' ').collect();
        let descriptor = match parts.len() {
            5 => parts[4].to_string(),
            6 if parts[4] == "local" || parts[4] == "param" => {
                format!("{} {}", parts[4], parts[5])
            }
            count => {
                return Err(IndexError::malformed(
                    input,
                    format!("expected five space-separated fields, found {count}"),
                ));
            }
        };
        if parts.iter().any(|part| part.is_empty()) {
            return Err(IndexError::malformed(input, "empty field"));
        }
        Ok(Symbol {
            scheme: parts[0].to_string(),
            manager: parts[1].to_string(),
            package_name: parts[2].to_string(),
            package_version: parts[3].to_string(),
            descriptor,
        })
    }

    pub fn format(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.scheme, self.manager, self.package_name, self.package_version, self.descriptor
        )
    }

    pub fn suffix(&self) -> Suffix {
        let d = self.descriptor.as_str();
        if d.starts_with(LOCAL_PREFIX) {
            Suffix::Local
        } else if d.starts_with(PARAM_PREFIX) {
            Suffix::Parameter
        } else if d.ends_with("().") {
            Suffix::Method
        } else if d.ends_with('#') {
            Suffix::Type
        } else if d.ends_with('/') {
            Suffix::Namespace
        } else if d.ends_with('.') {
            Suffix::Term
        } else {
            Suffix::Unknown
        }
    }

    /// Last simple name of the descriptor, unescaped.
    pub fn name(&self) -> String {
        let d = self.descriptor.as_str();
        match self.suffix() {
            Suffix::Local => d[LOCAL_PREFIX.len()..].to_string(),
            Suffix::Parameter => {
                let inner = d.strip_suffix(')').unwrap_or(d);
                match inner.rfind('(') {
                    Some(pos) => unescape_name(&inner[pos + 1..]),
                    None => inner.to_string(),
                }
            }
            Suffix::Method => last_component(&d[..d.len() - 3]),
            Suffix::Type | Suffix::Namespace | Suffix::Term => last_component(&d[..d.len() - 1]),
            Suffix::Unknown => d.to_string(),
        }
    }

    /// Descriptor of the enclosing entity: the type for `T#member`, the
    /// callable for a parameter. `None` for package-level entities.
    pub fn owner_descriptor(&self) -> Option<&str> {
        let d = self.descriptor.as_str();
        match self.suffix() {
            Suffix::Parameter => {
                let body = &d[PARAM_PREFIX.len()..];
                body.rfind('(').map(|pos| &body[..pos])
            }
            Suffix::Method => last_unquoted(&d[..d.len() - 3], '#').map(|pos| &d[..=pos]),
            Suffix::Term => last_unquoted(&d[..d.len() - 1], '#').map(|pos| &d[..=pos]),
            _ => None,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

impl std::str::FromStr for Symbol {
    type Err = IndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::parse(s)
    }
}

fn or_placeholder(value: &str) -> String {
    if value.trim().is_empty() {
        PLACEHOLDER.to_string()
    } else {
        value.to_string()
    }
}

/// Wraps names with characters outside `[A-Za-z0-9_+$-]` in backticks.
pub fn escape_name(name: &str) -> String {
    let plain = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-' | '$'));
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

fn unescape_name(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('`') && raw.ends_with('`') {
        raw[1..raw.len() - 1].replace("``", "`")
    } else {
        raw.to_string()
    }
}

fn last_unquoted(s: &str, target: char) -> Option<usize> {
    let mut quoted = false;
    let mut found = None;
    for (idx, ch) in s.char_indices() {
        if ch == '`' {
            quoted = !quoted;
        } else if ch == target && !quoted {
            found = Some(idx);
        }
    }
    found
}

fn last_component(s: &str) -> String {
    let mut quoted = false;
    let mut start = 0;
    for (idx, ch) in s.char_indices() {
        match ch {
            '`' => quoted = !quoted,
            '/' | '#' | '.' if !quoted => start = idx + 1,
            _ => {}
        }
    }
    unescape_name(&s[start..])
}

pub fn namespace(import_path: &str) -> String {
    format!("{}/", escape_name(import_path))
}

pub fn type_descriptor(namespace: &str, name: &str) -> String {
    format!("{namespace}{}#", escape_name(name))
}

/// `prefix` is either a namespace or a type descriptor.
pub fn method_descriptor(prefix: &str, name: &str) -> String {
    format!("{prefix}{}().", escape_name(name))
}

pub fn term_descriptor(prefix: &str, name: &str) -> String {
    format!("{prefix}{}.", escape_name(name))
}

pub fn local_descriptor(id: &str) -> String {
    format!("{LOCAL_PREFIX}{id}")
}

pub fn parameter_descriptor(callable: &str, name: &str) -> String {
    format!("{PARAM_PREFIX}{callable}({})", escape_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_five_fields() {
        let inputs = [
            "scip-go gomod example.com/app v1.2.0 `example.com/app`/NewUser().",
            "scip-go gomod example.com/app . `example.com/app`/User#",
            "scip-go gomod example.com/app . `example.com/app`/User#Name.",
            "scip-go gomod example.com/app . local 4",
            "scip-go gomod example.com/app . param `example.com/app`/F().(x)",
        ];
        for input in inputs {
            let symbol = Symbol::parse(input).unwrap();
            assert_eq!(symbol.format(), input);
        }
    }

    #[test]
    fn rejects_wrong_field_count() {
        for input in [
            "",
            "scip-go gomod pkg v1",
            "scip-go gomod pkg v1 a# extra",
            "scip-go gomod pkg v1 local 1 2",
        ] {
            let err = Symbol::parse(input).unwrap_err();
            assert!(matches!(err, IndexError::MalformedSymbol { .. }), "{input:?}");
        }
    }

    #[test]
    fn rejects_empty_fields() {
        let err = Symbol::parse("scip-go  pkg v1 F().").unwrap_err();
        assert!(matches!(err, IndexError::MalformedSymbol { .. }));
        let err = Symbol::parse("scip-go gomod pkg v1 local ").unwrap_err();
        assert!(matches!(err, IndexError::MalformedSymbol { .. }));
    }

    #[test]
    fn build_fills_placeholders() {
        let symbol = Symbol::build("example.com/app", "", "F().");
        assert_eq!(symbol.format(), "scip-go gomod example.com/app . F().");
        let symbol = Symbol::build("", "", "F().");
        assert_eq!(symbol.package_name, PLACEHOLDER);
    }

    #[test]
    fn descriptors_distinguish_kinds() {
        let ns = namespace("example.com/app");
        assert_eq!(ns, "`example.com/app`/");
        let ty = type_descriptor(&ns, "User");
        assert_eq!(ty, "`example.com/app`/User#");
        assert_eq!(method_descriptor(&ty, "Name"), "`example.com/app`/User#Name().");
        assert_eq!(term_descriptor(&ty, "Name"), "`example.com/app`/User#Name.");
        assert_ne!(method_descriptor(&ns, "User"), type_descriptor(&ns, "User"));
        assert_eq!(
            parameter_descriptor(&method_descriptor(&ns, "F"), "x"),
            "param `example.com/app`/F().(x)"
        );
    }

    #[test]
    fn escapes_backticks() {
        assert_eq!(escape_name("plain_Name1"), "plain_Name1");
        assert_eq!(escape_name("a`b"), "`a``b`");
        assert_eq!(unescape_name("`a``b`"), "a`b");
    }

    #[test]
    fn suffix_name_and_owner() {
        let ns = namespace("example.com/app");
        let ty = type_descriptor(&ns, "User");

        let method = Symbol::build("example.com/app", ".", method_descriptor(&ty, "String"));
        assert_eq!(method.suffix(), Suffix::Method);
        assert_eq!(method.name(), "String");
        assert_eq!(method.owner_descriptor(), Some(ty.as_str()));

        let func = Symbol::build("example.com/app", ".", method_descriptor(&ns, "NewUser"));
        assert_eq!(func.suffix(), Suffix::Method);
        assert_eq!(func.owner_descriptor(), None);

        let field = Symbol::build("example.com/app", ".", term_descriptor(&ty, "ID"));
        assert_eq!(field.suffix(), Suffix::Term);
        assert_eq!(field.name(), "ID");
        assert_eq!(field.owner_descriptor(), Some(ty.as_str()));

        let user = Symbol::build("example.com/app", ".", ty.clone());
        assert_eq!(user.suffix(), Suffix::Type);
        assert_eq!(user.name(), "User");

        let package = Symbol::build("example.com/app", ".", ns.clone());
        assert_eq!(package.suffix(), Suffix::Namespace);
        assert_eq!(package.name(), "example.com/app");

        let param = Symbol::build(
            "example.com/app",
            ".",
            parameter_descriptor(&method_descriptor(&ns, "F"), "x"),
        );
        assert_eq!(param.suffix(), Suffix::Parameter);
        assert_eq!(param.name(), "x");
        assert_eq!(param.owner_descriptor(), Some("`example.com/app`/F()."));

        let local = Symbol::parse("scip-go gomod example.com/app . local 7").unwrap();
        assert_eq!(local.suffix(), Suffix::Local);
        assert_eq!(local.name(), "7");
    }
}
