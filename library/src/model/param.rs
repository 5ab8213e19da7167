//! Parameter declarations for proxy and target nodes.

use crate::error::GhostError;

/// Which side of a node a parameter lives on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Input,
    Output,
}

/// How a parameter hands its data to the owning node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Access {
    /// One item per solve; the host iterates the node over the data.
    #[default]
    Item,
    /// One list per solve.
    List,
    /// The whole tree in a single solve.
    Tree,
}

/// Capability of a parameter. Decides whether the proxy can reproduce it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Generic,
    Number,
    Integer,
    Boolean,
    Text,
    Geometry,
    /// A parameter type supplied by a third-party library; carries its type name.
    External(String),
}

impl ParamKind {
    pub fn type_name(&self) -> &str {
        match self {
            ParamKind::Generic => "Generic",
            ParamKind::Number => "Number",
            ParamKind::Integer => "Integer",
            ParamKind::Boolean => "Boolean",
            ParamKind::Text => "Text",
            ParamKind::Geometry => "Geometry",
            ParamKind::External(name) => name,
        }
    }
}

/// Declaration of one parameter slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: String,
    pub nickname: String,
    pub description: String,
    pub kind: ParamKind,
    pub access: Access,
    pub optional: bool,
    pub mutable_nickname: bool,
    pub simplify: bool,
    pub reverse: bool,
    /// Set on neutral slots created before a target is known.
    pub placeholder: bool,
}

impl ParamSpec {
    pub fn new(name: &str, nickname: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            nickname: nickname.to_string(),
            description: String::new(),
            kind,
            access: Access::Item,
            optional: false,
            mutable_nickname: true,
            simplify: false,
            reverse: false,
            placeholder: false,
        }
    }

    pub fn with_description(mut self, desc: &str) -> Self {
        self.description = desc.to_string();
        self
    }

    pub fn with_access(mut self, access: Access) -> Self {
        self.access = access;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Builds the parameters the proxy declares.
pub struct ParamFactory;

impl ParamFactory {
    /// Structural copy of a target parameter, forced to tree access and
    /// optional so the proxy is solved exactly once per pass.
    pub fn mirror(source: &ParamSpec) -> Result<ParamSpec, GhostError> {
        let kind = match &source.kind {
            ParamKind::External(_) => {
                return Err(GhostError::UnsupportedParam(source.kind.type_name().to_string()));
            }
            kind => kind.clone(),
        };
        Ok(ParamSpec {
            name: source.name.clone(),
            nickname: source.nickname.clone(),
            description: source.description.clone(),
            kind,
            access: Access::Tree,
            optional: true,
            mutable_nickname: source.mutable_nickname,
            simplify: source.simplify,
            reverse: source.reverse,
            placeholder: false,
        })
    }

    /// Neutral slot used when there is nothing to copy.
    pub fn placeholder(index: usize) -> ParamSpec {
        ParamSpec {
            placeholder: true,
            ..ParamSpec::new("A Parameter", &format!("P{}", index), ParamKind::Generic)
                .with_description("meaningless parameter\nset target component first")
                .with_access(Access::Tree)
                .optional()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_forces_tree_access_and_optional() {
        let mut source = ParamSpec::new("Radius", "R", ParamKind::Number)
            .with_description("circle radius")
            .with_access(Access::Item);
        source.simplify = true;
        source.reverse = true;
        source.mutable_nickname = false;

        let copy = ParamFactory::mirror(&source).unwrap();
        assert_eq!(copy.access, Access::Tree);
        assert!(copy.optional);
        assert_eq!(copy.name, "Radius");
        assert_eq!(copy.nickname, "R");
        assert_eq!(copy.description, "circle radius");
        assert_eq!(copy.kind, ParamKind::Number);
        assert!(copy.simplify);
        assert!(copy.reverse);
        assert!(!copy.mutable_nickname);
        assert!(!copy.placeholder);
    }

    #[test]
    fn test_mirror_rejects_external_kinds() {
        let source = ParamSpec::new("Mesh", "M", ParamKind::External("ThirdParty.Mesh".into()));
        let err = ParamFactory::mirror(&source).unwrap_err();
        assert!(matches!(err, GhostError::UnsupportedParam(name) if name == "ThirdParty.Mesh"));
    }

    #[test]
    fn test_placeholder_is_tagged() {
        let p = ParamFactory::placeholder(3);
        assert_eq!(p.nickname, "P3");
        assert!(p.placeholder);
        assert!(p.optional);
        assert_eq!(p.access, Access::Tree);
        assert!(p.description.contains("set target component first"));
    }
}
