//! # Type lattice
//!
//! The statically-known type of an expression or declaration. Types are
//! compared structurally; function types additionally carry parameter and
//! return types so two functions are only equal when their signatures match.

use std::fmt;

/// A resolved (or not-yet-resolved) static type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Int,
    Float,
    /// Bounded number: a float guaranteed (at the compiler level) to lie
    /// strictly inside `(0, 1)` for literals, `(-1, 1)` once carried through
    /// arithmetic. At runtime it collapses to `Value::Float`.
    BNum,
    Bool,
    String,
    Function {
        params: Vec<Type>,
        returns: Box<Type>,
    },
    /// Produced when resolution fails; lets the resolver keep walking and
    /// collect further errors instead of aborting on the first one.
    Invalid,
}

impl Type {
    pub fn function(params: Vec<Type>, returns: Type) -> Self {
        Type::Function {
            params,
            returns: Box::new(returns),
        }
    }

    /// `Int | Float | BNum`.
    pub fn is_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float | Type::BNum)
    }

    /// `Int | Float`, excluding the bounded type.
    pub fn is_unbounded_numeric(&self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    pub fn is_bnum(&self) -> bool {
        matches!(self, Type::BNum)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::BNum => write!(f, "bnum"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::Function { params, returns } => {
                write!(f, "function(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, "): {returns}")
            }
            Type::Invalid => write!(f, "<invalid>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_predicates() {
        assert!(Type::Int.is_numeric());
        assert!(Type::BNum.is_numeric());
        assert!(!Type::BNum.is_unbounded_numeric());
        assert!(Type::Float.is_unbounded_numeric());
        assert!(!Type::String.is_numeric());
    }

    #[test]
    fn function_equality_is_structural() {
        let a = Type::function(vec![Type::Int], Type::Void);
        let b = Type::function(vec![Type::Int], Type::Void);
        let c = Type::function(vec![Type::Float], Type::Void);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
