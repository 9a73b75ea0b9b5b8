use crate::parser::FunctionDecl;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Runtime value. `Rc` keeps clones O(1); arrays share their backing store,
/// so element writes are visible through every handle.
#[derive(Debug, Clone)]
pub enum Value<'code> {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(Rc<str>),
    Array(Rc<RefCell<Vec<Value<'code>>>>),
    Function(Rc<FunctionDecl<'code>>),
    Unit,
}

impl<'code> Value<'code> {
    pub fn text(content: impl Into<Rc<str>>) -> Self {
        Self::Text(content.into())
    }

    pub fn array(elements: Vec<Value<'code>>) -> Self {
        Self::Array(Rc::new(RefCell::new(elements)))
    }

    /// Numeric view shared by arithmetic and comparisons; `None` for
    /// anything that is not a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(int) => Some(*int as f64),
            Self::Float(float) => Some(*float),
            _ => None,
        }
    }

    /// User-facing type name, as it appears in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Int(_) => "Int",
            Self::Float(_) => "Float",
            Self::Bool(_) => "Boolean",
            Self::Text(_) => "String",
            Self::Array(_) => "Array",
            Self::Function(_) => "Function",
            Self::Unit => "Unit",
        }
    }
}

impl PartialEq for Value<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            // Mixed numeric equality promotes to float
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => *a as f64 == *b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Array(a), Self::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Self::Function(a), Self::Function(b)) => Rc::ptr_eq(a, b),
            (Self::Unit, Self::Unit) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Value<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Int(int) => write!(f, "{int}"),
            Self::Float(float) => {
                // Whole doubles keep their decimal point, like Kotlin's 2.0
                if float.fract() == 0.0 && float.is_finite() {
                    write!(f, "{float:.1}")
                } else {
                    write!(f, "{float}")
                }
            }
            Self::Bool(boolean) => write!(f, "{boolean}"),
            Self::Text(text) => write!(f, "{text}"),
            Self::Array(elements) => {
                write!(f, "[")?;
                for (index, element) in elements.borrow().iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{element}")?;
                }
                write!(f, "]")
            }
            Self::Function(function) => write!(f, "<fun {}>", function.name.node),
            Self::Unit => write!(f, "unit"),
        }
    }
}
