use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt::{self, Display, Formatter},
};

/// Annotation name used by [`BindingQualifier::named`].
pub const NAMED: &str = "Named";

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum QualifierValue {
    Bool(bool),
    Int(i64),
    Str(Cow<'static, str>),
    List(Vec<QualifierValue>),
}

impl Display for QualifierValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            QualifierValue::Bool(value) => write!(f, "{value}"),
            QualifierValue::Int(value) => write!(f, "{value}"),
            QualifierValue::Str(value) => write!(f, "{value:?}"),
            QualifierValue::List(values) => {
                f.write_str("[")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<bool> for QualifierValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QualifierValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&'static str> for QualifierValue {
    fn from(value: &'static str) -> Self {
        Self::Str(Cow::Borrowed(value))
    }
}

impl From<String> for QualifierValue {
    fn from(value: String) -> Self {
        Self::Str(Cow::Owned(value))
    }
}

/// Secondary part of a binding key.
///
/// Two qualifiers are equal when they come from the same annotation with the same attributes,
/// the order attributes were added in doesn't matter.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingQualifier {
    #[default]
    None,
    Annotated {
        annotation: Cow<'static, str>,
        attributes: BTreeMap<Cow<'static, str>, QualifierValue>,
    },
}

impl BindingQualifier {
    #[inline]
    #[must_use]
    pub fn annotated(annotation: impl Into<Cow<'static, str>>) -> Self {
        Self::Annotated {
            annotation: annotation.into(),
            attributes: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn named(name: impl Into<Cow<'static, str>>) -> Self {
        Self::annotated(NAMED).with("value", QualifierValue::Str(name.into()))
    }

    /// Adds an attribute. Has no effect on [`BindingQualifier::None`].
    #[must_use]
    pub fn with(mut self, key: impl Into<Cow<'static, str>>, value: impl Into<QualifierValue>) -> Self {
        if let Self::Annotated { attributes, .. } = &mut self {
            attributes.insert(key.into(), value.into());
        }
        self
    }

    #[inline]
    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Value of a [`BindingQualifier::named`] qualifier
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Annotated { annotation, attributes } if annotation == NAMED => match attributes.get("value") {
                Some(QualifierValue::Str(name)) => Some(name.as_ref()),
                _ => None,
            },
            _ => None,
        }
    }
}

impl Display for BindingQualifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BindingQualifier::None => f.write_str("unqualified"),
            BindingQualifier::Annotated { annotation, attributes } => {
                write!(f, "@{annotation}")?;
                if attributes.is_empty() {
                    return Ok(());
                }
                f.write_str("(")?;
                for (index, (key, value)) in attributes.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                f.write_str(")")
            }
        }
    }
}
