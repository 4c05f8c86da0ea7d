use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

/// A cheaply clonable, reference counted string.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ImmutableString(Rc<String>);

impl Deref for ImmutableString {
    type Target = String;

    #[inline(always)]
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ImmutableString {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl From<String> for ImmutableString {
    fn from(s: String) -> Self {
        Self(Rc::new(s))
    }
}

impl From<&String> for ImmutableString {
    fn from(s: &String) -> Self {
        Self(Rc::new(s.to_string()))
    }
}

impl From<&str> for ImmutableString {
    fn from(s: &str) -> Self {
        Self(Rc::new(s.to_string()))
    }
}

impl fmt::Display for ImmutableString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
