//! Dependency tuples
//!
//! Effects and memos re-run when any slot of their dependency tuple is no
//! longer identical to the previous one, or when the tuple length changes.

use std::rc::Rc;

/// One slot of a dependency tuple, compared by identity or value
#[derive(Debug, Clone, PartialEq)]
pub enum Dep {
    Null,
    Bool(bool),
    Int(i64),
    /// `NaN` never equals itself, so a `NaN` slot always counts as changed
    Float(f64),
    Str(Rc<str>),
    /// Pointer identity of a shared value
    Ref(usize),
}

impl Dep {
    /// Identity of a reference-counted value
    pub fn of<T: ?Sized>(value: &Rc<T>) -> Self {
        Self::Ref(Rc::as_ptr(value) as *const () as usize)
    }
}

/// `true` when `new` differs from `old` in length or in any slot
pub fn deps_changed(new: &[Dep], old: &[Dep]) -> bool {
    new.len() != old.len() || new.iter().zip(old).any(|(a, b)| a != b)
}

impl From<bool> for Dep {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! int_dep {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Dep {
            fn from(value: $ty) -> Self {
                Self::Int(value as i64)
            }
        })*
    };
}

int_dep!(i8, i16, i32, i64, u8, u16, u32, usize);

impl From<f32> for Dep {
    fn from(value: f32) -> Self {
        Self::Float(value as f64)
    }
}

impl From<f64> for Dep {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Dep {
    fn from(value: &str) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<String> for Dep {
    fn from(value: String) -> Self {
        Self::Str(Rc::from(value))
    }
}

impl From<&String> for Dep {
    fn from(value: &String) -> Self {
        Self::from(value.as_str())
    }
}

impl<T: Into<Dep>> From<Option<T>> for Dep {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}
