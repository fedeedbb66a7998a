//! User id normalization for control requests.

use std::fmt;

/// One or more user ids, transmitted as a single comma-joined string.
///
/// Ids may be given as integers or strings, alone or as a list:
///
/// ```
/// use control_client::UserIds;
///
/// assert_eq!(UserIds::from(1234u64).joined(), "1234");
/// assert_eq!(UserIds::from(vec!["1234", "5678"]).joined(), "1234,5678");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserIds(Vec<String>);

impl UserIds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, id: impl ToString) {
        let id = id.to_string();
        let id = id.trim();
        if !id.is_empty() {
            self.0.push(id.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// The wire form, e.g. `1234,5678`
    pub fn joined(&self) -> String {
        self.0.join(",")
    }
}

impl fmt::Display for UserIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.joined())
    }
}

impl<T: ToString> FromIterator<T> for UserIds {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut ids = UserIds::new();
        for id in iter {
            ids.push(id);
        }
        ids
    }
}

impl From<u64> for UserIds {
    fn from(id: u64) -> Self {
        std::iter::once(id).collect()
    }
}

impl From<&str> for UserIds {
    fn from(id: &str) -> Self {
        std::iter::once(id).collect()
    }
}

impl From<String> for UserIds {
    fn from(id: String) -> Self {
        std::iter::once(id).collect()
    }
}

impl<T: ToString> From<Vec<T>> for UserIds {
    fn from(ids: Vec<T>) -> Self {
        ids.into_iter().collect()
    }
}

impl<T: ToString> From<&[T]> for UserIds {
    fn from(ids: &[T]) -> Self {
        ids.iter().map(ToString::to_string).collect()
    }
}

impl<T: ToString, const N: usize> From<[T; N]> for UserIds {
    fn from(ids: [T; N]) -> Self {
        ids.into_iter().collect()
    }
}
