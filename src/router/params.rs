//! Path parameters captured while matching a request against the trie.

use std::ops::Index;
use std::sync::Arc;

use crate::pool::Pool;

/// A single captured wildcard: the name from the pattern and the matched text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub value: String,
}

/// Captured parameters in the left-to-right order of the matched pattern's
/// wildcards.
///
/// When taken from the router's pool the backing buffer goes back to it on
/// drop. Clones never return anything to the pool.
///
/// # Examples
///
/// ```
/// use pathwise::router::Params;
///
/// let params: Params = [("category", "go"), ("post", "request-routers")]
///     .into_iter()
///     .collect();
///
/// assert_eq!(params.by_name("post"), Some("request-routers"));
/// assert_eq!(params[0].key, "category");
/// assert_eq!(params.by_name("missing"), None);
/// ```
#[derive(Debug, Default)]
pub struct Params {
    inner: Vec<Param>,
    home: Option<Arc<Pool<Vec<Param>>>>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a buffer from `pool`, or allocates one sized for `capacity` params.
    pub(crate) fn pooled(pool: &Arc<Pool<Vec<Param>>>, capacity: usize) -> Self {
        let inner = pool.acquire_with(|| Vec::with_capacity(capacity));
        Self {
            inner,
            home: Some(Arc::clone(pool)),
        }
    }

    pub(crate) fn push(&mut self, key: &str, value: &str) {
        self.inner.push(Param {
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }

    /// Value of the first parameter named `name`.
    pub fn by_name(&self, name: &str) -> Option<&str> {
        self.inner
            .iter()
            .find(|p| p.key == name)
            .map(|p| p.value.as_str())
    }

    pub fn get(&self, index: usize) -> Option<&Param> {
        self.inner.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Param> {
        self.inner.iter()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Clone for Params {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            home: None,
        }
    }
}

impl PartialEq for Params {
    fn eq(&self, other: &Self) -> bool {
        self.inner == other.inner
    }
}

impl Eq for Params {}

impl Drop for Params {
    fn drop(&mut self) {
        if let Some(pool) = self.home.take() {
            let mut buf = std::mem::take(&mut self.inner);
            buf.clear();
            pool.release(buf);
        }
    }
}

impl Index<usize> for Params {
    type Output = Param;

    fn index(&self, index: usize) -> &Param {
        &self.inner[index]
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Param;
    type IntoIter = std::slice::Iter<'a, Param>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(key, value)| Param {
                    key: key.into(),
                    value: value.into(),
                })
                .collect(),
            home: None,
        }
    }
}
