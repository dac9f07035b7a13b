/// Simplistic map implementation built on a Vec of Options (index = key)
///
/// Freed keys are handed out again by [`insert_vacant`][Self::insert_vacant].
#[derive(Debug, Clone)]
pub(crate) struct IntMap<V>(Vec<Option<V>>);

impl<V> IntMap<V> {
    pub(crate) fn new() -> Self {
        Self(Vec::new())
    }

    fn index(idx: i64) -> Option<usize> {
        usize::try_from(idx).ok()
    }

    pub(crate) fn get(&self, idx: i64) -> Option<&V> {
        match self.0.get(Self::index(idx)?) {
            Some(Some(v)) => Some(v),
            _ => None,
        }
    }

    /// Store `value` under the lowest free key and return that key.
    pub(crate) fn insert_vacant(&mut self, value: V) -> i64 {
        let idx = match self.0.iter().position(Option::is_none) {
            Some(idx) => {
                self.0[idx] = Some(value);
                idx
            }
            None => {
                self.0.push(Some(value));
                self.0.len() - 1
            }
        };

        i64::try_from(idx).unwrap_or(i64::MAX)
    }

    pub(crate) fn remove(&mut self, idx: i64) -> Option<V> {
        self.0.get_mut(Self::index(idx)?)?.take()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.iter().filter(|value| value.is_some()).count()
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl<V> Default for IntMap<V> {
    fn default() -> Self {
        Self::new()
    }
}
