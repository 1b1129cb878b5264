use std::collections::BTreeMap;
use std::rc::Rc;

/// Memoizes an expensive pure function. Entries live until they're explicitly invalidated.
pub struct StyleCache<K, V> {
    entries: BTreeMap<K, Rc<V>>,
    draws: usize,
}

impl<K: Ord + Clone, V> StyleCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
            draws: 0,
        }
    }

    /// Only calls `draw` on a miss.
    pub fn get_or_insert_with<F: FnOnce(&K) -> V>(&mut self, key: K, draw: F) -> Rc<V> {
        if let Some(value) = self.entries.get(&key) {
            return value.clone();
        }
        self.draws += 1;
        let value = Rc::new(draw(&key));
        self.entries.insert(key, value.clone());
        value
    }

    pub fn get(&self, key: &K) -> Option<Rc<V>> {
        self.entries.get(key).cloned()
    }

    /// Drops every entry not matching the predicate, returning how many were removed.
    pub fn retain<F: FnMut(&K) -> bool>(&mut self, mut keep: F) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| keep(key));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// How many times a value has been computed, ever
    pub fn draw_count(&self) -> usize {
        self.draws
    }
}

impl<K: Ord + Clone, V> Default for StyleCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hits_skip_drawing() {
        let mut cache: StyleCache<(u8, String), String> = StyleCache::new();
        let first = cache.get_or_insert_with((12, "S1".to_string()), |(z, name)| {
            format!("{name}@{z}")
        });
        let second = cache.get_or_insert_with((12, "S1".to_string()), |_| unreachable!());
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(cache.draw_count(), 1);

        cache.get_or_insert_with((13, "S1".to_string()), |(z, name)| format!("{name}@{z}"));
        assert_eq!(cache.draw_count(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn invalidating_one_level() {
        let mut cache: StyleCache<(u8, String), usize> = StyleCache::new();
        for z in [10, 11, 11, 12] {
            cache.get_or_insert_with((z, format!("{z}")), |_| 0);
        }
        assert_eq!(cache.retain(|(z, _)| *z != 11), 1);
        assert!(cache.get(&(11, "11".to_string())).is_none());
        assert!(cache.get(&(12, "12".to_string())).is_some());

        cache.clear();
        assert!(cache.is_empty());
    }
}
