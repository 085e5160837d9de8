use std::cmp::Reverse;
use std::collections::BTreeMap;

/// Ids ordered newest first; ties keep the latest insertion first.
#[derive(Debug, Default)]
pub struct TimestampIndex {
    entries: BTreeMap<Reverse<i64>, Vec<String>>,
}

impl TimestampIndex {
    pub fn insert(&mut self, timestamp: i64, id: &str) {
        self.entries
            .entry(Reverse(timestamp))
            .or_default()
            .push(id.to_string());
    }

    pub fn remove(&mut self, timestamp: i64, id: &str) {
        if let Some(ids) = self.entries.get_mut(&Reverse(timestamp)) {
            ids.retain(|existing| existing != id);
            if ids.is_empty() {
                self.entries.remove(&Reverse(timestamp));
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn newest_first(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries
            .values()
            .flat_map(|ids| ids.iter().rev().map(String::as_str))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orders_by_timestamp_then_insertion() {
        let mut index = TimestampIndex::default();
        index.insert(10, "a");
        index.insert(30, "b");
        index.insert(10, "c");
        index.insert(20, "d");

        let ids: Vec<&str> = index.newest_first().collect();
        assert_eq!(ids, vec!["b", "d", "c", "a"]);
    }

    #[test]
    fn remove_drops_empty_buckets() {
        let mut index = TimestampIndex::default();
        index.insert(10, "a");
        index.remove(10, "a");
        index.remove(99, "missing");
        assert_eq!(index.newest_first().count(), 0);
        assert!(index.entries.is_empty());
    }
}
