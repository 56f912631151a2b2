use std::collections::VecDeque;

/// How many previous password hashes a principal may not reuse.
pub const PASSWORD_HISTORY_CAPACITY: usize = 3;

/// Fixed-capacity ring of previous password hashes, oldest first.
///
/// Pushing beyond capacity evicts the oldest entry. Persisted as a
/// `TEXT[]` column, so it converts to and from `Vec<String>`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PasswordHistory {
    entries: VecDeque<String>,
}

impl PasswordHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, hash: String) {
        if self.entries.len() == PASSWORD_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(hash);
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

impl From<Vec<String>> for PasswordHistory {
    fn from(hashes: Vec<String>) -> Self {
        // Rows written before a capacity change keep only their newest entries.
        let mut history = PasswordHistory::new();
        for hash in hashes {
            history.push(hash);
        }
        history
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_evicts_oldest_beyond_capacity() {
        let mut history = PasswordHistory::new();
        for hash in ["h1", "h2", "h3", "h4"] {
            history.push(hash.to_string());
        }

        assert_eq!(history.len(), PASSWORD_HISTORY_CAPACITY);
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["h2", "h3", "h4"]);
    }

    #[test]
    fn from_vec_truncates_to_newest() {
        let history = PasswordHistory::from(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "d".to_string(),
            "e".to_string(),
        ]);
        assert_eq!(history.to_vec(), vec!["c", "d", "e"]);
    }

    #[test]
    fn empty_history() {
        let history = PasswordHistory::from(Vec::new());
        assert!(history.is_empty());
    }
}
