/// Ordered sequence of accepted peer-id prefixes. An empty whitelist
/// disables the check entirely (every client passes).
pub struct Whitelist(Vec<Vec<u8>>);

impl Whitelist {
    pub fn new() -> Whitelist {
        Whitelist(Vec::new())
    }

    pub fn from_prefixes(prefixes: Vec<Vec<u8>>) -> Whitelist {
        Whitelist(prefixes)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn allows(&self, peer_id: &[u8]) -> bool {
        self.0.is_empty() || self.0.iter().any(|prefix| peer_id.starts_with(prefix))
    }

    pub fn add(&mut self, prefix: Vec<u8>) {
        self.0.push(prefix);
    }

    pub fn remove(&mut self, prefix: &[u8]) -> bool {
        let before = self.0.len();
        self.0.retain(|p| p.as_slice() != prefix);
        self.0.len() != before
    }

    pub fn edit(&mut self, old: &[u8], new: Vec<u8>) -> bool {
        match self.0.iter_mut().find(|p| p.as_slice() == old) {
            Some(slot) => {
                *slot = new;
                true
            }
            None => false,
        }
    }
}

impl Default for Whitelist {
    fn default() -> Self {
        Whitelist::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_whitelist_allows_everything() {
        let wl = Whitelist::new();
        assert!(wl.allows(b"anything at all"));
    }

    #[test]
    fn nonempty_whitelist_requires_prefix_match() {
        let wl = Whitelist::from_prefixes(vec![b"-TR".to_vec()]);
        assert!(wl.allows(b"-TR2940-abcdefghijkl"));
        assert!(!wl.allows(b"-UT3530-abcdefghijkl"));
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let mut wl = Whitelist::from_prefixes(vec![b"-TR".to_vec()]);
        assert!(wl.remove(b"-TR"));
        assert!(!wl.remove(b"-TR"));
    }
}
