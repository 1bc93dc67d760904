use std::collections::HashMap;

use super::info_hash::InfoHash;

/// Human-readable labels for the deletion-reason codes the control plane
/// accepts on `delete_torrent`, mirroring the upstream site's error-code
/// table so a reaped cache entry reads sensibly in logs.
pub fn del_reason_label(code: i32) -> &'static str {
    match code {
        1 => "Dupe",
        2 => "Trump",
        3 => "Bad File Names",
        4 => "Bad Folder Names",
        5 => "Bad Tags",
        6 => "Bad Format",
        7 => "Disc(s) Missing",
        8 => "Incomplete",
        9 => "Missing Screenshots",
        10 => "Inferior Encode",
        11 => "Other",
        12 => "Specified Bitrate Missing From Description",
        13 => "Invalid Bitrate Description",
        14 => "No Encode Info",
        15 => "Wrong Format",
        16 => "Wrong Media",
        17 => "Wrong Log",
        18 => "Deleted by Uploader",
        19 => "Transcode of Lossy Source",
        20 => "Possible Trump",
        21 => "Cassette Approval Request Denied",
        22 => "Edition Exists",
        23 => "Source Inaccuracy",
        24 => "Track Naming Inaccuracy",
        25 => "Wrong Torrent Format",
        26 => "No Encode Info Present In Log",
        27 => "Missing Required Info",
        _ => "Unknown",
    }
}

struct Entry {
    code: i32,
    stashed_at: i64,
}

pub struct DelReasons(HashMap<InfoHash, Entry>);

impl DelReasons {
    pub fn new() -> DelReasons {
        DelReasons(HashMap::new())
    }

    pub fn insert(&mut self, info_hash: InfoHash, code: i32, now: i64) {
        self.0.insert(info_hash, Entry { code, stashed_at: now });
    }

    pub fn get(&self, info_hash: &InfoHash) -> Option<i32> {
        self.0.get(info_hash).map(|e| e.code)
    }

    /// Drops every entry older than `lifetime` seconds, returning how many
    /// were swept.
    pub fn sweep(&mut self, now: i64, lifetime: i64) -> usize {
        let before = self.0.len();
        self.0.retain(|_, entry| now - entry.stashed_at < lifetime);
        before - self.0.len()
    }
}

impl Default for DelReasons {
    fn default() -> Self {
        DelReasons::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sweep_drops_only_expired_entries() {
        let mut cache = DelReasons::new();
        cache.insert(InfoHash([1; 20]), 1, 0);
        cache.insert(InfoHash([2; 20]), 2, 90_000);

        let dropped = cache.sweep(90_100, 86_400);
        assert_eq!(dropped, 1);
        assert_eq!(cache.get(&InfoHash([1; 20])), None);
        assert_eq!(cache.get(&InfoHash([2; 20])), Some(2));
    }

    #[test]
    fn unknown_code_labels_as_unknown() {
        assert_eq!(del_reason_label(999), "Unknown");
        assert_eq!(del_reason_label(1), "Dupe");
    }
}
