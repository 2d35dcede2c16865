//! Signature catalog service
//!
//! Holds the recognized file signatures in priority order and matches byte
//! windows against them. Uses the Aho-Corasick algorithm for O(n+m+z)
//! multi-pattern matching over scan windows.

use crate::domain::entities::{
    Category, Classification, Endian, FieldWidth, LengthField, SignatureRule,
};
use aho_corasick::AhoCorasick;
use std::collections::BTreeMap;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;

/// Rules whose header starts at one offset of a buffer
#[derive(Debug, Clone)]
pub struct HeaderHit<'a> {
    /// Offset of the file start within the searched buffer
    pub offset: usize,
    /// Matching rules, highest priority first
    pub rules: Vec<&'a SignatureRule>,
}

/// Static, read-only table of signature rules
///
/// Rules are kept sorted by priority: more specific rules (more signature
/// bytes) before generic ones, ties broken by registration order.
///
/// # Example
///
/// ```
/// use salvage::domain::entities::Category;
/// use salvage::domain::services::SignatureCatalog;
///
/// let catalog = SignatureCatalog::default_catalog();
/// let hit = catalog.classify(&[0xFF, 0xD8, 0xFF, 0xE0]).unwrap();
/// assert_eq!(hit.category, Category::Images);
/// assert_eq!(hit.rule_id, "jpeg-jfif");
/// ```
#[derive(Debug)]
pub struct SignatureCatalog {
    rules: Vec<SignatureRule>,
    /// Aho-Corasick automaton over the distinct header patterns
    matcher: Option<AhoCorasick>,
    /// Maps pattern index to the rules sharing that header
    pattern_rules: Vec<Vec<usize>>,
    max_span: usize,
}

impl SignatureCatalog {
    /// Builds a catalog from rules in registration order
    pub fn new(rules: Vec<SignatureRule>) -> Self {
        let mut rules: Vec<SignatureRule> =
            rules.into_iter().filter(|r| !r.header().is_empty()).collect();
        // stable: equal specificity keeps registration order
        rules.sort_by(|a, b| b.specificity().cmp(&a.specificity()));

        let mut patterns: Vec<Vec<u8>> = Vec::new();
        let mut pattern_rules: Vec<Vec<usize>> = Vec::new();
        for (index, rule) in rules.iter().enumerate() {
            match patterns.iter().position(|p| p.as_slice() == rule.header()) {
                Some(pattern) => pattern_rules[pattern].push(index),
                None => {
                    patterns.push(rule.header().to_vec());
                    pattern_rules.push(vec![index]);
                }
            }
        }

        let matcher = if patterns.is_empty() {
            None
        } else {
            AhoCorasick::new(&patterns).ok()
        };
        let max_span = rules.iter().map(SignatureRule::span).max().unwrap_or(0);

        Self {
            rules,
            matcher,
            pattern_rules,
            max_span,
        }
    }

    /// Creates a catalog with the built-in signatures
    pub fn default_catalog() -> Self {
        Self::new(default_rules())
    }

    /// Returns a catalog restricted to the given categories
    pub fn with_categories(&self, categories: &[Category]) -> Self {
        Self::new(
            self.rules
                .iter()
                .filter(|r| categories.contains(&r.category()))
                .cloned()
                .collect(),
        )
    }

    /// Rules in priority order
    pub fn rules(&self) -> &[SignatureRule] {
        &self.rules
    }

    pub fn rule(&self, id: &str) -> Option<&SignatureRule> {
        self.rules.iter().find(|r| r.id() == id)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Bytes from a file start needed to evaluate every rule
    pub fn max_span(&self) -> usize {
        self.max_span
    }

    /// Classifies a window that starts at a candidate file start
    ///
    /// Returns the highest-priority matching rule. Pure: the same window
    /// always yields the same answer.
    pub fn classify<'a>(&'a self, window: &[u8]) -> Option<Classification<'a>> {
        self.rules
            .iter()
            .find(|rule| rule.matches_at(window, 0))
            .map(|rule| Classification {
                category: rule.category(),
                rule_id: rule.id(),
            })
    }

    /// Finds every offset in `data` where a file may start
    ///
    /// Hits are sorted by offset; each carries its matching rules in
    /// priority order.
    pub fn find_headers(&self, data: &[u8]) -> Vec<HeaderHit<'_>> {
        let mut by_offset: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        match &self.matcher {
            Some(matcher) => {
                for mat in matcher.find_overlapping_iter(data) {
                    for &index in &self.pattern_rules[mat.pattern().as_usize()] {
                        let rule = &self.rules[index];
                        let Some(start) = mat.start().checked_sub(rule.header_offset()) else {
                            continue;
                        };
                        if rule.matches_at(data, start) {
                            by_offset.entry(start).or_default().push(index);
                        }
                    }
                }
            }
            None => self.find_headers_linear(data, &mut by_offset),
        }

        by_offset
            .into_iter()
            .map(|(offset, mut indices)| {
                indices.sort_unstable();
                indices.dedup();
                HeaderHit {
                    offset,
                    rules: indices.into_iter().map(|i| &self.rules[i]).collect(),
                }
            })
            .collect()
    }

    /// Fallback linear search for when the automaton could not be built
    fn find_headers_linear(&self, data: &[u8], by_offset: &mut BTreeMap<usize, Vec<usize>>) {
        for start in 0..data.len() {
            for (index, rule) in self.rules.iter().enumerate() {
                if rule.matches_at(data, start) {
                    by_offset.entry(start).or_default().push(index);
                }
            }
        }
    }
}

impl Default for SignatureCatalog {
    fn default() -> Self {
        Self::default_catalog()
    }
}

fn riff_length() -> LengthField {
    LengthField {
        offset: 4,
        width: FieldWidth::U32,
        endian: Endian::Little,
        adjust: 8,
    }
}

/// The built-in signature table
pub fn default_rules() -> Vec<SignatureRule> {
    let jpeg_eoi = vec![0xFF, 0xD9];

    vec![
        // Images
        SignatureRule::new("jpeg-jfif", Category::Images, "jpg", vec![0xFF, 0xD8, 0xFF, 0xE0], 50 * MB)
            .with_footer(jpeg_eoi.clone())
            .with_min_size(128),
        SignatureRule::new("jpeg-exif", Category::Images, "jpg", vec![0xFF, 0xD8, 0xFF, 0xE1], 50 * MB)
            .with_footer(jpeg_eoi.clone())
            .with_min_size(128),
        SignatureRule::new("jpeg", Category::Images, "jpg", vec![0xFF, 0xD8, 0xFF], 50 * MB)
            .with_footer(jpeg_eoi)
            .with_min_size(128),
        SignatureRule::new(
            "png",
            Category::Images,
            "png",
            vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
            100 * MB,
        )
        .expect_at(12, b"IHDR")
        .with_footer(vec![0x49, 0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82])
        .with_min_size(67),
        SignatureRule::new("gif89a", Category::Images, "gif", b"GIF89a".to_vec(), 50 * MB)
            .with_footer(vec![0x00, 0x3B])
            .with_min_size(35),
        SignatureRule::new("gif87a", Category::Images, "gif", b"GIF87a".to_vec(), 50 * MB)
            .with_footer(vec![0x00, 0x3B])
            .with_min_size(35),
        // BM + zeroed reserved words
        SignatureRule::new("bmp", Category::Images, "bmp", b"BM".to_vec(), 100 * MB)
            .expect_at(6, &[0, 0, 0, 0])
            .with_length_field(LengthField {
                offset: 2,
                width: FieldWidth::U32,
                endian: Endian::Little,
                adjust: 0,
            })
            .with_min_size(58),
        SignatureRule::new("tiff-le", Category::Images, "tif", b"II*\0".to_vec(), 20 * MB)
            .with_min_size(64),
        SignatureRule::new("tiff-be", Category::Images, "tif", b"MM\0*".to_vec(), 20 * MB)
            .with_min_size(64),
        SignatureRule::new("webp", Category::Images, "webp", b"RIFF".to_vec(), 100 * MB)
            .expect_at(8, b"WEBP")
            .with_length_field(riff_length())
            .with_min_size(26),
        // Documents
        SignatureRule::new("pdf", Category::Documents, "pdf", b"%PDF-".to_vec(), 200 * MB)
            .with_footer(b"%%EOF".to_vec())
            .with_min_size(64),
        // end of central directory record is 22 bytes without a comment
        SignatureRule::new("zip", Category::Documents, "zip", vec![0x50, 0x4B, 0x03, 0x04], 200 * MB)
            .with_footer_trailer(vec![0x50, 0x4B, 0x05, 0x06], 18)
            .with_min_size(44),
        SignatureRule::new("rtf", Category::Documents, "rtf", b"{\\rtf1".to_vec(), 10 * MB)
            .with_footer(b"}\0".to_vec())
            .with_min_size(16),
        SignatureRule::new(
            "ole2",
            Category::Documents,
            "doc",
            vec![0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
            10 * MB,
        )
        .with_min_size(512),
        // Videos
        SignatureRule::new("mp4", Category::Videos, "mp4", b"ftyp".to_vec(), 4096 * MB)
            .with_header_offset(4)
            .with_box_chain()
            .with_min_size(32),
        SignatureRule::new("avi", Category::Videos, "avi", b"RIFF".to_vec(), 4096 * MB)
            .expect_at(8, b"AVI ")
            .with_length_field(riff_length())
            .with_min_size(64),
        SignatureRule::new("mkv", Category::Videos, "mkv", vec![0x1A, 0x45, 0xDF, 0xA3], 64 * MB)
            .with_min_size(64),
        // Audios
        SignatureRule::new("wav", Category::Audios, "wav", b"RIFF".to_vec(), 4096 * MB)
            .expect_at(8, b"WAVE")
            .with_length_field(riff_length())
            .with_min_size(44),
        SignatureRule::new("flac", Category::Audios, "flac", b"fLaC".to_vec(), 64 * MB)
            .with_min_size(42),
        SignatureRule::new("ogg", Category::Audios, "ogg", b"OggS".to_vec(), 32 * MB)
            .expect_at(4, &[0x00])
            .with_min_size(58),
        SignatureRule::new("mp3-id3", Category::Audios, "mp3", b"ID3".to_vec(), 16 * MB)
            .with_min_size(128),
        // Other
        SignatureRule::new("sqlite", Category::Other, "sqlite", b"SQLite format 3\0".to_vec(), 64 * MB)
            .with_min_size(512),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_prefers_specific_rules() {
        let catalog = SignatureCatalog::default_catalog();
        let position = |id: &str| catalog.rules().iter().position(|r| r.id() == id).unwrap();

        assert!(position("jpeg-jfif") < position("jpeg"));
        assert!(position("jpeg-exif") < position("jpeg"));
        assert!(position("png") < position("jpeg"));
    }

    #[test]
    fn test_shared_headers_are_split_by_expected_bytes() {
        let catalog = SignatureCatalog::default_catalog();

        let wav = catalog.classify(b"RIFF\x24\0\0\0WAVEfmt ").unwrap();
        assert_eq!(wav.rule_id, "wav");
        assert_eq!(wav.category, Category::Audios);

        let avi = catalog.classify(b"RIFF\x24\0\0\0AVI LIST").unwrap();
        assert_eq!(avi.rule_id, "avi");
        assert_eq!(avi.category, Category::Videos);

        assert!(catalog.classify(b"RIFF\x24\0\0\0XXXXLIST").is_none());
    }

    #[test]
    fn test_find_headers_applies_header_offset() {
        let catalog = SignatureCatalog::default_catalog();
        let mut data = vec![0u8; 16];
        data.extend_from_slice(b"\0\0\0\x20ftypisom");

        let hits = catalog.find_headers(&data);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].offset, 16);
        assert_eq!(hits[0].rules[0].id(), "mp4");
    }

    #[test]
    fn test_find_headers_groups_rules_per_offset() {
        let catalog = SignatureCatalog::default_catalog();
        let hits = catalog.find_headers(&[0x00, 0xFF, 0xD8, 0xFF, 0xE1, 0x00]);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].offset, 1);
        let ids: Vec<_> = hits[0].rules.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["jpeg-exif", "jpeg"]);
    }

    #[test]
    fn test_with_categories() {
        let catalog = SignatureCatalog::default_catalog().with_categories(&[Category::Audios]);
        assert!(catalog.rules().iter().all(|r| r.category() == Category::Audios));
        assert!(catalog.classify(&[0xFF, 0xD8, 0xFF, 0xE0]).is_none());
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = SignatureCatalog::new(Vec::new());
        assert!(catalog.is_empty());
        assert!(catalog.find_headers(b"GIF89a").is_empty());
        assert_eq!(catalog.max_span(), 0);
    }
}
