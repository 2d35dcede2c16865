//! File signature entity
//!
//! Represents the magic bytes (header, optional fixed-offset checks and an
//! end marker) that identify a file type. This is the foundation of carving.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Closed set of categories exposed to consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Images,
    Documents,
    Videos,
    Audios,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Images,
        Category::Documents,
        Category::Videos,
        Category::Audios,
        Category::Other,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Images => "images",
            Category::Documents => "documents",
            Category::Videos => "videos",
            Category::Audios => "audios",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "images" | "image" => Ok(Category::Images),
            "documents" | "document" | "docs" => Ok(Category::Documents),
            "videos" | "video" => Ok(Category::Videos),
            "audios" | "audio" => Ok(Category::Audios),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category '{other}'")),
        }
    }
}

/// Byte order of an embedded length field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

/// Width of an embedded length field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidth {
    U16,
    U32,
    U64,
}

impl FieldWidth {
    pub fn bytes(&self) -> usize {
        match self {
            FieldWidth::U16 => 2,
            FieldWidth::U32 => 4,
            FieldWidth::U64 => 8,
        }
    }
}

/// A size recorded inside the file header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LengthField {
    /// Offset of the field from the start of the file
    pub offset: u64,
    pub width: FieldWidth,
    pub endian: Endian,
    /// Added to the decoded value to obtain the total file size
    pub adjust: u64,
}

/// How the end of a candidate file is located
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndRule {
    /// Search forward for a footer; `trailer` bytes follow the footer
    Footer { bytes: Vec<u8>, trailer: u64 },
    /// Decode the size from a header field
    Length(LengthField),
    /// Walk a chain of ISO base media boxes (size + four-char type)
    BoxChain,
    /// No end marker: take the maximum plausible size
    MaxSize,
}

/// A rule identifying one file type
#[derive(Debug, Clone)]
pub struct SignatureRule {
    id: String,
    category: Category,
    extension: String,
    header: Vec<u8>,
    /// Offset from the start of the file where the header appears
    header_offset: usize,
    /// Additional bytes expected at fixed offsets from the start
    expected: Vec<(usize, Vec<u8>)>,
    end: EndRule,
    min_size: u64,
    max_size: u64,
}

impl SignatureRule {
    /// Creates a rule with no end marker and a size window of `1..=max_size`
    pub fn new(
        id: impl Into<String>,
        category: Category,
        extension: impl Into<String>,
        header: Vec<u8>,
        max_size: u64,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            extension: extension.into(),
            header,
            header_offset: 0,
            expected: Vec::new(),
            end: EndRule::MaxSize,
            min_size: 1,
            max_size,
        }
    }

    pub fn with_footer(mut self, footer: Vec<u8>) -> Self {
        self.end = EndRule::Footer {
            bytes: footer,
            trailer: 0,
        };
        self
    }

    /// Footer followed by `trailer` bytes that still belong to the file
    pub fn with_footer_trailer(mut self, footer: Vec<u8>, trailer: u64) -> Self {
        self.end = EndRule::Footer {
            bytes: footer,
            trailer,
        };
        self
    }

    pub fn with_length_field(mut self, field: LengthField) -> Self {
        self.end = EndRule::Length(field);
        self
    }

    pub fn with_box_chain(mut self) -> Self {
        self.end = EndRule::BoxChain;
        self
    }

    pub fn with_header_offset(mut self, offset: usize) -> Self {
        self.header_offset = offset;
        self
    }

    pub fn expect_at(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.expected.push((offset, bytes.to_vec()));
        self
    }

    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size.max(1);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn header(&self) -> &[u8] {
        &self.header
    }

    pub fn header_offset(&self) -> usize {
        self.header_offset
    }

    pub fn end(&self) -> &EndRule {
        &self.end
    }

    pub fn min_size(&self) -> u64 {
        self.min_size
    }

    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Number of signature bytes checked; longer signatures are more specific
    pub fn specificity(&self) -> usize {
        self.header.len() + self.expected.iter().map(|(_, b)| b.len()).sum::<usize>()
    }

    /// Bytes from the file start needed to evaluate the rule
    pub fn span(&self) -> usize {
        let header_end = self.header_offset + self.header.len();
        let expected_end = self
            .expected
            .iter()
            .map(|(offset, bytes)| offset + bytes.len())
            .max()
            .unwrap_or(0);
        header_end.max(expected_end)
    }

    /// Checks the header and fixed-offset bytes of a file starting at `start`
    pub fn matches_at(&self, data: &[u8], start: usize) -> bool {
        let header_at = start + self.header_offset;
        let Some(window) = data.get(header_at..header_at + self.header.len()) else {
            return false;
        };
        if window != self.header.as_slice() {
            return false;
        }

        self.expected.iter().all(|(offset, bytes)| {
            let at = start + offset;
            data.get(at..at + bytes.len()) == Some(bytes.as_slice())
        })
    }
}

/// Result of classifying a byte window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    pub category: Category,
    pub rule_id: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_at_with_expected_bytes() {
        let rule = SignatureRule::new("wav", Category::Audios, "wav", b"RIFF".to_vec(), 1024)
            .expect_at(8, b"WAVE");

        assert!(rule.matches_at(b"RIFF\x10\0\0\0WAVEfmt ", 0));
        assert!(!rule.matches_at(b"RIFF\x10\0\0\0AVI LIST", 0));
        assert!(!rule.matches_at(b"RIFF", 0));
        assert_eq!(rule.span(), 12);
        assert_eq!(rule.specificity(), 8);
    }

    #[test]
    fn test_header_offset_shifts_match() {
        let rule = SignatureRule::new("mp4", Category::Videos, "mp4", b"ftyp".to_vec(), 1024)
            .with_header_offset(4);

        assert!(rule.matches_at(b"\0\0\0\x18ftypisom", 0));
        assert!(!rule.matches_at(b"ftypisom", 0));
    }

    #[test]
    fn test_category_parse() {
        assert_eq!("Images".parse::<Category>(), Ok(Category::Images));
        assert_eq!("audio".parse::<Category>(), Ok(Category::Audios));
        assert!("music".parse::<Category>().is_err());
    }
}
