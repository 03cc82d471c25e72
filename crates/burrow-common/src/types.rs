//! Record identifiers and attribute type tags.

use crate::page::PageNo;
use serde::{Deserialize, Serialize};

/// Unique identifier for a record within a relation file.
///
/// Combines the page number with a slot number inside that page. Orders
/// by file position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RecordId {
    /// Page containing this record.
    pub page_no: PageNo,
    /// Slot number within the page.
    pub slot_no: u16,
}

impl RecordId {
    /// Creates a new record ID.
    pub fn new(page_no: PageNo, slot_no: u16) -> Self {
        Self { page_no, slot_no }
    }

    /// Invalid record ID.
    pub const INVALID: RecordId = RecordId {
        page_no: 0,
        slot_no: u16::MAX,
    };

    /// Returns true if this is a valid record ID.
    pub fn is_valid(&self) -> bool {
        self.page_no != 0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_no, self.slot_no)
    }
}

/// Domain of an indexed attribute.
///
/// Recorded in the index meta page; the operational insert and scan paths
/// support `Integer` only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttrType {
    /// 4-byte signed integer.
    Integer = 0,
    /// 8-byte IEEE double.
    Double = 1,
    /// Fixed-width character string.
    String = 2,
}

impl AttrType {
    /// Decodes an attribute type from its on-disk tag.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(AttrType::Integer),
            1 => Some(AttrType::Double),
            2 => Some(AttrType::String),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_new() {
        let rid = RecordId::new(3, 7);
        assert_eq!(rid.page_no, 3);
        assert_eq!(rid.slot_no, 7);
        assert!(rid.is_valid());
    }

    #[test]
    fn test_record_id_invalid() {
        assert!(!RecordId::INVALID.is_valid());
    }

    #[test]
    fn test_record_id_display() {
        assert_eq!(RecordId::new(12, 4).to_string(), "12:4");
    }

    #[test]
    fn test_record_id_serde_roundtrip() {
        let original = RecordId::new(99, 2);
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: RecordId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_attr_type_tags() {
        assert_eq!(AttrType::Integer as u32, 0);
        assert_eq!(AttrType::Double as u32, 1);
        assert_eq!(AttrType::String as u32, 2);
    }

    #[test]
    fn test_attr_type_from_u32() {
        assert_eq!(AttrType::from_u32(0), Some(AttrType::Integer));
        assert_eq!(AttrType::from_u32(1), Some(AttrType::Double));
        assert_eq!(AttrType::from_u32(2), Some(AttrType::String));
        assert_eq!(AttrType::from_u32(3), None);
    }
}
