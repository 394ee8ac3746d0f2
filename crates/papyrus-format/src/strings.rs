//! String interner — spec §3 "Interned string (TString)" and §4.2 "String table".

use crate::error::{DecodeError, FormatError};
use papyrus_codec::Cursor;
use std::collections::HashMap;
use std::sync::Arc;

/// A case-insensitive, interned string. Equality and hashing are always by
/// case-folded content; an indexed `TString` additionally remembers its slot
/// in the owning `StringTable` so round-tripping can assert it reads back to
/// the same index (spec §3 global invariant: "TStrings read back to the same
/// index they were read from").
#[derive(Debug, Clone)]
pub struct TString {
    text: Arc<str>,
    folded: Arc<str>,
    index: Option<u32>,
}

impl TString {
    fn new(text: impl Into<Arc<str>>, index: Option<u32>) -> Self {
        let text = text.into();
        let folded = text.to_lowercase().into();
        Self { text, folded, index }
    }

    /// The original-case text.
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// This string's index in its owning table, if it was read from one.
    pub fn index(&self) -> Option<u32> {
        self.index
    }
}

impl PartialEq for TString {
    fn eq(&self, other: &Self) -> bool {
        match (self.index, other.index) {
            (Some(a), Some(b)) => a == b,
            _ => self.folded == other.folded,
        }
    }
}

impl Eq for TString {}

impl std::hash::Hash for TString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        // Hashing by folded content stays consistent with `eq`: two
        // indexed strings only ever share an index if the table deduped
        // them on identical folded content in the first place.
        self.folded.hash(state);
    }
}

impl std::fmt::Display for TString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// Whether string-table indices are encoded as 16-bit or 32-bit values —
/// dictated by game variant (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexWidth {
    /// 16-bit indices, with the legacy 0xFFFF escape to a following u32 count.
    Narrow,
    /// 32-bit indices throughout.
    Wide,
}

/// A growing table of interned strings plus a case-folded lookup side-table.
#[derive(Debug, Default)]
pub struct StringTable {
    entries: Vec<Arc<str>>,
    by_folded: HashMap<Arc<str>, u32>,
    /// Declared count read from the stream (may exceed `entries.len()` if truncated).
    declared: u32,
    /// Set when a short read left fewer strings than declared.
    pub truncated: bool,
    /// Set when the historical "string-table bug" (STB) was detected — the
    /// table becomes read-only and the auditor must classify the save as
    /// unrecoverable.
    pub string_table_bug: bool,
    index_width: IndexWidth,
}

impl StringTable {
    /// Creates an empty table with the given index width.
    pub fn new(index_width: IndexWidth) -> Self {
        Self {
            entries: Vec::new(),
            by_folded: HashMap::new(),
            declared: 0,
            truncated: false,
            string_table_bug: false,
            index_width,
        }
    }

    /// Number of strings actually present.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if no strings are present.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declared count minus strings actually present.
    pub fn missing_count(&self) -> u32 {
        self.declared.saturating_sub(self.entries.len() as u32)
    }

    /// Fetches a `TString` by index, or `None` if out of range.
    pub fn get(&self, index: u32) -> Option<TString> {
        self.entries.get(index as usize).map(|text| TString::new(text.clone(), Some(index)))
    }

    /// Interns `s`, deduping on case-folded content. Returns the canonical
    /// `TString` handle (amortized O(1) via the lookup side-table).
    pub fn intern(&mut self, s: &str) -> TString {
        let folded: Arc<str> = s.to_lowercase().into();
        if let Some(&idx) = self.by_folded.get(&folded) {
            return self.get(idx).expect("interned index must be present");
        }
        let text: Arc<str> = s.into();
        let idx = self.entries.len() as u32;
        self.entries.push(text.clone());
        self.by_folded.insert(folded, idx);
        self.declared = self.declared.max(idx + 1);
        TString::new(text, Some(idx))
    }

    /// Reads a string-table index off the wire, honoring the width discipline
    /// of `index_width` (including the 0xFFFF escape to a 32-bit index, which
    /// applies to indices the same way it applies to the table's count,
    /// except when the table is in string-table-bug mode).
    pub fn read_index(&self, cursor: &mut Cursor<'_>) -> Result<u32, DecodeError> {
        match self.index_width {
            IndexWidth::Wide => Ok(cursor.read_u32("string index")?),
            IndexWidth::Narrow => {
                let narrow = cursor.read_u16("string index")?;
                if narrow == 0xFFFF && !self.string_table_bug {
                    Ok(cursor.read_u32("string index (wide escape)")?)
                } else {
                    Ok(u32::from(narrow))
                }
            }
        }
    }

    /// Decodes the string table itself (spec §4.2): a length prefix whose
    /// width depends on `index_width`, with the 0xFFFF escape to a 32-bit
    /// count, and the STB special case for the known game/count combinations
    /// the caller has already identified via `force_string_table_bug`.
    pub fn decode(
        cursor: &mut Cursor<'_>,
        index_width: IndexWidth,
        force_string_table_bug: bool,
    ) -> Result<Self, DecodeError> {
        let mut table = StringTable::new(index_width);

        let mut count: u64 = match index_width {
            IndexWidth::Wide => u64::from(cursor.read_u32("string table count")?),
            IndexWidth::Narrow => {
                let narrow = cursor.read_u16("string table count")?;
                if narrow == 0xFFFF {
                    u64::from(cursor.read_u32("string table count (wide escape)")?)
                } else {
                    u64::from(narrow)
                }
            }
        };

        if force_string_table_bug {
            count |= 0x1_0000;
            table.string_table_bug = true;
        }

        table.declared = u32::try_from(count).unwrap_or(u32::MAX);

        for _ in 0..count {
            let bytes = match cursor.read_wstring_bytes("string table entry") {
                Ok(b) => b,
                Err(_) => {
                    table.truncated = true;
                    break;
                }
            };
            let text = std::str::from_utf8(bytes)
                .map_err(|_| FormatError::new("string table entry", "invalid UTF-8"))?;
            table.intern(text);
        }

        Ok(table)
    }

    /// Writes a single string-table index, honoring the same width
    /// discipline and 0xFFFF escape as `read_index`. `ts` must have come
    /// from this table (or one with an identical index assignment) — the
    /// encoder never re-interns on write.
    pub fn write_index(&self, writer: &mut papyrus_codec::Writer, ts: &TString) {
        let idx = ts.index().unwrap_or(0);
        match self.index_width {
            IndexWidth::Wide => writer.write_u32(idx),
            IndexWidth::Narrow => {
                if idx < 0xFFFF {
                    writer.write_u16(idx as u16);
                } else {
                    writer.write_u16(0xFFFF);
                    writer.write_u32(idx);
                }
            }
        }
    }

    /// Byte size of writing a single index for `ts`, honoring the same
    /// width discipline and 0xFFFF escape as `write_index`/`read_index`
    /// (spec §4.4 "for every sub-component that exposes a size").
    pub fn index_size(&self, ts: &TString) -> usize {
        let idx = ts.index().unwrap_or(0);
        match self.index_width {
            IndexWidth::Wide => 4,
            IndexWidth::Narrow => {
                if idx < 0xFFFF {
                    2
                } else {
                    2 + 4
                }
            }
        }
    }

    /// Byte size of re-encoding this table in full (count prefix plus every
    /// w-string entry), independent of `encode` so the re-encoder's
    /// `bytes_written == calculate_size()` assertion is meaningful.
    pub fn encoded_size(&self) -> usize {
        let count_size = match self.index_width {
            IndexWidth::Wide => 4,
            IndexWidth::Narrow => {
                if self.entries.len() < 0xFFFF {
                    2
                } else {
                    2 + 4
                }
            }
        };
        let entries_size: usize = self.entries.iter().map(|s| 2 + s.len()).sum();
        count_size + entries_size
    }

    /// Re-encodes the table. A no-op semantically unless new strings were
    /// added after load: the bytes written always reflect the table's
    /// current contents, not the originally-declared count.
    pub fn encode(&self, writer: &mut papyrus_codec::Writer) {
        match self.index_width {
            IndexWidth::Wide => writer.write_u32(self.entries.len() as u32),
            IndexWidth::Narrow => {
                if self.entries.len() < 0xFFFF {
                    writer.write_u16(self.entries.len() as u16);
                } else {
                    writer.write_u16(0xFFFF);
                    writer.write_u32(self.entries.len() as u32);
                }
            }
        }
        for s in &self.entries {
            writer.write_wstring(s.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_idempotent() {
        let mut t = StringTable::new(IndexWidth::Wide);
        let a = t.intern("Hello");
        let b = t.intern("hello");
        assert_eq!(a, b);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn get_after_intern_matches_modulo_case() {
        let mut t = StringTable::new(IndexWidth::Wide);
        let handle = t.intern("Quest01");
        let fetched = t.get(handle.index().unwrap()).unwrap();
        assert_eq!(fetched, handle);
        assert_eq!(fetched.as_str(), "Quest01");
    }

    #[test]
    fn missing_count_reflects_declared_vs_present() {
        let mut t = StringTable::new(IndexWidth::Wide);
        t.declared = 5;
        t.intern("a");
        t.intern("b");
        assert_eq!(t.missing_count(), 3);
    }

    #[test]
    fn truncated_table_sets_flag_and_keeps_partial_entries() {
        // declared count = 5, but only enough bytes for one wstring entry.
        let mut w = papyrus_codec::Writer::new();
        w.write_u32(5);
        w.write_wstring(b"first");
        let mut cursor = Cursor::new(w.as_slice());
        let table = StringTable::decode(&mut cursor, IndexWidth::Wide, false).unwrap();
        assert!(table.truncated);
        assert_eq!(table.len(), 1);
        assert_eq!(table.missing_count(), 4);
    }
}
