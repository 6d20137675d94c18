//! The ready-to-run header: the runtime's directory of this unit's tables.
//!
//! # Layout
//!
//! ```text
//! u32 magic ('RTR\0')   u16 major   u16 minor   u32 flags
//! u16 section count     u8 entry size           u8 entry type (1 = pointers)
//! per section, ascending by id:
//!   u32 id   u32 flags   ptr start   ptr end (zero when the section is unbounded)
//! ```

use std::collections::BTreeMap;

use crate::emit::{ObjectData, ObjectDataBuilder};
use crate::error::InternalError;
use crate::node::NodeId;

pub const READY_TO_RUN_MAGIC: u32 = 0x0052_5452;
pub const READY_TO_RUN_MAJOR_VERSION: u16 = 2;
pub const READY_TO_RUN_MINOR_VERSION: u16 = 0;

const ENTRY_TYPE_POINTERS: u8 = 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReadyToRunSectionType {
    GcStaticRegion,
    ThreadStaticRegion,
    TypeManagerIndirection,
    EagerCctor,
    GcStaticDesc,
    ThreadStaticOffsetRegion,
    ThreadStaticGcDescRegion,
    ThreadStaticIndex,
    EmbeddedMetadata,
}

impl ReadyToRunSectionType {
    /// Id the runtime looks the section up by.
    #[must_use]
    pub fn id(self) -> u32 {
        match self {
            Self::GcStaticRegion => 201,
            Self::ThreadStaticRegion => 202,
            Self::TypeManagerIndirection => 204,
            Self::EagerCctor => 205,
            Self::GcStaticDesc => 207,
            Self::ThreadStaticOffsetRegion => 208,
            Self::ThreadStaticGcDescRegion => 209,
            Self::ThreadStaticIndex => 210,
            Self::EmbeddedMetadata => 300,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderEntry {
    pub node: NodeId,
    pub start_symbol: String,
    pub end_symbol: Option<String>,
}

/// Section tag → table. Filled once when the factory attaches to the graph.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HeaderTable {
    entries: BTreeMap<ReadyToRunSectionType, HeaderEntry>,
}

impl HeaderTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        section: ReadyToRunSectionType,
        node: NodeId,
        start_symbol: impl Into<String>,
        end_symbol: Option<String>,
    ) -> Result<(), InternalError> {
        if self.entries.contains_key(&section) {
            return Err(InternalError::DuplicateHeaderSection { section });
        }
        self.entries.insert(
            section,
            HeaderEntry {
                node,
                start_symbol: start_symbol.into(),
                end_symbol,
            },
        );
        Ok(())
    }

    pub fn get(&self, section: ReadyToRunSectionType) -> Option<&HeaderEntry> {
        self.entries.get(&section)
    }

    /// Entries ordered by section id.
    pub fn entries(&self) -> impl Iterator<Item = (ReadyToRunSectionType, &HeaderEntry)> {
        self.entries.iter().map(|(&section, entry)| (section, entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn serialize(&self, pointer_size: u32) -> ObjectData {
        let mut b = ObjectDataBuilder::new(pointer_size, pointer_size);
        b.emit_u32(READY_TO_RUN_MAGIC);
        b.emit_u16(READY_TO_RUN_MAJOR_VERSION);
        b.emit_u16(READY_TO_RUN_MINOR_VERSION);
        b.emit_u32(0);
        b.emit_u16(u16::try_from(self.entries.len()).unwrap_or(u16::MAX));
        b.emit_u8(u8::try_from(8 + 2 * pointer_size).unwrap_or(u8::MAX));
        b.emit_u8(ENTRY_TYPE_POINTERS);

        for (section, entry) in self.entries() {
            b.emit_u32(section.id());
            b.emit_u32(0);
            b.emit_pointer_reloc(entry.start_symbol.clone());
            match &entry.end_symbol {
                Some(end) => b.emit_pointer_reloc(end.clone()),
                None => b.emit_zero_pointer(),
            }
        }
        b.finish()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests {
    use super::*;
    use crate::emit::RelocKind;
    use crate::node::{NodeArena, NodeKind};
    use pretty_assertions::assert_eq;

    fn two_nodes() -> (NodeId, NodeId) {
        let arena = NodeArena::new();
        let a = arena.alloc(NodeKind::ThreadStaticsIndex, "_tls_index".into(), None);
        let b = arena.alloc(NodeKind::TypeManagerIndirection, "tmi".into(), None);
        (a, b)
    }

    #[test]
    fn entries_are_ordered_by_section_not_insertion() {
        let (a, b) = two_nodes();
        let mut table = HeaderTable::new();
        table
            .add(ReadyToRunSectionType::ThreadStaticIndex, a, "_tls_index", None)
            .unwrap();
        table
            .add(ReadyToRunSectionType::TypeManagerIndirection, b, "tmi", None)
            .unwrap();
        let order: Vec<_> = table.entries().map(|(s, _)| s).collect();
        assert_eq!(
            order,
            vec![
                ReadyToRunSectionType::TypeManagerIndirection,
                ReadyToRunSectionType::ThreadStaticIndex,
            ]
        );
    }

    #[test]
    fn duplicate_section_is_rejected() {
        let (a, b) = two_nodes();
        let mut table = HeaderTable::new();
        table
            .add(ReadyToRunSectionType::EagerCctor, a, "s", Some("e".into()))
            .unwrap();
        assert_eq!(
            table.add(ReadyToRunSectionType::EagerCctor, b, "s2", None),
            Err(InternalError::DuplicateHeaderSection {
                section: ReadyToRunSectionType::EagerCctor
            })
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn serialized_header_has_fixed_prefix_and_pointer_entries() {
        let (a, b) = two_nodes();
        let mut table = HeaderTable::new();
        table
            .add(ReadyToRunSectionType::GcStaticDesc, a, "start", Some("end".into()))
            .unwrap();
        table
            .add(ReadyToRunSectionType::ThreadStaticIndex, b, "idx", None)
            .unwrap();

        let data = table.serialize(8);
        assert_eq!(&data.bytes[0..4], &READY_TO_RUN_MAGIC.to_le_bytes());
        assert_eq!(&data.bytes[12..14], &2u16.to_le_bytes());
        assert_eq!(data.bytes[14], 24);
        assert_eq!(data.size(), 16 + 2 * 24);

        let targets: Vec<_> = data
            .relocations
            .iter()
            .map(|r| (r.offset, r.kind, r.target.as_str()))
            .collect();
        assert_eq!(
            targets,
            vec![
                (24, RelocKind::Pointer, "start"),
                (32, RelocKind::Pointer, "end"),
                (48, RelocKind::Pointer, "idx"),
            ]
        );
    }
}
