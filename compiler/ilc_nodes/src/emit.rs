//! Data payloads of the nodes this crate owns.
//!
//! Code bodies come from the code generator; everything table-shaped is
//! produced here as bytes plus relocations against other nodes' symbols.

use ilc_ir::StaticsLayout;

use crate::error::CompileError;
use crate::factory::NodeFactory;
use crate::node::{NodeId, NodeKind};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RelocKind {
    /// Absolute pointer-sized address.
    Pointer,
    /// 32-bit offset of the target from the start of its section.
    SectionRelative32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relocation {
    pub offset: u32,
    pub kind: RelocKind,
    pub target: String,
}

/// Bytes of one data node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectData {
    pub bytes: Vec<u8>,
    pub relocations: Vec<Relocation>,
    pub alignment: u32,
}

impl ObjectData {
    /// Size in bytes; tables are far below 4 GiB.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Little-endian writer for [`ObjectData`].
pub struct ObjectDataBuilder {
    pointer_size: u32,
    data: ObjectData,
}

impl ObjectDataBuilder {
    #[must_use]
    pub fn new(pointer_size: u32, alignment: u32) -> Self {
        Self {
            pointer_size,
            data: ObjectData {
                bytes: Vec::new(),
                relocations: Vec::new(),
                alignment,
            },
        }
    }

    pub fn emit_u8(&mut self, value: u8) {
        self.data.bytes.push(value);
    }

    pub fn emit_u16(&mut self, value: u16) {
        self.data.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.data.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.data.bytes.extend_from_slice(bytes);
    }

    pub fn emit_zeros(&mut self, count: usize) {
        self.data.bytes.resize(self.data.bytes.len() + count, 0);
    }

    pub fn emit_zero_pointer(&mut self) {
        self.emit_zeros(self.pointer_size as usize);
    }

    pub fn emit_pointer_reloc(&mut self, target: impl Into<String>) {
        self.reloc(RelocKind::Pointer, target.into());
        self.emit_zero_pointer();
    }

    pub fn emit_section_relative_reloc(&mut self, target: impl Into<String>) {
        self.reloc(RelocKind::SectionRelative32, target.into());
        self.emit_u32(0);
    }

    #[must_use]
    pub fn finish(self) -> ObjectData {
        self.data
    }

    fn reloc(&mut self, kind: RelocKind, target: String) {
        let offset = u32::try_from(self.data.bytes.len()).unwrap_or(u32::MAX);
        self.data.relocations.push(Relocation {
            offset,
            kind,
            target,
        });
    }
}

/// Consecutive runs of pointer slots as `(byte size, byte offset)` pairs.
pub(crate) fn gc_series(slots: &[u32], pointer_size: u32) -> Vec<(u32, u32)> {
    let mut sorted = slots.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut series: Vec<(u32, u32)> = Vec::new();
    let mut run: Option<(u32, u32)> = None;
    for slot in sorted {
        run = match run {
            Some((start, len)) if start + len == slot => Some((start, len + 1)),
            Some((start, len)) => {
                series.push((len * pointer_size, start * pointer_size));
                Some((slot, 1))
            }
            None => Some((slot, 1)),
        };
    }
    if let Some((start, len)) = run {
        series.push((len * pointer_size, start * pointer_size));
    }
    series
}

fn gc_slots(statics: &StaticsLayout, thread_static: bool) -> &[u32] {
    if thread_static {
        &statics.thread_gc_pointer_slots
    } else {
        &statics.gc_pointer_slots
    }
}

impl NodeFactory {
    /// Payload of `id`, or `None` for code, external and layout-only nodes.
    pub fn object_data(&self, id: NodeId) -> Result<Option<ObjectData>, CompileError> {
        let node = self.node(id);
        let types = self.types();
        let ptr = self.config().target().pointer_size();
        let alignment = match node.kind {
            NodeKind::GcStaticDesc { .. }
            | NodeKind::ThreadStaticsOffset { .. }
            | NodeKind::ThreadStaticsIndex => 4,
            NodeKind::MetadataBlob => 1,
            _ => ptr,
        };
        let mut b = ObjectDataBuilder::new(ptr, alignment);

        match &node.kind {
            NodeKind::GcStaticDesc { ty, thread_static } => {
                let desc = types.type_desc(*ty);
                let series = gc_series(gc_slots(&desc.statics, *thread_static), ptr);
                b.emit_u32(u32::try_from(series.len()).unwrap_or(u32::MAX));
                for (size, offset) in series {
                    b.emit_u32(size);
                    b.emit_u32(offset);
                }
            }
            NodeKind::GcStaticBase { ty } => {
                let desc = types.type_desc(*ty);
                let slots = desc.statics.gc_pointer_slots.iter().max().map_or(0, |&m| m + 1);
                b.emit_pointer_reloc(self.symbol(self.type_gc_static_desc_symbol(*ty)?));
                b.emit_zeros(slots as usize * ptr as usize);
            }
            NodeKind::ThreadStaticsBlock { ty } => {
                let size = types.type_desc(*ty).statics.thread_statics_size;
                b.emit_zeros(size.next_multiple_of(ptr) as usize);
            }
            NodeKind::ThreadStaticsOffset { ty } => {
                b.emit_section_relative_reloc(self.symbol(self.thread_statics_block(*ty)?));
            }
            NodeKind::EagerCctorEntry { cctor } => {
                b.emit_pointer_reloc(self.symbol(self.method_entrypoint(*cctor, false)?));
            }
            NodeKind::ThreadStaticsIndex => b.emit_u32(0),
            NodeKind::TlsDirectory => {
                let tables = self.tables();
                b.emit_pointer_reloc(self.symbol(tables.tls_start));
                b.emit_pointer_reloc(self.symbol(tables.tls_end));
                b.emit_pointer_reloc(self.symbol(tables.thread_statics_index));
                // callbacks, zero-fill size, characteristics
                b.emit_zero_pointer();
                b.emit_u32(0);
                b.emit_u32(0);
            }
            NodeKind::TypeManagerIndirection => {
                b.emit_zero_pointer();
                b.emit_zero_pointer();
            }
            NodeKind::ModulesSection => {
                b.emit_pointer_reloc(self.symbol(self.attachment()?.header_node));
            }
            NodeKind::ReadyToRunHeader => {
                return Ok(Some(self.attachment()?.header.serialize(ptr)));
            }
            NodeKind::MetadataBlob => b.emit_bytes(self.metadata().blob().unwrap_or_default()),
            NodeKind::FatFunctionPointer {
                target, dictionary, ..
            } => {
                b.emit_pointer_reloc(self.symbol(*target));
                b.emit_pointer_reloc(self.symbol(*dictionary));
            }
            NodeKind::MethodCode { .. }
            | NodeKind::ExternMethod { .. }
            | NodeKind::RuntimeImport { .. }
            | NodeKind::UnboxingStub { .. }
            | NodeKind::ShadowConcreteMethod { .. }
            | NodeKind::ReadyToRunHelper(_)
            | NodeKind::ExternSymbol
            | NodeKind::DictionaryLayout { .. }
            | NodeKind::StandaloneGcStaticDescRegion { .. }
            | NodeKind::Region(_) => return Ok(None),
        }
        Ok(Some(b.finish()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn series_merge_adjacent_slots() {
        assert_eq!(gc_series(&[0, 1, 2, 5, 7, 6], 8), vec![(24, 0), (24, 40)]);
        assert_eq!(gc_series(&[3], 4), vec![(4, 12)]);
        assert_eq!(gc_series(&[], 8), vec![]);
    }

    #[test]
    fn builder_records_reloc_offsets() {
        let mut b = ObjectDataBuilder::new(8, 8);
        b.emit_u32(7);
        b.emit_u32(0);
        b.emit_pointer_reloc("target");
        b.emit_section_relative_reloc("block");
        let data = b.finish();
        assert_eq!(data.size(), 20);
        assert_eq!(
            data.relocations,
            vec![
                Relocation {
                    offset: 8,
                    kind: RelocKind::Pointer,
                    target: "target".to_string(),
                },
                Relocation {
                    offset: 16,
                    kind: RelocKind::SectionRelative32,
                    target: "block".to_string(),
                },
            ]
        );
    }
}
