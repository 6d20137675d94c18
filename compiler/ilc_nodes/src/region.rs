//! Region layout.
//!
//! A region is a run of same-shaped table entries bracketed by a start and
//! an end symbol. The runtime computes the element count as
//! `(end - start) / element_size`, so children are packed back to back with
//! no padding anywhere: the end offset is exactly the sum of child sizes.
//! A child that would land misaligned is an error, never silently padded.

use crate::emit::ObjectData;
use crate::error::RegionError;
use crate::node::NodeId;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionChild {
    pub node: NodeId,
    pub symbol: String,
    pub offset: u32,
    pub size: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionLayout {
    pub node: NodeId,
    pub start_symbol: String,
    pub end_symbol: String,
    pub alignment: u32,
    pub children: Vec<RegionChild>,
    /// Offset of the end symbol from the start symbol.
    pub end_offset: u32,
}

impl RegionLayout {
    /// Lay out `children` in the given order.
    pub fn build<'a>(
        node: NodeId,
        start_symbol: &str,
        end_symbol: &str,
        alignment: u32,
        children: impl IntoIterator<Item = (NodeId, &'a str, &'a ObjectData)>,
    ) -> Result<Self, RegionError> {
        let mut laid_out = Vec::new();
        let mut offset: u32 = 0;
        for (child, symbol, data) in children {
            let misaligned = data.alignment > alignment
                || (data.alignment > 0 && offset % data.alignment != 0);
            if misaligned {
                return Err(RegionError::MisalignedChild {
                    region: start_symbol.to_string(),
                    child: symbol.to_string(),
                    offset,
                    alignment: data.alignment,
                });
            }
            let size = u32::try_from(data.bytes.len()).map_err(|_| RegionError::Overflow {
                region: start_symbol.to_string(),
            })?;
            laid_out.push(RegionChild {
                node: child,
                symbol: symbol.to_string(),
                offset,
                size,
            });
            offset = offset.checked_add(size).ok_or_else(|| RegionError::Overflow {
                region: start_symbol.to_string(),
            })?;
        }

        tracing::debug!(
            region = start_symbol,
            children = laid_out.len(),
            bytes = offset,
            "region laid out"
        );
        Ok(Self {
            node,
            start_symbol: start_symbol.to_string(),
            end_symbol: end_symbol.to_string(),
            alignment,
            children: laid_out,
            end_offset: offset,
        })
    }

    /// Number of entries the runtime will see for `element_size`-byte
    /// entries.
    pub fn element_count(&self, element_size: u32) -> u32 {
        if element_size == 0 {
            0
        } else {
            self.end_offset / element_size
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
