use pretty_assertions::assert_eq;

use super::*;
use crate::node::{NodeArena, NodeKind};

fn data(size: usize, alignment: u32) -> ObjectData {
    ObjectData {
        bytes: vec![0; size],
        relocations: Vec::new(),
        alignment,
    }
}

fn nodes(count: usize) -> Vec<NodeId> {
    let arena = NodeArena::new();
    (0..count)
        .map(|i| arena.alloc(NodeKind::ExternSymbol, format!("n{i}"), None))
        .collect()
}

// === Layout ===

#[test]
fn children_are_packed_back_to_back() {
    let ids = nodes(4);
    let a = data(12, 4);
    let b = data(4, 4);
    let c = data(20, 4);
    let layout = RegionLayout::build(
        ids[0],
        "start",
        "end",
        4,
        [(ids[1], "a", &a), (ids[2], "b", &b), (ids[3], "c", &c)],
    )
    .unwrap();

    let offsets: Vec<_> = layout.children.iter().map(|c| (c.offset, c.size)).collect();
    assert_eq!(offsets, vec![(0, 12), (12, 4), (16, 20)]);
    assert_eq!(layout.end_offset, 36);
    assert_eq!(layout.len(), 3);
}

#[test]
fn empty_region_has_equal_bounds() {
    let ids = nodes(1);
    let layout = RegionLayout::build(ids[0], "s", "e", 8, std::iter::empty()).unwrap();
    assert!(layout.is_empty());
    assert_eq!(layout.end_offset, 0);
    assert_eq!(layout.element_count(8), 0);
}

#[test]
fn element_count_divides_by_entry_size() {
    let ids = nodes(3);
    let a = data(8, 8);
    let b = data(8, 8);
    let layout =
        RegionLayout::build(ids[0], "s", "e", 8, [(ids[1], "a", &a), (ids[2], "b", &b)]).unwrap();
    assert_eq!(layout.element_count(8), 2);
}

// === Misalignment ===

#[test]
fn child_after_odd_sized_sibling_is_misaligned() {
    let ids = nodes(3);
    let odd = data(6, 4);
    let next = data(4, 4);
    let err = RegionLayout::build(
        ids[0],
        "region",
        "end",
        4,
        [(ids[1], "odd", &odd), (ids[2], "next", &next)],
    )
    .unwrap_err();
    assert_eq!(
        err,
        RegionError::MisalignedChild {
            region: "region".to_string(),
            child: "next".to_string(),
            offset: 6,
            alignment: 4,
        }
    );
}

#[test]
fn child_needing_more_than_region_alignment_is_rejected() {
    let ids = nodes(2);
    let wide = data(8, 8);
    assert!(matches!(
        RegionLayout::build(ids[0], "r", "e", 4, [(ids[1], "wide", &wide)]),
        Err(RegionError::MisalignedChild { .. })
    ));
}

mod proptest_layout {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn end_offset_is_sum_of_sizes(words in proptest::collection::vec(1usize..8, 0..32)) {
            let ids = nodes(words.len() + 1);
            let payloads: Vec<ObjectData> = words.iter().map(|&w| data(w * 8, 8)).collect();
            let names: Vec<String> = (0..words.len()).map(|i| format!("c{i}")).collect();
            let layout = RegionLayout::build(
                ids[0],
                "s",
                "e",
                8,
                payloads
                    .iter()
                    .enumerate()
                    .map(|(i, d)| (ids[i + 1], names[i].as_str(), d)),
            )
            .unwrap();
            let total: usize = words.iter().map(|w| w * 8).sum();
            prop_assert_eq!(layout.end_offset as usize, total);
            prop_assert_eq!(layout.children.len(), words.len());
        }
    }
}
