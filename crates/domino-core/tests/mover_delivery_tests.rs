// SPDX-License-Identifier: Apache-2.0
//! Item transit over a spline: spawn at the source, travel, delivery into
//! the destination container.

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{fixture_catalog, BELT, BIN, ORE};
use domino_core::ident::{SplineId, StructureId};
use domino_core::structure::{self, ContainerSide, PortKind};
use domino_core::trans::{self, SplineEndpoint, SplineNode};
use domino_core::{Fixed32, Fixed64, World};

fn belt_world() -> (World, StructureId, StructureId, SplineId) {
    let mut w = World::new(4, fixture_catalog()).unwrap();
    let org = domino_core::org::org_create(&mut w, Fixed64::ZERO);
    let a = structure::create(&mut w, BIN, org, [Fixed32::ZERO; 3], Fixed32::ZERO).unwrap();
    let b = structure::create(
        &mut w,
        BIN,
        org,
        [Fixed32::from_int(4), Fixed32::ZERO, Fixed32::ZERO],
        Fixed32::ZERO,
    )
    .unwrap();
    let nodes = [
        SplineNode::default(),
        SplineNode {
            pos: [Fixed64::from_int(4), Fixed64::ZERO, Fixed64::ZERO],
            ..SplineNode::default()
        },
    ];
    let spline = trans::spline_create(&mut w, BELT, org, &nodes).unwrap();
    trans::spline_set_endpoints(
        &mut w,
        spline,
        SplineEndpoint { eid: a, port_kind: PortKind::ItemOut, port_index: 0 },
        SplineEndpoint { eid: b, port_kind: PortKind::ItemIn, port_index: 0 },
    )
    .unwrap();
    (w, a, b, spline)
}

#[test]
fn one_unit_rides_the_belt_end_to_end() {
    let (mut w, a, b, _spline) = belt_world();
    structure::pack_items(&mut w, a, ContainerSide::Out, ORE, 3).unwrap();

    // Spawn happens on the first tick; speed 1 over length 4 crosses in
    // four more.
    w.tick(1);
    assert_eq!(structure::count_items(&w, a, ContainerSide::Out, ORE), 2);
    assert_eq!(trans::mover_count(&w), 1);

    let mut delivered_at = None;
    for tick in 2..=12 {
        let movers_before = trans::mover_count(&w);
        w.tick(1);
        if structure::count_items(&w, b, ContainerSide::In, ORE) == 1 {
            delivered_at = Some(tick);
            // The arriving mover disappeared with its payload delivered.
            assert_eq!(trans::mover_count(&w), movers_before - 1);
            break;
        }
    }
    assert_eq!(delivered_at, Some(4));

    // Units are conserved across source, belt, and destination.
    let in_flight: u32 = (0..trans::mover_count(&w))
        .filter_map(|i| trans::mover_get_by_index(&w, i))
        .map(|m| m.payload_count)
        .sum();
    let at_a = structure::count_items(&w, a, ContainerSide::Out, ORE);
    let at_b = structure::count_items(&w, b, ContainerSide::In, ORE);
    assert_eq!(at_a + in_flight + at_b, 3);
    assert!(w.validate().is_ok());
}

#[test]
fn spawn_gap_throttles_departures() {
    let (mut w, a, _b, spline) = belt_world();
    structure::pack_items(&mut w, a, ContainerSide::Out, ORE, 5).unwrap();
    w.tick(1);
    // The fresh mover sits below the spawn gap, so no second unit departs.
    assert_eq!(trans::mover_count(&w), 1);
    assert_eq!(structure::count_items(&w, a, ContainerSide::Out, ORE), 4);
    let m = trans::mover_get_by_index(&w, 0).unwrap();
    assert_eq!(m.spline_id, spline);
}

#[test]
fn unbound_endpoint_spawns_nothing() {
    let mut w = World::new(4, fixture_catalog()).unwrap();
    let org = domino_core::org::org_create(&mut w, Fixed64::ZERO);
    let a = structure::create(&mut w, BIN, org, [Fixed32::ZERO; 3], Fixed32::ZERO).unwrap();
    let nodes = [
        SplineNode::default(),
        SplineNode {
            pos: [Fixed64::from_int(4), Fixed64::ZERO, Fixed64::ZERO],
            ..SplineNode::default()
        },
    ];
    let spline = trans::spline_create(&mut w, BELT, org, &nodes).unwrap();
    trans::spline_set_endpoints(
        &mut w,
        spline,
        SplineEndpoint { eid: a, port_kind: PortKind::ItemOut, port_index: 0 },
        SplineEndpoint::default(),
    )
    .unwrap();
    structure::pack_items(&mut w, a, ContainerSide::Out, ORE, 2).unwrap();
    w.tick(5);
    assert_eq!(trans::mover_count(&w), 0);
    assert_eq!(structure::count_items(&w, a, ContainerSide::Out, ORE), 2);
}

#[test]
fn full_destination_holds_the_mover_at_the_end() {
    let (mut w, a, b, _spline) = belt_world();
    structure::pack_items(&mut w, a, ContainerSide::Out, ORE, 1).unwrap();
    // Stuff the destination's input and output full so nothing fits.
    structure::pack_items(&mut w, b, ContainerSide::In, ORE, 100).unwrap();
    structure::pack_items(&mut w, b, ContainerSide::Out, ORE, 100).unwrap();
    w.tick(1);
    w.tick(10);
    assert_eq!(trans::mover_count(&w), 1);
    let m = trans::mover_get_by_index(&w, 0).unwrap();
    assert_eq!(m.param, Fixed32::ONE);
}
