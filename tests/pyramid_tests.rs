// Pyramid sizing over complete cycles

mod common;

use common::approx_eq;
use perp_grid_bot::core::{Phase, PyramidCycle, Side, Transition};

/// Fill every step in full until `cycles` cycles completed; returns the fills
fn run_cycles(cycle: &mut PyramidCycle, cycles: u32) -> Vec<(Side, f64)> {
    let mut fills = Vec::new();
    while cycle.completed_cycles() < cycles {
        let step = cycle.next_step();
        fills.push((step.side, step.quantity));
        cycle.on_fill(step.quantity).unwrap();
    }
    fills
}

#[test]
fn test_uneven_max_position_builds_and_unwinds() {
    let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.25).unwrap();
    let fills = run_cycles(&mut cycle, 1);

    let quantities: Vec<f64> = fills.iter().map(|(_, q)| *q).collect();
    let expected = [0.1, 0.1, 0.05, 0.1, 0.1, 0.05];
    assert_eq!(quantities.len(), expected.len());
    for (got, want) in quantities.iter().zip(expected) {
        assert!(approx_eq(*got, want), "got {} want {}", got, want);
    }
    assert!(fills[..3].iter().all(|(side, _)| *side == Side::Buy));
    assert!(fills[3..].iter().all(|(side, _)| *side == Side::Sell));
    assert!(approx_eq(cycle.state().net_quantity, 0.0));
}

#[test]
fn test_partial_fills_advance_by_filled_amount() {
    let mut cycle = PyramidCycle::new(Side::Sell, 0.1, 0.2).unwrap();

    assert_eq!(cycle.on_fill(0.04).unwrap(), Transition::Stay);
    assert!(approx_eq(cycle.state().net_quantity, -0.04));
    assert!(approx_eq(cycle.next_step().quantity, 0.1));

    assert_eq!(cycle.on_fill(0.1).unwrap(), Transition::Stay);
    // Only 0.06 of room is left
    let step = cycle.next_step();
    assert!(approx_eq(step.quantity, 0.06));
    assert!(step.final_build);

    assert_eq!(cycle.on_fill(0.06).unwrap(), Transition::EnteredClosing);
    assert_eq!(cycle.phase(), Phase::Closing);
    assert_eq!(cycle.next_step().side, Side::Buy);
}

#[test]
fn test_overfill_is_rejected() {
    let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.1).unwrap();
    assert!(cycle.on_fill(0.2).is_err());
    assert!(approx_eq(cycle.state().net_quantity, 0.0));
}

#[test]
fn test_cycles_repeat_identically() {
    let mut cycle = PyramidCycle::new(Side::Buy, 0.1, 0.3).unwrap();
    let first = run_cycles(&mut cycle, 1);
    let both = run_cycles(&mut cycle, 2);

    assert_eq!(first.len(), 6);
    assert_eq!(both.len(), 6);
    assert_eq!(cycle.completed_cycles(), 2);
    assert_eq!(cycle.phase(), Phase::Building);
}
