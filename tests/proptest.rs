/*
 * proptest.rs
 *
 * Property-based tests for the two control loops (spec §8, P1-P4): these
 * check the invariants hold for thousands of generated reading sequences,
 * not just the handful of fixed scenarios in the unit tests.
 */

use cmm::cpu_regulator::{CpuRegulator, PidGains};
use cmm::mem_regulator::MemRegulator;
use cmm::probe::FakeProbe;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /* P1: busy_pct stays in [0,100] for any sequence of readings and any target */
    #[test]
    fn busy_pct_always_in_bounds(
        target in 0u32..=100,
        readings in proptest::collection::vec(0.0f64..=100.0, 1..100),
    ) {
        let mut reg = CpuRegulator::new(target, PidGains::default());
        reg.prime(readings[0]);
        for r in &readings {
            let busy = reg.tick(*r);
            prop_assert!((0..=100).contains(&busy));
        }
    }

    /* P2: integral never exceeds the anti-windup cap of 25/Ki */
    #[test]
    fn integral_always_within_anti_windup_cap(
        target in 0u32..=100,
        readings in proptest::collection::vec(0.0f64..=100.0, 1..200),
    ) {
        let gains = PidGains::default();
        let cap = 25.0 / gains.ki;
        let mut reg = CpuRegulator::new(target, gains);
        reg.prime(readings[0]);
        for r in &readings {
            reg.tick(*r);
            prop_assert!(reg.integral().abs() <= cap + 1e-9);
        }
    }

    /* P3/P4: allocated_mb always equals the true sum of the pool's actual
     * block byte sizes - block sizes can differ across ticks (the ladder is
     * re-chosen per grow), so this checks the tracked total against ground
     * truth computed straight from the blocks, not block_count * current
     * block_size_mb (which only holds when every block is the same size). */
    #[test]
    fn allocated_mb_matches_true_block_sum(
        target in 0.0f64..=100.0,
        readings in proptest::collection::vec(0.0f64..=100.0, 1..60),
    ) {
        let mut reg = MemRegulator::new(target, 8192);
        let mut probe = FakeProbe::new(8192, 4);
        for r in &readings {
            probe.push_mem(*r);
        }
        for _ in &readings {
            reg.tick(&mut probe);
            prop_assert_eq!(reg.allocated_mb(), reg.true_allocated_mb());
        }
    }
}
