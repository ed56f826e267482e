//! Localization Engine Scenario Tests
//!
//! Synthetic measurement sequences exercising the full filter cycle:
//! - Odometry-only dead reckoning
//! - First sighting of a beacon by range and by RSSI
//! - Two-vantage trilateration of an unknown beacon
//! - Atomic rejection of invalid measurements
//! - Joint tag/beacon resampling along a shared lineage
//! - Convergence on a closed walk around a fixed beacon
//!
//! All runs use fixed seeds.
//!
//! Run with: `cargo test --test engine_scenarios`

use approx::assert_relative_eq;
use beacon_slam::{
    BeaconState, EngineConfig, LocalizationEngine, LocalizeError, ParticleSet,
    ParticleSetSnapshot, TagState,
};
use rand::SeedableRng;
use rand::rngs::StdRng;

// ============================================================================
// Helpers
// ============================================================================

fn engine_with(seed: u64, num_particles: usize) -> LocalizationEngine {
    LocalizationEngine::new(EngineConfig {
        seed,
        num_particles,
        ..Default::default()
    })
    .unwrap()
}

fn distance(a: (f64, f64, f64), b: (f64, f64, f64)) -> f64 {
    ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2) + (a.2 - b.2).powi(2)).sqrt()
}

// ============================================================================
// Odometry
// ============================================================================

#[test]
fn test_single_step_forward() {
    let mut engine = engine_with(42, 200);
    engine.deposit_motion(0.0, 0.0, 0.0, 0.0).unwrap();
    engine.deposit_motion(1.0, 1.0, 0.0, 0.0).unwrap();

    let est = engine.tag_estimate();
    assert_eq!(est.t, 1.0);
    assert!((est.x - 1.0).abs() < 0.05, "x = {}", est.x);
    assert!(est.y.abs() < 0.05, "y = {}", est.y);
    assert!(est.z.abs() < 0.05, "z = {}", est.z);
}

#[test]
fn test_timestamps_non_decreasing() {
    let mut engine = engine_with(7, 100);
    let mut last_t = engine.tag_estimate().t;

    for i in 0..40 {
        let t = i as f64 * 0.05;
        engine.deposit_motion(t, t * 0.5, 0.0, 0.0).unwrap();
        assert!(engine.tag_estimate().t >= last_t);
        last_t = engine.tag_estimate().t;

        if i % 4 == 0 {
            engine.deposit_range("B1", 3.0 - t * 0.5, 0.1).unwrap();
            assert!(engine.tag_estimate().t >= last_t);
            last_t = engine.tag_estimate().t;
        }
        if i % 5 == 0 {
            engine.deposit_rssi("B2", -70).unwrap();
            assert!(engine.tag_estimate().t >= last_t);
            last_t = engine.tag_estimate().t;
        }
    }
    assert_relative_eq!(last_t, 39.0 * 0.05, epsilon = 1e-12);
}

// ============================================================================
// Beacon discovery
// ============================================================================

#[test]
fn test_new_beacon_from_range() {
    let mut engine = engine_with(1, 200);
    assert!(matches!(
        engine.beacon_estimate("B1"),
        Err(LocalizeError::UnknownBeacon(_))
    ));

    engine.deposit_range("B1", 4.0, 0.2).unwrap();

    assert_eq!(engine.beacon_names(), vec!["B1".to_string()]);
    let est = engine.beacon_estimate("B1").unwrap();
    assert!(est.is_finite());
}

#[test]
fn test_new_beacon_from_rssi() {
    let mut engine = engine_with(2, 200);
    engine.deposit_rssi("B7", -80).unwrap();
    assert!(engine.beacon_names().contains(&"B7".to_string()));
    assert!(engine.beacon_estimate("B7").unwrap().is_finite());
    assert_eq!(engine.stats().rssi_updates, 1);
}

#[test]
fn test_beacon_names_keep_discovery_order() {
    let mut engine = engine_with(3, 50);
    engine.deposit_rssi("Z", -60).unwrap();
    engine.deposit_range("A", 2.0, 0.1).unwrap();
    engine.deposit_range("Z", 2.0, 0.1).unwrap();
    engine.deposit_rssi("M", -65).unwrap();
    assert_eq!(engine.beacon_names(), vec!["Z", "A", "M"]);
}

// ============================================================================
// Invalid measurements
// ============================================================================

#[test]
fn test_invalid_measurement_leaves_state_unchanged() {
    let mut engine = engine_with(5, 200);
    engine.deposit_motion(0.0, 0.0, 0.0, 0.0).unwrap();
    engine.deposit_range("B1", 5.0, 0.1).unwrap();
    engine.deposit_motion(1.0, 0.5, 0.2, 0.0).unwrap();
    engine.deposit_rssi("B2", -66).unwrap();

    let tag_before = engine.tag_estimate();
    let beacons_before: Vec<_> = engine
        .beacon_names()
        .iter()
        .map(|n| engine.beacon_estimate(n).unwrap())
        .collect();
    let particles_before = engine.tag_particles().snapshot();

    let invalid = [
        engine.deposit_range("B1", 5.0, -1.0),
        engine.deposit_range("B1", 5.0, f64::NAN),
        engine.deposit_range("B3", -2.0, 0.1),
        engine.deposit_range("", 1.0, 0.1),
        engine.deposit_rssi("B2", 40),
        engine.deposit_motion(0.5, 9.0, 9.0, 9.0),
        engine.deposit_motion(2.0, f64::INFINITY, 0.0, 0.0),
    ];
    for result in &invalid {
        assert!(matches!(
            result,
            Err(LocalizeError::InvalidMeasurement { .. })
        ));
    }

    let tag_after = engine.tag_estimate();
    assert_eq!(tag_before.t.to_bits(), tag_after.t.to_bits());
    assert_eq!(tag_before.x.to_bits(), tag_after.x.to_bits());
    assert_eq!(tag_before.y.to_bits(), tag_after.y.to_bits());
    assert_eq!(tag_before.z.to_bits(), tag_after.z.to_bits());
    assert_eq!(tag_before.theta.to_bits(), tag_after.theta.to_bits());

    let beacons_after: Vec<_> = engine
        .beacon_names()
        .iter()
        .map(|n| engine.beacon_estimate(n).unwrap())
        .collect();
    assert_eq!(beacons_before, beacons_after);
    assert_eq!(particles_before, engine.tag_particles().snapshot());
    assert_eq!(engine.beacon_names(), vec!["B1", "B2"]);
    assert_eq!(engine.stats().dropped, invalid.len() as u64);
}

// ============================================================================
// Trilateration
// ============================================================================

#[test]
fn test_two_vantage_points_shrink_beacon_uncertainty() {
    let mut engine = engine_with(2024, 200);

    engine.deposit_motion(0.0, 0.0, 0.0, 0.0).unwrap();
    engine.deposit_range("B1", 5.0, 0.1).unwrap();
    let var_first = engine.beacon_variance("B1").unwrap();

    engine.deposit_motion(1.0, 1.0, 0.0, 0.0).unwrap();
    engine.deposit_range("B1", 5.0, 0.1).unwrap();
    let var_second = engine.beacon_variance("B1").unwrap();

    // Equal ranges from (0,0,0) and (1,0,0) put the beacon on the x = 0.5 plane
    assert!(
        var_second.x < var_first.x,
        "x variance did not shrink: {} -> {}",
        var_first.x,
        var_second.x
    );
    let est = engine.beacon_estimate("B1").unwrap();
    assert!((est.x - 0.5).abs() < 0.6, "beacon x = {}", est.x);
}

#[test]
fn test_walk_around_fixed_beacon_converges() {
    let truth = (3.0, 2.0, 0.0);
    let mut engine = engine_with(77, 300);

    // Square walk with 0.25 m steps, ranging after every step
    let corners = [(0.0, 0.0), (2.0, 0.0), (2.0, 2.0), (0.0, 2.0), (0.0, 0.0)];
    let mut t = 0.0;
    engine.deposit_motion(t, 0.0, 0.0, 0.0).unwrap();
    for leg in corners.windows(2) {
        let (from, to) = (leg[0], leg[1]);
        for k in 1..=8 {
            let f = k as f64 / 8.0;
            let x = from.0 + (to.0 - from.0) * f;
            let y = from.1 + (to.1 - from.1) * f;
            t += 0.25;
            engine.deposit_motion(t, x, y, 0.0).unwrap();
            let r = distance((x, y, 0.0), truth);
            engine.deposit_range("B1", r, 0.1).unwrap();
        }
    }

    let est = engine.beacon_estimate("B1").unwrap();
    let err_xy = ((est.x - truth.0).powi(2) + (est.y - truth.1).powi(2)).sqrt();
    assert!(
        err_xy < 1.0,
        "beacon at ({:.2}, {:.2}), expected {:?}",
        est.x,
        est.y,
        truth
    );

    let tag = engine.tag_estimate();
    assert!(distance((tag.x, tag.y, tag.z), (0.0, 0.0, 0.0)) < 0.5);
    assert!(engine.stats().resamples > 0);
}

// ============================================================================
// Joint resampling
// ============================================================================

/// B1 at (3, 4, 0) and B2 at (0, 3, 0), heard from the origin and from
/// (1, 0, 0), then B1 again from (1, 2, 0).
///
/// Returns the engine just before and just after the final B1 reading.
fn two_beacon_run(seed: u64) -> (LocalizationEngine, LocalizationEngine) {
    let b1 = (3.0, 4.0, 0.0);
    let b2 = (0.0, 3.0, 0.0);
    let mut engine = engine_with(seed, 200);
    engine.deposit_motion(0.0, 0.0, 0.0, 0.0).unwrap();
    engine.deposit_range("B1", distance((0.0, 0.0, 0.0), b1), 0.1).unwrap();
    engine.deposit_range("B2", distance((0.0, 0.0, 0.0), b2), 0.1).unwrap();
    engine.deposit_motion(1.0, 1.0, 0.0, 0.0).unwrap();
    engine.deposit_range("B1", distance((1.0, 0.0, 0.0), b1), 0.1).unwrap();
    engine.deposit_range("B2", distance((1.0, 0.0, 0.0), b2), 0.1).unwrap();
    engine.deposit_motion(2.0, 1.0, 2.0, 0.0).unwrap();

    let before = engine.clone();
    engine.deposit_range("B1", distance((1.0, 2.0, 0.0), b1), 0.1).unwrap();
    (before, engine)
}

#[test]
fn test_tag_resample_leaves_beacon_weights_uniform() {
    let mut checked = 0;
    for seed in 1..=20 {
        let (before, after) = two_beacon_run(seed);
        let tag_resampled = after.stats().resamples > before.stats().resamples
            && (after.tag_ess() - 200.0).abs() < 1e-6;
        if !tag_resampled {
            continue;
        }
        checked += 1;

        // The tag lineage is the only carrier of the pair weight
        for name in ["B1", "B2"] {
            let ess = after.beacon_ess(name).unwrap();
            assert_relative_eq!(ess, 200.0, epsilon = 1e-6);
        }
        assert_eq!(
            after.stats().resamples,
            before.stats().resamples + 1,
            "seed {} resampled more than once",
            seed
        );
    }
    assert!(checked > 0, "no run resampled the tag");
}

#[test]
fn test_unobserved_beacon_only_follows_lineage() {
    for seed in 1..=10 {
        let (before, after) = two_beacon_run(seed);
        let prior: Vec<BeaconState> = before
            .beacon_particles("B2")
            .unwrap()
            .particles()
            .iter()
            .map(|p| p.state)
            .collect();

        // Every B2 particle is a copy of one it had before the B1 reading
        for p in after.beacon_particles("B2").unwrap().particles() {
            assert!(prior.contains(&p.state), "seed {}: B2 particle moved", seed);
        }
        assert_eq!(after.beacon_estimate("B2").unwrap().t, 1.0);
        assert_eq!(after.beacon_estimate("B1").unwrap().t, 2.0);
    }
}

// ============================================================================
// Particle set properties through the public API
// ============================================================================

#[test]
fn test_resampling_at_exact_half_ess() {
    let mut set = ParticleSet::from_states(
        (0..8).map(|i| BeaconState::new(i as f64, 0.0, 0.0)),
    )
    .unwrap();
    // Four equal weights, four zeros: ESS = 4 = N/2
    set.reweight(|s| if s.x < 4.0 { 1.0 } else { 0.0 });
    set.normalize().unwrap();
    assert_eq!(set.ess(), 4.0);

    let mut rng = StdRng::seed_from_u64(1);
    let ancestors = set.resample_if_needed(0.5, &mut rng).expect("boundary must resample");
    assert_eq!(ancestors.len(), 8);
    assert_eq!(set.len(), 8);
    for p in set.particles() {
        assert_relative_eq!(p.weight, 0.125, epsilon = 1e-12);
        assert!(p.state.x < 4.0);
    }
    assert_relative_eq!(set.ess(), 8.0, epsilon = 1e-9);
}

#[test]
fn test_snapshot_round_trip_preserves_mean() {
    let mut engine = engine_with(8, 120);
    engine.deposit_motion(0.0, 0.0, 0.0, 0.0).unwrap();
    engine.deposit_range("B1", 3.0, 0.1).unwrap();
    engine.deposit_motion(1.0, 0.7, -0.3, 0.1).unwrap();
    engine.deposit_range("B1", 2.6, 0.1).unwrap();

    let live = engine.tag_particles();
    let json = serde_json::to_string(&live.snapshot()).unwrap();
    let restored: ParticleSetSnapshot<TagState> = serde_json::from_str(&json).unwrap();
    let restored = ParticleSet::from_snapshot(restored).unwrap();

    let (a, b) = (live.mean(), restored.mean());
    assert_relative_eq!(a.x, b.x, epsilon = 1e-9);
    assert_relative_eq!(a.y, b.y, epsilon = 1e-9);
    assert_relative_eq!(a.z, b.z, epsilon = 1e-9);
    assert_relative_eq!(a.theta, b.theta, epsilon = 1e-9);
}
