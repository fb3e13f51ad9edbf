//! Flip choreography for the tile deck.
//!
//! An explicit state machine advanced by the frame clock. Each tile's spread
//! (sliding out from the center) and the shared raise (flattening into the
//! z = 0 plane) are damped springs; the machine walks
//! `Opening -> Holding -> Closing -> Idle` and restarts on a fixed cycle
//! period. The renderer never sees this module — it only sees the transforms
//! the scene derives from [`FlipChoreography::spread`] and
//! [`FlipChoreography::raise`].

/// Spring stiffness/damping pair, unit mass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringConfig {
    pub tension: f32,
    pub friction: f32,
}

/// Snappy, slightly underdamped; drives the opening moves.
pub const SNAP: SpringConfig = SpringConfig {
    tension: 900.0,
    friction: 40.0,
};

/// Heavily overdamped; drives the slow close.
pub const MOLASSES: SpringConfig = SpringConfig {
    tension: 280.0,
    friction: 120.0,
};

/// Fixed integration substep. Springs are advanced in whole substeps with the
/// remainder carried, so results do not depend on how callers slice time.
const SUBSTEP: f32 = 1.0 / 240.0;

const SETTLE_VALUE: f32 = 1e-3;
const SETTLE_VELOCITY: f32 = 1e-2;

#[derive(Debug, Clone, Copy)]
struct Spring {
    value: f32,
    velocity: f32,
    target: f32,
    config: SpringConfig,
}

impl Spring {
    fn at_rest(value: f32) -> Self {
        Self {
            value,
            velocity: 0.0,
            target: value,
            config: SNAP,
        }
    }

    fn retarget(&mut self, target: f32, config: SpringConfig) {
        self.target = target;
        self.config = config;
    }

    fn step(&mut self, h: f32) {
        let accel = (self.target - self.value) * self.config.tension
            - self.velocity * self.config.friction;
        self.velocity += accel * h;
        self.value += self.velocity * h;
        if self.is_settled() {
            self.value = self.target;
            self.velocity = 0.0;
        }
    }

    fn is_settled(&self) -> bool {
        (self.value - self.target).abs() < SETTLE_VALUE && self.velocity.abs() < SETTLE_VELOCITY
    }
}

/// Phase of the flip cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipState {
    /// Resting flat until the next cycle begins.
    Idle,
    /// Tiles spreading out (staggered), then the deck raising into plane.
    Opening,
    /// Fully open, waiting out the hold period.
    Holding,
    /// Everything easing back to rest.
    Closing,
}

/// Named transition timings, in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlipTimings {
    /// Delay between consecutive tiles starting to spread.
    pub stagger: f32,
    /// Pause between the last tile settling and the raise starting.
    pub raise_delay: f32,
    /// How long the deck stays fully open.
    pub hold: f32,
    /// Full cycle period; the sequence restarts on this clock no matter what.
    pub cycle: f32,
}

impl Default for FlipTimings {
    fn default() -> Self {
        Self {
            stagger: 0.1,
            raise_delay: 1.0,
            hold: 3.0,
            cycle: 10.0,
        }
    }
}

/// The deck's animation driver. Deterministic: two instances advanced by the
/// same sequence of deltas report identical phases.
#[derive(Debug, Clone)]
pub struct FlipChoreography {
    state: FlipState,
    state_time: f32,
    cycle_time: f32,
    accumulator: f64,
    spread: Vec<Spring>,
    raise: Spring,
    raise_armed_at: Option<f32>,
    timings: FlipTimings,
}

impl FlipChoreography {
    /// A choreography for `tile_count` tiles, starting its first cycle
    /// immediately.
    pub fn new(tile_count: usize) -> Self {
        Self::with_timings(tile_count, FlipTimings::default())
    }

    pub fn with_timings(tile_count: usize, timings: FlipTimings) -> Self {
        Self {
            state: FlipState::Opening,
            state_time: 0.0,
            cycle_time: 0.0,
            accumulator: 0.0,
            spread: vec![Spring::at_rest(0.0); tile_count],
            raise: Spring::at_rest(0.0),
            raise_armed_at: None,
            timings,
        }
    }

    pub fn state(&self) -> FlipState {
        self.state
    }

    /// Spread phase for tile `i`, nominally 0..1 (stiff springs overshoot a
    /// little).
    pub fn spread(&self, i: usize) -> f32 {
        self.spread[i].value
    }

    /// Shared raise phase, nominally 0..1.
    pub fn raise(&self) -> f32 {
        self.raise.value
    }

    /// Advance the clock by `dt` seconds.
    ///
    /// Time is accumulated in f64 so that the substep count depends only on
    /// total elapsed time, not on how callers slice it into frames.
    pub fn advance(&mut self, dt: f32) {
        self.accumulator += f64::from(dt);
        while self.accumulator >= f64::from(SUBSTEP) {
            self.accumulator -= f64::from(SUBSTEP);
            self.tick();
        }
    }

    fn tick(&mut self) {
        self.state_time += SUBSTEP;
        self.cycle_time += SUBSTEP;

        match self.state {
            FlipState::Opening => {
                for (i, spring) in self.spread.iter_mut().enumerate() {
                    if self.state_time >= i as f32 * self.timings.stagger {
                        spring.retarget(1.0, SNAP);
                    }
                }
                let all_spread = self
                    .spread
                    .iter()
                    .all(|s| s.target == 1.0 && s.is_settled());
                if all_spread && self.raise_armed_at.is_none() {
                    self.raise_armed_at = Some(self.state_time);
                }
                if let Some(armed) = self.raise_armed_at {
                    if self.state_time >= armed + self.timings.raise_delay {
                        self.raise.retarget(1.0, SNAP);
                    }
                }
                if self.raise.target == 1.0 && self.raise.is_settled() {
                    self.enter(FlipState::Holding);
                }
            }
            FlipState::Holding => {
                if self.state_time >= self.timings.hold {
                    for spring in &mut self.spread {
                        spring.retarget(0.0, MOLASSES);
                    }
                    self.raise.retarget(0.0, MOLASSES);
                    self.enter(FlipState::Closing);
                }
            }
            FlipState::Closing => {
                let done =
                    self.spread.iter().all(|s| s.is_settled()) && self.raise.is_settled();
                if done {
                    self.enter(FlipState::Idle);
                }
            }
            FlipState::Idle => {}
        }

        // The cycle timer fires regardless of settle state; springs mid-flight
        // simply get retargeted, as an interval-driven restart would.
        if self.cycle_time >= self.timings.cycle {
            self.cycle_time -= self.timings.cycle;
            self.enter(FlipState::Opening);
        }

        for spring in &mut self.spread {
            spring.step(SUBSTEP);
        }
        self.raise.step(SUBSTEP);
    }

    fn enter(&mut self, state: FlipState) {
        self.state = state;
        self.state_time = 0.0;
        if state == FlipState::Opening {
            self.raise_armed_at = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_for(choreo: &mut FlipChoreography, seconds: f32, step: f32) {
        let mut t = 0.0;
        while t < seconds {
            choreo.advance(step);
            t += step;
        }
    }

    #[test]
    fn starts_opening_with_all_phases_at_zero() {
        let c = FlipChoreography::new(9);
        assert_eq!(c.state(), FlipState::Opening);
        for i in 0..9 {
            assert_eq!(c.spread(i), 0.0);
        }
        assert_eq!(c.raise(), 0.0);
    }

    #[test]
    fn identical_delta_sequences_produce_identical_phases() {
        let mut a = FlipChoreography::new(9);
        let mut b = FlipChoreography::new(9);
        let deltas = [0.016, 0.033, 0.008, 0.25, 0.016, 0.142, 0.016];
        for _ in 0..12 {
            for &dt in &deltas {
                a.advance(dt);
                b.advance(dt);
            }
        }
        for i in 0..9 {
            assert_eq!(a.spread(i), b.spread(i), "tile {i} diverged");
        }
        assert_eq!(a.raise(), b.raise());
        assert_eq!(a.state(), b.state());
    }

    #[test]
    fn stagger_orders_tile_starts() {
        let mut c = FlipChoreography::new(9);
        c.advance(0.15);
        assert!(c.spread(0) > 0.0, "tile 0 should be moving by 150 ms");
        assert_eq!(c.spread(8), 0.0, "tile 8 should not start until 800 ms");
    }

    #[test]
    fn raise_waits_for_all_tiles_to_spread() {
        let mut c = FlipChoreography::new(9);
        let mut first_raise_seen = false;
        for _ in 0..600 {
            c.advance(0.01);
            if !first_raise_seen && c.raise() > 1e-3 {
                first_raise_seen = true;
                for i in 0..9 {
                    assert!(
                        c.spread(i) > 0.9,
                        "raise started while tile {i} was at {}",
                        c.spread(i)
                    );
                }
            }
        }
        assert!(first_raise_seen, "raise never started within 6 s");
    }

    #[test]
    fn walks_the_full_state_sequence_each_cycle() {
        let mut c = FlipChoreography::new(9);
        let mut sequence = vec![c.state()];
        for _ in 0..1350 {
            c.advance(0.01);
            if *sequence.last().unwrap() != c.state() {
                sequence.push(c.state());
            }
        }
        assert_eq!(
            sequence,
            vec![
                FlipState::Opening,
                FlipState::Holding,
                FlipState::Closing,
                FlipState::Idle,
                FlipState::Opening,
                FlipState::Holding,
            ],
            "one full cycle plus the restart within 13.5 s"
        );
    }

    #[test]
    fn holding_keeps_deck_fully_open_for_the_hold_period() {
        let mut c = FlipChoreography::new(9);
        let mut hold_entered_at = None;
        let mut hold_left_at = None;
        let mut t: f32 = 0.0;
        for _ in 0..1000 {
            c.advance(0.01);
            t += 0.01;
            match (c.state(), hold_entered_at) {
                (FlipState::Holding, None) => hold_entered_at = Some(t),
                (FlipState::Closing, Some(_)) if hold_left_at.is_none() => {
                    hold_left_at = Some(t);
                }
                _ => {}
            }
        }
        let entered = hold_entered_at.expect("never reached Holding");
        let left = hold_left_at.expect("never left Holding");
        assert!(
            (left - entered - 3.0).abs() < 0.1,
            "hold lasted {} s, expected about 3",
            left - entered
        );
    }

    #[test]
    fn deck_returns_to_rest_before_the_cycle_restarts() {
        let mut c = FlipChoreography::new(9);
        run_for(&mut c, 9.9, 0.01);
        assert_eq!(c.state(), FlipState::Idle);
        for i in 0..9 {
            assert!(
                c.spread(i).abs() < 0.01,
                "tile {i} still at {} near cycle end",
                c.spread(i)
            );
        }
        assert!(c.raise().abs() < 0.01);
        run_for(&mut c, 0.2, 0.01);
        assert_eq!(c.state(), FlipState::Opening, "cycle should restart at 10 s");
    }

    #[test]
    fn phases_stay_within_overshoot_bounds() {
        let mut c = FlipChoreography::new(9);
        for _ in 0..1100 {
            c.advance(0.01);
            for i in 0..9 {
                let v = c.spread(i);
                assert!((-0.2..=1.2).contains(&v), "tile {i} phase {v} out of bounds");
            }
            let r = c.raise();
            assert!((-0.2..=1.2).contains(&r), "raise phase {r} out of bounds");
        }
    }

    mod partitioning {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Slicing the same total time into arbitrary frame deltas must
            /// not change where the springs end up, beyond the single substep
            /// of rounding slack the f32 total can introduce.
            #[test]
            fn time_slicing_does_not_change_outcome(
                cuts in prop::collection::vec(0.001f32..0.3, 4..40)
            ) {
                let total: f32 = cuts.iter().sum();
                let mut sliced = FlipChoreography::new(9);
                for dt in &cuts {
                    sliced.advance(*dt);
                }
                let mut whole = FlipChoreography::new(9);
                whole.advance(total);

                for i in 0..9 {
                    let diff = (sliced.spread(i) - whole.spread(i)).abs();
                    prop_assert!(
                        diff < 0.2,
                        "tile {} drifted {} between slicings", i, diff
                    );
                }
                prop_assert!((sliced.raise() - whole.raise()).abs() < 0.2);
            }
        }
    }
}
