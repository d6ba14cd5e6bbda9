use crate::{BatteryLevel, Readings};
use rand::{Rng, SeedableRng, rngs::StdRng};
use std::ops::Range;

pub const FRONT_DISTANCE_CM: Range<u32> = 10..60;
pub const REAR_DISTANCE_CM: Range<u32> = 15..65;
pub const SMOKE_PPM: Range<u32> = 50..350;
pub const SIGNAL_DBM: Range<i32> = -70..-40;

/// Chance, per poll, that an active robot loses one percent of battery.
pub const DRAIN_PROBABILITY: f64 = 0.2;

/// Produces synthetic sensor readings.
///
/// Every field is an independent uniform draw, except the battery, which
/// carries over between polls and only ever drains while the robot is active.
/// Readings are not reproducible unless the simulator is built from a seeded
/// RNG with [`Simulator::with_rng`].
///
/// # Example
/// ```
/// use rand::{SeedableRng, rngs::StdRng};
/// use telemetry::Simulator;
///
/// let mut simulator = Simulator::with_rng(StdRng::seed_from_u64(7));
/// let readings = simulator.sample(true);
///
/// assert!(readings.battery.percent() <= 100);
/// ```
#[derive(Debug)]
pub struct Simulator<R = StdRng> {
    rng: R,
    battery: BatteryLevel,
}

impl Simulator<StdRng> {
    /// Create a simulator seeded from the OS entropy source.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }
}

impl Default for Simulator<StdRng> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Rng> Simulator<R> {
    /// Create a simulator drawing from `rng`, starting with a full battery.
    pub fn with_rng(rng: R) -> Self {
        Self {
            rng,
            battery: BatteryLevel::FULL,
        }
    }

    pub fn with_battery(mut self, battery: BatteryLevel) -> Self {
        self.battery = battery;
        self
    }

    pub fn battery(&self) -> BatteryLevel {
        self.battery
    }

    /// Draw the next set of readings.
    pub fn sample(&mut self, robot_active: bool) -> Readings {
        let distance_front_cm = self.rng.gen_range(FRONT_DISTANCE_CM);
        let distance_rear_cm = self.rng.gen_range(REAR_DISTANCE_CM);
        let smoke_ppm = self.rng.gen_range(SMOKE_PPM);

        if robot_active && !self.battery.is_empty() && self.rng.gen_bool(DRAIN_PROBABILITY) {
            self.battery.drain();
        }

        let signal_strength_dbm = self.rng.gen_range(SIGNAL_DBM);

        Readings {
            distance_front_cm,
            distance_rear_cm,
            smoke_ppm,
            battery: self.battery,
            signal_strength_dbm: Some(signal_strength_dbm),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded(seed: u64) -> Simulator {
        Simulator::with_rng(StdRng::seed_from_u64(seed))
    }

    #[test]
    fn readings_stay_in_range() {
        let mut simulator = seeded(1);

        for _ in 0..500 {
            let readings = simulator.sample(false);

            assert!(FRONT_DISTANCE_CM.contains(&readings.distance_front_cm));
            assert!(REAR_DISTANCE_CM.contains(&readings.distance_rear_cm));
            assert!(SMOKE_PPM.contains(&readings.smoke_ppm));
            assert!(SIGNAL_DBM.contains(&readings.signal_strength_dbm.unwrap()));
        }
    }

    #[test]
    fn battery_is_non_increasing_while_active() {
        let mut simulator = seeded(42);
        let mut levels = vec![simulator.battery()];

        for _ in 0..100 {
            levels.push(simulator.sample(true).battery);
        }

        for w in levels.windows(2) {
            assert!(w[1] <= w[0], "battery went up: {:?} -> {:?}", w[0], w[1]);
        }
        assert!(levels.last().unwrap().percent() <= 100);
    }

    #[test]
    fn battery_drains_eventually() {
        let mut simulator = seeded(3);

        for _ in 0..1000 {
            simulator.sample(true);
        }

        assert!(simulator.battery() < BatteryLevel::FULL);
    }

    #[test]
    fn battery_holds_while_idle() {
        let mut simulator = seeded(9).with_battery(BatteryLevel::new(55));

        for _ in 0..200 {
            assert_eq!(simulator.sample(false).battery, BatteryLevel::new(55));
        }
    }

    #[test]
    fn battery_floors_at_zero() {
        let mut simulator = seeded(5).with_battery(BatteryLevel::new(2));

        for _ in 0..200 {
            simulator.sample(true);
        }

        assert_eq!(simulator.battery(), BatteryLevel::EMPTY);
    }
}
