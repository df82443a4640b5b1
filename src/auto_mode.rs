// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Periodic solar tracking.
//!
//! While enabled, [`AutoModeController`] recomputes the ideal temperature on
//! a fixed interval and hands it to the [`LightStateController`]. Any
//! user-driven change on the light controller disables it.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::light::LightStateController;
use crate::solar::{Clock, SolarTransitionCalculator};
use crate::types::Kelvin;

/// Whether automatic tracking is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AutoModeState {
    /// No automatic updates.
    Disabled,
    /// The periodic timer is running.
    Enabled,
}

impl AutoModeState {
    /// Returns true for [`AutoModeState::Enabled`].
    #[must_use]
    pub fn is_enabled(self) -> bool {
        self == Self::Enabled
    }
}

impl fmt::Display for AutoModeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("disabled"),
            Self::Enabled => f.write_str("enabled"),
        }
    }
}

struct Shared {
    calculator: SolarTransitionCalculator,
    light: LightStateController,
    clock: Arc<dyn Clock>,
    interval: Duration,
    timer: Mutex<Option<JoinHandle<()>>>,
    state: watch::Sender<AutoModeState>,
}

impl Shared {
    /// Recomputes the ideal temperature and pushes it to the lights.
    ///
    /// Unless `force` is set, an unchanged value only refreshes the light
    /// projection. A user change that lands while the value is computed
    /// wins; the result is then dropped and auto mode ends up disabled.
    fn update(&self, force: bool) -> Kelvin {
        let ideal = self.calculator.ideal_temperature(self.clock.now());
        let current = self.light.current_temperature();

        if force || ideal != current {
            tracing::info!(%current, %ideal, "Updating to ideal temperature");
            if let Some(adopted) = self.light.adopt_if_tracking(ideal) {
                return adopted;
            }
            if self.set_state(AutoModeState::Disabled) {
                tracing::info!("Manual change during update, auto mode disabled");
            }
            self.light.target_temperature()
        } else {
            tracing::debug!(%current, "Temperature already ideal");
            self.light.refresh_projection();
            current
        }
    }

    /// Publishes `next` if it differs from the current state.
    fn set_state(&self, next: AutoModeState) -> bool {
        self.state.send_if_modified(|state| {
            let changed = *state != next;
            *state = next;
            changed
        })
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.timer.get_mut().take() {
            handle.abort();
        }
    }
}

/// Drives the light controller from the solar model.
///
/// Cloning is cheap; clones share the same timer and state.
#[derive(Clone)]
pub struct AutoModeController {
    shared: Arc<Shared>,
}

impl fmt::Debug for AutoModeController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoModeController")
            .field("state", &*self.shared.state.borrow())
            .field("interval", &self.shared.interval)
            .finish_non_exhaustive()
    }
}

impl AutoModeController {
    /// Creates a disabled controller and subscribes it to manual overrides
    /// on `light`.
    ///
    /// The update interval is taken from the calculator's configuration.
    pub fn new(
        calculator: SolarTransitionCalculator,
        light: LightStateController,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let interval = calculator.config().update_interval();
        let (state, _) = watch::channel(AutoModeState::Disabled);
        let shared = Arc::new(Shared {
            calculator,
            light,
            clock,
            interval,
            timer: Mutex::new(None),
            state,
        });

        let weak: Weak<Shared> = Arc::downgrade(&shared);
        shared.light.on_manual_override(move || {
            if let Some(shared) = weak.upgrade() {
                AutoModeController { shared }.handle_manual_override();
            }
        });

        Self { shared }
    }

    /// Applies the configured initial state.
    pub fn start(&self, enabled: bool) {
        if enabled {
            self.enable();
        } else {
            tracing::info!("Auto mode starts disabled");
        }
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> AutoModeState {
        *self.shared.state.borrow()
    }

    /// Returns true while automatic tracking is active.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.state().is_enabled()
    }

    /// Subscribes to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AutoModeState> {
        self.shared.state.subscribe()
    }

    /// Returns the recomputation interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.shared.interval
    }

    /// Returns the light controller being driven.
    #[must_use]
    pub fn light(&self) -> &LightStateController {
        &self.shared.light
    }

    /// Enables automatic tracking.
    ///
    /// Pushes the ideal temperature immediately, then (re)starts the
    /// periodic timer. Calling this while enabled restarts the timer; there
    /// is never more than one.
    pub fn enable(&self) {
        let mut timer = self.shared.timer.lock();
        if let Some(handle) = timer.take() {
            handle.abort();
        }

        self.shared.light.set_tracking(true);
        if self.shared.set_state(AutoModeState::Enabled) {
            tracing::info!(interval_secs = self.shared.interval.as_secs(), "Auto mode enabled");
        }

        self.shared.update(true);
        *timer = Some(self.spawn_timer());
    }

    /// Disables automatic tracking. Does nothing if already disabled.
    pub fn disable(&self) {
        if let Some(handle) = self.shared.timer.lock().take() {
            handle.abort();
        }
        self.shared.light.set_tracking(false);
        if self.shared.set_state(AutoModeState::Disabled) {
            tracing::info!("Auto mode disabled");
        }
    }

    /// Sets the state; `true` enables, `false` disables.
    pub fn set_enabled(&self, enabled: bool) {
        if enabled {
            self.enable();
        } else {
            self.disable();
        }
    }

    /// Recomputes now, without touching the timer.
    ///
    /// Returns the temperature the lights are heading to. While disabled the
    /// lights are left alone.
    pub fn update_now(&self) -> Kelvin {
        self.shared.update(false)
    }

    /// Disables automatic tracking after a user-driven change.
    pub fn handle_manual_override(&self) {
        if self.is_enabled() {
            tracing::info!("Manual change detected, disabling auto mode");
            self.disable();
        }
    }

    fn spawn_timer(&self) -> JoinHandle<()> {
        let shared = Arc::downgrade(&self.shared);
        let period = self.shared.interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = shared.upgrade() else {
                    break;
                };
                shared.update(false);
                if !shared.state.borrow().is_enabled() {
                    break;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{EnqueueOutcome, UpdateSink};
    use crate::light::DEFAULT_INPUT_DEBOUNCE;
    use crate::solar::{AstronomyProvider, SolarConfig};
    use crate::types::{LightId, TemperatureRange};
    use chrono::{DateTime, NaiveDate, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Barrier;

    /// Half sine between 06:00 and 18:00 UTC peaking at noon.
    struct Dial;

    impl AstronomyProvider for Dial {
        fn solar_altitude(&self, time: DateTime<Utc>, _lat: f64, _lon: f64) -> f64 {
            use chrono::Timelike;
            let hours = f64::from(time.num_seconds_from_midnight()) / 3600.0;
            ((hours - 6.0) / 12.0 * std::f64::consts::PI).sin()
        }

        fn solar_noon(&self, date: NaiveDate, _lat: f64, _lon: f64) -> DateTime<Utc> {
            date.and_hms_opt(12, 0, 0).unwrap().and_utc()
        }
    }

    /// Dial that can hold one altitude computation until released.
    struct GatedDial {
        armed: AtomicBool,
        entered: Barrier,
        release: Barrier,
    }

    impl GatedDial {
        fn new() -> Self {
            Self {
                armed: AtomicBool::new(false),
                entered: Barrier::new(2),
                release: Barrier::new(2),
            }
        }
    }

    impl AstronomyProvider for GatedDial {
        fn solar_altitude(&self, time: DateTime<Utc>, lat: f64, lon: f64) -> f64 {
            if self.armed.swap(false, Ordering::SeqCst) {
                self.entered.wait();
                self.release.wait();
            }
            Dial.solar_altitude(time, lat, lon)
        }

        fn solar_noon(&self, date: NaiveDate, lat: f64, lon: f64) -> DateTime<Utc> {
            Dial.solar_noon(date, lat, lon)
        }
    }

    struct ManualClock(Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn at(hour: u32) -> Arc<Self> {
            Arc::new(Self(Mutex::new(
                Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
            )))
        }

        fn set_hour(&self, hour: u32) {
            *self.0.lock() = Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap();
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    #[derive(Default)]
    struct CountingSink(Mutex<Vec<Kelvin>>);

    impl UpdateSink for CountingSink {
        fn submit(&self, _light: &LightId, target: Kelvin) -> EnqueueOutcome {
            self.0.lock().push(target);
            EnqueueOutcome::Queued
        }
    }

    const INTERVAL: Duration = Duration::from_secs(60);

    fn setup(clock: Arc<ManualClock>) -> (AutoModeController, Arc<CountingSink>) {
        setup_with(clock, Arc::new(Dial))
    }

    fn setup_with(
        clock: Arc<ManualClock>,
        sun: Arc<dyn AstronomyProvider>,
    ) -> (AutoModeController, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        let light = LightStateController::new(
            sink.clone(),
            vec![LightId::new("a")],
            TemperatureRange::default(),
            DEFAULT_INPUT_DEBOUNCE,
        );
        let config = SolarConfig::new(45.0, 0.001, TemperatureRange::default(), 1.0)
            .unwrap()
            .with_update_interval(INTERVAL)
            .unwrap();
        let calculator = SolarTransitionCalculator::with_astronomy(config, sun);
        (AutoModeController::new(calculator, light, clock), sink)
    }

    #[tokio::test(start_paused = true)]
    async fn enable_pushes_immediately() {
        let (auto, sink) = setup(ManualClock::at(12));
        assert_eq!(auto.state(), AutoModeState::Disabled);

        auto.enable();
        assert!(auto.is_enabled());
        assert_eq!(auto.light().current_temperature().value(), 6500);

        tokio::time::sleep(DEFAULT_INPUT_DEBOUNCE).await;
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn enable_pushes_even_when_unchanged() {
        // Night: ideal equals the initial warm value
        let (auto, sink) = setup(ManualClock::at(2));
        auto.start(true);

        tokio::time::sleep(DEFAULT_INPUT_DEBOUNCE).await;
        assert_eq!(sink.0.lock().as_slice(), &[Kelvin::new(2700).unwrap()]);
    }

    #[tokio::test(start_paused = true)]
    async fn timer_follows_the_sun() {
        let clock = ManualClock::at(6);
        let (auto, _sink) = setup(clock.clone());
        auto.enable();
        assert_eq!(auto.light().current_temperature().value(), 2700);

        clock.set_hour(12);
        tokio::time::sleep(INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(auto.light().current_temperature().value(), 6500);
    }

    #[tokio::test(start_paused = true)]
    async fn unchanged_tick_refreshes_projection() {
        let (auto, sink) = setup(ManualClock::at(12));
        auto.enable();
        tokio::time::sleep(DEFAULT_INPUT_DEBOUNCE).await;

        let mut rx = auto.light().subscribe();
        rx.borrow_and_update();

        tokio::time::sleep(INTERVAL).await;
        assert!(rx.has_changed().unwrap());
        tokio::time::sleep(DEFAULT_INPUT_DEBOUNCE).await;
        assert_eq!(sink.0.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn manual_change_disables_auto_mode() {
        let clock = ManualClock::at(6);
        let (auto, _sink) = setup(clock.clone());
        auto.enable();
        let states = auto.subscribe();

        let manual = auto.light().set_target_by_slider(50).unwrap();
        assert_eq!(auto.state(), AutoModeState::Disabled);
        assert!(states.has_changed().unwrap());

        clock.set_hour(12);
        tokio::time::sleep(INTERVAL * 3).await;
        assert_eq!(auto.light().current_temperature(), manual);
    }

    #[tokio::test(start_paused = true)]
    async fn override_while_disabled_is_noop() {
        let (auto, _sink) = setup(ManualClock::at(6));
        let states = auto.subscribe();

        auto.handle_manual_override();
        auto.disable();
        assert_eq!(auto.state(), AutoModeState::Disabled);
        assert!(!states.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn double_enable_keeps_one_timer() {
        let clock = ManualClock::at(6);
        let (auto, _sink) = setup(clock.clone());
        let mut rx = auto.light().subscribe();

        auto.enable();
        tokio::time::sleep(Duration::from_secs(30)).await;
        auto.enable();
        tokio::time::sleep(Duration::from_secs(1)).await;
        rx.borrow_and_update();

        // A leftover first timer would fire at 60s
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(!rx.has_changed().unwrap());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert!(rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn disable_stops_timer() {
        let clock = ManualClock::at(6);
        let (auto, _sink) = setup(clock.clone());
        auto.enable();
        auto.disable();

        clock.set_hour(12);
        tokio::time::sleep(INTERVAL * 2).await;
        assert_eq!(auto.light().current_temperature().value(), 2700);
    }

    #[tokio::test(start_paused = true)]
    async fn update_now_follows_clock_while_enabled() {
        let clock = ManualClock::at(6);
        let (auto, _sink) = setup(clock.clone());
        auto.enable();

        clock.set_hour(12);
        assert_eq!(auto.update_now().value(), 6500);
        assert_eq!(auto.light().current_temperature().value(), 6500);
    }

    #[tokio::test(start_paused = true)]
    async fn update_now_leaves_lights_alone_while_disabled() {
        let clock = ManualClock::at(6);
        let (auto, sink) = setup(clock.clone());

        clock.set_hour(12);
        assert_eq!(auto.update_now().value(), 2700);
        tokio::time::sleep(DEFAULT_INPUT_DEBOUNCE * 2).await;
        assert!(sink.0.lock().is_empty());
        assert_eq!(auto.state(), AutoModeState::Disabled);
    }

    #[tokio::test(start_paused = true)]
    async fn set_enabled_toggles_tracking() {
        let (auto, _sink) = setup(ManualClock::at(12));

        auto.set_enabled(true);
        assert!(auto.is_enabled());
        assert!(auto.light().is_tracking());

        auto.set_enabled(false);
        assert_eq!(auto.state(), AutoModeState::Disabled);
        assert!(!auto.light().is_tracking());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn in_flight_update_yields_to_manual_change() {
        let sun = Arc::new(GatedDial::new());
        let clock = ManualClock::at(6);
        let (auto, sink) = setup_with(clock.clone(), sun.clone());
        auto.enable();
        clock.set_hour(12);

        // Hold the next recomputation inside the sun model
        sun.armed.store(true, Ordering::SeqCst);
        let ticking = auto.clone();
        let update = tokio::task::spawn_blocking(move || ticking.update_now());
        let gate = sun.clone();
        tokio::task::spawn_blocking(move || gate.entered.wait())
            .await
            .unwrap();

        let manual = auto.light().set_target_by_slider(50).unwrap();

        let gate = sun.clone();
        tokio::task::spawn_blocking(move || gate.release.wait())
            .await
            .unwrap();
        assert_eq!(update.await.unwrap(), manual);

        assert_eq!(auto.state(), AutoModeState::Disabled);
        assert_eq!(auto.light().target_temperature(), manual);

        tokio::time::sleep(DEFAULT_INPUT_DEBOUNCE * 2).await;
        assert_eq!(auto.light().current_temperature(), manual);
        assert_eq!(sink.0.lock().last(), Some(&manual));
    }
}
