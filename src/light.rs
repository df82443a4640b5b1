// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authoritative light state with debounced delivery.
//!
//! [`LightStateController`] owns the current color temperature and the
//! on/off flag of the group of lights it drives. Every target change
//! restarts a single debounce timer; only the last change within the
//! window is handed to the [`UpdateSink`], once per light.
//!
//! User-driven changes (slider, mired) raise the manual override signal.
//! Automatic changes from the auto mode controller do not.
//!
//! The current value is optimistic. It is never rolled back when a
//! delivery is later dropped by the queue.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::delivery::UpdateSink;
use crate::error::ValueError;
use crate::types::{Kelvin, LightId, Mired, SliderPosition, TemperatureRange};

/// Default quiet period before a target change is delivered.
pub const DEFAULT_INPUT_DEBOUNCE: Duration = Duration::from_millis(750);

type OverrideCallback = Arc<dyn Fn() + Send + Sync>;

/// Presentation view of the light state.
///
/// The three temperature fields are projections of the same value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightSnapshot {
    /// Current temperature.
    pub kelvin: Kelvin,
    /// Current temperature in mired.
    pub mired: Mired,
    /// Current temperature as a slider position over the configured range.
    pub slider: SliderPosition,
    /// Whether the lights are on.
    pub is_on: bool,
}

#[derive(Debug)]
struct LightState {
    current: Kelvin,
    target: Kelvin,
    is_on: bool,
    /// Whether automatic targets are accepted. Cleared by user changes.
    tracking: bool,
    generation: u64,
    debounce: Option<JoinHandle<()>>,
}

struct Shared {
    sink: Arc<dyn UpdateSink>,
    lights: RwLock<Vec<LightId>>,
    range: TemperatureRange,
    debounce: Duration,
    state: Mutex<LightState>,
    snapshot: watch::Sender<LightSnapshot>,
    on_override: RwLock<Option<OverrideCallback>>,
}

impl Shared {
    fn snapshot_of(&self, state: &LightState) -> LightSnapshot {
        LightSnapshot {
            kelvin: state.current,
            mired: state.current.to_mired(),
            slider: self.range.kelvin_to_slider(state.current),
            is_on: state.is_on,
        }
    }

    fn publish(&self, state: &LightState) {
        self.snapshot.send_replace(self.snapshot_of(state));
    }

    /// Handles an expired debounce timer.
    fn fire(&self, generation: u64) {
        let mut state = self.state.lock();
        if state.generation != generation {
            return;
        }
        state.debounce = None;
        state.current = state.target;
        let target = state.target;
        let is_on = state.is_on;
        self.publish(&state);
        drop(state);

        if !is_on {
            tracing::debug!(kelvin = %target, "Lights are off, not delivering");
            return;
        }

        let lights = self.lights.read().clone();
        tracing::info!(kelvin = %target, lights = lights.len(), "Applying color temperature");
        for light in &lights {
            self.sink.submit(light, target);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.state.get_mut().debounce.take() {
            handle.abort();
        }
    }
}

/// Debounced owner of the light state.
///
/// Cloning is cheap; clones share the same state. All methods that change
/// the target spawn a tokio task and must be called within a runtime.
#[derive(Clone)]
pub struct LightStateController {
    shared: Arc<Shared>,
}

impl fmt::Debug for LightStateController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        f.debug_struct("LightStateController")
            .field("lights", &*self.shared.lights.read())
            .field("range", &self.shared.range)
            .field("current", &state.current)
            .field("target", &state.target)
            .field("is_on", &state.is_on)
            .finish_non_exhaustive()
    }
}

impl LightStateController {
    /// Creates a controller for `lights`, initially on at the warm bound.
    pub fn new(
        sink: Arc<dyn UpdateSink>,
        lights: Vec<LightId>,
        range: TemperatureRange,
        debounce: Duration,
    ) -> Self {
        let state = LightState {
            current: range.warm(),
            target: range.warm(),
            is_on: true,
            tracking: false,
            generation: 0,
            debounce: None,
        };
        let initial = LightSnapshot {
            kelvin: state.current,
            mired: state.current.to_mired(),
            slider: range.kelvin_to_slider(state.current),
            is_on: state.is_on,
        };
        let (snapshot, _) = watch::channel(initial);

        Self {
            shared: Arc::new(Shared {
                sink,
                lights: RwLock::new(lights),
                range,
                debounce,
                state: Mutex::new(state),
                snapshot,
                on_override: RwLock::new(None),
            }),
        }
    }

    /// Registers the callback raised on every user-driven target change.
    ///
    /// Replaces any previously registered callback.
    pub fn on_manual_override<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.on_override.write() = Some(Arc::new(callback));
    }

    /// Returns the lights this controller drives.
    #[must_use]
    pub fn lights(&self) -> Vec<LightId> {
        self.shared.lights.read().clone()
    }

    /// Replaces the driven lights. Takes effect from the next delivery.
    pub fn set_lights(&self, lights: Vec<LightId>) {
        *self.shared.lights.write() = lights;
    }

    /// Returns the temperature range.
    #[must_use]
    pub fn range(&self) -> TemperatureRange {
        self.shared.range
    }

    /// Returns the debounce window.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.shared.debounce
    }

    /// Returns the last known temperature.
    #[must_use]
    pub fn current_temperature(&self) -> Kelvin {
        self.shared.state.lock().current
    }

    /// Returns the temperature that will be delivered when the debounce
    /// timer expires.
    #[must_use]
    pub fn target_temperature(&self) -> Kelvin {
        self.shared.state.lock().target
    }

    /// Returns the current temperature as a slider position.
    #[must_use]
    pub fn slider_position(&self) -> SliderPosition {
        self.shared.range.kelvin_to_slider(self.current_temperature())
    }

    /// Returns whether the lights are on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.shared.state.lock().is_on
    }

    /// Returns true while a debounce timer is pending.
    #[must_use]
    pub fn has_pending_delivery(&self) -> bool {
        self.shared.state.lock().debounce.is_some()
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> LightSnapshot {
        *self.shared.snapshot.borrow()
    }

    /// Subscribes to snapshot updates.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LightSnapshot> {
        self.shared.snapshot.subscribe()
    }

    /// Switches the lights on or off.
    ///
    /// Switching on delivers the current target after the debounce window.
    /// Switching off cancels a pending delivery; its target is kept as the
    /// current value and delivered once the lights are switched on again.
    pub fn set_on(&self, on: bool) {
        let mut state = self.shared.state.lock();
        if state.is_on == on {
            return;
        }
        state.is_on = on;

        if on {
            tracing::info!("Lights switched on");
            self.schedule(&mut state);
        } else {
            tracing::info!("Lights switched off");
            if let Some(handle) = state.debounce.take() {
                handle.abort();
            }
            state.generation += 1;
            state.current = state.target;
        }
        self.shared.publish(&state);
    }

    /// Sets a user target from a slider position in `1..=100`.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if `position` is outside `1..=100`.
    pub fn set_target_by_slider(&self, position: u8) -> Result<Kelvin, ValueError> {
        let position = SliderPosition::new(position)?;
        let kelvin = self.shared.range.slider_to_kelvin(position);
        Ok(self.set_user_target(kelvin))
    }

    /// Sets a user target in mired, clamped into the temperature range.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::ZeroTemperature` for zero mired.
    pub fn set_target_by_mired(&self, mired: u32) -> Result<Kelvin, ValueError> {
        let kelvin = Mired::new(mired)?.to_kelvin();
        Ok(self.set_user_target(kelvin))
    }

    /// Sets a user target in Kelvin, clamped into the temperature range.
    pub fn set_target_kelvin(&self, kelvin: Kelvin) -> Kelvin {
        self.set_user_target(kelvin)
    }

    /// Adopts a target computed by the auto mode controller.
    ///
    /// The current value is updated immediately; delivery is debounced. This
    /// does not raise the manual override signal.
    pub fn adopt_automatic_target(&self, kelvin: Kelvin) -> Kelvin {
        let mut state = self.shared.state.lock();
        self.adopt(&mut state, kelvin)
    }

    /// Starts or stops accepting [`adopt_if_tracking`](Self::adopt_if_tracking)
    /// targets. Any user change stops it.
    pub fn set_tracking(&self, tracking: bool) {
        self.shared.state.lock().tracking = tracking;
    }

    /// Returns whether automatic targets are currently accepted.
    #[must_use]
    pub fn is_tracking(&self) -> bool {
        self.shared.state.lock().tracking
    }

    /// Adopts an automatic target unless a user change has happened since
    /// tracking was last switched on.
    ///
    /// The check and the update happen under one lock, so a user change
    /// racing with a recomputation always wins.
    pub fn adopt_if_tracking(&self, kelvin: Kelvin) -> Option<Kelvin> {
        let mut state = self.shared.state.lock();
        if !state.tracking {
            tracing::debug!(%kelvin, "Not tracking, ignoring automatic target");
            return None;
        }
        Some(self.adopt(&mut state, kelvin))
    }

    /// Re-publishes the snapshot even if nothing changed.
    pub fn refresh_projection(&self) {
        let state = self.shared.state.lock();
        self.shared.publish(&state);
    }

    fn adopt(&self, state: &mut LightState, kelvin: Kelvin) -> Kelvin {
        let kelvin = self.shared.range.clamp(kelvin);
        state.current = kelvin;
        state.target = kelvin;
        tracing::debug!(%kelvin, "Adopting automatic target");
        self.schedule(state);
        self.shared.publish(state);
        kelvin
    }

    fn set_user_target(&self, kelvin: Kelvin) -> Kelvin {
        let kelvin = self.shared.range.clamp(kelvin);
        {
            let mut state = self.shared.state.lock();
            state.tracking = false;
            state.target = kelvin;
            tracing::debug!(%kelvin, "User target set");
            self.schedule(&mut state);
        }

        let callback = self.shared.on_override.read().clone();
        if let Some(callback) = callback {
            callback();
        }
        kelvin
    }

    /// Cancels the pending debounce timer and starts a new one.
    fn schedule(&self, state: &mut LightState) {
        if let Some(handle) = state.debounce.take() {
            handle.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let delay = self.shared.debounce;
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        state.debounce = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.fire(generation);
            }
        }));
    }
}
