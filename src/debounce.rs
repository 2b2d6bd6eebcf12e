// MIT License - Copyright (c) 2026 Peter Wright
// Zone off-delay hold

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::event::{EventBus, PanelEvent, Subscription, Topic};
use crate::state::PanelState;

type ChangeCallback = Arc<dyn Fn(u32, bool) + Send + Sync>;

struct HoldState {
    raw_open: bool,
    held_on: bool,
    /// Bumped whenever a pending timer is cancelled so a timer that already
    /// woke up cannot clear a newer hold.
    generation: u64,
    timer: Option<JoinHandle<()>>,
    presented: bool,
}

impl HoldState {
    fn is_on(&self) -> bool {
        self.held_on || self.raw_open
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.generation += 1;
    }

    /// Record the current presented state, returning it if it changed.
    fn refresh(&mut self) -> Option<bool> {
        let now = self.is_on();
        if now == self.presented {
            None
        } else {
            self.presented = now;
            Some(now)
        }
    }
}

/// Presents a zone as open for a fixed delay after it closes.
///
/// Motion sensors report open/close within about a second, and the panel
/// often repeats close events. A close starts a single hold; repeated closes
/// during the hold do not extend it, and an open cancels it.
///
/// `on_change` runs whenever the presented state flips, outside any lock.
/// Timers are spawned on the current Tokio runtime.
pub struct ZoneDebouncer {
    zone_id: u32,
    off_delay: Duration,
    inner: Arc<Mutex<HoldState>>,
    on_change: ChangeCallback,
}

impl ZoneDebouncer {
    pub fn new<F>(zone_id: u32, off_delay: Duration, on_change: F) -> Self
    where
        F: Fn(u32, bool) + Send + Sync + 'static,
    {
        Self::with_initial(zone_id, off_delay, false, on_change)
    }

    /// Seed with the zone's current raw state. No hold is started.
    pub fn with_initial<F>(zone_id: u32, off_delay: Duration, raw_open: bool, on_change: F) -> Self
    where
        F: Fn(u32, bool) + Send + Sync + 'static,
    {
        Self {
            zone_id,
            off_delay,
            inner: Arc::new(Mutex::new(HoldState {
                raw_open,
                held_on: false,
                generation: 0,
                timer: None,
                presented: raw_open,
            })),
            on_change: Arc::new(on_change),
        }
    }

    pub fn zone_id(&self) -> u32 {
        self.zone_id
    }

    /// Feed a raw open/closed observation.
    pub fn observe(&self, raw_open: bool) {
        let changed = {
            let mut st = lock(&self.inner);
            st.raw_open = raw_open;
            if raw_open {
                st.cancel_timer();
                st.held_on = false;
            } else if !st.held_on {
                st.held_on = true;
                st.timer = Some(self.spawn_expiry(st.generation));
                trace!("Zone {} closed, holding for {}s", self.zone_id, self.off_delay.as_secs());
            } else {
                trace!("Zone {} duplicate close ignored", self.zone_id);
            }
            st.refresh()
        };

        if let Some(on) = changed {
            (self.on_change)(self.zone_id, on);
        }
    }

    /// Presented state: held or raw open.
    pub fn is_on(&self) -> bool {
        lock(&self.inner).is_on()
    }

    pub fn is_holding(&self) -> bool {
        lock(&self.inner).held_on
    }

    pub fn raw_open(&self) -> bool {
        lock(&self.inner).raw_open
    }

    fn spawn_expiry(&self, generation: u64) -> JoinHandle<()> {
        let inner = Arc::clone(&self.inner);
        let on_change = Arc::clone(&self.on_change);
        let zone_id = self.zone_id;
        let delay = self.off_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let changed = {
                let mut st = lock(&inner);
                if st.generation != generation {
                    return;
                }
                st.held_on = false;
                st.timer = None;
                st.refresh()
            };
            trace!("Zone {} hold expired", zone_id);
            if let Some(on) = changed {
                on_change(zone_id, on);
            }
        })
    }
}

impl Drop for ZoneDebouncer {
    fn drop(&mut self) {
        lock(&self.inner).cancel_timer();
    }
}

impl std::fmt::Debug for ZoneDebouncer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = lock(&self.inner);
        f.debug_struct("ZoneDebouncer")
            .field("zone_id", &self.zone_id)
            .field("off_delay", &self.off_delay)
            .field("raw_open", &st.raw_open)
            .field("held_on", &st.held_on)
            .finish()
    }
}

fn lock(inner: &Mutex<HoldState>) -> MutexGuard<'_, HoldState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A [`ZoneDebouncer`] fed from `new_zone` and `zone_update` notifications
/// for one zone.
///
/// May be attached before the zone has been reported; its first report then
/// seeds the debouncer. Unsubscribes and cancels any pending hold when dropped.
#[derive(Debug)]
pub struct ZoneSensor {
    debouncer: Arc<ZoneDebouncer>,
    _subscriptions: [Subscription; 2],
}

impl ZoneSensor {
    pub fn attach<F>(
        bus: &EventBus,
        state: Arc<PanelState>,
        zone_id: u32,
        off_delay: Duration,
        on_change: F,
    ) -> Self
    where
        F: Fn(u32, bool) + Send + Sync + 'static,
    {
        let raw_open = state.zone(zone_id).is_some_and(|z| z.open);
        let debouncer = Arc::new(ZoneDebouncer::with_initial(zone_id, off_delay, raw_open, on_change));

        let subscribe = |topic: Topic| {
            let feed = Arc::clone(&debouncer);
            let state = Arc::clone(&state);
            bus.subscribe(topic, move |event| {
                let Some(zone) = state.zone(zone_id) else {
                    return;
                };
                match *event {
                    // Unseen until now: a closed first report matches the seed
                    PanelEvent::NewZone { zone_id: id } if id == zone_id => {
                        if zone.open {
                            feed.observe(true);
                        }
                    }
                    PanelEvent::ZoneUpdate { zone_id: id } if id == zone_id => feed.observe(zone.open),
                    _ => {}
                }
            })
        };
        let subscriptions = [subscribe(Topic::NewZone), subscribe(Topic::ZoneUpdate)];

        Self {
            debouncer,
            _subscriptions: subscriptions,
        }
    }

    pub fn zone_id(&self) -> u32 {
        self.debouncer.zone_id()
    }

    pub fn is_on(&self) -> bool {
        self.debouncer.is_on()
    }

    pub fn is_holding(&self) -> bool {
        self.debouncer.is_holding()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ZONE_OFF_DELAY;
    use crate::dispatch::Dispatcher;
    use tokio::time::sleep;

    type Log = Arc<Mutex<Vec<(u32, bool)>>>;

    fn recorder() -> (Log, impl Fn(u32, bool) + Send + Sync + 'static) {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |zone, on| sink.lock().unwrap().push((zone, on)))
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[tokio::test(start_paused = true)]
    async fn test_hold_timeline_with_duplicate_close() {
        let (log, cb) = recorder();
        let zone = ZoneDebouncer::new(3, ZONE_OFF_DELAY, cb);

        // t=0 open
        zone.observe(true);
        assert!(zone.is_on());

        // t=1 close: still presented open
        sleep(ms(1000)).await;
        zone.observe(false);
        assert!(zone.is_on());
        assert!(zone.is_holding());

        // t=3 duplicate close must not extend the hold
        sleep(ms(2000)).await;
        zone.observe(false);

        // t=5.9 still held
        sleep(ms(2900)).await;
        assert!(zone.is_on());

        // t=6.1 released
        sleep(ms(200)).await;
        assert!(!zone.is_on());
        assert!(!zone.is_holding());

        assert_eq!(*log.lock().unwrap(), vec![(3, true), (3, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_during_hold_cancels_timer() {
        let (log, cb) = recorder();
        let zone = ZoneDebouncer::new(1, ZONE_OFF_DELAY, cb);

        zone.observe(true);
        sleep(ms(1000)).await;
        zone.observe(false);
        sleep(ms(1000)).await;
        zone.observe(true);
        assert!(!zone.is_holding());

        // Well past the original expiry, still open
        sleep(ms(10_000)).await;
        assert!(zone.is_on());
        assert_eq!(*log.lock().unwrap(), vec![(1, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_hold_after_reopen_gets_full_delay() {
        let (log, cb) = recorder();
        let zone = ZoneDebouncer::new(2, ZONE_OFF_DELAY, cb);

        zone.observe(true);
        zone.observe(false); // t=0 hold #1
        sleep(ms(4000)).await;
        zone.observe(true);
        zone.observe(false); // t=4 hold #2

        sleep(ms(4500)).await; // t=8.5, past hold #1 expiry
        assert!(zone.is_on());
        sleep(ms(1000)).await; // t=9.5
        assert!(!zone.is_on());
        assert_eq!(*log.lock().unwrap(), vec![(2, true), (2, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seeded_state_has_no_hold() {
        let (log, cb) = recorder();
        let zone = ZoneDebouncer::with_initial(4, ZONE_OFF_DELAY, true, cb);
        assert!(zone.is_on());
        assert!(!zone.is_holding());

        zone.observe(false);
        assert!(zone.is_on());
        sleep(ZONE_OFF_DELAY + ms(1)).await;
        assert!(!zone.is_on());
        assert_eq!(*log.lock().unwrap(), vec![(4, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending_hold() {
        let (log, cb) = recorder();
        let zone = ZoneDebouncer::new(5, ZONE_OFF_DELAY, cb);
        zone.observe(true);
        zone.observe(false);
        drop(zone);

        sleep(ZONE_OFF_DELAY * 2).await;
        assert_eq!(*log.lock().unwrap(), vec![(5, true)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_follows_dispatched_updates() {
        let state = Arc::new(PanelState::new());
        let bus = EventBus::new();
        let dispatcher = Dispatcher::new(Arc::clone(&state), bus.clone());
        dispatcher.dispatch(br#"{"type":"zone_status","zone":7,"open":false}"#);

        let (log, cb) = recorder();
        let sensor = ZoneSensor::attach(&bus, Arc::clone(&state), 7, ZONE_OFF_DELAY, cb);
        assert!(!sensor.is_on());

        // Other zones are ignored
        dispatcher.dispatch(br#"{"type":"zone_status","zone":8,"open":true}"#);
        dispatcher.dispatch(br#"{"type":"zone_status","zone":8,"open":true}"#);
        assert!(!sensor.is_on());

        dispatcher.dispatch(br#"{"type":"zone_status","zone":7,"open":true}"#);
        assert!(sensor.is_on());
        dispatcher.dispatch(br#"{"type":"zone_status","zone":7,"open":false}"#);
        assert!(sensor.is_holding());

        sleep(ZONE_OFF_DELAY + ms(100)).await;
        assert!(!sensor.is_on());
        assert_eq!(*log.lock().unwrap(), vec![(7, true), (7, false)]);

        drop(sensor);
        assert_eq!(bus.handler_count(Topic::ZoneUpdate), 0);
        assert_eq!(bus.handler_count(Topic::NewZone), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sensor_attached_before_first_report() {
        let state = Arc::new(PanelState::new());
        let bus = EventBus::new();
        let dispatcher = Dispatcher::new(Arc::clone(&state), bus.clone());

        let (log, cb) = recorder();
        let sensor = ZoneSensor::attach(&bus, Arc::clone(&state), 3, ZONE_OFF_DELAY, cb);
        assert!(!sensor.is_on());

        assert_eq!(
            dispatcher.dispatch(br#"{"type":"zone_status","zone":3,"open":true}"#),
            Some(PanelEvent::NewZone { zone_id: 3 })
        );
        assert!(sensor.is_on());
        assert!(!sensor.is_holding());

        dispatcher.dispatch(br#"{"type":"zone_status","zone":3,"open":false}"#);
        assert!(sensor.is_holding());
        sleep(ZONE_OFF_DELAY + ms(100)).await;
        assert!(!sensor.is_on());
        assert_eq!(*log.lock().unwrap(), vec![(3, true), (3, false)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_first_report_starts_no_hold() {
        let state = Arc::new(PanelState::new());
        let bus = EventBus::new();
        let dispatcher = Dispatcher::new(Arc::clone(&state), bus.clone());

        let (log, cb) = recorder();
        let sensor = ZoneSensor::attach(&bus, Arc::clone(&state), 4, ZONE_OFF_DELAY, cb);
        dispatcher.dispatch(br#"{"type":"zone_status","zone":4,"open":false}"#);

        assert!(!sensor.is_on());
        assert!(!sensor.is_holding());
        assert!(log.lock().unwrap().is_empty());
    }
}
