//! # Sync Engine
//!
//! The single interface the UI uses: `refresh`, `place` and `subscribe`.
//! It owns the canvas mirror and the cooldown guard, and serializes every
//! mutation through one lock.
//!
//! ## Placement
//!
//! ```text
//! place(x, y, "#rrggbb")
//!   │ bounds ─▶ color ─▶ ready ─▶ in flight? ─▶ account ─▶ cooldown
//!   │            (ready: loaded, not loading, no error)
//!   │                      (all local; any failure = no remote call)
//!   ▼
//! record cooldown, pending tx, optimistic pixel      [lock]
//!   │
//!   ▼
//! gateway.submit_pixel(..).await                      [no lock]
//!   │
//!   ├─ Confirmed ─▶ reconcile                          [lock]
//!   └─ Failure   ─▶ rollback (cooldown kept unless ResetCooldown)
//! ```
//!
//! Refreshes and submissions run as spawned tasks, so dropping the
//! returned future never strands the engine in `Loading` or `Submitting`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use pixelwar_chain::{ChainGateway, ChangeCallback, ChangeSubscription, Confirmation, PixelChange, RowFetch};
use pixelwar_core::{
    AccountProvider, Address, CanvasCache, CanvasError, CanvasResult, Clock, Coord, CooldownGuard,
    CooldownStatus, FailurePolicy, Grid, GridSize, Notice, NoticeLevel, PartialLoadFailure,
    PixelState, Rgb, SyncConfig, Timestamp,
};

use crate::notify::{CanvasEvent, ListenerRegistry, Subscription};
use crate::state::{EngineState, PendingTransaction, TxPhase};

/// Engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EngineOptions {
    /// Minimum time between two placements of one account.
    pub cooldown: Duration,
    /// What a failed placement does to the cooldown.
    pub failure_policy: FailurePolicy,
    /// Color shown before the first load. Failed rows carry the gateway's
    /// own fallback color.
    pub fallback: Rgb,
    /// Lifetime of notices.
    pub notice_ttl: Duration,
}

impl EngineOptions {
    /// Takes the engine settings from a configuration.
    #[must_use]
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            cooldown: config.cooldown(),
            failure_policy: config.failure_policy(),
            fallback: config.fallback(),
            notice_ttl: config.notice_ttl(),
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

/// Outcome of a [`SyncEngine::refresh`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshReport {
    /// The effective grid after merging.
    pub grid: Grid,
    /// Rows that fell back, if any.
    pub warning: Option<PartialLoadFailure>,
    /// A newer refresh was issued first; this result was discarded.
    pub superseded: bool,
}

struct EngineCore {
    cache: CanvasCache,
    cooldown: CooldownGuard,
    pending: Option<PendingTransaction>,
    loaded: bool,
    /// Sequence number of the newest refresh still in flight.
    loading: Option<u64>,
    error: Option<CanvasError>,
    last_warning: Option<PartialLoadFailure>,
    notice: Option<Notice>,
    /// Newest refresh number issued when each coordinate was last confirmed.
    confirmed_at_seq: HashMap<Coord, u64>,
}

impl EngineCore {
    fn state(&self) -> EngineState {
        if self.error.is_some() {
            EngineState::Error
        } else if self.pending.is_some() {
            EngineState::Submitting
        } else if self.loading.is_some() {
            EngineState::Loading
        } else if self.loaded {
            EngineState::Ready
        } else {
            EngineState::Idle
        }
    }

    fn post(&mut self, notice: Notice, events: &mut Vec<CanvasEvent>) {
        self.notice = Some(notice.clone());
        events.push(CanvasEvent::Notice(notice));
    }

    /// Merges a fetched row, skipping cells confirmed after refresh `seq`
    /// was issued.
    fn merge_row(&mut self, seq: u64, row: &RowFetch) -> CanvasResult<Vec<Coord>> {
        let y = row.y();
        let mut changed = Vec::new();
        for (x, &color) in (0u32..).zip(row.colors()) {
            let coord = Coord::new(x, y);
            if self.confirmed_at_seq.get(&coord).is_some_and(|&at| at >= seq) {
                continue;
            }
            if self.cache.apply_remote(coord, color, None)? {
                changed.push(coord);
            }
        }
        Ok(changed)
    }
}

struct Shared<G> {
    gateway: G,
    accounts: Arc<dyn AccountProvider>,
    clock: Arc<dyn Clock>,
    options: EngineOptions,
    core: Mutex<EngineCore>,
    listeners: Arc<ListenerRegistry>,
    refresh_seq: AtomicU64,
    live: Mutex<Option<ChangeSubscription>>,
}

impl<G> Shared<G> {
    /// Runs `f` under the engine lock, then notifies listeners of the
    /// events it produced, plus a state change if there was one.
    fn with_core<R>(&self, f: impl FnOnce(&mut EngineCore, &mut Vec<CanvasEvent>) -> R) -> R {
        let mut events = Vec::new();
        let result = {
            let mut core = self.core.lock();
            let before = core.state();
            let result = f(&mut core, &mut events);
            let after = core.state();
            if before != after {
                debug!(%before, %after, "engine state changed");
                events.insert(0, CanvasEvent::StateChanged(after));
            }
            result
        };
        self.listeners.dispatch(&events);
        result
    }

    fn notice(&self, level: NoticeLevel, message: impl Into<String>) -> Notice {
        Notice::new(level, message, self.clock.now(), self.options.notice_ttl)
    }

    fn mark_confirmed(&self, core: &mut EngineCore, coord: Coord) {
        let seq = self.refresh_seq.load(Ordering::SeqCst);
        core.confirmed_at_seq.insert(coord, seq);
    }

    fn apply_change(&self, change: &PixelChange) {
        self.with_core(|core, events| {
            if core.cache.size().contains(change.coord) {
                self.mark_confirmed(core, change.coord);
            }
            match core
                .cache
                .apply_remote(change.coord, change.color, Some(change.timestamp))
            {
                Ok(true) => events.push(CanvasEvent::GridChanged(vec![change.coord])),
                Ok(false) => {}
                Err(error) => warn!(%error, "ignoring change outside the canvas"),
            }
        });
    }
}

impl<G: ChainGateway> Shared<G> {
    async fn run_refresh(&self, seq: u64) -> CanvasResult<RefreshReport> {
        let fetched = self.gateway.fetch_all().await;

        self.with_core(|core, events| {
            if core.loading != Some(seq) {
                debug!(seq, "refresh superseded, discarding result");
                return Ok(RefreshReport {
                    grid: core.cache.snapshot(),
                    warning: None,
                    superseded: true,
                });
            }
            core.loading = None;

            let fetch = match fetched {
                Ok(fetch) => fetch,
                Err(error) => {
                    warn!(%error, "canvas load failed");
                    core.error = Some(error.clone());
                    core.post(self.notice(NoticeLevel::Error, "Failed to load the grid"), events);
                    return Err(error);
                }
            };

            // Failed rows show the fallback on every load.
            let mut changed = Vec::new();
            for row in &fetch.rows {
                changed.extend(core.merge_row(seq, row)?);
            }
            core.confirmed_at_seq.retain(|_, at| *at > seq);
            core.loaded = true;
            core.error = None;
            core.last_warning = fetch.warning();

            if !changed.is_empty() {
                events.push(CanvasEvent::GridChanged(changed));
            }
            match core.last_warning.clone() {
                Some(warning) => {
                    warn!(%warning, "canvas loaded with fallback rows");
                    let message = format!("Grid loaded with errors ({warning})");
                    events.push(CanvasEvent::Warning(warning));
                    core.post(self.notice(NoticeLevel::Warning, message), events);
                }
                None => info!(seq, "canvas loaded"),
            }

            Ok(RefreshReport {
                grid: core.cache.snapshot(),
                warning: core.last_warning.clone(),
                superseded: false,
            })
        })
    }

    /// Local checks and bookkeeping before anything is sent.
    fn begin_placement(
        &self,
        coord: Coord,
        color: Rgb,
        now: Timestamp,
    ) -> CanvasResult<(Address, Option<Timestamp>)> {
        self.with_core(|core, events| {
            if !core.loaded || core.loading.is_some() || core.error.is_some() {
                return Err(CanvasError::NotReady);
            }
            if core.pending.is_some() {
                return Err(CanvasError::SubmissionInProgress);
            }
            let Some(account) = self.accounts.current_account() else {
                core.post(self.notice(NoticeLevel::Error, "Connect wallet first!"), events);
                return Err(CanvasError::AccountUnavailable);
            };

            core.cooldown.bind(account);
            let status = core.cooldown.can_submit(now);
            if !status.allowed {
                let message = format!("Please wait {} seconds", status.remaining_secs());
                core.post(self.notice(NoticeLevel::Warning, message), events);
                return Err(CanvasError::CooldownActive {
                    remaining: status.remaining,
                });
            }

            let previous = core.cooldown.record_submission(now);
            core.pending = Some(PendingTransaction::submitted(coord, color, now));
            if core.cache.apply_optimistic(coord, color)? {
                events.push(CanvasEvent::GridChanged(vec![coord]));
            }
            Ok((account, previous))
        })
    }

    async fn finish_placement(
        &self,
        account: Address,
        coord: Coord,
        color: Rgb,
        previous: Option<Timestamp>,
    ) -> CanvasResult<Confirmation> {
        let result = self.gateway.submit_pixel(account, coord, color).await;

        self.with_core(|core, events| {
            let tx = core.pending.take();
            match result {
                Ok(confirmation) => {
                    self.mark_confirmed(core, coord);
                    if core
                        .cache
                        .reconcile(coord, confirmation.color, confirmation.confirmed_at)?
                    {
                        events.push(CanvasEvent::GridChanged(vec![coord]));
                    }
                    let message = format!("Pixel placed at ({}, {})", coord.x, coord.y);
                    core.post(self.notice(NoticeLevel::Success, message), events);
                    if let Some(tx) = tx {
                        events.push(CanvasEvent::TransactionSettled(tx.settle(TxPhase::Confirmed)));
                    }
                    Ok(confirmation)
                }
                Err(failure) => {
                    if core.cache.rollback_optimistic(coord)? {
                        events.push(CanvasEvent::GridChanged(vec![coord]));
                    }
                    if self.options.failure_policy == FailurePolicy::ResetCooldown {
                        core.cooldown.restore(previous);
                    }
                    if failure.is_unrecoverable() {
                        core.error = Some(CanvasError::from(failure.clone()));
                    }
                    let message = format!("Transaction failed: {failure}");
                    core.post(self.notice(NoticeLevel::Error, message), events);
                    if let Some(tx) = tx {
                        events.push(CanvasEvent::TransactionSettled(tx.settle(TxPhase::Failed)));
                    }
                    Err(CanvasError::from(failure))
                }
            }
        })
    }
}

/// The canvas sync engine. Clones share the same engine.
pub struct SyncEngine<G> {
    shared: Arc<Shared<G>>,
}

impl<G> Clone for SyncEngine<G> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<G: ChainGateway + 'static> SyncEngine<G> {
    /// Creates an engine in `Idle`. The canvas size comes from the gateway
    /// and is fixed for the engine's lifetime; every pixel shows the
    /// fallback color until the first [`Self::refresh`].
    #[must_use]
    pub fn new(
        gateway: G,
        accounts: Arc<dyn AccountProvider>,
        clock: Arc<dyn Clock>,
        options: EngineOptions,
    ) -> Self {
        let size = gateway.size();
        Self {
            shared: Arc::new(Shared {
                gateway,
                accounts,
                clock,
                options,
                core: Mutex::new(EngineCore {
                    cache: CanvasCache::new(size, options.fallback),
                    cooldown: CooldownGuard::new(options.cooldown),
                    pending: None,
                    loaded: false,
                    loading: None,
                    error: None,
                    last_warning: None,
                    notice: None,
                    confirmed_at_seq: HashMap::new(),
                }),
                listeners: Arc::new(ListenerRegistry::new()),
                refresh_seq: AtomicU64::new(0),
                live: Mutex::new(None),
            }),
        }
    }

    /// The gateway in use.
    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.shared.gateway
    }

    /// Canvas dimensions.
    #[must_use]
    pub fn size(&self) -> GridSize {
        self.shared.core.lock().cache.size()
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> EngineState {
        self.shared.core.lock().state()
    }

    /// The effective grid: confirmed colors with the pending overlay.
    #[must_use]
    pub fn snapshot(&self) -> Grid {
        self.shared.core.lock().cache.snapshot()
    }

    /// Full state of one pixel.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds` for coordinates off the canvas.
    pub fn pixel(&self, x: i64, y: i64) -> CanvasResult<PixelState> {
        let core = self.shared.core.lock();
        let coord = core.cache.size().validate(x, y)?;
        Ok(core.cache.pixel(coord).copied().unwrap_or_default())
    }

    /// The placement in flight, if any.
    #[must_use]
    pub fn pending(&self) -> Option<PendingTransaction> {
        self.shared.core.lock().pending
    }

    /// Rows that fell back during the last completed refresh.
    #[must_use]
    pub fn last_warning(&self) -> Option<PartialLoadFailure> {
        self.shared.core.lock().last_warning.clone()
    }

    /// The error that put the engine in `Error`.
    #[must_use]
    pub fn last_error(&self) -> Option<CanvasError> {
        self.shared.core.lock().error.clone()
    }

    /// The latest notice, while it has not expired.
    #[must_use]
    pub fn notice(&self) -> Option<Notice> {
        let now = self.shared.clock.now();
        self.shared
            .core
            .lock()
            .notice
            .clone()
            .filter(|n| !n.is_expired(now))
    }

    /// Total cache mutations so far.
    #[must_use]
    pub fn updates_processed(&self) -> u64 {
        self.shared.core.lock().cache.updates_processed()
    }

    /// Registers a listener for engine events.
    #[must_use = "dropping the subscription unregisters the listener"]
    pub fn subscribe(
        &self,
        listener: impl Fn(&CanvasEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.shared.listeners.subscribe(Arc::new(listener))
    }

    /// Whether the current account may place a pixel now.
    #[must_use]
    pub fn get_cooldown_status(&self) -> CooldownStatus {
        let now = self.shared.clock.now();
        let account = self.shared.accounts.current_account();
        let core = self.shared.core.lock();
        match (account, core.cooldown.account()) {
            // A different account has its own, untouched window.
            (Some(current), Some(bound)) if current != bound.address => CooldownStatus {
                allowed: true,
                remaining: Duration::ZERO,
            },
            _ => core.cooldown.can_submit(now),
        }
    }

    /// Reloads the whole canvas.
    ///
    /// A refresh issued while another is in flight supersedes it; the older
    /// one returns with `superseded` set and its data discarded. Starting a
    /// refresh clears a previous error.
    ///
    /// # Errors
    ///
    /// `RemoteUnavailable` when no row could be read;
    /// the engine is then in `Error`.
    pub async fn refresh(&self) -> CanvasResult<RefreshReport> {
        let seq = self.shared.refresh_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.with_core(|core, _| {
            core.loading = Some(seq);
            core.error = None;
        });
        debug!(seq, "refresh started");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.run_refresh(seq).await })
            .await
            .map_err(|e| CanvasError::RemoteUnavailable(format!("refresh task failed: {e}")))?
    }

    /// Places `color_text` at `(x, y)` and waits for the ledger.
    ///
    /// Every local rule is checked first, in this order: bounds, color,
    /// readiness, in-flight placement, account, cooldown. A violation
    /// returns at once and nothing is sent.
    ///
    /// # Errors
    ///
    /// The validation errors above, or the categorized submission failure.
    /// On failure the optimistic pixel is rolled back.
    pub async fn place(&self, x: i64, y: i64, color_text: &str) -> CanvasResult<Confirmation> {
        let coord = self.size().validate(x, y)?;
        let color = Rgb::parse(color_text)?;
        let now = self.shared.clock.now();

        let (account, previous) = self.shared.begin_placement(coord, color, now)?;
        info!(x = coord.x, y = coord.y, %color, %account, "placing pixel");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move { shared.finish_placement(account, coord, color, previous).await })
            .await
            .map_err(|e| CanvasError::RemoteUnavailable(format!("submission task failed: {e}")))?
    }

    /// Re-reads one pixel and merges it.
    ///
    /// # Errors
    ///
    /// `CoordinateOutOfBounds`, or the read failure.
    pub async fn refresh_pixel(&self, x: i64, y: i64) -> CanvasResult<PixelState> {
        let coord = self.size().validate(x, y)?;
        let read = self.shared.gateway.fetch_pixel(coord).await?;
        self.shared.with_core(|core, events| {
            self.shared.mark_confirmed(core, coord);
            if core.cache.apply_remote(coord, read.color, read.last_changed)? {
                events.push(CanvasEvent::GridChanged(vec![coord]));
            }
            Ok(core.cache.pixel(coord).copied().unwrap_or_default())
        })
    }

    /// Leaves `Error`. Returns the resulting state: `Ready` if the canvas
    /// loaded before, otherwise `Idle`.
    pub fn acknowledge_error(&self) -> EngineState {
        self.shared.with_core(|core, _| {
            if let Some(error) = core.error.take() {
                info!(%error, "error acknowledged");
            }
            core.state()
        })
    }

    /// Feeds remote changes into the cache as they happen.
    ///
    /// Returns false when the ledger has no push channel; polling with
    /// [`Self::refresh`] still works.
    pub fn enable_live_updates(&self) -> bool {
        let mut live = self.shared.live.lock();
        if live.is_some() {
            return true;
        }

        let weak = Arc::downgrade(&self.shared);
        let on_change: ChangeCallback = Box::new(move |change: PixelChange| {
            if let Some(shared) = weak.upgrade() {
                shared.apply_change(&change);
            }
        });

        match self.shared.gateway.subscribe_to_changes(on_change) {
            Some(subscription) => {
                info!("live updates enabled");
                *live = Some(subscription);
                true
            }
            None => {
                info!("no change feed available, polling only");
                false
            }
        }
    }

    /// Stops live updates. Returns false if they were not running.
    pub fn disable_live_updates(&self) -> bool {
        let subscription = self.shared.live.lock().take();
        match subscription {
            Some(subscription) => {
                subscription.unsubscribe();
                info!("live updates disabled");
                true
            }
            None => false,
        }
    }

    /// Whether live updates are running.
    #[must_use]
    pub fn live_updates_enabled(&self) -> bool {
        self.shared
            .live
            .lock()
            .as_ref()
            .is_some_and(ChangeSubscription::is_running)
    }
}
