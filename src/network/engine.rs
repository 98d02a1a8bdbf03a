//! Game Engine
//!
//! Background clock for running matches:
//!
//! - one repeating ticker per started match, advancing the countdown and
//!   the NPCs once per period and publishing the resulting state;
//! - at most one pending vote timeout per match, forcing the verdict when
//!   a meeting runs out of time.
//!
//! Locks are never held across an await other than their own acquisition,
//! and publishing happens after the match guard is dropped.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::game::meeting::MeetingId;
use crate::game::state::{MatchId, MatchStatus};
use crate::network::broadcast::BroadcastSink;
use crate::network::protocol::ServerMessage;
use crate::network::session::MatchHandle;

/// Shortest accepted tick period.
const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

type TaskMap<V> = Arc<RwLock<BTreeMap<MatchId, V>>>;

/// Owns tickers and vote timeouts of every match.
#[derive(Clone)]
pub struct GameEngine {
    sink: Arc<dyn BroadcastSink>,
    tick_period: Duration,
    tickers: TaskMap<JoinHandle<()>>,
    vote_timers: TaskMap<(MeetingId, JoinHandle<()>)>,
}

impl GameEngine {
    /// Create an engine publishing to `sink` every `tick_period`.
    pub fn new(sink: Arc<dyn BroadcastSink>, tick_period: Duration) -> Self {
        Self {
            sink,
            tick_period: tick_period.max(MIN_TICK_PERIOD),
            tickers: Arc::new(RwLock::new(BTreeMap::new())),
            vote_timers: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Tick period.
    pub fn tick_period(&self) -> Duration {
        self.tick_period
    }

    // -------------------------------------------------------------------------
    // Ticker
    // -------------------------------------------------------------------------

    /// Spawn the ticker for a started match, replacing any previous one.
    /// The first tick fires one period from now.
    pub async fn start_match_ticker(&self, handle: MatchHandle) {
        let id = handle.id;
        let engine = self.clone();
        let task = tokio::spawn(async move {
            engine.run_ticker(handle).await;
        });

        let mut tickers = self.tickers.write().await;
        if let Some(previous) = tickers.insert(id, task) {
            previous.abort();
        }
    }

    async fn run_ticker(&self, handle: MatchHandle) {
        let period = self.tick_period;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!("Ticker started for match {}", handle.code);

        loop {
            ticker.tick().await;

            let (snapshot, running) = {
                let mut state = handle.state.write().await;
                if state.status() != MatchStatus::Started {
                    break;
                }
                state.tick_timer();
                state.move_npcs();
                (state.snapshot(), state.status() == MatchStatus::Started)
            };

            self.sink.publish(&handle.code, ServerMessage::GameState(snapshot));
            if !running {
                break;
            }
        }

        info!("Ticker stopped for match {}", handle.code);
        self.tickers.write().await.remove(&handle.id);
        self.abort_vote_timeout(handle.id).await;
    }

    // -------------------------------------------------------------------------
    // Vote timeout
    // -------------------------------------------------------------------------

    /// Run `on_timeout` after `delay` unless cancelled or replaced first.
    ///
    /// Meeting ids grow within a match. Scheduling aborts a timeout pending
    /// for an older meeting, and is refused (returning `false`) when one is
    /// already armed for a newer meeting. The callback receives the meeting
    /// id it was armed for and is expected to resolve only that meeting.
    pub async fn schedule_vote_timeout<F, Fut>(
        &self,
        handle: MatchHandle,
        meeting_id: MeetingId,
        delay: Duration,
        on_timeout: F,
    ) -> bool
    where
        F: FnOnce(MatchHandle, MeetingId) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = handle.id;
        let mut armed = self.vote_timers.write().await;
        if let Some((newer, _)) = armed.get(&id).filter(|(armed_for, _)| *armed_for > meeting_id) {
            debug!("Meeting {} outdated by {} in match {}", meeting_id, newer, handle.code);
            return false;
        }

        let timers = self.vote_timers.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut timers = timers.write().await;
                if matches!(timers.get(&id), Some((armed, _)) if *armed == meeting_id) {
                    timers.remove(&id);
                }
            }
            debug!("Vote timeout fired for meeting {} in match {}", meeting_id, handle.code);
            on_timeout(handle, meeting_id).await;
        });

        if let Some((_, previous)) = armed.insert(id, (meeting_id, task)) {
            previous.abort();
        }
        true
    }

    /// Abort the timeout armed for `meeting_id`. A timeout armed for any
    /// other meeting is left alone. Returns whether one was aborted.
    pub async fn cancel_vote_timeout(&self, id: MatchId, meeting_id: MeetingId) -> bool {
        let mut timers = self.vote_timers.write().await;
        if !matches!(timers.get(&id), Some((armed, _)) if *armed == meeting_id) {
            return false;
        }
        match timers.remove(&id) {
            Some((_, task)) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    async fn abort_vote_timeout(&self, id: MatchId) {
        if let Some((_, task)) = self.vote_timers.write().await.remove(&id) {
            task.abort();
        }
    }

    /// Stop every background task of a match.
    pub async fn stop_match(&self, id: MatchId) {
        if let Some(task) = self.tickers.write().await.remove(&id) {
            task.abort();
        }
        self.abort_vote_timeout(id).await;
        debug!("Background tasks stopped for match {}", id);
    }

    /// Stop the background tasks of every match.
    pub async fn shutdown(&self) {
        let tickers = std::mem::take(&mut *self.tickers.write().await);
        let timers = std::mem::take(&mut *self.vote_timers.write().await);
        for task in tickers.into_values().chain(timers.into_values().map(|(_, task)| task)) {
            task.abort();
        }
        info!("Game engine stopped");
    }

    /// A ticker is registered for the match.
    pub async fn has_ticker(&self, id: MatchId) -> bool {
        self.tickers.read().await.contains_key(&id)
    }

    /// Meeting a pending timeout is armed for.
    pub async fn pending_vote_timeout(&self, id: MatchId) -> Option<MeetingId> {
        self.vote_timers.read().await.get(&id).map(|(meeting, _)| *meeting)
    }
}
