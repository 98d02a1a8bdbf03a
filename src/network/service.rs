//! Game Service
//!
//! Entry points for every player request. Each call looks the match up,
//! takes its write lock, validates and mutates, builds the outbound
//! messages, releases the lock and only then publishes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::config::ServerConfig;
use crate::core::position::Position;
use crate::game::avatar::{AvatarId, Player};
use crate::game::meeting::MeetingId;
use crate::game::population::{Population, RandomPopulation};
use crate::game::rules::{self, ActionError, Elimination, FuelAction};
use crate::game::snapshot::MatchSnapshot;
use crate::game::state::Match;
use crate::game::task::TaskId;
use crate::network::broadcast::BroadcastSink;
use crate::network::engine::GameEngine;
use crate::network::protocol::{LobbyUpdate, ServerMessage, VoteResult, VoteStart};
use crate::network::session::{MatchHandle, MatchRegistry};

/// Request handling for all matches of this process.
#[derive(Clone)]
pub struct GameService {
    registry: Arc<MatchRegistry>,
    engine: GameEngine,
    sink: Arc<dyn BroadcastSink>,
    population: Arc<dyn Population>,
    cleanup_interval: Duration,
    cleanup: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl GameService {
    /// Create a service with the default population.
    pub fn new(config: &ServerConfig, sink: Arc<dyn BroadcastSink>) -> Self {
        Self::with_population(config, sink, Arc::new(RandomPopulation))
    }

    /// Create a service with a custom population.
    pub fn with_population(
        config: &ServerConfig,
        sink: Arc<dyn BroadcastSink>,
        population: Arc<dyn Population>,
    ) -> Self {
        Self {
            registry: Arc::new(MatchRegistry::new(config.match_config.clone())),
            engine: GameEngine::new(sink.clone(), config.tick_period),
            sink,
            population,
            cleanup_interval: config.cleanup_interval,
            cleanup: Arc::new(Mutex::new(None)),
        }
    }

    /// Match store.
    pub fn registry(&self) -> &MatchRegistry {
        &self.registry
    }

    /// Background scheduler.
    pub fn engine(&self) -> &GameEngine {
        &self.engine
    }

    async fn lookup(&self, code: &str) -> Result<MatchHandle, ActionError> {
        self.registry
            .get_match_by_code(code)
            .await
            .ok_or_else(|| ActionError::MatchNotFound(code.to_string()))
    }

    fn publish(&self, code: &str, messages: Vec<ServerMessage>) {
        for message in messages {
            self.sink.publish(code, message);
        }
    }

    // -------------------------------------------------------------------------
    // Lobby
    // -------------------------------------------------------------------------

    /// Open a new lobby hosted by `owner`.
    #[instrument(skip(self, owner), fields(owner = %owner.username))]
    pub async fn create_match(&self, owner: Player) -> MatchHandle {
        let handle = self.registry.create_match(owner).await;
        let update = LobbyUpdate::from_match(&*handle.state.read().await);
        self.sink.publish(&handle.code, ServerMessage::LobbyUpdate(update));
        handle
    }

    /// Join an open lobby.
    #[instrument(skip(self, player), fields(player = %player.username))]
    pub async fn join_match(&self, code: &str, player: Player) -> Result<(), ActionError> {
        let handle = self.lookup(code).await?;
        let update = {
            let mut state = handle.state.write().await;
            rules::join(&mut state, player)?;
            LobbyUpdate::from_match(&state)
        };
        self.sink.publish(&handle.code, ServerMessage::LobbyUpdate(update));
        Ok(())
    }

    /// The host starts the match and its ticker.
    #[instrument(skip(self))]
    pub async fn start_match(&self, code: &str, username: &str) -> Result<(), ActionError> {
        let handle = self.lookup(code).await?;
        let (lobby, snapshot) = {
            let mut state = handle.state.write().await;
            rules::start(&mut state, username, self.population.as_ref())?;
            (LobbyUpdate::from_match(&state), state.snapshot())
        };

        self.engine.start_match_ticker(handle.clone()).await;
        self.publish(
            &handle.code,
            vec![ServerMessage::LobbyUpdate(lobby), ServerMessage::GameState(snapshot)],
        );
        Ok(())
    }

    /// Current public view of a match.
    pub async fn snapshot(&self, code: &str) -> Result<MatchSnapshot, ActionError> {
        let handle = self.lookup(code).await?;
        let state = handle.state.read().await;
        Ok(state.snapshot())
    }

    /// Force a match to finish now.
    #[instrument(skip(self))]
    pub async fn end_match(&self, code: &str) -> Result<(), ActionError> {
        let handle = self.lookup(code).await?;
        let snapshot = {
            let mut state = handle.state.write().await;
            state.end_match();
            state.snapshot()
        };
        self.engine.stop_match(handle.id).await;
        self.sink.publish(&handle.code, ServerMessage::GameState(snapshot));
        Ok(())
    }

    /// Drop finished matches from the registry.
    pub async fn cleanup_finished(&self) -> usize {
        self.registry.cleanup().await
    }

    /// Sweep finished matches every cleanup interval, replacing any
    /// running sweep. The first pass runs one interval from now.
    pub async fn start_cleanup_loop(&self) {
        let registry = self.registry.clone();
        let period = self.cleanup_interval;
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                interval.tick().await;
                let removed = registry.cleanup().await;
                debug!("Cleanup pass removed {} matches", removed);
            }
        });

        if let Some(previous) = self.cleanup.lock().await.replace(task) {
            previous.abort();
        }
    }

    /// Stop the cleanup loop and every match clock.
    pub async fn shutdown(&self) {
        if let Some(task) = self.cleanup.lock().await.take() {
            task.abort();
        }
        self.engine.shutdown().await;
        info!("Game service shut down");
    }

    // -------------------------------------------------------------------------
    // Movement
    // -------------------------------------------------------------------------

    /// Move a player. Positions are published by the next tick.
    pub async fn move_player(&self, code: &str, username: &str, position: Position) -> Result<(), ActionError> {
        let handle = self.lookup(code).await?;
        let mut state = handle.state.write().await;
        rules::move_player(&mut state, username, position)
    }

    // -------------------------------------------------------------------------
    // Meetings
    // -------------------------------------------------------------------------

    /// Open a meeting and arm its timeout.
    #[instrument(skip(self))]
    pub async fn start_vote(&self, code: &str, username: &str) -> Result<MeetingId, ActionError> {
        let handle = self.lookup(code).await?;
        let (meeting_id, delay, snapshot, vote_start) = {
            let mut state = handle.state.write().await;
            let meeting_id = rules::open_meeting(&mut state, username)?;
            (
                meeting_id,
                state.config().vote_duration(),
                state.snapshot(),
                VoteStart::from_match(&state),
            )
        };

        let service = self.clone();
        let armed = self
            .engine
            .schedule_vote_timeout(handle.clone(), meeting_id, delay, move |handle, meeting_id| async move {
                service.resolve_vote_timeout(handle, meeting_id).await;
            })
            .await;
        if !armed {
            debug!("Meeting {} in match {} was superseded before its timer", meeting_id, handle.code);
        }

        let mut messages = vec![ServerMessage::GameState(snapshot)];
        messages.extend(vote_start.map(ServerMessage::VoteStart));
        self.publish(&handle.code, messages);
        Ok(meeting_id)
    }

    /// Record a vote. Returns the verdict when this vote completed the ballot.
    #[instrument(skip(self))]
    pub async fn submit_vote(
        &self,
        code: &str,
        username: &str,
        target: AvatarId,
    ) -> Result<Option<VoteResult>, ActionError> {
        let handle = self.lookup(code).await?;
        let concluded = {
            let mut state = handle.state.write().await;
            rules::vote(&mut state, username, target)?;
            if state.all_humans_voted() {
                conclude(&mut state, None)
            } else {
                None
            }
        };

        let Some((result, snapshot)) = concluded else {
            return Ok(None);
        };

        if result.match_finished {
            self.engine.stop_match(handle.id).await;
        } else {
            self.engine.cancel_vote_timeout(handle.id, result.meeting_id).await;
        }
        self.publish(
            &handle.code,
            vec![
                ServerMessage::VoteResult(result.clone()),
                ServerMessage::GameState(snapshot),
            ],
        );
        Ok(Some(result))
    }

    /// Resolve a meeting that ran out of time. Stale meetings are ignored.
    pub async fn resolve_vote_timeout(&self, handle: MatchHandle, meeting_id: MeetingId) {
        let concluded = {
            let mut state = handle.state.write().await;
            conclude(&mut state, Some(meeting_id))
        };

        let Some((result, snapshot)) = concluded else {
            info!("Meeting {} in match {} already closed", meeting_id, handle.code);
            return;
        };

        if result.match_finished {
            self.engine.stop_match(handle.id).await;
        }
        self.publish(
            &handle.code,
            vec![ServerMessage::VoteResult(result), ServerMessage::GameState(snapshot)],
        );
    }

    /// Post a chat line to the live meeting.
    pub async fn send_chat(&self, code: &str, username: &str, text: &str) -> Result<(), ActionError> {
        let handle = self.lookup(code).await?;
        let message = {
            let mut state = handle.state.write().await;
            rules::chat(&mut state, username, text)?;
            state.meeting().and_then(|m| m.chat.last().cloned())
        };
        if let Some(message) = message {
            self.sink.publish(&handle.code, ServerMessage::Chat(message));
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Actions
    // -------------------------------------------------------------------------

    /// The infiltrator eliminates a nearby player.
    #[instrument(skip(self))]
    pub async fn eliminate(&self, code: &str, username: &str, target: AvatarId) -> Result<Elimination, ActionError> {
        let handle = self.lookup(code).await?;
        let (elimination, snapshot) = {
            let mut state = handle.state.write().await;
            let elimination = rules::eliminate(&mut state, username, target).map_err(|e| {
                warn!("Elimination rejected: {}", e);
                e
            })?;
            (elimination, state.snapshot())
        };

        if elimination.match_finished {
            self.engine.stop_match(handle.id).await;
        }
        self.publish(
            &handle.code,
            vec![ServerMessage::Elimination(elimination), ServerMessage::GameState(snapshot)],
        );
        Ok(elimination)
    }

    /// Fill or sabotage the boat tank. Returns the new gauge value.
    #[instrument(skip(self))]
    pub async fn modify_fuel(
        &self,
        code: &str,
        username: &str,
        action: FuelAction,
        amount: Option<f64>,
    ) -> Result<f64, ActionError> {
        let handle = self.lookup(code).await?;
        let (fuel, snapshot) = {
            let mut state = handle.state.write().await;
            let fuel = rules::modify_fuel(&mut state, username, action, amount)?;
            (fuel, state.snapshot())
        };
        self.sink.publish(&handle.code, ServerMessage::GameState(snapshot));
        Ok(fuel)
    }

    /// Start a task.
    pub async fn start_task(&self, code: &str, username: &str, task: TaskId) -> Result<(), ActionError> {
        let handle = self.lookup(code).await?;
        let snapshot = {
            let mut state = handle.state.write().await;
            rules::start_task(&mut state, username, task)?;
            state.snapshot()
        };
        self.sink.publish(&handle.code, ServerMessage::GameState(snapshot));
        Ok(())
    }

    /// Feed progress, or a click, into a task.
    pub async fn progress_task(
        &self,
        code: &str,
        username: &str,
        task: TaskId,
        delta: i32,
    ) -> Result<(), ActionError> {
        let handle = self.lookup(code).await?;
        let snapshot = {
            let mut state = handle.state.write().await;
            rules::progress_task(&mut state, username, task, delta)?;
            state.snapshot()
        };
        self.sink.publish(&handle.code, ServerMessage::GameState(snapshot));
        Ok(())
    }

    /// Current leader of a contest task.
    pub async fn contest_winner(&self, code: &str, task: TaskId) -> Result<Option<AvatarId>, ActionError> {
        let handle = self.lookup(code).await?;
        let state = handle.state.read().await;
        rules::contest_winner(&state, task)
    }
}

/// Close the live meeting and describe the verdict.
fn conclude(state: &mut Match, expected: Option<MeetingId>) -> Option<(VoteResult, MatchSnapshot)> {
    let outcome = state.conclude_voting(expected)?;
    let result = VoteResult::from_outcome(state, outcome);
    Some((result, state.snapshot()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::state::{Expelled, MatchStatus};
    use crate::network::broadcast::{ChannelSink, Envelope};
    use tokio::sync::broadcast::Receiver;

    fn service() -> (GameService, ChannelSink) {
        let sink = ChannelSink::new(1024);
        (GameService::new(&ServerConfig::default(), Arc::new(sink.clone())), sink)
    }

    fn player(id: AvatarId) -> Player {
        Player::new(id, format!("p{}", id), "skin", Position::ORIGIN)
    }

    /// Started match with the infiltrator pinned to p1.
    async fn started(svc: &GameService) -> MatchHandle {
        let handle = svc.create_match(player(1)).await;
        for id in 2..=5 {
            svc.join_match(&handle.code, player(id)).await.unwrap();
        }
        svc.start_match(&handle.code, "p1").await.unwrap();

        let mut state = handle.state.write().await;
        for p in state.players.iter_mut() {
            p.infiltrator = p.id == 1;
        }
        state.infiltrator = Some(1);
        drop(state);
        handle
    }

    fn drain(rx: &mut Receiver<Envelope>) -> Vec<ServerMessage> {
        let mut out = Vec::new();
        while let Ok(envelope) = rx.try_recv() {
            out.push(envelope.message);
        }
        out
    }

    #[tokio::test]
    async fn test_lobby_flow() {
        let (svc, sink) = service();
        let mut rx = sink.subscribe();

        let handle = svc.create_match(player(1)).await;
        svc.join_match(&handle.code, player(2)).await.unwrap();

        let kinds: Vec<_> = drain(&mut rx).iter().map(|m| m.kind()).collect();
        assert_eq!(kinds, ["lobby_update", "lobby_update"]);

        assert_eq!(
            svc.join_match("NOPE00", player(3)).await,
            Err(ActionError::MatchNotFound("NOPE00".into()))
        );
        assert_eq!(
            svc.start_match(&handle.code, "p1").await,
            Err(ActionError::InsufficientPlayers { have: 2, needed: 5 })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_spawns_ticker() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;

        assert_eq!(handle.state.read().await.status(), MatchStatus::Started);
        assert!(svc.engine().has_ticker(handle.id).await);

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(handle.state.read().await.timer_seconds(), 297);
        svc.end_match(&handle.code).await.unwrap();
        assert!(!svc.engine().has_ticker(handle.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_concludes_when_all_humans_voted() {
        let (svc, sink) = service();
        let handle = started(&svc).await;
        let npc = handle.state.read().await.npcs()[0].id;
        let mut rx = sink.subscribe();

        let meeting = svc.start_vote(&handle.code, "p2").await.unwrap();
        assert_eq!(svc.engine().pending_vote_timeout(handle.id).await, Some(meeting));

        for id in 2..=4 {
            let voter = format!("p{}", id);
            assert!(svc.submit_vote(&handle.code, &voter, npc).await.unwrap().is_none());
        }
        let result = svc.submit_vote(&handle.code, "p5", npc).await.unwrap().unwrap();

        assert_eq!(result.expelled, Expelled::Npc);
        assert_eq!(result.expelled_id, Some(npc));
        assert!(!result.match_finished);
        assert_eq!(svc.engine().pending_vote_timeout(handle.id).await, None);

        let kinds: Vec<_> = drain(&mut rx).iter().map(|m| m.kind()).collect();
        assert!(kinds.contains(&"vote_start"));
        assert!(kinds.contains(&"vote_result"));
        assert!(!handle.state.read().await.voting_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_vote_timeout_resolves_meeting() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;

        let disguise = handle.state.read().await.disguise_id().unwrap();
        svc.start_vote(&handle.code, "p2").await.unwrap();
        svc.submit_vote(&handle.code, "p2", disguise).await.unwrap();

        tokio::time::sleep(Duration::from_secs(31)).await;

        let state = handle.state.read().await;
        assert!(!state.voting_active());
        assert_eq!(state.status(), MatchStatus::Finished);
        assert!(!state.player(1).unwrap().alive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timeout_leaves_new_meeting() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;

        let first = svc.start_vote(&handle.code, "p2").await.unwrap();
        handle.state.write().await.stop_voting();
        let second = svc.start_vote(&handle.code, "p3").await.unwrap();
        assert_ne!(first, second);

        svc.resolve_vote_timeout(handle.clone(), first).await;
        assert_eq!(handle.state.read().await.meeting().map(|m| m.id), Some(second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_cancel_keeps_next_meeting_timer() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;

        let first = svc.start_vote(&handle.code, "p2").await.unwrap();
        // The ballot completes under the lock, then a new meeting opens
        // before the completing request gets to cancel its timer.
        handle.state.write().await.conclude_voting(None).unwrap();
        let second = svc.start_vote(&handle.code, "p3").await.unwrap();

        assert!(!svc.engine().cancel_vote_timeout(handle.id, first).await);
        assert_eq!(svc.engine().pending_vote_timeout(handle.id).await, Some(second));

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!handle.state.read().await.voting_active());
        assert_eq!(svc.engine().pending_vote_timeout(handle.id).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_loop_evicts_finished_matches() {
        let (svc, _sink) = service();
        svc.start_cleanup_loop().await;
        let done = started(&svc).await;
        let live = started(&svc).await;
        svc.end_match(&done.code).await.unwrap();
        assert_eq!(svc.registry().match_count().await, 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(svc.registry().match_count().await, 1);
        assert!(svc.registry().get_match_by_code(&done.code).await.is_none());

        svc.shutdown().await;
        assert!(!svc.engine().has_ticker(live.id).await);
        svc.end_match(&live.code).await.unwrap();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(svc.registry().match_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_move_on_finished_match() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;
        svc.end_match(&handle.code).await.unwrap();
        assert_eq!(
            svc.move_player(&handle.code, "p2", Position::new(1.0, 1.0)).await,
            Err(ActionError::MatchFinished)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_infiltrator_cannot_vote_or_call_meeting() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;

        assert_eq!(svc.start_vote(&handle.code, "p1").await, Err(ActionError::CannotVote));
        svc.start_vote(&handle.code, "p2").await.unwrap();
        assert_eq!(svc.start_vote(&handle.code, "p3").await, Err(ActionError::VotingAlreadyActive));
        assert_eq!(svc.submit_vote(&handle.code, "p1", 2).await, Err(ActionError::CannotVote));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chat_broadcast() {
        let (svc, sink) = service();
        let handle = started(&svc).await;
        svc.start_vote(&handle.code, "p2").await.unwrap();
        let mut rx = sink.subscribe();

        svc.send_chat(&handle.code, "p3", "saw NPC-1002 near the boat").await.unwrap();
        match drain(&mut rx).pop() {
            Some(ServerMessage::Chat(chat)) => assert_eq!(chat.sender_id, 3),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_elimination_flow() {
        let (svc, sink) = service();
        let handle = started(&svc).await;
        let mut rx = sink.subscribe();

        let result = svc.eliminate(&handle.code, "p1", 2).await.unwrap();
        assert_eq!(result.target_id, 2);
        assert!(!handle.state.read().await.player(2).unwrap().alive);
        assert_eq!(drain(&mut rx).first().map(|m| m.kind()), Some("elimination"));

        assert_eq!(
            svc.move_player(&handle.code, "p2", Position::new(1.0, 1.0)).await,
            Err(ActionError::ActorEliminated)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_last_elimination_stops_match() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;

        for id in 2..=5 {
            svc.eliminate(&handle.code, "p1", id).await.unwrap();
        }
        assert!(handle.state.read().await.is_finished());
        assert!(!svc.engine().has_ticker(handle.id).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fuel_flow() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;
        let boat = handle.state.read().await.config().boat_position;
        svc.move_player(&handle.code, "p2", boat).await.unwrap();

        let err = svc.modify_fuel(&handle.code, "p2", FuelAction::Fill, None).await.unwrap_err();
        assert!(matches!(err, ActionError::FuelWindowClosed { .. }));

        handle.state.write().await.timer_seconds = 230;
        assert_eq!(svc.modify_fuel(&handle.code, "p2", FuelAction::Fill, Some(10.0)).await, Ok(10.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_flow() {
        let (svc, _sink) = service();
        let handle = started(&svc).await;
        let contest = handle
            .state
            .read()
            .await
            .tasks()
            .iter()
            .find(|t| matches!(t, crate::game::task::Task::Contest(_)))
            .map(crate::game::task::TaskBehavior::id)
            .unwrap();

        svc.start_task(&handle.code, "p2", contest).await.unwrap();
        svc.progress_task(&handle.code, "p2", contest, 0).await.unwrap();
        svc.progress_task(&handle.code, "p3", contest, 0).await.unwrap();
        svc.progress_task(&handle.code, "p3", contest, 0).await.unwrap();

        assert_eq!(svc.contest_winner(&handle.code, contest).await, Ok(Some(3)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_fuel_adjustments() {
        let (svc, _sink) = service();
        let handle = svc.create_match(player(1)).await;

        let tasks: Vec<_> = (0..50)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle.state.write().await.adjust_fuel(1.0);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(handle.state.read().await.fuel_percentage(), 50.0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_votes_not_lost() {
        let (svc, _sink) = service();
        let handle = svc.create_match(player(1)).await;
        {
            let mut state = handle.state.write().await;
            for id in 2..=40 {
                state.add_player(player(id));
            }
            state.start_voting();
        }

        let tasks: Vec<_> = (2..=40)
            .map(|id| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle.state.write().await.record_vote(&format!("p{}", id), 1000);
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let state = handle.state.read().await;
        assert_eq!(state.votes_by_player().unwrap().len(), 39);
        assert_eq!(state.tally_votes(), Some(1000));
    }
}
