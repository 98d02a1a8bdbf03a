//! Island Tasks
//!
//! Two task kinds share one contract: a participant starts the task,
//! then every interaction goes through `progress_update`.
//!
//! - [`ProgressTask`]: repair-style progress bar that completes at 100.
//! - [`ContestTask`]: click race decided by the strict-maximum tally.

use std::collections::BTreeMap;
use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::core::position::Position;
use crate::game::avatar::AvatarId;
use crate::game::tally;

/// Task identifier.
pub type TaskId = u64;

/// Contract shared by every task kind.
pub trait TaskBehavior {
    /// Task identifier.
    fn id(&self) -> TaskId;
    /// Where the task sits.
    fn location(&self) -> Position;
    /// Currently accepting progress.
    fn is_active(&self) -> bool;
    /// Activate on behalf of a participant.
    fn start_by(&mut self, participant: AvatarId);
    /// The single mutation entry point.
    fn progress_update(&mut self, participant: AvatarId, delta: i32);
}

// =============================================================================
// PROGRESS TASK
// =============================================================================

/// Progress bar that freezes once it first reaches 100.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProgressTask {
    /// Task identifier.
    pub id: TaskId,
    /// Where the task sits.
    pub location: Position,
    /// Accepting progress.
    pub active: bool,
    /// Current progress, at most 100.
    pub progress_percent: i32,
    /// Suggested repair pace shown to clients.
    pub required_speed: u32,
}

impl ProgressTask {
    /// Create an inactive task at 0%.
    pub fn new(id: TaskId, location: Position, required_speed: u32) -> Self {
        Self {
            id,
            location,
            active: false,
            progress_percent: 0,
            required_speed,
        }
    }

    /// Reached 100.
    pub fn is_complete(&self) -> bool {
        self.progress_percent >= 100
    }
}

impl TaskBehavior for ProgressTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn location(&self) -> Position {
        self.location
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn start_by(&mut self, participant: AvatarId) {
        if self.is_complete() {
            return;
        }
        self.active = true;
        info!("Participant {} started repair task {}", participant, self.id);
    }

    fn progress_update(&mut self, participant: AvatarId, delta: i32) {
        if !self.active {
            debug!("Task {} is not active", self.id);
            return;
        }

        // No lower floor: negative deltas apply as plain arithmetic
        self.progress_percent = self.progress_percent.saturating_add(delta);
        if self.progress_percent >= 100 {
            self.progress_percent = 100;
            self.active = false;
            info!("Participant {} completed repair task {}", participant, self.id);
        }
    }
}

// =============================================================================
// CONTEST TASK
// =============================================================================

/// Click race between participants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContestTask {
    /// Task identifier.
    pub id: TaskId,
    /// Where the task sits.
    pub location: Position,
    /// Accepting clicks.
    pub active: bool,
    /// Set once someone starts the contest.
    pub contested: bool,
    /// Participant the contest was created for.
    pub initiator: Option<AvatarId>,
    /// Clicks per participant.
    pub click_counts: BTreeMap<AvatarId, u32>,
}

impl ContestTask {
    /// Create an inactive, uncontested task.
    pub fn new(id: TaskId, location: Position, initiator: Option<AvatarId>) -> Self {
        Self {
            id,
            location,
            active: false,
            contested: false,
            initiator,
            click_counts: BTreeMap::new(),
        }
    }

    /// Add one click for a participant while active.
    pub fn register_click(&mut self, participant: AvatarId) {
        if !self.active {
            debug!("Contest {} is not active", self.id);
            return;
        }
        let clicks = self.click_counts.entry(participant).or_insert(0);
        *clicks += 1;
        debug!("Participant {} clicked contest {} ({} total)", participant, self.id, clicks);
    }

    /// Participant with strictly the most clicks.
    pub fn determine_winner(&self) -> Option<AvatarId> {
        tally::strict_max(self.click_counts.iter().map(|(id, n)| (*id, *n)))
    }
}

impl TaskBehavior for ContestTask {
    fn id(&self) -> TaskId {
        self.id
    }

    fn location(&self) -> Position {
        self.location
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn start_by(&mut self, participant: AvatarId) {
        self.active = true;
        self.contested = true;
        info!("Participant {} started contest {}", participant, self.id);
    }

    fn progress_update(&mut self, participant: AvatarId, _delta: i32) {
        self.register_click(participant);
    }
}

// =============================================================================
// TASK
// =============================================================================

/// Any task owned by a match.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Progress bar task.
    Progress(ProgressTask),
    /// Click race task.
    Contest(ContestTask),
}

impl Task {
    fn behavior(&self) -> &dyn TaskBehavior {
        match self {
            Task::Progress(t) => t,
            Task::Contest(t) => t,
        }
    }

    fn behavior_mut(&mut self) -> &mut dyn TaskBehavior {
        match self {
            Task::Progress(t) => t,
            Task::Contest(t) => t,
        }
    }
}

impl TaskBehavior for Task {
    fn id(&self) -> TaskId {
        self.behavior().id()
    }

    fn location(&self) -> Position {
        self.behavior().location()
    }

    fn is_active(&self) -> bool {
        self.behavior().is_active()
    }

    fn start_by(&mut self, participant: AvatarId) {
        self.behavior_mut().start_by(participant)
    }

    fn progress_update(&mut self, participant: AvatarId, delta: i32) {
        self.behavior_mut().progress_update(participant, delta)
    }
}

impl From<ProgressTask> for Task {
    fn from(task: ProgressTask) -> Self {
        Task::Progress(task)
    }
}

impl From<ContestTask> for Task {
    fn from(task: ContestTask) -> Self {
        Task::Contest(task)
    }
}
