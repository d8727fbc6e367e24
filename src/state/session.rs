//! The session event reducer.
//!
//! Each normalized server event folds into [`SessionState`] in arrival
//! order. Handlers default missing data instead of failing, so one bad
//! event can never break the ones behind it. Side effects the reducer
//! cannot perform itself (persisting identity corrections, tearing down
//! the connection) surface as [`Effect`]s for the connection manager.

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;

use serde_json::Value;

use crate::events::{JoinAnnounce, ServerEvent, SlideInfo};
use crate::logging::Logger;
use crate::state::activity::{Activity, ParticipantRef};
use crate::state::level::LevelTracker;
use crate::store::JoinContext;

/// Connection lifecycle status. Driven only by connection callbacks and
/// explicit removal; feature events never set it directly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionStatus {
    #[default]
    Initializing,
    Connecting,
    Connected,
    Reconnecting,
    Disconnected,
    Failed,
    /// Terminal: the participant was removed from the class.
    Removed,
}

impl ConnectionStatus {
    /// Status line as shown in the UI.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Reconnecting => "Reconnecting...",
            Self::Disconnected => "Disconnected",
            Self::Failed => "Failed",
            Self::Removed => "Removed",
        }
    }
}

/// Current slide while a slideshow is running. Replaced wholesale on each
/// slide change; never merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlideState {
    /// 1-based display index.
    pub index: u32,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub total_slide_count: Option<u32>,
}

impl From<&SlideInfo> for SlideState {
    fn from(info: &SlideInfo) -> Self {
        Self {
            index: info.index,
            title: info.title.clone(),
            image_url: info.image_url.clone(),
            total_slide_count: info.total_slide_count,
        }
    }
}

/// Append-only feed entry for display and diagnostics.
#[derive(Clone, Debug)]
pub struct SessionMessage {
    pub event: String,
    pub payload: Value,
    pub ts: i64,
}

/// Side effect requested by a reducer step.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// The join context changed (identity correction) and must be
    /// re-persisted.
    PersistContext,
    /// Proactively close the realtime connection and stop reconnecting.
    Disconnect,
}

/// The whole UI-facing session state.
#[derive(Clone, Debug)]
pub struct SessionState {
    pub status: ConnectionStatus,
    pub slide: Option<SlideState>,
    /// Gate: slide-change events are accepted only while true.
    pub in_slideshow: bool,
    pub stars: u32,
    pub events_count: u64,
    pub messages: Vec<SessionMessage>,
    /// Burst marker timestamps for point-award celebration.
    pub confetti_bursts: Vec<i64>,
    pub removed_from_class: bool,
    /// Another tab holds a connection for this participant; blocking until
    /// force-reconnect or leave.
    pub duplicate_connection: bool,
    pub activity: Option<Activity>,
    pub joined_at: i64,
    level: LevelTracker,
    synced_points: bool,
}

impl SessionState {
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            status: ConnectionStatus::Initializing,
            slide: None,
            in_slideshow: false,
            stars: 0,
            events_count: 0,
            messages: Vec::new(),
            confetti_bursts: Vec::new(),
            removed_from_class: false,
            duplicate_connection: false,
            activity: None,
            joined_at: now_ms,
            level: LevelTracker::default(),
            synced_points: false,
        }
    }

    /// Set the connection status. `Removed` is terminal; later lifecycle
    /// callbacks cannot override it.
    pub fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == ConnectionStatus::Removed {
            return;
        }
        self.status = status;
    }

    #[must_use]
    pub fn level(&self) -> usize {
        self.level.level()
    }

    #[must_use]
    pub fn just_leveled(&self) -> bool {
        self.level.just_leveled()
    }

    /// Clear the duplicate-connection flag (force-reconnect / leave only).
    pub fn clear_duplicate_connection(&mut self) {
        self.duplicate_connection = false;
    }

    /// Fold one event into the state. Returns the side effects the caller
    /// must perform.
    pub fn apply(
        &mut self,
        event: &ServerEvent,
        raw: &Value,
        ctx: &mut JoinContext,
        logger: &Logger,
        now_ms: i64,
    ) -> Vec<Effect> {
        self.events_count += 1;
        self.messages.push(SessionMessage {
            event: event.label().to_owned(),
            payload: raw.clone(),
            ts: now_ms,
        });

        match event {
            ServerEvent::JoinAnnounce(announce) => {
                self.apply_join_announce(announce, ctx, logger, now_ms)
            }
            ServerEvent::SlideChanged(info) => {
                if self.in_slideshow {
                    self.slide = Some(SlideState::from(info));
                } else {
                    // Late slide event racing a slideshow-end signal.
                    logger.debug(format!("dropped stale SlideChanged (index {})", info.index));
                }
                Vec::new()
            }
            ServerEvent::SlideShowStarted(seed) => {
                self.in_slideshow = true;
                if let Some(info) = seed {
                    self.slide = Some(SlideState::from(info));
                }
                Vec::new()
            }
            ServerEvent::SlideShowEnded => {
                self.in_slideshow = false;
                self.slide = None;
                Vec::new()
            }
            ServerEvent::PointsAwarded(amount) => {
                self.stars = self.stars.saturating_add(*amount);
                self.level.observe(self.stars, now_ms);
                self.synced_points = true;
                self.confetti_bursts.push(now_ms);
                Vec::new()
            }
            ServerEvent::ActivityStarted(descriptor) => {
                let me = ParticipantRef::from(&*ctx);
                match Activity::parse(descriptor, &me) {
                    // Always a full replacement, never a merge.
                    Some(activity) => self.activity = Some(activity),
                    None => {
                        logger.warn("unparseable StartActivity payload; keeping prior activity");
                    }
                }
                Vec::new()
            }
            ServerEvent::ActivityEnded => {
                self.activity = None;
                Vec::new()
            }
            ServerEvent::AnswerReveal(reveal) => {
                if let Some(activity) = &mut self.activity {
                    activity.set_reveal(*reveal);
                }
                Vec::new()
            }
            ServerEvent::ActivityClosed => {
                if let Some(activity) = &mut self.activity {
                    activity.mark_closed();
                }
                Vec::new()
            }
            ServerEvent::Removed => {
                logger.warn("removed from class; ending session");
                self.removed_from_class = true;
                self.status = ConnectionStatus::Removed;
                vec![Effect::Disconnect]
            }
            ServerEvent::DuplicateConnection => {
                logger.warn("duplicate connection detected for this participant");
                self.duplicate_connection = true;
                Vec::new()
            }
            ServerEvent::ResponseDeleted {
                response_id,
                participant_id,
            } => {
                let me = ParticipantRef::from(&*ctx);
                if let Some(activity) = &mut self.activity {
                    activity.delete_response(response_id, participant_id.as_deref(), &me);
                }
                Vec::new()
            }
        }
    }

    /// Periodic maintenance: expire the level-up flag and revert stale
    /// pending submissions.
    pub fn tick(&mut self, now_ms: i64) {
        self.level.tick(now_ms);
        if let Some(activity) = &mut self.activity {
            activity.tick(now_ms);
        }
    }

    fn apply_join_announce(
        &mut self,
        announce: &JoinAnnounce,
        ctx: &mut JoinContext,
        logger: &Logger,
        now_ms: i64,
    ) -> Vec<Effect> {
        self.in_slideshow = announce.in_slideshow;
        if !announce.in_slideshow {
            self.slide = None;
        }

        if let Some(points) = announce.points {
            self.stars = points;
            if self.synced_points {
                self.level.observe(self.stars, now_ms);
            } else {
                // First authoritative sync is a baseline, not a level-up.
                self.level.baseline(self.stars);
                self.synced_points = true;
            }
        }

        let mut effects = Vec::new();
        if reconcile_identity(ctx, announce) {
            logger.info("join context updated from server-pushed identity");
            effects.push(Effect::PersistContext);
        }

        if let Some(descriptor) = &announce.activity {
            let me = ParticipantRef::from(&*ctx);
            match Activity::parse(descriptor, &me) {
                Some(activity) => self.activity = Some(activity),
                None => logger.warn("unparseable activity in join announce; ignoring"),
            }
        }

        effects
    }
}

/// Fold authoritative identity fields into the join context; returns
/// whether anything changed.
fn reconcile_identity(ctx: &mut JoinContext, announce: &JoinAnnounce) -> bool {
    let mut changed = false;

    if let Some(id) = &announce.participant_id {
        if *id != ctx.participant_id {
            ctx.participant_id = id.clone();
            changed = true;
        }
    }
    if let Some(name) = &announce.participant_name {
        if *name != ctx.participant_name {
            ctx.participant_name = name.clone();
            changed = true;
        }
    }
    if let Some(username) = &announce.participant_username {
        if *username != ctx.participant_username {
            ctx.participant_username = username.clone();
            changed = true;
        }
    }
    if let Some(session_id) = &announce.session_id {
        if ctx.class_session_id.as_deref() != Some(session_id) {
            ctx.class_session_id = Some(session_id.clone());
            changed = true;
        }
    }

    changed
}
