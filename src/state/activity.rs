//! Activity sub-model: parsing presenter-initiated prompts, local
//! selection editing, submission-limit enforcement, and the
//! reveal/close/delete transitions.
//!
//! An activity always replaces the previous one wholesale — descriptors are
//! never merged. Submission is sticky: a close event can never downgrade an
//! already-submitted activity.

#[cfg(test)]
#[path = "activity_test.rs"]
mod tests;

use base64::Engine as _;
use serde::Serialize;
use serde_json::Value;

use crate::events::{pick, pick_bool, pick_string, pick_u64};
use crate::store::JoinContext;

/// How long an unconfirmed optimistic submission stays `Submitting` before
/// reverting to editable.
pub const PENDING_TIMEOUT_MS: i64 = 15_000;

/// Interaction mode derived from the raw server type string.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityMode {
    /// Multiple choice (the fallback for unrecognized type strings).
    Mc,
    /// Free-text short answer.
    Short,
    /// Slide drawing.
    Draw,
}

impl ActivityMode {
    fn from_raw(raw_type: &str) -> Self {
        match raw_type {
            "Short Answer" => Self::Short,
            "Slide Drawing" => Self::Draw,
            _ => Self::Mc,
        }
    }
}

/// Submission lifecycle. Absence (`None` on the activity) means editable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmissionStatus {
    Submitting,
    Submitted,
    Closed,
}

/// A short-answer submission paired with its response id, enabling
/// individual deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedDetail {
    pub response_id: String,
    pub data: String,
}

/// The live activity. At most one exists per session.
#[derive(Clone, Debug, PartialEq)]
pub struct Activity {
    pub id: String,
    /// Server type string, e.g. `"Multiple Choice"`.
    pub raw_type: String,
    pub mode: ActivityMode,
    pub choices: Vec<String>,
    pub allow_multiple: bool,
    pub correct_answers: Vec<String>,
    /// Selected choices (mc) or accepted answers (short/draw).
    pub submitted: Vec<String>,
    /// Short-answer only: per-response detail for deletion.
    pub submitted_details: Vec<SubmittedDetail>,
    /// Short-answer submission limit; defaults to 1.
    pub num_allowed: usize,
    pub caption_required: bool,
    pub slide_url: Option<String>,
    pub status: Option<SubmissionStatus>,
    /// Meaningful in `Mc` mode only.
    pub reveal: bool,
    submitting_since: Option<i64>,
}

/// Participant identity used to match prior responses by id or name.
#[derive(Clone, Debug)]
pub struct ParticipantRef {
    pub id: String,
    pub name: String,
}

impl From<&JoinContext> for ParticipantRef {
    fn from(ctx: &JoinContext) -> Self {
        Self {
            id: ctx.participant_id.clone(),
            name: ctx.participant_name.clone(),
        }
    }
}

/// Rejection reasons for a caller-side submission attempt.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("activity is {0}")]
    Locked(&'static str),
    #[error("submission limit reached ({0} allowed)")]
    LimitReached(usize),
    #[error("answer is empty")]
    EmptyAnswer,
    #[error("no activity is live")]
    NoActivity,
}

/// Payload for the `ParticipantSubmitResponse` hub command.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub participant_id: String,
    pub participant_name: String,
    pub participant_username: String,
    pub activity_id: String,
    pub activity_type: String,
    pub response_id: String,
    pub response_data: String,
}

impl Activity {
    /// Parse an activity descriptor from `StartActivity` or the join
    /// announcement, pre-populating the participant's own prior
    /// submissions.
    ///
    /// Returns `None` when the payload is not a usable descriptor; the
    /// caller keeps the prior activity untouched in that case.
    #[must_use]
    pub fn parse(payload: &Value, me: &ParticipantRef) -> Option<Self> {
        payload.as_object()?;
        let id = pick_string(payload, &["activityId", "ActivityId", "id"])?;
        let raw_type =
            pick_string(payload, &["activityType", "ActivityType", "type"]).unwrap_or_default();
        let mode = ActivityMode::from_raw(&raw_type);

        let mut activity = Self {
            id,
            raw_type,
            mode,
            choices: Vec::new(),
            allow_multiple: false,
            correct_answers: Vec::new(),
            submitted: Vec::new(),
            submitted_details: Vec::new(),
            num_allowed: 1,
            caption_required: false,
            slide_url: pick_string(payload, &["activitySlideUrl", "slideUrl", "SlideUrl"]),
            status: parse_declared_status(payload),
            reveal: false,
            submitting_since: None,
        };

        let mine = own_responses(payload, me);

        match mode {
            ActivityMode::Short => {
                activity.num_allowed = pick_u64(
                    payload,
                    &["numOfSubmissionsAllowed", "NumOfSubmissionsAllowed"],
                )
                .and_then(|n| usize::try_from(n).ok())
                .filter(|n| *n > 0)
                .unwrap_or(1);
                activity.caption_required =
                    pick_bool(payload, &["captionRequired", "CaptionRequired"]);

                for (index, response) in mine.iter().enumerate() {
                    let response_id = response_id_or_placeholder(response, index);
                    for answer in decode_response_data(response) {
                        activity.submitted.push(answer.clone());
                        activity.submitted_details.push(SubmittedDetail {
                            response_id: response_id.clone(),
                            data: answer,
                        });
                    }
                }
            }
            ActivityMode::Draw => {
                // A drawing submission is a single URL.
                if let Some(response) = mine.first() {
                    if let Some(url) =
                        pick_string(response, &["responseData", "ResponseData", "data"])
                    {
                        activity.submitted = vec![url];
                    }
                }
            }
            ActivityMode::Mc => {
                activity.choices =
                    string_list(pick(payload, &["choices", "Choices"]).unwrap_or(&Value::Null));
                activity.allow_multiple =
                    pick_bool(payload, &["allowMultiple", "AllowMultiple", "isAllowMultiple"]);
                activity.correct_answers = string_list(
                    pick(payload, &["correctAnswers", "CorrectAnswers"]).unwrap_or(&Value::Null),
                );

                if let Some(response) = mine.first() {
                    activity.submitted = decode_response_data(response);
                }
            }
        }

        // A matched prior submission overrides any server-declared status.
        if !activity.submitted.is_empty() {
            activity.status = Some(SubmissionStatus::Submitted);
        }

        Some(activity)
    }

    /// Editing and submitting are disallowed once submitted or closed.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(
            self.status,
            Some(SubmissionStatus::Submitted | SubmissionStatus::Closed)
        )
    }

    /// Local pre-submit selection edit: single-select replaces (or clears
    /// on reselect), multi-select toggles membership. No-op when locked.
    pub fn select_choice(&mut self, choice: &str) {
        if self.is_locked() {
            return;
        }
        if self.allow_multiple {
            if let Some(position) = self.submitted.iter().position(|c| c == choice) {
                self.submitted.remove(position);
            } else {
                self.submitted.push(choice.to_owned());
            }
        } else if self.submitted.first().is_some_and(|c| c == choice) {
            self.submitted.clear();
        } else {
            self.submitted = vec![choice.to_owned()];
        }
    }

    pub fn clear_selection(&mut self) {
        if !self.is_locked() {
            self.submitted.clear();
        }
    }

    /// UI-only reveal affordance; authoritative reveal comes from the
    /// server event.
    pub fn toggle_reveal(&mut self) {
        if self.mode == ActivityMode::Mc {
            self.reveal = !self.reveal;
        }
    }

    pub fn set_reveal(&mut self, reveal: bool) {
        if self.mode == ActivityMode::Mc {
            self.reveal = reveal;
        }
    }

    /// Close the submission window. Sticky: never downgrades `Submitted`.
    pub fn mark_closed(&mut self) {
        if self.status != Some(SubmissionStatus::Submitted) {
            self.status = Some(SubmissionStatus::Closed);
            self.submitting_since = None;
        }
    }

    /// Build the command for a multiple-choice (or generic list) submission
    /// and apply the optimistic transition.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Locked`] once submitted/closed, [`SubmitError::EmptyAnswer`]
    /// for an empty selection.
    pub fn submit_choices(
        &mut self,
        selections: &[String],
        ctx: &JoinContext,
        now_ms: i64,
    ) -> Result<SubmitResponse, SubmitError> {
        self.ensure_editable()?;
        if selections.is_empty() {
            return Err(SubmitError::EmptyAnswer);
        }

        let response_data =
            serde_json::to_string(selections).map_err(|_| SubmitError::EmptyAnswer)?;
        self.submitted = selections.to_vec();
        self.advance_status(1, now_ms);
        Ok(self.command(ctx, response_data))
    }

    /// Build the command for one short answer and apply the optimistic
    /// transition. The text is sent raw (trimmed), not JSON-wrapped.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Locked`], [`SubmitError::EmptyAnswer`] for
    /// whitespace-only input, [`SubmitError::LimitReached`] at the
    /// submission limit.
    pub fn submit_short(
        &mut self,
        text: &str,
        ctx: &JoinContext,
        now_ms: i64,
    ) -> Result<SubmitResponse, SubmitError> {
        self.ensure_editable()?;
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyAnswer);
        }
        if self.submitted.len() >= self.num_allowed {
            return Err(SubmitError::LimitReached(self.num_allowed));
        }

        let command = self.command(ctx, text.to_owned());
        self.submitted.push(text.to_owned());
        self.submitted_details.push(SubmittedDetail {
            response_id: command.response_id.clone(),
            data: text.to_owned(),
        });
        self.advance_status(self.num_allowed, now_ms);
        Ok(command)
    }

    /// Build the command for a drawing submission (base64-encoded image)
    /// and mark the activity submitted.
    ///
    /// # Errors
    ///
    /// [`SubmitError::Locked`], [`SubmitError::EmptyAnswer`] for an empty
    /// image.
    pub fn submit_drawing(
        &mut self,
        image: &[u8],
        ctx: &JoinContext,
        now_ms: i64,
    ) -> Result<SubmitResponse, SubmitError> {
        self.ensure_editable()?;
        if image.is_empty() {
            return Err(SubmitError::EmptyAnswer);
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(image);
        let command = self.command(ctx, encoded.clone());
        self.submitted = vec![encoded];
        self.advance_status(1, now_ms);
        Ok(command)
    }

    /// Apply a `ResponseDeleted` event. Removes the matching short-answer
    /// detail when the deletion targets this participant (or names no
    /// participant), recomputes the flat answers, and re-opens submission
    /// if nothing remains. Returns whether state changed.
    pub fn delete_response(
        &mut self,
        response_id: &str,
        participant_id: Option<&str>,
        me: &ParticipantRef,
    ) -> bool {
        if self.mode != ActivityMode::Short {
            return false;
        }
        if participant_id.is_some_and(|id| id != me.id) {
            return false;
        }
        let Some(position) = self
            .submitted_details
            .iter()
            .position(|detail| detail.response_id == response_id)
        else {
            return false;
        };

        self.submitted_details.remove(position);
        self.submitted = self
            .submitted_details
            .iter()
            .map(|detail| detail.data.clone())
            .collect();
        if self.submitted.is_empty() {
            self.status = None;
            self.submitting_since = None;
        }
        true
    }

    /// Revert an unconfirmed `Submitting` status back to editable once the
    /// pending timeout elapses.
    pub fn tick(&mut self, now_ms: i64) {
        if self.status == Some(SubmissionStatus::Submitting) {
            if let Some(since) = self.submitting_since {
                if now_ms.saturating_sub(since) >= PENDING_TIMEOUT_MS {
                    self.status = None;
                    self.submitting_since = None;
                }
            }
        }
    }

    fn ensure_editable(&self) -> Result<(), SubmitError> {
        match self.status {
            Some(SubmissionStatus::Submitted) => Err(SubmitError::Locked("submitted")),
            Some(SubmissionStatus::Closed) => Err(SubmitError::Locked("closed")),
            _ => Ok(()),
        }
    }

    fn advance_status(&mut self, allowed: usize, now_ms: i64) {
        if self.submitted.len() >= allowed.max(1) {
            self.status = Some(SubmissionStatus::Submitted);
            self.submitting_since = None;
        } else {
            self.status = Some(SubmissionStatus::Submitting);
            self.submitting_since = Some(now_ms);
        }
    }

    fn command(&self, ctx: &JoinContext, response_data: String) -> SubmitResponse {
        SubmitResponse {
            participant_id: ctx.participant_id.clone(),
            participant_name: ctx.participant_name.clone(),
            participant_username: ctx.participant_username.clone(),
            activity_id: self.id.clone(),
            activity_type: self.raw_type.clone(),
            response_id: uuid::Uuid::new_v4().to_string(),
            response_data,
        }
    }
}

fn parse_declared_status(payload: &Value) -> Option<SubmissionStatus> {
    // Values drift in casing the same way keys do.
    let raw = pick_string(payload, &["status", "Status", "activityStatus"])?;
    match raw.to_ascii_lowercase().as_str() {
        "submitting" => Some(SubmissionStatus::Submitting),
        "submitted" => Some(SubmissionStatus::Submitted),
        "closed" => Some(SubmissionStatus::Closed),
        _ => None,
    }
}

/// Responses in the descriptor belonging to this participant, matched by id
/// or by name.
fn own_responses<'a>(payload: &'a Value, me: &ParticipantRef) -> Vec<&'a Value> {
    pick(payload, &["responses", "Responses", "submittedResponses"])
        .and_then(Value::as_array)
        .map(|responses| {
            responses
                .iter()
                .filter(|response| {
                    let id = pick_string(response, &["participantId", "ParticipantId"]);
                    let name = pick_string(response, &["participantName", "ParticipantName"]);
                    id.as_deref() == Some(&me.id) || name.as_deref() == Some(&me.name)
                })
                .collect()
        })
        .unwrap_or_default()
}

fn response_id_or_placeholder(response: &Value, index: usize) -> String {
    pick_string(response, &["responseId", "ResponseId", "id"])
        .unwrap_or_else(|| format!("local-{index}"))
}

/// Decode a `responseData` field: JSON array → many answers, JSON scalar →
/// one answer, parse failure → the raw string as a single answer.
fn decode_response_data(response: &Value) -> Vec<String> {
    let Some(raw) = pick_string(response, &["responseData", "ResponseData", "data"]) else {
        return Vec::new();
    };

    match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Array(items)) => items.iter().map(value_to_string).collect(),
        Ok(Value::String(text)) => vec![text],
        Ok(Value::Null) => Vec::new(),
        Ok(other) => vec![value_to_string(&other)],
        Err(_) => vec![raw],
    }
}

fn string_list(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().map(value_to_string).collect())
        .unwrap_or_default()
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
