//! Server event catalog and the normalization boundary.
//!
//! The session hub pushes named events whose payloads are loosely typed:
//! the same semantic field may arrive lower-camel or PascalCase, and some
//! values arrive as either a scalar or a one-element array. Normalization
//! happens exactly once here — [`normalize`] maps a raw `(target,
//! arguments)` pair into a strongly-typed [`ServerEvent`] before anything
//! reaches the reducer. Alias precedence per field: exact key first, then
//! the capitalized variant, then documented legacy names. Missing fields
//! default to a safe empty/zero value; normalization never fails hard.

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use serde_json::Value;

/// Hub target names the client understands, in one place so the connection
/// manager can register interest before opening the socket.
pub const EVENT_TARGETS: &[&str] = &[
    "SendJoinClass",
    "SlideChanged",
    "SlideShowStarted",
    "SlideShowEnded",
    "GotPoints",
    "StartActivity",
    "EndActivity",
    "ShowCorrectAnswer",
    "SubmissionClosed",
    "RemovedFromClass",
    "DuplicateConnection",
    "ResponseDeleted",
];

/// One slide of the running slideshow. Wire indices are 0-based; stored
/// 1-based for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlideInfo {
    pub index: u32,
    pub title: Option<String>,
    pub image_url: Option<String>,
    pub total_slide_count: Option<u32>,
}

/// Authoritative initial state carried by the join announcement.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct JoinAnnounce {
    pub in_slideshow: bool,
    /// Sum of the current and total point fields, when either is present.
    pub points: Option<u32>,
    pub participant_id: Option<String>,
    pub participant_name: Option<String>,
    pub participant_username: Option<String>,
    pub session_id: Option<String>,
    /// Raw in-progress activity descriptor, parsed by the activity model.
    pub activity: Option<Value>,
}

/// A normalized server event, ready for the reducer.
#[derive(Clone, Debug, PartialEq)]
pub enum ServerEvent {
    JoinAnnounce(JoinAnnounce),
    SlideChanged(SlideInfo),
    SlideShowStarted(Option<SlideInfo>),
    SlideShowEnded,
    PointsAwarded(u32),
    ActivityStarted(Value),
    ActivityEnded,
    AnswerReveal(bool),
    ActivityClosed,
    Removed,
    DuplicateConnection,
    ResponseDeleted {
        response_id: String,
        participant_id: Option<String>,
    },
}

impl ServerEvent {
    /// Event type label used for the session feed.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::JoinAnnounce(_) => "SendJoinClass",
            Self::SlideChanged(_) => "SlideChanged",
            Self::SlideShowStarted(_) => "SlideShowStarted",
            Self::SlideShowEnded => "SlideShowEnded",
            Self::PointsAwarded(_) => "GotPoints",
            Self::ActivityStarted(_) => "StartActivity",
            Self::ActivityEnded => "EndActivity",
            Self::AnswerReveal(_) => "ShowCorrectAnswer",
            Self::ActivityClosed => "SubmissionClosed",
            Self::Removed => "RemovedFromClass",
            Self::DuplicateConnection => "DuplicateConnection",
            Self::ResponseDeleted { .. } => "ResponseDeleted",
        }
    }
}

/// Normalize a raw hub invocation into a typed event.
///
/// Unknown targets return `None`; callers log and drop them so one
/// unrecognized event cannot break the stream.
#[must_use]
pub fn normalize(target: &str, arguments: &[Value]) -> Option<ServerEvent> {
    let payload = arguments.first().unwrap_or(&Value::Null);

    match target {
        "SendJoinClass" => Some(ServerEvent::JoinAnnounce(parse_join_announce(payload))),
        "SlideChanged" => Some(ServerEvent::SlideChanged(parse_slide(payload))),
        "SlideShowStarted" => {
            let seed = pick(payload, &["currentSlideshow", "CurrentSlideshow", "currentSlide"])
                .map(parse_slide);
            Some(ServerEvent::SlideShowStarted(seed))
        }
        "SlideShowEnded" => Some(ServerEvent::SlideShowEnded),
        "GotPoints" => Some(ServerEvent::PointsAwarded(parse_points(payload))),
        "StartActivity" => Some(ServerEvent::ActivityStarted(payload.clone())),
        "EndActivity" => Some(ServerEvent::ActivityEnded),
        "ShowCorrectAnswer" => Some(ServerEvent::AnswerReveal(parse_reveal(payload))),
        "SubmissionClosed" => Some(ServerEvent::ActivityClosed),
        "RemovedFromClass" => Some(ServerEvent::Removed),
        "DuplicateConnection" => Some(ServerEvent::DuplicateConnection),
        "ResponseDeleted" => Some(ServerEvent::ResponseDeleted {
            response_id: pick_string(payload, &["responseId", "ResponseId"]).unwrap_or_default(),
            participant_id: pick_string(payload, &["participantId", "ParticipantId"]),
        }),
        _ => None,
    }
}

fn parse_join_announce(payload: &Value) -> JoinAnnounce {
    let current = pick_u64(payload, &["participantPoints", "ParticipantPoints"]);
    let total = pick_u64(payload, &["participantTotalPoints", "ParticipantTotalPoints"]);
    let points = match (current, total) {
        (None, None) => None,
        (current, total) => Some(saturating_u32(
            current.unwrap_or(0).saturating_add(total.unwrap_or(0)),
        )),
    };

    JoinAnnounce {
        in_slideshow: pick_bool(payload, &["isInSlideshow", "IsInSlideshow", "inSlideshow"]),
        points,
        participant_id: pick_string(payload, &["participantId", "ParticipantId"]),
        participant_name: pick_string(payload, &["participantName", "ParticipantName"]),
        participant_username: pick_string(payload, &["participantUsername", "ParticipantUsername"]),
        session_id: pick_string(payload, &["classSessionId", "ClassSessionId"]),
        activity: pick(payload, &["activityModel", "ActivityModel", "currentActivity"]).cloned(),
    }
}

fn parse_slide(payload: &Value) -> SlideInfo {
    let wire_index = pick_u64(
        payload,
        &["currentSlideIndex", "SlideIndex", "slideIndex", "index"],
    )
    .unwrap_or(0);
    let total = pick_u64(payload, &["totalSlideCount", "TotalSlideCount", "slideCount"])
        .filter(|count| *count > 0);

    SlideInfo {
        index: saturating_u32(wire_index.saturating_add(1)),
        title: pick_string(payload, &["title", "Title"]),
        image_url: pick_string(payload, &["imageUrl", "ImageUrl"]),
        total_slide_count: total.map(saturating_u32),
    }
}

/// Point awards arrive as a bare number or a one-element array; coerce and
/// default to zero.
fn parse_points(payload: &Value) -> u32 {
    let raw = match payload {
        Value::Array(items) => items.first().unwrap_or(&Value::Null),
        other => other,
    };
    coerce_u64(raw).map_or(0, saturating_u32)
}

fn parse_reveal(payload: &Value) -> bool {
    match payload {
        Value::Bool(flag) => *flag,
        Value::Object(_) => pick(payload, &["show", "Show", "reveal"])
            .and_then(Value::as_bool)
            .unwrap_or(true),
        // A bare ShowCorrectAnswer with no payload means "reveal".
        _ => true,
    }
}

/// Return the first present value among `keys`, in precedence order.
pub(crate) fn pick<'a>(payload: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let map = payload.as_object()?;
    keys.iter()
        .filter_map(|key| map.get(*key))
        .find(|value| !value.is_null())
}

/// First present key coerced to a non-empty string.
pub(crate) fn pick_string(payload: &Value, keys: &[&str]) -> Option<String> {
    pick(payload, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(ToOwned::to_owned)
}

/// First present key coerced to an unsigned integer. Accepts numbers and
/// numeric strings; negative and fractional values floor to zero.
pub(crate) fn pick_u64(payload: &Value, keys: &[&str]) -> Option<u64> {
    pick(payload, keys).and_then(coerce_u64)
}

/// First present key coerced to a boolean, defaulting to `false`.
pub(crate) fn pick_bool(payload: &Value, keys: &[&str]) -> bool {
    pick(payload, keys).is_some_and(|value| match value {
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().unwrap_or(0.0) != 0.0,
        Value::String(text) => !text.is_empty() && text != "false",
        _ => false,
    })
}

pub(crate) fn coerce_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => {
            if let Some(unsigned) = number.as_u64() {
                Some(unsigned)
            } else {
                // Negative or fractional point values floor to zero rather
                // than failing the whole event.
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                number.as_f64().map(|float| float.max(0.0) as u64)
            }
        }
        Value::String(text) => text.trim().parse::<u64>().ok(),
        _ => None,
    }
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}
