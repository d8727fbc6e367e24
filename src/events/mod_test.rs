use serde_json::json;

use super::*;

fn one(payload: Value) -> Vec<Value> {
    vec![payload]
}

// =============================================================
// Slide events
// =============================================================

#[test]
fn slide_changed_stores_one_based_index() {
    let event = normalize("SlideChanged", &one(json!({"currentSlideIndex": 2}))).expect("event");
    let ServerEvent::SlideChanged(info) = event else {
        panic!("wrong variant");
    };
    assert_eq!(info.index, 3);
}

#[test]
fn slide_changed_prefers_exact_key_over_aliases() {
    let payload = json!({"currentSlideIndex": 1, "SlideIndex": 7, "slideIndex": 9});
    let ServerEvent::SlideChanged(info) = normalize("SlideChanged", &one(payload)).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(info.index, 2);
}

#[test]
fn slide_changed_reads_pascal_case_fields() {
    let payload = json!({"SlideIndex": 4, "Title": "Recap", "ImageUrl": "https://x/4.png"});
    let ServerEvent::SlideChanged(info) = normalize("SlideChanged", &one(payload)).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(info.index, 5);
    assert_eq!(info.title.as_deref(), Some("Recap"));
    assert_eq!(info.image_url.as_deref(), Some("https://x/4.png"));
}

#[test]
fn slide_changed_defaults_missing_fields() {
    let ServerEvent::SlideChanged(info) =
        normalize("SlideChanged", &one(json!({}))).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(info.index, 1);
    assert_eq!(info.title, None);
    assert_eq!(info.total_slide_count, None);
}

#[test]
fn zero_total_slide_count_reads_as_absent() {
    let payload = json!({"index": 0, "totalSlideCount": 0});
    let ServerEvent::SlideChanged(info) = normalize("SlideChanged", &one(payload)).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(info.total_slide_count, None);
}

#[test]
fn slideshow_started_seeds_from_embedded_slide() {
    let payload = json!({"currentSlideshow": {"currentSlideIndex": 0, "title": "Intro"}});
    let ServerEvent::SlideShowStarted(Some(info)) =
        normalize("SlideShowStarted", &one(payload)).expect("event")
    else {
        panic!("expected embedded slide");
    };
    assert_eq!(info.index, 1);
    assert_eq!(info.title.as_deref(), Some("Intro"));
}

// =============================================================
// Points
// =============================================================

#[test]
fn points_accept_bare_number() {
    assert_eq!(
        normalize("GotPoints", &one(json!(3))),
        Some(ServerEvent::PointsAwarded(3))
    );
}

#[test]
fn points_accept_one_element_array() {
    assert_eq!(
        normalize("GotPoints", &one(json!([5]))),
        Some(ServerEvent::PointsAwarded(5))
    );
}

#[test]
fn points_default_to_zero_on_junk() {
    assert_eq!(
        normalize("GotPoints", &one(json!("not a number"))),
        Some(ServerEvent::PointsAwarded(0))
    );
    assert_eq!(
        normalize("GotPoints", &[]),
        Some(ServerEvent::PointsAwarded(0))
    );
}

#[test]
fn points_coerce_numeric_strings() {
    assert_eq!(
        normalize("GotPoints", &one(json!("7"))),
        Some(ServerEvent::PointsAwarded(7))
    );
}

// =============================================================
// Join announce
// =============================================================

#[test]
fn join_announce_sums_current_and_total_points() {
    let payload = json!({"participantPoints": 3, "participantTotalPoints": 7});
    let ServerEvent::JoinAnnounce(announce) =
        normalize("SendJoinClass", &one(payload)).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(announce.points, Some(10));
}

#[test]
fn join_announce_with_single_point_field() {
    let ServerEvent::JoinAnnounce(announce) =
        normalize("SendJoinClass", &one(json!({"participantTotalPoints": 4}))).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(announce.points, Some(4));
}

#[test]
fn join_announce_without_points_is_none() {
    let ServerEvent::JoinAnnounce(announce) =
        normalize("SendJoinClass", &one(json!({"isInSlideshow": true}))).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(announce.points, None);
    assert!(announce.in_slideshow);
}

#[test]
fn join_announce_reads_slideshow_flag_aliases() {
    for key in ["isInSlideshow", "IsInSlideshow", "inSlideshow"] {
        let ServerEvent::JoinAnnounce(announce) =
            normalize("SendJoinClass", &one(json!({key: true}))).expect("event")
        else {
            panic!("wrong variant");
        };
        assert!(announce.in_slideshow, "flag not read via `{key}`");
    }
}

#[test]
fn join_announce_carries_identity_and_activity() {
    let payload = json!({
        "participantId": "p-9",
        "participantName": "Pat",
        "classSessionId": "sess-2",
        "activityModel": {"activityId": "a1"},
    });
    let ServerEvent::JoinAnnounce(announce) =
        normalize("SendJoinClass", &one(payload)).expect("event")
    else {
        panic!("wrong variant");
    };
    assert_eq!(announce.participant_id.as_deref(), Some("p-9"));
    assert_eq!(announce.session_id.as_deref(), Some("sess-2"));
    assert!(announce.activity.is_some());
}

// =============================================================
// Remaining catalog
// =============================================================

#[test]
fn reveal_defaults_to_true_without_payload() {
    assert_eq!(
        normalize("ShowCorrectAnswer", &[]),
        Some(ServerEvent::AnswerReveal(true))
    );
    assert_eq!(
        normalize("ShowCorrectAnswer", &one(json!(false))),
        Some(ServerEvent::AnswerReveal(false))
    );
    assert_eq!(
        normalize("ShowCorrectAnswer", &one(json!({"show": false}))),
        Some(ServerEvent::AnswerReveal(false))
    );
}

#[test]
fn response_deleted_reads_ids() {
    let payload = json!({"responseId": "r-1", "participantId": "p-1"});
    assert_eq!(
        normalize("ResponseDeleted", &one(payload)),
        Some(ServerEvent::ResponseDeleted {
            response_id: "r-1".to_owned(),
            participant_id: Some("p-1".to_owned()),
        })
    );
}

#[test]
fn unit_events_normalize() {
    assert_eq!(normalize("SlideShowEnded", &[]), Some(ServerEvent::SlideShowEnded));
    assert_eq!(normalize("EndActivity", &[]), Some(ServerEvent::ActivityEnded));
    assert_eq!(normalize("SubmissionClosed", &[]), Some(ServerEvent::ActivityClosed));
    assert_eq!(normalize("RemovedFromClass", &[]), Some(ServerEvent::Removed));
    assert_eq!(
        normalize("DuplicateConnection", &[]),
        Some(ServerEvent::DuplicateConnection)
    );
}

#[test]
fn unknown_target_is_dropped() {
    assert_eq!(normalize("SomethingNew", &one(json!({}))), None);
}

#[test]
fn every_catalog_target_normalizes() {
    for target in EVENT_TARGETS {
        assert!(
            normalize(target, &one(json!({}))).is_some(),
            "target `{target}` fell out of the catalog"
        );
    }
}

// =============================================================
// Coercion helpers
// =============================================================

#[test]
fn coerce_u64_floors_negatives_to_zero() {
    assert_eq!(coerce_u64(&json!(-4)), Some(0));
    assert_eq!(coerce_u64(&json!(2.9)), Some(2));
    assert_eq!(coerce_u64(&json!(null)), None);
}

#[test]
fn pick_skips_null_values() {
    let payload = json!({"title": null, "Title": "real"});
    assert_eq!(pick_string(&payload, &["title", "Title"]).as_deref(), Some("real"));
}
