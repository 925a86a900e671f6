use std::time::Duration;

use chrono::Duration as ChronoDuration;

use super::common::*;
use crate::workflows::profiles::audit::AuditAction;
use crate::workflows::profiles::domain::{ProfileDraft, ProfileId, ProfileStatus, ProfileUpdate};
use crate::workflows::profiles::jobs::{Job, RecordingScheduler};
use crate::workflows::profiles::lifecycle::{LifecycleError, ValidationOutcome};
use crate::workflows::profiles::rate_limit::{RateLimitConfig, RateLimitPolicy, RateLimitedAction};
use crate::workflows::profiles::repository::ProfileRepository;

#[test]
fn submit_stores_draft_and_schedules_validation() {
    let h = harness();

    let profile = h.submit(valid_draft());

    assert_eq!(profile.status, ProfileStatus::Draft);
    assert_eq!(profile.created_by.actor, Some(author().id));
    assert_eq!(profile.created_by.at, start());
    assert_eq!(h.audit_actions(), vec![AuditAction::ProfileCreate]);
    assert_eq!(
        h.take_jobs(),
        vec![(
            Job::Validate {
                profile_id: profile.id.clone()
            },
            Duration::ZERO
        )]
    );
    assert_eq!(h.rate_limits.len(), 1);
}

#[test]
fn complete_draft_is_accepted_by_the_system() {
    let h = harness();
    let profile = h.submit(valid_draft());
    h.take_jobs();

    let outcome = h.engine.run_validation(&profile.id).unwrap();

    assert_eq!(outcome, ValidationOutcome::Accepted);
    let stored = h.reload(&profile);
    assert_eq!(stored.status, ProfileStatus::Accepted);
    let reviewed = stored.reviewed_by.expect("reviewer stamp");
    assert_eq!(reviewed.actor, None);
    assert_eq!(h.last_audit().action, AuditAction::ValidationSuccess);
    assert_eq!(
        h.take_jobs(),
        vec![(
            Job::Translate {
                profile_id: profile.id
            },
            Duration::ZERO
        )]
    );
}

#[test]
fn failing_draft_is_rejected_with_every_violation() {
    let h = harness();
    let profile = h.submit(short_draft_without_images());
    h.take_jobs();

    let outcome = h.engine.run_validation(&profile.id).unwrap();

    let ValidationOutcome::Rejected(report) = outcome else {
        panic!("expected rejection, got {outcome:?}");
    };
    assert_eq!(report.fields(), vec!["descShort", "gallery"]);
    assert_eq!(h.reload(&profile).status, ProfileStatus::Rejected);
    assert!(h.take_jobs().is_empty());

    let entry = h.last_audit();
    assert_eq!(entry.action, AuditAction::ValidationFailure);
    let errors = entry.detail.expect("failure detail")["errors"].clone();
    assert_eq!(errors.as_array().map(Vec::len), Some(2));
    assert_eq!(errors[0]["field"], "descShort");
}

#[test]
fn duplicate_validation_delivery_is_a_no_op() {
    let h = harness();
    let profile = h.submit(valid_draft());
    h.take_jobs();

    h.engine.run_validation(&profile.id).unwrap();
    let second = h.engine.run_validation(&profile.id).unwrap();

    assert_eq!(second, ValidationOutcome::Skipped(ProfileStatus::Accepted));
    let validations = h
        .audit_actions()
        .into_iter()
        .filter(|action| *action == AuditAction::ValidationSuccess)
        .count();
    assert_eq!(validations, 1);
    assert_eq!(h.take_jobs().len(), 1);
}

#[test]
fn authors_cannot_change_status_and_the_attempt_is_audited() {
    let h = harness();
    let profile = h.accepted();

    let err = h
        .engine
        .set_status(&profile.id, ProfileStatus::Published, &author())
        .unwrap_err();

    assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    assert_eq!(h.reload(&profile).status, ProfileStatus::Accepted);
    let entry = h.last_audit();
    assert_eq!(entry.action, AuditAction::AccessDenied);
    assert_eq!(entry.actor, Some(author().id));
}

#[test]
fn illegal_transitions_are_rejected_without_audit() {
    let h = harness();
    let profile = h.submit(valid_draft());
    let before = h.audit_actions().len();

    let err = h
        .engine
        .set_status(&profile.id, ProfileStatus::Published, &reviewer())
        .unwrap_err();

    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: ProfileStatus::Draft,
            to: ProfileStatus::Published
        }
    ));
    assert_eq!(h.audit_actions().len(), before);
    assert_eq!(h.reload(&profile).status, ProfileStatus::Draft);
}

#[test]
fn terminal_states_accept_no_transition() {
    let h = harness();
    let profile = h.published();

    for target in [
        ProfileStatus::Draft,
        ProfileStatus::Accepted,
        ProfileStatus::Rejected,
    ] {
        let err = h
            .engine
            .set_status(&profile.id, target, &admin())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }
}

#[test]
fn publication_schedules_distribution_then_delayed_catalog_sync() {
    let h = harness();
    let profile = h.accepted();

    let published = h
        .engine
        .set_status(&profile.id, ProfileStatus::Published, &reviewer())
        .unwrap();

    assert_eq!(published.status, ProfileStatus::Published);
    assert_eq!(
        published.finalized_by.and_then(|stamp| stamp.actor),
        Some(reviewer().id)
    );
    assert_eq!(
        h.take_jobs(),
        vec![
            (
                Job::Distribute {
                    profile_id: profile.id.clone()
                },
                Duration::ZERO
            ),
            (
                Job::CatalogSync {
                    profile_id: profile.id.clone()
                },
                Duration::from_secs(15)
            ),
        ]
    );

    let entry = h.last_audit();
    assert_eq!(entry.action, AuditAction::ProfileStatusChange);
    let change = entry.change.expect("status change recorded");
    assert_eq!(change.before, "ACCEPTED");
    assert_eq!(change.after, "PUBLISHED");
}

#[test]
fn concurrent_reviewers_apply_a_transition_once() {
    let h = harness();
    let profile = h.accepted();

    let outcomes: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|index| {
                let engine = &h.engine;
                let id = &profile.id;
                let target = if index % 2 == 0 {
                    ProfileStatus::Published
                } else {
                    ProfileStatus::Rejected
                };
                scope.spawn(move || engine.set_status(id, target, &admin()))
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("thread completes"))
            .collect()
    });

    let successes = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err())
        .all(|err| matches!(err, LifecycleError::InvalidTransition { .. })));

    let changes = h
        .audit_actions()
        .into_iter()
        .filter(|action| *action == AuditAction::ProfileStatusChange)
        .count();
    assert_eq!(changes, 1);
}

#[test]
fn update_audits_changed_field_names_only() {
    let h = harness();
    let profile = h.accepted();

    let updated = h
        .engine
        .update(
            &profile.id,
            ProfileUpdate {
                name: Some("Luna II".to_string()),
                location: Some(profile.location.clone()),
                health: Some(Some("geimpft".to_string())),
                ..ProfileUpdate::default()
            },
            &author(),
        )
        .unwrap();

    assert_eq!(updated.name, "Luna II");
    assert_eq!(updated.status, ProfileStatus::Accepted);
    let entry = h.last_audit();
    assert_eq!(entry.action, AuditAction::ProfileUpdate);
    let detail = entry.detail.expect("changed fields");
    assert_eq!(detail["fields"], serde_json::json!(["name", "health"]));
    assert!(!detail.to_string().contains("geimpft"));
}

#[test]
fn remove_is_reserved_for_administrators() {
    let h = harness();
    let profile = h.submit(valid_draft());

    let err = h.engine.remove(&profile.id, &reviewer()).unwrap_err();
    assert!(matches!(err, LifecycleError::Unauthorized { .. }));
    assert_eq!(h.last_audit().action, AuditAction::AccessDenied);

    let removed = h.engine.remove(&profile.id, &admin()).unwrap();
    assert_eq!(removed.id, profile.id);
    let entry = h.last_audit();
    assert_eq!(entry.action, AuditAction::ProfileDelete);
    assert_eq!(entry.detail.expect("snapshot")["name"], "Luna");

    assert!(matches!(
        h.engine.get(&profile.id, &admin()),
        Err(LifecycleError::NotFound(_))
    ));
}

#[test]
fn removing_an_unknown_profile_is_not_found_and_not_charged() {
    let h = harness();

    let err = h
        .engine
        .remove(&ProfileId("missing".to_string()), &admin())
        .unwrap_err();

    assert!(matches!(err, LifecycleError::NotFound(_)));
    assert!(h.rate_limits.is_empty());
}

#[test]
fn submissions_are_rate_limited_per_actor() {
    let limits = RateLimitConfig::empty().with_policy(
        RateLimitedAction::SubmitProfile,
        RateLimitPolicy {
            max_requests: 2,
            window: ChronoDuration::hours(1),
        },
    );
    let h = harness_with(limits, RecordingScheduler::default());

    h.submit(valid_draft());
    h.clock.advance(ChronoDuration::minutes(10));
    h.submit(valid_draft());

    let err = h.engine.submit(valid_draft(), &author()).unwrap_err();
    let LifecycleError::RateLimited { reset_at, .. } = err else {
        panic!("expected rate limit, got {err:?}");
    };
    assert_eq!(reset_at, start() + ChronoDuration::hours(1));
    assert_eq!(h.last_audit().action, AuditAction::RateLimitExceeded);

    // another author has their own budget
    let other = crate::workflows::profiles::domain::Actor::new(
        "author-2",
        crate::workflows::profiles::domain::Role::Author,
    );
    assert!(h.engine.submit(valid_draft(), &other).is_ok());

    h.clock.advance(ChronoDuration::minutes(51));
    assert!(h.engine.submit(valid_draft(), &author()).is_ok());
}

#[test]
fn follow_ups_are_scheduled_when_the_audit_store_is_down() {
    let h = harness_refusing_audit(vec![
        AuditAction::ValidationSuccess,
        AuditAction::ProfileStatusChange,
    ]);
    let profile = h.submit(valid_draft());
    h.take_jobs();

    let outcome = h.engine.run_validation(&profile.id).unwrap();

    assert_eq!(outcome, ValidationOutcome::Accepted);
    assert_eq!(h.reload(&profile).status, ProfileStatus::Accepted);
    assert_eq!(
        h.take_jobs(),
        vec![(
            Job::Translate {
                profile_id: profile.id.clone()
            },
            Duration::ZERO
        )]
    );

    let published = h
        .engine
        .set_status(&profile.id, ProfileStatus::Published, &reviewer())
        .unwrap();

    assert_eq!(published.status, ProfileStatus::Published);
    let kinds: Vec<_> = h.take_jobs().into_iter().map(|(job, _)| job).collect();
    assert_eq!(
        kinds,
        vec![
            Job::Distribute {
                profile_id: profile.id.clone()
            },
            Job::CatalogSync {
                profile_id: profile.id
            },
        ]
    );
    assert_eq!(h.audit_actions(), vec![AuditAction::ProfileCreate]);
}

#[test]
fn explicit_null_clears_an_optional_field() {
    let h = harness();
    let profile = h.submit(ProfileDraft {
        diseases: Some("Arthrose".to_string()),
        ..valid_draft()
    });

    let keep: ProfileUpdate = serde_json::from_value(serde_json::json!({ "name": "Luna" })).unwrap();
    let kept = h.engine.update(&profile.id, keep, &author()).unwrap();
    assert_eq!(kept.diseases.as_deref(), Some("Arthrose"));

    let clear: ProfileUpdate =
        serde_json::from_value(serde_json::json!({ "diseases": null })).unwrap();
    assert_eq!(clear.diseases, Some(None));
    let cleared = h.engine.update(&profile.id, clear, &author()).unwrap();

    assert_eq!(cleared.diseases, None);
    let detail = h.last_audit().detail.expect("changed fields");
    assert_eq!(detail["fields"], serde_json::json!(["diseases"]));
}

#[test]
fn closed_scheduler_surfaces_as_error() {
    let h = harness_with(RateLimitConfig::default(), RecordingScheduler::closed());

    let err = h.engine.submit(valid_draft(), &author()).unwrap_err();

    assert!(matches!(err, LifecycleError::Scheduler(_)));
}

#[test]
fn list_and_search_read_the_store() {
    let h = harness();
    let luna = h.submit(valid_draft());
    h.clock.advance(ChronoDuration::minutes(1));
    let felix = h.submit(crate::workflows::profiles::domain::ProfileDraft {
        name: "Felix".to_string(),
        category: "Katze".to_string(),
        location: "Pflegestelle Potsdam".to_string(),
        ..valid_draft()
    });
    h.engine.run_validation(&luna.id).unwrap();

    let drafts = h
        .engine
        .list(
            &crate::workflows::profiles::domain::ProfileQuery {
                status: Some(ProfileStatus::Draft),
                ..Default::default()
            },
            &reviewer(),
        )
        .unwrap();
    assert_eq!(drafts.iter().map(|p| &p.id).collect::<Vec<_>>(), vec![&felix.id]);

    let found = h.engine.search("  katze ", None, &reviewer()).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Felix");

    let by_location = h.engine.search("berlin", None, &reviewer()).unwrap();
    assert_eq!(by_location[0].id, luna.id);

    assert!(h.engine.search("   ", None, &reviewer()).unwrap().is_empty());
    assert_eq!(h.profiles.list(&Default::default()).unwrap().len(), 2);
}
