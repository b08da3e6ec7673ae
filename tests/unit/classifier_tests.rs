//! Unit tests for event classification.
//!
//! Covers the three rejection rules, their ordering, and acceptance of a
//! plain automatic parent restart.

use restart_cascade::cascade::{DependencyTag, EventClassifier, IgnoreReason, Verdict};
use restart_cascade::models::event::{EventKind, LifecycleEvent};
use restart_cascade::models::process::{ManagedProcess, ProcessStatus};

const TAG: &str = "PM2_PARENT_APP";

const ALL_KINDS: &[EventKind] = &[
    EventKind::Online,
    EventKind::Exit,
    EventKind::Restart,
    EventKind::Stop,
    EventKind::Start,
    EventKind::Delete,
    EventKind::RestartOverlimit,
    EventKind::Exception,
    EventKind::Other,
];

const ALL_STATUSES: &[ProcessStatus] = &[
    ProcessStatus::Launching,
    ProcessStatus::Online,
    ProcessStatus::Stopping,
    ProcessStatus::Stopped,
    ProcessStatus::Errored,
    ProcessStatus::WaitingRestart,
    ProcessStatus::OneLaunch,
    ProcessStatus::Unknown,
];

fn classifier(ignore_manual: bool) -> EventClassifier {
    EventClassifier::new(DependencyTag::new(TAG), ignore_manual)
}

fn restart_of(process: ManagedProcess, manual: bool) -> LifecycleEvent {
    LifecycleEvent::new(EventKind::Online, process, manual)
}

#[test]
fn automatic_parent_restart_is_accepted() {
    let event = restart_of(ManagedProcess::new("api", 0, ProcessStatus::Launching), false);

    assert_eq!(
        classifier(false).classify(&event),
        Verdict::Cascade {
            parent: "api".into()
        }
    );
}

#[test]
fn child_process_events_never_cascade() {
    let child = ManagedProcess::new("worker", 1, ProcessStatus::Launching).with_env(TAG, "api");

    for &kind in ALL_KINDS {
        for &status in ALL_STATUSES {
            let mut process = child.clone();
            process.status = status;
            let event = LifecycleEvent::new(kind, process, false);
            assert_eq!(
                classifier(false).classify(&event),
                Verdict::Ignore(IgnoreReason::ChildProcess),
                "child event {kind:?}/{status:?} must be rejected as a child"
            );
        }
    }
}

#[test]
fn child_rule_wins_over_manual_rule() {
    let child = ManagedProcess::new("worker", 1, ProcessStatus::Launching).with_env(TAG, "api");
    let event = restart_of(child, true);

    assert_eq!(
        classifier(true).classify(&event),
        Verdict::Ignore(IgnoreReason::ChildProcess)
    );
}

#[test]
fn empty_tag_value_is_not_a_child() {
    let process = ManagedProcess::new("api", 0, ProcessStatus::Launching).with_env(TAG, "");
    let event = restart_of(process, false);

    assert!(matches!(
        classifier(false).classify(&event),
        Verdict::Cascade { .. }
    ));
}

#[test]
fn only_online_launching_is_a_restart() {
    for &kind in ALL_KINDS {
        for &status in ALL_STATUSES {
            let event = LifecycleEvent::new(kind, ManagedProcess::new("api", 0, status), false);
            let verdict = classifier(false).classify(&event);

            if kind == EventKind::Online && status == ProcessStatus::Launching {
                assert!(matches!(verdict, Verdict::Cascade { .. }));
            } else {
                assert_eq!(
                    verdict,
                    Verdict::Ignore(IgnoreReason::NotARestart),
                    "{kind:?}/{status:?} must not cascade"
                );
            }
        }
    }
}

#[test]
fn manual_restart_ignored_when_flag_set() {
    let event = restart_of(ManagedProcess::new("api", 0, ProcessStatus::Launching), true);

    assert_eq!(
        classifier(true).classify(&event),
        Verdict::Ignore(IgnoreReason::ManualRestart)
    );
}

#[test]
fn manual_restart_accepted_when_flag_unset() {
    let event = restart_of(ManagedProcess::new("api", 0, ProcessStatus::Launching), true);

    assert_eq!(
        classifier(false).classify(&event),
        Verdict::Cascade {
            parent: "api".into()
        }
    );
}

#[test]
fn non_restart_rule_wins_over_manual_rule() {
    let event = LifecycleEvent::new(
        EventKind::Exit,
        ManagedProcess::new("api", 0, ProcessStatus::Stopped),
        true,
    );

    assert_eq!(
        classifier(true).classify(&event),
        Verdict::Ignore(IgnoreReason::NotARestart)
    );
}

#[test]
fn custom_tag_key_is_honoured() {
    let classifier = EventClassifier::new(DependencyTag::new("DEPENDS_ON"), false);
    let tagged_default = ManagedProcess::new("svc", 2, ProcessStatus::Launching).with_env(TAG, "api");
    let tagged_custom =
        ManagedProcess::new("svc", 2, ProcessStatus::Launching).with_env("DEPENDS_ON", "api");

    assert!(matches!(
        classifier.classify(&restart_of(tagged_default, false)),
        Verdict::Cascade { .. }
    ));
    assert_eq!(
        classifier.classify(&restart_of(tagged_custom, false)),
        Verdict::Ignore(IgnoreReason::ChildProcess)
    );
}
