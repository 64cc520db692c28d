//! Integration tests for chapter progression, assessments and certificates
//!
//! Each test runs against a file-backed SQLite database in a temp dir so
//! the pool, WAL mode and write transactions behave as in production.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use partner_academy::catalog::{CourseDefinition, ImportOutcome};
use partner_academy::db::progress;
use partner_academy::services::{Answers, LearningEvent, SubmitOutcome};
use partner_academy::{
    ChapterStatus, DbOptions, EngineSettings, LearningDb, LearningError, PartnerContext, Services,
    SqliteCatalog,
};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

struct Harness {
    _dir: TempDir,
    db: Arc<LearningDb>,
    catalog: Arc<SqliteCatalog>,
    services: Services,
}

fn harness() -> Harness {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let db = Arc::new(
        LearningDb::open(&dir.path().join("academy.db"), DbOptions::default())
            .expect("Failed to open database"),
    );
    let catalog = Arc::new(SqliteCatalog::new(db.clone()));
    let services = Services::new(db.clone(), catalog.clone(), EngineSettings::default());
    Harness {
        _dir: dir,
        db,
        catalog,
        services,
    }
}

/// Chapter 1: video (100s), no test. Chapter 2: no video, 2-question test
/// with passing score 70 and two attempts.
fn scenario_course() -> CourseDefinition {
    serde_json::from_value(serde_json::json!({
        "id": "course-1",
        "title": "Partner onboarding",
        "description": "Compliance basics for referral partners",
        "chapters": [
            {
                "id": "ch-1",
                "title": "Welcome",
                "order_index": 0,
                "content_ref": "content/welcome.md",
                "video": { "provider": "youtube", "reference": "dQw4w9WgXcQ", "duration_seconds": 100.0 }
            },
            {
                "id": "ch-2",
                "title": "Check your knowledge",
                "order_index": 1,
                "content_ref": "content/quiz.md",
                "test": {
                    "id": "test-2",
                    "passing_score_percent": 70,
                    "max_attempts": 2,
                    "questions": [
                        { "id": "q1", "text": "Which document is required?", "options": [
                            { "text": "Licence", "is_correct": true },
                            { "text": "Nothing" }
                        ]},
                        { "id": "q2", "text": "Select every deadline", "is_multiple": true, "options": [
                            { "text": "Quarterly", "is_correct": true },
                            { "text": "Annual", "is_correct": true },
                            { "text": "Never" }
                        ]}
                    ]
                }
            }
        ]
    }))
    .expect("valid course definition")
}

fn single_chapter_course() -> CourseDefinition {
    serde_json::from_value(serde_json::json!({
        "id": "course-read",
        "title": "Reading only",
        "chapters": [
            { "id": "read-1", "title": "Terms", "order_index": 0, "content_ref": "content/terms.md" }
        ]
    }))
    .expect("valid course definition")
}

/// Two video chapters back to back
fn video_series_course() -> CourseDefinition {
    serde_json::from_value(serde_json::json!({
        "id": "course-video",
        "title": "Product walkthrough",
        "chapters": [
            {
                "id": "vid-1",
                "title": "Dashboard tour",
                "order_index": 0,
                "content_ref": "content/dashboard.md",
                "video": { "provider": "file", "reference": "videos/dashboard.mp4", "duration_seconds": 100.0 }
            },
            {
                "id": "vid-2",
                "title": "Referral links",
                "order_index": 1,
                "content_ref": "content/referrals.md",
                "video": { "provider": "embed", "reference": "https://player.example.com/referrals", "duration_seconds": 100.0 }
            }
        ]
    }))
    .expect("valid course definition")
}

fn answers(entries: &[(&str, &[usize])]) -> Answers {
    entries
        .iter()
        .map(|(id, sel)| (id.to_string(), sel.iter().copied().collect::<BTreeSet<usize>>()))
        .collect()
}

fn half_right() -> Answers {
    answers(&[("q1", &[0]), ("q2", &[0])])
}

fn all_right() -> Answers {
    answers(&[("q1", &[0]), ("q2", &[0, 1])])
}

fn partner(id: &str) -> PartnerContext {
    PartnerContext::new(id).unwrap()
}

fn setup_scenario() -> Harness {
    let h = harness();
    assert_eq!(h.catalog.import_course(&scenario_course()).unwrap(), ImportOutcome::Imported);
    h
}

/// Finish chapter 1 so the test chapter opens
fn watch_first_chapter(h: &Harness, ctx: &PartnerContext) {
    h.services.video.report_progress(ctx, "ch-1", 100.0, 100.0, true).unwrap();
}

fn status(h: &Harness, ctx: &PartnerContext, chapter_id: &str) -> ChapterStatus {
    h.services.progress.get_chapter(ctx, chapter_id).unwrap().status
}

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn test_end_to_end_scenario() {
    let h = setup_scenario();
    let ctx = partner("partner-1");
    let mut events = h.services.events.subscribe();

    // 1. start chapter 1, chapter 2 stays locked
    let ch1 = h.services.progress.start_chapter(&ctx, "ch-1").unwrap();
    assert_eq!(ch1.status, ChapterStatus::InProgress);
    assert!(ch1.started_at.is_some());
    assert_eq!(status(&h, &ctx, "ch-2"), ChapterStatus::Locked);

    // 2. 85% watched completes chapter 1 and opens chapter 2
    let report = h.services.video.report_progress(&ctx, "ch-1", 85.0, 100.0, false).unwrap();
    assert!(report.video_watched);
    assert!(report.chapter_completed);
    assert_eq!(report.status, ChapterStatus::Completed);
    assert_eq!(status(&h, &ctx, "ch-1"), ChapterStatus::Completed);
    assert_eq!(status(&h, &ctx, "ch-2"), ChapterStatus::Available);

    // 3. start chapter 2
    let ch2 = h.services.progress.start_chapter(&ctx, "ch-2").unwrap();
    assert_eq!(ch2.status, ChapterStatus::InProgress);

    // 4. half right
    let first = h.services.assessment.submit_answers(&ctx, "test-2", half_right()).unwrap();
    let SubmitOutcome::Scored(first) = first else {
        panic!("expected a scored attempt");
    };
    assert_eq!(first.score_percent, 50);
    assert!(!first.passed);
    assert_eq!(first.attempts_used, 1);
    assert_eq!(status(&h, &ctx, "ch-2"), ChapterStatus::InProgress);
    assert!(matches!(
        h.services.certificates.get_certificate(&ctx, "course-1"),
        Err(LearningError::NotYetEarned { .. })
    ));

    // 5. all right completes the chapter and the course
    let second = h.services.assessment.submit_answers(&ctx, "test-2", all_right()).unwrap();
    let SubmitOutcome::Scored(second) = second else {
        panic!("expected a scored attempt");
    };
    assert_eq!(second.score_percent, 100);
    assert!(second.passed);
    assert_eq!(second.attempts_used, 2);
    assert!(second.chapter_completed);
    assert_eq!(status(&h, &ctx, "ch-2"), ChapterStatus::Completed);

    let certificate = h.services.certificates.get_certificate(&ctx, "course-1").unwrap();
    assert!(
        certificate.certificate_number.starts_with("CERT-course-1-000001-"),
        "{}",
        certificate.certificate_number
    );

    // 6. a third submission is a no-op returning the passing attempt
    let third = h.services.assessment.submit_answers(&ctx, "test-2", half_right()).unwrap();
    let SubmitOutcome::AlreadyPassed(third) = third else {
        panic!("expected AlreadyPassed");
    };
    assert!(third.already_passed);
    assert_eq!(third.attempt.attempt_seq, 2);
    assert_eq!(third.score_percent, 100);
    assert_eq!(h.services.assessment.list_attempts(&ctx, "test-2").unwrap().len(), 2);

    // Certificate is stable across reads
    let again = h.services.certificates.get_certificate(&ctx, "course-1").unwrap();
    assert_eq!(again, certificate);

    let mut issued = 0;
    let mut unlocked = Vec::new();
    while let Ok(event) = events.try_recv() {
        match event {
            LearningEvent::CertificateIssued { certificate_number, .. } => {
                assert_eq!(certificate_number, certificate.certificate_number);
                issued += 1;
            }
            LearningEvent::ChapterUnlocked { chapter_id, .. } => unlocked.push(chapter_id),
            _ => {}
        }
    }
    assert_eq!(issued, 1);
    assert_eq!(unlocked, vec!["ch-2".to_string()]);
}

#[test]
fn test_course_overview() {
    let h = setup_scenario();
    let ctx = partner("partner-overview");

    let overview = h.services.progress.course_overview(&ctx, "course-1").unwrap();
    assert_eq!(overview.total_chapters, 2);
    assert_eq!(overview.completed_chapters, 0);
    assert_eq!(overview.chapters[0].status, ChapterStatus::Available);
    assert_eq!(overview.chapters[1].status, ChapterStatus::Locked);
    assert!(overview.certificate.is_none());

    watch_first_chapter(&h, &ctx);
    let overview = h.services.progress.course_overview(&ctx, "course-1").unwrap();
    assert_eq!(overview.completed_chapters, 1);
    assert_eq!(overview.percent_complete, 50);
    assert_eq!(overview.chapters[1].status, ChapterStatus::Available);
}

// ============================================================================
// Gating
// ============================================================================

#[test]
fn test_locked_chapter_rejects_actions() {
    let h = setup_scenario();
    let ctx = partner("partner-locked");

    assert!(matches!(
        h.services.progress.start_chapter(&ctx, "ch-2"),
        Err(LearningError::ChapterLocked { .. })
    ));
    assert!(matches!(
        h.services.progress.complete_chapter(&ctx, "ch-2"),
        Err(LearningError::ChapterLocked { .. })
    ));
    assert!(matches!(
        h.services.assessment.get_test(&ctx, "ch-2"),
        Err(LearningError::ChapterLocked { .. })
    ));
    assert!(matches!(
        h.services.assessment.submit_answers(&ctx, "test-2", all_right()),
        Err(LearningError::ChapterLocked { .. })
    ));

    // Read path still works and hides the content
    let view = h.services.progress.get_chapter(&ctx, "ch-2").unwrap();
    assert_eq!(view.status, ChapterStatus::Locked);
    assert!(view.content_ref.is_none());
    assert!(view.has_test);

    assert!(h.services.assessment.list_attempts(&ctx, "test-2").unwrap().is_empty());
}

#[test]
fn test_locked_video_report_has_no_side_effects() {
    let h = harness();
    assert_eq!(h.catalog.import_course(&video_series_course()).unwrap(), ImportOutcome::Imported);
    let ctx = partner("partner-skip-ahead");
    let mut rx = h.services.events.subscribe();

    assert!(matches!(
        h.services.video.report_progress(&ctx, "vid-2", 99.0, 100.0, true),
        Err(LearningError::ChapterLocked { .. })
    ));

    let view = h.services.progress.get_chapter(&ctx, "vid-2").unwrap();
    assert_eq!(view.status, ChapterStatus::Locked);
    assert_eq!(view.video_progress_seconds, 0.0);
    assert!(!view.video_watched);
    assert!(view.completed_at.is_none());
    assert!(rx.try_recv().is_err());

    // Once the first chapter is done the same report lands
    h.services.video.report_progress(&ctx, "vid-1", 100.0, 100.0, true).unwrap();
    let update = h.services.video.report_progress(&ctx, "vid-2", 99.0, 100.0, true).unwrap();
    assert!(update.video_watched);
    assert_eq!(update.status, ChapterStatus::Completed);
}

#[test]
fn test_progress_is_per_partner() {
    let h = setup_scenario();
    let alice = partner("alice");
    let bob = partner("bob");

    watch_first_chapter(&h, &alice);

    assert_eq!(status(&h, &alice, "ch-2"), ChapterStatus::Available);
    assert_eq!(status(&h, &bob, "ch-1"), ChapterStatus::Available);
    assert_eq!(status(&h, &bob, "ch-2"), ChapterStatus::Locked);
}

#[test]
fn test_status_never_decreases() {
    let h = setup_scenario();
    let ctx = partner("partner-mono");

    let mut last = status(&h, &ctx, "ch-1");
    let mut check = |h: &Harness| {
        let now = status(h, &ctx, "ch-1");
        assert!(now >= last, "status went from {} to {}", last, now);
        last = now;
    };

    h.services.video.report_progress(&ctx, "ch-1", 10.0, 100.0, false).unwrap();
    check(&h);
    h.services.progress.start_chapter(&ctx, "ch-1").unwrap();
    check(&h);
    h.services.video.report_progress(&ctx, "ch-1", 95.0, 100.0, false).unwrap();
    check(&h);
    h.services.progress.start_chapter(&ctx, "ch-1").unwrap();
    check(&h);
    h.services.video.report_progress(&ctx, "ch-1", 0.0, 100.0, false).unwrap();
    check(&h);
    h.services.progress.complete_chapter(&ctx, "ch-1").unwrap();
    check(&h);

    assert_eq!(status(&h, &ctx, "ch-1"), ChapterStatus::Completed);
}

#[test]
fn test_chapter_without_requirements_completes() {
    let h = harness();
    h.catalog.import_course(&single_chapter_course()).unwrap();
    let ctx = partner("partner-reader");

    assert_eq!(status(&h, &ctx, "read-1"), ChapterStatus::Available);
    let view = h.services.progress.complete_chapter(&ctx, "read-1").unwrap();
    assert_eq!(view.status, ChapterStatus::Completed);
    assert!(view.completed_at.is_some());

    let certificate = h.services.certificates.get_certificate(&ctx, "course-read").unwrap();
    assert!(certificate.certificate_number.starts_with("CERT-course-read-"));
}

#[test]
fn test_complete_without_requirements_met_is_unchanged() {
    let h = setup_scenario();
    let ctx = partner("partner-early");

    h.services.progress.start_chapter(&ctx, "ch-1").unwrap();
    let view = h.services.progress.complete_chapter(&ctx, "ch-1").unwrap();
    assert_eq!(view.status, ChapterStatus::InProgress);
    assert!(view.completed_at.is_none());
}

// ============================================================================
// Video
// ============================================================================

#[test]
fn test_video_watched_is_sticky() {
    let h = setup_scenario();
    let ctx = partner("partner-video");

    let watched = h.services.video.report_progress(&ctx, "ch-1", 90.0, 100.0, false).unwrap();
    assert!(watched.video_watched);

    let rewound = h.services.video.report_progress(&ctx, "ch-1", 5.0, 100.0, false).unwrap();
    assert!(rewound.video_watched);
    assert_eq!(rewound.video_progress_seconds, 90.0);
    assert_eq!(rewound.status, ChapterStatus::Completed);
}

#[test]
fn test_out_of_order_reports_keep_maximum() {
    let h = setup_scenario();
    let ctx = partner("partner-reorder");

    for position in [30.0, 10.0, 50.0, 20.0] {
        h.services.video.report_progress(&ctx, "ch-1", position, 100.0, false).unwrap();
    }

    let view = h.services.progress.get_chapter(&ctx, "ch-1").unwrap();
    assert_eq!(view.video_progress_seconds, 50.0);
    assert!(!view.video_watched);
    assert_eq!(view.status, ChapterStatus::Available);
}

#[test]
fn test_catalog_duration_overrides_reported() {
    let h = setup_scenario();
    let ctx = partner("partner-duration");

    // Client claims a 50s video; the catalog says 100s
    let report = h.services.video.report_progress(&ctx, "ch-1", 45.0, 50.0, false).unwrap();
    assert!(!report.video_watched);
}

#[test]
fn test_invalid_progress_is_dropped() {
    let h = setup_scenario();
    let ctx = partner("partner-bad-report");

    assert!(matches!(
        h.services.video.report_progress(&ctx, "ch-1", -1.0, 100.0, false),
        Err(LearningError::InvalidProgress(_))
    ));
    assert!(matches!(
        h.services.video.report_progress(&ctx, "ch-1", f64::NAN, 100.0, false),
        Err(LearningError::InvalidProgress(_))
    ));

    let view = h.services.progress.get_chapter(&ctx, "ch-1").unwrap();
    assert_eq!(view.video_progress_seconds, 0.0);
    assert!(view.started_at.is_none());
}

// ============================================================================
// Assessments
// ============================================================================

#[test]
fn test_get_test_hides_answer_key() {
    let h = setup_scenario();
    let ctx = partner("partner-test-view");
    watch_first_chapter(&h, &ctx);

    let test = h.services.assessment.get_test(&ctx, "ch-2").unwrap();
    assert_eq!(test.attempts_used, 0);
    assert_eq!(test.max_attempts, 2);
    assert_eq!(test.questions.len(), 2);
    assert!(test.last_passed.is_none());

    let json = serde_json::to_string(&test).unwrap();
    assert!(!json.contains("is_correct"));

    h.services.assessment.submit_answers(&ctx, "test-2", all_right()).unwrap();
    let test = h.services.assessment.get_test(&ctx, "ch-2").unwrap();
    assert_eq!(test.attempts_used, 1);
    assert_eq!(test.last_passed.map(|a| a.score_percent), Some(100));
}

#[test]
fn test_incomplete_and_unknown_answers_do_not_use_attempts() {
    let h = setup_scenario();
    let ctx = partner("partner-incomplete");
    watch_first_chapter(&h, &ctx);

    match h.services.assessment.submit_answers(&ctx, "test-2", answers(&[("q1", &[0])])) {
        Err(LearningError::IncompleteAnswers { missing }) => assert_eq!(missing, vec!["q2".to_string()]),
        other => panic!("expected IncompleteAnswers, got {:?}", other),
    }

    let mut unknown = all_right();
    unknown.insert("q9".into(), BTreeSet::from([0]));
    assert!(matches!(
        h.services.assessment.submit_answers(&ctx, "test-2", unknown),
        Err(LearningError::InvalidInput(_))
    ));

    let out_of_range = answers(&[("q1", &[5]), ("q2", &[0, 1])]);
    match h.services.assessment.submit_answers(&ctx, "test-2", out_of_range) {
        Err(LearningError::InvalidInput(message)) => assert!(message.contains("q1")),
        other => panic!("expected InvalidInput, got {:?}", other),
    }

    assert!(h.services.assessment.list_attempts(&ctx, "test-2").unwrap().is_empty());
}

#[test]
fn test_attempts_exhausted() {
    let h = setup_scenario();
    let ctx = partner("partner-exhaust");
    watch_first_chapter(&h, &ctx);

    for _ in 0..2 {
        let outcome = h.services.assessment.submit_answers(&ctx, "test-2", half_right()).unwrap();
        assert!(!outcome.result().passed);
    }

    match h.services.assessment.submit_answers(&ctx, "test-2", all_right()) {
        Err(LearningError::AttemptsExhausted { max_attempts, .. }) => assert_eq!(max_attempts, 2),
        other => panic!("expected AttemptsExhausted, got {:?}", other),
    }

    let attempts = h.services.assessment.list_attempts(&ctx, "test-2").unwrap();
    assert_eq!(attempts.iter().map(|a| a.attempt_seq).collect::<Vec<_>>(), vec![1, 2]);
    assert_eq!(status(&h, &ctx, "ch-2"), ChapterStatus::Available);
}

#[test]
fn test_concurrent_submissions_respect_attempt_bound() {
    let h = setup_scenario();
    let ctx = partner("partner-race");
    watch_first_chapter(&h, &ctx);

    let results: Vec<_> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| h.services.assessment.submit_answers(&ctx, "test-2", half_right())))
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let recorded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(recorded, 2);
    for result in &results {
        if let Err(e) = result {
            assert!(matches!(e, LearningError::AttemptsExhausted { .. }), "{:?}", e);
        }
    }

    let attempts = h.services.assessment.list_attempts(&ctx, "test-2").unwrap();
    assert_eq!(attempts.len(), 2);
}

// ============================================================================
// Certificates
// ============================================================================

#[test]
fn test_concurrent_issuance_is_exactly_once() {
    let h = setup_scenario();
    let ctx = partner("partner-cert-race");

    // Complete both chapters directly so no service has issued yet
    h.db.with_conn(|conn| {
        for chapter in ["ch-1", "ch-2"] {
            progress::raise_status(conn, &ctx, chapter, "course-1", ChapterStatus::InProgress)?;
            assert!(progress::mark_completed(conn, &ctx, chapter)?);
        }
        Ok(())
    })
    .unwrap();
    assert!(h.services.certificates.find(&ctx, "course-1").unwrap().is_none());

    let numbers: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| h.services.certificates.check_and_issue(&ctx, "course-1")))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap().unwrap().certificate_number)
            .collect()
    });

    let distinct: HashSet<&String> = numbers.iter().collect();
    assert_eq!(distinct.len(), 1);
    assert_eq!(h.db.stats().unwrap().certificate_count, 1);
}

#[test]
fn test_certificate_numbers_are_unique_per_partner() {
    let h = harness();
    h.catalog.import_course(&single_chapter_course()).unwrap();

    let mut numbers = Vec::new();
    for id in ["p-1", "p-2", "p-3"] {
        let ctx = partner(id);
        h.services.progress.complete_chapter(&ctx, "read-1").unwrap();
        numbers.push(h.services.certificates.get_certificate(&ctx, "course-read").unwrap().certificate_number);
    }

    assert!(numbers[0].contains("-000001-"));
    assert!(numbers[1].contains("-000002-"));
    assert!(numbers[2].contains("-000003-"));
    assert_eq!(numbers.iter().collect::<HashSet<_>>().len(), 3);

    let verified = h.services.certificates.verify(&numbers[1]).unwrap().unwrap();
    assert_eq!(verified.partner_id, "p-2");
    assert_eq!(verified.course_id, "course-read");
    assert!(h.services.certificates.verify("CERT-nope").unwrap().is_none());
}

// ============================================================================
// Catalog import
// ============================================================================

#[test]
fn test_catalog_file_import() {
    let h = harness();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("catalog.json");

    let mut invalid = serde_json::to_value(single_chapter_json()).unwrap();
    invalid["id"] = serde_json::json!("course-bad");
    invalid["chapters"] = serde_json::json!([]);

    let file = serde_json::json!({ "courses": [single_chapter_json(), invalid] });
    std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();

    let result = h.catalog.import_file(&path).unwrap();
    assert_eq!(result.imported, 1);
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("course-bad"));

    let again = h.catalog.import_file(&path).unwrap();
    assert_eq!(again.imported, 0);
    assert_eq!(again.skipped, 1);

    let ctx = partner("partner-import");
    assert_eq!(status(&h, &ctx, "read-1"), ChapterStatus::Available);
    assert!(matches!(
        h.services.progress.get_chapter(&ctx, "missing"),
        Err(LearningError::NotFound(_))
    ));
}

fn single_chapter_json() -> serde_json::Value {
    serde_json::json!({
        "id": "course-read",
        "title": "Reading only",
        "chapters": [
            { "id": "read-1", "title": "Terms", "order_index": 0, "content_ref": "content/terms.md" }
        ]
    })
}
