// Diesel table definitions. Keep in sync with the DDL in schema.rs.

diesel::table! {
    courses (id) {
        id -> Text,
        title -> Text,
        description -> Nullable<Text>,
        created_at -> Text,
    }
}

diesel::table! {
    chapters (id) {
        id -> Text,
        course_id -> Text,
        order_index -> Integer,
        title -> Text,
        content_ref -> Nullable<Text>,
        video_provider -> Nullable<Text>,
        video_reference -> Nullable<Text>,
        video_duration_seconds -> Nullable<Double>,
        test_id -> Nullable<Text>,
    }
}

diesel::table! {
    chapter_tests (id) {
        id -> Text,
        chapter_id -> Text,
        passing_score_percent -> Integer,
        max_attempts -> Integer,
    }
}

diesel::table! {
    questions (id) {
        id -> Text,
        test_id -> Text,
        position -> Integer,
        text -> Text,
        is_multiple -> Bool,
    }
}

diesel::table! {
    question_options (question_id, position) {
        question_id -> Text,
        position -> Integer,
        text -> Text,
        is_correct -> Bool,
    }
}

diesel::table! {
    chapter_progress (partner_id, chapter_id) {
        partner_id -> Text,
        chapter_id -> Text,
        course_id -> Text,
        status -> Text,
        status_rank -> Integer,
        video_progress_seconds -> Double,
        video_watched -> Bool,
        test_passed -> Bool,
        started_at -> Nullable<Text>,
        completed_at -> Nullable<Text>,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    test_attempts (id) {
        id -> Text,
        test_id -> Text,
        partner_id -> Text,
        attempt_seq -> Integer,
        answers_json -> Text,
        correct_count -> Integer,
        total_questions -> Integer,
        score_percent -> Integer,
        passed -> Bool,
        created_at -> Text,
    }
}

diesel::table! {
    certificates (id) {
        id -> Text,
        partner_id -> Text,
        course_id -> Text,
        certificate_number -> Text,
        sequence -> Integer,
        issued_at -> Text,
    }
}

diesel::table! {
    certificate_sequences (course_id) {
        course_id -> Text,
        last_value -> Integer,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    courses,
    chapters,
    chapter_tests,
    questions,
    question_options,
    chapter_progress,
    test_attempts,
    certificates,
    certificate_sequences,
);
