table! {
    activity_log (id) {
        id -> Int4,
        submission -> Uuid,
        actor -> Nullable<Int4>,
        category -> Varchar,
        kind -> Varchar,
        data -> Bytea,
        timestamp -> Timestamp,
    }
}

table! {
    events (id) {
        id -> Int4,
        submission -> Uuid,
        kind -> Varchar,
        data -> Bytea,
        timestamp -> Timestamp,
    }
}

table! {
    publication_versions (id) {
        id -> Int4,
        submission -> Uuid,
        version -> Int4,
        status -> crate::db::types::Version_status,
        published_at -> Nullable<Timestamp>,
        notes -> Nullable<Varchar>,
        created_at -> Timestamp,
    }
}

table! {
    queries (id) {
        id -> Int4,
        submission -> Uuid,
        stage -> crate::db::types::Submission_stage,
        seq -> Int4,
        title -> Nullable<Varchar>,
        closed -> Bool,
        posted_at -> Timestamp,
        modified_at -> Timestamp,
    }
}

table! {
    query_notes (id) {
        id -> Int4,
        query -> Int4,
        author -> Int4,
        title -> Nullable<Varchar>,
        contents -> Text,
        created_at -> Timestamp,
    }
}

table! {
    query_participants (query, user) {
        query -> Int4,
        user -> Int4,
    }
}

table! {
    review_rounds (id) {
        id -> Int4,
        submission -> Uuid,
        stage -> crate::db::types::Submission_stage,
        round -> Int4,
        is_closed -> Bool,
        created_at -> Timestamp,
    }
}

table! {
    submission_editors (submission, user) {
        submission -> Uuid,
        user -> Int4,
    }
}

table! {
    submission_files (id) {
        id -> Int4,
        submission -> Uuid,
        stage -> crate::db::types::Submission_stage,
        kind -> Varchar,
        label -> Varchar,
        storage_path -> Varchar,
        version_label -> Nullable<Varchar>,
        review_round -> Nullable<Int4>,
        visible_to_authors -> Bool,
        size -> Int8,
        uploaded_by -> Int4,
        uploaded_at -> Timestamp,
    }
}

table! {
    submissions (id) {
        id -> Uuid,
        title -> Varchar,
        metadata -> Jsonb,
        stage -> crate::db::types::Submission_stage,
        status -> crate::db::types::Submission_status,
        is_archived -> Bool,
        submitted_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

table! {
    tasks (id) {
        id -> Int4,
        submission -> Uuid,
        stage -> crate::db::types::Submission_stage,
        title -> Varchar,
        assignee -> Nullable<Int4>,
        is_completed -> Bool,
        due_date -> Nullable<Timestamp>,
        created_at -> Timestamp,
    }
}

joinable!(activity_log -> submissions (submission));
joinable!(events -> submissions (submission));
joinable!(publication_versions -> submissions (submission));
joinable!(queries -> submissions (submission));
joinable!(query_notes -> queries (query));
joinable!(query_participants -> queries (query));
joinable!(review_rounds -> submissions (submission));
joinable!(submission_editors -> submissions (submission));
joinable!(submission_files -> submissions (submission));
joinable!(submission_files -> review_rounds (review_round));
joinable!(tasks -> submissions (submission));

allow_tables_to_appear_in_same_query!(
    activity_log,
    events,
    publication_versions,
    queries,
    query_notes,
    query_participants,
    review_rounds,
    submission_editors,
    submission_files,
    submissions,
    tasks,
);
