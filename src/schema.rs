diesel::table! {
    attachments (id) {
        id -> Uuid,
        document_id -> Uuid,
        #[max_length = 255]
        file_name -> Varchar,
        file_path -> Text,
        #[max_length = 100]
        content_type -> Varchar,
        size_bytes -> Int8,
        uploaded_by -> Uuid,
        uploaded_at -> Timestamptz,
    }
}

diesel::table! {
    departments (id) {
        id -> Uuid,
        #[max_length = 255]
        name -> Varchar,
        #[max_length = 32]
        code -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    document_departments (document_id, department_id) {
        document_id -> Uuid,
        department_id -> Uuid,
    }
}

diesel::table! {
    documents (id) {
        id -> Uuid,
        #[max_length = 16]
        direction -> Varchar,
        year -> Int4,
        sequence_number -> Int4,
        issue_date -> Date,
        #[max_length = 255]
        counterparty_name -> Varchar,
        #[max_length = 100]
        original_code -> Varchar,
        original_date -> Nullable<Date>,
        summary -> Text,
        project_id -> Nullable<Uuid>,
        created_by -> Uuid,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    projects (id) {
        id -> Uuid,
        #[max_length = 255]
        name -> Varchar,
        #[max_length = 32]
        code -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    sequence_counters (year, direction) {
        year -> Int4,
        #[max_length = 16]
        direction -> Varchar,
        last_number -> Int4,
    }
}

diesel::table! {
    user_departments (user_id, department_id) {
        user_id -> Uuid,
        department_id -> Uuid,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        #[max_length = 100]
        username -> Varchar,
        #[max_length = 255]
        password_hash -> Varchar,
        #[max_length = 16]
        role -> Varchar,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::joinable!(attachments -> documents (document_id));
diesel::joinable!(attachments -> users (uploaded_by));
diesel::joinable!(document_departments -> departments (department_id));
diesel::joinable!(document_departments -> documents (document_id));
diesel::joinable!(documents -> projects (project_id));
diesel::joinable!(documents -> users (created_by));
diesel::joinable!(user_departments -> departments (department_id));
diesel::joinable!(user_departments -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    attachments,
    departments,
    document_departments,
    documents,
    projects,
    sequence_counters,
    user_departments,
    users,
);
