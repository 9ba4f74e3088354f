// Hand-written, in the shape Diesel CLI would generate from `migrations/`.

diesel::table! {
    accounts (id) {
        id -> Uuid,
        token_hash -> Text,
        balance_sats -> Int8,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    usage_log (id) {
        id -> Int8,
        account_id -> Uuid,
        endpoint -> Text,
        amount_sats -> Int8,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    topup_invoices (payment_hash) {
        payment_hash -> Text,
        account_id -> Nullable<Uuid>,
        amount_sats -> Int8,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    hire_tasks (id) {
        id -> Uuid,
        buyer_account_id -> Uuid,
        title -> Text,
        description -> Text,
        budget_sats -> Int8,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    hire_quotes (id) {
        id -> Uuid,
        task_id -> Uuid,
        contractor_account_id -> Uuid,
        price_sats -> Int8,
        description -> Text,
        status -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    hire_messages (id) {
        id -> Int8,
        task_id -> Uuid,
        quote_id -> Uuid,
        sender_account_id -> Uuid,
        body -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    hire_deliveries (id) {
        id -> Uuid,
        task_id -> Uuid,
        quote_id -> Uuid,
        contractor_account_id -> Uuid,
        filename -> Text,
        content_base64 -> Text,
        notes -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(usage_log -> accounts (account_id));
diesel::joinable!(topup_invoices -> accounts (account_id));
diesel::joinable!(hire_tasks -> accounts (buyer_account_id));
diesel::joinable!(hire_quotes -> hire_tasks (task_id));
diesel::joinable!(hire_deliveries -> hire_quotes (quote_id));

diesel::allow_tables_to_appear_in_same_query!(
    accounts,
    usage_log,
    topup_invoices,
    hire_tasks,
    hire_quotes,
    hire_messages,
    hire_deliveries,
);
