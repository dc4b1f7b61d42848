//! Diesel schema definitions.

diesel::table! {
    accounts (identifier) {
        identifier -> Text,
        created_at -> Timestamp,
        updated_at -> Timestamp,
    }
}

diesel::table! {
    devices (account_identifier, device_id) {
        account_identifier -> Text,
        device_id -> BigInt,
        push_token -> Nullable<Text>,
        last_push_timestamp -> BigInt,
    }
}

diesel::joinable!(devices -> accounts (account_identifier));

diesel::allow_tables_to_appear_in_same_query!(accounts, devices);
