pub mod time;

/// Random id for events, logs and messages.
pub fn longid() -> String {
    nanoid::nanoid!()
}

/// Random id for sessions.
pub fn session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
