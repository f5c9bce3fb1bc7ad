use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use recallai::models::{ConversationId, MessageId, Sender};
use recallai::{Config, FakeConversationService, RefreshTrigger, SessionController};
use tempfile::TempDir;

/// Config with no end display delay
#[allow(dead_code)]
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.session.end_display_delay_ms = 0;
    config
}

/// Session controller backed by `fake`, sharing `refresh`
#[allow(dead_code)]
pub fn session_for(fake: &Arc<FakeConversationService>, refresh: &RefreshTrigger) -> SessionController {
    SessionController::new(fake.clone(), refresh.clone(), &test_config())
}

/// Seed a two-turn conversation and return its id
#[allow(dead_code)]
pub fn seed_exchange(fake: &FakeConversationService, title: &str) -> ConversationId {
    fake.seed_conversation(
        title,
        &[
            (Sender::User, "Where did I park?"),
            (Sender::Ai, "Level 3, row F."),
        ],
    )
}

/// Id of the message at `index` in the session transcript
#[allow(dead_code)]
pub fn message_id_at(session: &SessionController, index: usize) -> MessageId {
    session.messages()[index]
        .id
        .expect("loaded messages carry ids")
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}
