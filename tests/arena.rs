//! Bot-versus-bot matches: determinism and replay playback

use std::sync::Arc;

use broadside::bot::arena::{run_arena, ArenaConfig};
use broadside::config::GameProperties;
use broadside::game::physics::ShipKind;
use broadside::game::replay::Replay;

fn props() -> Arc<GameProperties> {
    Arc::new(GameProperties::default())
}

#[test]
fn arena_is_reproducible_from_its_seed() {
    let config = ArenaConfig {
        seed: 2024,
        fleet: vec![ShipKind::Sloop, ShipKind::Brig, ShipKind::Frigate],
        tick_cap: Some(600),
        ..ArenaConfig::default()
    };
    let first = run_arena(props(), &config).expect("arena runs");
    let second = run_arena(props(), &config).expect("arena runs");

    assert_eq!(first.end, second.end);
    assert_eq!(first.ticks, second.ticks);
    assert_eq!(first.checksum, second.checksum);
    assert_eq!(first.replay.frames, second.replay.frames);
}

#[test]
fn arena_replay_plays_back_to_the_same_state() {
    let config = ArenaConfig {
        seed: 5,
        tick_cap: Some(500),
        ..ArenaConfig::default()
    };
    let result = run_arena(props(), &config).expect("arena runs");
    assert_eq!(result.replay.final_checksum.as_deref(), Some(result.checksum.as_str()));
    assert!(result.replay.verify(props()).expect("replay plays"));
}

#[test]
fn saved_replay_still_verifies() {
    let config = ArenaConfig {
        seed: 99,
        tick_cap: Some(300),
        ..ArenaConfig::default()
    };
    let result = run_arena(props(), &config).expect("arena runs");

    let path = std::env::temp_dir().join(format!("broadside-replay-{}.json", uuid::Uuid::new_v4()));
    result.replay.save(&path).expect("replay saved");
    let loaded = Replay::load(&path).expect("replay loaded");
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded.final_tick, Some(result.ticks));
    assert!(loaded.verify(props()).expect("replay plays"));
}
