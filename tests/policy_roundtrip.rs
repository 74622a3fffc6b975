use algo_lab::error::PersistenceError;
use algo_lab::grid::GridPos;
use algo_lab::persistence::{PolicyStore, StoreConfig};
use algo_lab::rl::gridworld::{GridWorldMethod, POLICY_KEY};
use algo_lab::rl::{GridWorldConfig, GridWorldLab, GridWorldSnapshot, SnakeConfig, SnakeLab};

fn store_in(dir: &tempfile::TempDir) -> PolicyStore {
    PolicyStore::new(StoreConfig {
        dir: dir.path().join("policies"),
    })
    .unwrap()
}

fn bits(values: &[f64]) -> Vec<u64> {
    values.iter().map(|v| v.to_bits()).collect()
}

#[test]
fn test_gridworld_tables_survive_save_and_load_bit_for_bit() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let mut trained = GridWorldLab::new(GridWorldConfig {
        seed: Some(31),
        ..Default::default()
    })
    .unwrap();
    while trained.episode() < 300 {
        trained.step();
    }
    store.save_gridworld(&trained).unwrap();

    let mut loaded = GridWorldLab::new(GridWorldConfig {
        seed: Some(99),
        ..Default::default()
    })
    .unwrap();
    store.load_gridworld(&mut loaded).unwrap();

    assert_eq!(loaded.q_table().len(), trained.q_table().len());
    for (state, row) in trained.q_table().iter() {
        assert_eq!(bits(&loaded.q_values(*state)), bits(row), "state {state}");
    }
    for col in 0..10 {
        for row in 0..10 {
            let pos = GridPos::new(col, row);
            assert_eq!(loaded.v_value(pos).to_bits(), trained.v_value(pos).to_bits());
        }
    }
}

#[test]
fn test_value_iteration_tables_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let mut lab = GridWorldLab::new(GridWorldConfig {
        method: GridWorldMethod::ValueIteration,
        seed: Some(2),
        ..Default::default()
    })
    .unwrap();
    for _ in 0..40 {
        lab.step();
    }
    store.save_gridworld(&lab).unwrap();

    let saved: GridWorldSnapshot = store.load(POLICY_KEY).unwrap();
    assert_eq!(saved.method, Some(GridWorldMethod::ValueIteration));
    assert_eq!(saved.v_table.len(), 100);

    let mut fresh = GridWorldLab::new(GridWorldConfig::default()).unwrap();
    store.load_gridworld(&mut fresh).unwrap();
    // Loading replaces tables only.
    assert_eq!(fresh.method(), GridWorldMethod::QLearning);
    assert_eq!(fresh.snapshot().v_table, lab.snapshot().v_table);
}

#[test]
fn test_snake_tables_survive_save_and_load_bit_for_bit() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let mut trained = SnakeLab::new(SnakeConfig {
        seed: Some(12),
        ..Default::default()
    })
    .unwrap();
    while trained.episode() < 50 {
        trained.step();
    }
    store.save_snake(&trained).unwrap();

    let mut loaded = SnakeLab::new(SnakeConfig::default()).unwrap();
    store.load_snake(&mut loaded).unwrap();
    assert_eq!(loaded.episode(), trained.episode());
    assert_eq!(loaded.high_score(), trained.high_score());
    for (state, row) in trained.q_table().iter() {
        assert_eq!(bits(&loaded.q_values(state)), bits(row), "state {state}");
    }
}

#[test]
fn test_failed_load_keeps_existing_policy() {
    let dir = tempfile::tempdir().unwrap();
    let store = store_in(&dir);

    let mut lab = GridWorldLab::new(GridWorldConfig {
        seed: Some(3),
        ..Default::default()
    })
    .unwrap();
    while lab.episode() < 50 {
        lab.step();
    }
    let before = lab.snapshot();

    let err = store.load_gridworld(&mut lab).unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound(_)));

    std::fs::write(
        store.path_for(POLICY_KEY).unwrap(),
        r#"{ "qTable": { "0,0": [1.0, 2.0] }, "vTable": {} }"#,
    )
    .unwrap();
    let err = store.load_gridworld(&mut lab).unwrap_err();
    assert!(matches!(err, PersistenceError::InvalidSnapshot(_)));
    assert_eq!(lab.snapshot(), before);
}
