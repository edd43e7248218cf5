use approx::assert_relative_eq;
use kinetic_store::config::Config;
use kinetic_store::params::read_parameters;
use kinetic_store::storage::{DIST_FUNC_FILE, ELECTRIC_FIELD_FILE};
use kinetic_store::synthetic::SyntheticRun;
use kinetic_store::{LabeledArray, StorageManager};

fn config(base_dir: &std::path::Path) -> Config {
    let toml = format!(
        r#"
        [grid]
        nx = 16
        nv = 32

        [time]
        nt = 25
        tmax = 12.0

        [drive]
        a0 = 0.01
        w0 = 1.1598
        t_off = 6.0

        [storage]
        base_dir = "{}"
        batch_size = 7
        "#,
        base_dir.display()
    );
    Config::from_toml(&toml).unwrap()
}

#[test]
fn synthetic_run_fills_every_step_across_partial_batches() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let mut store = StorageManager::create(&config.storage.base_dir, config.axes().unwrap()).unwrap();
    store
        .write_parameters_to_file(&config, &config.storage.parameters_name)
        .unwrap();

    SyntheticRun::from_config(&config).run(&mut store).unwrap();
    store.close().unwrap();

    let e = LabeledArray::read(&dir.path().join(ELECTRIC_FIELD_FILE)).unwrap();
    let x = e.axes[1].coords().to_vec();
    // 25 steps in batches of 7: the last batch holds 4 steps
    let last = e.sel_time(12.0).unwrap();
    assert!(last.iter().any(|&v| v != 0.0));

    let first = e.sel_time(0.0).unwrap();
    for (&v, &xk) in first.iter().zip(&x) {
        assert_relative_eq!(v, 0.01 * (0.3 * xk).cos(), epsilon = 1e-12);
    }

    let f = LabeledArray::read_time_range(&dir.path().join(DIST_FUNC_FILE), 24..25).unwrap();
    assert_eq!(f.data.shape(), &[1, 16, 32]);
    assert!(f.data.iter().all(|&v| v > 0.0));

    let params = read_parameters(&dir.path().join("parameters.txt")).unwrap();
    assert_eq!(params["grid"]["nx"], serde_json::json!(16));
    assert_eq!(params["storage"]["batch_size"], serde_json::json!(7));
}
