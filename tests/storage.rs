use kinetic_store::storage::{DIST_FUNC_FILE, DRIVER_ELECTRIC_FIELD_FILE, ELECTRIC_FIELD_FILE};
use kinetic_store::{Axis, AxisKind, LabeledArray, RunAxes, StorageError, StorageManager};
use ndarray::{Array2, Array3};
use std::path::Path;

const NX: usize = 48;
const NV: usize = 8;

fn run_axes() -> RunAxes {
    RunAxes::new(
        Axis::new(AxisKind::Time, (0..10).map(|i| i as f64).collect()).unwrap(),
        Axis::cell_centered(AxisKind::Space, 0.0, 20.0, NX).unwrap(),
        Axis::cell_centered(AxisKind::Velocity, -6.0, 6.0, NV).unwrap(),
    )
    .unwrap()
}

fn batch(t: &[f64], seed: f64) -> (Array2<f64>, Array2<f64>, Array3<f64>) {
    let n = t.len();
    let e = Array2::from_shape_fn((n, NX), |(i, k)| seed + t[i] * 100.0 + k as f64);
    let e_driver = Array2::from_shape_fn((n, NX), |(i, k)| -(seed + t[i]) * (k as f64 + 1.0));
    let f = Array3::from_shape_fn((n, NX, NV), |(i, k, j)| {
        seed + t[i] + 0.5 * k as f64 + 0.25 * j as f64
    });
    (e, e_driver, f)
}

fn read_bytes(dir: &Path) -> Vec<Vec<u8>> {
    [ELECTRIC_FIELD_FILE, DRIVER_ELECTRIC_FIELD_FILE, DIST_FUNC_FILE]
        .iter()
        .map(|name| std::fs::read(dir.join(name)).unwrap())
        .collect()
}

fn time_row_is_zero(array: &LabeledArray, t: f64) -> bool {
    array.sel_time(t).unwrap().iter().all(|&v| v == 0.0)
}

#[test]
fn create_writes_three_zeroed_self_describing_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();

    let e = LabeledArray::read(store.electric_field_path()).unwrap();
    let d = LabeledArray::read(store.driver_electric_field_path()).unwrap();
    let f = LabeledArray::read(store.dist_func_path()).unwrap();
    assert_eq!(e.data.shape(), &[10, NX]);
    assert_eq!(d.data.shape(), &[10, NX]);
    assert_eq!(f.data.shape(), &[10, NX, NV]);
    for array in [&e, &d, &f] {
        assert!(array.data.iter().all(|&v| v == 0.0));
        assert_eq!(array.axes[0].coords(), run_axes().time.coords());
        assert_eq!(array.axes[1].coords(), run_axes().space.coords());
    }
    assert_eq!(f.axes[2].coords(), run_axes().velocity.coords());
    assert_eq!(e.name, "electric_field");
    assert_eq!(f.name, "distribution_function");

    store.close().unwrap();
}

#[test]
fn batch_updates_only_its_time_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();

    let t = [3.0, 4.0];
    let (e, e_driver, f) = batch(&t, 1.0);
    store
        .write_batch(&t, e.view(), e_driver.view(), f.view())
        .unwrap();

    let stored = LabeledArray::read(store.electric_field_path()).unwrap();
    assert_eq!(stored.sel_time(3.0).unwrap(), e.row(0).into_dyn());
    assert_eq!(stored.sel_time(4.0).unwrap(), e.row(1).into_dyn());
    for t in [0.0, 1.0, 2.0, 5.0, 6.0, 7.0, 8.0, 9.0] {
        assert!(time_row_is_zero(&stored, t), "time {} was touched", t);
    }

    let stored_f = LabeledArray::read(store.dist_func_path()).unwrap();
    assert_eq!(
        stored_f.sel_time(4.0).unwrap(),
        f.index_axis(ndarray::Axis(0), 1).into_dyn()
    );
    store.close().unwrap();
}

#[test]
fn sequential_batches_accumulate() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();

    for (t, seed) in [([0.0, 1.0], 1.0), ([2.0, 3.0], 2.0)] {
        let (e, e_driver, f) = batch(&t, seed);
        store
            .write_batch(&t, e.view(), e_driver.view(), f.view())
            .unwrap();
    }
    store.close().unwrap();

    for path in [
        dir.path().join(ELECTRIC_FIELD_FILE),
        dir.path().join(DRIVER_ELECTRIC_FIELD_FILE),
        dir.path().join(DIST_FUNC_FILE),
    ] {
        let stored = LabeledArray::read(&path).unwrap();
        for t in 0..4 {
            assert!(!time_row_is_zero(&stored, t as f64), "{} missing t={}", path.display(), t);
        }
        for t in 4..10 {
            assert!(time_row_is_zero(&stored, t as f64));
        }
    }
}

#[test]
fn full_run_round_trips_bit_identically() {
    let dir = tempfile::tempdir().unwrap();
    let axes = run_axes();
    let t: Vec<f64> = axes.time.coords().to_vec();
    let mut store = StorageManager::create(dir.path(), axes).unwrap();

    let (mut e, e_driver, f) = batch(&t, 0.1);
    // Values without an exact short decimal form
    e.mapv_inplace(|v| (v * 0.1).sin() / 3.0);
    store
        .write_batch(&t, e.view(), e_driver.view(), f.view())
        .unwrap();
    store.close().unwrap();

    let stored_e = LabeledArray::read(&dir.path().join(ELECTRIC_FIELD_FILE)).unwrap();
    let stored_f = LabeledArray::read(&dir.path().join(DIST_FUNC_FILE)).unwrap();
    assert!(stored_e
        .data
        .iter()
        .zip(e.iter())
        .all(|(a, b)| a.to_bits() == b.to_bits()));
    assert_eq!(stored_f.data, f.into_dyn());
}

#[test]
fn unknown_time_value_leaves_files_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();
    let (e, e_driver, f) = batch(&[1.0, 2.0], 1.0);
    store
        .write_batch(&[1.0, 2.0], e.view(), e_driver.view(), f.view())
        .unwrap();
    let before = read_bytes(dir.path());

    let err = store
        .write_batch(&[4.0, 4.5], e.view(), e_driver.view(), f.view())
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::CoordinateMismatch { value, .. } if value == 4.5
    ));
    assert!(matches!(
        store.write_batch(&[4.0, 6.0], e.view(), e_driver.view(), f.view()),
        Err(StorageError::NonContiguousRange { .. })
    ));
    assert!(matches!(
        store.write_batch(&[10.0, 11.0], e.view(), e_driver.view(), f.view()),
        Err(StorageError::CoordinateMismatch { .. })
    ));

    assert_eq!(read_bytes(dir.path()), before);
    store.close().unwrap();
}

#[test]
fn second_close_fails_and_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();
    let (e, e_driver, f) = batch(&[5.0], 2.0);
    store
        .write_batch(&[5.0], e.view(), e_driver.view(), f.view())
        .unwrap();

    store.close().unwrap();
    let after_first = read_bytes(dir.path());
    assert!(matches!(store.close(), Err(StorageError::Closed)));
    assert_eq!(read_bytes(dir.path()), after_first);
}

#[test]
fn overlapping_batch_overwrites_previous_values() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();

    let (e1, d1, f1) = batch(&[2.0, 3.0], 1.0);
    store.write_batch(&[2.0, 3.0], e1.view(), d1.view(), f1.view()).unwrap();
    let (e2, d2, f2) = batch(&[3.0, 4.0], 7.0);
    store.write_batch(&[3.0, 4.0], e2.view(), d2.view(), f2.view()).unwrap();
    store.close().unwrap();

    let stored = LabeledArray::read(&dir.path().join(ELECTRIC_FIELD_FILE)).unwrap();
    assert_eq!(stored.sel_time(2.0).unwrap(), e1.row(0).into_dyn());
    assert_eq!(stored.sel_time(3.0).unwrap(), e2.row(0).into_dyn());
    assert_eq!(stored.sel_time(4.0).unwrap(), e2.row(1).into_dyn());
}

#[test]
fn resumed_store_keeps_earlier_batches() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();
    let (e, d, f) = batch(&[0.0, 1.0], 1.0);
    store.write_batch(&[0.0, 1.0], e.view(), d.view(), f.view()).unwrap();
    store.close().unwrap();

    let mut resumed = StorageManager::open_existing(dir.path()).unwrap();
    let (e2, d2, f2) = batch(&[2.0], 3.0);
    resumed.write_batch(&[2.0], e2.view(), d2.view(), f2.view()).unwrap();
    resumed.close().unwrap();

    let stored = LabeledArray::read(&dir.path().join(DRIVER_ELECTRIC_FIELD_FILE)).unwrap();
    assert_eq!(stored.sel_time(1.0).unwrap(), d.row(1).into_dyn());
    assert_eq!(stored.sel_time(2.0).unwrap(), d2.row(0).into_dyn());
    assert!(time_row_is_zero(&stored, 3.0));
}

#[test]
fn partial_read_cuts_time_axis() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();
    let (e, d, f) = batch(&[6.0, 7.0], 1.0);
    store.write_batch(&[6.0, 7.0], e.view(), d.view(), f.view()).unwrap();
    store.close().unwrap();

    let slab = LabeledArray::read_time_range(&dir.path().join(DIST_FUNC_FILE), 6..8).unwrap();
    assert_eq!(slab.time().coords(), &[6.0, 7.0]);
    assert_eq!(slab.data, f.into_dyn());
    assert!(slab.sel_time(5.0).is_err());
}

#[test]
fn negative_zero_time_addresses_first_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();
    let (e, d, f) = batch(&[0.0], 4.0);
    store.write_batch(&[-0.0], e.view(), d.view(), f.view()).unwrap();
    store.close().unwrap();

    let stored = LabeledArray::read(&dir.path().join(ELECTRIC_FIELD_FILE)).unwrap();
    assert_eq!(stored.sel_time(0.0).unwrap(), e.row(0).into_dyn());
    assert_eq!(stored.sel_time(-0.0).unwrap(), e.row(0).into_dyn());
    assert!(time_row_is_zero(&stored, 1.0));
}

#[test]
fn failed_flush_keeps_earlier_arrays_updated() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = StorageManager::create(dir.path(), run_axes()).unwrap();
    std::fs::remove_file(dir.path().join(DIST_FUNC_FILE)).unwrap();

    let (e, d, f) = batch(&[3.0], 5.0);
    match store.write_batch(&[3.0], e.view(), d.view(), f.view()) {
        Err(StorageError::Io { path, .. }) => assert!(path.ends_with(DIST_FUNC_FILE)),
        other => panic!("expected an I/O error, got {:?}", other),
    }

    // Field and driver are flushed before the distribution function
    let field = LabeledArray::read(&dir.path().join(ELECTRIC_FIELD_FILE)).unwrap();
    let driver = LabeledArray::read(&dir.path().join(DRIVER_ELECTRIC_FIELD_FILE)).unwrap();
    assert_eq!(field.sel_time(3.0).unwrap(), e.row(0).into_dyn());
    assert_eq!(driver.sel_time(3.0).unwrap(), d.row(0).into_dyn());
    assert!(time_row_is_zero(&field, 2.0));
    assert!(!dir.path().join(DIST_FUNC_FILE).exists());

    assert!(matches!(store.close(), Err(StorageError::Io { .. })));
}
