//! Integration tests for loading layout files

use std::io::Write;
use std::path::Path;

use signalbox::hal::MockCommandStation;
use signalbox::{LayoutController, LayoutLoader, LoadError, SectorId};

fn bundled_layout() -> std::path::PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("layouts/main.yaml")
}

#[test]
fn bundled_layout_loads() {
    let layout = LayoutLoader::load(bundled_layout()).unwrap();

    assert_eq!(layout.name(), "main");
    assert_eq!(layout.cabs().len(), 1);
    assert_eq!(layout.sectors().len(), 3);
    assert_eq!(layout.proximity_sensors().len(), 3);

    let dcc = layout.dcc().unwrap();
    assert_eq!(dcc.host, "192.168.0.22");
    assert_eq!(dcc.port, 2560);

    assert_eq!(layout.sectors()[0].speed_limit(), Some(10));
    assert_eq!(layout.sectors()[1].speed_limit(), Some(30));
}

#[test]
fn bundled_layout_drives_a_full_lap() {
    let layout = LayoutLoader::load(bundled_layout()).unwrap();
    let mut controller = LayoutController::new(layout, MockCommandStation::new());

    controller.sensor_triggered("end_of_hill", None);
    for (sensor, sector, limit) in [
        ("beginning_of_hill", 2, 30),
        ("crest_of_hill", 3, 8),
        ("end_of_hill", 1, 10),
    ] {
        assert!(controller.sensor_triggered(sensor, None).is_applied());
        let cab = controller.primary_cab().unwrap();
        assert_eq!(cab.location(), Some(&SectorId::from(sector)));
        assert_eq!(cab.target_speed(), limit);
    }
}

#[test]
fn missing_file_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = LayoutLoader::load(dir.path().join("absent.yaml")).unwrap_err();

    assert!(matches!(err, LoadError::NotFound(_)));
    assert!(err.to_string().contains("absent.yaml"));
}

#[test]
fn malformed_file_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "name: broken\ncabs: {{ this is not a list").unwrap();

    let err = LayoutLoader::load(file.path()).unwrap_err();
    assert!(matches!(err, LoadError::Yaml(_)));
}

#[test]
fn invalid_entity_is_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "name: steep\ncabs:\n  - {{ name: Runaway, address: 4, acceleration: 0 }}"
    )
    .unwrap();

    let err = LayoutLoader::load(file.path()).unwrap_err();
    assert!(matches!(err, LoadError::Invalid { entity: "cab", .. }));
}
