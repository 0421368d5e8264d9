//! End-to-end batches over real grid files.

mod common;

use common::builders::GridBuilder;
use common::mock_helpers::{scripted_capabilities, scripted_loader, CountingLoader};
use common::{corrupt, scan_name, write_csv, write_scans};
use std::sync::Arc;
use topo_batch::results::ERROR_COLUMN;
use topo_batch::{
    AdditionalParams, Arguments, AsciiGridLoader, Batch, BatchConfig, BatchError, BatchReport,
    CapabilitySet, Cell, ExportSettings, FailureKind, FileCollection, PipelineBuilder,
    ResultTable, RowOrigin,
};

fn table_of(result: topo_batch::Result<BatchReport>) -> ResultTable {
    match result {
        Ok(report) => report.table,
        Err(BatchError::AllFilesFailed { table, .. }) => *table,
        Err(e) => panic!("unexpected batch error: {}", e),
    }
}

fn grid_files(dir: &std::path::Path) -> FileCollection {
    FileCollection::from_dir(dir, &["asc"], Arc::new(AsciiGridLoader::new())).unwrap()
}

fn leveled_roughness() -> topo_batch::Pipeline {
    let mut builder = PipelineBuilder::standard();
    builder
        .level()
        .unwrap()
        .roughness_parameters(Some(&["Sa", "Sq", "Sz"][..]))
        .unwrap();
    builder.freeze().unwrap()
}

#[test]
fn test_corrupt_file_degrades_only_its_row() {
    let dir = tempfile::tempdir().unwrap();
    let paths = write_scans(dir.path(), 5);
    corrupt(&paths[2]);

    let report = Batch::new(leveled_roughness(), grid_files(dir.path()))
        .with_config(BatchConfig::default().with_workers(2))
        .run()
        .unwrap();
    let table = &report.table;

    assert_eq!(table.len(), 5);
    for (i, row) in table.rows().iter().enumerate() {
        assert_eq!(row.file, scan_name(i));
        if i == 2 {
            let err = row.error.as_ref().unwrap();
            assert_eq!(err.kind(), FailureKind::Load);
            assert!(row.cells.iter().all(Cell::is_missing));
        } else {
            assert!(row.error.is_none());
            assert!(row.cells.iter().all(|c| !c.is_missing()));
        }
    }
    assert_eq!(report.summary.attempted, 5);
    assert_eq!(report.summary.succeeded, 4);
    assert_eq!(report.summary.failed, 1);
    assert_eq!(report.summary.failures[0].file, scan_name(2));
}

#[test]
fn test_duplicate_column_fails_before_any_load() {
    let dir = tempfile::tempdir().unwrap();
    write_scans(dir.path(), 3);
    let loader = CountingLoader::new();

    let mut builder = PipelineBuilder::standard();
    builder.parameter("Sa", Arguments::new()).unwrap();
    builder.level().unwrap();
    builder.parameter("Sa", Arguments::new()).unwrap();
    assert!(builder.freeze().unwrap_err().is_configuration());

    // Collision with an additional parameter column is caught at run time
    // but still before dispatch.
    let mut builder = PipelineBuilder::standard();
    builder.parameter("Sa", Arguments::new()).unwrap();
    let pipeline = builder.freeze().unwrap();
    let params = AdditionalParams::from_csv_reader(
        "file,Sa\nscan_000.asc,1.0\n".as_bytes(),
        "file",
    )
    .unwrap();
    let files = FileCollection::from_dir(dir.path(), &["asc"], Arc::new(loader.clone())).unwrap();
    let err = Batch::new(pipeline, files)
        .with_additional_params(params)
        .run()
        .unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(loader.calls(), 0);
}

#[test]
fn test_outer_join_with_csv_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let scans = dir.path().join("scans");
    std::fs::create_dir(&scans).unwrap();
    write_scans(&scans, 3);
    let csv = write_csv(
        dir.path(),
        "meta.csv",
        "file,speed,operator\nscan_001.asc,120,ann\nghost.asc,80,bob\nscan_002.asc,150,ann\n",
    );
    let params = AdditionalParams::from_csv_path(&csv, "file").unwrap();

    let report = Batch::new(leveled_roughness(), grid_files(&scans))
        .with_additional_params(params)
        .with_config(BatchConfig::default().with_workers(3))
        .run()
        .unwrap();
    let table = &report.table;

    assert_eq!(table.columns(), &["file", "Sa", "Sq", "Sz", "speed", "operator"]);
    assert_eq!(table.len(), 4);

    // File without metadata: metadata missing, pipeline populated
    assert_eq!(table.rows()[0].file, "scan_000.asc");
    assert_eq!(table.get("scan_000.asc", "speed"), Some(&Cell::Missing));
    assert!(!table.get("scan_000.asc", "Sa").unwrap().is_missing());

    assert_eq!(table.get("scan_002.asc", "speed"), Some(&Cell::Integer(150)));

    // Metadata without file: extra row at the end
    let ghost = &table.rows()[3];
    assert_eq!(ghost.file, "ghost.asc");
    assert_eq!(ghost.origin, RowOrigin::MetadataOnly);
    assert_eq!(table.get("ghost.asc", "Sa"), Some(&Cell::Missing));
    assert_eq!(table.get("ghost.asc", "operator"), Some(&Cell::Text("bob".into())));

    // Metadata-only rows are not files: they do not count as attempted
    assert_eq!(report.summary.attempted, 3);
}

#[test]
fn test_params_without_join_column_rejected_at_load() {
    let dir = tempfile::tempdir().unwrap();
    let csv = write_csv(dir.path(), "meta.csv", "name,speed\nscan_000.asc,1\n");
    let err = AdditionalParams::from_csv_path(&csv, "file").unwrap_err();
    assert!(err.is_configuration());
}

#[test]
fn test_duplicate_metadata_key_is_aggregation_error() {
    let dir = tempfile::tempdir().unwrap();
    write_scans(dir.path(), 2);
    let params = AdditionalParams::from_csv_reader(
        "file,speed\nscan_000.asc,1\nscan_000.asc,2\n".as_bytes(),
        "file",
    )
    .unwrap();
    let err = Batch::new(leveled_roughness(), grid_files(dir.path()))
        .with_additional_params(params)
        .run()
        .unwrap_err();
    assert!(err.is_aggregation());
}

#[test]
fn test_declaration_order_is_execution_order() {
    let dir = tempfile::tempdir().unwrap();
    GridBuilder::new(16, 16).tilt(0.3, 0.1).write(dir.path(), "good.asc");

    // level, measure, then an invalid filter
    let mut first = PipelineBuilder::standard();
    first.level().unwrap();
    first.parameter("Sa", Arguments::new()).unwrap().alias("Sa_level").unwrap();
    first.filter("lowpass", -1.0, None).unwrap();

    // invalid filter first
    let mut second = PipelineBuilder::standard();
    second.filter("lowpass", -1.0, None).unwrap();
    second.level().unwrap();
    second.parameter("Sa", Arguments::new()).unwrap().alias("Sa_level").unwrap();

    let a = table_of(Batch::new(first.freeze().unwrap(), grid_files(dir.path())).run());
    let b = table_of(Batch::new(second.freeze().unwrap(), grid_files(dir.path())).run());

    assert!(matches!(a.get("good.asc", "Sa_level"), Some(Cell::Number(_))));
    assert_eq!(b.get("good.asc", "Sa_level"), Some(&Cell::Missing));

    let err_a = a.rows()[0].error.as_ref().unwrap();
    let err_b = b.rows()[0].error.as_ref().unwrap();
    assert_eq!(err_a.operation(), Some("filter"));
    assert_eq!(err_b.operation(), Some("filter"));
    assert!(matches!(err_a, topo_batch::FileError::Step { step: 2, .. }));
    assert!(matches!(err_b, topo_batch::FileError::Step { step: 0, .. }));
}

#[test]
fn test_rerun_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_scans(dir.path(), 6);
    let mut builder = PipelineBuilder::standard();
    builder.level().unwrap();
    builder.filter("lowpass", 2.0, None).unwrap();
    builder.roughness_parameters(None).unwrap();
    builder
        .parameter("volume_parameters", Arguments::new().kwarg("p", 10.0).kwarg("q", 80.0))
        .unwrap();
    let pipeline = builder.freeze().unwrap();

    let first = Batch::new(pipeline.clone(), grid_files(dir.path())).run().unwrap();
    let second = Batch::new(pipeline, grid_files(dir.path())).run().unwrap();
    assert_eq!(first.table, second.table);
    assert!(first.table.columns().contains(&"volume_parameters_Vvc".to_string()));
}

#[test]
fn test_every_file_failing_raises_with_table() {
    let dir = tempfile::tempdir().unwrap();
    for path in write_scans(dir.path(), 3) {
        corrupt(&path);
    }
    let err = Batch::new(leveled_roughness(), grid_files(dir.path()))
        .run()
        .unwrap_err();
    match err {
        BatchError::AllFilesFailed { summary, table } => {
            assert_eq!(summary.attempted, 3);
            assert_eq!(summary.succeeded, 0);
            assert_eq!(table.len(), 3);
        }
        other => panic!("expected AllFilesFailed, got {}", other),
    }
}

#[test]
fn test_nonmeasured_points_need_filling() {
    let dir = tempfile::tempdir().unwrap();
    GridBuilder::new(10, 10).hole(4, 4).write(dir.path(), "holey.asc");

    let mut strict = PipelineBuilder::standard();
    strict.parameter("Sdq", Arguments::new()).unwrap();
    let strict = table_of(Batch::new(strict.freeze().unwrap(), grid_files(dir.path())).run());
    assert!(strict.rows()[0]
        .error
        .as_ref()
        .unwrap()
        .cause()
        .contains("non-measured"));

    let mut filled = PipelineBuilder::standard();
    filled.fill_nonmeasured("nearest").unwrap();
    filled.parameter("Sdq", Arguments::new()).unwrap();
    let report = Batch::new(filled.freeze().unwrap(), grid_files(dir.path()))
        .run()
        .unwrap();
    assert!(matches!(report.table.get("holey.asc", "Sdq"), Some(Cell::Number(_))));
}

#[test]
fn test_csv_export_with_error_column() {
    let dir = tempfile::tempdir().unwrap();
    let scans = dir.path().join("scans");
    std::fs::create_dir(&scans).unwrap();
    let paths = write_scans(&scans, 3);
    corrupt(&paths[1]);
    let out = dir.path().join("results.csv");

    let config = BatchConfig::default()
        .with_workers(2)
        .with_export(ExportSettings::new(&out).with_errors());
    let report = Batch::new(leveled_roughness(), grid_files(&scans))
        .with_config(config)
        .run()
        .unwrap();
    assert!(report.export_warning.is_none());
    assert_eq!(report.exported_to.as_deref(), Some(out.as_path()));

    let text = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[0], format!("file,Sa,Sq,Sz,{}", ERROR_COLUMN));
    assert!(lines[2].starts_with("scan_001.asc,,,,LoadError"));
    assert!(lines[1].ends_with(','));
}

#[test]
fn test_nan_result_is_distinct_from_missing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("results.json");

    let mut builder = PipelineBuilder::new(scripted_capabilities());
    builder.declare("height", Arguments::new()).unwrap();
    builder.declare("odd_nan", Arguments::new()).unwrap();
    let pipeline = builder.freeze().unwrap();
    let files = FileCollection::new(["f2.x", "f3.x", "bad.x"], Arc::new(scripted_loader()));

    let run = |config: BatchConfig| {
        Batch::new(pipeline.clone(), files.clone())
            .with_config(config.with_workers(2))
            .run()
            .unwrap()
            .table
    };
    let first = run(BatchConfig::default().with_export(ExportSettings::new(&out).with_errors()));
    let second = run(BatchConfig::default());
    assert_eq!(first, second);

    let odd = first.row("f3.x").unwrap();
    assert_eq!(odd.cells, vec![Cell::Number(3.0), Cell::Missing]);
    assert_eq!(odd.error.as_ref().unwrap().kind(), FailureKind::Step);
    assert_eq!(
        first.row("bad.x").unwrap().error.as_ref().unwrap().kind(),
        FailureKind::Load
    );

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let rows = value["rows"].as_array().unwrap();
    assert_eq!(rows[0][2], 2.0);
    assert!(rows[0][3].is_null());
    assert!(rows[1][2].is_null());
    assert!(rows[1][3].as_str().unwrap().starts_with("StepError [odd_nan]"));
    assert!(rows[2][3].as_str().unwrap().starts_with("LoadError"));
}

#[test]
fn test_json_export() {
    let dir = tempfile::tempdir().unwrap();
    let scans = dir.path().join("scans");
    std::fs::create_dir(&scans).unwrap();
    write_scans(&scans, 2);
    let out = dir.path().join("results.json");

    Batch::new(leveled_roughness(), grid_files(&scans))
        .with_config(BatchConfig::default().with_export(ExportSettings::new(&out)))
        .run()
        .unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(value["columns"][0], "file");
    assert_eq!(value["rows"].as_array().unwrap().len(), 2);
    assert_eq!(value["rows"][1][0], "scan_001.asc");
}

#[test]
fn test_export_failure_is_only_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    write_scans(dir.path(), 2);
    let out = dir.path().join("missing_dir").join("results.csv");

    let report = Batch::new(leveled_roughness(), grid_files(dir.path()))
        .with_config(BatchConfig::default().with_export(ExportSettings::new(&out)))
        .run()
        .unwrap();
    let warning = report.export_warning.as_ref().unwrap();
    assert!(warning.contains("results.csv"));
    assert!(report.exported_to.is_none());
    assert_eq!(report.table.len(), 2);
    assert_eq!(report.summary.succeeded, 2);
}

#[test]
fn test_pipeline_and_config_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let scans = dir.path().join("scans");
    std::fs::create_dir(&scans).unwrap();
    write_scans(&scans, 2);

    let mut builder = PipelineBuilder::standard();
    builder.center().unwrap();
    builder.parameter("Smr", Arguments::new().kwarg("c", 0.0)).unwrap();
    let descriptor = dir.path().join("pipeline.json");
    std::fs::write(&descriptor, builder.freeze().unwrap().to_json().unwrap()).unwrap();

    let config_path = dir.path().join("batch.toml");
    std::fs::write(&config_path, "workers = 2\nmax_reported_failures = 1\n").unwrap();

    let pipeline = PipelineBuilder::from_json(
        &std::fs::read_to_string(&descriptor).unwrap(),
        Arc::new(CapabilitySet::standard()),
    )
    .unwrap()
    .freeze()
    .unwrap();
    let config = BatchConfig::load(&config_path).unwrap();

    let report = Batch::new(pipeline, grid_files(&scans))
        .with_config(config)
        .run()
        .unwrap();
    assert_eq!(report.workers, 2);
    assert_eq!(report.table.columns(), &["file", "Smr"]);
    for cell in report.table.column("Smr").unwrap() {
        let smr = cell.as_f64().unwrap();
        assert!((0.0..=100.0).contains(&smr));
    }
}
