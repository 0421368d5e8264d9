//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use builders::GridBuilder;
use std::path::{Path, PathBuf};

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Write `count` distinct, well-formed scans named `scan_000.asc`, ...
pub fn write_scans(dir: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| scan_builder(i).write(dir, &scan_name(i)))
        .collect()
}

pub fn scan_name(i: usize) -> String {
    format!("scan_{:03}.asc", i)
}

/// Deterministic scan contents that differ per index.
pub fn scan_builder(i: usize) -> GridBuilder {
    GridBuilder::new(12, 10)
        .step(0.5)
        .tilt(0.01 * i as f64, -0.02)
        .waves(1.0 + (i % 7) as f64 * 0.25, 3.0 + (i % 3) as f64)
}

/// Overwrite a file with content the grid loader rejects.
pub fn corrupt(path: &Path) {
    std::fs::write(path, "1.0 2.0 3.0\n4.0 oops 6.0\n").unwrap();
}

/// Write a CSV file and return its path.
pub fn write_csv(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
