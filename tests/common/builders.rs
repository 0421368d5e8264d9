//! Test data builders for creating height grids

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Builder for plain-text height grids readable by `AsciiGridLoader`.
///
/// Heights are `tilt_x * x + tilt_y * y + amplitude * sin(2πx / period)`,
/// with `x`, `y` in physical units.
pub struct GridBuilder {
    nx: usize,
    ny: usize,
    step: f64,
    tilt: (f64, f64),
    amplitude: f64,
    period: f64,
    holes: Vec<(usize, usize)>,
}

impl GridBuilder {
    pub fn new(nx: usize, ny: usize) -> Self {
        Self {
            nx,
            ny,
            step: 1.0,
            tilt: (0.0, 0.0),
            amplitude: 1.0,
            period: 4.0,
            holes: Vec::new(),
        }
    }

    pub fn step(mut self, step: f64) -> Self {
        self.step = step;
        self
    }

    pub fn tilt(mut self, x: f64, y: f64) -> Self {
        self.tilt = (x, y);
        self
    }

    pub fn waves(mut self, amplitude: f64, period: f64) -> Self {
        self.amplitude = amplitude;
        self.period = period;
        self
    }

    /// Mark a point as non-measured.
    pub fn hole(mut self, x: usize, y: usize) -> Self {
        self.holes.push((x, y));
        self
    }

    pub fn rows(&self) -> Vec<Vec<f64>> {
        (0..self.ny)
            .map(|y| {
                (0..self.nx)
                    .map(|x| {
                        if self.holes.contains(&(x, y)) {
                            return f64::NAN;
                        }
                        let (px, py) = (x as f64 * self.step, y as f64 * self.step);
                        self.tilt.0 * px
                            + self.tilt.1 * py
                            + self.amplitude * (std::f64::consts::TAU * px / self.period).sin()
                    })
                    .collect()
            })
            .collect()
    }

    pub fn build_text(&self) -> String {
        let mut out = String::new();
        writeln!(out, "# step_x: {}", self.step).unwrap();
        writeln!(out, "# step_y: {}", self.step).unwrap();
        for row in self.rows() {
            let line: Vec<String> = row.iter().map(|v| format!("{}", v)).collect();
            writeln!(out, "{}", line.join(" ")).unwrap();
        }
        out
    }

    pub fn write(&self, dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, self.build_text()).unwrap();
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_builder_shape() {
        let rows = GridBuilder::new(4, 3).hole(1, 2).rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), 4);
        assert!(rows[2][1].is_nan());
    }
}
