//! Reference in-memory surface.
//!
//! `HeightMap` is a regular grid of heights (row-major, `ny` rows of `nx`
//! points) with physical spacing `step_x` / `step_y`. It implements every
//! capability registered by [`CapabilitySet::standard`](super::CapabilitySet::standard).
//!
//! Non-measured points are stored as NaN. Height and material-ratio
//! parameters ignore them; gradient-based parameters and the resampling
//! operations (filter, rotate, align) require a fully measured grid and fail
//! with [`CapabilityError::NonMeasuredPoints`] otherwise.
//!
//! Derived quantities shared by several parameters (mean-centred moments and
//! the sorted Abbott-Firestone heights) are memoized per instance; every
//! mutating capability invalidates the cache.

use super::memo::MemoCache;
use super::{CapabilityError, Outcome, Surface};
use crate::types::Arguments;
use std::collections::VecDeque;
use std::f64::consts::PI;
use std::sync::Arc;

type CapResult<T> = Result<T, CapabilityError>;

/// Grid of heights with physical spacing.
#[derive(Debug)]
pub struct HeightMap {
    data: Vec<f64>,
    nx: usize,
    ny: usize,
    step_x: f64,
    step_y: f64,
    memo: MemoCache,
}

/// Mean-centred moments: [mean, Sa, Sq, Sp, Sv, m3, m4]
const MOMENTS: &str = "moments";
/// Measured heights relative to the mean, sorted descending.
const ABBOTT: &str = "abbott_curve";

impl HeightMap {
    pub fn new(data: Vec<f64>, nx: usize, ny: usize, step_x: f64, step_y: f64) -> CapResult<Self> {
        if nx == 0 || ny == 0 || data.len() != nx * ny {
            return Err(CapabilityError::InvalidArgument(format!(
                "grid of {} values does not match {}x{}",
                data.len(),
                nx,
                ny
            )));
        }
        if !(step_x > 0.0 && step_y > 0.0) {
            return Err(CapabilityError::InvalidArgument(format!(
                "step sizes must be positive, got {} x {}",
                step_x, step_y
            )));
        }
        Ok(Self {
            data,
            nx,
            ny,
            step_x,
            step_y,
            memo: MemoCache::new(),
        })
    }

    /// Build from equal-length rows.
    pub fn from_rows(rows: Vec<Vec<f64>>, step_x: f64, step_y: f64) -> CapResult<Self> {
        let ny = rows.len();
        let nx = rows.first().map_or(0, Vec::len);
        if let Some((idx, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != nx) {
            return Err(CapabilityError::InvalidArgument(format!(
                "row {} has {} points, expected {}",
                idx,
                row.len(),
                nx
            )));
        }
        Self::new(rows.into_iter().flatten().collect(), nx, ny, step_x, step_y)
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn step_x(&self) -> f64 {
        self.step_x
    }

    pub fn step_y(&self) -> f64 {
        self.step_y
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn memo(&self) -> &MemoCache {
        &self.memo
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.data[y * self.nx + x]
    }

    pub fn nonmeasured_count(&self) -> usize {
        self.data.iter().filter(|v| !v.is_finite()).count()
    }

    fn measured(&self) -> impl Iterator<Item = f64> + '_ {
        self.data.iter().copied().filter(|v| v.is_finite())
    }

    fn require_measured(&self) -> CapResult<()> {
        match self.nonmeasured_count() {
            0 => Ok(()),
            n => Err(CapabilityError::NonMeasuredPoints(n)),
        }
    }

    fn replace(&mut self, data: Vec<f64>, nx: usize, ny: usize) {
        self.data = data;
        self.nx = nx;
        self.ny = ny;
        self.memo.invalidate();
    }

    fn map_in_place(&mut self, f: impl Fn(f64) -> f64) {
        for v in &mut self.data {
            *v = f(*v);
        }
        self.memo.invalidate();
    }

    // ── Memoized derived quantities ──

    fn moments(&mut self) -> CapResult<Arc<[f64]>> {
        let data = &self.data;
        self.memo
            .get_or_try_insert_with(MOMENTS, &Arguments::new(), || {
                let values: Vec<f64> = data.iter().copied().filter(|v| v.is_finite()).collect();
                if values.is_empty() {
                    return Err(CapabilityError::NonMeasuredPoints(data.len()));
                }
                let n = values.len() as f64;
                let mean = values.iter().sum::<f64>() / n;
                let (mut sa, mut s2, mut s3, mut s4) = (0.0, 0.0, 0.0, 0.0);
                let (mut max, mut min) = (f64::NEG_INFINITY, f64::INFINITY);
                for v in &values {
                    let z = v - mean;
                    sa += z.abs();
                    s2 += z * z;
                    s3 += z * z * z;
                    s4 += z * z * z * z;
                    max = max.max(z);
                    min = min.min(z);
                }
                Ok(vec![mean, sa / n, (s2 / n).sqrt(), max, min.abs(), s3 / n, s4 / n])
            })
    }

    fn abbott_curve(&mut self) -> CapResult<Arc<[f64]>> {
        let mean = self.moments()?[0];
        let data = &self.data;
        self.memo
            .get_or_try_insert_with(ABBOTT, &Arguments::new(), || {
                let mut heights: Vec<f64> = data
                    .iter()
                    .copied()
                    .filter(|v| v.is_finite())
                    .map(|v| v - mean)
                    .collect();
                heights.sort_by(|a, b| b.total_cmp(a));
                Ok(heights)
            })
    }

    /// Height (relative to the mean) at material ratio `mr` percent.
    fn height_at_ratio(curve: &[f64], mr: f64) -> f64 {
        let last = curve.len() - 1;
        let pos = (mr / 100.0).clamp(0.0, 1.0) * last as f64;
        let lo = pos.floor() as usize;
        let hi = pos.ceil() as usize;
        let frac = pos - lo as f64;
        curve[lo] + (curve[hi] - curve[lo]) * frac
    }

    fn material_volume(curve: &[f64], c: f64) -> f64 {
        curve.iter().map(|z| (z - c).max(0.0)).sum::<f64>() / curve.len() as f64
    }

    fn void_volume(curve: &[f64], c: f64) -> f64 {
        curve.iter().map(|z| (c - z).max(0.0)).sum::<f64>() / curve.len() as f64
    }

    /// Central-difference gradients (one-sided at the borders).
    fn gradients(&self) -> CapResult<(Vec<f64>, Vec<f64>)> {
        self.require_measured()?;
        if self.nx < 2 || self.ny < 2 {
            return Err(CapabilityError::Numerical(
                "gradients need at least 2x2 points".to_string(),
            ));
        }
        let (nx, ny) = (self.nx, self.ny);
        let mut gx = vec![0.0; nx * ny];
        let mut gy = vec![0.0; nx * ny];
        for y in 0..ny {
            for x in 0..nx {
                let (x0, x1) = (x.saturating_sub(1), (x + 1).min(nx - 1));
                let (y0, y1) = (y.saturating_sub(1), (y + 1).min(ny - 1));
                gx[y * nx + x] =
                    (self.get(x1, y) - self.get(x0, y)) / ((x1 - x0) as f64 * self.step_x);
                gy[y * nx + x] =
                    (self.get(x, y1) - self.get(x, y0)) / ((y1 - y0) as f64 * self.step_y);
            }
        }
        Ok((gx, gy))
    }

    // ── Parameters ──

    fn skewness(&mut self) -> CapResult<f64> {
        let m = self.moments()?;
        if m[2] == 0.0 {
            return Err(CapabilityError::Numerical("Ssk undefined for a flat surface".into()));
        }
        Ok(m[5] / m[2].powi(3))
    }

    fn kurtosis(&mut self) -> CapResult<f64> {
        let m = self.moments()?;
        if m[2] == 0.0 {
            return Err(CapabilityError::Numerical("Sku undefined for a flat surface".into()));
        }
        Ok(m[6] / m[2].powi(4))
    }

    fn sdq(&self) -> CapResult<f64> {
        let (gx, gy) = self.gradients()?;
        let sum: f64 = gx.iter().zip(&gy).map(|(a, b)| a * a + b * b).sum();
        Ok((sum / gx.len() as f64).sqrt())
    }

    fn sdr(&self) -> CapResult<f64> {
        let (gx, gy) = self.gradients()?;
        let sum: f64 = gx
            .iter()
            .zip(&gy)
            .map(|(a, b)| (1.0 + a * a + b * b).sqrt())
            .sum();
        Ok((sum / gx.len() as f64 - 1.0) * 100.0)
    }

    fn smr(&mut self, args: &Arguments) -> CapResult<f64> {
        let c = args
            .float(0, "c")
            .ok_or_else(|| CapabilityError::InvalidArgument("Smr requires a height c".into()))?;
        let curve = self.abbott_curve()?;
        let above = curve.iter().filter(|&&z| z >= c).count();
        Ok(100.0 * above as f64 / curve.len() as f64)
    }

    fn smc(&mut self, args: &Arguments) -> CapResult<f64> {
        let mr = args.float_or(0, "mr", 10.0);
        if !(0.0..=100.0).contains(&mr) {
            return Err(CapabilityError::InvalidArgument(format!(
                "material ratio {} outside [0, 100]",
                mr
            )));
        }
        let curve = self.abbott_curve()?;
        Ok(Self::height_at_ratio(&curve, mr))
    }

    fn volume_parameters(&mut self, args: &Arguments) -> CapResult<Vec<f64>> {
        let p = args.float_or(0, "p", 10.0);
        let q = args.float_or(1, "q", 80.0);
        if !(0.0 <= p && p < q && q <= 100.0) {
            return Err(CapabilityError::InvalidArgument(format!(
                "volume parameters need 0 <= p < q <= 100, got p={} q={}",
                p, q
            )));
        }
        let curve = self.abbott_curve()?;
        let cp = Self::height_at_ratio(&curve, p);
        let cq = Self::height_at_ratio(&curve, q);
        let vmp = Self::material_volume(&curve, cp);
        let vmc = Self::material_volume(&curve, cq) - vmp;
        let vvv = Self::void_volume(&curve, cq);
        let vvc = Self::void_volume(&curve, cp) - vvv;
        Ok(vec![vmp, vmc, vvv, vvc])
    }

    fn height_parameters(&mut self) -> CapResult<Vec<f64>> {
        let m = self.moments()?;
        let (sa, sq, sp, sv) = (m[1], m[2], m[3], m[4]);
        Ok(vec![sa, sq, sp, sv, sp + sv, self.skewness()?, self.kurtosis()?])
    }

    // ── Structural operations ──

    fn zero(&mut self) -> CapResult<()> {
        let min = self.measured().fold(f64::INFINITY, f64::min);
        if !min.is_finite() {
            return Err(CapabilityError::NonMeasuredPoints(self.data.len()));
        }
        self.map_in_place(|v| v - min);
        Ok(())
    }

    fn center(&mut self) -> CapResult<()> {
        let mean = self.moments()?[0];
        self.map_in_place(|v| v - mean);
        Ok(())
    }

    /// Least-squares plane removal over the measured points.
    fn level(&mut self) -> CapResult<()> {
        let mut n = 0.0;
        let (mut sx, mut sy, mut sz) = (0.0, 0.0, 0.0);
        for y in 0..self.ny {
            for x in 0..self.nx {
                let z = self.get(x, y);
                if z.is_finite() {
                    n += 1.0;
                    sx += x as f64 * self.step_x;
                    sy += y as f64 * self.step_y;
                    sz += z;
                }
            }
        }
        if n < 3.0 {
            return Err(CapabilityError::Numerical("too few points to fit a plane".into()));
        }
        let (mx, my, mz) = (sx / n, sy / n, sz / n);
        let (mut sxx, mut syy, mut sxy, mut sxz, mut syz) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for y in 0..self.ny {
            for x in 0..self.nx {
                let z = self.get(x, y);
                if z.is_finite() {
                    let dx = x as f64 * self.step_x - mx;
                    let dy = y as f64 * self.step_y - my;
                    let dz = z - mz;
                    sxx += dx * dx;
                    syy += dy * dy;
                    sxy += dx * dy;
                    sxz += dx * dz;
                    syz += dy * dz;
                }
            }
        }
        let det = sxx * syy - sxy * sxy;
        if det.abs() < f64::EPSILON * (sxx * syy).max(1.0) {
            return Err(CapabilityError::Numerical(
                "plane fit is degenerate for this grid".into(),
            ));
        }
        let a = (sxz * syy - syz * sxy) / det;
        let b = (syz * sxx - sxz * sxy) / det;
        let (nx, step_x, step_y) = (self.nx, self.step_x, self.step_y);
        for (idx, v) in self.data.iter_mut().enumerate() {
            let x = (idx % nx) as f64 * step_x - mx;
            let y = (idx / nx) as f64 * step_y - my;
            *v -= mz + a * x + b * y;
        }
        self.memo.invalidate();
        Ok(())
    }

    /// Mark points above the `threshold`% and below the (100 - `threshold`)%
    /// material-ratio heights as non-measured.
    fn threshold(&mut self, args: &Arguments) -> CapResult<()> {
        let t = args.float_or(0, "threshold", 0.5);
        if !(0.0..50.0).contains(&t) {
            return Err(CapabilityError::InvalidArgument(format!(
                "threshold {} outside [0, 50)",
                t
            )));
        }
        let mean = self.moments()?[0];
        let curve = self.abbott_curve()?;
        let upper = Self::height_at_ratio(&curve, t) + mean;
        let lower = Self::height_at_ratio(&curve, 100.0 - t) + mean;
        self.map_in_place(|v| if v > upper || v < lower { f64::NAN } else { v });
        Ok(())
    }

    fn remove_outliers(&mut self, args: &Arguments) -> CapResult<()> {
        let n = args.float_or(0, "n", 3.0);
        let method = args.text_or(1, "method", "mean");
        if n <= 0.0 {
            return Err(CapabilityError::InvalidArgument(format!("n must be positive, got {}", n)));
        }
        let (center, spread) = match method {
            "mean" => {
                let m = self.moments()?;
                (m[0], m[2])
            }
            "median" => {
                let mut values: Vec<f64> = self.measured().collect();
                if values.is_empty() {
                    return Err(CapabilityError::NonMeasuredPoints(self.data.len()));
                }
                let median = median_of(&mut values);
                let mut deviations: Vec<f64> = values.iter().map(|v| (v - median).abs()).collect();
                // MAD scaled to be consistent with sigma for normal data
                (median, 1.4826 * median_of(&mut deviations))
            }
            other => {
                return Err(CapabilityError::InvalidArgument(format!(
                    "unknown outlier method '{}'",
                    other
                )))
            }
        };
        let limit = n * spread;
        self.map_in_place(|v| if (v - center).abs() > limit { f64::NAN } else { v });
        Ok(())
    }

    fn fill_nonmeasured(&mut self, args: &Arguments) -> CapResult<()> {
        let method = args.text_or(0, "method", "nearest");
        if self.nonmeasured_count() == 0 {
            return Ok(());
        }
        if self.nonmeasured_count() == self.data.len() {
            return Err(CapabilityError::NonMeasuredPoints(self.data.len()));
        }
        match method {
            "mean" => {
                let mean = self.moments()?[0];
                self.map_in_place(|v| if v.is_finite() { v } else { mean });
            }
            "nearest" => {
                // Multi-source BFS from every measured point (4-neighbourhood)
                let (nx, ny) = (self.nx, self.ny);
                let mut filled = self.data.clone();
                let mut queue: VecDeque<usize> = (0..filled.len())
                    .filter(|&i| filled[i].is_finite())
                    .collect();
                while let Some(idx) = queue.pop_front() {
                    let (x, y) = (idx % nx, idx / nx);
                    let value = filled[idx];
                    let mut visit = |nidx: usize| {
                        if !filled[nidx].is_finite() {
                            filled[nidx] = value;
                            queue.push_back(nidx);
                        }
                    };
                    if x > 0 {
                        visit(idx - 1);
                    }
                    if x + 1 < nx {
                        visit(idx + 1);
                    }
                    if y > 0 {
                        visit(idx - nx);
                    }
                    if y + 1 < ny {
                        visit(idx + nx);
                    }
                }
                self.replace(filled, nx, ny);
            }
            other => {
                return Err(CapabilityError::InvalidArgument(format!(
                    "unknown fill method '{}'",
                    other
                )))
            }
        }
        Ok(())
    }

    fn filter(&mut self, args: &Arguments) -> CapResult<()> {
        self.require_measured()?;
        let filter_type = args
            .text(0, "filter_type")
            .ok_or_else(|| CapabilityError::InvalidArgument("filter_type is required".into()))?
            .to_string();
        let cutoff = args
            .float(1, "cutoff")
            .ok_or_else(|| CapabilityError::InvalidArgument("cutoff is required".into()))?;
        if cutoff <= 0.0 {
            return Err(CapabilityError::InvalidArgument(format!(
                "cutoff must be positive, got {}",
                cutoff
            )));
        }
        let filtered: Vec<f64> = match filter_type.as_str() {
            "lowpass" => self.gaussian(&self.data, cutoff),
            "highpass" => {
                let smooth = self.gaussian(&self.data, cutoff);
                self.data.iter().zip(&smooth).map(|(z, s)| z - s).collect()
            }
            "bandpass" => {
                let cutoff2 = args.float(2, "cutoff2").ok_or_else(|| {
                    CapabilityError::InvalidArgument("bandpass requires cutoff2".into())
                })?;
                if cutoff2 <= cutoff {
                    return Err(CapabilityError::InvalidArgument(format!(
                        "cutoff2 ({}) must be greater than cutoff ({})",
                        cutoff2, cutoff
                    )));
                }
                let short = self.gaussian(&self.data, cutoff);
                let long = self.gaussian(&short, cutoff2);
                short.iter().zip(&long).map(|(s, l)| s - l).collect()
            }
            other => {
                return Err(CapabilityError::InvalidArgument(format!(
                    "unknown filter type '{}'",
                    other
                )))
            }
        };
        let (nx, ny) = (self.nx, self.ny);
        self.replace(filtered, nx, ny);
        Ok(())
    }

    /// Separable Gaussian weighting with cutoff wavelength `cutoff`
    /// (alpha = sqrt(ln 2 / pi)). Weights are renormalised at the borders.
    fn gaussian(&self, data: &[f64], cutoff: f64) -> Vec<f64> {
        let alpha = (2f64.ln() / PI).sqrt();
        let kernel = |step: f64| -> Vec<f64> {
            let radius = (cutoff / step).ceil().max(1.0) as isize;
            (-radius..=radius)
                .map(|i| {
                    let x = i as f64 * step / (alpha * cutoff);
                    (-PI * x * x).exp()
                })
                .collect()
        };
        let (nx, ny) = (self.nx, self.ny);
        let convolve = |src: &[f64], kernel: &[f64], along_x: bool| -> Vec<f64> {
            let radius = (kernel.len() / 2) as isize;
            let mut out = vec![0.0; src.len()];
            for y in 0..ny {
                for x in 0..nx {
                    let (mut acc, mut norm) = (0.0, 0.0);
                    for (k, w) in kernel.iter().enumerate() {
                        let offset = k as isize - radius;
                        let (sx, sy) = if along_x {
                            (x as isize + offset, y as isize)
                        } else {
                            (x as isize, y as isize + offset)
                        };
                        if sx < 0 || sy < 0 || sx >= nx as isize || sy >= ny as isize {
                            continue;
                        }
                        acc += w * src[sy as usize * nx + sx as usize];
                        norm += w;
                    }
                    out[y * nx + x] = acc / norm;
                }
            }
            out
        };
        let pass_x = convolve(data, &kernel(self.step_x), true);
        convolve(&pass_x, &kernel(self.step_y), false)
    }

    fn crop(&mut self, args: &Arguments) -> CapResult<()> {
        let width = (self.nx - 1) as f64 * self.step_x;
        let height = (self.ny - 1) as f64 * self.step_y;
        let x0 = args.float_or(0, "x0", 0.0);
        let x1 = args.float_or(1, "x1", width);
        let y0 = args.float_or(2, "y0", 0.0);
        let y1 = args.float_or(3, "y1", height);
        if x1 <= x0 || y1 <= y0 {
            return Err(CapabilityError::InvalidArgument(format!(
                "empty crop box [{}, {}] x [{}, {}]",
                x0, x1, y0, y1
            )));
        }
        let to_index =
            |v: f64, step: f64, n: usize| ((v / step).round().max(0.0) as usize).min(n - 1);
        let (i0, i1) = (to_index(x0, self.step_x, self.nx), to_index(x1, self.step_x, self.nx));
        let (j0, j1) = (to_index(y0, self.step_y, self.ny), to_index(y1, self.step_y, self.ny));
        if i1 <= i0 || j1 <= j0 {
            return Err(CapabilityError::InvalidArgument(
                "crop box selects less than 2x2 points".into(),
            ));
        }
        self.crop_indices(i0, i1 + 1, j0, j1 + 1);
        Ok(())
    }

    fn crop_indices(&mut self, x0: usize, x1: usize, y0: usize, y1: usize) {
        let mut out = Vec::with_capacity((x1 - x0) * (y1 - y0));
        for y in y0..y1 {
            out.extend_from_slice(&self.data[y * self.nx + x0..y * self.nx + x1]);
        }
        self.replace(out, x1 - x0, y1 - y0);
    }

    fn zoom(&mut self, args: &Arguments) -> CapResult<()> {
        let factor = args
            .float(0, "factor")
            .ok_or_else(|| CapabilityError::InvalidArgument("zoom requires a factor".into()))?;
        if factor < 1.0 {
            return Err(CapabilityError::InvalidArgument(format!(
                "zoom factor must be >= 1, got {}",
                factor
            )));
        }
        let new_nx = ((self.nx as f64 / factor).round() as usize).max(2).min(self.nx);
        let new_ny = ((self.ny as f64 / factor).round() as usize).max(2).min(self.ny);
        let x0 = (self.nx - new_nx) / 2;
        let y0 = (self.ny - new_ny) / 2;
        self.crop_indices(x0, x0 + new_nx, y0, y0 + new_ny);
        Ok(())
    }

    /// Rotate counter-clockwise by `angle` degrees and crop to the largest
    /// axis-aligned rectangle inside the rotated data.
    fn rotate_by(&mut self, angle: f64) -> CapResult<()> {
        self.require_measured()?;
        if self.nx < 2 || self.ny < 2 {
            return Err(CapabilityError::Numerical("rotation needs at least 2x2 points".into()));
        }
        let theta = angle.to_radians();
        let w = (self.nx - 1) as f64 * self.step_x;
        let h = (self.ny - 1) as f64 * self.step_y;
        let (wr, hr) = largest_inscribed_rect(w, h, theta);
        // Tolerance absorbs rounding in the trigonometry at right angles
        let new_nx = (wr / self.step_x + 1e-9).floor() as usize + 1;
        let new_ny = (hr / self.step_y + 1e-9).floor() as usize + 1;
        if new_nx < 2 || new_ny < 2 {
            return Err(CapabilityError::Numerical(format!(
                "rotation by {} degrees leaves no usable area",
                angle
            )));
        }
        let (sin, cos) = theta.sin_cos();
        let cx = (self.nx - 1) as f64 / 2.0;
        let cy = (self.ny - 1) as f64 / 2.0;
        let ocx = (new_nx - 1) as f64 / 2.0;
        let ocy = (new_ny - 1) as f64 / 2.0;
        let mut out = Vec::with_capacity(new_nx * new_ny);
        for j in 0..new_ny {
            for i in 0..new_nx {
                let u = (i as f64 - ocx) * self.step_x;
                let v = (j as f64 - ocy) * self.step_y;
                let su = u * cos + v * sin;
                let sv = -u * sin + v * cos;
                out.push(self.bilinear(su / self.step_x + cx, sv / self.step_y + cy));
            }
        }
        self.replace(out, new_nx, new_ny);
        Ok(())
    }

    fn bilinear(&self, fx: f64, fy: f64) -> f64 {
        let fx = fx.clamp(0.0, (self.nx - 1) as f64);
        let fy = fy.clamp(0.0, (self.ny - 1) as f64);
        let (x0, y0) = (fx.floor() as usize, fy.floor() as usize);
        let (x1, y1) = ((x0 + 1).min(self.nx - 1), (y0 + 1).min(self.ny - 1));
        let (tx, ty) = (fx - x0 as f64, fy - y0 as f64);
        let top = self.get(x0, y0) * (1.0 - tx) + self.get(x1, y0) * tx;
        let bottom = self.get(x0, y1) * (1.0 - tx) + self.get(x1, y1) * tx;
        top * (1.0 - ty) + bottom * ty
    }

    /// Dominant texture direction in degrees, from the structure tensor.
    /// 0 means the texture lines run along x.
    pub fn texture_orientation(&self) -> CapResult<f64> {
        let (gx, gy) = self.gradients()?;
        let (mut jxx, mut jyy, mut jxy) = (0.0, 0.0, 0.0);
        for (a, b) in gx.iter().zip(&gy) {
            jxx += a * a;
            jyy += b * b;
            jxy += a * b;
        }
        if jxx + jyy == 0.0 {
            return Err(CapabilityError::Numerical("flat surface has no texture direction".into()));
        }
        let gradient_dir = 0.5 * (2.0 * jxy).atan2(jxx - jyy);
        Ok(normalize_half_turn(gradient_dir.to_degrees() + 90.0))
    }

    fn align(&mut self, args: &Arguments) -> CapResult<()> {
        let target = match args.text_or(0, "axis", "y") {
            "x" => 0.0,
            "y" => 90.0,
            other => {
                return Err(CapabilityError::InvalidArgument(format!(
                    "axis must be 'x' or 'y', got '{}'",
                    other
                )))
            }
        };
        let angle = normalize_half_turn(target - self.texture_orientation()?);
        if angle.abs() < 1e-9 {
            self.memo.invalidate();
            return Ok(());
        }
        self.rotate_by(angle)
    }
}

/// Map an angle in degrees into (-90, 90].
fn normalize_half_turn(mut deg: f64) -> f64 {
    while deg > 90.0 {
        deg -= 180.0;
    }
    while deg <= -90.0 {
        deg += 180.0;
    }
    deg
}

fn median_of(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Width and height of the largest axis-aligned rectangle within a `w` x `h`
/// rectangle rotated by `theta` radians.
fn largest_inscribed_rect(w: f64, h: f64, theta: f64) -> (f64, f64) {
    if w <= 0.0 || h <= 0.0 {
        return (0.0, 0.0);
    }
    let width_is_longer = w >= h;
    let (long, short) = if width_is_longer { (w, h) } else { (h, w) };
    let (sin_a, cos_a) = (theta.sin().abs(), theta.cos().abs());
    if short <= 2.0 * sin_a * cos_a * long || (sin_a - cos_a).abs() < 1e-10 {
        let x = 0.5 * short;
        if width_is_longer {
            (x / sin_a, x / cos_a)
        } else {
            (x / cos_a, x / sin_a)
        }
    } else {
        let cos_2a = cos_a * cos_a - sin_a * sin_a;
        ((w * cos_a - h * sin_a) / cos_2a, (h * cos_a - w * sin_a) / cos_2a)
    }
}

impl Surface for HeightMap {
    fn invoke(&mut self, name: &str, args: &Arguments) -> Result<Outcome, CapabilityError> {
        let mutated = |r: CapResult<()>| r.map(|_| Outcome::Mutated);
        let scalar = |r: CapResult<f64>| r.map(|v| Outcome::Values(vec![v]));
        match name {
            "zero" => mutated(self.zero()),
            "center" => mutated(self.center()),
            "level" => mutated(self.level()),
            "threshold" => mutated(self.threshold(args)),
            "remove_outliers" => mutated(self.remove_outliers(args)),
            "fill_nonmeasured" => mutated(self.fill_nonmeasured(args)),
            "filter" => mutated(self.filter(args)),
            "crop" => mutated(self.crop(args)),
            "rotate" => {
                let angle = args.float(0, "angle").ok_or_else(|| {
                    CapabilityError::InvalidArgument("rotate requires an angle".into())
                })?;
                mutated(self.rotate_by(angle))
            }
            "align" => mutated(self.align(args)),
            "zoom" => mutated(self.zoom(args)),
            "Sa" => scalar(self.moments().map(|m| m[1])),
            "Sq" => scalar(self.moments().map(|m| m[2])),
            "Sp" => scalar(self.moments().map(|m| m[3])),
            "Sv" => scalar(self.moments().map(|m| m[4])),
            "Sz" => scalar(self.moments().map(|m| m[3] + m[4])),
            "Ssk" => scalar(self.skewness()),
            "Sku" => scalar(self.kurtosis()),
            "Sdq" => scalar(self.sdq()),
            "Sdr" => scalar(self.sdr()),
            "Smr" => scalar(self.smr(args)),
            "Smc" => scalar(self.smc(args)),
            "volume_parameters" => self.volume_parameters(args).map(Outcome::Values),
            "height_parameters" => self.height_parameters().map(Outcome::Values),
            other => Err(CapabilityError::Unsupported(other.to_string())),
        }
    }
}
