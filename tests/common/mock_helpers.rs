//! Mock construction helpers

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use topo_batch::{
    AbortHandle, Arguments, AsciiGridLoader, CapabilityDescriptor, CapabilityError, CapabilitySet,
    Loader, Outcome, Surface,
};

/// Grid loader that counts how often it was asked to load.
#[derive(Clone, Default)]
pub struct CountingLoader {
    inner: AsciiGridLoader,
    pub calls: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Loader for CountingLoader {
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn Surface>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.load(path)
    }
}

/// Grid loader that trips an abort handle once `after` files were loaded.
pub struct AbortingLoader {
    inner: AsciiGridLoader,
    loads: AtomicUsize,
    after: usize,
    abort: AbortHandle,
}

impl AbortingLoader {
    pub fn new(after: usize, abort: AbortHandle) -> Self {
        Self {
            inner: AsciiGridLoader::new(),
            loads: AtomicUsize::new(0),
            after,
            abort,
        }
    }
}

impl Loader for AbortingLoader {
    fn load(&self, path: &Path) -> anyhow::Result<Box<dyn Surface>> {
        if self.loads.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.abort.abort();
        }
        self.inner.load(path)
    }
}

/// Tiny surface whose measurements are pure functions of a seed, with
/// optional jitter so completion order varies between workers.
pub struct ScriptedSurface {
    pub seed: u64,
    pub offset: f64,
    pub spin: u32,
}

impl ScriptedSurface {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            offset: 0.0,
            spin: (seed % 5) as u32 * 2000,
        }
    }
}

impl Surface for ScriptedSurface {
    fn invoke(&mut self, name: &str, args: &Arguments) -> Result<Outcome, CapabilityError> {
        // Busy work so workers finish out of order.
        let mut acc = 0u64;
        for i in 0..self.spin {
            acc = acc.wrapping_mul(31).wrapping_add(i as u64);
        }
        std::hint::black_box(acc);

        match name {
            "shift" => {
                self.offset += args.float_or(0, "by", 1.0);
                Ok(Outcome::Mutated)
            }
            "fail_if_odd" if self.seed % 2 == 1 => {
                Err(CapabilityError::Numerical(format!("seed {} is odd", self.seed)))
            }
            "fail_if_odd" => Ok(Outcome::Mutated),
            "height" => Ok(Outcome::Values(vec![self.seed as f64 + self.offset])),
            "odd_nan" if self.seed % 2 == 1 => Ok(Outcome::Values(vec![f64::NAN])),
            "odd_nan" => Ok(Outcome::Values(vec![self.seed as f64])),
            "span" => Ok(Outcome::Values(vec![
                self.offset,
                self.seed as f64 * 2.0 + self.offset,
            ])),
            other => Err(CapabilityError::Unsupported(other.to_string())),
        }
    }
}

/// Capabilities understood by [`ScriptedSurface`].
pub fn scripted_capabilities() -> Arc<CapabilitySet> {
    Arc::new(
        CapabilitySet::new()
            .with(CapabilityDescriptor::mutating("shift").keywords(&["by"]))
            .with(CapabilityDescriptor::mutating("fail_if_odd"))
            .with(CapabilityDescriptor::scalar("height"))
            .with(CapabilityDescriptor::scalar("odd_nan"))
            .with(CapabilityDescriptor::multi("span", &["lo", "hi"])),
    )
}

/// Loader producing [`ScriptedSurface`]s from file names like `f17.x`;
/// names starting with `bad` fail to load.
pub fn scripted_loader() -> impl Loader {
    topo_batch::FnLoader(|path: &Path| -> anyhow::Result<Box<dyn Surface>> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        if stem.starts_with("bad") {
            anyhow::bail!("cannot decode {}", stem);
        }
        let seed: u64 = stem.trim_start_matches('f').parse()?;
        Ok(Box::new(ScriptedSurface::new(seed)))
    })
}
