use std::collections::HashMap;
use std::io;
use std::sync::atomic::{
    AtomicU64,
    Ordering,
};
use std::sync::{
    Arc,
    Mutex,
};
use tracing::{
    debug,
    warn,
};

use crate::errors::SpectrumReadError;
use crate::models::Spectrum;
use crate::utils::LruCache;

/// Where decoded spectra come from.
///
/// Implementations wrap a file handle or a decoder. An `ErrorKind::NotFound`
/// error means the scan does not exist and is never retried, any other error
/// is treated as transient and the store reopens the source and tries again.
pub trait SpectrumSource: Send {
    fn read_spectrum(&mut self, scan_number: u32) -> io::Result<Spectrum>;

    /// Re-establish the underlying channel after a failed read.
    fn reopen(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Spectra that are already decoded, keyed by scan number.
#[derive(Debug, Clone, Default)]
pub struct InMemorySpectra {
    spectra: HashMap<u32, Arc<Spectrum>>,
}

impl InMemorySpectra {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, scan_number: u32, spectrum: Spectrum) {
        self.spectra.insert(scan_number, Arc::new(spectrum));
    }

    pub fn len(&self) -> usize {
        self.spectra.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spectra.is_empty()
    }
}

impl FromIterator<(u32, Spectrum)> for InMemorySpectra {
    fn from_iter<I: IntoIterator<Item = (u32, Spectrum)>>(iter: I) -> Self {
        Self {
            spectra: iter
                .into_iter()
                .map(|(k, v)| (k, Arc::new(v)))
                .collect(),
        }
    }
}

impl SpectrumSource for InMemorySpectra {
    fn read_spectrum(&mut self, scan_number: u32) -> io::Result<Spectrum> {
        self.spectra
            .get(&scan_number)
            .map(|x| x.as_ref().clone())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no spectrum for scan {}", scan_number),
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub cached: usize,
    pub capacity: usize,
}

struct StoreInner {
    source: Box<dyn SpectrumSource>,
    cache: LruCache<u32, Arc<Spectrum>>,
}

/// Serialized access to a run's spectra with a bounded LRU cache in front.
///
/// Only one decode is in flight per run, the lock covers both the source
/// and the cache. Feature finding windows running on other threads share
/// the store through `&Run`.
pub struct SpectrumStore {
    inner: Mutex<StoreInner>,
    read_retries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for SpectrumStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpectrumStore")
            .field("read_retries", &self.read_retries)
            .field("stats", &self.stats())
            .finish()
    }
}

impl SpectrumStore {
    pub fn new(source: impl SpectrumSource + 'static, cache_size: usize, read_retries: usize) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                source: Box::new(source),
                cache: LruCache::new(cache_size),
            }),
            read_retries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cached spectrum for the scan, decoding it if needed.
    ///
    /// Transient failures are retried `read_retries` times, reopening
    /// the source in between.
    pub fn try_spectrum(&self, scan_number: u32) -> Result<Arc<Spectrum>, SpectrumReadError> {
        // A poisoned lock only means another reader panicked mid decode,
        // the cache itself is always left consistent.
        let mut inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(spec) = inner.cache.get(&scan_number) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(spec.clone());
        }
        self.misses.fetch_add(1, Ordering::Relaxed);

        let attempts = self.read_retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match inner.source.read_spectrum(scan_number) {
                Ok(spec) => {
                    let spec = Arc::new(spec);
                    inner.cache.insert(scan_number, spec.clone());
                    return Ok(spec);
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    return Err(SpectrumReadError::UnknownScan(scan_number));
                }
                Err(e) => {
                    debug!(
                        "Reading scan {} failed (attempt {}/{}): {}",
                        scan_number, attempt, attempts, e
                    );
                    last_error = e.to_string();
                    if attempt < attempts {
                        if let Err(reopen_err) = inner.source.reopen() {
                            warn!("Reopening spectrum source failed: {}", reopen_err);
                        }
                    }
                }
            }
        }

        Err(SpectrumReadError::Unavailable {
            scan_number,
            attempts,
            reason: last_error,
        })
    }

    /// Same as [`SpectrumStore::try_spectrum`] but a failed read is logged
    /// and reported as a spectrum with no peaks.
    pub fn spectrum_or_empty(&self, scan_number: u32) -> Arc<Spectrum> {
        match self.try_spectrum(scan_number) {
            Ok(spec) => spec,
            Err(e) => {
                warn!("Treating scan {} as empty: {}", scan_number, e);
                Arc::new(Spectrum::empty())
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: inner.cache.evictions(),
            cached: inner.cache.len(),
            capacity: inner.cache.capacity(),
        }
    }
}
