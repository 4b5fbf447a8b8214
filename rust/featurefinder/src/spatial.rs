//! Neighbourhood queries over the peaks of one extraction pass.
//!
//! Peaks live in a [`PeakArena`] and are addressed by [`PeakId`]. Whether
//! a peak has been claimed is tracked by a bitset owned by the arena, so
//! no stage mutates the peaks themselves once they are built.

use crate::models::{
    Peak,
    PeakId,
};
use crate::utils::{
    TupleRange,
    binary_search_range_by_f64_key,
};

#[derive(Debug, Clone, Default)]
struct BitSet {
    words: Vec<u64>,
    len: usize,
}

impl BitSet {
    fn new(len: usize, value: bool) -> Self {
        let fill = if value { u64::MAX } else { 0 };
        Self {
            words: vec![fill; len.div_ceil(64)],
            len,
        }
    }

    #[inline]
    fn get(&self, i: usize) -> bool {
        (self.words[i / 64] >> (i % 64)) & 1 == 1
    }

    #[inline]
    fn set(&mut self, i: usize, value: bool) {
        let mask = 1u64 << (i % 64);
        if value {
            self.words[i / 64] |= mask;
        } else {
            self.words[i / 64] &= !mask;
        }
    }

    fn count_ones(&self) -> usize {
        (0..self.len).filter(|i| self.get(*i)).count()
    }
}

/// Owns the peaks of a pass and the set of consumed ones.
#[derive(Debug, Clone)]
pub struct PeakArena {
    peaks: Vec<Peak>,
    consumed: BitSet,
}

impl PeakArena {
    /// Ids are reassigned to the position of each peak.
    pub fn new(mut peaks: Vec<Peak>) -> Self {
        for (i, p) in peaks.iter_mut().enumerate() {
            p.id = PeakId(i as u32);
        }
        let consumed = BitSet::new(peaks.len(), false);
        Self { peaks, consumed }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    #[inline]
    pub fn get(&self, id: PeakId) -> &Peak {
        &self.peaks[id.index()]
    }

    #[inline]
    pub fn is_consumed(&self, id: PeakId) -> bool {
        self.consumed.get(id.index())
    }

    pub fn consume(&mut self, id: PeakId) {
        self.consumed.set(id.index(), true);
    }

    pub fn release(&mut self, id: PeakId) {
        self.consumed.set(id.index(), false);
    }

    pub fn consume_all(&mut self) {
        self.consumed = BitSet::new(self.peaks.len(), true);
    }

    pub fn consumed_count(&self) -> usize {
        self.consumed.count_ones()
    }

    pub fn available(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter().filter(|p| !self.is_consumed(p.id))
    }

    /// Ids sorted by apex intensity, tallest first. Ties keep id order.
    pub fn ids_by_intensity_desc(&self) -> Vec<PeakId> {
        let mut ids: Vec<PeakId> = self.peaks.iter().map(|p| p.id).collect();
        ids.sort_by(|a, b| {
            self.get(*b)
                .intensity
                .total_cmp(&self.get(*a).intensity)
                .then(a.cmp(b))
        });
        ids
    }

    /// Drops the consumed peaks and returns the rest.
    pub fn into_available(self) -> Vec<Peak> {
        let consumed = self.consumed;
        self.peaks
            .into_iter()
            .filter(|p| !consumed.get(p.id.index()))
            .collect()
    }
}

/// Peak ids ordered by m/z, for window queries.
#[derive(Debug, Clone)]
pub struct PeakIndex {
    by_mz: Vec<(f64, PeakId)>,
}

impl PeakIndex {
    pub fn new(arena: &PeakArena) -> Self {
        let mut by_mz: Vec<(f64, PeakId)> = arena.peaks().iter().map(|p| (p.mz, p.id)).collect();
        by_mz.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        Self { by_mz }
    }

    pub fn len(&self) -> usize {
        self.by_mz.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_mz.is_empty()
    }

    /// Every peak with m/z and apex scan inside the ranges, consumed or not.
    pub fn query<'a>(
        &'a self,
        arena: &'a PeakArena,
        mz_range: TupleRange<f64>,
        scan_range: TupleRange<usize>,
    ) -> impl Iterator<Item = &'a Peak> + 'a {
        let idx = binary_search_range_by_f64_key(&self.by_mz, mz_range, |x| x.0);
        self.by_mz[idx]
            .iter()
            .map(|(_, id)| arena.get(*id))
            .filter(move |p| scan_range.contains(p.scan_index))
    }

    /// Same as [`PeakIndex::query`] without the consumed peaks.
    pub fn query_available<'a>(
        &'a self,
        arena: &'a PeakArena,
        mz_range: TupleRange<f64>,
        scan_range: TupleRange<usize>,
    ) -> impl Iterator<Item = &'a Peak> + 'a {
        self.query(arena, mz_range, scan_range)
            .filter(|p| !arena.is_consumed(p.id))
    }
}
