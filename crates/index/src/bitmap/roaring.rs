//! Compressed bitmap of 32-bit record ids
//!
//! Ids are split on their high 16 bits into segments; each segment holds
//! one container in the minimum-space form for its cardinality:
//!
//! - **array**: sorted `u16` list, for sparse segments
//! - **dense**: 1024 × `u64` bit words, for heavy segments
//! - **runs**: sorted inclusive `(start, end)` intervals, when the data
//!   is contiguous enough
//!
//! Serialization is little-endian: a 1-byte container tag, a `u16`
//! cardinality-minus-one prefix (containers are never empty), then the
//! payload. The cardinality rides in the header so count-only readers
//! never decode bodies.

use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;

use facet_core::{Error, Result};

/// Array containers grow into dense bitmaps past this cardinality
pub const ARRAY_MAX_CARDINALITY: u32 = 4096;

const TAG_ARRAY: u8 = 1;
const TAG_BITMAP: u8 = 2;
const TAG_RUNS: u8 = 3;

const WORDS: usize = 1024;

/// One 16-bit segment in its minimum-space form
#[derive(Debug, Clone, PartialEq)]
pub enum Container {
    /// Sorted ascending, no duplicates
    Array(Vec<u16>),
    /// 65536 bits in 1024 words
    Bitmap(Box<[u64; WORDS]>),
    /// Sorted, non-overlapping, non-adjacent inclusive intervals
    Runs(Vec<(u16, u16)>),
}

impl Container {
    /// An empty array container
    pub fn new() -> Self {
        Container::Array(Vec::new())
    }

    /// Number of set values
    pub fn cardinality(&self) -> u32 {
        match self {
            Container::Array(values) => values.len() as u32,
            Container::Bitmap(words) => words.iter().map(|w| w.count_ones()).sum(),
            Container::Runs(runs) => runs
                .iter()
                .map(|(start, end)| (*end as u32 - *start as u32) + 1)
                .sum(),
        }
    }

    /// Whether `value` is present
    pub fn contains(&self, value: u16) -> bool {
        match self {
            Container::Array(values) => values.binary_search(&value).is_ok(),
            Container::Bitmap(words) => {
                words[value as usize / 64] & (1u64 << (value % 64)) != 0
            }
            Container::Runs(runs) => runs
                .binary_search_by(|(start, end)| {
                    if value < *start {
                        std::cmp::Ordering::Greater
                    } else if value > *end {
                        std::cmp::Ordering::Less
                    } else {
                        std::cmp::Ordering::Equal
                    }
                })
                .is_ok(),
        }
    }

    /// The 1024-word dense form
    fn to_words(&self) -> Box<[u64; WORDS]> {
        let mut words = Box::new([0u64; WORDS]);
        match self {
            Container::Array(values) => {
                for &v in values {
                    words[v as usize / 64] |= 1u64 << (v % 64);
                }
            }
            Container::Bitmap(existing) => words.copy_from_slice(&existing[..]),
            Container::Runs(runs) => {
                for &(start, end) in runs {
                    for v in start..=end {
                        words[v as usize / 64] |= 1u64 << (v % 64);
                    }
                }
            }
        }
        words
    }

    /// All set values, ascending
    pub fn values(&self) -> Vec<u16> {
        match self {
            Container::Array(values) => values.clone(),
            Container::Bitmap(words) => {
                let mut out = Vec::new();
                for (i, word) in words.iter().enumerate() {
                    let mut w = *word;
                    while w != 0 {
                        let bit = w.trailing_zeros();
                        out.push((i as u32 * 64 + bit) as u16);
                        w &= w - 1;
                    }
                }
                out
            }
            Container::Runs(runs) => runs
                .iter()
                .flat_map(|&(start, end)| start..=end)
                .collect(),
        }
    }

    /// Insert `value`; returns whether the container changed
    pub fn insert(&mut self, value: u16) -> bool {
        match self {
            Container::Array(values) => match values.binary_search(&value) {
                Ok(_) => false,
                Err(at) => {
                    values.insert(at, value);
                    true
                }
            },
            Container::Bitmap(words) => {
                let word = &mut words[value as usize / 64];
                let mask = 1u64 << (value % 64);
                let was = *word & mask != 0;
                *word |= mask;
                !was
            }
            Container::Runs(_) => {
                if self.contains(value) {
                    return false;
                }
                let mut values = self.values();
                let at = values.partition_point(|&v| v < value);
                values.insert(at, value);
                *self = Container::Array(values);
                true
            }
        }
    }

    /// Remove `value`; returns whether the container changed
    pub fn remove(&mut self, value: u16) -> bool {
        match self {
            Container::Array(values) => match values.binary_search(&value) {
                Ok(at) => {
                    values.remove(at);
                    true
                }
                Err(_) => false,
            },
            Container::Bitmap(words) => {
                let word = &mut words[value as usize / 64];
                let mask = 1u64 << (value % 64);
                let was = *word & mask != 0;
                *word &= !mask;
                was
            }
            Container::Runs(_) => {
                if !self.contains(value) {
                    return false;
                }
                let values: Vec<u16> =
                    self.values().into_iter().filter(|&v| v != value).collect();
                *self = Container::Array(values);
                true
            }
        }
    }

    /// Number of maximal runs of consecutive values
    fn run_count(&self) -> u32 {
        let values = self.values();
        let mut runs = 0u32;
        let mut prev: Option<u16> = None;
        for v in values {
            if prev.map_or(true, |p| v != p.wrapping_add(1)) {
                runs += 1;
            }
            prev = Some(v);
        }
        runs
    }

    /// Re-select the minimum-space form for the current contents
    ///
    /// Evaluated on every write: runs win when the run count is at most
    /// half the cardinality, otherwise arrays up to 4096 values and the
    /// dense bitmap beyond.
    pub fn optimize(self) -> Container {
        let cardinality = self.cardinality();
        if cardinality == 0 {
            return Container::Array(Vec::new());
        }
        let runs = self.run_count();
        if runs <= cardinality / 2 {
            let values = self.values();
            let mut out: Vec<(u16, u16)> = Vec::with_capacity(runs as usize);
            for v in values {
                match out.last_mut() {
                    Some((_, end)) if *end == v.wrapping_sub(1) && v > 0 => *end = v,
                    _ => out.push((v, v)),
                }
            }
            Container::Runs(out)
        } else if cardinality > ARRAY_MAX_CARDINALITY {
            Container::Bitmap(self.to_words())
        } else {
            Container::Array(self.values())
        }
    }

    /// Intersection
    pub fn and(&self, other: &Container) -> Container {
        let (a, b) = (self.to_words(), other.to_words());
        let mut words = Box::new([0u64; WORDS]);
        for i in 0..WORDS {
            words[i] = a[i] & b[i];
        }
        Container::Bitmap(words).optimize()
    }

    /// Union
    pub fn or(&self, other: &Container) -> Container {
        let (a, b) = (self.to_words(), other.to_words());
        let mut words = Box::new([0u64; WORDS]);
        for i in 0..WORDS {
            words[i] = a[i] | b[i];
        }
        Container::Bitmap(words).optimize()
    }

    /// Difference (`self` minus `other`)
    pub fn and_not(&self, other: &Container) -> Container {
        let (a, b) = (self.to_words(), other.to_words());
        let mut words = Box::new([0u64; WORDS]);
        for i in 0..WORDS {
            words[i] = a[i] & !b[i];
        }
        Container::Bitmap(words).optimize()
    }

    /// Serialize: tag, cardinality-minus-one, payload (all little-endian)
    ///
    /// # Errors
    ///
    /// `InvalidStructure` when the container is empty; empty segments
    /// are deleted, never stored.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let cardinality = self.cardinality();
        if cardinality == 0 {
            return Err(Error::InvalidStructure(
                "empty bitmap containers must not be serialized".into(),
            ));
        }
        let mut out = Vec::new();
        let mut header = [0u8; 2];
        LittleEndian::write_u16(&mut header, (cardinality - 1) as u16);
        match self {
            Container::Array(values) => {
                out.push(TAG_ARRAY);
                out.extend_from_slice(&header);
                for &v in values {
                    let mut buf = [0u8; 2];
                    LittleEndian::write_u16(&mut buf, v);
                    out.extend_from_slice(&buf);
                }
            }
            Container::Bitmap(words) => {
                out.push(TAG_BITMAP);
                out.extend_from_slice(&header);
                for &word in words.iter() {
                    let mut buf = [0u8; 8];
                    LittleEndian::write_u64(&mut buf, word);
                    out.extend_from_slice(&buf);
                }
            }
            Container::Runs(runs) => {
                out.push(TAG_RUNS);
                out.extend_from_slice(&header);
                let mut buf = [0u8; 2];
                LittleEndian::write_u16(&mut buf, runs.len() as u16);
                out.extend_from_slice(&buf);
                for &(start, end) in runs {
                    LittleEndian::write_u16(&mut buf, start);
                    out.extend_from_slice(&buf);
                    LittleEndian::write_u16(&mut buf, end);
                    out.extend_from_slice(&buf);
                }
            }
        }
        Ok(out)
    }

    /// Read just the cardinality from a serialized container
    ///
    /// # Errors
    ///
    /// `TruncatedData` when the header is incomplete.
    pub fn read_cardinality(raw: &[u8]) -> Result<u32> {
        if raw.len() < 3 {
            return Err(Error::TruncatedData(
                "bitmap container header is incomplete".into(),
            ));
        }
        Ok(LittleEndian::read_u16(&raw[1..3]) as u32 + 1)
    }

    /// Reverse of [`Container::serialize`]
    ///
    /// # Errors
    ///
    /// `TruncatedData` / `InvalidStructure` on malformed payloads.
    pub fn deserialize(raw: &[u8]) -> Result<Container> {
        let cardinality = Self::read_cardinality(raw)? as usize;
        let body = &raw[3..];
        match raw[0] {
            TAG_ARRAY => {
                if body.len() != cardinality * 2 {
                    return Err(Error::TruncatedData(
                        "array container body length mismatch".into(),
                    ));
                }
                let values = body
                    .chunks_exact(2)
                    .map(LittleEndian::read_u16)
                    .collect::<Vec<u16>>();
                Ok(Container::Array(values))
            }
            TAG_BITMAP => {
                if body.len() != WORDS * 8 {
                    return Err(Error::TruncatedData(
                        "dense container body length mismatch".into(),
                    ));
                }
                let mut words = Box::new([0u64; WORDS]);
                for (i, chunk) in body.chunks_exact(8).enumerate() {
                    words[i] = LittleEndian::read_u64(chunk);
                }
                Ok(Container::Bitmap(words))
            }
            TAG_RUNS => {
                if body.len() < 2 {
                    return Err(Error::TruncatedData("run container missing count".into()));
                }
                let count = LittleEndian::read_u16(&body[..2]) as usize;
                let runs_body = &body[2..];
                if runs_body.len() != count * 4 {
                    return Err(Error::TruncatedData(
                        "run container body length mismatch".into(),
                    ));
                }
                let mut runs = Vec::with_capacity(count);
                for chunk in runs_body.chunks_exact(4) {
                    let start = LittleEndian::read_u16(&chunk[..2]);
                    let end = LittleEndian::read_u16(&chunk[2..]);
                    if end < start {
                        return Err(Error::InvalidStructure(
                            "run container has an inverted interval".into(),
                        ));
                    }
                    runs.push((start, end));
                }
                Ok(Container::Runs(runs))
            }
            tag => Err(Error::InvalidStructure(format!(
                "unknown bitmap container tag 0x{:02x}",
                tag
            ))),
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Container::new()
    }
}

/// A set of 32-bit record ids as per-segment containers
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoaringBitmap {
    containers: BTreeMap<u16, Container>,
}

impl RoaringBitmap {
    /// An empty bitmap
    pub fn new() -> Self {
        Self::default()
    }

    /// Assemble from decoded segments
    pub fn from_segments(segments: BTreeMap<u16, Container>) -> Self {
        Self {
            containers: segments,
        }
    }

    /// The per-segment containers, keyed by high 16 bits
    pub fn segments(&self) -> &BTreeMap<u16, Container> {
        &self.containers
    }

    /// Total set ids
    pub fn cardinality(&self) -> u64 {
        self.containers
            .values()
            .map(|c| c.cardinality() as u64)
            .sum()
    }

    /// Whether no id is set
    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    /// Whether `id` is present
    pub fn contains(&self, id: u32) -> bool {
        self.containers
            .get(&((id >> 16) as u16))
            .is_some_and(|c| c.contains(id as u16))
    }

    /// Insert `id`
    pub fn insert(&mut self, id: u32) {
        let entry = self
            .containers
            .entry((id >> 16) as u16)
            .or_insert_with(Container::new);
        entry.insert(id as u16);
    }

    /// Remove `id`, dropping the segment when it empties
    pub fn remove(&mut self, id: u32) {
        let hi = (id >> 16) as u16;
        if let Some(container) = self.containers.get_mut(&hi) {
            container.remove(id as u16);
            if container.cardinality() == 0 {
                self.containers.remove(&hi);
            }
        }
    }

    /// All ids, ascending
    pub fn iter_ids(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for (hi, container) in &self.containers {
            for lo in container.values() {
                out.push(((*hi as u32) << 16) | lo as u32);
            }
        }
        out
    }

    /// Intersection; segments missing on either side short-circuit empty
    pub fn and(&self, other: &RoaringBitmap) -> RoaringBitmap {
        let mut out = BTreeMap::new();
        for (hi, a) in &self.containers {
            if let Some(b) = other.containers.get(hi) {
                let merged = a.and(b);
                if merged.cardinality() > 0 {
                    out.insert(*hi, merged);
                }
            }
        }
        RoaringBitmap::from_segments(out)
    }

    /// Union; segments missing on one side pass through
    pub fn or(&self, other: &RoaringBitmap) -> RoaringBitmap {
        let mut out = self.containers.clone();
        for (hi, b) in &other.containers {
            match out.get(hi) {
                Some(a) => {
                    out.insert(*hi, a.or(b));
                }
                None => {
                    out.insert(*hi, b.clone());
                }
            }
        }
        RoaringBitmap::from_segments(out)
    }

    /// Difference; segments absent from `other` pass through
    pub fn and_not(&self, other: &RoaringBitmap) -> RoaringBitmap {
        let mut out = BTreeMap::new();
        for (hi, a) in &self.containers {
            let result = match other.containers.get(hi) {
                Some(b) => a.and_not(b),
                None => a.clone(),
            };
            if result.cardinality() > 0 {
                out.insert(*hi, result);
            }
        }
        RoaringBitmap::from_segments(out)
    }
}

impl FromIterator<u32> for RoaringBitmap {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        let mut bitmap = RoaringBitmap::new();
        for id in iter {
            bitmap.insert(id);
        }
        bitmap
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_promotes_past_array_limit() {
        let mut c = Container::new();
        // Spread values so runs stay long: odd values only.
        for v in 0..=ARRAY_MAX_CARDINALITY {
            c.insert((v * 2 + 1) as u16);
        }
        let optimized = c.optimize();
        assert!(matches!(optimized, Container::Bitmap(_)));
        assert_eq!(optimized.cardinality(), ARRAY_MAX_CARDINALITY + 1);
    }

    #[test]
    fn container_demotes_when_sparse_again() {
        let mut c = Container::new();
        for v in 0..5000u32 {
            c.insert((v * 2) as u16);
        }
        let mut dense = c.optimize();
        assert!(matches!(dense, Container::Bitmap(_)));
        for v in 1000..5000u32 {
            dense.remove((v * 2) as u16);
        }
        let optimized = dense.optimize();
        assert!(matches!(optimized, Container::Array(_)));
        assert_eq!(optimized.cardinality(), 1000);
    }

    #[test]
    fn contiguous_values_become_runs() {
        let mut c = Container::new();
        for v in 100..=900u16 {
            c.insert(v);
        }
        let optimized = c.optimize();
        assert!(matches!(optimized, Container::Runs(_)));
        assert_eq!(optimized.cardinality(), 801);
        assert!(optimized.contains(100));
        assert!(optimized.contains(900));
        assert!(!optimized.contains(901));
    }

    #[test]
    fn serialization_round_trips_every_form() {
        let mut array = Container::new();
        for v in [5u16, 9, 1000] {
            array.insert(v);
        }
        let mut dense = Container::new();
        for v in 0..5000u32 {
            dense.insert((v * 13 % 60000) as u16);
        }
        let dense = dense.optimize();
        let mut contiguous = Container::new();
        for v in 10..=50u16 {
            contiguous.insert(v);
        }
        let contiguous = contiguous.optimize();

        for container in [array, dense, contiguous] {
            let raw = container.serialize().unwrap();
            assert_eq!(
                Container::read_cardinality(&raw).unwrap(),
                container.cardinality()
            );
            let back = Container::deserialize(&raw).unwrap();
            assert_eq!(back.values(), container.values());
        }
    }

    #[test]
    fn bitmap_algebra() {
        let a: RoaringBitmap = (0u32..200).collect();
        let b: RoaringBitmap = (100u32..300).collect();

        let and = a.and(&b);
        assert_eq!(and.cardinality(), 100);
        assert!(and.cardinality() <= a.cardinality().min(b.cardinality()));

        let or = a.or(&b);
        assert_eq!(or.cardinality(), 300);
        assert!(or.cardinality() >= a.cardinality().max(b.cardinality()));

        let diff = a.and_not(&b);
        assert_eq!(diff.cardinality(), 100);
        assert!(diff.cardinality() <= a.cardinality());
        assert!(diff.contains(50));
        assert!(!diff.contains(150));
    }

    #[test]
    fn cross_segment_ids() {
        let mut bitmap = RoaringBitmap::new();
        bitmap.insert(10);
        bitmap.insert(70_000);
        bitmap.insert(140_000);
        assert_eq!(bitmap.cardinality(), 3);
        assert_eq!(bitmap.segments().len(), 3);
        assert_eq!(bitmap.iter_ids(), vec![10, 70_000, 140_000]);
        bitmap.remove(70_000);
        assert_eq!(bitmap.segments().len(), 2);
        assert!(!bitmap.contains(70_000));
    }

    #[test]
    fn missing_segments_short_circuit() {
        let a: RoaringBitmap = [1u32, 2, 3].into_iter().collect();
        let b: RoaringBitmap = [70_000u32].into_iter().collect();
        assert!(a.and(&b).is_empty());
        assert_eq!(a.or(&b).cardinality(), 4);
        assert_eq!(a.and_not(&b).cardinality(), 3);
    }
}
