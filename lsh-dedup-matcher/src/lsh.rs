use lsh_dedup_labeler::config::BlockingConfig;
use rand::prelude::*;
use rayon::prelude::*;
use rustc_hash::FxHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

#[derive(Clone, Debug)]
pub struct MinHash {
    pub hash_values: Vec<u32>,
}

impl MinHash {
    fn new<T: Hash>(items: &[T], permutations: &[(u64, u64)]) -> Self {
        let mut hash_values = vec![u32::MAX; permutations.len()];
        for item in items {
            let item_hash = calculate_hash(item);
            for (i, &(a, b)) in permutations.iter().enumerate() {
                let hash = permute_hash(item_hash, a, b);
                hash_values[i] = hash_values[i].min(hash);
            }
        }
        MinHash { hash_values }
    }
}

/// Locality-Sensitive Hashing over record shingles, used as the blocking stage:
/// only records sharing at least one band bucket are ever compared.
pub struct MinHashLSH {
    /// Signature per record index; `None` for records with nothing to hash
    minhashes: Vec<Option<MinHash>>,
    /// Number of signature rows per band
    band_size: usize,
    /// Banded hash tables mapping a band hash to record indices
    hash_tables: Vec<HashMap<u64, Vec<usize>>>,
}

impl MinHashLSH {
    /// Creates a new MinHashLSH instance.
    ///
    /// ## Arguments
    ///
    /// * `documents` - Blocking text per record, indexed like the dataset.
    /// * `config` - Permutation count, band count, shingle size and seed.
    pub fn new(documents: &[String], config: &BlockingConfig) -> Self {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let permutations: Vec<(u64, u64)> =
            (0..config.num_perm).map(|_| (rng.gen(), rng.gen())).collect();
        let band_size = config.num_perm / config.num_bands;

        let minhashes: Vec<Option<MinHash>> = documents
            .par_iter()
            .map(|text| {
                let items = shingles(text, config.shingle_size);
                if items.is_empty() {
                    None
                } else {
                    Some(MinHash::new(&items, &permutations))
                }
            })
            .collect();

        let mut hash_tables: Vec<HashMap<u64, Vec<usize>>> = vec![HashMap::new(); config.num_bands];
        for (idx, minhash) in minhashes.iter().enumerate() {
            let Some(minhash) = minhash else { continue };
            for (i, table) in hash_tables.iter_mut().enumerate() {
                let start = i * band_size;
                let end = start + band_size;
                let band_hash = calculate_band_hash(&minhash.hash_values[start..end]);
                table.entry(band_hash).or_insert_with(Vec::new).push(idx);
            }
        }
        MinHashLSH {
            minhashes,
            band_size,
            hash_tables,
        }
    }

    /// Records sharing a band bucket with `idx`, excluding `idx` itself.
    pub fn query(&self, idx: usize) -> Vec<usize> {
        let Some(Some(minhash)) = self.minhashes.get(idx) else {
            return Vec::new();
        };
        let candidates: HashSet<usize> =
            self.hash_tables
                .iter()
                .enumerate()
                .fold(HashSet::new(), |mut doc_set, (i, table)| {
                    let start = i * self.band_size;
                    let end = start + self.band_size;
                    let band_hash = calculate_band_hash(&minhash.hash_values[start..end]);
                    if let Some(docs) = table.get(&band_hash) {
                        doc_set.extend(docs.iter().filter(|&&other| other != idx));
                    }
                    doc_set
                });
        candidates.into_iter().collect()
    }

    /// Every unordered candidate pair `(i, j)` with `i < j`, sorted.
    pub fn candidate_pairs(&self) -> Vec<(usize, usize)> {
        let mut pairs: Vec<(usize, usize)> = (0..self.minhashes.len())
            .into_par_iter()
            .flat_map_iter(|idx| {
                self.query(idx)
                    .into_iter()
                    .filter(move |&other| other > idx)
                    .map(move |other| (idx, other))
            })
            .collect();
        pairs.par_sort_unstable();
        pairs
    }
}

/// Character shingles of `text` with whitespace runs collapsed. Text shorter
/// than `size` yields itself as the single shingle.
pub fn shingles(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.split_whitespace().collect::<Vec<_>>().join(" ").chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    if chars.len() <= size {
        return vec![chars.into_iter().collect()];
    }
    chars.windows(size).map(|w| w.iter().collect()).collect()
}

#[inline]
fn calculate_hash<T: Hash>(t: &T) -> u64 {
    let mut s = FxHasher::default();
    t.hash(&mut s);
    s.finish()
}

#[inline]
fn permute_hash(hash: u64, a: u64, b: u64) -> u32 {
    ((a.wrapping_mul(hash).wrapping_add(b)) >> 32) as u32
}

#[inline]
fn calculate_band_hash(band: &[u32]) -> u64 {
    let mut hasher = FxHasher::default();
    for &value in band {
        hasher.write_u32(value);
    }
    hasher.finish()
}
