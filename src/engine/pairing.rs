//! Pairing strategies: turn one file listing per input directory into argument tuples.

use log::{debug, warn};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index;
use rand::SeedableRng;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::StepError;
use crate::types::{Arg, ArgTuple};
use crate::utils::config::DEFAULT_SAMPLE_RATIO;

/// Lazy, finite, single-pass sequence of argument tuples.
pub type ArgIter = Box<dyn Iterator<Item = ArgTuple> + Send>;

/// User-supplied pairing for the `custom` strategy.
///
/// Receives one ordered listing per input directory (input-directory order) and returns the
/// tuples to dispatch. The engine does not validate them.
pub trait PairingFn: Send + Sync {
    fn pair(&self, listings: Vec<Vec<PathBuf>>) -> ArgIter;
}

impl<F, I> PairingFn for F
where
    F: Fn(Vec<Vec<PathBuf>>) -> I + Send + Sync,
    I: IntoIterator<Item = ArgTuple>,
    I::IntoIter: Send + 'static,
{
    fn pair(&self, listings: Vec<Vec<PathBuf>>) -> ArgIter {
        Box::new(self(listings).into_iter())
    }
}

/// How the input listings combine into tuples. Fixed when the step is built.
#[derive(Clone)]
pub enum PairingStrategy {
    /// `(file,)` for each file of the first listing.
    OneInput,
    /// Element-wise over all listings, truncated to the shortest.
    Zip,
    /// Each file of listing 0 with listing 1 (shuffled once) cycled by index.
    Modulo,
    /// `(file, in_first_subset, in_second_subset)` with subsets drawn at the given ratios.
    Sample { first: f64, second: f64 },
    Custom(Arc<dyn PairingFn>),
}

impl PairingStrategy {
    pub const NAMES: [&'static str; 5] = ["one_input", "zip", "modulo", "sample", "custom"];

    /// Parse a strategy name. `custom` needs `pairing_fn`; `sample` takes optional ratios.
    pub fn from_name(
        name: &str,
        pairing_fn: Option<Arc<dyn PairingFn>>,
        sample_ratios: Option<(f64, f64)>,
    ) -> Result<Self, StepError> {
        match name {
            "one_input" => Ok(PairingStrategy::OneInput),
            "zip" => Ok(PairingStrategy::Zip),
            "modulo" => Ok(PairingStrategy::Modulo),
            "sample" => {
                let (first, second) =
                    sample_ratios.unwrap_or((DEFAULT_SAMPLE_RATIO, DEFAULT_SAMPLE_RATIO));
                for ratio in [first, second] {
                    if !(0.0..=1.0).contains(&ratio) {
                        return Err(StepError::InvalidSampleRatio { ratio });
                    }
                }
                Ok(PairingStrategy::Sample { first, second })
            }
            "custom" => pairing_fn
                .map(PairingStrategy::Custom)
                .ok_or(StepError::MissingPairingFunction),
            other => Err(StepError::InvalidPairingStrategy {
                name: other.to_string(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PairingStrategy::OneInput => "one_input",
            PairingStrategy::Zip => "zip",
            PairingStrategy::Modulo => "modulo",
            PairingStrategy::Sample { .. } => "sample",
            PairingStrategy::Custom(_) => "custom",
        }
    }

    /// Check the number of input directories this strategy needs.
    fn check_arity(&self, step: &str, got: usize) -> Result<(), StepError> {
        let required = match self {
            PairingStrategy::OneInput | PairingStrategy::Sample { .. } if got < 1 => "at least 1",
            PairingStrategy::Zip if got < 2 => "at least 2",
            PairingStrategy::Modulo if got != 2 => "exactly 2",
            _ => return Ok(()),
        };
        Err(StepError::StrategyArity {
            step: step.to_string(),
            strategy: self.name(),
            required,
            got,
        })
    }
}

impl fmt::Debug for PairingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingStrategy::Sample { first, second } => f
                .debug_struct("Sample")
                .field("first", first)
                .field("second", second)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Builds the tuple sequence for one step run. Owns the random source used by
/// `sample_k`, `modulo` and `sample`; seed it for reproducible runs.
pub struct ArgumentGenerator {
    strategy: PairingStrategy,
    sample_k: Option<usize>,
    rng: StdRng,
}

impl ArgumentGenerator {
    pub fn new(strategy: PairingStrategy, sample_k: Option<usize>, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Self {
            strategy,
            sample_k,
            rng,
        }
    }

    /// Validate the listings and return the tuple sequence.
    ///
    /// `dirs` are the input directories the listings came from (same order), used in errors.
    pub fn generate(
        &mut self,
        step: &str,
        dirs: &[PathBuf],
        mut listings: Vec<Vec<PathBuf>>,
    ) -> Result<ArgIter, StepError> {
        let empty: Vec<PathBuf> = listings
            .iter()
            .enumerate()
            .filter(|(_, l)| l.is_empty())
            .map(|(i, _)| dirs.get(i).cloned().unwrap_or_default())
            .collect();
        if !empty.is_empty() {
            return Err(StepError::EmptyInputDirectory {
                step: step.to_string(),
                dirs: empty,
            });
        }
        self.strategy.check_arity(step, listings.len())?;

        if let Some(k) = self.sample_k {
            listings = self.sample_listings(step, dirs, listings, k)?;
        }

        let iter: ArgIter = match &self.strategy {
            PairingStrategy::OneInput => {
                let first = listings.swap_remove(0);
                Box::new(first.into_iter().map(|p| vec![Arg::Path(p)]))
            }
            PairingStrategy::Zip => zip_listings(step, listings),
            PairingStrategy::Modulo => {
                let mut second = listings.pop().unwrap_or_default();
                let first = listings.pop().unwrap_or_default();
                second.shuffle(&mut self.rng);
                debug!(
                    "[{step}] modulo: {} files cycled over {} partners",
                    first.len(),
                    second.len()
                );
                Box::new(
                    first
                        .into_iter()
                        .enumerate()
                        .map(move |(i, p)| vec![Arg::Path(p), Arg::Path(second[i % second.len()].clone())]),
                )
            }
            PairingStrategy::Sample { first, second } => {
                let files = listings.swap_remove(0);
                let a = draw_subset(&mut self.rng, files.len(), *first);
                let b = draw_subset(&mut self.rng, files.len(), *second);
                Box::new(files.into_iter().enumerate().map(move |(i, p)| {
                    vec![
                        Arg::Path(p),
                        Arg::Flag(a.contains(&i)),
                        Arg::Flag(b.contains(&i)),
                    ]
                }))
            }
            PairingStrategy::Custom(f) => f.pair(listings),
        };
        Ok(iter)
    }

    /// Keep the same `k` random indices in every listing (listing order preserved).
    fn sample_listings(
        &mut self,
        step: &str,
        dirs: &[PathBuf],
        listings: Vec<Vec<PathBuf>>,
        k: usize,
    ) -> Result<Vec<Vec<PathBuf>>, StepError> {
        if let Some((i, l)) = listings.iter().enumerate().find(|(_, l)| l.len() < k) {
            return Err(StepError::SampleSizeExceedsListing {
                step: step.to_string(),
                k,
                len: l.len(),
                dir: dirs.get(i).cloned().unwrap_or_default(),
            });
        }
        let range = listings.iter().map(Vec::len).min().unwrap_or(0);
        let mut picked = index::sample(&mut self.rng, range, k).into_vec();
        picked.sort_unstable();
        debug!("[{step}] sampled {k} of {range} items");
        Ok(listings
            .into_iter()
            .map(|l| picked.iter().map(|&i| l[i].clone()).collect())
            .collect())
    }
}

/// floor(len * ratio) distinct indices out of `0..len`.
fn draw_subset(rng: &mut StdRng, len: usize, ratio: f64) -> HashSet<usize> {
    let amount = ((len as f64) * ratio).floor() as usize;
    index::sample(rng, len, amount.min(len)).into_iter().collect()
}

fn zip_listings(step: &str, listings: Vec<Vec<PathBuf>>) -> ArgIter {
    let shortest = listings.iter().map(Vec::len).min().unwrap_or(0);
    let dropped: usize = listings.iter().map(|l| l.len() - shortest).sum();
    if dropped > 0 {
        warn!("[{step}] zip: listings differ in length; {dropped} trailing files ignored");
    }
    Box::new((0..shortest).map(move |i| {
        listings
            .iter()
            .map(|l| Arg::Path(l[i].clone()))
            .collect()
    }))
}
