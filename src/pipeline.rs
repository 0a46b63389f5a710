//! The sequential passes over the input: subsample k-mers, promote trusted
//! ones, label errors and train, then rewrite qualities.

use crate::bloom::FilterArray;
use crate::covariates::{CovariateData, DeltaQuals};
use crate::error::Error;
use crate::hts::HtsFile;
use crate::kmer::hash_seq;
use log::{debug, warn};
use rand::distributions::{Bernoulli, Distribution};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

type Result<T> = std::result::Result<T, Error>;

/// Loads each k-mer occurrence into the sample filter with independent
/// probability `alpha`. The same seed over the same input reproduces the
/// filter bit for bit.
pub fn subsample_kmers(
    file: &mut HtsFile,
    sampled: &mut FilterArray,
    k: usize,
    alpha: f64,
    seed: u64,
) -> Result<()> {
    let coin = Bernoulli::new(alpha)
        .map_err(|_| Error::InvalidArgument(format!("sampling rate {} is not in (0, 1]", alpha)))?;
    let mut rng = StdRng::seed_from_u64(seed);
    while let Some(read) = file.next_read()? {
        for hash in hash_seq(&read.seq, k) {
            if coin.sample(&mut rng) {
                sampled.insert(hash);
            }
        }
    }
    Ok(())
}

/// Infers provisional errors from the sample filter and promotes every
/// clean k-mer into the trusted filter.
pub fn find_trusted_kmers(
    file: &mut HtsFile,
    trusted: &mut FilterArray,
    sampled: &FilterArray,
    thresholds: &[u32],
    k: usize,
) -> Result<()> {
    while let Some(mut read) = file.next_read()? {
        read.infer_errors(sampled, thresholds, k);
        read.mark_trusted(trusted, k);
    }
    Ok(())
}

/// Labels every read against the trusted filter and accumulates covariate
/// tallies. Returns the tallies and the ordinals of reads that could not
/// be labelled: shorter than k, no trusted anchor, or over the error
/// budget. Those contribute nothing and keep their qualities.
pub fn collect_covariates(
    file: &mut HtsFile,
    trusted: &FilterArray,
    k: usize,
) -> Result<(CovariateData, HashSet<u64>)> {
    let mut data = CovariateData::default();
    let mut unlabelled = HashSet::new();
    let mut ordinal = 0u64;
    while let Some(mut read) = file.next_read()? {
        if read.label_errors(trusted, k) {
            data.consume_read(&read);
        } else {
            debug!("read {} could not be labelled, leaving it alone", read.name);
            unlabelled.insert(ordinal);
        }
        ordinal += 1;
    }
    if !unlabelled.is_empty() {
        warn!(
            "{} of {} reads could not be labelled and were excluded from training",
            unlabelled.len(),
            ordinal
        );
    }
    Ok((data, unlabelled))
}

/// Ground-truth labelling: errors are the positions where the read
/// disagrees with its corrected counterpart in the paired file.
pub fn covariates_from_fixed(file: &mut HtsFile, fixed: &mut HtsFile) -> Result<CovariateData> {
    let mut data = CovariateData::default();
    while let (Some(mut read), Some(truth)) = (file.next_read()?, fixed.next_read()?) {
        let len = read.seq.len();
        let mut errors = vec![false; len];
        for j in 0..len.min(truth.seq.len()) {
            errors[j] = read.seq[j] != truth.seq[j];
        }
        read.errors = errors;
        data.consume_read(&read);
    }
    Ok(data)
}

/// Final pass: rewrite every record with recalibrated qualities, skipping
/// the reads the labelling pass gave up on.
pub fn recalibrate_and_write(
    file: &mut HtsFile,
    dqs: &DeltaQuals,
    unlabelled: &HashSet<u64>,
) -> Result<()> {
    file.open_out()?;
    let mut ordinal = 0u64;
    while let Some(read) = file.next_read()? {
        let quals = if unlabelled.contains(&ordinal) {
            read.quals.clone()
        } else {
            dqs.recalibrate(&read)
        };
        file.write(&read, &quals)?;
        ordinal += 1;
    }
    Ok(())
}
