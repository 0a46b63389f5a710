#![warn(missing_debug_implementations, rust_2018_idioms, missing_docs)]
#![allow(dead_code)]
//! Reference-free base quality score recalibration. K-mers sampled from the
//! reads stand in for the genome: k-mers seen often enough are trusted,
//! bases that break trust are labelled errors, and empirical error rates
//! per read group, quality, cycle and context retrain the quality scores.

mod bloom;
mod cli;
mod correct;
mod covariates;
mod error;
mod hts;
mod kmer;
mod pipeline;
mod read;
mod stats;

use crate::bloom::FilterArray;
use crate::error::Error;
use crate::hts::{HtsFile, OpenOptions};
use log::{debug, info};
use rand::Rng;
use std::collections::HashSet;
use std::path::Path;
use structopt::StructOpt;

type Result<T> = std::result::Result<T, Error>;

/// Sampled k-mer occurrences per genome position that saturate the sample
/// filter; 7/coverage is the rate the Lighter authors recommend.
const TARGET_SAMPLE_RATE: f64 = 7.0;

/// Sizing false positive rates for the two filters. Both are significant:
/// they fix the filter geometry and with it which k-mers collide.
const SAMPLE_FPR: f64 = 0.01;
const TRUSTED_FPR: f64 = 0.0005;

/// A realized sample FPR above this means the genome length (and with it
/// the filter size) was badly underestimated.
const MAX_SAMPLE_FPR: f64 = 0.15;

fn main() -> Result<()> {
    let opt = cli::Requal::from_args();
    opt.set_logging();

    let k = opt.ksize;
    if k < 1 || k > kmer::MAX_K {
        return Err(Error::InvalidArgument(format!(
            "k must be between 1 and {}, got {}",
            kmer::MAX_K,
            k
        )));
    }
    let options = OpenOptions {
        use_oq: opt.use_oq,
        set_oq: opt.set_oq,
        threads: opt.threads,
    };

    let mut unlabelled = HashSet::new();
    let data = if let Some(fixed) = &opt.fixed {
        info!("using {} as ground truth", fixed.display());
        let mut file = HtsFile::open(&opt.input, &options)?;
        let mut fixedfile = HtsFile::open(fixed, &options)?;
        pipeline::covariates_from_fixed(&mut file, &mut fixedfile)?
    } else {
        let genomelen = genome_length(&opt, &options)?;
        let (alpha, coverage) = sampling_rate(&opt, &options, genomelen)?;
        info!("sampling k-mers at rate {:.4}", alpha);

        // worst case every k-mer occurrence is unique, of which we sample
        // a proportion alpha
        let approx_kmers = (genomelen as f64 * f64::from(coverage) * alpha) as u64;
        let mut sampled = FilterArray::for_elements(approx_kmers, SAMPLE_FPR);
        let seed = opt.seed.unwrap_or_else(|| rand::thread_rng().gen());
        info!("subsampler seed: {}", seed);
        let mut file = HtsFile::open(&opt.input, &options)?;
        pipeline::subsample_kmers(&mut file, &mut sampled, k, alpha, seed)?;
        info!("sampled {} k-mer occurrences", sampled.ninserts());

        let fpr = sampled.fprate();
        info!("sample filter false positive rate: {:.5}", fpr);
        if fpr > MAX_SAMPLE_FPR {
            return Err(Error::ParameterOutOfRange(fpr));
        }

        let p = bloom::phit(&sampled, alpha);
        let thresholds = stats::trust_thresholds(k, p);
        debug!("hit probability {:.4}, thresholds {:?}", p, thresholds);

        info!("finding trusted k-mers");
        let mut trusted = FilterArray::for_elements(approx_kmers, TRUSTED_FPR);
        let mut file = HtsFile::open(&opt.input, &options)?;
        pipeline::find_trusted_kmers(&mut file, &mut trusted, &sampled, &thresholds, k)?;

        info!("labelling errors");
        let mut file = HtsFile::open(&opt.input, &options)?;
        let (data, skipped) = pipeline::collect_covariates(&mut file, &trusted, k)?;
        unlabelled = skipped;
        data
    };

    info!("training the recalibration model");
    let dqs = data.into_dqs();
    for (i, name) in dqs.rg_names().iter().enumerate() {
        debug!("read group {}: {}", i, name);
    }

    info!("recalibrating");
    let mut file = HtsFile::open(&opt.input, &options)?;
    pipeline::recalibrate_and_write(&mut file, &dqs, &unlabelled)
}

/// Genome length from the flag or the BAM header.
fn genome_length(opt: &cli::Requal, options: &OpenOptions) -> Result<u64> {
    if let Some(genomelen) = opt.genomelen {
        if genomelen == 0 {
            return Err(Error::InvalidArgument("--genomelen must be positive".to_string()));
        }
        return Ok(genomelen);
    }
    let file = HtsFile::open(&opt.input, options)?;
    match file.genome_length() {
        Some(genomelen) if genomelen > 0 => {
            info!("genome length from the header: {} bp", genomelen);
            Ok(genomelen)
        }
        Some(_) => Err(Error::EmptyInput(
            "the header carries no genome information; provide --genomelen".to_string(),
        )),
        None => Err(Error::InvalidArgument(
            "--genomelen is required for FASTQ input".to_string(),
        )),
    }
}

/// Resolves the sampling rate and coverage, estimating coverage with a
/// pass over the input when neither was given.
fn sampling_rate(
    opt: &cli::Requal,
    options: &OpenOptions,
    genomelen: u64,
) -> Result<(f64, u32)> {
    if let Some(alpha) = opt.alpha {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(Error::InvalidArgument(format!(
                "sampling rate {} is not in (0, 1]",
                alpha
            )));
        }
        let coverage = opt
            .coverage
            .unwrap_or((TARGET_SAMPLE_RATE / alpha).ceil() as u32);
        return Ok((alpha, coverage));
    }
    let coverage = match opt.coverage {
        Some(coverage) if coverage > 0 => coverage,
        _ => estimate_coverage(&opt.input, options, genomelen)?,
    };
    Ok(((TARGET_SAMPLE_RATE / f64::from(coverage)).min(1.0), coverage))
}

fn estimate_coverage(input: &Path, options: &OpenOptions, genomelen: u64) -> Result<u32> {
    info!("estimating coverage");
    let mut file = HtsFile::open(input, options)?;
    let mut seqlen = 0u64;
    while let Some(len) = file.next_len()? {
        seqlen += len as u64;
    }
    if seqlen == 0 {
        return Err(Error::EmptyInput(format!(
            "total sequence length in {} is 0",
            input.display()
        )));
    }
    info!("total sequence length: {} bp", seqlen);
    let coverage = (seqlen / genomelen) as u32;
    info!("estimated coverage: {}", coverage);
    if coverage == 0 {
        return Err(Error::EmptyInput(
            "estimated coverage is 0; is --genomelen too large?".to_string(),
        ));
    }
    Ok(coverage)
}
