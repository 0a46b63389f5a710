//! Binomial tails for the trust thresholds, and Phred-scale conversions.

/// Upper-tail mass allowed before a window count stops looking like noise.
/// Matches the Lighter threshold table.
pub const TRUST_EPSILON: f64 = 0.01;

/// Largest quality score we will ever emit.
pub const MAX_QUAL: u8 = 93;

/// P(X <= t) for X ~ Binomial(n, p), summed directly. Window counts are at
/// most MAX_K so there is no need for log-space accumulation.
pub fn binom_cdf(t: u32, n: u32, p: f64) -> f64 {
    debug_assert!((0.0..1.0).contains(&p));
    let q = 1.0 - p;
    let mut pmf = q.powi(n as i32);
    let mut cdf = pmf;
    for i in 0..t.min(n) {
        pmf *= f64::from(n - i) / f64::from(i + 1) * p / q;
        cdf += pmf;
    }
    cdf.min(1.0)
}

/// Per-window-count trust thresholds for windows of 0..=k overlapping
/// k-mers. `threshold[w]` is the smallest count t whose cumulative
/// probability under Binomial(w, p) reaches 1 - epsilon: a base whose covering
/// k-mers score below it is consistent with a sequencing error, given that
/// an erroneous k-mer hits the sample filter with probability `p`.
pub fn trust_thresholds(k: usize, p: f64) -> Vec<u32> {
    let mut thresholds = Vec::with_capacity(k + 1);
    thresholds.push(0);
    for w in 1..=k as u32 {
        let mut t = 0;
        while binom_cdf(t, w, p) < 1.0 - TRUST_EPSILON {
            t += 1;
        }
        thresholds.push(t);
    }
    thresholds
}

/// Phred scale: -10*log10(p).
pub fn phred(p: f64) -> f64 {
    -10.0 * p.log10()
}

/// Rounded Phred score clamped to the printable quality range.
pub fn ephred(p: f64) -> i32 {
    phred(p).round().max(0.0).min(f64::from(MAX_QUAL)) as i32
}
