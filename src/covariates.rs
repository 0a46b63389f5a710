//! Covariate tallies and the hierarchical Δ-quality model.
//!
//! Observations and errors are binned by read group, reported quality,
//! cycle, and dinucleotide context. Training walks the hierarchy from the
//! read-group mean downward, each level storing only its residual against
//! the levels above, so sparse bins fall back to their parents.

use crate::kmer::SEQ_NT4;
use crate::read::ReadData;
use crate::stats::{ephred, MAX_QUAL};
use std::collections::HashMap;

const NDINUC: usize = 16;

/// One (observations, errors) pair.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Tally {
    pub obs: u64,
    pub errs: u64,
}

impl Tally {
    fn push(&mut self, err: bool) {
        self.obs += 1;
        self.errs += u64::from(err);
    }

    /// Residual Phred of the observed error rate against `prior`, with a
    /// +1 pseudocount so empty and error-free bins stay finite. Unobserved
    /// bins contribute nothing.
    fn delta(&self, prior: i32) -> i32 {
        if self.obs == 0 {
            return 0;
        }
        ephred((self.errs + 1) as f64 / (self.obs + 1) as f64) - prior
    }
}

fn grow<T: Default + Clone>(v: &mut Vec<T>, len: usize) {
    if v.len() < len {
        v.resize(len, T::default());
    }
}

/// Accumulated error counts over one labelling pass, indexed by read group
/// then the finer covariates. Read groups are interned in order of first
/// appearance.
#[derive(Debug, Default)]
pub struct CovariateData {
    rg_names: Vec<String>,
    rg_index: HashMap<String, usize>,
    rgcov: Vec<Tally>,
    qcov: Vec<Vec<Tally>>,
    cycov: Vec<Vec<[Vec<Tally>; 2]>>,
    dicov: Vec<Vec<[Tally; NDINUC]>>,
}

impl CovariateData {
    fn intern_rg(&mut self, name: &str) -> usize {
        if let Some(&i) = self.rg_index.get(name) {
            return i;
        }
        let i = self.rg_names.len();
        self.rg_names.push(name.to_string());
        self.rg_index.insert(name.to_string(), i);
        self.rgcov.push(Tally::default());
        self.qcov.push(Vec::new());
        self.cycov.push(Vec::new());
        self.dicov.push(Vec::new());
        i
    }

    /// Folds one labelled read into the tallies. The first base has no
    /// dinucleotide context and is skipped entirely; bases whose context
    /// contains an N skip only the dinucleotide bin.
    pub fn consume_read(&mut self, read: &ReadData) {
        let rg = self.intern_rg(&read.rg);
        let len = read.seq.len();
        for j in 1..len {
            let q = usize::from(read.quals[j]);
            let err = read.errors[j];
            let strand = usize::from(j >= len / 2);
            let cycle = if strand == 0 { j } else { len - 1 - j };
            self.rgcov[rg].push(err);
            grow(&mut self.qcov[rg], q + 1);
            self.qcov[rg][q].push(err);
            grow(&mut self.cycov[rg], q + 1);
            grow(&mut self.cycov[rg][q][strand], cycle + 1);
            self.cycov[rg][q][strand][cycle].push(err);
            grow(&mut self.dicov[rg], q + 1);
            let prev = SEQ_NT4[read.seq[j - 1] as usize];
            let cur = SEQ_NT4[read.seq[j] as usize];
            if prev < 4 && cur < 4 {
                self.dicov[rg][q][usize::from(prev << 2 | cur)].push(err);
            }
        }
    }

    /// Trains the Δ-quality tables, consuming the tallies.
    pub fn into_dqs(self) -> DeltaQuals {
        let nrg = self.rg_names.len();
        let mut meanq = vec![0i32; nrg];
        let mut rgdq = vec![0i32; nrg];
        let mut qscoredq = Vec::with_capacity(nrg);
        let mut cycledq = Vec::with_capacity(nrg);
        let mut dinucdq = Vec::with_capacity(nrg);
        for rg in 0..nrg {
            let (mut qsum, mut n) = (0u64, 0u64);
            for (q, tally) in self.qcov[rg].iter().enumerate() {
                qsum += q as u64 * tally.obs;
                n += tally.obs;
            }
            meanq[rg] = if n == 0 {
                0
            } else {
                (qsum as f64 / n as f64).round() as i32
            };
            rgdq[rg] = self.rgcov[rg].delta(meanq[rg]);
            let rg_prior = meanq[rg] + rgdq[rg];
            let qdq: Vec<i32> = self.qcov[rg].iter().map(|t| t.delta(rg_prior)).collect();
            let cydq: Vec<[Vec<i32>; 2]> = self.cycov[rg]
                .iter()
                .enumerate()
                .map(|(q, strands)| {
                    let prior = rg_prior + qdq[q];
                    [
                        strands[0].iter().map(|t| t.delta(prior)).collect(),
                        strands[1].iter().map(|t| t.delta(prior)).collect(),
                    ]
                })
                .collect();
            let didq: Vec<[i32; NDINUC]> = self.dicov[rg]
                .iter()
                .enumerate()
                .map(|(q, dinucs)| {
                    let prior = rg_prior + qdq[q];
                    let mut deltas = [0i32; NDINUC];
                    for (d, tally) in dinucs.iter().enumerate() {
                        deltas[d] = tally.delta(prior);
                    }
                    deltas
                })
                .collect();
            qscoredq.push(qdq);
            cycledq.push(cydq);
            dinucdq.push(didq);
        }
        DeltaQuals {
            rg_names: self.rg_names,
            rg_index: self.rg_index,
            meanq,
            rgdq,
            qscoredq,
            cycledq,
            dinucdq,
        }
    }
}

/// The trained model: per-level quality residuals mirroring the tally
/// shapes, immutable once built.
#[derive(Debug)]
pub struct DeltaQuals {
    rg_names: Vec<String>,
    rg_index: HashMap<String, usize>,
    meanq: Vec<i32>,
    rgdq: Vec<i32>,
    qscoredq: Vec<Vec<i32>>,
    cycledq: Vec<Vec<[Vec<i32>; 2]>>,
    dinucdq: Vec<Vec<[i32; NDINUC]>>,
}

impl DeltaQuals {
    pub fn rg(&self, name: &str) -> Option<usize> {
        self.rg_index.get(name).copied()
    }

    pub fn rg_names(&self) -> &[String] {
        &self.rg_names
    }

    /// New quality string for a read: the sum of the levels at each base,
    /// clamped to the printable range. A read group never seen in training
    /// passes through unchanged.
    pub fn recalibrate(&self, read: &ReadData) -> Vec<u8> {
        let rg = match self.rg(&read.rg) {
            Some(rg) => rg,
            None => return read.quals.clone(),
        };
        let len = read.seq.len();
        (0..len)
            .map(|j| {
                let q = usize::from(read.quals[j]);
                let strand = usize::from(j >= len / 2);
                let cycle = if strand == 0 { j } else { len - 1 - j };
                let mut new_q = self.meanq[rg]
                    + self.rgdq[rg]
                    + self.qscoredq[rg].get(q).copied().unwrap_or(0)
                    + self.cycledq[rg]
                        .get(q)
                        .map_or(0, |s| s[strand].get(cycle).copied().unwrap_or(0));
                if j > 0 {
                    let prev = SEQ_NT4[read.seq[j - 1] as usize];
                    let cur = SEQ_NT4[read.seq[j] as usize];
                    if prev < 4 && cur < 4 {
                        new_q += self.dinucdq[rg]
                            .get(q)
                            .map_or(0, |d| d[usize::from(prev << 2 | cur)]);
                    }
                }
                new_q.max(0).min(i32::from(MAX_QUAL)) as u8
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::ReadData;

    fn read(seq: &[u8], qual: u8, rg: &str, error_at: &[usize]) -> ReadData {
        let mut read = ReadData::new(
            "r".to_string(),
            seq.to_vec(),
            vec![qual; seq.len()],
            rg.to_string(),
            false,
        );
        for &j in error_at {
            read.errors[j] = true;
        }
        read
    }

    #[test]
    fn test_ten_percent_errors_train_to_q10() {
        // 10 reads of 101 bases at Q30; 100 counted bases each, 10 in error
        let mut data = CovariateData::default();
        let seq: Vec<u8> = b"ACGT".iter().cycle().take(101).copied().collect();
        let errors: Vec<usize> = (1..=10).collect();
        for _ in 0..10 {
            data.consume_read(&read(&seq, 30, "A", &errors));
        }
        assert_eq!(data.rgcov[0], Tally { obs: 1000, errs: 100 });
        let dqs = data.into_dqs();
        let rg = dqs.rg("A").unwrap();
        assert_eq!(dqs.meanq[rg], 30);
        assert_eq!(dqs.meanq[rg] + dqs.rgdq[rg] + dqs.qscoredq[rg][30], 10);
    }

    #[test]
    fn test_first_base_is_not_counted() {
        let mut data = CovariateData::default();
        data.consume_read(&read(b"ACGTACGTA", 20, "A", &[]));
        assert_eq!(data.rgcov[0].obs, 8);
    }

    #[test]
    fn test_n_context_skips_dinucleotide_only() {
        let mut data = CovariateData::default();
        data.consume_read(&read(b"ANGT", 20, "A", &[]));
        assert_eq!(data.rgcov[0].obs, 3);
        let counted: u64 = data.dicov[0][20].iter().map(|t| t.obs).sum();
        // only the GT pair has an unambiguous context
        assert_eq!(counted, 1);
        let gt = usize::from(SEQ_NT4[b'G' as usize] << 2 | SEQ_NT4[b'T' as usize]);
        assert_eq!(data.dicov[0][20][gt].obs, 1);
    }

    #[test]
    fn test_cycle_counts_from_nearer_end() {
        let mut data = CovariateData::default();
        data.consume_read(&read(b"ACGTACGT", 20, "A", &[]));
        // j = 1..=3 tally forward cycles, j = 4..=7 reverse cycles 3..=0
        assert_eq!(data.cycov[0][20][0][1].obs, 1);
        assert_eq!(data.cycov[0][20][0][3].obs, 1);
        assert_eq!(data.cycov[0][20][1][0].obs, 1);
        assert_eq!(data.cycov[0][20][1][3].obs, 1);
    }

    #[test]
    fn test_recalibrate_preserves_length() {
        let mut data = CovariateData::default();
        let r = read(b"ACGTACGTACGT", 25, "A", &[4]);
        data.consume_read(&r);
        let dqs = data.into_dqs();
        assert_eq!(dqs.recalibrate(&r).len(), r.quals.len());
    }

    #[test]
    fn test_unknown_read_group_passes_through() {
        let mut data = CovariateData::default();
        data.consume_read(&read(b"ACGTACGT", 20, "A", &[]));
        let dqs = data.into_dqs();
        let other = read(b"ACGTACGT", 33, "B", &[]);
        assert_eq!(dqs.recalibrate(&other), vec![33; 8]);
    }

    #[test]
    fn test_uniform_miscalibration_corrects_every_base() {
        // Q30 reported, 10% true error rate spread evenly over cycles and
        // contexts: every level should agree and each base lands on Q10
        let mut data = CovariateData::default();
        let seq: Vec<u8> = b"ACGT".iter().cycle().take(101).copied().collect();
        for r in 0..100usize {
            let errors: Vec<usize> = (1..=100).filter(|j| (j + r) % 10 == 0).collect();
            data.consume_read(&read(&seq, 30, "A", &errors));
        }
        let dqs = data.into_dqs();
        let recal = dqs.recalibrate(&read(&seq, 30, "A", &[]));
        assert_eq!(recal, vec![10; 101]);
    }

    #[test]
    fn test_rg_interning_order() {
        let mut data = CovariateData::default();
        data.consume_read(&read(b"ACGT", 10, "lane2", &[]));
        data.consume_read(&read(b"ACGT", 10, "lane1", &[]));
        data.consume_read(&read(b"ACGT", 10, "lane2", &[]));
        let dqs = data.into_dqs();
        assert_eq!(dqs.rg_names(), ["lane2".to_string(), "lane1".to_string()]);
        assert_eq!(dqs.rg("lane2"), Some(0));
        assert_eq!(dqs.rg("lane1"), Some(1));
    }
}
