//! A sequencing read as the pipeline sees it, with the per-base error
//! state threaded through the passes.

use crate::bloom::FilterArray;
use crate::correct;
use crate::kmer::KmerWindow;

/// One read borrowed from the input for the duration of a pass.
#[derive(Debug, Clone)]
pub struct ReadData {
    pub name: String,
    pub seq: Vec<u8>,
    /// Raw Phred scores, no ASCII offset.
    pub quals: Vec<u8>,
    pub rg: String,
    pub second_in_pair: bool,
    /// Per-base error labels; all false until a labelling pass runs.
    pub errors: Vec<bool>,
    /// Per-window trust marks from the promotion pass, one per k-mer start.
    pub trusted_kmer: Vec<bool>,
}

impl ReadData {
    pub fn new(name: String, seq: Vec<u8>, quals: Vec<u8>, rg: String, second_in_pair: bool) -> Self {
        let len = seq.len();
        Self {
            name,
            seq,
            quals,
            rg,
            second_in_pair,
            errors: vec![false; len],
            trusted_kmer: Vec::new(),
        }
    }

    /// Provisional labelling against the sample filter: a base is suspect
    /// when fewer of its covering k-mers were sampled than the threshold
    /// for that many windows allows.
    pub fn infer_errors(&mut self, sampled: &FilterArray, thresholds: &[u32], k: usize) {
        let (hits, covering) = correct::window_tally(&self.seq, sampled, k);
        self.errors = hits
            .iter()
            .zip(&covering)
            .map(|(&h, &c)| h < thresholds[c as usize])
            .collect();
    }

    /// Promotes every k-mer whose bases are all unsuspect into the trusted
    /// filter, recording which windows qualified.
    pub fn mark_trusted(&mut self, trusted: &mut FilterArray, k: usize) {
        let len = self.seq.len();
        self.trusted_kmer = vec![false; (len + 1).saturating_sub(k)];
        let mut win = KmerWindow::new(k);
        let mut clean = 0usize;
        for i in 0..len {
            let hash = win.push(self.seq[i]);
            if !self.errors[i] {
                clean += 1;
            }
            if i >= k && !self.errors[i - k] {
                clean -= 1;
            }
            if let Some(hash) = hash {
                if clean == k {
                    trusted.insert(hash);
                    self.trusted_kmer[i + 1 - k] = true;
                }
            }
        }
    }

    /// Final labelling against the trusted filter. Returns false when the
    /// read could not be labelled (shorter than k, no trusted anchor, or
    /// over the error budget); its labels are cleared so such a read is
    /// never mistaken for a verified error-free one.
    pub fn label_errors(&mut self, trusted: &FilterArray, k: usize) -> bool {
        match correct::label_errors(&self.seq, trusted, k, correct::MAX_READ_ERRORS) {
            Some(errors) => {
                self.errors = errors;
                true
            }
            None => {
                self.errors = vec![false; self.seq.len()];
                false
            }
        }
    }
}
