//! Per-read error detection against a trusted k-mer filter.
//!
//! A read is labelled by finding its longest stretch of consecutive trusted
//! k-mers (the anchor), then walking outward one base at a time. A base
//! whose window is untrusted is tested under the three substitute bases; a
//! unique substitution that restores trust marks the base as an error.

use crate::bloom::FilterArray;
use crate::kmer::{KmerWindow, SEQ_NT4};
use bio::alphabets::dna;

/// Fix attempts allowed per read before it is declared unlabellable.
pub const MAX_READ_ERRORS: usize = 6;

const BASES: [u8; 4] = [b'A', b'C', b'G', b'T'];

/// Per-base tallies over the k-mer windows covering each position: how many
/// of them are valid, and how many of those are present in `bf`. The walk
/// keeps a running count over the last k window slots and drains it past
/// the end of the read so edge bases see exactly their covering windows.
pub fn window_tally(seq: &[u8], bf: &FilterArray, k: usize) -> (Vec<u32>, Vec<u32>) {
    let len = seq.len();
    let mut possible = vec![false; len];
    let mut present = vec![false; len];
    let mut hits = vec![0u32; len];
    let mut covering = vec![0u32; len];
    let mut win = KmerWindow::new(k);
    let (mut n_in, mut n_out) = (0u32, 0u32);
    for i in 0..len + k - 1 {
        if i < len {
            if let Some(h) = win.push(seq[i]) {
                possible[i] = true;
                let hit = bf.query(h);
                present[i] = hit;
                if hit {
                    n_in += 1;
                } else {
                    n_out += 1;
                }
            }
        }
        // the window ending k slots back no longer covers base i-k+1
        if i >= k && possible[i - k] {
            if present[i - k] {
                n_in -= 1;
            } else {
                n_out -= 1;
            }
        }
        if i + 1 >= k && i + 1 - k < len {
            hits[i + 1 - k] = n_in;
            covering[i + 1 - k] = n_in + n_out;
        }
    }
    (hits, covering)
}

/// Base span of the longest run of consecutive windows present in `bf`,
/// or None when no window is.
pub fn find_anchor(seq: &[u8], bf: &FilterArray, k: usize) -> Option<(usize, usize)> {
    let mut best: Option<(usize, usize, usize)> = None;
    let mut run = 0usize;
    let mut win = KmerWindow::new(k);
    for (i, &b) in seq.iter().enumerate() {
        if win.push(b).map_or(false, |h| bf.query(h)) {
            run += 1;
            if best.map_or(true, |(_, _, r)| run > r) {
                best = Some((i + 1 - k - (run - 1), i, run));
            }
        } else {
            run = 0;
        }
    }
    best.map(|(start, end, _)| (start, end))
}

/// Bases consumed from `buf` before the first untrusted window or N, or
/// None when not even the first complete window is trusted.
fn fix_score(buf: &[u8], trusted: &FilterArray, k: usize) -> Option<usize> {
    let mut win = KmerWindow::new(k);
    let mut nwin = 0usize;
    for (i, &b) in buf.iter().enumerate() {
        if SEQ_NT4[b as usize] >= 4 {
            return if nwin == 0 { None } else { Some(i) };
        }
        if let Some(h) = win.push(b) {
            if !trusted.query(h) {
                return if nwin == 0 { None } else { Some(i) };
            }
            nwin += 1;
        }
    }
    if nwin == 0 {
        None
    } else {
        Some(buf.len())
    }
}

/// Greedy speculative extension of a fully-trusted buffer: keep appending
/// whichever base yields a trusted window, up to 2k-1 bases total. Returns
/// the extended length reached.
fn speculative_score(buf: &[u8], trusted: &FilterArray, k: usize) -> usize {
    let mut len = buf.len();
    let mut win = KmerWindow::new(k);
    for &b in buf {
        win.push(b);
    }
    while len < 2 * k - 1 {
        let mut advanced = false;
        for &x in &BASES {
            let mut probe = win;
            if let Some(h) = probe.push(x) {
                if trusted.query(h) {
                    win = probe;
                    len += 1;
                    advanced = true;
                    break;
                }
            }
        }
        if !advanced {
            break;
        }
    }
    len
}

/// Substitutes each non-original base at offset k-1 of `buf` (the window's
/// last base) and scores how far the windows stay trusted. Returns every
/// base achieving the longest extension; ties that reach the end of the
/// buffer are broken by speculative extension past it.
pub fn find_longest_fix(buf: &[u8], trusted: &FilterArray, k: usize) -> Vec<u8> {
    debug_assert!(buf.len() >= k);
    let original = buf[k - 1];
    let mut cand = buf.to_vec();
    let mut best = 0usize;
    let mut winners: Vec<u8> = Vec::new();
    for &base in &BASES {
        if base == original {
            continue;
        }
        cand[k - 1] = base;
        if let Some(score) = fix_score(&cand, trusted, k) {
            if score > best {
                best = score;
                winners.clear();
            }
            if score == best {
                winners.push(base);
            }
        }
    }
    if best == buf.len() && winners.len() > 1 && buf.len() < 2 * k - 1 {
        let mut top = 0usize;
        let mut scored = Vec::with_capacity(winners.len());
        for &base in &winners {
            cand.copy_from_slice(buf);
            cand[k - 1] = base;
            let score = speculative_score(&cand, trusted, k);
            top = top.max(score);
            scored.push((base, score));
        }
        winners = scored
            .into_iter()
            .filter(|&(_, s)| s == top)
            .map(|(base, _)| base)
            .collect();
    }
    winners
}

/// Walks rightward from `from`, marking errors and applying unique fixes to
/// the working sequence. Returns false once the error budget is exhausted.
fn extend(
    seq: &mut Vec<u8>,
    errors: &mut [bool],
    from: usize,
    trusted: &FilterArray,
    k: usize,
    nerr: &mut usize,
    max_errors: usize,
) -> bool {
    let len = seq.len();
    for i in from..len {
        let wstart = i + 1 - k;
        let mut win = KmerWindow::new(k);
        let mut h = None;
        for &b in &seq[wstart..=i] {
            h = win.push(b);
        }
        if h.map_or(false, |h| trusted.query(h)) {
            continue;
        }
        let end = (wstart + 2 * k - 1).min(len);
        let winners = find_longest_fix(&seq[wstart..end], trusted, k);
        match winners.as_slice() {
            [] => {}
            [fix] => {
                seq[i] = *fix;
                errors[i] = true;
                *nerr += 1;
            }
            _ if !winners.contains(&seq[i]) => {
                // several fixes tie and none is the read's own base: the
                // base is wrong but the replacement is unknowable, so mark
                // it without committing a substitution
                errors[i] = true;
                *nerr += 1;
            }
            _ => {}
        }
        if *nerr > max_errors {
            return false;
        }
    }
    true
}

/// Labels every base of `seq` as error or not against the trusted filter.
/// Returns None when the read cannot be labelled: too short to hold a
/// k-mer, no trusted window to anchor on, or more than `max_errors` fixes
/// needed. Unlabellable reads must not be mistaken for error-free ones.
pub fn label_errors(
    seq: &[u8],
    trusted: &FilterArray,
    k: usize,
    max_errors: usize,
) -> Option<Vec<bool>> {
    let len = seq.len();
    if len < k {
        return None;
    }
    let (astart, aend) = find_anchor(seq, trusted, k)?;
    let mut errors = vec![false; len];
    let mut work = seq.to_vec();
    let mut nerr = 0usize;
    if !extend(&mut work, &mut errors, aend + 1, trusted, k, &mut nerr, max_errors) {
        return None;
    }
    // leftward pass: canonical hashes are strand-symmetric, so extending the
    // reverse complement rightward is the mirror walk
    let mut rc = dna::revcomp(&work[..]);
    let mut rc_errors = vec![false; len];
    if !extend(
        &mut rc,
        &mut rc_errors,
        len - astart,
        trusted,
        k,
        &mut nerr,
        max_errors,
    ) {
        return None;
    }
    for (j, &e) in rc_errors.iter().enumerate() {
        if e {
            errors[len - 1 - j] = true;
        }
    }
    Some(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bloom::insert_seq;

    const K: usize = 32;
    const SEQ: &[u8] =
        b"GCTAAAGACAATTACATAACATACACGTCAGCACGAAACTTGTTGGCCCAGTGTGAATCGCTTAAGGGTTAAGTAAGTGTGATGCATACGCCTTTACTTG";

    fn trusted_with_seq() -> FilterArray {
        let mut bf = FilterArray::with_params(9, 11);
        insert_seq(&mut bf, SEQ, K);
        bf
    }

    fn mutated(pos: usize, to: u8) -> Vec<u8> {
        let mut seq = SEQ.to_vec();
        assert_ne!(seq[pos], to);
        seq[pos] = to;
        seq
    }

    fn error_positions(errors: &[bool]) -> Vec<usize> {
        errors
            .iter()
            .enumerate()
            .filter_map(|(i, &e)| if e { Some(i) } else { None })
            .collect()
    }

    #[test]
    fn test_window_tally_fully_trusted() {
        let bf = trusted_with_seq();
        let (hits, covering) = window_tally(SEQ, &bf, K);
        assert_eq!(hits, covering);
        // interior bases are covered by all k windows, edges by fewer
        assert_eq!(covering[0], 1);
        assert_eq!(covering[31], 32);
        assert_eq!(covering[50], 32);
        assert_eq!(covering[99], 1);
    }

    #[test]
    fn test_window_tally_empty_filter() {
        let bf = FilterArray::with_params(9, 11);
        let (hits, covering) = window_tally(SEQ, &bf, K);
        assert!(hits.iter().all(|&h| h == 0));
        assert_eq!(covering[49], 32);
    }

    #[test]
    fn test_window_tally_short_read() {
        let bf = FilterArray::with_params(9, 11);
        let (hits, covering) = window_tally(b"ACGT", &bf, K);
        assert_eq!(hits, vec![0; 4]);
        assert_eq!(covering, vec![0; 4]);
    }

    #[test]
    fn test_anchor_spans_whole_clean_read() {
        let bf = trusted_with_seq();
        assert_eq!(find_anchor(SEQ, &bf, K), Some((0, 99)));
        assert_eq!(find_anchor(SEQ, &FilterArray::with_params(9, 11), K), None);
    }

    #[test]
    fn test_anchor_stops_at_mutation() {
        let bf = trusted_with_seq();
        let seq = mutated(50, b'A');
        // windows touching base 50 are untrusted; the left flank wins
        let (start, end) = find_anchor(&seq, &bf, K).unwrap();
        assert_eq!((start, end), (0, 49));
    }

    #[test]
    fn test_label_clean_read() {
        let bf = trusted_with_seq();
        let errors = label_errors(SEQ, &bf, K, MAX_READ_ERRORS).unwrap();
        assert!(error_positions(&errors).is_empty());
    }

    #[test]
    fn test_label_single_substitution() {
        let bf = trusted_with_seq();
        let errors = label_errors(&mutated(50, b'A'), &bf, K, MAX_READ_ERRORS).unwrap();
        assert_eq!(error_positions(&errors), vec![50]);
    }

    #[test]
    fn test_label_error_near_start_uses_left_walk() {
        let bf = trusted_with_seq();
        let errors = label_errors(&mutated(10, b'C'), &bf, K, MAX_READ_ERRORS).unwrap();
        assert_eq!(error_positions(&errors), vec![10]);
    }

    #[test]
    fn test_label_error_at_first_base() {
        let bf = trusted_with_seq();
        let errors = label_errors(&mutated(0, b'A'), &bf, K, MAX_READ_ERRORS).unwrap();
        assert_eq!(error_positions(&errors), vec![0]);
    }

    #[test]
    fn test_label_two_substitutions() {
        let bf = trusted_with_seq();
        let mut seq = mutated(30, b'A');
        seq[70] = b'C';
        let errors = label_errors(&seq, &bf, K, MAX_READ_ERRORS).unwrap();
        assert_eq!(error_positions(&errors), vec![30, 70]);
    }

    #[test]
    fn test_label_short_read_is_unlabellable() {
        let bf = trusted_with_seq();
        assert!(label_errors(b"ACGTACGT", &bf, K, MAX_READ_ERRORS).is_none());
    }

    #[test]
    fn test_label_read_without_anchor_is_unlabellable() {
        let bf = FilterArray::with_params(9, 11);
        assert!(label_errors(SEQ, &bf, K, MAX_READ_ERRORS).is_none());
    }

    #[test]
    fn test_error_budget_abandons_read() {
        let bf = trusted_with_seq();
        let errors = label_errors(&mutated(50, b'A'), &bf, K, 0);
        assert!(errors.is_none());
    }

    #[test]
    fn test_find_longest_fix_restores_original_base() {
        let bf = trusted_with_seq();
        // window [19, 50] with the true base 50 replaced
        let mut buf = SEQ[19..50 + K].to_vec();
        let original = buf[K - 1];
        buf[K - 1] = b'A';
        assert_ne!(original, b'A');
        assert_eq!(find_longest_fix(&buf, &bf, K), vec![original]);
    }

    #[test]
    fn test_find_longest_fix_without_candidates() {
        let bf = FilterArray::with_params(9, 11);
        let buf = SEQ[0..K].to_vec();
        assert!(find_longest_fix(&buf, &bf, K).is_empty());
    }
}
