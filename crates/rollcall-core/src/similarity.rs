//! Character-level string similarity.
//!
//! Follows the classic `similar_text` algorithm: take the longest common
//! substring (earliest in `a`, then earliest in `b`, on ties), count it, and
//! recurse into the pieces left and right of it. The percentage is
//! `matched * 2 * 100 / (len(a) + len(b))`.

/// Similarity of `a` and `b` in percent, `0.0..=100.0`.
pub fn percent(a: &[u8], b: &[u8]) -> f64 {
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }
    (common_chars(a, b) * 2) as f64 * 100.0 / total as f64
}

/// Upper bound on [`percent`] for inputs of the given lengths.
///
/// Lets callers skip the quadratic comparison when the result could never
/// reach their cutoff.
pub fn max_percent(len_a: usize, len_b: usize) -> f64 {
    let total = len_a + len_b;
    if total == 0 {
        return 0.0;
    }
    (len_a.min(len_b) * 2) as f64 * 100.0 / total as f64
}

/// Number of bytes matched by the recursive longest-common-substring walk.
pub fn common_chars(a: &[u8], b: &[u8]) -> usize {
    let mut total = 0;
    let mut pending = vec![(a, b)];

    while let Some((a, b)) = pending.pop() {
        if a.is_empty() || b.is_empty() {
            continue;
        }
        let Some((pos_a, pos_b, len)) = longest_common_substring(a, b) else {
            continue;
        };
        total += len;
        pending.push((&a[..pos_a], &b[..pos_b]));
        pending.push((&a[pos_a + len..], &b[pos_b + len..]));
    }

    total
}

/// Longest common substring as `(start_in_a, start_in_b, len)`.
///
/// Among equally long candidates the one starting earliest in `a`, then
/// earliest in `b`, wins.
fn longest_common_substring(a: &[u8], b: &[u8]) -> Option<(usize, usize, usize)> {
    // prev[j] / curr[j]: length of the common suffix of a[..i] and b[..j].
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    let mut best: Option<(usize, usize, usize)> = None;

    for i in 1..=a.len() {
        for j in 1..=b.len() {
            if a[i - 1] != b[j - 1] {
                curr[j] = 0;
                continue;
            }
            let len = prev[j - 1] + 1;
            curr[j] = len;

            let start = (i - len, j - len);
            let better = match best {
                None => true,
                Some((pa, pb, best_len)) => {
                    len > best_len || (len == best_len && start < (pa, pb))
                }
            };
            if better {
                best = Some((start.0, start.1, len));
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    best
}
