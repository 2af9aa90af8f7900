// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Brute-force Hamming matching with the nearest/second-nearest ratio test.

use super::orb::Descriptor;

/// Number of differing bits between two descriptors.
pub fn hamming(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// The two nearest train descriptors of one query descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Neighbours {
    pub query: usize,
    pub best: (usize, u32),
    pub second: Option<(usize, u32)>,
}

/// k=2 nearest neighbours of every query descriptor among `train`.
///
/// Ties keep the lower train index. Returns nothing when `train` is empty.
pub fn knn2(query: &[Descriptor], train: &[Descriptor]) -> Vec<Neighbours> {
    if train.is_empty() {
        return Vec::new();
    }
    query
        .iter()
        .enumerate()
        .map(|(qi, q)| {
            let mut best = (usize::MAX, u32::MAX);
            let mut second: Option<(usize, u32)> = None;
            for (ti, t) in train.iter().enumerate() {
                let d = hamming(q, t);
                if d < best.1 {
                    if best.0 != usize::MAX {
                        second = Some(best);
                    }
                    best = (ti, d);
                } else if second.is_none_or(|s| d < s.1) {
                    second = Some((ti, d));
                }
            }
            Neighbours {
                query: qi,
                best,
                second,
            }
        })
        .collect()
}

/// Counts matches that pass the distance-ratio test.
#[derive(Debug, Clone, Copy)]
pub struct RatioMatcher {
    ratio: f32,
}

impl RatioMatcher {
    pub fn new(ratio: f32) -> Self {
        Self { ratio }
    }

    /// Whether a best/second-best pair is unambiguous enough to count.
    ///
    /// A query with no second neighbour cannot be tested and never counts.
    pub fn is_good(&self, neighbours: &Neighbours) -> bool {
        match neighbours.second {
            Some((_, second)) => (neighbours.best.1 as f32) < self.ratio * second as f32,
            None => false,
        }
    }

    /// Number of good matches from `query` into `train`.
    pub fn good_matches(&self, query: &[Descriptor], train: &[Descriptor]) -> usize {
        knn2(query, train).iter().filter(|n| self.is_good(n)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(fill: u8) -> Descriptor {
        [fill; 32]
    }

    #[test]
    fn hamming_counts_bits() {
        assert_eq!(hamming(&descriptor(0), &descriptor(0)), 0);
        assert_eq!(hamming(&descriptor(0), &descriptor(0xFF)), 256);
        assert_eq!(hamming(&descriptor(0b1010_0000), &descriptor(0)), 64);
    }

    #[test]
    fn knn2_finds_two_nearest() {
        let train = [descriptor(0xFF), descriptor(0x01), descriptor(0x03)];
        let result = knn2(&[descriptor(0)], &train);
        assert_eq!(result[0].best, (1, 32));
        assert_eq!(result[0].second, Some((2, 64)));
    }

    #[test]
    fn knn2_with_single_train_has_no_second() {
        let result = knn2(&[descriptor(0)], &[descriptor(1)]);
        assert_eq!(result[0].second, None);
        assert!(!RatioMatcher::new(0.75).is_good(&result[0]));
    }

    #[test]
    fn ambiguous_match_fails_ratio_test() {
        let matcher = RatioMatcher::new(0.75);
        // Best 32, second 64: 32 < 48, good.
        assert_eq!(
            matcher.good_matches(&[descriptor(0)], &[descriptor(0x01), descriptor(0x03)]),
            1
        );
        // Best 32, second 32: ambiguous.
        assert_eq!(
            matcher.good_matches(&[descriptor(0)], &[descriptor(0x01), descriptor(0x02)]),
            0
        );
    }

    #[test]
    fn empty_train_matches_nothing() {
        assert!(knn2(&[descriptor(0)], &[]).is_empty());
        assert_eq!(RatioMatcher::new(0.75).good_matches(&[descriptor(0)], &[]), 0);
    }
}
