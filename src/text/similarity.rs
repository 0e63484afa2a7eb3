use super::keywords::TagMap;

/// Float slack when comparing against the upper bound: an identical map can
/// score 0.9999999999999998 after rounding.
const SCORE_EPSILON: f64 = 1e-9;

/// Cosine similarity of two keyword maps.
///
/// Words are dimensions and counts are magnitudes. Returns 0.0 when either
/// map is empty; identical maps score 1.0 (up to float rounding).
pub fn cosine_similarity(a: &TagMap, b: &TagMap) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f64 = a
        .iter()
        .filter_map(|(word, x)| b.get(word).map(|y| f64::from(x) * f64::from(y)))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }

    let norm = |m: &TagMap| m.iter().map(|(_, v)| f64::from(v).powi(2)).sum::<f64>().sqrt();
    (dot / (norm(a) * norm(b))).min(1.0)
}

/// Rank `candidates` by similarity to `source`.
///
/// Keeps scores strictly inside `(min_score, max_score)` so near-duplicates
/// and the source itself (score 1) are never recommended, then returns the
/// best `top_n`, highest first. Ties keep candidate order.
pub fn rank_similar<'a, K, I>(
    source: &TagMap,
    candidates: I,
    min_score: f64,
    max_score: f64,
    top_n: usize,
) -> Vec<(K, f64)>
where
    K: Clone + 'a,
    I: IntoIterator<Item = (&'a K, &'a TagMap)>,
{
    let mut scored: Vec<(K, f64)> = candidates
        .into_iter()
        .filter_map(|(key, tags)| {
            let score = cosine_similarity(source, tags);
            (score > min_score && score < max_score - SCORE_EPSILON).then(|| (key.clone(), score))
        })
        .collect();

    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_n);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn tags(pairs: &[(&str, u32)]) -> TagMap {
        pairs.iter().map(|(w, c)| (w.to_string(), *c)).collect()
    }

    #[test]
    fn test_identical_maps_score_one() {
        let a = tags(&[("rust", 3), ("tokio", 2)]);
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_disjoint_maps_score_zero() {
        let a = tags(&[("rust", 3)]);
        let b = tags(&[("python", 3)]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_empty_map_scores_zero() {
        let a = tags(&[("rust", 3)]);
        assert_eq!(cosine_similarity(&a, &TagMap::new()), 0.0);
        assert_eq!(cosine_similarity(&TagMap::new(), &TagMap::new()), 0.0);
    }

    #[test]
    fn test_known_value() {
        // (3*1) / (sqrt(9+16) * sqrt(1+1)) = 3 / (5 * 1.41421356...)
        let a = tags(&[("rust", 3), ("tokio", 4)]);
        let b = tags(&[("rust", 1), ("serde", 1)]);
        let expected = 3.0 / (5.0 * 2f64.sqrt());
        assert!((cosine_similarity(&a, &b) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_rank_similar_filters_and_orders() {
        let source = tags(&[("rust", 3), ("tokio", 2)]);
        let candidates = vec![
            (1_i64, source.clone()),                          // itself: excluded
            (2, tags(&[("rust", 1)])),                        // ~0.83
            (3, tags(&[("python", 5)])),                      // 0: excluded
            (4, tags(&[("rust", 1), ("tokio", 1), ("go", 1)])), // ~0.80
            (5, tags(&[("tokio", 1), ("serde", 9)])),          // ~0.06: excluded
        ];

        let ranked = rank_similar(
            &source,
            candidates.iter().map(|(k, t)| (k, t)),
            0.1,
            1.0,
            10,
        );
        let keys: Vec<i64> = ranked.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![2, 4]);
        assert!(ranked[0].1 > ranked[1].1);
    }

    #[test]
    fn test_rank_similar_truncates() {
        let source = tags(&[("a", 1), ("b", 1)]);
        let candidates: Vec<(i64, TagMap)> = (0..20)
            .map(|i| (i, tags(&[("a", 1), ("c", i as u32 + 1)])))
            .collect();
        let ranked = rank_similar(&source, candidates.iter().map(|(k, t)| (k, t)), 0.0, 1.0, 10);
        assert_eq!(ranked.len(), 10);
        // Smaller "c" weight means closer to the source
        assert_eq!(ranked[0].0, 0);
    }

    fn arb_tags() -> impl Strategy<Value = TagMap> {
        prop::collection::btree_map("[a-e]{1,2}", 1u32..20, 0..6)
            .prop_map(|m| m.into_iter().collect())
    }

    proptest! {
        #[test]
        fn prop_similarity_is_symmetric_and_bounded(a in arb_tags(), b in arb_tags()) {
            let ab = cosine_similarity(&a, &b);
            let ba = cosine_similarity(&b, &a);
            prop_assert!((ab - ba).abs() < 1e-9);
            prop_assert!((0.0..=1.0 + 1e-9).contains(&ab));
        }
    }
}
