use crate::storage::gallery::GalleryEntry;
use std::fmt;

/// Keeps the denominator positive for zero vectors.
pub const COSINE_EPSILON: f32 = 1e-10;

pub const UNKNOWN_LABEL: &str = "unknown";

/// `1 - a·b / (|a||b| + ε)`. Dot product and norms are all taken over the
/// common prefix, so the result stays within `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| (dot + x * y, na + x * x, nb + y * y));

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt() + COSINE_EPSILON)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    Known(String),
    Unknown,
}

impl Identity {
    pub fn is_known(&self) -> bool {
        matches!(self, Identity::Known(_))
    }

    pub fn label(&self) -> &str {
        match self {
            Identity::Known(name) => name,
            Identity::Unknown => UNKNOWN_LABEL,
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub identity: Identity,
    /// Distance to the nearest gallery entry; `None` for an empty gallery.
    pub distance: Option<f32>,
    pub index: Option<usize>,
}

impl MatchOutcome {
    pub fn unknown() -> Self {
        Self { identity: Identity::Unknown, distance: None, index: None }
    }
}

/// Linear nearest-neighbour search by cosine distance.
#[derive(Debug, Clone, Copy)]
pub struct Matcher {
    threshold: f32,
}

impl Matcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// Nearest entry wins, ties going to the earliest one. A match counts only
    /// at or below the threshold. A query whose length differs from the
    /// gallery's is unknown.
    pub fn match_embedding(&self, query: &[f32], gallery: &[GalleryEntry]) -> MatchOutcome {
        if let Some(first) = gallery.first() {
            if first.vector.len() != query.len() {
                tracing::debug!(
                    "Query has {} dimensions but the gallery holds {}; treating as unknown",
                    query.len(),
                    first.vector.len()
                );
                return MatchOutcome::unknown();
            }
        }

        let mut best: Option<(usize, f32)> = None;
        for (index, entry) in gallery.iter().enumerate() {
            let distance = cosine_distance(query, &entry.vector);
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ if distance.is_nan() => {}
                _ => best = Some((index, distance)),
            }
        }

        let Some((index, distance)) = best else {
            return MatchOutcome::unknown();
        };

        let identity = if distance <= self.threshold {
            Identity::Known(gallery[index].owner_name.clone())
        } else {
            Identity::Unknown
        };
        tracing::trace!("Nearest gallery entry {} at distance {:.4} -> {}", index, distance, identity);

        MatchOutcome { identity, distance: Some(distance), index: Some(index) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vector: &[f32], name: &str) -> GalleryEntry {
        GalleryEntry { vector: vector.to_vec(), owner_name: name.to_string() }
    }

    #[test]
    fn self_distance_is_zero() {
        for v in [vec![1.0, 2.0, 3.0], vec![-0.5, 0.25, 8.0, 1e-3], vec![1e6, -1e6]] {
            assert!(cosine_distance(&v, &v).abs() < 1e-5);
        }
    }

    #[test]
    fn orthogonal_and_opposite_distances() {
        assert!((cosine_distance(&[1.0, 0.0], &[0.0, 1.0]) - 1.0).abs() < 1e-6);
        assert!((cosine_distance(&[1.0, 0.0], &[-1.0, 0.0]) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn zero_vector_does_not_blow_up() {
        let d = cosine_distance(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]);
        assert!(d.is_finite());
        assert!((d - 1.0).abs() < 1e-6);
    }

    #[test]
    fn empty_gallery_is_unknown() {
        let matcher = Matcher::new(0.45);
        let outcome = matcher.match_embedding(&[0.3, 0.4], &[]);
        assert_eq!(outcome, MatchOutcome::unknown());
        assert_eq!(outcome.identity.label(), "unknown");
    }

    #[test]
    fn nearest_entry_within_threshold_matches() {
        let matcher = Matcher::new(0.45);
        let gallery = vec![
            entry(&[0.0, 1.0, 0.0], "bob"),
            entry(&[1.0, 0.1, 0.0], "ana"),
        ];
        let outcome = matcher.match_embedding(&[1.0, 0.0, 0.0], &gallery);
        assert_eq!(outcome.identity, Identity::Known("ana".into()));
        assert_eq!(outcome.index, Some(1));
    }

    #[test]
    fn nearest_entry_beyond_threshold_is_unknown() {
        let matcher = Matcher::new(0.45);
        let gallery = vec![entry(&[0.0, 1.0], "bob")];
        let outcome = matcher.match_embedding(&[1.0, 0.05], &gallery);
        assert_eq!(outcome.identity, Identity::Unknown);
        assert!(outcome.distance.unwrap() > 0.45);
    }

    #[test]
    fn threshold_is_inclusive() {
        // distance is exactly 1.0 for orthogonal vectors
        let matcher = Matcher::new(1.0);
        let gallery = vec![entry(&[0.0, 1.0], "bob")];
        assert!(matcher.match_embedding(&[1.0, 0.0], &gallery).identity.is_known());
    }

    #[test]
    fn ties_go_to_the_first_entry() {
        let matcher = Matcher::new(0.45);
        let gallery = vec![
            entry(&[2.0, 0.0], "first"),
            entry(&[1.0, 0.0], "second"),
        ];
        let outcome = matcher.match_embedding(&[3.0, 0.0], &gallery);
        assert_eq!(outcome.identity, Identity::Known("first".into()));
        assert_eq!(outcome.index, Some(0));
    }

    #[test]
    fn dimension_mismatch_is_unknown() {
        let matcher = Matcher::new(0.45);
        let gallery = vec![entry(&[1.0, 0.0], "ana")];

        // The prefix [1.0, 0.0] would match ana exactly
        let outcome = matcher.match_embedding(&[1.0, 0.0, 5.0], &gallery);
        assert_eq!(outcome, MatchOutcome::unknown());
        assert_eq!(matcher.match_embedding(&[1.0], &gallery), MatchOutcome::unknown());
    }

    #[test]
    fn prefix_distance_ignores_the_longer_tail() {
        assert!(cosine_distance(&[1.0, 0.0], &[1.0, 0.0, 9.0]).abs() < 1e-6);
    }
}
