use similar::TextDiff;

/// Normalized similarity between two text spans: 1.0 means identical, 0.0
/// means no common content. Character-level diff ratio, symmetric and
/// deterministic; the single primitive behind clustering and the structural
/// rewrite tier.
pub fn similarity_ratio(left: &str, right: &str) -> f64 {
    if left == right {
        return 1.0;
    }
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    f64::from(TextDiff::from_chars(left, right).ratio())
}
