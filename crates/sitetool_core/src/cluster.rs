use std::collections::HashSet;

use crate::extract::CandidateBlock;
use crate::similarity::similarity_ratio;

/// A group of near-duplicate blocks from distinct pages. `members` are
/// indices into the extraction-ordered block list; the first member is the
/// seed and supplies the canonical content. Read-only once built.
#[derive(Debug, Clone)]
pub struct BlockCluster {
    pub id: String,
    pub members: Vec<usize>,
}

/// Greedy single-link grouping in extraction order. Each unclaimed block
/// seeds a cluster and claims every later unclaimed block whose similarity
/// to the seed meets the threshold, at most one per page. Clusters below
/// `min_occurrences` are discarded, but their non-seed members stay claimed
/// and are never re-evaluated; a chain of pairwise-similar variants can
/// therefore split across seeds depending on order. That under-merge is the
/// intended behavior, not a defect to fix.
pub fn build_clusters(
    blocks: &[CandidateBlock],
    similarity_threshold: f64,
    min_occurrences: usize,
) -> Vec<BlockCluster> {
    let mut claimed: HashSet<&str> = HashSet::new();
    let mut clusters = Vec::new();

    for (index, seed) in blocks.iter().enumerate() {
        if claimed.contains(seed.fingerprint.as_str()) {
            continue;
        }
        let mut members = vec![index];
        let mut pages: HashSet<usize> = HashSet::from([seed.page]);

        for (candidate_index, candidate) in blocks.iter().enumerate().skip(index + 1) {
            if claimed.contains(candidate.fingerprint.as_str()) || pages.contains(&candidate.page)
            {
                continue;
            }
            if similarity_ratio(&seed.content, &candidate.content) >= similarity_threshold {
                members.push(candidate_index);
                claimed.insert(candidate.fingerprint.as_str());
                pages.insert(candidate.page);
            }
        }

        if members.len() >= min_occurrences {
            claimed.insert(seed.fingerprint.as_str());
            clusters.push(BlockCluster {
                id: format!("{}_{}", seed.kind.as_str(), clusters.len()),
                members,
            });
        }
    }

    clusters
}

#[cfg(test)]
mod tests {
    use super::build_clusters;
    use crate::extract::{BlockKind, CandidateBlock};
    use crate::filesystem::content_fingerprint;

    fn block(kind: BlockKind, content: &str, page: usize) -> CandidateBlock {
        CandidateBlock {
            kind,
            content: content.to_string(),
            fingerprint: content_fingerprint(content),
            page,
        }
    }

    const HEADER: &str = "<header class=\"site\"><a href=\"/index.php\">Home</a></header>";

    #[test]
    fn identical_blocks_across_three_pages_form_one_cluster() {
        let blocks = vec![
            block(BlockKind::Header, HEADER, 0),
            block(BlockKind::Header, HEADER, 1),
            block(BlockKind::Header, HEADER, 2),
        ];
        let clusters = build_clusters(&blocks, 0.9, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1, 2]);
        assert_eq!(clusters[0].id, "header_0");
    }

    #[test]
    fn blocks_below_threshold_never_share_a_cluster() {
        let blocks = vec![
            block(BlockKind::Script, "<script>var analytics = load('/js/a.js');</script>", 0),
            block(BlockKind::Script, "<script>function unrelated() { return 42; }</script>", 1),
        ];
        let clusters = build_clusters(&blocks, 0.9, 2);
        assert!(clusters.is_empty());
    }

    #[test]
    fn one_page_contributes_at_most_one_member() {
        let blocks = vec![
            block(BlockKind::Header, HEADER, 0),
            block(BlockKind::Header, HEADER, 1),
            block(BlockKind::Header, HEADER, 1),
        ];
        let clusters = build_clusters(&blocks, 0.9, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1]);
    }

    #[test]
    fn clusters_below_min_occurrences_are_dropped() {
        let blocks = vec![
            block(BlockKind::Header, HEADER, 0),
            block(BlockKind::Header, HEADER, 1),
        ];
        let clusters = build_clusters(&blocks, 0.9, 3);
        assert!(clusters.is_empty());
    }

    #[test]
    fn discarded_members_are_not_revisited() {
        // Page 0 seeds a cluster that claims page 1's near-duplicate but
        // misses min_occurrences of 3; page 1's block must not seed or join
        // anything afterwards, even though page 2 would pair with it.
        let drifted = "<header class=\"site\"><a href=\"/index.php\">Home </a></header>";
        let blocks = vec![
            block(BlockKind::Header, HEADER, 0),
            block(BlockKind::Header, drifted, 1),
            block(BlockKind::Header, drifted, 2),
        ];
        let clusters = build_clusters(&blocks, 0.9, 3);
        assert!(clusters.is_empty());
    }

    #[test]
    fn near_duplicates_with_whitespace_drift_cluster_together() {
        let drifted = "<header class=\"site\">  <a href=\"/index.php\">Home</a></header>";
        let blocks = vec![
            block(BlockKind::Header, HEADER, 0),
            block(BlockKind::Header, drifted, 1),
        ];
        let clusters = build_clusters(&blocks, 0.9, 2);
        assert_eq!(clusters.len(), 1);
        assert_eq!(clusters[0].members, vec![0, 1]);
    }

    #[test]
    fn cluster_ids_follow_formation_order() {
        let nav = "<nav class=\"menu\"><a href=\"/a.php\">Alpha</a><a href=\"/b.php\">Beta</a></nav>";
        let blocks = vec![
            block(BlockKind::Header, HEADER, 0),
            block(BlockKind::Navigation, nav, 0),
            block(BlockKind::Header, HEADER, 1),
            block(BlockKind::Navigation, nav, 1),
        ];
        let clusters = build_clusters(&blocks, 0.9, 2);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].id, "header_0");
        assert_eq!(clusters[1].id, "navigation_1");
    }
}
