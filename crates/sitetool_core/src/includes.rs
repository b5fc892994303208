use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::cluster::BlockCluster;
use crate::extract::CandidateBlock;
use crate::runtime::INCLUDES_DIR_NAME;

const FINGERPRINT_PREFIX_LEN: usize = 8;

/// One shared artifact file written for a retained cluster. Never mutated
/// after creation.
#[derive(Debug, Clone, Serialize)]
pub struct IncludeArtifact {
    pub cluster_id: String,
    pub file_name: String,
    pub path: PathBuf,
    /// Path relative to the site root, forward slashes; this is what the
    /// reference statement embeds.
    pub relative_path: String,
}

/// The single-line reference statement spliced over each replaced occurrence.
pub fn include_statement(relative_path: &str) -> String {
    format!("<?php include '{relative_path}'; ?>\n")
}

/// Write one artifact per retained cluster, canonical content taken verbatim
/// from the cluster's seed member. The artifact directory is created on
/// demand; failing to create it is fatal to the run. Two clusters deriving
/// the same file name overwrite silently, last writer wins.
pub fn materialize_includes(
    site_root: &Path,
    blocks: &[CandidateBlock],
    clusters: &[BlockCluster],
) -> Result<Vec<IncludeArtifact>> {
    let includes_dir = site_root.join(INCLUDES_DIR_NAME);
    if !clusters.is_empty() {
        fs::create_dir_all(&includes_dir)
            .with_context(|| format!("failed to create {}", includes_dir.display()))?;
    }

    let mut artifacts = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let seed = &blocks[cluster.members[0]];
        let file_name = format!(
            "{}_{}.php",
            seed.kind.as_str(),
            &seed.fingerprint[..FINGERPRINT_PREFIX_LEN]
        );
        let path = includes_dir.join(&file_name);
        fs::write(&path, &seed.content)
            .with_context(|| format!("failed to write {}", path.display()))?;
        artifacts.push(IncludeArtifact {
            cluster_id: cluster.id.clone(),
            relative_path: format!("{INCLUDES_DIR_NAME}/{file_name}"),
            file_name,
            path,
        });
    }
    Ok(artifacts)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{include_statement, materialize_includes};
    use crate::cluster::BlockCluster;
    use crate::extract::{BlockKind, CandidateBlock};
    use crate::filesystem::content_fingerprint;

    #[test]
    fn include_statement_has_fixed_form() {
        assert_eq!(
            include_statement("includes/header_0a1b2c3d.php"),
            "<?php include 'includes/header_0a1b2c3d.php'; ?>\n"
        );
    }

    #[test]
    fn artifact_is_written_with_canonical_content() {
        let temp = tempdir().expect("tempdir");
        let content = "<header class=\"site\"><a href=\"/index.php\">Home</a></header>";
        let blocks = vec![CandidateBlock {
            kind: BlockKind::Header,
            content: content.to_string(),
            fingerprint: content_fingerprint(content),
            page: 0,
        }];
        let clusters = vec![BlockCluster {
            id: "header_0".to_string(),
            members: vec![0],
        }];

        let artifacts = materialize_includes(temp.path(), &blocks, &clusters).expect("materialize");
        assert_eq!(artifacts.len(), 1);
        let artifact = &artifacts[0];
        assert_eq!(
            artifact.file_name,
            format!("header_{}.php", &blocks[0].fingerprint[..8])
        );
        assert_eq!(
            artifact.relative_path,
            format!("includes/{}", artifact.file_name)
        );
        let written = fs::read_to_string(&artifact.path).expect("read artifact");
        assert_eq!(written, content);
    }

    #[test]
    fn no_directory_is_created_without_retained_clusters() {
        let temp = tempdir().expect("tempdir");
        let artifacts = materialize_includes(temp.path(), &[], &[]).expect("materialize");
        assert!(artifacts.is_empty());
        assert!(!temp.path().join("includes").exists());
    }
}
