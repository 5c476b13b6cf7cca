//! Remote project lookup, tag/image counts and the pre-training readiness check.

use crate::config::{ServiceConfig, TrainingConfig};
use crate::error::PipelineError;
use providers::{Project, ServiceError, VisionTrainingService};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStats {
    pub name: String,
    pub id: String,
    pub image_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectStats {
    pub tag_count: usize,
    pub total_images: u64,
    pub tags: Vec<TagStats>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub ready: bool,
    pub blockers: Vec<String>,
    pub warnings: Vec<String>,
}

/// Finds the configured project, by id when set, otherwise by name.
pub async fn resolve_project(
    service: &dyn VisionTrainingService,
    cfg: &ServiceConfig,
) -> anyhow::Result<Project> {
    info!("Looking for project: {}", cfg.project_id.as_deref().unwrap_or(&cfg.project_name));
    let projects = service.list_projects().await?;
    let found = projects.iter().find(|p| match &cfg.project_id {
        Some(id) => &p.id == id,
        None => p.name == cfg.project_name,
    });
    if let Some(project) = found {
        info!("Found project: {}", project.id);
        return Ok(project.clone());
    }

    let available = if projects.is_empty() {
        "none".to_string()
    } else {
        projects
            .iter()
            .map(|p| format!("{} (ID: {})", p.name, p.id))
            .collect::<Vec<_>>()
            .join(", ")
    };
    Err(PipelineError::ProjectNotFound {
        name: cfg
            .project_id
            .clone()
            .unwrap_or_else(|| cfg.project_name.clone()),
        available,
    }
    .into())
}

pub async fn collect(
    service: &dyn VisionTrainingService,
    project_id: &str,
) -> Result<ProjectStats, ServiceError> {
    let mut tags = service.list_tags(project_id).await?;
    tags.sort_by(|a, b| a.name.cmp(&b.name));
    let total_images = service.count_tagged_images(project_id, &[]).await?;

    let mut per_tag = Vec::with_capacity(tags.len());
    for tag in tags {
        let image_count = service
            .count_tagged_images(project_id, std::slice::from_ref(&tag.id))
            .await?;
        per_tag.push(TagStats {
            name: tag.name,
            id: tag.id,
            image_count,
        });
    }

    let stats = ProjectStats {
        tag_count: per_tag.len(),
        total_images,
        tags: per_tag,
    };
    info!(
        "Project statistics: {} tags, {} tagged images",
        stats.tag_count, stats.total_images
    );
    for tag in &stats.tags {
        info!("  {}: {} images", tag.name, tag.image_count);
    }
    Ok(stats)
}

pub fn check_readiness(stats: &ProjectStats, cfg: &TrainingConfig) -> Readiness {
    let mut blockers = Vec::new();
    let mut warnings = Vec::new();

    if stats.tag_count < cfg.min_tags {
        blockers.push(format!(
            "need at least {} tags, found {}",
            cfg.min_tags, stats.tag_count
        ));
    }
    let recommended = stats.tag_count as u64 * cfg.min_images_per_tag;
    if stats.tag_count > 0 && stats.total_images < recommended {
        warnings.push(format!(
            "minimum {} images per tag recommended, current average {:.1}",
            cfg.min_images_per_tag,
            stats.total_images as f64 / stats.tag_count as f64
        ));
    }

    for w in &warnings {
        warn!("{}", w);
    }
    Readiness {
        ready: blockers.is_empty(),
        blockers,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::memory::InMemoryService;

    fn stats(tags: usize, images: u64) -> ProjectStats {
        ProjectStats {
            tag_count: tags,
            total_images: images,
            tags: Vec::new(),
        }
    }

    #[test]
    fn single_tag_blocks_training() {
        let r = check_readiness(&stats(1, 100), &TrainingConfig::default());
        assert!(!r.ready);
        assert_eq!(r.blockers.len(), 1);
    }

    #[test]
    fn sparse_tags_only_warn() {
        let r = check_readiness(&stats(3, 9), &TrainingConfig::default());
        assert!(r.ready);
        assert_eq!(
            r.warnings,
            vec!["minimum 5 images per tag recommended, current average 3.0".to_string()]
        );
    }

    #[tokio::test]
    async fn project_found_by_name_or_listed_when_missing() {
        let svc = InMemoryService::with_project("p-1", "ArtStyles");
        let mut cfg = ServiceConfig {
            project_name: "ArtStyles".into(),
            ..ServiceConfig::default()
        };
        assert_eq!(resolve_project(&svc, &cfg).await.unwrap().id, "p-1");

        cfg.project_name = "Other".into();
        let err = resolve_project(&svc, &cfg).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "project 'Other' not found (available: ArtStyles (ID: p-1))"
        );
    }

    #[tokio::test]
    async fn project_id_takes_precedence_over_name() {
        let svc = InMemoryService::with_project("p-1", "ArtStyles");
        let cfg = ServiceConfig {
            project_name: "Unrelated".into(),
            project_id: Some("p-1".into()),
            ..ServiceConfig::default()
        };
        assert_eq!(resolve_project(&svc, &cfg).await.unwrap().name, "ArtStyles");
    }

    #[tokio::test]
    async fn counts_images_per_tag_in_name_order() {
        use providers::{ImageBatch, ImageEntry};

        let svc = InMemoryService::with_project("p", "Art")
            .with_tag("t2", "Realism")
            .with_tag("t1", "Cubism");
        let entry = |name: &str, tag: &str| ImageEntry {
            name: name.into(),
            contents: vec![0],
            tag_ids: vec![tag.into()],
        };
        let batch = ImageBatch {
            images: vec![entry("a", "t1"), entry("b", "t1"), entry("c", "t2")],
        };
        svc.upload_batch("p", &batch).await.unwrap();

        let stats = collect(&svc, "p").await.unwrap();
        assert_eq!(stats.tag_count, 2);
        assert_eq!(stats.total_images, 3);
        assert_eq!(stats.tags[0].name, "Cubism");
        assert_eq!(stats.tags[0].image_count, 2);
        assert_eq!(stats.tags[1].image_count, 1);
    }
}
