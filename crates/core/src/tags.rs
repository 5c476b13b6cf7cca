//! Maps local class names to remote tag ids, creating only what is missing.

use providers::{ServiceError, VisionTrainingService};
use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagBinding {
    pub class_name: String,
    pub tag_id: String,
    pub created: bool,
}

/// Class name → tag id, in class order. Built once per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagMap {
    bindings: Vec<TagBinding>,
}

impl TagMap {
    pub fn get(&self, class_name: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|b| b.class_name == class_name)
            .map(|b| b.tag_id.as_str())
    }

    pub fn bindings(&self) -> &[TagBinding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn created(&self) -> usize {
        self.bindings.iter().filter(|b| b.created).count()
    }

    pub fn reused(&self) -> usize {
        self.len() - self.created()
    }
}

pub async fn reconcile(
    service: &dyn VisionTrainingService,
    project_id: &str,
    class_names: &[String],
) -> Result<TagMap, ServiceError> {
    let mut existing: HashMap<String, String> = HashMap::new();
    for tag in service.list_tags(project_id).await? {
        existing.entry(tag.name).or_insert(tag.id);
    }

    let mut bindings: Vec<TagBinding> = Vec::with_capacity(class_names.len());
    for name in class_names {
        if bindings.iter().any(|b| &b.class_name == name) {
            continue;
        }
        let binding = match existing.get(name) {
            Some(id) => TagBinding {
                class_name: name.clone(),
                tag_id: id.clone(),
                created: false,
            },
            None => {
                let tag = service.create_tag(project_id, name).await?;
                info!("Created tag: {}", name);
                existing.insert(tag.name.clone(), tag.id.clone());
                TagBinding {
                    class_name: name.clone(),
                    tag_id: tag.id,
                    created: true,
                }
            }
        };
        bindings.push(binding);
    }

    let map = TagMap { bindings };
    info!(
        "Tags reconciled: {} created, {} reused",
        map.created(),
        map.reused()
    );
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use providers::memory::InMemoryService;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn existing_tags_are_reused() {
        let svc = InMemoryService::with_project("p", "Art").with_tag("t-cub", "Cubism");
        let map = reconcile(&svc, "p", &names(&["Cubism", "Baroque"]))
            .await
            .unwrap();

        assert_eq!(map.get("Cubism"), Some("t-cub"));
        assert!(map.get("Baroque").is_some());
        assert_eq!(map.created(), 1);
        assert_eq!(svc.create_tag_calls(), 1);
    }

    #[tokio::test]
    async fn reconciling_twice_yields_same_ids() {
        let svc = InMemoryService::with_project("p", "Art");
        let classes = names(&["Impressionism", "Cubism"]);

        let first = reconcile(&svc, "p", &classes).await.unwrap();
        let second = reconcile(&svc, "p", &classes).await.unwrap();

        for class in &classes {
            assert_eq!(first.get(class), second.get(class));
        }
        assert_eq!(second.created(), 0);
        assert_eq!(svc.create_tag_calls(), 2);
        assert_eq!(svc.tags().len(), 2);
    }

    #[tokio::test]
    async fn listing_failure_creates_nothing() {
        let svc = InMemoryService::new();
        let err = reconcile(&svc, "missing", &names(&["A"])).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
        assert_eq!(svc.create_tag_calls(), 0);
    }
}
