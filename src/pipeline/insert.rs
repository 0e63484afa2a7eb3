use async_trait::async_trait;

use super::{Item, Pipeline, PipelineError};
use crate::storage::{Database, NewArticle, Status};

/// Stores items as articles of their site and remembers the source URL.
///
/// Items of inactive sites pass through unstored; items of unknown sites
/// are dropped.
pub struct InsertDbPipeline {
    db: Database,
}

impl InsertDbPipeline {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Pipeline for InsertDbPipeline {
    fn name(&self) -> &'static str {
        "insert_db"
    }

    async fn process_item(&self, mut item: Item) -> Result<Item, PipelineError> {
        let site = self
            .db
            .get_site_by_name(&item.name)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?
            .ok_or_else(|| PipelineError::Drop(format!("Site not exist: '{}'", item.name)))?;

        if site.status != Status::Active {
            tracing::debug!(site = %site.name, url = %item.url, "Site inactive, item not stored");
            return Ok(item);
        }

        let article = self
            .db
            .insert_article(&NewArticle {
                site_id: site.id,
                title: item.title.clone(),
                content: item.content.clone(),
                src_url: item.url.clone(),
                remark: String::new(),
            })
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        self.db
            .mark_crawled_url(&item.url)
            .await
            .map_err(|e| PipelineError::Storage(e.to_string()))?;

        tracing::info!(site = %site.name, uindex = article.uindex, title = %item.title, "Article stored");
        item.uindex = Some(article.uindex);
        Ok(item)
    }
}
