use async_trait::async_trait;

use super::{Item, Pipeline, PipelineError};

/// Drops items missing a title, content, URL or site name.
pub struct ValidPipeline;

#[async_trait]
impl Pipeline for ValidPipeline {
    fn name(&self) -> &'static str {
        "valid"
    }

    async fn process_item(&self, item: Item) -> Result<Item, PipelineError> {
        let missing: Vec<&str> = [
            ("title", &item.title),
            ("content", &item.content),
            ("url", &item.url),
            ("name", &item.name),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if missing.is_empty() {
            Ok(item)
        } else {
            Err(PipelineError::Drop(format!(
                "Data not valid, missing {} (url: '{}', site: '{}')",
                missing.join(", "),
                item.url,
                item.name
            )))
        }
    }
}
