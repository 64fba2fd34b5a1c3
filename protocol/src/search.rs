use serde::Deserialize;
use serde::Serialize;
use serde_with::skip_serializing_none;

pub const FIRST_PAGE: u32 = 1;

/// Unary request for one page of image results.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchImagesRequest {
    pub query: String,
    #[serde(default = "first_page")]
    pub page: u32,
}

impl SearchImagesRequest {
    pub fn new(query: impl Into<String>, page: u32) -> Self {
        Self {
            query: query.into(),
            page: page.max(FIRST_PAGE),
        }
    }
}

impl Default for SearchImagesRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            page: FIRST_PAGE,
        }
    }
}

fn first_page() -> u32 {
    FIRST_PAGE
}

#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SearchImagesResponse {
    #[serde(default)]
    pub image: Vec<ImageRecord>,
    #[serde(default)]
    pub next_page: Option<u32>,
    #[serde(default)]
    pub total_images: u64,
}

/// A single search hit. Every field is optional on the wire; records without
/// an `id` are still rendered but cannot be resolved by a click.
#[skip_serializing_none]
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
}

impl ImageRecord {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("(unnamed)")
    }
}
