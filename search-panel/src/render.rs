//! Output contract toward the host surface and the composition rules for it.

use imagesearch_protocol::ImageRecord;
use imagesearch_protocol::SearchImagesResponse;

pub const WORKING_SUMMARY: &str = "Working...";
pub const TIMED_OUT_SUMMARY: &str = "Timed out.";
pub const NO_RESULTS_SUMMARY: &str = "No results.";
pub const PLACEHOLDER_RESULTS: &str = r#"<div class="results-placeholder"></div>"#;

/// Markup handed to the host. Both strings are opaque to the pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RenderedOutput {
    pub summary_markup: String,
    pub results_markup: String,
}

impl RenderedOutput {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn working() -> Self {
        Self {
            summary_markup: WORKING_SUMMARY.to_string(),
            results_markup: PLACEHOLDER_RESULTS.to_string(),
        }
    }

    /// A summary line with no results, used for timeouts and failures.
    pub fn message(summary: impl Into<String>) -> Self {
        Self {
            summary_markup: escape(&summary.into()),
            results_markup: String::new(),
        }
    }

    pub fn from_response(response: &SearchImagesResponse, page: u32) -> Self {
        Self {
            summary_markup: escape(&summary_text(response, page)),
            results_markup: results_markup(response),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary_markup.is_empty() && self.results_markup.is_empty()
    }
}

/// Where rendered output and resolved clicks go.
pub trait RenderBoundary: Send + Sync {
    fn render(&self, output: RenderedOutput);

    fn open_image(&self, image: &ImageRecord);
}

/// `page` is the page the request was issued with, not the current one.
pub fn summary_text(response: &SearchImagesResponse, page: u32) -> String {
    let count = response.image.len() as u64;
    if count == 0 {
        return NO_RESULTS_SUMMARY.to_string();
    }
    let start = u64::from(page.max(1));
    let end = start + count - 1;
    format!("Showing image {start}-{end} of {}", response.total_images)
}

pub fn results_markup(response: &SearchImagesResponse) -> String {
    let mut out = String::from("<ul class=\"results\">");
    for image in &response.image {
        match &image.id {
            Some(id) => out.push_str(&format!("<li data-image-id=\"{}\">", escape(id))),
            None => out.push_str("<li>"),
        }
        if let Some(url) = &image.thumbnail_url {
            out.push_str(&format!(
                "<img src=\"{}\" alt=\"{}\"/>",
                escape(url),
                escape(image.display_name())
            ));
        }
        out.push_str(&format!("<span>{}</span>", escape(image.display_name())));
        if let Some(description) = &image.description {
            out.push_str(&format!("<p>{}</p>", escape(description)));
        }
        out.push_str("</li>");
    }
    out.push_str("</ul>");
    if let Some(next) = response.next_page {
        out.push_str(&format!("<button data-next-page=\"{next}\">Next page</button>"));
    }
    out
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}
