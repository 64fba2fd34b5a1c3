use std::collections::HashMap;

use imagesearch_protocol::ImageRecord;

/// Last rendered result set keyed by image id. Replaced wholesale on every
/// honored response, never merged.
#[derive(Debug, Default)]
pub struct ResultIndex {
    entries: HashMap<String, ImageRecord>,
}

impl ResultIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records without an id are skipped.
    pub fn replace(&mut self, images: &[ImageRecord]) {
        self.entries.clear();
        for image in images {
            if let Some(id) = &image.id {
                self.entries.insert(id.clone(), image.clone());
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ImageRecord> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
