//! Type-ahead image search session: debounced input, one logical in-flight
//! search, stale-result suppression and a client-side timeout, feeding a
//! [`RenderBoundary`].

mod event;
mod pipeline;
pub mod render;
mod result_index;

pub use event::ClickEvent;
pub use event::FormChange;
pub use event::PipelineState;
pub use pipeline::SearchPipeline;
pub use pipeline::SearchPipelineHandle;
pub use render::RenderBoundary;
pub use render::RenderedOutput;
pub use result_index::ResultIndex;
