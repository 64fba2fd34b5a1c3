/// Edit coming from the search form. Each one mutates the session's current
/// request in place and re-enters the debounce window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FormChange {
    Query(String),
    Page(u32),
}

/// Click on rendered output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClickEvent {
    /// An image entry, identified by its external id.
    Image(String),
    /// The "next page" control, carrying the page to load.
    NextPage(u32),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display)]
pub enum PipelineState {
    #[default]
    Idle,
    Debouncing,
    InFlight,
    Rendering,
    TimedOut,
    Failed,
}
