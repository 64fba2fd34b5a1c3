use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use imagesearch_core::ImageService;
use imagesearch_core::LateResponsePolicy;
use imagesearch_core::SearchSettings;
use imagesearch_protocol::RpcError;
use imagesearch_protocol::SearchImagesRequest;
use imagesearch_protocol::SearchImagesResponse;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio::time::sleep;
use tracing::debug;
use tracing::trace;

use crate::event::ClickEvent;
use crate::event::FormChange;
use crate::event::PipelineState;
use crate::render::RenderBoundary;
use crate::render::RenderedOutput;
use crate::render::TIMED_OUT_SUMMARY;
use crate::result_index::ResultIndex;

enum PipelineCommand {
    Change(FormChange),
    Click(ClickEvent),
    Shutdown,
}

/// Result of one issued search, tagged with the generation it was issued
/// under and the request snapshot it was issued with.
struct Completion {
    generation: u64,
    request: SearchImagesRequest,
    result: Result<SearchImagesResponse, RpcError>,
}

/// Cloneable input side of a running search session.
#[derive(Clone)]
pub struct SearchPipelineHandle {
    tx: mpsc::UnboundedSender<PipelineCommand>,
    state: watch::Receiver<PipelineState>,
}

impl SearchPipelineHandle {
    /// Returns `false` once the session has shut down.
    pub fn change(&self, change: FormChange) -> bool {
        self.tx.send(PipelineCommand::Change(change)).is_ok()
    }

    pub fn click(&self, click: ClickEvent) -> bool {
        self.tx.send(PipelineCommand::Click(click)).is_ok()
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PipelineState> {
        self.state.clone()
    }
}

/// One open search surface. All session state is owned by a single task, so
/// the generation counter and timers are never shared.
pub struct SearchPipeline {
    handle: SearchPipelineHandle,
    task: JoinHandle<()>,
}

impl SearchPipeline {
    pub fn spawn(
        settings: SearchSettings,
        service: ImageService,
        boundary: Arc<dyn RenderBoundary>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(PipelineState::Idle);
        let actor = PipelineActor {
            settings,
            service,
            boundary,
            state: state_tx,
            request: SearchImagesRequest::default(),
            generation: 0,
            timed_out: None,
            last_failed: false,
            index: ResultIndex::new(),
        };
        let task = tokio::spawn(actor.run(rx));
        Self {
            handle: SearchPipelineHandle {
                tx,
                state: state_rx,
            },
            task,
        }
    }

    pub fn handle(&self) -> SearchPipelineHandle {
        self.handle.clone()
    }

    /// Stops the session. In-flight calls are dropped with it.
    pub async fn shutdown(self) {
        let _ = self.handle.tx.send(PipelineCommand::Shutdown);
        if let Err(err) = self.task.await {
            debug!("search pipeline task ended abnormally: {err}");
        }
    }
}

struct PipelineActor {
    settings: SearchSettings,
    service: ImageService,
    boundary: Arc<dyn RenderBoundary>,
    state: watch::Sender<PipelineState>,
    request: SearchImagesRequest,
    generation: u64,
    timed_out: Option<u64>,
    last_failed: bool,
    index: ResultIndex,
}

impl PipelineActor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PipelineCommand>) {
        let mut token_changes = self.service.executor().auth().subscribe();
        let mut watching_tokens = true;
        let mut debounce: Option<Pin<Box<Sleep>>> = None;
        let mut ui_timeout: Option<Pin<Box<Sleep>>> = None;
        let mut in_flight: FuturesUnordered<BoxFuture<'static, Completion>> =
            FuturesUnordered::new();

        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(command) = maybe else { break; };
                    match command {
                        PipelineCommand::Change(change) => {
                            self.apply_change(change);
                            debounce = Some(Box::pin(sleep(self.settings.debounce())));
                            self.set_state(PipelineState::Debouncing);
                        }
                        PipelineCommand::Click(ClickEvent::Image(id)) => self.open_image(&id),
                        PipelineCommand::Click(ClickEvent::NextPage(page)) => {
                            self.apply_change(FormChange::Page(page));
                            debounce = Some(Box::pin(sleep(self.settings.debounce())));
                            self.set_state(PipelineState::Debouncing);
                        }
                        PipelineCommand::Shutdown => break,
                    }
                }
                _ = async {
                    if let Some(timer) = &mut debounce {
                        timer.await;
                    }
                }, if debounce.is_some() => {
                    debounce = None;
                    match self.flush() {
                        Some(call) => {
                            in_flight.push(call);
                            ui_timeout = Some(Box::pin(sleep(self.settings.timeout())));
                        }
                        None => ui_timeout = None,
                    }
                }
                _ = async {
                    if let Some(timer) = &mut ui_timeout {
                        timer.await;
                    }
                }, if ui_timeout.is_some() => {
                    ui_timeout = None;
                    self.on_timeout(debounce.is_some());
                }
                Some(done) = in_flight.next(), if !in_flight.is_empty() => {
                    if self.on_completion(done, debounce.is_some()) {
                        ui_timeout = None;
                    }
                }
                changed = token_changes.changed(), if watching_tokens => {
                    if changed.is_err() {
                        watching_tokens = false;
                        continue;
                    }
                    let has_token = token_changes.borrow_and_update().is_some();
                    if has_token && self.last_failed && debounce.is_none() {
                        debug!("access token changed after a failed search; searching again");
                        self.last_failed = false;
                        debounce = Some(Box::pin(sleep(self.settings.debounce())));
                        self.set_state(PipelineState::Debouncing);
                    }
                }
            }
        }
        debug!(generation = self.generation, "search pipeline stopped");
    }

    fn apply_change(&mut self, change: FormChange) {
        match change {
            FormChange::Query(query) => self.request.query = query,
            FormChange::Page(page) => self.request.page = page.max(1),
        }
        trace!(query = %self.request.query, page = self.request.page, "search request changed");
    }

    fn is_sufficient(&self) -> bool {
        self.request.query.chars().count() >= self.settings.min_query_chars
    }

    /// Debounce window elapsed: either issue a call for the latest request or
    /// clear the surface.
    fn flush(&mut self) -> Option<BoxFuture<'static, Completion>> {
        // Advancing the generation here also supersedes any call still in
        // flight, so a cleared surface is never repopulated by it.
        self.generation += 1;
        self.timed_out = None;
        self.last_failed = false;

        if !self.is_sufficient() {
            debug!(generation = self.generation, "query too short; clearing results");
            self.index.clear();
            self.boundary.render(RenderedOutput::empty());
            self.set_state(PipelineState::Idle);
            return None;
        }

        let generation = self.generation;
        let request = self.request.clone();
        debug!(generation, query = %request.query, page = request.page, "issuing search");
        self.set_state(PipelineState::InFlight);
        self.boundary.render(RenderedOutput::working());

        let service = self.service.clone();
        Some(Box::pin(async move {
            let result = service.search_images(request.clone()).await;
            Completion {
                generation,
                request,
                result,
            }
        }))
    }

    fn on_timeout(&mut self, debouncing: bool) {
        debug!(generation = self.generation, "search timed out");
        self.timed_out = Some(self.generation);
        self.set_state(PipelineState::TimedOut);
        self.boundary.render(RenderedOutput::message(TIMED_OUT_SUMMARY));
        self.settle(debouncing);
    }

    /// Returns whether the completion belonged to the current generation and
    /// was applied. `debouncing` is set when a newer edit is waiting for its
    /// flush.
    fn on_completion(&mut self, done: Completion, debouncing: bool) -> bool {
        if done.generation != self.generation {
            trace!(
                generation = done.generation,
                latest = self.generation,
                "discarding stale search result"
            );
            return false;
        }
        if self.timed_out == Some(done.generation) {
            match self.settings.late_response {
                LateResponsePolicy::Render => {
                    debug!(generation = done.generation, "rendering late search result");
                }
                LateResponsePolicy::Drop => {
                    debug!(generation = done.generation, "dropping late search result");
                    return false;
                }
            }
        }

        match done.result {
            Ok(response) => {
                self.index.replace(&response.image);
                self.set_state(PipelineState::Rendering);
                self.boundary
                    .render(RenderedOutput::from_response(&response, done.request.page));
            }
            Err(err) => {
                self.last_failed = true;
                self.set_state(PipelineState::Failed);
                self.boundary.render(RenderedOutput::message(err.message));
            }
        }
        self.settle(debouncing);
        true
    }

    /// State after an outcome was published. A pending flush keeps the
    /// session in `Debouncing`.
    fn settle(&self, debouncing: bool) {
        if debouncing {
            self.set_state(PipelineState::Debouncing);
        } else {
            self.set_state(PipelineState::Idle);
        }
    }

    fn open_image(&self, id: &str) {
        match self.index.get(id) {
            Some(image) => self.boundary.open_image(image),
            None => trace!(id, "click on unknown image ignored"),
        }
    }

    fn set_state(&self, state: PipelineState) {
        trace!(%state, "search pipeline state");
        self.state.send_replace(state);
    }
}
