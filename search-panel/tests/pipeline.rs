use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use imagesearch_core::AccessToken;
use imagesearch_core::AuthManager;
use imagesearch_core::CallExecutor;
use imagesearch_core::CallMetadata;
use imagesearch_core::DismissedPrompt;
use imagesearch_core::ImageSearchTransport;
use imagesearch_core::ImageService;
use imagesearch_core::LateResponsePolicy;
use imagesearch_core::SearchSettings;
use imagesearch_core::TracingNotifier;
use imagesearch_protocol::ImageRecord;
use imagesearch_protocol::RpcCode;
use imagesearch_protocol::RpcError;
use imagesearch_protocol::SearchImagesRequest;
use imagesearch_protocol::SearchImagesResponse;
use imagesearch_search_panel::ClickEvent;
use imagesearch_search_panel::FormChange;
use imagesearch_search_panel::PipelineState;
use imagesearch_search_panel::RenderBoundary;
use imagesearch_search_panel::RenderedOutput;
use imagesearch_search_panel::SearchPipeline;
use imagesearch_search_panel::SearchPipelineHandle;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::sync::oneshot;

type Reply = Result<SearchImagesResponse, RpcError>;

/// A call the pipeline issued and that the test answers explicitly.
struct PendingCall {
    request: SearchImagesRequest,
    authorization: Option<String>,
    respond: oneshot::Sender<Reply>,
}

impl PendingCall {
    fn reply(self, reply: Reply) {
        let _ = self.respond.send(reply);
    }
}

struct ScriptedTransport {
    calls: mpsc::UnboundedSender<PendingCall>,
}

#[async_trait]
impl ImageSearchTransport for ScriptedTransport {
    async fn search_images(&self, request: SearchImagesRequest, metadata: CallMetadata) -> Reply {
        let (respond, rx) = oneshot::channel();
        let call = PendingCall {
            request,
            authorization: metadata.authorization().map(str::to_string),
            respond,
        };
        if self.calls.send(call).is_err() {
            return Err(RpcError::new(RpcCode::Unavailable, "test harness gone"));
        }
        rx.await
            .unwrap_or_else(|_| Err(RpcError::new(RpcCode::Unavailable, "reply dropped")))
    }
}

struct RecordingBoundary {
    renders: mpsc::UnboundedSender<RenderedOutput>,
    opened: mpsc::UnboundedSender<ImageRecord>,
}

impl RenderBoundary for RecordingBoundary {
    fn render(&self, output: RenderedOutput) {
        let _ = self.renders.send(output);
    }

    fn open_image(&self, image: &ImageRecord) {
        let _ = self.opened.send(image.clone());
    }
}

struct Harness {
    pipeline: SearchPipeline,
    handle: SearchPipelineHandle,
    auth: Arc<AuthManager>,
    calls: mpsc::UnboundedReceiver<PendingCall>,
    renders: mpsc::UnboundedReceiver<RenderedOutput>,
    opened: mpsc::UnboundedReceiver<ImageRecord>,
}

impl Harness {
    fn start(settings: SearchSettings) -> Self {
        let auth = AuthManager::shared(None, None);
        let (calls_tx, calls) = mpsc::unbounded_channel();
        let (renders_tx, renders) = mpsc::unbounded_channel();
        let (opened_tx, opened) = mpsc::unbounded_channel();

        let executor = CallExecutor::new(
            auth.clone(),
            Arc::new(DismissedPrompt),
            Arc::new(TracingNotifier),
        );
        let transport = Arc::new(ScriptedTransport { calls: calls_tx });
        let service = ImageService::new(executor, transport);
        let boundary = Arc::new(RecordingBoundary {
            renders: renders_tx,
            opened: opened_tx,
        });
        let pipeline = SearchPipeline::spawn(settings, service, boundary);
        let handle = pipeline.handle();
        Self {
            pipeline,
            handle,
            auth,
            calls,
            renders,
            opened,
        }
    }

    fn query(&self, query: &str) {
        assert!(self.handle.change(FormChange::Query(query.to_string())));
    }

    async fn next_call(&mut self) -> PendingCall {
        self.calls.recv().await.expect("pipeline issued no call")
    }

    async fn next_render(&mut self) -> RenderedOutput {
        self.renders.recv().await.expect("pipeline stopped rendering")
    }

    /// Waits for the "Working..." render and the call that follows it.
    async fn issued(&mut self) -> PendingCall {
        assert_eq!(self.next_render().await, RenderedOutput::working());
        self.next_call().await
    }
}

fn settings() -> SearchSettings {
    SearchSettings::default()
}

fn image(id: &str, name: &str) -> ImageRecord {
    ImageRecord {
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        ..Default::default()
    }
}

fn response(
    images: Vec<ImageRecord>,
    total: u64,
    next_page: Option<u32>,
) -> SearchImagesResponse {
    SearchImagesResponse {
        image: images,
        next_page,
        total_images: total,
    }
}

#[tokio::test(start_paused = true)]
async fn burst_of_edits_issues_one_call_for_the_latest_query() {
    let mut h = Harness::start(settings());

    for query in ["alp", "alpi", "alpin", "alpine"] {
        h.query(query);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(h.calls.try_recv().is_err());
    }

    let call = h.issued().await;
    assert_eq!(call.request, SearchImagesRequest::new("alpine", 1));
    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));

    let rendered = h.next_render().await;
    assert_eq!(rendered.summary_markup, "Showing image 1-1 of 1");
    assert!(h.calls.try_recv().is_err());
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn short_query_clears_without_calling_the_backend() {
    let mut h = Harness::start(settings());

    h.query("al");
    assert_eq!(h.next_render().await, RenderedOutput::empty());
    assert!(h.calls.try_recv().is_err());
    assert_eq!(h.handle.state(), PipelineState::Idle);
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shrinking_below_minimum_clears_rendered_results() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;
    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));
    assert_eq!(h.next_render().await.summary_markup, "Showing image 1-1 of 1");

    h.query("al");
    assert_eq!(h.next_render().await, RenderedOutput::empty());

    // The cleared result set no longer resolves clicks.
    assert!(h.handle.click(ClickEvent::Image("a".to_string())));
    h.query("x");
    assert_eq!(h.next_render().await, RenderedOutput::empty());
    assert!(h.opened.try_recv().is_err());
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn response_for_a_superseded_request_is_discarded() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let first = h.issued().await;

    h.query("alpines");
    let second = h.issued().await;
    assert_eq!(second.request.query, "alpines");

    second.reply(Ok(response(vec![image("b", "Alpines")], 7, None)));
    assert_eq!(h.next_render().await.summary_markup, "Showing image 1-1 of 7");

    // Arrives last but belongs to an older generation.
    first.reply(Ok(response(vec![image("a", "Alpine")], 99, None)));
    h.query("al");
    assert_eq!(h.next_render().await, RenderedOutput::empty());
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn cleared_query_invalidates_the_call_in_flight() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;

    h.query("a");
    assert_eq!(h.next_render().await, RenderedOutput::empty());

    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));
    h.query("b");
    assert_eq!(h.next_render().await, RenderedOutput::empty());
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn slow_search_shows_timed_out() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let _call = h.issued().await;

    let rendered = h.next_render().await;
    assert_eq!(rendered, RenderedOutput::message("Timed out."));
    assert_eq!(h.handle.state(), PipelineState::Idle);
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_response_is_rendered_by_default() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;
    assert_eq!(h.next_render().await, RenderedOutput::message("Timed out."));

    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));
    assert_eq!(h.next_render().await.summary_markup, "Showing image 1-1 of 1");

    assert!(h.handle.click(ClickEvent::Image("a".to_string())));
    let opened = h.opened.recv().await.expect("image opened");
    assert_eq!(opened.name.as_deref(), Some("Alpine"));
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_response_can_be_dropped() {
    let mut h = Harness::start(SearchSettings {
        late_response: LateResponsePolicy::Drop,
        ..settings()
    });

    h.query("alpine");
    let call = h.issued().await;
    assert_eq!(h.next_render().await, RenderedOutput::message("Timed out."));

    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));
    h.query("al");
    assert_eq!(h.next_render().await, RenderedOutput::empty());
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failure_renders_the_error_message() {
    let mut h = Harness::start(settings());
    let states = h.handle.subscribe_state();

    h.query("alpine");
    let call = h.issued().await;
    assert_eq!(*states.borrow(), PipelineState::InFlight);
    call.reply(Err(RpcError::new(RpcCode::Unavailable, "backend down")));

    assert_eq!(h.next_render().await, RenderedOutput::message("backend down"));
    assert_eq!(*states.borrow(), PipelineState::Idle);
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn clicks_resolve_through_the_last_result_set() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;
    call.reply(Ok(response(
        vec![image("a", "Alpine"), image("b", "Lake")],
        2,
        None,
    )));
    h.next_render().await;

    assert_eq!(h.handle.state(), PipelineState::Idle);
    assert!(h.handle.click(ClickEvent::Image("missing".to_string())));
    assert!(h.handle.click(ClickEvent::Image("b".to_string())));
    let opened = h.opened.recv().await.expect("image opened");
    assert_eq!(opened.id.as_deref(), Some("b"));
    assert!(h.opened.try_recv().is_err());
    assert_eq!(h.handle.state(), PipelineState::Idle);

    // The unknown id left the index untouched.
    assert!(h.handle.click(ClickEvent::Image("a".to_string())));
    let opened = h.opened.recv().await.expect("image opened");
    assert_eq!(opened.id.as_deref(), Some("a"));
    assert!(h.renders.try_recv().is_err());
    assert!(h.calls.try_recv().is_err());
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn next_page_searches_again_and_summarises_from_that_page() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;
    call.reply(Ok(response(
        vec![image("a", "1"), image("b", "2"), image("c", "3")],
        42,
        Some(2),
    )));
    assert_eq!(h.next_render().await.summary_markup, "Showing image 1-3 of 42");

    assert!(h.handle.click(ClickEvent::NextPage(2)));
    let call = h.issued().await;
    assert_eq!(call.request, SearchImagesRequest::new("alpine", 2));
    call.reply(Ok(response(
        vec![image("d", "4"), image("e", "5"), image("f", "6")],
        42,
        Some(3),
    )));
    let rendered = h.next_render().await;
    assert_eq!(rendered.summary_markup, "Showing image 2-4 of 42");
    assert!(rendered.results_markup.contains("data-next-page=\"3\""));
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_token_after_failure_repeats_the_search() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;
    assert_eq!(call.authorization, None);
    call.reply(Err(RpcError::new(RpcCode::PermissionDenied, "sign in first")));
    assert_eq!(h.next_render().await, RenderedOutput::message("sign in first"));

    h.auth.set_token(AccessToken::new("tok"));
    let call = h.issued().await;
    assert_eq!(call.request, SearchImagesRequest::new("alpine", 1));
    assert_eq!(call.authorization.as_deref(), Some("Bearer tok"));
    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));
    assert_eq!(h.next_render().await.summary_markup, "Showing image 1-1 of 1");
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_token_after_success_does_not_search_again() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;
    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));
    assert_eq!(h.next_render().await.summary_markup, "Showing image 1-1 of 1");

    h.auth.set_token(AccessToken::new("tok"));
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(h.calls.try_recv().is_err());
    assert!(h.renders.try_recv().is_err());
    assert_eq!(h.handle.state(), PipelineState::Idle);
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn completion_keeps_debouncing_while_a_newer_edit_waits() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let call = h.issued().await;

    h.query("alpines");
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(h.handle.state(), PipelineState::Debouncing);
    call.reply(Ok(response(vec![image("a", "Alpine")], 1, None)));
    assert_eq!(h.next_render().await.summary_markup, "Showing image 1-1 of 1");
    assert_eq!(h.handle.state(), PipelineState::Debouncing);

    let call = h.issued().await;
    assert_eq!(call.request.query, "alpines");
    assert_eq!(h.handle.state(), PipelineState::InFlight);
    call.reply(Ok(response(vec![image("b", "Alpines")], 1, None)));
    h.next_render().await;
    assert_eq!(h.handle.state(), PipelineState::Idle);
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn timeout_keeps_debouncing_while_a_newer_edit_waits() {
    let mut h = Harness::start(settings());

    h.query("alpine");
    let _call = h.issued().await;

    tokio::time::sleep(Duration::from_millis(9_900)).await;
    h.query("alpines");
    assert_eq!(h.next_render().await, RenderedOutput::message("Timed out."));
    assert_eq!(h.handle.state(), PipelineState::Debouncing);

    let call = h.issued().await;
    assert_eq!(call.request.query, "alpines");
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_accepting_input() {
    let h = Harness::start(settings());
    let handle = h.handle.clone();
    h.pipeline.shutdown().await;
    assert!(!handle.change(FormChange::Query("alpine".to_string())));
}
