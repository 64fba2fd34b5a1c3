//! Terminal implementations of the collaborators the executor and the search
//! pipeline call into.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use async_trait::async_trait;
use imagesearch_core::Notifier;
use imagesearch_core::PromptChoice;
use imagesearch_core::RetryPrompt;
use imagesearch_core::UserPrompt;
use imagesearch_protocol::ImageRecord;
use imagesearch_search_panel::RenderBoundary;
use imagesearch_search_panel::RenderedOutput;
use tokio::io::AsyncBufReadExt;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::warn;

#[derive(Default)]
struct PromptSlot {
    pending: Option<oneshot::Sender<String>>,
    closed: bool,
}

fn lock(slot: &Mutex<PromptSlot>) -> MutexGuard<'_, PromptSlot> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Starts the single stdin reader. A line answers the outstanding retry
/// prompt if there is one, otherwise it is forwarded on the returned channel.
pub fn spawn_stdin_router() -> (ConsolePrompt, mpsc::UnboundedReceiver<String>) {
    let slot = Arc::new(Mutex::new(PromptSlot::default()));
    let (tx, rx) = mpsc::unbounded_channel();
    let reader_slot = Arc::clone(&slot);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let pending = lock(&reader_slot).pending.take();
                    match pending {
                        Some(answer) => {
                            let _ = answer.send(line);
                        }
                        None => {
                            let _ = tx.send(line);
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("failed to read stdin: {err}");
                    break;
                }
            }
        }
        let mut slot = lock(&reader_slot);
        slot.closed = true;
        slot.pending = None;
    });
    (ConsolePrompt { slot }, rx)
}

/// Retry prompt answered by the next stdin line.
pub struct ConsolePrompt {
    slot: Arc<Mutex<PromptSlot>>,
}

#[async_trait]
impl UserPrompt for ConsolePrompt {
    async fn ask(&self, prompt: RetryPrompt) -> Option<PromptChoice> {
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = lock(&self.slot);
            if slot.closed {
                return None;
            }
            slot.pending = Some(tx);
        }
        eprintln!("{} Retry? [r]etry/[c]ancel", prompt.text());
        let answer = rx.await.ok()?;
        Some(parse_prompt_answer(&answer))
    }
}

pub fn parse_prompt_answer(line: &str) -> PromptChoice {
    match line.trim().to_ascii_lowercase().as_str() {
        "r" | "retry" => PromptChoice::Retry,
        _ => PromptChoice::Cancel,
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn warn(&self, message: &str) {
        eprintln!("warning: {message}");
    }

    fn error(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct ConsoleBoundary;

impl RenderBoundary for ConsoleBoundary {
    fn render(&self, output: RenderedOutput) {
        print_output(&output);
    }

    fn open_image(&self, image: &ImageRecord) {
        println!("{}", describe_image(image));
    }
}

pub fn print_output(output: &RenderedOutput) {
    if output.is_empty() {
        println!("(cleared)");
        return;
    }
    println!("{}", output.summary_markup);
    if !output.results_markup.is_empty() {
        println!("{}", output.results_markup);
    }
}

pub fn describe_image(image: &ImageRecord) -> String {
    let mut out = format!("{} [{}]", image.display_name(), image.id.as_deref().unwrap_or("-"));
    if let Some(description) = &image.description {
        out.push_str(&format!("\n  {description}"));
    }
    if let Some(url) = &image.thumbnail_url {
        out.push_str(&format!("\n  {url}"));
    }
    out
}
