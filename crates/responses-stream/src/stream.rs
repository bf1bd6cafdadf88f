use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace, warn};

use crate::errors::StreamError;
use crate::events::{
    FunctionCallArgumentsDoneEvent, StreamEvent, StreamingErrorEvent, decode_event,
};
use crate::executor::RequestExecutor;
use crate::partial_json::{parse_partial, parse_partial_map};
use crate::response::{ParsedResponse, Response, parse_structured};
use crate::sse::FrameReader;
use crate::tools::{FunctionToolCall, FunctionToolCallOutput, ToolExecutor};
use crate::transport::HttpRequest;

/// Lifecycle of a [`ResponseStream`]. `Completed`, `Failed` and `Cancelled`
/// are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StreamState {
    NotStarted = 0,
    Running = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
}

impl StreamState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::NotStarted,
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Failed,
            _ => Self::Cancelled,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

struct SessionShared {
    id: uuid::Uuid,
    state: AtomicU8,
    cancelled: AtomicBool,
    abort_tx: watch::Sender<bool>,
}

impl SessionShared {
    fn state(&self) -> StreamState {
        StreamState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn transition(&self, from: StreamState, to: StreamState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        if self.state().is_terminal() {
            return;
        }
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            debug!(session_id = %self.id, state = ?self.state(), "stream cancellation requested");
        }
        self.abort_tx.send_replace(true);
    }
}

/// Cloneable handle that cancels a stream from another task or from inside
/// an observer.
#[derive(Clone)]
pub struct CancelHandle {
    shared: Arc<SessionShared>,
}

impl CancelHandle {
    /// Requests cancellation. Idempotent; a no-op once the stream is terminal.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }
}

type EventHandler = Box<dyn FnMut(&StreamEvent) + Send>;
type TextDeltaHandler = Box<dyn FnMut(&str) + Send>;
type ToolCallHandler = Box<dyn FnMut(&str, &str) + Send>;
type ToolResultHandler = Box<dyn FnMut(&str, &FunctionToolCallOutput) + Send>;
type PartialHandler = Box<dyn FnMut(&str) + Send>;
type CompleteHandler = Box<dyn FnMut(&Response) + Send>;
type ParsedHandler<T> = Box<dyn FnMut(&ParsedResponse<T>) + Send>;
type ErrorHandler = Box<dyn FnMut(&StreamError) + Send>;

struct Observers<T> {
    on_event: Vec<EventHandler>,
    on_text_delta: Vec<TextDeltaHandler>,
    on_tool_call: Vec<ToolCallHandler>,
    on_tool_result: Vec<ToolResultHandler>,
    on_partial: Vec<PartialHandler>,
    on_complete: Vec<CompleteHandler>,
    on_parsed_complete: Vec<ParsedHandler<T>>,
    on_error: Vec<ErrorHandler>,
    tools: Option<Arc<dyn ToolExecutor>>,
}

impl<T> Default for Observers<T> {
    fn default() -> Self {
        Self {
            on_event: Vec::new(),
            on_text_delta: Vec::new(),
            on_tool_call: Vec::new(),
            on_tool_result: Vec::new(),
            on_partial: Vec::new(),
            on_complete: Vec::new(),
            on_parsed_complete: Vec::new(),
            on_error: Vec::new(),
            tools: None,
        }
    }
}

struct Completion<T> {
    response: Response,
    text: String,
    parsed: Option<Result<T, StreamError>>,
}

type Outcome<T> = Result<Completion<T>, StreamError>;

/// Everything the worker takes ownership of at `start()`.
struct Pending<T> {
    executor: RequestExecutor,
    request: HttpRequest,
    observers: Observers<T>,
    abort_rx: watch::Receiver<bool>,
    final_tx: oneshot::Sender<Outcome<T>>,
}

/// One streamed request: opens the connection, decodes SSE events, and fans
/// them out to registered observers on a dedicated Tokio task.
///
/// Observers are registered before [`ResponseStream::start`]; they run
/// sequentially on the worker in event order. The terminal outcome is
/// delivered exactly once, to the completion observers or the error
/// observers, and to whichever awaiting accessor consumes the stream.
///
/// ```no_run
/// # use responses_stream::prelude::*;
/// # async fn demo(responder: Responder) -> Result<(), StreamError> {
/// let request = ResponseRequest::new("gpt-5-nano").user_text("Say hello");
/// let text = responder
///     .stream(&request)?
///     .on_text_delta(|delta| print!("{delta}"))
///     .text()
///     .await?;
/// # let _ = text;
/// # Ok(())
/// # }
/// ```
pub struct ResponseStream<T = ()> {
    shared: Arc<SessionShared>,
    structured: bool,
    pending: Mutex<Option<Pending<T>>>,
    final_rx: oneshot::Receiver<Outcome<T>>,
}

impl ResponseStream<()> {
    /// Creates a plain text stream for an already-built request.
    pub fn new(executor: RequestExecutor, request: HttpRequest) -> Self {
        Self::build(executor, request, false)
    }
}

impl<T> ResponseStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    /// Creates a stream whose final text is decoded into `T` on completion.
    pub fn structured(executor: RequestExecutor, request: HttpRequest) -> Self {
        Self::build(executor, request, true)
    }

    fn build(executor: RequestExecutor, request: HttpRequest, structured: bool) -> Self {
        let (abort_tx, abort_rx) = watch::channel(false);
        let (final_tx, final_rx) = oneshot::channel();
        let shared = Arc::new(SessionShared {
            id: uuid::Uuid::new_v4(),
            state: AtomicU8::new(StreamState::NotStarted as u8),
            cancelled: AtomicBool::new(false),
            abort_tx,
        });
        Self {
            shared,
            structured,
            pending: Mutex::new(Some(Pending {
                executor,
                request,
                observers: Observers::default(),
                abort_rx,
                final_tx,
            })),
            final_rx,
        }
    }

    /// Session id used in log records.
    pub fn id(&self) -> uuid::Uuid {
        self.shared.id
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.is_cancelled()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            shared: self.shared.clone(),
        }
    }

    /// Requests cancellation and aborts the in-flight request, if any.
    ///
    /// Idempotent and valid in any state. No observer runs after the worker
    /// sees the flag; awaiting accessors then return
    /// [`StreamError::Cancelled`].
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Spawns the read loop and returns immediately.
    ///
    /// Requires a Tokio runtime. A second call returns
    /// [`StreamError::AlreadyStarted`].
    pub fn start(&self) -> Result<(), StreamError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            StreamError::Config("ResponseStream::start requires a Tokio runtime".into())
        })?;
        if !self
            .shared
            .transition(StreamState::NotStarted, StreamState::Running)
        {
            return Err(StreamError::AlreadyStarted);
        }
        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(StreamError::AlreadyStarted)?;
        debug!(session_id = %self.shared.id, url = %pending.request.url, structured = self.structured, "starting response stream");
        runtime.spawn(run_session(self.shared.clone(), pending, self.structured));
        Ok(())
    }

    /// Called for every decoded event, in arrival order.
    pub fn on_event(self, handler: impl FnMut(&StreamEvent) + Send + 'static) -> Self {
        self.register("on_event", |o| o.on_event.push(Box::new(handler)))
    }

    /// Called with each `response.output_text.delta` fragment.
    pub fn on_text_delta(self, handler: impl FnMut(&str) + Send + 'static) -> Self {
        self.register("on_text_delta", |o| o.on_text_delta.push(Box::new(handler)))
    }

    /// Called with `(name, arguments)` when a function call's arguments are
    /// complete.
    pub fn on_tool_call(self, handler: impl FnMut(&str, &str) + Send + 'static) -> Self {
        self.register("on_tool_call", |o| o.on_tool_call.push(Box::new(handler)))
    }

    /// Called with `(name, output)` after a bound tool ran successfully.
    pub fn on_tool_result(
        self,
        handler: impl FnMut(&str, &FunctionToolCallOutput) + Send + 'static,
    ) -> Self {
        self.register("on_tool_result", |o| o.on_tool_result.push(Box::new(handler)))
    }

    /// Binds a tool executor; matching function calls run inline on the
    /// stream worker.
    pub fn with_tools(self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.register("with_tools", |o| o.tools = Some(tools))
    }

    /// Called after each text delta with the accumulated text decoded into
    /// `P`, whenever it parses. `P` should tolerate missing fields.
    pub fn on_partial_parsed<P>(self, mut handler: impl FnMut(P) + Send + 'static) -> Self
    where
        P: DeserializeOwned + 'static,
    {
        self.register("on_partial_parsed", |o| {
            o.on_partial.push(Box::new(move |text: &str| {
                if let Some(partial) = parse_partial::<P>(text) {
                    handler(partial);
                }
            }))
        })
    }

    /// Schema-less variant of [`ResponseStream::on_partial_parsed`]; empty
    /// maps are skipped.
    pub fn on_partial_json(
        self,
        mut handler: impl FnMut(&Map<String, Value>) + Send + 'static,
    ) -> Self {
        self.register("on_partial_json", |o| {
            o.on_partial.push(Box::new(move |text: &str| {
                if let Some(map) = parse_partial_map(text).filter(|m| !m.is_empty()) {
                    handler(&map);
                }
            }))
        })
    }

    /// Called once with the terminal response of a successful stream.
    pub fn on_complete(self, handler: impl FnMut(&Response) + Send + 'static) -> Self {
        self.register("on_complete", |o| o.on_complete.push(Box::new(handler)))
    }

    /// Called once with the decoded structured output. Ignored on plain
    /// text streams.
    pub fn on_parsed_complete(
        self,
        handler: impl FnMut(&ParsedResponse<T>) + Send + 'static,
    ) -> Self {
        if !self.structured {
            warn!(session_id = %self.shared.id, "on_parsed_complete ignored on a non-structured stream");
            return self;
        }
        self.register("on_parsed_complete", |o| {
            o.on_parsed_complete.push(Box::new(handler))
        })
    }

    /// Called for every surfaced error (terminal ones and tool failures).
    pub fn on_error(self, handler: impl FnMut(&StreamError) + Send + 'static) -> Self {
        self.register("on_error", |o| o.on_error.push(Box::new(handler)))
    }

    fn register(mut self, observer: &'static str, add: impl FnOnce(&mut Observers<T>)) -> Self {
        match self.pending.get_mut() {
            Ok(Some(pending)) => add(&mut pending.observers),
            _ => {
                warn!(session_id = %self.shared.id, observer, "observer registered after start; ignored")
            }
        }
        self
    }

    /// Waits for the terminal response. Starts the stream if needed.
    pub async fn response(self) -> Result<Response, StreamError> {
        Ok(self.wait().await?.response)
    }

    /// Waits for completion and returns the concatenated text deltas, or the
    /// response's output text when no deltas were streamed.
    pub async fn text(self) -> Result<String, StreamError> {
        Ok(self.wait().await?.text)
    }

    /// Waits for completion and returns the decoded structured output.
    pub async fn parsed(self) -> Result<ParsedResponse<T>, StreamError> {
        if !self.structured {
            return Err(StreamError::Validation(
                "parsed() is only available on structured streams".into(),
            ));
        }
        let completion = self.wait().await?;
        match completion.parsed {
            Some(Ok(parsed)) => Ok(ParsedResponse {
                response: completion.response,
                parsed,
            }),
            Some(Err(err)) => Err(err),
            None => Err(StreamError::Protocol(
                "structured stream completed without a parse result".into(),
            )),
        }
    }

    async fn wait(self) -> Outcome<T> {
        match self.start() {
            Ok(()) | Err(StreamError::AlreadyStarted) => {}
            Err(err) => return Err(err),
        }
        let Self { final_rx, .. } = self;
        final_rx.await.unwrap_or_else(|_| {
            Err(StreamError::Protocol(
                "stream worker ended without a result".into(),
            ))
        })
    }
}

async fn run_session<T>(shared: Arc<SessionShared>, pending: Pending<T>, structured: bool)
where
    T: DeserializeOwned + Send + 'static,
{
    let Pending {
        executor,
        request,
        observers,
        mut abort_rx,
        final_tx,
    } = pending;
    let mut worker = SessionWorker {
        shared,
        observers,
        structured,
        accumulated: String::new(),
        last_sequence: None,
        incomplete: None,
        call_ids: HashMap::new(),
    };
    let outcome = worker.drive(&executor, &request, &mut abort_rx).await;
    debug!(session_id = %worker.shared.id, state = ?worker.shared.state(), "response stream finished");
    let _ = final_tx.send(outcome);
}

async fn wait_cancelled(abort_rx: &mut watch::Receiver<bool>) {
    let sender_dropped = abort_rx.wait_for(|cancelled| *cancelled).await.is_err();
    if sender_dropped {
        std::future::pending::<()>().await;
    }
}

struct SessionWorker<T> {
    shared: Arc<SessionShared>,
    observers: Observers<T>,
    structured: bool,
    accumulated: String,
    last_sequence: Option<u64>,
    incomplete: Option<Response>,
    /// Function call item id to the `call_id` a `function_call_output` must echo.
    call_ids: HashMap<String, String>,
}

impl<T> SessionWorker<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn drive(
        &mut self,
        executor: &RequestExecutor,
        request: &HttpRequest,
        abort_rx: &mut watch::Receiver<bool>,
    ) -> Outcome<T> {
        if self.shared.is_cancelled() {
            return self.cancelled();
        }

        let opened = tokio::select! {
            biased;
            _ = wait_cancelled(abort_rx) => return self.cancelled(),
            opened = executor.execute(request) => opened,
        };
        let response = match opened {
            Ok(response) => response,
            Err(err) => return self.fail(err),
        };

        let mut reader = FrameReader::new(response.body);
        loop {
            if self.shared.is_cancelled() {
                return self.cancelled();
            }
            let next = tokio::select! {
                biased;
                _ = wait_cancelled(abort_rx) => return self.cancelled(),
                next = reader.next_payload() => next,
            };
            let payload = match next {
                Some(Ok(payload)) => payload,
                Some(Err(err)) => return self.fail(err),
                None => return self.ended_without_terminal(reader.saw_done()),
            };
            if self.shared.is_cancelled() {
                return self.cancelled();
            }
            match decode_event(&payload) {
                Ok(event) => {
                    if let Some(outcome) = self.dispatch(event) {
                        return outcome;
                    }
                }
                Err(failure) => {
                    warn!(session_id = %self.shared.id, error = %failure, "skipping undecodable stream event");
                }
            }
        }
    }

    fn dispatch(&mut self, event: StreamEvent) -> Option<Outcome<T>> {
        let sequence_number = event.sequence_number();
        trace!(session_id = %self.shared.id, event_type = event.event_type(), sequence_number, "stream event");
        if let Some(last) = self.last_sequence
            && sequence_number < last
        {
            debug!(session_id = %self.shared.id, sequence_number, last, "out-of-order sequence number");
        }
        self.last_sequence = Some(self.last_sequence.map_or(sequence_number, |last| last.max(sequence_number)));

        for handler in &mut self.observers.on_event {
            handler(&event);
        }

        match event {
            StreamEvent::OutputTextDelta(delta) => {
                self.text_delta(&delta.delta);
                None
            }
            StreamEvent::OutputItemAdded(added) => {
                self.record_call_id(&added.item);
                None
            }
            StreamEvent::OutputItemDone(done) => {
                self.record_call_id(&done.item);
                None
            }
            StreamEvent::FunctionCallArgumentsDone(done) => {
                self.function_call_done(done);
                None
            }
            StreamEvent::ResponseCompleted(completed) => Some(self.complete(completed.response)),
            StreamEvent::ResponseFailed(failed) => Some(self.response_failed(failed.response)),
            StreamEvent::Error(error) => Some(self.streaming_error(error)),
            StreamEvent::ResponseIncomplete(incomplete) => {
                self.incomplete = Some(incomplete.response);
                None
            }
            StreamEvent::Unknown(unknown) => {
                debug!(session_id = %self.shared.id, event_type = %unknown.event_type, "unrecognized event type");
                None
            }
            _ => None,
        }
    }

    fn text_delta(&mut self, delta: &str) {
        self.accumulated.push_str(delta);
        for handler in &mut self.observers.on_text_delta {
            handler(delta);
        }
        for handler in &mut self.observers.on_partial {
            handler(&self.accumulated);
        }
    }

    fn record_call_id(&mut self, item: &Value) {
        if item.get("type").and_then(Value::as_str) != Some("function_call") {
            return;
        }
        if let (Some(id), Some(call_id)) = (
            item.get("id").and_then(Value::as_str),
            item.get("call_id").and_then(Value::as_str),
        ) {
            self.call_ids.insert(id.to_string(), call_id.to_string());
        }
    }

    fn function_call_done(&mut self, done: FunctionCallArgumentsDoneEvent) {
        for handler in &mut self.observers.on_tool_call {
            handler(&done.name, &done.arguments);
        }
        let Some(tools) = self.observers.tools.clone() else {
            return;
        };
        if !tools.contains(&done.name) {
            return;
        }
        let call_id = self
            .call_ids
            .get(&done.item_id)
            .cloned()
            .unwrap_or(done.item_id);
        let call = FunctionToolCall {
            call_id,
            name: done.name,
            arguments: done.arguments,
        };
        debug!(session_id = %self.shared.id, tool = %call.name, "executing tool");
        match tools.execute(&call) {
            Ok(output) => {
                for handler in &mut self.observers.on_tool_result {
                    handler(&call.name, &output);
                }
            }
            Err(err) => {
                warn!(session_id = %self.shared.id, tool = %call.name, error = %err, "tool execution failed");
                self.notify_error(&StreamError::ToolExecution {
                    tool: call.name,
                    message: err.message,
                });
            }
        }
    }

    fn complete(&mut self, response: Response) -> Outcome<T> {
        for handler in &mut self.observers.on_complete {
            handler(&response);
        }
        let text = if self.accumulated.is_empty() {
            response.output_text().unwrap_or_default()
        } else {
            std::mem::take(&mut self.accumulated)
        };
        let parsed = self.structured.then(|| self.parse_final(&response, &text));
        self.shared
            .transition(StreamState::Running, StreamState::Completed);
        Ok(Completion {
            response,
            text,
            parsed,
        })
    }

    fn parse_final(&mut self, response: &Response, text: &str) -> Result<T, StreamError> {
        match parse_structured::<T>(text) {
            Ok(value) => {
                let parsed = ParsedResponse {
                    response: response.clone(),
                    parsed: value,
                };
                for handler in &mut self.observers.on_parsed_complete {
                    handler(&parsed);
                }
                Ok(parsed.parsed)
            }
            Err(err) => {
                self.notify_error(&err);
                Err(err)
            }
        }
    }

    /// `response.failed` carries a well-formed terminal response, so the
    /// session ends `Completed` while surfacing the failure as an error.
    fn response_failed(&mut self, response: Response) -> Outcome<T> {
        let err = StreamError::ResponseFailed {
            message: response
                .error_message()
                .unwrap_or("unknown error")
                .to_string(),
        };
        self.notify_error(&err);
        self.shared
            .transition(StreamState::Running, StreamState::Completed);
        Err(err)
    }

    fn streaming_error(&mut self, event: StreamingErrorEvent) -> Outcome<T> {
        self.fail(StreamError::Streaming {
            code: event.code,
            message: event.message,
        })
    }

    fn ended_without_terminal(&mut self, saw_done: bool) -> Outcome<T> {
        let reason = match &self.incomplete {
            Some(response) => format!(
                "response incomplete: {}",
                response
                    .incomplete_details
                    .as_ref()
                    .map(Value::to_string)
                    .unwrap_or_else(|| "no details".into())
            ),
            None if saw_done => "stream finished before a terminal response event".into(),
            None => "connection closed before a terminal response event".into(),
        };
        self.fail(StreamError::Protocol(reason))
    }

    fn fail(&mut self, err: StreamError) -> Outcome<T> {
        self.notify_error(&err);
        self.shared
            .transition(StreamState::Running, StreamState::Failed);
        Err(err)
    }

    fn cancelled(&mut self) -> Outcome<T> {
        debug!(session_id = %self.shared.id, "stream cancelled");
        self.shared
            .transition(StreamState::Running, StreamState::Cancelled);
        Err(StreamError::Cancelled)
    }

    fn notify_error(&mut self, err: &StreamError) {
        if self.shared.is_cancelled() {
            return;
        }
        for handler in &mut self.observers.on_error {
            handler(err);
        }
    }
}
