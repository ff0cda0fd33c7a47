//! Actor-style bounded mailboxes.
//!
//! Every [`Mailbox`] owns a spawned task that holds the buffer; handles talk
//! to it only through request channels, so any number of producers and
//! consumers can share one mailbox without extra locking:
//!
//! ```text
//!   push ──► [push requests ]─┐
//!   take ──► [take requests ]─┤      ┌──────────────────────────┐
//!   wait ──► [wait requests ]─┼────► │ actor: tokio::select! {} │
//!   close/discard ──► control─┘      │   buffer + waiters       │
//!                                    └──────────────────────────┘
//!          replies travel back over per-request oneshot channels
//! ```
//!
//! Pushes first try to enqueue their request without waiting; only when the
//! request queue is momentarily full is a task spawned to wait on it, so the
//! number of waiting tasks is bounded by the number of blocked producers.
//!
//! What happens when the buffer itself is full is the [`OverflowPolicy`].
//! Blocking operations accept a [`CancelToken`] and fail promptly with
//! [`MailboxError::Cancelled`] / [`MailboxError::DeadlineExceeded`].
//!
//! Mailboxes spawn their actor on creation and must be built inside a Tokio
//! runtime.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::error::{InvalidSymbol, MailboxError};
use crate::symbol::Symbol;

/// Buffer capacity used when none is configured.
pub const DEFAULT_CAPACITY: usize = 100;

/// Depth of each request queue in front of the actor.
pub const DEFAULT_REQUEST_QUEUE: usize = 64;

// ── Policy ────────────────────────────────────────────────────────────────────

/// What a push does when the buffer is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// The push completes only once a take frees a slot.
    #[default]
    DoNotDrop,
    /// Evict the oldest buffered item to make room.
    DropHead,
    /// Accept the push as a no-op; the buffer is unchanged.
    DropIncoming,
    /// Replace the most recently buffered item.
    DropTail,
}

impl OverflowPolicy {
    /// Parse a policy name as written in configuration files.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "block" | "do-not-drop" => Some(Self::DoNotDrop),
            "drop-head" | "drop-oldest" => Some(Self::DropHead),
            "drop-incoming" => Some(Self::DropIncoming),
            "drop-tail" => Some(Self::DropTail),
            _ => None,
        }
    }
}

// ── Qualified names ───────────────────────────────────────────────────────────

/// A mailbox address: `scope:id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedName {
    pub scope: Symbol,
    pub id: Symbol,
}

impl QualifiedName {
    /// Scope of the default channels bound in every root context.
    pub const LOCAL: &'static str = "local";
    /// Scope for general references.
    pub const REFS: &'static str = "refs";
    /// Scope for process identifiers.
    pub const PIDS: &'static str = "pids";

    pub fn new(scope: Symbol, id: Symbol) -> Self {
        QualifiedName { scope, id }
    }

    pub fn parse(scope: &str, id: &str) -> Result<Self, InvalidSymbol> {
        Ok(QualifiedName { scope: Symbol::new(scope)?, id: Symbol::new(id)? })
    }

    pub(crate) fn local(id: &'static str) -> Self {
        QualifiedName { scope: Symbol::keyword(Self::LOCAL), id: Symbol::keyword(id) }
    }

    /// `true` for the scopes owned by the runtime.
    pub fn is_reserved_scope(scope: &Symbol) -> bool {
        matches!(scope.text(), Self::LOCAL | Self::REFS | Self::PIDS)
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.id)
    }
}

// ── Cancellation ──────────────────────────────────────────────────────────────

/// Cancellation signal with an optional deadline.
///
/// Clones share the signal: cancelling one cancels all of them.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("deadline", &self.deadline)
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        CancelToken { tx: Arc::new(tx), rx, deadline: None }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        CancelToken { deadline: Some(deadline), ..Self::new() }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled or its deadline passes.
    pub async fn cancelled(&self) -> MailboxError {
        let mut rx = self.rx.clone();
        let signal = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Sender gone: can never be cancelled now.
                    std::future::pending::<()>().await;
                }
            }
        };
        match self.deadline {
            Some(deadline) => tokio::select! {
                _ = signal => MailboxError::Cancelled,
                _ = tokio::time::sleep_until(deadline) => MailboxError::DeadlineExceeded,
            },
            None => {
                signal.await;
                MailboxError::Cancelled
            }
        }
    }
}

// ── Completion ────────────────────────────────────────────────────────────────

/// The eventual outcome of a mailbox request.
///
/// Dropping a completion withdraws the request if the actor has not served
/// it yet.
#[must_use = "a push is only known to be accepted once its completion resolves"]
pub struct Completion<R> {
    rx: oneshot::Receiver<Result<R, MailboxError>>,
}

impl<R> Future for Completion<R> {
    type Output = Result<R, MailboxError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Self::Output> {
        // A dropped reply means the actor is gone.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or(Err(MailboxError::NotRunning)))
    }
}

// ── Requests ──────────────────────────────────────────────────────────────────

type Reply<R> = oneshot::Sender<Result<R, MailboxError>>;

struct PushRequest<T> {
    value: T,
    reply: Reply<()>,
}

enum Control {
    CloseInput,
    Discard,
}

/// Counters the actor publishes for lock-free reads.
#[derive(Default)]
struct Stats {
    depth: AtomicUsize,
    discarded: AtomicU64,
}

// ── Handles ───────────────────────────────────────────────────────────────────

/// Read-only view of a mailbox: observe and drain, never write.
pub struct MailboxReader<T> {
    take_tx: mpsc::Sender<Reply<T>>,
    wait_tx: mpsc::Sender<Reply<()>>,
    stats: Arc<Stats>,
}

impl<T> Clone for MailboxReader<T> {
    fn clone(&self) -> Self {
        MailboxReader {
            take_tx: self.take_tx.clone(),
            wait_tx: self.wait_tx.clone(),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl<T> fmt::Debug for MailboxReader<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxReader").field("depth", &self.depth()).finish()
    }
}

impl<T> MailboxReader<T> {
    /// Buffered item count; may be stale by the time it is read.
    pub fn depth(&self) -> usize {
        self.stats.depth.load(Ordering::Acquire)
    }

    /// Items dropped by the overflow policy so far.
    pub fn discarded(&self) -> u64 {
        self.stats.discarded.load(Ordering::Acquire)
    }
}

impl<T: Send + 'static> MailboxReader<T> {
    /// Remove and return the oldest item, waiting while the buffer is empty.
    ///
    /// Fails with `NotRunning` once the mailbox is discarded, or when it is
    /// empty and its input is closed.
    pub async fn take(&self) -> Result<T, MailboxError> {
        let (reply, rx) = oneshot::channel();
        self.take_tx.send(reply).await.map_err(|_| MailboxError::NotRunning)?;
        Completion { rx }.await
    }

    /// [`take`](Self::take) that gives up when `cancel` fires.
    ///
    /// An item the actor already handed over wins over cancellation; an
    /// item not yet handed over stays buffered.
    pub async fn take_with(&self, cancel: &CancelToken) -> Result<T, MailboxError> {
        let (reply, mut rx) = oneshot::channel();
        tokio::select! {
            biased;
            sent = self.take_tx.send(reply) => sent.map_err(|_| MailboxError::NotRunning)?,
            e = cancel.cancelled() => return Err(e),
        }
        tokio::select! {
            biased;
            r = &mut rx => r.unwrap_or(Err(MailboxError::NotRunning)),
            e = cancel.cancelled() => {
                // Closing makes any later hand-over fail, and the actor
                // puts that item back at the front.
                rx.close();
                match rx.try_recv() {
                    Ok(Ok(value)) => Ok(value),
                    _ => Err(e),
                }
            }
        }
    }

    /// Resolves once at least one item is buffered.
    ///
    /// Another consumer may take the item before this caller does.
    pub async fn wait_for_data(&self) -> Result<(), MailboxError> {
        let (reply, rx) = oneshot::channel();
        self.wait_tx.send(reply).await.map_err(|_| MailboxError::NotRunning)?;
        Completion { rx }.await
    }
}

/// A bounded FIFO served by its own task.  Cloning yields another handle
/// to the same mailbox.
pub struct Mailbox<T> {
    push_tx: mpsc::Sender<PushRequest<T>>,
    control_tx: mpsc::UnboundedSender<Control>,
    reader: MailboxReader<T>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Mailbox {
            push_tx: self.push_tx.clone(),
            control_tx: self.control_tx.clone(),
            reader: self.reader.clone(),
        }
    }
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("depth", &self.reader.depth())
            .field("discarded", &self.reader.discarded())
            .finish()
    }
}

impl<T: Send + 'static> Mailbox<T> {
    /// Spawn a mailbox holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self::with_request_queue(capacity, policy, DEFAULT_REQUEST_QUEUE)
    }

    pub fn with_request_queue(capacity: usize, policy: OverflowPolicy, requests: usize) -> Self {
        let requests = requests.max(1);
        let (push_tx, push_rx) = mpsc::channel(requests);
        let (take_tx, take_rx) = mpsc::channel(requests);
        let (wait_tx, wait_rx) = mpsc::channel(requests);
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Stats::default());

        let actor = Actor::new(capacity, policy, Arc::clone(&stats));
        tokio::spawn(actor.run(push_rx, take_rx, wait_rx, control_rx));

        Mailbox { push_tx, control_tx, reader: MailboxReader { take_tx, wait_tx, stats } }
    }

    /// `true` if both handles address the same mailbox.
    pub fn same_mailbox(&self, other: &Mailbox<T>) -> bool {
        Arc::ptr_eq(&self.reader.stats, &other.reader.stats)
    }

    pub fn reader(&self) -> MailboxReader<T> {
        self.reader.clone()
    }

    pub fn depth(&self) -> usize {
        self.reader.depth()
    }

    pub fn discarded(&self) -> u64 {
        self.reader.discarded()
    }

    /// Fast path: enqueue the push request without waiting.
    ///
    /// Hands `value` back if the request queue is full right now.
    pub fn try_push(&self, value: T) -> Result<Completion<()>, T> {
        let (reply, rx) = oneshot::channel();
        match self.push_tx.try_send(PushRequest { value, reply }) {
            Ok(()) => Ok(Completion { rx }),
            Err(mpsc::error::TrySendError::Full(req)) => Err(req.value),
            // The request (and its reply) is dropped; the completion
            // resolves to NotRunning.
            Err(mpsc::error::TrySendError::Closed(_)) => Ok(Completion { rx }),
        }
    }

    /// Push `value`; the completion resolves when the actor accepts or
    /// rejects it.
    pub fn push(&self, value: T) -> Completion<()> {
        match self.try_push(value) {
            Ok(done) => done,
            Err(value) => {
                let (reply, rx) = oneshot::channel();
                let tx = self.push_tx.clone();
                tokio::spawn(async move {
                    let _ = tx.send(PushRequest { value, reply }).await;
                });
                Completion { rx }
            }
        }
    }

    pub async fn push_with(&self, value: T, cancel: &CancelToken) -> Result<(), MailboxError> {
        tokio::select! {
            biased;
            r = self.push(value) => r,
            e = cancel.cancelled() => Err(e),
        }
    }

    pub async fn take(&self) -> Result<T, MailboxError> {
        self.reader.take().await
    }

    pub async fn take_with(&self, cancel: &CancelToken) -> Result<T, MailboxError> {
        self.reader.take_with(cancel).await
    }

    pub async fn wait_for_data(&self) -> Result<(), MailboxError> {
        self.reader.wait_for_data().await
    }

    /// Stop accepting pushes; buffered items can still be taken.
    pub fn close_input(&self) {
        let _ = self.control_tx.send(Control::CloseInput);
    }

    /// Stop the mailbox, dropping buffered items and failing every waiter.
    pub fn discard(&self) {
        let _ = self.control_tx.send(Control::Discard);
    }
}

// ── Actor ─────────────────────────────────────────────────────────────────────

struct Actor<T> {
    buf: VecDeque<T>,
    capacity: usize,
    policy: OverflowPolicy,
    /// Pushes waiting for room (`DoNotDrop` only).
    blocked: VecDeque<PushRequest<T>>,
    takers: VecDeque<Reply<T>>,
    waiters: Vec<Reply<()>>,
    input_closed: bool,
    stats: Arc<Stats>,
}

impl<T: Send + 'static> Actor<T> {
    fn new(capacity: usize, policy: OverflowPolicy, stats: Arc<Stats>) -> Self {
        Actor {
            buf: VecDeque::new(),
            capacity: capacity.max(1),
            policy,
            blocked: VecDeque::new(),
            takers: VecDeque::new(),
            waiters: Vec::new(),
            input_closed: false,
            stats,
        }
    }

    async fn run(
        mut self,
        mut push_rx: mpsc::Receiver<PushRequest<T>>,
        mut take_rx: mpsc::Receiver<Reply<T>>,
        mut wait_rx: mpsc::Receiver<Reply<()>>,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
    ) {
        let mut writers_alive = true;
        loop {
            tokio::select! {
                biased;
                ctl = control_rx.recv(), if writers_alive => match ctl {
                    Some(Control::CloseInput) => self.close_input(),
                    Some(Control::Discard) => {
                        self.discard();
                        return;
                    }
                    // Every writable handle is gone; readers may still drain.
                    None => {
                        writers_alive = false;
                        self.close_input();
                    }
                },
                Some(req) = push_rx.recv() => self.on_push(req),
                Some(reply) = take_rx.recv() => self.on_take(reply),
                Some(reply) = wait_rx.recv() => self.on_wait(reply),
                else => return,
            }
        }
    }

    fn publish_depth(&self) {
        self.stats.depth.store(self.buf.len(), Ordering::Release);
    }

    fn count_drop(&self) {
        self.stats.discarded.fetch_add(1, Ordering::AcqRel);
    }

    /// Buffer `value` and acknowledge; undone if the pusher went away.
    /// Returns `true` if the item stayed.
    fn accept(&mut self, value: T, reply: Reply<()>) -> bool {
        self.buf.push_back(value);
        self.publish_depth();
        if reply.send(Ok(())).is_err() {
            self.buf.pop_back();
            self.publish_depth();
            return false;
        }
        true
    }

    /// Evict the oldest (or newest) item to make room for `value`.  The
    /// evicted item goes back where it was if the push is undone.
    fn accept_evicting(&mut self, value: T, reply: Reply<()>, oldest: bool) {
        let evicted = if oldest { self.buf.pop_front() } else { self.buf.pop_back() };
        if self.accept(value, reply) {
            self.count_drop();
            trace!(oldest, "mailbox full, evicted an item");
            return;
        }
        if let Some(item) = evicted {
            if oldest {
                self.buf.push_front(item);
            } else {
                self.buf.push_back(item);
            }
            self.publish_depth();
        }
    }

    fn on_push(&mut self, req: PushRequest<T>) {
        if req.reply.is_closed() {
            return;
        }
        if self.input_closed {
            let _ = req.reply.send(Err(MailboxError::NotRunning));
            return;
        }
        if self.buf.len() < self.capacity {
            let _ = self.accept(req.value, req.reply);
        } else {
            match self.policy {
                OverflowPolicy::DoNotDrop => self.blocked.push_back(req),
                OverflowPolicy::DropHead => self.accept_evicting(req.value, req.reply, true),
                OverflowPolicy::DropIncoming => {
                    self.count_drop();
                    trace!("mailbox full, dropped incoming item");
                    let _ = req.reply.send(Ok(()));
                }
                OverflowPolicy::DropTail => self.accept_evicting(req.value, req.reply, false),
            }
        }
        self.settle();
    }

    fn on_take(&mut self, reply: Reply<T>) {
        if reply.is_closed() {
            return;
        }
        self.takers.push_back(reply);
        self.settle();
    }

    fn on_wait(&mut self, reply: Reply<()>) {
        if !self.buf.is_empty() {
            let _ = reply.send(Ok(()));
        } else if self.input_closed {
            let _ = reply.send(Err(MailboxError::NotRunning));
        } else {
            self.waiters.push(reply);
        }
    }

    /// Move blocked pushes into free slots and hand items to waiting takers
    /// until neither can make progress.
    fn settle(&mut self) {
        loop {
            while self.buf.len() < self.capacity {
                let Some(req) = self.blocked.pop_front() else { break };
                if !req.reply.is_closed() {
                    let _ = self.accept(req.value, req.reply);
                }
            }
            if self.buf.is_empty() {
                break;
            }
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(Ok(()));
            }
            let Some(taker) = self.takers.pop_front() else { break };
            if let Some(value) = self.buf.pop_front() {
                self.publish_depth();
                if let Err(Ok(value)) = taker.send(Ok(value)) {
                    // Taker gave up; the item keeps its place.
                    self.buf.push_front(value);
                    self.publish_depth();
                }
            }
        }
        if self.buf.is_empty() && self.input_closed {
            for taker in self.takers.drain(..) {
                let _ = taker.send(Err(MailboxError::NotRunning));
            }
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(Err(MailboxError::NotRunning));
            }
        }
    }

    fn close_input(&mut self) {
        if self.input_closed {
            return;
        }
        debug!(buffered = self.buf.len(), "mailbox input closed");
        self.input_closed = true;
        for req in self.blocked.drain(..) {
            let _ = req.reply.send(Err(MailboxError::NotRunning));
        }
        self.settle();
    }

    fn discard(&mut self) {
        debug!(buffered = self.buf.len(), "mailbox discarded");
        self.buf.clear();
        self.publish_depth();
        for req in self.blocked.drain(..) {
            let _ = req.reply.send(Err(MailboxError::NotRunning));
        }
        for taker in self.takers.drain(..) {
            let _ = taker.send(Err(MailboxError::NotRunning));
        }
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Err(MailboxError::NotRunning));
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    const SHORT: Duration = Duration::from_millis(30);

    #[tokio::test]
    async fn fifo_order() {
        let mb = Mailbox::new(8, OverflowPolicy::DoNotDrop);
        for i in 0..5 {
            mb.push(i).await.unwrap();
        }
        assert_eq!(mb.depth(), 5);
        for i in 0..5 {
            assert_eq!(mb.take().await.unwrap(), i);
        }
        assert_eq!(mb.depth(), 0);
    }

    #[tokio::test]
    async fn drop_head_keeps_newest() {
        let mb = Mailbox::new(1, OverflowPolicy::DropHead);
        for i in 1..=10 {
            mb.push(i).await.unwrap();
        }
        assert_eq!(mb.discarded(), 9);
        assert_eq!(mb.depth(), 1);
        assert_eq!(mb.take().await.unwrap(), 10);
    }

    #[tokio::test]
    async fn drop_incoming_keeps_oldest() {
        let mb = Mailbox::new(2, OverflowPolicy::DropIncoming);
        for i in 1..=5 {
            mb.push(i).await.unwrap();
        }
        assert_eq!(mb.discarded(), 3);
        assert_eq!(mb.take().await.unwrap(), 1);
        assert_eq!(mb.take().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn drop_tail_overwrites_newest() {
        let mb = Mailbox::new(2, OverflowPolicy::DropTail);
        for i in 1..=5 {
            mb.push(i).await.unwrap();
        }
        assert_eq!(mb.take().await.unwrap(), 1);
        assert_eq!(mb.take().await.unwrap(), 5);
    }

    #[tokio::test]
    async fn blocking_push_waits_for_room() {
        let mb = Mailbox::new(1, OverflowPolicy::DoNotDrop);
        mb.push(1).await.unwrap();
        let mut second = mb.push(2);
        assert!(timeout(SHORT, &mut second).await.is_err(), "push must block while full");
        assert_eq!(mb.take().await.unwrap(), 1);
        second.await.unwrap();
        assert_eq!(mb.take().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn take_waits_for_push() {
        let mb = Mailbox::new(4, OverflowPolicy::DoNotDrop);
        let reader = mb.reader();
        let taker = tokio::spawn(async move { reader.take().await });
        tokio::task::yield_now().await;
        mb.push("hello").await.unwrap();
        assert_eq!(taker.await.unwrap().unwrap(), "hello");
    }

    #[tokio::test]
    async fn close_input_rejects_pushes_but_drains() {
        let mb = Mailbox::new(4, OverflowPolicy::DoNotDrop);
        mb.push(1).await.unwrap();
        mb.push(2).await.unwrap();
        mb.close_input();
        assert_eq!(mb.push(3).await, Err(MailboxError::NotRunning));
        assert_eq!(mb.take().await.unwrap(), 1);
        assert_eq!(mb.take().await.unwrap(), 2);
        assert_eq!(mb.take().await, Err(MailboxError::NotRunning));
    }

    #[tokio::test]
    async fn close_input_fails_blocked_pushes() {
        let mb = Mailbox::new(1, OverflowPolicy::DoNotDrop);
        mb.push(1).await.unwrap();
        let blocked = mb.push(2);
        mb.close_input();
        assert_eq!(blocked.await, Err(MailboxError::NotRunning));
        assert_eq!(mb.take().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn discard_wakes_everyone() {
        let mb: Mailbox<u32> = Mailbox::new(1, OverflowPolicy::DoNotDrop);
        let reader = mb.reader();
        let taker = tokio::spawn(async move { reader.take().await });
        tokio::task::yield_now().await;
        mb.discard();
        assert_eq!(taker.await.unwrap(), Err(MailboxError::NotRunning));
        assert_eq!(mb.push(1).await, Err(MailboxError::NotRunning));
        assert_eq!(mb.take().await, Err(MailboxError::NotRunning));
    }

    #[tokio::test]
    async fn discard_fails_a_blocked_push() {
        let mb = Mailbox::new(1, OverflowPolicy::DoNotDrop);
        mb.push(1).await.unwrap();
        let mut blocked = mb.push(2);
        assert!(timeout(SHORT, &mut blocked).await.is_err(), "push must block while full");
        mb.discard();
        let outcome = timeout(SHORT, blocked).await.expect("discard wakes the pusher");
        assert_eq!(outcome, Err(MailboxError::NotRunning));
    }

    #[tokio::test]
    async fn cancelled_takes_never_lose_items() {
        let mb = Mailbox::new(128, OverflowPolicy::DoNotDrop);
        let cancelled = CancelToken::new();
        cancelled.cancel();
        let mut seen = Vec::new();
        for i in 0..100u32 {
            mb.push(i).await.unwrap();
            match mb.take_with(&cancelled).await {
                Ok(v) => seen.push(v),
                Err(e) => assert_eq!(e, MailboxError::Cancelled),
            }
        }
        while mb.depth() > 0 {
            seen.push(mb.take().await.unwrap());
        }
        assert_eq!(seen, (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn withdrawn_push_restores_the_evicted_item() {
        for (policy, oldest) in [(OverflowPolicy::DropHead, true), (OverflowPolicy::DropTail, false)] {
            let stats = Arc::new(Stats::default());
            let mut actor = Actor::new(2, policy, Arc::clone(&stats));
            actor.buf.extend([1, 2]);

            let (reply, rx) = oneshot::channel();
            drop(rx);
            actor.accept_evicting(3, reply, oldest);
            assert_eq!(actor.buf, [1, 2], "{policy:?}");
            assert_eq!(stats.discarded.load(Ordering::Acquire), 0);

            let (reply, _rx) = oneshot::channel();
            actor.accept_evicting(3, reply, oldest);
            let kept: Vec<u32> = if oldest { vec![2, 3] } else { vec![1, 3] };
            assert_eq!(actor.buf, kept, "{policy:?}");
            assert_eq!(stats.discarded.load(Ordering::Acquire), 1);
        }
    }

    #[tokio::test]
    async fn cancelled_take_unblocks() {
        let mb: Mailbox<u32> = Mailbox::new(1, OverflowPolicy::DoNotDrop);
        let token = CancelToken::new();
        let t = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            t.cancel();
        });
        assert_eq!(mb.take_with(&token).await, Err(MailboxError::Cancelled));
    }

    #[tokio::test]
    async fn deadline_unblocks_push() {
        let mb = Mailbox::new(1, OverflowPolicy::DoNotDrop);
        mb.push(1).await.unwrap();
        let token = CancelToken::with_timeout(Duration::from_millis(10));
        assert_eq!(mb.push_with(2, &token).await, Err(MailboxError::DeadlineExceeded));
        // The withdrawn push never lands.
        assert_eq!(mb.take().await.unwrap(), 1);
        assert_eq!(mb.depth(), 0);
    }

    #[tokio::test]
    async fn wait_for_data_signals_push() {
        let mb = Mailbox::new(2, OverflowPolicy::DoNotDrop);
        let reader = mb.reader();
        let waiter = tokio::spawn(async move { reader.wait_for_data().await });
        tokio::task::yield_now().await;
        mb.push(7).await.unwrap();
        waiter.await.unwrap().unwrap();
        assert_eq!(mb.depth(), 1);
    }

    #[tokio::test]
    async fn try_push_reports_full_request_queue() {
        let mb = Mailbox::with_request_queue(1, OverflowPolicy::DoNotDrop, 1);
        // Nothing yields to the actor in between, so the single request slot
        // fills on the first call.
        let first = mb.try_push(1).ok();
        assert_eq!(mb.try_push(2).err(), Some(2));
        first.unwrap().await.unwrap();
    }

    #[tokio::test]
    async fn writers_keep_their_own_order() {
        let mb = Mailbox::new(4, OverflowPolicy::DoNotDrop);
        let mut writers = Vec::new();
        for w in 0..4u32 {
            let mb = mb.clone();
            writers.push(tokio::spawn(async move {
                for i in 0..50u32 {
                    mb.push((w, i)).await.unwrap();
                }
            }));
        }
        let mut next = [0u32; 4];
        for _ in 0..200 {
            let (w, i) = mb.take().await.unwrap();
            assert_eq!(i, next[w as usize]);
            next[w as usize] += 1;
        }
        for w in writers {
            w.await.unwrap();
        }
        assert_eq!(next, [50; 4]);
    }

    #[test]
    fn qualified_names() {
        let q = QualifiedName::parse("jobs", "worker").unwrap();
        assert_eq!(q.to_string(), "jobs:worker");
        assert!(QualifiedName::is_reserved_scope(&Symbol::new("pids").unwrap()));
        assert!(!QualifiedName::is_reserved_scope(&q.scope));
        assert_eq!(OverflowPolicy::from_name("drop-oldest"), Some(OverflowPolicy::DropHead));
        assert_eq!(OverflowPolicy::from_name("nope"), None);
    }
}
