//! FIFO work queue shared by a pool of workers.
//!
//! Workers pull from a single receiver guarded by a mutex. The queue also
//! counts unfinished messages so a coordinator can wait for it to drain, and
//! carries an explicit stop signal so each worker is told to exit exactly once.

use crate::ScraperError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, Notify};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message<T> {
    Task(T),
    Stop,
}

pub struct WorkQueue<T> {
    sender: mpsc::UnboundedSender<Message<T>>,
    receiver: Mutex<mpsc::UnboundedReceiver<Message<T>>>,
    unfinished: AtomicUsize,
    consumed: AtomicUsize,
    drained: Notify,
}

impl<T: Send> WorkQueue<T> {
    pub fn new() -> Arc<Self> {
        let (sender, receiver) = mpsc::unbounded_channel();
        Arc::new(Self {
            sender,
            receiver: Mutex::new(receiver),
            unfinished: AtomicUsize::new(0),
            consumed: AtomicUsize::new(0),
            drained: Notify::new(),
        })
    }

    pub fn put(&self, task: T) -> Result<(), ScraperError> {
        self.send(Message::Task(task))
    }

    pub fn put_stop(&self) -> Result<(), ScraperError> {
        self.send(Message::Stop)
    }

    fn send(&self, message: Message<T>) -> Result<(), ScraperError> {
        self.unfinished.fetch_add(1, Ordering::SeqCst);
        self.sender.send(message).map_err(|_| {
            self.unfinished.fetch_sub(1, Ordering::SeqCst);
            ScraperError::Queue("queue receiver closed".to_string())
        })
    }

    /// Wait for the next message. Every message returned must be acknowledged
    /// with [`WorkQueue::task_done`].
    pub async fn get(&self) -> Message<T> {
        let message = {
            let mut receiver = self.receiver.lock().await;
            receiver.recv().await
        };
        // The queue owns its sender, so the channel can never be closed while we hold `self`
        let message = message.unwrap_or(Message::Stop);
        self.consumed.fetch_add(1, Ordering::SeqCst);
        message
    }

    pub fn task_done(&self) {
        let previous = self
            .unfinished
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous == 1 {
            self.drained.notify_waiters();
        }
    }

    /// Block until every message put so far has been acknowledged.
    pub async fn join(&self) {
        loop {
            let notified = self.drained.notified();
            if self.unfinished.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub fn unfinished(&self) -> usize {
        self.unfinished.load(Ordering::SeqCst)
    }

    /// Total messages handed out by [`WorkQueue::get`], stop signals included.
    pub fn consumed(&self) -> usize {
        self.consumed.load(Ordering::SeqCst)
    }
}
