use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum DebounceState<T> {
    Idle,
    Pending { value: T, deadline: Instant },
}

/// Trailing-edge debounce. Every `update` restarts the quiet period; `poll`
/// emits the newest value once the period has elapsed.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    state: DebounceState<T>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Idle,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn state(&self) -> &DebounceState<T> {
        &self.state
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, DebounceState::Pending { .. })
    }

    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            DebounceState::Idle => None,
            DebounceState::Pending { deadline, .. } => Some(*deadline),
        }
    }

    pub fn update(&mut self, value: T, now: Instant) {
        self.state = DebounceState::Pending {
            value,
            deadline: now + self.delay,
        };
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match self.deadline() {
            Some(deadline) if now >= deadline => {
                match std::mem::replace(&mut self.state, DebounceState::Idle) {
                    DebounceState::Pending { value, .. } => Some(value),
                    DebounceState::Idle => None,
                }
            }
            _ => None,
        }
    }

    pub fn cancel(&mut self) {
        self.state = DebounceState::Idle;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending::<()>().await,
    }
}

/// Feeds raw input through a `Debouncer` on a background task and publishes
/// stabilised values. Dropping the handle aborts the task, so nothing is
/// published after teardown.
pub struct DebouncedQuery<T> {
    input: mpsc::UnboundedSender<T>,
    output: watch::Receiver<Option<T>>,
    task: JoinHandle<()>,
}

impl<T> DebouncedQuery<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn spawn(delay: Duration) -> Self {
        let (input, mut raw) = mpsc::unbounded_channel::<T>();
        let (publish, output) = watch::channel::<Option<T>>(None);

        let task = tokio::spawn(async move {
            let mut debouncer = Debouncer::new(delay);
            loop {
                tokio::select! {
                    next = raw.recv() => match next {
                        Some(value) => debouncer.update(value, Instant::now()),
                        None => break,
                    },
                    _ = sleep_until_deadline(debouncer.deadline()) => {
                        if let Some(value) = debouncer.poll(Instant::now()) {
                            if publish.send(Some(value)).is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            debug!("debounce task finished");
        });

        Self {
            input,
            output,
            task,
        }
    }

    pub fn push(&self, value: T) {
        let _ = self.input.send(value);
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<T>> {
        self.output.clone()
    }

    pub fn latest(&self) -> Option<T> {
        self.output.borrow().clone()
    }

    /// Waits for the next published value. `None` once the task is gone.
    pub async fn next(&mut self) -> Option<T> {
        self.output.changed().await.ok()?;
        self.output.borrow_and_update().clone()
    }
}

impl<T> Drop for DebouncedQuery<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DELAY: Duration = Duration::from_millis(250);

    #[test]
    fn emits_latest_value_once_after_quiet_period() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(DELAY);
        assert_eq!(d.state(), &DebounceState::Idle);

        d.update("a", t0);
        d.update("ab", t0 + Duration::from_millis(100));
        assert!(d.is_pending());
        assert_eq!(d.poll(t0 + Duration::from_millis(300)), None);
        assert_eq!(d.poll(t0 + Duration::from_millis(350)), Some("ab"));
        assert_eq!(d.poll(t0 + Duration::from_millis(900)), None);
        assert!(!d.is_pending());
    }

    #[test]
    fn cancelled_debouncer_never_emits() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(DELAY);
        d.update(1, t0);
        d.cancel();
        assert_eq!(d.poll(t0 + Duration::from_secs(10)), None);
        assert_eq!(d.deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn debounced_query_publishes_after_typing_stops() {
        let mut q = DebouncedQuery::spawn(DELAY);
        let start = Instant::now();

        q.push("r".to_string());
        tokio::time::sleep(Duration::from_millis(100)).await;
        q.push("ra".to_string());
        tokio::time::sleep(Duration::from_millis(200)).await;
        q.push("rav".to_string());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(q.latest(), None);

        let value = q.next().await;
        assert_eq!(value.as_deref(), Some("rav"));
        assert!(start.elapsed() >= Duration::from_millis(550));
    }

    #[tokio::test(start_paused = true)]
    async fn spaced_updates_are_each_emitted_in_order() {
        let mut q = DebouncedQuery::spawn(DELAY);

        q.push("a".to_string());
        assert_eq!(q.next().await.as_deref(), Some("a"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        q.push("b".to_string());
        assert_eq!(q.next().await.as_deref(), Some("b"));
        assert_eq!(q.latest().as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_discards_pending_value() {
        let q = DebouncedQuery::spawn(DELAY);
        let rx = q.subscribe();
        q.push(42u32);
        tokio::task::yield_now().await;
        drop(q);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(*rx.borrow(), None);
    }
}
