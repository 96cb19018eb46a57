//! Utility helpers shared across the crate

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Split a full name into (first, last).
///
/// One token becomes the first name with an empty last name; with more
/// tokens the first token is the first name and the remainder joins with
/// spaces as the last name.
pub fn split_name(full_name: &str) -> (String, String) {
    let mut parts = full_name.split_whitespace();

    let first = match parts.next() {
        Some(first) => first.to_string(),
        None => return (String::new(), String::new()),
    };

    let last = parts.collect::<Vec<_>>().join(" ");
    (first, last)
}

/// Counter a set of tasks registers with so a supervisor can await drain.
///
/// `add` before spawning, `done` when the task finishes, `wait` suspends
/// until the count returns to zero.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

#[derive(Default)]
struct WaitGroupInner {
    count: AtomicI64,
    notify: Notify,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: i64) {
        self.inner.count.fetch_add(n, Ordering::SeqCst);
    }

    pub fn done(&self) {
        let previous = self.inner.count.fetch_sub(1, Ordering::SeqCst);
        if previous <= 1 {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn count(&self) -> i64 {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Wait until the outstanding count reaches zero
    pub async fn wait(&self) {
        loop {
            // Register interest before re-checking to avoid a lost wakeup
            let notified = self.inner.notify.notified();
            if self.inner.count.load(Ordering::SeqCst) <= 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn split_name_single_token() {
        assert_eq!(split_name("Bob"), ("Bob".to_string(), String::new()));
    }

    #[test]
    fn split_name_multiple_tokens() {
        assert_eq!(
            split_name("Alice Johnson"),
            ("Alice".to_string(), "Johnson".to_string())
        );
        assert_eq!(
            split_name("Mary Jane van der Berg"),
            ("Mary".to_string(), "Jane van der Berg".to_string())
        );
    }

    #[test]
    fn split_name_empty_and_whitespace() {
        assert_eq!(split_name(""), (String::new(), String::new()));
        assert_eq!(split_name("   "), (String::new(), String::new()));
    }

    #[tokio::test]
    async fn wait_group_returns_immediately_when_empty() {
        let wg = WaitGroup::new();
        wg.wait().await;
    }

    #[tokio::test]
    async fn wait_group_waits_for_all_tasks() {
        let wg = WaitGroup::new();
        wg.add(3);

        for _ in 0..3 {
            let wg = wg.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                wg.done();
            });
        }

        tokio::time::timeout(Duration::from_secs(1), wg.wait())
            .await
            .expect("wait group should drain");
        assert_eq!(wg.count(), 0);
    }
}
