//! Mailbox: named folders of envelopes between the network and the tick loop
//!
//! Network tasks deliver into folders named after the message subject; the
//! simulation scans them once per tick. Both sides go through one mutex per
//! mailbox, so a scan that marks envelopes read never interleaves with a
//! delivery.

use std::collections::{HashMap, VecDeque};

use parking_lot::{Mutex, MutexGuard};
use tracing::trace;

#[derive(Debug, Clone)]
struct Envelope<T> {
    read: bool,
    payload: T,
}

#[derive(Debug)]
struct Folder<T> {
    envelopes: VecDeque<Envelope<T>>,
    max_size: Option<usize>,
}

impl<T> Folder<T> {
    fn new(max_size: Option<usize>) -> Self {
        Self {
            envelopes: VecDeque::new(),
            max_size,
        }
    }

    fn push(&mut self, payload: T) {
        self.envelopes.push_back(Envelope { read: false, payload });
        self.evict();
    }

    fn evict(&mut self) {
        if let Some(max) = self.max_size {
            while self.envelopes.len() > max {
                self.envelopes.pop_front();
            }
        }
    }
}

/// What a reader does with one unread envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanVerdict {
    /// Take it; it is marked read
    Consume,
    /// Irrelevant or stale; marked read without being taken
    Discard,
    /// Not applicable yet; left unread for a later scan
    Defer,
}

/// Result of one newest-to-oldest scan
#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport<T> {
    /// Unread envelopes the scan looked at
    pub visited: usize,
    /// Envelopes left unread
    pub deferred: usize,
    /// Consumed payloads, oldest first
    pub consumed: Vec<T>,
}

impl<T> Default for ScanReport<T> {
    fn default() -> Self {
        Self {
            visited: 0,
            deferred: 0,
            consumed: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct Mailbox<T> {
    folders: Mutex<HashMap<String, Folder<T>>>,
}

impl<T: Clone> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            folders: Mutex::new(HashMap::new()),
        }
    }

    /// Block until the mailbox is free and hold it until the guard drops
    pub fn request_access(&self) -> MailboxAccess<'_, T> {
        MailboxAccess {
            folders: self.folders.lock(),
        }
    }

    /// Append an unread envelope, taking the lock for just this delivery
    pub fn deliver(&self, payload: T, folder: &str) {
        self.request_access().deliver(payload, folder);
    }
}

impl<T: Clone> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive access to a mailbox; dropping it relinquishes access
pub struct MailboxAccess<'a, T> {
    folders: MutexGuard<'a, HashMap<String, Folder<T>>>,
}

impl<T: Clone> MailboxAccess<'_, T> {
    /// Bound a folder, creating it if needed; `None` lifts the bound
    pub fn set_max_size(&mut self, folder: &str, max_size: Option<usize>) {
        let entry = self
            .folders
            .entry(folder.to_string())
            .or_insert_with(|| Folder::new(max_size));
        entry.max_size = max_size;
        entry.evict();
    }

    /// Append an unread envelope; unknown folders are created unbounded
    pub fn deliver(&mut self, payload: T, folder: &str) {
        self.folders
            .entry(folder.to_string())
            .or_insert_with(|| Folder::new(None))
            .push(payload);
        trace!(folder, "Envelope delivered");
    }

    /// Walk `folder` from the newest envelope back to the first one already
    /// read, letting `verdict` decide each unread envelope's fate.
    pub fn scan<F>(&mut self, folder: &str, mut verdict: F) -> ScanReport<T>
    where
        F: FnMut(&T) -> ScanVerdict,
    {
        let mut report = ScanReport::default();
        let Some(folder) = self.folders.get_mut(folder) else {
            return report;
        };

        for envelope in folder.envelopes.iter_mut().rev() {
            if envelope.read {
                break;
            }
            report.visited += 1;
            match verdict(&envelope.payload) {
                ScanVerdict::Consume => {
                    envelope.read = true;
                    report.consumed.push(envelope.payload.clone());
                }
                ScanVerdict::Discard => envelope.read = true,
                ScanVerdict::Defer => report.deferred += 1,
            }
        }
        report.consumed.reverse();
        report
    }

    /// Consume every unread envelope in arrival order
    pub fn drain_unread(&mut self, folder: &str) -> Vec<T> {
        self.scan(folder, |_| ScanVerdict::Consume).consumed
    }

    pub fn unread_count(&self, folder: &str) -> usize {
        self.folders
            .get(folder)
            .map(|f| f.envelopes.iter().filter(|e| !e.read).count())
            .unwrap_or(0)
    }

    /// Envelopes held, read or not
    pub fn len(&self, folder: &str) -> usize {
        self.folders.get(folder).map(|f| f.envelopes.len()).unwrap_or(0)
    }

    /// Release access explicitly
    pub fn relinquish(self) {}
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    #[test]
    fn scan_returns_unread_in_arrival_order_once() {
        let mailbox = Mailbox::new();
        for n in 0..5 {
            mailbox.deliver(n, "numbers");
        }

        let mut access = mailbox.request_access();
        let report = access.scan("numbers", |_| ScanVerdict::Consume);
        assert_eq!(report.consumed, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.visited, 5);

        let again = access.scan("numbers", |_| ScanVerdict::Consume);
        assert!(again.consumed.is_empty());
        assert_eq!(again.visited, 0);
    }

    #[test]
    fn scan_stops_at_first_read_envelope() {
        let mailbox = Mailbox::new();
        mailbox.deliver("a", "f");
        mailbox.deliver("b", "f");
        assert_eq!(mailbox.request_access().drain_unread("f"), vec!["a", "b"]);

        mailbox.deliver("c", "f");
        let report = mailbox.request_access().scan("f", |_| ScanVerdict::Consume);
        assert_eq!(report.consumed, vec!["c"]);
        assert_eq!(report.visited, 1);
    }

    #[test]
    fn discarded_envelopes_are_never_revisited() {
        let mailbox = Mailbox::new();
        for n in 0..4 {
            mailbox.deliver(n, "f");
        }
        let mut access = mailbox.request_access();
        let report = access.scan("f", |n| if *n == 3 { ScanVerdict::Consume } else { ScanVerdict::Discard });
        assert_eq!(report.consumed, vec![3]);
        assert_eq!(access.unread_count("f"), 0);
    }

    #[test]
    fn deferred_envelopes_stay_unread() {
        let mailbox = Mailbox::new();
        for tick in [10u64, 11, 12] {
            mailbox.deliver(tick, "updates");
        }
        let mut access = mailbox.request_access();
        let now = 11;
        let report = access.scan("updates", |tick| {
            if *tick > now {
                ScanVerdict::Defer
            } else {
                ScanVerdict::Consume
            }
        });
        assert_eq!(report.consumed, vec![10, 11]);
        assert_eq!(report.deferred, 1);
        assert_eq!(access.unread_count("updates"), 1);

        assert_eq!(access.drain_unread("updates"), vec![12]);
    }

    #[test]
    fn bounded_folders_evict_oldest() {
        let mailbox = Mailbox::new();
        mailbox.request_access().set_max_size("f", Some(3));
        for n in 0..5 {
            mailbox.deliver(n, "f");
        }
        let mut access = mailbox.request_access();
        assert_eq!(access.len("f"), 3);
        assert_eq!(access.drain_unread("f"), vec![2, 3, 4]);
    }

    #[test]
    fn folders_are_independent_and_created_on_delivery() {
        let mailbox = Mailbox::new();
        mailbox.deliver(1, "a");
        mailbox.deliver(2, "b");
        let mut access = mailbox.request_access();
        assert_eq!(access.drain_unread("missing"), Vec::<i32>::new());
        assert_eq!(access.drain_unread("b"), vec![2]);
        assert_eq!(access.unread_count("a"), 1);
    }

    #[test]
    fn concurrent_deliveries_are_all_seen_once() {
        let mailbox = Arc::new(Mailbox::new());
        let writers: Vec<_> = (0..4)
            .map(|w| {
                let mailbox = Arc::clone(&mailbox);
                thread::spawn(move || {
                    for n in 0..250 {
                        mailbox.deliver(w * 1000 + n, "f");
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        while seen.len() < 1000 {
            seen.extend(mailbox.request_access().drain_unread("f"));
            thread::yield_now();
        }
        for writer in writers {
            writer.join().expect("writer thread");
        }
        seen.extend(mailbox.request_access().drain_unread("f"));

        assert_eq!(seen.len(), 1000);
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 1000);
    }
}
