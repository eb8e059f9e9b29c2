//! Priority-ordered registration records for the poll backend.
//!
//! Records are kept sorted by ascending priority. A new record goes after
//! every record of equal or more urgent priority, so records sharing a
//! priority stay in registration order.
use std::os::fd::RawFd;

use crate::{condition::IoCondition, pollfd::PollFd};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollRecord {
    pub fd: RawFd,
    pub events: IoCondition,
    pub priority: i32,
}

#[derive(Debug, Default)]
pub struct RecordList {
    records: Vec<PollRecord>,
}

impl RecordList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PollRecord> {
        self.records.iter()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn insert(&mut self, record: PollRecord) {
        // walk back from the tail past everything less urgent
        let pos = self
            .records
            .iter()
            .rposition(|r| r.priority <= record.priority)
            .map_or(0, |i| i + 1);
        self.records.insert(pos, record);
    }

    /// Removes the first record for `fd`.
    pub fn remove(&mut self, fd: RawFd) -> Option<PollRecord> {
        let pos = self.records.iter().position(|r| r.fd == fd)?;
        Some(self.records.remove(pos))
    }

    /// Updates the first record for `fd`, moving it if its priority changed.
    /// Returns false if no record matches.
    pub fn update(&mut self, fd: RawFd, events: IoCondition, priority: i32) -> bool {
        let Some(pos) = self.records.iter().position(|r| r.fd == fd) else {
            return false;
        };
        if self.records[pos].priority == priority {
            self.records[pos].events = events;
        } else {
            self.records.remove(pos);
            self.insert(PollRecord {
                fd,
                events,
                priority,
            });
        }
        true
    }

    /// Fills `fds` with every record up to `max_priority`, most urgent first.
    ///
    /// Records with an empty mask keep their slot but get fd -1, which
    /// poll(2) skips; otherwise it would still report HUP or ERR for them.
    /// Returns the number of matching records, which exceeds `fds.len()` when
    /// the buffer was too small; the caller grows it and queries again.
    pub fn query(&self, max_priority: i32, fds: &mut [PollFd]) -> usize {
        let mut n = 0;
        for record in self
            .records
            .iter()
            .take_while(|r| r.priority <= max_priority)
        {
            if let Some(slot) = fds.get_mut(n) {
                *slot = if record.events.is_empty() {
                    PollFd::default()
                } else {
                    PollFd::new(record.fd, record.events)
                };
            }
            n += 1;
        }
        n
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn record(fd: RawFd, priority: i32) -> PollRecord {
        PollRecord {
            fd,
            events: IoCondition::IN,
            priority,
        }
    }

    fn fds(list: &RecordList, max_priority: i32) -> Vec<RawFd> {
        let mut buf = vec![PollFd::default(); list.len()];
        let n = list.query(max_priority, &mut buf);
        buf[..n].iter().map(|p| p.fd).collect()
    }

    #[test]
    fn threshold_limits_query() {
        let mut list = RecordList::new();
        list.insert(record(7, 10));
        list.insert(record(5, 0));

        assert_eq!(fds(&list, 0), [5]);
        assert_eq!(fds(&list, 10), [5, 7]);
        assert_eq!(fds(&list, -1), Vec::<RawFd>::new());
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let mut list = RecordList::new();
        list.insert(record(1, 0));
        list.insert(record(2, 5));
        list.insert(record(3, 0));
        list.insert(record(4, 5));
        list.insert(record(5, -5));

        assert_eq!(fds(&list, 100), [5, 1, 3, 2, 4]);
    }

    #[test]
    fn short_buffer_reports_full_count() {
        let mut list = RecordList::new();
        for fd in 0..4 {
            list.insert(record(fd, 0));
        }
        let mut buf = vec![PollFd::default(); 2];
        assert_eq!(list.query(0, &mut buf), 4);
        assert_eq!(buf[0].fd, 0);
        assert_eq!(buf[1].fd, 1);
    }

    #[test]
    fn empty_mask_keeps_its_slot_unwatched() {
        let mut list = RecordList::new();
        list.insert(record(1, 0));
        list.insert(PollRecord {
            fd: 2,
            events: IoCondition::empty(),
            priority: 0,
        });
        list.insert(record(3, 0));

        assert_eq!(fds(&list, 0), [1, -1, 3]);
    }

    #[test]
    fn priority_change_moves_record() {
        let mut list = RecordList::new();
        list.insert(record(1, 0));
        list.insert(record(2, 10));

        assert!(list.update(1, IoCondition::OUT, 20));
        assert_eq!(fds(&list, 100), [2, 1]);
        assert_eq!(fds(&list, 10), [2]);

        assert!(list.update(2, IoCondition::OUT, 10));
        let first = list.iter().next().unwrap();
        assert_eq!(first.events, IoCondition::OUT);

        assert!(!list.update(9, IoCondition::IN, 0));
    }

    #[test]
    fn remove_takes_first_match() {
        let mut list = RecordList::new();
        list.insert(record(3, 1));
        list.insert(record(3, 2));
        assert_eq!(list.remove(3).map(|r| r.priority), Some(1));
        assert_eq!(list.len(), 1);
        assert_eq!(list.remove(8), None);
    }

    proptest! {
        #[test]
        fn query_matches_filtered_sorted_records(
            priorities in prop::collection::vec(-20i32..20, 0..40),
            max_priority in -25i32..25,
        ) {
            let mut list = RecordList::new();
            for (fd, &priority) in priorities.iter().enumerate() {
                list.insert(record(fd as RawFd, priority));
            }

            let mut expected: Vec<(i32, RawFd)> = priorities
                .iter()
                .enumerate()
                .filter(|(_, &p)| p <= max_priority)
                .map(|(fd, &p)| (p, fd as RawFd))
                .collect();
            // stable sort keeps registration order within a priority
            expected.sort_by_key(|&(p, _)| p);
            let expected: Vec<RawFd> = expected.into_iter().map(|(_, fd)| fd).collect();

            prop_assert_eq!(fds(&list, max_priority), expected);
        }
    }
}
