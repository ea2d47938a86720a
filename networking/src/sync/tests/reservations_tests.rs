use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rstest::rstest;

use super::hash;
use crate::sync::{ReservationState, Reservations};
use crate::types::WorkerId;

const LATENCY: Duration = Duration::from_secs(60);

fn table(heights: std::ops::RangeInclusive<u64>, maximum_deviation: u64) -> Reservations {
    let reservations = Reservations::new(maximum_deviation, LATENCY);
    for height in heights {
        assert!(reservations.push_back(hash(height), height));
    }
    reservations
}

#[test]
fn test_push_front_extends_downward_only() {
    let reservations = Reservations::new(50, LATENCY);
    assert!(reservations.push_front(hash(53), 53));
    assert!(reservations.push_front(hash(52), 52));
    assert!(reservations.push_front(hash(51), 51));

    assert!(!reservations.push_front(hash(52), 52));
    assert!(!reservations.push_front(hash(60), 60));

    assert_eq!(reservations.heights(), vec![51, 52, 53]);
}

#[test]
fn test_push_back_extends_upward_only() {
    let reservations = table(10..=12, 50);

    assert!(!reservations.push_back(hash(12), 12));
    assert!(!reservations.push_back(hash(5), 5));
    assert!(reservations.push_back(hash(13), 13));

    assert_eq!(reservations.heights(), vec![10, 11, 12, 13]);
}

#[test]
fn test_pop_back_only_at_highest() {
    let reservations = table(10..=12, 50);

    assert!(!reservations.pop_back(&hash(11), 11));
    assert!(!reservations.pop_back(&hash(99), 99));
    assert!(reservations.pop_back(&hash(12), 12));
    assert!(reservations.pop_back(&hash(11), 11));

    assert_eq!(reservations.heights(), vec![10]);
}

#[test]
fn test_pop_back_drops_assignment() {
    let reservations = table(10..=10, 50);
    let worker = WorkerId(1);

    let reservation = reservations.get(worker).unwrap();
    assert!(reservations.pop_back(&reservation.hash, 10));

    assert!(!reservations.complete(worker, 10, &reservation.hash));
    assert_eq!(reservations.stats().assigned, 0);
    assert!(reservations.is_empty());
}

#[test]
fn test_get_hands_out_lowest_pending() {
    let reservations = table(10..=12, 50);

    let first = reservations.get(WorkerId(1)).unwrap();
    let second = reservations.get(WorkerId(2)).unwrap();

    assert_eq!((first.height, first.hash), (10, hash(10)));
    assert_eq!(second.height, 11);
    assert!(second.state.is_assigned_to(WorkerId(2)));

    let stats = reservations.stats();
    assert_eq!((stats.pending, stats.assigned, stats.reassigned), (1, 2, 0));
}

#[test]
fn test_get_on_empty_table() {
    let reservations = Reservations::new(50, LATENCY);
    assert_eq!(reservations.get(WorkerId(1)), None);
}

#[test]
fn test_concurrent_get_assigns_each_height_once() {
    // No deviation bound, so nothing becomes stalled while workers drain.
    let reservations = table(1..=500, u64::MAX);

    let assigned: Vec<Vec<u64>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let reservations = &reservations;
                scope.spawn(move || {
                    let mut heights = Vec::new();
                    while let Some(reservation) = reservations.get(WorkerId(worker)) {
                        heights.push(reservation.height);
                    }
                    heights
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    let all: Vec<u64> = assigned.into_iter().flatten().collect();
    let unique: HashSet<u64> = all.iter().copied().collect();
    assert_eq!(all.len(), 500);
    assert_eq!(unique.len(), 500);
    assert_eq!(reservations.stats().assigned, 500);
}

#[rstest]
#[case(15, false)]
#[case(16, true)]
fn test_deviation_bound_reoffers_lagging_assignment(
    #[case] lowest_pending: u64,
    #[case] reoffered: bool,
) {
    let reservations = table(10..=30, 5);
    let slow = WorkerId(1);
    let fast = WorkerId(2);

    assert_eq!(reservations.get(slow).unwrap().height, 10);
    for height in 11..lowest_pending {
        let reservation = reservations.get(fast).unwrap();
        assert_eq!(reservation.height, height);
        assert!(reservations.complete(fast, height, &reservation.hash));
    }

    let next = reservations.get(fast).unwrap();
    if reoffered {
        assert_eq!(next.height, 10);
        assert_eq!(reservations.stats().reassigned, 1);
    } else {
        assert_eq!(next.height, lowest_pending);
        assert_eq!(reservations.stats().reassigned, 0);
    }
}

#[test]
fn test_reassigned_entry_is_not_taken_again_at_same_frontier() {
    let reservations = table(10..=30, 5);
    let slow = WorkerId(1);
    let fast = WorkerId(2);

    assert_eq!(reservations.get(slow).unwrap().height, 10);
    for height in 11..16 {
        let reservation = reservations.get(fast).unwrap();
        assert!(reservations.complete(fast, height, &reservation.hash));
    }

    assert_eq!(reservations.get(WorkerId(3)).unwrap().height, 10);
    assert_eq!(reservations.get(WorkerId(4)).unwrap().height, 16);
    assert_eq!(reservations.get(WorkerId(5)).unwrap().height, 17);
    assert_eq!(reservations.stats().reassigned, 1);

    // The frontier moves past 10 again by more than the deviation.
    for height in 18..22 {
        let reservation = reservations.get(fast).unwrap();
        assert_eq!(reservation.height, height);
        assert!(reservations.complete(fast, height, &reservation.hash));
    }

    assert_eq!(reservations.get(WorkerId(6)).unwrap().height, 10);
    assert_eq!(reservations.stats().reassigned, 2);
    assert!(!reservations.complete(WorkerId(3), 10, &hash(10)));
    assert!(reservations.complete(WorkerId(6), 10, &hash(10)));
}

#[test]
fn test_stats_track_every_transition() {
    let reservations = table(10..=14, 50);
    let stats = |reservations: &Reservations| {
        let stats = reservations.stats();
        (stats.pending, stats.assigned)
    };
    assert_eq!(stats(&reservations), (5, 0));

    let first = reservations.get(WorkerId(1)).unwrap();
    let second = reservations.get(WorkerId(2)).unwrap();
    assert_eq!(stats(&reservations), (3, 2));

    assert!(reservations.release(WorkerId(1), first.height));
    assert_eq!(stats(&reservations), (4, 1));

    assert!(reservations.complete(WorkerId(2), second.height, &second.hash));
    assert_eq!(stats(&reservations), (4, 0));

    let top = reservations.get(WorkerId(3)).unwrap();
    assert_eq!(top.height, 10);
    assert!(reservations.pop_back(&hash(14), 14));
    assert!(reservations.push_front(hash(9), 9));
    assert_eq!(stats(&reservations), (3, 1));
    assert_eq!(reservations.heights(), vec![9, 10, 12, 13]);

    // Heights pushed below the table are handed out first.
    assert_eq!(reservations.get(WorkerId(4)).unwrap().height, 9);
    assert_eq!(reservations.get(WorkerId(4)).unwrap().height, 12);
}

#[test]
fn test_latency_reoffers_stalled_assignment() {
    let reservations = Reservations::new(50, Duration::from_millis(50));
    for height in 10..=12 {
        reservations.push_back(hash(height), height);
    }

    assert_eq!(reservations.get(WorkerId(1)).unwrap().height, 10);
    assert_eq!(reservations.get(WorkerId(2)).unwrap().height, 11);

    thread::sleep(Duration::from_millis(80));

    let reassigned = reservations.get(WorkerId(3)).unwrap();
    assert_eq!(reassigned.height, 10);
    assert!(reassigned.state.is_assigned_to(WorkerId(3)));
    assert_eq!(reservations.stats().reassigned, 1);

    // The first worker lost the entry.
    assert!(!reservations.complete(WorkerId(1), 10, &hash(10)));
    assert!(reservations.complete(WorkerId(3), 10, &hash(10)));
}

#[test]
fn test_stalled_assignment_not_reoffered_to_its_worker() {
    let reservations = Reservations::new(50, Duration::ZERO);
    reservations.push_back(hash(10), 10);
    reservations.push_back(hash(11), 11);

    assert_eq!(reservations.get(WorkerId(1)).unwrap().height, 10);
    assert_eq!(reservations.get(WorkerId(1)).unwrap().height, 11);
    assert_eq!(reservations.stats().reassigned, 0);
}

#[test]
fn test_complete_requires_assignee_and_hash() {
    let reservations = table(10..=11, 50);
    let reservation = reservations.get(WorkerId(1)).unwrap();

    assert!(!reservations.complete(WorkerId(2), 10, &reservation.hash));
    assert!(!reservations.complete(WorkerId(1), 10, &hash(99)));
    assert!(!reservations.complete(WorkerId(1), 11, &hash(11)));
    assert!(reservations.complete(WorkerId(1), 10, &reservation.hash));

    assert!(!reservations.complete(WorkerId(1), 10, &reservation.hash));
    assert_eq!(reservations.heights(), vec![11]);
}

#[test]
fn test_release_returns_entry_to_pending() {
    let reservations = table(10..=11, 50);
    let reservation = reservations.get(WorkerId(1)).unwrap();

    assert!(!reservations.release(WorkerId(2), reservation.height));
    assert!(reservations.release(WorkerId(1), reservation.height));
    assert!(!reservations.release(WorkerId(1), reservation.height));

    let again = reservations.get(WorkerId(2)).unwrap();
    assert_eq!(again.height, 10);
    assert_eq!(reservations.stats().reassigned, 0);
}

#[test]
fn test_clear() {
    let reservations = table(1..=5, 50);
    reservations.get(WorkerId(1));
    reservations.clear();

    assert!(reservations.is_empty());
    assert_eq!(reservations.stats().assigned, 0);
    assert!(reservations.push_front(hash(1), 1));
}

#[test]
fn test_state_transitions() {
    let now = std::time::Instant::now();
    let assigned = ReservationState::Assigned { worker: WorkerId(1), since: now };

    assert_eq!(ReservationState::default(), ReservationState::Pending);
    assert!(ReservationState::Pending.can_transition_to(assigned));
    assert!(!ReservationState::Pending.can_transition_to(ReservationState::Complete));
    assert!(assigned.can_transition_to(ReservationState::Complete));
    assert!(assigned.can_transition_to(ReservationState::Pending));
    assert!(!assigned.can_transition_to(assigned));
    assert!(assigned.can_transition_to(ReservationState::Assigned { worker: WorkerId(2), since: now }));
    assert!(!ReservationState::Complete.can_transition_to(ReservationState::Pending));
}
