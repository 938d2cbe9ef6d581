//! Scoped event views handed to each worker.
//!
//! Every view is order-preserving and keeps the most recent `limit`
//! matches, dropping the oldest first.

use qa_core::events::{Event, EventKind};

/// Trailing window of raw events kept for any payload.
pub const EVENT_WINDOW: usize = 300;
/// Cap on each scoped view.
pub const VIEW_LIMIT: usize = 200;

const LOG_KINDS: &[EventKind] = &[EventKind::Console, EventKind::Network];
const REPRO_KINDS: &[EventKind] = &[EventKind::Interaction, EventKind::Marker, EventKind::Annotation];
const VISUAL_KINDS: &[EventKind] = &[EventKind::Marker, EventKind::Annotation];

/// The last `limit` events matching `predicate`, in input order.
pub fn filter_events(events: &[Event], predicate: impl Fn(&Event) -> bool, limit: usize) -> Vec<Event> {
    let mut matched: Vec<&Event> = events.iter().rev().filter(|e| predicate(e)).take(limit).collect();
    matched.reverse();
    matched.into_iter().cloned().collect()
}

pub fn filter_kinds(events: &[Event], kinds: &[EventKind], limit: usize) -> Vec<Event> {
    filter_events(events, |e| kinds.contains(&e.kind), limit)
}

/// The trailing `limit` events regardless of kind.
pub fn trim_events(events: &[Event], limit: usize) -> &[Event] {
    &events[events.len().saturating_sub(limit)..]
}

/// Console and network events for the log analyst.
pub fn log_view(events: &[Event]) -> Vec<Event> {
    filter_kinds(trim_events(events, EVENT_WINDOW), LOG_KINDS, VIEW_LIMIT)
}

/// Interactions, markers and annotations for the repro planner.
pub fn repro_view(events: &[Event]) -> Vec<Event> {
    filter_kinds(trim_events(events, EVENT_WINDOW), REPRO_KINDS, VIEW_LIMIT)
}

/// Markers and annotations for the visual analyst; the media reference
/// travels separately.
pub fn visual_view(events: &[Event]) -> Vec<Event> {
    filter_kinds(trim_events(events, EVENT_WINDOW), VISUAL_KINDS, VIEW_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ev(kind: EventKind, ts: i64) -> Event {
        Event::new(kind, ts, json!({}))
    }

    fn stamps(events: &[Event]) -> Vec<i64> {
        events.iter().map(|e| e.ts.as_i64().unwrap()).collect()
    }

    #[test]
    fn keeps_most_recent_matches_in_order() {
        let events: Vec<_> = (0..10)
            .map(|i| ev(if i % 2 == 0 { EventKind::Console } else { EventKind::Interaction }, i))
            .collect();
        let picked = filter_kinds(&events, &[EventKind::Console], 3);
        assert_eq!(stamps(&picked), vec![4, 6, 8]);
    }

    #[test]
    fn empty_input_or_no_match_is_empty() {
        assert!(filter_kinds(&[], LOG_KINDS, 10).is_empty());
        let events = vec![ev(EventKind::Marker, 1)];
        assert!(log_view(&events).is_empty());
        assert!(filter_kinds(&events, VISUAL_KINDS, 0).is_empty());
    }

    #[test]
    fn log_view_interleaves_console_and_network() {
        let events = vec![
            ev(EventKind::Network, 1),
            ev(EventKind::Console, 2),
            ev(EventKind::Interaction, 3),
            ev(EventKind::Network, 4),
        ];
        assert_eq!(stamps(&log_view(&events)), vec![1, 2, 4]);
    }

    #[test]
    fn views_overlap_on_markers() {
        let events = vec![
            ev(EventKind::Interaction, 1),
            ev(EventKind::Marker, 2),
            ev(EventKind::Annotation, 3),
            ev(EventKind::Other("dom".into()), 4),
        ];
        assert_eq!(stamps(&repro_view(&events)), vec![1, 2, 3]);
        assert_eq!(stamps(&visual_view(&events)), vec![2, 3]);
    }

    #[test]
    fn views_are_capped() {
        let events: Vec<_> = (0..250).map(|i| ev(EventKind::Console, i)).collect();
        let view = log_view(&events);
        assert_eq!(view.len(), VIEW_LIMIT);
        assert_eq!(view.first().unwrap().ts, json!(50));
        assert_eq!(view.last().unwrap().ts, json!(249));
    }

    #[test]
    fn window_applies_before_scoping() {
        let mut events: Vec<_> = (0..5).map(|i| ev(EventKind::Marker, i)).collect();
        events.extend((5..305).map(|i| ev(EventKind::Console, i)));
        assert!(visual_view(&events).is_empty());
        assert_eq!(trim_events(&events, EVENT_WINDOW).len(), EVENT_WINDOW);
    }
}
