//! Sweep-line detection of time windows where several instances of the same
//! object are visible at once.

use super::interval_tree::Interval;
use crate::error::{FramedexError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A span during which at least `count` instances were simultaneously active.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlapWindow<T> {
    pub start_time: f64,
    pub end_time: f64,
    /// Instances active when the window opened.
    pub instances: Vec<T>,
}

/// Start sorts before End so that an instance ending exactly when another
/// starts still counts as overlapping at that instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum EventKind {
    Start,
    End,
}

#[derive(Debug, Clone, Copy)]
struct Event {
    time: f64,
    kind: EventKind,
    instance: usize,
}

struct PendingWindow {
    start_time: f64,
    end_time: Option<f64>,
    instances: Vec<usize>,
}

/// Find every window where at least `count` of `instances` overlap.
///
/// A window opens when the active count reaches `count` and closes when it
/// drops below it again. Windows are reported in time order and never merged,
/// even when they touch. Returns an empty list for empty input or
/// `count < 2`.
///
/// # Examples
///
/// ```
/// use framedex::compute::temporal::{Interval, find_overlaps};
///
/// let people = vec![
///     Interval::new(0.0, 10.0, "a")?,
///     Interval::new(2.0, 12.0, "b")?,
///     Interval::new(4.0, 6.0, "c")?,
///     Interval::new(20.0, 30.0, "d")?,
/// ];
/// let windows = find_overlaps(&people, 2)?;
/// assert_eq!(windows.len(), 1);
/// assert_eq!((windows[0].start_time, windows[0].end_time), (2.0, 10.0));
/// assert!(find_overlaps(&people, 4)?.is_empty());
/// # Ok::<(), framedex::FramedexError>(())
/// ```
pub fn find_overlaps<T: Clone>(
    instances: &[Interval<T>],
    count: usize,
) -> Result<Vec<OverlapWindow<T>>> {
    if instances.is_empty() || count < 2 {
        return Ok(Vec::new());
    }

    let mut events: Vec<Event> = instances
        .iter()
        .enumerate()
        .flat_map(|(instance, iv)| {
            [
                Event {
                    time: iv.start,
                    kind: EventKind::Start,
                    instance,
                },
                Event {
                    time: iv.end,
                    kind: EventKind::End,
                    instance,
                },
            ]
        })
        .collect();
    events.sort_by(|a, b| {
        a.time
            .total_cmp(&b.time)
            .then(a.kind.cmp(&b.kind))
            .then(a.instance.cmp(&b.instance))
    });

    let mut active: BTreeSet<usize> = BTreeSet::new();
    let mut windows: Vec<PendingWindow> = Vec::new();
    let mut open: Vec<usize> = Vec::new();

    for event in events {
        match event.kind {
            EventKind::Start => {
                active.insert(event.instance);
                if active.len() == count {
                    open.push(windows.len());
                    windows.push(PendingWindow {
                        start_time: event.time,
                        end_time: None,
                        instances: active.iter().copied().collect(),
                    });
                }
            }
            EventKind::End => {
                if !active.remove(&event.instance) {
                    return Err(FramedexError::Internal(format!(
                        "end event at {} for instance {} that was never active",
                        event.time, event.instance
                    )));
                }
                if active.len() + 1 == count {
                    let idx = open.pop().ok_or_else(|| {
                        FramedexError::Internal(format!(
                            "overlap count dropped below {} at {} with no open window",
                            count, event.time
                        ))
                    })?;
                    windows[idx].end_time = Some(event.time);
                }
            }
        }
    }

    windows
        .into_iter()
        .map(|w| {
            let end_time = w.end_time.ok_or_else(|| {
                FramedexError::Internal(format!(
                    "overlap window opened at {} was never closed",
                    w.start_time
                ))
            })?;
            Ok(OverlapWindow {
                start_time: w.start_time,
                end_time,
                instances: w
                    .instances
                    .into_iter()
                    .map(|i| instances[i].payload.clone())
                    .collect(),
            })
        })
        .collect()
}
