//! Ordered sequence matching: "object A, then B, then C" within one video.

use super::interval_tree::Interval;
use serde::{Deserialize, Serialize};

/// One occurrence of the requested sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceChain<T> {
    pub start_time: f64,
    pub end_time: f64,
    /// One instance per requested step, in order.
    pub steps: Vec<T>,
}

/// Find chains whose steps start in non-decreasing time order.
///
/// `steps[k]` holds the candidate instances for the k-th requested object.
/// Every instance of the first step seeds at most one chain; each following
/// step takes the earliest-starting instance not already used in the chain
/// that starts no earlier than the previous step. With `max_gap`, the start
/// of a step may trail the previous start by at most that many seconds.
///
/// ```
/// use framedex::compute::temporal::{Interval, find_sequences};
///
/// let doors = vec![Interval::new(1.0, 2.0, "door")?];
/// let people = vec![Interval::new(0.5, 1.0, "early")?, Interval::new(3.0, 4.0, "late")?];
/// let chains = find_sequences(&[doors, people], None);
/// assert_eq!(chains.len(), 1);
/// assert_eq!(chains[0].steps, vec!["door", "late"]);
/// # Ok::<(), framedex::FramedexError>(())
/// ```
pub fn find_sequences<T: Clone + PartialEq>(
    steps: &[Vec<Interval<T>>],
    max_gap: Option<f64>,
) -> Vec<SequenceChain<T>> {
    let Some((first, rest)) = steps.split_first() else {
        return Vec::new();
    };

    let sorted: Vec<Vec<&Interval<T>>> = rest
        .iter()
        .map(|candidates| {
            let mut sorted: Vec<&Interval<T>> = candidates.iter().collect();
            sorted.sort_by(|a, b| a.start.total_cmp(&b.start));
            sorted
        })
        .collect();

    let mut seeds: Vec<&Interval<T>> = first.iter().collect();
    seeds.sort_by(|a, b| a.start.total_cmp(&b.start));

    let mut chains = Vec::new();
    'seeds: for seed in seeds {
        let mut chain: Vec<&Interval<T>> = vec![seed];

        for candidates in &sorted {
            let prev_start = chain[chain.len() - 1].start;
            let from = candidates.partition_point(|iv| iv.start < prev_start);
            let next = candidates[from..]
                .iter()
                .find(|iv| !chain.iter().any(|used| used.payload == iv.payload))
                .copied();

            match next {
                Some(iv) if max_gap.is_none_or(|gap| iv.start - prev_start <= gap) => {
                    chain.push(iv)
                }
                _ => continue 'seeds,
            }
        }

        chains.push(SequenceChain {
            start_time: seed.start,
            end_time: chain.iter().map(|iv| iv.end).fold(f64::MIN, f64::max),
            steps: chain.into_iter().map(|iv| iv.payload.clone()).collect(),
        });
    }

    chains
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(items: &[(&'static str, f64, f64)]) -> Vec<Interval<&'static str>> {
        items
            .iter()
            .map(|&(name, s, e)| Interval::new(s, e, name).unwrap())
            .collect()
    }

    #[test]
    fn test_simple_sequence() {
        let cars = named(&[("car1", 0.0, 5.0), ("car2", 10.0, 12.0)]);
        let people = named(&[("p1", 3.0, 4.0), ("p2", 11.0, 15.0)]);

        let chains = find_sequences(&[cars, people], None);
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].steps, vec!["car1", "p1"]);
        assert_eq!((chains[0].start_time, chains[0].end_time), (0.0, 5.0));
        assert_eq!(chains[1].steps, vec!["car2", "p2"]);
        assert_eq!(chains[1].end_time, 15.0);
    }

    #[test]
    fn test_sequence_requires_order() {
        let dogs = named(&[("dog", 10.0, 12.0)]);
        let balls = named(&[("ball", 1.0, 2.0)]);
        assert!(find_sequences(&[dogs, balls], None).is_empty());
    }

    #[test]
    fn test_equal_starts_count_as_ordered() {
        let a = named(&[("a", 5.0, 6.0)]);
        let b = named(&[("b", 5.0, 7.0)]);
        let chains = find_sequences(&[a, b], None);
        assert_eq!(chains.len(), 1);
    }

    #[test]
    fn test_max_gap() {
        let a = named(&[("a", 0.0, 1.0)]);
        let b = named(&[("b", 30.0, 31.0)]);
        assert!(find_sequences(&[a.clone(), b.clone()], Some(10.0)).is_empty());
        assert_eq!(find_sequences(&[a, b], Some(30.0)).len(), 1);
    }

    #[test]
    fn test_repeated_object_uses_distinct_instances() {
        let people = named(&[("p1", 0.0, 1.0), ("p2", 4.0, 5.0)]);
        let chains = find_sequences(&[people.clone(), people], None);
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].steps, vec!["p1", "p2"]);
    }

    #[test]
    fn test_empty_steps() {
        assert!(find_sequences::<u8>(&[], None).is_empty());
        let a = named(&[("a", 0.0, 1.0)]);
        assert!(find_sequences(&[a, Vec::new()], None).is_empty());
    }
}
