//! Average-in-flight-driven grow/trash decisions (spec.md §4.C "Resize").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeDecision {
    Grow,
    Trash,
    None,
}

/// Pure decision function, grounded on spec.md's exact thresholds: grow
/// when average in-flight exceeds `max_requests_per_connection * pool_size
/// * threshold`; trash a surplus connection when it falls below `core *
/// threshold`.
pub fn decide(
    total_in_flight: usize,
    pool_size: usize,
    core_connections: usize,
    max_connections: usize,
    max_requests_per_connection: usize,
    grow_threshold: f64,
    trash_threshold: f64,
) -> ResizeDecision {
    if pool_size == 0 {
        return ResizeDecision::Grow;
    }
    let average = total_in_flight as f64 / pool_size as f64;

    let grow_point = max_requests_per_connection as f64 * pool_size as f64 * grow_threshold;
    if average > grow_point && pool_size < max_connections {
        return ResizeDecision::Grow;
    }

    let trash_point = core_connections as f64 * trash_threshold;
    if average < trash_point && pool_size > core_connections {
        return ResizeDecision::Trash;
    }

    ResizeDecision::None
}
