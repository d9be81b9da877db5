//! Query request handler / speculative retry engine (spec.md §4.D).

pub mod cancellation;
pub mod load_balancing;
pub mod query_state;
pub mod retry;
pub mod speculative;

pub use cancellation::CancellationToken;
pub use load_balancing::{HostPlan, LoadBalancingPolicy, RoundRobinPolicy, TokenAwarePolicy};
pub use query_state::{ConnectionSource, QueryState};
pub use retry::{DefaultRetryPolicy, RequestKind, RetryDecision, RetryPolicy};
pub use speculative::{ConstantDelaySpeculativeExecutionPolicy, NoSpeculativeExecutionPolicy, SpeculativeExecutionPolicy};
