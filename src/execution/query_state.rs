//! Per-query state machine (spec.md §4.D "Request Handler").
//!
//! Grounded on the teacher's `networking::loadbalancer` request-orchestration
//! loop shape (select a target, dispatch, classify failure, maybe retry),
//! generalized to this spec's host-plan/retry/speculative/cancellation
//! contract.

use crate::cluster::Host;
use crate::error::{DbError, NoHostAvailableError, Result};
use crate::execution::cancellation::CancellationToken;
use crate::execution::load_balancing::HostPlan;
use crate::execution::retry::{RequestKind, RetryDecision, RetryPolicy};
use crate::execution::speculative::SpeculativeExecutionPolicy;
use crate::pool::{Connection, HostDispatcher, RawResponse, Request};
use crate::protocol::{Compression, Opcode};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::stream::FuturesUnordered;
use futures::StreamExt;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout as tokio_timeout;

/// Looks up the live dispatcher for a host and drives the actual wire I/O
/// once a stream-id has been reserved; implemented by the session layer,
/// which owns both the `Host -> HostDispatcher` table and the raw sockets
/// (spec.md §4.D "D ... consults B for host enumeration [and] borrows a
/// connection from C").
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    fn dispatcher_for(&self, host: &Host) -> Option<Arc<HostDispatcher>>;

    /// Writes the framed request for `stream_id` onto `conn`'s underlying
    /// socket. The response arrives asynchronously through the connection's
    /// own read loop, which completes the stream-id via `Connection::complete`.
    async fn send(&self, conn: &Arc<Connection>, stream_id: i16, opcode: Opcode, body: BytesMut, compression: Compression) -> Result<()>;
}

pub struct QueryState {
    pub max_retries: u32,
    pub timeout: Duration,
    pub tracing: bool,
    pub retry_policy: Arc<dyn RetryPolicy>,
    pub speculative_policy: Arc<dyn SpeculativeExecutionPolicy>,
}

struct AttemptOutcome {
    host: SocketAddr,
    error: DbError,
}

/// Terminal outcome of running the full attempt-and-retry loop against a
/// single host, as raced by `execute` against other in-flight hosts.
enum HostAttemptResult {
    Success(RawResponse),
    /// Ends the whole request regardless of any sibling attempt still racing.
    Fatal(DbError),
    /// This host is done (retries exhausted, non-retryable, or cancelled);
    /// the plan should advance to the next host if one remains.
    Exhausted { host: SocketAddr, error: DbError },
}

impl QueryState {
    /// Executes `opcode`/`body` across `plan`. The first host is attempted
    /// immediately; if `speculative_policy` yields a delay and the first
    /// attempt is still outstanding when it elapses, a second attempt races
    /// against the next host in the plan (spec.md §4.D "Speculative
    /// execution"). Whichever attempt finishes first wins: its sibling is
    /// signalled via `cancellation` and its eventual response, if any, is
    /// dropped. Retryable per-host failures are retried in place per
    /// `retry_policy`; failures that advance the plan or exhaust retries
    /// feed the next race instead.
    pub async fn execute(
        &self,
        mut plan: HostPlan,
        opcode: Opcode,
        body: BytesMut,
        compression: Compression,
        connections: &dyn ConnectionSource,
        cancellation: CancellationToken,
    ) -> Result<RawResponse> {
        let mut errors = Vec::new();
        let mut attempt_index: u32 = 0;
        let mut in_flight: FuturesUnordered<Pin<Box<dyn Future<Output = HostAttemptResult> + Send + '_>>> = FuturesUnordered::new();

        match plan.pop_front() {
            Some(host) => in_flight.push(self.run_host(host, connections, cancellation.clone(), opcode, body.clone(), compression)),
            None => return Err(DbError::NoHostAvailable(NoHostAvailableError::new(errors))),
        }

        loop {
            let speculative_delay = if plan.is_empty() { None } else { self.speculative_policy.next_delay(attempt_index) };

            let raced = match speculative_delay {
                Some(delay) => {
                    tokio::select! {
                        biased;
                        result = in_flight.next() => Ok(result),
                        _ = tokio::time::sleep(delay) => Err(()),
                    }
                }
                None => Ok(in_flight.next().await),
            };

            match raced {
                Ok(Some(HostAttemptResult::Success(response))) => {
                    cancellation.cancel();
                    return Ok(response);
                }
                Ok(Some(HostAttemptResult::Fatal(error))) => {
                    cancellation.cancel();
                    return Err(error);
                }
                Ok(Some(HostAttemptResult::Exhausted { host, error })) => {
                    errors.push((host, error));
                    if in_flight.is_empty() {
                        match plan.pop_front() {
                            Some(host) => {
                                attempt_index += 1;
                                in_flight.push(self.run_host(host, connections, cancellation.clone(), opcode, body.clone(), compression));
                            }
                            None => return Err(DbError::NoHostAvailable(NoHostAvailableError::new(errors))),
                        }
                    }
                }
                Ok(None) => return Err(DbError::NoHostAvailable(NoHostAvailableError::new(errors))),
                Err(()) => {
                    // Speculative delay elapsed while the current attempt(s)
                    // are still outstanding: race the next host in the plan.
                    if let Some(host) = plan.pop_front() {
                        attempt_index += 1;
                        in_flight.push(self.run_host(host, connections, cancellation.clone(), opcode, body.clone(), compression));
                    }
                }
            }
        }
    }

    /// Runs the attempt-and-retry loop for a single host to completion.
    fn run_host<'a>(
        &'a self,
        host: Arc<Host>,
        connections: &'a dyn ConnectionSource,
        cancellation: CancellationToken,
        opcode: Opcode,
        body: BytesMut,
        compression: Compression,
    ) -> Pin<Box<dyn Future<Output = HostAttemptResult> + Send + 'a>> {
        Box::pin(async move {
            let Some(dispatcher) = connections.dispatcher_for(&host) else {
                return HostAttemptResult::Exhausted { host: host.address, error: DbError::ConnectionException("no dispatcher for host".into()) };
            };

            let mut retry_count = 0;
            let mut reprepared = false;
            loop {
                if cancellation.is_cancelled() {
                    return HostAttemptResult::Exhausted { host: host.address, error: DbError::Cancelled };
                }

                match self.attempt_once(&dispatcher, opcode, body.clone(), compression, connections, &cancellation).await {
                    Ok(response) => return HostAttemptResult::Success(response),
                    Err(outcome) => {
                        if outcome.error.is_fatal() {
                            return HostAttemptResult::Fatal(outcome.error);
                        }
                        if matches!(outcome.error, DbError::Unprepared(_)) {
                            // spec.md §4.D "unprepared -> re-prepare on this host,
                            // then retry this host": recovered locally, once.
                            if reprepared {
                                return HostAttemptResult::Exhausted { host: outcome.host, error: outcome.error };
                            }
                            reprepared = true;
                            match self.attempt_once(&dispatcher, Opcode::Prepare, body.clone(), compression, connections, &cancellation).await {
                                Ok(_) => continue,
                                Err(prepare_outcome) => {
                                    return HostAttemptResult::Exhausted { host: prepare_outcome.host, error: prepare_outcome.error };
                                }
                            }
                        }
                        if outcome.error.advances_host_plan() {
                            return HostAttemptResult::Exhausted { host: outcome.host, error: outcome.error };
                        }
                        if outcome.error.is_retryable_candidate() {
                            match self.retry_policy.on_error(&outcome.error, RequestKind::Unknown, retry_count) {
                                RetryDecision::RetrySame if retry_count < self.max_retries => {
                                    retry_count += 1;
                                    continue;
                                }
                                RetryDecision::RetryNext => {
                                    return HostAttemptResult::Exhausted { host: outcome.host, error: outcome.error };
                                }
                                RetryDecision::Ignore => {
                                    return HostAttemptResult::Success(RawResponse { opcode: Opcode::Ready, body: BytesMut::new() });
                                }
                                _ => {
                                    return HostAttemptResult::Fatal(DbError::NoHostAvailable(NoHostAvailableError::new(vec![(outcome.host, outcome.error)])));
                                }
                            }
                        }
                        return HostAttemptResult::Exhausted { host: outcome.host, error: outcome.error };
                    }
                }
            }
        })
    }

    async fn attempt_once(
        &self,
        dispatcher: &Arc<HostDispatcher>,
        opcode: Opcode,
        body: BytesMut,
        compression: Compression,
        connections: &dyn ConnectionSource,
        cancellation: &CancellationToken,
    ) -> std::result::Result<RawResponse, AttemptOutcome> {
        let (request, rx) = Request::new(opcode, body.clone(), compression, self.tracing);
        let (conn, stream_id) = dispatcher
            .dispatch(request)
            .await
            .map_err(|e| AttemptOutcome { host: dispatcher.address, error: e })?;

        if let Err(e) = connections.send(&conn, stream_id, opcode, body, compression).await {
            conn.complete(stream_id, Err(e.clone()));
            return Err(AttemptOutcome { host: dispatcher.address, error: e });
        }

        let response = match tokio_timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_canceled)) => Err(DbError::ConnectionException("response channel dropped".into())),
            Err(_elapsed) => {
                conn.complete(stream_id, Err(DbError::Timeout(self.timeout)));
                Err(DbError::Timeout(self.timeout))
            }
        };

        if cancellation.is_cancelled() {
            // The response (if any) has already been delivered to `rx` above;
            // per spec.md §4.D "Cancellation" we drop it without surfacing it
            // to the caller.
            return Err(AttemptOutcome { host: dispatcher.address, error: DbError::Cancelled });
        }

        response.map_err(|e| AttemptOutcome { host: dispatcher.address, error: e })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::PoolSizing;

    struct NoDispatchers;
    #[async_trait]
    impl ConnectionSource for NoDispatchers {
        fn dispatcher_for(&self, _host: &Host) -> Option<Arc<HostDispatcher>> {
            None
        }

        async fn send(&self, _conn: &Arc<Connection>, _stream_id: i16, _opcode: Opcode, _body: BytesMut, _compression: Compression) -> Result<()> {
            Ok(())
        }
    }

    fn addr(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    #[tokio::test]
    async fn empty_plan_returns_no_host_available() {
        let state = QueryState {
            max_retries: 1,
            timeout: Duration::from_secs(1),
            tracing: false,
            retry_policy: Arc::new(crate::execution::retry::DefaultRetryPolicy),
            speculative_policy: Arc::new(crate::execution::speculative::NoSpeculativeExecutionPolicy),
        };
        let result = state
            .execute(HostPlan::new(), Opcode::Query, BytesMut::new(), Compression::None, &NoDispatchers, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(DbError::NoHostAvailable(_))));
    }

    #[tokio::test]
    async fn missing_dispatcher_exhausts_plan_with_no_host_available() {
        let state = QueryState {
            max_retries: 1,
            timeout: Duration::from_secs(1),
            tracing: false,
            retry_policy: Arc::new(crate::execution::retry::DefaultRetryPolicy),
            speculative_policy: Arc::new(crate::execution::speculative::NoSpeculativeExecutionPolicy),
        };
        let mut plan = HostPlan::new();
        plan.push_back(Host::new(addr(9042)));
        let result = state
            .execute(plan, Opcode::Query, BytesMut::new(), Compression::None, &NoDispatchers, CancellationToken::new())
            .await;
        match result {
            Err(DbError::NoHostAvailable(e)) => assert_eq!(e.errors.len(), 1),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[allow(dead_code)]
    fn sizing_for_reference() -> PoolSizing {
        PoolSizing { core: 1, max: 1, max_requests_per_connection: 1 }
    }

    /// A `ConnectionSource` whose first `send` call stalls forever and whose
    /// every later call completes immediately, used to exercise the
    /// speculative-execution race in `execute`: the first host dispatched
    /// never responds, so the race must be won by whichever host is
    /// dispatched second.
    struct StallsFirstSend {
        dispatchers: std::collections::HashMap<SocketAddr, Arc<HostDispatcher>>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ConnectionSource for StallsFirstSend {
        fn dispatcher_for(&self, host: &Host) -> Option<Arc<HostDispatcher>> {
            self.dispatchers.get(&host.address).cloned()
        }

        async fn send(&self, conn: &Arc<Connection>, stream_id: i16, _opcode: Opcode, _body: BytesMut, _compression: Compression) -> Result<()> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                tokio::time::sleep(Duration::from_secs(60)).await;
                return Ok(());
            }
            conn.complete(stream_id, Ok(RawResponse { opcode: Opcode::Result, body: BytesMut::new() }));
            Ok(())
        }
    }

    #[tokio::test]
    async fn speculative_execution_races_next_host_when_first_stalls() {
        let host_a = Host::new(addr(9044));
        let host_b = Host::new(addr(9045));

        let mut dispatchers = std::collections::HashMap::new();
        dispatchers.insert(
            host_a.address,
            Arc::new(HostDispatcher::new(host_a.address, Default::default(), PoolSizing { core: 1, max: 1, max_requests_per_connection: 10 }, 8)),
        );
        dispatchers.insert(
            host_b.address,
            Arc::new(HostDispatcher::new(host_b.address, Default::default(), PoolSizing { core: 1, max: 1, max_requests_per_connection: 10 }, 8)),
        );

        let connections = StallsFirstSend { dispatchers, calls: std::sync::atomic::AtomicUsize::new(0) };

        let mut plan = HostPlan::new();
        plan.push_back(host_a);
        plan.push_back(host_b);

        let state = QueryState {
            max_retries: 1,
            timeout: Duration::from_secs(30),
            tracing: false,
            retry_policy: Arc::new(crate::execution::retry::DefaultRetryPolicy),
            speculative_policy: Arc::new(crate::execution::speculative::ConstantDelaySpeculativeExecutionPolicy {
                delay: Duration::from_millis(20),
                max_attempts: 2,
            }),
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            state.execute(plan, Opcode::Query, BytesMut::new(), Compression::None, &connections, CancellationToken::new()),
        )
        .await
        .expect("the speculative race should resolve well before the 30s per-attempt timeout");

        assert!(result.is_ok(), "expected the race to be won by the second host, got {result:?}");
    }

    /// A `ConnectionSource` whose first `send` reports `Unprepared`, whose
    /// second (the re-prepare) succeeds, and whose third (the retried
    /// original request) succeeds — exercising "re-prepare on this host,
    /// then retry this host" without ever advancing the host plan.
    struct UnpreparedThenRecovers {
        dispatcher: Arc<HostDispatcher>,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl ConnectionSource for UnpreparedThenRecovers {
        fn dispatcher_for(&self, _host: &Host) -> Option<Arc<HostDispatcher>> {
            Some(Arc::clone(&self.dispatcher))
        }

        async fn send(&self, conn: &Arc<Connection>, stream_id: i16, opcode: Opcode, _body: BytesMut, _compression: Compression) -> Result<()> {
            let call = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if call == 0 {
                assert_eq!(opcode, Opcode::Query);
                conn.complete(stream_id, Err(DbError::Unprepared("unknown prepared id".into())));
            } else if opcode == Opcode::Prepare {
                conn.complete(stream_id, Ok(RawResponse { opcode: Opcode::Result, body: BytesMut::new() }));
            } else {
                conn.complete(stream_id, Ok(RawResponse { opcode: Opcode::Result, body: BytesMut::new() }));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn unprepared_response_reprepares_and_retries_same_host_once() {
        let host = Host::new(addr(9046));
        let dispatcher = Arc::new(HostDispatcher::new(host.address, Default::default(), PoolSizing { core: 1, max: 1, max_requests_per_connection: 10 }, 8));
        let connections = UnpreparedThenRecovers { dispatcher, calls: std::sync::atomic::AtomicUsize::new(0) };

        let mut plan = HostPlan::new();
        plan.push_back(host);

        let state = QueryState {
            max_retries: 1,
            timeout: Duration::from_secs(1),
            tracing: false,
            retry_policy: Arc::new(crate::execution::retry::DefaultRetryPolicy),
            speculative_policy: Arc::new(crate::execution::speculative::NoSpeculativeExecutionPolicy),
        };

        let result = state
            .execute(plan, Opcode::Query, BytesMut::new(), Compression::None, &connections, CancellationToken::new())
            .await;

        assert!(result.is_ok(), "expected recovery via re-prepare, got {result:?}");
        assert_eq!(connections.calls.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
