//! Lazy stage composition
//!
//! A `Stage<T>` is one link in a pipeline: it owns its predecessor's run
//! closure exclusively and transforms the upstream sequence into a new
//! sequence. Stages are built once at pipeline-definition time, are
//! immutable afterwards, and are traversed (never mutated) on every
//! invocation. The chain is a list by construction — each combinator wraps,
//! never shares, the predecessor.
//!
//! Sequences are pull-based `futures` streams: stage traversal is
//! synchronous between suspension points, and elements keep upstream
//! arrival order.
//!
//! # Example
//!
//! ```no_run
//! use alembic::prelude::*;
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Job {
//!     id: String,
//! }
//!
//! let unit = Stage::<Job>::from_queue("jobs")
//!     .map(None, |job: Job, _client| async move { Ok(job.id) })
//!     .for_each(None, FunctionProps::named("job-logger"), |id, _client| async move {
//!         tracing::info!("job {}", id);
//!         Ok(())
//!     });
//! ```

use crate::dependency::{prepend, Capability, Client, Dependency, DependencyList};
use crate::event::{Event, Schedule, StartingPosition, TriggerDescriptor};
use crate::function_unit::{FunctionProps, FunctionUnit, UnitHandler};
use alembic_core::{AlembicError, Result};
use chrono::{DateTime, Utc};
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

pub(crate) type RunFn<T> = Arc<dyn Fn(Event, Vec<Client>) -> BoxStream<'static, Result<T>> + Send + Sync>;

/// Which trigger the chain is rooted at.
#[derive(Debug, Clone)]
enum SourceKind {
    Schedule {
        schedule: Schedule,
    },
    Queue {
        queue: String,
    },
    Stream {
        stream: String,
        starting_position: StartingPosition,
    },
}

/// One link in a pipeline chain, producing a sequence of `T`.
pub struct Stage<T> {
    source: SourceKind,
    deps: DependencyList,
    run_fn: RunFn<T>,
}

impl<T> Clone for Stage<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            deps: Arc::clone(&self.deps),
            run_fn: Arc::clone(&self.run_fn),
        }
    }
}

fn shape_error(expected: &str, got: &str) -> AlembicError {
    AlembicError::DependencyShape {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

impl<T: DeserializeOwned + Send + 'static> Stage<T> {
    /// Root a chain at a queue trigger; each pulled message decodes to one
    /// element.
    pub fn from_queue(queue: impl Into<String>) -> Self {
        Self {
            source: SourceKind::Queue {
                queue: queue.into(),
            },
            deps: Arc::new(Vec::new()),
            run_fn: Arc::new(|event, _clients| match event {
                Event::Queue { messages } => stream::iter(
                    messages
                        .into_iter()
                        .map(|m| serde_json::from_value::<T>(m).map_err(AlembicError::from)),
                )
                .boxed(),
                other => mismatch_stream("queue", other),
            }),
        }
    }

    /// Root a chain at a stream subscription; each record decodes to one
    /// element.
    pub fn from_stream(name: impl Into<String>, starting_position: StartingPosition) -> Self {
        Self {
            source: SourceKind::Stream {
                stream: name.into(),
                starting_position,
            },
            deps: Arc::new(Vec::new()),
            run_fn: Arc::new(|event, _clients| match event {
                Event::Stream { records } => stream::iter(
                    records
                        .into_iter()
                        .map(|r| serde_json::from_value::<T>(r).map_err(AlembicError::from)),
                )
                .boxed(),
                other => mismatch_stream("stream", other),
            }),
        }
    }
}

fn mismatch_stream<T: Send + 'static>(expected: &str, got: Event) -> BoxStream<'static, Result<T>> {
    let err = AlembicError::EventMismatch(format!(
        "expected {} event, got {}",
        expected,
        got.kind()
    ));
    stream::once(ready(Err(err))).boxed()
}

impl Stage<DateTime<Utc>> {
    /// Root a chain at a schedule; each firing yields one tick element.
    pub fn from_schedule(schedule: Schedule) -> Result<Self> {
        schedule.validate()?;
        Ok(Self {
            source: SourceKind::Schedule { schedule },
            deps: Arc::new(Vec::new()),
            run_fn: Arc::new(|event, _clients| match event {
                Event::Schedule { time } => stream::once(ready(Ok(time))).boxed(),
                other => mismatch_stream("schedule", other),
            }),
        })
    }
}

impl<T: Send + 'static> Stage<T> {
    /// The dependency list this stage's transformation expects, tail-first.
    pub fn dependencies(&self) -> DependencyList {
        Arc::clone(&self.deps)
    }

    /// Evaluate the chain against one event. `clients` must match
    /// `dependencies()` positionally; function units validate this before
    /// calling in.
    pub fn run(&self, event: Event, clients: Vec<Client>) -> BoxStream<'static, Result<T>> {
        (self.run_fn)(event, clients)
    }

    /// The trigger descriptor for the source this chain is rooted at.
    pub fn event_source(&self, props: &FunctionProps) -> TriggerDescriptor {
        match &self.source {
            SourceKind::Schedule { schedule } => TriggerDescriptor::Schedule {
                schedule: schedule.clone(),
            },
            SourceKind::Queue { queue } => TriggerDescriptor::Queue {
                queue: queue.clone(),
                batch_size: props.batch_size,
            },
            SourceKind::Stream {
                stream,
                starting_position,
            } => TriggerDescriptor::Stream {
                stream: stream.clone(),
                batch_size: props.batch_size,
                starting_position: *starting_position,
            },
        }
    }

    /// The chaining primitive: wrap this stage with a transformation over
    /// the whole upstream sequence (fusion, filtering, windowing — not just
    /// per-element maps).
    ///
    /// When `depends` is `Some`, the resolved client for it arrives at
    /// index 0 of this stage's client list and only the tail flows to the
    /// predecessor; when `None`, the dependency list is shared by identity
    /// and the client list passes through untouched.
    pub fn chain<U, F>(&self, depends: Option<Dependency>, f: F) -> Stage<U>
    where
        U: Send + 'static,
        F: Fn(BoxStream<'static, Result<T>>, Vec<Client>) -> BoxStream<'static, Result<U>>
            + Send
            + Sync
            + 'static,
    {
        let prev_run = Arc::clone(&self.run_fn);
        let prev_deps = Arc::clone(&self.deps);
        let deps = match depends {
            Some(dep) => prepend(&self.deps, dep),
            None => Arc::clone(&self.deps),
        };
        let my_deps = Arc::clone(&deps);

        let run_fn: RunFn<U> = Arc::new(move |event, mut clients| {
            // Identical list (by identity) means this stage added nothing:
            // every client passes through to the predecessor unchanged.
            let own = if Arc::ptr_eq(&my_deps, &prev_deps) {
                Vec::new()
            } else {
                if clients.is_empty() {
                    let err = shape_error("client at index 0", "empty client list");
                    return stream::once(ready(Err(err))).boxed();
                }
                vec![clients.remove(0)]
            };
            let upstream = (prev_run)(event, clients);
            f(upstream, own)
        });

        Stage {
            source: self.source.clone(),
            deps,
            run_fn,
        }
    }

    /// Transform each element. The handler runs sequentially, in upstream
    /// order, receiving the client for `depends` when declared.
    pub fn map<U, F, Fut>(&self, depends: Option<Dependency>, f: F) -> Stage<U>
    where
        U: Send + 'static,
        F: Fn(T, Option<Client>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<U>> + Send + 'static,
    {
        self.chain(depends, move |upstream, own| {
            let f = f.clone();
            let client = own.into_iter().next();
            upstream
                .then(move |item| {
                    let f = f.clone();
                    let client = client.clone();
                    async move {
                        match item {
                            Ok(value) => f(value, client).await,
                            Err(e) => Err(e),
                        }
                    }
                })
                .boxed()
        })
    }

    /// Transform each element into zero or more outputs, flattened in
    /// order.
    pub fn flat_map<U, F, Fut>(&self, depends: Option<Dependency>, f: F) -> Stage<U>
    where
        U: Send + 'static,
        F: Fn(T, Option<Client>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<Vec<U>>> + Send + 'static,
    {
        self.chain(depends, move |upstream, own| {
            let f = f.clone();
            let client = own.into_iter().next();
            upstream
                .then(move |item| {
                    let f = f.clone();
                    let client = client.clone();
                    async move {
                        match item {
                            Ok(value) => f(value, client).await,
                            Err(e) => Err(e),
                        }
                    }
                })
                .map(|result| match result {
                    Ok(values) => stream::iter(values.into_iter().map(Ok)).left_stream(),
                    Err(e) => stream::once(ready(Err(e))).right_stream(),
                })
                .flatten()
                .boxed()
        })
    }

    /// Buffer the upstream into fixed-size groups in arrival order; the
    /// final group may be short and is still emitted when non-empty. With
    /// no size, the entire (bounded) upstream becomes one group; an empty
    /// upstream yields no groups.
    pub fn batched(&self, size: Option<usize>) -> Stage<Vec<T>> {
        self.chain(None, move |upstream, _own| match size {
            Some(n) => upstream
                .try_chunks(n.max(1))
                .map_err(|e| e.1)
                .boxed(),
            None => stream::once(upstream.try_collect::<Vec<_>>())
                .try_filter(|group| ready(!group.is_empty()))
                .boxed(),
        })
    }

    /// Materialize the chain into a function unit that drains the sequence
    /// and applies `handle` to every element, sequentially. When `depends`
    /// is declared, its resolved client (index 0) goes to the handler and
    /// the rest flow down to `run`.
    pub fn for_each<F, Fut>(
        &self,
        depends: Option<Dependency>,
        props: FunctionProps,
        handle: F,
    ) -> FunctionUnit
    where
        F: Fn(T, Option<Client>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let trigger = self.event_source(&props);
        let deps = match &depends {
            Some(dep) => prepend(&self.deps, dep.clone()),
            None => Arc::clone(&self.deps),
        };
        let has_own = depends.is_some();
        let run_fn = Arc::clone(&self.run_fn);

        let handler: UnitHandler = Arc::new(move |event: Event, mut clients: Vec<Client>| {
            let run_fn = Arc::clone(&run_fn);
            let handle = handle.clone();
            async move {
                let own = if has_own {
                    if clients.is_empty() {
                        return Err(shape_error("handler client at index 0", "empty client list"));
                    }
                    Some(clients.remove(0))
                } else {
                    None
                };
                let mut upstream = (run_fn)(event, clients);
                while let Some(item) = upstream.next().await {
                    handle(item?, own.clone()).await?;
                }
                Ok(())
            }
            .boxed()
        });

        FunctionUnit::new(props, trigger, deps, handler)
    }

    /// `batched(size)` + `for_each`: the handler sees groups instead of
    /// single elements.
    pub fn for_batch<F, Fut>(
        &self,
        size: Option<usize>,
        depends: Option<Dependency>,
        props: FunctionProps,
        handle: F,
    ) -> FunctionUnit
    where
        F: Fn(Vec<T>, Option<Client>) -> Fut + Send + Sync + Clone + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.batched(size).for_each(depends, props, handle)
    }

    /// Terminate the chain into a sink: every drained batch is forwarded
    /// to the sink client's `accept`. The sink becomes an added dependency
    /// of the resulting unit (index 0).
    pub fn to_sink(
        &self,
        sink: Dependency,
        props: FunctionProps,
    ) -> Result<(Dependency, FunctionUnit)>
    where
        T: Serialize,
    {
        if sink.kind() != Capability::Sink {
            return Err(shape_error("sink dependency", &sink.kind().to_string()));
        }
        let unit = self.batched(None).for_each(
            Some(sink.clone()),
            props,
            |batch: Vec<T>, client: Option<Client>| async move {
                let client =
                    client.ok_or_else(|| shape_error("sink client at index 0", "none"))?;
                let sink = client.as_sink()?;
                let values = batch
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                sink.accept(values).await
            },
        );
        Ok((sink, unit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::CollectingSink;

    fn queue_event(values: &[i64]) -> Event {
        Event::Queue {
            messages: values.iter().map(|v| serde_json::json!(v)).collect(),
        }
    }

    async fn drain<T: Send + 'static>(stage: &Stage<T>, event: Event, clients: Vec<Client>) -> Vec<T> {
        stage
            .run(event, clients)
            .try_collect::<Vec<_>>()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_map_fusion_preserves_order() {
        let stage = Stage::<i64>::from_queue("numbers")
            .map(None, |n, _| async move { Ok(n * 2) })
            .map(None, |n, _| async move { Ok(n + 1) });

        let out = drain(&stage, queue_event(&[1, 2, 3]), vec![]).await;
        assert_eq!(out, vec![3, 5, 7]);
    }

    #[tokio::test]
    async fn test_flat_map_fans_out_in_order() {
        let stage = Stage::<i64>::from_queue("numbers")
            .flat_map(None, |n, _| async move { Ok(vec![n, -n]) });

        let out = drain(&stage, queue_event(&[1, 2]), vec![]).await;
        assert_eq!(out, vec![1, -1, 2, -2]);
    }

    #[tokio::test]
    async fn test_batched_groups_in_arrival_order() {
        let stage = Stage::<i64>::from_queue("numbers").batched(Some(3));
        let out = drain(&stage, queue_event(&[1, 2, 3, 4, 5]), vec![]).await;
        assert_eq!(out, vec![vec![1, 2, 3], vec![4, 5]]);
    }

    #[tokio::test]
    async fn test_batched_unsized_collects_everything() {
        let stage = Stage::<i64>::from_queue("numbers").batched(None);
        let out = drain(&stage, queue_event(&[1, 2, 3]), vec![]).await;
        assert_eq!(out, vec![vec![1, 2, 3]]);
    }

    #[tokio::test]
    async fn test_batched_empty_upstream_yields_no_groups() {
        let stage = Stage::<i64>::from_queue("numbers").batched(None);
        let out = drain(&stage, queue_event(&[]), vec![]).await;
        assert!(out.is_empty());

        let stage = Stage::<i64>::from_queue("numbers").batched(Some(3));
        let out = drain(&stage, queue_event(&[]), vec![]).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_dependency_lists_merge_tail_first() {
        let s0 = Stage::<i64>::from_queue("numbers");
        let s1 = s0.map(Some(Dependency::sink("d1")), |n, _| async move { Ok(n) });
        let s2 = s1.map(Some(Dependency::sink("d2")), |n, _| async move { Ok(n) });

        assert_eq!(s0.dependencies().len(), 0);
        assert_eq!(s1.dependencies().len(), 1);
        let deps = s2.dependencies();
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0], Dependency::sink("d2"));
        assert_eq!(deps[1], Dependency::sink("d1"));
    }

    #[tokio::test]
    async fn test_no_dependency_shares_list_identity() {
        let s0 = Stage::<i64>::from_queue("numbers");
        let s1 = s0.map(None, |n, _| async move { Ok(n) });
        assert!(Arc::ptr_eq(&s0.dependencies(), &s1.dependencies()));
    }

    #[tokio::test]
    async fn test_run_slices_clients_in_declaration_order() {
        // s0 (no dep) -> s1 (dep D1) -> s2 (dep D2); run with [c2, c1]
        // must hand c1 to s1 and c2 to s2.
        let c1 = Arc::new(CollectingSink::new());
        let c2 = Arc::new(CollectingSink::new());

        let expect1 = Arc::clone(&c1);
        let expect2 = Arc::clone(&c2);

        // Compare data pointers only; fat-pointer identity would also
        // compare vtable addresses, which are not unique across codegen
        // units.
        fn data_ptr(sink: &Arc<dyn crate::sink::RecordSink>) -> *const () {
            Arc::as_ptr(sink) as *const ()
        }

        let stage = Stage::<i64>::from_queue("numbers")
            .map(Some(Dependency::sink("d1")), move |n, client| {
                let expect1 = Arc::clone(&expect1);
                async move {
                    let got = client.expect("s1 client").as_sink()?;
                    assert_eq!(data_ptr(&got), Arc::as_ptr(&expect1) as *const ());
                    Ok(n)
                }
            })
            .map(Some(Dependency::sink("d2")), move |n, client| {
                let expect2 = Arc::clone(&expect2);
                async move {
                    let got = client.expect("s2 client").as_sink()?;
                    assert_eq!(data_ptr(&got), Arc::as_ptr(&expect2) as *const ());
                    Ok(n)
                }
            });

        let clients = vec![Client::Sink(c2), Client::Sink(c1)];
        let out = drain(&stage, queue_event(&[7]), clients).await;
        assert_eq!(out, vec![7]);
    }

    #[tokio::test]
    async fn test_event_kind_mismatch_surfaces() {
        let stage = Stage::<i64>::from_queue("numbers");
        let mut out = stage.run(
            Event::Schedule { time: Utc::now() },
            vec![],
        );
        let first = out.next().await.unwrap();
        assert!(matches!(first, Err(AlembicError::EventMismatch(_))));
    }

    #[test]
    fn test_event_source_dispatches_by_variant() {
        let props = FunctionProps::named("t").with_batch_size(25);

        let queue = Stage::<i64>::from_queue("jobs").event_source(&props);
        assert_eq!(
            queue,
            TriggerDescriptor::Queue {
                queue: "jobs".into(),
                batch_size: 25
            }
        );

        let sched = Stage::from_schedule(Schedule::rate_seconds(60))
            .unwrap()
            .event_source(&props);
        assert!(matches!(sched, TriggerDescriptor::Schedule { .. }));

        let stream = Stage::<i64>::from_stream("events", StartingPosition::TrimHorizon)
            .event_source(&props);
        assert!(matches!(stream, TriggerDescriptor::Stream { .. }));
    }
}
