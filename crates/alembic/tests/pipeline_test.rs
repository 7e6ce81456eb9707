//! End-to-end tests for pipeline composition and function units

use alembic::prelude::*;
use alembic::CollectingSink;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Signup {
    email: String,
}

fn signup_event(emails: &[&str]) -> Event {
    Event::Queue {
        messages: emails
            .iter()
            .map(|e| serde_json::json!({ "email": e }))
            .collect(),
    }
}

#[tokio::test]
async fn test_queue_to_sink_forwards_one_batch() {
    let stage = Stage::<Signup>::from_queue("signups")
        .map(None, |signup: Signup, _| async move {
            Ok(signup.email.to_uppercase())
        });

    let (sink_dep, unit) = stage
        .to_sink(Dependency::sink("out"), FunctionProps::named("forward"))
        .unwrap();

    let sink = Arc::new(CollectingSink::new());
    let resolver = StaticResolver::new().with(sink_dep, Client::Sink(sink.clone()));
    let bound = unit.bind(&resolver).unwrap();

    bound
        .invoke(signup_event(&["a@x.io", "b@x.io", "c@x.io"]))
        .await
        .unwrap();

    // The whole event drains into a single batch, in arrival order.
    assert_eq!(sink.batches().len(), 1);
    assert_eq!(
        sink.values(),
        vec![
            serde_json::json!("A@X.IO"),
            serde_json::json!("B@X.IO"),
            serde_json::json!("C@X.IO"),
        ]
    );
}

#[tokio::test]
async fn test_empty_event_reaches_sink_as_nothing() {
    let (sink_dep, unit) = Stage::<Signup>::from_queue("signups")
        .to_sink(Dependency::sink("out"), FunctionProps::named("forward"))
        .unwrap();

    let sink = Arc::new(CollectingSink::new());
    let resolver = StaticResolver::new().with(sink_dep, Client::Sink(sink.clone()));
    let bound = unit.bind(&resolver).unwrap();

    bound.invoke(signup_event(&[])).await.unwrap();
    assert!(sink.batches().is_empty());
}

#[tokio::test]
async fn test_to_sink_rejects_non_sink_dependency() {
    let stage = Stage::<Signup>::from_queue("signups");
    let err = stage
        .to_sink(Dependency::queue("not-a-sink"), FunctionProps::default())
        .unwrap_err();
    assert!(matches!(err, AlembicError::DependencyShape { .. }));
}

#[tokio::test]
async fn test_store_writing_pipeline() {
    let store = Arc::new(MemoryStore::new());
    store.create_table("signups", KeyDef::hash("email"));

    let stage = Stage::<Signup>::from_queue("signups").map(
        Some(Dependency::store("signups")),
        |signup: Signup, client| async move {
            let backend = client
                .ok_or_else(|| anyhow::anyhow!("missing store client"))?
                .as_store()?;
            let table = KeyValueClient::json(backend, "signups", KeyDef::hash("email"));
            table.put(&signup).await?;
            Ok(signup.email)
        },
    );

    let (sink_dep, unit) = stage
        .to_sink(Dependency::sink("out"), FunctionProps::named("register"))
        .unwrap();

    // Sink was added last, so it sits at index 0 of the unit's list.
    let deps = unit.dependencies();
    assert_eq!(deps[0], Dependency::sink("out"));
    assert_eq!(deps[1], Dependency::store("signups"));

    let sink = Arc::new(CollectingSink::new());
    let resolver = StaticResolver::new()
        .with(sink_dep, Client::Sink(sink.clone()))
        .with(Dependency::store("signups"), Client::Store(store.clone()));
    let bound = unit.bind(&resolver).unwrap();

    bound
        .invoke(signup_event(&["a@x.io", "b@x.io"]))
        .await
        .unwrap();

    assert_eq!(store.scan("signups").await.unwrap().len(), 2);
    assert_eq!(
        sink.values(),
        vec![serde_json::json!("a@x.io"), serde_json::json!("b@x.io")]
    );
}

#[tokio::test]
async fn test_schedule_rooted_pipeline() {
    let stage = Stage::from_schedule(Schedule::rate_seconds(60))
        .unwrap()
        .map(None, |tick: chrono::DateTime<chrono::Utc>, _| async move {
            Ok(tick.timestamp())
        });

    let unit = stage.for_each(
        Some(Dependency::sink("ticks")),
        FunctionProps::named("heartbeat"),
        |ts: i64, client| async move {
            let sink = client
                .ok_or_else(|| anyhow::anyhow!("missing sink client"))?
                .as_sink()?;
            sink.accept(vec![serde_json::json!(ts)]).await
        },
    );

    assert!(matches!(
        unit.trigger(),
        alembic::TriggerDescriptor::Schedule { .. }
    ));

    let sink = Arc::new(CollectingSink::new());
    let resolver =
        StaticResolver::new().with(Dependency::sink("ticks"), Client::Sink(sink.clone()));
    let bound = unit.bind(&resolver).unwrap();

    let time = chrono::Utc::now();
    bound.invoke(Event::Schedule { time }).await.unwrap();

    assert_eq!(sink.values(), vec![serde_json::json!(time.timestamp())]);
}

#[tokio::test]
async fn test_for_batch_groups_elements() {
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);

    let unit = Stage::<i64>::from_queue("numbers").for_batch(
        Some(2),
        None,
        FunctionProps::named("grouper"),
        move |batch: Vec<i64>, _| {
            let record = Arc::clone(&record);
            async move {
                record.lock().push(batch);
                Ok(())
            }
        },
    );

    unit.invoke_with(
        Event::Queue {
            messages: (1..=5).map(|n| serde_json::json!(n)).collect(),
        },
        vec![],
    )
    .await
    .unwrap();

    assert_eq!(*seen.lock(), vec![vec![1, 2], vec![3, 4], vec![5]]);
}

#[tokio::test]
async fn test_trigger_carries_batch_size() {
    let (_, unit) = Stage::<Signup>::from_queue("signups")
        .to_sink(
            Dependency::sink("out"),
            FunctionProps::named("forward").with_batch_size(100),
        )
        .unwrap();

    assert_eq!(
        unit.trigger(),
        &alembic::TriggerDescriptor::Queue {
            queue: "signups".into(),
            batch_size: 100,
        }
    );
}

#[tokio::test]
async fn test_handler_failure_surfaces_from_invoke() {
    let unit = Stage::<i64>::from_queue("numbers").for_each(
        None,
        FunctionProps::named("faulty"),
        |n: i64, _| async move {
            if n == 2 {
                Err(AlembicError::InvalidState("boom".into()))
            } else {
                Ok(())
            }
        },
    );

    let err = unit
        .invoke_with(
            Event::Queue {
                messages: vec![
                    serde_json::json!(1),
                    serde_json::json!(2),
                    serde_json::json!(3),
                ],
            },
            vec![],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AlembicError::InvalidState(_)));
}
