//! End-to-end scenarios over an in-memory transport.
//!
//! The test plays the server: it feeds `TransportEvent`s into the channel
//! the controller reads and inspects the `ClientMessage`s the controller
//! sends. `frame_tick` drives everything deterministically on the test
//! thread.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use bytes::Bytes;
use client::{DbConnection, Error, Event, ModuleSchema, Status, TransportEvent};
use futures_channel::mpsc;
use futures_util::task::noop_waker_ref;
use futures_util::Stream;
use replica::{ReducerSchema, TableSchema};
use sats::{
    to_vec, AlgebraicType, AlgebraicValue, BuiltinType, BuiltinValue, ProductElement, ProductType,
    ProductValue,
};
use wire::{
    ClientMessage, ConnectionId, DatabaseUpdate, EnergyQuanta, Identity, ReducerCallInfo,
    RequestId, ServerMessage, TableUpdate, Timestamp, UpdateStatus,
};

const LOCAL: Identity = Identity::new([7; 32]);
const REMOTE: Identity = Identity::new([9; 32]);

fn user_row_type() -> ProductType {
    ProductType::new(vec![
        ProductElement::new("id", AlgebraicType::builtin(BuiltinType::U32)),
        ProductElement::new("name", AlgebraicType::builtin(BuiltinType::String)),
    ])
}

fn message_row_type() -> ProductType {
    ProductType::new(vec![
        ProductElement::new("sender", AlgebraicType::builtin(BuiltinType::U32)),
        ProductElement::new("text", AlgebraicType::builtin(BuiltinType::String)),
    ])
}

fn schema() -> ModuleSchema {
    ModuleSchema::builder()
        .table(TableSchema::new("user", user_row_type()).with_primary_key(0))
        .table(TableSchema::new("message", message_row_type()))
        .reducer(ReducerSchema::new("send_message", message_row_type()))
        .build()
        .unwrap()
}

fn user(id: u32, name: &str) -> ProductValue {
    ProductValue::new(vec![
        AlgebraicValue::Builtin(BuiltinValue::U32(id)),
        AlgebraicValue::string(name),
    ])
}

fn message(sender: u32, text: &str) -> ProductValue {
    ProductValue::new(vec![
        AlgebraicValue::Builtin(BuiltinValue::U32(sender)),
        AlgebraicValue::string(text),
    ])
}

fn encode(row: &ProductValue, ty: &ProductType) -> Bytes {
    let ty = AlgebraicType::Product(ty.clone());
    Bytes::from(to_vec(&AlgebraicValue::Product(row.clone()), &ty).unwrap())
}

fn table_update(name: &str, ty: &ProductType, deletes: &[ProductValue], inserts: &[ProductValue]) -> TableUpdate {
    TableUpdate {
        table_name: name.into(),
        deletes: deletes.iter().map(|r| encode(r, ty)).collect(),
        inserts: inserts.iter().map(|r| encode(r, ty)).collect(),
    }
}

fn committed(tables: Vec<TableUpdate>, caller: Identity, reducer: &str) -> ServerMessage {
    ServerMessage::TransactionUpdate {
        status: UpdateStatus::Committed(DatabaseUpdate { tables }),
        timestamp: Timestamp::from_micros(1000),
        caller_identity: caller,
        caller_connection_id: None,
        reducer: ReducerCallInfo {
            reducer: reducer.into(),
            args: Bytes::new(),
            request_id: RequestId::new(0),
        },
        energy: EnergyQuanta::new(10),
    }
}

/// The server half of the mock transport.
struct Server {
    events: mpsc::UnboundedSender<TransportEvent>,
    sent: mpsc::UnboundedReceiver<ClientMessage>,
}

impl Server {
    fn send(&self, msg: ServerMessage) {
        self.events.unbounded_send(TransportEvent::Message(msg)).unwrap();
    }

    fn next_sent(&mut self) -> Option<ClientMessage> {
        let mut cx = Context::from_waker(noop_waker_ref());
        match Pin::new(&mut self.sent).poll_next(&mut cx) {
            Poll::Ready(msg) => msg,
            Poll::Pending => None,
        }
    }
}

fn connect(schema: ModuleSchema) -> (DbConnection, Server) {
    let (event_tx, event_rx) = mpsc::unbounded();
    let (msg_tx, msg_rx) = mpsc::unbounded();
    let conn = DbConnection::builder(schema).build_with_transport(event_rx, msg_tx);
    (
        conn,
        Server {
            events: event_tx,
            sent: msg_rx,
        },
    )
}

fn identity_token(identity: Identity) -> ServerMessage {
    ServerMessage::IdentityToken {
        identity,
        token: "minted-token".into(),
        connection_id: ConnectionId::new([3; 16]),
    }
}

#[test]
fn chat_round_trip() {
    let (mut conn, mut server) = connect(schema());

    server.send(identity_token(LOCAL));
    assert!(conn.frame_tick());
    assert_eq!(conn.identity(), Some(LOCAL));
    assert!(conn.connection_id().is_some());

    // Subscribe to both tables and let the server apply it with seed rows.
    let inserts = Arc::new(Mutex::new(Vec::new()));
    let messages = conn.table("message").unwrap();
    {
        let inserts = Arc::clone(&inserts);
        messages.on_insert(move |ctx, row| {
            assert!(matches!(
                ctx.event,
                Event::SubscribeApplied | Event::Reducer(_)
            ));
            inserts.lock().unwrap().push(row.clone());
        });
    }
    let applied = Arc::new(Mutex::new(false));
    let handle = {
        let applied = Arc::clone(&applied);
        conn.subscription_builder()
            .on_applied(move |_ctx| *applied.lock().unwrap() = true)
            .subscribe(["SELECT * FROM user", "SELECT * FROM message"])
    };
    assert!(conn.frame_tick());
    let sent = server.next_sent().unwrap();
    let ClientMessage::Subscribe { query_id, queries } = sent else {
        panic!("expected a subscribe, got {sent:?}");
    };
    assert_eq!(query_id, handle.query_id());
    assert_eq!(queries.len(), 2);
    assert!(!handle.is_active());

    server.send(ServerMessage::SubscribeApplied {
        query_id,
        update: DatabaseUpdate {
            tables: vec![
                table_update("user", &user_row_type(), &[], &[user(1, "ada")]),
                table_update("message", &message_row_type(), &[], &[message(1, "hello")]),
            ],
        },
    });
    assert!(conn.frame_tick());
    assert!(*applied.lock().unwrap());
    assert!(handle.is_active());
    assert_eq!(conn.table("user").unwrap().count(), 1);
    assert_eq!(conn.table("message").unwrap().count(), 1);
    assert_eq!(inserts.lock().unwrap().as_slice(), &[message(1, "hello")]);

    // Send a message through the reducer and watch the committed echo.
    conn.call_reducer("send_message", message(1, "hi all")).unwrap();
    assert!(conn.frame_tick());
    let sent = server.next_sent().unwrap();
    let ClientMessage::CallReducer { request_id, reducer, args } = sent else {
        panic!("expected a reducer call, got {sent:?}");
    };
    assert_eq!(request_id, RequestId::new(1), "request ids start at 1");
    assert_eq!(&*reducer, "send_message");
    assert_eq!(args, encode(&message(1, "hi all"), &message_row_type()));

    let outcomes = Arc::new(Mutex::new(Vec::new()));
    {
        let outcomes = Arc::clone(&outcomes);
        conn.on_reducer("send_message", move |_ctx, event| {
            outcomes.lock().unwrap().push(event.status.clone());
        })
        .unwrap();
    }
    server.send(committed(
        vec![table_update("message", &message_row_type(), &[], &[message(1, "hi all")])],
        LOCAL,
        "send_message",
    ));
    assert!(conn.frame_tick());
    assert_eq!(conn.table("message").unwrap().count(), 2);
    assert_eq!(inserts.lock().unwrap().len(), 2);
    assert_eq!(outcomes.lock().unwrap().as_slice(), &[Status::Committed]);
}

#[test]
fn on_connect_receives_identity_and_minted_token() {
    let (event_tx, event_rx) = mpsc::unbounded();
    let (msg_tx, _keep) = mpsc::unbounded();
    let seen = Arc::new(Mutex::new(None));
    let mut conn = {
        let seen = Arc::clone(&seen);
        DbConnection::builder(schema())
            .on_connect(move |db, identity, token| {
                *seen.lock().unwrap() = Some((identity, token.to_owned(), db.is_connected()));
            })
            .build_with_transport(event_rx, msg_tx)
    };

    event_tx
        .unbounded_send(TransportEvent::Message(identity_token(LOCAL)))
        .unwrap();
    assert!(conn.frame_tick());
    assert_eq!(
        seen.lock().unwrap().take(),
        Some((LOCAL, "minted-token".to_owned(), true))
    );
}

#[test]
fn pk_change_fires_update_not_insert_and_delete() {
    let (mut conn, mut server) = connect(schema());
    server.send(identity_token(LOCAL));

    let users = conn.table("user").unwrap();
    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    {
        let log = Arc::clone(&log);
        users.on_insert(move |_ctx, row| log.lock().unwrap().push(format!("insert {row:?}")));
    }
    {
        let log = Arc::clone(&log);
        users.on_delete(move |_ctx, row| log.lock().unwrap().push(format!("delete {row:?}")));
    }
    let updates = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = Arc::clone(&updates);
        users.on_update(move |_ctx, old, new| {
            updates.lock().unwrap().push((old.clone(), new.clone()));
        });
    }
    let _sub = conn.subscription_builder().subscribe(["SELECT * FROM user"]);
    assert!(conn.frame_tick());
    let query_id = match server.next_sent().unwrap() {
        ClientMessage::Subscribe { query_id, .. } => query_id,
        other => panic!("expected a subscribe, got {other:?}"),
    };

    server.send(ServerMessage::SubscribeApplied {
        query_id,
        update: DatabaseUpdate {
            tables: vec![table_update("user", &user_row_type(), &[], &[user(1, "ada")])],
        },
    });
    assert!(conn.frame_tick());
    log.lock().unwrap().clear();

    // One transaction renames the user: delete + insert under pk 1.
    server.send(committed(
        vec![table_update(
            "user",
            &user_row_type(),
            &[user(1, "ada")],
            &[user(1, "lovelace")],
        )],
        LOCAL,
        "send_message",
    ));
    assert!(conn.frame_tick());

    assert!(log.lock().unwrap().is_empty(), "no insert or delete callbacks");
    assert_eq!(
        updates.lock().unwrap().as_slice(),
        &[(user(1, "ada"), user(1, "lovelace"))]
    );
    assert_eq!(conn.table("user").unwrap().count(), 1);
    let key = AlgebraicValue::Builtin(BuiltinValue::U32(1));
    assert_eq!(
        conn.table("user").unwrap().find_by_pk(&key),
        Some(user(1, "lovelace"))
    );
}

#[test]
fn failed_call_reaches_only_the_caller_and_moves_no_rows() {
    let (mut conn, mut server) = connect(schema());
    server.send(identity_token(LOCAL));
    assert!(conn.frame_tick());

    let rows = Arc::new(Mutex::new(0u32));
    {
        let rows = Arc::clone(&rows);
        conn.table("message")
            .unwrap()
            .on_insert(move |_ctx, _row| *rows.lock().unwrap() += 1);
    }
    let outcomes = Arc::new(Mutex::new(Vec::new()));
    {
        let outcomes = Arc::clone(&outcomes);
        conn.on_reducer("send_message", move |_ctx, event| {
            outcomes.lock().unwrap().push(event.status.clone());
        })
        .unwrap();
    }
    assert!(conn.frame_tick());

    let failed = |caller| ServerMessage::TransactionUpdate {
        status: UpdateStatus::Failed("permission denied".into()),
        timestamp: Timestamp::from_micros(5),
        caller_identity: caller,
        caller_connection_id: None,
        reducer: ReducerCallInfo {
            reducer: "send_message".into(),
            args: Bytes::new(),
            request_id: RequestId::new(0),
        },
        energy: EnergyQuanta::new(1),
    };

    // Someone else's failure is not our business.
    server.send(failed(REMOTE));
    assert!(conn.frame_tick());
    assert!(outcomes.lock().unwrap().is_empty());

    // Our own failure arrives as a status callback and nothing else.
    server.send(failed(LOCAL));
    assert!(conn.frame_tick());
    let seen = outcomes.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].reducer_error(), Some("permission denied"));
    assert_eq!(*rows.lock().unwrap(), 0, "failed calls move no rows");
    assert_eq!(conn.table("message").unwrap().count(), 0);
}

#[test]
fn callback_registered_during_dispatch_first_fires_next_diff() {
    let (mut conn, mut server) = connect(schema());
    server.send(identity_token(LOCAL));

    let late_hits = Arc::new(Mutex::new(0u32));
    let registered = Arc::new(Mutex::new(false));
    {
        let late_hits = Arc::clone(&late_hits);
        let registered = Arc::clone(&registered);
        conn.table("message")
            .unwrap()
            .on_insert(move |ctx, _row| {
                let mut registered = registered.lock().unwrap();
                if !*registered {
                    *registered = true;
                    let late_hits = Arc::clone(&late_hits);
                    ctx.db
                        .table("message")
                        .unwrap()
                        .on_insert(move |_ctx, _row| *late_hits.lock().unwrap() += 1);
                }
            });
    }
    assert!(conn.frame_tick());

    let insert = |text: &str| {
        committed(
            vec![table_update("message", &message_row_type(), &[], &[message(1, text)])],
            LOCAL,
            "send_message",
        )
    };

    // Diff N: the outer callback registers the inner one mid-dispatch; the
    // inner one must not see diff N's rows.
    server.send(insert("first"));
    assert!(conn.frame_tick());
    assert_eq!(*late_hits.lock().unwrap(), 0);

    // Diff N+1 reaches it.
    server.send(insert("second"));
    assert!(conn.frame_tick());
    assert_eq!(*late_hits.lock().unwrap(), 1);
}

#[test]
fn unsubscribe_then_runs_after_rows_are_removed() {
    let (mut conn, mut server) = connect(schema());
    server.send(identity_token(LOCAL));

    let sub = conn.subscription_builder().subscribe(["SELECT * FROM message"]);
    assert!(conn.frame_tick());
    let query_id = match server.next_sent().unwrap() {
        ClientMessage::Subscribe { query_id, .. } => query_id,
        other => panic!("expected a subscribe, got {other:?}"),
    };
    server.send(ServerMessage::SubscribeApplied {
        query_id,
        update: DatabaseUpdate {
            tables: vec![table_update("message", &message_row_type(), &[], &[message(1, "hi")])],
        },
    });
    assert!(conn.frame_tick());
    assert!(sub.is_active());

    let count_at_end = Arc::new(Mutex::new(None));
    {
        let count_at_end = Arc::clone(&count_at_end);
        sub.clone()
            .unsubscribe_then(move |ctx| {
                let count = ctx.db.table("message").unwrap().count();
                *count_at_end.lock().unwrap() = Some(count);
            })
            .unwrap();
    }
    assert!(conn.frame_tick());
    assert!(matches!(
        server.next_sent(),
        Some(ClientMessage::Unsubscribe { .. })
    ));

    server.send(ServerMessage::UnsubscribeApplied {
        query_id,
        update: DatabaseUpdate {
            tables: vec![table_update("message", &message_row_type(), &[message(1, "hi")], &[])],
        },
    });
    assert!(conn.frame_tick());
    assert_eq!(*count_at_end.lock().unwrap(), Some(0), "rows gone before on_end");
    assert!(sub.is_ended());

    // A second unsubscribe attempt is rejected.
    assert!(matches!(
        sub.unsubscribe(),
        Err(Error::Subscription(replica::SubscriptionError::NotActive { .. }))
    ));
}

#[test]
fn all_tables_subscription_refuses_to_unsubscribe() {
    let (mut conn, mut server) = connect(schema());
    let sub = conn.subscription_builder().subscribe_to_all_tables();
    assert!(conn.frame_tick());
    let query_id = match server.next_sent().unwrap() {
        ClientMessage::Subscribe { query_id, .. } => query_id,
        other => panic!("expected a subscribe, got {other:?}"),
    };
    server.send(ServerMessage::SubscribeApplied {
        query_id,
        update: DatabaseUpdate { tables: vec![] },
    });
    assert!(conn.frame_tick());
    assert!(sub.is_active());
    assert!(matches!(
        sub.unsubscribe(),
        Err(Error::Subscription(
            replica::SubscriptionError::CannotUnsubscribeFromAll { .. }
        ))
    ));
}

#[test]
fn cooperative_disconnect_tears_down_cleanly() {
    let (mut conn, mut server) = connect(schema());
    server.send(identity_token(LOCAL));
    let sub = conn.subscription_builder().subscribe(["SELECT * FROM user"]);
    assert!(conn.frame_tick());
    let _ = server.next_sent();

    let handle = conn.handle();
    handle.disconnect().unwrap();
    assert!(!conn.frame_tick(), "disconnect ends the loop");

    assert!(!handle.is_connected());
    assert!(sub.is_ended());
    assert!(matches!(handle.disconnect(), Err(Error::Disconnected)));
    assert!(matches!(
        handle.call_reducer("send_message", message(1, "x")),
        Err(Error::Disconnected)
    ));
    // The outgoing channel is closed, which is what closes the socket.
    assert_eq!(server.next_sent(), None);
}

#[test]
fn transport_failure_surfaces_through_on_disconnect() {
    let (event_tx, event_rx) = mpsc::unbounded();
    let (msg_tx, _msg_rx) = mpsc::unbounded();
    let terminal = Arc::new(Mutex::new(None));
    let mut conn = {
        let terminal = Arc::clone(&terminal);
        DbConnection::builder(schema())
            .on_disconnect(move |_db, err| *terminal.lock().unwrap() = Some(err))
            .build_with_transport(event_rx, msg_tx)
    };

    event_tx
        .unbounded_send(TransportEvent::Failed(Error::Decode(
            wire::DecodeError::UnknownMessageTag { tag: 200 },
        )))
        .unwrap();
    assert!(!conn.frame_tick());

    let seen = terminal.lock().unwrap().take();
    assert!(matches!(seen, Some(Some(Error::Decode(_)))));
}

#[tokio::test]
async fn run_async_and_frame_tick_agree() {
    // The same message stream produces the same callback sequence whichever
    // discipline drives the loop.
    let stream = |server: &Server| {
        server.send(identity_token(LOCAL));
        server.send(committed(
            vec![table_update("message", &message_row_type(), &[], &[message(1, "a")])],
            LOCAL,
            "send_message",
        ));
        server.send(committed(
            vec![table_update(
                "message",
                &message_row_type(),
                &[message(1, "a")],
                &[message(2, "b")],
            )],
            LOCAL,
            "send_message",
        ));
    };

    let observe = |conn: &DbConnection| {
        let log = Arc::new(Mutex::new(Vec::<String>::new()));
        let table = conn.table("message").unwrap();
        {
            let log = Arc::clone(&log);
            table.on_insert(move |_ctx, row| log.lock().unwrap().push(format!("+{row:?}")));
        }
        {
            let log = Arc::clone(&log);
            table.on_delete(move |_ctx, row| log.lock().unwrap().push(format!("-{row:?}")));
        }
        log
    };

    let (mut ticked, server) = connect(schema());
    let ticked_log = observe(&ticked);
    stream(&server);
    drop(server);
    while ticked.frame_tick() {}

    let (mut driven, server) = connect(schema());
    let driven_log = observe(&driven);
    stream(&server);
    drop(server);
    driven.run_async().await;

    assert_eq!(*ticked_log.lock().unwrap(), *driven_log.lock().unwrap());
    assert_eq!(ticked_log.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn connect_failure_fires_on_connect_error_only() {
    let connect_errors = Arc::new(Mutex::new(0u32));
    let disconnects = Arc::new(Mutex::new(0u32));
    let result = {
        let connect_errors = Arc::clone(&connect_errors);
        let disconnects = Arc::clone(&disconnects);
        DbConnection::builder(schema())
            .with_uri("ftp://nowhere.invalid")
            .with_module_name("chat")
            .on_connect_error(move |_err| *connect_errors.lock().unwrap() += 1)
            .on_disconnect(move |_db, _err| *disconnects.lock().unwrap() += 1)
            .build()
            .await
    };
    assert!(matches!(result, Err(Error::UnsupportedScheme { .. })));
    assert_eq!(*connect_errors.lock().unwrap(), 1);
    assert_eq!(*disconnects.lock().unwrap(), 0, "a failed connect never disconnects");
}
