use std::sync::Arc;

use quiver_distributed::messages::{RpcRequest, RpcResponse};
use quiver_distributed::{Client, Worker};
use quiver_storage::wal::{read_wal_file, CURRENT_WAL_NAME};
use quiver_storage::{DatabaseConfig, GraphStore, StateDelta};
use tempfile::TempDir;

fn worker(worker_id: i32, dir: &TempDir) -> Worker {
    let store = GraphStore::fresh(
        worker_id,
        DatabaseConfig {
            durability_directory: dir.path().to_path_buf(),
            lock_timeout_ms: 200,
            ..Default::default()
        },
    )
    .unwrap();
    Worker::spawn(store, "127.0.0.1:0").unwrap()
}

fn cluster() -> (Worker, Worker, TempDir, TempDir) {
    let master_dir = TempDir::new().unwrap();
    let worker_dir = TempDir::new().unwrap();
    let master = worker(0, &master_dir);
    let member = worker(1, &worker_dir);
    member.register_with(&master.endpoint()).unwrap();
    // The master learned about the member through registration fan-in.
    master
        .coordination()
        .endpoint_of(1)
        .expect("member registered on master");
    (master, member, master_dir, worker_dir)
}

#[test]
fn registration_exchanges_the_worker_registry() {
    let (master, member, _mdir, _wdir) = cluster();
    assert_eq!(master.coordination().workers().len(), 2);
    assert_eq!(member.coordination().workers().len(), 2);
    assert_eq!(
        member.coordination().endpoint_of(0).unwrap(),
        master.endpoint()
    );
}

#[test]
fn distributed_edge_creation_buffers_and_applies() {
    let (master, member, master_dir, worker_dir) = cluster();

    // A vertex on each worker, committed up front.
    let setup_master = master.store().begin().unwrap();
    let from = master
        .store()
        .access(Arc::clone(&setup_master))
        .insert_vertex()
        .unwrap();
    master.store().commit(&setup_master).unwrap();

    let setup_member = member.store().begin().unwrap();
    let to = member
        .store()
        .access(Arc::clone(&setup_member))
        .insert_vertex()
        .unwrap();
    member.store().commit(&setup_member).unwrap();

    // The owning transaction runs on the master, which also owns `from`:
    // the edge and the out-edge land locally, the in-edge delta is buffered
    // on the member until apply.
    let transaction = master.store().begin().unwrap();
    let accessor = master.store().access(Arc::clone(&transaction));
    let knows = accessor.edge_type_id("KNOWS");
    let edge = accessor
        .insert_edge(from.address(), to.address(), knows)
        .unwrap();

    // Not applied yet: the member's vertex shows no in-edge.
    let peek = member.store().begin().unwrap();
    let member_vertex = member
        .store()
        .access(Arc::clone(&peek))
        .find_vertex(to.gid())
        .unwrap();
    assert!(member_vertex.current().unwrap().in_edges.is_empty());
    member.store().abort(&peek).unwrap();

    // Commit: apply everywhere, commit locally, then settle remotely.
    master.clients().apply_all(transaction.id()).unwrap();
    master.store().commit(&transaction).unwrap();
    master.clients().end_all(transaction.id(), true).unwrap();

    let check = member.store().begin().unwrap();
    let member_vertex = member
        .store()
        .access(Arc::clone(&check))
        .find_vertex(to.gid())
        .unwrap();
    let in_edges = member_vertex.current().unwrap().in_edges;
    assert_eq!(in_edges.len(), 1);
    assert_eq!(in_edges[0].edge.gid, edge.gid());
    assert_eq!(in_edges[0].vertex.gid, from.gid());
    member.store().abort(&check).unwrap();

    // Both WALs carry their structural delta.
    master.store().wal().flush().unwrap();
    member.store().wal().flush().unwrap();
    let master_deltas = read_wal_file(&master_dir.path().join(CURRENT_WAL_NAME)).unwrap();
    assert!(master_deltas
        .iter()
        .any(|delta| matches!(delta, StateDelta::AddOutEdge { gid, .. } if *gid == from.gid())));
    let member_deltas = read_wal_file(&worker_dir.path().join(CURRENT_WAL_NAME)).unwrap();
    assert!(member_deltas
        .iter()
        .any(|delta| matches!(delta, StateDelta::AddInEdge { gid, .. } if *gid == to.gid())));
}

#[test]
fn remote_create_vertex_returns_a_remote_gid() {
    let (master, member, _mdir, _wdir) = cluster();

    let transaction = master.store().begin().unwrap();
    let accessor = master.store().access(Arc::clone(&transaction));
    let person = accessor.label_id("Person");
    let name = accessor.property_id("name");
    let gid = master
        .clients()
        .create_vertex(
            1,
            transaction.id(),
            vec![person],
            vec![(name, "remote".into())],
        )
        .unwrap();
    assert_eq!(gid.worker_id(), 1);

    master.clients().apply_all(transaction.id()).unwrap();
    master.store().commit(&transaction).unwrap();
    master.clients().end_all(transaction.id(), true).unwrap();

    let check = member.store().begin().unwrap();
    let vertex = member
        .store()
        .access(Arc::clone(&check))
        .find_vertex(gid)
        .unwrap();
    assert!(vertex.has_label(person).unwrap());
    member.store().abort(&check).unwrap();
}

#[test]
fn remove_vertex_respects_check_empty_across_workers() {
    let (master, member, _mdir, _wdir) = cluster();

    // An edge into the member's vertex, fully committed.
    let setup_master = master.store().begin().unwrap();
    let from = master
        .store()
        .access(Arc::clone(&setup_master))
        .insert_vertex()
        .unwrap();
    master.store().commit(&setup_master).unwrap();
    let setup_member = member.store().begin().unwrap();
    let to = member
        .store()
        .access(Arc::clone(&setup_member))
        .insert_vertex()
        .unwrap();
    member.store().commit(&setup_member).unwrap();

    let edge_tx = master.store().begin().unwrap();
    let accessor = master.store().access(Arc::clone(&edge_tx));
    let knows = accessor.edge_type_id("KNOWS");
    accessor
        .insert_edge(from.address(), to.address(), knows)
        .unwrap();
    master.clients().apply_all(edge_tx.id()).unwrap();
    master.store().commit(&edge_tx).unwrap();
    master.clients().end_all(edge_tx.id(), true).unwrap();

    // A checked removal of the member's vertex must fail at apply time.
    let remove_tx = master.store().begin().unwrap();
    master
        .clients()
        .remove_vertex(remove_tx.id(), to.address(), true)
        .unwrap();
    let apply = master.clients().apply_all(remove_tx.id());
    assert!(apply.is_err());
    master.store().abort(&remove_tx).unwrap();
    master.clients().end_all(remove_tx.id(), false).unwrap();

    // The vertex survives.
    let check = member.store().begin().unwrap();
    assert!(member
        .store()
        .access(Arc::clone(&check))
        .find_vertex(to.gid())
        .is_ok());
    member.store().abort(&check).unwrap();
}

#[test]
fn stop_worker_shuts_the_server_down() {
    let dir = TempDir::new().unwrap();
    let target = worker(3, &dir);
    let client = Client::new(target.endpoint());
    let response = client.call(&RpcRequest::StopWorker).unwrap();
    assert!(matches!(response, RpcResponse::StopWorker));
    // The server drains its threads; a fresh call eventually fails.
    std::thread::sleep(std::time::Duration::from_millis(200));
    let late = Client::new(target.endpoint());
    assert!(late.call(&RpcRequest::StopWorker).is_err());
}
