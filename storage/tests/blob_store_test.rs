use netpath_core::model::{Network, NetworkEdge, NetworkId, NetworkNode};
use storage::{BlobError, BlobStore};
use tempfile::tempdir;

fn egfr_network() -> Network {
    let mut network = Network::new(Some("EGFR signaling".to_string()));
    let mut egfr = NetworkNode::new(0, "EGFR");
    egfr.represents = Some("uniprot:P00533".to_string());
    egfr.attributes.insert("type".to_string(), "protein".to_string());
    network.nodes.push(egfr);
    network.nodes.push(NetworkNode::new(1, "GRB2"));
    network.nodes.push(NetworkNode::new(2, "MAP2K1"));
    network
        .edges
        .push(NetworkEdge::new(10, 0, 1, "controls-state-change-of"));
    network
        .edges
        .push(NetworkEdge::new(11, 1, 2, "in-complex-with").undirected());
    network
}

#[tokio::test]
async fn saved_blob_loads_identical_network() {
    let dir = tempdir().unwrap();
    let store = BlobStore::new(dir.path());
    let id = NetworkId::new("ABC123");
    let network = egfr_network();

    assert!(!store.exists(&id).await);
    store.save(&id, &network).await.expect("save");
    assert!(store.exists(&id).await);
    assert_eq!(store.path_for(&id), dir.path().join("ABC123.rkyv"));

    let loaded = store.load(&id).await.expect("load");
    assert_eq!(loaded, network);
    assert_eq!(loaded.edge_map(), network.edge_map());
}

#[tokio::test]
async fn save_overwrites_previous_blob() {
    let dir = tempdir().unwrap();
    let store = BlobStore::new(dir.path());
    let id = NetworkId::new("ABC123");

    store.save(&id, &Network::new(None)).await.expect("first save");
    store.save(&id, &egfr_network()).await.expect("second save");

    let loaded = store.load(&id).await.expect("load");
    assert_eq!(loaded.edge_count(), 2);

    let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(files.len(), 1, "temp files must not be left behind");
}

#[tokio::test]
async fn damaged_blob_is_reported_as_corrupt() {
    let dir = tempdir().unwrap();
    let store = BlobStore::new(dir.path());
    let id = NetworkId::new("ABC123");

    tokio::fs::write(store.path_for(&id), b"not an archived network")
        .await
        .unwrap();

    match store.load(&id).await {
        Err(BlobError::CorruptBlob { id: reported }) => assert_eq!(reported, id),
        other => panic!("expected CorruptBlob, got {:?}", other.map(|n| n.node_count())),
    }
}

#[tokio::test]
async fn write_failure_is_storage_write_error_without_path() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"occupied").unwrap();
    let store = BlobStore::new(&blocker);
    let id = NetworkId::new("ABC123");

    let err = store.save(&id, &egfr_network()).await.unwrap_err();
    assert!(matches!(err, BlobError::StorageWrite { .. }));
    let message = err.to_string();
    assert!(message.contains("ABC123"));
    assert!(!message.contains("not-a-dir"));
}

#[tokio::test]
async fn missing_blob_is_read_error() {
    let dir = tempdir().unwrap();
    let store = BlobStore::new(dir.path());
    let err = store.load(&NetworkId::new("absent")).await.unwrap_err();
    assert!(matches!(err, BlobError::StorageRead { .. }));
}
