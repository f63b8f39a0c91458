//! Control plane served over real sockets.

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use magcard_control::{ControlClient, ControlError, ControlServer, ControlServerConfig};
use magcard_core::CardPosition;
use magcard_core::constants::CONTROL_FAILURE;
use magcard_reader::{CardReader, ReaderOptions, SharedReader, shared};
use magcard_storage::mock::MemoryTrackStore;

async fn start_server() -> (SocketAddr, SharedReader, MemoryTrackStore) {
    let store = MemoryTrackStore::new();
    let reader = shared(CardReader::new(
        Box::new(store.clone()),
        PathBuf::from("default.bin"),
        ReaderOptions::default(),
    ));

    let config = ControlServerConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
    };
    let server = ControlServer::bind(config, reader.clone()).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());

    (addr, reader, store)
}

#[tokio::test]
async fn insert_status_eject_cycle() {
    let (addr, reader, _store) = start_server().await;
    let client = ControlClient::new(addr);

    assert!(!client.status().await.unwrap());

    client.insert("player.bin").await.unwrap();
    assert!(client.status().await.unwrap());
    {
        let reader = reader.lock().unwrap();
        assert_eq!(reader.position(), CardPosition::InsertedInFront);
        assert_eq!(reader.card_path(), std::path::Path::new("player.bin"));
    }

    client.eject().await.unwrap();
    assert!(!client.status().await.unwrap());
    assert_eq!(
        reader.lock().unwrap().position(),
        CardPosition::NotInserted
    );
}

#[tokio::test]
async fn unknown_opcode_gets_failure_and_server_survives() {
    let (addr, _reader, _store) = start_server().await;

    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&[0x63]).await.unwrap();
    let mut result = [0u8; 1];
    raw.read_exact(&mut result).await.unwrap();
    assert_eq!(result[0], CONTROL_FAILURE);
    drop(raw);

    // The listener keeps serving.
    let client = ControlClient::new(addr);
    assert!(!client.status().await.unwrap());
}

#[tokio::test]
async fn truncated_insert_does_not_wedge_the_server() {
    let (addr, _reader, _store) = start_server().await;

    // Opcode promising a 16-byte path, then hang up.
    let mut raw = TcpStream::connect(addr).await.unwrap();
    raw.write_all(&[2, 16]).await.unwrap();
    drop(raw);

    let client = ControlClient::new(addr);
    assert!(!client.status().await.unwrap());
}

#[tokio::test]
async fn insert_of_corrupt_image_is_rejected() {
    let (addr, reader, store) = start_server().await;
    store.put("bad.bin", vec![0u8; 5]);

    let client = ControlClient::new(addr);
    let err = client.insert("bad.bin").await.unwrap_err();
    assert!(matches!(err, ControlError::Rejected));

    // The reader state is untouched by the failed insert.
    assert_eq!(
        reader.lock().unwrap().position(),
        CardPosition::NotInserted
    );
}

#[tokio::test]
async fn insert_creates_missing_image() {
    let (addr, _reader, store) = start_server().await;

    let client = ControlClient::new(addr);
    client.insert("fresh.bin").await.unwrap();

    let image = store.image(std::path::Path::new("fresh.bin")).unwrap();
    assert_eq!(image, vec![0u8; magcard_core::constants::CARD_IMAGE_LEN]);
}

#[tokio::test]
async fn oversized_path_is_refused_client_side() {
    let (addr, _reader, _store) = start_server().await;

    let client = ControlClient::new(addr);
    let long = "x".repeat(300);
    assert!(matches!(
        client.insert(&long).await,
        Err(ControlError::PathTooLong)
    ));
}
