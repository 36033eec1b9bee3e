//! Network Tests
//!
//! These tests verify:
//! - Byte-level request/reply exchanges against a live server
//! - Every way a connection ends sends the terminal byte
//! - Reserved opcodes are ignored
//! - Connections share one map and one store-wide commit
//! - Shutdown: polling close leaves idle connections open, force-close does not

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chunkmap::network::{Client, Connection, ConnectionState, Server};
use chunkmap::{ChunkPos, ColumnPos, Config, WorldMap};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const CONTAINS_2_M1_M3: [u8; 13] = [
    0x01, 0x00, 0x00, 0x00, 0x02, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFD,
];

fn test_config() -> Config {
    Config::builder()
        .listen_addr("127.0.0.1:0")
        .accept_poll_interval_ms(20)
        .shutdown_grace_ms(200)
        .build()
}

fn start_server(config: Config, map: WorldMap) -> Server {
    let mut server = Server::new(config, Arc::new(map));
    server.start().unwrap();
    server
}

fn connect(server: &Server) -> TcpStream {
    let stream = TcpStream::connect(server.local_addr().unwrap()).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream
}

fn read_bytes(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream.read_exact(&mut buf).unwrap();
    buf
}

/// Expect the terminal byte followed by end of stream
fn expect_closed(stream: &mut TcpStream) {
    assert_eq!(read_bytes(stream, 1), vec![0x00]);
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty(), "unexpected trailing bytes {:?}", rest);
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

// =============================================================================
// Protocol Exchange Tests
// =============================================================================

#[test]
fn test_contains_then_get_exchange() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let mut stream = connect(&server);

    stream.write_all(&CONTAINS_2_M1_M3).unwrap();
    assert_eq!(read_bytes(&mut stream, 1), vec![0x41]);

    server
        .map()
        .save_chunk(ChunkPos::new(2, -1, -3), vec![0, 2])
        .unwrap();

    stream.write_all(&CONTAINS_2_M1_M3).unwrap();
    assert_eq!(read_bytes(&mut stream, 1), vec![0x51]);

    let mut get = CONTAINS_2_M1_M3;
    get[0] = 0x02;
    stream.write_all(&get).unwrap();
    assert_eq!(read_bytes(&mut stream, 1), vec![0x52]);
    assert_eq!(read_bytes(&mut stream, 4), 2i32.to_be_bytes().to_vec());
    assert_eq!(read_bytes(&mut stream, 2), vec![0, 2]);
}

#[test]
fn test_save_then_list_columns() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let mut stream = connect(&server);

    // save column (-3, 1) = [7]
    let mut save = vec![0x23];
    save.extend_from_slice(&(-3i32).to_be_bytes());
    save.extend_from_slice(&1i32.to_be_bytes());
    save.extend_from_slice(&1i32.to_be_bytes());
    save.push(7);
    stream.write_all(&save).unwrap();

    stream.write_all(&[0x24]).unwrap();
    assert_eq!(read_bytes(&mut stream, 1), vec![0x74]);
    assert_eq!(read_bytes(&mut stream, 4), 1i32.to_be_bytes().to_vec());
    assert_eq!(read_bytes(&mut stream, 4), (-3i32).to_be_bytes().to_vec());
    assert_eq!(read_bytes(&mut stream, 4), 1i32.to_be_bytes().to_vec());

    // the column is not a chunk
    let mut contains_chunk = vec![0x01];
    contains_chunk.extend_from_slice(&(-3i32).to_be_bytes());
    contains_chunk.extend_from_slice(&0i32.to_be_bytes());
    contains_chunk.extend_from_slice(&1i32.to_be_bytes());
    stream.write_all(&contains_chunk).unwrap();
    assert_eq!(read_bytes(&mut stream, 1), vec![0x41]);
}

#[test]
fn test_reserved_opcodes_are_ignored() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let mut stream = connect(&server);

    stream.write_all(&[0x06, 0x0F, 0x29]).unwrap();
    stream.write_all(&CONTAINS_2_M1_M3).unwrap();

    assert_eq!(read_bytes(&mut stream, 1), vec![0x41]);
}

// =============================================================================
// Connection Teardown Tests
// =============================================================================

#[test]
fn test_close_packet_sends_terminal_byte() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let mut stream = connect(&server);

    stream.write_all(&[0x00]).unwrap();

    expect_closed(&mut stream);
}

#[test]
fn test_reply_flag_closes_connection() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let mut stream = connect(&server);

    stream.write_all(&[0x41]).unwrap();

    expect_closed(&mut stream);
    assert!(wait_until(Duration::from_secs(2), || server.live_connections() == 0));
}

#[test]
fn test_truncated_packet_closes_connection() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let mut stream = connect(&server);

    stream.write_all(&CONTAINS_2_M1_M3[..6]).unwrap();
    stream.shutdown(Shutdown::Write).unwrap();

    expect_closed(&mut stream);
}

#[test]
fn test_bad_connection_does_not_affect_others() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let mut good = connect(&server);
    let mut bad = connect(&server);

    bad.write_all(&[0x7F]).unwrap();
    expect_closed(&mut bad);

    good.write_all(&CONTAINS_2_M1_M3).unwrap();
    assert_eq!(read_bytes(&mut good, 1), vec![0x41]);
}

// =============================================================================
// Client / Shared State Tests
// =============================================================================

#[test]
fn test_clients_share_the_map() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let addr = server.local_addr().unwrap();

    let mut writer = Client::connect(addr).unwrap();
    let mut reader = Client::connect(addr).unwrap();

    writer.save_chunk(ChunkPos::new(1, 2, 3), b"blob".to_vec()).unwrap();
    writer.save_column(ColumnPos::new(1, 3), b"col".to_vec()).unwrap();
    // a round trip on the writer guarantees its saves were processed
    assert!(writer.contains_chunk(ChunkPos::new(1, 2, 3)).unwrap());

    assert_eq!(
        reader.get_chunk(ChunkPos::new(1, 2, 3)).unwrap(),
        Some(b"blob".to_vec())
    );
    assert_eq!(reader.list_columns().unwrap(), vec![ColumnPos::new(1, 3)]);
    assert_eq!(reader.get_column(ColumnPos::new(9, 9)).unwrap(), None);

    writer.close().unwrap();
    reader.close().unwrap();
}

#[test]
fn test_commit_from_one_client_persists_all_writes() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::builder()
        .storage_path(temp_dir.path())
        .listen_addr("127.0.0.1:0")
        .accept_poll_interval_ms(20)
        .shutdown_grace_ms(100)
        .build();

    let map = WorldMap::open(&config).unwrap();
    let mut server = start_server(config.clone(), map);
    let addr = server.local_addr().unwrap();

    let mut a = Client::connect(addr).unwrap();
    let mut b = Client::connect(addr).unwrap();
    a.save_chunk(ChunkPos::new(0, 0, 0), vec![1]).unwrap();
    assert!(a.contains_chunk(ChunkPos::new(0, 0, 0)).unwrap());
    b.save_chunk(ChunkPos::new(1, 1, 1), vec![2]).unwrap();
    b.commit().unwrap();
    b.close().unwrap();
    a.close().unwrap();

    server.stop();
    server.map().shutdown().unwrap();

    let map = WorldMap::open(&config).unwrap();
    assert_eq!(map.get_chunk(ChunkPos::new(0, 0, 0)).unwrap(), Some(vec![1]));
    assert_eq!(map.get_chunk(ChunkPos::new(1, 1, 1)).unwrap(), Some(vec![2]));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_start_twice_fails() {
    let mut server = start_server(test_config(), WorldMap::in_memory());
    assert!(server.start().is_err());
    server.stop();
    assert!(!server.is_running());
}

#[test]
fn test_stop_is_idempotent() {
    let mut server = start_server(test_config(), WorldMap::in_memory());
    server.stop();
    server.stop();
}

#[test]
fn test_registry_drops_finished_connections() {
    let server = start_server(test_config(), WorldMap::in_memory());

    for _ in 0..20 {
        let mut stream = connect(&server);
        stream.write_all(&[0x00]).unwrap();
        expect_closed(&mut stream);
        assert!(wait_until(Duration::from_secs(2), || server.live_connections() == 0));
    }

    assert_eq!(server.connection_count(), 20);
    // each accept prunes the connections that finished before it
    let states = server.connection_states();
    assert!(states.len() <= 1, "registry kept {} entries", states.len());
    assert!(states.iter().all(|(_, s)| *s == ConnectionState::Closed));
}

#[test]
fn test_connection_ids_are_unique() {
    let server = start_server(test_config(), WorldMap::in_memory());
    let _streams: Vec<_> = (0..3).map(|_| connect(&server)).collect();
    assert!(wait_until(Duration::from_secs(2), || server.connection_count() == 3));

    let mut ids: Vec<_> = server.connection_states().iter().map(|(id, _)| *id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 3);
}

#[test]
fn test_accept_does_not_wait_for_the_poll_interval() {
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .accept_poll_interval_ms(5_000)
        .shutdown_grace_ms(10)
        .build();
    let server = start_server(config, WorldMap::in_memory());
    // let the accept loop settle into its wait
    thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    let mut stream = connect(&server);
    stream.write_all(&CONTAINS_2_M1_M3).unwrap();
    assert_eq!(read_bytes(&mut stream, 1), vec![0x41]);

    assert!(
        started.elapsed() < Duration::from_secs(1),
        "first reply took {:?}",
        started.elapsed()
    );
}

#[test]
fn test_listener_closed_after_stop() {
    let mut server = start_server(test_config(), WorldMap::in_memory());
    let addr = server.local_addr().unwrap();

    server.stop();

    assert!(TcpStream::connect(addr).is_err());
}

// =============================================================================
// Cancellation Tests
// =============================================================================

/// Closing an idle connection only takes effect once its blocking read
/// returns. This documents the polling limitation.
#[test]
fn test_close_signal_does_not_interrupt_idle_read() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut peer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let (socket, _) = listener.accept().unwrap();

    let config = Config::default();
    let connection = Connection::new(socket, Arc::new(WorldMap::in_memory()), &config).unwrap();
    let handle = connection.spawn().unwrap();

    handle.close();
    thread::sleep(config.shutdown_grace());

    assert!(!handle.is_finished(), "idle connection closed without peer activity");
    assert_eq!(handle.state(), ConnectionState::Open);

    // the next packet is still served, then the signal is observed
    peer.write_all(&CONTAINS_2_M1_M3).unwrap();
    assert_eq!(read_bytes(&mut peer, 1), vec![0x41]);
    expect_closed(&mut peer);

    handle.join().unwrap();
}

#[test]
fn test_force_close_after_teardown_is_ok() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let mut peer = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    peer.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let (socket, _) = listener.accept().unwrap();

    let connection =
        Connection::new(socket, Arc::new(WorldMap::in_memory()), &Config::default()).unwrap();
    let handle = connection.spawn().unwrap();

    peer.write_all(&[0x00]).unwrap();
    expect_closed(&mut peer);
    assert!(wait_until(Duration::from_secs(2), || handle.is_finished()));
    assert_eq!(handle.state(), ConnectionState::Closed);

    handle.force_close().unwrap();
    handle.join().unwrap();
}

#[test]
fn test_server_stop_leaves_idle_connection_open() {
    let mut server = start_server(test_config(), WorldMap::in_memory());
    let mut idle = connect(&server);
    assert!(wait_until(Duration::from_secs(2), || server.connection_count() == 1));

    server.stop();

    assert_eq!(server.live_connections(), 1);

    // dropping the peer's side releases it
    idle.shutdown(Shutdown::Write).unwrap();
    expect_closed(&mut idle);
    assert!(wait_until(Duration::from_secs(2), || server.live_connections() == 0));
}

#[test]
fn test_force_close_interrupts_idle_connection() {
    let config = Config::builder()
        .listen_addr("127.0.0.1:0")
        .accept_poll_interval_ms(20)
        .shutdown_grace_ms(100)
        .force_close_on_shutdown(true)
        .build();
    let mut server = start_server(config, WorldMap::in_memory());
    let mut idle = connect(&server);
    assert!(wait_until(Duration::from_secs(2), || server.connection_count() == 1));

    server.stop();

    assert!(wait_until(Duration::from_secs(2), || server.live_connections() == 0));
    let mut rest = Vec::new();
    // the socket is already shut down; whatever arrives, the stream ends
    let _ = idle.read_to_end(&mut rest);
    assert!(rest.len() <= 1);
}
