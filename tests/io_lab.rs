//! End-to-end I/O against the deterministic lab ring.

mod common;

use ringloop::fs::File;
use ringloop::net::{TcpListener, TcpStream};
use ringloop::time::sleep;
use ringloop::{move_on_after, spawn, yield_now, ErrorKind, Result};
use std::time::Duration;

#[test]
fn file_write_then_read_roundtrip() {
    let (rt, handle) = common::lab();

    rt.block_on(async {
        let file = File::create("/notes.txt").await?;
        file.write_all_at(0, b"hello ring").await?;
        file.sync_all().await?;
        file.close().await?;

        let file = File::open("/notes.txt").await?;
        let contents = file.read_to_end().await?;
        assert_eq!(contents, b"hello ring");
        file.close().await?;
        Ok(())
    })
    .expect("roundtrip completes");

    assert_eq!(
        handle.file_contents("/notes.txt").expect("fixture exists"),
        b"hello ring".to_vec()
    );
}

#[test]
fn read_at_returns_the_requested_window() {
    let (rt, handle) = common::lab();
    handle.add_file("/data.bin", b"abcdefgh".to_vec());

    rt.block_on(async {
        let file = File::open("/data.bin").await?;
        let window = file.read_at(2, 3).await?;
        assert_eq!(window, b"cde");
        file.close().await?;
        Ok(())
    })
    .expect("windowed read completes");
}

#[test]
fn opening_a_missing_file_reports_the_raw_code() {
    let (rt, _handle) = common::lab();
    let result: Result<()> = rt.block_on(async {
        File::open("/no/such/file").await?;
        Ok(())
    });
    let err = result.expect_err("open fails");
    assert_eq!(err.kind(), ErrorKind::Ring);
    assert_eq!(err.ring_code(), Some(-2)); // ENOENT
}

#[test]
fn queue_full_is_recoverable_backpressure() {
    let (rt, handle) = common::lab();
    handle.set_capacity(1);
    handle.add_file("/f", b"x".to_vec());

    rt.block_on(async {
        // First submission takes the only slot until the next drain.
        let opener = spawn(async { File::open("/f").await });
        yield_now().await?;

        // A concurrent submission sees QueueFull and retries.
        let mut attempts = 0_u32;
        let file = loop {
            match File::open("/f").await {
                Ok(file) => break file,
                Err(err) if err.is_queue_full() => {
                    attempts += 1;
                    yield_now().await?;
                }
                Err(err) => return Err(err),
            }
        };
        assert!(attempts >= 1, "backpressure was observed");
        file.close().await?;
        opener.await?.close().await?;
        Ok(())
    })
    .expect("both opens eventually succeed");
}

#[test]
fn lab_echo_roundtrip() {
    let (rt, handle) = common::lab();
    let listener_fd = handle.add_listener();
    handle.push_incoming(listener_fd, vec![b"ping".to_vec()]);

    let sent = rt
        .block_on(async move {
            let listener = TcpListener::from_lab(listener_fd);
            let conn = listener.accept().await?;
            let incoming = conn.recv(64).await?;
            conn.send_all(&incoming).await?;
            let fd = conn.fd();
            conn.close().await?;
            Ok(fd)
        })
        .expect("echo completes");

    assert_eq!(handle.sent_data(sent), b"ping".to_vec());
}

#[test]
fn recv_sees_peer_close_as_empty() {
    let (rt, handle) = common::lab();
    let listener_fd = handle.add_listener();
    handle.push_incoming(listener_fd, vec![b"tail".to_vec()]);

    rt.block_on(async move {
        let listener = TcpListener::from_lab(listener_fd);
        let conn = listener.accept().await?;
        handle.mark_eof(conn.fd());
        assert_eq!(conn.recv(64).await?, b"tail".to_vec());
        assert!(conn.recv(64).await?.is_empty(), "eof reads empty");
        conn.close().await?;
        Ok(())
    })
    .expect("eof observed");
}

#[test]
fn abandoned_operation_is_discarded_silently() {
    let (rt, handle) = common::lab_manual();

    rt.block_on(async move {
        // The recv never completes; the deadline abandons it. Its token
        // leaves the completion map, the ring cancels it, and the late
        // completion is dropped by the multiplexer without a fault.
        let listener_fd = handle.add_listener();
        handle.push_incoming(listener_fd, vec![]);
        let listener = TcpListener::from_lab(listener_fd);

        let accept_task = spawn(async move { listener.accept().await });
        while handle.pending().is_empty() {
            yield_now().await?;
        }
        handle.complete_next();
        let conn = accept_task.await?;

        let cut = move_on_after(Duration::from_millis(10), async {
            conn.recv(16).await
        })
        .await?;
        assert!(cut.is_none(), "recv was cut short");
        // The abandon produced an ECANCELED completion for the reaped
        // token; the next pass drains and discards it.
        sleep(Duration::from_millis(1)).await?;
        Ok(())
    })
    .expect("abandoned operation does not fault the loop");
}

#[test]
fn stream_from_lab_sends_in_order() {
    let (rt, handle) = common::lab();
    let listener_fd = handle.add_listener();
    handle.push_incoming(listener_fd, vec![]);

    let fd = rt
        .block_on(async move {
            let listener = TcpListener::from_lab(listener_fd);
            let conn = listener.accept().await?;
            conn.send_all(b"one").await?;
            conn.send_all(b"two").await?;
            let fd = conn.fd();
            conn.close().await?;
            Ok(fd)
        })
        .expect("sends complete");

    assert_eq!(handle.sent_data(fd), b"onetwo".to_vec());
}

#[test]
fn lab_stream_wrapper_matches_fd() {
    let stream = TcpStream::from_lab(1_000_123);
    assert_eq!(stream.fd(), 1_000_123);
}
