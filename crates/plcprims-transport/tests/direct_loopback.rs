use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use plcprims_frame::{message, Frame, FrameLayout, FRAME_SIZE};
use plcprims_transport::{
    ConnectionParameters, ConnectionState, DirectConfig, DirectFramingTransport, PlcDriver,
    TransportError,
};

fn listener() -> (TcpListener, ConnectionParameters) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, ConnectionParameters::new("127.0.0.1", port))
}

#[test]
fn whole_frame_travels_with_size_prefix() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut raw = [0u8; FRAME_SIZE + 2];
        stream.read_exact(&mut raw).unwrap();
        raw.to_vec()
    });

    let client = DirectFramingTransport::new();
    client.connect(&params).unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    let mut frame = client.new_frame(message::BOOL_CMD);
    frame.set_word(1, 0x0102).unwrap();
    frame.append_bytes(&[9, 9], 0, 2).unwrap();
    client.send(&mut frame).unwrap();
    assert_eq!(frame.appended_len(), 0);

    let raw = server.join().unwrap();
    assert_eq!(&raw[..2], &[0x00, 0xF0]);
    assert_eq!(raw[10], message::BOOL_CMD);
    assert_eq!(raw, frame.as_bytes());
}

#[test]
fn accepted_driver_receives_frames() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let driver = DirectFramingTransport::accept(&listener, DirectConfig::default()).unwrap();
        let mut frame = driver.new_frame(0);
        let n = driver
            .receive(&mut frame, Some(Duration::from_secs(5)))
            .unwrap();
        (n, frame)
    });

    let client = DirectFramingTransport::new();
    client.connect(&params).unwrap();
    let mut frame = client.new_frame(message::ANALOG_DATA);
    frame.set_data_start_number(300);
    frame.set_dword(3, 0xCAFEBABE).unwrap();
    client.send(&mut frame).unwrap();

    let (n, received) = server.join().unwrap();
    assert_eq!(n, FRAME_SIZE);
    assert_eq!(received, frame);
    assert_eq!(received.dword(3).unwrap(), 0xCAFEBABE);
}

// A peer that announces a full frame but only delivers part of it is still
// accepted; the byte count reports how much arrived.
#[test]
fn short_body_is_accepted() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut short = vec![0x00, 0xF0];
        short.extend_from_slice(&[0x24; 100]);
        stream.write_all(&short).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let client = DirectFramingTransport::new();
    client.connect(&params).unwrap();

    let mut frame = client.new_frame(0);
    frame.set_word(100, 0xFFFF).unwrap();
    let n = client
        .receive(&mut frame, Some(Duration::from_secs(5)))
        .unwrap();

    assert_eq!(n, 100);
    assert!(frame.body()[..100].iter().all(|b| *b == 0x24));
    assert!(frame.body()[100..].iter().all(|b| *b == 0));
    assert_eq!(frame.size_prefix(), Some(240));
    assert_eq!(client.state(), ConnectionState::Connected);
    server.join().unwrap();
}

#[test]
fn size_prefix_bounds_each_read() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut wire = vec![0x00, 0x10];
        wire.extend_from_slice(&[0xAA; 16]);
        wire.extend_from_slice(&[0x00, 0x04]);
        wire.extend_from_slice(&[0xBB; 4]);
        stream.write_all(&wire).unwrap();
        thread::sleep(Duration::from_millis(200));
    });

    let client = DirectFramingTransport::new();
    client.connect(&params).unwrap();

    let mut first = client.new_frame(0);
    assert_eq!(client.receive(&mut first, None).unwrap(), 16);
    assert_eq!(first.size_prefix(), Some(16));
    assert!(first.body()[..16].iter().all(|b| *b == 0xAA));

    let mut second = client.new_frame(0);
    assert_eq!(client.receive(&mut second, None).unwrap(), 4);
    assert_eq!(&second.body()[..4], &[0xBB; 4]);
    server.join().unwrap();
}

#[test]
fn closed_peer_drops_connection() {
    let (listener, params) = listener();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        drop(stream);
    });

    let client = DirectFramingTransport::new();
    client.connect(&params).unwrap();
    server.join().unwrap();

    let mut frame = client.new_frame(0);
    assert!(matches!(
        client.receive(&mut frame, Some(Duration::from_secs(5))),
        Err(TransportError::ConnectionClosed)
    ));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.send(&mut frame),
        Err(TransportError::NotConnected)
    ));
}

#[test]
fn refused_connect_reports_address() {
    let (listener, params) = listener();
    drop(listener);

    let client = DirectFramingTransport::new();
    let err = client.connect(&params).unwrap_err();
    assert!(matches!(err, TransportError::Connect { .. }), "{err:?}");
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[test]
fn plain_frames_are_rejected() {
    let client = DirectFramingTransport::new();
    let mut frame = Frame::new(message::INIT, FrameLayout::Plain);
    assert!(matches!(
        client.send(&mut frame),
        Err(TransportError::WrongLayout {
            expected: FrameLayout::SizePrefixed
        })
    ));
}

#[test]
fn disconnect_twice_is_harmless() {
    let (listener, params) = listener();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut buf = [0u8; 1];
        stream.read(&mut buf).unwrap()
    });

    let client = DirectFramingTransport::new();
    client.connect(&params).unwrap();
    client.disconnect(&params).unwrap();
    client.disconnect(&params).unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(server.join().unwrap(), 0);
}
