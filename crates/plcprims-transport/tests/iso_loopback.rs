use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use plcprims_frame::{message, Frame, FrameLayout};
use plcprims_transport::tpdu::{self, PacketHeader};
use plcprims_transport::{
    ConnectionParameters, ConnectionState, PlcDriver, SegmentedConfig, SegmentedTransport,
    TransportError,
};

fn listener() -> (TcpListener, ConnectionParameters) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let params = ConnectionParameters::new("127.0.0.1", port).with_tsaps("TCP-SRC1", "TCP-DST1");
    (listener, params)
}

fn small_packets() -> SegmentedConfig {
    SegmentedConfig {
        max_packet_size: 256,
        ..SegmentedConfig::default()
    }
}

/// Accept one raw socket and answer its connection request with a confirm.
fn raw_confirming_peer(listener: &TcpListener) -> TcpStream {
    let (mut stream, _) = listener.accept().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    let mut request = [0u8; 34];
    stream.read_exact(&mut request).unwrap();
    assert_eq!(request[5], tpdu::CR);
    request[5] = tpdu::CC;
    stream.write_all(&request).unwrap();
    stream
}

fn read_raw_packet(stream: &mut TcpStream) -> Vec<u8> {
    let mut tpkt = [0u8; 4];
    stream.read_exact(&mut tpkt).unwrap();
    let length = tpdu::packet_length(&tpkt).unwrap();
    let mut packet = vec![0u8; length];
    packet[..4].copy_from_slice(&tpkt);
    stream.read_exact(&mut packet[4..]).unwrap();
    packet
}

fn write_raw_fragment(stream: &mut TcpStream, payload: &[u8], last: bool) {
    let mut packet = bytes::BytesMut::new();
    tpdu::encode_data_header(payload.len(), last, &mut packet).unwrap();
    packet.extend_from_slice(payload);
    stream.write_all(&packet).unwrap();
}

#[test]
fn five_hundred_bytes_reassemble_in_order() {
    let (listener, params) = listener();
    let payload: Vec<u8> = (0..500u32).map(|i| (i % 251) as u8).collect();

    let server = thread::spawn(move || {
        let driver = SegmentedTransport::accept(&listener, small_packets()).unwrap();
        let mut buf = [0u8; 1024];
        let n = driver.receive_payload(&mut buf, None).unwrap();
        buf[..n].to_vec()
    });

    let client = SegmentedTransport::with_config(small_packets()).unwrap();
    client.connect(&params).unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);

    // 245 payload bytes fit in a 256-byte packet next to the 11 header bytes.
    let fragments = client.send_payload(&payload).unwrap();
    assert_eq!(fragments, 500usize.div_ceil(245));

    assert_eq!(server.join().unwrap(), payload);
}

#[test]
fn only_the_final_fragment_is_marked_last() {
    let (listener, params) = listener();
    let payload = vec![0xA5u8; 600];

    let server = thread::spawn(move || {
        let mut stream = raw_confirming_peer(&listener);
        let mut packets = Vec::new();
        loop {
            let packet = read_raw_packet(&mut stream);
            let last = PacketHeader::parse(&packet).unwrap().is_last();
            packets.push(packet);
            if last {
                return packets;
            }
        }
    });

    let client = SegmentedTransport::with_config(small_packets()).unwrap();
    client.connect(&params).unwrap();
    client.send_payload(&payload).unwrap();

    let packets = server.join().unwrap();
    assert_eq!(packets.len(), 3);
    let mut reassembled = Vec::new();
    for (i, packet) in packets.iter().enumerate() {
        let header = PacketHeader::parse(packet).unwrap();
        assert_eq!(header.code, tpdu::DT);
        assert!(packet.len() <= 256);
        assert!(header.payload_len() <= 256 - 7);
        assert_eq!(header.is_last(), i == packets.len() - 1);
        reassembled.extend_from_slice(&packet[tpdu::DATA_HEADER_LEN..]);
    }
    assert_eq!(reassembled, payload);
}

#[test]
fn frames_and_acknowledgement_round_trip() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let driver = SegmentedTransport::accept(&listener, SegmentedConfig::default()).unwrap();
        let mut incoming = driver.new_frame(0);
        let n = driver
            .receive(&mut incoming, Some(Duration::from_secs(5)))
            .unwrap();
        assert_eq!(n, 240);

        let mut ack = driver.new_frame(message::ACK);
        ack.assign_sequence_number(incoming.sequence_number());
        driver.send(&mut ack).unwrap();
        incoming
    });

    let client = SegmentedTransport::new();
    client.connect(&params).unwrap();

    let mut frame = client.new_frame(message::BOOL_DATA);
    frame.set_data_offset(12);
    frame.append_bytes(&[1, 2, 3, 4], 0, 4).unwrap();
    let id = client.sequences().allocate(&mut frame).unwrap();
    client.send(&mut frame).unwrap();
    assert_eq!(frame.appended_len(), 0);

    let mut reply = client.new_frame(0);
    client
        .receive(&mut reply, Some(Duration::from_secs(5)))
        .unwrap();
    assert_eq!(reply.message_id(), message::ACK);
    assert!(client.sequences().free(u16::from(reply.sequence_number())));
    assert_eq!(reply.sequence_number(), id);

    let seen = server.join().unwrap();
    assert_eq!(seen.as_bytes(), frame.as_bytes());
}

#[test]
fn wrong_confirm_code_rejects_and_closes_socket() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut request = [0u8; 34];
        stream.read_exact(&mut request).unwrap();
        // Correct size, but still carrying the request code.
        stream.write_all(&request).unwrap();

        let mut rest = [0u8; 1];
        stream.read(&mut rest).unwrap()
    });

    let client = SegmentedTransport::new();
    let err = client.connect(&params).unwrap_err();
    assert!(matches!(err, TransportError::HandshakeRejected(_)), "{err:?}");
    assert_eq!(client.state(), ConnectionState::Disconnected);

    assert_eq!(server.join().unwrap(), 0, "client socket left open");

    let mut frame = client.new_frame(message::INIT);
    assert!(matches!(
        client.send(&mut frame),
        Err(TransportError::NotConnected)
    ));
}

#[test]
fn silent_peer_times_out_handshake() {
    let (listener, params) = listener();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(Duration::from_millis(500));
        drop(stream);
    });

    let client = SegmentedTransport::with_config(SegmentedConfig {
        handshake_timeout: Duration::from_millis(100),
        ..SegmentedConfig::default()
    })
    .unwrap();
    assert!(matches!(
        client.connect(&params),
        Err(TransportError::HandshakeRejected(_))
    ));
    server.join().unwrap();
}

#[test]
fn confirm_announcing_longer_length_is_rejected() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let mut request = [0u8; 34];
        stream.read_exact(&mut request).unwrap();

        let mut confirm = request.to_vec();
        confirm[3] = 36;
        confirm[5] = tpdu::CC;
        confirm.extend_from_slice(&[0xC0, 0x01]);
        stream.write_all(&confirm).unwrap();

        let mut rest = [0u8; 1];
        stream.read(&mut rest)
    });

    let client = SegmentedTransport::new();
    let err = client.connect(&params).unwrap_err();
    assert!(matches!(err, TransportError::HandshakeRejected(_)), "{err:?}");
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // Closed either cleanly or with a reset for the unread trailing bytes.
    let outcome = server.join().unwrap();
    assert!(!matches!(outcome, Ok(n) if n > 0), "{outcome:?}");
}

#[test]
fn short_confirm_from_stalled_peer_is_rejected() {
    let (listener, params) = listener();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = [0u8; 34];
        stream.read_exact(&mut request).unwrap();
        request[5] = tpdu::CC;
        stream.write_all(&request[..20]).unwrap();
        thread::sleep(Duration::from_millis(500));
    });

    let client = SegmentedTransport::with_config(SegmentedConfig {
        handshake_timeout: Duration::from_millis(100),
        ..SegmentedConfig::default()
    })
    .unwrap();
    let err = client.connect(&params).unwrap_err();
    assert!(matches!(err, TransportError::HandshakeRejected(_)), "{err:?}");
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.join().unwrap();
}

#[test]
fn disconnect_request_surfaces_as_peer_disconnected() {
    let (listener, params) = listener();
    let params = params.with_shutdown(true);

    let server = thread::spawn(move || {
        let driver = SegmentedTransport::accept(&listener, SegmentedConfig::default()).unwrap();
        let mut frame = driver.new_frame(0);
        let err = driver.receive(&mut frame, None).unwrap_err();
        (err, driver.state())
    });

    let client = SegmentedTransport::new();
    client.connect(&params).unwrap();
    client.disconnect(&params).unwrap();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let (err, state) = server.join().unwrap();
    assert!(matches!(err, TransportError::PeerDisconnected), "{err:?}");
    assert_eq!(state, ConnectionState::Disconnected);
}

#[test]
fn missing_last_marker_exhausts_retries() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let mut stream = raw_confirming_peer(&listener);
        for _ in 0..6 {
            write_raw_fragment(&mut stream, &[0x11; 10], false);
        }
        // Hold the socket until the client gives up.
        let mut rest = [0u8; 1];
        let _ = stream.read(&mut rest);
    });

    let client = SegmentedTransport::new();
    client.connect(&params).unwrap();
    let mut buf = [0u8; 240];
    let err = client
        .receive_payload(&mut buf, Some(Duration::from_secs(5)))
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::ReassemblyExhausted { fragments: 6 }
    ));

    // The stream position is lost; the driver must not be reused.
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        client.send_payload(&[1]),
        Err(TransportError::NotConnected)
    ));
    server.join().unwrap();
}

#[test]
fn oversized_payload_is_rejected_not_truncated() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let mut stream = raw_confirming_peer(&listener);
        write_raw_fragment(&mut stream, &[0x22; 200], false);
        write_raw_fragment(&mut stream, &[0x22; 100], true);
        let mut rest = [0u8; 1];
        let _ = stream.read(&mut rest);
    });

    let client = SegmentedTransport::new();
    client.connect(&params).unwrap();
    let mut frame = Frame::new(message::ANALOG_DATA, FrameLayout::Plain);
    let err = client
        .receive(&mut frame, Some(Duration::from_secs(5)))
        .unwrap_err();
    assert!(matches!(
        err,
        TransportError::ReassemblyOverflow { size: 300, max: 240 }
    ));
    assert!(frame.data().iter().all(|b| *b == 0));
    server.join().unwrap();
}

#[test]
fn idle_receive_times_out_and_stays_connected() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let mut stream = raw_confirming_peer(&listener);
        thread::sleep(Duration::from_millis(300));
        write_raw_fragment(&mut stream, b"late", true);
        let mut rest = [0u8; 1];
        let _ = stream.read(&mut rest);
    });

    let client = SegmentedTransport::new();
    client.connect(&params).unwrap();

    let mut buf = [0u8; 16];
    let err = client
        .receive_payload(&mut buf, Some(Duration::from_millis(50)))
        .unwrap_err();
    assert!(matches!(err, TransportError::Timeout(_)));
    assert_eq!(client.state(), ConnectionState::Connected);

    let n = client.receive_payload(&mut buf, None).unwrap();
    assert_eq!(&buf[..n], b"late");

    client.disconnect(&params).unwrap();
    server.join().unwrap();
}

#[test]
fn disconnect_unblocks_waiting_receiver() {
    let (listener, params) = listener();

    let server = thread::spawn(move || {
        let mut stream = raw_confirming_peer(&listener);
        stream.set_read_timeout(None).unwrap();
        let mut rest = [0u8; 1];
        let _ = stream.read(&mut rest);
    });

    let client = Arc::new(SegmentedTransport::new());
    client.connect(&params).unwrap();

    let receiver = {
        let client = Arc::clone(&client);
        thread::spawn(move || {
            let mut frame = client.new_frame(0);
            client.receive(&mut frame, None)
        })
    };

    thread::sleep(Duration::from_millis(100));
    client.disconnect(&params).unwrap();

    let result = receiver.join().unwrap();
    assert!(result.is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    server.join().unwrap();
}
