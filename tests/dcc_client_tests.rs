//! Integration tests for the DCC-EX TCP client against a fake command station

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use signalbox::dcc::DccClient;
use signalbox::{CommandStation, Direction};

/// Bind a fake station on an ephemeral loopback port.
fn station() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

fn client(port: u16) -> DccClient {
    DccClient::new("127.0.0.1", port).with_connect_timeout(Duration::from_secs(1))
}

/// Read lines from one connection until the peer closes it.
fn read_all(stream: TcpStream) -> Vec<String> {
    BufReader::new(stream)
        .lines()
        .map_while(Result::ok)
        .collect()
}

#[test]
fn commands_arrive_as_newline_terminated_lines() {
    let (listener, port) = station();
    let received = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        read_all(stream)
    });

    let mut dcc = client(port);
    dcc.connect().unwrap();
    assert!(dcc.is_connected());

    dcc.track_power_main().unwrap();
    dcc.set_speed(3, 30, Direction::Forward).unwrap();
    dcc.set_speed(3, 200, Direction::Reverse).unwrap();
    dcc.light_on(3).unwrap();
    dcc.throw_turnout(12).unwrap();
    dcc.emergency_stop().unwrap();
    dcc.close();
    assert!(!dcc.is_connected());

    assert_eq!(
        received.join().unwrap(),
        vec![
            "<1 MAIN>",
            "<t 3 30 1>",
            "<t 3 127 0>",
            "<F 3 0 1>",
            "<T 12 1>",
            "<!>",
        ]
    );
}

#[test]
fn cab_status_reads_reply() {
    let (listener, port) = station();
    let station = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();

        let mut writer = stream;
        // 158 = forward bit | speed 30
        writer.write_all(b"<l 3 0 158 5>\n").unwrap();
        line.trim_end().to_string()
    });

    let mut dcc = client(port);
    let status = dcc.cab_status(3, Duration::from_secs(2)).unwrap();

    assert_eq!(station.join().unwrap(), "<t 3>");
    assert_eq!(status.cab, 3);
    assert_eq!(status.speed, 30);
    assert_eq!(status.direction, Direction::Forward);
    assert_eq!(status.function_map, 5);
}

#[test]
fn unsolicited_lines_are_not_taken_as_status() {
    let (listener, port) = station();
    let (ready_tx, ready_rx) = mpsc::channel();
    let station = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        writer.write_all(b"<p1 MAIN>\n").unwrap();
        ready_tx.send(()).unwrap();

        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        writer.write_all(b"<l 4 1 135 0>\n").unwrap();
        read_all(reader.into_inner())
    });

    let mut dcc = client(port);
    dcc.connect().unwrap();
    ready_rx.recv().unwrap();
    thread::sleep(Duration::from_millis(50));

    let status = dcc.cab_status(4, Duration::from_secs(2)).unwrap();
    assert_eq!(status.cab, 4);
    assert_eq!(status.speed, 7);

    dcc.close();
    station.join().unwrap();
}

#[test]
fn silent_station_times_out_to_none() {
    let (listener, port) = station();
    let station = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        read_all(stream)
    });

    let mut dcc = client(port);
    assert!(dcc.cab_status(3, Duration::from_millis(100)).is_none());
    // a timeout is not a broken connection
    assert!(dcc.is_connected());

    dcc.close();
    assert_eq!(station.join().unwrap(), vec!["<t 3>"]);
}

#[test]
fn garbage_reply_is_none() {
    let (listener, port) = station();
    let station = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut writer = stream.try_clone().unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        writer.write_all(b"<X>\n").unwrap();
        read_all(reader.into_inner())
    });

    let mut dcc = client(port);
    assert!(dcc.cab_status(3, Duration::from_secs(2)).is_none());

    dcc.close();
    station.join().unwrap();
}

#[test]
fn reconnects_after_station_drops_connection() {
    let (listener, port) = station();
    let (dropped_tx, dropped_rx) = mpsc::channel();
    let station = thread::spawn(move || {
        let (first, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(first);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        drop(reader);
        dropped_tx.send(line.trim_end().to_string()).unwrap();

        let (second, _) = listener.accept().unwrap();
        read_all(second)
    });

    let mut dcc = client(port);
    dcc.track_power_main().unwrap();
    assert_eq!(dropped_rx.recv().unwrap(), "<1 MAIN>");
    thread::sleep(Duration::from_millis(50));

    // the query notices the closed peer and drops the connection
    assert!(dcc.cab_status(3, Duration::from_millis(200)).is_none());
    assert!(!dcc.is_connected());

    // the next send opens a fresh connection
    dcc.set_speed(3, 12, Direction::Forward).unwrap();
    assert!(dcc.is_connected());
    dcc.close();

    assert_eq!(station.join().unwrap(), vec!["<t 3 12 1>"]);
}

#[test]
fn close_then_send_reconnects() {
    let (listener, port) = station();
    let station = thread::spawn(move || {
        let first = listener.accept().unwrap().0;
        let first_lines = read_all(first);
        let second = listener.accept().unwrap().0;
        (first_lines, read_all(second))
    });

    let mut dcc = client(port);
    dcc.track_power_off("MAIN").unwrap();
    dcc.close();
    dcc.track_power_on("PROG").unwrap();
    dcc.close();

    let (first, second) = station.join().unwrap();
    assert_eq!(first, vec!["<0 MAIN>"]);
    assert_eq!(second, vec!["<1 PROG>"]);
}
