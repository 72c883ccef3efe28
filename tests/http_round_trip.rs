use positioned_io::{ReadAt, WriteAt};
use souris::http::HttpReader;
use souris::{write_log_file, Archive};
use std::io::{self, Read};
use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;

#[derive(Default)]
struct MemBuf(Vec<u8>);

impl WriteAt for MemBuf {
    fn write_at(&mut self, pos: u64, buf: &[u8]) -> io::Result<usize> {
        let end = pos as usize + buf.len();
        if self.0.len() < end {
            self.0.resize(end, 0);
        }
        self.0[pos as usize..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ReadAt for MemBuf {
    fn read_at(&self, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
        if pos >= self.0.len() as u64 {
            return Ok(0);
        }
        let rest = &self.0[pos as usize..];
        let n = buf.len().min(rest.len());
        buf[..n].copy_from_slice(&rest[..n]);
        Ok(n)
    }
}

/// Serves `bytes` on an ephemeral port and returns its address. The
/// server thread lives until the test process exits.
fn spawn_server(bytes: Vec<u8>) -> SocketAddr {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");
        rt.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("bind");
            tx.send(listener.local_addr().expect("addr")).expect("send");
            axum::serve(listener, souris::serve::router(Arc::new(bytes)))
                .await
                .expect("serve");
        });
    });
    rx.recv().expect("server address")
}

fn sample_archive() -> Vec<u8> {
    let payloads: [&[u8]; 3] = [b"first", b"second block", b"third"];
    let buf = write_log_file(MemBuf::default(), payloads).expect("write");
    buf.0
}

#[test]
fn remote_archive_reads_like_a_local_one() {
    let bytes = sample_archive();
    let addr = spawn_server(bytes.clone());

    let reader = HttpReader::open(&format!("http://{addr}/")).expect("open");
    let ar = Archive::new(reader).expect("parse remote archive");

    assert_eq!(ar.count(), 3);
    assert_eq!(ar.size(), bytes.len() as u64);

    let mut got = Vec::new();
    for (info, mut rd) in ar.iter(0) {
        let mut payload = Vec::new();
        rd.read_to_end(&mut payload).expect("read payload");
        assert!(info.verify(&mut payload.as_slice()).expect("verify"));
        got.push(payload);
    }
    assert!(ar.take_err().is_none());
    assert_eq!(
        got,
        vec![
            b"first".to_vec(),
            b"second block".to_vec(),
            b"third".to_vec(),
        ]
    );

    assert!(ar.get_ref().bytes_read() > 0);
}

#[test]
fn reverse_iteration_over_http() {
    let bytes = sample_archive();
    let addr = spawn_server(bytes);

    let reader = HttpReader::open(&format!("http://{addr}/")).expect("open");
    let ar = Archive::new(reader).expect("parse remote archive");

    let newest: Vec<Vec<u8>> = ar
        .rev(1)
        .map(|(_, mut rd)| {
            let mut payload = Vec::new();
            rd.read_to_end(&mut payload).expect("read payload");
            payload
        })
        .collect();
    assert!(ar.take_err().is_none());
    assert_eq!(newest, vec![b"third".to_vec()]);
}

#[test]
fn reads_past_the_end_are_eof() {
    let bytes = sample_archive();
    let len = bytes.len() as u64;
    let addr = spawn_server(bytes);

    let reader = HttpReader::open(&format!("http://{addr}/")).expect("open");

    let mut buf = [0u8; 16];
    assert_eq!(reader.read_at(len + 100, &mut buf).expect("read"), 0);

    // A range straddling the end is clamped, not failed.
    let n = reader.read_at(len - 4, &mut buf).expect("read");
    assert_eq!(n, 4);
}
