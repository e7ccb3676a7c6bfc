use core::fmt;
use std::{
    collections::VecDeque,
    io::{self, Cursor, Read, Write},
    sync::{Arc, Condvar, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;

/// Datagram-oriented `Read`/`Write` adapter for the in-pipeline DTLS
/// handshake.
///
/// Inbound DTLS records are pushed by the transport node as whole datagrams;
/// outbound writes are handed to a send callback that forwards them down the
/// node chain. Cloning shares the same queue, so the node keeps one clone to
/// feed while the SSL stream owns another.
#[derive(Clone)]
pub struct DatagramChannel {
    inner: Arc<ChannelInner>,
    reader: Cursor<Vec<u8>>,
    read_timeout: Duration,
}

type SendFn = dyn Fn(Bytes) -> bool + Send + Sync;

struct ChannelInner {
    incoming: Mutex<ChannelState>,
    cond: Condvar,
    send: Box<SendFn>,
}

struct ChannelState {
    queue: VecDeque<Vec<u8>>,
    closed: bool,
}

impl fmt::Debug for DatagramChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatagramChannel")
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

impl DatagramChannel {
    pub fn new(send: Box<SendFn>, read_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                incoming: Mutex::new(ChannelState {
                    queue: VecDeque::new(),
                    closed: false,
                }),
                cond: Condvar::new(),
                send,
            }),
            reader: Cursor::new(Vec::new()),
            read_timeout,
        }
    }

    /// Queue one inbound datagram for the handshake to consume.
    pub fn push_incoming(&self, datagram: Vec<u8>) {
        if let Ok(mut state) = self.inner.incoming.lock() {
            state.queue.push_back(datagram);
            self.inner.cond.notify_one();
        }
    }

    /// Wake any blocked reader and make further reads fail.
    pub fn close(&self) {
        if let Ok(mut state) = self.inner.incoming.lock() {
            state.closed = true;
            self.inner.cond.notify_all();
        }
    }

    fn next_datagram(&self) -> io::Result<Vec<u8>> {
        let deadline = Instant::now() + self.read_timeout;
        let mut state = self
            .inner
            .incoming
            .lock()
            .map_err(|_| io::Error::other("channel lock poisoned"))?;
        loop {
            if let Some(datagram) = state.queue.pop_front() {
                return Ok(datagram);
            }
            if state.closed {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
            let (next, timed_out) = self
                .inner
                .cond
                .wait_timeout(state, deadline - now)
                .map_err(|_| io::Error::other("channel lock poisoned"))?;
            state = next;
            if timed_out.timed_out() && state.queue.is_empty() {
                if state.closed {
                    return Err(io::Error::from(io::ErrorKind::UnexpectedEof));
                }
                return Err(io::Error::from(io::ErrorKind::TimedOut));
            }
        }
    }
}

impl Read for DatagramChannel {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        // Consume leftovers of the previous datagram first.
        let pos = self.reader.position();
        if pos < self.reader.get_ref().len() as u64 {
            return self.reader.read(buf);
        }

        let datagram = self.next_datagram()?;
        self.reader = Cursor::new(datagram);
        self.reader.read(buf)
    }
}

impl Write for DatagramChannel {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if (self.inner.send)(Bytes::copy_from_slice(buf)) {
            Ok(buf.len())
        } else {
            Err(io::Error::other("lower node rejected datagram"))
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn write_forwards_to_send_callback() {
        let sent: Arc<StdMutex<Vec<Bytes>>> = Arc::new(StdMutex::new(Vec::new()));
        let sent_clone = Arc::clone(&sent);
        let mut ch = DatagramChannel::new(
            Box::new(move |b| {
                sent_clone.lock().unwrap().push(b);
                true
            }),
            Duration::from_millis(10),
        );
        ch.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn read_returns_pushed_datagram() {
        let mut ch = DatagramChannel::new(Box::new(|_| true), Duration::from_millis(100));
        ch.push_incoming(vec![9, 8, 7]);
        let mut buf = [0u8; 8];
        let n = ch.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], &[9, 8, 7]);
    }

    #[test]
    fn read_times_out_when_empty() {
        let mut ch = DatagramChannel::new(Box::new(|_| true), Duration::from_millis(20));
        let mut buf = [0u8; 8];
        let err = ch.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn close_unblocks_reader_with_eof() {
        let mut ch = DatagramChannel::new(Box::new(|_| true), Duration::from_secs(5));
        let pusher = ch.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            pusher.close();
        });
        let mut buf = [0u8; 8];
        let err = ch.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
        handle.join().unwrap();
    }
}
