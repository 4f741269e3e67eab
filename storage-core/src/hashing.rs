use std::pin::Pin;
use std::task::{Context, Poll};

use md5::{Digest, Md5};
use tokio::io::{AsyncRead, ReadBuf};

/// Reader adapter computing the MD5 and length of everything read through it.
///
/// Wraps a borrowed reader; the caller keeps ownership of the source.
pub struct HashingReader<'a> {
    inner: &'a mut (dyn AsyncRead + Unpin + Send),
    hasher: Md5,
    bytes_read: u64,
}

impl<'a> HashingReader<'a> {
    pub fn new(inner: &'a mut (dyn AsyncRead + Unpin + Send)) -> Self {
        Self {
            inner,
            hasher: Md5::new(),
            bytes_read: 0,
        }
    }

    /// Hex encoded MD5 of the bytes read so far.
    pub fn finalize(self) -> (String, u64) {
        let digest = self.hasher.finalize();
        (faster_hex::hex_string(&digest), self.bytes_read)
    }
}

impl AsyncRead for HashingReader<'_> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut *this.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                let fresh = &buf.filled()[before..];
                this.hasher.update(fresh);
                this.bytes_read += fresh.len() as u64;
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}
