//! Length-prefixed framing for proto98 streams
//!
//! Each frame is a 2-byte little-endian length followed by exactly that
//! many payload bytes. There is no delimiter and no padding; the reader
//! must consume exactly the prefix, then exactly the declared length.

use futures::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Framing errors.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Stream ended cleanly before a length prefix arrived.
    #[error("stream closed")]
    Closed,

    /// Stream ended inside a frame, mid-prefix or before the declared
    /// payload length was satisfied.
    #[error("stream truncated: {expected} more bytes expected")]
    Truncated { expected: usize },

    /// Frame payload does not fit the 2-byte length prefix.
    #[error("frame too large: {len} bytes")]
    TooLarge { len: usize },

    #[error("stream i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Write one framed packet: length prefix, then payload, as two ordered
/// writes. On write failure the stream is closed (best effort) and the
/// error surfaced; retry is the caller's responsibility.
pub async fn send_framed<W>(stream: &mut W, packet: &[u8]) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(packet.len()).map_err(|_| FrameError::TooLarge {
        len: packet.len(),
    })?;

    let write = async {
        stream.write_all(&len.to_le_bytes()).await?;
        stream.write_all(packet).await?;
        stream.flush().await
    };
    if let Err(e) = write.await {
        let _ = stream.close().await;
        return Err(FrameError::Io(e));
    }
    Ok(())
}

/// Read one framed packet. Fails with [`FrameError::Truncated`] if the
/// stream closes before the declared payload length is satisfied, and
/// with [`FrameError::Closed`] if it ends at a frame boundary.
pub async fn read_framed<R>(stream: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncRead + Unpin,
{
    // The prefix is read byte-wise: EOF before any of it is a frame
    // boundary, EOF after one byte is a torn frame.
    let mut prefix = [0u8; 2];
    let mut filled = 0;
    while filled < prefix.len() {
        let n = stream.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Err(FrameError::Closed);
            }
            return Err(FrameError::Truncated {
                expected: prefix.len() - filled,
            });
        }
        filled += n;
    }

    let len = u16::from_le_bytes(prefix) as usize;
    let mut payload = vec![0u8; len];
    if let Err(e) = stream.read_exact(&mut payload).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(FrameError::Truncated { expected: len });
        }
        return Err(FrameError::Io(e));
    }
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::io::Cursor;

    #[tokio::test]
    async fn roundtrip_preserves_bytes() {
        let packet = crate::proto98::Proto98Packet::ping(
            "10.0.0.1".parse().unwrap(),
            "10.0.0.2".parse().unwrap(),
        );

        let mut wire = Cursor::new(Vec::new());
        send_framed(&mut wire, packet.as_bytes()).await.unwrap();

        let mut wire = Cursor::new(wire.into_inner());
        let frame = read_framed(&mut wire).await.unwrap();
        assert_eq!(frame, packet.as_bytes());
    }

    #[tokio::test]
    async fn prefix_is_little_endian() {
        let mut wire = Cursor::new(Vec::new());
        send_framed(&mut wire, &[0xaa; 300]).await.unwrap();

        let bytes = wire.into_inner();
        assert_eq!(&bytes[..2], &300u16.to_le_bytes());
        assert_eq!(bytes.len(), 302);
    }

    #[tokio::test]
    async fn truncated_payload_is_an_error() {
        // Prefix declares 22 bytes but only 10 arrive.
        let mut wire = Vec::new();
        wire.extend_from_slice(&22u16.to_le_bytes());
        wire.extend_from_slice(&[0u8; 10]);

        let mut wire = Cursor::new(wire);
        let err = read_framed(&mut wire).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 22 }));
    }

    #[tokio::test]
    async fn eof_inside_prefix_is_truncation() {
        // One byte of a two-byte prefix is a torn frame, not a close.
        let mut wire = Cursor::new(vec![0x16u8]);
        let err = read_framed(&mut wire).await.unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 1 }));
    }

    #[tokio::test]
    async fn eof_at_frame_boundary_is_closed() {
        let mut wire = Cursor::new(Vec::new());
        let err = read_framed(&mut wire).await.unwrap_err();
        assert!(matches!(err, FrameError::Closed));
    }

    #[tokio::test]
    async fn oversized_packet_is_rejected() {
        let mut wire = Cursor::new(Vec::new());
        let err = send_framed(&mut wire, &vec![0u8; 70_000]).await.unwrap_err();
        assert!(matches!(err, FrameError::TooLarge { .. }));
        assert!(wire.into_inner().is_empty());
    }
}
