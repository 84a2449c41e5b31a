//! WebSocket framing for the change stream

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use log::debug;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use super::{KeepAlive, StreamConnection, StreamFrame};
use crate::error::{ApiError, Result};

/// Payload of the liveness frame
const KEEPALIVE_PAYLOAD: [u8; 1] = [1];

/// Split a connected socket into a frame stream and a keep-alive writer.
pub fn split_connection<S>(socket: WebSocketStream<S>) -> StreamConnection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, read) = socket.split();

    StreamConnection {
        frames: frame_stream(read).boxed(),
        keepalive: Box::new(WsKeepAlive { sink }),
    }
}

/// Map socket messages onto data frames.
///
/// Control frames are skipped. A normal close ends the stream; any other close
/// code or transport error is yielded once and then the stream ends.
fn frame_stream<S>(
    read: SplitStream<WebSocketStream<S>>,
) -> impl futures::Stream<Item = std::result::Result<StreamFrame, ApiError>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    futures::stream::unfold(Some(read), |state| async move {
        let mut read = state?;
        loop {
            match read.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some((Ok(StreamFrame::Text(text)), Some(read)));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Some((Ok(StreamFrame::Binary(data)), Some(read)));
                }
                Some(Ok(Message::Close(frame))) => {
                    return close_outcome(frame).map(|err| (Err(err), None));
                }
                Some(Ok(_)) => continue,
                Some(Err(WsError::ConnectionClosed)) | None => return None,
                Some(Err(err)) => return Some((Err(ApiError::from(err)), None)),
            }
        }
    })
}

/// `None` for a normal closure, the error to report otherwise
fn close_outcome(frame: Option<CloseFrame<'_>>) -> Option<ApiError> {
    match frame {
        None => {
            debug!("Change stream closed by remote");
            None
        }
        Some(frame) if matches!(frame.code, CloseCode::Normal | CloseCode::Away) => {
            debug!("Change stream closed by remote: {}", frame.code);
            None
        }
        Some(frame) => Some(ApiError::Stream(format!(
            "closed by remote with code {}: {}",
            frame.code, frame.reason
        ))),
    }
}

struct WsKeepAlive<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

#[async_trait]
impl<S> KeepAlive for WsKeepAlive<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn ping(&mut self) -> Result<()> {
        self.sink
            .send(Message::Binary(KEEPALIVE_PAYLOAD.to_vec()))
            .await
            .map_err(ApiError::from)?;
        Ok(())
    }

    async fn close(&mut self) {
        // Closing the sink sends a close frame with a normal status
        if let Err(e) = self.sink.close().await {
            debug!("Change stream close failed: {}", e);
        }
    }
}
