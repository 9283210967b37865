use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use http_body::{Body, Frame, SizeHint};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

use crate::BoxError;

/// Response body that can be inspected without being consumed
///
/// Frames read while inspecting are replayed, in order and unchanged, before
/// the rest of the underlying body is streamed.
pub struct ClientBody {
    replay: VecDeque<Result<Frame<Bytes>, BoxError>>,
    inner: UnsyncBoxBody<Bytes, BoxError>,
}

impl ClientBody {
    pub fn new<B>(body: B) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        Self {
            replay: VecDeque::new(),
            inner: body.map_err(Into::into).boxed_unsync(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Empty::<Bytes>::new())
    }

    /// Read until at least `limit` data bytes are buffered or the body ends
    ///
    /// Returns at most the first `limit` bytes. The frames read, including a
    /// terminal error if one occurs, stay queued for replay.
    pub(crate) async fn peek(&mut self, limit: usize) -> Bytes {
        let mut seen = BytesMut::new();
        for frame in self.replay.iter().flatten() {
            if let Some(data) = frame.data_ref() {
                seen.extend_from_slice(data);
            }
        }

        let mut failed = self.replay.iter().any(Result::is_err);
        while !failed && seen.len() < limit {
            match self.inner.frame().await {
                Some(Ok(frame)) => {
                    if let Some(data) = frame.data_ref() {
                        seen.extend_from_slice(data);
                    }
                    self.replay.push_back(Ok(frame));
                }
                Some(Err(e)) => {
                    self.replay.push_back(Err(e));
                    failed = true;
                }
                None => {
                    self.inner = Self::empty().inner;
                    break;
                }
            }
        }

        seen.truncate(limit);
        seen.freeze()
    }
}

impl Default for ClientBody {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<Bytes> for ClientBody {
    fn from(bytes: Bytes) -> Self {
        Self::new(Full::new(bytes))
    }
}

impl From<String> for ClientBody {
    fn from(text: String) -> Self {
        Self::from(Bytes::from(text))
    }
}

impl From<&'static str> for ClientBody {
    fn from(text: &'static str) -> Self {
        Self::from(Bytes::from_static(text.as_bytes()))
    }
}

impl Body for ClientBody {
    type Data = Bytes;
    type Error = BoxError;

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Result<Frame<Bytes>, BoxError>>> {
        let this = self.get_mut();
        if let Some(frame) = this.replay.pop_front() {
            return Poll::Ready(Some(frame));
        }
        Pin::new(&mut this.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.replay.is_empty() && self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        if self.replay.is_empty() {
            return self.inner.size_hint();
        }

        let buffered = self
            .replay
            .iter()
            .flatten()
            .filter_map(Frame::data_ref)
            .map(|data| data.len() as u64)
            .sum::<u64>();
        let rest = self.inner.size_hint();

        let mut hint = SizeHint::new();
        hint.set_lower(buffered + rest.lower());
        if let Some(upper) = rest.upper() {
            hint.set_upper(buffered + upper);
        }
        hint
    }
}

impl std::fmt::Debug for ClientBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientBody")
            .field("buffered_frames", &self.replay.len())
            .finish_non_exhaustive()
    }
}
