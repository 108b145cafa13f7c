//! Outgoing requests and how to recognise and decode their replies.
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use crate::error::DecodeError;
use crate::message::Message;

/// Decides whether a framed message is the reply to a request.
pub type Matcher = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

type Decoder<T> = Box<dyn FnOnce(&Message) -> Result<T, DecodeError> + Send>;

/// A single request to the device.
///
/// A command is consumed by [`crate::Client::send`]; build a new one for every call.
pub struct Command<T> {
    request: Bytes,
    matcher: Matcher,
    decoder: Decoder<T>,
    timeout: Option<Duration>,
}

impl<T> Command<T> {
    /// # Examples
    ///
    /// ```
    /// use transport::{Command, DecodeError};
    ///
    /// let set_volume = Command::new(
    ///     "32V",
    ///     |reply| reply.text().starts_with("Vol"),
    ///     |reply| {
    ///         reply.text()[3..]
    ///             .parse::<i64>()
    ///             .map_err(|e| DecodeError::new(e.to_string()))
    ///     },
    /// );
    /// assert_eq!(set_volume.request(), b"32V");
    /// ```
    pub fn new<M, D>(request: impl Into<Bytes>, matcher: M, decoder: D) -> Self
    where
        M: Fn(&Message) -> bool + Send + Sync + 'static,
        D: FnOnce(&Message) -> Result<T, DecodeError> + Send + 'static,
    {
        Self {
            request: request.into(),
            matcher: Arc::new(matcher),
            decoder: Box::new(decoder),
            timeout: None,
        }
    }

    /// Override the client's default reply window for this command.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn request(&self) -> &[u8] {
        &self.request
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn matches(&self, message: &Message) -> bool {
        (self.matcher)(message)
    }

    pub(crate) fn into_parts(self) -> (Bytes, Matcher, Decoder<T>, Option<Duration>) {
        (self.request, self.matcher, self.decoder, self.timeout)
    }
}

impl Command<String> {
    /// A command whose reply is any line accepted by `matcher`, returned as text.
    pub fn text<M>(request: impl Into<Bytes>, matcher: M) -> Self
    where
        M: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self::new(request, matcher, |reply| Ok(reply.text().to_owned()))
    }
}

impl<T> fmt::Debug for Command<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("request", &self.request)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
