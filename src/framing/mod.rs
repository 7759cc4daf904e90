// ABOUTME: Pluggable message framing, transforms a raw byte stream into discrete application messages
// ABOUTME: Defines the Framer/FramerFactory contract and re-exports the two built-in variants

mod delimiter;
mod length_prefix;

pub use delimiter::DelimiterFramer;
pub use length_prefix::LengthPrefixFramer;

use crate::error::FramingError;

/// Stateful byte-stream parser. Each accepted connection owns exactly one `Framer`, created
/// fresh by a [`FramerFactory`]; there is no shared state across sessions.
///
/// Callers must fully drain `next()` (call it until it returns `None`) after every `feed()`
/// before feeding more bytes, so that messages are yielded as soon as they are complete rather
/// than held back behind the next read.
pub trait Framer: Send + 'static {
    /// The application message type this framer produces.
    type Message: Send + 'static;

    /// Appends `chunk` to the framer's internal buffer.
    ///
    /// Returns [`FramingError::Overflow`] if the buffer has grown past its configured bound
    /// without producing a complete message. Once that happens the framer is poisoned: it must
    /// not be fed again, and the owning session must disconnect.
    fn feed(&mut self, chunk: &[u8]) -> Result<(), FramingError>;

    /// Returns the next complete message if one is buffered, otherwise `None`.
    fn next(&mut self) -> Option<Self::Message>;

    /// Whether a call to `next()` has discovered an overflow condition that `feed()` could not
    /// report synchronously (see [`LengthPrefixFramer`] for why this can happen). Sessions check
    /// this after draining `next()` to catch an overflow that only becomes visible mid-drain.
    fn is_poisoned(&self) -> bool {
        false
    }
}

/// Builds a fresh [`Framer`] per connection. One factory instance is shared by the [`crate::server::Server`].
pub trait FramerFactory: Send + Sync + 'static {
    type Framer: Framer;

    fn new_framer(&self) -> Self::Framer;
}

/// Factory for [`DelimiterFramer`], sharing one delimiter/bound configuration across all sessions.
#[derive(Debug, Clone)]
pub struct DelimiterFramerFactory {
    delimiter: u8,
    max_unframed: usize,
}

impl DelimiterFramerFactory {
    pub fn new(delimiter: char, max_unframed: usize) -> Result<Self, FramingError> {
        let probe = DelimiterFramer::new(delimiter, max_unframed)?;
        Ok(Self {
            delimiter: probe.delimiter_byte(),
            max_unframed,
        })
    }
}

impl FramerFactory for DelimiterFramerFactory {
    type Framer = DelimiterFramer;

    fn new_framer(&self) -> DelimiterFramer {
        DelimiterFramer::from_parts(self.delimiter, self.max_unframed)
    }
}

/// Factory for [`LengthPrefixFramer`], sharing one header-width/size-bound configuration.
#[derive(Debug, Clone)]
pub struct LengthPrefixFramerFactory {
    header_size: usize,
    max_message_size: usize,
}

impl LengthPrefixFramerFactory {
    pub fn new(header_size: usize, max_message_size: usize) -> Result<Self, FramingError> {
        // Validate eagerly so a misconfigured factory fails at construction, not at first accept.
        LengthPrefixFramer::new(header_size, max_message_size)?;
        Ok(Self {
            header_size,
            max_message_size,
        })
    }
}

impl FramerFactory for LengthPrefixFramerFactory {
    type Framer = LengthPrefixFramer;

    fn new_framer(&self) -> LengthPrefixFramer {
        LengthPrefixFramer::new(self.header_size, self.max_message_size)
            .expect("parameters were validated at factory construction")
    }
}
