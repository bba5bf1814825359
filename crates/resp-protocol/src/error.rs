//! Decode-time error type for the RESP codec.

/// The class of token the decoder expected when it gave up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedToken {
    TypePrefix,
    Length,
    BulkPayload,
    ArrayElement,
    MapPair,
    Crlf,
}

impl std::fmt::Display for ExpectedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExpectedToken::TypePrefix => "type prefix byte",
            ExpectedToken::Length => "length field",
            ExpectedToken::BulkPayload => "bulk payload",
            ExpectedToken::ArrayElement => "array element",
            ExpectedToken::MapPair => "map pair",
            ExpectedToken::Crlf => "CRLF terminator",
        };
        f.write_str(s)
    }
}

/// Fatal decode failure. Per spec §4.B, carries enough to diagnose which
/// byte offset and token class failed, and the enclosing command id if the
/// caller supplied one (the bridge knows which in-flight message a frame
/// belongs to).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    pub offset: usize,
    pub expected: ExpectedToken,
    /// Human-readable command id of the in-flight message this frame was
    /// being decoded for, if known.
    pub command: Option<String>,
}

impl DecodeError {
    pub fn new(offset: usize, expected: ExpectedToken) -> Self {
        Self {
            offset,
            expected,
            command: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "RESP decode error at offset {}: expected {}",
            self.offset, self.expected
        )?;
        if let Some(cmd) = &self.command {
            write!(f, " (command: {cmd})")?;
        }
        Ok(())
    }
}

impl std::error::Error for DecodeError {}
