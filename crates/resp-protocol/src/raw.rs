//! `RawResult`: a tagged union over every RESP2/RESP3 wire shape.

/// One decoded frame, attributes already stripped out by the caller (see
/// [`crate::codec::decode_frame`]).
///
/// Invariant: an `Array` of length -1 is represented as `Array(None)`, never
/// as `Array(Some(vec![]))` — the empty-vs-null distinction is load-bearing
/// (spec §3, §8).
#[derive(Debug, Clone, PartialEq)]
pub enum RawResult {
    Null,
    SimpleString(Vec<u8>),
    Error(Vec<u8>),
    Integer(i64),
    BulkString(Option<Vec<u8>>),
    Array(Option<Vec<RawResult>>),
    // RESP3 additions
    Map(Vec<(RawResult, RawResult)>),
    Set(Vec<RawResult>),
    Push(Vec<RawResult>),
    Double(f64),
    Boolean(bool),
    BigNumber(Vec<u8>),
    VerbatimString { format: [u8; 3], bytes: Vec<u8> },
}

impl RawResult {
    /// True for the RESP3 `>` push frame type carried through as `Push`.
    pub fn is_push(&self) -> bool {
        matches!(self, RawResult::Push(_))
    }

    /// Best-effort conversion to an error message string, for classifying
    /// `-ERR ...` replies (spec §7).
    pub fn as_error(&self) -> Option<&[u8]> {
        match self {
            RawResult::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Attribute key/value pairs that preceded a value (RESP3 `|` frames).
/// Spec §4.B: attributes never occupy a slot in the parent's declared
/// length; §9 leaves their end-user surface an open question, resolved
/// here as an optional logging/propagation hook (see `AttributeHandler`).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Attributes(pub Vec<(RawResult, RawResult)>);

impl Attributes {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Callback invoked whenever a decode encounters an attribute frame. The
/// default behaviour (no handler installed) is to log and drop, per §9.
pub type AttributeHandler = dyn Fn(&Attributes) + Send + Sync;
