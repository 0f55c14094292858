//! # CBL Header Codec
//!
//! Encodes the Constituent Block List header that indexes a chunked payload.
//!
//! ## Wire Format (big-endian)
//!
//! ```text
//! [magic "CB": 2][version: 1][flags: 1][creator: 32][timestamp_ms: 8]
//! [block_count: 4][original_length: 8][block_size_class: 1]       = 57 bytes
//!
//! message headers only (flags bit0):
//! [type_len: 2][type][sender_len: 2][sender]
//! [recipient_count: 2]{[len: 2][recipient]}*[priority: 1][scheme: 1]
//!
//! [block_ids: 32 * block_count]
//! ```
//!
//! Flags: bit0 = message header, bit1 = content encrypted, bit2 = header
//! index. Anything after the last block id is ignored, so a header padded to
//! a full block still decodes.
//!
//! ## Header Index
//!
//! A header larger than one block is split into segment blocks like any
//! payload. The block stored under the message id is then an index: the same
//! prefix with bit2 set, `original_length` holding the encoded header length,
//! no message fields, and the segment ids in place of content ids. An index
//! may itself be indexed, up to [`MAX_HEADER_DEPTH`] levels.

use shared_types::{BlockId, BlockSize, EncryptionScheme, MessagePriority, NodeId, Timestamp};

use super::errors::CodecError;

/// Leading magic bytes of every CBL header.
pub const HEADER_MAGIC: [u8; 2] = *b"CB";

/// Current header layout version.
pub const HEADER_VERSION: u8 = 1;

/// Size of the fixed prefix preceding the variable-length fields.
pub const HEADER_FIXED_LEN: usize = 57;

/// Index levels a reader follows before rejecting the header.
pub const MAX_HEADER_DEPTH: usize = 4;

const FLAG_MESSAGE: u8 = 0b0000_0001;
const FLAG_ENCRYPTED: u8 = 0b0000_0010;
const FLAG_INDEX: u8 = 0b0000_0100;
const FLAG_OFFSET: usize = 3;
const BLOCK_ID_LEN: usize = 32;

/// Message-specific header fields.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageHeaderFields {
    pub message_type: String,
    pub sender_id: String,
    pub recipients: Vec<String>,
    pub priority: MessagePriority,
    pub encryption_scheme: EncryptionScheme,
}

/// Decoded Constituent Block List header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CblHeader {
    /// Node that created the list.
    pub creator: NodeId,
    /// Creation time (ms since epoch).
    pub timestamp: Timestamp,
    /// Payload length before padding.
    pub original_length: u64,
    /// Block size class the payload was split with.
    pub block_size: BlockSize,
    pub encrypted: bool,
    /// Content block addresses in payload order.
    pub block_ids: Vec<BlockId>,
    /// Present for message headers.
    pub message: Option<MessageHeaderFields>,
}

impl CblHeader {
    pub fn block_count(&self) -> usize {
        self.block_ids.len()
    }

    pub fn is_message(&self) -> bool {
        self.message.is_some()
    }
}

/// Block list of a header too large for one block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderIndex {
    pub creator: NodeId,
    pub timestamp: Timestamp,
    /// Encoded length of the indexed header.
    pub header_length: u64,
    pub block_size: BlockSize,
    /// Whether the indexed header is a message header.
    pub message: bool,
    pub encrypted: bool,
    /// Header segment addresses in order.
    pub segment_ids: Vec<BlockId>,
}

/// Either form a stored header block can take.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderBlock {
    Header(CblHeader),
    Index(HeaderIndex),
}

/// Whether `bytes` starts with a message header.
///
/// Only the 4-byte magic/version/flags prefix is inspected.
pub fn is_message_header(bytes: &[u8]) -> bool {
    bytes.len() > FLAG_OFFSET
        && bytes[..2] == HEADER_MAGIC
        && bytes[2] == HEADER_VERSION
        && bytes[FLAG_OFFSET] & FLAG_MESSAGE != 0
}

/// Exact encoded size of `header` in bytes.
pub fn encoded_header_len(header: &CblHeader) -> usize {
    let message_len = header.message.as_ref().map_or(0, |m| {
        2 + m.message_type.len()
            + 2
            + m.sender_id.len()
            + 2
            + m.recipients.iter().map(|r| 2 + r.len()).sum::<usize>()
            + 2
    });
    HEADER_FIXED_LEN + message_len + header.block_ids.len() * BLOCK_ID_LEN
}

fn put_str(out: &mut Vec<u8>, field: &'static str, value: &str) -> Result<(), CodecError> {
    let len = u16::try_from(value.len()).map_err(|_| CodecError::FieldTooLong {
        field,
        len: value.len(),
        max: u16::MAX as usize,
    })?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn block_count_u32(ids: &[BlockId]) -> Result<u32, CodecError> {
    u32::try_from(ids.len()).map_err(|_| CodecError::FieldTooLong {
        field: "block_ids",
        len: ids.len(),
        max: u32::MAX as usize,
    })
}

fn put_prefix(
    out: &mut Vec<u8>,
    flags: u8,
    creator: &NodeId,
    timestamp: Timestamp,
    block_count: u32,
    original_length: u64,
    block_size: BlockSize,
) {
    out.extend_from_slice(&HEADER_MAGIC);
    out.push(HEADER_VERSION);
    out.push(flags);
    out.extend_from_slice(&creator.0);
    out.extend_from_slice(&timestamp.to_be_bytes());
    out.extend_from_slice(&block_count.to_be_bytes());
    out.extend_from_slice(&original_length.to_be_bytes());
    out.push(block_size.class_byte());
}

/// Encode `header` into its wire form.
pub fn encode_header(header: &CblHeader) -> Result<Vec<u8>, CodecError> {
    let block_count = block_count_u32(&header.block_ids)?;

    let mut flags = 0u8;
    if header.message.is_some() {
        flags |= FLAG_MESSAGE;
    }
    if header.encrypted {
        flags |= FLAG_ENCRYPTED;
    }

    let mut out = Vec::with_capacity(encoded_header_len(header));
    put_prefix(
        &mut out,
        flags,
        &header.creator,
        header.timestamp,
        block_count,
        header.original_length,
        header.block_size,
    );

    if let Some(message) = &header.message {
        put_str(&mut out, "message_type", &message.message_type)?;
        put_str(&mut out, "sender_id", &message.sender_id)?;
        let count =
            u16::try_from(message.recipients.len()).map_err(|_| CodecError::FieldTooLong {
                field: "recipients",
                len: message.recipients.len(),
                max: u16::MAX as usize,
            })?;
        out.extend_from_slice(&count.to_be_bytes());
        for recipient in &message.recipients {
            put_str(&mut out, "recipient", recipient)?;
        }
        out.push(message.priority.to_byte());
        out.push(message.encryption_scheme.to_byte());
    }

    for id in &header.block_ids {
        out.extend_from_slice(id.as_bytes());
    }
    Ok(out)
}

/// Encode a header index block.
pub fn encode_header_index(index: &HeaderIndex) -> Result<Vec<u8>, CodecError> {
    let block_count = block_count_u32(&index.segment_ids)?;

    let mut flags = FLAG_INDEX;
    if index.message {
        flags |= FLAG_MESSAGE;
    }
    if index.encrypted {
        flags |= FLAG_ENCRYPTED;
    }

    let mut out = Vec::with_capacity(HEADER_FIXED_LEN + index.segment_ids.len() * BLOCK_ID_LEN);
    put_prefix(
        &mut out,
        flags,
        &index.creator,
        index.timestamp,
        block_count,
        index.header_length,
        index.block_size,
    );
    for id in &index.segment_ids {
        out.extend_from_slice(id.as_bytes());
    }
    Ok(out)
}

/// Bounds-checked cursor over header bytes.
struct HeaderReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> HeaderReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], CodecError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                CodecError::malformed(
                    self.pos,
                    format!(
                        "{what} needs {len} bytes, {} available",
                        self.buf.len() - self.pos
                    ),
                )
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self, what: &str) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N, what)?);
        Ok(out)
    }

    fn u8(&mut self, what: &str) -> Result<u8, CodecError> {
        Ok(self.take(1, what)?[0])
    }

    fn u16(&mut self, what: &str) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.array(what)?))
    }

    fn u32(&mut self, what: &str) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.array(what)?))
    }

    fn u64(&mut self, what: &str) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.array(what)?))
    }

    fn string(&mut self, what: &str) -> Result<String, CodecError> {
        let len = self.u16(what)? as usize;
        let start = self.pos;
        let bytes = self.take(len, what)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| CodecError::malformed(start, format!("{what} is not valid UTF-8")))
    }
}

/// Fields shared by headers and header indexes.
struct Prefix {
    flags: u8,
    creator: NodeId,
    timestamp: Timestamp,
    block_count: usize,
    original_length: u64,
    block_size: BlockSize,
}

fn read_prefix(reader: &mut HeaderReader<'_>) -> Result<Prefix, CodecError> {
    let available = reader.buf.len();
    if available < HEADER_FIXED_LEN {
        return Err(CodecError::malformed(
            available,
            format!(
                "buffer of {available} bytes is shorter than the {HEADER_FIXED_LEN}-byte fixed prefix"
            ),
        ));
    }

    if reader.array::<2>("magic")? != HEADER_MAGIC {
        return Err(CodecError::malformed(0, "bad magic"));
    }
    let version = reader.u8("version")?;
    if version != HEADER_VERSION {
        return Err(CodecError::malformed(
            2,
            format!("unsupported version {version}"),
        ));
    }
    let flags = reader.u8("flags")?;
    let creator = NodeId(reader.array::<32>("creator")?);
    let timestamp = reader.u64("timestamp")?;
    let block_count = reader.u32("block_count")? as usize;
    let original_length = reader.u64("original_length")?;
    let class_offset = reader.pos;
    let class = reader.u8("block_size_class")?;
    let block_size = BlockSize::from_class_byte(class).ok_or_else(|| {
        CodecError::malformed(class_offset, format!("unknown block size class {class}"))
    })?;

    Ok(Prefix {
        flags,
        creator,
        timestamp,
        block_count,
        original_length,
        block_size,
    })
}

fn read_block_ids(reader: &mut HeaderReader<'_>, count: usize) -> Result<Vec<BlockId>, CodecError> {
    let ids_len = count
        .checked_mul(BLOCK_ID_LEN)
        .ok_or_else(|| CodecError::malformed(reader.pos, "block count overflows"))?;
    let ids = reader.take(ids_len, "block_ids")?;
    Ok(ids
        .chunks_exact(BLOCK_ID_LEN)
        .filter_map(BlockId::from_slice)
        .collect())
}

fn read_message_fields(reader: &mut HeaderReader<'_>) -> Result<MessageHeaderFields, CodecError> {
    let message_type = reader.string("message_type")?;
    let sender_id = reader.string("sender_id")?;
    let count = reader.u16("recipient_count")? as usize;
    let mut recipients = Vec::with_capacity(count.min(reader.buf.len() / 2));
    for _ in 0..count {
        recipients.push(reader.string("recipient")?);
    }
    let priority_offset = reader.pos;
    let priority_byte = reader.u8("priority")?;
    let priority = MessagePriority::from_byte(priority_byte).ok_or_else(|| {
        CodecError::malformed(priority_offset, format!("unknown priority {priority_byte}"))
    })?;
    let scheme_byte = reader.u8("encryption_scheme")?;
    let encryption_scheme = EncryptionScheme::from_byte(scheme_byte).ok_or_else(|| {
        CodecError::malformed(
            priority_offset + 1,
            format!("unknown encryption scheme {scheme_byte}"),
        )
    })?;
    Ok(MessageHeaderFields {
        message_type,
        sender_id,
        recipients,
        priority,
        encryption_scheme,
    })
}

/// Decode a stored header block, which may be a header index.
pub fn decode_header_block(bytes: &[u8]) -> Result<HeaderBlock, CodecError> {
    let mut reader = HeaderReader::new(bytes);
    let prefix = read_prefix(&mut reader)?;

    if prefix.flags & FLAG_INDEX != 0 {
        let segment_ids = read_block_ids(&mut reader, prefix.block_count)?;
        return Ok(HeaderBlock::Index(HeaderIndex {
            creator: prefix.creator,
            timestamp: prefix.timestamp,
            header_length: prefix.original_length,
            block_size: prefix.block_size,
            message: prefix.flags & FLAG_MESSAGE != 0,
            encrypted: prefix.flags & FLAG_ENCRYPTED != 0,
            segment_ids,
        }));
    }

    let message = if prefix.flags & FLAG_MESSAGE != 0 {
        Some(read_message_fields(&mut reader)?)
    } else {
        None
    };
    let block_ids = read_block_ids(&mut reader, prefix.block_count)?;

    Ok(HeaderBlock::Header(CblHeader {
        creator: prefix.creator,
        timestamp: prefix.timestamp,
        original_length: prefix.original_length,
        block_size: prefix.block_size,
        encrypted: prefix.flags & FLAG_ENCRYPTED != 0,
        block_ids,
        message,
    }))
}

/// Decode a header produced by [`encode_header`].
///
/// A header index is rejected; resolve it with [`decode_header_block`].
pub fn decode_header(bytes: &[u8]) -> Result<CblHeader, CodecError> {
    match decode_header_block(bytes)? {
        HeaderBlock::Header(header) => Ok(header),
        HeaderBlock::Index(_) => Err(CodecError::malformed(
            FLAG_OFFSET,
            "block is a header index",
        )),
    }
}
